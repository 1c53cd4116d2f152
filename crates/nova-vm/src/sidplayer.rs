//! SID file player.
//!
//! Loads a PSID/RSID image into machine RAM and arranges playback:
//!
//! - PSID: a trampoline at $03D2 becomes the IRQ handler. On its first
//!   entry it calls `init(song)` (guarded by a flag byte at $03F0); every
//!   later entry calls `play`. The timer is programmed to fire at the
//!   frame rate and the CPU boots into a tight loop with interrupts
//!   enabled.
//! - RSID: the boot stub calls `init(song)` directly and loops; init is
//!   expected to install its own interrupt vector.
//!
//! Payloads that would collide with the trampoline page are relocated to
//! $1000 with the control-flow-walking patcher from `format-sid`.

use format_sid::{SidFile, relocate};
use log::info;

use crate::machine::{NovaVm, VmError};

/// IRQ trampoline location.
pub const TRAMPOLINE_ADDR: u16 = 0x03D2;
/// First-call flag byte used by the trampoline.
pub const INIT_FLAG_ADDR: u16 = 0x03F0;
/// Boot stub location (CLI + spin loop, or init call for RSID).
pub const STUB_ADDR: u16 = 0x03C0;
/// Relocation target for payloads that collide with the player page.
const RELOCATE_TO: u16 = 0x1000;

/// Install a SID image and prepare the machine to play `song`
/// (0-indexed).
pub fn install(vm: &mut NovaVm, bytes: &[u8], song: u8) -> Result<(), VmError> {
    let file = SidFile::parse(bytes)?;

    let mut load = file.load_address;
    let mut init = file.effective_init();
    let mut play = file.play_address;
    let mut data = file.data.clone();

    // The player owns $03C0-$03FF; a payload that overlaps it moves.
    let end = u32::from(load) + data.len() as u32;
    if load < 0x0400 && end > u32::from(STUB_ADDR) {
        let entries = [init, play];
        data = relocate(&data, load, RELOCATE_TO, &entries);
        let delta = RELOCATE_TO.wrapping_sub(load);
        if (u32::from(load)..end).contains(&u32::from(init)) {
            init = init.wrapping_add(delta);
        }
        if play != 0 && (u32::from(load)..end).contains(&u32::from(play)) {
            play = play.wrapping_add(delta);
        }
        load = RELOCATE_TO;
    }

    if !vm.bus.load_ram(load, &data) {
        return Err(VmError::ProgramRange(load));
    }

    info!(
        "SID: {} by {} ({}), load ${load:04X} init ${init:04X} play ${play:04X}",
        file.name, file.author, file.released
    );

    vm.bus.load_ram(INIT_FLAG_ADDR, &[0]);

    if file.is_rsid() || play == 0 {
        // RSID: LDA #song / JSR init / CLI / JMP self
        let stub = [
            0xA9, song,                                     // LDA #song
            0x20, init as u8, (init >> 8) as u8,            // JSR init
            0x58,                                           // CLI
            0x4C, (STUB_ADDR + 6) as u8, ((STUB_ADDR + 6) >> 8) as u8, // JMP self
        ];
        vm.bus.load_ram(STUB_ADDR, &stub);
        vm.boot(Some(STUB_ADDR));
        return Ok(());
    }

    // PSID boot stub: CLI / JMP self
    let stub = [
        0x58,                                               // CLI
        0x4C, (STUB_ADDR + 1) as u8, ((STUB_ADDR + 1) >> 8) as u8, // JMP self
    ];
    vm.bus.load_ram(STUB_ADDR, &stub);

    vm.bus.load_ram(TRAMPOLINE_ADDR, &trampoline(song, init, play));

    // IRQ vector -> trampoline (hardware vectors are writable)
    vm.write(0xFFFE, TRAMPOLINE_ADDR as u8);
    vm.write(0xFFFF, (TRAMPOLINE_ADDR >> 8) as u8);

    // Timer fires once per frame: divisor = cpu_hz / (100 * frame_rate)
    let clock = vm.bus.clock();
    let divisor = (clock.cpu_hz / (100 * clock.frame_rate_hz)).max(1) as u16;
    vm.write(0xBA41, divisor as u8);
    vm.write(0xBA42, (divisor >> 8) as u8);
    vm.write(0xBA40, 0x01);

    vm.boot(Some(STUB_ADDR));
    Ok(())
}

/// Assemble the IRQ trampoline.
///
/// ```text
/// $03D2  PHA / TXA / PHA / TYA / PHA
/// $03D7  LDA $03F0
/// $03DA  BNE play
/// $03DC  LDA #song
/// $03DE  JSR init
/// $03E1  INC $03F0
/// $03E4  JMP exit
/// play:  JSR play          ; $03E7
/// exit:  PLA / TAY / PLA / TAX / PLA / RTI
/// ```
fn trampoline(song: u8, init: u16, play: u16) -> [u8; 30] {
    [
        0x48,                                   // PHA
        0x8A,                                   // TXA
        0x48,                                   // PHA
        0x98,                                   // TYA
        0x48,                                   // PHA
        0xAD, INIT_FLAG_ADDR as u8, (INIT_FLAG_ADDR >> 8) as u8, // LDA $03F0
        0xD0, 0x0B,                             // BNE +11 (play)
        0xA9, song,                             // LDA #song
        0x20, init as u8, (init >> 8) as u8,    // JSR init
        0xEE, INIT_FLAG_ADDR as u8, (INIT_FLAG_ADDR >> 8) as u8, // INC $03F0
        0x4C, 0xEA, 0x03,                       // JMP $03EA (exit)
        0x20, play as u8, (play >> 8) as u8,    // JSR play
        0x68,                                   // PLA
        0xA8,                                   // TAY
        0x68,                                   // PLA
        0xAA,                                   // TAX
        0x68,                                   // PLA
        0x40,                                   // RTI
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ROM_SIZE, VmConfig};
    use crate::debugger::Debugger;

    fn make_vm() -> NovaVm {
        let mut rom = vec![0xEA; ROM_SIZE];
        rom[0x3FFC] = 0x00;
        rom[0x3FFD] = 0xC0;
        NovaVm::new(&VmConfig::new(rom))
    }

    /// Minimal v2 PSID: init writes SID1 volume, play bumps a counter.
    fn make_psid(load: u16) -> Vec<u8> {
        let mut bytes = vec![0u8; 0x7C];
        bytes[0..4].copy_from_slice(b"PSID");
        bytes[0x05] = 2; // version
        bytes[0x07] = 0x7C; // data offset
        bytes[0x08..0x0A].copy_from_slice(&load.to_be_bytes());
        bytes[0x0A..0x0C].copy_from_slice(&load.to_be_bytes()); // init
        bytes[0x0C..0x0E].copy_from_slice(&(load + 6).to_be_bytes()); // play
        bytes[0x0E] = 0;
        bytes[0x0F] = 1; // songs
        bytes[0x11] = 1; // start song

        // init: LDA #$0F / STA $D418 / RTS
        // play: INC $0280 / RTS
        bytes.extend_from_slice(&[
            0xA9, 0x0F, 0x8D, 0x18, 0xD4, 0x60, // init
            0xEE, 0x80, 0x02, 0x60, // play
        ]);
        bytes
    }

    #[test]
    fn psid_plays_through_timer_irqs() {
        let mut vm = make_vm();
        install(&mut vm, &make_psid(0x1000), 0).expect("install");

        let (debugger, _handle) = Debugger::new();
        let clock = vm.bus.clock();
        // Run ~3 frames of cycles
        let budget = clock.cpu_hz / clock.frame_rate_hz * 3;
        vm.run_slice(budget, &debugger).expect("run");

        assert_eq!(vm.bus.sid1.volume, 0x0F, "init ran and set the volume");
        assert!(vm.bus.peek_ram(0x0280) >= 2, "play ran on later IRQs");
        assert_eq!(vm.bus.peek_ram(INIT_FLAG_ADDR), 1);
    }

    #[test]
    fn colliding_payload_is_relocated() {
        // Loads at $03B8, overlapping the player stub at $03C0
        let mut vm = make_vm();
        install(&mut vm, &make_psid(0x03B8), 0).expect("install");
        // The payload now lives at $1000
        assert_eq!(vm.bus.peek_ram(0x1000), 0xA9);
        assert_eq!(vm.bus.peek_ram(0x1001), 0x0F);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut vm = make_vm();
        let mut bytes = make_psid(0x1000);
        bytes[0] = b'X';
        assert!(matches!(
            install(&mut vm, &bytes, 0),
            Err(VmError::SidFormat(_))
        ));
    }
}
