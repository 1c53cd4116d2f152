//! The NovaVM bus: memory and peripheral routing.
//!
//! The bus owns 64 KiB of linear RAM and every peripheral. Reads and
//! writes probe the peripherals in a fixed order and stop at the first
//! claim; unclaimed addresses fall through to RAM. The ROM body at
//! $C000-$FFF9 silently drops writes, while the six hardware-vector bytes
//! at $FFFA-$FFFF stay writable. ROM protection is checked only after
//! every peripheral has declined the address, so the SID ranges inside
//! the ROM window keep working.
//!
//! `advance_cycles` drives everything that runs beside the CPU: DMA, then
//! blitter, then the timer, then the frame accumulator (which ticks the
//! VGC and the music engine and latches raster IRQs), then the SID
//! clocks. The accumulator is remainder-preserving, so logical frames
//! stay exact for any cpu-rate/frame-rate pair.

use nova_core::{Bus, ClockConfig};
use nova_sid::NovaSid;

use crate::blitter::Blitter;
use crate::config::{ROM_SIZE, VmConfig};
use crate::dma::Dma;
use crate::fio::{DirStore, Fio};
use crate::hooks::{HostHooks, NullHooks};
use crate::music::MusicEngine;
use crate::nic::Nic;
use crate::spaces::{MemSpace, SpaceView};
use crate::timer::Timer;
use crate::vgc::Vgc;
use crate::xmc::Xmc;

/// ROM body start.
pub const ROM_BASE: u16 = 0xC000;
/// First hardware-vector byte; vectors stay writable.
pub const VECTORS_BASE: u16 = 0xFFFA;

/// Vector table of peripheral base addresses, seeded at $0200.
const VECTOR_TABLE_BASE: usize = 0x0200;
const PERIPHERAL_BASES: [u16; 14] = [
    0xA000, // VGC registers
    0xA040, // sprite register block
    0xA100, // NIC
    0xAA00, // character RAM
    0xB1D0, // colour RAM
    0xB9A0, // file I/O
    0xBA00, // XMC
    0xBA40, // timer
    0xBA50, // music status
    0xBA60, // DMA
    0xBA80, // blitter
    0xBC00, // XMC windows
    0xD400, // SID1
    0xD420, // SID2
];

/// The NovaVM bus.
pub struct NovaBus {
    ram: Vec<u8>,
    pub vgc: Vgc,
    pub sid1: NovaSid,
    pub sid2: NovaSid,
    pub music: MusicEngine,
    pub xmc: Xmc,
    pub timer: Timer,
    pub nic: Nic,
    pub dma: Dma,
    pub blitter: Blitter,
    pub fio: Fio,
    hooks: Box<dyn HostHooks>,

    clock: ClockConfig,
    /// Frame accumulator: cycles x frame rate, carrying the remainder.
    frame_acc: u64,
    total_frames: u64,
    raster_latch: bool,
}

impl NovaBus {
    #[must_use]
    pub fn new(config: &VmConfig) -> Self {
        let mut ram = vec![0u8; 0x10000];

        // ROM image lands at $C000, zero-padded to the window
        let len = config.rom.len().min(ROM_SIZE);
        ram[ROM_BASE as usize..ROM_BASE as usize + len].copy_from_slice(&config.rom[..len]);

        // Seed the vector table with peripheral bases
        for (i, base) in PERIPHERAL_BASES.iter().enumerate() {
            ram[VECTOR_TABLE_BASE + i * 2] = *base as u8;
            ram[VECTOR_TABLE_BASE + i * 2 + 1] = (*base >> 8) as u8;
        }

        let cpu_hz = config.clock.cpu_hz as u32;
        Self {
            ram,
            vgc: Vgc::new(),
            sid1: NovaSid::new(cpu_hz, config.sample_rate),
            sid2: NovaSid::new(cpu_hz, config.sample_rate),
            music: MusicEngine::new(cpu_hz),
            xmc: Xmc::new(config.xram_kb),
            timer: Timer::new(),
            nic: Nic::new(),
            dma: Dma::new(),
            blitter: Blitter::new(),
            fio: Fio::new(Box::new(DirStore::new(config.files_root.clone()))),
            hooks: Box::new(NullHooks),
            clock: config.clock,
            frame_acc: 0,
            total_frames: 0,
            raster_latch: false,
        }
    }

    /// Register the host event sink.
    pub fn set_hooks(&mut self, hooks: Box<dyn HostHooks>) {
        self.hooks = hooks;
    }

    #[must_use]
    pub fn clock(&self) -> ClockConfig {
        self.clock
    }

    /// Advance every cycle-driven peripheral by `cycles`.
    pub fn advance_cycles(&mut self, cycles: u64) {
        // DMA then blitter, fixed order
        let (dma_done, blt_done);
        {
            let Self {
                ram,
                vgc,
                xmc,
                dma,
                blitter,
                ..
            } = self;
            let mut view = SpaceView {
                ram: ram.as_mut_slice(),
                vgc,
                xmc,
            };
            dma_done = dma.advance_cycles(cycles, &mut view);
            blt_done = blitter.advance_cycles(cycles, &mut view);
        }
        if dma_done && self.dma.dst_space() == MemSpace::Xram {
            self.xmc.refresh_stats();
        }
        if blt_done && self.blitter.dst_space() == MemSpace::Xram {
            self.xmc.refresh_stats();
        }

        self.timer.advance_cycles(cycles);

        // Frame accumulator, remainder-preserving
        self.frame_acc += cycles * self.clock.frame_rate_hz;
        while self.frame_acc >= self.clock.cpu_hz {
            self.frame_acc -= self.clock.cpu_hz;
            self.total_frames += 1;
            self.vgc.tick_frame();
            self.music.tick(&mut self.sid1, &mut self.sid2);
            if self.vgc.raster_irq_enabled() {
                self.raster_latch = true;
            }
        }

        self.sid1.clock(cycles);
        self.sid2.clock(cycles);
    }

    /// Test-and-clear the raster IRQ latch.
    pub fn consume_raster_irq(&mut self) -> bool {
        let latched = self.raster_latch;
        self.raster_latch = false;
        latched
    }

    /// Level-style IRQ lines (timer, NIC); the raster latch is consumed
    /// separately.
    #[must_use]
    pub fn irq_line(&self) -> bool {
        self.timer.irq_pending() || self.nic.irq_pending()
    }

    /// Completed logical frames.
    #[must_use]
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Global soft reset, triggered by the VGC `SysReset` command:
    /// music stops, all SID voices gate off, every NIC slot resets.
    /// RAM and peripheral registers otherwise keep their state.
    fn soft_reset(&mut self) {
        self.music.stop();
        self.sid1.gate_all_off();
        self.sid2.gate_all_off();
        self.nic.reset_all();
    }

    /// A running program asked the host for help.
    pub fn request_help(&mut self) {
        self.hooks.help_requested();
    }

    /// Replace the ROM image at runtime. The caller re-boots the CPU so
    /// the new reset vector takes effect.
    pub fn swap_rom(&mut self, rom: &[u8]) {
        let base = ROM_BASE as usize;
        self.ram[base..].fill(0);
        let len = rom.len().min(ROM_SIZE);
        self.ram[base..base + len].copy_from_slice(&rom[..len]);
        self.hooks.rom_swapped();
    }

    /// Non-mutating RAM inspection (debugger, tests).
    #[must_use]
    pub fn peek_ram(&self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    /// Copy a program body into RAM, below the ROM window.
    pub fn load_ram(&mut self, addr: u16, bytes: &[u8]) -> bool {
        let start = addr as usize;
        if start + bytes.len() > ROM_BASE as usize {
            return false;
        }
        self.ram[start..start + bytes.len()].copy_from_slice(bytes);
        true
    }

    /// Stop background workers (machine teardown).
    pub fn shutdown(&mut self) {
        self.nic.shutdown();
    }
}

impl Bus for NovaBus {
    fn read(&mut self, addr: u16) -> u8 {
        if MusicEngine::owns(addr) {
            return self.music.read(addr);
        }
        if Timer::owns(addr) {
            return self.timer.read(addr);
        }
        if Nic::owns(addr) {
            return self.nic.read(addr);
        }
        if Dma::owns(addr) {
            return self.dma.read(addr);
        }
        if Blitter::owns(addr) {
            return self.blitter.read(addr);
        }
        if self.xmc.owns(addr) {
            return self.xmc.read(addr);
        }
        if Fio::owns(addr) {
            return self.fio.read(addr);
        }
        if Vgc::owns(addr) {
            return self.vgc.read(addr);
        }
        if (0xD400..=0xD41C).contains(&addr) {
            return self.sid1.read((addr - 0xD400) as u8);
        }
        if (0xD420..=0xD43C).contains(&addr) {
            return self.sid2.read((addr - 0xD420) as u8);
        }
        if (0xD500..=0xD51C).contains(&addr) {
            // Mirror routed to SID2
            return self.sid2.read((addr - 0xD500) as u8);
        }
        self.ram[addr as usize]
    }

    fn write(&mut self, addr: u16, value: u8) {
        if MusicEngine::owns(addr) {
            // Status and note mirrors are read-only
            return;
        }
        if Timer::owns(addr) {
            self.timer.write(addr, value);
            return;
        }
        if Nic::owns(addr) {
            let Self { nic, ram, .. } = self;
            nic.write(addr, value, ram);
            return;
        }
        if Dma::owns(addr) {
            if addr == crate::dma::DMA_BASE {
                let Self {
                    ram, vgc, xmc, dma, ..
                } = self;
                let view = SpaceView {
                    ram: ram.as_mut_slice(),
                    vgc,
                    xmc,
                };
                dma.write_cmd(value, &view);
            } else {
                self.dma.write(addr, value);
            }
            return;
        }
        if Blitter::owns(addr) {
            if addr == crate::blitter::BLT_BASE {
                let Self {
                    ram,
                    vgc,
                    xmc,
                    blitter,
                    ..
                } = self;
                let view = SpaceView {
                    ram: ram.as_mut_slice(),
                    vgc,
                    xmc,
                };
                blitter.write_cmd(value, &view);
            } else {
                self.blitter.write(addr, value);
            }
            return;
        }
        if self.xmc.owns(addr) {
            if addr == crate::xmc::XMC_BASE {
                let Self { ram, xmc, .. } = self;
                xmc.write_cmd(value, ram);
            } else {
                self.xmc.write(addr, value);
            }
            return;
        }
        if Fio::owns(addr) {
            if addr == crate::fio::FIO_BASE {
                {
                    let Self {
                        ram, vgc, xmc, fio, ..
                    } = self;
                    let mut view = SpaceView {
                        ram: ram.as_mut_slice(),
                        vgc,
                        xmc,
                    };
                    fio.write_cmd(value, &mut view);
                }
                if let Some(name) = self.fio.take_saved_name() {
                    self.hooks.program_saved(&name);
                }
            } else {
                self.fio.write(addr, value);
            }
            return;
        }
        if Vgc::owns(addr) {
            if addr == 0xA010 {
                let Self { ram, vgc, .. } = self;
                vgc.execute_with_ram(value, ram);
            } else {
                self.vgc.write(addr, value);
            }
            // SysReset takes effect after the VGC write completes; no
            // further peripherals are probed for this write.
            if self.vgc.take_reset_request() {
                self.soft_reset();
            }
            return;
        }
        if (0xD400..=0xD41C).contains(&addr) {
            self.sid1.write((addr - 0xD400) as u8, value);
            return;
        }
        if (0xD420..=0xD43C).contains(&addr) {
            self.sid2.write((addr - 0xD420) as u8, value);
            return;
        }
        if (0xD500..=0xD51C).contains(&addr) {
            self.sid2.write((addr - 0xD500) as u8, value);
            return;
        }
        // ROM body drops writes; hardware vectors stay writable
        if (ROM_BASE..VECTORS_BASE).contains(&addr) {
            return;
        }
        self.ram[addr as usize] = value;
    }
}
