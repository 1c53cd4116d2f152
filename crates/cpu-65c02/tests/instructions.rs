//! Unit tests for 65C02 instruction behaviour and cycle accounting.

use cpu_65c02::{Cpu65C02, CpuError, status_flags as flags};
use nova_core::{Bus, SimpleBus};

/// Load a program at $0200 and point PC there.
fn setup(program: &[u8]) -> (Cpu65C02, SimpleBus) {
    let mut bus = SimpleBus::new();
    bus.load(0x0200, program);
    let mut cpu = Cpu65C02::new();
    cpu.boot(&mut bus, Some(0x0200));
    (cpu, bus)
}

/// Execute `count` instructions, returning total cycles.
fn run(cpu: &mut Cpu65C02, bus: &mut SimpleBus, count: usize) -> u64 {
    let mut total = 0u64;
    for _ in 0..count {
        let predicted = cpu.clocks_for_next(bus);
        let actual = cpu.execute_next(bus).expect("execute");
        assert_eq!(predicted, actual, "prediction must match execution");
        total += u64::from(actual);
    }
    total
}

#[test]
fn lda_sets_nz_flags() {
    let (mut cpu, mut bus) = setup(&[0xA9, 0x00, 0xA9, 0x80]);
    run(&mut cpu, &mut bus, 1);
    assert!(cpu.regs.p.is_set(flags::Z));
    run(&mut cpu, &mut bus, 1);
    assert!(cpu.regs.p.is_set(flags::N));
    assert_eq!(cpu.regs.a, 0x80);
}

#[test]
fn stack_pha_pla_round_trip() {
    // LDA #$42; LDX #$FF; TXS; PHA; LDA #$00; PLA
    let (mut cpu, mut bus) = setup(&[0xA9, 0x42, 0xA2, 0xFF, 0x9A, 0x48, 0xA9, 0x00, 0x68]);
    run(&mut cpu, &mut bus, 6);
    assert_eq!(cpu.regs.a, 0x42, "PLA should restore A");
    assert_eq!(cpu.regs.s, 0xFF, "SP should be back after PLA");
}

#[test]
fn phx_ply_transfer_via_stack() {
    // LDX #$7E; PHX; PLY
    let (mut cpu, mut bus) = setup(&[0xA2, 0x7E, 0xDA, 0x7A]);
    run(&mut cpu, &mut bus, 3);
    assert_eq!(cpu.regs.y, 0x7E);
}

#[test]
fn adc_binary_carry_and_overflow() {
    // CLC; LDA #$50; ADC #$50 -> $A0, V set, C clear
    let (mut cpu, mut bus) = setup(&[0x18, 0xA9, 0x50, 0x69, 0x50]);
    run(&mut cpu, &mut bus, 3);
    assert_eq!(cpu.regs.a, 0xA0);
    assert!(cpu.regs.p.is_set(flags::V));
    assert!(!cpu.regs.p.is_set(flags::C));
    assert!(cpu.regs.p.is_set(flags::N));
}

#[test]
fn sbc_sets_borrow() {
    // SEC; LDA #$10; SBC #$20 -> $F0, C clear (borrow)
    let (mut cpu, mut bus) = setup(&[0x38, 0xA9, 0x10, 0xE9, 0x20]);
    run(&mut cpu, &mut bus, 3);
    assert_eq!(cpu.regs.a, 0xF0);
    assert!(!cpu.regs.p.is_set(flags::C));
}

#[test]
fn decimal_adc_wraps_at_hundred() {
    // SED; SEC; LDA #$58; ADC #$46 -> 58 + 46 + 1 = 105 -> $05, carry set
    let (mut cpu, mut bus) = setup(&[0xF8, 0x38, 0xA9, 0x58, 0x69, 0x46]);
    run(&mut cpu, &mut bus, 4);
    assert_eq!(cpu.regs.a, 0x05);
    assert!(cpu.regs.p.is_set(flags::C));
}

#[test]
fn decimal_sbc_borrows() {
    // SED; SEC; LDA #$12; SBC #$34 -> 100 + 12 - 34 = 78, borrow
    let (mut cpu, mut bus) = setup(&[0xF8, 0x38, 0xA9, 0x12, 0xE9, 0x34]);
    run(&mut cpu, &mut bus, 4);
    assert_eq!(cpu.regs.a, 0x78);
    assert!(!cpu.regs.p.is_set(flags::C));
}

#[test]
fn invalid_bcd_operand_faults() {
    // SED; LDA #$1A; ADC #$01 — $1A is not valid BCD
    let (mut cpu, mut bus) = setup(&[0xF8, 0xA9, 0x1A, 0x69, 0x01]);
    run(&mut cpu, &mut bus, 2);
    let result = cpu.execute_next(&mut bus);
    assert!(matches!(result, Err(CpuError::InvalidBcd { value: 0x1A, .. })));
}

#[test]
fn branch_cycle_costs() {
    let (mut cpu, mut bus) = setup(&[
        0xA9, 0x01, // LDA #1 (Z clear)
        0xF0, 0x10, // BEQ — not taken: 2 cycles
        0xD0, 0x00, // BNE — taken, same page: 3 cycles
    ]);
    run(&mut cpu, &mut bus, 1);
    let beq = cpu.execute_next(&mut bus).expect("beq");
    assert_eq!(beq, 2);
    let bne = cpu.execute_next(&mut bus).expect("bne");
    assert_eq!(bne, 3);
}

#[test]
fn branch_page_cross_costs_four() {
    // Place a taken branch so its target crosses a page boundary
    let mut bus = SimpleBus::new();
    bus.load(0x02F0, &[0xA9, 0x00, 0xF0, 0x20]); // LDA #0; BEQ +$20
    let mut cpu = Cpu65C02::new();
    cpu.boot(&mut bus, Some(0x02F0));
    run(&mut cpu, &mut bus, 1);
    let cycles = cpu.execute_next(&mut bus).expect("beq");
    assert_eq!(cycles, 4, "taken branch across a page costs 4");
    assert_eq!(cpu.regs.pc, 0x0314);
}

#[test]
fn indexed_read_page_cross_penalty() {
    // LDA $20FF,X with X=1 crosses into $2100: 5 cycles
    let (mut cpu, mut bus) = setup(&[0xA2, 0x01, 0xBD, 0xFF, 0x20]);
    bus.write(0x2100, 0x77);
    run(&mut cpu, &mut bus, 1);
    let cycles = cpu.execute_next(&mut bus).expect("lda abs,x");
    assert_eq!(cycles, 5);
    assert_eq!(cpu.regs.a, 0x77);
}

#[test]
fn indexed_read_same_page_is_four() {
    let (mut cpu, mut bus) = setup(&[0xA2, 0x01, 0xBD, 0x00, 0x20]);
    bus.write(0x2001, 0x66);
    run(&mut cpu, &mut bus, 1);
    let cycles = cpu.execute_next(&mut bus).expect("lda abs,x");
    assert_eq!(cycles, 4);
    assert_eq!(cpu.regs.a, 0x66);
}

#[test]
fn rmw_inc_abs() {
    let (mut cpu, mut bus) = setup(&[0xEE, 0x00, 0x30]);
    bus.write(0x3000, 0x7F);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(bus.peek(0x3000), 0x80);
}

#[test]
fn jsr_rts_round_trip() {
    // JSR $0300; (at $0300: LDA #$55; RTS)
    let (mut cpu, mut bus) = setup(&[0x20, 0x00, 0x03, 0xA9, 0x01]);
    bus.load(0x0300, &[0xA9, 0x55, 0x60]);
    run(&mut cpu, &mut bus, 3); // JSR, LDA, RTS
    assert_eq!(cpu.regs.a, 0x55);
    assert_eq!(cpu.regs.pc, 0x0203, "RTS returns past the JSR");
}

#[test]
fn brk_vectors_and_sets_i() {
    let (mut cpu, mut bus) = setup(&[0x58, 0x00]);
    bus.write(0xFFFE, 0x00);
    bus.write(0xFFFF, 0x80);
    run(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.regs.pc, 0x8000);
    assert!(cpu.regs.p.is_set(flags::I));
}

#[test]
fn irq_waits_for_i_clear() {
    // SEI; NOP; NOP — IRQ raised but masked
    let (mut cpu, mut bus) = setup(&[0x78, 0xEA, 0xEA, 0xEA]);
    bus.write(0xFFFE, 0x00);
    bus.write(0xFFFF, 0x90);
    run(&mut cpu, &mut bus, 1);
    cpu.irq_waiting = true;
    run(&mut cpu, &mut bus, 2);
    assert_ne!(cpu.regs.pc, 0x9000, "masked IRQ not taken");

    // CLI via direct flag manipulation, then the IRQ lands
    cpu.regs.p.clear(flags::I);
    let cycles = cpu.execute_next(&mut bus).expect("irq service");
    assert_eq!(cycles, 7);
    assert_eq!(cpu.regs.pc, 0x9000);
    assert!(cpu.regs.p.is_set(flags::I));
}

#[test]
fn rti_restores_flow() {
    // IRQ handler at $9000: RTI. Main: CLI; NOP ...
    let (mut cpu, mut bus) = setup(&[0x58, 0xEA, 0xEA]);
    bus.write(0xFFFE, 0x00);
    bus.write(0xFFFF, 0x90);
    bus.load(0x9000, &[0x40]);
    run(&mut cpu, &mut bus, 1); // CLI
    cpu.irq_waiting = true;
    run(&mut cpu, &mut bus, 1); // IRQ entry
    assert_eq!(cpu.regs.pc, 0x9000);
    run(&mut cpu, &mut bus, 1); // RTI
    assert_eq!(cpu.regs.pc, 0x0201, "back at the interrupted instruction");
}

#[test]
fn stz_clears_memory() {
    let (mut cpu, mut bus) = setup(&[0x9C, 0x00, 0x40]);
    bus.write(0x4000, 0xFF);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(bus.peek(0x4000), 0x00);
}

#[test]
fn bra_always_branches() {
    let (mut cpu, mut bus) = setup(&[0x80, 0x04]);
    let cycles = cpu.execute_next(&mut bus).expect("bra");
    assert_eq!(cycles, 3);
    assert_eq!(cpu.regs.pc, 0x0206);
}

#[test]
fn trb_tsb_update_memory_and_z() {
    // LDA #$0F; TSB $10; TRB $10
    let (mut cpu, mut bus) = setup(&[0xA9, 0x0F, 0x04, 0x10, 0x14, 0x10]);
    bus.write(0x0010, 0xF0);
    run(&mut cpu, &mut bus, 2);
    assert_eq!(bus.peek(0x0010), 0xFF, "TSB sets bits");
    assert!(cpu.regs.p.is_set(flags::Z), "A & old == 0");
    run(&mut cpu, &mut bus, 1);
    assert_eq!(bus.peek(0x0010), 0xF0, "TRB clears bits");
    assert!(!cpu.regs.p.is_set(flags::Z));
}

#[test]
fn indirect_zp_addressing() {
    // LDA ($10) with ($10) -> $1234
    let (mut cpu, mut bus) = setup(&[0xB2, 0x10]);
    bus.write(0x0010, 0x34);
    bus.write(0x0011, 0x12);
    bus.write(0x1234, 0xC3);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.regs.a, 0xC3);
}

#[test]
fn smb_rmb_twiddle_zero_page_bits() {
    // SMB3 $20; RMB0 $20
    let (mut cpu, mut bus) = setup(&[0xB7, 0x20, 0x07, 0x20]);
    bus.write(0x0020, 0x01);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(bus.peek(0x0020), 0x09, "SMB3 sets bit 3");
    run(&mut cpu, &mut bus, 1);
    assert_eq!(bus.peek(0x0020), 0x08, "RMB0 clears bit 0");
}

#[test]
fn bbs_branches_on_set_bit() {
    // BBS0 $20, +2 — bit set, so skip the LDA #1
    let (mut cpu, mut bus) = setup(&[0x8F, 0x20, 0x02, 0xA9, 0x01, 0xA9, 0x02]);
    bus.write(0x0020, 0x01);
    run(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.regs.a, 0x02);
}

#[test]
fn jmp_indirect_reads_across_page() {
    // 65C02 fixes the NMOS page-wrap bug
    let (mut cpu, mut bus) = setup(&[0x6C, 0xFF, 0x30]);
    bus.write(0x30FF, 0x00);
    bus.write(0x3100, 0x50);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.regs.pc, 0x5000);
}

#[test]
fn wai_holds_until_irq() {
    let (mut cpu, mut bus) = setup(&[0x78, 0xCB, 0xA9, 0x99]); // SEI; WAI; LDA #$99
    run(&mut cpu, &mut bus, 2);
    assert!(cpu.is_waiting());
    let idle = cpu.execute_next(&mut bus).expect("idle");
    assert_eq!(idle, 1);
    assert!(cpu.is_waiting());

    // IRQ with I set: resume without servicing
    cpu.irq_waiting = true;
    run(&mut cpu, &mut bus, 1);
    assert!(!cpu.is_waiting());
    assert_eq!(cpu.regs.a, 0x99);
}

#[test]
fn stp_stops_the_core() {
    let (mut cpu, mut bus) = setup(&[0xDB, 0xA9, 0x01]);
    run(&mut cpu, &mut bus, 1);
    assert!(cpu.is_stopped());
    let cycles = cpu.execute_next(&mut bus).expect("stopped");
    assert_eq!(cycles, 1);
    assert_eq!(cpu.regs.a, 0, "no further execution");
}

#[test]
fn undefined_opcodes_are_nops() {
    // $03 (1-byte NOP), $44 (2-byte NOP), $5C (3-byte NOP)
    let (mut cpu, mut bus) = setup(&[0x03, 0x44, 0x00, 0x5C, 0x00, 0x00, 0xA9, 0x33]);
    run(&mut cpu, &mut bus, 4);
    assert_eq!(cpu.regs.a, 0x33, "decode never faults, lengths line up");
}

#[test]
fn boot_reads_reset_vector_when_no_entry() {
    let mut bus = SimpleBus::new();
    bus.write(0xFFFC, 0x34);
    bus.write(0xFFFD, 0x12);
    let mut cpu = Cpu65C02::new();
    cpu.boot(&mut bus, None);
    assert_eq!(cpu.regs.pc, 0x1234);
}

#[test]
fn prediction_matches_execution_across_a_mixed_program() {
    let program = [
        0xA2, 0x05, // LDX #5
        0xA9, 0x00, // LDA #0
        0x18, // CLC
        0x69, 0x03, // ADC #3
        0xCA, // DEX
        0xD0, 0xFA, // BNE -6
        0x8D, 0x00, 0x60, // STA $6000
        0xDB, // STP
    ];
    let (mut cpu, mut bus) = setup(&program);
    for _ in 0..40 {
        if cpu.is_stopped() {
            break;
        }
        let predicted = cpu.clocks_for_next(&mut bus);
        let actual = cpu.execute_next(&mut bus).expect("execute");
        assert_eq!(predicted, actual);
    }
    assert_eq!(bus.peek(0x6000), 15, "5 iterations of ADC #3");
}
