//! 6502/65C02 CPU implementation.
//!
//! The core executes one whole instruction per `execute_next` call and
//! reports the exact cycle count. `clocks_for_next` computes the same count
//! without executing, by peeking the opcode and operands at PC; the
//! scheduler charges its budget from the prediction and the two always
//! agree because both are derived from the same tables and penalty rules.
//!
//! All official NMOS opcodes are implemented plus the 65C02 extensions
//! (BRA, PHX/PLX/PHY/PLY, STZ, TRB/TSB, BIT immediate/indexed, INC/DEC A,
//! JMP (abs,X), (zp) addressing, RMB/SMB, BBR/BBS, WAI, STP). The remaining
//! opcode slots execute as the 65C02's defined multi-byte NOPs, so decode
//! never fails.

use nova_core::Bus;
use thiserror::Error;

use crate::flags::{B, C, D, I, N, V, Z};
use crate::{Registers, Status};

/// IRQ service sequence cost.
const IRQ_CYCLES: u8 = 7;

/// Base cycle count per opcode, before page-cross and branch penalties.
///
/// 65C02 columns: x3/x7/xB hold the 1-cycle NOPs, RMB/SMB (5) and BBR/BBS
/// (5); WAI/STP carry their documented 3-cycle cost.
#[rustfmt::skip]
const BASE_CYCLES: [u8; 256] = [
    // 0  1  2  3  4  5  6  7  8  9  A  B  C  D  E  F
       7, 6, 2, 1, 5, 3, 5, 5, 3, 2, 2, 1, 6, 4, 6, 5, // 0x
       2, 5, 5, 1, 5, 4, 6, 5, 2, 4, 2, 1, 6, 4, 7, 5, // 1x
       6, 6, 2, 1, 3, 3, 5, 5, 4, 2, 2, 1, 4, 4, 6, 5, // 2x
       2, 5, 5, 1, 4, 4, 6, 5, 2, 4, 2, 1, 4, 4, 7, 5, // 3x
       6, 6, 2, 1, 3, 3, 5, 5, 3, 2, 2, 1, 3, 4, 6, 5, // 4x
       2, 5, 5, 1, 4, 4, 6, 5, 2, 4, 3, 1, 8, 4, 7, 5, // 5x
       6, 6, 2, 1, 3, 3, 5, 5, 4, 2, 2, 1, 6, 4, 6, 5, // 6x
       2, 5, 5, 1, 4, 4, 6, 5, 2, 4, 4, 1, 6, 4, 7, 5, // 7x
       2, 6, 2, 1, 3, 3, 3, 5, 2, 2, 2, 1, 4, 4, 4, 5, // 8x
       2, 6, 5, 1, 4, 4, 4, 5, 2, 5, 2, 1, 4, 5, 5, 5, // 9x
       2, 6, 2, 1, 3, 3, 3, 5, 2, 2, 2, 1, 4, 4, 4, 5, // Ax
       2, 5, 5, 1, 4, 4, 4, 5, 2, 4, 2, 1, 4, 4, 4, 5, // Bx
       2, 6, 2, 1, 3, 3, 5, 5, 2, 2, 2, 3, 4, 4, 6, 5, // Cx
       2, 5, 5, 1, 4, 4, 6, 5, 2, 4, 3, 3, 4, 4, 7, 5, // Dx
       2, 6, 2, 1, 3, 3, 5, 5, 2, 2, 2, 1, 4, 4, 6, 5, // Ex
       2, 5, 5, 1, 4, 4, 6, 5, 2, 4, 4, 1, 4, 4, 7, 5, // Fx
];

/// CPU-internal invariant failures.
///
/// The CPU never fails on decode; the only fatal condition is a decimal-mode
/// operand that is not valid BCD, which terminates the scheduler slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("invalid BCD operand ${value:02X} at ${pc:04X}")]
    InvalidBcd { value: u8, pc: u16 },
}

/// The 65C02 CPU.
#[derive(Debug)]
pub struct Cpu65C02 {
    /// CPU registers.
    pub regs: Registers,

    /// IRQ line latch. The scheduler sets this when a peripheral asserts an
    /// interrupt; the CPU samples it on instruction boundaries.
    pub irq_waiting: bool,

    /// WAI executed: halted until the IRQ line rises.
    waiting: bool,

    /// STP executed: halted until reset.
    stopped: bool,

    /// Total cycles executed (for debugging and telemetry).
    total_cycles: u64,
}

impl Default for Cpu65C02 {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu65C02 {
    /// Create a new CPU in reset state. PC is loaded by `boot`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            irq_waiting: false,
            waiting: false,
            stopped: false,
            total_cycles: 0,
        }
    }

    /// Reset the CPU and load PC from the reset vector at $FFFC, or from an
    /// explicit entry point.
    pub fn boot<Bu: Bus>(&mut self, bus: &mut Bu, entry: Option<u16>) {
        self.regs = Registers::new();
        self.irq_waiting = false;
        self.waiting = false;
        self.stopped = false;
        self.regs.pc = match entry {
            Some(pc) => pc,
            None => {
                let lo = bus.read(0xFFFC);
                let hi = bus.read(0xFFFD);
                u16::from(lo) | (u16::from(hi) << 8)
            }
        };
    }

    /// Total cycles executed since construction.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// True after STP until the next boot.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// True while WAI is holding the CPU.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Cycle cost of the next `execute_next` call.
    ///
    /// Peeks the opcode and operand bytes at PC without executing. Operand
    /// peeks touch only program bytes and zero-page pointers, so repeated
    /// calls are harmless.
    pub fn clocks_for_next<Bu: Bus>(&mut self, bus: &mut Bu) -> u8 {
        if self.stopped {
            return 1;
        }
        if self.irq_waiting && !self.regs.p.is_set(I) {
            return IRQ_CYCLES;
        }
        if self.waiting && !self.irq_waiting {
            return 1;
        }
        let op = bus.read(self.regs.pc);
        BASE_CYCLES[op as usize] + self.cycle_penalty(bus, op)
    }

    /// Page-cross and branch-taken penalties for the opcode at PC.
    fn cycle_penalty<Bu: Bus>(&mut self, bus: &mut Bu, op: u8) -> u8 {
        let pc = self.regs.pc;
        match op {
            // Read ops, abs,X
            0x1D | 0x3D | 0x5D | 0x7D | 0xBD | 0xDD | 0xFD | 0x3C | 0xBC => {
                let base = self.peek16(bus, pc.wrapping_add(1));
                u8::from(Self::crosses(base, self.regs.x))
            }
            // Read ops, abs,Y
            0x19 | 0x39 | 0x59 | 0x79 | 0xB9 | 0xD9 | 0xF9 | 0xBE => {
                let base = self.peek16(bus, pc.wrapping_add(1));
                u8::from(Self::crosses(base, self.regs.y))
            }
            // Read ops, (zp),Y
            0x11 | 0x31 | 0x51 | 0x71 | 0xB1 | 0xD1 | 0xF1 => {
                let ptr = bus.read(pc.wrapping_add(1));
                let base = self.zp_pointer(bus, ptr);
                u8::from(Self::crosses(base, self.regs.y))
            }
            // Branches: +1 taken, +1 more if the target crosses a page
            0x10 => self.branch_penalty(bus, !self.regs.p.is_set(N)),
            0x30 => self.branch_penalty(bus, self.regs.p.is_set(N)),
            0x50 => self.branch_penalty(bus, !self.regs.p.is_set(V)),
            0x70 => self.branch_penalty(bus, self.regs.p.is_set(V)),
            0x90 => self.branch_penalty(bus, !self.regs.p.is_set(C)),
            0xB0 => self.branch_penalty(bus, self.regs.p.is_set(C)),
            0xD0 => self.branch_penalty(bus, !self.regs.p.is_set(Z)),
            0xF0 => self.branch_penalty(bus, self.regs.p.is_set(Z)),
            0x80 => self.branch_penalty(bus, true),
            _ => 0,
        }
    }

    fn branch_penalty<Bu: Bus>(&mut self, bus: &mut Bu, taken: bool) -> u8 {
        if !taken {
            return 0;
        }
        let pc = self.regs.pc;
        let offset = bus.read(pc.wrapping_add(1)) as i8;
        let next = pc.wrapping_add(2);
        let target = next.wrapping_add(offset as u16);
        1 + u8::from(next & 0xFF00 != target & 0xFF00)
    }

    const fn crosses(base: u16, index: u8) -> bool {
        base & 0xFF00 != base.wrapping_add(index as u16) & 0xFF00
    }

    fn peek16<Bu: Bus>(&self, bus: &mut Bu, addr: u16) -> u16 {
        let lo = bus.read(addr);
        let hi = bus.read(addr.wrapping_add(1));
        u16::from(lo) | (u16::from(hi) << 8)
    }

    /// Read a 16-bit pointer from zero page with page-zero wrap.
    fn zp_pointer<Bu: Bus>(&self, bus: &mut Bu, ptr: u8) -> u16 {
        let lo = bus.read(u16::from(ptr));
        let hi = bus.read(u16::from(ptr.wrapping_add(1)));
        u16::from(lo) | (u16::from(hi) << 8)
    }

    /// Execute the next step (IRQ service, wait tick, or one instruction)
    /// and return its cycle cost.
    pub fn execute_next<Bu: Bus>(&mut self, bus: &mut Bu) -> Result<u8, CpuError> {
        let cycles = self.clocks_for_next(bus);
        self.total_cycles += u64::from(cycles);

        if self.stopped {
            return Ok(cycles);
        }

        if self.irq_waiting {
            self.waiting = false;
            if !self.regs.p.is_set(I) {
                self.service_irq(bus);
                return Ok(cycles);
            }
            // Woken from WAI with I set: fall through to the next instruction.
        } else if self.waiting {
            return Ok(cycles);
        }

        self.step(bus)?;
        Ok(cycles)
    }

    /// IRQ entry: push PC and status, set I, clear D, vector through $FFFE.
    fn service_irq<Bu: Bus>(&mut self, bus: &mut Bu) {
        self.irq_waiting = false;
        let pc = self.regs.pc;
        self.push8(bus, (pc >> 8) as u8);
        self.push8(bus, pc as u8);
        let p = self.regs.p.to_byte_irq();
        self.push8(bus, p);
        self.regs.p.set(I);
        self.regs.p.clear(D);
        self.regs.pc = self.peek16(bus, 0xFFFE);
    }

    // -----------------------------------------------------------------
    // Fetch and stack helpers
    // -----------------------------------------------------------------

    fn fetch8<Bu: Bus>(&mut self, bus: &mut Bu) -> u8 {
        let v = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        v
    }

    fn fetch16<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        let lo = self.fetch8(bus);
        let hi = self.fetch8(bus);
        u16::from(lo) | (u16::from(hi) << 8)
    }

    fn push8<Bu: Bus>(&mut self, bus: &mut Bu, value: u8) {
        let addr = self.regs.push();
        bus.write(addr, value);
    }

    fn pop8<Bu: Bus>(&mut self, bus: &mut Bu) -> u8 {
        let addr = self.regs.pop();
        bus.read(addr)
    }

    // -----------------------------------------------------------------
    // Addressing modes (effective address computation)
    // -----------------------------------------------------------------

    fn zp<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        u16::from(self.fetch8(bus))
    }

    fn zpx<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        u16::from(self.fetch8(bus).wrapping_add(self.regs.x))
    }

    fn zpy<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        u16::from(self.fetch8(bus).wrapping_add(self.regs.y))
    }

    fn abs<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        self.fetch16(bus)
    }

    fn abx<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        self.fetch16(bus).wrapping_add(u16::from(self.regs.x))
    }

    fn aby<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        self.fetch16(bus).wrapping_add(u16::from(self.regs.y))
    }

    fn izx<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        let ptr = self.fetch8(bus).wrapping_add(self.regs.x);
        self.zp_pointer(bus, ptr)
    }

    fn izy<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        let ptr = self.fetch8(bus);
        self.zp_pointer(bus, ptr).wrapping_add(u16::from(self.regs.y))
    }

    /// 65C02 (zp) mode.
    fn izp<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        let ptr = self.fetch8(bus);
        self.zp_pointer(bus, ptr)
    }

    // -----------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------

    fn lda(&mut self, v: u8) {
        self.regs.a = v;
        self.regs.p.update_nz(v);
    }

    fn ldx(&mut self, v: u8) {
        self.regs.x = v;
        self.regs.p.update_nz(v);
    }

    fn ldy(&mut self, v: u8) {
        self.regs.y = v;
        self.regs.p.update_nz(v);
    }

    fn ora(&mut self, v: u8) {
        self.lda(self.regs.a | v);
    }

    fn and(&mut self, v: u8) {
        self.lda(self.regs.a & v);
    }

    fn eor(&mut self, v: u8) {
        self.lda(self.regs.a ^ v);
    }

    fn bit(&mut self, v: u8) {
        self.regs.p.set_if(Z, self.regs.a & v == 0);
        self.regs.p.set_if(N, v & 0x80 != 0);
        self.regs.p.set_if(V, v & 0x40 != 0);
    }

    /// BIT immediate only affects Z on the 65C02.
    fn bit_imm(&mut self, v: u8) {
        self.regs.p.set_if(Z, self.regs.a & v == 0);
    }

    fn compare(&mut self, reg: u8, v: u8) {
        self.regs.p.set_if(C, reg >= v);
        self.regs.p.update_nz(reg.wrapping_sub(v));
    }

    fn adc(&mut self, v: u8) -> Result<(), CpuError> {
        let a = self.regs.a;
        let carry = u8::from(self.regs.p.is_set(C));
        if self.regs.p.is_set(D) {
            let da = self.from_bcd(a)?;
            let db = self.from_bcd(v)?;
            let sum = u16::from(da) + u16::from(db) + u16::from(carry);
            self.regs.p.set_if(C, sum > 99);
            // V reflects the binary add of the same operands
            let bin = u16::from(a) + u16::from(v) + u16::from(carry);
            let r = bin as u8;
            self.regs.p.set_if(V, (!(a ^ v) & (a ^ r) & 0x80) != 0);
            let result = Self::to_bcd((sum % 100) as u8);
            self.regs.a = result;
            self.regs.p.update_nz(result);
        } else {
            let sum = u16::from(a) + u16::from(v) + u16::from(carry);
            let r = sum as u8;
            self.regs.p.set_if(C, sum > 0xFF);
            self.regs.p.set_if(V, (!(a ^ v) & (a ^ r) & 0x80) != 0);
            self.regs.a = r;
            self.regs.p.update_nz(r);
        }
        Ok(())
    }

    fn sbc(&mut self, v: u8) -> Result<(), CpuError> {
        let a = self.regs.a;
        let borrow = u8::from(!self.regs.p.is_set(C));
        if self.regs.p.is_set(D) {
            let da = self.from_bcd(a)?;
            let db = self.from_bcd(v)?;
            let diff = 100 + i16::from(da) - i16::from(db) - i16::from(borrow);
            self.regs.p.set_if(C, i16::from(da) >= i16::from(db) + i16::from(borrow));
            let bin = i16::from(a) - i16::from(v) - i16::from(borrow);
            let r = bin as u8;
            self.regs.p.set_if(V, ((a ^ v) & (a ^ r) & 0x80) != 0);
            let result = Self::to_bcd((diff % 100) as u8);
            self.regs.a = result;
            self.regs.p.update_nz(result);
        } else {
            let diff = i16::from(a) - i16::from(v) - i16::from(borrow);
            let r = diff as u8;
            self.regs.p.set_if(C, diff >= 0);
            self.regs.p.set_if(V, ((a ^ v) & (a ^ r) & 0x80) != 0);
            self.regs.a = r;
            self.regs.p.update_nz(r);
        }
        Ok(())
    }

    fn from_bcd(&self, value: u8) -> Result<u8, CpuError> {
        let lo = value & 0x0F;
        let hi = value >> 4;
        if lo > 9 || hi > 9 {
            return Err(CpuError::InvalidBcd { value, pc: self.regs.pc });
        }
        Ok(hi * 10 + lo)
    }

    const fn to_bcd(value: u8) -> u8 {
        ((value / 10) << 4) | (value % 10)
    }

    fn asl_val(&mut self, v: u8) -> u8 {
        self.regs.p.set_if(C, v & 0x80 != 0);
        let r = v << 1;
        self.regs.p.update_nz(r);
        r
    }

    fn lsr_val(&mut self, v: u8) -> u8 {
        self.regs.p.set_if(C, v & 0x01 != 0);
        let r = v >> 1;
        self.regs.p.update_nz(r);
        r
    }

    fn rol_val(&mut self, v: u8) -> u8 {
        let carry_in = u8::from(self.regs.p.is_set(C));
        self.regs.p.set_if(C, v & 0x80 != 0);
        let r = (v << 1) | carry_in;
        self.regs.p.update_nz(r);
        r
    }

    fn ror_val(&mut self, v: u8) -> u8 {
        let carry_in = u8::from(self.regs.p.is_set(C)) << 7;
        self.regs.p.set_if(C, v & 0x01 != 0);
        let r = (v >> 1) | carry_in;
        self.regs.p.update_nz(r);
        r
    }

    fn inc_val(&mut self, v: u8) -> u8 {
        let r = v.wrapping_add(1);
        self.regs.p.update_nz(r);
        r
    }

    fn dec_val(&mut self, v: u8) -> u8 {
        let r = v.wrapping_sub(1);
        self.regs.p.update_nz(r);
        r
    }

    /// Read-modify-write at an address.
    fn rmw<Bu: Bus>(&mut self, bus: &mut Bu, addr: u16, f: fn(&mut Self, u8) -> u8) {
        let v = bus.read(addr);
        let r = f(self, v);
        bus.write(addr, r);
    }

    fn branch<Bu: Bus>(&mut self, bus: &mut Bu, taken: bool) {
        let offset = self.fetch8(bus) as i8;
        if taken {
            self.regs.pc = self.regs.pc.wrapping_add(offset as u16);
        }
    }

    /// BBR/BBS: test a zero-page bit, then branch.
    fn branch_on_zp_bit<Bu: Bus>(&mut self, bus: &mut Bu, bit: u8, set: bool) {
        let addr = self.zp(bus);
        let v = bus.read(addr);
        let taken = (v & (1 << bit) != 0) == set;
        self.branch(bus, taken);
    }

    /// RMB/SMB: clear or set a zero-page bit.
    fn modify_zp_bit<Bu: Bus>(&mut self, bus: &mut Bu, bit: u8, set: bool) {
        let addr = self.zp(bus);
        let v = bus.read(addr);
        let r = if set { v | (1 << bit) } else { v & !(1 << bit) };
        bus.write(addr, r);
    }

    fn tsb<Bu: Bus>(&mut self, bus: &mut Bu, addr: u16) {
        let v = bus.read(addr);
        self.regs.p.set_if(Z, self.regs.a & v == 0);
        bus.write(addr, v | self.regs.a);
    }

    fn trb<Bu: Bus>(&mut self, bus: &mut Bu, addr: u16) {
        let v = bus.read(addr);
        self.regs.p.set_if(Z, self.regs.a & v == 0);
        bus.write(addr, v & !self.regs.a);
    }

    // -----------------------------------------------------------------
    // Decode and execute
    // -----------------------------------------------------------------

    #[allow(clippy::too_many_lines)]
    fn step<Bu: Bus>(&mut self, bus: &mut Bu) -> Result<(), CpuError> {
        let op = self.fetch8(bus);
        match op {
            // BRK
            0x00 => {
                let _ = self.fetch8(bus); // signature byte
                let pc = self.regs.pc;
                self.push8(bus, (pc >> 8) as u8);
                self.push8(bus, pc as u8);
                let p = self.regs.p.to_byte_brk();
                self.push8(bus, p);
                self.regs.p.set(I);
                self.regs.p.clear(D);
                self.regs.pc = self.peek16(bus, 0xFFFE);
            }

            // ORA
            0x01 => { let a = self.izx(bus); let v = bus.read(a); self.ora(v); }
            0x05 => { let a = self.zp(bus); let v = bus.read(a); self.ora(v); }
            0x09 => { let v = self.fetch8(bus); self.ora(v); }
            0x0D => { let a = self.abs(bus); let v = bus.read(a); self.ora(v); }
            0x11 => { let a = self.izy(bus); let v = bus.read(a); self.ora(v); }
            0x12 => { let a = self.izp(bus); let v = bus.read(a); self.ora(v); }
            0x15 => { let a = self.zpx(bus); let v = bus.read(a); self.ora(v); }
            0x19 => { let a = self.aby(bus); let v = bus.read(a); self.ora(v); }
            0x1D => { let a = self.abx(bus); let v = bus.read(a); self.ora(v); }

            // ASL
            0x06 => { let a = self.zp(bus); self.rmw(bus, a, Self::asl_val); }
            0x0A => { self.regs.a = self.asl_val(self.regs.a); }
            0x0E => { let a = self.abs(bus); self.rmw(bus, a, Self::asl_val); }
            0x16 => { let a = self.zpx(bus); self.rmw(bus, a, Self::asl_val); }
            0x1E => { let a = self.abx(bus); self.rmw(bus, a, Self::asl_val); }

            // TSB / TRB (65C02)
            0x04 => { let a = self.zp(bus); self.tsb(bus, a); }
            0x0C => { let a = self.abs(bus); self.tsb(bus, a); }
            0x14 => { let a = self.zp(bus); self.trb(bus, a); }
            0x1C => { let a = self.abs(bus); self.trb(bus, a); }

            // Stack pushes and pulls
            0x08 => { let p = self.regs.p.to_byte_brk(); self.push8(bus, p); }
            0x28 => { let v = self.pop8(bus); self.regs.p = Status::from_byte(v & !B); }
            0x48 => { let a = self.regs.a; self.push8(bus, a); }
            0x68 => { let v = self.pop8(bus); self.lda(v); }
            0x5A => { let y = self.regs.y; self.push8(bus, y); }
            0x7A => { let v = self.pop8(bus); self.ldy(v); }
            0xDA => { let x = self.regs.x; self.push8(bus, x); }
            0xFA => { let v = self.pop8(bus); self.ldx(v); }

            // Branches
            0x10 => { let t = !self.regs.p.is_set(N); self.branch(bus, t); }
            0x30 => { let t = self.regs.p.is_set(N); self.branch(bus, t); }
            0x50 => { let t = !self.regs.p.is_set(V); self.branch(bus, t); }
            0x70 => { let t = self.regs.p.is_set(V); self.branch(bus, t); }
            0x90 => { let t = !self.regs.p.is_set(C); self.branch(bus, t); }
            0xB0 => { let t = self.regs.p.is_set(C); self.branch(bus, t); }
            0xD0 => { let t = !self.regs.p.is_set(Z); self.branch(bus, t); }
            0xF0 => { let t = self.regs.p.is_set(Z); self.branch(bus, t); }
            0x80 => { self.branch(bus, true); } // BRA

            // Flag operations
            0x18 => self.regs.p.clear(C),
            0x38 => self.regs.p.set(C),
            0x58 => self.regs.p.clear(I),
            0x78 => self.regs.p.set(I),
            0xB8 => self.regs.p.clear(V),
            0xD8 => self.regs.p.clear(D),
            0xF8 => self.regs.p.set(D),

            // JSR / RTS / RTI / JMP
            0x20 => {
                let target = self.fetch16(bus);
                let ret = self.regs.pc.wrapping_sub(1);
                self.push8(bus, (ret >> 8) as u8);
                self.push8(bus, ret as u8);
                self.regs.pc = target;
            }
            0x60 => {
                let lo = self.pop8(bus);
                let hi = self.pop8(bus);
                self.regs.pc = (u16::from(lo) | (u16::from(hi) << 8)).wrapping_add(1);
            }
            0x40 => {
                let p = self.pop8(bus);
                self.regs.p = Status::from_byte(p & !B);
                let lo = self.pop8(bus);
                let hi = self.pop8(bus);
                self.regs.pc = u16::from(lo) | (u16::from(hi) << 8);
            }
            0x4C => { self.regs.pc = self.fetch16(bus); }
            0x6C => {
                // 65C02: indirect JMP reads correctly across page boundaries
                let ptr = self.fetch16(bus);
                self.regs.pc = self.peek16(bus, ptr);
            }
            0x7C => {
                let ptr = self.fetch16(bus).wrapping_add(u16::from(self.regs.x));
                self.regs.pc = self.peek16(bus, ptr);
            }

            // AND
            0x21 => { let a = self.izx(bus); let v = bus.read(a); self.and(v); }
            0x25 => { let a = self.zp(bus); let v = bus.read(a); self.and(v); }
            0x29 => { let v = self.fetch8(bus); self.and(v); }
            0x2D => { let a = self.abs(bus); let v = bus.read(a); self.and(v); }
            0x31 => { let a = self.izy(bus); let v = bus.read(a); self.and(v); }
            0x32 => { let a = self.izp(bus); let v = bus.read(a); self.and(v); }
            0x35 => { let a = self.zpx(bus); let v = bus.read(a); self.and(v); }
            0x39 => { let a = self.aby(bus); let v = bus.read(a); self.and(v); }
            0x3D => { let a = self.abx(bus); let v = bus.read(a); self.and(v); }

            // BIT
            0x24 => { let a = self.zp(bus); let v = bus.read(a); self.bit(v); }
            0x2C => { let a = self.abs(bus); let v = bus.read(a); self.bit(v); }
            0x34 => { let a = self.zpx(bus); let v = bus.read(a); self.bit(v); }
            0x3C => { let a = self.abx(bus); let v = bus.read(a); self.bit(v); }
            0x89 => { let v = self.fetch8(bus); self.bit_imm(v); }

            // ROL
            0x26 => { let a = self.zp(bus); self.rmw(bus, a, Self::rol_val); }
            0x2A => { self.regs.a = self.rol_val(self.regs.a); }
            0x2E => { let a = self.abs(bus); self.rmw(bus, a, Self::rol_val); }
            0x36 => { let a = self.zpx(bus); self.rmw(bus, a, Self::rol_val); }
            0x3E => { let a = self.abx(bus); self.rmw(bus, a, Self::rol_val); }

            // EOR
            0x41 => { let a = self.izx(bus); let v = bus.read(a); self.eor(v); }
            0x45 => { let a = self.zp(bus); let v = bus.read(a); self.eor(v); }
            0x49 => { let v = self.fetch8(bus); self.eor(v); }
            0x4D => { let a = self.abs(bus); let v = bus.read(a); self.eor(v); }
            0x51 => { let a = self.izy(bus); let v = bus.read(a); self.eor(v); }
            0x52 => { let a = self.izp(bus); let v = bus.read(a); self.eor(v); }
            0x55 => { let a = self.zpx(bus); let v = bus.read(a); self.eor(v); }
            0x59 => { let a = self.aby(bus); let v = bus.read(a); self.eor(v); }
            0x5D => { let a = self.abx(bus); let v = bus.read(a); self.eor(v); }

            // LSR
            0x46 => { let a = self.zp(bus); self.rmw(bus, a, Self::lsr_val); }
            0x4A => { self.regs.a = self.lsr_val(self.regs.a); }
            0x4E => { let a = self.abs(bus); self.rmw(bus, a, Self::lsr_val); }
            0x56 => { let a = self.zpx(bus); self.rmw(bus, a, Self::lsr_val); }
            0x5E => { let a = self.abx(bus); self.rmw(bus, a, Self::lsr_val); }

            // ADC
            0x61 => { let a = self.izx(bus); let v = bus.read(a); self.adc(v)?; }
            0x65 => { let a = self.zp(bus); let v = bus.read(a); self.adc(v)?; }
            0x69 => { let v = self.fetch8(bus); self.adc(v)?; }
            0x6D => { let a = self.abs(bus); let v = bus.read(a); self.adc(v)?; }
            0x71 => { let a = self.izy(bus); let v = bus.read(a); self.adc(v)?; }
            0x72 => { let a = self.izp(bus); let v = bus.read(a); self.adc(v)?; }
            0x75 => { let a = self.zpx(bus); let v = bus.read(a); self.adc(v)?; }
            0x79 => { let a = self.aby(bus); let v = bus.read(a); self.adc(v)?; }
            0x7D => { let a = self.abx(bus); let v = bus.read(a); self.adc(v)?; }

            // ROR
            0x66 => { let a = self.zp(bus); self.rmw(bus, a, Self::ror_val); }
            0x6A => { self.regs.a = self.ror_val(self.regs.a); }
            0x6E => { let a = self.abs(bus); self.rmw(bus, a, Self::ror_val); }
            0x76 => { let a = self.zpx(bus); self.rmw(bus, a, Self::ror_val); }
            0x7E => { let a = self.abx(bus); self.rmw(bus, a, Self::ror_val); }

            // Stores
            0x81 => { let a = self.izx(bus); bus.write(a, self.regs.a); }
            0x84 => { let a = self.zp(bus); bus.write(a, self.regs.y); }
            0x85 => { let a = self.zp(bus); bus.write(a, self.regs.a); }
            0x86 => { let a = self.zp(bus); bus.write(a, self.regs.x); }
            0x8C => { let a = self.abs(bus); bus.write(a, self.regs.y); }
            0x8D => { let a = self.abs(bus); bus.write(a, self.regs.a); }
            0x8E => { let a = self.abs(bus); bus.write(a, self.regs.x); }
            0x91 => { let a = self.izy(bus); bus.write(a, self.regs.a); }
            0x92 => { let a = self.izp(bus); bus.write(a, self.regs.a); }
            0x94 => { let a = self.zpx(bus); bus.write(a, self.regs.y); }
            0x95 => { let a = self.zpx(bus); bus.write(a, self.regs.a); }
            0x96 => { let a = self.zpy(bus); bus.write(a, self.regs.x); }
            0x99 => { let a = self.aby(bus); bus.write(a, self.regs.a); }
            0x9D => { let a = self.abx(bus); bus.write(a, self.regs.a); }

            // STZ (65C02)
            0x64 => { let a = self.zp(bus); bus.write(a, 0); }
            0x74 => { let a = self.zpx(bus); bus.write(a, 0); }
            0x9C => { let a = self.abs(bus); bus.write(a, 0); }
            0x9E => { let a = self.abx(bus); bus.write(a, 0); }

            // Transfers
            0x8A => { let v = self.regs.x; self.lda(v); }
            0x98 => { let v = self.regs.y; self.lda(v); }
            0x9A => { self.regs.s = self.regs.x; }
            0xA8 => { let v = self.regs.a; self.ldy(v); }
            0xAA => { let v = self.regs.a; self.ldx(v); }
            0xBA => { let v = self.regs.s; self.ldx(v); }

            // Loads
            0xA0 => { let v = self.fetch8(bus); self.ldy(v); }
            0xA1 => { let a = self.izx(bus); let v = bus.read(a); self.lda(v); }
            0xA2 => { let v = self.fetch8(bus); self.ldx(v); }
            0xA4 => { let a = self.zp(bus); let v = bus.read(a); self.ldy(v); }
            0xA5 => { let a = self.zp(bus); let v = bus.read(a); self.lda(v); }
            0xA6 => { let a = self.zp(bus); let v = bus.read(a); self.ldx(v); }
            0xA9 => { let v = self.fetch8(bus); self.lda(v); }
            0xAC => { let a = self.abs(bus); let v = bus.read(a); self.ldy(v); }
            0xAD => { let a = self.abs(bus); let v = bus.read(a); self.lda(v); }
            0xAE => { let a = self.abs(bus); let v = bus.read(a); self.ldx(v); }
            0xB1 => { let a = self.izy(bus); let v = bus.read(a); self.lda(v); }
            0xB2 => { let a = self.izp(bus); let v = bus.read(a); self.lda(v); }
            0xB4 => { let a = self.zpx(bus); let v = bus.read(a); self.ldy(v); }
            0xB5 => { let a = self.zpx(bus); let v = bus.read(a); self.lda(v); }
            0xB6 => { let a = self.zpy(bus); let v = bus.read(a); self.ldx(v); }
            0xB9 => { let a = self.aby(bus); let v = bus.read(a); self.lda(v); }
            0xBC => { let a = self.abx(bus); let v = bus.read(a); self.ldy(v); }
            0xBD => { let a = self.abx(bus); let v = bus.read(a); self.lda(v); }
            0xBE => { let a = self.aby(bus); let v = bus.read(a); self.ldx(v); }

            // Compares
            0xC0 => { let v = self.fetch8(bus); self.compare(self.regs.y, v); }
            0xC1 => { let a = self.izx(bus); let v = bus.read(a); self.compare(self.regs.a, v); }
            0xC4 => { let a = self.zp(bus); let v = bus.read(a); self.compare(self.regs.y, v); }
            0xC5 => { let a = self.zp(bus); let v = bus.read(a); self.compare(self.regs.a, v); }
            0xC9 => { let v = self.fetch8(bus); self.compare(self.regs.a, v); }
            0xCC => { let a = self.abs(bus); let v = bus.read(a); self.compare(self.regs.y, v); }
            0xCD => { let a = self.abs(bus); let v = bus.read(a); self.compare(self.regs.a, v); }
            0xD1 => { let a = self.izy(bus); let v = bus.read(a); self.compare(self.regs.a, v); }
            0xD2 => { let a = self.izp(bus); let v = bus.read(a); self.compare(self.regs.a, v); }
            0xD5 => { let a = self.zpx(bus); let v = bus.read(a); self.compare(self.regs.a, v); }
            0xD9 => { let a = self.aby(bus); let v = bus.read(a); self.compare(self.regs.a, v); }
            0xDD => { let a = self.abx(bus); let v = bus.read(a); self.compare(self.regs.a, v); }
            0xE0 => { let v = self.fetch8(bus); self.compare(self.regs.x, v); }
            0xE4 => { let a = self.zp(bus); let v = bus.read(a); self.compare(self.regs.x, v); }
            0xEC => { let a = self.abs(bus); let v = bus.read(a); self.compare(self.regs.x, v); }

            // DEC / INC
            0xC6 => { let a = self.zp(bus); self.rmw(bus, a, Self::dec_val); }
            0xCE => { let a = self.abs(bus); self.rmw(bus, a, Self::dec_val); }
            0xD6 => { let a = self.zpx(bus); self.rmw(bus, a, Self::dec_val); }
            0xDE => { let a = self.abx(bus); self.rmw(bus, a, Self::dec_val); }
            0xE6 => { let a = self.zp(bus); self.rmw(bus, a, Self::inc_val); }
            0xEE => { let a = self.abs(bus); self.rmw(bus, a, Self::inc_val); }
            0xF6 => { let a = self.zpx(bus); self.rmw(bus, a, Self::inc_val); }
            0xFE => { let a = self.abx(bus); self.rmw(bus, a, Self::inc_val); }
            0x1A => { self.regs.a = self.inc_val(self.regs.a); } // INC A
            0x3A => { self.regs.a = self.dec_val(self.regs.a); } // DEC A
            0x88 => { self.regs.y = self.dec_val(self.regs.y); }
            0xC8 => { self.regs.y = self.inc_val(self.regs.y); }
            0xCA => { self.regs.x = self.dec_val(self.regs.x); }
            0xE8 => { self.regs.x = self.inc_val(self.regs.x); }

            // SBC
            0xE1 => { let a = self.izx(bus); let v = bus.read(a); self.sbc(v)?; }
            0xE5 => { let a = self.zp(bus); let v = bus.read(a); self.sbc(v)?; }
            0xE9 => { let v = self.fetch8(bus); self.sbc(v)?; }
            0xED => { let a = self.abs(bus); let v = bus.read(a); self.sbc(v)?; }
            0xF1 => { let a = self.izy(bus); let v = bus.read(a); self.sbc(v)?; }
            0xF2 => { let a = self.izp(bus); let v = bus.read(a); self.sbc(v)?; }
            0xF5 => { let a = self.zpx(bus); let v = bus.read(a); self.sbc(v)?; }
            0xF9 => { let a = self.aby(bus); let v = bus.read(a); self.sbc(v)?; }
            0xFD => { let a = self.abx(bus); let v = bus.read(a); self.sbc(v)?; }

            // RMB0-7 / SMB0-7 (65C02 Rockwell extensions)
            0x07 | 0x17 | 0x27 | 0x37 | 0x47 | 0x57 | 0x67 | 0x77 => {
                self.modify_zp_bit(bus, op >> 4, false);
            }
            0x87 | 0x97 | 0xA7 | 0xB7 | 0xC7 | 0xD7 | 0xE7 | 0xF7 => {
                self.modify_zp_bit(bus, (op >> 4) & 0x07, true);
            }

            // BBR0-7 / BBS0-7
            0x0F | 0x1F | 0x2F | 0x3F | 0x4F | 0x5F | 0x6F | 0x7F => {
                self.branch_on_zp_bit(bus, op >> 4, false);
            }
            0x8F | 0x9F | 0xAF | 0xBF | 0xCF | 0xDF | 0xEF | 0xFF => {
                self.branch_on_zp_bit(bus, (op >> 4) & 0x07, true);
            }

            // WAI / STP
            0xCB => { self.waiting = true; }
            0xDB => { self.stopped = true; }

            // NOP
            0xEA => {}

            // Undefined slots: 65C02 multi-byte NOPs of documented length
            0x02 | 0x22 | 0x42 | 0x62 | 0x82 | 0xC2 | 0xE2 => {
                let _ = self.fetch8(bus);
            }
            0x44 | 0x54 | 0xD4 | 0xF4 => {
                let _ = self.fetch8(bus);
            }
            0x5C | 0xDC | 0xFC => {
                let _ = self.fetch16(bus);
            }
            // Single-byte, single-cycle NOPs (x3/xB columns)
            _ => {}
        }
        Ok(())
    }
}
