//! Rectangular blitter.
//!
//! Copies or fills a width x height rectangle between memory spaces with
//! independent source and destination strides, an optional fill mode and an
//! optional colour key that skips matching source bytes. When source and
//! destination share a space, each row is buffered in full before any byte
//! is written, so overlapping blits behave as if the copy were atomic per
//! row. Progress is credit-based like the DMA engine: one cell per cycle.
//!
//! # Registers ($BA80-$BA9F)
//!
//! | Addr  | Register        |
//! |-------|-----------------|
//! | $BA80 | Cmd (1 = start) |
//! | $BA81 | Status          |
//! | $BA82 | ErrCode         |
//! | $BA83 | Mode (bit 0 fill, bit 1 colour key) |
//! | $BA84 | Source space    |
//! | $BA85 | Destination space |
//! | $BA86-$BA88 | Source address (24-bit LE) |
//! | $BA89-$BA8B | Destination address |
//! | $BA8C-$BA8D | Width  |
//! | $BA8E-$BA8F | Height |
//! | $BA90-$BA91 | Source stride |
//! | $BA92-$BA93 | Destination stride |
//! | $BA94 | Fill value      |
//! | $BA95 | Colour key      |
//! | $BA96-$BA98 | Count (read-only, cells written) |

#![allow(clippy::cast_possible_truncation)]

use nova_core::{CtrlStatus, ErrCode};

use crate::spaces::{MemSpace, SpaceView};

pub const BLT_BASE: u16 = 0xBA80;
pub const BLT_END: u16 = 0xBA9F;

/// Cells of work earned per CPU cycle.
const OPS_PER_CYCLE: u64 = 1;

/// The blitter engine.
pub struct Blitter {
    status: CtrlStatus,
    err: ErrCode,
    mode: u8,
    src_space: u8,
    dst_space: u8,
    src_addr: u32,
    dst_addr: u32,
    width: u16,
    height: u16,
    src_stride: u16,
    dst_stride: u16,
    fill_value: u8,
    colour_key: u8,

    // Active blit state
    busy: bool,
    fill: bool,
    keyed: bool,
    src: MemSpace,
    dst: MemSpace,
    row: u16,
    col: u16,
    wrote: u32,
    credit: u64,
    /// Same-space blits stage each source row here before writing.
    row_buf: Vec<u8>,
    row_buffered: bool,
}

impl Blitter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: CtrlStatus::Idle,
            err: ErrCode::None,
            mode: 0,
            src_space: 0,
            dst_space: 0,
            src_addr: 0,
            dst_addr: 0,
            width: 0,
            height: 0,
            src_stride: 0,
            dst_stride: 0,
            fill_value: 0,
            colour_key: 0,
            busy: false,
            fill: false,
            keyed: false,
            src: MemSpace::CpuRam,
            dst: MemSpace::CpuRam,
            row: 0,
            col: 0,
            wrote: 0,
            credit: 0,
            row_buf: Vec::new(),
            row_buffered: false,
        }
    }

    #[must_use]
    pub fn owns(addr: u16) -> bool {
        (BLT_BASE..=BLT_END).contains(&addr)
    }

    #[must_use]
    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xBA81 => self.status.as_u8(),
            0xBA82 => self.err.as_u8(),
            0xBA83 => self.mode,
            0xBA84 => self.src_space,
            0xBA85 => self.dst_space,
            0xBA86 => self.src_addr as u8,
            0xBA87 => (self.src_addr >> 8) as u8,
            0xBA88 => (self.src_addr >> 16) as u8,
            0xBA89 => self.dst_addr as u8,
            0xBA8A => (self.dst_addr >> 8) as u8,
            0xBA8B => (self.dst_addr >> 16) as u8,
            0xBA8C => self.width as u8,
            0xBA8D => (self.width >> 8) as u8,
            0xBA8E => self.height as u8,
            0xBA8F => (self.height >> 8) as u8,
            0xBA90 => self.src_stride as u8,
            0xBA91 => (self.src_stride >> 8) as u8,
            0xBA92 => self.dst_stride as u8,
            0xBA93 => (self.dst_stride >> 8) as u8,
            0xBA94 => self.fill_value,
            0xBA95 => self.colour_key,
            0xBA96 => self.wrote as u8,
            0xBA97 => (self.wrote >> 8) as u8,
            0xBA98 => (self.wrote >> 16) as u8,
            _ => 0,
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0xBA83 => self.mode = value,
            0xBA84 => self.src_space = value,
            0xBA85 => self.dst_space = value,
            0xBA86 => self.src_addr = (self.src_addr & 0xFF_FF00) | u32::from(value),
            0xBA87 => self.src_addr = (self.src_addr & 0xFF_00FF) | (u32::from(value) << 8),
            0xBA88 => self.src_addr = (self.src_addr & 0x00_FFFF) | (u32::from(value) << 16),
            0xBA89 => self.dst_addr = (self.dst_addr & 0xFF_FF00) | u32::from(value),
            0xBA8A => self.dst_addr = (self.dst_addr & 0xFF_00FF) | (u32::from(value) << 8),
            0xBA8B => self.dst_addr = (self.dst_addr & 0x00_FFFF) | (u32::from(value) << 16),
            0xBA8C => self.width = (self.width & 0xFF00) | u16::from(value),
            0xBA8D => self.width = (self.width & 0x00FF) | (u16::from(value) << 8),
            0xBA8E => self.height = (self.height & 0xFF00) | u16::from(value),
            0xBA8F => self.height = (self.height & 0x00FF) | (u16::from(value) << 8),
            0xBA90 => self.src_stride = (self.src_stride & 0xFF00) | u16::from(value),
            0xBA91 => self.src_stride = (self.src_stride & 0x00FF) | (u16::from(value) << 8),
            0xBA92 => self.dst_stride = (self.dst_stride & 0xFF00) | u16::from(value),
            0xBA93 => self.dst_stride = (self.dst_stride & 0x00FF) | (u16::from(value) << 8),
            0xBA94 => self.fill_value = value,
            0xBA95 => self.colour_key = value,
            _ => {}
        }
    }

    fn fail(&mut self, err: ErrCode) {
        self.status = CtrlStatus::Error;
        self.err = err;
    }

    fn src_row_base(&self, row: u16) -> usize {
        self.src_addr as usize + row as usize * self.src_stride as usize
    }

    fn dst_row_base(&self, row: u16) -> usize {
        self.dst_addr as usize + row as usize * self.dst_stride as usize
    }

    /// Command register write: validate the whole rectangle and start.
    pub fn write_cmd(&mut self, value: u8, view: &SpaceView<'_>) {
        if value != 1 {
            self.fail(ErrCode::BadCmd);
            return;
        }
        if self.busy {
            self.err = ErrCode::BadCmd;
            return;
        }

        self.err = ErrCode::None;
        self.wrote = 0;

        let Some(dst) = MemSpace::from_reg(self.dst_space) else {
            self.fail(ErrCode::BadSpace);
            return;
        };
        let fill = self.mode & 0x01 != 0;
        let keyed = self.mode & 0x02 != 0;
        let src = if fill {
            dst
        } else {
            match MemSpace::from_reg(self.src_space) {
                Some(s) => s,
                None => {
                    self.fail(ErrCode::BadSpace);
                    return;
                }
            }
        };

        let (w, h) = (self.width as usize, self.height as usize);
        if w == 0 || h == 0 {
            self.fail(ErrCode::BadArgs);
            return;
        }
        if view.len(dst) == 0 || (!fill && view.len(src) == 0) {
            self.fail(ErrCode::BadSpace);
            return;
        }

        // Every row must fit its space and every destination row must be
        // writable before any byte moves.
        for row in 0..self.height {
            if !fill && self.src_row_base(row) + w > view.len(src) {
                self.fail(ErrCode::Range);
                return;
            }
            let dst_base = self.dst_row_base(row);
            if dst_base + w > view.len(dst) {
                self.fail(ErrCode::Range);
                return;
            }
            if !view.can_write_range(dst, dst_base, w) {
                self.fail(ErrCode::WriteProtected);
                return;
            }
        }

        self.busy = true;
        self.fill = fill;
        self.keyed = keyed;
        self.src = src;
        self.dst = dst;
        self.row = 0;
        self.col = 0;
        self.credit = 0;
        self.row_buf = vec![0; w];
        self.row_buffered = false;
        self.status = CtrlStatus::Busy;
    }

    /// Make progress with `cycles` worth of cell credit.
    pub fn advance_cycles(&mut self, cycles: u64, view: &mut SpaceView<'_>) -> bool {
        if !self.busy {
            return false;
        }
        self.credit += cycles * OPS_PER_CYCLE;

        while self.credit > 0 && self.row < self.height {
            // Same-space copies read the whole source row up front so an
            // overlapping destination cannot corrupt later source bytes.
            if !self.fill && self.src == self.dst && !self.row_buffered {
                let base = self.src_row_base(self.row);
                for (i, slot) in self.row_buf.iter_mut().enumerate() {
                    match view.try_read(self.src, base + i) {
                        Some(v) => *slot = v,
                        None => {
                            self.busy = false;
                            self.fail(ErrCode::Range);
                            return false;
                        }
                    }
                }
                self.row_buffered = true;
            }

            let value = if self.fill {
                self.fill_value
            } else if self.row_buffered {
                self.row_buf[self.col as usize]
            } else {
                let offset = self.src_row_base(self.row) + self.col as usize;
                match view.try_read(self.src, offset) {
                    Some(v) => v,
                    None => {
                        self.busy = false;
                        self.fail(ErrCode::Range);
                        return false;
                    }
                }
            };

            let skip = self.keyed && !self.fill && value == self.colour_key;
            if !skip {
                let offset = self.dst_row_base(self.row) + self.col as usize;
                if !view.try_write(self.dst, offset, value) {
                    self.busy = false;
                    self.fail(ErrCode::WriteProtected);
                    return false;
                }
                self.wrote += 1;
            }

            self.credit -= 1;
            self.col += 1;
            if self.col >= self.width {
                self.col = 0;
                self.row += 1;
                self.row_buffered = false;
            }
        }

        if self.row >= self.height {
            self.busy = false;
            self.credit = 0;
            self.status = CtrlStatus::Ok;
            return true;
        }
        false
    }

    /// Destination space of the last started blit.
    #[must_use]
    pub fn dst_space(&self) -> MemSpace {
        self.dst
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    #[must_use]
    pub fn status(&self) -> CtrlStatus {
        self.status
    }

    #[must_use]
    pub fn err(&self) -> ErrCode {
        self.err
    }
}

impl Default for Blitter {
    fn default() -> Self {
        Self::new()
    }
}
