//! Memory spaces addressable by the DMA and blitter engines.
//!
//! A `SpaceView` borrows the bus-owned planes for the duration of one
//! `advance_cycles` call; the engines never hold references across calls.

use crate::vgc::Vgc;
use crate::xmc::Xmc;

/// Space selectors shared by DMA and blitter registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemSpace {
    CpuRam = 0,
    VgcChar = 1,
    VgcColor = 2,
    VgcGfx = 3,
    VgcSprite = 4,
    Xram = 5,
}

impl MemSpace {
    /// Decode a space selector register value.
    #[must_use]
    pub fn from_reg(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::CpuRam),
            1 => Some(Self::VgcChar),
            2 => Some(Self::VgcColor),
            3 => Some(Self::VgcGfx),
            4 => Some(Self::VgcSprite),
            5 => Some(Self::Xram),
            _ => None,
        }
    }
}

/// ROM body start: CPU RAM above this is not a writable DMA destination.
const ROM_BASE: usize = 0xC000;

/// Borrowed view over every DMA-addressable plane.
pub struct SpaceView<'a> {
    pub ram: &'a mut [u8],
    pub vgc: &'a mut Vgc,
    pub xmc: &'a mut Xmc,
}

impl SpaceView<'_> {
    /// Length of a space in bytes.
    #[must_use]
    pub fn len(&self, space: MemSpace) -> usize {
        match space {
            MemSpace::CpuRam => self.ram.len(),
            MemSpace::VgcChar => self.vgc.space_len(0),
            MemSpace::VgcColor => self.vgc.space_len(1),
            MemSpace::VgcGfx => self.vgc.space_len(2),
            MemSpace::VgcSprite => self.vgc.space_len(3),
            MemSpace::Xram => self.xmc.xram_len(),
        }
    }

    /// Read one byte, `None` past the end of the space.
    #[must_use]
    pub fn try_read(&self, space: MemSpace, offset: usize) -> Option<u8> {
        match space {
            MemSpace::CpuRam => self.ram.get(offset).copied(),
            MemSpace::VgcChar => self.vgc.space_read(0, offset),
            MemSpace::VgcColor => self.vgc.space_read(1, offset),
            MemSpace::VgcGfx => self.vgc.space_read(2, offset),
            MemSpace::VgcSprite => self.vgc.space_read(3, offset),
            MemSpace::Xram => self.xmc.xram_read(offset),
        }
    }

    /// Write one byte; false past the end or into a protected range.
    pub fn try_write(&mut self, space: MemSpace, offset: usize, value: u8) -> bool {
        match space {
            MemSpace::CpuRam => {
                if offset >= ROM_BASE {
                    return false;
                }
                if let Some(slot) = self.ram.get_mut(offset) {
                    *slot = value;
                    true
                } else {
                    false
                }
            }
            MemSpace::VgcChar => self.vgc.space_write(0, offset, value),
            MemSpace::VgcColor => self.vgc.space_write(1, offset, value),
            MemSpace::VgcGfx => self.vgc.space_write(2, offset, value),
            MemSpace::VgcSprite => self.vgc.space_write(3, offset, value),
            MemSpace::Xram => self.xmc.xram_write(offset, value),
        }
    }

    /// True when `[offset, offset + len)` is a writable run of the space.
    #[must_use]
    pub fn can_write_range(&self, space: MemSpace, offset: usize, len: usize) -> bool {
        let Some(end) = offset.checked_add(len) else {
            return false;
        };
        match space {
            MemSpace::CpuRam => end <= ROM_BASE,
            _ => end <= self.len(space),
        }
    }
}
