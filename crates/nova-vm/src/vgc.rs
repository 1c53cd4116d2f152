//! Video/graphics controller (VGC).
//!
//! A register file at $A000 with a command engine, an 80x25 text plane with
//! console semantics on the character-out register, a 320x200 bitmap, 16
//! sprites over a shared shape arena, and the raster coprocessor. The
//! renderer lives outside the core; the VGC owns all state it reads.
//!
//! # Core registers ($A000-$A01F)
//!
//! | Addr  | Register    |
//! |-------|-------------|
//! | $A000 | Mode        |
//! | $A001 | BgCol       |
//! | $A002 | FgCol       |
//! | $A003 | CursorX     |
//! | $A004 | CursorY     |
//! | $A005 | ScrollX     |
//! | $A006 | ScrollY     |
//! | $A007 | Status      |
//! | $A008 | SpriteCount (read-only) |
//! | $A009 | CursorCtl   |
//! | $A00A | CollSpr (read-and-clear) |
//! | $A00B | CollBg (read-and-clear)  |
//! | $A00C | Border      |
//! | $A00D | CharOut     |
//! | $A00E | CharIn      |
//! | $A00F | GColor      |
//! | $A010 | Cmd         |
//! | $A011-$A01E | P0-P13 |
//! | $A01F | IrqCtl (bit 0 = raster IRQ enable) |

#![allow(clippy::cast_possible_truncation)]

use std::collections::VecDeque;

use crate::copper::Copper;
use crate::draw::{self, GFX_BYTES};
use crate::sprites::{
    SHAPE_BYTES, SPRITE_COUNT, SPRITE_REGS_BASE, SPRITE_REGS_END, Sprite, SpriteShapes,
};

/// Text plane dimensions.
pub const TEXT_COLS: usize = 80;
pub const TEXT_ROWS: usize = 25;
pub const TEXT_BYTES: usize = TEXT_COLS * TEXT_ROWS;

/// Register addresses.
pub const VGC_BASE: u16 = 0xA000;
pub const VGC_END: u16 = 0xA01F;
pub const CHAR_RAM_BASE: u16 = 0xAA00;
pub const CHAR_RAM_END: u16 = 0xB1CF;
pub const COLOR_RAM_BASE: u16 = 0xB1D0;
pub const COLOR_RAM_END: u16 = 0xB99F;

const REG_MODE: u16 = 0xA000;
const REG_BG: u16 = 0xA001;
const REG_FG: u16 = 0xA002;
const REG_CURSOR_X: u16 = 0xA003;
const REG_CURSOR_Y: u16 = 0xA004;
const REG_SCROLL_X: u16 = 0xA005;
const REG_SCROLL_Y: u16 = 0xA006;
const REG_STATUS: u16 = 0xA007;
const REG_SPRITE_COUNT: u16 = 0xA008;
const REG_CURSOR_CTL: u16 = 0xA009;
const REG_COLL_SPR: u16 = 0xA00A;
const REG_COLL_BG: u16 = 0xA00B;
const REG_BORDER: u16 = 0xA00C;
const REG_CHAR_OUT: u16 = 0xA00D;
const REG_CHAR_IN: u16 = 0xA00E;
const REG_GCOLOR: u16 = 0xA00F;
const REG_CMD: u16 = 0xA010;
const REG_P0: u16 = 0xA011;
const REG_IRQ_CTL: u16 = 0xA01F;

/// Command codes written to `REG_CMD`.
mod cmd {
    pub const PLOT: u8 = 1;
    pub const UNPLOT: u8 = 2;
    pub const LINE: u8 = 3;
    pub const CIRCLE: u8 = 4;
    pub const RECT: u8 = 5;
    pub const FILL_RECT: u8 = 6;
    pub const FLOOD_FILL: u8 = 7;
    pub const GCLS: u8 = 8;
    pub const GCOLOR: u8 = 9;
    pub const SPRITE_DEFINE: u8 = 16;
    pub const SPRITE_ROW: u8 = 17;
    pub const SPRITE_CLEAR: u8 = 18;
    pub const SPRITE_COPY: u8 = 19;
    pub const SPRITE_POS: u8 = 20;
    pub const SPRITE_ENABLE: u8 = 21;
    pub const SPRITE_DISABLE: u8 = 22;
    pub const SPRITE_FLIP: u8 = 23;
    pub const SPRITE_PRIORITY: u8 = 24;
    pub const MEM_READ: u8 = 32;
    pub const MEM_WRITE: u8 = 33;
    pub const COPPER_ADD: u8 = 48;
    pub const COPPER_CLEAR: u8 = 49;
    pub const COPPER_ENABLE: u8 = 50;
    pub const COPPER_DISABLE: u8 = 51;
    pub const COPPER_LIST: u8 = 52;
    pub const COPPER_USE: u8 = 53;
    pub const COPPER_LIST_END: u8 = 54;
    pub const SYS_RESET: u8 = 255;
}

/// Console control codes recognised by `CharOut`.
const CH_BACKSPACE: u8 = 8;
const CH_LF: u8 = 10;
const CH_FF: u8 = 12;
const CH_CR: u8 = 13;
const CH_HOME: u8 = 19;

/// The video/graphics controller.
pub struct Vgc {
    // Core registers
    mode: u8,
    bg: u8,
    fg: u8,
    cursor_x: u8,
    cursor_y: u8,
    scroll_x: u8,
    scroll_y: u8,
    cursor_enabled: bool,
    border: u8,
    gcolor: u8,
    irq_ctl: u8,
    /// Bit 0: last command failed.
    status: u8,

    /// Command parameter latch (P0-P13).
    params: [u8; 14],

    /// 80x25 character plane.
    char_ram: Vec<u8>,
    /// 80x25 colour plane.
    color_ram: Vec<u8>,
    /// 320x200 bitmap, one colour index per pixel.
    gfx: Vec<u8>,

    /// Hardware sprites.
    sprites: [Sprite; SPRITE_COUNT],
    /// Shared shape arena.
    shapes: SpriteShapes,
    /// Raster coprocessor.
    pub copper: Copper,

    /// Collision masks, folded to 8 bits, read-and-clear.
    coll_sprite: u8,
    coll_bg: u8,

    /// Host keystrokes waiting behind `CharIn`.
    input: VecDeque<u8>,

    /// Set by the `SysReset` command, consumed by the bus.
    reset_requested: bool,

    /// Frame ticks seen.
    frames: u64,
}

impl Vgc {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: 0,
            bg: 0,
            fg: 1,
            cursor_x: 0,
            cursor_y: 0,
            scroll_x: 0,
            scroll_y: 0,
            cursor_enabled: true,
            border: 0,
            gcolor: 1,
            irq_ctl: 0,
            status: 0,
            params: [0; 14],
            char_ram: vec![0x20; TEXT_BYTES],
            color_ram: vec![1; TEXT_BYTES],
            gfx: vec![0; GFX_BYTES],
            sprites: [Sprite::default(); SPRITE_COUNT],
            shapes: SpriteShapes::new(),
            copper: Copper::new(),
            coll_sprite: 0,
            coll_bg: 0,
            input: VecDeque::new(),
            reset_requested: false,
            frames: 0,
        }
    }

    #[must_use]
    pub fn owns(addr: u16) -> bool {
        (VGC_BASE..=VGC_END).contains(&addr)
            || (SPRITE_REGS_BASE..=SPRITE_REGS_END).contains(&addr)
            || (CHAR_RAM_BASE..=CHAR_RAM_END).contains(&addr)
            || (COLOR_RAM_BASE..=COLOR_RAM_END).contains(&addr)
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        match addr {
            REG_MODE => self.mode,
            REG_BG => self.bg,
            REG_FG => self.fg,
            REG_CURSOR_X => self.cursor_x,
            REG_CURSOR_Y => self.cursor_y,
            REG_SCROLL_X => self.scroll_x,
            REG_SCROLL_Y => self.scroll_y,
            REG_STATUS => self.status,
            REG_SPRITE_COUNT => self.sprites.iter().filter(|s| s.enabled).count() as u8,
            REG_CURSOR_CTL => u8::from(self.cursor_enabled),
            REG_COLL_SPR => {
                let v = self.coll_sprite;
                self.coll_sprite = 0;
                v
            }
            REG_COLL_BG => {
                let v = self.coll_bg;
                self.coll_bg = 0;
                v
            }
            REG_BORDER => self.border,
            REG_CHAR_OUT => 0,
            REG_CHAR_IN => self.input.pop_front().unwrap_or(0),
            REG_GCOLOR => self.gcolor,
            REG_CMD => 0,
            REG_IRQ_CTL => self.irq_ctl,
            _ if (REG_P0..REG_IRQ_CTL).contains(&addr) => self.params[(addr - REG_P0) as usize],
            _ if (SPRITE_REGS_BASE..=SPRITE_REGS_END).contains(&addr) => {
                let offset = addr - SPRITE_REGS_BASE;
                self.sprites[(offset / 8) as usize].read_reg((offset % 8) as u8)
            }
            _ if (CHAR_RAM_BASE..=CHAR_RAM_END).contains(&addr) => {
                self.char_ram[(addr - CHAR_RAM_BASE) as usize]
            }
            _ if (COLOR_RAM_BASE..=COLOR_RAM_END).contains(&addr) => {
                self.color_ram[(addr - COLOR_RAM_BASE) as usize]
            }
            _ => 0,
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match addr {
            REG_MODE => self.mode = value & 0x01,
            REG_BG => self.bg = value,
            REG_FG => self.fg = value,
            REG_CURSOR_X => self.cursor_x = value.min(TEXT_COLS as u8 - 1),
            REG_CURSOR_Y => self.cursor_y = value.min(TEXT_ROWS as u8 - 1),
            REG_SCROLL_X => self.scroll_x = value,
            REG_SCROLL_Y => self.scroll_y = value,
            REG_CURSOR_CTL => self.cursor_enabled = value & 0x01 != 0,
            REG_BORDER => self.border = value,
            REG_CHAR_OUT => self.char_out(value),
            REG_GCOLOR => self.gcolor = value,
            REG_CMD => self.execute(value),
            REG_IRQ_CTL => self.irq_ctl = value,
            _ if (REG_P0..REG_IRQ_CTL).contains(&addr) => {
                self.params[(addr - REG_P0) as usize] = value;
            }
            _ if (SPRITE_REGS_BASE..=SPRITE_REGS_END).contains(&addr) => {
                let offset = addr - SPRITE_REGS_BASE;
                self.sprites[(offset / 8) as usize].write_reg((offset % 8) as u8, value);
            }
            _ if (CHAR_RAM_BASE..=CHAR_RAM_END).contains(&addr) => {
                self.char_ram[(addr - CHAR_RAM_BASE) as usize] = value;
                self.color_ram[(addr - CHAR_RAM_BASE) as usize] = self.fg;
            }
            _ if (COLOR_RAM_BASE..=COLOR_RAM_END).contains(&addr) => {
                self.color_ram[(addr - COLOR_RAM_BASE) as usize] = value;
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------
    // Console
    // -----------------------------------------------------------------

    fn char_out(&mut self, ch: u8) {
        match ch {
            CH_BACKSPACE => {
                if self.cursor_x > 0 {
                    self.cursor_x -= 1;
                } else if self.cursor_y > 0 {
                    self.cursor_y -= 1;
                    self.cursor_x = TEXT_COLS as u8 - 1;
                }
                self.put_char(self.cursor_x, self.cursor_y, 0x20);
            }
            CH_LF => {
                if self.cursor_y as usize + 1 >= TEXT_ROWS {
                    self.scroll_text_up();
                } else {
                    self.cursor_y += 1;
                }
            }
            CH_FF => {
                self.char_ram.fill(0x20);
                self.color_ram.fill(self.fg);
                self.cursor_x = 0;
                self.cursor_y = 0;
            }
            CH_CR => self.cursor_x = 0,
            CH_HOME => {
                self.cursor_x = 0;
                self.cursor_y = 0;
            }
            ch if ch >= 0x20 => {
                self.put_char(self.cursor_x, self.cursor_y, ch);
                self.cursor_x += 1;
                if self.cursor_x as usize >= TEXT_COLS {
                    self.cursor_x = 0;
                    if self.cursor_y as usize + 1 >= TEXT_ROWS {
                        self.scroll_text_up();
                    } else {
                        self.cursor_y += 1;
                    }
                }
            }
            _ => {}
        }
    }

    fn put_char(&mut self, x: u8, y: u8, ch: u8) {
        let idx = y as usize * TEXT_COLS + x as usize;
        self.char_ram[idx] = ch;
        self.color_ram[idx] = self.fg;
    }

    fn scroll_text_up(&mut self) {
        self.char_ram.copy_within(TEXT_COLS.., 0);
        self.color_ram.copy_within(TEXT_COLS.., 0);
        let last = TEXT_BYTES - TEXT_COLS;
        self.char_ram[last..].fill(0x20);
        self.color_ram[last..].fill(self.fg);
    }

    /// Queue a host keystroke behind `CharIn`.
    pub fn push_input(&mut self, ch: u8) {
        self.input.push_back(ch);
    }

    // -----------------------------------------------------------------
    // Command engine
    // -----------------------------------------------------------------

    fn param16(&self, idx: usize) -> u16 {
        u16::from(self.params[idx]) | (u16::from(self.params[idx + 1]) << 8)
    }

    fn param24(&self, idx: usize) -> u32 {
        u32::from(self.params[idx])
            | (u32::from(self.params[idx + 1]) << 8)
            | (u32::from(self.params[idx + 2]) << 16)
    }

    /// Execute a command. Graphics commands draw with the current `GColor`.
    ///
    /// Commands that need CPU RAM (`SpriteDefine`) receive it from the bus
    /// through `execute_with_ram`; the plain path sees zeroed RAM.
    fn execute(&mut self, code: u8) {
        let mut no_ram = [0u8; 0];
        self.execute_with_ram(code, &mut no_ram);
    }

    /// Command entry point used by the bus, with CPU RAM attached.
    pub fn execute_with_ram(&mut self, code: u8, ram: &mut [u8]) {
        self.status &= !0x01;
        let ok = self.dispatch(code, ram);
        if !ok {
            self.status |= 0x01;
        }
    }

    fn dispatch(&mut self, code: u8, ram: &mut [u8]) -> bool {
        let colour = self.gcolor;
        match code {
            cmd::PLOT => {
                let (x, y) = (self.param16(0) as i32, i32::from(self.params[2]));
                draw::plot(&mut self.gfx, x, y, colour);
            }
            cmd::UNPLOT => {
                let (x, y) = (self.param16(0) as i32, i32::from(self.params[2]));
                draw::plot(&mut self.gfx, x, y, 0);
            }
            cmd::LINE => {
                let (x0, y0) = (self.param16(0) as i32, i32::from(self.params[2]));
                let (x1, y1) = (self.param16(3) as i32, i32::from(self.params[5]));
                draw::line(&mut self.gfx, x0, y0, x1, y1, colour);
            }
            cmd::CIRCLE => {
                let (x, y) = (self.param16(0) as i32, i32::from(self.params[2]));
                let radius = i32::from(self.params[5]);
                draw::circle(&mut self.gfx, x, y, radius, colour);
            }
            cmd::RECT => {
                let (x0, y0) = (self.param16(0) as i32, i32::from(self.params[2]));
                let (x1, y1) = (self.param16(3) as i32, i32::from(self.params[5]));
                draw::rect(&mut self.gfx, x0, y0, x1, y1, colour);
            }
            cmd::FILL_RECT => {
                let (x0, y0) = (self.param16(0) as i32, i32::from(self.params[2]));
                let (x1, y1) = (self.param16(3) as i32, i32::from(self.params[5]));
                draw::fill_rect(&mut self.gfx, x0, y0, x1, y1, colour);
            }
            cmd::FLOOD_FILL => {
                let (x, y) = (self.param16(0) as i32, i32::from(self.params[2]));
                draw::flood_fill(&mut self.gfx, x, y, colour);
            }
            cmd::GCLS => self.gfx.fill(0),
            cmd::GCOLOR => self.gcolor = self.params[0],

            cmd::SPRITE_DEFINE => {
                let slot = self.params[0] as usize;
                let src = self.param16(1) as usize;
                if src + SHAPE_BYTES > ram.len() {
                    return false;
                }
                for row in 0..16 {
                    self.shapes
                        .write_row(slot, row, &ram[src + row * 8..src + row * 8 + 8]);
                }
            }
            cmd::SPRITE_ROW => {
                let slot = self.params[0] as usize;
                let row = self.params[1] as usize;
                let bytes: Vec<u8> = self.params[2..10].to_vec();
                self.shapes.write_row(slot, row, &bytes);
            }
            cmd::SPRITE_CLEAR => self.shapes.clear(self.params[0] as usize),
            cmd::SPRITE_COPY => {
                self.shapes
                    .copy_slot(self.params[0] as usize, self.params[1] as usize);
            }
            cmd::SPRITE_POS => {
                let i = self.params[0] as usize % SPRITE_COUNT;
                self.sprites[i].x = self.param16(1) & 0x01FF;
                self.sprites[i].y = self.params[3];
            }
            cmd::SPRITE_ENABLE => {
                self.sprites[self.params[0] as usize % SPRITE_COUNT].enabled = true;
            }
            cmd::SPRITE_DISABLE => {
                self.sprites[self.params[0] as usize % SPRITE_COUNT].enabled = false;
            }
            cmd::SPRITE_FLIP => {
                let i = self.params[0] as usize % SPRITE_COUNT;
                self.sprites[i].flip_x = self.params[1] != 0;
                self.sprites[i].flip_y = self.params[2] != 0;
            }
            cmd::SPRITE_PRIORITY => {
                let i = self.params[0] as usize % SPRITE_COUNT;
                self.sprites[i].priority = crate::sprites::SpritePriority::from_bits(self.params[1]);
            }

            cmd::MEM_READ => {
                let space = self.params[0];
                let offset = self.param24(1) as usize;
                match self.space_read(space, offset) {
                    Some(v) => self.params[4] = v,
                    None => return false,
                }
            }
            cmd::MEM_WRITE => {
                let space = self.params[0];
                let offset = self.param24(1) as usize;
                let value = self.params[4];
                if !self.space_write(space, offset, value) {
                    return false;
                }
            }

            cmd::COPPER_ADD => {
                let position = self.param24(0);
                self.copper.add(position, self.params[3], self.params[4]);
            }
            cmd::COPPER_CLEAR => self.copper.clear(),
            cmd::COPPER_ENABLE => self.copper.enabled = true,
            cmd::COPPER_DISABLE => self.copper.enabled = false,
            cmd::COPPER_LIST => self.copper.select_target(self.params[0]),
            cmd::COPPER_USE => self.copper.use_list(self.params[0]),
            cmd::COPPER_LIST_END => self.copper.list_end(),

            cmd::SYS_RESET => self.reset_requested = true,

            _ => return false,
        }
        true
    }

    /// Byte read from a VGC memory space (0 screen, 1 colour, 2 gfx,
    /// 3 sprite shapes).
    #[must_use]
    pub fn space_read(&self, space: u8, offset: usize) -> Option<u8> {
        match space {
            0 => self.char_ram.get(offset).copied(),
            1 => self.color_ram.get(offset).copied(),
            2 => self.gfx.get(offset).copied(),
            3 => self.shapes.read_byte(offset),
            _ => None,
        }
    }

    /// Byte write into a VGC memory space.
    pub fn space_write(&mut self, space: u8, offset: usize, value: u8) -> bool {
        match space {
            0 => {
                if let Some(slot) = self.char_ram.get_mut(offset) {
                    *slot = value;
                    return true;
                }
                false
            }
            1 => {
                if let Some(slot) = self.color_ram.get_mut(offset) {
                    *slot = value;
                    return true;
                }
                false
            }
            2 => {
                if let Some(slot) = self.gfx.get_mut(offset) {
                    *slot = value;
                    return true;
                }
                false
            }
            3 => self.shapes.write_byte(offset, value),
            _ => false,
        }
    }

    /// Length of a VGC memory space, 0 for unknown selectors.
    #[must_use]
    pub fn space_len(&self, space: u8) -> usize {
        match space {
            0 | 1 => TEXT_BYTES,
            2 => GFX_BYTES,
            3 => self.shapes.len(),
            _ => 0,
        }
    }

    // -----------------------------------------------------------------
    // Frame tick
    // -----------------------------------------------------------------

    /// Frame boundary: swap and compile copper lists, recompute collision
    /// masks.
    pub fn tick_frame(&mut self) {
        self.frames += 1;
        self.copper.tick_frame();
        self.update_collisions();
    }

    /// Pixel-accurate collision masks over bounding-box candidates. With
    /// 16 sprites and 8-bit registers, sprite n folds onto bit n % 8.
    fn update_collisions(&mut self) {
        let sprites = self.sprites;
        let enabled: Vec<usize> = (0..SPRITE_COUNT).filter(|&i| sprites[i].enabled).collect();

        let mut shapes = vec![[0u8; SHAPE_BYTES]; enabled.len()];
        for (buf, &i) in shapes.iter_mut().zip(&enabled) {
            self.shapes.copy_shape(sprites[i].shape as usize, buf);
        }

        let opaque = |idx: usize, px: i32, py: i32| -> bool {
            let sprite = &sprites[enabled[idx]];
            let lx = px - i32::from(sprite.x);
            let ly = py - i32::from(sprite.y);
            if !(0..16).contains(&lx) || !(0..16).contains(&ly) {
                return false;
            }
            let sx = if sprite.flip_x { 15 - lx } else { lx } as usize;
            let sy = if sprite.flip_y { 15 - ly } else { ly } as usize;
            let byte = shapes[idx][sy * 8 + sx / 2];
            let nibble = if sx % 2 == 0 { byte >> 4 } else { byte & 0x0F };
            nibble != 0
        };

        let mut coll_sprite = self.coll_sprite;
        let mut coll_bg = self.coll_bg;

        for (ai, &a) in enabled.iter().enumerate() {
            let sa = sprites[a];

            // Sprite-background
            'bg: for ly in 0..16 {
                for lx in 0..16 {
                    let px = i32::from(sa.x) + lx;
                    let py = i32::from(sa.y) + ly;
                    if opaque(ai, px, py) && draw::pixel(&self.gfx, px, py) != 0 {
                        coll_bg |= 1 << (a % 8);
                        break 'bg;
                    }
                }
            }

            // Sprite-sprite
            for (bi, &b) in enabled.iter().enumerate().skip(ai + 1) {
                let sb = sprites[b];
                let x_overlap = (i32::from(sa.x) - i32::from(sb.x)).abs() < 16;
                let y_overlap = (i32::from(sa.y) - i32::from(sb.y)).abs() < 16;
                if !x_overlap || !y_overlap {
                    continue;
                }
                'pair: for ly in 0..16 {
                    for lx in 0..16 {
                        let px = i32::from(sa.x) + lx;
                        let py = i32::from(sa.y) + ly;
                        if opaque(ai, px, py) && opaque(bi, px, py) {
                            coll_sprite |= 1 << (a % 8);
                            coll_sprite |= 1 << (b % 8);
                            break 'pair;
                        }
                    }
                }
            }
        }

        self.coll_sprite = coll_sprite;
        self.coll_bg = coll_bg;
    }

    /// Raster IRQ enable (IrqCtl bit 0).
    #[must_use]
    pub fn raster_irq_enabled(&self) -> bool {
        self.irq_ctl & 0x01 != 0
    }

    /// Consume a pending `SysReset` request.
    pub fn take_reset_request(&mut self) -> bool {
        let requested = self.reset_requested;
        self.reset_requested = false;
        requested
    }

    /// Frame ticks seen.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    // -----------------------------------------------------------------
    // Accessors for the renderer, DMA and tests
    // -----------------------------------------------------------------

    #[must_use]
    pub fn char_ram(&self) -> &[u8] {
        &self.char_ram
    }

    #[must_use]
    pub fn color_ram(&self) -> &[u8] {
        &self.color_ram
    }

    #[must_use]
    pub fn gfx(&self) -> &[u8] {
        &self.gfx
    }

    #[must_use]
    pub fn shapes(&self) -> &SpriteShapes {
        &self.shapes
    }

    #[must_use]
    pub fn sprite(&self, index: usize) -> &Sprite {
        &self.sprites[index % SPRITE_COUNT]
    }

    #[must_use]
    pub fn cursor(&self) -> (u8, u8) {
        (self.cursor_x, self.cursor_y)
    }
}

impl Default for Vgc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_params(vgc: &mut Vgc, params: &[u8]) {
        for (i, &p) in params.iter().enumerate() {
            vgc.write(REG_P0 + i as u16, p);
        }
    }

    #[test]
    fn char_out_advances_cursor_and_stamps_colour() {
        let mut vgc = Vgc::new();
        vgc.write(REG_FG, 5);
        vgc.write(REG_CHAR_OUT, b'A');
        assert_eq!(vgc.read(CHAR_RAM_BASE), b'A');
        assert_eq!(vgc.read(COLOR_RAM_BASE), 5);
        assert_eq!(vgc.cursor(), (1, 0));
    }

    #[test]
    fn lf_on_bottom_row_scrolls() {
        let mut vgc = Vgc::new();
        vgc.write(REG_CURSOR_Y, 24);
        vgc.write(REG_CHAR_OUT, b'X');
        vgc.write(REG_CHAR_OUT, CH_LF);
        // 'X' moved up one row
        let idx = CHAR_RAM_BASE + (23 * TEXT_COLS) as u16;
        assert_eq!(vgc.read(idx), b'X');
        assert_eq!(vgc.cursor().1, 24);
    }

    #[test]
    fn ff_clears_and_homes() {
        let mut vgc = Vgc::new();
        vgc.write(REG_CHAR_OUT, b'Z');
        vgc.write(REG_CHAR_OUT, CH_FF);
        assert_eq!(vgc.read(CHAR_RAM_BASE), 0x20);
        assert_eq!(vgc.cursor(), (0, 0));
    }

    #[test]
    fn backspace_erases_previous_cell() {
        let mut vgc = Vgc::new();
        vgc.write(REG_CHAR_OUT, b'A');
        vgc.write(REG_CHAR_OUT, CH_BACKSPACE);
        assert_eq!(vgc.read(CHAR_RAM_BASE), 0x20);
        assert_eq!(vgc.cursor(), (0, 0));
    }

    #[test]
    fn plot_command_uses_gcolor() {
        let mut vgc = Vgc::new();
        vgc.write(REG_GCOLOR, 9);
        set_params(&mut vgc, &[10, 0, 20]);
        vgc.write(REG_CMD, cmd::PLOT);
        assert_eq!(vgc.gfx()[20 * 320 + 10], 9);
        assert_eq!(vgc.read(REG_STATUS) & 1, 0);
    }

    #[test]
    fn unknown_command_sets_error_status() {
        let mut vgc = Vgc::new();
        vgc.write(REG_CMD, 200);
        assert_eq!(vgc.read(REG_STATUS) & 1, 1);
        // A good command clears it again
        vgc.write(REG_CMD, cmd::GCLS);
        assert_eq!(vgc.read(REG_STATUS) & 1, 0);
    }

    #[test]
    fn mem_read_returns_result_in_p4() {
        let mut vgc = Vgc::new();
        vgc.write(CHAR_RAM_BASE, b'Q');
        set_params(&mut vgc, &[0, 0, 0, 0, 0]);
        vgc.write(REG_CMD, cmd::MEM_READ);
        assert_eq!(vgc.read(REG_P0 + 4), b'Q');
    }

    #[test]
    fn mem_write_out_of_range_errors() {
        let mut vgc = Vgc::new();
        set_params(&mut vgc, &[2, 0xFF, 0xFF, 0x7F, 1]);
        vgc.write(REG_CMD, cmd::MEM_WRITE);
        assert_eq!(vgc.read(REG_STATUS) & 1, 1);
    }

    #[test]
    fn sprite_count_tracks_enables() {
        let mut vgc = Vgc::new();
        assert_eq!(vgc.read(REG_SPRITE_COUNT), 0);
        set_params(&mut vgc, &[3]);
        vgc.write(REG_CMD, cmd::SPRITE_ENABLE);
        assert_eq!(vgc.read(REG_SPRITE_COUNT), 1);
        vgc.write(REG_CMD, cmd::SPRITE_DISABLE);
        assert_eq!(vgc.read(REG_SPRITE_COUNT), 0);
    }

    #[test]
    fn overlapping_sprites_collide() {
        let mut vgc = Vgc::new();
        // Shape 0: solid row 0
        set_params(&mut vgc, &[0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        vgc.write(REG_CMD, cmd::SPRITE_ROW);
        for i in [0u8, 1] {
            set_params(&mut vgc, &[i]);
            vgc.write(REG_CMD, cmd::SPRITE_ENABLE);
            set_params(&mut vgc, &[i, 8 * i, 0, 0]);
            vgc.write(REG_CMD, cmd::SPRITE_POS);
        }
        vgc.tick_frame();
        let mask = vgc.read(REG_COLL_SPR);
        assert_eq!(mask, 0b11);
        assert_eq!(vgc.read(REG_COLL_SPR), 0, "read clears the mask");
    }

    #[test]
    fn sprite_background_collision() {
        let mut vgc = Vgc::new();
        set_params(&mut vgc, &[0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        vgc.write(REG_CMD, cmd::SPRITE_ROW);
        set_params(&mut vgc, &[0]);
        vgc.write(REG_CMD, cmd::SPRITE_ENABLE);
        set_params(&mut vgc, &[0, 50, 0, 50]);
        vgc.write(REG_CMD, cmd::SPRITE_POS);
        // Paint a background pixel under the sprite row
        vgc.write(REG_GCOLOR, 3);
        set_params(&mut vgc, &[52, 0, 50]);
        vgc.write(REG_CMD, cmd::PLOT);
        vgc.tick_frame();
        assert_eq!(vgc.read(REG_COLL_BG), 0b1);
    }

    #[test]
    fn char_in_pops_queued_input() {
        let mut vgc = Vgc::new();
        assert_eq!(vgc.read(REG_CHAR_IN), 0);
        vgc.push_input(b'k');
        assert_eq!(vgc.read(REG_CHAR_IN), b'k');
        assert_eq!(vgc.read(REG_CHAR_IN), 0);
    }

    #[test]
    fn sys_reset_latches_request() {
        let mut vgc = Vgc::new();
        vgc.write(REG_CMD, cmd::SYS_RESET);
        assert!(vgc.take_reset_request());
        assert!(!vgc.take_reset_request());
    }
}
