//! Raster coprocessor ("copper").
//!
//! A copper program is an ordered list of `(position, register, value)`
//! events, where position = y * 320 + x in bitmap coordinates and the
//! register is one of the four copper-writable VGC registers. Programs are
//! edited on a target list, compiled (stable-sorted by position then
//! register) at the next frame boundary, and only the compiled program of
//! the active list is visible to the renderer. List switches requested via
//! `use_list` also land at the frame boundary, so the renderer never sees
//! a half-edited program.

use std::sync::Arc;

/// Number of copper lists.
pub const LIST_COUNT: usize = 128;
/// Maximum events per list; additions beyond this are silently dropped.
pub const LIST_CAP: usize = 256;
/// One past the highest valid event position (320 x 200 bitmap).
pub const POSITION_LIMIT: u32 = 320 * 200;

/// Registers a copper event may write: Mode, BgCol, ScrollX, ScrollY.
pub const WRITABLE_REGS: [u8; 4] = [0, 1, 5, 6];

/// A single copper event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopperEvent {
    /// Screen position key (y * 320 + x).
    pub position: u32,
    /// VGC core register index.
    pub register: u8,
    /// Value written when the beam passes the position.
    pub value: u8,
}

/// The copper: 128 double-buffered event lists.
pub struct Copper {
    /// Editable event lists.
    lists: Vec<Vec<CopperEvent>>,
    /// Lists touched since their last compile.
    dirty: Vec<bool>,
    /// Compiled, renderer-visible programs.
    programs: Vec<Arc<Vec<CopperEvent>>>,
    /// List receiving edits.
    target: usize,
    /// List the renderer replays.
    active: usize,
    /// List that becomes active at the next frame boundary.
    pending: usize,
    /// Master enable.
    pub enabled: bool,
}

impl Copper {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lists: vec![Vec::new(); LIST_COUNT],
            dirty: vec![false; LIST_COUNT],
            programs: vec![Arc::new(Vec::new()); LIST_COUNT],
            target: 0,
            active: 0,
            pending: 0,
            enabled: false,
        }
    }

    /// Add an event to the target list.
    ///
    /// Rejects invalid positions and non-writable registers. An event at an
    /// existing `(position, register)` key overwrites in place; otherwise
    /// the event appends unless the list is at capacity (silently dropped).
    pub fn add(&mut self, position: u32, register: u8, value: u8) {
        if position >= POSITION_LIMIT || !WRITABLE_REGS.contains(&register) {
            return;
        }
        let list = &mut self.lists[self.target];
        if let Some(existing) = list
            .iter_mut()
            .find(|e| e.position == position && e.register == register)
        {
            existing.value = value;
        } else {
            if list.len() >= LIST_CAP {
                return;
            }
            list.push(CopperEvent {
                position,
                register,
                value,
            });
        }
        self.dirty[self.target] = true;
    }

    /// Clear the target list.
    pub fn clear(&mut self) {
        self.lists[self.target].clear();
        self.dirty[self.target] = true;
    }

    /// Select the list receiving edits.
    pub fn select_target(&mut self, list: u8) {
        self.target = usize::from(list) % LIST_COUNT;
    }

    /// Request a list switch at the next frame boundary.
    pub fn use_list(&mut self, list: u8) {
        self.pending = usize::from(list) % LIST_COUNT;
    }

    /// End of list edits: the target reverts to the active list.
    pub fn list_end(&mut self) {
        self.target = self.active;
    }

    /// Currently edited list index.
    #[must_use]
    pub fn target(&self) -> usize {
        self.target
    }

    /// Renderer-visible list index.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active
    }

    /// Frame boundary: switch to the pending list and recompile dirty
    /// lists into position-sorted programs.
    pub fn tick_frame(&mut self) {
        self.active = self.pending;
        for i in 0..LIST_COUNT {
            if self.dirty[i] {
                let mut compiled = self.lists[i].clone();
                compiled.sort_by_key(|e| (e.position, e.register));
                self.programs[i] = Arc::new(compiled);
                self.dirty[i] = false;
            }
        }
    }

    /// The compiled program of the active list.
    ///
    /// The returned `Arc` is immutable; the renderer can hold it across a
    /// frame while the CPU edits the underlying list.
    #[must_use]
    pub fn visible_program(&self) -> Arc<Vec<CopperEvent>> {
        Arc::clone(&self.programs[self.active])
    }

    /// Drop every list and program (soft reset).
    pub fn reset(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
        for program in &mut self.programs {
            *program = Arc::new(Vec::new());
        }
        self.dirty.fill(false);
        self.target = 0;
        self.active = 0;
        self.pending = 0;
        self.enabled = false;
    }
}

impl Default for Copper {
    fn default() -> Self {
        Self::new()
    }
}
