//! Host event hooks.
//!
//! The machine raises a small set of named events toward its host (UI,
//! test harness). Hosts register one implementation on the bus; the
//! default ignores everything.

/// Host-side event sink.
pub trait HostHooks: Send {
    /// A running program asked the host for help.
    fn help_requested(&mut self) {}

    /// A program was saved through the file I/O controller.
    fn program_saved(&mut self, _name: &str) {}

    /// The ROM image was swapped at runtime.
    fn rom_swapped(&mut self) {}
}

/// The default sink: ignores every event.
pub struct NullHooks;

impl HostHooks for NullHooks {}
