//! Debugger service.
//!
//! A pause/step/breakpoint gate consulted before every CPU instruction.
//! Host threads drive it through a cloneable handle; commands travel over
//! a channel and state lives in atomics, so the gate itself never blocks
//! the scheduler thread.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, unbounded};

/// Commands a host can send to the debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCommand {
    Pause,
    Resume,
    /// Execute exactly one instruction while paused.
    Step,
    AddBreakpoint(u16),
    RemoveBreakpoint(u16),
    ClearBreakpoints,
}

/// What the scheduler should do with the next instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// Execute it.
    Run,
    /// Paused: end the slice without executing.
    Hold,
}

struct Shared {
    paused: AtomicBool,
    step_pending: AtomicBool,
    breakpoints: Mutex<HashSet<u16>>,
}

/// Host-facing handle; clone freely across threads.
#[derive(Clone)]
pub struct DebuggerHandle {
    tx: Sender<DebugCommand>,
    shared: Arc<Shared>,
}

impl DebuggerHandle {
    pub fn send(&self, command: DebugCommand) {
        let _ = self.tx.send(command);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }
}

/// The scheduler-side debugger service.
pub struct Debugger {
    rx: Receiver<DebugCommand>,
    shared: Arc<Shared>,
}

impl Debugger {
    #[must_use]
    pub fn new() -> (Self, DebuggerHandle) {
        let (tx, rx) = unbounded();
        let shared = Arc::new(Shared {
            paused: AtomicBool::new(false),
            step_pending: AtomicBool::new(false),
            breakpoints: Mutex::new(HashSet::new()),
        });
        let handle = DebuggerHandle {
            tx,
            shared: Arc::clone(&shared),
        };
        (Self { rx, shared }, handle)
    }

    fn drain_commands(&self) {
        while let Ok(command) = self.rx.try_recv() {
            match command {
                DebugCommand::Pause => self.shared.paused.store(true, Ordering::Release),
                DebugCommand::Resume => self.shared.paused.store(false, Ordering::Release),
                DebugCommand::Step => self.shared.step_pending.store(true, Ordering::Release),
                DebugCommand::AddBreakpoint(addr) => {
                    if let Ok(mut bps) = self.shared.breakpoints.lock() {
                        bps.insert(addr);
                    }
                }
                DebugCommand::RemoveBreakpoint(addr) => {
                    if let Ok(mut bps) = self.shared.breakpoints.lock() {
                        bps.remove(&addr);
                    }
                }
                DebugCommand::ClearBreakpoints => {
                    if let Ok(mut bps) = self.shared.breakpoints.lock() {
                        bps.clear();
                    }
                }
            }
        }
    }

    /// Gate the instruction about to execute at `pc`.
    pub fn gate(&self, pc: u16) -> GateAction {
        self.drain_commands();

        let hit = self
            .shared
            .breakpoints
            .lock()
            .map(|bps| bps.contains(&pc))
            .unwrap_or(false);
        if hit {
            self.shared.paused.store(true, Ordering::Release);
        }

        if self.shared.paused.load(Ordering::Acquire) {
            if self.shared.step_pending.swap(false, Ordering::AcqRel) {
                return GateAction::Run;
            }
            return GateAction::Hold;
        }
        GateAction::Run
    }

    /// Report a fatal CPU condition to the host: pause so state can be
    /// inspected.
    pub fn report_fault(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_by_default() {
        let (debugger, _handle) = Debugger::new();
        assert_eq!(debugger.gate(0x1000), GateAction::Run);
    }

    #[test]
    fn pause_holds_until_resume() {
        let (debugger, handle) = Debugger::new();
        handle.send(DebugCommand::Pause);
        assert_eq!(debugger.gate(0x1000), GateAction::Hold);
        handle.send(DebugCommand::Resume);
        assert_eq!(debugger.gate(0x1000), GateAction::Run);
    }

    #[test]
    fn step_runs_one_instruction_while_paused() {
        let (debugger, handle) = Debugger::new();
        handle.send(DebugCommand::Pause);
        assert_eq!(debugger.gate(0x1000), GateAction::Hold);
        handle.send(DebugCommand::Step);
        assert_eq!(debugger.gate(0x1000), GateAction::Run);
        assert_eq!(debugger.gate(0x1001), GateAction::Hold);
    }

    #[test]
    fn breakpoint_pauses_at_address() {
        let (debugger, handle) = Debugger::new();
        handle.send(DebugCommand::AddBreakpoint(0x2000));
        assert_eq!(debugger.gate(0x1FFF), GateAction::Run);
        assert_eq!(debugger.gate(0x2000), GateAction::Hold);
        assert!(handle.is_paused());
    }
}
