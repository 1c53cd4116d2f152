//! Cycle scheduler.
//!
//! Drives the machine in budgeted slices. In real-time mode the budget is
//! derived from elapsed wall time so the long-run average matches
//! `cpu_hz`, with the backlog capped at `max(cpu_hz / 5, 2 x
//! cycles-per-frame)` so a stall never triggers unbounded catch-up. Turbo
//! mode runs fixed slices with no pacing. With `timing_log` set, a
//! telemetry line goes out once per wall second.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info};

use crate::debugger::Debugger;
use crate::machine::{NovaVm, VmError};

/// Slice size in turbo mode.
const TURBO_SLICE: u64 = 200_000;

/// Sleep quantum while waiting for budget or while paused.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// The scheduler. Owns the machine for its run.
pub struct Scheduler {
    vm: NovaVm,
    debugger: Debugger,
    running: Arc<AtomicBool>,
}

/// Handle to stop a running scheduler from another thread.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

impl Scheduler {
    #[must_use]
    pub fn new(vm: NovaVm, debugger: Debugger) -> Self {
        Self {
            vm,
            debugger,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Run until stopped or a fatal CPU condition surfaces. Returns the
    /// machine so a host can inspect final state.
    pub fn run(mut self) -> (NovaVm, Result<(), VmError>) {
        let clock = self.vm.bus.clock();
        let cycles_per_frame = clock.cycles_per_frame();
        let backlog_cap = (clock.cpu_hz / 5).max(2 * cycles_per_frame);

        let start = Instant::now();
        let mut executed_total: u64 = 0;

        // Telemetry window
        let mut window_start = Instant::now();
        let mut window_cycles: u64 = 0;
        let mut window_frames = self.vm.bus.total_frames();
        let mut peak_backlog: u64 = 0;

        let result = loop {
            if !self.running.load(Ordering::Acquire) {
                break Ok(());
            }

            let budget = if clock.turbo {
                TURBO_SLICE
            } else {
                let target = start.elapsed().as_secs_f64() * clock.cpu_hz as f64;
                let backlog = (target as u64).saturating_sub(executed_total);
                peak_backlog = peak_backlog.max(backlog);
                if backlog == 0 {
                    thread::sleep(IDLE_SLEEP);
                    continue;
                }
                backlog.min(backlog_cap)
            };

            match self.vm.run_slice(budget, &self.debugger) {
                Ok(0) => {
                    // Paused by the debugger
                    thread::sleep(IDLE_SLEEP);
                }
                Ok(executed) => {
                    executed_total += executed;
                    window_cycles += executed;
                }
                Err(err) => {
                    error!("scheduler slice aborted: {err}");
                    self.debugger.report_fault();
                    break Err(err);
                }
            }

            if clock.timing_log && window_start.elapsed() >= Duration::from_secs(1) {
                let secs = window_start.elapsed().as_secs_f64();
                let mhz = window_cycles as f64 / secs / 1_000_000.0;
                let frames = self.vm.bus.total_frames() - window_frames;
                let fps = f64::from(frames as u32) / secs;
                let backlog_pct = 100.0 * peak_backlog as f64 / backlog_cap as f64;
                info!("{mhz:.2} MHz, {fps:.1} fps, peak backlog {backlog_pct:.0}%");
                window_start = Instant::now();
                window_cycles = 0;
                window_frames = self.vm.bus.total_frames();
                peak_backlog = 0;
            }
        };

        self.vm.shutdown();
        (self.vm, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ROM_SIZE, VmConfig};

    fn make_vm(turbo: bool) -> NovaVm {
        let mut rom = vec![0xEA; ROM_SIZE];
        rom[0x3FFC] = 0x00;
        rom[0x3FFD] = 0xC0;
        let mut config = VmConfig::new(rom);
        config.clock.turbo = turbo;
        let mut vm = NovaVm::new(&config);
        vm.boot(None);
        vm
    }

    #[test]
    fn stop_handle_ends_the_run() {
        let (debugger, _handle) = Debugger::new();
        let scheduler = Scheduler::new(make_vm(true), debugger);
        let stop = scheduler.stop_handle();

        let runner = std::thread::spawn(move || scheduler.run());
        std::thread::sleep(Duration::from_millis(50));
        stop.stop();
        let (vm, result) = runner.join().expect("join");
        assert!(result.is_ok());
        assert!(vm.cpu.total_cycles() > 0, "turbo made progress");
    }

    #[test]
    fn fatal_cpu_fault_stops_the_run() {
        let (debugger, _handle) = Debugger::new();
        let mut vm = make_vm(true);
        // SED; LDA #$1F; ADC #$01 at the reset target
        vm.bus.load_ram(0x0280, &[0xF8, 0xA9, 0x1F, 0x69, 0x01]);
        vm.boot(Some(0x0280));
        let scheduler = Scheduler::new(vm, debugger);
        let (_vm, result) = scheduler.run();
        assert!(result.is_err());
    }
}
