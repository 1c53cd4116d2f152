//! Master clock configuration.

/// Master clock configuration for the machine.
///
/// The CPU crystal drives all timing. Peripherals derive their progress from
/// the cycle counts handed to `advance_cycles`, and logical frames are
/// derived from the cpu-cycles-per-frame ratio with an exact remainder.
#[derive(Debug, Clone, Copy)]
pub struct ClockConfig {
    /// CPU frequency in cycles per second.
    pub cpu_hz: u64,
    /// Logical frame rate in Hz.
    pub frame_rate_hz: u64,
    /// When set, the scheduler runs unpaced fixed-size slices.
    pub turbo: bool,
    /// When set, the scheduler emits a telemetry line once per wall second.
    pub timing_log: bool,
}

impl ClockConfig {
    #[must_use]
    pub const fn new(cpu_hz: u64) -> Self {
        Self {
            cpu_hz,
            frame_rate_hz: 60,
            turbo: false,
            timing_log: false,
        }
    }

    /// Whole CPU cycles per logical frame (integer division).
    #[must_use]
    pub const fn cycles_per_frame(&self) -> u64 {
        self.cpu_hz / self.frame_rate_hz
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self::new(12_000_000)
    }
}
