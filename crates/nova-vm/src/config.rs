//! Machine configuration: ROM image and runtime knobs.

use std::path::PathBuf;

use nova_core::ClockConfig;

/// ROM image size ($C000-$FFFF).
pub const ROM_SIZE: usize = 0x4000;

/// Configuration for constructing a NovaVM instance.
///
/// The three runtime knobs (`cpu_hz`, `turbo`, `timing_log`) live on the
/// clock config; everything else is fixed machine shape.
pub struct VmConfig {
    /// ROM image, copied to $C000-$FFFF at boot (padded with zeros).
    pub rom: Vec<u8>,
    /// CPU clock and scheduler behaviour.
    pub clock: ClockConfig,
    /// Audio output sample rate in Hz.
    pub sample_rate: u32,
    /// Expansion RAM size in KiB.
    pub xram_kb: u32,
    /// Root directory for the file I/O controller.
    pub files_root: PathBuf,
}

impl VmConfig {
    /// Defaults: 12 MHz, 60 Hz frames, 44.1 kHz audio, 512 KiB XRAM,
    /// files under `./files`.
    #[must_use]
    pub fn new(rom: Vec<u8>) -> Self {
        Self {
            rom,
            clock: ClockConfig::default(),
            sample_rate: 44_100,
            xram_kb: 512,
            files_root: PathBuf::from("files"),
        }
    }

    /// Apply the environment knobs `NOVA_CPU_HZ`, `NOVA_TURBO` and
    /// `NOVA_TIMING_LOG`.
    #[must_use]
    pub fn from_env(rom: Vec<u8>) -> Self {
        let mut config = Self::new(rom);
        if let Ok(hz) = std::env::var("NOVA_CPU_HZ") {
            if let Ok(hz) = hz.parse::<u64>() {
                config.clock.cpu_hz = hz.max(1);
            }
        }
        config.clock.turbo = env_flag("NOVA_TURBO");
        config.clock.timing_log = env_flag("NOVA_TIMING_LOG");
        config
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false)
}
