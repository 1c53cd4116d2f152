//! SID ADSR envelope generator.
//!
//! Counter-driven state machine with four phases. The rate counter periods
//! come from the SID datasheet; decay and release approximate an
//! exponential curve by stretching the step period at fixed level
//! thresholds, the topmost of which is $5D.

/// Rate counter periods (CPU cycles per step) indexed by the 4-bit
/// attack/decay/release register nibbles.
const RATE_PERIODS: [u32; 16] = [
    9, 32, 63, 95, 149, 220, 267, 313, 392, 977, 1954, 3126, 3907, 11_720, 19_532, 31_251,
];

/// Sustain levels: 4-bit value replicated into both nibbles.
const SUSTAIN_LEVELS: [u8; 16] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE,
    0xFF,
];

/// Envelope phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR envelope generator for one voice.
pub struct Envelope {
    /// Current output level (0-255).
    pub level: u8,
    /// Current phase.
    pub phase: Phase,
    /// Attack register nibble.
    pub attack: u8,
    /// Decay register nibble.
    pub decay: u8,
    /// Sustain register nibble.
    pub sustain: u8,
    /// Release register nibble.
    pub release: u8,
    /// Rate counter, counts CPU cycles up to the phase period.
    rate_counter: u32,
    /// Exponential stretch counter.
    exp_counter: u8,
    /// Exponential stretch period for the current level.
    exp_period: u8,
    /// Previous gate state for edge detection.
    prev_gate: bool,
}

impl Envelope {
    #[must_use]
    pub fn new() -> Self {
        Self {
            level: 0,
            phase: Phase::Release,
            attack: 0,
            decay: 0,
            sustain: 0,
            release: 0,
            rate_counter: 0,
            exp_counter: 0,
            exp_period: 1,
            prev_gate: false,
        }
    }

    /// Advance the envelope by `cycles` CPU cycles.
    ///
    /// Gate edges are sampled once per call; the caller keeps call spans
    /// below one output-sample period so edges land accurately enough.
    pub fn clock(&mut self, gate: bool, cycles: u32) {
        if gate && !self.prev_gate {
            self.phase = Phase::Attack;
            self.rate_counter = 0;
            self.exp_counter = 0;
        } else if !gate && self.prev_gate {
            self.phase = Phase::Release;
        }
        self.prev_gate = gate;

        if self.phase == Phase::Sustain {
            return;
        }

        self.rate_counter += cycles;
        loop {
            // Recompute each step: the phase (and thus the period) can
            // change mid-span when attack tops out or decay hits sustain.
            let period = match self.phase {
                Phase::Attack => RATE_PERIODS[self.attack as usize],
                Phase::Decay => RATE_PERIODS[self.decay as usize],
                Phase::Release => RATE_PERIODS[self.release as usize],
                Phase::Sustain => {
                    self.rate_counter = 0;
                    return;
                }
            };
            if self.rate_counter < period {
                return;
            }
            self.rate_counter -= period;
            self.step_level();
        }
    }

    /// One rate-counter expiry: move the level one step (or one exponential
    /// sub-step for decay/release).
    fn step_level(&mut self) {
        match self.phase {
            Phase::Attack => {
                self.level = self.level.saturating_add(1);
                self.update_exp_period();
                if self.level == 0xFF {
                    self.phase = Phase::Decay;
                }
            }
            Phase::Decay => {
                self.exp_counter = self.exp_counter.wrapping_add(1);
                if self.exp_counter < self.exp_period {
                    return;
                }
                self.exp_counter = 0;

                let sustain = SUSTAIN_LEVELS[self.sustain as usize];
                if self.level > sustain {
                    self.level -= 1;
                    self.update_exp_period();
                }
                if self.level <= sustain {
                    self.level = sustain;
                    self.phase = Phase::Sustain;
                }
            }
            Phase::Release => {
                self.exp_counter = self.exp_counter.wrapping_add(1);
                if self.exp_counter < self.exp_period {
                    return;
                }
                self.exp_counter = 0;

                if self.level > 0 {
                    self.level -= 1;
                    self.update_exp_period();
                }
            }
            Phase::Sustain => {}
        }
    }

    /// Exponential step period by level threshold.
    fn update_exp_period(&mut self) {
        self.exp_period = if self.level >= 0x5D {
            1
        } else if self.level >= 0x36 {
            2
        } else if self.level >= 0x1A {
            4
        } else if self.level >= 0x0E {
            8
        } else if self.level >= 0x06 {
            16
        } else {
            30
        };
    }

    /// Force the envelope silent (used by the machine's soft reset).
    pub fn gate_off(&mut self) {
        self.phase = Phase::Release;
        self.prev_gate = false;
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attack_reaches_max_and_enters_decay() {
        let mut env = Envelope::new();
        env.attack = 0;
        env.sustain = 0x0F;
        env.clock(true, 9 * 256);
        assert_eq!(env.level, 0xFF);
        // With sustain at $FF decay settles immediately into sustain
        env.clock(true, 9 * 4);
        assert_eq!(env.phase, Phase::Sustain);
    }

    #[test]
    fn release_decays_to_zero() {
        let mut env = Envelope::new();
        env.attack = 0;
        env.sustain = 0x0F;
        env.clock(true, 9 * 300);
        assert_eq!(env.level, 0xFF);

        env.clock(false, 9 * 300 * 30);
        assert_eq!(env.level, 0);
        assert_eq!(env.phase, Phase::Release);
    }

    #[test]
    fn decay_stops_at_sustain_level() {
        let mut env = Envelope::new();
        env.attack = 0;
        env.decay = 0;
        env.sustain = 0x08;
        env.clock(true, 9 * 256);
        assert_eq!(env.level, 0xFF);
        env.clock(true, 9 * 300 * 30);
        assert_eq!(env.level, 0x88);
        assert_eq!(env.phase, Phase::Sustain);
    }
}
