//! Six-voice music engine.
//!
//! Voices 0-2 drive SID1 channels 0-2, voices 3-5 drive SID2. The engine
//! ticks once per logical frame: each voice accumulates `96 * bpm / 3600`
//! ticks, steps its per-frame effects (arpeggio, PWM sweep, vibrato,
//! portamento, filter sweep — in that order), consumes due events, and
//! then burns the smaller of its tick budget and its wait counter. Sound
//! effects borrow a voice; the music state underneath is frozen until the
//! effect finishes.
//!
//! # Registers ($BA50-$BA56, read-only)
//!
//! | Addr  | Register                  |
//! |-------|---------------------------|
//! | $BA50 | Status (bit 0 = playing)  |
//! | $BA51-$BA56 | Voice MIDI note mirrors |

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use log::warn;
use nova_sid::NovaSid;

use crate::mml::{self, Event};

pub const MUSIC_BASE: u16 = 0xBA50;
pub const MUSIC_END: u16 = 0xBA56;

/// Music voices.
pub const VOICE_COUNT: usize = 6;
/// Instrument slots.
pub const INSTRUMENT_COUNT: usize = 16;

/// An instrument: waveform bits, ADSR nibbles and a 12-bit pulse width.
#[derive(Debug, Clone, Copy)]
pub struct Instrument {
    /// Waveform bits of the control register (e.g. `0x40` pulse).
    pub waveform: u8,
    pub attack: u8,
    pub decay: u8,
    pub sustain: u8,
    pub release: u8,
    pub pulse_width: u16,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            waveform: 0x40,
            attack: 0x01,
            decay: 0x08,
            sustain: 0x0A,
            release: 0x04,
            pulse_width: 0x800,
        }
    }
}

/// SID frequency register value for a MIDI note.
#[must_use]
pub fn note_freq(midi: u8, cpu_hz: u32) -> u16 {
    let hz = 440.0 * 2f64.powf((f64::from(midi) - 69.0) / 12.0);
    let reg = hz * 16_777_216.0 / f64::from(cpu_hz);
    reg.clamp(0.0, 65_535.0) as u16
}

/// Arpeggio effect state.
#[derive(Debug, Clone)]
struct ArpState {
    notes: Vec<u8>,
    index: usize,
}

/// Per-voice sequencing state. Both music tracks and sound effects are
/// tracks; an SFX track shadows the music track on its voice.
#[derive(Debug, Clone)]
struct Track {
    events: Vec<Event>,
    idx: usize,
    bpm: u16,
    tick_accum: f32,
    wait_ticks: f32,
    midi: u8,
    freq: u16,
    gate: bool,
    /// Gate edge split across frames so a retrigger is a real edge.
    pending_gate: bool,
    instrument: usize,
    pw: u16,
    pwm_dir: i8,
    vib_depth: u8,
    vib_phase: f32,
    porta_pending: bool,
    porta_target: u16,
    porta_active: bool,
    filter_sweep: i8,
    cutoff: u8,
    resonance: u8,
    filter_mode: u8,
    arp: Option<ArpState>,
    finished: bool,
}

impl Track {
    fn new(events: Vec<Event>) -> Self {
        Self {
            finished: events.is_empty(),
            events,
            idx: 0,
            bpm: 120,
            tick_accum: 0.0,
            wait_ticks: 0.0,
            midi: 0,
            freq: 0,
            gate: false,
            pending_gate: false,
            instrument: 0,
            pw: 0x800,
            pwm_dir: 0,
            vib_depth: 0,
            vib_phase: 0.0,
            porta_pending: false,
            porta_target: 0,
            porta_active: false,
            filter_sweep: 0,
            cutoff: 128,
            resonance: 0,
            filter_mode: 0,
            arp: None,
        }
    }

    fn ticks_per_frame(&self) -> f32 {
        96.0 * f32::from(self.bpm) / 3600.0
    }

    fn write_ctrl(&self, chip: &mut NovaSid, base: u8, instruments: &[Instrument], gate: bool) {
        let waveform = instruments[self.instrument].waveform;
        chip.write(base + 4, waveform | u8::from(gate));
    }

    fn write_freq(&self, chip: &mut NovaSid, base: u8, freq: u16) {
        chip.write(base, freq as u8);
        chip.write(base + 1, (freq >> 8) as u8);
    }

    fn write_pw(&self, chip: &mut NovaSid, base: u8) {
        chip.write(base + 2, self.pw as u8);
        chip.write(base + 3, (self.pw >> 8) as u8);
    }

    fn write_adsr(&self, chip: &mut NovaSid, base: u8, instruments: &[Instrument]) {
        let ins = &instruments[self.instrument];
        chip.write(base + 5, (ins.attack << 4) | (ins.decay & 0x0F));
        chip.write(base + 6, (ins.sustain << 4) | (ins.release & 0x0F));
    }

    fn write_filter(&self, chip: &mut NovaSid, channel: usize) {
        chip.write(0x16, self.cutoff);
        let routing = if self.filter_mode == 0 {
            0
        } else {
            1u8 << channel
        };
        chip.write(0x17, (self.resonance << 4) | routing);
        let mode_bits = match self.filter_mode {
            1 => 0x10,
            2 => 0x20,
            4 => 0x40,
            _ => 0x00,
        };
        chip.write(0x18, mode_bits | 0x0F);
    }

    fn gate_off(&mut self, chip: &mut NovaSid, base: u8, instruments: &[Instrument]) {
        self.gate = false;
        self.pending_gate = false;
        self.write_ctrl(chip, base, instruments, false);
    }

    /// Retrigger: a sounding voice gates off this frame and back on the
    /// next so the envelope sees a rising edge.
    fn trigger(&mut self, chip: &mut NovaSid, base: u8, instruments: &[Instrument]) {
        if self.gate {
            self.write_ctrl(chip, base, instruments, false);
            self.pending_gate = true;
        } else {
            self.write_ctrl(chip, base, instruments, true);
            self.gate = true;
        }
    }

    /// One frame of sequencing for this track.
    fn tick(
        &mut self,
        chip: &mut NovaSid,
        channel: usize,
        instruments: &[Instrument],
        cpu_hz: u32,
    ) {
        if self.finished {
            return;
        }
        let base = (channel * 7) as u8;

        if self.pending_gate {
            self.pending_gate = false;
            self.gate = true;
            self.write_ctrl(chip, base, instruments, true);
        }

        self.tick_accum += self.ticks_per_frame();
        self.step_effects(chip, base, channel, cpu_hz);

        while self.wait_ticks <= 0.0 {
            if self.idx >= self.events.len() {
                self.finished = true;
                self.gate_off(chip, base, instruments);
                self.midi = 0;
                return;
            }
            let event = self.events[self.idx].clone();
            self.idx += 1;
            self.apply_event(event, chip, base, channel, instruments, cpu_hz);
        }

        let consume = self.tick_accum.min(self.wait_ticks);
        self.tick_accum -= consume;
        self.wait_ticks -= consume;
    }

    /// Arpeggio, PWM sweep, vibrato, portamento, filter sweep — in order.
    fn step_effects(&mut self, chip: &mut NovaSid, base: u8, channel: usize, cpu_hz: u32) {
        if let Some(arp) = &mut self.arp {
            arp.index = (arp.index + 1) % arp.notes.len();
            let freq = note_freq(arp.notes[arp.index], cpu_hz);
            self.freq = freq;
            self.write_freq(chip, base, freq);
        }

        if self.pwm_dir != 0 {
            let step = i32::from(self.pwm_dir) * 8;
            self.pw = (i32::from(self.pw) + step).clamp(0, 0xFFF) as u16;
            self.write_pw(chip, base);
        }

        if self.vib_depth > 0 && self.gate {
            self.vib_phase += 0.35;
            let offset = self.vib_phase.sin() * f32::from(self.vib_depth);
            let freq = (f32::from(self.freq) + offset).clamp(0.0, 65_535.0) as u16;
            self.write_freq(chip, base, freq);
        }

        if self.porta_active {
            let target = i32::from(self.porta_target);
            let current = i32::from(self.freq);
            let step = ((target - current) / 8).clamp(-4096, 4096);
            let step = if step == 0 {
                (target - current).signum()
            } else {
                step
            };
            let next = current + step;
            self.freq = next.clamp(0, 65_535) as u16;
            self.write_freq(chip, base, self.freq);
            if self.freq == self.porta_target {
                self.porta_active = false;
            }
        }

        if self.filter_sweep != 0 {
            self.cutoff = self.cutoff.saturating_add_signed(self.filter_sweep);
            self.write_filter(chip, channel);
        }
    }

    fn apply_event(
        &mut self,
        event: Event,
        chip: &mut NovaSid,
        base: u8,
        channel: usize,
        instruments: &[Instrument],
        cpu_hz: u32,
    ) {
        match event {
            Event::NoteOn { midi, ticks } => {
                self.arp = None;
                let freq = note_freq(midi, cpu_hz);
                if self.porta_pending && self.gate {
                    // Glide to the new pitch without retriggering
                    self.porta_target = freq;
                    self.porta_active = true;
                    self.porta_pending = false;
                } else {
                    self.porta_pending = false;
                    self.freq = freq;
                    self.write_freq(chip, base, freq);
                    self.write_pw(chip, base);
                    self.write_adsr(chip, base, instruments);
                    self.trigger(chip, base, instruments);
                }
                self.midi = midi;
                self.wait_ticks += ticks as f32;
            }
            Event::Rest { ticks } => {
                self.arp = None;
                self.gate_off(chip, base, instruments);
                self.midi = 0;
                self.wait_ticks += ticks as f32;
            }
            Event::ArpStart { ticks, notes, .. } => {
                let first = notes[0];
                self.freq = note_freq(first, cpu_hz);
                self.midi = first;
                self.write_freq(chip, base, self.freq);
                self.write_pw(chip, base);
                self.write_adsr(chip, base, instruments);
                self.trigger(chip, base, instruments);
                self.arp = Some(ArpState { notes, index: 0 });
                self.wait_ticks += ticks as f32;
            }
            Event::SetTempo(bpm) => self.bpm = bpm,
            Event::SetInstrument(id) => {
                self.instrument = id as usize % INSTRUMENT_COUNT;
                self.pw = instruments[self.instrument].pulse_width;
            }
            Event::SetVibrato(depth) => self.vib_depth = depth,
            Event::SetPulseWidth(pw) => {
                self.pw = pw & 0xFFF;
                self.write_pw(chip, base);
            }
            Event::PwmSweep(dir) => self.pwm_dir = dir,
            Event::Portamento => self.porta_pending = true,
            Event::SetFilterCutoff { cutoff, resonance } => {
                self.cutoff = cutoff;
                self.resonance = resonance;
                self.write_filter(chip, channel);
            }
            Event::FilterMode(mode) => {
                self.filter_mode = mode;
                self.write_filter(chip, channel);
            }
            Event::FilterSweep(dir) => self.filter_sweep = dir,
            Event::LoopStart(_) | Event::LoopEnd(_) => {}
        }
    }
}

/// The music engine.
pub struct MusicEngine {
    music: Vec<Track>,
    sfx: Vec<Option<Track>>,
    instruments: [Instrument; INSTRUMENT_COUNT],
    sources: Vec<String>,
    playing: bool,
    looping: bool,
    cpu_hz: u32,
    /// Voice-steal order for sound effects, most expendable first.
    steal_order: [usize; VOICE_COUNT],
    /// Master volume needs writing once per (re)start.
    volume_init: bool,
}

impl MusicEngine {
    #[must_use]
    pub fn new(cpu_hz: u32) -> Self {
        Self {
            music: (0..VOICE_COUNT).map(|_| Track::new(Vec::new())).collect(),
            sfx: vec![None; VOICE_COUNT],
            instruments: [Instrument::default(); INSTRUMENT_COUNT],
            sources: vec![String::new(); VOICE_COUNT],
            playing: false,
            looping: false,
            cpu_hz,
            steal_order: [5, 4, 3, 2, 1, 0],
            volume_init: false,
        }
    }

    #[must_use]
    pub fn owns(addr: u16) -> bool {
        (MUSIC_BASE..=MUSIC_END).contains(&addr)
    }

    /// Status and note-mirror reads; writes to this range are dropped.
    #[must_use]
    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xBA50 => u8::from(self.playing),
            0xBA51..=0xBA56 => {
                let voice = (addr - 0xBA51) as usize;
                self.sfx[voice]
                    .as_ref()
                    .map_or(self.music[voice].midi, |t| t.midi)
            }
            _ => 0,
        }
    }

    /// Define an instrument slot.
    pub fn set_instrument(&mut self, slot: usize, instrument: Instrument) {
        if slot < INSTRUMENT_COUNT {
            self.instruments[slot] = instrument;
        }
    }

    /// Start playback of up to six MML tracks. A track that fails to
    /// parse plays as silence.
    pub fn play(&mut self, tracks: &[&str]) {
        for voice in 0..VOICE_COUNT {
            let src = tracks.get(voice).copied().unwrap_or("");
            self.sources[voice] = src.to_string();
            self.music[voice] = Track::new(Self::parse_or_empty(src));
        }
        self.playing = true;
        self.volume_init = false;
    }

    fn parse_or_empty(src: &str) -> Vec<Event> {
        if src.is_empty() {
            return Vec::new();
        }
        match mml::parse(src) {
            Ok(events) => events,
            Err(err) => {
                warn!("MML parse failure: {err}");
                Vec::new()
            }
        }
    }

    /// Repeat the whole score when every voice finishes.
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Stop playback. Voices gate off on the next frame tick.
    pub fn stop(&mut self) {
        self.playing = false;
        for track in &mut self.music {
            track.finished = true;
        }
    }

    /// Play a sound effect, preferring an idle voice and stealing by the
    /// configured order otherwise. Returns the chosen voice.
    pub fn play_sfx(&mut self, src: &str) -> Option<usize> {
        let events = Self::parse_or_empty(src);
        if events.is_empty() {
            return None;
        }
        let voice = self
            .steal_order
            .iter()
            .copied()
            .find(|&v| self.sfx[v].is_none() && self.music[v].finished)
            .or_else(|| {
                self.steal_order
                    .iter()
                    .copied()
                    .find(|&v| self.sfx[v].is_none())
            })?;
        self.sfx[voice] = Some(Track::new(events));
        Some(voice)
    }

    /// One logical frame. Called from the bus frame accumulator.
    pub fn tick(&mut self, sid1: &mut NovaSid, sid2: &mut NovaSid) {
        if !self.volume_init {
            sid1.write(0x18, 0x0F);
            sid2.write(0x18, 0x0F);
            self.volume_init = true;
        }

        for voice in 0..VOICE_COUNT {
            let channel = voice % 3;
            let chip = if voice < 3 { &mut *sid1 } else { &mut *sid2 };

            if let Some(sfx) = &mut self.sfx[voice] {
                sfx.tick(chip, channel, &self.instruments, self.cpu_hz);
                if sfx.finished {
                    self.sfx[voice] = None;
                }
                continue;
            }

            if self.playing {
                self.music[voice].tick(chip, channel, &self.instruments, self.cpu_hz);
            }
        }

        if self.playing && self.music.iter().all(|t| t.finished) {
            if self.looping {
                for voice in 0..VOICE_COUNT {
                    let src = self.sources[voice].clone();
                    self.music[voice] = Track::new(Self::parse_or_empty(&src));
                }
            } else {
                self.playing = false;
                for voice in 0..VOICE_COUNT {
                    if self.sfx[voice].is_none() {
                        let channel = voice % 3;
                        let chip = if voice < 3 { &mut *sid1 } else { &mut *sid2 };
                        let base = (channel * 7) as u8;
                        self.music[voice].gate_off(chip, base, &self.instruments);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CPU_HZ: u32 = 12_000_000;

    fn chips() -> (NovaSid, NovaSid) {
        (NovaSid::new(CPU_HZ, 44_100), NovaSid::new(CPU_HZ, 44_100))
    }

    #[test]
    fn note_freq_scales_with_pitch() {
        let a4 = note_freq(69, CPU_HZ);
        let a5 = note_freq(81, CPU_HZ);
        assert!(a5 > a4);
        // One octave doubles the register value (within rounding)
        assert!((i32::from(a5) - 2 * i32::from(a4)).abs() <= 1);
    }

    #[test]
    fn playing_status_and_note_mirror() {
        let (mut s1, mut s2) = chips();
        let mut engine = MusicEngine::new(CPU_HZ);
        engine.play(&["T120 L4 C D"]);
        assert_eq!(engine.read(0xBA50), 1);
        engine.tick(&mut s1, &mut s2);
        assert_eq!(engine.read(0xBA51), 60, "voice 0 mirrors its note");
        assert_eq!(engine.read(0xBA52), 0, "idle voice mirrors silence");
    }

    #[test]
    fn two_quarters_at_120_finish_in_sixty_frames() {
        let (mut s1, mut s2) = chips();
        let mut engine = MusicEngine::new(CPU_HZ);
        engine.play(&["T120 L4 C D"]);
        // 2 x 96 ticks at 3.2 ticks/frame = 60 frames
        for _ in 0..60 {
            engine.tick(&mut s1, &mut s2);
        }
        // One more tick retires the stream
        engine.tick(&mut s1, &mut s2);
        assert!(!engine.is_playing());
    }

    #[test]
    fn loop_mode_restarts_voices() {
        let (mut s1, mut s2) = chips();
        let mut engine = MusicEngine::new(CPU_HZ);
        engine.set_looping(true);
        engine.play(&["T120 L4 C"]);
        for _ in 0..120 {
            engine.tick(&mut s1, &mut s2);
        }
        assert!(engine.is_playing(), "looping music keeps playing");
    }

    #[test]
    fn loop_expansion_matches_unrolled_score() {
        // [CD]2E must sequence like C D C D E
        let looped = mml::parse("[CD]2E").expect("parse");
        let unrolled = mml::parse("C D C D E").expect("parse");
        let looped_notes: Vec<_> = looped
            .iter()
            .filter(|e| matches!(e, Event::NoteOn { .. }))
            .collect();
        let unrolled_notes: Vec<_> = unrolled
            .iter()
            .filter(|e| matches!(e, Event::NoteOn { .. }))
            .collect();
        assert_eq!(looped_notes, unrolled_notes);
    }

    #[test]
    fn gate_writes_reach_the_chip() {
        let (mut s1, mut s2) = chips();
        let mut engine = MusicEngine::new(CPU_HZ);
        engine.play(&["C1"]);
        engine.tick(&mut s1, &mut s2);
        assert!(s1.voices[0].gate(), "note-on gates voice 0");
        assert!(s1.voices[0].frequency > 0);
    }

    #[test]
    fn sfx_prefers_idle_voice_and_releases_it() {
        let (mut s1, mut s2) = chips();
        let mut engine = MusicEngine::new(CPU_HZ);
        engine.play(&["T120 C1", "T120 C1"]); // voices 0 and 1 busy
        let voice = engine.play_sfx("T120 L16 O6 C").expect("sfx voice");
        assert!(voice >= 2, "prefers a voice without live music");
        for _ in 0..20 {
            engine.tick(&mut s1, &mut s2);
        }
        assert!(engine.sfx[voice].is_none(), "sfx voice released");
    }

    #[test]
    fn sfx_steals_when_everything_is_busy() {
        let mut engine = MusicEngine::new(CPU_HZ);
        engine.play(&["C1", "C1", "C1", "C1", "C1", "C1"]);
        let voice = engine.play_sfx("O6 C16").expect("stolen voice");
        assert_eq!(voice, 5, "steals the most expendable voice first");
    }

    #[test]
    fn stop_halts_playback() {
        let (mut s1, mut s2) = chips();
        let mut engine = MusicEngine::new(CPU_HZ);
        engine.play(&["C1 D1 E1"]);
        engine.tick(&mut s1, &mut s2);
        engine.stop();
        engine.tick(&mut s1, &mut s2);
        assert!(!engine.is_playing());
        assert_eq!(engine.read(0xBA50), 0);
    }
}
