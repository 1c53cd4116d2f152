//! Music Macro Language parser.
//!
//! Text scores become a finite event stream. A whole note is 384 ticks, so
//! `C4` is a 96-tick quarter. Octave, default length and accidentals are
//! resolved at parse time; tempo, instrument and effect changes pass
//! through as events for the engine.
//!
//! Syntax: notes `A`-`G` with `#`/`+`/`-` accidentals, optional length
//! denominator, dots, and `&` ties; `R` rests; `O`/`<`/`>` octave;
//! `L` default length; `T` tempo; `I` instrument; `~n` vibrato depth;
//! `Pnnn` pulse width and `P+`/`P-`/`P0` sweep; `Fc;r` filter cutoff and
//! resonance; `M0/M1/M2/M4` filter mode; `S+`/`S-`/`S0` filter sweep;
//! `/` marks the next note as a portamento target; `{CEG}4` arpeggio;
//! `[...]n` loops. Loops are expanded textually (bracketed by sentinel
//! runs) before tokenisation, so the event stream is always finite.

use thiserror::Error;

/// Ticks per whole note.
pub const TICKS_PER_WHOLE: u32 = 384;

/// Default octave at the start of a track.
const DEFAULT_OCTAVE: i32 = 4;
/// Default length denominator (quarter notes).
const DEFAULT_LEN: u32 = 4;

/// A parsed score event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NoteOn { midi: u8, ticks: u32 },
    Rest { ticks: u32 },
    ArpStart { count: u8, ticks: u32, notes: Vec<u8> },
    SetTempo(u16),
    SetInstrument(u8),
    SetVibrato(u8),
    SetPulseWidth(u16),
    /// +1 up, -1 down, 0 off.
    PwmSweep(i8),
    /// The next `NoteOn` is a portamento target.
    Portamento,
    SetFilterCutoff { cutoff: u8, resonance: u8 },
    /// 0 off, 1 low-pass, 2 band-pass, 4 high-pass.
    FilterMode(u8),
    FilterSweep(i8),
    /// Loop sentinels survive expansion as markers; zero-tick no-ops.
    LoopStart(u8),
    LoopEnd(u8),
}

/// Parse failures. Callers typically degrade to an empty event list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MmlError {
    #[error("unexpected character {0:?} at offset {1}")]
    Unexpected(char, usize),
    #[error("unbalanced loop brackets")]
    UnbalancedLoop,
    #[error("empty arpeggio braces")]
    EmptyArp,
    #[error("bad filter spec (expected Fcutoff;resonance)")]
    BadFilter,
}

/// Parse one MML track into events.
pub fn parse(src: &str) -> Result<Vec<Event>, MmlError> {
    let expanded = expand_loops(src)?;
    tokenize(&expanded)
}

/// Rewrite `[ ... ]n` into the body repeated n times, bracketed by
/// `(n ... )n` sentinels, innermost loops first. Missing counts repeat
/// twice.
fn expand_loops(src: &str) -> Result<String, MmlError> {
    let mut text: Vec<char> = src.chars().collect();
    loop {
        // Innermost '[': the last one before the first ']'
        let Some(close) = text.iter().position(|&c| c == ']') else {
            if text.contains(&'[') {
                return Err(MmlError::UnbalancedLoop);
            }
            return Ok(text.into_iter().collect());
        };
        let open = text[..close]
            .iter()
            .rposition(|&c| c == '[')
            .ok_or(MmlError::UnbalancedLoop)?;

        let body: String = text[open + 1..close].iter().collect();

        // Repeat count digits after ']'
        let mut digits = String::new();
        let mut after = close + 1;
        while after < text.len() && text[after].is_ascii_digit() {
            digits.push(text[after]);
            after += 1;
        }
        let count: u32 = if digits.is_empty() {
            2
        } else {
            digits.parse().unwrap_or(2)
        };

        let mut replacement = format!("({count}");
        for _ in 0..count {
            replacement.push_str(&body);
        }
        replacement.push_str(&format!("){count}"));

        let mut next: Vec<char> = text[..open].to_vec();
        next.extend(replacement.chars());
        next.extend_from_slice(&text[after..]);
        text = next;
    }
}

struct Tokenizer {
    chars: Vec<char>,
    pos: usize,
}

impl Tokenizer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace() || c == '|') {
            self.pos += 1;
        }
    }

    fn number(&mut self) -> Option<u32> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        self.chars[start..self.pos]
            .iter()
            .collect::<String>()
            .parse()
            .ok()
    }

    /// Length denominator + dots + ties, as ticks.
    fn duration(&mut self, default_len: u32) -> u32 {
        let denom = self.number().unwrap_or(default_len).clamp(1, 64);
        let mut ticks = TICKS_PER_WHOLE / denom;
        while self.peek() == Some('.') {
            self.pos += 1;
            ticks = ticks * 3 / 2;
        }
        ticks
    }

    /// Note letter (+ accidental) to a semitone within the octave.
    fn semitone(&mut self, letter: char) -> i32 {
        let base = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            _ => 11, // B
        };
        match self.peek() {
            Some('#' | '+') => {
                self.pos += 1;
                base + 1
            }
            Some('-') => {
                self.pos += 1;
                base - 1
            }
            _ => base,
        }
    }
}

fn midi_note(octave: i32, semitone: i32) -> u8 {
    ((octave + 1) * 12 + semitone).clamp(0, 127) as u8
}

#[allow(clippy::too_many_lines)]
fn tokenize(src: &str) -> Result<Vec<Event>, MmlError> {
    let mut t = Tokenizer {
        chars: src.to_uppercase().chars().collect(),
        pos: 0,
    };
    let mut events = Vec::new();
    let mut octave = DEFAULT_OCTAVE;
    let mut default_len = DEFAULT_LEN;

    loop {
        t.skip_ws();
        let at = t.pos;
        let Some(c) = t.bump() else {
            return Ok(events);
        };
        match c {
            'C' | 'D' | 'E' | 'F' | 'G' | 'A' | 'B' => {
                // 'F' doubles as the filter command when followed by a
                // cutoff;resonance pair
                if c == 'F' && is_filter_spec(&t) {
                    let cutoff = t.number().ok_or(MmlError::BadFilter)?;
                    if t.bump() != Some(';') {
                        return Err(MmlError::BadFilter);
                    }
                    let resonance = t.number().ok_or(MmlError::BadFilter)?;
                    events.push(Event::SetFilterCutoff {
                        cutoff: cutoff.min(255) as u8,
                        resonance: resonance.min(15) as u8,
                    });
                    continue;
                }
                let semi = t.semitone(c);
                let mut ticks = t.duration(default_len);
                // Ties: `&` plus an optional repeated pitch adds duration
                loop {
                    t.skip_ws();
                    if t.peek() != Some('&') {
                        break;
                    }
                    t.pos += 1;
                    t.skip_ws();
                    if matches!(t.peek(), Some('C' | 'D' | 'E' | 'G' | 'A' | 'B' | 'F')) {
                        let letter = t.bump().unwrap_or('C');
                        let _ = t.semitone(letter);
                    }
                    ticks += t.duration(default_len);
                }
                events.push(Event::NoteOn {
                    midi: midi_note(octave, semi),
                    ticks,
                });
            }
            'R' => {
                let ticks = t.duration(default_len);
                events.push(Event::Rest { ticks });
            }
            'O' => {
                octave = t.number().unwrap_or(DEFAULT_OCTAVE as u32).min(8) as i32;
            }
            '>' => octave = (octave + 1).min(8),
            '<' => octave = (octave - 1).max(0),
            'L' => {
                default_len = t.number().unwrap_or(DEFAULT_LEN).clamp(1, 64);
            }
            'T' => {
                let bpm = t.number().unwrap_or(120).clamp(20, 999);
                events.push(Event::SetTempo(bpm as u16));
            }
            'I' => {
                let id = t.number().unwrap_or(0).min(15);
                events.push(Event::SetInstrument(id as u8));
            }
            '~' => {
                let depth = t.number().unwrap_or(0).min(255);
                events.push(Event::SetVibrato(depth as u8));
            }
            'P' => match t.peek() {
                Some('+') => {
                    t.pos += 1;
                    events.push(Event::PwmSweep(1));
                }
                Some('-') => {
                    t.pos += 1;
                    events.push(Event::PwmSweep(-1));
                }
                Some('0') if t.chars.get(t.pos + 1).is_none_or(|c| !c.is_ascii_digit()) => {
                    t.pos += 1;
                    events.push(Event::PwmSweep(0));
                }
                _ => {
                    let pw = t.number().ok_or(MmlError::Unexpected('P', at))?;
                    events.push(Event::SetPulseWidth((pw & 0xFFF) as u16));
                }
            },
            'M' => {
                let mode = t.number().ok_or(MmlError::Unexpected('M', at))?;
                if !matches!(mode, 0 | 1 | 2 | 4) {
                    return Err(MmlError::BadFilter);
                }
                events.push(Event::FilterMode(mode as u8));
            }
            'S' => match t.bump() {
                Some('+') => events.push(Event::FilterSweep(1)),
                Some('-') => events.push(Event::FilterSweep(-1)),
                Some('0') => events.push(Event::FilterSweep(0)),
                _ => return Err(MmlError::Unexpected('S', at)),
            },
            '/' => events.push(Event::Portamento),
            '{' => {
                let mut notes = Vec::new();
                loop {
                    t.skip_ws();
                    match t.bump() {
                        Some('}') => break,
                        Some(l @ ('C' | 'D' | 'E' | 'F' | 'G' | 'A' | 'B')) => {
                            let semi = t.semitone(l);
                            notes.push(midi_note(octave, semi));
                        }
                        Some(other) => return Err(MmlError::Unexpected(other, t.pos - 1)),
                        None => return Err(MmlError::EmptyArp),
                    }
                }
                if notes.is_empty() {
                    return Err(MmlError::EmptyArp);
                }
                let ticks = t.duration(default_len);
                events.push(Event::ArpStart {
                    count: notes.len() as u8,
                    ticks,
                    notes,
                });
            }
            '(' => {
                let count = t.number().unwrap_or(0).min(255);
                events.push(Event::LoopStart(count as u8));
            }
            ')' => {
                let count = t.number().unwrap_or(0).min(255);
                events.push(Event::LoopEnd(count as u8));
            }
            other => return Err(MmlError::Unexpected(other, at)),
        }
    }
}

/// A filter spec follows `F` when digits lead to a semicolon.
fn is_filter_spec(t: &Tokenizer) -> bool {
    let mut pos = t.pos;
    let mut saw_digit = false;
    while let Some(&c) = t.chars.get(pos) {
        if c.is_ascii_digit() {
            saw_digit = true;
            pos += 1;
        } else {
            return saw_digit && c == ';';
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notes(events: &[Event]) -> Vec<(u8, u32)> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::NoteOn { midi, ticks } => Some((*midi, *ticks)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn quarter_notes_at_default_octave() {
        let events = parse("L4 C4 D E F").expect("parse");
        assert_eq!(
            notes(&events),
            vec![(60, 96), (62, 96), (64, 96), (65, 96)]
        );
    }

    #[test]
    fn accidentals_and_octave_shifts() {
        let events = parse("O5 C# < B-").expect("parse");
        assert_eq!(notes(&events), vec![(73, 96), (70, 96)]);
    }

    #[test]
    fn dotted_duration_is_half_again() {
        let events = parse("C4.").expect("parse");
        assert_eq!(notes(&events), vec![(60, 144)]);
    }

    #[test]
    fn tie_adds_durations() {
        let events = parse("C4&4").expect("parse");
        assert_eq!(notes(&events), vec![(60, 192)]);
        let events = parse("C4 & C8").expect("parse");
        assert_eq!(notes(&events), vec![(60, 96 + 48)]);
    }

    #[test]
    fn rest_has_duration() {
        let events = parse("R2").expect("parse");
        assert_eq!(events, vec![Event::Rest { ticks: 192 }]);
    }

    #[test]
    fn loop_expansion_repeats_body() {
        let events = parse("[CD]2E").expect("parse");
        let pitches: Vec<u8> = notes(&events).iter().map(|&(m, _)| m).collect();
        assert_eq!(pitches, vec![60, 62, 60, 62, 64]);
        // Sentinels survive as zero-tick markers
        assert!(events.contains(&Event::LoopStart(2)));
        assert!(events.contains(&Event::LoopEnd(2)));
    }

    #[test]
    fn nested_loops_expand_inner_first() {
        let events = parse("[C[D]2]2").expect("parse");
        let pitches: Vec<u8> = notes(&events).iter().map(|&(m, _)| m).collect();
        assert_eq!(pitches, vec![60, 62, 62, 60, 62, 62]);
    }

    #[test]
    fn unbalanced_loop_fails() {
        assert_eq!(parse("[CD"), Err(MmlError::UnbalancedLoop));
        assert_eq!(parse("CD]2"), Err(MmlError::UnbalancedLoop));
    }

    #[test]
    fn tempo_instrument_vibrato() {
        let events = parse("T140 I3 ~12 C").expect("parse");
        assert_eq!(events[0], Event::SetTempo(140));
        assert_eq!(events[1], Event::SetInstrument(3));
        assert_eq!(events[2], Event::SetVibrato(12));
    }

    #[test]
    fn pulse_width_and_sweep() {
        let events = parse("P2048 P+ P- P0").expect("parse");
        assert_eq!(events[0], Event::SetPulseWidth(2048 & 0xFFF));
        assert_eq!(events[1], Event::PwmSweep(1));
        assert_eq!(events[2], Event::PwmSweep(-1));
        assert_eq!(events[3], Event::PwmSweep(0));
    }

    #[test]
    fn filter_events() {
        let events = parse("F128;7 M1 S+ S0").expect("parse");
        assert_eq!(
            events[0],
            Event::SetFilterCutoff {
                cutoff: 128,
                resonance: 7
            }
        );
        assert_eq!(events[1], Event::FilterMode(1));
        assert_eq!(events[2], Event::FilterSweep(1));
        assert_eq!(events[3], Event::FilterSweep(0));
    }

    #[test]
    fn f_note_still_parses_as_a_note() {
        let events = parse("F8").expect("parse");
        assert_eq!(notes(&events), vec![(65, 48)]);
    }

    #[test]
    fn portamento_marks_next_note() {
        let events = parse("C /G").expect("parse");
        assert_eq!(events[0], Event::NoteOn { midi: 60, ticks: 96 });
        assert_eq!(events[1], Event::Portamento);
        assert_eq!(events[2], Event::NoteOn { midi: 67, ticks: 96 });
    }

    #[test]
    fn arpeggio_collects_notes() {
        let events = parse("{CEG}4").expect("parse");
        assert_eq!(
            events[0],
            Event::ArpStart {
                count: 3,
                ticks: 96,
                notes: vec![60, 64, 67]
            }
        );
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(parse("C D ? E").is_err());
    }
}
