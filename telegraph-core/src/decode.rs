//! Streaming code-sequence to text decoding.
//!
//! The decoder keeps running totals of consecutive mark and space time.
//! A mark is classified (dot, dash, long dash, extra-long dash) only once
//! the space after it completes, i.e. on the space-to-mark transition.
//! Because American code contains spaced letters, a completed pattern
//! cannot be resolved until the next one exists: up to two undecided
//! characters are buffered, and the pair is either merged (with or without
//! an internal space) or the older one is emitted and the newer shifted
//! into its place.
//!
//! Since two characters must be buffered before either resolves, callers
//! arrange a deferred flush ([`Decoder::flush_delay`]) that forces pending
//! characters out when the key goes quiet.

use heapless::String;

use crate::hal::Duration;
use crate::tables::{self, CodeTable};
use crate::types::{MorseConfig, Text, LATCH_MARK_END, LATCH_MARK_START, LONG_BREAK};

/// Glyph emitted when the circuit is latched closed
pub const CLOSED_CIRCUIT_GLYPH: char = '+';

/// Equivalent space credited for a long-break marker, so detected loss
/// shows up as a visible gap in the transcript
const LONG_BREAK_SPACE_MS: i32 = 2_000;

/// Most leading spaces ever reproduced before one character
const MAX_LEAD_SPACES: usize = 6;

/// Tuned decode thresholds, in units of the calibrated true dot.
///
/// These values carry the decode accuracy of the system; they are kept
/// together and adjustable rather than derived from first principles.
#[derive(Copy, Clone, Debug)]
pub struct Calibration {
    /// Configured dot length in milliseconds
    pub dot_ms: f32,
    /// Adaptive dot length tracking the sender's hand
    pub true_dot_ms: f32,
    /// Marks shorter than this many true dots are dots
    pub mark_dot_max: f32,
    /// ... shorter than this are dashes
    pub mark_dash_max: f32,
    /// ... shorter than this are long dashes (L); beyond, extra-long (0)
    pub mark_long_dash_max: f32,
    /// Spaces at least this long end the character being built
    pub char_space_min: f32,
    /// Gap below which two buffered patterns are merged unspaced
    pub min_char_space: f32,
    /// Gap ceiling for merging two patterns into one spaced letter
    pub morse_ratio: f32,
    /// Idle time, in dot widths, before pending characters are forced out
    pub flush_dot_widths: f32,
}

impl Calibration {
    pub fn for_dot(dot_ms: f32) -> Self {
        Self {
            dot_ms,
            true_dot_ms: dot_ms,
            mark_dot_max: 2.0,
            mark_dash_max: 4.5,
            mark_long_dash_max: 7.5,
            char_space_min: 1.7,
            min_char_space: 2.6,
            morse_ratio: 5.0,
            flush_dot_widths: 20.0,
        }
    }
}

type Pattern = String<16>;

struct Pending {
    pattern: Pattern,
    /// Gap that preceded this character's first mark
    space_before_ms: i32,
}

pub struct Decoder {
    table: CodeTable,
    cal: Calibration,
    /// Consecutive mark time not yet classified
    mark_ms: i32,
    /// Consecutive space time not yet acted on
    space_ms: i32,
    /// Symbols of the character currently being keyed
    pattern: Pattern,
    pending: Option<Pending>,
    /// Gap that ended the pending character (= gap before the current one)
    last_boundary_ms: i32,
    latched: bool,
}

impl Decoder {
    pub fn new(cfg: &MorseConfig) -> Self {
        Self {
            table: cfg.table,
            cal: Calibration::for_dot(cfg.dot_ms() as f32),
            mark_ms: 0,
            space_ms: 0,
            pattern: Pattern::new(),
            pending: None,
            last_boundary_ms: 0,
            latched: false,
        }
    }

    pub fn set_config(&mut self, cfg: &MorseConfig) {
        self.table = cfg.table;
        self.cal = Calibration::for_dot(cfg.dot_ms() as f32);
        self.mark_ms = 0;
        self.space_ms = 0;
        self.pattern.clear();
        self.pending = None;
        self.last_boundary_ms = 0;
        self.latched = false;
    }

    pub fn calibration(&self) -> &Calibration {
        &self.cal
    }

    /// Speed of the incoming hand, from the adaptive dot length
    pub fn detected_wpm(&self) -> u16 {
        (1200.0 / self.cal.true_dot_ms) as u16
    }

    /// How long after the last activity pending characters should be
    /// forced out
    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis((self.cal.flush_dot_widths * self.cal.true_dot_ms) as u64)
    }

    /// Consume a code sequence, returning whatever text resolved
    pub fn feed(&mut self, code: &[i32]) -> Text {
        let mut out = Text::new();
        for &e in code {
            if e == LATCH_MARK_START {
                self.flush_into(&mut out);
                self.latched = true;
                out.push(CLOSED_CIRCUIT_GLYPH).ok();
            } else if e == LATCH_MARK_END {
                self.latched = false;
                self.mark_ms = 0;
                self.space_ms = 0;
            } else if e == LONG_BREAK {
                self.flush_into(&mut out);
                self.last_boundary_ms = self.last_boundary_ms.saturating_add(LONG_BREAK_SPACE_MS);
            } else if self.latched {
                // Circuit held closed: element timing carries no code
            } else if e > 0 {
                if self.space_ms > 0 {
                    self.end_space(&mut out);
                }
                self.mark_ms = self.mark_ms.saturating_add(e);
            } else if e < 0 {
                self.space_ms = self.space_ms.saturating_add(-e);
            }
        }
        out
    }

    /// Force resolution of any pending characters (decode-flush timeout)
    pub fn flush(&mut self) -> Text {
        let mut out = Text::new();
        self.flush_into(&mut out);
        out
    }

    fn flush_into(&mut self, out: &mut Text) {
        self.classify_mark();
        if !self.pattern.is_empty() {
            let boundary = self.space_ms;
            self.space_ms = 0;
            self.complete_char(boundary, out);
        }
        if let Some(p) = self.pending.take() {
            self.emit(&p, out);
        }
        self.space_ms = 0;
        self.last_boundary_ms = 0;
    }

    /// A space just ended (a new mark is starting)
    fn end_space(&mut self, out: &mut Text) {
        self.classify_mark();
        let sp = self.space_ms;
        self.space_ms = 0;
        if sp as f32 >= self.cal.char_space_min * self.cal.true_dot_ms {
            self.complete_char(sp, out);
        }
    }

    /// Turn the accumulated mark into a symbol on the current pattern
    fn classify_mark(&mut self) {
        if self.mark_ms <= 0 {
            return;
        }
        let mark = self.mark_ms as f32;
        self.mark_ms = 0;
        let r = mark / self.cal.true_dot_ms;
        let sym = if r < self.cal.mark_dot_max {
            // Track the sender's hand on dots only
            let adjusted = self.cal.true_dot_ms + (mark - self.cal.true_dot_ms) / 4.0;
            self.cal.true_dot_ms = adjusted
                .max(0.5 * self.cal.dot_ms)
                .min(2.0 * self.cal.dot_ms);
            '.'
        } else if r < self.cal.mark_dash_max {
            '-'
        } else if r < self.cal.mark_long_dash_max {
            '='
        } else {
            '_'
        };
        self.pattern.push(sym).ok();
    }

    /// The current pattern is complete; `boundary` is the space ending it
    fn complete_char(&mut self, boundary: i32, out: &mut Text) {
        if self.pattern.is_empty() {
            // Nothing keyed yet: fold the gap into the one before it
            self.last_boundary_ms = self.last_boundary_ms.saturating_add(boundary);
            return;
        }
        let p = Pending {
            pattern: self.pattern.clone(),
            space_before_ms: self.last_boundary_ms,
        };
        self.pattern.clear();
        self.last_boundary_ms = boundary;
        match self.pending.take() {
            None => self.pending = Some(p),
            Some(first) => self.resolve(first, p, out),
        }
    }

    /// Decide what two adjacent undecided characters really are
    fn resolve(&mut self, first: Pending, second: Pending, out: &mut Text) {
        let gap_dots = second.space_before_ms as f32 / self.cal.true_dot_ms;

        // A spaced letter typed with its internal gap, however wide?
        if gap_dots < self.cal.morse_ratio {
            let mut combined = Pattern::new();
            let fits = combined.push_str(&first.pattern).is_ok()
                && combined.push(' ').is_ok()
                && combined.push_str(&second.pattern).is_ok();
            if fits && tables::reverse_lookup(self.table, &combined).is_some() {
                self.pending = Some(Pending {
                    pattern: combined,
                    space_before_ms: first.space_before_ms,
                });
                return;
            }
        }

        // One character whose marks merely drifted apart?
        if gap_dots < self.cal.min_char_space {
            let mut joined = first.pattern.clone();
            if joined.push_str(&second.pattern).is_ok() {
                self.pending = Some(Pending {
                    pattern: joined,
                    space_before_ms: first.space_before_ms,
                });
                return;
            }
        }

        // Genuinely separate: the older one is decided now
        self.emit(&first, out);
        self.pending = Some(second);
    }

    fn emit(&self, p: &Pending, out: &mut Text) {
        let widths = p.space_before_ms as f32 / (3.0 * self.cal.true_dot_ms);
        let lead = (widths as usize).saturating_sub(1).min(MAX_LEAD_SPACES);
        for _ in 0..lead {
            out.push(' ').ok();
        }
        match tables::reverse_lookup(self.table, &p.pattern) {
            Some(c) => {
                out.push(c).ok();
            }
            None => {
                out.push('[').ok();
                out.push_str(&p.pattern).ok();
                out.push(']').ok();
            }
        }
    }
}
