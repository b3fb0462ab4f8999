//! Character to code-sequence encoding with Farnsworth spacing.
//!
//! Marks are timed from the effective character speed; when the text speed
//! is slower, the surplus time each word implies is injected at the
//! configured spacing points. A standard word is 50 dot units with four
//! inter-character gaps and one word gap, which is where the 1/6 and 1/3
//! splits below come from.

use crate::pool::CodeElements;
use crate::tables;
use crate::types::{MorseConfig, Spacing, LATCH_MARK_END, LATCH_MARK_START};

/// Buffer an encoder fills; same capacity as a pool entry
pub type CodeBuf = CodeElements;

/// Mark lengths in dot units
const DASH_UNITS: f32 = 3.0;
const LONG_DASH_UNITS: f32 = 6.0;
const EXTRA_DASH_UNITS: f32 = 9.0;
/// Gap lengths in dot units
const INTRA_CHAR_UNITS: f32 = 2.0;
const CHAR_SPACE_UNITS: f32 = 3.0;
const WORD_SPACE_UNITS: f32 = 7.0;

/// Round a positive millisecond count
fn ms(x: f32) -> i32 {
    (x + 0.5) as i32
}

pub struct Encoder {
    cfg: MorseConfig,
    dot_ms: f32,
    char_space_ms: f32,
    word_space_ms: f32,
    /// Gap owed before the next character's first mark
    pending_space_ms: f32,
    latched: bool,
}

impl Encoder {
    pub fn new(cfg: MorseConfig) -> Self {
        let mut enc = Self {
            cfg,
            dot_ms: 0.0,
            char_space_ms: 0.0,
            word_space_ms: 0.0,
            pending_space_ms: 0.0,
            latched: false,
        };
        enc.recalculate();
        enc
    }

    pub fn config(&self) -> &MorseConfig {
        &self.cfg
    }

    pub fn set_config(&mut self, cfg: MorseConfig) {
        self.cfg = cfg;
        self.recalculate();
        self.reset();
    }

    /// Unit dot length in milliseconds
    pub fn dot_ms(&self) -> f32 {
        self.dot_ms
    }

    /// Forget any owed gap; call at the start of a fresh sequence
    pub fn reset(&mut self) {
        self.pending_space_ms = 0.0;
    }

    fn recalculate(&mut self) {
        let eff = self.cfg.effective_char_wpm() as f32;
        let text = self.cfg.text_wpm as f32;
        self.dot_ms = 1200.0 / eff;
        self.char_space_ms = CHAR_SPACE_UNITS * self.dot_ms;
        self.word_space_ms = WORD_SPACE_UNITS * self.dot_ms;
        if text < eff {
            // Surplus per standard word, split across its gaps
            let delta = 60_000.0 / text - 60_000.0 / eff;
            match self.cfg.spacing {
                Spacing::None => {}
                Spacing::Char => {
                    self.char_space_ms += delta / 6.0;
                    self.word_space_ms += delta / 3.0;
                }
                Spacing::Word => {
                    self.word_space_ms += delta;
                }
            }
        }
    }

    /// Append the code for one character to `out`
    pub fn encode_char(&mut self, c: char, out: &mut CodeBuf) {
        if c == ' ' {
            out.push(-ms(self.word_space_ms)).ok();
            self.pending_space_ms = 0.0;
            return;
        }
        if c == '~' {
            // Circuit marker, not a letter: latch or release the line
            self.flush_gap(out);
            if self.latched {
                out.push(LATCH_MARK_END).ok();
                self.latched = false;
                self.pending_space_ms = self.char_space_ms;
            } else {
                out.push(LATCH_MARK_START).ok();
                self.latched = true;
            }
            return;
        }
        let symbols = match tables::lookup(self.cfg.table, c) {
            Some(s) => s,
            None => {
                // Undefined character: widen the gap to a word gap
                if self.pending_space_ms < self.word_space_ms {
                    self.pending_space_ms = self.word_space_ms;
                }
                return;
            }
        };
        self.flush_gap(out);
        let mut need_gap = false;
        for sym in symbols.chars() {
            if sym == ' ' {
                out.push(-ms(INTRA_CHAR_UNITS * self.dot_ms)).ok();
                need_gap = false;
                continue;
            }
            if need_gap {
                out.push(-ms(self.dot_ms)).ok();
            }
            let units = match sym {
                '.' => 1.0,
                '-' => DASH_UNITS,
                '=' => LONG_DASH_UNITS,
                '_' => EXTRA_DASH_UNITS,
                _ => 1.0,
            };
            out.push(ms(units * self.dot_ms)).ok();
            need_gap = true;
        }
        self.pending_space_ms = self.char_space_ms;
    }

    /// Append the code for a whole string
    pub fn encode_str(&mut self, text: &str, out: &mut CodeBuf) {
        for c in text.chars() {
            self.encode_char(c, out);
        }
    }

    fn flush_gap(&mut self, out: &mut CodeBuf) {
        if self.pending_space_ms > 0.0 {
            out.push(-ms(self.pending_space_ms)).ok();
            self.pending_space_ms = 0.0;
        }
    }
}
