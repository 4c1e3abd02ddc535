//! Pattern string grammar.
//!
//! Comma-separated entries: `offset[:velocity][~][/ticks]` for a note (`~`
//! ties it into the next note), `-[/ticks]` for a pause, or a wildcard
//! character (from the consumer-declared set) in place of the offset.
//! A trailing `@tpb` sets the pattern's ticks-per-beat. Parenthesized
//! sub-lists take `*n` (repeat) and `+d`/`-d` (transpose) postfixes, and
//! `E(p,s,on,off)` expands to the Euclidean rhythm of `p` pulses in `s`
//! steps with `on`/`off` substituted per slot.

use crate::error::EngineError;
use crate::pattern::{Pattern, PatternEntry};

/// Wildcard set and defaults a consumer parses patterns with.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions<'a> {
    /// Characters allowed in place of a note offset.
    pub wildcards: &'a [char],
    /// Velocity of notes that do not carry one.
    pub default_velocity: i32,
    /// Ticks-per-beat when the pattern has no `@tpb` suffix.
    pub default_ticks_per_beat: u32,
}

impl Default for ParseOptions<'_> {
    fn default() -> Self {
        ParseOptions {
            wildcards: &[],
            default_velocity: 32767,
            default_ticks_per_beat: 4,
        }
    }
}

/// Parse a pattern string.
pub fn parse_pattern(input: &str, options: &ParseOptions) -> Result<Pattern, EngineError> {
    let syntax = |message: String| EngineError::PatternSyntax {
        pattern: input.to_string(),
        message,
    };
    let (body, ticks_per_beat) = match input.rsplit_once('@') {
        Some((body, tpb)) => {
            let tpb: u32 = tpb
                .trim()
                .parse()
                .map_err(|_| syntax(format!("invalid ticks-per-beat '{}'", tpb)))?;
            if tpb == 0 {
                return Err(syntax("ticks-per-beat must be positive".to_string()));
            }
            (body, tpb)
        }
        None => (input, options.default_ticks_per_beat),
    };
    let mut parser = Parser {
        chars: body.chars().collect(),
        pos: 0,
        input,
        options,
    };
    let entries = parser.parse_list()?;
    if parser.pos != parser.chars.len() {
        return Err(syntax(format!(
            "unexpected '{}' at position {}",
            parser.chars[parser.pos], parser.pos
        )));
    }
    if entries.is_empty() {
        return Err(syntax("empty pattern".to_string()));
    }
    Ok(Pattern::new(entries, ticks_per_beat))
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    input: &'a str,
    options: &'a ParseOptions<'a>,
}

impl Parser<'_> {
    fn syntax(&self, message: String) -> EngineError {
        EngineError::PatternSyntax {
            pattern: self.input.to_string(),
            message,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_list(&mut self) -> Result<Vec<PatternEntry>, EngineError> {
        let mut entries = Vec::new();
        loop {
            entries.extend(self.parse_element()?);
            if !self.eat(',') {
                break;
            }
        }
        Ok(entries)
    }

    fn parse_element(&mut self) -> Result<Vec<PatternEntry>, EngineError> {
        if self.eat('(') {
            let inner = self.parse_list()?;
            if !self.eat(')') {
                return Err(self.syntax("unclosed '('".to_string()));
            }
            self.parse_group_postfix(inner)
        } else if self.peek() == Some('E') && self.chars.get(self.pos + 1) == Some(&'(') {
            self.parse_euclidean()
        } else {
            Ok(vec![self.parse_entry()?])
        }
    }

    fn parse_group_postfix(
        &mut self,
        mut entries: Vec<PatternEntry>,
    ) -> Result<Vec<PatternEntry>, EngineError> {
        loop {
            if self.eat('*') {
                let n = self.parse_integer()? as u32;
                if n == 0 {
                    return Err(self.syntax("repeat count must be positive".to_string()));
                }
                let base = entries.clone();
                for _ in 1..n {
                    entries.extend(base.iter().copied());
                }
            } else if self.eat('+') {
                let d = self.parse_integer()? as i32;
                transpose_entries(&mut entries, d);
            } else if self.peek() == Some('-')
                && self
                    .chars
                    .get(self.pos + 1)
                    .is_some_and(|c| c.is_ascii_digit())
            {
                self.pos += 1;
                let d = self.parse_integer()? as i32;
                transpose_entries(&mut entries, -d);
            } else {
                return Ok(entries);
            }
        }
    }

    /// `E(p,s,on,off)`: the Euclidean rhythm of `p` pulses over `s` steps,
    /// `on`/`off` substituted per slot.
    fn parse_euclidean(&mut self) -> Result<Vec<PatternEntry>, EngineError> {
        self.pos += 2; // E(
        let pulses = self.parse_integer()? as usize;
        if !self.eat(',') {
            return Err(self.syntax("E() expects four arguments".to_string()));
        }
        let steps = self.parse_integer()? as usize;
        if !self.eat(',') {
            return Err(self.syntax("E() expects four arguments".to_string()));
        }
        let on = self.parse_argument_text()?;
        if !self.eat(',') {
            return Err(self.syntax("E() expects four arguments".to_string()));
        }
        let off = self.parse_argument_text()?;
        if !self.eat(')') {
            return Err(self.syntax("unclosed 'E('".to_string()));
        }
        if steps == 0 || pulses > steps {
            return Err(self.syntax(format!(
                "E({},{}) needs 0 < steps and pulses <= steps",
                pulses, steps
            )));
        }
        let on_entry = self.parse_entry_text(&on)?;
        let off_entry = self.parse_entry_text(&off)?;
        Ok(euclidean_rhythm(steps, pulses)
            .into_iter()
            .map(|pulse| if pulse { on_entry } else { off_entry })
            .collect())
    }

    fn parse_argument_text(&mut self) -> Result<String, EngineError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ',' || c == ')' {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.syntax("empty E() argument".to_string()));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_entry_text(&self, text: &str) -> Result<PatternEntry, EngineError> {
        let mut sub = Parser {
            chars: text.chars().collect(),
            pos: 0,
            input: self.input,
            options: self.options,
        };
        let entry = sub.parse_entry()?;
        if sub.pos != sub.chars.len() {
            return Err(self.syntax(format!("invalid entry '{}'", text)));
        }
        Ok(entry)
    }

    fn parse_entry(&mut self) -> Result<PatternEntry, EngineError> {
        // A lone '-' (not followed by a digit) is a pause.
        if self.peek() == Some('-')
            && !self
                .chars
                .get(self.pos + 1)
                .is_some_and(|c| c.is_ascii_digit())
        {
            self.pos += 1;
            let ticks = self.parse_optional_ticks()?;
            return Ok(PatternEntry::Pause { ticks });
        }

        let (pitch, wildcard) = match self.peek() {
            Some(c) if self.options.wildcards.contains(&c) => {
                self.pos += 1;
                (None, Some(c))
            }
            Some(c) if c.is_ascii_digit() || c == '-' => {
                let negative = self.eat('-');
                let value = self.parse_integer()? as i32;
                (Some(if negative { -value } else { value }), None)
            }
            other => {
                return Err(self.syntax(format!(
                    "expected note offset, wildcard, or pause, found {:?}",
                    other
                )))
            }
        };

        let velocity = if self.eat(':') {
            let v = self.parse_integer()? as i32;
            if v < 0 {
                return Err(self.syntax("velocity must be non-negative".to_string()));
            }
            v
        } else {
            self.options.default_velocity
        };
        let legato = self.eat('~');
        let ticks = self.parse_optional_ticks()?;
        Ok(PatternEntry::Note {
            pitch,
            wildcard,
            velocity,
            ticks,
            legato,
        })
    }

    fn parse_optional_ticks(&mut self) -> Result<u32, EngineError> {
        if self.eat('/') {
            let ticks = self.parse_integer()? as u32;
            if ticks == 0 {
                return Err(self.syntax("entry length must be positive".to_string()));
            }
            Ok(ticks)
        } else {
            Ok(1)
        }
    }

    fn parse_integer(&mut self) -> Result<i64, EngineError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse()
            .map_err(|_| self.syntax(format!("expected a number at position {}", start)))
    }
}

fn transpose_entries(entries: &mut [PatternEntry], delta: i32) {
    for entry in entries {
        if let PatternEntry::Note {
            pitch: Some(pitch), ..
        } = entry
        {
            *pitch += delta;
        }
    }
}

/// The Euclidean rhythm: `pulses` distributed as evenly as possible over
/// `steps`.
///
/// Accumulator construction: walking the steps, `pulses` is added to a
/// running total modulo `steps`; every step at which the total wraps past
/// a multiple of `steps` carries a pulse. Equivalently, step `i` is a
/// pulse iff `i * pulses mod steps < pulses`. Step 0 always pulses, so
/// the rotation is fixed.
pub fn euclidean_rhythm(steps: usize, pulses: usize) -> Vec<bool> {
    let mut slots = vec![false; steps];
    let mut accumulator = 0usize;
    for slot in slots.iter_mut() {
        if accumulator < pulses {
            *slot = true;
        }
        accumulator = (accumulator + pulses) % steps.max(1);
    }
    slots
}
