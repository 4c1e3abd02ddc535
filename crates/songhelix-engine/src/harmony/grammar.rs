//! Chord pattern grammar.
//!
//! A pattern is a comma-separated list of atoms `chordspec/len` where `len`
//! is in beats. A `+` prefix starts a new chord section. `chordspec` is a
//! chord name (`Am`, `Csus24`), a pitch triple (`9:12:16`), a random table
//! index (`2`), a constrained draw (`2!0` — not equal-normalized to emitted
//! chord 0), or a back-reference (`$0`). Parenthesized sub-patterns may be
//! repeated (`(...)*2`) and transposed (`(...)+12`, `(...)-12`).

use crate::error::EngineError;

/// What a single atom resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum ChordSpec {
    /// Chord by name.
    Name(String),
    /// Literal pitch triple.
    Pitches(i32, i32, i32),
    /// Uniform draw from a random table.
    Table(usize),
    /// Draw from a table, not equal-normalized to the emitted chord `not`.
    TableNot { table: usize, not: usize },
    /// Replay the emitted chord at an index.
    BackReference(usize),
}

/// One flattened atom of a chord pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordAtom {
    /// Start a new chord section at this atom.
    pub new_section: bool,
    pub spec: ChordSpec,
    /// Length in beats (fractional allowed).
    pub beats: f64,
    /// Semitone delta from enclosing transposed groups.
    pub transpose: i32,
}

/// Parse a chord pattern into its flattened atom list.
pub fn parse_chord_pattern(pattern: &str) -> Result<Vec<ChordAtom>, EngineError> {
    let syntax = |message: String| EngineError::ChordPatternSyntax {
        pattern: pattern.to_string(),
        message,
    };
    let mut parser = Parser {
        chars: pattern.chars().collect(),
        pos: 0,
    };
    let atoms = parser.parse_list(pattern)?;
    if parser.pos != parser.chars.len() {
        return Err(syntax(format!(
            "unexpected '{}' at position {}",
            parser.chars[parser.pos], parser.pos
        )));
    }
    if atoms.is_empty() {
        return Err(syntax("empty pattern".to_string()));
    }
    Ok(atoms)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
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

    fn parse_list(&mut self, pattern: &str) -> Result<Vec<ChordAtom>, EngineError> {
        let mut atoms = Vec::new();
        loop {
            atoms.extend(self.parse_element(pattern)?);
            if !self.eat(',') {
                break;
            }
        }
        Ok(atoms)
    }

    fn parse_element(&mut self, pattern: &str) -> Result<Vec<ChordAtom>, EngineError> {
        if self.eat('(') {
            let inner = self.parse_list(pattern)?;
            if !self.eat(')') {
                return Err(EngineError::ChordPatternSyntax {
                    pattern: pattern.to_string(),
                    message: "unclosed '('".to_string(),
                });
            }
            self.parse_group_postfix(pattern, inner)
        } else {
            Ok(vec![self.parse_atom(pattern)?])
        }
    }

    fn parse_group_postfix(
        &mut self,
        pattern: &str,
        mut atoms: Vec<ChordAtom>,
    ) -> Result<Vec<ChordAtom>, EngineError> {
        loop {
            if self.eat('*') {
                let n = self.parse_number(pattern)? as u32;
                if n == 0 {
                    return Err(EngineError::ChordPatternSyntax {
                        pattern: pattern.to_string(),
                        message: "repeat count must be positive".to_string(),
                    });
                }
                let base = atoms.clone();
                for _ in 1..n {
                    atoms.extend(base.iter().cloned());
                }
            } else if self.eat('+') {
                let d = self.parse_number(pattern)? as i32;
                for atom in &mut atoms {
                    atom.transpose += d;
                }
            } else if self.eat('-') {
                let d = self.parse_number(pattern)? as i32;
                for atom in &mut atoms {
                    atom.transpose -= d;
                }
            } else {
                return Ok(atoms);
            }
        }
    }

    fn parse_atom(&mut self, pattern: &str) -> Result<ChordAtom, EngineError> {
        let syntax = |message: String| EngineError::ChordPatternSyntax {
            pattern: pattern.to_string(),
            message,
        };
        let new_section = self.eat('+');
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '/' || c == ',' || c == ')' {
                break;
            }
            self.pos += 1;
        }
        let spec_str: String = self.chars[start..self.pos].iter().collect();
        if spec_str.is_empty() {
            return Err(syntax("missing chord specification".to_string()));
        }
        if !self.eat('/') {
            return Err(syntax(format!("missing '/len' after '{}'", spec_str)));
        }
        let beats = self.parse_number(pattern)?;
        if beats <= 0.0 {
            return Err(syntax(format!("non-positive length for '{}'", spec_str)));
        }
        Ok(ChordAtom {
            new_section,
            spec: parse_chord_spec(&spec_str, pattern)?,
            beats,
            transpose: 0,
        })
    }

    fn parse_number(&mut self, pattern: &str) -> Result<f64, EngineError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse().map_err(|_| EngineError::ChordPatternSyntax {
            pattern: pattern.to_string(),
            message: format!("expected a number at position {}", start),
        })
    }
}

fn parse_chord_spec(spec: &str, pattern: &str) -> Result<ChordSpec, EngineError> {
    let syntax = |message: String| EngineError::ChordPatternSyntax {
        pattern: pattern.to_string(),
        message,
    };
    if let Some(index) = spec.strip_prefix('$') {
        let index = index
            .parse()
            .map_err(|_| syntax(format!("invalid back-reference '{}'", spec)))?;
        return Ok(ChordSpec::BackReference(index));
    }
    if spec.contains(':') {
        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() != 3 {
            return Err(syntax(format!("pitch triple '{}' needs three pitches", spec)));
        }
        let mut pitches = [0i32; 3];
        for (slot, part) in pitches.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| syntax(format!("invalid pitch '{}' in '{}'", part, spec)))?;
        }
        return Ok(ChordSpec::Pitches(pitches[0], pitches[1], pitches[2]));
    }
    if spec.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        if let Some((table, not)) = spec.split_once('!') {
            let table = table
                .parse()
                .map_err(|_| syntax(format!("invalid table index in '{}'", spec)))?;
            let not = not
                .parse()
                .map_err(|_| syntax(format!("invalid chord index in '{}'", spec)))?;
            return Ok(ChordSpec::TableNot { table, not });
        }
        let table = spec
            .parse()
            .map_err(|_| syntax(format!("invalid table index '{}'", spec)))?;
        return Ok(ChordSpec::Table(table));
    }
    Ok(ChordSpec::Name(spec.to_string()))
}
