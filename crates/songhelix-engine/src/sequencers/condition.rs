//! Boolean conditions over named activity vectors.
//!
//! Grammar: identifiers (vector names), `!`, `&`, `|`, and parentheses.
//! An empty expression is always true.

use crate::activity::ActivityMatrix;
use crate::error::EngineError;

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Always true (empty expression).
    True,
    /// State of a named vector.
    Name(String),
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    /// Parse an expression.
    pub fn parse(expression: &str) -> Result<Self, EngineError> {
        let trimmed: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
        if trimmed.is_empty() {
            return Ok(Condition::True);
        }
        let mut parser = Parser {
            chars: trimmed.chars().collect(),
            pos: 0,
            expression,
        };
        let condition = parser.parse_or()?;
        if parser.pos != parser.chars.len() {
            return Err(parser.error(format!(
                "unexpected '{}' at position {}",
                parser.chars[parser.pos], parser.pos
            )));
        }
        Ok(condition)
    }

    /// Evaluate against the matrix at a tick.
    pub fn evaluate(
        &self,
        matrix: &ActivityMatrix,
        tick: usize,
    ) -> Result<bool, EngineError> {
        match self {
            Condition::True => Ok(true),
            Condition::Name(name) => matrix
                .get(name)
                .map(|vector| vector.is_active(tick))
                .ok_or_else(|| EngineError::UnknownActivityVector { name: name.clone() }),
            Condition::Not(inner) => Ok(!inner.evaluate(matrix, tick)?),
            Condition::And(a, b) => Ok(a.evaluate(matrix, tick)? && b.evaluate(matrix, tick)?),
            Condition::Or(a, b) => Ok(a.evaluate(matrix, tick)? || b.evaluate(matrix, tick)?),
        }
    }
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    expression: &'a str,
}

impl Parser<'_> {
    fn error(&self, message: String) -> EngineError {
        EngineError::ConditionSyntax {
            expression: self.expression.to_string(),
            message,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn parse_or(&mut self) -> Result<Condition, EngineError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some('|') {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Condition, EngineError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some('&') {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Condition, EngineError> {
        match self.peek() {
            Some('!') => {
                self.pos += 1;
                Ok(Condition::Not(Box::new(self.parse_unary()?)))
            }
            Some('(') => {
                self.pos += 1;
                let inner = self.parse_or()?;
                if self.peek() != Some(')') {
                    return Err(self.error("unclosed '('".to_string()));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(c) if c.is_alphanumeric() || c == '_' => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_')
                {
                    self.pos += 1;
                }
                Ok(Condition::Name(self.chars[start..self.pos].iter().collect()))
            }
            other => Err(self.error(format!("expected a term, found {:?}", other))),
        }
    }
}
