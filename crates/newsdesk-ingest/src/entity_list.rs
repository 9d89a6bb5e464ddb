//! Parser for the serialized `(text, label)` list carried in `Entities_Raw`.
//!
//! The acquisition side writes the list as a literal such as
//! `[('Putin', 'PERSON'), ("O'Neil", 'PERSON')]`. Pairs may be tuples or two-element
//! lists, strings may use either quote style, and trailing commas are allowed.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityParseError {
    #[error("expected {expected} at offset {offset}")]
    Expected { expected: &'static str, offset: usize },
    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },
    #[error("invalid escape sequence at offset {offset}")]
    InvalidEscape { offset: usize },
    #[error("entry at offset {offset} has {found} elements, expected a (text, label) pair")]
    PairArity { offset: usize, found: usize },
    #[error("unexpected trailing input at offset {offset}")]
    TrailingInput { offset: usize },
}

/// Parse an entity list literal. Blank input yields an empty list.
pub fn parse_entity_list(raw: &str) -> Result<Vec<(String, String)>, EntityParseError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut scanner = Scanner::new(raw);
    let mut pairs = Vec::new();

    scanner.expect('[', "'['")?;
    loop {
        if scanner.eat(']') {
            break;
        }
        pairs.push(scanner.pair()?);
        if scanner.eat(',') {
            continue;
        }
        scanner.expect(']', "',' or ']'")?;
        break;
    }

    scanner.skip_whitespace();
    if scanner.peek().is_some() {
        return Err(EntityParseError::TrailingInput {
            offset: scanner.pos,
        });
    }
    Ok(pairs)
}

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(ch) if ch.is_whitespace()) {
            self.bump();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(
        &mut self,
        expected: char,
        description: &'static str,
    ) -> Result<(), EntityParseError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(EntityParseError::Expected {
                expected: description,
                offset: self.pos,
            })
        }
    }

    fn pair(&mut self) -> Result<(String, String), EntityParseError> {
        self.skip_whitespace();
        let offset = self.pos;
        let close = match self.peek() {
            Some('(') => ')',
            Some('[') => ']',
            _ => {
                return Err(EntityParseError::Expected {
                    expected: "'(' or '['",
                    offset,
                })
            }
        };
        self.bump();

        let mut items = Vec::with_capacity(2);
        loop {
            if self.eat(close) {
                break;
            }
            items.push(self.string()?);
            if self.eat(',') {
                continue;
            }
            self.expect(close, "',' or closing bracket")?;
            break;
        }

        if items.len() != 2 {
            return Err(EntityParseError::PairArity {
                offset,
                found: items.len(),
            });
        }
        let label = items.pop().unwrap_or_default();
        let text = items.pop().unwrap_or_default();
        Ok((text, label))
    }

    fn string(&mut self) -> Result<String, EntityParseError> {
        self.skip_whitespace();
        let offset = self.pos;
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => {
                return Err(EntityParseError::Expected {
                    expected: "quoted string",
                    offset,
                })
            }
        };
        self.bump();

        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(EntityParseError::UnterminatedString { offset }),
                Some(ch) if ch == quote => return Ok(out),
                Some('\\') => out.push(self.escape(offset)?),
                Some(ch) => out.push(ch),
            }
        }
    }

    fn escape(&mut self, string_offset: usize) -> Result<char, EntityParseError> {
        let offset = self.pos - 1;
        match self.bump() {
            None => Err(EntityParseError::UnterminatedString {
                offset: string_offset,
            }),
            Some(ch @ ('\\' | '\'' | '"')) => Ok(ch),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some('0') => Ok('\0'),
            Some('x') => self.hex_escape(2, offset),
            Some('u') => self.hex_escape(4, offset),
            Some('U') => self.hex_escape(8, offset),
            Some(_) => Err(EntityParseError::InvalidEscape { offset }),
        }
    }

    fn hex_escape(&mut self, digits: usize, offset: usize) -> Result<char, EntityParseError> {
        let mut code: u32 = 0;
        for _ in 0..digits {
            let digit = self
                .bump()
                .and_then(|ch| ch.to_digit(16))
                .ok_or(EntityParseError::InvalidEscape { offset })?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or(EntityParseError::InvalidEscape { offset })
    }
}
