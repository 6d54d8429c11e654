//! Rune-level cursor over program source.

use crate::lexer::LexingError;

/// Character cursor with one rune of lookahead.
///
/// The scanner starts *before* the first rune: call [`Scanner::advance`] once to
/// load it. End of input is sticky; once reached, [`Scanner::current`] returns
/// `None` forever.
pub struct Scanner {
    input: Vec<char>,
    next: usize,
    current: Option<char>,
    eof: bool,
    error: Option<LexingError>,
}

impl Scanner {
    pub fn new(source: &str) -> Self {
        Self {
            input: source.chars().collect(),
            next: 0,
            current: None,
            eof: false,
            error: None,
        }
    }

    /// The rune under the cursor, `None` before the first advance or at end of input.
    pub fn current(&self) -> Option<char> {
        self.current
    }

    pub fn done(&self) -> bool {
        self.eof
    }

    /// Move to the next rune and return it.
    pub fn advance(&mut self) -> Option<char> {
        match self.input.get(self.next) {
            Some(&ch) if !self.eof => {
                self.next += 1;
                self.current = Some(ch);
            }
            _ => {
                self.eof = true;
                self.current = None;
            }
        }
        self.current
    }

    /// Look at the rune after the current one without consuming it.
    pub fn peek(&self) -> Option<char> {
        if self.eof {
            return None;
        }
        self.input.get(self.next).copied()
    }

    /// Collect runes up to (not including) `terminator`.
    ///
    /// The terminator stays under the cursor. Hitting end of input first records
    /// [`LexingError::Unterminated`] and returns whatever was read.
    pub fn read_until(&mut self, terminator: char) -> String {
        let mut text = String::new();
        while let Some(ch) = self.current {
            if ch == terminator {
                return text;
            }
            text.push(ch);
            self.advance();
        }
        self.fail(LexingError::Unterminated(terminator));
        text
    }

    /// Record an error unless one is already pending.
    pub fn fail(&mut self, error: LexingError) {
        self.error.get_or_insert(error);
    }

    /// Hand over the pending error, if any, clearing it.
    pub fn take_error(&mut self) -> Option<LexingError> {
        self.error.take()
    }
}
