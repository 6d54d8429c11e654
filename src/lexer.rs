//! A module implementing lexical analysis (tokenization) for a simple shell-like language.

use crate::scanner::Scanner;
use std::fmt;
use thiserror::Error;

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word, kept as raw text. Quotes, `${...}` and `$(...)` are preserved
    /// verbatim for the expansion stage.
    Word(String),
    /// The pipe operator, `|`.
    Pipe,
    /// Input redirection, `<`, with an optional explicit descriptor (`3<`).
    RedirectIn(Option<u32>),
    /// Output redirection, `>`, with an optional explicit descriptor (`2>`).
    RedirectOut(Option<u32>),
    /// Appending output redirection, `>>`, with an optional explicit descriptor.
    RedirectAppendOut(Option<u32>),
    /// Statement terminator: either `'\n'` or `';'`.
    End(char),
    /// No more input. Once produced, produced forever.
    EndOfInput,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fd = |fd: &Option<u32>| fd.map(|n| n.to_string()).unwrap_or_default();
        match self {
            Token::Word(word) => write!(f, "`{word}`"),
            Token::Pipe => f.write_str("`|`"),
            Token::RedirectIn(n) => write!(f, "`{}<`", fd(n)),
            Token::RedirectOut(n) => write!(f, "`{}>`", fd(n)),
            Token::RedirectAppendOut(n) => write!(f, "`{}>>`", fd(n)),
            Token::End('\n') => f.write_str("newline"),
            Token::End(ch) => write!(f, "`{ch}`"),
            Token::EndOfInput => f.write_str("end of input"),
        }
    }
}

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexingError {
    /// A closing quote or brace was not found.
    #[error("unexpected end of input while looking for `{0}`")]
    Unterminated(char),
    /// A closing parenthesis for command substitution `$(...)` was not found.
    #[error("unexpected end of input in command substitution")]
    UnfinishedCmdSubst,
}

/// Streaming tokenizer on top of [`Scanner`].
pub struct Lexer {
    scanner: Scanner,
    // Set after a terminator so the next rune is only read once another token is wanted.
    advance_later: bool,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            scanner: Scanner::new(source),
            advance_later: true,
        }
    }

    pub fn done(&self) -> bool {
        self.scanner.done()
    }

    pub fn take_error(&mut self) -> Option<LexingError> {
        self.scanner.take_error()
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> Token {
        loop {
            if self.advance_later {
                self.scanner.advance();
                self.advance_later = false;
            }
            let Some(ch) = self.scanner.current() else {
                return Token::EndOfInput;
            };

            match ch {
                ' ' | '\t' => {
                    self.scanner.advance();
                }
                ';' | '\n' => {
                    self.advance_later = true;
                    return Token::End(ch);
                }
                '|' => {
                    self.scanner.advance();
                    return Token::Pipe;
                }
                '<' | '>' => return self.read_redirect(None),
                _ => return self.read_word(),
            }
        }
    }

    fn read_word(&mut self) -> Token {
        let mut word = String::new();
        let mut only_digits = true;

        while let Some(ch) = self.scanner.current() {
            if is_break(ch) {
                break;
            }
            match ch {
                '\'' | '"' => {
                    only_digits = false;
                    self.scanner.advance();
                    let part = self.scanner.read_until(ch);
                    self.scanner.advance();
                    word.push(ch);
                    word.push_str(&part);
                    word.push(ch);
                }
                '$' => {
                    only_digits = false;
                    word.push('$');
                    match self.scanner.advance() {
                        Some('{') => {
                            self.scanner.advance();
                            let name = self.scanner.read_until('}');
                            self.scanner.advance();
                            word.push('{');
                            word.push_str(&name);
                            word.push('}');
                        }
                        Some('(') => self.read_cmdsubst(&mut word),
                        _ => {}
                    }
                }
                c => {
                    only_digits &= c.is_ascii_digit();
                    word.push(c);
                    self.scanner.advance();
                }
            }
        }

        // `2>` and friends: a bare number glued to a redirect operator names the descriptor.
        if only_digits && matches!(self.scanner.current(), Some('<' | '>')) {
            if let Ok(fd) = word.parse::<u32>() {
                return self.read_redirect(Some(fd));
            }
        }

        Token::Word(word)
    }

    /// Copy `( ... )` into `word`, tracking nesting and skipping over quoted spans.
    /// The cursor is on the opening parenthesis.
    fn read_cmdsubst(&mut self, word: &mut String) {
        let mut depth = 0usize;
        while let Some(ch) = self.scanner.current() {
            match ch {
                '\'' | '"' => {
                    self.scanner.advance();
                    let part = self.scanner.read_until(ch);
                    word.push(ch);
                    word.push_str(&part);
                    if self.scanner.current().is_none() {
                        return;
                    }
                    word.push(ch);
                }
                '(' => {
                    depth += 1;
                    word.push(ch);
                }
                ')' => {
                    depth -= 1;
                    word.push(ch);
                    if depth == 0 {
                        self.scanner.advance();
                        return;
                    }
                }
                c => word.push(c),
            }
            self.scanner.advance();
        }
        self.scanner.fail(LexingError::UnfinishedCmdSubst);
    }

    /// The cursor is on `<` or `>`.
    fn read_redirect(&mut self, fd: Option<u32>) -> Token {
        if self.scanner.current() == Some('<') {
            self.scanner.advance();
            return Token::RedirectIn(fd);
        }
        if self.scanner.advance() == Some('>') {
            self.scanner.advance();
            Token::RedirectAppendOut(fd)
        } else {
            Token::RedirectOut(fd)
        }
    }
}

fn is_break(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n' | ';' | '<' | '>' | '|')
}

/// Tokenize a complete string: every token up to and including [`Token::EndOfInput`],
/// or the first lexing error encountered.
#[cfg(test)]
fn split_into_tokens(source: &str) -> Result<Vec<Token>, LexingError> {
    let mut lexer = Lexer::new(source);
    let mut out = Vec::new();
    loop {
        let token = lexer.next_token();
        let last = token == Token::EndOfInput;
        out.push(token);
        if last {
            break;
        }
    }
    match lexer.take_error() {
        Some(err) => Err(err),
        None => Ok(out),
    }
}
