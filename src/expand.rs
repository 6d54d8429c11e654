//! Word expansion: tilde, variables, command substitution and quote removal.
//!
//! Everything happens in a single left-to-right pass over the raw word text, which
//! keeps the observable order of the classic stages: `~` first, then `$NAME` /
//! `${NAME}`, then `$(...)`, and finally quote removal. Text produced by a
//! substitution is never rescanned for `$` or `~`, but any quote characters in
//! it are dropped just like the word's own.

use crate::context::ExecContext;
use crate::interpreter::{ExecError, capture_output};

/// Expand one raw word into the final argument text.
///
/// Single- and double-quoted spans are both literal: nothing inside them is
/// expanded, and only their delimiters are dropped.
pub fn expand_word(ctx: &ExecContext, word: &str) -> String {
    Expander {
        ctx,
        chars: word.chars().collect(),
        pos: 0,
        out: String::new(),
    }
    .run()
}

struct Expander<'a> {
    ctx: &'a ExecContext,
    chars: Vec<char>,
    pos: usize,
    out: String,
}

impl Expander<'_> {
    fn run(mut self) -> String {
        if self.chars.first() == Some(&'~') && matches!(self.chars.get(1), None | Some('/')) {
            self.tilde();
            self.pos = 1;
        }

        while let Some(&ch) = self.chars.get(self.pos) {
            match ch {
                '\'' | '"' => self.quoted(ch),
                '$' => self.dollar(),
                _ => {
                    self.out.push(ch);
                    self.pos += 1;
                }
            }
        }
        self.out
    }

    fn tilde(&mut self) {
        let home = self.ctx.env().exported_var("HOME").map(str::to_owned);
        match home {
            Some(home) => self.out.push_str(&home),
            None => log::error!("{}", ExecError::NoHome),
        }
    }

    /// Copy a quoted span without its delimiters. An unterminated quote runs to the end.
    fn quoted(&mut self, quote: char) {
        let start = self.pos + 1;
        let end = self.find(start, quote).unwrap_or(self.chars.len());
        self.out.extend(&self.chars[start..end]);
        self.pos = end + 1;
    }

    fn dollar(&mut self) {
        let start = self.pos + 1;
        match self.chars.get(start) {
            Some('(') => match self.matching_paren(start) {
                Some(end) => {
                    let program: String = self.chars[start + 1..end].iter().collect();
                    self.substitute(&program);
                    self.pos = end + 1;
                }
                None => self.literal_rest(),
            },
            Some('{') => match self.find(start + 1, '}') {
                Some(end) => {
                    let name: String = self.chars[start + 1..end].iter().collect();
                    self.variable(&name);
                    self.pos = end + 1;
                }
                None => self.literal_rest(),
            },
            _ => {
                // The name runs up to the next quote or `$`.
                let end = self.chars[start..]
                    .iter()
                    .position(|c| matches!(c, '\'' | '"' | '$'))
                    .map_or(self.chars.len(), |i| start + i);
                if end == start {
                    self.out.push('$');
                } else {
                    let name: String = self.chars[start..end].iter().collect();
                    self.variable(&name);
                }
                self.pos = end;
            }
        }
    }

    fn variable(&mut self, name: &str) {
        let value = self
            .ctx
            .env()
            .get_var(name)
            .map(strip_quotes)
            .unwrap_or_default();
        self.out.push_str(&value);
    }

    fn substitute(&mut self, program: &str) {
        match capture_output(self.ctx, program) {
            Ok((_, text)) => self.out.push_str(&strip_quotes(text.trim())),
            Err(err) => log::error!("expand: command substitution failed: {err}"),
        }
    }

    fn literal_rest(&mut self) {
        self.out.extend(&self.chars[self.pos..]);
        self.pos = self.chars.len();
    }

    fn find(&self, from: usize, target: char) -> Option<usize> {
        self.chars[from..]
            .iter()
            .position(|&c| c == target)
            .map(|i| from + i)
    }

    /// Index of the `)` closing the `(` at `open`, skipping quoted spans.
    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = open;
        while let Some(&ch) = self.chars.get(i) {
            match ch {
                '\'' | '"' => i = self.find(i + 1, ch)?,
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        None
    }
}

/// Drop every `'` and `"` from substituted text.
fn strip_quotes(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '\'' | '"')).collect()
}
