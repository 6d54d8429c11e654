use crate::lexer::{Lexer, LexingError, Token};
use thiserror::Error;

/// A simple command: leading `NAME=value` assignments followed by raw words.
///
/// Both names and words are stored exactly as lexed; expansion happens at
/// execution time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    /// `(name, raw value)` pairs from words like `NAME=value` preceding the first argument.
    pub assignments: Vec<(String, String)>,
    /// The command name and its arguments (`argv[0]`, `argv[1]`, etc.).
    pub words: Vec<String>,
}

/// AST node for the shell
///
/// Represents a single element in the Abstract Syntax Tree (AST) constructed
/// from the parsed shell commands. The set of variants is closed; the tree is
/// never modified after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstNode {
    /// A **simple command** unit. With no words it is a pure assignment statement.
    Command(Command),

    /// Statements separated by `;` on one line, run in order.
    Sequence(Vec<AstNode>),

    /// Two commands joined by `|`. `a | b | c` folds to the left:
    /// `Pipe(Pipe(a, b), c)`.
    Pipe {
        left: Box<AstNode>,
        right: Box<AstNode>,
    },

    /// Input redirection (`<`): `inner` reads descriptor `fd` from `path`.
    RedirectIn {
        inner: Box<AstNode>,
        path: String,
        fd: u32,
    },

    /// Output redirection (`>` or `>>`): `inner` writes descriptor `fd` to `path`.
    RedirectOut {
        inner: Box<AstNode>,
        path: String,
        append: bool,
        fd: u32,
    },
}

/// Errors that can occur during the AST construction (parsing) phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParsingError {
    /// Encountered a token that was not expected at the current position according to the grammar.
    #[error("unexpected {0}")]
    UnexpectedToken(Token),
    /// A `|` was not followed by a command.
    #[error("expected a command after `|`, found {0}")]
    MissingCommand(Token),
    /// A redirection operator was not followed by a file name.
    #[error("expected a file name after redirection, found {0}")]
    MissingRedirectTarget(Token),
    /// The lexer gave up on the statement.
    #[error(transparent)]
    Lexing(#[from] LexingError),
}

/// Recursive-descent parser producing one [`AstNode`] per logical line.
///
/// ```
/// use tinysh::parser::{AstNode, Parser};
///
/// let mut parser = Parser::new("ls -l | wc -l\n");
/// assert!(matches!(parser.parse(), Some(AstNode::Pipe { .. })));
/// ```
pub struct Parser {
    lexer: Lexer,
    current: Option<Token>,
    eof: bool,
    error: Option<ParsingError>,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Self {
            lexer: Lexer::new(source),
            current: None,
            eof: false,
            error: None,
        }
    }

    /// True once the end of input has been consumed.
    pub fn done(&self) -> bool {
        self.eof
    }

    /// Hand over the pending lexing or parsing error, if any.
    ///
    /// Lexing errors take priority since they usually explain the parse error.
    pub fn take_error(&mut self) -> Option<ParsingError> {
        let lexing = self.lexer.take_error().map(ParsingError::from);
        let parsing = self.error.take();
        lexing.or(parsing)
    }

    /// Parse the next line.
    ///
    /// Returns `None` for empty lines, for lines with errors (check [`Parser::take_error`])
    /// and for every call after the end of input.
    pub fn parse(&mut self) -> Option<AstNode> {
        if self.eof {
            return None;
        }
        match self.line() {
            Ok(node) => node,
            Err(err) => {
                self.error.get_or_insert(err);
                self.discard_statement();
                None
            }
        }
    }

    fn line(&mut self) -> Result<Option<AstNode>, ParsingError> {
        let mut nodes = Vec::new();
        loop {
            if let Some(node) = self.pipeline()? {
                nodes.push(node);
            }
            match self.bump() {
                Token::EndOfInput => break,
                Token::End('\n') => break,
                Token::End(_) => continue,
                token => return Err(ParsingError::UnexpectedToken(token)),
            }
        }

        Ok(match nodes.len() {
            0 => None,
            1 => nodes.pop(),
            _ => Some(AstNode::Sequence(nodes)),
        })
    }

    fn pipeline(&mut self) -> Result<Option<AstNode>, ParsingError> {
        let Some(mut node) = self.simple()? else {
            return Ok(None);
        };

        while self.accept(|t| matches!(t, Token::Pipe)).is_some() {
            let Some(right) = self.simple()? else {
                return Err(ParsingError::MissingCommand(self.peek().clone()));
            };
            node = AstNode::Pipe {
                left: Box::new(node),
                right: Box::new(right),
            };
        }

        Ok(Some(node))
    }

    /// Parse a simple command: `assignment* word* redirect*`.
    fn simple(&mut self) -> Result<Option<AstNode>, ParsingError> {
        let mut command = Command::default();
        while let Some(Token::Word(word)) = self.accept(|t| matches!(t, Token::Word(_))) {
            if command.words.is_empty() {
                if let Some((name, value)) = split_assignment(&word) {
                    command.assignments.push((name.to_string(), value.to_string()));
                    continue;
                }
            }
            command.words.push(word);
        }

        let mut node = (!command.words.is_empty() || !command.assignments.is_empty())
            .then(|| AstNode::Command(command));

        loop {
            let (input, append, fd) = match self.peek() {
                Token::RedirectIn(fd) => (true, false, fd.unwrap_or(0)),
                Token::RedirectOut(fd) => (false, false, fd.unwrap_or(1)),
                Token::RedirectAppendOut(fd) => (false, true, fd.unwrap_or(1)),
                _ => break,
            };
            self.bump();

            let path = match self.accept(|t| matches!(t, Token::Word(_))) {
                Some(Token::Word(path)) => path,
                _ => return Err(ParsingError::MissingRedirectTarget(self.peek().clone())),
            };
            // `> file` alone still opens (and truncates) the file.
            let inner = Box::new(
                node.take()
                    .unwrap_or_else(|| AstNode::Command(Command::default())),
            );
            node = Some(if input {
                AstNode::RedirectIn { inner, path, fd }
            } else {
                AstNode::RedirectOut {
                    inner,
                    path,
                    append,
                    fd,
                }
            });
        }

        Ok(node)
    }

    /// Skip the rest of a broken statement, including its terminator.
    fn discard_statement(&mut self) {
        loop {
            match self.bump() {
                Token::EndOfInput | Token::End(_) => return,
                _ => {}
            }
        }
    }

    fn peek(&mut self) -> &Token {
        self.current.get_or_insert_with(|| self.lexer.next_token())
    }

    fn bump(&mut self) -> Token {
        let token = self
            .current
            .take()
            .unwrap_or_else(|| self.lexer.next_token());
        if token == Token::EndOfInput {
            self.eof = true;
        }
        token
    }

    fn accept(&mut self, pred: impl Fn(&Token) -> bool) -> Option<Token> {
        if pred(self.peek()) {
            Some(self.bump())
        } else {
            None
        }
    }
}

/// Split `NAME=value` into its parts when `NAME` is a valid variable name.
pub fn split_assignment(word: &str) -> Option<(&str, &str)> {
    let (name, value) = word.split_once('=')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    let valid = (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some((name, value))
}

/// Parses a complete source text, returning every node and every error found.
#[cfg(test)]
fn parse_all(source: &str) -> (Vec<AstNode>, Vec<ParsingError>) {
    let mut parser = Parser::new(source);
    let mut nodes = Vec::new();
    let mut errors = Vec::new();
    while !parser.done() {
        let node = parser.parse();
        if let Some(err) = parser.take_error() {
            errors.push(err);
            continue;
        }
        nodes.extend(node);
    }
    (nodes, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(words: &[&str]) -> AstNode {
        AstNode::Command(Command {
            assignments: Vec::new(),
            words: words.iter().map(|w| w.to_string()).collect(),
        })
    }

    fn parse_one(source: &str) -> AstNode {
        let (mut nodes, errors) = parse_all(source);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        assert_eq!(nodes.len(), 1, "expected a single node, got {:?}", nodes);
        nodes.remove(0)
    }

    #[test]
    fn test_plain_words_make_one_command() {
        assert_eq!(
            parse_one("ls  -la /tmp"),
            cmd(&["ls", "-la", "/tmp"])
        );
    }

    #[test]
    fn test_assignments_split_before_first_word() {
        let node = parse_one("A=1 B='x y' env C=3");
        assert_eq!(
            node,
            AstNode::Command(Command {
                assignments: vec![
                    ("A".to_string(), "1".to_string()),
                    ("B".to_string(), "'x y'".to_string()),
                ],
                words: vec!["env".to_string(), "C=3".to_string()],
            })
        );
    }

    #[test]
    fn test_invalid_assignment_names_are_words() {
        assert_eq!(parse_one("1A=2"), cmd(&["1A=2"]));
        assert_eq!(parse_one("=x"), cmd(&["=x"]));
    }

    #[test]
    fn test_pipes_fold_left() {
        let node = parse_one("a | b | c");
        assert_eq!(
            node,
            AstNode::Pipe {
                left: Box::new(AstNode::Pipe {
                    left: Box::new(cmd(&["a"])),
                    right: Box::new(cmd(&["b"])),
                }),
                right: Box::new(cmd(&["c"])),
            }
        );
    }

    #[test]
    fn test_redirects_wrap_in_order() {
        let node = parse_one("sort < in > out 2>> err");
        assert_eq!(
            node,
            AstNode::RedirectOut {
                inner: Box::new(AstNode::RedirectOut {
                    inner: Box::new(AstNode::RedirectIn {
                        inner: Box::new(cmd(&["sort"])),
                        path: "in".to_string(),
                        fd: 0,
                    }),
                    path: "out".to_string(),
                    append: false,
                    fd: 1,
                }),
                path: "err".to_string(),
                append: true,
                fd: 2,
            }
        );
    }

    #[test]
    fn test_redirect_without_command() {
        let node = parse_one("> f");
        assert_eq!(
            node,
            AstNode::RedirectOut {
                inner: Box::new(AstNode::Command(Command::default())),
                path: "f".to_string(),
                append: false,
                fd: 1,
            }
        );
    }

    #[test]
    fn test_semicolons_make_a_sequence() {
        let node = parse_one("a; b | c; d");
        assert_eq!(
            node,
            AstNode::Sequence(vec![
                cmd(&["a"]),
                AstNode::Pipe {
                    left: Box::new(cmd(&["b"])),
                    right: Box::new(cmd(&["c"])),
                },
                cmd(&["d"]),
            ])
        );
    }

    #[test]
    fn test_newlines_split_lines() {
        let (nodes, errors) = parse_all("a\nb;\n\n;;\nc");
        assert!(errors.is_empty());
        assert_eq!(nodes, vec![cmd(&["a"]), cmd(&["b"]), cmd(&["c"])]);
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        let mut parser = Parser::new("  ;  \n");
        assert_eq!(parser.parse(), None);
        assert_eq!(parser.parse(), None);
        assert!(parser.done());
        assert!(parser.take_error().is_none());
    }

    #[test]
    fn test_trailing_pipe_discards_line_only() {
        let mut parser = Parser::new("echo a |\necho b\n");
        assert_eq!(parser.parse(), None);
        assert!(matches!(
            parser.take_error(),
            Some(ParsingError::MissingCommand(Token::End('\n')))
        ));
        assert_eq!(parser.parse(), Some(cmd(&["echo", "b"])));
        assert!(parser.take_error().is_none());
    }

    #[test]
    fn test_leading_pipe_is_unexpected() {
        let (nodes, errors) = parse_all("| a\nb");
        assert_eq!(nodes, vec![cmd(&["b"])]);
        assert_eq!(errors, vec![ParsingError::UnexpectedToken(Token::Pipe)]);
    }

    #[test]
    fn test_missing_redirect_target() {
        let (nodes, errors) = parse_all("cat >\nls");
        assert_eq!(nodes, vec![cmd(&["ls"])]);
        assert_eq!(
            errors,
            vec![ParsingError::MissingRedirectTarget(Token::End('\n'))]
        );
    }

    #[test]
    fn test_word_after_redirect_is_an_error() {
        let (nodes, errors) = parse_all("echo > f extra");
        assert!(nodes.is_empty());
        assert_eq!(
            errors,
            vec![ParsingError::UnexpectedToken(Token::Word("extra".to_string()))]
        );
    }

    #[test]
    fn test_lexing_error_surfaces_through_parser() {
        let mut parser = Parser::new("echo 'abc");
        assert!(parser.parse().is_some());
        assert_eq!(
            parser.take_error(),
            Some(ParsingError::Lexing(LexingError::Unterminated('\'')))
        );
    }

    #[test]
    fn test_parse_after_eof_returns_none() {
        let mut parser = Parser::new("true");
        assert_eq!(parser.parse(), Some(cmd(&["true"])));
        assert!(parser.done());
        assert_eq!(parser.parse(), None);
        assert_eq!(parser.parse(), None);
    }
}
