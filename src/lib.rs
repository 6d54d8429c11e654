//! A small line-oriented command shell.
//!
//! Source text goes through a [`scanner`] and [`lexer`] into tokens, the [`parser`]
//! builds one [`parser::AstNode`] per statement, and the interpreter executes each
//! node against an [`ExecContext`]: words are expanded (tilde, `$NAME`, `${NAME}`,
//! `$(...)`, quote removal), builtins run in-process and everything else is
//! spawned from `PATH`. Pipelines run both sides concurrently over an OS pipe;
//! `<`, `>`, `>>` and `2>` rebind a command's streams to files.
//!
//! The main entry point is [`Interpreter`]. The public modules [`command`] and
//! [`env`] expose traits and types for implementing your own commands and for
//! interacting with the shell's variables.

mod builtin;
pub mod command;
pub mod context;
pub mod env;
pub mod expand;
mod external;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod parser;
pub mod scanner;

pub use builtin::default_commands;
pub use command::ExitCode;
pub use context::ExecContext;
/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
pub use interpreter::{ExecError, capture_output, run_program};
