use crate::builtin::default_commands;
use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::context::ExecContext;
use crate::env::Environment;
use crate::expand::expand_word;
use crate::external::ExternalCommand;
use crate::io_adapters::{InputStream, OutputStream};
use crate::parser::{AstNode, Command, Parser};
use anyhow::Context;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use thiserror::Error;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports builtins defined in this crate.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<fn() -> T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Failures that stop a single node from running.
///
/// They never abort the surrounding program: the node reports the error and
/// evaluates to exit status 1.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("redirect: {path}: {source}")]
    Redirect { path: String, source: io::Error },

    #[error("redirect: unsupported descriptor {0}")]
    UnsupportedDescriptor(u32),

    #[error("exec: {0}: command not found")]
    CommandNotFound(String),

    #[error("exec: {0:#}")]
    Spawn(anyhow::Error),

    #[error("expand: HOME not set")]
    NoHome,
}

fn report(err: ExecError) -> ExitCode {
    log::error!("{err}");
    1
}

impl AstNode {
    /// Run the node against `ctx` and return its exit status.
    pub fn execute(&self, ctx: &ExecContext) -> ExitCode {
        match self {
            AstNode::Command(command) => execute_command(command, ctx),
            AstNode::Sequence(statements) => statements
                .iter()
                .fold(0, |_, statement| statement.execute(ctx)),
            AstNode::Pipe { left, right } => execute_pipe(left, right, ctx),
            AstNode::RedirectIn { inner, path, fd } => match bind_input(ctx, path, *fd) {
                Ok(scoped) => inner.execute(&scoped),
                Err(err) => report(err),
            },
            AstNode::RedirectOut {
                inner,
                path,
                append,
                fd,
            } => match bind_output(ctx, path, *append, *fd) {
                Ok(scoped) => inner.execute(&scoped),
                Err(err) => report(err),
            },
        }
    }
}

fn execute_command(command: &Command, ctx: &ExecContext) -> ExitCode {
    let assignments: Vec<(String, String)> = command
        .assignments
        .iter()
        .map(|(name, value)| (name.clone(), expand_word(ctx, value)))
        .collect();
    let argv: Vec<String> = command
        .words
        .iter()
        .map(|word| expand_word(ctx, word))
        .collect();

    let Some((name, args)) = argv.split_first() else {
        let mut vars = ctx.env();
        for (name, value) in assignments {
            vars.assign(name, value);
        }
        return 0;
    };

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let cmd: Box<dyn ExecutableCommand> = match ctx.lookup_command(name, &arg_refs) {
        Some(builtin) => builtin,
        None => match ExternalCommand::resolve(ctx, name, args, assignments) {
            Some(external) => Box::new(external),
            None => return report(ExecError::CommandNotFound(name.clone())),
        },
    };

    match cmd.execute(ctx) {
        Ok(code) => code,
        Err(err) => report(ExecError::Spawn(err)),
    }
}

/// Run both sides concurrently over an in-process pipe; the right side's status wins.
fn execute_pipe(left: &AstNode, right: &AstNode, ctx: &ExecContext) -> ExitCode {
    let (reader, writer) = match io::pipe() {
        Ok(pair) => pair,
        Err(err) => {
            log::error!("pipe: {err}");
            return 1;
        }
    };
    let reader = Arc::new(reader);
    let left_ctx = ctx.with_stdout(OutputStream::Pipe(Arc::new(writer)));
    let right_ctx = ctx.with_stdin(InputStream::Pipe(reader.clone()));

    thread::scope(|scope| {
        scope.spawn(move || {
            left.execute(&left_ctx);
            // left_ctx holds the last write end; dropping it signals EOF downstream
            drop(left_ctx);
        });
        let consumer = scope.spawn(move || {
            let code = right.execute(&right_ctx);
            drop(right_ctx);
            // unread output would otherwise block the left side forever
            if let Err(err) = io::copy(&mut &*reader, &mut io::sink()) {
                log::error!("pipe: {err}");
            }
            code
        });
        consumer.join().unwrap_or(1)
    })
}

fn bind_input(ctx: &ExecContext, path: &str, fd: u32) -> Result<ExecContext, ExecError> {
    if fd != 0 {
        return Err(ExecError::UnsupportedDescriptor(fd));
    }
    let path = expand_word(ctx, path);
    let file = File::open(&path).map_err(|source| ExecError::Redirect { path, source })?;
    Ok(ctx.with_stdin(InputStream::File(Arc::new(file))))
}

fn bind_output(
    ctx: &ExecContext,
    path: &str,
    append: bool,
    fd: u32,
) -> Result<ExecContext, ExecError> {
    if !matches!(fd, 1 | 2) {
        return Err(ExecError::UnsupportedDescriptor(fd));
    }
    let path = expand_word(ctx, path);
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(&path)
        .map_err(|source| ExecError::Redirect { path, source })?;
    let stream = OutputStream::File(Arc::new(file));
    Ok(if fd == 1 {
        ctx.with_stdout(stream)
    } else {
        ctx.with_stderr(stream)
    })
}

/// Parse and run `source` statement by statement.
///
/// A statement that fails to lex or parse is reported and skipped; execution
/// resumes with the next one. Returns the status of the last statement run,
/// or 0 if none ran.
pub fn run_program(ctx: &ExecContext, source: &str) -> ExitCode {
    let mut parser = Parser::new(source);
    let mut code = 0;
    while !parser.done() {
        let node = parser.parse();
        if let Some(err) = parser.take_error() {
            log::error!("parser: {err}");
            continue;
        }
        if let Some(node) = node {
            code = node.execute(ctx);
        }
    }
    code
}

/// Run `source` with its standard output captured.
///
/// The output is collected on a separate thread while the program runs, so a
/// chatty program cannot fill the pipe and stall.
pub fn capture_output(ctx: &ExecContext, source: &str) -> io::Result<(ExitCode, String)> {
    let (mut reader, writer) = io::pipe()?;
    let sub_ctx = ctx.with_stdout(OutputStream::Pipe(Arc::new(writer)));

    let (code, bytes) = thread::scope(|scope| {
        let collector = scope.spawn(move || {
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes).map(|_| bytes)
        });
        let code = run_program(&sub_ctx, source);
        drop(sub_ctx);
        let bytes = collector
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("output collector panicked")));
        (code, bytes)
    });

    Ok((code, String::from_utf8_lossy(&bytes?).into_owned()))
}

/// A line-oriented shell bound to the process's own standard streams.
///
/// The interpreter owns one [`ExecContext`]; every statement it runs shares that
/// context's variables, so state carries over between calls.
///
/// Example
/// ```
/// use tinysh::Interpreter;
/// let sh = Interpreter::default();
/// assert_eq!(sh.run_str("GREETING=hello"), 0);
/// assert_eq!(sh.context().env().get_var("GREETING"), Some("hello"));
/// ```
pub struct Interpreter {
    ctx: ExecContext,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            ctx: ExecContext::new(Environment::new(), commands),
        }
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    pub fn run_str(&self, source: &str) -> ExitCode {
        run_program(&self.ctx, source)
    }

    /// Run a script file. Only failing to read the file is an error.
    pub fn run_file(&self, path: &Path) -> anyhow::Result<ExitCode> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Ok(self.run_str(&text))
    }

    /// Read all of `reader` first, then run it as one program.
    pub fn run_reader(&self, mut reader: impl Read) -> anyhow::Result<ExitCode> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .context("cannot read input")?;
        Ok(self.run_str(&text))
    }

    /// Interactive loop: one program per line until end of input.
    pub fn repl(&self) -> rustyline::Result<ExitCode> {
        // Stolen from basic example in: https://github.com/kkawakam/rustyline
        let mut rl = DefaultEditor::new()?;
        let mut code = 0;

        loop {
            match rl.readline("$ ") {
                Ok(line) => code = self.run_str(&line),
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err),
            }
        }

        Ok(code)
    }
}

impl Default for Interpreter {
    /// An interpreter with the `cd`, `exit`, `export` and `source` builtins.
    fn default() -> Self {
        Self::new(default_commands())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell() -> ExecContext {
        ExecContext::new(Environment::new(), default_commands())
    }

    fn run(ctx: &ExecContext, source: &str) -> (ExitCode, String) {
        capture_output(ctx, source).unwrap()
    }

    #[test]
    fn test_quoted_word_is_one_argument() {
        let (code, out) = run(&shell(), "printf '%s|' 'a b' c");
        assert_eq!(code, 0);
        assert_eq!(out, "a b|c|");
    }

    #[test]
    fn test_echo() {
        let (_, out) = run(&shell(), "echo 'a b'");
        assert_eq!(out, "a b\n");
    }

    #[test]
    fn test_pipe_status_is_right_side() {
        let ctx = shell();
        assert_eq!(run(&ctx, "false | true").0, 0);
        assert_eq!(run(&ctx, "true | false").0, 1);
    }

    #[test]
    fn test_pipe_carries_data() {
        let ctx = shell();
        assert_eq!(run(&ctx, "printf 'x\\ny\\n' | sort -r").1, "y\nx\n");
        assert_eq!(run(&ctx, "printf 'b\\na\\n' | sort | head -n 1").1, "a\n");
        assert_eq!(run(&ctx, "echo abc | tr a-z A-Z").1, "ABC\n");
    }

    #[test]
    fn test_unread_pipe_output_is_drained() {
        let (code, out) = run(&shell(), "head -c 200000 /dev/zero | true");
        assert_eq!(code, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_sequence_status_is_last() {
        let ctx = shell();
        assert_eq!(run(&ctx, "false; true").0, 0);
        assert_eq!(run(&ctx, "true; false").0, 1);
        assert_eq!(run(&ctx, "echo a; echo b").1, "a\nb\n");
    }

    #[test]
    fn test_redirect_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("out.txt");
        let path = file.display();

        let (code, out) = run(&shell(), &format!("echo hi > {path}\ncat < {path}"));
        assert_eq!(code, 0);
        assert_eq!(out, "hi\n");
        assert_eq!(fs::read_to_string(&file).unwrap(), "hi\n");

        // the descriptor is closed once the command finishes
        let moved = tmp.path().join("moved.txt");
        fs::rename(&file, &moved).unwrap();
        fs::remove_file(&moved).unwrap();
    }

    #[test]
    fn test_truncate_and_append() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("log");
        let path = file.display();
        let ctx = shell();

        run(&ctx, &format!("echo old > {path}; echo a > {path}; echo b >> {path}"));
        assert_eq!(fs::read_to_string(&file).unwrap(), "a\nb\n");
    }

    #[test]
    fn test_redirect_stderr() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("err");
        let (code, out) = run(
            &shell(),
            &format!("sh -c 'echo oops >&2; echo fine' 2> {}", file.display()),
        );
        assert_eq!(code, 0);
        assert_eq!(out, "fine\n");
        assert_eq!(fs::read_to_string(&file).unwrap(), "oops\n");
    }

    #[test]
    fn test_redirect_builtin_output() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("vars");
        let ctx = shell();
        run(&ctx, &format!("export MARKER=present > {}", file.display()));
        run(&ctx, &format!("export > {}", file.display()));
        let listing = fs::read_to_string(&file).unwrap();
        assert!(listing.lines().any(|l| l == "MARKER=present"), "{listing}");
    }

    #[test]
    fn test_unsupported_descriptor() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("three");
        let (code, out) = run(&shell(), &format!("echo hi 3> {}", file.display()));
        assert_eq!(code, 1);
        assert!(out.is_empty());
        assert!(!file.exists());

        let (code, _) = run(&shell(), &format!("cat 1< {}", file.display()));
        assert_eq!(code, 1);
    }

    #[test]
    fn test_missing_input_file_skips_command() {
        let (code, out) = run(&shell(), "echo ran < /no/such/file");
        assert_eq!(code, 1);
        assert!(out.is_empty());
    }

    #[test]
    fn test_redirect_without_command_creates_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("empty");
        let (code, _) = run(&shell(), &format!("> {}", file.display()));
        assert_eq!(code, 0);
        assert_eq!(fs::read_to_string(&file).unwrap(), "");
    }

    #[test]
    fn test_assignment_persists() {
        let ctx = shell();
        let (code, out) = run(&ctx, "X=1; echo $X");
        assert_eq!(code, 0);
        assert_eq!(out, "1\n");
        assert_eq!(ctx.env().locals.get("X").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_assignment_to_exported_name_stays_exported() {
        let mut env = Environment::new();
        env.exported.insert("TINYSH_FLAG".into(), "old".into());
        let ctx = ExecContext::new(env, default_commands());

        let (_, out) = run(&ctx, "TINYSH_FLAG=new\nsh -c 'echo $TINYSH_FLAG'");
        assert_eq!(out, "new\n");
    }

    #[test]
    fn test_prefix_assignment_reaches_child_only() {
        let ctx = shell();
        let (_, out) = run(&ctx, "GREETING=hi sh -c 'echo $GREETING'");
        assert_eq!(out, "hi\n");
        assert_eq!(ctx.env().get_var("GREETING"), None);
    }

    #[test]
    fn test_locals_are_not_exported_until_export() {
        let ctx = shell();
        let (_, out) = run(&ctx, "SECRET=1; sh -c 'echo \"[$SECRET]\"'");
        assert_eq!(out, "[]\n");
        let (_, out) = run(&ctx, "export SECRET; sh -c 'echo \"[$SECRET]\"'");
        assert_eq!(out, "[1]\n");
    }

    #[test]
    fn test_export_writes_the_shell_table_only() {
        let ctx = shell();
        let (_, out) = run(&ctx, "export TINYSH_TABLE_ONLY=1; sh -c 'echo $TINYSH_TABLE_ONLY'");
        assert_eq!(out, "1\n");
        assert_eq!(ctx.env().exported_var("TINYSH_TABLE_ONLY"), Some("1"));
        assert!(std::env::var("TINYSH_TABLE_ONLY").is_err());
    }

    #[test]
    fn test_command_substitution() {
        let ctx = shell();
        assert_eq!(run(&ctx, "echo $(echo inner)").1, "inner\n");
        assert_eq!(run(&ctx, "X=5; echo $(echo $X)").1, "5\n");
    }

    #[test]
    fn test_quotes_from_substitutions_are_removed() {
        let ctx = shell();
        assert_eq!(run(&ctx, "echo $(printf \"'a'\")").1, "a\n");
        assert_eq!(run(&ctx, "Q='\"x\"'; echo $Q").1, "x\n");
        assert_eq!(ctx.env().get_var("Q"), Some("\"x\""));
    }

    #[test]
    fn test_parse_error_skips_statement() {
        let (code, out) = run(&shell(), "echo a |\necho b");
        assert_eq!(code, 0);
        assert_eq!(out, "b\n");
    }

    #[test]
    fn test_lexing_error_skips_statement() {
        let (_, out) = run(&shell(), "echo ok\necho 'unterminated");
        assert_eq!(out, "ok\n");
    }

    #[test]
    fn test_command_not_found() {
        let (code, out) = run(&shell(), "tinysh-no-such-command arg");
        assert_eq!(code, 1);
        assert!(out.is_empty());
    }

    #[test]
    fn test_exit_status_propagates() {
        assert_eq!(run(&shell(), "sh -c 'exit 3'").0, 3);
    }

    #[test]
    fn test_empty_program() {
        assert_eq!(run(&shell(), "").0, 0);
        assert_eq!(run(&shell(), "\n;\n").0, 0);
    }

    #[test]
    fn test_source_shares_context() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("lib.sh");
        fs::write(&script, "LIBVAR=loaded\necho sourcing\n").unwrap();

        let ctx = shell();
        let (code, out) = run(&ctx, &format!("source {}; echo $LIBVAR", script.display()));
        assert_eq!(code, 0);
        assert_eq!(out, "sourcing\nloaded\n");
    }

    #[test]
    fn test_interpreter_keeps_state_between_runs() {
        let sh = Interpreter::default();
        assert_eq!(sh.run_str("A=1"), 0);
        assert_eq!(sh.run_str("B=$A$A"), 0);
        assert_eq!(sh.context().env().get_var("B"), Some("11"));
    }

    #[test]
    fn test_run_file_and_reader() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("script.sh");
        fs::write(&script, "true\nsh -c 'exit 4'\n").unwrap();

        let sh = Interpreter::default();
        assert_eq!(sh.run_file(&script).unwrap(), 4);
        assert!(sh.run_file(&tmp.path().join("missing.sh")).is_err());
        assert_eq!(sh.run_reader("false; true".as_bytes()).unwrap(), 0);
    }
}
