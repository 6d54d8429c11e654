use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::context::ExecContext;
use crate::interpreter::{Factory, run_program};
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd" or "exit".
    fn name() -> &'static str;

    /// Whether arguments starting with `-` are positional values (`exit -1`, `cd -dir`).
    ///
    /// `--help` is still honoured when it is the only argument.
    fn dashed_positionals() -> bool {
        false
    }

    /// Executes the command with full access to the context.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, ctx: &ExecContext) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(self: Box<Self>, ctx: &ExecContext) -> Result<ExitCode> {
        match T::execute(*self, ctx) {
            Ok(x) => Ok(x),
            Err(e) => {
                let mut stderr = ctx.stderr.clone();
                writeln!(stderr, "{}: {:#}", T::name(), e)?;
                Ok(1)
            }
        }
    }
}

/// Help output or a usage error produced by argh while parsing builtin arguments.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(self: Box<Self>, ctx: &ExecContext) -> Result<ExitCode> {
        if self.is_error {
            let mut stderr = ctx.stderr.clone();
            writeln!(stderr, "{}", self.output.trim_end())?;
            Ok(1)
        } else {
            let mut stdout = ctx.stdout.clone();
            writeln!(stdout, "{}", self.output.trim_end())?;
            Ok(0)
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            let parsed = if T::dashed_positionals() && !matches!(args, ["--help"] | ["--", ..]) {
                // `--` ends option parsing, so `-1` reaches the positional field
                let args: Vec<&str> = std::iter::once("--").chain(args.iter().copied()).collect();
                T::from_args(&[name], &args)
            } else {
                T::from_args(&[name], args)
            };
            Some(match parsed {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

/// The builtins every interpreter starts with: `cd`, `exit`, `export` and `source`.
pub fn default_commands() -> Vec<Box<dyn CommandFactory>> {
    vec![
        Box::new(Factory::<Cd>::default()),
        Box::new(Factory::<Exit>::default()),
        Box::new(Factory::<Export>::default()),
        Box::new(Factory::<Source>::default()),
    ]
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn dashed_positionals() -> bool {
        true
    }

    fn execute(self, ctx: &ExecContext) -> Result<ExitCode> {
        let target = match self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match ctx.env().exported_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => bail!("HOME not set"),
            },
        };

        env::set_current_dir(&target).with_context(|| format!("{}", target.display()))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell with the given status (0 by default).
pub struct Exit {
    #[argh(positional, greedy)]
    /// exit status; at most one numeric argument is accepted.
    pub args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn dashed_positionals() -> bool {
        true
    }

    fn execute(self, ctx: &ExecContext) -> Result<ExitCode> {
        let code = match self.args.as_slice() {
            [] => 0,
            [code] => code
                .parse::<ExitCode>()
                .map_err(|_| anyhow::anyhow!("numeric argument required"))?,
            _ => bail!("too many arguments"),
        };
        // process::exit skips destructors, so push out anything still buffered.
        let mut stdout = ctx.stdout.clone();
        let _ = stdout.flush();
        let _ = std::io::stdout().flush();
        std::process::exit(code)
    }
}

#[derive(FromArgs)]
/// Export variables to the environment of spawned commands.
/// Without arguments, print every exported variable as NAME=value.
pub struct Export {
    #[argh(positional, greedy)]
    /// NAME to promote a shell variable, or NAME=value to set and export in one step.
    pub names: Vec<String>,
}

impl BuiltinCommand for Export {
    fn name() -> &'static str {
        "export"
    }

    fn execute(self, ctx: &ExecContext) -> Result<ExitCode> {
        if self.names.is_empty() {
            let listing: String = ctx
                .env()
                .exported_sorted()
                .into_iter()
                .map(|(k, v)| format!("{k}={v}\n"))
                .collect();
            let mut stdout = ctx.stdout.clone();
            stdout.write_all(listing.as_bytes())?;
            return Ok(0);
        }

        let mut vars = ctx.env();
        for arg in self.names {
            match arg.split_once('=') {
                Some((name, value)) => vars.export(name, Some(value.to_string())),
                None => vars.export(&arg, None),
            }
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Read and execute commands from a file in the current shell.
pub struct Source {
    #[argh(positional)]
    /// the script to run.
    pub path: String,
}

impl BuiltinCommand for Source {
    fn name() -> &'static str {
        "source"
    }

    fn execute(self, ctx: &ExecContext) -> Result<ExitCode> {
        let text = fs::read_to_string(&self.path).with_context(|| self.path.clone())?;
        Ok(run_program(ctx, &text))
    }
}
