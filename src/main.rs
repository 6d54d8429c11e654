use argh::FromArgs;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use tinysh::{ExitCode, Interpreter};

#[derive(FromArgs)]
/// A small line-oriented shell.
/// Runs the -c string if given, else the script, else reads commands from stdin.
struct Args {
    #[argh(option, short = 'c')]
    /// run the given command string and exit.
    command: Option<String>,

    #[argh(switch, short = 'v')]
    /// log spawned commands and other debug details to stderr.
    verbose: bool,

    #[argh(positional)]
    /// script file to run.
    script: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_location_level(LevelFilter::Off)
        .build();
    if let Err(err) = TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Never) {
        eprintln!("tinysh: cannot set up logging: {err}");
    }
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let sh = Interpreter::default();
    if let Some(command) = args.command {
        return Ok(sh.run_str(&command));
    }
    if let Some(script) = args.script {
        return sh.run_file(&script);
    }
    if io::stdin().is_terminal() {
        return Ok(sh.repl()?);
    }
    sh.run_reader(io::stdin().lock())
}

fn main() {
    let args: Args = argh::from_env();
    init_logging(args.verbose);

    let code = match run(args) {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err:#}");
            1
        }
    };
    let _ = io::stdout().flush();
    std::process::exit(code)
}
