use crate::command::{ExecutableCommand, ExitCode};
use crate::context::ExecContext;
use anyhow::{Context, Result};
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

/// Command that is not a builtin.
pub struct ExternalCommand {
    program: PathBuf,
    args: Vec<OsString>,
    // `NAME=value` words written before the command name; only the child sees them.
    overlay: Vec<(String, String)>,
}

impl ExternalCommand {
    /// Resolve `name` on the context's `PATH`.
    ///
    /// Returns `None` if no such program exists.
    pub fn resolve(
        ctx: &ExecContext,
        name: &str,
        args: &[String],
        overlay: Vec<(String, String)>,
    ) -> Option<Self> {
        let search_paths = ctx.env().exported_var("PATH").unwrap_or_default().to_string();
        let program = find_command_path(OsStr::new(&search_paths), Path::new(name))?;
        Some(Self {
            program: program.into_owned(),
            args: args.iter().map(OsString::from).collect(),
            overlay,
        })
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(self: Box<Self>, ctx: &ExecContext) -> Result<ExitCode> {
        let ExternalCommand {
            program,
            args,
            overlay,
        } = *self;
        let exported = ctx.env().exported.clone();
        log::debug!("spawning {} {:?}", program.display(), args);
        let mut child = std::process::Command::new(&program)
            .args(&args)
            .env_clear()
            .envs(exported)
            .envs(overlay)
            .stdin(ctx.stdin.stdio()?)
            .stdout(ctx.stdout.stdio()?)
            .stderr(ctx.stderr.stdio()?)
            .spawn()
            .with_context(|| format!("{}", program.display()))?;
        let exit_status = child.wait()?;
        match exit_status.code() {
            Some(x) => Ok(x),
            None => Ok(terminated_by_signal(exit_status)),
        }
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Relative with multiple components (e.g., `bin/sh`): returns it if it exists.
/// - `./foo` on Unix or any `./`-prefixed path on other platforms: returns it if it exists.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first existing match.
/// - Empty path: returns `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result is discovered via PATH lookup.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, _) => None,
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| candidate.is_file())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}
