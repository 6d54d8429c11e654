use crate::context::ExecContext;
use anyhow::Result;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Object-safe trait for any command that can be executed by the shell.
///
/// This is implemented by built-ins via a blanket impl and by external commands.
pub trait ExecutableCommand {
    /// Executes the command against the context's streams and variables.
    fn execute(self: Box<Self>, ctx: &ExecContext) -> Result<ExitCode>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
/// Factories are shared between pipeline branches, hence `Send + Sync`.
pub trait CommandFactory: Send + Sync {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>>;
}
