use crate::command::{CommandFactory, ExecutableCommand};
use crate::env::Environment;
use crate::io_adapters::{InputStream, OutputStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Everything a node needs in order to execute.
///
/// The context is a value type: redirections and pipes derive a copy with one
/// stream replaced and hand it to the wrapped node, so sibling branches never
/// see each other's rebindings. The [`Environment`] is shared by every copy,
/// which makes assignments visible to later statements of the same run.
///
/// Pipeline branches run on separate threads and share that environment
/// too; assignments made concurrently in both branches land in unspecified
/// order.
#[derive(Clone)]
pub struct ExecContext {
    env: Arc<Mutex<Environment>>,
    commands: Arc<Vec<Box<dyn CommandFactory>>>,
    pub stdin: InputStream,
    pub stdout: OutputStream,
    pub stderr: OutputStream,
}

impl ExecContext {
    /// A context bound to the interpreter's own standard streams.
    pub fn new(env: Environment, commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Arc::new(Mutex::new(env)),
            commands: Arc::new(commands),
            stdin: InputStream::Inherit,
            stdout: OutputStream::Stdout,
            stderr: OutputStream::Stderr,
        }
    }

    /// Lock the shared variable bindings.
    ///
    /// Keep the guard short-lived: never hold it across command execution.
    pub fn env(&self) -> MutexGuard<'_, Environment> {
        self.env.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_stdin(&self, stdin: InputStream) -> Self {
        Self {
            stdin,
            ..self.clone()
        }
    }

    pub fn with_stdout(&self, stdout: OutputStream) -> Self {
        Self {
            stdout,
            ..self.clone()
        }
    }

    pub fn with_stderr(&self, stderr: OutputStream) -> Self {
        Self {
            stderr,
            ..self.clone()
        }
    }

    /// Ask the registered factories, in order, for a command called `name`.
    pub fn lookup_command(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        self.commands
            .iter()
            .find_map(|factory| factory.try_create(name, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_copies_share_variables() {
        let ctx = ExecContext::new(Environment::default(), Vec::new());
        let copy = ctx.with_stderr(OutputStream::Stdout);
        copy.env().assign("SHARED", "yes");
        assert_eq!(ctx.env().get_var("SHARED"), Some("yes"));
    }

    #[test]
    fn test_with_stream_overrides_one_field() {
        let ctx = ExecContext::new(Environment::default(), Vec::new());
        let (reader, _writer) = io::pipe().unwrap();
        let copy = ctx.with_stdin(InputStream::Pipe(Arc::new(reader)));

        assert!(matches!(copy.stdin, InputStream::Pipe(_)));
        assert!(matches!(copy.stdout, OutputStream::Stdout));
        assert!(matches!(copy.stderr, OutputStream::Stderr));
        // the original is untouched
        assert!(matches!(ctx.stdin, InputStream::Inherit));
    }

    #[test]
    fn test_lookup_without_factories() {
        let ctx = ExecContext::new(Environment::default(), Vec::new());
        assert!(ctx.lookup_command("cd", &[]).is_none());
    }
}
