use std::fs::File;
use std::io::{self, PipeReader, PipeWriter, Read, Result as IoResult, Write};
use std::process::Stdio;
use std::sync::Arc;

/// Where a command reads its standard input from.
///
/// Cloning is cheap and shares the underlying handle; the handle is closed once
/// the last clone is dropped.
#[derive(Debug, Clone)]
pub enum InputStream {
    /// The interpreter's own standard input.
    Inherit,
    /// A file opened by a `<` redirection.
    File(Arc<File>),
    /// The read end of a pipeline.
    Pipe(Arc<PipeReader>),
}

impl InputStream {
    /// Produce a [`Stdio`] handle suitable for `std::process::Command`.
    ///
    /// Files and pipes are duplicated so the child owns its own descriptor.
    pub fn stdio(&self) -> IoResult<Stdio> {
        Ok(match self {
            InputStream::Inherit => Stdio::inherit(),
            InputStream::File(file) => file.try_clone()?.into(),
            InputStream::Pipe(reader) => reader.try_clone()?.into(),
        })
    }
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        match self {
            InputStream::Inherit => io::stdin().read(buf),
            InputStream::File(file) => (&**file).read(buf),
            InputStream::Pipe(reader) => (&**reader).read(buf),
        }
    }
}

/// Where a command writes its standard output or standard error to.
#[derive(Debug, Clone)]
pub enum OutputStream {
    /// The interpreter's own standard output.
    Stdout,
    /// The interpreter's own standard error.
    Stderr,
    /// A file opened by a `>` or `>>` redirection.
    File(Arc<File>),
    /// The write end of a pipeline.
    Pipe(Arc<PipeWriter>),
}

impl OutputStream {
    /// Produce a [`Stdio`] handle suitable for `std::process::Command`.
    ///
    /// Our own buffered output is flushed first so it is not overtaken by the child's.
    pub fn stdio(&self) -> IoResult<Stdio> {
        Ok(match self {
            OutputStream::Stdout => {
                io::stdout().flush()?;
                Stdio::inherit()
            }
            OutputStream::Stderr => Stdio::from(io::stderr()),
            OutputStream::File(file) => file.try_clone()?.into(),
            OutputStream::Pipe(writer) => writer.try_clone()?.into(),
        })
    }
}

impl Write for OutputStream {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        match self {
            OutputStream::Stdout => io::stdout().write(data),
            OutputStream::Stderr => io::stderr().write(data),
            OutputStream::File(file) => (&**file).write(data),
            OutputStream::Pipe(writer) => (&**writer).write(data),
        }
    }

    fn flush(&mut self) -> IoResult<()> {
        match self {
            OutputStream::Stdout => io::stdout().flush(),
            OutputStream::Stderr => io::stderr().flush(),
            OutputStream::File(file) => (&**file).flush(),
            OutputStream::Pipe(writer) => (&**writer).flush(),
        }
    }
}
