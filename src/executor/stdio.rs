use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::process::Stdio;

/// Descriptors that replace the engine's own standard streams.
///
/// `None` means inherit. The engine duplicates a descriptor for every use,
/// so the borrowed handle (a socket, say) stays open and owned by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioOverrides<'a> {
    pub stdin: Option<BorrowedFd<'a>>,
    pub stdout: Option<BorrowedFd<'a>>,
    pub stderr: Option<BorrowedFd<'a>>,
}

impl<'a> StdioOverrides<'a> {
    pub fn inherit() -> Self {
        Self::default()
    }

    /// Routes all three streams through one handle.
    pub fn all<F: AsFd>(handle: &'a F) -> Self {
        let fd = handle.as_fd();
        StdioOverrides {
            stdin: Some(fd),
            stdout: Some(fd),
            stderr: Some(fd),
        }
    }

    /// Routes stdout and stderr through `handle`; stdin is inherited.
    pub fn output<F: AsFd>(handle: &'a F) -> Self {
        let fd = handle.as_fd();
        StdioOverrides {
            stdin: None,
            stdout: Some(fd),
            stderr: Some(fd),
        }
    }
}

pub(crate) fn stdio_for(fd: Option<BorrowedFd<'_>>) -> io::Result<Stdio> {
    match fd {
        Some(fd) => Ok(Stdio::from(fd.try_clone_to_owned()?)),
        None => Ok(Stdio::inherit()),
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Fallback {
    Stdout,
    Stderr,
}

/// In-process writer for output produced by the engine itself.
pub(crate) enum StreamWriter {
    Stdout(io::Stdout),
    Stderr(io::Stderr),
    File(File),
}

impl StreamWriter {
    pub(crate) fn open(fd: Option<BorrowedFd<'_>>, fallback: Fallback) -> io::Result<Self> {
        Ok(match (fd, fallback) {
            (Some(fd), _) => StreamWriter::File(File::from(fd.try_clone_to_owned()?)),
            (None, Fallback::Stdout) => StreamWriter::Stdout(io::stdout()),
            (None, Fallback::Stderr) => StreamWriter::Stderr(io::stderr()),
        })
    }
}

impl Write for StreamWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            StreamWriter::Stdout(w) => w.write(buf),
            StreamWriter::Stderr(w) => w.write(buf),
            StreamWriter::File(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            StreamWriter::Stdout(w) => w.flush(),
            StreamWriter::Stderr(w) => w.flush(),
            StreamWriter::File(w) => w.flush(),
        }
    }
}
