// src/system/output.rs

//! Output sinks shared by concurrently running commands.
//!
//! Every command writes whole lines through a [`SharedWriter`]. The writer
//! holds its lock for exactly one line, so lines coming from different
//! processes may interleave with each other but are never torn apart.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// A line-oriented, internally synchronized writer.
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl fmt::Debug for SharedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedWriter").finish_non_exhaustive()
    }
}

impl SharedWriter {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Writes one line, tagged with `[prefix]` when a prefix is given.
    pub fn write_line(&self, prefix: Option<&str>, line: &str) -> io::Result<()> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match prefix {
            Some(prefix) => writeln!(guard, "[{}] {}", prefix, line)?,
            None => writeln!(guard, "{}", line)?,
        }
        guard.flush()
    }
}

/// The pair of sinks a command writes to.
#[derive(Debug, Clone)]
pub struct Output {
    pub stdout: SharedWriter,
    pub stderr: SharedWriter,
    /// Tag added in front of every line, e.g. the command name.
    pub prefix: Option<String>,
}

impl Output {
    pub fn new(stdout: SharedWriter, stderr: SharedWriter) -> Self {
        Self {
            stdout,
            stderr,
            prefix: None,
        }
    }

    /// The process' own standard streams.
    pub fn stdio() -> Self {
        Self::new(SharedWriter::new(io::stdout()), SharedWriter::new(io::stderr()))
    }

    /// The same sinks, tagging lines with `prefix`.
    pub fn with_prefix(&self, prefix: impl Into<String>) -> Self {
        Self {
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            prefix: Some(prefix.into()),
        }
    }

    pub fn out(&self, line: &str) -> io::Result<()> {
        self.stdout.write_line(self.prefix.as_deref(), line)
    }

    pub fn err(&self, line: &str) -> io::Result<()> {
        self.stderr.write_line(self.prefix.as_deref(), line)
    }
}

/// An in-memory sink, used to capture output in tests and by front-ends.
#[derive(Debug, Clone, Default)]
pub struct MemoryBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    pub fn writer(&self) -> SharedWriter {
        SharedWriter::new(self.clone())
    }
}

impl Write for MemoryBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_prefixed_lines() {
        let out = MemoryBuffer::new();
        let err = MemoryBuffer::new();
        let output = Output::new(out.writer(), err.writer()).with_prefix("build");
        output.out("compiling").unwrap();
        output.err("warning").unwrap();
        assert_eq!(out.lines(), vec!["[build] compiling"]);
        assert_eq!(err.lines(), vec!["[build] warning"]);
    }

    #[test]
    fn test_concurrent_lines_are_never_torn() {
        let buffer = MemoryBuffer::new();
        let writer = buffer.writer();
        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|tag| {
                let writer = writer.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        writer.write_line(Some(tag), &format!("line {}", i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let lines = buffer.lines();
        assert_eq!(lines.len(), 1000);
        assert!(lines
            .iter()
            .all(|line| line.starts_with("[a] line ") || line.starts_with("[b] line ")));
    }
}
