// src/core/scanner.rs

//! One-token lookahead over a stack of lexers.
//!
//! Every file being read owns a [`Frame`]. An `include` pushes a frame per
//! named file (one at a time, in order). An exhausted frame stays on top,
//! reporting the end of input, until [`Scanner::finish_file`] drops it and
//! hands control back to the including file right where it stopped.

use crate::core::decoder::DecodeError;
use crate::core::lexer::{Lexer, Token, TokenKind};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

/// The token stream of a single file.
#[derive(Debug)]
struct Frame {
    path: PathBuf,
    lexer: Lexer,
    curr: Token,
    peek: Token,
    /// Files still to include once the current child frame is done.
    queued: VecDeque<PathBuf>,
}

impl Frame {
    fn new(path: PathBuf, bytes: &[u8]) -> Self {
        let mut lexer = Lexer::new(bytes);
        let curr = lexer.next_token();
        let peek = lexer.next_token();
        Self {
            path,
            lexer,
            curr,
            peek,
            queued: VecDeque::new(),
        }
    }

    fn advance(&mut self) {
        let next = self.lexer.next_token();
        self.curr = std::mem::replace(&mut self.peek, next);
    }
}

/// What happened to the frame stack while advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameChange {
    /// A file was exhausted and its frame removed.
    Popped,
    /// A queued include was opened.
    Pushed,
}

#[derive(Debug)]
pub struct Scanner {
    current: Frame,
    parents: Vec<Frame>,
}

impl Scanner {
    /// Starts scanning `bytes`, read from `path`.
    pub fn new(path: impl Into<PathBuf>, bytes: &[u8]) -> Self {
        Self {
            current: Frame::new(path.into(), bytes),
            parents: Vec::new(),
        }
    }

    /// Starts scanning the file at `path`.
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let bytes = read(path)?;
        Ok(Self::new(canonical(path), &bytes))
    }

    pub fn curr(&self) -> &Token {
        &self.current.curr
    }

    pub fn peek(&self) -> &Token {
        &self.current.peek
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.current.curr.kind == kind
    }

    /// Number of open files.
    pub fn depth(&self) -> usize {
        self.parents.len() + 1
    }

    /// The file the current token comes from.
    pub fn path(&self) -> &Path {
        &self.current.path
    }

    /// The text of a line of the current file.
    pub fn line_text(&self, line: usize) -> String {
        self.current.lexer.line_text(line)
    }

    /// Moves to the next token of the current file. The end of an included
    /// file is reported as [`TokenKind::Eof`] until [`Scanner::finish_file`].
    pub fn advance(&mut self) {
        self.current.advance();
    }

    /// Drops the exhausted current file, opening the next queued include of
    /// its parent if any. Returns `false` once the outermost file is done.
    pub fn finish_file(
        &mut self,
        on_change: &mut dyn FnMut(FrameChange),
    ) -> Result<bool, DecodeError> {
        if self.current.curr.kind != TokenKind::Eof {
            return Ok(true);
        }
        let Some(parent) = self.parents.pop() else {
            return Ok(false);
        };
        let done = std::mem::replace(&mut self.current, parent);
        log::debug!("Finished reading included file {}", done.path.display());
        on_change(FrameChange::Popped);
        self.open_queued(on_change)?;
        Ok(true)
    }

    /// Queues `files` for inclusion and opens the first one. Relative paths
    /// resolve against the directory of the including file.
    pub fn include(
        &mut self,
        files: &[String],
        on_change: &mut dyn FnMut(FrameChange),
    ) -> Result<(), DecodeError> {
        let base = self
            .current
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let paths: VecDeque<PathBuf> = files
            .iter()
            .map(|file| {
                let expanded = shellexpand::tilde(file).into_owned();
                let path = PathBuf::from(expanded);
                if path.is_absolute() {
                    path
                } else {
                    base.join(path)
                }
            })
            .collect();
        self.current.queued = paths;
        self.open_queued(on_change)
    }

    fn open_queued(&mut self, on_change: &mut dyn FnMut(FrameChange)) -> Result<(), DecodeError> {
        let Some(path) = self.current.queued.pop_front() else {
            return Ok(());
        };
        let path = canonical(&path);
        let on_stack = std::iter::once(&self.current)
            .chain(self.parents.iter())
            .any(|frame| frame.path == path);
        if on_stack {
            return Err(DecodeError::IncludeCycle(path));
        }
        let bytes = read(&path)?;
        log::debug!("Including file {}", path.display());
        let child = Frame::new(path, &bytes);
        let parent = std::mem::replace(&mut self.current, child);
        self.parents.push(parent);
        on_change(FrameChange::Pushed);
        Ok(())
    }
}

fn read(path: &Path) -> Result<Vec<u8>, DecodeError> {
    fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn canonical(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
