//! Central database of all source files in an elaboration session.

use crate::file_id::FileId;
use crate::span::Span;
use std::io;
use std::path::{Path, PathBuf};

/// A resolved source location in human-readable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Path of the source file.
    pub path: PathBuf,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.line)
    }
}

/// One registered source file with a precomputed line-start index.
struct SourceFile {
    path: PathBuf,
    content: String,
    /// Byte offset of the start of each line.
    line_starts: Vec<u32>,
}

impl SourceFile {
    fn new(path: PathBuf, content: String) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in content.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        Self {
            path,
            content,
            line_starts,
        }
    }

    /// Returns the 1-based (line, column) of a byte offset.
    fn line_col(&self, offset: u32) -> (u32, u32) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let col = offset - self.line_starts[line];
        (line as u32 + 1, col + 1)
    }
}

/// The source database, owning all loaded source text and resolving
/// [`Span`]s to line/column coordinates for diagnostics.
pub struct SourceDb {
    files: Vec<SourceFile>,
}

impl SourceDb {
    /// Creates an empty source database.
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    /// Loads a source file from the filesystem and returns its [`FileId`].
    pub fn load_file(&mut self, path: &Path) -> Result<FileId, io::Error> {
        let content = std::fs::read_to_string(path)?;
        Ok(self.register(path.to_path_buf(), content))
    }

    /// Adds a source file from an in-memory string (useful for tests).
    ///
    /// The `name` parameter is used as the file path in diagnostics.
    pub fn add_source(&mut self, name: impl Into<PathBuf>, content: String) -> FileId {
        self.register(name.into(), content)
    }

    fn register(&mut self, path: PathBuf, content: String) -> FileId {
        let id = FileId::from_raw(self.files.len() as u32);
        self.files.push(SourceFile::new(path, content));
        id
    }

    /// Resolves the start of a [`Span`] to a human-readable [`Location`].
    ///
    /// Dummy spans resolve to line 0 of a `<synthesized>` pseudo-file.
    pub fn locate(&self, span: Span) -> Location {
        if span.is_dummy() {
            return Location {
                path: PathBuf::from("<synthesized>"),
                line: 0,
                column: 0,
            };
        }
        let file = &self.files[span.file.as_raw() as usize];
        let (line, column) = file.line_col(span.start);
        Location {
            path: file.path.clone(),
            line,
            column,
        }
    }

    /// Returns the source text corresponding to a [`Span`].
    pub fn snippet(&self, span: Span) -> &str {
        let file = &self.files[span.file.as_raw() as usize];
        &file.content[span.start as usize..span.end as usize]
    }
}

impl Default for SourceDb {
    fn default() -> Self {
        Self::new()
    }
}
