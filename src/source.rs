use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Template text plus the identity it is cached and reported under.
///
/// The identity is the file path for file-backed templates and a
/// content-derived key (`inline:<hash>`) for inline strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    text: String,
    identity: String,
    path: Option<PathBuf>,
}

impl Source {
    pub fn new(identity: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            identity: identity.into(),
            path: None,
        }
    }

    /// Wraps an inline template, deriving its identity from the content.
    pub fn from_string(text: impl Into<String>) -> Self {
        let text = text.into();
        let identity = inline_identity(&text);
        Self {
            text,
            identity,
            path: None,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Ok(Self {
            text,
            identity: path.display().to_string(),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the lines within `radius` of `line` (1-based), with `line`
    /// flagged. Lines are counted over newline-normalized text.
    pub fn context(&self, line: usize, radius: usize) -> Vec<ContextLine> {
        let normalized = normalize_newlines(&self.text);
        let first = line.saturating_sub(radius).max(1);
        let last = line.saturating_add(radius);
        normalized
            .split('\n')
            .enumerate()
            .map(|(i, text)| (i + 1, text))
            .filter(|(number, _)| (first..=last).contains(number))
            .map(|(number, text)| ContextLine {
                number,
                text: text.to_string(),
                flagged: number == line,
            })
            .collect()
    }
}

/// One line of a diagnostic context window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextLine {
    pub number: usize,
    pub text: String,
    pub flagged: bool,
}

/// Content key for inline templates: identical text maps to the same identity.
pub fn inline_identity(text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    format!("inline:{:016x}", hasher.finish())
}

/// Folds `\r\n` and lone `\r` into `\n`.
pub(crate) fn normalize_newlines(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}
