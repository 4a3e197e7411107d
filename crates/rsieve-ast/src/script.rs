//! Script source handles.
//!
//! A [`Script`] identifies a piece of Sieve source (file or inline buffer)
//! plus a display name. Loading is lazy and enforces the configured size
//! cap; the content fingerprint ties compiled binaries back to their
//! source.

use std::fs;
use std::path::{Path, PathBuf};

use xxhash_rust::xxh3::xxh3_64;

/// Errors produced while opening script sources.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("script '{0}' not found")]
    NotFound(String),
    #[error("script '{name}' is too large ({size} bytes, limit {limit})")]
    TooLarge { name: String, size: u64, limit: u64 },
    #[error("script '{0}' is not valid UTF-8")]
    NotUtf8(String),
    #[error("failed to read script '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug)]
enum Source {
    File(PathBuf),
    Inline(String),
}

/// Handle identifying one Sieve script source.
#[derive(Clone, Debug)]
pub struct Script {
    name: String,
    source: Source,
}

impl Script {
    /// Script backed by a file; the display name is the file stem.
    #[must_use]
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("script")
            .to_string();
        Self {
            name,
            source: Source::File(path),
        }
    }

    /// Script backed by an in-memory buffer.
    #[must_use]
    pub fn inline(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: Source::Inline(content.into()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            Source::File(path) => Some(path),
            Source::Inline(_) => None,
        }
    }

    /// Load the source text, enforcing `max_size` when given.
    pub fn load(&self, max_size: Option<u64>) -> Result<String, ScriptError> {
        let content = match &self.source {
            Source::Inline(content) => content.clone(),
            Source::File(path) => {
                let bytes = fs::read(path).map_err(|err| {
                    if err.kind() == std::io::ErrorKind::NotFound {
                        ScriptError::NotFound(self.name.clone())
                    } else {
                        ScriptError::Io {
                            name: self.name.clone(),
                            source: err,
                        }
                    }
                })?;
                String::from_utf8(bytes)
                    .map_err(|_| ScriptError::NotUtf8(self.name.clone()))?
            }
        };
        if let Some(limit) = max_size {
            let size = content.len() as u64;
            if size > limit {
                return Err(ScriptError::TooLarge {
                    name: self.name.clone(),
                    size,
                    limit,
                });
            }
        }
        Ok(content)
    }

    /// Content fingerprint recorded into compiled binaries.
    #[must_use]
    pub fn fingerprint(content: &str) -> u64 {
        xxh3_64(content.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_inline_load() {
        let script = Script::inline("main", "keep;");
        assert_eq!(script.name(), "main");
        assert_eq!(script.load(None).unwrap(), "keep;");
    }

    #[test]
    fn test_size_cap() {
        let script = Script::inline("main", "keep;");
        assert!(matches!(
            script.load(Some(3)),
            Err(ScriptError::TooLarge { .. })
        ));
        assert!(script.load(Some(64)).is_ok());
    }

    #[test]
    fn test_file_load_and_name() {
        let mut file = tempfile::Builder::new()
            .suffix(".sieve")
            .tempfile()
            .unwrap();
        write!(file, "discard;").unwrap();
        let script = Script::from_file(file.path());
        assert_eq!(script.load(None).unwrap(), "discard;");
        assert!(script.path().is_some());
    }

    #[test]
    fn test_missing_file() {
        let script = Script::from_file("/nonexistent/filter.sieve");
        assert!(matches!(script.load(None), Err(ScriptError::NotFound(_))));
    }

    #[test]
    fn test_fingerprint_stability() {
        assert_eq!(Script::fingerprint("keep;"), Script::fingerprint("keep;"));
        assert_ne!(Script::fingerprint("keep;"), Script::fingerprint("stop;"));
    }
}
