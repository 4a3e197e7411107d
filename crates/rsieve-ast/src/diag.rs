//! Compile-time diagnostics with script locations.

use std::fmt;

/// Position within a script source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Location {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl Location {
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Diagnostic severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A single parse or validation diagnostic.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Option<Location>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match self.location {
            Some(loc) => write!(f, "{kind}: {loc}: {}", self.message),
            None => write!(f, "{kind}: {}", self.message),
        }
    }
}

/// Accumulating diagnostic sink shared by parser and validator.
///
/// Errors past `max_errors` are counted but not stored, so a pathological
/// script cannot balloon memory.
#[derive(Debug)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
    max_errors: usize,
}

impl Diagnostics {
    pub const DEFAULT_MAX_ERRORS: usize = 20;

    #[must_use]
    pub fn new() -> Self {
        Self::with_max_errors(Self::DEFAULT_MAX_ERRORS)
    }

    #[must_use]
    pub fn with_max_errors(max_errors: usize) -> Self {
        Self {
            entries: Vec::new(),
            error_count: 0,
            warning_count: 0,
            max_errors,
        }
    }

    pub fn error(&mut self, location: Option<Location>, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(?location, %message, "sieve compile error");
        self.error_count += 1;
        if self.error_count <= self.max_errors {
            self.entries.push(Diagnostic {
                severity: Severity::Error,
                location,
                message,
            });
        }
    }

    pub fn warning(&mut self, location: Option<Location>, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(?location, %message, "sieve compile warning");
        self.warning_count += 1;
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            location,
            message,
        });
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    #[must_use]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// First error message, if any. Convenient for terse callers.
    #[must_use]
    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.entries
            .iter()
            .find(|d| d.severity == Severity::Error)
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_cap() {
        let mut diags = Diagnostics::with_max_errors(2);
        for i in 0..5 {
            diags.error(Some(Location::new(i + 1, 1)), format!("e{i}"));
        }
        assert_eq!(diags.error_count(), 5);
        assert_eq!(diags.entries().len(), 2);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_display() {
        let d = Diagnostic {
            severity: Severity::Error,
            location: Some(Location::new(3, 7)),
            message: "unknown command".into(),
        };
        assert_eq!(d.to_string(), "error: line 3, column 7: unknown command");
    }
}
