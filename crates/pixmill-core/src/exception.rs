//! Non-fatal diagnostics.
//!
//! Coders report recoverable problems (a short final row, an out-of-range
//! colormap index) as [`Warning`] values instead of failing. Warnings are
//! attached to the image they concern and mirrored into the caller's
//! exception sink by `pixmill-io`.
//!
//! The rendered form is `"<module> <severity> <template> <arg>"`:
//!
//! ```rust
//! use pixmill_core::{Severity, Warning};
//!
//! let w = Warning::new("pnm", Severity::CorruptImageWarning, "UnexpectedEndOfFile", "a.pgm");
//! assert_eq!(w.to_string(), "pnm CorruptImageWarning UnexpectedEndOfFile a.pgm");
//! ```

use std::fmt;

/// Severity class of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Generic recoverable condition.
    Warning,
    /// Input data is damaged but partially usable.
    CorruptImageWarning,
    /// Coder could not honour an option.
    CoderWarning,
    /// Metadata could not be interpreted.
    OptionWarning,
    /// Delegate program reported trouble.
    DelegateWarning,
}

impl Severity {
    /// Name used in rendered diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "Warning",
            Self::CorruptImageWarning => "CorruptImageWarning",
            Self::CoderWarning => "CoderWarning",
            Self::OptionWarning => "OptionWarning",
            Self::DelegateWarning => "DelegateWarning",
        }
    }
}

/// A recoverable diagnostic with a stable template and a free argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Reporting module, usually the coder tag in lowercase.
    pub module: String,
    /// Severity class.
    pub severity: Severity,
    /// Stable message template such as `UnexpectedEndOfFile`.
    pub template: String,
    /// Context argument, typically a filename.
    pub arg: String,
}

impl Warning {
    /// Creates a warning.
    pub fn new(
        module: impl Into<String>,
        severity: Severity,
        template: impl Into<String>,
        arg: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            severity,
            template: template.into(),
            arg: arg.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.module,
            self.severity.as_str(),
            self.template,
            self.arg
        )
    }
}
