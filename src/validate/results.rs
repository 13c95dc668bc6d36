//! Validation issue reporting

use std::fmt;

/// OCFL validation codes emitted by the structural validator.
///
/// `E000` is used for inventory-structure failures that do not map onto a
/// single published code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationCode {
    /// Catch-all for inventory structure violations
    E000,
    /// Object namaste declaration missing or invalid
    E003,
    /// Version directory missing
    E010,
    /// Content file not listed in the manifest
    E023,
    /// inventory.json missing
    E034,
    /// Inventory does not agree with its sidecar
    E058,
    /// Content file missing or failing its manifest digest
    E092,
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    code: ValidationCode,
    message: String,
}

impl ValidationIssue {
    pub fn new(code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ValidationCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// The full outcome of validating one object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResults {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl ValidationResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, code: ValidationCode, message: impl Into<String>) {
        self.errors.push(ValidationIssue::new(code, message));
    }

    pub fn warning(&mut self, code: ValidationCode, message: impl Into<String>) {
        self.warnings.push(ValidationIssue::new(code, message));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationIssue] {
        &self.errors
    }

    pub fn warnings(&self) -> &[ValidationIssue] {
        &self.warnings
    }
}

impl fmt::Display for ValidationResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error(s), {} warning(s)",
            self.errors.len(),
            self.warnings.len()
        )?;
        for issue in &self.errors {
            write!(f, "\n  error: {}", issue)?;
        }
        for issue in &self.warnings {
            write!(f, "\n  warning: {}", issue)?;
        }
        Ok(())
    }
}
