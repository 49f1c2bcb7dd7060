//! Diagnostic messages emitted by passes.
//!
//! Passes do not fail on data-dependent conditions they can work around; they
//! record a diagnostic and carry on.

use std::fmt;

/// A diagnostic message (warning or info) produced while transforming a pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    pub message: String,
    pub kind: DiagnosticKind,
    pub severity: DiagnosticSeverity,
    pub phase: PassPhase,
}

/// Severity level of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticSeverity {
    Warning,
    Info,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// An allocation's byte size overflowed and was accounted as zero.
    SizeOverflowIgnored { allocation: String },
}

/// Pass that emitted a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassPhase {
    Raising,
    Lowering,
    Profiling,
}

impl Diagnostic {
    pub fn warning(phase: PassPhase, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            severity: DiagnosticSeverity::Warning,
            phase,
        }
    }
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Warning => write!(f, "WARNING"),
            DiagnosticSeverity::Info => write!(f, "INFO"),
        }
    }
}

impl fmt::Display for PassPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassPhase::Raising => write!(f, "raise"),
            PassPhase::Lowering => write!(f, "lower"),
            PassPhase::Profiling => write!(f, "profile"),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.severity, self.phase, self.message)
    }
}
