//! Error taxonomy for analysis invocation.
//!
//! Every failure that reaches a caller of `analyze` is an [`AnalysisError`].
//! Only the [`AnalysisError::Fault`] variant can ever be intercepted by a
//! resilience scope; the others describe misuse or a broken dependency graph
//! and always surface.
//!
//! # Example
//!
//! ```rust
//! use anacore::errors::AnalysisError;
//! use anacore::fault::Fault;
//!
//! let err: AnalysisError = Fault::value("bad operand").into();
//! assert!(err.is_capturable());
//! assert!(!AnalysisError::unknown("CFG").is_capturable());
//! ```

use crate::fault::Fault;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// No descriptor is registered under this name.
    #[error("Unknown analysis: {name}")]
    UnknownAnalysis { name: String },

    /// An argument cannot take part in key equality.
    #[error("Unhashable argument {position} for {analysis}: {reason}")]
    UnhashableArgument {
        analysis: String,
        /// Positional index or keyword name.
        position: String,
        reason: String,
    },

    /// The invocation depends, directly or transitively, on itself.
    #[error("Dependency cycle: {}", chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    /// A fault raised by an analysis body and not captured.
    #[error(transparent)]
    Fault(#[from] Fault),
}

impl AnalysisError {
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownAnalysis { name: name.into() }
    }

    /// Whether a resilience scope may intercept this error at all.
    pub fn is_capturable(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AnalysisError {
    fn from(err: std::io::Error) -> Self {
        Self::Fault(err.into())
    }
}

impl From<anyhow::Error> for AnalysisError {
    fn from(err: anyhow::Error) -> Self {
        Self::Fault(err.into())
    }
}
