//! Faults raised inside analysis bodies.
//!
//! A [`Fault`] is the value an analysis returns when a unit of work goes
//! wrong. Resilience scopes decide, by [`FaultKind`], whether a fault is
//! captured into the ledger or propagated to the caller.
//!
//! # Fault kinds
//!
//! Kinds are open-ended strings with a few well-known constants:
//! - `runtime`: generic failure (also used for `anyhow` errors)
//! - `value`: bad data encountered while analyzing
//! - `lookup`: a missing entry (address, symbol, dependency slot)
//! - `unsupported`: a construct the analysis does not handle
//! - `io`: filesystem or other I/O failure
//! - `interrupted`: a deliberate abort; never matched by [`FaultKinds::Any`]

use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaultKind(Cow<'static, str>);

impl FaultKind {
    pub const RUNTIME: FaultKind = FaultKind(Cow::Borrowed("runtime"));
    pub const VALUE: FaultKind = FaultKind(Cow::Borrowed("value"));
    pub const LOOKUP: FaultKind = FaultKind(Cow::Borrowed("lookup"));
    pub const UNSUPPORTED: FaultKind = FaultKind(Cow::Borrowed("unsupported"));
    pub const IO: FaultKind = FaultKind(Cow::Borrowed("io"));
    /// Deliberate abort. Only an explicit kind set can intercept it.
    pub const INTERRUPTED: FaultKind = FaultKind(Cow::Borrowed("interrupted"));

    /// A kind defined by an analysis, e.g. `"decode"`.
    pub fn custom(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The set of fault kinds a resilience scope intercepts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FaultKinds {
    /// Every kind except [`FaultKind::INTERRUPTED`].
    #[default]
    Any,
    Only(BTreeSet<FaultKind>),
}

impl FaultKinds {
    pub fn only(kinds: impl IntoIterator<Item = FaultKind>) -> Self {
        Self::Only(kinds.into_iter().collect())
    }

    pub fn matches(&self, kind: &FaultKind) -> bool {
        match self {
            Self::Any => *kind != FaultKind::INTERRUPTED,
            Self::Only(kinds) => kinds.contains(kind),
        }
    }
}

/// A failure raised by an analysis body.
///
/// The backtrace is captured at construction (subject to `RUST_BACKTRACE`)
/// and is never persisted.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Fault {
    kind: FaultKind,
    message: String,
    trace: Arc<Backtrace>,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            trace: Arc::new(Backtrace::capture()),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(FaultKind::RUNTIME, message)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(FaultKind::VALUE, message)
    }

    pub fn lookup(message: impl Into<String>) -> Self {
        Self::new(FaultKind::LOOKUP, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(FaultKind::UNSUPPORTED, message)
    }

    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::new(FaultKind::INTERRUPTED, message)
    }

    pub fn kind(&self) -> &FaultKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn backtrace(&self) -> &Arc<Backtrace> {
        &self.trace
    }
}

impl From<std::io::Error> for Fault {
    fn from(err: std::io::Error) -> Self {
        Self::new(FaultKind::IO, err.to_string())
    }
}

impl From<anyhow::Error> for Fault {
    fn from(err: anyhow::Error) -> Self {
        Self::runtime(format!("{:#}", err))
    }
}
