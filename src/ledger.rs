//! Error ledger: faults captured by resilience scopes during one analysis run.

use crate::fault::{Fault, FaultKind};
use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One captured fault. The backtrace lives only in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedError {
    pub kind: FaultKind,
    pub message: String,
    #[serde(skip)]
    pub backtrace: Option<Arc<Backtrace>>,
}

impl CapturedError {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            backtrace: None,
        }
    }

    pub(crate) fn from_fault(fault: &Fault, keep_backtrace: bool) -> Self {
        Self {
            kind: fault.kind().clone(),
            message: fault.message().to_string(),
            backtrace: keep_backtrace.then(|| Arc::clone(fault.backtrace())),
        }
    }
}

impl PartialEq for CapturedError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

impl Eq for CapturedError {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLedger {
    errors: Vec<CapturedError>,
    named_errors: BTreeMap<String, CapturedError>,
}

impl ErrorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        errors: Vec<CapturedError>,
        named_errors: BTreeMap<String, CapturedError>,
    ) -> Self {
        Self {
            errors,
            named_errors,
        }
    }

    /// File a capture under `name`, or append it to the unnamed list.
    /// A later capture under the same name replaces the earlier one.
    pub fn record(&mut self, name: Option<&str>, error: CapturedError) {
        match name {
            Some(name) => {
                self.named_errors.insert(name.to_string(), error);
            }
            None => self.errors.push(error),
        }
    }

    pub fn errors(&self) -> &[CapturedError] {
        &self.errors
    }

    pub fn named_errors(&self) -> &BTreeMap<String, CapturedError> {
        &self.named_errors
    }

    pub fn named(&self, name: &str) -> Option<&CapturedError> {
        self.named_errors.get(name)
    }

    pub fn len(&self) -> usize {
        self.errors.len() + self.named_errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.named_errors.is_empty()
    }

    /// Drop every retained backtrace.
    pub fn strip_backtraces(&mut self) {
        self.errors
            .iter_mut()
            .chain(self.named_errors.values_mut())
            .for_each(|e| e.backtrace = None);
    }
}
