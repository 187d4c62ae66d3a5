//! Cached analysis records.

use crate::descriptor::AnalysisResult;
use crate::key::CacheKey;
use crate::ledger::{CapturedError, ErrorLedger};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The cached outcome of one invocation: its result plus the faults
/// captured while producing it.
#[derive(Debug)]
pub struct AnalysisRecord {
    key: CacheKey,
    result: AnalysisResult,
    ledger: ErrorLedger,
    fail_fast: bool,
}

impl AnalysisRecord {
    pub(crate) fn new(
        key: CacheKey,
        result: AnalysisResult,
        ledger: ErrorLedger,
        fail_fast: bool,
    ) -> Self {
        Self {
            key,
            result,
            ledger,
            fail_fast,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn result(&self) -> &AnalysisResult {
        &self.result
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.result.downcast::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.result.downcast_ref::<T>()
    }

    pub fn ledger(&self) -> &ErrorLedger {
        &self.ledger
    }

    pub fn errors(&self) -> &[CapturedError] {
        self.ledger.errors()
    }

    pub fn named_errors(&self) -> &BTreeMap<String, CapturedError> {
        self.ledger.named_errors()
    }

    /// True when at least one fault was captured.
    pub fn is_partial(&self) -> bool {
        !self.ledger.is_empty()
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }
}
