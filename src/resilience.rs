//! Resilience scopes.
//!
//! A scope guards one unit of work. Its outcome is kept as a plain
//! `Result` until the scope boundary, where [`decide`] picks between
//! capturing the fault into the ledger and propagating it. Execution resumes
//! after the guarded unit: the closure does not continue past its fault, but
//! the code around the scope (typically a loop over blocks or functions)
//! carries on.
//!
//! ```rust,ignore
//! for block in blocks {
//!     ctx.resilience().named(block.label()).run(|ctx| lift(ctx, block))?;
//! }
//! ```

use crate::errors::AnalysisError;
use crate::fault::FaultKinds;
use crate::ledger::{CapturedError, ErrorLedger};
use crate::session::AnalysisContext;
use tracing::warn;

/// What a scope does with an error leaving its unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Capture,
    Propagate,
}

/// The single capture-or-propagate decision.
///
/// Fail-fast runs never capture. Only faults are eligible, and only when
/// their kind is in `kinds`.
pub fn decide(error: &AnalysisError, fail_fast: bool, kinds: &FaultKinds) -> Disposition {
    if fail_fast {
        return Disposition::Propagate;
    }
    match error {
        AnalysisError::Fault(fault) if kinds.matches(fault.kind()) => Disposition::Capture,
        _ => Disposition::Propagate,
    }
}

/// Flags that stay fixed for a whole analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopePolicy {
    pub fail_fast: bool,
    pub keep_backtraces: bool,
}

/// Apply the scope boundary to an outcome.
///
/// `Ok(None)` means a fault was captured into `ledger`.
pub(crate) fn settle<T>(
    outcome: Result<T, AnalysisError>,
    policy: ScopePolicy,
    name: Option<&str>,
    kinds: &FaultKinds,
    ledger: &mut ErrorLedger,
) -> Result<Option<T>, AnalysisError> {
    let err = match outcome {
        Ok(value) => return Ok(Some(value)),
        Err(err) => err,
    };

    match (decide(&err, policy.fail_fast, kinds), err) {
        (Disposition::Capture, AnalysisError::Fault(fault)) => {
            warn!(
                scope = name.unwrap_or("<unnamed>"),
                kind = %fault.kind(),
                "Captured fault: {}",
                fault.message()
            );
            ledger.record(name, CapturedError::from_fault(&fault, policy.keep_backtraces));
            Ok(None)
        }
        (_, err) => Err(err),
    }
}

/// Builder returned by [`AnalysisContext::resilience`].
#[must_use = "a resilience scope does nothing until `run` is called"]
pub struct ResilienceScope<'c, 'a> {
    ctx: &'c mut AnalysisContext<'a>,
    name: Option<String>,
    kinds: FaultKinds,
}

impl<'c, 'a> ResilienceScope<'c, 'a> {
    pub(crate) fn new(ctx: &'c mut AnalysisContext<'a>) -> Self {
        Self {
            ctx,
            name: None,
            kinds: FaultKinds::Any,
        }
    }

    /// File a captured fault under `name` instead of the unnamed list.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Intercept only these kinds (default: [`FaultKinds::Any`]).
    pub fn kinds(mut self, kinds: FaultKinds) -> Self {
        self.kinds = kinds;
        self
    }

    /// Run the guarded unit.
    ///
    /// Returns `Ok(Some(value))` on success, `Ok(None)` if a fault was
    /// captured, and `Err` for anything that must propagate.
    pub fn run<T, F>(self, unit: F) -> Result<Option<T>, AnalysisError>
    where
        F: FnOnce(&mut AnalysisContext<'a>) -> Result<T, AnalysisError>,
    {
        let outcome = unit(&mut *self.ctx);
        let policy = self.ctx.policy();
        settle(
            outcome,
            policy,
            self.name.as_deref(),
            &self.kinds,
            self.ctx.ledger_mut(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{Fault, FaultKind};

    const RESILIENT: ScopePolicy = ScopePolicy {
        fail_fast: false,
        keep_backtraces: false,
    };
    const FAIL_FAST: ScopePolicy = ScopePolicy {
        fail_fast: true,
        keep_backtraces: false,
    };

    fn unit(i: usize) -> Result<usize, AnalysisError> {
        if i % 2 == 1 {
            Err(Fault::value(format!("odd {i}")).into())
        } else {
            Ok(i)
        }
    }

    #[test]
    fn test_decide_matrix() {
        let fault: AnalysisError = Fault::value("x").into();
        let cycle = AnalysisError::DependencyCycle { chain: vec![] };
        let any = FaultKinds::Any;
        let lookup_only = FaultKinds::only([FaultKind::LOOKUP]);

        assert_eq!(decide(&fault, false, &any), Disposition::Capture);
        assert_eq!(decide(&fault, true, &any), Disposition::Propagate);
        assert_eq!(decide(&fault, false, &lookup_only), Disposition::Propagate);
        assert_eq!(decide(&cycle, false, &any), Disposition::Propagate);
        assert_eq!(
            decide(&AnalysisError::unknown("A"), false, &any),
            Disposition::Propagate
        );
    }

    #[test]
    fn test_loop_continues_past_captured_units() {
        let mut ledger = ErrorLedger::new();
        let mut processed = Vec::new();

        for i in 0..5 {
            let outcome = settle(unit(i), RESILIENT, None, &FaultKinds::Any, &mut ledger).unwrap();
            if let Some(v) = outcome {
                processed.push(v);
            }
        }

        assert_eq!(processed, vec![0, 2, 4]);
        assert_eq!(ledger.errors().len(), 2);
        assert_eq!(ledger.errors()[0].message, "odd 1");
    }

    #[test]
    fn test_fail_fast_propagates_first_fault() {
        let mut ledger = ErrorLedger::new();
        let mut result = Ok(());
        for i in 0..5 {
            if let Err(e) = settle(unit(i), FAIL_FAST, None, &FaultKinds::Any, &mut ledger) {
                result = Err(e);
                break;
            }
        }
        let err = result.unwrap_err();
        assert_eq!(err.as_fault().unwrap().message(), "odd 1");
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_named_capture() {
        let mut ledger = ErrorLedger::new();
        let out = settle(unit(3), RESILIENT, Some("block_3"), &FaultKinds::Any, &mut ledger).unwrap();
        assert!(out.is_none());
        assert_eq!(ledger.named("block_3").unwrap().kind, FaultKind::VALUE);
        assert!(ledger.errors().is_empty());
    }

    #[test]
    fn test_unmatched_kind_propagates_even_when_resilient() {
        let mut ledger = ErrorLedger::new();
        let kinds = FaultKinds::only([FaultKind::LOOKUP]);
        let err = settle(unit(1), RESILIENT, None, &kinds, &mut ledger).unwrap_err();
        assert!(err.as_fault().is_some());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_interrupted_escapes_default_kinds() {
        let mut ledger = ErrorLedger::new();
        let outcome: Result<(), AnalysisError> = Err(Fault::interrupted("stop").into());
        let err = settle(outcome, RESILIENT, None, &FaultKinds::Any, &mut ledger).unwrap_err();
        assert_eq!(err.as_fault().unwrap().kind(), &FaultKind::INTERRUPTED);
    }
}
