//! Sessions and the `analyze` runner.
//!
//! A [`Session`] owns the handle to the project being analyzed, a record
//! cache, and a shared reference to an analysis registry. [`Session::analyze`]
//! is the single invocation surface:
//!
//! 1. look the descriptor up (`UnknownAnalysis` if absent)
//! 2. canonicalize the key (`UnhashableArgument` on bad key material)
//! 3. return the cached record on a hit
//! 4. on a miss, resolve dependencies, then construct or invoke the runnable
//! 5. insert the finished record and return it
//!
//! A fault that escapes step 4 propagates and leaves no record behind, so an
//! identical later call starts from scratch.
//!
//! # Example
//!
//! ```rust
//! use anacore::{AnalysisRegistry, Arguments, Runnable, Session};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(AnalysisRegistry::new());
//! registry.register(
//!     "Sum",
//!     Runnable::function(|ctx| {
//!         let total: i64 = ctx.args().iter().filter_map(|v| v.as_i64()).sum();
//!         Ok(total)
//!     }),
//!     vec![],
//!     true,
//! );
//!
//! let session = Session::with_registry((), registry);
//! let first = session.analyze("Sum", Arguments::new().arg(2).arg(3)).unwrap();
//! let again = session.analyze("Sum", Arguments::new().arg(2).arg(3)).unwrap();
//! assert_eq!(first.downcast_ref::<i64>(), Some(&5));
//! assert!(Arc::ptr_eq(&first, &again));
//! ```

use crate::cache::{AnalysisCache, CacheStats, Claim, ClaimConflict};
use crate::config::EngineConfig;
use crate::descriptor::{AnalysisDescriptor, AnalysisResult, PendingAnalysis, Runnable};
use crate::errors::AnalysisError;
use crate::fault::Fault;
use crate::key::{make_key, Arguments, CacheKey};
use crate::ledger::ErrorLedger;
use crate::observability;
use crate::record::AnalysisRecord;
use crate::registry::AnalysisRegistry;
use crate::resilience::{settle, ResilienceScope, ScopePolicy};
use crate::resolver::resolve_dependencies;
use crate::value::KeyValue;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub struct Session {
    id: u64,
    project: Arc<dyn Any + Send + Sync>,
    registry: Arc<AnalysisRegistry>,
    cache: AnalysisCache,
    config: EngineConfig,
}

impl Session {
    /// A session over `project` using the process-wide registry.
    pub fn new<P: Any + Send + Sync>(project: P) -> Self {
        Self::with_registry(project, AnalysisRegistry::global())
    }

    pub fn with_registry<P: Any + Send + Sync>(project: P, registry: Arc<AnalysisRegistry>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            project: Arc::new(project),
            registry,
            cache: AnalysisCache::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the (empty) cache, e.g. with one rebuilt from a snapshot.
    pub fn with_cache(mut self, cache: AnalysisCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn project<P: Any>(&self) -> Option<&P> {
        self.project.downcast_ref::<P>()
    }

    pub fn registry(&self) -> &Arc<AnalysisRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        info!(session = self.id, entries = self.cache.len(), "Clearing analysis cache");
        self.cache.clear();
    }

    /// The cached record for an invocation, without computing anything.
    pub fn cached(
        &self,
        name: &str,
        arguments: &Arguments,
    ) -> Result<Option<Arc<AnalysisRecord>>, AnalysisError> {
        let key = make_key(name, arguments)?;
        Ok(self.cache.get(&key))
    }

    /// Run (or fetch) an analysis with the configured default `fail_fast`.
    pub fn analyze(
        &self,
        name: &str,
        arguments: Arguments,
    ) -> Result<Arc<AnalysisRecord>, AnalysisError> {
        self.analyze_with(name, arguments, self.config.default_fail_fast)
    }

    pub fn analyze_fail_fast(
        &self,
        name: &str,
        arguments: Arguments,
    ) -> Result<Arc<AnalysisRecord>, AnalysisError> {
        self.analyze_with(name, arguments, true)
    }

    pub fn analyze_with(
        &self,
        name: &str,
        arguments: Arguments,
        fail_fast: bool,
    ) -> Result<Arc<AnalysisRecord>, AnalysisError> {
        let descriptor = self.registry.lookup(name)?;
        let key = make_key(name, &arguments)?;

        let span = info_span!("analyze", analysis = %key, fail_fast);
        let _enter = span.enter();

        let guard = match self.cache.claim(&key) {
            Ok(Claim::Hit(record)) => {
                debug!(fingerprint = %key.fingerprint(), "Cache hit");
                return Ok(record);
            }
            Ok(Claim::Owned(guard)) => guard,
            Err(conflict) => return Err(self.cycle_error(&key, conflict)),
        };

        let _frame = observability::enter(self.id, &key);
        debug!(fingerprint = %key.fingerprint(), "Cache miss, computing");

        let dependencies = resolve_dependencies(self, &descriptor, fail_fast)?;
        let (result, ledger) = self
            .construct(&descriptor, &key, dependencies, fail_fast)
            .inspect_err(|e| debug!("Analysis failed without caching: {}", e))?;

        if !ledger.is_empty() {
            info!(captured = ledger.len(), "Analysis completed with captured faults");
        }
        Ok(guard.fulfill(AnalysisRecord::new(key, result, ledger, fail_fast)))
    }

    /// Build the result, dispatching on the runnable form.
    fn construct(
        &self,
        descriptor: &AnalysisDescriptor,
        key: &CacheKey,
        dependencies: Vec<Arc<AnalysisRecord>>,
        fail_fast: bool,
    ) -> Result<(AnalysisResult, ErrorLedger), AnalysisError> {
        let policy = ScopePolicy {
            fail_fast,
            keep_backtraces: self.config.capture_backtraces,
        };
        let mut ctx = AnalysisContext::new(self, key, dependencies, policy);

        let result = match descriptor.runnable() {
            Runnable::Constructor(form) => {
                let mut pending = (form.prepare)(&ctx)?;
                let outcome = pending.run_pending(&mut ctx);
                if descriptor.is_resilient_by_default() {
                    settle(outcome, policy, None, descriptor.fault_kinds(), ctx.ledger_mut())?;
                } else {
                    outcome?;
                }
                pending.finish()
            }
            Runnable::Function(form) => (form.invoke)(&mut ctx)?,
        };

        Ok((result, ctx.into_ledger()))
    }

    fn cycle_error(&self, key: &CacheKey, conflict: ClaimConflict) -> AnalysisError {
        let chain = match conflict {
            ClaimConflict::Reentrant => observability::cycle_chain(self.id, key)
                .unwrap_or_else(|| vec![key.to_string(), key.to_string()]),
            ClaimConflict::WaitCycle(keys) => keys.iter().map(ToString::to_string).collect(),
        };
        warn!(chain = %chain.join(" -> "), "Dependency cycle detected");
        AnalysisError::DependencyCycle { chain }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("analyses", &self.registry.len())
            .field("cached", &self.cache.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Everything an analysis body can see while it runs.
pub struct AnalysisContext<'a> {
    session: &'a Session,
    key: &'a CacheKey,
    dependencies: Vec<Arc<AnalysisRecord>>,
    policy: ScopePolicy,
    ledger: ErrorLedger,
}

impl<'a> AnalysisContext<'a> {
    fn new(
        session: &'a Session,
        key: &'a CacheKey,
        dependencies: Vec<Arc<AnalysisRecord>>,
        policy: ScopePolicy,
    ) -> Self {
        Self {
            session,
            key,
            dependencies,
            policy,
            ledger: ErrorLedger::new(),
        }
    }

    pub fn session(&self) -> &'a Session {
        self.session
    }

    pub fn project<P: Any>(&self) -> Option<&'a P> {
        self.session.project::<P>()
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn key(&self) -> &CacheKey {
        self.key
    }

    pub fn args(&self) -> &[KeyValue] {
        &self.key.args
    }

    pub fn arg(&self, index: usize) -> Option<&KeyValue> {
        self.key.args.get(index)
    }

    pub fn kwargs(&self) -> &[(String, KeyValue)] {
        &self.key.kwargs
    }

    pub fn kwarg(&self, name: &str) -> Option<&KeyValue> {
        self.key.kwarg(name)
    }

    /// Resolved dependency records, in declaration order.
    pub fn dependencies(&self) -> &[Arc<AnalysisRecord>] {
        &self.dependencies
    }

    /// Typed result of the dependency at `index`.
    pub fn dependency<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, AnalysisError> {
        let record = self.dependencies.get(index).ok_or_else(|| {
            Fault::lookup(format!("{} has no dependency #{}", self.key.name, index))
        })?;
        record.downcast::<T>().ok_or_else(|| {
            Fault::lookup(format!(
                "dependency #{} of {} ({}) is not a {}",
                index,
                self.key.name,
                record.name(),
                std::any::type_name::<T>()
            ))
            .into()
        })
    }

    pub fn fail_fast(&self) -> bool {
        self.policy.fail_fast
    }

    pub(crate) fn policy(&self) -> ScopePolicy {
        self.policy
    }

    /// Faults captured so far in this run.
    pub fn ledger(&self) -> &ErrorLedger {
        &self.ledger
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut ErrorLedger {
        &mut self.ledger
    }

    fn into_ledger(self) -> ErrorLedger {
        self.ledger
    }

    /// Open a resilience scope around the next unit of work.
    pub fn resilience(&mut self) -> ResilienceScope<'_, 'a> {
        ResilienceScope::new(self)
    }

    /// Request another analysis from inside this one, inheriting `fail_fast`.
    pub fn analyze(
        &self,
        name: &str,
        arguments: Arguments,
    ) -> Result<Arc<AnalysisRecord>, AnalysisError> {
        self.session.analyze_with(name, arguments, self.policy.fail_fast)
    }
}
