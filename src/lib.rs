//! Execution core for named, memoized, dependency-aware program analyses.
//!
//! Analyses are registered by name in an [`AnalysisRegistry`] and invoked
//! through [`Session::analyze`]. Each distinct invocation (name plus
//! canonical arguments) is computed at most once per session; its record,
//! result plus captured faults, is cached and shared by identity.
//!
//! Failure handling is explicit: a fault raised inside a
//! [`ResilienceScope`] is either captured into the run's [`ErrorLedger`] or
//! propagated, depending on the caller's `fail_fast` flag and the scope's
//! [`FaultKinds`].

// Export modules for library usage
pub mod cache;
pub mod config;
pub mod descriptor;
pub mod errors;
pub mod fault;
pub mod key;
pub mod ledger;
pub mod observability;
pub mod persistence;
pub mod record;
pub mod registry;
pub mod resilience;
pub mod resolver;
pub mod session;
pub mod value;

// Re-export commonly used types
pub use crate::cache::{AnalysisCache, CacheStats};
pub use crate::config::{discover_config, load_config_from, EngineConfig};
pub use crate::descriptor::{
    Analysis, AnalysisDescriptor, AnalysisOutput, AnalysisResult, Dependency, Runnable,
};
pub use crate::errors::AnalysisError;
pub use crate::fault::{Fault, FaultKind, FaultKinds};
pub use crate::key::{make_key, Arguments, CacheKey};
pub use crate::ledger::{CapturedError, ErrorLedger};
pub use crate::persistence::{CacheSnapshot, PersistedRecord};
pub use crate::record::AnalysisRecord;
pub use crate::registry::{register, AnalysisRegistry};
pub use crate::resilience::{decide, Disposition, ResilienceScope};
pub use crate::session::{AnalysisContext, Session};
pub use crate::value::{ArgValue, KeyValue};
