//! Dependency resolution.
//!
//! Each declared dependency is requested through the same `analyze` entry
//! point with the parent's `fail_fast`, strictly in declaration order. Any
//! error aborts resolution: dependencies are not wrapped in a resilience
//! scope, so a failing dependency fails its dependent. Cycles are caught by
//! the runner's claim check when the recursion comes back to a key that is
//! still in progress.

use crate::descriptor::AnalysisDescriptor;
use crate::errors::AnalysisError;
use crate::record::AnalysisRecord;
use crate::session::Session;
use std::sync::Arc;
use tracing::debug;

pub fn resolve_dependencies(
    session: &Session,
    descriptor: &AnalysisDescriptor,
    fail_fast: bool,
) -> Result<Vec<Arc<AnalysisRecord>>, AnalysisError> {
    let dependencies = descriptor.dependencies();
    if !dependencies.is_empty() {
        debug!(
            analysis = descriptor.name(),
            count = dependencies.len(),
            "Resolving dependencies"
        );
    }

    dependencies
        .iter()
        .map(|dep| session.analyze_with(&dep.name, dep.arguments.clone(), fail_fast))
        .collect()
}
