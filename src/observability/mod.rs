//! Observability for analysis execution.
//!
//! ## Features
//!
//! - **Resolution Context**: thread-local stack of in-progress invocations,
//!   used to report dependency cycles as a readable chain
//! - **Tracing Setup**: one-call `tracing-subscriber` initialization for hosts
//!   and tests
//!
//! ## Usage
//!
//! ```ignore
//! use anacore::observability::init_tracing;
//!
//! fn main() {
//!     init_tracing(false);
//!     // ... create sessions, run analyses
//! }
//! ```

pub mod context;

pub use context::{current_stack, cycle_chain, enter, ResolutionGuard};

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`, or
/// `debug` when `verbose`).
///
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing(verbose: bool) -> bool {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
