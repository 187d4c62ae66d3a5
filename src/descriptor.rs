//! Analysis descriptors and the two runnable forms.
//!
//! A descriptor is the static metadata the registry keeps for one analysis:
//! its name, how to run it, what it depends on, and its failure policy.
//!
//! Runnables come in two forms, dispatched on the tag rather than on shape:
//!
//! - **Constructor**: a type implementing [`Analysis`]. The runner builds the
//!   instance with [`Analysis::prepare`] and then drives [`Analysis::run`]
//!   inside the descriptor's resilience scope, so a captured fault still
//!   yields the partially-filled instance.
//! - **Function**: a plain callable receiving the [`AnalysisContext`]. It gets
//!   no automatic resilience; it may open scopes of its own.

use crate::errors::AnalysisError;
use crate::fault::FaultKinds;
use crate::key::Arguments;
use crate::session::AnalysisContext;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A constructor-style analysis.
///
/// The instance itself is the analysis result; it must be serializable so
/// the cache can be persisted and restored.
pub trait Analysis: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + Sized + 'static {
    /// Bind arguments and build the initial, empty instance.
    fn prepare(ctx: &AnalysisContext<'_>) -> Result<Self, AnalysisError>;

    /// Do the work. Faults escaping here are subject to the descriptor's
    /// default resilience.
    fn run(&mut self, _ctx: &mut AnalysisContext<'_>) -> Result<(), AnalysisError> {
        Ok(())
    }
}

/// Type-erased view of any analysis result.
pub trait AnalysisOutput: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn export_state(&self) -> Result<serde_json::Value, serde_json::Error>;
}

impl<T> AnalysisOutput for T
where
    T: Serialize + Any + Send + Sync + fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn export_state(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Shared handle to an analysis result. Cloning keeps the identity.
#[derive(Clone, Debug)]
pub struct AnalysisResult(Arc<dyn AnalysisOutput>);

impl AnalysisResult {
    pub fn new<T: AnalysisOutput>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).into_any().downcast::<T>().ok()
    }

    /// Whether both handles point at the same result object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn export_state(&self) -> Result<serde_json::Value, serde_json::Error> {
        self.0.export_state()
    }
}

/// Rebuilds a result from its exported state.
pub type RestoreFn = fn(serde_json::Value) -> Result<AnalysisResult, serde_json::Error>;

type PrepareFn = fn(&AnalysisContext<'_>) -> Result<Box<dyn PendingAnalysis>, AnalysisError>;

type InvokeFn =
    dyn Fn(&mut AnalysisContext<'_>) -> Result<AnalysisResult, AnalysisError> + Send + Sync;

/// An instance built by `prepare` and not yet run.
pub(crate) trait PendingAnalysis: Send {
    fn run_pending(&mut self, ctx: &mut AnalysisContext<'_>) -> Result<(), AnalysisError>;
    fn finish(self: Box<Self>) -> AnalysisResult;
}

impl<T: Analysis> PendingAnalysis for T {
    fn run_pending(&mut self, ctx: &mut AnalysisContext<'_>) -> Result<(), AnalysisError> {
        Analysis::run(self, ctx)
    }

    fn finish(self: Box<Self>) -> AnalysisResult {
        AnalysisResult::new(*self)
    }
}

fn prepare_boxed<T: Analysis>(
    ctx: &AnalysisContext<'_>,
) -> Result<Box<dyn PendingAnalysis>, AnalysisError> {
    Ok(Box::new(T::prepare(ctx)?))
}

fn restore_typed<T>(state: serde_json::Value) -> Result<AnalysisResult, serde_json::Error>
where
    T: DeserializeOwned + AnalysisOutput,
{
    serde_json::from_value::<T>(state).map(AnalysisResult::new)
}

#[derive(Clone)]
pub struct ConstructorForm {
    type_name: &'static str,
    pub(crate) prepare: PrepareFn,
    restore: RestoreFn,
}

#[derive(Clone)]
pub struct FunctionForm {
    pub(crate) invoke: Arc<InvokeFn>,
    restore: RestoreFn,
}

#[derive(Clone)]
pub enum Runnable {
    Constructor(ConstructorForm),
    Function(FunctionForm),
}

impl Runnable {
    pub fn constructor<T: Analysis>() -> Self {
        Self::Constructor(ConstructorForm {
            type_name: std::any::type_name::<T>(),
            prepare: prepare_boxed::<T>,
            restore: restore_typed::<T>,
        })
    }

    /// Wrap a callable whose output type is `T`.
    pub fn function<T, F>(func: F) -> Self
    where
        T: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
        F: Fn(&mut AnalysisContext<'_>) -> Result<T, AnalysisError> + Send + Sync + 'static,
    {
        let invoke: Arc<InvokeFn> =
            Arc::new(move |ctx: &mut AnalysisContext<'_>| func(ctx).map(AnalysisResult::new));
        Self::Function(FunctionForm {
            invoke,
            restore: restore_typed::<T>,
        })
    }

    pub fn restore(&self, state: serde_json::Value) -> Result<AnalysisResult, serde_json::Error> {
        match self {
            Self::Constructor(form) => (form.restore)(state),
            Self::Function(form) => (form.restore)(state),
        }
    }

    pub fn is_constructor(&self) -> bool {
        matches!(self, Self::Constructor(_))
    }
}

impl fmt::Debug for Runnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constructor(form) => write!(f, "Constructor({})", form.type_name),
            Self::Function(_) => write!(f, "Function(..)"),
        }
    }
}

/// One declared dependency: an analysis name plus the arguments to call it
/// with. A bare name means no arguments.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub name: String,
    pub arguments: Arguments,
}

impl Dependency {
    pub fn new(name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

impl From<&str> for Dependency {
    fn from(name: &str) -> Self {
        Self::new(name, Arguments::new())
    }
}

impl From<String> for Dependency {
    fn from(name: String) -> Self {
        Self::new(name, Arguments::new())
    }
}

impl From<(&str, Arguments)> for Dependency {
    fn from((name, arguments): (&str, Arguments)) -> Self {
        Self::new(name, arguments)
    }
}

/// Static metadata for one analysis. Immutable once registered.
#[derive(Debug, Clone)]
pub struct AnalysisDescriptor {
    name: String,
    runnable: Runnable,
    dependencies: Vec<Dependency>,
    resilient_by_default: bool,
    fault_kinds: FaultKinds,
}

impl AnalysisDescriptor {
    pub fn new(name: impl Into<String>, runnable: Runnable) -> Self {
        Self {
            name: name.into(),
            runnable,
            dependencies: Vec::new(),
            resilient_by_default: true,
            fault_kinds: FaultKinds::Any,
        }
    }

    pub fn depends_on(mut self, dependency: impl Into<Dependency>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<Dependency>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn resilient_by_default(mut self, resilient: bool) -> Self {
        self.resilient_by_default = resilient;
        self
    }

    /// Kinds intercepted by the scope wrapped around `run`.
    pub fn intercepting(mut self, kinds: FaultKinds) -> Self {
        self.fault_kinds = kinds;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runnable(&self) -> &Runnable {
        &self.runnable
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn is_resilient_by_default(&self) -> bool {
        self.resilient_by_default
    }

    pub fn fault_kinds(&self) -> &FaultKinds {
        &self.fault_kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Blocks {
        count: usize,
    }

    impl Analysis for Blocks {
        fn prepare(_ctx: &AnalysisContext<'_>) -> Result<Self, AnalysisError> {
            Ok(Self { count: 0 })
        }
    }

    #[test]
    fn test_result_identity_and_downcast() {
        let a = AnalysisResult::new(Blocks { count: 3 });
        let b = a.clone();
        let c = AnalysisResult::new(Blocks { count: 3 });

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a.downcast_ref::<Blocks>().unwrap().count, 3);
        assert!(a.downcast_ref::<String>().is_none());

        let typed = a.downcast::<Blocks>().unwrap();
        assert!(Arc::ptr_eq(&typed, &b.downcast::<Blocks>().unwrap()));
    }

    #[test]
    fn test_constructor_restore_round_trip() {
        let runnable = Runnable::constructor::<Blocks>();
        let state = AnalysisResult::new(Blocks { count: 7 }).export_state().unwrap();
        let restored = runnable.restore(state).unwrap();
        assert_eq!(restored.downcast_ref::<Blocks>(), Some(&Blocks { count: 7 }));
        assert!(runnable.is_constructor());
    }

    #[test]
    fn test_function_restore_uses_output_type() {
        let runnable = Runnable::function(|_ctx| Ok(vec![1u64, 2, 3]));
        let restored = runnable.restore(serde_json::json!([4, 5])).unwrap();
        assert_eq!(restored.downcast_ref::<Vec<u64>>(), Some(&vec![4, 5]));
        assert!(!runnable.is_constructor());
    }

    #[test]
    fn test_descriptor_defaults_and_builder() {
        let descriptor = AnalysisDescriptor::new("VSA", Runnable::constructor::<Blocks>())
            .depends_on("CFG")
            .depends_on(("Loops", Arguments::new().kwarg("depth", 2)))
            .resilient_by_default(false);

        assert_eq!(descriptor.name(), "VSA");
        assert_eq!(descriptor.dependencies().len(), 2);
        assert_eq!(descriptor.dependencies()[0].name, "CFG");
        assert!(descriptor.dependencies()[0].arguments.is_empty());
        assert!(!descriptor.is_resilient_by_default());
        assert_eq!(descriptor.fault_kinds(), &FaultKinds::Any);
    }

    #[test]
    fn test_default_run_keeps_prepared_instance() {
        let registry = Arc::new(crate::registry::AnalysisRegistry::new());
        registry.insert(AnalysisDescriptor::new("Blocks", Runnable::constructor::<Blocks>()));
        let session = crate::session::Session::with_registry((), registry);

        let record = session.analyze("Blocks", Arguments::new()).unwrap();
        assert_eq!(record.downcast_ref::<Blocks>(), Some(&Blocks { count: 0 }));
        assert!(!record.is_partial());
    }

    #[test]
    fn test_runnable_debug_names_type() {
        let text = format!("{:?}", Runnable::constructor::<Blocks>());
        assert!(text.starts_with("Constructor("));
        assert!(text.contains("Blocks"));
    }
}
