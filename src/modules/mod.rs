//! Loaded component bookkeeping

pub mod registry;

pub use registry::{HookReport, LifecyclePhase, ModuleEntry, ModuleRegistry, RegisterOutcome};
