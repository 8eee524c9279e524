//! Feature flag evaluation and the flag-driven write gate.

mod evaluator;
mod file;
mod gate;

pub use evaluator::{FlagClient, FlagContext, FlagError, FlagEvaluator, FlagOutcome};
pub use file::{FileFlagEvaluator, FlagDefinition, FlagSet, FlagTarget};
pub use gate::WriteGate;
