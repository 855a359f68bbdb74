#[cfg(test)]
mod tests;

mod finalize;
mod runner;
mod types;

pub use finalize::Finalizer;
pub use runner::{OrchestratorComponents, TurnConfig, TurnOrchestrator};
pub use types::{GenerationHandle, OrchestratorState, RejectReason, SubmitOutcome, UserInput};
