pub mod orchestrator;
pub mod prompts;
pub mod proposals;
pub mod provider_sync;

pub use orchestrator::{
    ExecutionError, ExecutionOptions, ExecutionOrchestrator, ExecutionOutcome, PhaseReport,
};
pub use proposals::{apply_proposal, reject_proposal, FileOpApplier, ProposalError};
