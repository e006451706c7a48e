//! Human review of file-operation proposals.
//!
//! Proposals leave `pending` exactly once, and only through
//! [`apply_proposal`] or [`reject_proposal`]. Writing to disk is delegated to
//! a [`FileOpApplier`]; nothing in this crate touches the filesystem.

use async_trait::async_trait;
use gf_core::action::Action;
use gf_core::file_ops::check_relative_path;
use gf_core::store::Store;
use gf_core::types::{FileOp, FileOpProposal, ProposalStatus};
use gf_telemetry::tracing_setup::operation_span;
use thiserror::Error;
use tracing::{info, warn, Instrument};

/// Applies a batch of file operations under a repository root.
#[async_trait]
pub trait FileOpApplier: Send + Sync {
    async fn apply(&self, repo_path: &str, ops: &[FileOp]) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProposalError {
    #[error("proposal {0} not found")]
    NotFound(String),
    #[error("proposal {id} is already {status:?}")]
    NotPending { id: String, status: ProposalStatus },
    #[error("proposal {0} has no repository path")]
    NoRepository(String),
    #[error("unsafe path '{path}': {reason}")]
    UnsafePath { path: String, reason: String },
    #[error("apply failed: {0}")]
    Apply(String),
}

fn pending_proposal(store: &Store, id: &str) -> Result<FileOpProposal, ProposalError> {
    let proposal = store
        .read(|s| s.proposal(id).cloned())
        .ok_or_else(|| ProposalError::NotFound(id.to_string()))?;
    if proposal.status != ProposalStatus::Pending {
        return Err(ProposalError::NotPending {
            id: id.to_string(),
            status: proposal.status,
        });
    }
    Ok(proposal)
}

fn record_error(store: &Store, id: &str, error: &ProposalError) {
    warn!(proposal_id = id, error = %error, "proposal not applied");
    store.dispatch(Action::UpdateFileOpProposal {
        id: id.to_string(),
        status: ProposalStatus::Error,
        error: Some(error.to_string()),
    });
}

/// Validate and apply a pending proposal.
///
/// Unknown or already-resolved proposals are refused without touching state.
/// Every other failure moves the proposal to `error` with the message.
pub async fn apply_proposal(
    store: &Store,
    applier: &dyn FileOpApplier,
    id: &str,
) -> Result<(), ProposalError> {
    let (span, _) = operation_span("apply_proposal");
    apply(store, applier, id).instrument(span).await
}

async fn apply(store: &Store, applier: &dyn FileOpApplier, id: &str) -> Result<(), ProposalError> {
    let proposal = pending_proposal(store, id)?;

    let result = match proposal.repo_path.as_deref().filter(|p| !p.trim().is_empty()) {
        None => Err(ProposalError::NoRepository(id.to_string())),
        Some(repo) => match proposal
            .ops
            .iter()
            .find_map(|op| check_relative_path(&op.path).err().map(|r| (op, r)))
        {
            Some((op, reason)) => Err(ProposalError::UnsafePath {
                path: op.path.clone(),
                reason,
            }),
            None => applier
                .apply(repo, &proposal.ops)
                .await
                .map_err(ProposalError::Apply),
        },
    };

    match result {
        Ok(()) => {
            info!(proposal_id = id, ops = proposal.ops.len(), "proposal applied");
            store.dispatch(Action::UpdateFileOpProposal {
                id: id.to_string(),
                status: ProposalStatus::Applied,
                error: None,
            });
            Ok(())
        }
        Err(e) => {
            record_error(store, id, &e);
            Err(e)
        }
    }
}

pub fn reject_proposal(store: &Store, id: &str) -> Result<(), ProposalError> {
    pending_proposal(store, id)?;
    info!(proposal_id = id, "proposal rejected");
    store.dispatch(Action::UpdateFileOpProposal {
        id: id.to_string(),
        status: ProposalStatus::Rejected,
        error: None,
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
