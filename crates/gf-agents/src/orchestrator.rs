//! ExecutionOrchestrator: drives one phase execution end to end.
//!
//! An execution moves `idle → starting → streaming → (completed | failed)`
//! and back to idle. At most one execution runs at a time across the whole
//! process. The single slot holds a generation number; every dispatch made
//! on behalf of a running execution first checks, under the slot lock, that
//! its generation is still the active one, so chunks that arrive after a
//! cancel are dropped.
//!
//! All state changes go through [`Store::dispatch`]. The orchestrator never
//! writes files; structured file operations in the model output become
//! pending [`FileOpProposal`]s.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use gf_core::action::{Action, AgentPatch, PhasePatch, TaskPatch};
use gf_core::config::{ConfigError, ExecutionConfig};
use gf_core::file_ops::extract_file_ops;
use gf_core::phase_map::PhaseAgentMap;
use gf_core::settings::DEFAULT_MODEL;
use gf_core::state::AppState;
use gf_core::store::Store;
use gf_core::types::{
    new_id, Agent, AgentRole, ArtifactKind, FileOpProposal, LogEntry, LogLevel, Phase,
    PhaseArtifact, PhaseStatus, PhaseType, Project, Task, TaskStatus, TerminalEntry,
    TerminalEntryType,
};
use gf_intelligence::{ModelProvider, RunPayload};
use gf_telemetry::tracing_setup::phase_execution_span;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::prompts::build_payload;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons an execution refuses to start. None of these mutate state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("an execution is already running")]
    Busy,
    #[error("no active project connected")]
    NoActiveProject,
    #[error("project '{0}' has no connected repository path")]
    NoRepository(String),
    #[error("task {0} not found")]
    TaskNotFound(String),
    #[error("phase '{phase}' is not configured on task {task_id}")]
    PhaseNotConfigured { task_id: String, phase: PhaseType },
    #[error("phase '{phase}' cannot start from status {status:?}")]
    PhaseNotStartable { phase: PhaseType, status: PhaseStatus },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no agent registered for role '{0}'")]
    AgentNotRegistered(AgentRole),
    #[error("agent {0} is inactive")]
    AgentInactive(String),
}

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOptions {
    /// Chain into the next phase after a successful completion.
    pub auto_advance: bool,
    /// Fail a phase whose stream outlives its configured timeout.
    pub enforce_phase_timeouts: bool,
    pub default_model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            auto_advance: false,
            enforce_phase_timeouts: false,
            default_model: DEFAULT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}

impl From<&ExecutionConfig> for ExecutionOptions {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            auto_advance: config.auto_advance,
            enforce_phase_timeouts: config.enforce_phase_timeouts,
            default_model: config.default_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed { proposal_id: Option<String> },
    Failed { error: String },
    Cancelled,
}

/// What happened to one phase execution.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub task_id: String,
    pub phase: PhaseType,
    pub agent_id: String,
    pub outcome: ExecutionOutcome,
    /// Everything the model streamed before the execution ended.
    pub output: String,
}

impl PhaseReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Completed { .. })
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// The one running execution, plus what is needed to undo its start.
struct ExecutionSlot {
    generation: u64,
    task_id: String,
    phase: PhaseType,
    agent_id: String,
    prior_phase: Phase,
    prior_status: TaskStatus,
    prior_current: PhaseType,
    cancel: CancellationToken,
}

/// Everything resolved before an execution may start.
struct Prepared {
    task: Task,
    phase: PhaseType,
    agent: Agent,
    project: Project,
    timeout_ms: Option<u64>,
    payload: RunPayload,
}

struct Started {
    generation: u64,
    task_id: String,
    phase: PhaseType,
    agent: Agent,
    project: Project,
    is_last_phase: bool,
    timeout_ms: Option<u64>,
    cancel: CancellationToken,
}

enum StreamEnd {
    Done(String),
    Failed { message: String, output: String },
    Cancelled(String),
}

// ---------------------------------------------------------------------------
// ExecutionOrchestrator
// ---------------------------------------------------------------------------

pub struct ExecutionOrchestrator {
    store: Arc<Store>,
    provider: Arc<dyn ModelProvider>,
    options: ExecutionOptions,
    slot: Mutex<Option<ExecutionSlot>>,
    generation: AtomicU64,
}

impl ExecutionOrchestrator {
    pub fn new(store: Arc<Store>, provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            store,
            provider,
            options: ExecutionOptions::default(),
            slot: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// `true` while an execution holds the slot.
    pub fn is_running(&self) -> bool {
        self.lock_slot().is_some()
    }

    /// Generation of the running execution, if any.
    pub fn active_generation(&self) -> Option<u64> {
        self.lock_slot().as_ref().map(|s| s.generation)
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Run phases starting at `phase` (or the task's current phase), chaining
    /// into later phases when auto-advance is configured.
    pub async fn run(
        &self,
        task_id: &str,
        phase: Option<PhaseType>,
    ) -> Result<Vec<PhaseReport>, ExecutionError> {
        self.run_with(task_id, phase, self.options.auto_advance).await
    }

    /// Like [`Self::run`] with an explicit auto-advance policy.
    ///
    /// Chaining is a loop: each execution fully releases the slot before the
    /// next one starts. It stops at the first phase that does not complete,
    /// at the last configured phase, or before a phase that needs human
    /// approval. A phase that refuses to start after the first is logged and
    /// ends the chain.
    pub async fn run_with(
        &self,
        task_id: &str,
        phase: Option<PhaseType>,
        auto_advance: bool,
    ) -> Result<Vec<PhaseReport>, ExecutionError> {
        let mut reports = Vec::new();
        let mut next = phase;
        loop {
            let report = match self.execute(task_id, next).await {
                Ok(report) => report,
                Err(e) if !reports.is_empty() => {
                    warn!(task_id, error = %e, "auto-advance stopped");
                    break;
                }
                Err(e) => return Err(e),
            };
            let completed = report.is_completed();
            let finished = report.phase;
            reports.push(report);
            if !completed || !auto_advance {
                break;
            }

            let Some((following, gated)) = self.store.read(|state| {
                let task = state.task(task_id)?;
                let following = task.next_phase(finished)?;
                let gated = state.settings.project.requires_approval(following)
                    || (task.human_approval_required
                        && task.human_approval_phase == Some(following));
                Some((following, gated))
            }) else {
                break;
            };

            self.store.dispatch(Action::SetTaskPhase {
                task_id: task_id.to_string(),
                phase: following,
                at: Utc::now(),
            });
            if gated {
                info!(task_id, phase = %following, "auto-advance paused for approval");
                self.store.dispatch(Action::AddLogEntry(
                    LogEntry::new(
                        LogLevel::Info,
                        "orchestrator",
                        format!("Awaiting approval before {} phase", following.display_name()),
                    )
                    .in_phase(following),
                ));
                break;
            }
            debug!(task_id, phase = %following, "auto-advancing");
            next = Some(following);
        }
        Ok(reports)
    }

    /// Execute exactly one phase.
    ///
    /// Configuration problems are returned as errors before anything is
    /// dispatched. Once started, transport failures and cancellation are
    /// reported through [`ExecutionOutcome`], never as `Err`.
    pub async fn execute(
        &self,
        task_id: &str,
        phase: Option<PhaseType>,
    ) -> Result<PhaseReport, ExecutionError> {
        let (started, payload) = self.begin(task_id, phase)?;
        let (span, trace_id) =
            phase_execution_span(&started.task_id, started.phase.as_str(), &started.agent.id);
        debug!(trace_id = %trace_id, "phase execution span opened");
        Ok(self.drive(started, payload).instrument(span).await)
    }

    /// Cancel the running execution. Returns `false` when nothing was running.
    ///
    /// The phase and task go back to exactly how they were before the
    /// execution started, the agent returns to idle, a cancellation note is
    /// logged and the streaming log is finalized. The phase is never marked
    /// failed.
    pub fn cancel(&self) -> bool {
        let mut guard = self.lock_slot();
        let Some(slot) = guard.take() else {
            return false;
        };
        slot.cancel.cancel();
        self.provider.cancel();
        self.settle_cancelled(slot);
        true
    }

    /// Move the task's current phase to the next configured phase.
    pub fn advance_phase(&self, task_id: &str) -> Result<Option<PhaseType>, ExecutionError> {
        let slot = self.lock_slot();
        if slot.as_ref().is_some_and(|s| s.task_id == task_id) {
            return Err(ExecutionError::Busy);
        }
        let next = self
            .store
            .read(|state| state.task(task_id).map(|t| t.next_phase(t.current_phase)))
            .ok_or_else(|| ExecutionError::TaskNotFound(task_id.to_string()))?;
        if let Some(phase) = next {
            info!(task_id, phase = %phase, "advancing phase");
            self.store.dispatch(Action::SetTaskPhase {
                task_id: task_id.to_string(),
                phase,
                at: Utc::now(),
            });
        }
        Ok(next)
    }

    // -----------------------------------------------------------------------
    // Starting
    // -----------------------------------------------------------------------

    fn begin(
        &self,
        task_id: &str,
        phase: Option<PhaseType>,
    ) -> Result<(Started, RunPayload), ExecutionError> {
        let mut slot = self.lock_slot();
        if slot.is_some() {
            return Err(ExecutionError::Busy);
        }

        let prepared = self.store.read(|state| {
            prepare(state, self.store.phase_map(), &self.options, task_id, phase)
        })?;
        let Prepared {
            task,
            phase,
            agent,
            project,
            timeout_ms,
            payload,
        } = prepared;

        let Some(prior_phase) = task.phase(phase).cloned() else {
            return Err(ExecutionError::PhaseNotConfigured {
                task_id: task.id.clone(),
                phase,
            });
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        *slot = Some(ExecutionSlot {
            generation,
            task_id: task.id.clone(),
            phase,
            agent_id: agent.id.clone(),
            prior_phase,
            prior_status: task.status,
            prior_current: task.current_phase,
            cancel: cancel.clone(),
        });

        info!(
            task_id = %task.id,
            phase = %phase,
            agent = %agent.id,
            model = %payload.model,
            generation,
            "starting phase execution"
        );

        let now = Utc::now();
        for action in [
            Action::SetTaskPhase {
                task_id: task.id.clone(),
                phase,
                at: now,
            },
            Action::UpdatePhase {
                task_id: task.id.clone(),
                phase,
                patch: PhasePatch::start(now),
                at: now,
            },
            Action::UpdateTask {
                id: task.id.clone(),
                patch: TaskPatch::status(TaskStatus::InProgress),
                at: now,
            },
            Action::ClearLogs(Some(agent.id.clone())),
            Action::UpdateAgent {
                id: agent.id.clone(),
                patch: AgentPatch::working(task.id.clone()),
            },
            Action::AddTerminalEntry(TerminalEntry::new(
                agent.role,
                phase,
                TerminalEntryType::Boundary,
                format!("Phase: {}", phase.display_name()),
            )),
        ] {
            self.store.dispatch(action);
        }
        drop(slot);

        let is_last_phase = task.is_last_phase(phase);
        Ok((
            Started {
                generation,
                task_id: task.id,
                phase,
                agent,
                project,
                is_last_phase,
                timeout_ms,
                cancel,
            },
            payload,
        ))
    }

    // -----------------------------------------------------------------------
    // Streaming
    // -----------------------------------------------------------------------

    async fn drive(&self, started: Started, payload: RunPayload) -> PhaseReport {
        let release = SlotRelease {
            orchestrator: self,
            generation: started.generation,
        };

        let outcome = match self.stream(&started, payload).await {
            StreamEnd::Done(output) => match self.complete(&started, &output) {
                Some(proposal_id) => (ExecutionOutcome::Completed { proposal_id }, output),
                None => (ExecutionOutcome::Cancelled, output),
            },
            StreamEnd::Failed { message, output } => {
                if self.fail(&started, &message) {
                    (ExecutionOutcome::Failed { error: message }, output)
                } else {
                    (ExecutionOutcome::Cancelled, output)
                }
            }
            StreamEnd::Cancelled(output) => (ExecutionOutcome::Cancelled, output),
        };
        drop(release);

        PhaseReport {
            task_id: started.task_id,
            phase: started.phase,
            agent_id: started.agent.id,
            outcome: outcome.0,
            output: outcome.1,
        }
    }

    async fn stream(&self, started: &Started, payload: RunPayload) -> StreamEnd {
        let deadline = started
            .timeout_ms
            .filter(|_| self.options.enforce_phase_timeouts)
            .map(|ms| (ms, tokio::time::Instant::now() + Duration::from_millis(ms)));
        let timer = wait_until(deadline.map(|(_, at)| at));
        tokio::pin!(timer);

        let mut tokens = self.provider.run(payload);
        let mut output = String::new();
        let mut received = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = started.cancel.cancelled() => return StreamEnd::Cancelled(output),
                _ = &mut timer => {
                    self.provider.cancel();
                    let ms = deadline.map(|(ms, _)| ms).unwrap_or_default();
                    let message = format!("phase timed out after {}s", ms as f64 / 1000.0);
                    warn!(phase = %started.phase, timeout_ms = ms, "phase timed out");
                    return StreamEnd::Failed { message, output };
                }
                next = tokens.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if !chunk.content.is_empty() {
                        output.push_str(&chunk.content);
                        received += 1;
                        let now = Utc::now();
                        let delivered = self.dispatch_current(
                            started.generation,
                            [
                                Action::AddTerminalEntry(TerminalEntry::new(
                                    started.agent.role,
                                    started.phase,
                                    TerminalEntryType::Output,
                                    chunk.content.clone(),
                                )),
                                Action::AppendStreamingToken {
                                    agent_id: started.agent.id.clone(),
                                    phase: Some(started.phase),
                                    token: chunk.content,
                                    entry_id: new_id("log"),
                                    at: now,
                                },
                            ],
                        );
                        if !delivered {
                            debug!(generation = started.generation, "dropping stale chunk");
                            return StreamEnd::Cancelled(output);
                        }
                    }
                    if chunk.done {
                        debug!(chunks = received, bytes = output.len(), "stream finished");
                        return StreamEnd::Done(output);
                    }
                }
                Some(Err(e)) => {
                    warn!(phase = %started.phase, error = %e, "stream failed");
                    return StreamEnd::Failed {
                        message: e.to_string(),
                        output,
                    };
                }
                None => {
                    if started.cancel.is_cancelled() {
                        return StreamEnd::Cancelled(output);
                    }
                    return StreamEnd::Failed {
                        message: gf_intelligence::StreamError::UnexpectedEof.to_string(),
                        output,
                    };
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Endings
    // -----------------------------------------------------------------------

    /// Returns `None` when the execution was cancelled before it could
    /// complete, otherwise the id of the proposal it created (if any).
    fn complete(&self, started: &Started, output: &str) -> Option<Option<String>> {
        self.release_with(started.generation, |_| self.settle_completed(started, output))
    }

    fn settle_completed(&self, started: &Started, output: &str) -> Option<String> {
        let now = Utc::now();
        let agent = &started.agent;

        let proposal_id = extract_file_ops(output).map(|ops| {
            let mut proposal = FileOpProposal::pending(ops);
            proposal.task_id = Some(started.task_id.clone());
            proposal.agent_role = Some(agent.role);
            proposal.project_id = Some(started.project.id.clone());
            proposal.repo_path = started.project.repo_path().map(str::to_string);
            proposal.has_git = started.project.has_git;
            info!(proposal_id = %proposal.id, ops = proposal.ops.len(), "file operations proposed");
            let id = proposal.id.clone();
            self.store.dispatch(Action::AddFileOpProposal(proposal));
            id
        });

        let artifact = PhaseArtifact {
            kind: if started.phase == PhaseType::Code {
                ArtifactKind::Code
            } else {
                ArtifactKind::Markdown
            },
            content: output.to_string(),
            metadata: None,
        };
        self.store.dispatch(Action::UpdatePhase {
            task_id: started.task_id.clone(),
            phase: started.phase,
            patch: PhasePatch::complete(now).with_artifact(artifact),
            at: now,
        });
        self.store.dispatch(Action::UpdateAgent {
            id: agent.id.clone(),
            patch: AgentPatch::idle(),
        });
        self.store
            .dispatch(Action::EndStreamingLog(Some(agent.id.clone())));
        self.store.dispatch(Action::AddLogEntry(
            LogEntry::for_agent(LogLevel::Info, &agent.id, "Stream complete").in_phase(started.phase),
        ));
        if started.is_last_phase {
            self.store.dispatch(Action::UpdateTask {
                id: started.task_id.clone(),
                patch: TaskPatch::status(TaskStatus::Completed),
                at: now,
            });
        }

        info!(task_id = %started.task_id, phase = %started.phase, "phase completed");
        proposal_id
    }

    /// Record a failure. Returns `false` when the execution had already been
    /// cancelled.
    fn fail(&self, started: &Started, message: &str) -> bool {
        self.release_with(started.generation, |_| self.settle_failed(started, message))
            .is_some()
    }

    fn settle_failed(&self, started: &Started, message: &str) {
        let now = Utc::now();
        let agent = &started.agent;
        for action in [
            Action::AddTerminalEntry(TerminalEntry::new(
                agent.role,
                started.phase,
                TerminalEntryType::Error,
                message,
            )),
            Action::AddLogEntry(
                LogEntry::for_agent(LogLevel::Error, &agent.id, message).in_phase(started.phase),
            ),
            Action::EndStreamingLog(Some(agent.id.clone())),
            Action::UpdatePhase {
                task_id: started.task_id.clone(),
                phase: started.phase,
                patch: PhasePatch::fail(message),
                at: now,
            },
            Action::UpdateAgent {
                id: agent.id.clone(),
                patch: AgentPatch::error(),
            },
            Action::UpdateTask {
                id: started.task_id.clone(),
                patch: TaskPatch::status(TaskStatus::Failed),
                at: now,
            },
        ] {
            self.store.dispatch(action);
        }
        warn!(task_id = %started.task_id, phase = %started.phase, error = message, "phase failed");
    }

    fn settle_cancelled(&self, slot: ExecutionSlot) {
        info!(
            task_id = %slot.task_id,
            phase = %slot.phase,
            generation = slot.generation,
            "execution cancelled"
        );
        let now = Utc::now();
        for action in [
            Action::RestorePhase {
                task_id: slot.task_id.clone(),
                phase: slot.prior_phase,
                task_status: slot.prior_status,
                current_phase: slot.prior_current,
                at: now,
            },
            Action::UpdateAgent {
                id: slot.agent_id.clone(),
                patch: AgentPatch::idle(),
            },
            Action::AddLogEntry(
                LogEntry::for_agent(LogLevel::Info, &slot.agent_id, "Execution cancelled")
                    .in_phase(slot.phase),
            ),
            Action::EndStreamingLog(Some(slot.agent_id.clone())),
        ] {
            self.store.dispatch(action);
        }
    }

    // -----------------------------------------------------------------------
    // Slot helpers
    // -----------------------------------------------------------------------

    fn lock_slot(&self) -> MutexGuard<'_, Option<ExecutionSlot>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Dispatch `actions` only if `generation` still owns the slot.
    fn dispatch_current<I>(&self, generation: u64, actions: I) -> bool
    where
        I: IntoIterator<Item = Action>,
    {
        let slot = self.lock_slot();
        if slot.as_ref().map(|s| s.generation) != Some(generation) {
            return false;
        }
        for action in actions {
            self.store.dispatch(action);
        }
        true
    }

    /// Release the slot if `generation` still owns it, running `settle`
    /// before the lock is dropped. No other execution can start until the
    /// settling dispatches are in the store.
    fn release_with<R>(&self, generation: u64, settle: impl FnOnce(ExecutionSlot) -> R) -> Option<R> {
        let mut guard = self.lock_slot();
        let slot = guard.take_if(|s| s.generation == generation)?;
        Some(settle(slot))
    }
}

/// Releases the slot if the execution future is dropped mid-flight. An
/// abandoned execution is settled exactly like a cancelled one.
struct SlotRelease<'a> {
    orchestrator: &'a ExecutionOrchestrator,
    generation: u64,
}

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        let orchestrator = self.orchestrator;
        orchestrator.release_with(self.generation, |slot| {
            slot.cancel.cancel();
            orchestrator.provider.cancel();
            orchestrator.settle_cancelled(slot);
        });
    }
}

async fn wait_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn prepare(
    state: &AppState,
    map: &PhaseAgentMap,
    options: &ExecutionOptions,
    task_id: &str,
    phase: Option<PhaseType>,
) -> Result<Prepared, ExecutionError> {
    let project = state
        .active_project()
        .ok_or(ExecutionError::NoActiveProject)?;
    if project.repo_path().is_none() {
        return Err(ExecutionError::NoRepository(project.name.clone()));
    }
    let task = state
        .task(task_id)
        .ok_or_else(|| ExecutionError::TaskNotFound(task_id.to_string()))?;
    let phase = phase.unwrap_or(task.current_phase);
    let current = task
        .phase(phase)
        .ok_or_else(|| ExecutionError::PhaseNotConfigured {
            task_id: task.id.clone(),
            phase,
        })?;
    if !current.status.can_transition_to(&PhaseStatus::Active)
        || task.active_phase().is_some()
    {
        return Err(ExecutionError::PhaseNotStartable {
            phase,
            status: current.status,
        });
    }

    let role = map.resolve(phase)?;
    let agent = state
        .agent_by_role(role)
        .ok_or(ExecutionError::AgentNotRegistered(role))?;
    if !agent.is_active {
        return Err(ExecutionError::AgentInactive(agent.id.clone()));
    }

    let payload = build_payload(&state.settings, options, agent, task, phase, project);
    Ok(Prepared {
        task: task.clone(),
        phase,
        agent: agent.clone(),
        project: project.clone(),
        timeout_ms: state.settings.project.timeout_ms(phase),
        payload,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gf_core::settings::ProviderId;
    use gf_intelligence::MockProvider;

    fn setup(repo: Option<&str>) -> (Arc<Store>, String) {
        let store = Arc::new(Store::default());
        store.dispatch(Action::AddProject(Project::new("demo", repo.map(String::from))));
        let project_id = store.read(|s| s.ui.active_project_id.clone()).unwrap();
        let task = Task::new("Add login", project_id);
        let task_id = task.id.clone();
        store.dispatch(Action::AddTask(task));
        (store, task_id)
    }

    fn orchestrator(store: &Arc<Store>, mock: MockProvider) -> ExecutionOrchestrator {
        ExecutionOrchestrator::new(Arc::clone(store), Arc::new(mock))
    }

    #[test]
    fn options_from_config() {
        let config = ExecutionConfig {
            auto_advance: true,
            max_tokens: Some(512),
            ..ExecutionConfig::default()
        };
        let options = ExecutionOptions::from(&config);
        assert!(options.auto_advance);
        assert_eq!(options.max_tokens, Some(512));
        assert_eq!(options.default_model, DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn no_repository_refuses_before_dispatch() {
        let (store, task_id) = setup(None);
        let orch = orchestrator(&store, MockProvider::new(ProviderId::Ollama));
        let before = store.revision();
        let err = orch.execute(&task_id, None).await.unwrap_err();
        assert_eq!(err, ExecutionError::NoRepository("demo".into()));
        assert_eq!(store.revision(), before);
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn unmapped_phase_is_a_config_error() {
        let mut map = PhaseAgentMap::default();
        map.remove(PhaseType::Plan);
        let store = Arc::new(Store::new(AppState::default(), map));
        store.dispatch(Action::AddProject(Project::new("demo", Some("/repo".into()))));
        let pid = store.read(|s| s.ui.active_project_id.clone()).unwrap();
        let task = Task::new("t", pid);
        let task_id = task.id.clone();
        store.dispatch(Action::AddTask(task));

        let orch = orchestrator(&store, MockProvider::new(ProviderId::Ollama));
        let err = orch.execute(&task_id, Some(PhaseType::Plan)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Config(ConfigError::UnmappedPhase(_))));
    }

    #[tokio::test]
    async fn completion_marks_last_phase_task_completed() {
        let (store, task_id) = setup(Some("/repo"));
        let orch = orchestrator(&store, MockProvider::new(ProviderId::Ollama).with_chunks(["ok"]));
        let report = orch.execute(&task_id, Some(PhaseType::Review)).await.unwrap();
        assert!(report.is_completed());
        let task = store.read(|s| s.task(&task_id).cloned()).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        let review = task.phase(PhaseType::Review).unwrap();
        assert_eq!(review.artifact.as_ref().unwrap().content, "ok");
        assert!(review.completed_at.is_some());
    }

    #[tokio::test]
    async fn advance_phase_moves_current() {
        let (store, task_id) = setup(Some("/repo"));
        let orch = orchestrator(&store, MockProvider::new(ProviderId::Ollama));
        assert_eq!(orch.advance_phase(&task_id).unwrap(), Some(PhaseType::Plan));
        assert_eq!(
            store.read(|s| s.task(&task_id).map(|t| t.current_phase)),
            Some(PhaseType::Plan)
        );
        assert!(matches!(
            orch.advance_phase("missing"),
            Err(ExecutionError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn generations_increase() {
        let (store, task_id) = setup(Some("/repo"));
        let mock = MockProvider::new(ProviderId::Ollama)
            .with_chunks(["a"])
            .with_chunks(["b"]);
        let orch = orchestrator(&store, mock);
        orch.execute(&task_id, Some(PhaseType::Spec)).await.unwrap();
        assert_eq!(orch.active_generation(), None);
        orch.execute(&task_id, Some(PhaseType::Plan)).await.unwrap();
        assert_eq!(orch.generation.load(Ordering::SeqCst), 2);
    }
}
