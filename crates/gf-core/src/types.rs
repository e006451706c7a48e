use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timestamp;

/// Generate a prefixed identifier, e.g. `task-3f2a…`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().as_simple())
}

// ---------------------------------------------------------------------------
// PhaseType / PhaseStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseType {
    Spec,
    Plan,
    Code,
    Qa,
    Review,
}

impl PhaseType {
    /// Canonical pipeline order.
    pub const ORDER: [PhaseType; 5] = [
        PhaseType::Spec,
        PhaseType::Plan,
        PhaseType::Code,
        PhaseType::Qa,
        PhaseType::Review,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseType::Spec => "spec",
            PhaseType::Plan => "plan",
            PhaseType::Code => "code",
            PhaseType::Qa => "qa",
            PhaseType::Review => "review",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PhaseType::Spec => "Specification",
            PhaseType::Plan => "Planning",
            PhaseType::Code => "Implementation",
            PhaseType::Qa => "QA",
            PhaseType::Review => "Review",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PhaseType::Spec => "Analyze requirements and produce detailed specifications",
            PhaseType::Plan => "Break down spec into actionable implementation tasks",
            PhaseType::Code => "Implement changes according to the plan",
            PhaseType::Qa => "Validate implementation against acceptance criteria",
            PhaseType::Review => "Review code changes and suggest improvements",
        }
    }

    /// Position in the canonical order.
    pub fn index(&self) -> usize {
        match self {
            PhaseType::Spec => 0,
            PhaseType::Plan => 1,
            PhaseType::Code => 2,
            PhaseType::Qa => 3,
            PhaseType::Review => 4,
        }
    }

    /// The phase after this one in canonical order, if any.
    pub fn next(&self) -> Option<PhaseType> {
        Self::ORDER.get(self.index() + 1).copied()
    }
}

impl fmt::Display for PhaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PhaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhaseType::ORDER
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown phase `{s}`"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Skipped,
}

impl PhaseStatus {
    /// Returns `true` when a transition from `self` to `target` is valid.
    ///
    /// `Completed` and `Failed` are only reachable from `Active`; a
    /// finished or failed phase may be re-run by going back to `Active`.
    pub fn can_transition_to(&self, target: &PhaseStatus) -> bool {
        matches!(
            (self, target),
            (PhaseStatus::Pending, PhaseStatus::Active)
                | (PhaseStatus::Pending, PhaseStatus::Skipped)
                | (PhaseStatus::Active, PhaseStatus::Completed)
                | (PhaseStatus::Active, PhaseStatus::Failed)
                | (PhaseStatus::Failed, PhaseStatus::Active)
                | (PhaseStatus::Failed, PhaseStatus::Pending)
                | (PhaseStatus::Completed, PhaseStatus::Active)
                | (PhaseStatus::Skipped, PhaseStatus::Pending)
        )
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Markdown,
    Json,
    Code,
    Diff,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseArtifact {
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    pub id: PhaseType,
    pub name: String,
    pub status: PhaseStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "timestamp::flexible_opt"
    )]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "timestamp::flexible_opt"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PhaseArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Phase {
    pub fn pending(id: PhaseType) -> Self {
        Self {
            id,
            name: id.display_name().to_string(),
            status: PhaseStatus::Pending,
            started_at: None,
            completed_at: None,
            artifact: None,
            error: None,
        }
    }

    /// The five canonical phases, all pending.
    pub fn default_set() -> Vec<Phase> {
        PhaseType::ORDER.iter().map(|p| Phase::pending(*p)).collect()
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Ready,
    InProgress,
    Blocked,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub current_phase: PhaseType,
    pub phases: Vec<Phase>,
    pub project_id: String,
    #[serde(deserialize_with = "timestamp::flexible")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::flexible")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub assigned_agents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub human_approval_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_approval_phase: Option<PhaseType>,
}

impl Task {
    pub fn new(title: impl Into<String>, project_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id("task"),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Backlog,
            current_phase: PhaseType::Spec,
            phases: Phase::default_set(),
            project_id: project_id.into(),
            created_at: now,
            updated_at: now,
            assigned_agents: Vec::new(),
            branch: None,
            human_approval_required: false,
            human_approval_phase: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn phase(&self, id: PhaseType) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id == id)
    }

    pub fn phase_mut(&mut self, id: PhaseType) -> Option<&mut Phase> {
        self.phases.iter_mut().find(|p| p.id == id)
    }

    pub fn has_phase(&self, id: PhaseType) -> bool {
        self.phase(id).is_some()
    }

    /// The phase currently marked `active`, if any.
    pub fn active_phase(&self) -> Option<&Phase> {
        self.phases.iter().find(|p| p.status == PhaseStatus::Active)
    }

    /// Next configured phase after `after`, in canonical order.
    pub fn next_phase(&self, after: PhaseType) -> Option<PhaseType> {
        let mut candidate = after.next();
        while let Some(p) = candidate {
            if self.has_phase(p) {
                return Some(p);
            }
            candidate = p.next();
        }
        None
    }

    /// Whether this task's last configured phase is `phase`.
    pub fn is_last_phase(&self, phase: PhaseType) -> bool {
        self.next_phase(phase).is_none()
    }

    /// Re-sort phases into canonical order.
    pub fn normalize_phase_order(&mut self) {
        self.phases.sort_by_key(|p| p.id.index());
    }
}

// ---------------------------------------------------------------------------
// Agent roles and categories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    // --- Spec creation ---
    SpecGatherer,
    SpecResearcher,
    SpecWriter,
    SpecCritic,
    SpecDiscovery,
    SpecContext,
    SpecValidation,

    // --- Build ---
    Planner,
    Coder,
    Qa,
    QaReviewer,
    QaFixer,

    // --- Utility ---
    PrReviewer,
    CommitAgent,
    MergeResolver,

    // --- Insights ---
    Analysis,
    BatchAnalysis,

    // --- Ideation ---
    Ideation,
    RoadmapDiscovery,

    // --- Legacy ---
    Spec,
    Reviewer,
}

impl AgentRole {
    pub const ALL: [AgentRole; 21] = [
        AgentRole::SpecGatherer,
        AgentRole::SpecResearcher,
        AgentRole::SpecWriter,
        AgentRole::SpecCritic,
        AgentRole::SpecDiscovery,
        AgentRole::SpecContext,
        AgentRole::SpecValidation,
        AgentRole::Planner,
        AgentRole::Coder,
        AgentRole::Qa,
        AgentRole::QaReviewer,
        AgentRole::QaFixer,
        AgentRole::PrReviewer,
        AgentRole::CommitAgent,
        AgentRole::MergeResolver,
        AgentRole::Analysis,
        AgentRole::BatchAnalysis,
        AgentRole::Ideation,
        AgentRole::RoadmapDiscovery,
        AgentRole::Spec,
        AgentRole::Reviewer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::SpecGatherer => "spec-gatherer",
            AgentRole::SpecResearcher => "spec-researcher",
            AgentRole::SpecWriter => "spec-writer",
            AgentRole::SpecCritic => "spec-critic",
            AgentRole::SpecDiscovery => "spec-discovery",
            AgentRole::SpecContext => "spec-context",
            AgentRole::SpecValidation => "spec-validation",
            AgentRole::Planner => "planner",
            AgentRole::Coder => "coder",
            AgentRole::Qa => "qa",
            AgentRole::QaReviewer => "qa-reviewer",
            AgentRole::QaFixer => "qa-fixer",
            AgentRole::PrReviewer => "pr-reviewer",
            AgentRole::CommitAgent => "commit-agent",
            AgentRole::MergeResolver => "merge-resolver",
            AgentRole::Analysis => "analysis",
            AgentRole::BatchAnalysis => "batch-analysis",
            AgentRole::Ideation => "ideation",
            AgentRole::RoadmapDiscovery => "roadmap-discovery",
            AgentRole::Spec => "spec",
            AgentRole::Reviewer => "reviewer",
        }
    }

    /// Classify a role into its category. This is the only source of truth
    /// for [`Agent::category`].
    pub fn category(&self) -> AgentCategory {
        let name = self.as_str();
        if name.contains("spec") {
            AgentCategory::SpecCreation
        } else if name.contains("qa")
            || matches!(self, AgentRole::Coder | AgentRole::Planner | AgentRole::MergeResolver)
        {
            AgentCategory::Build
        } else if name.contains("review") || name.contains("commit") {
            AgentCategory::Utility
        } else if name.contains("analysis") {
            AgentCategory::Insights
        } else if name.contains("ideation") || name.contains("roadmap") {
            AgentCategory::Ideation
        } else {
            AgentCategory::Build
        }
    }

    /// Title-cased name, e.g. `spec-writer` -> `Spec Writer`.
    pub fn display_name(&self) -> String {
        self.as_str()
            .split('-')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentRole::ALL
            .iter()
            .find(|r| r.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown agent role `{s}`"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentCategory {
    SpecCreation,
    Build,
    Utility,
    Insights,
    Ideation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Working,
    Waiting,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolName {
    ReadFile,
    SearchFiles,
    WriteFile,
    ApplyPatch,
    RunCommand,
    GitDiff,
    GitStatus,
    GitBranch,
    GitCommit,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    pub category: AgentCategory,
    pub model: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub allowed_tools: Vec<ToolName>,
    #[serde(default)]
    pub mcp_bindings: Vec<String>,
    pub is_active: bool,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<String>,
}

impl Agent {
    pub fn new(role: AgentRole, model: impl Into<String>) -> Self {
        Self {
            id: format!("agent-{}", role.as_str()),
            name: role.display_name(),
            role,
            category: role.category(),
            model: model.into(),
            description: String::new(),
            constraints: Vec::new(),
            allowed_tools: Vec::new(),
            mcp_bindings: Vec::new(),
            is_active: true,
            status: AgentStatus::Idle,
            current_task_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Re-derive `category` from `role`, discarding whatever was stored.
    pub fn normalized(mut self) -> Self {
        self.category = self.role.category();
        self
    }
}

// ---------------------------------------------------------------------------
// Logs and terminal entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    #[serde(deserialize_with = "timestamp::flexible")]
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<PhaseType>,
    #[serde(default)]
    pub is_streaming: bool,
}

impl LogEntry {
    pub fn new(level: LogLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: new_id("log"),
            timestamp: Utc::now(),
            level,
            source: source.into(),
            message: message.into(),
            agent_id: None,
            phase: None,
            is_streaming: false,
        }
    }

    /// A log entry attributed to `agent_id`, with the agent as source.
    pub fn for_agent(level: LogLevel, agent_id: &str, message: impl Into<String>) -> Self {
        let mut entry = Self::new(level, agent_id, message);
        entry.agent_id = Some(agent_id.to_string());
        entry
    }

    pub fn in_phase(mut self, phase: PhaseType) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn streaming(mut self) -> Self {
        self.is_streaming = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalEntryType {
    Output,
    Tool,
    Error,
    Boundary,
    HumanNote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalEntry {
    pub id: String,
    pub agent_role: AgentRole,
    pub phase: PhaseType,
    #[serde(rename = "type")]
    pub entry_type: TerminalEntryType,
    pub content: String,
    #[serde(deserialize_with = "timestamp::flexible")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<ToolName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<String>,
}

impl TerminalEntry {
    pub fn new(
        agent_role: AgentRole,
        phase: PhaseType,
        entry_type: TerminalEntryType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id("term"),
            agent_role,
            phase,
            entry_type,
            content: content.into(),
            timestamp: Utc::now(),
            tool_name: None,
            tool_args: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Repository root on disk. `None` means no repository is connected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_git: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(deserialize_with = "timestamp::flexible")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::flexible")]
    pub last_opened_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>, path: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id("proj"),
            name: name.into(),
            path,
            has_git: None,
            description: None,
            created_at: now,
            last_opened_at: now,
        }
    }

    /// The repository path, treating an empty string as "not connected".
    pub fn repo_path(&self) -> Option<&str> {
        self.path.as_deref().filter(|p| !p.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// File operation proposals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOpType {
    Create,
    Modify,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOp {
    #[serde(rename = "type")]
    pub op_type: FileOpType,
    pub path: String,
    pub diff: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Applied,
    Rejected,
    Error,
}

impl ProposalStatus {
    /// Proposals leave `Pending` exactly once and never come back.
    pub fn can_transition_to(&self, target: &ProposalStatus) -> bool {
        matches!(
            (self, target),
            (ProposalStatus::Pending, ProposalStatus::Applied)
                | (ProposalStatus::Pending, ProposalStatus::Rejected)
                | (ProposalStatus::Pending, ProposalStatus::Error)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOpProposal {
    pub id: String,
    pub ops: Vec<FileOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_role: Option<AgentRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_git: Option<bool>,
    #[serde(deserialize_with = "timestamp::flexible")]
    pub created_at: DateTime<Utc>,
    pub status: ProposalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileOpProposal {
    pub fn pending(ops: Vec<FileOp>) -> Self {
        Self {
            id: new_id("fileops"),
            ops,
            task_id: None,
            agent_role: None,
            project_id: None,
            repo_path: None,
            has_git: None,
            created_at: Utc::now(),
            status: ProposalStatus::Pending,
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
