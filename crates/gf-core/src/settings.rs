use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{AgentRole, PhaseType, ToolName};

/// Default model for roles with no explicit assignment.
pub const DEFAULT_MODEL: &str = "llama3.2";
/// Model used for code-producing roles out of the box.
pub const DEFAULT_CODE_MODEL: &str = "codellama";

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    #[default]
    Ollama,
    OpenRouter,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Ollama => "ollama",
            ProviderId::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ollama" => Ok(ProviderId::Ollama),
            "openrouter" => Ok(ProviderId::OpenRouter),
            other => Err(format!("unknown provider `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OllamaConnection {
    pub endpoint: String,
    #[serde(default)]
    pub is_connected: bool,
}

impl Default for OllamaConnection {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".into(),
            is_connected: false,
        }
    }
}

/// OpenRouter connection state. The API key itself is never stored here;
/// only the name of the environment variable that holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRouterConnection {
    #[serde(default = "default_openrouter_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub is_connected: bool,
}

impl Default for OpenRouterConnection {
    fn default() -> Self {
        Self {
            api_key_env: default_openrouter_key_env(),
            is_connected: false,
        }
    }
}

fn default_openrouter_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}

// ---------------------------------------------------------------------------
// Execution engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEngineSettings {
    pub active_provider: ProviderId,
    #[serde(default)]
    pub ollama: OllamaConnection,
    #[serde(default)]
    pub openrouter: OpenRouterConnection,
    #[serde(default)]
    pub available_models: Vec<String>,
    #[serde(default)]
    pub model_assignments: BTreeMap<AgentRole, String>,
}

impl Default for ExecutionEngineSettings {
    fn default() -> Self {
        let model_assignments = AgentRole::ALL
            .iter()
            .map(|role| {
                let model = match role {
                    AgentRole::Coder | AgentRole::QaFixer | AgentRole::MergeResolver => {
                        DEFAULT_CODE_MODEL
                    }
                    _ => DEFAULT_MODEL,
                };
                (*role, model.to_string())
            })
            .collect();
        Self {
            active_provider: ProviderId::Ollama,
            ollama: OllamaConnection::default(),
            openrouter: OpenRouterConnection::default(),
            available_models: Vec::new(),
            model_assignments,
        }
    }
}

impl ExecutionEngineSettings {
    /// The non-empty model assigned to `role`, if any.
    pub fn assigned_model(&self, role: AgentRole) -> Option<&str> {
        self.model_assignments
            .get(&role)
            .map(String::as_str)
            .filter(|m| !m.trim().is_empty())
    }

    pub fn set_connected(&mut self, provider: ProviderId, connected: bool) {
        match provider {
            ProviderId::Ollama => self.ollama.is_connected = connected,
            ProviderId::OpenRouter => self.openrouter.is_connected = connected,
        }
    }

    pub fn is_connected(&self, provider: ProviderId) -> bool {
        match provider {
            ProviderId::Ollama => self.ollama.is_connected,
            ProviderId::OpenRouter => self.openrouter.is_connected,
        }
    }
}

// ---------------------------------------------------------------------------
// Tool permissions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPermissions {
    #[serde(default)]
    pub agent_permissions: BTreeMap<String, Vec<ToolName>>,
    #[serde(default)]
    pub command_whitelist: Vec<String>,
    #[serde(default)]
    pub path_restrictions: Vec<String>,
}

impl Default for ToolPermissions {
    fn default() -> Self {
        Self {
            agent_permissions: BTreeMap::new(),
            command_whitelist: ["npm", "npx", "node", "git", "yarn", "pnpm", "bun"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            path_restrictions: [".git", "node_modules", ".env"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Project policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    pub branch_naming_pattern: String,
    #[serde(default)]
    pub auto_commit: bool,
    /// Per-phase timeout in milliseconds.
    #[serde(default)]
    pub phase_timeouts: BTreeMap<PhaseType, u64>,
    #[serde(default)]
    pub human_approval_gates: Vec<PhaseType>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        let phase_timeouts = PhaseType::ORDER
            .iter()
            .map(|p| {
                let ms = if *p == PhaseType::Code { 600_000 } else { 300_000 };
                (*p, ms)
            })
            .collect();
        Self {
            branch_naming_pattern: "ghostflow/{taskId}/{phase}".into(),
            auto_commit: false,
            phase_timeouts,
            human_approval_gates: vec![PhaseType::Code],
        }
    }
}

impl ProjectSettings {
    pub fn timeout_ms(&self, phase: PhaseType) -> Option<u64> {
        self.phase_timeouts.get(&phase).copied().filter(|ms| *ms > 0)
    }

    pub fn requires_approval(&self, phase: PhaseType) -> bool {
        self.human_approval_gates.contains(&phase)
    }

    /// Render the branch name for a task/phase pair.
    pub fn branch_name(&self, task_id: &str, phase: PhaseType) -> String {
        self.branch_naming_pattern
            .replace("{taskId}", task_id)
            .replace("{phase}", phase.as_str())
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub execution_engine: ExecutionEngineSettings,
    #[serde(default)]
    pub tool_permissions: ToolPermissions,
    #[serde(default)]
    pub project: ProjectSettings,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
