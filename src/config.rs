//! Configuration loading and management.
//!
//! Configuration is loaded with the following precedence:
//! 1. Environment variables (`TURNSTILE_*`)
//! 2. Config file (`~/.turnstile/config.toml`)
//! 3. Defaults
//!
//! Loading only parses. Semantic validation (disjoint tool taxonomy, sane
//! thresholds, compilable patterns) happens when the gate registry is built
//! from the config, so a bad file is rejected once at startup.

use crate::error::{Error, Result};
use fs_err as fs;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

/// Main configuration struct.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,

    /// Tool taxonomy.
    pub tools: ToolsConfig,

    /// Gate thresholds, modes and exemptions.
    pub gates: GatesConfig,

    /// Sub-agent capability restrictions.
    pub subagents: SubagentsConfig,

    /// Hydration file locations.
    pub hydration: HydrationConfig,

    /// Shell command classification tables.
    pub bash: BashConfig,

    /// Trace configuration.
    pub trace: TraceConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the turnstile home directory.
    pub path: PathBuf,

    /// How long a mutation waits for the session lock before failing open.
    pub lock_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_turnstile_home(),
            lock_timeout_ms: 300,
        }
    }
}

/// Tool taxonomy. The three category lists must be disjoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Tools exempt from every admission gate.
    pub always_available: Vec<String>,

    /// Tools that change the workspace.
    pub mutating: Vec<String>,

    /// Tools that start a sub-agent or skill.
    pub spawn: Vec<String>,

    /// Mutating tools whose `command` argument is a shell command line.
    pub shell: Vec<String>,

    /// Task-management tools. Always admitted by the task-binding gate.
    pub task_binding: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            always_available: strings(&[
                // Claude Code
                "Read",
                "Glob",
                "Grep",
                "LS",
                "WebFetch",
                "WebSearch",
                "TodoWrite",
                "AskUserQuestion",
                "EnterPlanMode",
                "ExitPlanMode",
                "TaskOutput",
                "ListMcpResourcesTool",
                "ReadMcpResourceTool",
                // Gemini CLI
                "read_file",
                "read_many_files",
                "list_directory",
                "glob",
                "search_file_content",
                "google_web_search",
                "web_fetch",
                "write_todos",
            ]),
            mutating: strings(&[
                "Write",
                "Edit",
                "MultiEdit",
                "NotebookEdit",
                "Bash",
                "KillShell",
                "write_file",
                "replace",
                "run_shell_command",
                "save_memory",
                "mcp__tasks__create_task",
                "mcp__tasks__update_task",
                "mcp__tasks__complete_task",
                "mcp__tasks__claim_next_task",
            ]),
            spawn: strings(&["Task", "Skill", "activate_skill", "delegate_to_agent"]),
            shell: strings(&["Bash", "run_shell_command"]),
            task_binding: strings(&[
                "mcp__tasks__create_task",
                "mcp__tasks__update_task",
                "mcp__tasks__complete_task",
                "mcp__tasks__claim_next_task",
            ]),
        }
    }
}

/// Gate configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatesConfig {
    /// Mutating operations allowed between compliance checks.
    pub compliance_threshold: u32,

    /// Per-workflow threshold overrides, keyed by workflow id.
    pub workflow_thresholds: BTreeMap<String, u32>,

    /// Writes under these directories never need a task binding.
    pub safe_temp_prefixes: Vec<PathBuf>,

    /// Prompt prefix that skips hydration and task binding for that prompt.
    pub bypass_prefix: String,

    /// Block or warn, per gate.
    pub modes: GateModes,
}

impl Default for GatesConfig {
    fn default() -> Self {
        let mut workflow_thresholds = BTreeMap::new();
        workflow_thresholds.insert("simple-question".to_string(), 15);
        workflow_thresholds.insert("interactive-followup".to_string(), 15);
        Self {
            compliance_threshold: 7,
            workflow_thresholds,
            safe_temp_prefixes: vec![
                expand_home(Path::new("~/.claude/tmp")),
                expand_home(Path::new("~/.claude/projects")),
                expand_home(Path::new("~/.gemini/tmp")),
                turnstile_home().join("tmp"),
            ],
            bypass_prefix: ".".to_string(),
            modes: GateModes::default(),
        }
    }
}

/// What a gate does when its condition holds.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    /// Deny the tool call.
    #[default]
    Block,

    /// Let the call through with a warning.
    Warn,
}

impl GateMode {
    /// Parse a mode name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "block" | "deny" => Some(Self::Block),
            "warn" | "warning" => Some(Self::Warn),
            _ => None,
        }
    }
}

/// Per-gate modes.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct GateModes {
    /// Hydration-pending gate.
    pub hydration: GateMode,

    /// Critic-approval gate. Warns unless configured to block.
    pub critic: GateMode,

    /// Task-binding gate.
    pub task_binding: GateMode,

    /// Compliance-threshold gate.
    pub compliance: GateMode,
}

impl Default for GateModes {
    fn default() -> Self {
        Self {
            hydration: GateMode::Block,
            critic: GateMode::Warn,
            task_binding: GateMode::Block,
            compliance: GateMode::Block,
        }
    }
}

/// Sub-agent configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubagentsConfig {
    /// Glob patterns (case-insensitive) naming read-only sub-agent types.
    pub restricted: Vec<String>,
}

impl Default for SubagentsConfig {
    fn default() -> Self {
        Self {
            restricted: strings(&["*hydrator*"]),
        }
    }
}

/// Hydration configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HydrationConfig {
    /// Directory the hydrator writes its context files to.
    pub temp_dir: PathBuf,

    /// File name prefix of hydration context files.
    pub file_prefix: String,
}

impl Default for HydrationConfig {
    fn default() -> Self {
        Self {
            temp_dir: turnstile_home().join("tmp").join("hydrator"),
            file_prefix: "hydrate_".to_string(),
        }
    }
}

/// Shell command classification. Patterns are regular expressions matched
/// case-insensitively against each command segment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BashConfig {
    /// Read-only commands (matched at the start of a segment).
    pub safe_patterns: Vec<String>,

    /// Commands that modify files, history or installed packages.
    pub destructive_patterns: Vec<String>,
}

impl Default for BashConfig {
    fn default() -> Self {
        Self {
            safe_patterns: strings(&[
                r"^cat\b",
                r"^head\b",
                r"^tail\b",
                r"^less\b",
                r"^more\b",
                r"^ls\b",
                r"^find\b",
                r"^grep\b",
                r"^rg\b",
                r"^echo\b",
                r"^pwd\b",
                r"^which\b",
                r"^type\b",
                r"^wc\b",
                r"^git\s+(status|diff|log|show|branch)\b",
                r"^npm\s+list\b",
                r"^pip\s+list\b",
                r"^uv\s+pip\s+list\b",
            ]),
            destructive_patterns: strings(&[
                r"\brm\b",
                r"\bmv\b",
                r"\bcp\b",
                r"\bmkdir\b",
                r"\btouch\b",
                r"\bchmod\b",
                r"\bchown\b",
                r"\bln\b",
                r"\bgit\s+(commit|push|reset|rebase|merge|checkout|restore|clean|stash)\b",
                r"\bnpm\s+(install|uninstall|ci)\b",
                r"\bpip\s+(install|uninstall)\b",
                r"\buv\s+(add|remove|sync)\b",
                r"\bcargo\s+(add|remove|install)\b",
                r"\bsed\s+(-[a-z]*i|--in-place)",
                r"\bawk\s+-i\b",
                r"\btee\b",
                r"\bdd\b",
                r"\btruncate\b",
            ]),
        }
    }
}

/// Trace configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Maximum trace events per session.
    pub max_events: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self { max_events: 500 }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Get the default turnstile home directory.
fn default_turnstile_home() -> PathBuf {
    dirs::home_dir().map_or_else(|| PathBuf::from(".turnstile"), |h| h.join(".turnstile"))
}

/// Get the turnstile home directory.
///
/// Uses `TURNSTILE_HOME` environment variable if set, otherwise `~/.turnstile`.
#[must_use]
pub fn turnstile_home() -> PathBuf {
    env::var("TURNSTILE_HOME").map_or_else(|_| default_turnstile_home(), PathBuf::from)
}

/// Expand a leading `~/` to the user's home directory.
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Load configuration with precedence: env vars → file → defaults.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
pub fn load_config() -> Result<Config> {
    let config_path = get_config_path();
    let mut config = if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        parse_config(&contents)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Parse a TOML document and expand `~/` in path settings.
///
/// # Errors
///
/// Returns `Error::Configuration` if the document is not valid TOML or does
/// not match the config schema.
pub fn parse_config(contents: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(contents).map_err(|e| Error::Configuration(e.to_string()))?;

    config.storage.path = expand_home(&config.storage.path);
    config.hydration.temp_dir = expand_home(&config.hydration.temp_dir);
    for prefix in &mut config.gates.safe_temp_prefixes {
        *prefix = expand_home(prefix);
    }

    Ok(config)
}

/// Get the path to the config file.
fn get_config_path() -> PathBuf {
    if let Ok(path) = env::var("TURNSTILE_CONFIG") {
        return PathBuf::from(path);
    }

    turnstile_home().join("config.toml")
}

/// Apply environment variable overrides to config.
fn apply_env_overrides(config: &mut Config) {
    // Storage
    if let Ok(path) = env::var("TURNSTILE_STORAGE_PATH") {
        config.storage.path = PathBuf::from(path);
    } else if let Ok(home) = env::var("TURNSTILE_HOME") {
        config.storage.path = PathBuf::from(home);
    }

    if let Ok(val) = env::var("TURNSTILE_LOCK_TIMEOUT_MS") {
        if let Ok(ms) = val.parse() {
            config.storage.lock_timeout_ms = ms;
        }
    }

    // Gates
    if let Ok(val) = env::var("TURNSTILE_COMPLIANCE_THRESHOLD") {
        if let Ok(threshold) = val.parse() {
            config.gates.compliance_threshold = threshold;
        }
    }

    if let Some(mode) = env_mode("TURNSTILE_HYDRATION_MODE") {
        config.gates.modes.hydration = mode;
    }
    if let Some(mode) = env_mode("TURNSTILE_CRITIC_MODE") {
        config.gates.modes.critic = mode;
    }
    if let Some(mode) = env_mode("TURNSTILE_TASK_MODE") {
        config.gates.modes.task_binding = mode;
    }
    if let Some(mode) = env_mode("TURNSTILE_COMPLIANCE_MODE") {
        config.gates.modes.compliance = mode;
    }

    // Trace
    if let Ok(val) = env::var("TURNSTILE_MAX_EVENTS") {
        if let Ok(max) = val.parse() {
            config.trace.max_events = max;
        }
    }
}

fn env_mode(key: &str) -> Option<GateMode> {
    env::var(key).ok().and_then(|v| GateMode::parse(&v))
}
