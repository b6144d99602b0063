//! Detection heuristics over tool calls.
//!
//! Everything here is a pure function of its arguments. Ambiguity resolves
//! toward letting work proceed: a shell command nobody recognises is not
//! destructive.

use crate::config::BashConfig;
use crate::core::gate::ToolCall;
use crate::core::taxonomy::ToolCategory;
use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

// ============================================================================
// Shell command classification
// ============================================================================

/// Classifies shell command lines as destructive or not.
#[derive(Debug, Clone)]
pub struct BashClassifier {
    safe: Vec<Regex>,
    destructive: Vec<Regex>,
}

impl BashClassifier {
    /// Compile classification tables.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if a pattern is not a valid regex.
    pub fn new(safe: &[String], destructive: &[String]) -> Result<Self> {
        Ok(Self {
            safe: compile_patterns(safe)?,
            destructive: compile_patterns(destructive)?,
        })
    }

    /// Compile the `[bash]` config section.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if a pattern is not a valid regex.
    pub fn from_config(config: &BashConfig) -> Result<Self> {
        Self::new(&config.safe_patterns, &config.destructive_patterns)
    }

    /// Whether running `command` may modify files, history or packages.
    ///
    /// Output redirection anywhere makes a command destructive. Otherwise
    /// each segment of a pipeline or command list is checked: a segment
    /// that starts with a read-only command is safe, one that matches a
    /// destructive pattern is destructive, and anything else is not.
    #[must_use]
    pub fn is_destructive(&self, command: &str) -> bool {
        if has_output_redirect(command) {
            return true;
        }
        split_unquoted(command)
            .into_iter()
            .any(|segment| self.is_segment_destructive(segment))
    }

    fn is_segment_destructive(&self, segment: &str) -> bool {
        let segment = segment.trim();

        // env VAR=x cmd -> cmd
        let segment = segment
            .strip_prefix("env ")
            .map_or(segment, skip_env_command);

        // bash -c "cmd" is classified by its payload
        if let Some(nested) = extract_nested_shell_command(segment) {
            return self.is_destructive(nested);
        }

        let segment = strip_env_vars(segment);
        let segment = segment.strip_prefix("sudo ").unwrap_or(segment).trim();
        if segment.is_empty() {
            return false;
        }

        if self.safe.iter().any(|re| re.is_match(segment)) {
            return false;
        }
        self.destructive.iter().any(|re| re.is_match(segment))
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|e| Error::Configuration(format!("invalid shell pattern {p:?}: {e}")))
        })
        .collect()
}

static DEFAULT_CLASSIFIER: LazyLock<Option<BashClassifier>> =
    LazyLock::new(|| BashClassifier::from_config(&BashConfig::default()).ok());

/// Classify a shell command with the built-in tables.
#[must_use]
pub fn is_destructive_bash(command: &str) -> bool {
    DEFAULT_CLASSIFIER
        .as_ref()
        .is_some_and(|c| c.is_destructive(command))
}

/// Split a command line on unquoted `|`, `||`, `&&`, `;`, `&` and newlines.
fn split_unquoted(cmd: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut prev_char = None;
    let mut start = 0;

    for (i, c) in cmd.char_indices() {
        match c {
            '\'' if !in_double_quote && prev_char != Some('\\') => {
                in_single_quote = !in_single_quote;
            }
            '"' if !in_single_quote && prev_char != Some('\\') => {
                in_double_quote = !in_double_quote;
            }
            '|' | ';' | '\n' if !in_single_quote && !in_double_quote => {
                segments.push(&cmd[start..i]);
                start = i + 1;
            }
            // `&` after `>` is a file descriptor duplication, not a separator
            '&' if !in_single_quote && !in_double_quote && prev_char != Some('>') => {
                segments.push(&cmd[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        prev_char = Some(c);
    }
    segments.push(&cmd[start..]);

    segments.retain(|s| !s.trim().is_empty());
    segments
}

/// Whether the command writes output to a file (`>`, `>>`, not `>&` or
/// `/dev/null`).
fn has_output_redirect(cmd: &str) -> bool {
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut prev_char = None;
    let mut chars = cmd.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '\'' if !in_double_quote && prev_char != Some('\\') => {
                in_single_quote = !in_single_quote;
            }
            '"' if !in_single_quote && prev_char != Some('\\') => {
                in_double_quote = !in_double_quote;
            }
            '>' if !in_single_quote && !in_double_quote => {
                let mut rest = &cmd[i + 1..];
                if let Some(stripped) = rest.strip_prefix('>') {
                    rest = stripped;
                    chars.next();
                }
                let target = rest.trim_start();
                let is_fd_dup = target.starts_with('&');
                let word = target.split_whitespace().next().unwrap_or("");
                if !is_fd_dup && word != "/dev/null" {
                    return true;
                }
            }
            _ => {}
        }
        prev_char = Some(c);
    }

    false
}

/// Skip `env` command and its `VAR=value` arguments.
fn skip_env_command(cmd: &str) -> &str {
    let mut rest = cmd.trim();
    while let Some(eq_pos) = rest.find('=') {
        let before_eq = &rest[..eq_pos];
        if before_eq.chars().all(|c| c.is_alphanumeric() || c == '_') {
            rest = skip_value_str(&rest[eq_pos + 1..]).trim();
        } else {
            break;
        }
    }
    rest
}

/// Extract command from nested shell: `bash -c 'cmd'` -> `cmd`.
fn extract_nested_shell_command(cmd: &str) -> Option<&str> {
    let shells = ["bash -c ", "sh -c ", "zsh -c ", "/bin/bash -c ", "/bin/sh -c "];

    for shell in shells {
        if let Some(stripped) = cmd.strip_prefix(shell) {
            let rest = stripped.trim();
            if (rest.starts_with('"') && rest.ends_with('"'))
                || (rest.starts_with('\'') && rest.ends_with('\''))
            {
                return rest.get(1..rest.len().saturating_sub(1));
            }
            return Some(rest);
        }
    }
    None
}

/// Strip leading `VAR=value` assignments from command.
fn strip_env_vars(cmd: &str) -> &str {
    let mut rest = cmd.trim();

    loop {
        let word_end = rest
            .find(|c: char| !c.is_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        if word_end == 0 {
            break;
        }

        let after_word = &rest[word_end..];
        if let Some(stripped) = after_word.strip_prefix('=') {
            rest = skip_value_str(stripped).trim();
        } else {
            break;
        }
    }

    rest
}

/// Skip a value (quoted or unquoted) and return the rest.
fn skip_value_str(s: &str) -> &str {
    let s = s.trim_start();
    if let Some(rest) = s.strip_prefix('"') {
        let mut prev = None;
        for (i, c) in rest.char_indices() {
            if c == '"' && prev != Some('\\') {
                return &rest[i + 1..];
            }
            prev = Some(c);
        }
        s // Unclosed quote, return as-is
    } else if let Some(rest) = s.strip_prefix('\'') {
        if let Some(end) = rest.find('\'') {
            return &rest[end + 1..];
        }
        s
    } else {
        match s.find(char::is_whitespace) {
            Some(space) => &s[space..],
            None => "",
        }
    }
}

// ============================================================================
// Sub-agents
// ============================================================================

/// What a spawn tool call is starting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnTarget {
    pub subagent_type: String,
    pub is_skill: bool,
}

/// Extract the sub-agent or skill a tool call spawns.
///
/// Hosts spell this differently: `Task(subagent_type=…)`,
/// `delegate_to_agent(agent_name=…)`, `activate_skill(name=…)`,
/// `Skill(skill=…)`, or calling a registered agent directly by name.
#[must_use]
pub fn extract_subagent_type(tool_name: &str, tool_input: &Value) -> Option<SpawnTarget> {
    let arg = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| tool_input.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let found = match tool_name {
        "Skill" | "activate_skill" => arg(&["skill", "name"]).map(|t| (t, true)),
        "delegate_to_agent" => arg(&["agent_name", "subagent_type", "name"]).map(|t| (t, false)),
        _ => arg(&["subagent_type", "agent_name", "agent_type"]).map(|t| (t, false)),
    };

    found
        .or_else(|| SubagentRole::from_type(tool_name).map(|_| (tool_name.to_string(), false)))
        .map(|(subagent_type, is_skill)| SpawnTarget {
            subagent_type,
            is_skill,
        })
}

/// What a tool call spawns, given the tool's category.
///
/// Only spawn tools have their input searched for a target. Any other tool
/// counts only when its own name is a known sub-agent role.
#[must_use]
pub fn spawn_target(tool: &ToolCall, category: ToolCategory) -> Option<SpawnTarget> {
    if category == ToolCategory::Spawn {
        return extract_subagent_type(&tool.name, &tool.input);
    }
    SubagentRole::from_type(&tool.name).map(|_| SpawnTarget {
        subagent_type: tool.name.clone(),
        is_skill: false,
    })
}

/// Compliance sub-agent roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubagentRole {
    /// Turns a prompt into an execution plan.
    Hydrator,
    /// Reviews the plan.
    Critic,
    /// Periodic compliance check.
    Custodiet,
    /// Compliance audit.
    Audit,
    /// Housekeeping agent.
    Butler,
}

impl SubagentRole {
    /// Recognise a sub-agent type, ignoring case and any `namespace:` prefix.
    #[must_use]
    pub fn from_type(subagent_type: &str) -> Option<Self> {
        let base = subagent_type
            .rsplit(':')
            .next()
            .unwrap_or(subagent_type)
            .trim()
            .to_lowercase();
        match base.as_str() {
            "hydrator" | "prompt-hydrator" => Some(Self::Hydrator),
            "critic" => Some(Self::Critic),
            "custodiet" => Some(Self::Custodiet),
            "audit" => Some(Self::Audit),
            "butler" => Some(Self::Butler),
            _ => None,
        }
    }

    /// Whether completing this role counts as a compliance check.
    #[must_use]
    pub fn resets_compliance(self) -> bool {
        matches!(self, Self::Custodiet | Self::Audit)
    }
}

/// Whether a sub-agent type belongs to the fixed compliance set.
#[must_use]
pub fn is_compliance_subagent(subagent_type: &str) -> bool {
    SubagentRole::from_type(subagent_type).is_some()
}

/// Case-insensitive glob patterns naming read-only sub-agent types.
#[derive(Debug, Clone)]
pub struct RestrictedSubagents {
    patterns: Vec<Pattern>,
}

impl RestrictedSubagents {
    /// Compile restriction patterns.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if a pattern is not a valid glob.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    Error::Configuration(format!("invalid sub-agent pattern {p:?}: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    #[must_use]
    pub fn is_restricted(&self, subagent_type: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::default()
        };
        self.patterns
            .iter()
            .any(|p| p.matches_with(subagent_type, options))
    }
}

// ============================================================================
// Paths
// ============================================================================

/// Resolve `path` against `cwd` and fold `.` and `..` without touching disk.
#[must_use]
pub fn normalize_path(path: &Path, cwd: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Whether `path` lies under one of the safe scratch directories.
#[must_use]
pub fn is_safe_temp_path(path: &Path, cwd: &Path, prefixes: &[PathBuf]) -> bool {
    let path = normalize_path(path, cwd);
    prefixes.iter().any(|prefix| path.starts_with(prefix))
}

/// Whether a shell command mentions one of the hydrator's context files.
///
/// Only says the file is named. Callers decide whether the command is
/// otherwise harmless.
#[must_use]
pub fn mentions_hydration_file(command: &str, hydration_dir: &Path, file_prefix: &str) -> bool {
    let needle = hydration_dir.join(file_prefix);
    command.contains(needle.to_string_lossy().as_ref())
}

// ============================================================================
// Sub-agent output
// ============================================================================

static WORKFLOW_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\*\*workflows?\*\*\s*:?\s*\[\[(?:workflows/)?([a-z0-9][a-z0-9_.-]*)\]\]").ok()
});

static INTENT_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*\*\*intent\*\*\s*:\s*(.+)$").ok());

static APPROVAL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(PROCEED|APPROVED?)\b").ok());

/// Longest intent kept in state.
const MAX_INTENT_LEN: usize = 500;

/// Workflow id announced in hydrator output (`**Workflow**: [[workflows/x]]`).
#[must_use]
pub fn extract_workflow(text: &str) -> Option<String> {
    WORKFLOW_RE
        .as_ref()?
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Intent line from hydrator output, else its first non-empty line.
#[must_use]
pub fn extract_intent(text: &str) -> Option<String> {
    let line = INTENT_RE
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .or_else(|| text.lines().map(str::trim).find(|l| !l.is_empty()))?;
    Some(line.chars().take(MAX_INTENT_LEN).collect())
}

/// Whether critic output approves the plan.
#[must_use]
pub fn critic_approves(text: &str) -> bool {
    APPROVAL_RE.as_ref().is_some_and(|re| re.is_match(text))
}
