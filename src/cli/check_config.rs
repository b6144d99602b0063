//! `turnstile check-config` command implementation.

use crate::config::{Config, GateMode};
use crate::core::{GateRegistry, ToolCategory};
use std::fmt::Write as _;

/// Print the effective configuration.
///
/// The registry has already been built from `config` by the time this runs,
/// so reaching it means the configuration is valid.
pub fn run(config: &Config, registry: &GateRegistry) {
    print!("{}", render(config, registry));
}

fn render(config: &Config, registry: &GateRegistry) -> String {
    let policy = registry.policy();
    let mut out = String::new();

    let _ = writeln!(out, "Configuration OK");
    let _ = writeln!(out, "Home: {}", config.storage.path.display());
    let _ = writeln!(out, "Lock timeout: {}ms", config.storage.lock_timeout_ms);
    let _ = writeln!(out);

    for category in ToolCategory::ALL {
        let tools = policy.taxonomy.tools_in(category);
        let _ = writeln!(out, "[{category}] {} tool(s)", tools.len());
        for tool in tools {
            let _ = writeln!(out, "  {tool}");
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Compliance threshold: {}", policy.compliance_threshold);
    for (workflow, threshold) in &policy.workflow_thresholds {
        let _ = writeln!(out, "  {workflow}: {threshold}");
    }
    let _ = writeln!(out, "Bypass prefix: {:?}", policy.bypass_prefix);
    let _ = writeln!(
        out,
        "Modes: hydration={} critic={} task_binding={} compliance={}",
        mode_name(policy.modes.hydration),
        mode_name(policy.modes.critic),
        mode_name(policy.modes.task_binding),
        mode_name(policy.modes.compliance)
    );
    let _ = writeln!(out, "Restricted sub-agents: {}", config.subagents.restricted.join(", "));
    let _ = writeln!(out, "Trace limit: {} events", policy.max_events);

    out
}

fn mode_name(mode: GateMode) -> &'static str {
    match mode {
        GateMode::Block => "block",
        GateMode::Warn => "warn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn report_lists_categories_and_thresholds() {
        let config = Config::default();
        let registry = GateRegistry::new(&config).unwrap();
        let out = render(&config, &registry);

        assert!(out.starts_with("Configuration OK"));
        assert!(out.contains("[mutating]"));
        assert!(out.contains("  Write\n"));
        assert!(out.contains("[spawn]"));
        assert!(out.contains("Compliance threshold: 7"));
        assert!(out.contains("  simple-question: 15"));
        assert!(out.contains("hydration=block"));
    }

    #[test]
    fn report_reflects_overrides() {
        let config = parse_config(
            r#"
[gates]
compliance_threshold = 3

[gates.modes]
task_binding = "warn"
"#,
        )
        .unwrap();
        let registry = GateRegistry::new(&config).unwrap();
        let out = render(&config, &registry);

        assert!(out.contains("Compliance threshold: 3"));
        assert!(out.contains("task_binding=warn"));
    }
}
