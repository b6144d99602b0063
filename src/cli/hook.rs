//! `turnstile hook` command implementation.

use crate::cli::open_store;
use crate::config::Config;
use crate::core::{GateRegistry, GateResult, HookEvent};
use crate::error::Result;
use crate::hooks::{AmbientEnv, Host, HookInput, HookResponse, resolve_session_id, run_gate};
use std::io::{self, Read, Write};

/// Run a hook command.
///
/// Reads the host payload from stdin, evaluates it and writes the host
/// envelope to stdout. Returns the process exit code.
///
/// # Errors
///
/// Returns an error if stdin cannot be read or stdout cannot be written.
pub fn run(event: Option<&str>, host: Host, config: &Config, registry: &GateRegistry) -> Result<u8> {
    let mut raw = String::new();
    io::stdin().read_to_string(&mut raw)?;

    let response = handle(&raw, event, host, config, registry, &AmbientEnv::capture());

    let mut stdout = io::stdout();
    stdout.write_all(response.body.as_bytes())?;
    stdout.write_all(b"\n")?;
    if let Some(message) = &response.stderr {
        eprintln!("{message}");
    }
    Ok(response.exit_code)
}

/// Evaluate one raw hook payload. Never fails: anything that goes wrong
/// before a decision is made lets the call through.
pub fn handle(
    raw: &str,
    event: Option<&str>,
    host: Host,
    config: &Config,
    registry: &GateRegistry,
    env: &AmbientEnv,
) -> HookResponse {
    let input = if raw.trim().is_empty() {
        HookInput::default()
    } else {
        match serde_json::from_str::<HookInput>(raw) {
            Ok(input) => input,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse hook input");
                return fallback(event, host);
            }
        }
    };

    let event = match input.resolve_event(event) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "cannot determine hook event");
            return fallback(None, host);
        }
    };

    let project = input.project_root(env);
    let session_id = match resolve_session_id(&input, event, env, &config.storage.path, &project) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "cannot determine session id");
            return HookResponse::render(host, event, &GateResult::degraded(&e));
        }
    };

    let store = match open_store(config, &project) {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!(error = %e, session = %session_id, "storage init failed");
            return HookResponse::render(host, event, &GateResult::degraded(&e));
        }
    };

    let ctx = input.into_context(&session_id, event, env);
    let result = run_gate(&ctx, registry, &store);
    HookResponse::render(host, event, &result)
}

/// Allow without state, for payloads we could not interpret.
fn fallback(event: Option<&str>, host: Host) -> HookResponse {
    match event.and_then(HookEvent::from_name) {
        Some(event) => HookResponse::allow(host, event),
        None => HookResponse {
            body: "{}".to_string(),
            stderr: None,
            exit_code: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SessionStore;
    use serde_json::Value;
    use tempfile::TempDir;

    fn setup() -> (Config, GateRegistry, TempDir) {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.path = temp.path().to_path_buf();
        let registry = GateRegistry::new(&config).unwrap();
        (config, registry, temp)
    }

    fn env() -> AmbientEnv {
        AmbientEnv {
            project_dir: Some("/work/project".into()),
            ..AmbientEnv::default()
        }
    }

    fn body(response: &HookResponse) -> Value {
        serde_json::from_str(&response.body).unwrap()
    }

    #[test]
    fn malformed_input_fails_open() {
        let (config, registry, _temp) = setup();
        let response = handle(
            "{not json",
            Some("pre-tool-use"),
            Host::Claude,
            &config,
            &registry,
            &env(),
        );
        assert_eq!(response.exit_code, 0);
        assert_eq!(
            body(&response)["hookSpecificOutput"]["permissionDecision"],
            "allow"
        );
    }

    #[test]
    fn unknown_event_fails_open() {
        let (config, registry, _temp) = setup();
        let response = handle(
            r#"{"session_id": "s", "hook_event_name": "Notification"}"#,
            None,
            Host::Claude,
            &config,
            &registry,
            &env(),
        );
        assert_eq!(response.body, "{}");
    }

    #[test]
    fn unhydrated_write_denied_for_claude() {
        let (config, registry, _temp) = setup();
        let raw = r#"{
            "session_id": "s1",
            "cwd": "/work/project",
            "tool_name": "Write",
            "tool_input": {"file_path": "/work/project/a.rs", "content": "x"}
        }"#;
        let response = handle(raw, Some("PreToolUse"), Host::Claude, &config, &registry, &env());
        let json = body(&response);
        assert_eq!(json["hookSpecificOutput"]["permissionDecision"], "deny");
        assert!(
            json["hookSpecificOutput"]["permissionDecisionReason"]
                .as_str()
                .unwrap()
                .contains("prompt-hydrator")
        );
    }

    #[test]
    fn gemini_deny_uses_exit_code() {
        let (config, registry, _temp) = setup();
        let raw = r#"{
            "session_id": "s2",
            "hook_event_name": "BeforeTool",
            "tool_name": "write_file",
            "tool_input": {"file_path": "/work/project/a.rs"}
        }"#;
        let response = handle(raw, None, Host::Gemini, &config, &registry, &env());
        assert_eq!(response.exit_code, 2);
        assert!(response.stderr.unwrap().contains("Hydration required"));
    }

    #[test]
    fn state_is_scoped_to_project() {
        let (config, registry, _temp) = setup();
        let raw = r#"{"session_id": "s3", "tool_name": "Edit", "tool_input": {"file_path": "/x"}}"#;
        handle(raw, Some("post-tool-use"), Host::Claude, &config, &registry, &env());

        let store = open_store(&config, std::path::Path::new("/work/project")).unwrap();
        let state = store.load("s3").unwrap().unwrap();
        assert_eq!(state.ops_since_compliance(), 1);

        let other = open_store(&config, std::path::Path::new("/work/other")).unwrap();
        assert!(other.load("s3").unwrap().is_none());
    }
}
