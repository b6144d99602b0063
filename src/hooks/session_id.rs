//! Session id resolution for payloads that do not carry one.

use crate::core::HookEvent;
use crate::error::{Error, Result};
use crate::hooks::input::{AmbientEnv, HookInput};
use crate::storage::project_hash;
use fs_err as fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// File holding the fallback session id for one project.
const CURRENT_SESSION_FILE: &str = "current-session";

/// Resolve the session id.
///
/// Order: payload, host environment, a hash of the transcript path, then a
/// per-project id persisted under `<home>/sessions/<project-hash>/`.
/// `SessionStart` replaces the persisted id, so each new session of the
/// project gets fresh state.
///
/// # Errors
///
/// Returns an error only if the fallback id file cannot be read or written.
pub fn resolve_session_id(
    input: &HookInput,
    event: HookEvent,
    env: &AmbientEnv,
    home: &Path,
    project_root: &Path,
) -> Result<String> {
    if let Some(id) = input
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    {
        return Ok(id.to_string());
    }
    if let Some(id) = &env.session_id {
        return Ok(id.clone());
    }
    if let Some(transcript) = &input.transcript_path {
        return Ok(format!("transcript-{}", project_hash(transcript)));
    }
    persisted_session_id(home, project_root, event == HookEvent::SessionStart)
}

fn persisted_session_id(home: &Path, project_root: &Path, rotate: bool) -> Result<String> {
    let dir = home.join("sessions").join(project_hash(project_root));
    let path = dir.join(CURRENT_SESSION_FILE);

    if !rotate {
        match fs::read_to_string(&path) {
            Ok(id) if !id.trim().is_empty() => return Ok(id.trim().to_string()),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    let id = Uuid::new_v4().to_string();
    fs::create_dir_all(&dir)?;
    let mut temp = NamedTempFile::new_in(&dir)?;
    temp.write_all(id.as_bytes())?;
    temp.persist(&path).map_err(|e| Error::Storage(e.error))?;
    tracing::info!(session = %id, project = %project_root.display(), rotate, "generated session id");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn payload_wins() {
        let temp = TempDir::new().unwrap();
        let input = HookInput {
            session_id: Some("from-payload".to_string()),
            ..HookInput::default()
        };
        let env = AmbientEnv {
            session_id: Some("from-env".to_string()),
            ..AmbientEnv::default()
        };
        let id = resolve_session_id(&input, HookEvent::PreToolUse, &env, temp.path(), Path::new("/p")).unwrap();
        assert_eq!(id, "from-payload");
    }

    #[test]
    fn environment_then_transcript() {
        let temp = TempDir::new().unwrap();
        let env = AmbientEnv {
            session_id: Some("from-env".to_string()),
            ..AmbientEnv::default()
        };
        let input = HookInput {
            transcript_path: Some(PathBuf::from("/t/abc.jsonl")),
            ..HookInput::default()
        };
        assert_eq!(
            resolve_session_id(&input, HookEvent::PreToolUse, &env, temp.path(), Path::new("/p")).unwrap(),
            "from-env"
        );

        let id = resolve_session_id(&input, HookEvent::PreToolUse, &AmbientEnv::default(), temp.path(), Path::new("/p"))
            .unwrap();
        assert!(id.starts_with("transcript-"));
        let again =
            resolve_session_id(&input, HookEvent::PreToolUse, &AmbientEnv::default(), temp.path(), Path::new("/p"))
                .unwrap();
        assert_eq!(id, again);
    }

    #[test]
    fn fallback_is_stable_per_project() {
        let temp = TempDir::new().unwrap();
        let input = HookInput::default();
        let env = AmbientEnv::default();
        let first = resolve_session_id(&input, HookEvent::PreToolUse, &env, temp.path(), Path::new("/p")).unwrap();
        let second = resolve_session_id(&input, HookEvent::PreToolUse, &env, temp.path(), Path::new("/p")).unwrap();
        let other = resolve_session_id(&input, HookEvent::PreToolUse, &env, temp.path(), Path::new("/q")).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn session_start_rotates_fallback() {
        let temp = TempDir::new().unwrap();
        let input = HookInput::default();
        let env = AmbientEnv::default();
        let resolve = |event| {
            resolve_session_id(&input, event, &env, temp.path(), Path::new("/p")).unwrap()
        };

        let first = resolve(HookEvent::SessionStart);
        assert_eq!(resolve(HookEvent::PreToolUse), first);

        let second = resolve(HookEvent::SessionStart);
        assert_ne!(first, second);
        assert_eq!(resolve(HookEvent::UserPromptSubmit), second);
    }

    #[test]
    fn session_start_keeps_payload_id() {
        let temp = TempDir::new().unwrap();
        let input = HookInput {
            session_id: Some("from-payload".to_string()),
            ..HookInput::default()
        };
        let id = resolve_session_id(
            &input,
            HookEvent::SessionStart,
            &AmbientEnv::default(),
            temp.path(),
            Path::new("/p"),
        )
        .unwrap();
        assert_eq!(id, "from-payload");
    }
}
