//! Usage: Durable session state (access/refresh tokens + user identity).

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::shared::lock_ext::RwLockExt;

/// Snapshot of the authenticated session. An absent `access_token` means the
/// caller is unauthenticated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.access_token
            .as_deref()
            .map(str::trim)
            .is_some_and(|v| !v.is_empty())
    }

    fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.user.is_none()
    }
}

/// Process-wide session store. Writes go to disk when a path is configured;
/// storage faults are logged and never fail the caller, so the session stays
/// usable for the current process lifetime.
#[derive(Debug)]
pub struct SessionStore {
    inner: RwLock<Session>,
    path: Option<PathBuf>,
}

impl SessionStore {
    /// In-memory store; nothing survives the process.
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Session::default()),
            path: None,
        }
    }

    /// Store backed by a JSON file. A missing or unreadable file yields an
    /// empty session rather than an error.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let session = read_session_file(&path);
        Self {
            inner: RwLock::new(session),
            path: Some(path),
        }
    }

    pub fn get(&self) -> Session {
        self.inner.read_or_recover().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read_or_recover().is_authenticated()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .read_or_recover()
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner
            .read_or_recover()
            .refresh_token
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn set(&self, session: Session) {
        {
            let mut guard = self.inner.write_or_recover();
            *guard = session.clone();
        }
        self.persist(&session);
    }

    /// Replaces the tokens after a successful refresh, keeping the user
    /// record. The rotated refresh token is adopted only when present.
    pub(crate) fn apply_refresh(&self, access_token: String, rotated_refresh: Option<String>) {
        let updated = {
            let mut guard = self.inner.write_or_recover();
            guard.access_token = Some(access_token);
            if let Some(rotated) = rotated_refresh {
                guard.refresh_token = Some(rotated);
            }
            guard.clone()
        };
        self.persist(&updated);
    }

    /// Clears all session fields. Returns whether anything was stored.
    pub fn clear(&self) -> bool {
        let had_session = {
            let mut guard = self.inner.write_or_recover();
            let had = !guard.is_empty();
            *guard = Session::default();
            had
        };
        if had_session {
            self.persist(&Session::default());
        }
        had_session
    }

    fn persist(&self, session: &Session) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        if let Err(err) = write_session_file(path, session) {
            tracing::warn!(
                path = %path.display(),
                "session persist failed; session stays usable in memory: {err}"
            );
        }
    }
}

fn read_session_file(path: &Path) -> Session {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Session::default(),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                "session file unreadable; starting unauthenticated: {err}"
            );
            return Session::default();
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                "session file corrupt; starting unauthenticated: {err}"
            );
            Session::default()
        }
    }
}

fn write_session_file(path: &Path, session: &Session) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create session dir: {e}"))?;
        }
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("session.json");
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));
    let backup_path = path.with_file_name(format!("{file_name}.bak"));

    let content = serde_json::to_vec_pretty(session)
        .map_err(|e| format!("failed to serialize session: {e}"))?;

    std::fs::write(&tmp_path, content)
        .map_err(|e| format!("failed to write temp session file: {e}"))?;

    if backup_path.exists() {
        let _ = std::fs::remove_file(&backup_path);
    }

    if path.exists() {
        std::fs::rename(path, &backup_path)
            .map_err(|e| format!("failed to create session backup: {e}"))?;
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::rename(&backup_path, path);
        return Err(format!("failed to finalize session file: {e}"));
    }

    if backup_path.exists() {
        let _ = std::fs::remove_file(&backup_path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_session() -> Session {
        Session {
            access_token: Some("T1".to_string()),
            refresh_token: Some("R1".to_string()),
            user: Some(json!({"id": 7, "email": "a@b.c"})),
        }
    }

    #[test]
    fn in_memory_set_get_clear() {
        let store = SessionStore::in_memory();
        assert!(!store.is_authenticated());
        assert!(!store.clear());

        store.set(sample_session());
        assert!(store.is_authenticated());
        assert_eq!(store.access_token().as_deref(), Some("T1"));
        assert_eq!(store.refresh_token().as_deref(), Some("R1"));

        assert!(store.clear());
        assert_eq!(store.get(), Session::default());
        // Second clear has nothing left to remove.
        assert!(!store.clear());
    }

    #[test]
    fn blank_tokens_count_as_absent() {
        let store = SessionStore::in_memory();
        store.set(Session {
            access_token: Some("   ".to_string()),
            refresh_token: Some(String::new()),
            user: None,
        });
        assert!(!store.is_authenticated());
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
    }

    #[test]
    fn apply_refresh_keeps_user_and_old_refresh_token() {
        let store = SessionStore::in_memory();
        store.set(sample_session());

        store.apply_refresh("T2".to_string(), None);
        let session = store.get();
        assert_eq!(session.access_token.as_deref(), Some("T2"));
        assert_eq!(session.refresh_token.as_deref(), Some("R1"));
        assert_eq!(session.user, Some(json!({"id": 7, "email": "a@b.c"})));

        store.apply_refresh("T3".to_string(), Some("R2".to_string()));
        let session = store.get();
        assert_eq!(session.access_token.as_deref(), Some("T3"));
        assert_eq!(session.refresh_token.as_deref(), Some("R2"));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");

        let store = SessionStore::open(&path);
        assert!(!store.is_authenticated());
        store.set(sample_session());
        drop(store);

        let reopened = SessionStore::open(&path);
        assert_eq!(reopened.get(), sample_session());

        reopened.clear();
        drop(reopened);
        assert_eq!(SessionStore::open(&path).get(), Session::default());
    }

    #[test]
    fn corrupt_file_starts_unauthenticated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json").expect("write corrupt file");

        let store = SessionStore::open(&path);
        assert_eq!(store.get(), Session::default());
        // The store still works despite the bad file on disk.
        store.set(sample_session());
        assert_eq!(SessionStore::open(&path).get(), sample_session());
    }

    #[test]
    fn unwritable_path_is_non_fatal() {
        let store = SessionStore::open("/proc/definitely/not/writable/session.json");
        store.set(sample_session());
        // Persistence failed, in-memory state is intact.
        assert_eq!(store.get(), sample_session());
    }
}
