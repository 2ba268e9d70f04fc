use crate::session::data::{SessionData, SessionMeta};
use crate::session::error::SessionError;
use std::fs;
use std::path::PathBuf;
use tracing::error;

/// Maximum number of sessions to keep
const MAX_SESSIONS: usize = 100;

/// Directory-per-session JSON store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    pub(crate) root: PathBuf,
}

impl SessionStore {
    /// Create a SessionStore rooted in the user data directory.
    pub fn new_default() -> Result<Self, SessionError> {
        let base = default_store_dir()?;
        Self::new(base)
    }

    /// Create a SessionStore with the specified path as the root directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            error!(?e, "Failed to create session store directory: {:?}", root);
            SessionError::CreateDirError(e)
        })?;
        Ok(Self { root })
    }

    /// Get metadata for all sessions, newest first.
    pub fn list(&self) -> Result<Vec<SessionMeta>, SessionError> {
        let mut out = Vec::new();
        if !self.root.exists() {
            return Ok(out);
        }
        for entry in fs::read_dir(&self.root).map_err(SessionError::ReadError)? {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let p = entry.path();
            if !p.is_dir() {
                continue;
            }
            let session_p = p.join("session.json");
            if let Ok(s) = fs::read_to_string(&session_p)
                && let Ok(session_data) = serde_json::from_str::<SessionData>(&s)
            {
                out.push(session_data.meta);
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    /// Create a new session and return the session data.
    pub fn create(&self) -> Result<SessionData, SessionError> {
        let data = SessionData::new();
        self.save(&data)?;
        Ok(data)
    }

    /// Load session data by session ID.
    pub fn load(&self, id: &str) -> Result<SessionData, SessionError> {
        if id.is_empty() {
            return Err(SessionError::InvalidId(id.to_string()));
        }
        let dir = self.root.join(id);
        if !dir.exists() {
            return Err(SessionError::NotFound(id.to_string()));
        }

        let session_file = dir.join("session.json");
        let session_s = fs::read_to_string(session_file).map_err(SessionError::ReadError)?;
        let session_data: SessionData = serde_json::from_str(&session_s)?;
        Ok(session_data)
    }

    /// Save the session data. Cleans up old sessions past the retention cap.
    pub fn save(&self, data: &SessionData) -> Result<(), SessionError> {
        let dir = self.root.join(&data.meta.id);
        fs::create_dir_all(&dir).map_err(SessionError::CreateDirError)?;

        let session_file = dir.join("session.json");
        let json_data = serde_json::to_string_pretty(data)?;
        fs::write(&session_file, &json_data).map_err(|e| {
            error!(?e, "Failed to write session data to file: {:?}", session_file);
            SessionError::WriteError(e)
        })?;

        cleanup_old_sessions(self)?;
        Ok(())
    }

    /// Delete session data by session ID.
    pub fn delete(&self, id: &str) -> Result<(), SessionError> {
        if id.is_empty() {
            return Err(SessionError::InvalidId(id.to_string()));
        }
        let dir = self.root.join(id);
        if dir.exists() {
            fs::remove_dir_all(dir).map_err(SessionError::DeleteError)?;
        }
        Ok(())
    }

    /// Get the most recently created session, if any.
    pub fn get_latest(&self) -> Result<Option<SessionData>, SessionError> {
        let sessions = self.list()?;
        if let Some(latest_meta) = sessions.first() {
            let session = self.load(&latest_meta.id)?;
            Ok(Some(session))
        } else {
            Ok(None)
        }
    }
}

fn default_store_dir() -> Result<PathBuf, SessionError> {
    let base = dirs::data_dir().ok_or(SessionError::NoDataDir)?;
    Ok(base.join("scout-chat").join("sessions"))
}

/// Delete the oldest sessions past the retention cap.
fn cleanup_old_sessions(store: &SessionStore) -> Result<(), SessionError> {
    let sessions = store.list()?;
    if sessions.len() > MAX_SESSIONS {
        let excess_count = sessions.len() - MAX_SESSIONS;
        // list() is sorted newest first, so everything past the cap is oldest.
        for session_meta in sessions.iter().skip(MAX_SESSIONS) {
            store.delete(&session_meta.id)?;
        }
        tracing::info!(
            "Cleaned up {} old sessions to maintain limit of {}",
            excess_count,
            MAX_SESSIONS
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::data::ChatTurn;
    use tempfile::tempdir;

    #[test]
    fn test_new() {
        let dir = tempdir().expect("Failed to create temp directory");
        let store = SessionStore::new(dir.path()).expect("Failed to create session store");
        assert_eq!(store.root, dir.path());
        assert!(store.root.exists());
    }

    #[test]
    fn test_list_empty() {
        let dir = tempdir().expect("Failed to create temp directory");
        let store = SessionStore::new(dir.path()).expect("Failed to create session store");
        let sessions = store.list().expect("Failed to list sessions");
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_create_and_list() {
        let dir = tempdir().expect("Failed to create temp directory");
        let store = SessionStore::new(dir.path()).expect("Failed to create session store");

        let session1 = store.create().expect("Failed to create session 1");
        let session2 = store.create().expect("Failed to create session 2");
        let sessions = store.list().expect("Failed to list sessions");
        assert_eq!(sessions.len(), 2);
        let session_ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert!(session_ids.contains(&session1.meta.id.as_str()));
        assert!(session_ids.contains(&session2.meta.id.as_str()));
    }

    #[test]
    fn test_save_and_load_turns_roundtrip() {
        let dir = tempdir().expect("Failed to create temp directory");
        let store = SessionStore::new(dir.path()).expect("Failed to create session store");

        let mut session = store.create().expect("Failed to create session");
        session.append_turn(ChatTurn::user("hello"));
        session.append_turn(ChatTurn::assistant("hi"));
        session.increment_token_count(10);
        session.increment_requests();
        store.save(&session).expect("Failed to save session");

        let loaded = store
            .load(&session.meta.id)
            .expect("Failed to load session");
        assert_eq!(loaded.turns, session.turns);
        assert_eq!(loaded.token_count, 10);
        assert_eq!(loaded.requests, 1);
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().expect("Failed to create temp directory");
        let store = SessionStore::new(dir.path()).expect("Failed to create session store");

        let session = store.create().expect("Failed to create session");
        let session_id = session.meta.id;
        store.delete(&session_id).expect("Failed to delete session");

        let sessions = store.list().expect("Failed to list sessions");
        assert!(sessions.is_empty());
        assert!(store.load(&session_id).is_err());
    }

    #[test]
    fn test_delete_not_found_is_ok() {
        let dir = tempdir().expect("Failed to create temp directory");
        let store = SessionStore::new(dir.path()).expect("Failed to create session store");
        assert!(store.delete("non-existent-id").is_ok());
    }

    #[test]
    fn test_invalid_id() {
        let dir = tempdir().expect("Failed to create temp directory");
        let store = SessionStore::new(dir.path()).expect("Failed to create session store");
        assert!(store.load("").is_err());
        assert!(store.delete("").is_err());
    }

    #[test]
    fn test_get_latest() {
        let dir = tempdir().expect("Failed to create temp directory");
        let store = SessionStore::new(dir.path()).expect("Failed to create session store");

        let latest = store.get_latest().expect("Failed to get latest session");
        assert!(latest.is_none());

        let _session1 = store.create().expect("Failed to create session 1");
        let session2 = store.create().expect("Failed to create session 2");

        let latest = store.get_latest().expect("Failed to get latest session");
        assert_eq!(latest.unwrap().meta.id, session2.meta.id);
    }

    #[test]
    fn test_session_limit_and_cleanup() {
        let dir = tempdir().expect("Failed to create temp directory");
        let store = SessionStore::new(dir.path()).expect("Failed to create session store");

        for _ in 0..MAX_SESSIONS + 5 {
            store.create().expect("Failed to create session");
        }
        // create() saves, and save() prunes back down to the cap.
        let sessions = store.list().expect("Failed to list sessions");
        assert_eq!(sessions.len(), MAX_SESSIONS);
    }
}
