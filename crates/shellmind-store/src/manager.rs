//! The Conversation Store — `spec.md` §4.F.
//!
//! Persists the active session, a ring of recent sessions, user-named saved
//! sessions, and explicit archives as one JSON file each under a
//! configurable root. Resolved byte-for-byte against
//! `examples/original_source/src/conversation_manager.py`.

use chrono::Utc;
use tracing::{instrument, warn};

use shellmind_core::Session;

use crate::db::{self, Layout};
use crate::error::{Result, StoreError};
use crate::types::ConversationEntry;

pub struct ConversationStore {
    layout: Layout,
    max_recent: usize,
    auto_save_interval: u32,
    interaction_count: u32,
    /// Incognito sessions bypass every persistence operation.
    incognito: bool,
}

impl ConversationStore {
    pub fn new(storage_path: &str, max_recent: usize, auto_save_interval: u32, incognito: bool) -> Result<Self> {
        Ok(Self {
            layout: Layout::new(storage_path)?,
            max_recent,
            auto_save_interval: auto_save_interval.max(1),
            interaction_count: 0,
            incognito,
        })
    }

    /// On startup: if the active file exists, has messages, and was updated
    /// within the last 24 hours, return it so the caller can prompt the
    /// user to resume. Never called in incognito mode.
    #[instrument(skip(self))]
    pub fn resumable_session(&self) -> Result<Option<Session>> {
        let Some(session) = db::read_session(&self.layout.active)? else {
            return Ok(None);
        };
        if session.messages.is_empty() {
            return Ok(None);
        }
        let hours_ago = (Utc::now() - session.last_updated).num_minutes() as f64 / 60.0;
        if hours_ago > 24.0 {
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Flip persistence on or off at runtime — wired to the `/inc` slash
    /// command, which can enter or leave incognito mode mid-session.
    pub fn set_incognito(&mut self, incognito: bool) {
        self.incognito = incognito;
    }

    /// Called after every turn. Bumps the interaction counter and writes
    /// `active.json` once `auto_save_interval` interactions have elapsed.
    #[instrument(skip(self, session))]
    pub fn record_turn(&mut self, session: &Session) -> Result<()> {
        self.interaction_count += 1;
        if self.interaction_count % self.auto_save_interval == 0 {
            self.save_active(session)?;
        }
        Ok(())
    }

    pub fn save_active(&self, session: &Session) -> Result<()> {
        if self.incognito {
            return Ok(());
        }
        if let Err(e) = db::write_session(&self.layout.active, session) {
            warn!(error = %e, "could not auto-save active session");
            return Err(e);
        }
        Ok(())
    }

    /// Save the current session under a user-chosen name. Returns `Ok(false)`
    /// without writing when the name already exists and `overwrite` is
    /// false, so the caller can prompt for confirmation.
    #[instrument(skip(self, session))]
    pub fn save_named(&self, session: &Session, name: &str, overwrite: bool) -> Result<bool> {
        if self.incognito {
            return Ok(false);
        }
        if session.messages.is_empty() {
            return Err(StoreError::Empty);
        }
        let safe_name = db::sanitize_name(name);
        let path = self.layout.saved.join(format!("{safe_name}.json"));
        if path.exists() && !overwrite {
            return Ok(false);
        }
        let mut to_save = session.clone();
        to_save.status = shellmind_core::SessionStatus::Saved;
        db::write_session(&path, &to_save)?;
        Ok(true)
    }

    #[instrument(skip(self))]
    pub fn load_named(&self, name: &str) -> Result<Session> {
        let safe_name = db::sanitize_name(name);
        let path = self.layout.saved.join(format!("{safe_name}.json"));
        let mut session = db::read_session(&path)?.ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        session.status = shellmind_core::SessionStatus::Loaded;
        session.last_updated = Utc::now();
        session.last_used = Utc::now();
        Ok(session)
    }

    /// Load a recent conversation by its 1-based position in
    /// `list_recent`'s ordering (newest first).
    #[instrument(skip(self))]
    pub fn load_recent_by_index(&self, index: usize) -> Result<Session> {
        let files = db::list_json_files_by_mtime(&self.layout.recent)?;
        if index == 0 || index > files.len() {
            return Err(StoreError::InvalidIndex {
                index,
                count: files.len(),
            });
        }
        let path = &files[index - 1];
        let mut session =
            db::read_session(path)?.ok_or_else(|| StoreError::NotFound(format!("recent #{index}")))?;
        session.status = shellmind_core::SessionStatus::Loaded;
        session.last_updated = Utc::now();
        session.last_used = Utc::now();
        Ok(session)
    }

    pub fn list_saved(&self) -> Result<Vec<ConversationEntry>> {
        self.list_dir(&self.layout.saved, |path| {
            path.file_stem().and_then(|s| s.to_str()).unwrap_or("?").to_string()
        })
    }

    pub fn list_recent(&self) -> Result<Vec<ConversationEntry>> {
        self.list_dir(&self.layout.recent, |path| {
            path.file_stem().and_then(|s| s.to_str()).unwrap_or("?").to_string()
        })
    }

    fn list_dir(
        &self,
        dir: &std::path::Path,
        name_of: impl Fn(&std::path::Path) -> String,
    ) -> Result<Vec<ConversationEntry>> {
        let files = db::list_json_files_by_mtime(dir)?;
        let mut out = Vec::with_capacity(files.len());
        for path in &files {
            if let Some(session) = db::read_session(path)? {
                out.push(ConversationEntry {
                    name: name_of(path),
                    last_used: session.last_used,
                    summary: session.summary.unwrap_or_else(|| session.derive_summary()),
                    message_count: session.messages.len(),
                });
            }
        }
        Ok(out)
    }

    /// Move `session` into the `recent/` ring (keyed by session id) and
    /// enforce `max_recent` by deleting the oldest files beyond the cap.
    #[instrument(skip(self, session))]
    pub fn move_to_recent(&self, session: &Session) -> Result<()> {
        if self.incognito || session.messages.is_empty() {
            return Ok(());
        }
        let mut to_store = session.clone();
        to_store.status = shellmind_core::SessionStatus::Recent;
        let path = self.layout.recent.join(format!("{}.json", session.id));
        db::write_session(&path, &to_store)?;

        let files = db::list_json_files_by_mtime(&self.layout.recent)?;
        for stale in files.into_iter().skip(self.max_recent) {
            if let Err(e) = std::fs::remove_file(&stale) {
                warn!(path = ?stale, error = %e, "could not delete old recent conversation");
            }
        }
        Ok(())
    }

    /// Move `session` to `archive/` and clear the active file.
    #[instrument(skip(self, session))]
    pub fn archive(&self, session: &Session) -> Result<()> {
        if self.incognito {
            return Ok(());
        }
        let mut to_store = session.clone();
        to_store.status = shellmind_core::SessionStatus::Archived;
        let path = self.layout.archive.join(format!("{}.json", session.id));
        db::write_session(&path, &to_store)?;
        self.clear_active_file()
    }

    pub fn delete_named(&self, name: &str) -> Result<()> {
        let safe_name = db::sanitize_name(name);
        let path = self.layout.saved.join(format!("{safe_name}.json"));
        if !path.exists() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        std::fs::remove_file(&path)?;
        Ok(())
    }

    /// Deletes `active.json` if present. Called on clean exit and on
    /// `/clear`/`/archive`.
    pub fn clear_active_file(&self) -> Result<()> {
        if self.layout.active.exists() {
            std::fs::remove_file(&self.layout.active)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellmind_core::{Message, Role};
    use tempfile::tempdir;

    fn session_with_one_user_message(id: &str) -> Session {
        let mut s = Session::new(id);
        s.messages.push(Message::plain(Role::User, "hello there"));
        s
    }

    #[test]
    fn save_and_load_named_round_trips() {
        let dir = tempdir().unwrap();
        let store =
            ConversationStore::new(dir.path().to_str().unwrap(), 10, 1, false).unwrap();
        let session = session_with_one_user_message("s1");
        assert!(store.save_named(&session, "My Trip!", false).unwrap());
        let loaded = store.load_named("My Trip!").unwrap();
        assert_eq!(loaded.messages.len(), 1);
    }

    #[test]
    fn save_named_without_overwrite_refuses_existing() {
        let dir = tempdir().unwrap();
        let store =
            ConversationStore::new(dir.path().to_str().unwrap(), 10, 1, false).unwrap();
        let session = session_with_one_user_message("s1");
        assert!(store.save_named(&session, "dup", false).unwrap());
        assert!(!store.save_named(&session, "dup", false).unwrap());
        assert!(store.save_named(&session, "dup", true).unwrap());
    }

    #[test]
    fn incognito_store_never_writes() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path().to_str().unwrap(), 10, 1, true).unwrap();
        let session = session_with_one_user_message("s1");
        store.save_active(&session).unwrap();
        assert!(!dir.path().join("active.json").exists());
    }

    #[test]
    fn recent_ring_is_bounded_by_max_recent() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path().to_str().unwrap(), 2, 1, false).unwrap();
        for i in 0..5 {
            let session = session_with_one_user_message(&format!("s{i}"));
            store.move_to_recent(&session).unwrap();
        }
        let recent = store.list_recent().unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn auto_save_fires_on_interval() {
        let dir = tempdir().unwrap();
        let mut store = ConversationStore::new(dir.path().to_str().unwrap(), 10, 3, false).unwrap();
        let session = session_with_one_user_message("s1");
        store.record_turn(&session).unwrap();
        store.record_turn(&session).unwrap();
        assert!(!dir.path().join("active.json").exists());
        store.record_turn(&session).unwrap();
        assert!(dir.path().join("active.json").exists());
    }
}
