//! Durable resume breadcrumbs
//!
//! A breadcrumb is a small marker written at join time so a fully
//! restarted client can rediscover an in-progress call. Breadcrumbs are
//! advisory only: the controller always revalidates against the
//! persistence service before resuming one.

use crate::error::CallError;
use crate::session::Participant;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Minimal resume record, keyed by room id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeBreadcrumb {
    /// Room the call belongs to
    pub room_id: String,
    /// Server-issued session id, if one had been obtained
    pub session_id: Option<String>,
    /// Local participant identity at join time
    pub participant: Participant,
    /// When the breadcrumb was written
    pub saved_at: DateTime<Utc>,
}

/// Durable store for resume breadcrumbs
pub trait BreadcrumbStore: Send + Sync {
    /// Write (or overwrite) the breadcrumb for its room
    fn save(&self, breadcrumb: &ResumeBreadcrumb) -> Result<(), CallError>;

    /// Read the breadcrumb for a room, if present
    fn load(&self, room_id: &str) -> Result<Option<ResumeBreadcrumb>, CallError>;

    /// Remove the breadcrumb for a room
    fn clear(&self, room_id: &str) -> Result<(), CallError>;

    /// All breadcrumbs, most recently saved first
    ///
    /// Called on every fresh mount before anything else happens.
    fn scan(&self) -> Result<Vec<ResumeBreadcrumb>, CallError>;
}

/// File-backed breadcrumb store: one JSON document per room id
///
/// Survives a full client restart, which is the point of the breadcrumb.
#[derive(Debug)]
pub struct FileBreadcrumbStore {
    dir: PathBuf,
}

impl FileBreadcrumbStore {
    /// Create a store rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CallError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CallError::PersistenceWrite {
            operation: "breadcrumb-init".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, room_id: &str) -> PathBuf {
        // Room ids come from the server but keep the filename safe anyway
        let safe: String = room_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl BreadcrumbStore for FileBreadcrumbStore {
    fn save(&self, breadcrumb: &ResumeBreadcrumb) -> Result<(), CallError> {
        let path = self.path_for(&breadcrumb.room_id);
        let json = serde_json::to_vec_pretty(breadcrumb).map_err(|e| CallError::PersistenceWrite {
            operation: "breadcrumb-save".to_string(),
            reason: e.to_string(),
        })?;
        fs::write(&path, json).map_err(|e| CallError::PersistenceWrite {
            operation: "breadcrumb-save".to_string(),
            reason: e.to_string(),
        })?;
        debug!(room_id = %breadcrumb.room_id, path = %path.display(), "Saved resume breadcrumb");
        Ok(())
    }

    fn load(&self, room_id: &str) -> Result<Option<ResumeBreadcrumb>, CallError> {
        let path = self.path_for(room_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CallError::PersistenceWrite {
                    operation: "breadcrumb-load".to_string(),
                    reason: e.to_string(),
                })
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(breadcrumb) => Ok(Some(breadcrumb)),
            Err(e) => {
                // A corrupt breadcrumb is not worth failing a join over
                warn!(room_id, error = %e, "Discarding unreadable breadcrumb");
                let _ = fs::remove_file(&path);
                Ok(None)
            }
        }
    }

    fn clear(&self, room_id: &str) -> Result<(), CallError> {
        let path = self.path_for(room_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CallError::PersistenceWrite {
                operation: "breadcrumb-clear".to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn scan(&self) -> Result<Vec<ResumeBreadcrumb>, CallError> {
        let mut found = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| CallError::PersistenceWrite {
            operation: "breadcrumb-scan".to_string(),
            reason: e.to_string(),
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Ok(bytes) = fs::read(&path) {
                    if let Ok(breadcrumb) = serde_json::from_slice::<ResumeBreadcrumb>(&bytes) {
                        found.push(breadcrumb);
                    }
                }
            }
        }
        found.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(found)
    }
}

/// In-memory breadcrumb store for tests
#[derive(Debug, Default)]
pub struct InMemoryBreadcrumbStore {
    crumbs: RwLock<HashMap<String, ResumeBreadcrumb>>,
}

impl InMemoryBreadcrumbStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl BreadcrumbStore for InMemoryBreadcrumbStore {
    fn save(&self, breadcrumb: &ResumeBreadcrumb) -> Result<(), CallError> {
        self.crumbs
            .write()
            .insert(breadcrumb.room_id.clone(), breadcrumb.clone());
        Ok(())
    }

    fn load(&self, room_id: &str) -> Result<Option<ResumeBreadcrumb>, CallError> {
        Ok(self.crumbs.read().get(room_id).cloned())
    }

    fn clear(&self, room_id: &str) -> Result<(), CallError> {
        self.crumbs.write().remove(room_id);
        Ok(())
    }

    fn scan(&self) -> Result<Vec<ResumeBreadcrumb>, CallError> {
        let mut found: Vec<_> = self.crumbs.read().values().cloned().collect();
        found.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(found)
    }
}
