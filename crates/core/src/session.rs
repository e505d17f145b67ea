//! Append-only chat log persisted as a pretty-printed JSON array.
//!
//! Every append rewrites the whole file through a sibling temp file and a
//! rename, so a reader never sees a half-written log. Appends are serialized
//! by one mutex held across the push and the write.

use crate::error::{RagError, Result};
use crate::models::ChatTurn;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

#[derive(Debug)]
struct SessionLog {
    turns: Vec<ChatTurn>,
    /// Number of leading turns known to be on disk.
    persisted: usize,
}

#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    log: Mutex<SessionLog>,
    /// Where an unreadable log was moved by [`load_or_empty`](Self::load_or_empty).
    set_aside: Option<PathBuf>,
}

impl SessionStore {
    /// Reads the log at `path`. Missing or blank files give an empty log;
    /// unparseable content is a [`RagError::Persistence`].
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let turns = read_turns(&path).await?;
        debug!(path = %path.display(), turns = turns.len(), "loaded chat history");

        Ok(Self::with_turns(path, turns))
    }

    /// Same as [`load`](Self::load) but starts empty when the file is corrupt.
    ///
    /// The unreadable file is renamed to `<path>.corrupt` so later appends
    /// cannot overwrite it; [`set_aside`](Self::set_aside) reports the new
    /// location. Fails only when that rename fails.
    pub async fn load_or_empty(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let err = match read_turns(&path).await {
            Ok(turns) => return Ok(Self::with_turns(path, turns)),
            Err(err) => err,
        };

        let backup = sibling(&path, ".corrupt");
        tokio::fs::rename(&path, &backup).await.map_err(|rename_err| {
            RagError::Persistence(format!(
                "{err}; moving it to {} also failed: {rename_err}",
                backup.display()
            ))
        })?;
        warn!(
            path = %path.display(),
            backup = %backup.display(),
            error = %err,
            "chat history unreadable, starting empty"
        );

        let mut store = Self::with_turns(path, Vec::new());
        store.set_aside = Some(backup);
        Ok(store)
    }

    fn with_turns(path: PathBuf, turns: Vec<ChatTurn>) -> Self {
        let persisted = turns.len();
        Self {
            path,
            log: Mutex::new(SessionLog { turns, persisted }),
            set_aside: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_aside(&self) -> Option<&Path> {
        self.set_aside.as_deref()
    }

    /// Adds `turn` and persists the full log.
    ///
    /// When the write fails the turn stays in memory, unsynced, and the error
    /// is returned. The next append or [`flush`](Self::flush) writes it out.
    pub async fn append(&self, turn: ChatTurn) -> Result<()> {
        let mut log = self.log.lock().await;
        log.turns.push(turn);
        self.persist(&mut log).await
    }

    /// Retries persisting turns left unsynced by a failed append.
    pub async fn flush(&self) -> Result<()> {
        let mut log = self.log.lock().await;
        if log.persisted == log.turns.len() {
            return Ok(());
        }
        self.persist(&mut log).await
    }

    pub async fn turns(&self) -> Vec<ChatTurn> {
        self.log.lock().await.turns.clone()
    }

    /// The last `limit` turns, oldest first. `0` returns everything.
    pub async fn recent(&self, limit: usize) -> Vec<ChatTurn> {
        let log = self.log.lock().await;
        let skip = if limit == 0 {
            0
        } else {
            log.turns.len().saturating_sub(limit)
        };
        log.turns[skip..].to_vec()
    }

    pub async fn len(&self) -> usize {
        self.log.lock().await.turns.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.log.lock().await.turns.is_empty()
    }

    pub async fn unsynced(&self) -> usize {
        let log = self.log.lock().await;
        log.turns.len() - log.persisted
    }

    async fn persist(&self, log: &mut SessionLog) -> Result<()> {
        match write_turns(&self.path, &log.turns).await {
            Ok(()) => {
                log.persisted = log.turns.len();
                Ok(())
            }
            Err(err) => {
                error!(
                    path = %self.path.display(),
                    unsynced = log.turns.len() - log.persisted,
                    error = %err,
                    "failed to persist chat history"
                );
                Err(err)
            }
        }
    }
}

async fn read_turns(path: &Path) -> Result<Vec<ChatTurn>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(RagError::Persistence(format!(
                "reading {}: {err}",
                path.display()
            )))
        }
    };

    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(&raw).map_err(|err| {
        RagError::Persistence(format!("parsing {}: {err}", path.display()))
    })
}

async fn write_turns(path: &Path, turns: &[ChatTurn]) -> Result<()> {
    let payload = serde_json::to_string_pretty(turns)
        .map_err(|err| RagError::Persistence(format!("serializing chat history: {err}")))?;

    let staging = sibling(path, ".tmp");

    tokio::fs::write(&staging, payload).await.map_err(|err| {
        RagError::Persistence(format!("writing {}: {err}", staging.display()))
    })?;
    tokio::fs::rename(&staging, path).await.map_err(|err| {
        RagError::Persistence(format!("replacing {}: {err}", path.display()))
    })
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
