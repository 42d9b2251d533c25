//! Conversation Store
//!
//! Persists one transcript per canonical agent pair and merges new turns into
//! the existing history. The store does no cross-process locking; the tick
//! loop guarantees a single writer per key.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use grid_events::{ConversationKey, ConversationTurn, Transcript};
use tracing::{debug, warn};

use crate::error::PersistenceError;

/// Default directory for transcript files.
pub const DEFAULT_TRANSCRIPT_DIR: &str = "chat_logs";

/// Key to bytes storage for transcripts.
pub trait TranscriptBackend: Send + Sync + 'static {
    /// Raw bytes for `key`, or `None` if nothing was ever stored.
    fn read(&self, key: &ConversationKey) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Replaces the stored bytes. Must be all-or-nothing.
    fn replace(&self, key: &ConversationKey, bytes: &[u8]) -> Result<(), PersistenceError>;

    /// Every key currently stored.
    fn keys(&self) -> Result<Vec<ConversationKey>, PersistenceError>;
}

/// One JSON file per pair, `chat_<first>.<second>.json`, inside a directory.
///
/// Identities never contain '.', so the name maps back to exactly one pair.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &ConversationKey) -> PathBuf {
        self.dir.join(format!("chat_{}.{}.json", key.first(), key.second()))
    }

    fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl TranscriptBackend for FileBackend {
    fn read(&self, key: &ConversationKey) -> Result<Option<Vec<u8>>, PersistenceError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }

    fn replace(&self, key: &ConversationKey, bytes: &[u8]) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir).map_err(|e| Self::io_error(&self.dir, e))?;

        // Write a sibling temp file and rename it over the target so readers
        // see either the old or the new transcript, never a partial one.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let written = write_synced(&tmp, bytes)
            .map_err(|e| Self::io_error(&tmp, e))
            .and_then(|()| fs::rename(&tmp, &path).map_err(|e| Self::io_error(&path, e)));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!("Could not remove {}: {}", tmp.display(), cleanup);
                }
            }
            return Err(e);
        }
        debug!("Wrote transcript {}", path.display());
        Ok(())
    }

    fn keys(&self) -> Result<Vec<ConversationKey>, PersistenceError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_error(&self.dir, e)),
        };

        // The participants stored in the document win over the file name.
        #[derive(serde::Deserialize)]
        struct Header {
            participants: ConversationKey,
        }

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| Self::io_error(&self.dir, e))?.path();
            let is_transcript = path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("chat_"));
            if !is_transcript {
                continue;
            }
            let bytes = fs::read(&path).map_err(|e| Self::io_error(&path, e))?;
            match serde_json::from_slice::<Header>(&bytes) {
                Ok(header) => keys.push(header.participants),
                Err(e) => warn!("Skipping unreadable transcript {}: {}", path.display(), e),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Process-local backend, mostly for tests and offline runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<ConversationKey, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<ConversationKey, Vec<u8>>>, PersistenceError>
    {
        self.entries
            .lock()
            .map_err(|_| PersistenceError::Backend("memory backend lock poisoned".to_string()))
    }
}

impl TranscriptBackend for MemoryBackend {
    fn read(&self, key: &ConversationKey) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn replace(&self, key: &ConversationKey, bytes: &[u8]) -> Result<(), PersistenceError> {
        self.lock()?.insert(key.clone(), bytes.to_vec());
        Ok(())
    }

    fn keys(&self) -> Result<Vec<ConversationKey>, PersistenceError> {
        let mut keys: Vec<_> = self.lock()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// Transcript persistence and merge on top of a [`TranscriptBackend`].
#[derive(Debug)]
pub struct ConversationStore<B> {
    backend: B,
}

impl ConversationStore<FileBackend> {
    /// Store writing JSON files under `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(FileBackend::new(dir))
    }
}

impl ConversationStore<MemoryBackend> {
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }
}

impl<B: TranscriptBackend> ConversationStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The transcript for `key`; empty if nothing was stored yet.
    pub fn load(&self, key: &ConversationKey) -> Result<Transcript, PersistenceError> {
        match self.backend.read(key)? {
            None => Ok(Transcript::empty(key.clone())),
            Some(bytes) => self.decode(key, &bytes),
        }
    }

    /// Appends `new_turns` in order and persists the merged transcript.
    ///
    /// An existing record that cannot be decoded, or that belongs to another
    /// pair, is logged and replaced: the result holds only the new turns.
    pub fn append(
        &self,
        key: &ConversationKey,
        new_turns: Vec<ConversationTurn>,
    ) -> Result<Transcript, PersistenceError> {
        let mut transcript = match self.load(key) {
            Ok(existing) => existing,
            Err(e) if e.is_corrupt_record() => {
                warn!("Discarding transcript: {}. Previous history is lost.", e);
                Transcript::empty(key.clone())
            }
            Err(e) => return Err(e),
        };

        if new_turns.is_empty() {
            return Ok(transcript);
        }

        transcript.extend(new_turns);
        let bytes = serde_json::to_vec_pretty(&transcript).map_err(|source| {
            PersistenceError::Encode {
                key: key.clone(),
                source,
            }
        })?;
        self.backend.replace(key, &bytes)?;
        Ok(transcript)
    }

    /// Keys of every stored transcript, sorted.
    pub fn keys(&self) -> Result<Vec<ConversationKey>, PersistenceError> {
        self.backend.keys()
    }

    fn decode(&self, key: &ConversationKey, bytes: &[u8]) -> Result<Transcript, PersistenceError> {
        let transcript: Transcript =
            serde_json::from_slice(bytes).map_err(|source| PersistenceError::Decode {
                key: key.clone(),
                source,
            })?;
        if &transcript.participants != key {
            return Err(PersistenceError::ParticipantMismatch {
                key: key.clone(),
                found: transcript.participants,
            });
        }
        Ok(transcript)
    }
}
