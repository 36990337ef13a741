//! Database struct and open/close logic
//!
//! This module provides the main Database struct that orchestrates:
//! - Store directory setup, config file and process lock
//! - Opening both stores and replaying their logs
//! - Startup recovery and optional compaction
//! - The write path (through the coordinator) and the query path (through
//!   the similarity engine)
//!
//! ## Store directory
//!
//! ```text
//! <path>/
//!   svdb.toml        configuration
//!   embeddings.log   vectors
//!   metadata.log     metadata records and schema
//!   .lock            exclusive process lock
//! ```

pub mod config;

pub use config::{SvdbConfig, CONFIG_FILE_NAME};

use crate::coordinator::Coordinator;
use crate::recovery::{self, RecoveryReport};
use crate::search::{SearchHit, SimilarityEngine};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use svdb_core::{Filter, Metric, Outcome, Record, RecordId, SvdbError, SvdbResult};
use svdb_storage::{EmbeddingStore, MetadataStore, PutMode, Schema, Vector};
use tracing::info;

/// Whether an entry can appear in search results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Metadata and embedding both present
    Complete,
    /// Metadata present, embedding missing (excluded from search)
    Incomplete,
}

/// A stored record as returned by [`Database::get`]
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Identifier
    pub id: RecordId,
    /// Metadata record
    pub record: Record,
    /// Embedding, `None` if INCOMPLETE
    pub embedding: Option<Vector>,
    /// Completeness
    pub state: EntryState,
}

impl Entry {
    /// True if the entry has an embedding
    pub fn is_complete(&self) -> bool {
        self.state == EntryState::Complete
    }
}

/// Main database struct
///
/// Create one with [`Database::open`] (disk-backed) or
/// [`Database::ephemeral`] (in memory). All methods take `&self`; share the
/// database across threads with `Arc`.
///
/// # Example
///
/// ```no_run
/// use svdb_core::{record, Metric, RecordId};
/// use svdb_engine::{Database, SvdbConfig};
///
/// let db = Database::open_with_config("/tmp/vectors", SvdbConfig::with_dimension(3))?;
/// db.insert("doc-1", &[1.0, 0.0, 0.0], record! { "type" => "doc" })?;
///
/// let hits = db.search(&[0.9, 0.1, 0.0], Metric::Cosine, 5, None)?;
/// assert_eq!(hits[0].id, RecordId::from("doc-1"));
/// # Ok::<(), svdb_core::SvdbError>(())
/// ```
pub struct Database {
    data_dir: Option<PathBuf>,
    config: SvdbConfig,
    embeddings: Arc<EmbeddingStore>,
    metadata: Arc<MetadataStore>,
    coordinator: Coordinator,
    engine: SimilarityEngine,
    recovery: RecoveryReport,
    _lock_file: Option<File>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("data_dir", &self.data_dir)
            .field("config", &self.config)
            .field("recovery", &self.recovery)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open the store at `path`, reading `svdb.toml`.
    ///
    /// A commented default config is written if none exists. Creating a new
    /// store requires `dimension` to be set in the file; use
    /// [`open_with_config`](Self::open_with_config) to supply it in code.
    pub fn open<P: AsRef<Path>>(path: P) -> SvdbResult<Self> {
        let data_dir = prepare_dir(path.as_ref())?;
        let config_path = data_dir.join(CONFIG_FILE_NAME);
        SvdbConfig::write_default_if_missing(&config_path)?;
        let config = SvdbConfig::from_file(&config_path)?;
        Self::open_dir(data_dir, config)
    }

    /// Open the store at `path` with `config`.
    ///
    /// Once the store opens, `config` is written to `svdb.toml` so that a
    /// later [`open`](Self::open) uses the same settings.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: SvdbConfig) -> SvdbResult<Self> {
        config.durability_mode()?;
        let data_dir = prepare_dir(path.as_ref())?;
        let config_path = data_dir.join(CONFIG_FILE_NAME);
        let db = Self::open_dir(data_dir, config)?;
        db.config.write_to_file(&config_path)?;
        Ok(db)
    }

    fn open_dir(data_dir: PathBuf, config: SvdbConfig) -> SvdbResult<Self> {
        // Acquire an exclusive filesystem lock so a second process cannot
        // interleave appends to the same logs.
        let lock_path = data_dir.join(".lock");
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| SvdbError::io("failed to open lock file", e))?;
        fs2::FileExt::try_lock_exclusive(&lock_file).map_err(|_| {
            SvdbError::storage(format!(
                "store at '{}' is already in use by another process",
                data_dir.display()
            ))
        })?;

        let durability = config.durability_mode()?;
        let (embeddings, embedding_replay) =
            EmbeddingStore::open(&data_dir, config.dimension, durability)?;
        let (metadata, metadata_replay) = MetadataStore::open(&data_dir, durability)?;

        let report = recovery::recover(&embeddings, &metadata, embedding_replay, metadata_replay)?;

        if config.compact_on_open {
            if embeddings.dead_entries() >= config.compaction_min_dead {
                embeddings.compact()?;
            }
            if metadata.dead_entries() >= config.compaction_min_dead {
                metadata.compact()?;
            }
        }

        info!(
            target: "svdb::db",
            path = %data_dir.display(),
            dimension = embeddings.dimension(),
            records = metadata.len(),
            durability = %config.durability,
            "Opened database"
        );

        Ok(Self::assemble(
            Some(data_dir),
            config,
            embeddings,
            metadata,
            report,
            Some(lock_file),
        ))
    }

    /// Create an in-memory database with no files.
    ///
    /// Data is lost when the database is dropped.
    pub fn ephemeral(dimension: usize) -> SvdbResult<Self> {
        let embeddings = EmbeddingStore::ephemeral(dimension)?;
        let config = SvdbConfig::with_dimension(dimension);
        Ok(Self::assemble(
            None,
            config,
            embeddings,
            MetadataStore::ephemeral(),
            RecoveryReport::default(),
            None,
        ))
    }

    fn assemble(
        data_dir: Option<PathBuf>,
        config: SvdbConfig,
        embeddings: EmbeddingStore,
        metadata: MetadataStore,
        recovery: RecoveryReport,
        lock_file: Option<File>,
    ) -> Self {
        let embeddings = Arc::new(embeddings);
        let metadata = Arc::new(metadata);
        Database {
            coordinator: Coordinator::new(Arc::clone(&embeddings), Arc::clone(&metadata)),
            engine: SimilarityEngine::new(
                Arc::clone(&embeddings),
                Arc::clone(&metadata),
                config.parallel_scan_threshold,
            ),
            data_dir,
            config,
            embeddings,
            metadata,
            recovery,
            _lock_file: lock_file,
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert a new record. See [`Coordinator::insert`].
    pub fn insert(
        &self,
        id: impl Into<RecordId>,
        vector: &[f32],
        record: Record,
    ) -> SvdbResult<()> {
        self.coordinator.insert(&id.into(), vector, record)
    }

    /// Update the embedding and/or metadata of an existing record.
    ///
    /// A supplied record replaces the stored one whole; use
    /// [`update_with_mode`](Self::update_with_mode) with [`PutMode::Merge`]
    /// to change only the named fields.
    pub fn update(
        &self,
        id: impl Into<RecordId>,
        vector: Option<&[f32]>,
        record: Option<Record>,
    ) -> SvdbResult<Outcome> {
        self.coordinator
            .update(&id.into(), vector, record, PutMode::Replace)
    }

    /// Update with an explicit metadata [`PutMode`]
    pub fn update_with_mode(
        &self,
        id: impl Into<RecordId>,
        vector: Option<&[f32]>,
        record: Option<Record>,
        mode: PutMode,
    ) -> SvdbResult<Outcome> {
        self.coordinator.update(&id.into(), vector, record, mode)
    }

    /// Remove a record from both stores
    pub fn delete(&self, id: impl Into<RecordId>) -> SvdbResult<Outcome> {
        self.coordinator.delete(&id.into())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Top-k search. See [`SimilarityEngine::search`].
    pub fn search(
        &self,
        query: &[f32],
        metric: Metric,
        k: usize,
        filter: Option<&Filter>,
    ) -> SvdbResult<Vec<SearchHit>> {
        self.engine.search(query, metric, k, filter)
    }

    /// Record for `id`, including INCOMPLETE ones
    pub fn get(&self, id: impl Into<RecordId>) -> Option<Entry> {
        let id = id.into();
        let record = self.metadata.get(&id)?;
        Some(self.entry(id, record))
    }

    fn entry(&self, id: RecordId, record: Record) -> Entry {
        let embedding = self.embeddings.get(&id);
        let state = if embedding.is_some() {
            EntryState::Complete
        } else {
            EntryState::Incomplete
        };
        Entry {
            id,
            record,
            embedding,
            state,
        }
    }

    /// Embedding for `id`.
    ///
    /// `Ok(None)` if the record does not exist; `Incomplete` if it has
    /// metadata but no embedding.
    pub fn embedding(&self, id: impl Into<RecordId>) -> SvdbResult<Option<Vector>> {
        let id = id.into();
        match self.embeddings.get(&id) {
            Some(v) if self.metadata.contains(&id) => Ok(Some(v)),
            Some(_) => Ok(None),
            None if self.metadata.contains(&id) => Err(SvdbError::Incomplete { id }),
            None => Ok(None),
        }
    }

    /// True if a record (complete or INCOMPLETE) exists for `id`
    pub fn contains(&self, id: impl Into<RecordId>) -> bool {
        self.metadata.contains(&id.into())
    }

    /// Number of records, INCOMPLETE ones included
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    /// True if the database holds no records
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// All record identifiers, in order
    pub fn ids(&self) -> Vec<RecordId> {
        self.metadata.ids()
    }

    /// Iterate over a snapshot of every record, in identifier order
    pub fn entries(&self) -> impl Iterator<Item = Entry> + '_ {
        self.metadata
            .snapshot()
            .into_iter()
            .map(move |(id, record)| self.entry(id, record))
    }

    /// Records whose metadata satisfies `filter`, in identifier order
    pub fn query(&self, filter: &Filter) -> Vec<Entry> {
        self.metadata
            .query(filter)
            .into_iter()
            .map(|(id, record)| self.entry(id, record))
            .collect()
    }

    /// Identifiers with metadata but no embedding
    pub fn incomplete(&self) -> Vec<RecordId> {
        self.metadata
            .ids()
            .into_iter()
            .filter(|id| !self.embeddings.contains(id))
            .collect()
    }

    /// Copy of the metadata schema
    pub fn schema(&self) -> Schema {
        self.metadata.schema()
    }

    /// Vector dimension fixed at creation
    pub fn dimension(&self) -> usize {
        self.embeddings.dimension()
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Rewrite both logs from live state. Returns the number of log
    /// entries dropped.
    pub fn compact(&self) -> SvdbResult<u64> {
        let dropped = self.embeddings.compact()? + self.metadata.compact()?;
        info!(target: "svdb::db", dropped, "Compaction complete");
        Ok(dropped)
    }

    /// What recovery found when this database was opened
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Configuration in effect
    pub fn config(&self) -> &SvdbConfig {
        &self.config
    }

    /// Store directory, `None` for ephemeral databases
    pub fn path(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Make the next `count` embedding log appends fail
    #[cfg(feature = "fault-injection")]
    pub fn inject_embedding_failures(&self, count: u32) {
        self.embeddings.inject_append_failures(count);
    }

    /// Make the next `count` metadata log appends fail
    #[cfg(feature = "fault-injection")]
    pub fn inject_metadata_failures(&self, count: u32) {
        self.metadata.inject_append_failures(count);
    }

    /// Make the next metadata log append write half a frame, then fail
    #[cfg(feature = "fault-injection")]
    pub fn inject_partial_metadata_write(&self) {
        self.metadata.inject_partial_append();
    }

    /// Make the next embedding log append write half a frame, then fail
    #[cfg(feature = "fault-injection")]
    pub fn inject_partial_embedding_write(&self) {
        self.embeddings.inject_partial_append();
    }
}

fn prepare_dir(path: &Path) -> SvdbResult<PathBuf> {
    std::fs::create_dir_all(path)
        .map_err(|e| SvdbError::io(format!("create {}", path.display()), e))?;
    path.canonicalize()
        .map_err(|e| SvdbError::io(format!("canonicalize {}", path.display()), e))
}
