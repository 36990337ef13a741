//! Metadata Store: identifier -> attribute record, plus the store-wide schema
//!
//! `metadata.log` starts with an 8-byte header (`"SVMD"`, version u32 LE)
//! followed by CRC-framed MessagePack entries. A `Define` entry is written
//! before the `Put` that first uses a field, so the schema outlives the
//! records that introduced it.

use crate::log::{Durability, LogFile, LogReplay};
use crate::schema::Schema;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use svdb_core::{FieldType, Filter, Outcome, Record, RecordId, SvdbError, SvdbResult};
use tracing::{debug, info};

/// File name of the metadata log inside a store directory
pub const METADATA_FILE: &str = "metadata.log";

const MAGIC: &[u8; 4] = b"SVMD";
const FORMAT_VERSION: u32 = 1;
const HEADER_SIZE: usize = 8;

/// How `put` combines the new record with an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PutMode {
    /// Replace the whole record
    #[default]
    Replace,
    /// Overwrite only the named fields, keep the rest.
    /// Behaves as `Replace` when the identifier is absent.
    Merge,
}

/// Persisted entry, as decoded on replay
#[derive(Debug, Deserialize)]
enum LogEntry {
    Define {
        field: String,
        field_type: FieldType,
    },
    Put {
        id: RecordId,
        record: Record,
    },
    Delete {
        id: RecordId,
    },
}

/// Borrowed form of [`LogEntry`] for writing; encodes identically
#[derive(Serialize)]
enum LogEntryRef<'a> {
    Define {
        field: &'a str,
        field_type: FieldType,
    },
    Put {
        id: &'a RecordId,
        record: &'a Record,
    },
    Delete {
        id: &'a RecordId,
    },
}

#[derive(Default)]
struct State {
    records: BTreeMap<RecordId, Arc<Record>>,
    schema: Schema,
}

impl State {
    fn apply(&mut self, entry: LogEntry) -> SvdbResult<()> {
        match entry {
            LogEntry::Define { field, field_type } => {
                if !self.schema.define(field.clone(), field_type) {
                    return Err(SvdbError::corruption(format!(
                        "{} redefines field '{}' as {}",
                        METADATA_FILE, field, field_type
                    )));
                }
            }
            LogEntry::Put { id, record } => {
                self.records.insert(id, Arc::new(record));
            }
            LogEntry::Delete { id } => {
                self.records.remove(&id);
            }
        }
        Ok(())
    }

    fn live_frames(&self) -> u64 {
        (self.records.len() + self.schema.len()) as u64
    }
}

/// Identifier -> metadata record store with a permissive schema
pub struct MetadataStore {
    state: RwLock<State>,
    /// Serializes log appends; `None` for ephemeral stores
    writer: Mutex<Option<LogFile>>,
    dead: AtomicU64,
}

impl MetadataStore {
    /// Create an in-memory store with no backing file
    pub fn ephemeral() -> Self {
        Self::with_state(State::default(), None, 0)
    }

    /// Open the store in `dir`, creating `metadata.log` if missing
    pub fn open(dir: &Path, durability: Durability) -> SvdbResult<(Self, LogReplay)> {
        let path = dir.join(METADATA_FILE);

        if !LogFile::is_initialized(&path, HEADER_SIZE)? {
            let log = LogFile::create(&path, &encode_header(), durability)?;
            info!(target: "svdb::storage", path = %path.display(), "Created metadata store");
            return Ok((
                Self::with_state(State::default(), Some(log), 0),
                LogReplay::default(),
            ));
        }

        let mut state = State::default();
        let (log, replay) = LogFile::open(&path, HEADER_SIZE, durability, |_, payload| {
            let entry: LogEntry = rmp_serde::from_slice(payload).map_err(|e| {
                SvdbError::corruption(format!("{} entry undecodable: {}", METADATA_FILE, e))
            })?;
            state.apply(entry)
        })?;
        check_header(log.header())?;

        let dead = replay.frames.saturating_sub(state.live_frames());
        info!(
            target: "svdb::storage",
            path = %path.display(),
            records = state.records.len(),
            fields = state.schema.len(),
            frames = replay.frames,
            "Opened metadata store"
        );

        Ok((Self::with_state(state, Some(log), dead), replay))
    }

    fn with_state(state: State, log: Option<LogFile>, dead: u64) -> Self {
        MetadataStore {
            state: RwLock::new(state),
            writer: Mutex::new(log),
            dead: AtomicU64::new(dead),
        }
    }

    /// Write `record` for `id`
    ///
    /// New fields extend the schema. A value whose type conflicts with the
    /// schema fails with `SchemaConflict` and leaves the store unchanged.
    pub fn put(&self, id: &RecordId, record: Record, mode: PutMode) -> SvdbResult<()> {
        id.validate()?;

        let mut writer = self.writer.lock();
        let (added, merged) = {
            let state = self.state.read();
            let added = state.schema.check(&record)?;
            let merged = match (mode, state.records.get(id)) {
                (PutMode::Merge, Some(existing)) => {
                    let mut merged = Record::clone(existing);
                    merged.extend(record);
                    merged
                }
                _ => record,
            };
            (added, merged)
        };

        for (field, field_type) in added {
            if let Some(log) = writer.as_mut() {
                log.append(&encode(&LogEntryRef::Define {
                    field: &field,
                    field_type,
                })?)?;
            }
            self.state.write().schema.define(field, field_type);
        }

        if let Some(log) = writer.as_mut() {
            log.append(&encode(&LogEntryRef::Put {
                id,
                record: &merged,
            })?)?;
        }
        let replaced = self
            .state
            .write()
            .records
            .insert(id.clone(), Arc::new(merged))
            .is_some();
        if replaced {
            self.dead.fetch_add(1, Ordering::Relaxed);
        }
        drop(writer);

        debug!(target: "svdb::storage", id = %id, ?mode, replaced, "Put metadata");
        Ok(())
    }

    /// Record for `id`, if present
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.state
            .read()
            .records
            .get(id)
            .map(|record| Record::clone(record))
    }

    /// Shared handle to the record for `id`, if present and it satisfies
    /// `filter` (or no filter is given).
    ///
    /// The check and the read happen under one lock, so the returned record
    /// is the one that was tested.
    pub fn get_if(&self, id: &RecordId, filter: Option<&Filter>) -> Option<Arc<Record>> {
        let state = self.state.read();
        let record = state.records.get(id)?;
        match filter {
            Some(f) if !f.matches(record) => None,
            _ => Some(Arc::clone(record)),
        }
    }

    /// Remove the record for `id`. Its schema fields stay defined.
    pub fn delete(&self, id: &RecordId) -> SvdbResult<Outcome> {
        let mut writer = self.writer.lock();
        if !self.state.read().records.contains_key(id) {
            return Ok(Outcome::NotFound);
        }
        if let Some(log) = writer.as_mut() {
            log.append(&encode(&LogEntryRef::Delete { id })?)?;
        }
        self.state.write().records.remove(id);
        self.dead.fetch_add(2, Ordering::Relaxed);
        drop(writer);

        debug!(target: "svdb::storage", id = %id, "Deleted metadata");
        Ok(Outcome::Applied)
    }

    /// True if a record exists for `id`
    pub fn contains(&self, id: &RecordId) -> bool {
        self.state.read().records.contains_key(id)
    }

    /// Snapshot of every `(id, record)` satisfying `filter`, in id order
    pub fn query(&self, filter: &Filter) -> Vec<(RecordId, Record)> {
        self.state
            .read()
            .records
            .iter()
            .filter(|(_, record)| filter.matches(record))
            .map(|(id, record)| (id.clone(), Record::clone(record)))
            .collect()
    }

    /// Snapshot of every `(id, record)`, in id order
    pub fn snapshot(&self) -> Vec<(RecordId, Record)> {
        self.state
            .read()
            .records
            .iter()
            .map(|(id, record)| (id.clone(), Record::clone(record)))
            .collect()
    }

    /// Validate `record` against the schema without writing
    pub fn check(&self, record: &Record) -> SvdbResult<()> {
        self.state.read().schema.check(record).map(|_| ())
    }

    /// Copy of the current schema
    pub fn schema(&self) -> Schema {
        self.state.read().schema.clone()
    }

    /// All identifiers, in order
    pub fn ids(&self) -> Vec<RecordId> {
        self.state.read().records.keys().cloned().collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// True if there are no records
    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    /// Log frames superseded by later writes
    pub fn dead_entries(&self) -> u64 {
        self.dead.load(Ordering::Relaxed)
    }

    /// Rewrite the log from live state (schema first, then records).
    ///
    /// Returns the number of frames dropped. No-op for ephemeral stores.
    pub fn compact(&self) -> SvdbResult<u64> {
        let mut writer = self.writer.lock();
        let Some(log) = writer.as_mut() else {
            return Ok(0);
        };
        let payloads = {
            let state = self.state.read();
            let mut payloads = Vec::with_capacity(state.schema.len() + state.records.len());
            for (field, field_type) in state.schema.iter() {
                payloads.push(encode(&LogEntryRef::Define { field, field_type })?);
            }
            for (id, record) in &state.records {
                payloads.push(encode(&LogEntryRef::Put {
                    id,
                    record: &**record,
                })?);
            }
            payloads
        };
        log.rewrite(payloads)?;
        let dropped = self.dead.swap(0, Ordering::Relaxed);

        info!(target: "svdb::storage", dropped, "Compacted metadata log");
        Ok(dropped)
    }

    /// Make the next `count` log appends fail
    #[cfg(feature = "fault-injection")]
    pub fn inject_append_failures(&self, count: u32) {
        if let Some(log) = self.writer.lock().as_ref() {
            log.inject_append_failures(count);
        }
    }

    /// Make the next log append write half a frame, then fail
    #[cfg(feature = "fault-injection")]
    pub fn inject_partial_append(&self) {
        if let Some(log) = self.writer.lock().as_ref() {
            log.inject_partial_append();
        }
    }
}

fn encode(entry: &LogEntryRef<'_>) -> SvdbResult<Vec<u8>> {
    Ok(rmp_serde::to_vec(entry)?)
}

fn encode_header() -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_SIZE);
    header.extend_from_slice(MAGIC);
    header.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    header
}

fn check_header(header: &[u8]) -> SvdbResult<()> {
    if header.len() != HEADER_SIZE || &header[0..4] != MAGIC {
        return Err(SvdbError::corruption(format!(
            "{} has an invalid header",
            METADATA_FILE
        )));
    }
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version != FORMAT_VERSION {
        return Err(SvdbError::corruption(format!(
            "{} has unsupported format version {}",
            METADATA_FILE, version
        )));
    }
    Ok(())
}
