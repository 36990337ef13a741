//! Embedding Store: identifier -> fixed-length vector
//!
//! Vectors are immutable shared buffers. `put` swaps the whole buffer, so a
//! reader holding a [`Vector`] or an [`EmbeddingSnapshot`] never sees a
//! partially written vector.
//!
//! # Log format
//!
//! `embeddings.log` starts with a 16-byte header:
//!
//! ```text
//! ┌──────────┬──────────────┬───────────────┬──────────────┐
//! │ "SVEC"   │ version u32  │ dimension u32 │ reserved u32 │
//! └──────────┴──────────────┴───────────────┴──────────────┘
//! ```
//!
//! Each frame payload is one of:
//!
//! ```text
//! put:    0x01 | id | dimension x f32 LE
//! delete: 0x02 | id
//! id:     0x00 | u64 LE            (integer)
//!         0x01 | u32 LE len | utf8 (string)
//! ```

use crate::log::{Durability, LogFile, LogReplay};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use svdb_core::{validate_vector, Outcome, RecordId, SvdbError, SvdbResult, MAX_DIMENSION};
use tracing::{debug, info};

/// File name of the embedding log inside a store directory
pub const EMBEDDINGS_FILE: &str = "embeddings.log";

const MAGIC: &[u8; 4] = b"SVEC";
const FORMAT_VERSION: u32 = 1;
const HEADER_SIZE: usize = 16;

const OP_PUT: u8 = 0x01;
const OP_DELETE: u8 = 0x02;

const ID_INT: u8 = 0x00;
const ID_STR: u8 = 0x01;

/// Shared, immutable vector buffer
pub type Vector = Arc<[f32]>;

/// Point-in-time view of every stored vector, in identifier order
///
/// Cloning is cheap. The snapshot is unaffected by later writes.
#[derive(Debug, Clone)]
pub struct EmbeddingSnapshot {
    entries: Arc<[(RecordId, Vector)]>,
}

impl EmbeddingSnapshot {
    /// Iterate over `(id, vector)` pairs in identifier order
    pub fn iter(&self) -> impl Iterator<Item = (&RecordId, &[f32])> + '_ {
        self.entries.iter().map(|(id, v)| (id, &v[..]))
    }

    /// The entries as a slice (for chunked scans)
    pub fn as_slice(&self) -> &[(RecordId, Vector)] {
        &self.entries
    }

    /// Number of vectors in the snapshot
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the snapshot holds no vectors
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identifier -> vector store with a fixed dimension
pub struct EmbeddingStore {
    dimension: usize,
    vectors: RwLock<BTreeMap<RecordId, Vector>>,
    /// Serializes log appends; `None` for ephemeral stores
    writer: Mutex<Option<LogFile>>,
    /// Log frames that no longer describe live state
    dead: AtomicU64,
}

impl EmbeddingStore {
    /// Create an in-memory store with no backing file
    pub fn ephemeral(dimension: usize) -> SvdbResult<Self> {
        check_dimension(dimension)?;
        Ok(Self::with_state(dimension, BTreeMap::new(), None, 0))
    }

    /// Open the store in `dir`, creating it if `embeddings.log` is missing.
    ///
    /// `dimension` is required to create a store. For an existing store it
    /// is optional and, when given, must equal the persisted dimension.
    pub fn open(
        dir: &Path,
        dimension: Option<usize>,
        durability: Durability,
    ) -> SvdbResult<(Self, LogReplay)> {
        let path = dir.join(EMBEDDINGS_FILE);

        if !LogFile::is_initialized(&path, HEADER_SIZE)? {
            let dimension = dimension.ok_or_else(|| {
                SvdbError::invalid_argument("dimension is required to create an embedding store")
            })?;
            check_dimension(dimension)?;
            let log = LogFile::create(&path, &encode_header(dimension), durability)?;
            info!(target: "svdb::storage", path = %path.display(), dimension, "Created embedding store");
            return Ok((
                Self::with_state(dimension, BTreeMap::new(), Some(log), 0),
                LogReplay::default(),
            ));
        }

        let mut vectors = BTreeMap::new();
        let mut header_dimension = None;
        let (log, replay) = LogFile::open(&path, HEADER_SIZE, durability, |header, payload| {
            let dim = match header_dimension {
                Some(d) => d,
                None => {
                    let d = decode_header(header)?;
                    header_dimension = Some(d);
                    d
                }
            };
            apply_entry(&mut vectors, dim, payload)
        })?;

        let stored = decode_header(log.header())?;
        if let Some(requested) = dimension {
            if requested != stored {
                return Err(SvdbError::DimensionMismatch {
                    expected: stored,
                    got: requested,
                });
            }
        }

        let dead = replay.frames.saturating_sub(vectors.len() as u64);
        info!(
            target: "svdb::storage",
            path = %path.display(),
            dimension = stored,
            vectors = vectors.len(),
            frames = replay.frames,
            "Opened embedding store"
        );

        Ok((Self::with_state(stored, vectors, Some(log), dead), replay))
    }

    fn with_state(
        dimension: usize,
        vectors: BTreeMap<RecordId, Vector>,
        log: Option<LogFile>,
        dead: u64,
    ) -> Self {
        EmbeddingStore {
            dimension,
            vectors: RwLock::new(vectors),
            writer: Mutex::new(log),
            dead: AtomicU64::new(dead),
        }
    }

    /// Dimension fixed at creation
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Store or replace the vector for `id`
    ///
    /// Fails with `DimensionMismatch` (store unchanged) if the length is wrong.
    pub fn put(&self, id: &RecordId, vector: &[f32]) -> SvdbResult<()> {
        id.validate()?;
        validate_vector(self.dimension, vector)?;

        let payload = encode_put(id, vector);
        let mut writer = self.writer.lock();
        if let Some(log) = writer.as_mut() {
            log.append(&payload)?;
        }
        let previous = self.vectors.write().insert(id.clone(), Arc::from(vector));
        if previous.is_some() {
            self.dead.fetch_add(1, Ordering::Relaxed);
        }
        drop(writer);

        debug!(target: "svdb::storage", id = %id, replaced = previous.is_some(), "Put embedding");
        Ok(())
    }

    /// Vector for `id`, if present
    pub fn get(&self, id: &RecordId) -> Option<Vector> {
        self.vectors.read().get(id).cloned()
    }

    /// Remove the vector for `id`
    pub fn delete(&self, id: &RecordId) -> SvdbResult<Outcome> {
        let mut writer = self.writer.lock();
        if !self.vectors.read().contains_key(id) {
            return Ok(Outcome::NotFound);
        }
        if let Some(log) = writer.as_mut() {
            log.append(&encode_delete(id))?;
        }
        self.vectors.write().remove(id);
        // The delete frame and the put it cancels
        self.dead.fetch_add(2, Ordering::Relaxed);
        drop(writer);

        debug!(target: "svdb::storage", id = %id, "Deleted embedding");
        Ok(Outcome::Applied)
    }

    /// True if a vector is stored for `id`
    pub fn contains(&self, id: &RecordId) -> bool {
        self.vectors.read().contains_key(id)
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        self.vectors.read().len()
    }

    /// True if no vectors are stored
    pub fn is_empty(&self) -> bool {
        self.vectors.read().is_empty()
    }

    /// All identifiers, in order
    pub fn ids(&self) -> Vec<RecordId> {
        self.vectors.read().keys().cloned().collect()
    }

    /// Snapshot of every vector
    pub fn scan(&self) -> EmbeddingSnapshot {
        let vectors = self.vectors.read();
        let entries: Vec<(RecordId, Vector)> = vectors
            .iter()
            .map(|(id, v)| (id.clone(), Arc::clone(v)))
            .collect();
        EmbeddingSnapshot {
            entries: entries.into(),
        }
    }

    /// Log frames superseded by later writes
    pub fn dead_entries(&self) -> u64 {
        self.dead.load(Ordering::Relaxed)
    }

    /// Rewrite the log from live state, dropping superseded frames.
    ///
    /// Returns the number of frames dropped. No-op for ephemeral stores.
    pub fn compact(&self) -> SvdbResult<u64> {
        let mut writer = self.writer.lock();
        let Some(log) = writer.as_mut() else {
            return Ok(0);
        };
        let payloads: Vec<Vec<u8>> = self
            .vectors
            .read()
            .iter()
            .map(|(id, v)| encode_put(id, v))
            .collect();
        log.rewrite(payloads)?;
        let dropped = self.dead.swap(0, Ordering::Relaxed);

        info!(target: "svdb::storage", dropped, "Compacted embedding log");
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

fn check_dimension(dimension: usize) -> SvdbResult<()> {
    if dimension == 0 || dimension > MAX_DIMENSION {
        return Err(SvdbError::invalid_argument(format!(
            "dimension must be between 1 and {}, got {}",
            MAX_DIMENSION, dimension
        )));
    }
    Ok(())
}

fn encode_header(dimension: usize) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_SIZE);
    header.extend_from_slice(MAGIC);
    header.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    header.extend_from_slice(&(dimension as u32).to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header
}

fn decode_header(header: &[u8]) -> SvdbResult<usize> {
    if header.len() != HEADER_SIZE || &header[0..4] != MAGIC {
        return Err(SvdbError::corruption(format!(
            "{} has an invalid header",
            EMBEDDINGS_FILE
        )));
    }
    let mut cursor = Cursor::new(&header[4..]);
    let version = cursor.read_u32::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(SvdbError::corruption(format!(
            "{} has unsupported format version {}",
            EMBEDDINGS_FILE, version
        )));
    }
    let dimension = cursor.read_u32::<LittleEndian>()? as usize;
    check_dimension(dimension).map_err(|_| {
        SvdbError::corruption(format!(
            "{} header records invalid dimension {}",
            EMBEDDINGS_FILE, dimension
        ))
    })?;
    Ok(dimension)
}

fn encode_id(buf: &mut Vec<u8>, id: &RecordId) {
    // Writes into a Vec cannot fail
    match id {
        RecordId::Int(n) => {
            buf.push(ID_INT);
            let _ = buf.write_u64::<LittleEndian>(*n);
        }
        RecordId::Str(s) => {
            buf.push(ID_STR);
            let _ = buf.write_u32::<LittleEndian>(s.len() as u32);
            buf.extend_from_slice(s.as_bytes());
        }
    }
}

fn decode_id(cursor: &mut Cursor<&[u8]>) -> SvdbResult<RecordId> {
    match cursor.read_u8().map_err(truncated)? {
        ID_INT => Ok(RecordId::Int(
            cursor.read_u64::<LittleEndian>().map_err(truncated)?,
        )),
        ID_STR => {
            let len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
            let mut bytes = vec![0u8; len];
            cursor.read_exact(&mut bytes).map_err(truncated)?;
            String::from_utf8(bytes)
                .map(RecordId::Str)
                .map_err(|_| SvdbError::corruption("embedding entry id is not valid UTF-8"))
        }
        tag => Err(SvdbError::corruption(format!(
            "unknown id tag {:#04x} in embedding entry",
            tag
        ))),
    }
}

fn encode_put(id: &RecordId, vector: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 9 + vector.len() * 4);
    buf.push(OP_PUT);
    encode_id(&mut buf, id);
    for x in vector {
        let _ = buf.write_f32::<LittleEndian>(*x);
    }
    buf
}

fn encode_delete(id: &RecordId) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 9);
    buf.push(OP_DELETE);
    encode_id(&mut buf, id);
    buf
}

fn apply_entry(
    vectors: &mut BTreeMap<RecordId, Vector>,
    dimension: usize,
    payload: &[u8],
) -> SvdbResult<()> {
    let mut cursor = Cursor::new(payload);
    let op = cursor.read_u8().map_err(truncated)?;
    let id = decode_id(&mut cursor)?;
    let rest = payload.len() - cursor.position() as usize;

    match op {
        OP_PUT => {
            if rest != dimension * 4 {
                return Err(SvdbError::corruption(format!(
                    "embedding entry for {} holds {} bytes, expected {}",
                    id,
                    rest,
                    dimension * 4
                )));
            }
            let mut values = vec![0f32; dimension];
            cursor
                .read_f32_into::<LittleEndian>(&mut values)
                .map_err(truncated)?;
            vectors.insert(id, values.into());
        }
        OP_DELETE => {
            vectors.remove(&id);
        }
        other => {
            return Err(SvdbError::corruption(format!(
                "unknown embedding op {:#04x}",
                other
            )))
        }
    }
    Ok(())
}

fn truncated(_: std::io::Error) -> SvdbError {
    SvdbError::corruption("embedding entry is truncated")
}
