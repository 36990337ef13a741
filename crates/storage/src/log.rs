//! Append-only log file with CRC-framed entries.
//!
//! # File Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ Header (store-specific, fixed size)│
//! ├────────────────────────────────────┤
//! │ Frame 1                            │
//! ├────────────────────────────────────┤
//! │ Frame 2                            │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! └────────────────────────────────────┘
//! ```
//!
//! # Frame Layout
//!
//! ```text
//! ┌─────────────────┬──────────────────┬─────────────────────────┐
//! │ Length (4 bytes)│ CRC32 (4 bytes)  │ Payload (Length bytes)  │
//! └─────────────────┴──────────────────┴─────────────────────────┘
//! ```
//!
//! # Torn Tails
//!
//! A crash can leave the last frame partially written. On open, a frame that
//! runs past end of file, or whose CRC fails and which ends exactly at end of
//! file, is a torn tail: it is truncated away and replay succeeds. A CRC
//! failure followed by more data cannot be a torn append and is reported as
//! corruption.
//!
//! A failed append is rolled back to the last acknowledged frame before the
//! error is returned, so a later append never lands behind a partial frame.

use crc32fast::Hasher;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use svdb_core::{SvdbError, SvdbResult};
use tracing::{debug, warn};

#[cfg(any(test, feature = "fault-injection"))]
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Size of the frame header (length + CRC)
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest payload a single frame may carry (64 MiB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// When appended frames reach stable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// Each frame is handed to the OS with a single write; no fsync.
    /// Survives a process crash, may lose the tail on power loss.
    #[default]
    Standard,
    /// fsync after every frame. Survives power loss.
    Always,
}

/// Statistics from replaying a log on open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogReplay {
    /// Number of frames replayed
    pub frames: u64,
    /// Bytes removed from a torn tail (0 if the log ended cleanly)
    pub truncated_bytes: u64,
}

/// Append-only log with CRC-framed payloads
pub struct LogFile {
    path: PathBuf,
    file: File,
    header: Vec<u8>,
    durability: Durability,
    /// Length of the file through the last acknowledged frame
    len: u64,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
    #[cfg(any(test, feature = "fault-injection"))]
    injected_failures: AtomicU32,
    #[cfg(any(test, feature = "fault-injection"))]
    injected_partial: AtomicBool,
}

impl LogFile {
    /// Create a new log containing only `header`.
    ///
    /// The header is written and fsynced under a temporary name and renamed
    /// into place, so `path` never holds a partial header. Fails if a file
    /// already exists at `path`.
    pub fn create(path: &Path, header: &[u8], durability: Durability) -> SvdbResult<Self> {
        if path.exists() {
            return Err(SvdbError::io(
                format!("create {}", path.display()),
                std::io::Error::new(ErrorKind::AlreadyExists, "log already exists"),
            ));
        }

        let tmp_path = path.with_extension("log.new");
        let written = (|| -> std::io::Result<()> {
            let mut tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            tmp.write_all(header)?;
            tmp.sync_all()
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(SvdbError::io(format!("write header {}", tmp_path.display()), e));
        }

        fs::rename(&tmp_path, path)
            .map_err(|e| SvdbError::io(format!("rename {}", tmp_path.display()), e))?;
        sync_parent_dir(path);

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(path)
            .map_err(|e| SvdbError::io(format!("open {}", path.display()), e))?;

        debug!(target: "svdb::log", path = %path.display(), "Created log");

        Ok(Self::from_parts(
            path,
            file,
            header.to_vec(),
            durability,
            header.len() as u64,
        ))
    }

    /// Whether `path` holds a log that got past creation.
    ///
    /// A file shorter than its header cannot contain frames: it is left by
    /// a crash during creation. It is removed and reported as absent so the
    /// caller creates the log afresh.
    pub fn is_initialized(path: &Path, header_len: usize) -> SvdbResult<bool> {
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(SvdbError::io(format!("stat {}", path.display()), e)),
        };
        if size >= header_len as u64 {
            return Ok(true);
        }

        warn!(
            target: "svdb::log",
            path = %path.display(),
            bytes = size,
            "Discarding log torn during creation"
        );
        fs::remove_file(path)
            .map_err(|e| SvdbError::io(format!("remove {}", path.display()), e))?;
        sync_parent_dir(path);
        Ok(false)
    }

    /// Open an existing log and replay every frame through `apply`.
    ///
    /// Returns the log positioned for appending and the raw header bytes.
    /// A torn tail is truncated before returning.
    pub fn open<F>(
        path: &Path,
        header_len: usize,
        durability: Durability,
        mut apply: F,
    ) -> SvdbResult<(Self, LogReplay)>
    where
        F: FnMut(&[u8], &[u8]) -> SvdbResult<()>,
    {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(path)
            .map_err(|e| SvdbError::io(format!("open {}", path.display()), e))?;
        let file_size = file
            .metadata()
            .map_err(|e| SvdbError::io(format!("stat {}", path.display()), e))?
            .len();

        if file_size < header_len as u64 {
            return Err(SvdbError::corruption(format!(
                "{}: file is {} bytes, shorter than its {}-byte header",
                path.display(),
                file_size,
                header_len
            )));
        }

        let mut reader = BufReader::new(&file);
        let mut header = vec![0u8; header_len];
        reader
            .read_exact(&mut header)
            .map_err(|e| SvdbError::io(format!("read header {}", path.display()), e))?;

        let mut replay = LogReplay::default();
        let mut position = header_len as u64;
        let mut payload = Vec::new();

        loop {
            match read_frame(&mut reader, position, file_size, &mut payload)? {
                FrameRead::Frame(len) => {
                    apply(&header, &payload)?;
                    position += (FRAME_HEADER_SIZE + len) as u64;
                    replay.frames += 1;
                }
                FrameRead::End => break,
                FrameRead::TornTail => {
                    replay.truncated_bytes = file_size - position;
                    break;
                }
                FrameRead::Corrupt(reason) => {
                    return Err(SvdbError::corruption(format!(
                        "{} at offset {}: {}",
                        path.display(),
                        position,
                        reason
                    )));
                }
            }
        }
        drop(reader);

        if replay.truncated_bytes > 0 {
            warn!(
                target: "svdb::log",
                path = %path.display(),
                offset = position,
                bytes = replay.truncated_bytes,
                "Truncating torn tail"
            );
            file.set_len(position)
                .and_then(|_| file.sync_all())
                .map_err(|e| SvdbError::io(format!("truncate {}", path.display()), e))?;
        }

        debug!(
            target: "svdb::log",
            path = %path.display(),
            frames = replay.frames,
            "Replayed log"
        );

        Ok((
            Self::from_parts(path, file, header, durability, position),
            replay,
        ))
    }

    fn from_parts(
        path: &Path,
        file: File,
        header: Vec<u8>,
        durability: Durability,
        len: u64,
    ) -> Self {
        LogFile {
            path: path.to_path_buf(),
            file,
            header,
            durability,
            len,
            poisoned: false,
            #[cfg(any(test, feature = "fault-injection"))]
            injected_failures: AtomicU32::new(0),
            #[cfg(any(test, feature = "fault-injection"))]
            injected_partial: AtomicBool::new(false),
        }
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header bytes written at creation
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Append one payload as a single frame.
    ///
    /// The frame is written with one `write_all` call so that a crash can
    /// only tear the final frame. If the write or fsync fails, the file is
    /// cut back to the previous frame boundary before the error returns.
    pub fn append(&mut self, payload: &[u8]) -> SvdbResult<()> {
        if self.poisoned {
            return Err(SvdbError::io(
                format!("append {}", self.path.display()),
                std::io::Error::new(ErrorKind::Other, "log has unrecovered partial frame"),
            ));
        }

        #[cfg(any(test, feature = "fault-injection"))]
        self.take_injected_failure()?;

        let frame = encode_frame(payload)?;
        if let Err(e) = self.write_frame(&frame) {
            self.roll_back();
            return Err(e);
        }
        self.len += frame.len() as u64;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> SvdbResult<()> {
        #[cfg(any(test, feature = "fault-injection"))]
        if self.injected_partial.swap(false, Ordering::SeqCst) {
            let _ = self.file.write_all(&frame[..frame.len() / 2]);
            return Err(SvdbError::io(
                format!("append {}", self.path.display()),
                std::io::Error::new(ErrorKind::Other, "injected partial write"),
            ));
        }

        self.file
            .write_all(frame)
            .map_err(|e| SvdbError::io(format!("append {}", self.path.display()), e))?;
        if self.durability == Durability::Always {
            self.file
                .sync_data()
                .map_err(|e| SvdbError::io(format!("fsync {}", self.path.display()), e))?;
        }
        Ok(())
    }

    fn roll_back(&mut self) {
        if let Err(e) = self.file.set_len(self.len) {
            warn!(
                target: "svdb::log",
                path = %self.path.display(),
                offset = self.len,
                error = %e,
                "Failed to roll back partial append"
            );
            self.poisoned = true;
        }
    }

    /// Replace the log's contents with `payloads`, atomically.
    ///
    /// Writes header and frames to a sibling temporary file, fsyncs it, and
    /// renames it over the live log. On error the live log is untouched.
    pub fn rewrite<I>(&mut self, payloads: I) -> SvdbResult<u64>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let tmp_path = self.path.with_extension("log.compact");
        let written = (|| -> SvdbResult<(u64, u64)> {
            let mut tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            tmp.write_all(&self.header)?;
            let mut len = self.header.len() as u64;
            let mut frames = 0u64;
            for payload in payloads {
                let frame = encode_frame(&payload)?;
                tmp.write_all(&frame)?;
                len += frame.len() as u64;
                frames += 1;
            }
            tmp.sync_all()?;
            Ok((frames, len))
        })();

        let (frames, len) = match written {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        fs::rename(&tmp_path, &self.path)
            .map_err(|e| SvdbError::io(format!("rename {}", tmp_path.display()), e))?;
        sync_parent_dir(&self.path);

        self.file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SvdbError::io(format!("reopen {}", self.path.display()), e))?;
        self.len = len;
        self.poisoned = false;

        debug!(target: "svdb::log", path = %self.path.display(), frames, "Rewrote log");
        Ok(frames)
    }

    /// Make the next `count` appends fail with a storage error.
    #[cfg(any(test, feature = "fault-injection"))]
    pub fn inject_append_failures(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next append write half its frame, then fail.
    #[cfg(any(test, feature = "fault-injection"))]
    pub fn inject_partial_append(&self) {
        self.injected_partial.store(true, Ordering::SeqCst);
    }

    #[cfg(any(test, feature = "fault-injection"))]
    fn take_injected_failure(&self) -> SvdbResult<()> {
        let armed = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            return Err(SvdbError::io(
                format!("append {}", self.path.display()),
                std::io::Error::new(ErrorKind::Other, "injected failure"),
            ));
        }
        Ok(())
    }
}

enum FrameRead {
    Frame(usize),
    End,
    TornTail,
    Corrupt(String),
}

fn read_frame<R: Read>(
    reader: &mut R,
    position: u64,
    file_size: u64,
    payload: &mut Vec<u8>,
) -> SvdbResult<FrameRead> {
    if position >= file_size {
        return Ok(FrameRead::End);
    }
    if file_size - position < FRAME_HEADER_SIZE as u64 {
        return Ok(FrameRead::TornTail);
    }

    let mut head = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut head)?;
    let len = u32::from_le_bytes([head[0], head[1], head[2], head[3]]) as usize;
    let expected_crc = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);

    let frame_end = position + (FRAME_HEADER_SIZE + len) as u64;
    if frame_end > file_size {
        return Ok(FrameRead::TornTail);
    }
    if len > MAX_FRAME_SIZE {
        return Ok(FrameRead::Corrupt(format!(
            "frame length {} exceeds maximum {}",
            len, MAX_FRAME_SIZE
        )));
    }

    payload.resize(len, 0);
    match reader.read_exact(payload) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(FrameRead::TornTail),
        Err(e) => return Err(e.into()),
    }

    if crc32(payload) != expected_crc {
        if frame_end == file_size {
            return Ok(FrameRead::TornTail);
        }
        return Ok(FrameRead::Corrupt("CRC mismatch".to_string()));
    }

    Ok(FrameRead::Frame(len))
}

fn encode_frame(payload: &[u8]) -> SvdbResult<Vec<u8>> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(SvdbError::invalid_argument(format!(
            "entry of {} bytes exceeds the {}-byte frame limit",
            payload.len(),
            MAX_FRAME_SIZE
        )));
    }
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32(payload).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
