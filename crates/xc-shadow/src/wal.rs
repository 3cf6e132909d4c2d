//! Write-ahead log: every mutation `ShadowState` accepts is journaled here
//! first, so a crash mid-cycle can be replayed back to the last fully
//! written entry rather than silently losing fills.
//!
//! Wire format is a sequence of length-prefixed frames:
//!
//! ```text
//! [ len: u32 LE ][ CBOR-encoded WalEntry; len bytes ][ crc32: u32 LE ]
//! ```
//!
//! `len` covers only the CBOR payload; the CRC32 trailer covers that same
//! payload, so a frame is self-checking without needing to trust `len`.
//! Entries are buffered in memory and only durably `flush`ed on request
//! (group commit) rather than on every `append`, trading a small replay
//! window for far fewer fsyncs under load.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use xc_schemas::WalEntry;

/// Roll to a new segment file once the current one would exceed this size.
pub const SEGMENT_SIZE_LIMIT_BYTES: u64 = 256 * 1024 * 1024;

const LEN_PREFIX_BYTES: usize = 4;
const CRC_TRAILER_BYTES: usize = 4;

fn segment_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("wal-{index:020}.log"))
}

/// Appends `WalEntry` frames to a rolling sequence of segment files under
/// one directory.
pub struct WalWriter {
    dir: PathBuf,
    segment_index: u64,
    segment_size: u64,
    writer: BufWriter<File>,
}

impl WalWriter {
    /// Open (creating if necessary) the highest-numbered existing segment
    /// under `dir`, appending to it, or start segment 0 if the directory
    /// is empty.
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let segment_index = latest_segment_index(&dir)?.unwrap_or(0);
        let path = segment_path(&dir, segment_index);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let segment_size = file.metadata()?.len();
        Ok(Self {
            dir,
            segment_index,
            segment_size,
            writer: BufWriter::new(file),
        })
    }

    /// Encode and buffer one entry, rolling to a fresh segment first if
    /// this entry would push the current one past the size limit. Does
    /// not flush — call [`WalWriter::flush`] once a batch is ready to
    /// commit.
    pub fn append(&mut self, entry: &WalEntry) -> io::Result<()> {
        let mut payload = Vec::new();
        ciborium::into_writer(entry, &mut payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let frame_len = (LEN_PREFIX_BYTES + payload.len() + CRC_TRAILER_BYTES) as u64;

        if self.segment_size > 0 && self.segment_size + frame_len > SEGMENT_SIZE_LIMIT_BYTES {
            self.roll_segment()?;
        }

        let crc = crc32fast::hash(&payload);
        self.writer.write_all(&(payload.len() as u32).to_le_bytes())?;
        self.writer.write_all(&payload)?;
        self.writer.write_all(&crc.to_le_bytes())?;
        self.segment_size += frame_len;
        Ok(())
    }

    /// Append a whole batch, then flush once — the group-commit path.
    pub fn append_batch(&mut self, entries: &[WalEntry]) -> io::Result<()> {
        for entry in entries {
            self.append(entry)?;
        }
        self.flush()
    }

    /// Flush buffered writes and fsync the segment file to disk.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }

    fn roll_segment(&mut self) -> io::Result<()> {
        self.flush()?;
        self.segment_index += 1;
        self.segment_size = 0;
        let path = segment_path(&self.dir, self.segment_index);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.writer = BufWriter::new(file);
        Ok(())
    }
}

fn latest_segment_index(dir: &Path) -> io::Result<Option<u64>> {
    let mut max = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(index) = name.strip_prefix("wal-").and_then(|s| s.strip_suffix(".log")) {
            if let Ok(index) = index.parse::<u64>() {
                max = Some(max.map_or(index, |m: u64| m.max(index)));
            }
        }
    }
    Ok(max)
}

/// Replay every segment under `dir` in order, returning the entries
/// recovered and the sequence number one past the last entry seen (the
/// value a freshly recovered `ShadowState` should resume from).
///
/// Stops at the first frame that fails its length or CRC check rather
/// than erroring out — a truncated or corrupt trailing frame is exactly
/// what a crash mid-`append` leaves behind, and everything before it is
/// still valid history.
pub fn replay_dir(dir: impl AsRef<Path>) -> io::Result<(Vec<WalEntry>, u64)> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok((Vec::new(), 1));
    }

    let mut segments: Vec<(u64, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(index) = name.strip_prefix("wal-").and_then(|s| s.strip_suffix(".log")) {
            if let Ok(index) = index.parse::<u64>() {
                segments.push((index, entry.path()));
            }
        }
    }
    segments.sort_by_key(|(index, _)| *index);

    let mut entries = Vec::new();
    let mut max_seq = 0u64;
    'segments: for (_, path) in segments {
        let mut reader = BufReader::new(File::open(&path)?);
        loop {
            let mut len_buf = [0u8; LEN_PREFIX_BYTES];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            if reader.read_exact(&mut payload).is_err() {
                break 'segments;
            }

            let mut crc_buf = [0u8; CRC_TRAILER_BYTES];
            if reader.read_exact(&mut crc_buf).is_err() {
                break 'segments;
            }
            let expected_crc = u32::from_le_bytes(crc_buf);
            if crc32fast::hash(&payload) != expected_crc {
                break 'segments;
            }

            let entry: WalEntry = match ciborium::from_reader(payload.as_slice()) {
                Ok(entry) => entry,
                Err(_) => break 'segments,
            };
            max_seq = max_seq.max(entry.seq());
            entries.push(entry);
        }
    }

    Ok((entries, max_seq + 1))
}
