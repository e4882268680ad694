use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

const LEN_BYTES: u64 = 4;
const CRC_BYTES: u64 = 4;
/// Refuse frames larger than this on replay; a length this big is corruption.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Encode one event as `[u32 len][bincode][u32 crc32]`, little endian.
fn encode_frame(event: &Event) -> io::Result<Vec<u8>> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut frame = Vec::with_capacity(payload.len() + (LEN_BYTES + CRC_BYTES) as usize);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(frame)
}

/// Read one frame. `Ok(None)` means clean EOF, a torn tail or a corrupt frame:
/// in every case replay stops there.
fn read_frame(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    if !read_full(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    if !read_full(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if !read_full(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Some((event, LEN_BYTES + len as u64 + CRC_BYTES))),
        Err(_) => Ok(None),
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Events recovered from disk and the byte length of the readable prefix.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    pub valid_len: u64,
}

/// Append-only write-ahead journal of committed events.
///
/// Every append is fsynced before it returns. A failed append truncates the file
/// back to the last whole frame, and `open` cuts off any torn tail left by a
/// crash, so frames written later are always reachable by replay.
///
/// If the file can no longer be trusted (a failed append could not be cut back,
/// or compaction lost its handle) the journal is marked failed and refuses every
/// append until a successful `compact` rewrites it from committed state.
pub struct Journal {
    file: File,
    path: PathBuf,
    len: u64,
    appends_since_compact: u64,
    failed: bool,
}

impl Journal {
    /// Replay the journal at `path` (creating it if missing) and open it for appends.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let replay = Self::replay(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let on_disk = file.metadata()?.len();
        if on_disk > replay.valid_len {
            tracing::warn!(
                path = %path.display(),
                discarded = on_disk - replay.valid_len,
                "truncating torn journal tail"
            );
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }
        let journal = Self {
            file,
            path: path.to_path_buf(),
            len: replay.valid_len,
            appends_since_compact: replay.events.len() as u64,
            failed: false,
        };
        Ok((journal, replay.events))
    }

    /// Read every whole, checksummed frame from the start of the file.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();
        while let Some((event, frame_len)) = read_frame(&mut reader)? {
            replay.events.push(event);
            replay.valid_len += frame_len;
        }
        Ok(replay)
    }

    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        if self.failed {
            return Err(io::Error::other("journal tail is unknown after an earlier failure"));
        }
        let frame = encode_frame(event)?;
        let written = self
            .file
            .write_all(&frame)
            .and_then(|()| self.file.sync_data());
        if let Err(e) = written {
            // Drop whatever part of the frame reached the file. If even that
            // fails, a rolled-back unit may sit on disk and nothing may follow it.
            if let Err(trunc) = self.file.set_len(self.len) {
                self.mark_failed(&trunc);
            }
            return Err(e);
        }
        self.len += frame.len() as u64;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Replace the journal with `events` via a temp file and an atomic rename.
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        let mut len = 0u64;
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for event in events {
                let frame = encode_frame(event)?;
                writer.write_all(&frame)?;
                len += frame.len() as u64;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        // The old handle now points at an unlinked inode.
        let file = match OpenOptions::new().append(true).open(&self.path) {
            Ok(file) => file,
            Err(e) => {
                self.mark_failed(&e);
                return Err(e);
            }
        };
        self.file = file;
        self.len = len;
        self.appends_since_compact = 0;
        if self.failed {
            tracing::info!(path = %self.path.display(), "journal recovered by compaction");
            self.failed = false;
        }
        Ok(())
    }

    fn mark_failed(&mut self, cause: &io::Error) {
        tracing::error!(path = %self.path.display(), "journal marked failed: {cause}");
        self.failed = true;
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Span, SlotRecord};
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotbook_test_journal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn created(n: usize) -> Event {
        Event::BookingCreated {
            id: Ulid::new(),
            owner: Ulid::new(),
            created_at: 0,
            slots: (0..n)
                .map(|i| SlotRecord {
                    id: Ulid::new(),
                    span: Span::new(i as i64 * 100, i as i64 * 100 + 50),
                    created_at: 0,
                    updated_at: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let events = vec![created(2), Event::BookingDeleted { id: Ulid::new() }];
        {
            let (mut journal, replayed) = Journal::open(&path).unwrap();
            assert!(replayed.is_empty());
            for e in &events {
                journal.append(e).unwrap();
            }
            assert_eq!(journal.appends_since_compact(), 2);
        }
        let (_, replayed) = Journal::open(&path).unwrap();
        assert_eq!(replayed, events);
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = tmp_path("nonexistent.wal");
        let replay = Journal::replay(&path).unwrap();
        assert!(replay.events.is_empty());
        assert_eq!(replay.valid_len, 0);
    }

    #[test]
    fn torn_tail_is_truncated_and_later_appends_survive() {
        let path = tmp_path("torn_tail.wal");
        let first = created(1);
        let second = created(3);
        {
            let (mut journal, _) = Journal::open(&path).unwrap();
            journal.append(&first).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[7u8; 6]).unwrap();
        }
        {
            let (mut journal, replayed) = Journal::open(&path).unwrap();
            assert_eq!(replayed, vec![first.clone()]);
            journal.append(&second).unwrap();
        }
        let (_, replayed) = Journal::open(&path).unwrap();
        assert_eq!(replayed, vec![first, second]);
    }

    #[test]
    fn corrupt_crc_stops_replay() {
        let path = tmp_path("corrupt_crc.wal");
        let event = Event::BookingDeleted { id: Ulid::new() };
        {
            let payload = bincode::serialize(&event).unwrap();
            let mut f = File::create(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEADBEEFu32.to_le_bytes()).unwrap();
        }
        let replay = Journal::replay(&path).unwrap();
        assert!(replay.events.is_empty());
        assert_eq!(replay.valid_len, 0);
    }

    #[test]
    fn compact_shrinks_and_accepts_appends() {
        let path = tmp_path("compact.wal");
        let keep = created(2);
        let tail = Event::BookingDeleted { id: Ulid::new() };
        {
            let (mut journal, _) = Journal::open(&path).unwrap();
            for _ in 0..10 {
                journal.append(&created(4)).unwrap();
            }
            let before = fs::metadata(&path).unwrap().len();
            journal.compact(std::slice::from_ref(&keep)).unwrap();
            let after = fs::metadata(&path).unwrap().len();
            assert!(after < before, "compacted journal should be smaller: {after} < {before}");
            assert_eq!(journal.appends_since_compact(), 0);
            journal.append(&tail).unwrap();
        }
        let (_, replayed) = Journal::open(&path).unwrap();
        assert_eq!(replayed, vec![keep, tail]);
    }

    #[test]
    fn failed_journal_refuses_appends_until_compacted() {
        let path = tmp_path("failed_state.wal");
        let committed = created(1);
        let (mut journal, _) = Journal::open(&path).unwrap();
        journal.append(&committed).unwrap();

        journal.failed = true;
        assert!(journal.append(&created(2)).is_err());
        assert_eq!(fs::metadata(&path).unwrap().len(), journal.len);

        journal.compact(std::slice::from_ref(&committed)).unwrap();
        assert!(!journal.is_failed());
        let tail = Event::BookingDeleted { id: Ulid::new() };
        journal.append(&tail).unwrap();
        drop(journal);

        let (_, replayed) = Journal::open(&path).unwrap();
        assert_eq!(replayed, vec![committed, tail]);
    }

    // ftruncate on a character device fails, so a failed write to /dev/full
    // cannot be cut back and the journal must stop accepting appends.
    #[cfg(target_os = "linux")]
    #[test]
    fn untruncatable_failed_append_marks_journal_failed() {
        let (mut journal, replayed) = Journal::open(Path::new("/dev/full")).unwrap();
        assert!(replayed.is_empty());

        let err = journal.append(&created(1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::StorageFull);
        assert!(journal.is_failed());

        let err = journal.append(&created(1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert_eq!(journal.appends_since_compact(), 0);
    }
}
