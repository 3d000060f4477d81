//! The store instance: an in-memory index over the committed record log.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::{Mode, OpenOptions};
use crate::crypto::{self, Cipher, MAX_KEY_BYTES};
use crate::error::{Error, Result};
use crate::format::{self, Header, Record, FLAG_ENCRYPTED, FORMAT_VERSION, HEADER_LEN, SALT_LEN};
use crate::lock::{FileLock, LockKind};
use crate::mapfile::MapFile;
use crate::value::Value;

struct Inner {
    id: String,
    map: MapFile,
    header: Header,
    cipher: Option<Cipher>,
    /// Live view of the committed log; `None` after `clear_cache`.
    index: Option<HashMap<String, Value>>,
    /// Committed length this instance has replayed up to.
    cursor: u64,
}

/// A key-value store instance backed by one mmap'd data file.
///
/// Obtained through [`Store::open`]; instances are shared per data file
/// within the process and flushed when the last handle drops.
pub struct Store {
    id: String,
    path: PathBuf,
    mode: Mode,
    inner: Mutex<Inner>,
}

impl Store {
    /// Open (or create) the instance described by `options`.
    ///
    /// Returns the already-live instance when the same data file is open
    /// elsewhere in this process.
    pub fn open(options: OpenOptions) -> Result<Arc<Store>> {
        crate::registry::get_or_open(options)
    }

    pub(crate) fn open_uncached(options: OpenOptions, path: PathBuf) -> Result<Store> {
        options.validate()?;
        let key = options.key().map(str::to_string);
        let (mut map, created) = MapFile::open(&path)?;
        let _flock = match options.mode {
            Mode::MultiProcess => Some(FileLock::acquire(map.file(), LockKind::Exclusive)?),
            Mode::SingleProcess => None,
        };
        if options.mode == Mode::MultiProcess {
            map.refresh()?;
        }

        let header = match Header::decode(map.bytes()) {
            Some(header) => {
                if header.version > FORMAT_VERSION {
                    return Err(Error::UnsupportedVersion(header.version));
                }
                header
            }
            None => {
                if !created {
                    warn!(
                        id = %options.id,
                        path = %path.display(),
                        "unreadable store header, reinitializing"
                    );
                }
                init_header(&mut map, key.is_some())
            }
        };
        let cipher = match (header.encrypted(), key.as_deref()) {
            (true, Some(key)) => Some(Cipher::derive(key, &header.salt)?),
            (true, None) => return Err(Error::KeyRequired),
            (false, Some(_)) => return Err(Error::KeyUnexpected),
            (false, None) => None,
        };

        let mut inner = Inner {
            id: options.id.clone(),
            map,
            header,
            cipher,
            index: None,
            cursor: HEADER_LEN,
        };
        inner.load()?;
        debug!(
            id = %options.id,
            path = %path.display(),
            encrypted = inner.header.encrypted(),
            "opened store instance"
        );
        Ok(Store {
            id: options.id,
            path,
            mode: options.mode,
            inner: Mutex::new(inner),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Store a value under `key`, replacing whatever was there.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let mut inner = self.inner.lock();
        let _flock = self.prepare(&mut inner, LockKind::Exclusive)?;
        inner.append(&Record::Put {
            key: key.to_string(),
            value: value.clone(),
        })?;
        inner.entries()?.insert(key.to_string(), value);
        Ok(())
    }

    /// The stored value regardless of kind.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.read(key, |value| Some(value.clone()))
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.read(key, Value::as_bool)
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        self.read(key, Value::as_f64)
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.read(key, |value| value.as_str().map(str::to_string))
    }

    pub fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.read(key, |value| value.as_bytes().map(<[u8]>::to_vec))
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        let _flock = self.prepare(&mut inner, LockKind::Shared)?;
        Ok(inner.entries()?.contains_key(key))
    }

    /// Remove `key`; a no-op when it is absent.
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let _flock = self.prepare(&mut inner, LockKind::Exclusive)?;
        if inner.entries()?.contains_key(key) {
            inner.append(&Record::Remove {
                key: key.to_string(),
            })?;
            inner.entries()?.remove(key);
        }
        Ok(())
    }

    /// All live keys, in no particular order.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut inner = self.inner.lock();
        let _flock = self.prepare(&mut inner, LockKind::Shared)?;
        Ok(inner.entries()?.keys().cloned().collect())
    }

    /// Number of live keys.
    pub fn len(&self) -> Result<usize> {
        let mut inner = self.inner.lock();
        let _flock = self.prepare(&mut inner, LockKind::Shared)?;
        Ok(inner.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop every key and reset the log to an empty header.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let _flock = self.lock_file(&inner, LockKind::Exclusive)?;
        if self.mode == Mode::MultiProcess {
            inner.map.refresh()?;
        }
        inner.reset()?;
        debug!(id = %self.id, "cleared store");
        Ok(())
    }

    /// Compact the log down to the live records and shrink the file.
    pub fn trim(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let _flock = self.prepare(&mut inner, LockKind::Exclusive)?;
        let before = inner.cursor;
        inner.rewrite()?;
        debug!(id = %self.id, before, after = inner.cursor, "trimmed data file");
        Ok(())
    }

    /// Re-encrypt the store under `new_key`; `None` (or an empty key)
    /// removes encryption. The whole log is rewritten either way.
    pub fn rekey(&self, new_key: Option<&str>) -> Result<()> {
        let new_key = new_key.filter(|key| !key.is_empty());
        if let Some(key) = new_key {
            if key.len() > MAX_KEY_BYTES {
                return Err(Error::EncryptionKeyTooLong(key.len()));
            }
        }
        let mut inner = self.inner.lock();
        let _flock = self.prepare(&mut inner, LockKind::Exclusive)?;
        let (header, cipher) = match new_key {
            Some(key) => {
                let salt = crypto::random_salt();
                let cipher = Cipher::derive(key, &salt)?;
                (Header::new(FLAG_ENCRYPTED, salt), Some(cipher))
            }
            None => (Header::new(0, [0u8; SALT_LEN]), None),
        };
        inner.set_cipher(header, cipher);
        inner.rewrite()?;
        debug!(id = %self.id, encrypted = inner.header.encrypted(), "rekeyed store");
        Ok(())
    }

    /// Committed size of the data file in bytes (header included).
    pub fn actual_size(&self) -> Result<u64> {
        let mut inner = self.inner.lock();
        let _flock = self.lock_file(&inner, LockKind::Shared)?;
        if self.mode == Mode::MultiProcess {
            inner.map.refresh()?;
        }
        let committed = format::read_committed(inner.map.bytes());
        Ok(committed.clamp(HEADER_LEN, inner.map.capacity()))
    }

    /// Drop the in-memory index; the next access replays it from disk.
    pub fn clear_cache(&self) {
        self.inner.lock().index = None;
    }

    fn read<T>(&self, key: &str, extract: impl FnOnce(&Value) -> Option<T>) -> Result<Option<T>> {
        let mut inner = self.inner.lock();
        let _flock = self.prepare(&mut inner, LockKind::Shared)?;
        Ok(inner.entries()?.get(key).and_then(extract))
    }

    /// Take the file lock (multi-process mode) and bring the index up to
    /// date with the committed log.
    fn prepare(&self, inner: &mut Inner, kind: LockKind) -> Result<Option<FileLock>> {
        match self.mode {
            Mode::MultiProcess => {
                let flock = FileLock::acquire(inner.map.file(), kind)?;
                inner.sync_external()?;
                Ok(Some(flock))
            }
            Mode::SingleProcess => {
                inner.ensure_loaded()?;
                Ok(None)
            }
        }
    }

    fn lock_file(&self, inner: &Inner, kind: LockKind) -> Result<Option<FileLock>> {
        match self.mode {
            Mode::MultiProcess => Ok(Some(FileLock::acquire(inner.map.file(), kind)?)),
            Mode::SingleProcess => Ok(None),
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Err(err) = inner.map.sync() {
            warn!(id = %self.id, error = %err, "flush on close failed");
        }
        debug!(id = %self.id, "closed store instance");
    }
}

impl Inner {
    fn ensure_loaded(&mut self) -> Result<()> {
        if self.index.is_none() {
            self.load()?;
        }
        Ok(())
    }

    fn entries(&mut self) -> Result<&mut HashMap<String, Value>> {
        self.ensure_loaded()?;
        Ok(self.index.as_mut().unwrap())
    }

    /// Rebuild the index by replaying the committed log. Truncates the
    /// committed length past the first invalid record.
    fn load(&mut self) -> Result<()> {
        let capacity = self.map.capacity();
        let committed = format::read_committed(self.map.bytes());
        let limit = if committed < HEADER_LEN || committed > capacity {
            warn!(
                id = %self.id,
                committed,
                capacity,
                "committed length out of range, scanning file"
            );
            capacity
        } else {
            committed
        };

        let mut index = HashMap::new();
        let end = replay(
            self.map.bytes(),
            self.cipher.as_ref(),
            HEADER_LEN,
            limit,
            &mut index,
        )?;
        if end < limit && limit == committed {
            warn!(
                id = %self.id,
                discarded = limit - end,
                "discarding bytes after invalid record"
            );
        }
        if end != committed {
            format::write_committed(self.map.bytes_mut(), end);
            self.map.zero_range(end, capacity);
        }
        self.cursor = end;
        self.index = Some(index);
        Ok(())
    }

    /// Multi-process catch-up: re-map if the file was resized, then fold
    /// in records another process committed. A committed length behind
    /// our cursor means the file was rewritten (clear / trim / rekey) and
    /// the index is rebuilt from scratch.
    fn sync_external(&mut self) -> Result<()> {
        self.map.refresh()?;
        if self.index.is_none() {
            return self.load();
        }
        let committed = format::read_committed(self.map.bytes());
        if committed == self.cursor {
            return Ok(());
        }
        if committed < self.cursor || committed > self.map.capacity() {
            debug!(id = %self.id, "data file rewritten externally, reloading");
            self.index = None;
            return self.load();
        }
        let mut index = self.index.take().unwrap_or_default();
        let end = replay(
            self.map.bytes(),
            self.cipher.as_ref(),
            self.cursor,
            committed,
            &mut index,
        )?;
        if end < committed {
            warn!(
                id = %self.id,
                discarded = committed - end,
                "discarding bytes after invalid record"
            );
            format::write_committed(self.map.bytes_mut(), end);
            let capacity = self.map.capacity();
            self.map.zero_range(end, capacity);
        }
        self.cursor = end;
        self.index = Some(index);
        Ok(())
    }

    /// Append one record and advance the committed length past it.
    fn append(&mut self, record: &Record) -> Result<()> {
        let framed = record.encode(self.cipher.as_ref())?;
        let end = self.cursor + framed.len() as u64;
        self.map.ensure_capacity(end)?;
        self.map.write_at(self.cursor, &framed);
        format::write_committed(self.map.bytes_mut(), end);
        self.cursor = end;
        Ok(())
    }

    /// Rewrite the log as one Put per live key, then shrink the file.
    fn rewrite(&mut self) -> Result<()> {
        self.ensure_loaded()?;
        let entries: Vec<(String, Value)> = self
            .index
            .as_ref()
            .unwrap()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let mut buf = Vec::new();
        for (key, value) in entries {
            buf.extend_from_slice(&Record::Put { key, value }.encode(self.cipher.as_ref())?);
        }
        let end = HEADER_LEN + buf.len() as u64;

        format::write_committed(self.map.bytes_mut(), HEADER_LEN);
        self.map.ensure_capacity(end)?;
        self.map.write_at(HEADER_LEN, &buf);
        format::write_committed(self.map.bytes_mut(), end);
        self.cursor = end;
        self.map.shrink_to(end)?;
        let capacity = self.map.capacity();
        self.map.zero_range(end, capacity);
        self.map.sync()?;
        Ok(())
    }

    /// Reset to an empty log, keeping the header.
    fn reset(&mut self) -> Result<()> {
        format::write_committed(self.map.bytes_mut(), HEADER_LEN);
        self.cursor = HEADER_LEN;
        self.index = Some(HashMap::new());
        self.map.shrink_to(HEADER_LEN)?;
        let capacity = self.map.capacity();
        self.map.zero_range(HEADER_LEN, capacity);
        self.map.sync()?;
        Ok(())
    }

    /// Install a new header and cipher (rekey). The caller rewrites the
    /// log immediately afterwards.
    fn set_cipher(&mut self, header: Header, cipher: Option<Cipher>) {
        header.encode(self.map.bytes_mut());
        self.header = header;
        self.cipher = cipher;
    }
}

fn init_header(map: &mut MapFile, encrypted: bool) -> Header {
    let header = if encrypted {
        Header::new(FLAG_ENCRYPTED, crypto::random_salt())
    } else {
        Header::new(0, [0u8; SALT_LEN])
    };
    let capacity = map.capacity();
    map.zero_range(0, capacity);
    header.encode(map.bytes_mut());
    format::write_committed(map.bytes_mut(), HEADER_LEN);
    header
}

/// Fold committed records from `start` up to `limit` into `index`.
/// Returns the offset just past the last valid record.
fn replay(
    bytes: &[u8],
    cipher: Option<&Cipher>,
    start: u64,
    limit: u64,
    index: &mut HashMap<String, Value>,
) -> Result<u64> {
    let limit = limit.min(bytes.len() as u64);
    let mut offset = start;
    while offset < limit {
        match Record::decode(&bytes[offset as usize..limit as usize], cipher) {
            Ok((record, used)) => {
                match record {
                    Record::Put { key, value } => {
                        index.insert(key, value);
                    }
                    Record::Remove { key } => {
                        index.remove(&key);
                    }
                }
                offset += used as u64;
            }
            Err(Error::Crypto(msg)) => return Err(Error::Crypto(msg)),
            Err(_) => break,
        }
    }
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(dir: &Path, id: &str) -> OpenOptions {
        OpenOptions::new(id, dir)
    }

    fn open_direct(opts: OpenOptions) -> Store {
        let path = opts.dir.join(opts.file_name());
        Store::open_uncached(opts, path).unwrap()
    }

    #[test]
    fn set_and_get_each_kind() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_direct(options(dir.path(), "kinds"));

        store.set("flag", true).unwrap();
        store.set("count", 42.5).unwrap();
        store.set("name", "Alice").unwrap();
        store.set("blob", vec![1u8, 2, 3]).unwrap();

        assert_eq!(store.get_bool("flag").unwrap(), Some(true));
        assert_eq!(store.get_f64("count").unwrap(), Some(42.5));
        assert_eq!(store.get_string("name").unwrap().as_deref(), Some("Alice"));
        assert_eq!(store.get_bytes("blob").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.len().unwrap(), 4);
    }

    #[test]
    fn kind_mismatch_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_direct(options(dir.path(), "mismatch"));
        store.set("name", "Alice").unwrap();

        assert_eq!(store.get_bool("name").unwrap(), None);
        assert_eq!(store.get_f64("name").unwrap(), None);
        assert_eq!(store.get_bytes("name").unwrap(), None);
        assert!(store.has("name").unwrap());
        assert_eq!(store.get("name").unwrap(), Some(Value::from("Alice")));
    }

    #[test]
    fn missing_key_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_direct(options(dir.path(), "missing"));
        assert_eq!(store.get_string("nope").unwrap(), None);
        assert!(!store.has("nope").unwrap());
    }

    #[test]
    fn overwrite_replaces_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_direct(options(dir.path(), "overwrite"));
        store.set("k", "old").unwrap();
        store.set("k", "new").unwrap();
        assert_eq!(store.get_string("k").unwrap().as_deref(), Some("new"));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn delete_removes_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_direct(options(dir.path(), "delete"));
        store.set("a", 1.0).unwrap();
        store.set("b", 2.0).unwrap();

        store.delete("a").unwrap();
        assert!(!store.has("a").unwrap());
        assert_eq!(store.len().unwrap(), 1);
        store.delete("a").unwrap();
        assert_eq!(store.len().unwrap(), 1);

        let keys = store.keys().unwrap();
        assert_eq!(keys, vec!["b".to_string()]);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_direct(options(dir.path(), "persist"));
            store.set("k", "v").unwrap();
            store.set("gone", true).unwrap();
            store.delete("gone").unwrap();
        }
        let store = open_direct(options(dir.path(), "persist"));
        assert_eq!(store.get_string("k").unwrap().as_deref(), Some("v"));
        assert!(!store.has("gone").unwrap());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn clear_empties_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_direct(options(dir.path(), "clear"));
            store.set("k", "v").unwrap();
            store.clear().unwrap();
            assert!(store.is_empty().unwrap());
            assert_eq!(store.actual_size().unwrap(), HEADER_LEN);
            // Usable after the reset.
            store.set("k2", 7.0).unwrap();
        }
        let store = open_direct(options(dir.path(), "clear"));
        assert_eq!(store.keys().unwrap(), vec!["k2".to_string()]);
    }

    #[test]
    fn trim_compacts_and_shrinks() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_direct(options(dir.path(), "trim"));
        let filler = "x".repeat(100);
        for i in 0..100 {
            store.set(&format!("key{i}"), filler.as_str()).unwrap();
        }
        for i in 0..90 {
            store.delete(&format!("key{i}")).unwrap();
        }
        let before = store.actual_size().unwrap();
        let file_before = std::fs::metadata(store.path()).unwrap().len();

        store.trim().unwrap();

        let after = store.actual_size().unwrap();
        assert!(after < before);
        assert!(std::fs::metadata(store.path()).unwrap().len() <= file_before);
        assert_eq!(store.len().unwrap(), 10);
        assert_eq!(
            store.get_string("key95").unwrap().as_deref(),
            Some(filler.as_str())
        );
    }

    #[test]
    fn clear_cache_reloads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_direct(options(dir.path(), "cache"));
        store.set("k", "v").unwrap();
        store.clear_cache();
        assert_eq!(store.get_string("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn encrypted_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_direct(options(dir.path(), "enc").encryption_key("secret"));
            store.set("k", "classified").unwrap();
        }
        let store = open_direct(options(dir.path(), "enc").encryption_key("secret"));
        assert_eq!(
            store.get_string("k").unwrap().as_deref(),
            Some("classified")
        );
    }

    #[test]
    fn encrypted_values_do_not_appear_in_the_file() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_direct(options(dir.path(), "opaque").encryption_key("secret"));
            store.set("visible-key-name", "classified-plaintext").unwrap();
        }
        let raw = std::fs::read(dir.path().join("opaque.mmkv")).unwrap();
        let secret: &[u8] = b"classified-plaintext";
        assert!(!raw.windows(secret.len()).any(|w| w == secret));
        // Keys stay in the clear.
        let key: &[u8] = b"visible-key-name";
        assert!(raw.windows(key.len()).any(|w| w == key));
    }

    #[test]
    fn encrypted_store_requires_matching_key() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_direct(options(dir.path(), "strict").encryption_key("secret"));
            store.set("k", "v").unwrap();
        }
        let opts = options(dir.path(), "strict");
        let path = opts.dir.join(opts.file_name());
        assert!(matches!(
            Store::open_uncached(opts, path.clone()),
            Err(Error::KeyRequired)
        ));
        assert!(matches!(
            Store::open_uncached(
                options(dir.path(), "strict").encryption_key("wrong-key"),
                path
            ),
            Err(Error::Crypto(_))
        ));
    }

    #[test]
    fn plaintext_store_rejects_a_key() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_direct(options(dir.path(), "plain"));
            store.set("k", "v").unwrap();
        }
        let opts = options(dir.path(), "plain").encryption_key("secret");
        let path = opts.dir.join(opts.file_name());
        assert!(matches!(
            Store::open_uncached(opts, path),
            Err(Error::KeyUnexpected)
        ));
    }

    #[test]
    fn rekey_between_plain_and_encrypted() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_direct(options(dir.path(), "rotate"));
            store.set("k", "v").unwrap();

            store.rekey(Some("first-key")).unwrap();
            assert_eq!(store.get_string("k").unwrap().as_deref(), Some("v"));
            store.rekey(Some("second-key")).unwrap();
            assert_eq!(store.get_string("k").unwrap().as_deref(), Some("v"));
        }
        {
            let store = open_direct(options(dir.path(), "rotate").encryption_key("second-key"));
            assert_eq!(store.get_string("k").unwrap().as_deref(), Some("v"));
            store.rekey(None).unwrap();
        }
        let store = open_direct(options(dir.path(), "rotate"));
        assert_eq!(store.get_string("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn rekey_rejects_oversized_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_direct(options(dir.path(), "rekey-long"));
        assert!(matches!(
            store.rekey(Some("12345678901234567")),
            Err(Error::EncryptionKeyTooLong(17))
        ));
    }

    #[test]
    fn corrupted_tail_is_discarded_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path;
        {
            let store = open_direct(options(dir.path(), "torn"));
            store.set("first", "a").unwrap();
            store.set("second", "b").unwrap();
            store.set("third", "c").unwrap();
            path = store.path().to_path_buf();
        }
        let mut raw = std::fs::read(&path).unwrap();
        let committed = u64::from_le_bytes(raw[32..40].try_into().unwrap()) as usize;
        raw[committed - 1] ^= 0xff;
        std::fs::write(&path, &raw).unwrap();

        let store = open_direct(options(dir.path(), "torn"));
        assert_eq!(store.get_string("first").unwrap().as_deref(), Some("a"));
        assert_eq!(store.get_string("second").unwrap().as_deref(), Some("b"));
        assert_eq!(store.get_string("third").unwrap(), None);
        // The discarded region is gone from the committed length too.
        assert!(store.actual_size().unwrap() < committed as u64);
    }

    #[test]
    fn bogus_committed_length_falls_back_to_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path;
        {
            let store = open_direct(options(dir.path(), "scan"));
            store.set("k", "v").unwrap();
            path = store.path().to_path_buf();
        }
        let mut raw = std::fs::read(&path).unwrap();
        raw[32..40].copy_from_slice(&u64::MAX.to_le_bytes());
        std::fs::write(&path, &raw).unwrap();

        let store = open_direct(options(dir.path(), "scan"));
        assert_eq!(store.get_string("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn garbage_file_is_reinitialized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.mmkv");
        std::fs::write(&path, vec![0xabu8; 4096]).unwrap();

        let store = Store::open_uncached(options(dir.path(), "junk"), path).unwrap();
        assert!(store.is_empty().unwrap());
        store.set("k", "v").unwrap();
        assert_eq!(store.get_string("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn construction_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Store::open(options(dir.path(), "")),
            Err(Error::EmptyId)
        ));
        assert!(matches!(
            Store::open(options(dir.path(), "a").encryption_key("12345678901234567")),
            Err(Error::EncryptionKeyTooLong(17))
        ));
    }

    #[test]
    fn multi_process_instances_observe_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path(), "shared").mode(Mode::MultiProcess);
        let path = opts.dir.join(opts.file_name());
        let a = Store::open_uncached(opts.clone(), path.clone()).unwrap();
        let b = Store::open_uncached(opts, path).unwrap();

        a.set("k", "v").unwrap();
        assert_eq!(b.get_string("k").unwrap().as_deref(), Some("v"));

        b.set("flag", true).unwrap();
        assert_eq!(a.get_bool("flag").unwrap(), Some(true));

        // Force a growth past the initial page and read through the peer.
        let filler = "y".repeat(50);
        for i in 0..200 {
            a.set(&format!("grow{i}"), filler.as_str()).unwrap();
        }
        assert_eq!(
            b.get_string("grow150").unwrap().as_deref(),
            Some(filler.as_str())
        );
    }

    #[test]
    fn multi_process_rewrite_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path(), "rewrite").mode(Mode::MultiProcess);
        let path = opts.dir.join(opts.file_name());
        let a = Store::open_uncached(opts.clone(), path.clone()).unwrap();
        let b = Store::open_uncached(opts, path).unwrap();

        for i in 0..50 {
            a.set(&format!("k{i}"), i as f64).unwrap();
        }
        assert_eq!(b.len().unwrap(), 50);

        a.clear().unwrap();
        assert!(b.is_empty().unwrap());

        a.set("fresh", "value").unwrap();
        a.trim().unwrap();
        assert_eq!(b.get_string("fresh").unwrap().as_deref(), Some("value"));
    }
}
