//! Content Cache
//!
//! Decoded datasets and chunk sets are cached by the hash of the source
//! bytes. The backing store only deals in opaque byte blobs; typed values
//! are encoded with bincode on the way in and out.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::CoreResult;

/// Content-addressed key derived from source bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub u64);

impl ContentHash {
    /// Hash content bytes
    pub fn from_content(content: &[u8]) -> Self {
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Combine with another hashable value, e.g. the settings a product was built with
    pub fn with_salt<H: Hash>(self, salt: &H) -> Self {
        let mut hasher = DefaultHasher::new();
        self.0.hash(&mut hasher);
        salt.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Get the raw hash value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Key-value byte store
pub trait ByteStore: Send + Sync {
    /// Fetch the bytes stored under `kind`/`hash`
    fn get(&self, kind: &str, hash: ContentHash) -> CoreResult<Option<Vec<u8>>>;

    /// Store bytes under `kind`/`hash`, replacing any previous value
    fn put(&self, kind: &str, hash: ContentHash, bytes: Vec<u8>) -> CoreResult<()>;

    /// Drop everything
    fn clear(&self) -> CoreResult<()>;
}

impl<S: ByteStore + ?Sized> ByteStore for Arc<S> {
    fn get(&self, kind: &str, hash: ContentHash) -> CoreResult<Option<Vec<u8>>> {
        (**self).get(kind, hash)
    }

    fn put(&self, kind: &str, hash: ContentHash, bytes: Vec<u8>) -> CoreResult<()> {
        (**self).put(kind, hash, bytes)
    }

    fn clear(&self) -> CoreResult<()> {
        (**self).clear()
    }
}

/// In-process byte store
#[derive(Default)]
pub struct MemoryByteStore {
    entries: RwLock<AHashMap<(String, ContentHash), Vec<u8>>>,
}

impl MemoryByteStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ByteStore for MemoryByteStore {
    fn get(&self, kind: &str, hash: ContentHash) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(&(kind.to_string(), hash)).cloned())
    }

    fn put(&self, kind: &str, hash: ContentHash, bytes: Vec<u8>) -> CoreResult<()> {
        self.entries.write().insert((kind.to_string(), hash), bytes);
        Ok(())
    }

    fn clear(&self) -> CoreResult<()> {
        self.entries.write().clear();
        Ok(())
    }
}

/// Byte store persisted as one file per entry in a directory
pub struct DirByteStore {
    root: PathBuf,
}

impl DirByteStore {
    /// Open (and create if needed) a cache directory
    pub fn open(root: impl AsRef<Path>) -> CoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Get the cache directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, kind: &str, hash: ContentHash) -> PathBuf {
        self.root.join(format!("{}-{}.bin", kind, hash))
    }
}

impl ByteStore for DirByteStore {
    fn get(&self, kind: &str, hash: ContentHash) -> CoreResult<Option<Vec<u8>>> {
        match std::fs::read(self.entry_path(kind, hash)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn put(&self, kind: &str, hash: ContentHash, bytes: Vec<u8>) -> CoreResult<()> {
        std::fs::write(self.entry_path(kind, hash), bytes)?;
        Ok(())
    }

    fn clear(&self) -> CoreResult<()> {
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "bin") {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

/// Typed cache over a byte store
pub struct ContentCache<S: ByteStore> {
    store: S,
}

impl<S: ByteStore> ContentCache<S> {
    /// Wrap a byte store
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Get the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load a cached value.
    ///
    /// Unreadable or undecodable entries count as a miss.
    pub fn load<T: DeserializeOwned>(&self, kind: &str, hash: ContentHash) -> Option<T> {
        let bytes = match self.store.get(kind, hash) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                log::warn!("Cache read failed for {}-{}: {}", kind, hash, err);
                return None;
            }
        };

        match bincode::deserialize(&bytes) {
            Ok(value) => {
                log::debug!("Cache hit for {}-{}", kind, hash);
                Some(value)
            }
            Err(err) => {
                log::warn!("Discarding corrupt cache entry {}-{}: {}", kind, hash, err);
                None
            }
        }
    }

    /// Store a value
    pub fn save<T: Serialize>(&self, kind: &str, hash: ContentHash, value: &T) -> CoreResult<()> {
        let bytes = bincode::serialize(value)?;
        log::debug!("Caching {}-{} ({} bytes)", kind, hash, bytes.len());
        self.store.put(kind, hash, bytes)
    }

    /// Drop every cached entry
    pub fn clear(&self) -> CoreResult<()> {
        self.store.clear()
    }
}
