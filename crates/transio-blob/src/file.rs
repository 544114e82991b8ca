//! Filesystem blob provider
//!
//! Blobs are content addressed and laid out as
//! `<root>/<aa>/<bb>/<sha256-hex>`, where `aa` and `bb` are the first two
//! byte pairs of the digest. Writes go through `<root>/tmp` and a rename, so
//! readers never observe a partial file. Re-writing existing content only
//! refreshes its mtime, which is what a GC pass compares against its start
//! time.

use crate::gc::{BinaryGarbageCollector, GcPass, GcStatus, GcTracker};
use crate::provider::BlobProvider;
use bytes::Bytes;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, trace, warn};
use transio_common::{Blob, BlobRef, Digest, Error, Result};

const TMP_DIR: &str = "tmp";

/// Blob provider storing one file per distinct content
pub struct FileBlobProvider {
    id: String,
    root: PathBuf,
    transient: bool,
    gc: GcTracker<SystemTime>,
}

impl FileBlobProvider {
    /// Open (or create) a transient provider rooted at `root`
    pub fn open(id: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(TMP_DIR))?;
        let id = id.into();
        debug!("Opened file blob provider {} at {:?}", id, root);
        Ok(Self {
            id,
            root,
            transient: true,
            gc: GcTracker::new(),
        })
    }

    /// Declare whether the provider holds transient data
    #[must_use]
    pub const fn with_transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`, rejecting anything but a digest
    fn blob_path(&self, key: &str) -> Option<PathBuf> {
        Digest::from_hex(key)?;
        let key = key.to_ascii_lowercase();
        Some(self.root.join(&key[0..2]).join(&key[2..4]).join(&key))
    }

    /// Whether bytes are stored under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.blob_path(key).is_some_and(|p| p.is_file())
    }

    fn write_new(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self
            .root
            .join(TMP_DIR)
            .join(uuid::Uuid::new_v4().to_string());
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }

    fn touch(path: &Path) -> io::Result<()> {
        fs::File::options()
            .write(true)
            .open(path)?
            .set_modified(SystemTime::now())
    }

    /// Every stored blob file with its key
    fn blob_files(&self) -> io::Result<Vec<(String, PathBuf)>> {
        let mut files = Vec::new();
        for level1 in fs::read_dir(&self.root)? {
            let level1 = level1?;
            if !level1.file_type()?.is_dir() || level1.file_name() == TMP_DIR {
                continue;
            }
            for level2 in fs::read_dir(level1.path())? {
                let level2 = level2?;
                if !level2.file_type()?.is_dir() {
                    continue;
                }
                for file in fs::read_dir(level2.path())? {
                    let file = file?;
                    if let Some(name) = file.file_name().to_str()
                        && Digest::from_hex(name).is_some()
                    {
                        files.push((name.to_string(), file.path()));
                    }
                }
            }
        }
        Ok(files)
    }

    fn sweep(&self, pass: &GcPass<SystemTime>) -> io::Result<(u64, u64, u64)> {
        let (mut kept, mut deleted, mut deleted_bytes) = (0u64, 0u64, 0u64);
        for (key, path) in self.blob_files()? {
            let meta = match fs::metadata(&path) {
                Ok(meta) => meta,
                // Concurrently removed
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            let written_after = meta.modified()? > pass.cutoff;
            if pass.keeps(&key, written_after) {
                kept += 1;
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    deleted += 1;
                    deleted_bytes += meta.len();
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to delete blob {:?}: {}", path, e),
            }
        }
        Ok((kept, deleted, deleted_bytes))
    }
}

impl BlobProvider for FileBlobProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn write_blob(&self, blob: &Blob) -> Result<String> {
        let key = Digest::compute(&blob.data).to_hex();
        let path = self
            .blob_path(&key)
            .ok_or_else(|| Error::internal("digest is not a valid blob key"))?;
        if path.is_file() {
            Self::touch(&path)?;
            trace!("{} write_blob -> {} (existing)", self.id, key);
        } else {
            self.write_new(&path, &blob.data)?;
            trace!("{} write_blob -> {} ({} bytes)", self.id, key, blob.length());
        }
        Ok(key)
    }

    fn read_blob(&self, blob_ref: &BlobRef) -> Result<Blob> {
        let not_found = || Error::BlobNotFound {
            key: blob_ref.provider_key.clone(),
        };
        let digest = Digest::from_hex(&blob_ref.provider_key).ok_or_else(not_found)?;
        let path = self.blob_path(&blob_ref.provider_key).ok_or_else(not_found)?;
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        if !digest.verify(&data) {
            return Err(Error::BlobProvider(format!(
                "content of {:?} does not match its digest",
                path
            )));
        }
        Ok(Blob::from_ref(blob_ref, Bytes::from(data)))
    }

    fn garbage_collector(&self) -> &dyn BinaryGarbageCollector {
        self
    }

    fn is_transient(&self) -> bool {
        self.transient
    }
}

impl BinaryGarbageCollector for FileBlobProvider {
    fn id(&self) -> String {
        format!("file:{}", self.root.display())
    }

    fn start(&self) -> Result<()> {
        self.gc.start(&self.id, SystemTime::now())?;
        debug!("{} GC started", self.id);
        Ok(())
    }

    fn mark(&self, key: &str) {
        self.gc.mark(key);
    }

    fn stop(&self, delete: bool) -> Result<GcStatus> {
        let pass = self.gc.take(&self.id)?;
        let (kept, deleted, deleted_bytes) = if delete {
            self.sweep(&pass)?
        } else {
            (self.blob_files()?.len() as u64, 0, 0)
        };
        let status = self
            .gc
            .finish(pass.into_status(kept, deleted, deleted_bytes, delete));
        debug!("{} GC stopped: {}", self.id, status);
        Ok(status)
    }

    fn is_in_progress(&self) -> bool {
        self.gc.in_progress()
    }

    fn status(&self) -> GcStatus {
        self.gc.last_status()
    }
}
