//! On-disk chunk store.
//!
//! Layout under `<datadir>/snapshots/<height>/`:
//!   - `manifest.dat`               serialized manifest (fixed field order)
//!   - `chunk-NNN.dat`              raw chunk bytes, one file per chunk
//!   - `snapshot-combined.tar.gz`   transient during extraction
//!
//! Chunk writes verify digest and size before touching disk, then write to a
//! temp file, fsync, and rename into place. Re-saving an already valid chunk
//! is permitted and idempotent.

use crate::error::SnapshotError;
use crate::manifest::Manifest;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const COMBINED_ARCHIVE_NAME: &str = "snapshot-combined.tar.gz";

pub struct ChunkStore {
    dir: PathBuf,
    manifest: Manifest,
}

impl ChunkStore {
    /// Open (or create) the store for `height` under `data_dir`.
    ///
    /// Loads `manifest.dat` if present and valid; otherwise installs the
    /// given fallback manifest (the one compiled into the binary) and writes
    /// it. Fails if the fallback itself is invalid.
    pub fn initialize(
        data_dir: &Path,
        height: u32,
        fallback: &Manifest,
    ) -> Result<Self, SnapshotError> {
        let dir = data_dir.join("snapshots").join(height.to_string());
        fs::create_dir_all(&dir)?;

        let manifest = match Self::load_manifest(&dir) {
            Some(m) => m,
            None => {
                if !fallback.is_valid() {
                    return Err(SnapshotError::ManifestInvalid(
                        "hardcoded manifest failed validation".into(),
                    ));
                }
                write_manifest(&dir, fallback)?;
                fallback.clone()
            }
        };

        info!(
            height,
            chunks = manifest.chunk_count(),
            dir = %dir.display(),
            "snapshot store initialized"
        );

        Ok(Self { dir, manifest })
    }

    fn load_manifest(dir: &Path) -> Option<Manifest> {
        let path = dir.join("manifest.dat");
        if !path.exists() {
            return None;
        }
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read manifest.dat");
                return None;
            }
        };
        match Manifest::from_bytes(&bytes) {
            Ok(m) if m.is_valid() => Some(m),
            Ok(_) => {
                warn!(path = %path.display(), "stored manifest is invalid; ignoring");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to decode manifest.dat");
                None
            }
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.dir
    }

    fn chunk_path(&self, chunk: u32) -> PathBuf {
        self.dir.join(format!("chunk-{:03}.dat", chunk))
    }

    pub fn has_chunk(&self, chunk: u32) -> bool {
        chunk < self.manifest.chunk_count() && self.chunk_path(chunk).exists()
    }

    pub fn has_all_chunks(&self) -> bool {
        (0..self.manifest.chunk_count()).all(|i| self.has_chunk(i))
    }

    /// Verify and persist a chunk. Digest or size mismatch leaves the store
    /// untouched; the caller penalizes the source peer and retries elsewhere.
    pub fn save_chunk(&self, chunk: u32, data: &[u8]) -> Result<(), SnapshotError> {
        self.manifest.verify_chunk(chunk, data)?;

        let path = self.chunk_path(chunk);
        let tmp = path.with_extension("dat.tmp");
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(data)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        debug!(chunk, bytes = data.len(), "saved chunk");
        Ok(())
    }

    /// Read a whole chunk into memory. Does not re-verify; callers may do so
    /// for defense in depth.
    pub fn load_chunk(&self, chunk: u32) -> Result<Vec<u8>, SnapshotError> {
        if chunk >= self.manifest.chunk_count() {
            return Err(SnapshotError::ChunkOutOfRange {
                chunk,
                count: self.manifest.chunk_count(),
            });
        }
        let path = self.chunk_path(chunk);
        if !path.exists() {
            return Err(SnapshotError::ChunkMissing { chunk });
        }
        Ok(fs::read(path)?)
    }

    /// Concatenate all chunks into the combined archive and extract it under
    /// `data_dir`. The combined file is removed on success and left in place
    /// on failure for diagnosis.
    ///
    /// This is a long blocking operation (possibly a minute for a full
    /// snapshot); run it outside any scheduler critical section.
    pub fn extract_snapshot(&self, data_dir: &Path) -> Result<(), SnapshotError> {
        for i in 0..self.manifest.chunk_count() {
            if !self.has_chunk(i) {
                return Err(SnapshotError::ChunkMissing { chunk: i });
            }
        }

        let combined = self.dir.join(COMBINED_ARCHIVE_NAME);
        info!(path = %combined.display(), "combining snapshot chunks");
        {
            let mut out = fs::File::create(&combined)?;
            for i in 0..self.manifest.chunk_count() {
                let mut src = fs::File::open(self.chunk_path(i))?;
                std::io::copy(&mut src, &mut out)?;
                debug!(chunk = i + 1, total = self.manifest.chunk_count(), "combined chunk");
            }
            out.sync_all()?;
        }

        info!(dest = %data_dir.display(), "extracting snapshot archive");
        let archive = fs::File::open(&combined)?;
        let decoder = flate2::read::GzDecoder::new(archive);
        let mut tarball = tar::Archive::new(decoder);
        if let Err(e) = tarball.unpack(data_dir) {
            return Err(SnapshotError::Extraction(e.to_string()));
        }

        fs::remove_file(&combined)?;
        info!("snapshot extracted");
        Ok(())
    }

    /// Remove the snapshot directory and everything in it.
    pub fn cleanup_chunks(&self) -> Result<(), SnapshotError> {
        fs::remove_dir_all(&self.dir)?;
        info!(dir = %self.dir.display(), "removed snapshot directory");
        Ok(())
    }
}

fn write_manifest(dir: &Path, manifest: &Manifest) -> Result<(), SnapshotError> {
    let path = dir.join("manifest.dat");
    let tmp = dir.join("manifest.dat.tmp");
    fs::write(&tmp, manifest.to_bytes()?)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}
