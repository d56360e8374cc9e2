use bincode::{deserialize_from, serialize_into};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use crate::table::DataFrame;

/// Per-session on-disk snapshot of the last materialized dataset
///
/// One gzip-compressed bincode file per session id. Writes are best effort:
/// a failed store is logged and the next paginated read simply finds no
/// snapshot. There is no eviction and no locking, so concurrent writers for
/// the same session id overwrite each other.
#[derive(Debug, Clone)]
pub struct SessionCache {
    dir: PathBuf,
}

impl SessionCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SessionCache { dir: dir.into() }
    }

    fn path_for(&self, sid: &str) -> PathBuf {
        self.dir.join(format!("{}.bin.gz", sid))
    }

    /// Snapshot `df` for `sid`, logging instead of failing
    pub fn store(&self, sid: &str, df: &DataFrame) {
        if let Err(e) = self.try_store(sid, df) {
            log::warn!("Failed to cache dataset for session {}: {}", sid, e);
        }
    }

    fn try_store(&self, sid: &str, df: &DataFrame) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let file = File::create(self.path_for(sid))?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut writer = BufWriter::new(encoder);

        serialize_into(&mut writer, df)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        let encoder = writer.into_inner().map_err(|e| e.into_error())?;
        encoder.finish()?.flush()?;
        Ok(())
    }

    /// Read back the snapshot for `sid`; missing or unreadable snapshots are `None`
    pub fn load(&self, sid: &str) -> Option<DataFrame> {
        let path = self.path_for(sid);
        let file = File::open(&path).ok()?;
        let mut reader = BufReader::new(GzDecoder::new(file));

        match deserialize_from(&mut reader) {
            Ok(df) => Some(df),
            Err(e) => {
                log::warn!("Discarding unreadable cache {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Remove the snapshot for `sid` if there is one
    pub fn clear(&self, sid: &str) {
        let path = self.path_for(sid);
        match std::fs::remove_file(&path) {
            Ok(()) => log::debug!("Cleared cache {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to clear cache {}: {}", path.display(), e),
        }
    }
}
