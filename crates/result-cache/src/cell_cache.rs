//! Cache manager: source, desired-cell, and undesired-cell file operations.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{NativeEndian, ReadBytesExt};
use tracing::{debug, info, warn};

use study_common::{Source, SourceKey};
use study_grid::StudyGrid;

use crate::error::{CacheError, CacheResult};
use crate::files::{desired_path, lock_exclusive, lock_shared, undesired_path};
use crate::records::{CacheHeader, CellRecord, CACHE_MAGIC, CACHE_VERSION, CELL_RECORD_LEN, HEADER_LEN};
use crate::source_cache::{
    decode_child, decode_source, encode_child, encode_source, sources_match, ChildBrief,
};
use crate::{checksum_seed, checksum_update};

/// Cache manager for one study directory.
///
/// Tracks the tail checksum of every undesired cache read this run
/// (`ucache_checksums`), which is what lets a later append detect that a
/// cooperating process got there first.
#[derive(Debug)]
pub struct ResultCache {
    study_dir: PathBuf,
    user_terrain_version: u32,
    user_terrain_requested: bool,
    ucache_checksums: HashMap<(SourceKey, Option<SourceKey>), u32>,
    version_warned: bool,
}

impl ResultCache {
    pub fn new(
        study_dir: impl Into<PathBuf>,
        user_terrain_version: u32,
        user_terrain_requested: bool,
    ) -> Self {
        Self {
            study_dir: study_dir.into(),
            user_terrain_version,
            user_terrain_requested,
            ucache_checksums: HashMap::new(),
            version_warned: false,
        }
    }

    pub fn study_dir(&self) -> &Path {
        &self.study_dir
    }

    /// Tail checksum retained from the last undesired read, if any.
    pub fn ucache_checksum(&self, key: SourceKey, desired: Option<SourceKey>) -> Option<u32> {
        self.ucache_checksums.get(&(key, desired)).copied()
    }

    fn header(&self, key: SourceKey, user_terrain_used: bool) -> CacheHeader {
        CacheHeader {
            version: CACHE_VERSION,
            source_key: key,
            user_terrain_version: self.user_terrain_version,
            user_terrain_requested: self.user_terrain_requested,
            user_terrain_used,
        }
    }

    /// Header acceptance. A version mismatch drops the cache silently, one
    /// log line per run; terrain-source changes drop it too, since cached
    /// fields may depend on user terrain that has since changed.
    fn header_ok(&mut self, path: &Path, header: &CacheHeader, key: SourceKey) -> bool {
        if header.version != CACHE_VERSION {
            if !self.version_warned {
                info!(
                    path = %path.display(),
                    found = header.version,
                    expected = CACHE_VERSION,
                    "cache version changed, ignoring existing caches"
                );
                self.version_warned = true;
            }
            return false;
        }
        if header.source_key != key {
            warn!(path = %path.display(), "cache header names the wrong source");
            return false;
        }
        if header.user_terrain_requested != self.user_terrain_requested {
            return false;
        }
        if header.user_terrain_requested
            && header.user_terrain_version != self.user_terrain_version
        {
            return false;
        }
        true
    }

    // ========================================================================
    // Source files
    // ========================================================================

    /// Rewrite a source's cache record under an exclusive flock. For DTS
    /// parents the reference facility is written in full and each child as
    /// an abbreviated record.
    pub fn write_source(
        &self,
        source: &Source,
        all_sources: &HashMap<SourceKey, Source>,
        user_terrain_used: bool,
    ) -> CacheResult<()> {
        let mut lock = lock_exclusive(&self.study_dir, source.key)?;

        let mut buf = Vec::new();
        self.header(source.key, user_terrain_used).write_to(&mut buf);
        encode_source(&mut buf, source);
        if let Some(dts) = source.dts() {
            if let Some(reference) = all_sources.get(&dts.reference_facility) {
                buf.push(1);
                encode_source(&mut buf, reference);
            } else {
                buf.push(0);
            }
            buf.extend_from_slice(&(dts.children.len() as u32).to_ne_bytes());
            for key in &dts.children {
                if let Some(child) = all_sources.get(key) {
                    encode_child(&mut buf, &ChildBrief::of(child));
                }
            }
        }

        let path = lock.path().to_path_buf();
        let file = lock.file();
        file.set_len(0).map_err(|e| CacheError::io(&path, e))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| CacheError::io(&path, e))?;
        file.write_all(&buf).map_err(|e| CacheError::io(&path, e))?;
        Ok(())
    }

    /// Validate a source's cache against the live records. `Ok(true)` means
    /// the cached parameters match and the cell caches are trustworthy; any
    /// mismatch drops the source's whole cache.
    pub fn read_source(
        &mut self,
        key: SourceKey,
        live: &Source,
        all_sources: &HashMap<SourceKey, Source>,
    ) -> CacheResult<bool> {
        let mut lock = match lock_shared(&self.study_dir, key)? {
            Some(l) => l,
            None => return Ok(false),
        };

        let path = lock.path().to_path_buf();
        let mut buf = Vec::new();
        lock.file()
            .read_to_end(&mut buf)
            .map_err(|e| CacheError::io(&path, e))?;
        drop(lock);

        match self.parse_and_compare(&path, &buf, key, live, all_sources) {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.drop_source_cache(key);
                Ok(false)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable source cache, dropping");
                self.drop_source_cache(key);
                Ok(false)
            }
        }
    }

    fn parse_and_compare(
        &mut self,
        path: &Path,
        buf: &[u8],
        key: SourceKey,
        live: &Source,
        all_sources: &HashMap<SourceKey, Source>,
    ) -> CacheResult<bool> {
        let header = CacheHeader::read_from(path, buf)?;
        if !self.header_ok(path, &header, key) {
            return Ok(false);
        }

        let mut cursor = Cursor::new(&buf[HEADER_LEN..]);
        let cached = decode_source(path, &mut cursor)?;
        if !sources_match(&cached, live) {
            debug!(key, "cached source parameters differ from live record");
            return Ok(false);
        }

        if let Some(dts) = live.dts() {
            let has_reference = cursor
                .read_u8()
                .map_err(|_| CacheError::corrupt(path, "missing reference flag"))?;
            if has_reference != 0 {
                let cached_ref = decode_source(path, &mut cursor)?;
                match all_sources.get(&dts.reference_facility) {
                    Some(live_ref) if sources_match(&cached_ref, live_ref) => {}
                    _ => return Ok(false),
                }
            } else if all_sources.contains_key(&dts.reference_facility) {
                return Ok(false);
            }

            let count = cursor
                .read_u32::<NativeEndian>()
                .map_err(|_| CacheError::corrupt(path, "missing child count"))?
                as usize;
            if count != dts.children.len() {
                return Ok(false);
            }
            for child_key in &dts.children {
                let brief = decode_child(path, &mut cursor)?;
                match all_sources.get(child_key) {
                    Some(live_child) if brief.matches(live_child) => {}
                    _ => return Ok(false),
                }
            }
        }
        Ok(true)
    }

    /// Delete every cache file belonging to a source.
    pub fn drop_source_cache(&self, key: SourceKey) {
        let mut paths = vec![
            crate::files::source_path(&self.study_dir, key),
            desired_path(&self.study_dir, key),
            undesired_path(&self.study_dir, key, None),
        ];
        // Local-grid undesired caches are split per desired source.
        let prefix = format!("{key}_");
        if let Ok(entries) = std::fs::read_dir(self.study_dir.join("undesired_cell")) {
            for entry in entries.flatten() {
                if entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(&prefix)
                {
                    paths.push(entry.path());
                }
            }
        }
        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "dropped cache file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to drop cache file"),
            }
        }
    }

    // ========================================================================
    // Desired-cell files
    // ========================================================================

    /// Fully rewrite a source's desired-cell dump. Record checksums are
    /// finalized here; the end-of-file magic closes the dump.
    pub fn write_desired(
        &self,
        key: SourceKey,
        user_terrain_used: bool,
        records: &mut [CellRecord],
    ) -> CacheResult<()> {
        let _lock = lock_exclusive(&self.study_dir, key)?;
        let path = desired_path(&self.study_dir, key);

        let mut running = checksum_seed(key);
        let mut buf = Vec::with_capacity(HEADER_LEN + records.len() * CELL_RECORD_LEN + 4);
        self.header(key, user_terrain_used).write_to(&mut buf);
        for rec in records.iter_mut() {
            running = checksum_update(running, rec.cell_lat, rec.cell_lon, rec.population);
            rec.checksum = running;
            rec.write_to(&mut buf);
        }
        buf.extend_from_slice(&CACHE_MAGIC.to_ne_bytes());

        std::fs::write(&path, &buf).map_err(|e| CacheError::io(&path, e))
    }

    /// Read a source's desired-cell dump. `Ok(None)` when absent or dropped;
    /// a record naming a cell outside the study grid is a hard error and the
    /// cache survives for inspection.
    pub fn read_desired(
        &mut self,
        key: SourceKey,
        grid: &StudyGrid,
    ) -> CacheResult<Option<Vec<CellRecord>>> {
        let lock = match lock_shared(&self.study_dir, key)? {
            Some(l) => l,
            None => return Ok(None),
        };
        let path = desired_path(&self.study_dir, key);
        let buf = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&path, e)),
        };
        drop(lock);

        match self.parse_desired(&path, &buf, key, grid) {
            Ok(out) => Ok(out),
            Err(err @ CacheError::CellOutsideGrid { .. }) => {
                // The cache may be fine and the grid wrong; log and fail
                // without deleting anything.
                warn!(error = %err, "desired cache names a cell outside the grid");
                Err(err)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "corrupt desired cache, dropping");
                let _ = std::fs::remove_file(&path);
                Ok(None)
            }
        }
    }

    fn parse_desired(
        &mut self,
        path: &Path,
        buf: &[u8],
        key: SourceKey,
        grid: &StudyGrid,
    ) -> CacheResult<Option<Vec<CellRecord>>> {
        let header = CacheHeader::read_from(path, buf)?;
        if !self.header_ok(path, &header, key) {
            return Ok(None);
        }

        let body = &buf[HEADER_LEN..];
        if body.len() < 4 {
            return Err(CacheError::corrupt(path, "missing end-of-file magic"));
        }
        let tail = u32::from_ne_bytes(body[body.len() - 4..].try_into().expect("4 bytes"));
        if tail != CACHE_MAGIC {
            return Err(CacheError::corrupt(path, "end-of-file magic absent"));
        }
        let record_bytes = &body[..body.len() - 4];
        if record_bytes.len() % CELL_RECORD_LEN != 0 {
            return Err(CacheError::corrupt(path, "truncated cell record"));
        }

        let mut running = checksum_seed(key);
        let mut cursor = Cursor::new(record_bytes);
        let mut out = Vec::with_capacity(record_bytes.len() / CELL_RECORD_LEN);
        while (cursor.position() as usize) < record_bytes.len() {
            let rec = CellRecord::read_from(&mut cursor)
                .map_err(|_| CacheError::corrupt(path, "truncated cell record"))?;
            running = checksum_update(running, rec.cell_lat, rec.cell_lon, rec.population);
            if rec.checksum != running {
                return Err(CacheError::corrupt(path, "cell record checksum mismatch"));
            }
            if grid.cell_for_index(rec.cell_lat, rec.cell_lon).is_none() {
                return Err(CacheError::CellOutsideGrid {
                    path: path.to_path_buf(),
                    cell_lat: rec.cell_lat,
                    cell_lon: rec.cell_lon,
                });
            }
            out.push(rec);
        }
        Ok(Some(out))
    }

    // ========================================================================
    // Undesired-cell files
    // ========================================================================

    /// Read an undesired-cell cache. Records for cells outside the grid are
    /// silently skipped (the file legitimately holds data for other grids).
    /// On success the file's last checksum is retained for conflict
    /// detection at append time.
    pub fn read_undesired(
        &mut self,
        key: SourceKey,
        desired: Option<SourceKey>,
        grid: &StudyGrid,
    ) -> CacheResult<Option<Vec<CellRecord>>> {
        let lock = match lock_shared(&self.study_dir, key)? {
            Some(l) => l,
            None => return Ok(None),
        };
        let path = undesired_path(&self.study_dir, key, desired);
        let buf = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&path, e)),
        };
        drop(lock);

        match self.parse_undesired(&path, &buf, key, desired, grid) {
            Ok(out) => Ok(out),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "corrupt undesired cache, dropping");
                let _ = std::fs::remove_file(&path);
                self.ucache_checksums.remove(&(key, desired));
                Ok(None)
            }
        }
    }

    fn parse_undesired(
        &mut self,
        path: &Path,
        buf: &[u8],
        key: SourceKey,
        desired: Option<SourceKey>,
        grid: &StudyGrid,
    ) -> CacheResult<Option<Vec<CellRecord>>> {
        let header = CacheHeader::read_from(path, buf)?;
        if !self.header_ok(path, &header, key) {
            return Ok(None);
        }
        let record_bytes = &buf[HEADER_LEN..];
        if record_bytes.len() % CELL_RECORD_LEN != 0 {
            return Err(CacheError::corrupt(path, "truncated cell record"));
        }

        let mut running = checksum_seed(key);
        let mut cursor = Cursor::new(record_bytes);
        let mut out = Vec::new();
        let mut tail = None;
        while (cursor.position() as usize) < record_bytes.len() {
            let rec = CellRecord::read_from(&mut cursor)
                .map_err(|_| CacheError::corrupt(path, "truncated cell record"))?;
            running = checksum_update(running, rec.cell_lat, rec.cell_lon, rec.population);
            if rec.checksum != running {
                return Err(CacheError::corrupt(path, "cell record checksum mismatch"));
            }
            tail = Some(rec.checksum);
            if grid.cell_for_index(rec.cell_lat, rec.cell_lon).is_some() {
                out.push(rec);
            }
        }

        self.ucache_checksums
            .insert((key, desired), tail.unwrap_or_else(|| checksum_seed(key)));
        Ok(Some(out))
    }

    /// Append records to an undesired-cell cache.
    ///
    /// The file's current tail checksum is re-read under the exclusive lock
    /// and compared to the one retained at read time; if they differ another
    /// process appended in between, and this writer silently abandons the
    /// write (returns `Ok(false)`). The computation never depends on the
    /// append landing.
    pub fn append_undesired(
        &mut self,
        key: SourceKey,
        desired: Option<SourceKey>,
        user_terrain_used: bool,
        records: &[CellRecord],
    ) -> CacheResult<bool> {
        let _lock = lock_exclusive(&self.study_dir, key)?;
        let path = undesired_path(&self.study_dir, key, desired);

        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| CacheError::io(&path, e))?;
        let len = file
            .metadata()
            .map_err(|e| CacheError::io(&path, e))?
            .len() as usize;

        let mut running;
        if len <= HEADER_LEN {
            // Fresh file: write the header and start from the seed.
            let mut buf = Vec::with_capacity(HEADER_LEN);
            self.header(key, user_terrain_used).write_to(&mut buf);
            file.set_len(0).map_err(|e| CacheError::io(&path, e))?;
            file.seek(SeekFrom::Start(0))
                .map_err(|e| CacheError::io(&path, e))?;
            file.write_all(&buf).map_err(|e| CacheError::io(&path, e))?;
            running = checksum_seed(key);
        } else {
            if (len - HEADER_LEN) % CELL_RECORD_LEN != 0 {
                return Err(CacheError::corrupt(&path, "truncated cell record"));
            }
            // Re-read the tail record's checksum under the lock.
            file.seek(SeekFrom::End(-(CELL_RECORD_LEN as i64)))
                .map_err(|e| CacheError::io(&path, e))?;
            let mut rec_buf = vec![0u8; CELL_RECORD_LEN];
            file.read_exact(&mut rec_buf)
                .map_err(|e| CacheError::io(&path, e))?;
            let tail_rec = CellRecord::read_from(&mut Cursor::new(&rec_buf))
                .map_err(|_| CacheError::corrupt(&path, "unreadable tail record"))?;

            let expected = self.ucache_checksums.get(&(key, desired)).copied();
            if expected != Some(tail_rec.checksum) {
                debug!(
                    key,
                    ?desired,
                    "undesired cache advanced since our read, abandoning append"
                );
                return Ok(false);
            }
            running = tail_rec.checksum;
            file.seek(SeekFrom::End(0))
                .map_err(|e| CacheError::io(&path, e))?;
        }

        let mut buf = Vec::with_capacity(records.len() * CELL_RECORD_LEN);
        for rec in records {
            let mut rec = *rec;
            running = checksum_update(running, rec.cell_lat, rec.cell_lon, rec.population);
            rec.checksum = running;
            rec.write_to(&mut buf);
        }
        file.write_all(&buf).map_err(|e| CacheError::io(&path, e))?;
        self.ucache_checksums.insert((key, desired), running);
        Ok(true)
    }
}
