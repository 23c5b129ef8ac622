//! # Word-Level Recitation Timing Data
//!
//! This module loads and indexes quran-align word alignment tables: for one
//! reciter, each verse carries a list of word segments with millisecond
//! boundaries inside the surah's audio track. The synchronizer
//! ([`crate::sync`]) answers "which word is playing" against these tables.
//!
//! ## Data Source
//!
//! The alignment documents come from the quran-align project (CC BY 4.0).
//! One JSON file per reciter and surah, an array of verse records:
//!
//! ```json
//! [
//!   { "surah": 1, "ayah": 1, "segments": [[0, 1, 0, 620], [1, 2, 620, 1480]],
//!     "stats": { "insertions": 0, "deletions": 0, "transpositions": 0 } }
//! ]
//! ```
//!
//! Each segment is `[word_start, word_end, start_ms, end_ms]`.
//!
//! ## Validation
//!
//! Segment lists must be sorted, non-overlapping, and have `start < end`.
//! A verse that violates this degrades to verse-level granularity (the
//! verse stays in the table with its time bounds, but word lookup is
//! disabled for it) — corrupt data for one verse never rejects the whole
//! table or interrupts playback.
//!
//! ## Caching Strategy
//!
//! Tables are immutable once built. [`TimingStore`] keeps a session-scoped
//! in-memory map keyed by (reciter, surah) and mirrors fetched documents to
//! an on-disk JSON cache so a restart does not refetch. Cache write
//! failures are logged and non-fatal.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{fs, io};
use thiserror::Error;

/// Failure modes for timing-table loading.
///
/// None of these stop audio playback; a missing or unreadable table only
/// means word highlighting is unavailable.
#[derive(Error, Debug)]
pub enum TimingError {
    /// No alignment document exists for this reciter/surah pair
    #[error("no timing data for reciter {reciter:?}, surah {surah}")]
    Unavailable { reciter: String, surah: u16 },

    /// Reading the document failed (permissions, disk, transport)
    #[error("timing data IO: {0}")]
    Io(#[from] io::Error),

    /// The document is not valid alignment JSON
    #[error("timing data parse: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One word span and its time window within the surah audio.
///
/// `word_start`/`word_end` index into the verse's word sequence;
/// `[start_ms, end_ms)` is the half-open playback interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u16, u16, u32, u32)", into = "(u16, u16, u32, u32)")]
pub struct WordTiming {
    pub word_start: u16,
    pub word_end: u16,
    pub start_ms: u32,
    pub end_ms: u32,
}

impl From<(u16, u16, u32, u32)> for WordTiming {
    fn from((word_start, word_end, start_ms, end_ms): (u16, u16, u32, u32)) -> Self {
        WordTiming {
            word_start,
            word_end,
            start_ms,
            end_ms,
        }
    }
}

impl From<WordTiming> for (u16, u16, u32, u32) {
    fn from(w: WordTiming) -> Self {
        (w.word_start, w.word_end, w.start_ms, w.end_ms)
    }
}

/// Alignment accuracy counters carried by the quran-align documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentStats {
    #[serde(default)]
    pub insertions: u32,
    #[serde(default)]
    pub deletions: u32,
    #[serde(default)]
    pub transpositions: u32,
}

/// Raw per-verse record as it appears in the alignment document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerseTimingRecord {
    pub surah: u16,
    pub ayah: u16,
    pub segments: Vec<WordTiming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<SegmentStats>,
}

/// Validated timing data for one verse.
///
/// `word_accurate` is false when the raw segments failed validation; the
/// verse then only supports verse-level lookup via its time bounds.
#[derive(Debug, Clone)]
pub struct VerseTiming {
    pub surah: u16,
    pub ayah: u16,
    /// Sorted, contiguous word segments; empty when not word-accurate
    pub segments: Vec<WordTiming>,
    /// First segment start (or raw minimum for degraded verses)
    pub start_ms: u32,
    /// Last segment end (or raw maximum for degraded verses)
    pub end_ms: u32,
    pub word_accurate: bool,
    pub stats: Option<SegmentStats>,
}

impl VerseTiming {
    /// Playback duration of this verse in milliseconds.
    pub fn duration_ms(&self) -> u32 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// Index of the segment whose `[start_ms, end_ms)` window contains
    /// `position_ms`, by binary search. `None` for gaps, positions outside
    /// the verse, and verses without word-accurate data.
    pub fn word_at(&self, position_ms: u32) -> Option<usize> {
        if !self.word_accurate {
            return None;
        }
        // partition_point: number of segments starting at or before position
        let idx = self
            .segments
            .partition_point(|s| s.start_ms <= position_ms);
        let candidate = idx.checked_sub(1)?;
        let seg = &self.segments[candidate];
        (position_ms < seg.end_ms).then_some(candidate)
    }
}

/// Immutable word-timing table for one reciter.
///
/// Indexed two ways: O(1) lookup by (surah, ayah), and per-surah verse
/// lists sorted by start time for sequential playback. A full recitation
/// holds ~6,236 verse entries, so the composite-key index matters.
#[derive(Debug)]
pub struct TimingTable {
    reciter: String,
    verses: Vec<VerseTiming>,
    by_key: HashMap<(u16, u16), usize>,
    by_surah: HashMap<u16, Vec<usize>>,
}

impl TimingTable {
    /// Validate raw records and build the indexes.
    ///
    /// Verses with malformed segment lists are kept at verse-level
    /// granularity and logged; duplicate (surah, ayah) keys keep the first
    /// occurrence.
    pub fn from_records(reciter: &str, records: Vec<VerseTimingRecord>) -> TimingTable {
        let mut verses = Vec::with_capacity(records.len());
        let mut by_key = HashMap::with_capacity(records.len());
        let mut by_surah: HashMap<u16, Vec<usize>> = HashMap::new();

        for record in records {
            let key = (record.surah, record.ayah);
            if by_key.contains_key(&key) {
                warn!(
                    "duplicate timing record for {}:{}, keeping first",
                    record.surah, record.ayah
                );
                continue;
            }

            let verse = match validate_segments(&record.segments) {
                Ok(()) => {
                    let start_ms = record.segments.first().map_or(0, |s| s.start_ms);
                    let end_ms = record.segments.last().map_or(0, |s| s.end_ms);
                    VerseTiming {
                        surah: record.surah,
                        ayah: record.ayah,
                        segments: record.segments,
                        start_ms,
                        end_ms,
                        word_accurate: true,
                        stats: record.stats,
                    }
                }
                Err(reason) => {
                    warn!(
                        "corrupt segments for {}:{} ({reason}); verse-level only",
                        record.surah, record.ayah
                    );
                    let start_ms = record.segments.iter().map(|s| s.start_ms).min().unwrap_or(0);
                    let end_ms = record.segments.iter().map(|s| s.end_ms).max().unwrap_or(0);
                    VerseTiming {
                        surah: record.surah,
                        ayah: record.ayah,
                        segments: Vec::new(),
                        start_ms,
                        end_ms,
                        word_accurate: false,
                        stats: record.stats,
                    }
                }
            };

            by_key.insert(key, verses.len());
            by_surah.entry(verse.surah).or_default().push(verses.len());
            verses.push(verse);
        }

        // Playback order within each surah follows audio time, not ayah
        // numbering, per the contiguity invariant of the source data
        for indices in by_surah.values_mut() {
            indices.sort_by_key(|&i| verses[i].start_ms);
        }

        TimingTable {
            reciter: reciter.to_string(),
            verses,
            by_key,
            by_surah,
        }
    }

    pub fn reciter(&self) -> &str {
        &self.reciter
    }

    /// O(1) lookup by composite key.
    pub fn verse(&self, surah: u16, ayah: u16) -> Option<&VerseTiming> {
        self.by_key.get(&(surah, ayah)).map(|&i| &self.verses[i])
    }

    /// Verses of one surah in playback order.
    pub fn surah_verses(&self, surah: u16) -> Vec<&VerseTiming> {
        self.by_surah
            .get(&surah)
            .map(|indices| indices.iter().map(|&i| &self.verses[i]).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.verses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verses.is_empty()
    }
}

/// Check the per-verse segment invariants: non-empty, `start < end`,
/// sorted ascending, non-overlapping.
fn validate_segments(segments: &[WordTiming]) -> Result<(), &'static str> {
    if segments.is_empty() {
        return Err("no segments");
    }
    for seg in segments {
        if seg.start_ms >= seg.end_ms {
            return Err("segment start not before end");
        }
    }
    for pair in segments.windows(2) {
        if pair[1].start_ms < pair[0].end_ms {
            return Err("segments overlap or out of order");
        }
    }
    Ok(())
}

/// Supplies raw alignment documents for (reciter, surah) pairs.
///
/// The production implementation reads bundled files; tests substitute an
/// in-memory source.
pub trait TimingSource {
    fn fetch(&self, reciter: &str, surah: u16) -> Result<Vec<VerseTimingRecord>, TimingError>;
}

/// File-backed source: `<root>/<reciter>/<surah, zero-padded>.json`.
#[derive(Debug, Clone)]
pub struct FileTimingSource {
    root: PathBuf,
}

impl FileTimingSource {
    pub fn new<P: Into<PathBuf>>(root: P) -> FileTimingSource {
        FileTimingSource { root: root.into() }
    }

    fn document_path(&self, reciter: &str, surah: u16) -> PathBuf {
        self.root.join(reciter).join(format!("{surah:03}.json"))
    }
}

impl TimingSource for FileTimingSource {
    fn fetch(&self, reciter: &str, surah: u16) -> Result<Vec<VerseTimingRecord>, TimingError> {
        let path = self.document_path(reciter, surah);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TimingError::Unavailable {
                    reciter: reciter.to_string(),
                    surah,
                })
            }
            Err(e) => return Err(TimingError::Io(e)),
        };
        Ok(serde_json::from_slice(&data)?)
    }
}

/// Session-scoped timing-table store with a two-level cache.
///
/// Lookup order: in-memory map, then the on-disk mirror, then the source.
/// Tables are shared as `Arc` so the synchronizer can hold one while the
/// store keeps serving other surahs.
pub struct TimingStore<S: TimingSource> {
    source: S,
    cache_dir: Option<PathBuf>,
    memory: HashMap<(String, u16), Arc<TimingTable>>,
}

impl<S: TimingSource> TimingStore<S> {
    /// `cache_dir = None` disables the on-disk mirror (memory-only).
    pub fn new(source: S, cache_dir: Option<PathBuf>) -> TimingStore<S> {
        TimingStore {
            source,
            cache_dir,
            memory: HashMap::new(),
        }
    }

    /// Fetch-or-load the table for one reciter/surah pair.
    pub fn table(&mut self, reciter: &str, surah: u16) -> Result<Arc<TimingTable>, TimingError> {
        let key = (reciter.to_string(), surah);
        if let Some(table) = self.memory.get(&key) {
            debug!("timing table {reciter}/{surah} served from memory");
            return Ok(Arc::clone(table));
        }

        let records = match self.load_disk_cache(reciter, surah) {
            Some(records) => {
                info!("timing table {reciter}/{surah} served from disk cache");
                records
            }
            None => {
                let records = self.source.fetch(reciter, surah)?;
                // Mirror write failures are non-fatal
                if let Err(e) = self.save_disk_cache(reciter, surah, &records) {
                    warn!("could not mirror timing table {reciter}/{surah}: {e}");
                }
                records
            }
        };

        let table = Arc::new(TimingTable::from_records(reciter, records));
        self.memory.insert(key, Arc::clone(&table));
        Ok(table)
    }

    fn cache_path(&self, reciter: &str, surah: u16) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("timing_{reciter}_{surah:03}.json")))
    }

    fn load_disk_cache(&self, reciter: &str, surah: u16) -> Option<Vec<VerseTimingRecord>> {
        let path = self.cache_path(reciter, surah)?;
        let data = fs::read(&path).ok()?;
        match serde_json::from_slice(&data) {
            Ok(records) => Some(records),
            Err(e) => {
                // Corrupt mirror: drop it and refetch
                warn!("discarding corrupt timing cache {}: {e}", path.display());
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    fn save_disk_cache(
        &self,
        reciter: &str,
        surah: u16,
        records: &[VerseTimingRecord],
    ) -> Result<(), io::Error> {
        let Some(path) = self.cache_path(reciter, surah) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec(records)?;
        fs::write(path, data)
    }
}

/// Convenience constructor for the common file-backed configuration.
pub fn file_store<P: AsRef<Path>>(
    timing_dir: P,
    cache_dir: Option<PathBuf>,
) -> TimingStore<FileTimingSource> {
    TimingStore::new(FileTimingSource::new(timing_dir.as_ref()), cache_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(ws: u16, we: u16, start: u32, end: u32) -> WordTiming {
        WordTiming {
            word_start: ws,
            word_end: we,
            start_ms: start,
            end_ms: end,
        }
    }

    fn record(surah: u16, ayah: u16, segments: Vec<WordTiming>) -> VerseTimingRecord {
        VerseTimingRecord {
            surah,
            ayah,
            segments,
            stats: None,
        }
    }

    #[test]
    fn decodes_quran_align_document() {
        let json = r#"[
            { "surah": 1, "ayah": 1,
              "segments": [[0, 1, 0, 620], [1, 2, 620, 1480]],
              "stats": { "insertions": 1, "deletions": 0, "transpositions": 0 } },
            { "surah": 1, "ayah": 2,
              "segments": [[0, 1, 1480, 2100]] }
        ]"#;
        let records: Vec<VerseTimingRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].segments[1], seg(1, 2, 620, 1480));
        assert_eq!(records[0].stats.unwrap().insertions, 1);
        assert!(records[1].stats.is_none());
    }

    #[test]
    fn table_indexes_by_composite_key() {
        let table = TimingTable::from_records(
            "test_reciter",
            vec![
                record(1, 1, vec![seg(0, 1, 0, 500)]),
                record(1, 2, vec![seg(0, 1, 500, 900)]),
                record(2, 1, vec![seg(0, 1, 0, 700)]),
            ],
        );
        assert_eq!(table.len(), 3);
        assert_eq!(table.verse(1, 2).unwrap().start_ms, 500);
        assert!(table.verse(3, 1).is_none());
        assert_eq!(table.surah_verses(1).len(), 2);
        assert_eq!(table.surah_verses(99).len(), 0);
    }

    #[test]
    fn surah_verses_sorted_by_start_time() {
        // Records arrive out of order; playback order follows audio time
        let table = TimingTable::from_records(
            "test_reciter",
            vec![
                record(1, 3, vec![seg(0, 1, 2000, 2500)]),
                record(1, 1, vec![seg(0, 1, 0, 500)]),
                record(1, 2, vec![seg(0, 1, 500, 2000)]),
            ],
        );
        let order: Vec<u16> = table.surah_verses(1).iter().map(|v| v.ayah).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn corrupt_verse_degrades_to_verse_level_only() {
        let table = TimingTable::from_records(
            "test_reciter",
            vec![
                // Overlapping segments
                record(1, 1, vec![seg(0, 1, 0, 600), seg(1, 2, 500, 900)]),
                // Healthy neighbor
                record(1, 2, vec![seg(0, 1, 900, 1400)]),
            ],
        );

        let bad = table.verse(1, 1).unwrap();
        assert!(!bad.word_accurate);
        assert!(bad.segments.is_empty());
        // Time bounds survive for verse-level highlighting
        assert_eq!(bad.start_ms, 0);
        assert_eq!(bad.end_ms, 900);
        assert_eq!(bad.word_at(100), None);

        let good = table.verse(1, 2).unwrap();
        assert!(good.word_accurate);
    }

    #[test]
    fn inverted_segment_rejected() {
        let table = TimingTable::from_records(
            "test_reciter",
            vec![record(1, 1, vec![seg(0, 1, 700, 700)])],
        );
        assert!(!table.verse(1, 1).unwrap().word_accurate);
    }

    #[test]
    fn word_lookup_uses_half_open_intervals() {
        // Verse shape: [0–500), [500–1200), [1200–2000)
        let table = TimingTable::from_records(
            "test_reciter",
            vec![record(1, 1, vec![
                seg(0, 0, 0, 500),
                seg(1, 1, 500, 1200),
                seg(2, 2, 1200, 2000),
            ])],
        );
        let verse = table.verse(1, 1).unwrap();

        assert_eq!(verse.word_at(0), Some(0));
        assert_eq!(verse.word_at(499), Some(0));
        assert_eq!(verse.word_at(500), Some(1));
        assert_eq!(verse.word_at(1199), Some(1));
        assert_eq!(verse.word_at(1200), Some(2));
        assert_eq!(verse.word_at(2000), None); // past the last window
        assert_eq!(verse.duration_ms(), 2000);
    }

    #[test]
    fn word_lookup_returns_none_in_gaps() {
        let table = TimingTable::from_records(
            "test_reciter",
            vec![record(1, 1, vec![seg(0, 0, 0, 400), seg(1, 1, 600, 900)])],
        );
        let verse = table.verse(1, 1).unwrap();
        assert_eq!(verse.word_at(399), Some(0));
        assert_eq!(verse.word_at(500), None); // inter-word gap
        assert_eq!(verse.word_at(600), Some(1));
    }

    struct MemorySource {
        documents: HashMap<(String, u16), Vec<VerseTimingRecord>>,
        fetches: std::cell::RefCell<u32>,
    }

    impl TimingSource for MemorySource {
        fn fetch(&self, reciter: &str, surah: u16) -> Result<Vec<VerseTimingRecord>, TimingError> {
            *self.fetches.borrow_mut() += 1;
            self.documents
                .get(&(reciter.to_string(), surah))
                .cloned()
                .ok_or(TimingError::Unavailable {
                    reciter: reciter.to_string(),
                    surah,
                })
        }
    }

    #[test]
    fn store_caches_in_memory_per_session() {
        let mut documents = HashMap::new();
        documents.insert(
            ("alafasy".to_string(), 1u16),
            vec![record(1, 1, vec![seg(0, 1, 0, 500)])],
        );
        let source = MemorySource {
            documents,
            fetches: std::cell::RefCell::new(0),
        };
        let mut store = TimingStore::new(source, None);

        let first = store.table("alafasy", 1).unwrap();
        let second = store.table("alafasy", 1).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*store.source.fetches.borrow(), 1);

        assert!(matches!(
            store.table("alafasy", 2),
            Err(TimingError::Unavailable { surah: 2, .. })
        ));
    }

    #[test]
    fn store_mirrors_to_disk_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let mut documents = HashMap::new();
        documents.insert(
            ("alafasy".to_string(), 1u16),
            vec![record(1, 1, vec![seg(0, 1, 0, 500)])],
        );

        {
            let source = MemorySource {
                documents: documents.clone(),
                fetches: std::cell::RefCell::new(0),
            };
            let mut store = TimingStore::new(source, Some(dir.path().to_path_buf()));
            store.table("alafasy", 1).unwrap();
            assert_eq!(*store.source.fetches.borrow(), 1);
        }

        // Fresh store, same cache dir: served from disk, no source fetch
        let source = MemorySource {
            documents: HashMap::new(),
            fetches: std::cell::RefCell::new(0),
        };
        let mut store = TimingStore::new(source, Some(dir.path().to_path_buf()));
        let table = store.table("alafasy", 1).unwrap();
        assert_eq!(table.verse(1, 1).unwrap().end_ms, 500);
        assert_eq!(*store.source.fetches.borrow(), 0);
    }

    #[test]
    fn corrupt_disk_cache_falls_back_to_source() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("timing_alafasy_001.json"), b"not json").unwrap();

        let mut documents = HashMap::new();
        documents.insert(
            ("alafasy".to_string(), 1u16),
            vec![record(1, 1, vec![seg(0, 1, 0, 500)])],
        );
        let source = MemorySource {
            documents,
            fetches: std::cell::RefCell::new(0),
        };
        let mut store = TimingStore::new(source, Some(dir.path().to_path_buf()));
        let table = store.table("alafasy", 1).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(*store.source.fetches.borrow(), 1);
    }

    #[test]
    fn file_source_reports_missing_document() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileTimingSource::new(dir.path());
        assert!(matches!(
            source.fetch("nobody", 1),
            Err(TimingError::Unavailable { .. })
        ));

        let reciter_dir = dir.path().join("alafasy");
        fs::create_dir_all(&reciter_dir).unwrap();
        fs::write(
            reciter_dir.join("001.json"),
            r#"[{ "surah": 1, "ayah": 1, "segments": [[0, 1, 0, 500]] }]"#,
        )
        .unwrap();
        let records = source.fetch("alafasy", 1).unwrap();
        assert_eq!(records.len(), 1);
    }
}
