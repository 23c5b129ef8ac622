//! # Quran Companion Core Library
//!
//! Computational core for a Quran reader application: prayer-time
//! calculation and verse-audio word synchronization. The two engines are
//! independent — they share no state and never call each other — and are
//! consumed by a host UI layer that owns rendering, audio output, and
//! persistence.
//!
//! ## Prayer times
//!
//! [`prayer::compute_prayer_times`] is a pure function from (date,
//! coordinates, timezone, juristic parameters) to the six daily times,
//! built on the low-precision solar ephemeris in [`solar`]. It completes
//! synchronously in microseconds, is safe to call from any thread, and
//! models expected astronomical edge cases (polar twilight) as data rather
//! than errors.
//!
//! ## Verse-audio synchronization
//!
//! [`sync::VerseAudioSynchronizer`] maps the playback position of an
//! external media player onto the word/verse boundaries of a
//! [`timing::TimingTable`] (quran-align alignment data, CC BY 4.0) and
//! drives verse transitions, repeat modes, and seek recovery. All mutable
//! state lives in one [`sync::PlaybackCursor`], mutated only through a
//! single serialized entry point.
//!
//! ## Degradation policy
//!
//! Loss of fine-grained sync never stops audio: missing timing data means
//! no word highlighting, corrupt data for one verse means verse-level
//! highlighting for that verse only. Prayer computation surfaces
//! unsolvable twilight equations per-prayer instead of failing wholesale.
//!
//! ## Core Types
//!
//! - [`prayer::GeoTime`], [`prayer::CalculationMethod`],
//!   [`prayer::PrayerTimes`]: calculation input and result
//! - [`timing::TimingTable`], [`timing::VerseTiming`],
//!   [`timing::WordTiming`]: immutable per-reciter alignment data
//! - [`sync::VerseAudioSynchronizer`], [`sync::SyncEvent`]: the playback
//!   state machine and its event stream

pub mod config;
pub mod prayer;
pub mod solar;
pub mod sync;
pub mod timing;

pub use prayer::{
    compute_prayer_times, AsrJuristicMethod, CalculationMethod, GeoTime, HighLatitudeRule,
    PrayerError, PrayerTime, PrayerTimes,
};
pub use sync::{
    PlaybackCursor, RepeatMode, SyncCommand, SyncEvent, SyncInput, VerseAudioSynchronizer,
};
pub use timing::{TimingError, TimingSource, TimingStore, TimingTable};
