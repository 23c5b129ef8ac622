//! # Verse-Audio Synchronization
//!
//! [`VerseAudioSynchronizer`] maps a continuously advancing playback
//! position (milliseconds, supplied by the external media player) onto the
//! discrete word and verse boundaries of a [`TimingTable`](crate::timing::TimingTable),
//! and drives verse-to-verse transitions, repeat modes, and seek recovery.
//!
//! ## Ownership and serialization
//!
//! The synchronizer owns exactly one piece of mutable state, the
//! [`PlaybackCursor`]. All position ticks and user commands funnel through
//! the single entry point [`handle`](VerseAudioSynchronizer::handle), so
//! the caller serializes inputs simply by owning the value (`&mut self`);
//! a tick can never race a seek. Timing-table loads are asynchronous on the caller's side and
//! complete through [`SyncCommand::LoadCompleted`] carrying a generation
//! id; completions for superseded loads are discarded, not applied.
//!
//! ## Degraded mode
//!
//! Missing or unreadable timing data never stops playback. The
//! synchronizer enters `Playing` without a table, tracks the raw position,
//! and emits no word events; the UI simply shows no word highlight.
//!
//! ## Events
//!
//! `handle` returns the boundary crossings and side-effect requests the
//! input produced. The external player owns the audio clock, so repeat
//! modes that rewind emit [`SyncEvent::SeekRequired`] instead of touching
//! the stream themselves.

use crate::timing::{TimingError, TimingTable, VerseTiming};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Verse-end policy, checked when the position passes the last word of a
/// verse or the last verse of the surah.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Advance through the surah, stop at its end
    Off,
    /// Replay the current verse indefinitely
    Verse,
    /// Restart the surah at its end
    Surah,
    /// Cross into the next surah at the end of this one
    Continuous,
}

/// Highest surah number; continuous playback stops here rather than
/// wrapping.
const LAST_SURAH: u16 = 114;

/// Runtime playback state, owned and mutated only by the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackCursor {
    pub surah: u16,
    /// Index into the surah's playback-ordered verse list
    pub verse_index: usize,
    /// Index into the current verse's segment list; `None` while no word
    /// is resolved (verse-level granularity, gaps before the first word)
    pub word_index: Option<usize>,
    pub position_ms: u32,
    pub repeat_mode: RepeatMode,
    pub is_playing: bool,
}

/// Synchronizer lifecycle states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    /// Waiting for the timing table (and audio stream) of `surah`
    Loading { surah: u16, generation: u64 },
    Playing,
    Paused,
    Buffering,
    /// Terminal until the next play request
    Error { message: String },
}

/// User commands and external completions. Ticks arrive separately via
/// [`SyncInput::Tick`].
#[derive(Debug)]
pub enum SyncCommand {
    /// Start playback of a surah from its beginning
    Play { surah: u16 },
    Pause,
    Resume,
    /// User seek to an arbitrary position within the current surah
    Seek { position_ms: u32 },
    SkipToNextVerse,
    SkipToPreviousVerse,
    SetRepeatMode(RepeatMode),
    Stop,
    /// Underlying stream stalled
    BufferingStarted,
    BufferingEnded,
    /// Unrecoverable stream failure
    StreamFailed { message: String },
    /// A previously requested timing-table load finished
    LoadCompleted {
        generation: u64,
        result: Result<Arc<TimingTable>, TimingError>,
    },
}

/// Serialized input to [`VerseAudioSynchronizer::handle`].
#[derive(Debug)]
pub enum SyncInput {
    /// Playback clock tick: current position in milliseconds
    Tick(u32),
    Command(SyncCommand),
}

/// Boundary crossings and side-effect requests produced by one input.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    StateChanged(PlayerState),
    /// The resolved word changed (never emitted redundantly for the same word)
    WordChanged {
        verse_index: usize,
        word_index: usize,
    },
    VerseChanged { verse_index: usize },
    /// Caller must load the timing table for `surah` and reply with
    /// `LoadCompleted { generation, .. }`; `delay_ms` is the auto-advance
    /// pause for continuous mode
    LoadRequested {
        surah: u16,
        generation: u64,
        delay_ms: u32,
    },
    /// Caller must seek the audio stream to this position
    SeekRequired { position_ms: u32 },
    /// Timing data unavailable; playback continues without word highlighting
    PlaybackDegraded { surah: u16 },
    /// Recoverable load failure (I/O, parse); caller may retry
    LoadFailed { surah: u16, message: String },
    SurahFinished { surah: u16 },
}

/// Maps playback position to word/verse boundaries and applies playback
/// transitions. One instance per active playback session.
pub struct VerseAudioSynchronizer {
    state: PlayerState,
    cursor: PlaybackCursor,
    table: Option<Arc<TimingTable>>,
    /// Monotonic load id; stale `LoadCompleted` replies are discarded
    generation: u64,
    auto_advance_delay_ms: u32,
}

impl VerseAudioSynchronizer {
    pub fn new(repeat_mode: RepeatMode, auto_advance_delay_ms: u32) -> VerseAudioSynchronizer {
        VerseAudioSynchronizer {
            state: PlayerState::Idle,
            cursor: PlaybackCursor {
                surah: 0,
                verse_index: 0,
                word_index: None,
                position_ms: 0,
                repeat_mode,
                is_playing: false,
            },
            table: None,
            generation: 0,
            auto_advance_delay_ms,
        }
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    /// The single serialized entry point: apply one tick or command and
    /// return the events it produced.
    pub fn handle(&mut self, input: SyncInput) -> Vec<SyncEvent> {
        match input {
            SyncInput::Tick(position_ms) => self.tick(position_ms),
            SyncInput::Command(command) => self.command(command),
        }
    }

    fn command(&mut self, command: SyncCommand) -> Vec<SyncEvent> {
        match command {
            SyncCommand::Play { surah } => self.start_load(surah, 0),
            SyncCommand::Pause => {
                if self.state == PlayerState::Playing {
                    self.cursor.is_playing = false;
                    self.set_state(PlayerState::Paused)
                } else {
                    Vec::new()
                }
            }
            SyncCommand::Resume => {
                if self.state == PlayerState::Paused {
                    // Cursor resumes from the same frozen position
                    self.cursor.is_playing = true;
                    self.set_state(PlayerState::Playing)
                } else {
                    Vec::new()
                }
            }
            SyncCommand::Seek { position_ms } => self.seek(position_ms),
            SyncCommand::SkipToNextVerse => self.skip_to_next(),
            SyncCommand::SkipToPreviousVerse => self.skip_to_previous(),
            SyncCommand::SetRepeatMode(mode) => {
                self.cursor.repeat_mode = mode;
                Vec::new()
            }
            SyncCommand::Stop => {
                self.cursor.is_playing = false;
                self.set_state(PlayerState::Idle)
            }
            SyncCommand::BufferingStarted => {
                if self.state == PlayerState::Playing {
                    self.set_state(PlayerState::Buffering)
                } else {
                    Vec::new()
                }
            }
            SyncCommand::BufferingEnded => {
                if self.state == PlayerState::Buffering {
                    self.set_state(PlayerState::Playing)
                } else {
                    Vec::new()
                }
            }
            SyncCommand::StreamFailed { message } => {
                warn!("stream failure: {message}");
                self.cursor.is_playing = false;
                self.set_state(PlayerState::Error { message })
            }
            SyncCommand::LoadCompleted { generation, result } => {
                self.load_completed(generation, result)
            }
        }
    }

    /// Begin loading a surah's timing table under a fresh generation.
    fn start_load(&mut self, surah: u16, delay_ms: u32) -> Vec<SyncEvent> {
        self.generation += 1;
        self.table = None;
        self.cursor.surah = surah;
        self.cursor.verse_index = 0;
        self.cursor.word_index = None;
        self.cursor.position_ms = 0;
        self.cursor.is_playing = false;

        let mut events = self.set_state(PlayerState::Loading {
            surah,
            generation: self.generation,
        });
        events.push(SyncEvent::LoadRequested {
            surah,
            generation: self.generation,
            delay_ms,
        });
        events
    }

    fn load_completed(
        &mut self,
        generation: u64,
        result: Result<Arc<TimingTable>, TimingError>,
    ) -> Vec<SyncEvent> {
        if generation != self.generation {
            // A newer play request superseded this load
            debug!(
                "discarding stale load completion (gen {generation}, current {})",
                self.generation
            );
            return Vec::new();
        }
        let surah = match &self.state {
            PlayerState::Loading { surah, .. } => *surah,
            _ => return Vec::new(),
        };

        match result {
            Ok(table) => {
                self.table = Some(table);
                self.cursor.is_playing = true;
                self.set_state(PlayerState::Playing)
            }
            Err(TimingError::Unavailable { .. }) => {
                // Degraded but non-fatal: audio plays, no word highlighting
                warn!("no timing data for surah {surah}; playing without word sync");
                self.table = None;
                self.cursor.is_playing = true;
                let mut events = self.set_state(PlayerState::Playing);
                events.push(SyncEvent::PlaybackDegraded { surah });
                events
            }
            Err(e) => {
                // Retryable; playback itself may still proceed unhighlighted
                warn!("timing data load failed for surah {surah}: {e}");
                self.table = None;
                self.cursor.is_playing = true;
                let mut events = self.set_state(PlayerState::Playing);
                events.push(SyncEvent::LoadFailed {
                    surah,
                    message: e.to_string(),
                });
                events
            }
        }
    }

    /// Clock tick. Ignored outside `Playing`: a paused or buffering cursor
    /// does not advance.
    fn tick(&mut self, position_ms: u32) -> Vec<SyncEvent> {
        if self.state != PlayerState::Playing {
            return Vec::new();
        }
        self.cursor.position_ms = position_ms;

        let Some(table) = self.table.clone() else {
            return Vec::new(); // degraded mode: time-based progress only
        };
        let verses = table.surah_verses(self.cursor.surah);
        if verses.is_empty() {
            return Vec::new();
        }

        let mut events = Vec::new();

        // Advance past as many verse boundaries as the position crossed
        // since the last tick (a slow tick cadence can skip short verses)
        while position_ms > verses[self.cursor.verse_index].end_ms {
            // Verse repeat replays the current verse at every verse end;
            // only an explicit skip command moves past it
            if self.cursor.repeat_mode == RepeatMode::Verse {
                events.extend(self.rewind_to_verse(&verses, self.cursor.verse_index));
                return events;
            }
            if self.cursor.verse_index + 1 < verses.len() {
                self.cursor.verse_index += 1;
                self.cursor.word_index = None;
                events.push(SyncEvent::VerseChanged {
                    verse_index: self.cursor.verse_index,
                });
            } else {
                events.extend(self.surah_end(&verses));
                return events;
            }
        }

        self.resolve_word(verses[self.cursor.verse_index], position_ms, &mut events);
        events
    }

    /// Update `word_index` from the position, holding the previous word
    /// across gaps in the timing data, and emit a change event only when
    /// the index actually moves.
    fn resolve_word(
        &mut self,
        verse: &VerseTiming,
        position_ms: u32,
        events: &mut Vec<SyncEvent>,
    ) {
        let Some(word) = verse.word_at(position_ms) else {
            return; // gap or verse-level-only data: hold the previous index
        };
        if self.cursor.word_index != Some(word) {
            self.cursor.word_index = Some(word);
            events.push(SyncEvent::WordChanged {
                verse_index: self.cursor.verse_index,
                word_index: word,
            });
        }
    }

    /// Repeat-mode policy at the end of the surah's last verse.
    fn surah_end(&mut self, verses: &[&VerseTiming]) -> Vec<SyncEvent> {
        match self.cursor.repeat_mode {
            RepeatMode::Off => {
                let surah = self.cursor.surah;
                self.cursor.is_playing = false;
                let mut events = self.set_state(PlayerState::Idle);
                events.push(SyncEvent::SurahFinished { surah });
                events
            }
            RepeatMode::Verse => self.rewind_to_verse(verses, self.cursor.verse_index),
            RepeatMode::Surah => self.rewind_to_verse(verses, 0),
            RepeatMode::Continuous => {
                let surah = self.cursor.surah;
                if surah >= LAST_SURAH {
                    self.cursor.is_playing = false;
                    let mut events = self.set_state(PlayerState::Idle);
                    events.push(SyncEvent::SurahFinished { surah });
                    events
                } else {
                    let mut events = vec![SyncEvent::SurahFinished { surah }];
                    events.extend(self.start_load(surah + 1, self.auto_advance_delay_ms));
                    events
                }
            }
        }
    }

    /// Rewind the cursor to the start of a verse and ask the player to
    /// follow.
    fn rewind_to_verse(&mut self, verses: &[&VerseTiming], verse_index: usize) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        let target = verses[verse_index];

        if self.cursor.verse_index != verse_index {
            self.cursor.verse_index = verse_index;
            events.push(SyncEvent::VerseChanged { verse_index });
        }
        self.cursor.position_ms = target.start_ms;
        events.push(SyncEvent::SeekRequired {
            position_ms: target.start_ms,
        });
        self.cursor.word_index = None;
        self.resolve_word(target, target.start_ms, &mut events);
        events
    }

    /// User seek: re-resolve the verse from scratch — the target may be far
    /// outside the currently tracked verse, so the stale index is never
    /// trusted.
    fn seek(&mut self, position_ms: u32) -> Vec<SyncEvent> {
        if !matches!(
            self.state,
            PlayerState::Playing | PlayerState::Paused | PlayerState::Buffering
        ) {
            return Vec::new();
        }
        self.cursor.position_ms = position_ms;

        let Some(table) = self.table.clone() else {
            return Vec::new();
        };
        let verses = table.surah_verses(self.cursor.surah);
        if verses.is_empty() {
            return Vec::new();
        }

        let mut events = Vec::new();

        // Last verse starting at or before the target; positions before the
        // first verse resolve to it
        let verse_index = verses
            .partition_point(|v| v.start_ms <= position_ms)
            .saturating_sub(1);
        if self.cursor.verse_index != verse_index {
            self.cursor.verse_index = verse_index;
            events.push(SyncEvent::VerseChanged { verse_index });
        }

        let verse = verses[verse_index];
        // A seek always re-resolves the word: inside a segment use it,
        // ahead of the first segment snap to word 0
        let word = verse
            .word_at(position_ms)
            .or_else(|| (verse.word_accurate && position_ms <= verse.start_ms).then_some(0));
        if word.is_some() && self.cursor.word_index != word {
            self.cursor.word_index = word;
            events.push(SyncEvent::WordChanged {
                verse_index,
                word_index: word.expect("checked is_some above"),
            });
        } else if word.is_none() {
            self.cursor.word_index = None;
        }
        events
    }

    fn skip_to_next(&mut self) -> Vec<SyncEvent> {
        if !matches!(self.state, PlayerState::Playing | PlayerState::Paused) {
            return Vec::new();
        }
        let Some(table) = self.table.clone() else {
            return Vec::new();
        };
        let verses = table.surah_verses(self.cursor.surah);
        if verses.is_empty() {
            return Vec::new();
        }
        if self.cursor.verse_index + 1 < verses.len() {
            self.rewind_to_verse(&verses, self.cursor.verse_index + 1)
        } else {
            // Skipping past the last verse follows the same policy as
            // reaching it naturally
            self.surah_end(&verses)
        }
    }

    fn skip_to_previous(&mut self) -> Vec<SyncEvent> {
        if !matches!(self.state, PlayerState::Playing | PlayerState::Paused) {
            return Vec::new();
        }
        if self.cursor.verse_index == 0 {
            return Vec::new();
        }
        let Some(table) = self.table.clone() else {
            return Vec::new();
        };
        let verses = table.surah_verses(self.cursor.surah);
        if verses.is_empty() {
            return Vec::new();
        }
        self.rewind_to_verse(&verses, self.cursor.verse_index - 1)
    }

    fn set_state(&mut self, state: PlayerState) -> Vec<SyncEvent> {
        if self.state == state {
            return Vec::new();
        }
        debug!("player state {:?} -> {:?}", self.state, state);
        self.state = state.clone();
        vec![SyncEvent::StateChanged(state)]
    }
}
