//! # Roboto Music
//!
//! Guild-scoped playback engine for a Discord voice bot: per-guild queues,
//! voice sessions with idle disconnect, media resolution backed by an
//! on-disk cache, and speech announcements over the music.
//!
//! The binary in `main.rs` wires these pieces to serenity and songbird; the
//! library keeps the platform behind the traits in [`voice::gateway`] and
//! [`ui::PlaybackUi`] so the engine runs against in-memory fakes in tests.

pub mod audio;
pub mod bot;
pub mod cache;
pub mod config;
pub mod error;
pub mod sources;
pub mod speech;
pub mod storage;
pub mod ui;
pub mod voice;
