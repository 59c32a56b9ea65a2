//! # Audio Module
//!
//! Guild-scoped playback: what is queued, what is playing, and what happens
//! when it ends.
//!
//! ## Architecture
//!
//! ### [`queue`] - Playback State
//! - Ordered queue of [`SongRef`](crate::sources::SongRef) plus the current song
//! - Bounded size, batch enqueue, removal by title substring
//! - Truncated snapshots for the queue listing
//!
//! ### [`player`] - Playback Controller
//! - One command slot per guild: a single command mutates a guild at a time
//! - Idle / Playing / Paused state machine driven by commands and natural ends
//! - A control loop per guild consuming the voice session's player events
//!
//! ### [`interrupt`] - Speech Overlay
//! - Short announcements over the music on a secondary player
//! - Pauses and resumes the primary player around the announcement
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use roboto_music::audio::player::PlaybackController;
//! use roboto_music::sources::{Provider, SongRef};
//! use roboto_music::voice::GuildRef;
//! use serenity::all::GuildId;
//! use std::sync::Arc;
//!
//! # async fn example(controller: Arc<PlaybackController>) -> anyhow::Result<()> {
//! let guild = GuildRef::new(GuildId::new(123456789));
//! let song = SongRef::new(Provider::RemoteVideo, "Song", "https://youtu.be/abc");
//!
//! let text = controller.add_and_play(&guild, vec![song]).await?;
//! println!("{}", text);
//!
//! let mut command = controller.acquire(&guild).await;
//! command.pause().await;
//! command.skip().await;
//! # Ok(())
//! # }
//! ```

pub mod interrupt;
pub mod player;
pub mod queue;

pub use interrupt::{InterruptOverlay, SpeechHandle};
pub use player::{GuildCommand, PlaybackController, PlaybackStatus, StartFailure};
pub use queue::{EnqueueOutcome, GuildPlaybackState, QueueEntry, QueueSnapshot};
