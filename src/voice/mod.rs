//! # Voice Module
//!
//! Per-guild voice connections and the audio players bound to them.
//!
//! - [`gateway`] - the platform seam: [`VoiceGateway`], [`VoiceConnection`]
//!   and [`AudioPlayer`] traits plus the player state/event types
//! - [`session`] - [`VoiceSession`], owner of every guild's connection and
//!   primary player, with the idle-timeout sweep
//! - [`songbird_backend`] - the serenity + songbird implementation
//!
//! ## Idle disconnect
//!
//! ```env
//! VOICE_IDLE_TIMEOUT=60m      # Disconnect after this long without playing
//! VOICE_SWEEP_INTERVAL=60m    # How often guilds are checked
//! ```

pub mod gateway;
pub mod session;
pub mod songbird_backend;

#[cfg(test)]
pub mod fake;

pub use gateway::{
    AudioPlayer, GuildRef, NoSubscriberBehavior, PlayerEvent, PlayerStatus, VoiceConnection,
    VoiceGateway,
};
pub use session::{VoiceSession, VoiceSessionHandle};
pub use songbird_backend::SongbirdGateway;
