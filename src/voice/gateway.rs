use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::all::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::{error::PlaybackError, sources::PlayableSource};

/// Guild de origen de un comando, con quien lo pidió y dónde responder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuildRef {
    pub guild_id: GuildId,
    pub requester: Option<UserId>,
    pub text_channel: Option<ChannelId>,
}

impl GuildRef {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            requester: None,
            text_channel: None,
        }
    }

    /// Fails with `NoGuildContext` for commands issued outside a guild.
    pub fn from_interaction(
        guild_id: Option<GuildId>,
        requester: UserId,
        text_channel: ChannelId,
    ) -> Result<Self, PlaybackError> {
        let guild_id = guild_id.ok_or(PlaybackError::NoGuildContext)?;
        Ok(Self::new(guild_id)
            .with_requester(requester)
            .with_text_channel(text_channel))
    }

    pub fn with_requester(mut self, requester: UserId) -> Self {
        self.requester = Some(requester);
        self
    }

    pub fn with_text_channel(mut self, channel: ChannelId) -> Self {
        self.text_channel = Some(channel);
        self
    }
}

/// Estado de un reproductor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Idle,
    Playing,
    Paused,
    /// Paused because nothing is subscribed to the player.
    AutoPaused,
}

/// Transición de estado emitida por un reproductor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerEvent {
    pub old: PlayerStatus,
    pub new: PlayerStatus,
}

impl PlayerEvent {
    /// The player finished (or was stopped) and holds nothing anymore.
    pub fn is_idle_signal(&self) -> bool {
        self.new == PlayerStatus::Idle && self.old != PlayerStatus::Idle
    }
}

/// Qué hace un reproductor sin suscripción
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoSubscriberBehavior {
    Pause,
    Stop,
}

/// Reproductor de un único recurso a la vez
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Replaces whatever is playing with `source`. Returns once playback started.
    async fn play(&self, source: PlayableSource) -> Result<(), PlaybackError>;

    fn pause(&self) -> bool;
    fn unpause(&self) -> bool;

    /// Halts the current resource; emits the idle signal when something was loaded.
    fn stop(&self) -> bool;

    fn status(&self) -> PlayerStatus;
    fn events(&self) -> broadcast::Receiver<PlayerEvent>;

    /// Called by the connection when this player gains or loses the subscription.
    fn set_subscribed(&self, subscribed: bool);
}

/// Conexión de voz de una guild
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    async fn is_ready(&self) -> bool;
    fn create_player(&self, behavior: NoSubscriberBehavior) -> Arc<dyn AudioPlayer>;

    /// Routes the connection's output to `player`, unsubscribing the previous one.
    fn subscribe(&self, player: &Arc<dyn AudioPlayer>);

    async fn disconnect(&self);
}

/// Plataforma de chat y voz
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Canal de voz donde está el usuario, si está en alguno
    async fn requester_channel(&self, guild: GuildId, user: UserId) -> Option<ChannelId>;

    /// Voice channels of the guild with their current member counts, in listing order.
    async fn voice_channels(&self, guild: GuildId) -> Result<Vec<(ChannelId, usize)>, PlaybackError>;

    /// Joining again after a dropped connection must keep players created on
    /// the previous connection usable on the new one.
    async fn join(&self, guild: GuildId, channel: ChannelId) -> Result<Arc<dyn VoiceConnection>, PlaybackError>;
}

/// Reproductor suscrito actualmente a una conexión
#[derive(Default)]
pub struct Subscription {
    current: Mutex<Option<Arc<dyn AudioPlayer>>>,
}

impl Subscription {
    pub fn switch_to(&self, player: &Arc<dyn AudioPlayer>) {
        let previous = self.current.lock().replace(Arc::clone(player));
        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, player) {
                previous.set_subscribed(false);
            }
        }
        player.set_subscribed(true);
    }

    pub fn clear(&self) {
        if let Some(previous) = self.current.lock().take() {
            previous.set_subscribed(false);
        }
    }

    pub fn current(&self) -> Option<Arc<dyn AudioPlayer>> {
        self.current.lock().clone()
    }
}
