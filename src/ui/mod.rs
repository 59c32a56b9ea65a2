//! # UI Module
//!
//! Discord-facing presentation of the playback engine: the "now playing"
//! card with its control buttons, queue listings, and error reports.
//!
//! The controller only talks to the [`PlaybackUi`] trait, so playback logic
//! never depends on message formatting. Platform failures are logged here
//! and never bubble up into playback.

pub mod buttons;
pub mod embeds;

use async_trait::async_trait;
use serenity::{
    all::{ChannelId, MessageId},
    builder::{CreateMessage, EditMessage},
    http::Http,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{error::PlaybackError, sources::SongRef};

/// Mensaje publicado que se puede editar o borrar después
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

#[async_trait]
pub trait PlaybackUi: Send + Sync {
    /// Posts the now-playing card. `None` when it could not be posted.
    async fn show_now_playing(&self, channel: ChannelId, song: &SongRef, queued: usize) -> Option<MessageRef>;

    /// Swaps the card's Pause/Resume button.
    async fn set_paused(&self, message: MessageRef, paused: bool);

    async fn remove(&self, message: MessageRef);

    async fn announce_added(&self, channel: ChannelId, songs: &[SongRef]);

    async fn report_failure(&self, channel: ChannelId, song: &SongRef, error: &PlaybackError);
}

/// Implementación sobre la API HTTP de Discord
pub struct DiscordUi {
    http: Arc<Http>,
}

impl DiscordUi {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PlaybackUi for DiscordUi {
    async fn show_now_playing(&self, channel: ChannelId, song: &SongRef, queued: usize) -> Option<MessageRef> {
        let message = CreateMessage::new()
            .embed(embeds::now_playing(song, queued))
            .components(buttons::player_controls(false));

        match channel.send_message(&self.http, message).await {
            Ok(sent) => Some(MessageRef {
                channel_id: channel,
                message_id: sent.id,
            }),
            Err(e) => {
                warn!("No se pudo publicar \"reproduciendo ahora\" en {}: {:?}", channel, e);
                None
            }
        }
    }

    async fn set_paused(&self, message: MessageRef, paused: bool) {
        let edit = EditMessage::new().components(buttons::player_controls(paused));
        if let Err(e) = message
            .channel_id
            .edit_message(&self.http, message.message_id, edit)
            .await
        {
            warn!("No se pudieron actualizar los botones: {:?}", e);
        }
    }

    async fn remove(&self, message: MessageRef) {
        match message
            .channel_id
            .delete_message(&self.http, message.message_id)
            .await
        {
            Ok(()) => debug!("🗑️ Mensaje {} eliminado", message.message_id),
            Err(e) => debug!("No se pudo borrar el mensaje {}: {:?}", message.message_id, e),
        }
    }

    async fn announce_added(&self, channel: ChannelId, songs: &[SongRef]) {
        let message = CreateMessage::new().embed(embeds::songs_added(songs));
        if let Err(e) = channel.send_message(&self.http, message).await {
            warn!("No se pudo anunciar la cola en {}: {:?}", channel, e);
        }
    }

    async fn report_failure(&self, channel: ChannelId, song: &SongRef, error: &PlaybackError) {
        let message = CreateMessage::new().embed(embeds::playback_failed(song, &error.user_message()));
        if let Err(e) = channel.send_message(&self.http, message).await {
            warn!("No se pudo reportar el error en {}: {:?}", channel, e);
        }
    }
}

#[cfg(test)]
pub mod testing {
    //! UI que solo registra lo que se le pidió.

    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum UiEvent {
        NowPlaying(String),
        Paused(bool),
        Removed(MessageId),
        Added(Vec<String>),
        Failure(String),
    }

    #[derive(Default)]
    pub struct RecordingUi {
        events: Mutex<Vec<UiEvent>>,
        next_id: AtomicU64,
    }

    impl RecordingUi {
        pub fn events(&self) -> Vec<UiEvent> {
            self.events.lock().clone()
        }
    }

    #[async_trait]
    impl PlaybackUi for RecordingUi {
        async fn show_now_playing(&self, channel: ChannelId, song: &SongRef, _queued: usize) -> Option<MessageRef> {
            self.events.lock().push(UiEvent::NowPlaying(song.title().to_string()));
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            Some(MessageRef {
                channel_id: channel,
                message_id: MessageId::new(id),
            })
        }

        async fn set_paused(&self, _message: MessageRef, paused: bool) {
            self.events.lock().push(UiEvent::Paused(paused));
        }

        async fn remove(&self, message: MessageRef) {
            self.events.lock().push(UiEvent::Removed(message.message_id));
        }

        async fn announce_added(&self, _channel: ChannelId, songs: &[SongRef]) {
            self.events
                .lock()
                .push(UiEvent::Added(songs.iter().map(|s| s.title().to_string()).collect()));
        }

        async fn report_failure(&self, _channel: ChannelId, song: &SongRef, _error: &PlaybackError) {
            self.events.lock().push(UiEvent::Failure(song.title().to_string()));
        }
    }
}
