use serenity::all::{ChannelId, GuildId};
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::{
    error::PlaybackError,
    sources::{Provider, SongRef},
    ui::MessageRef,
};

/// Resultado de agregar canciones a la cola
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Queue was empty and nothing was playing: playback must start now.
    FirstItem,
    /// Something is already active; the songs wait their turn.
    AddedWhileActive,
}

/// Línea de la cola para mostrar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub title: String,
    pub provider: Provider,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub entries: Vec<QueueEntry>,
    /// Songs known to the guild, current one included, before truncation.
    pub total: usize,
}

/// Estado de reproducción de una guild.
///
/// `current` existe solo mientras el reproductor principal tiene la canción
/// (sonando o en pausa) y nunca está también en `queue`.
#[derive(Debug)]
pub struct GuildPlaybackState {
    guild_id: GuildId,
    queue: VecDeque<SongRef>,
    current: Option<SongRef>,
    now_playing: Option<MessageRef>,
    text_channel: Option<ChannelId>,
    max_size: usize,
}

impl GuildPlaybackState {
    pub fn new(guild_id: GuildId, max_size: usize) -> Self {
        Self {
            guild_id,
            queue: VecDeque::new(),
            current: None,
            now_playing: None,
            text_channel: None,
            max_size,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Agrega canciones al final, en el orden recibido
    pub fn enqueue(&mut self, songs: Vec<SongRef>) -> Result<EnqueueOutcome, PlaybackError> {
        if self.queue.len() + songs.len() > self.max_size {
            return Err(PlaybackError::QueueFull(self.max_size));
        }

        let outcome = if self.queue.is_empty() && self.current.is_none() {
            EnqueueOutcome::FirstItem
        } else {
            EnqueueOutcome::AddedWhileActive
        };

        info!("➕ Guild {}: {} canciones agregadas a la cola", self.guild_id, songs.len());
        self.queue.extend(songs);
        Ok(outcome)
    }

    /// Saca la primera canción. A None here is normal, not an error.
    pub fn dequeue(&mut self) -> Option<SongRef> {
        self.queue.pop_front()
    }

    /// Quita la primera canción en cola cuyo título contiene `text`
    pub fn remove_by_title_substring(&mut self, text: &str) -> bool {
        match self.queue.iter().position(|song| song.title().contains(text)) {
            Some(index) => {
                if let Some(removed) = self.queue.remove(index) {
                    debug!("🗑️ Guild {}: removida {}", self.guild_id, removed.title());
                }
                true
            }
            None => false,
        }
    }

    /// Vacía la cola sin tocar la canción actual
    pub fn clear(&mut self) {
        self.queue.clear();
        debug!("🗑️ Cola limpiada para guild {}", self.guild_id);
    }

    pub fn snapshot(&self, limit: usize) -> QueueSnapshot {
        let current = self.current.iter().map(|song| QueueEntry {
            title: song.title().to_string(),
            provider: song.provider(),
            is_current: true,
        });
        let queued = self.queue.iter().map(|song| QueueEntry {
            title: song.title().to_string(),
            provider: song.provider(),
            is_current: false,
        });

        QueueSnapshot {
            entries: current.chain(queued).take(limit.max(1)).collect(),
            total: self.queue.len() + usize::from(self.current.is_some()),
        }
    }

    pub fn current(&self) -> Option<&SongRef> {
        self.current.as_ref()
    }

    pub fn set_current(&mut self, song: Option<SongRef>) {
        self.current = song;
    }

    pub fn take_current(&mut self) -> Option<SongRef> {
        self.current.take()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn queued(&self) -> impl Iterator<Item = &SongRef> {
        self.queue.iter()
    }

    pub fn now_playing(&self) -> Option<MessageRef> {
        self.now_playing
    }

    pub fn set_now_playing(&mut self, message: Option<MessageRef>) {
        self.now_playing = message;
    }

    pub fn take_now_playing(&mut self) -> Option<MessageRef> {
        self.now_playing.take()
    }

    pub fn text_channel(&self) -> Option<ChannelId> {
        self.text_channel
    }

    pub fn set_text_channel(&mut self, channel: ChannelId) {
        self.text_channel = Some(channel);
    }
}
