use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::{
    all::{ChannelId, ChannelType, GuildId, UserId},
    cache::Cache,
};
use songbird::{
    input::{File as FileInput, HttpRequest, Input},
    tracks::TrackHandle,
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    path::PathBuf,
    sync::{Arc, OnceLock, Weak},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::gateway::{
    AudioPlayer, NoSubscriberBehavior, PlayerEvent, PlayerStatus, Subscription, VoiceConnection,
    VoiceGateway,
};
use crate::{error::PlaybackError, sources::PlayableSource};

/// Gateway de voz sobre serenity + songbird
pub struct SongbirdGateway {
    manager: Arc<Songbird>,
    // El cliente de serenity crea la caché después del handler
    cache: OnceLock<Arc<Cache>>,
    http_client: reqwest::Client,
    scratch_dir: PathBuf,
}

impl SongbirdGateway {
    /// `scratch_dir` holds in-memory streams written out for playback.
    pub fn new(manager: Arc<Songbird>, scratch_dir: PathBuf) -> Self {
        Self {
            manager,
            cache: OnceLock::new(),
            http_client: reqwest::Client::new(),
            scratch_dir,
        }
    }

    pub fn attach_cache(&self, cache: Arc<Cache>) {
        if self.cache.set(cache).is_err() {
            warn!("La caché de serenity ya estaba asignada");
        }
    }

    fn cached_guild(&self, guild_id: GuildId) -> Option<serenity::cache::GuildRef<'_>> {
        let cache = self.cache.get()?;
        guild_id.to_guild_cached(cache)
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn requester_channel(&self, guild: GuildId, user: UserId) -> Option<ChannelId> {
        let guild = self.cached_guild(guild)?;
        guild.voice_states.get(&user).and_then(|state| state.channel_id)
    }

    async fn voice_channels(&self, guild_id: GuildId) -> Result<Vec<(ChannelId, usize)>, PlaybackError> {
        let Some(guild) = self.cached_guild(guild_id) else {
            warn!("Guild {} no encontrada en caché", guild_id);
            return Ok(Vec::new());
        };

        let mut channels: Vec<_> = guild
            .channels
            .values()
            .filter(|c| matches!(c.kind, ChannelType::Voice | ChannelType::Stage))
            .map(|c| (c.position, c.id))
            .collect();
        channels.sort();

        Ok(channels
            .into_iter()
            .map(|(_, id)| {
                let members = guild
                    .voice_states
                    .values()
                    .filter(|state| state.channel_id == Some(id))
                    .count();
                (id, members)
            })
            .collect())
    }

    async fn join(&self, guild: GuildId, channel: ChannelId) -> Result<Arc<dyn VoiceConnection>, PlaybackError> {
        let call = self.manager.join(guild, channel).await.map_err(|e| {
            error!("Error al conectar al canal de voz: {:?}", e);
            PlaybackError::VoiceJoinFailed(e.to_string())
        })?;

        Ok(Arc::new(SongbirdConnection {
            manager: Arc::clone(&self.manager),
            guild,
            call,
            subscription: Subscription::default(),
            http_client: self.http_client.clone(),
            scratch_dir: self.scratch_dir.clone(),
        }))
    }
}

pub struct SongbirdConnection {
    manager: Arc<Songbird>,
    guild: GuildId,
    call: Arc<Mutex<Call>>,
    subscription: Subscription,
    http_client: reqwest::Client,
    scratch_dir: PathBuf,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn is_ready(&self) -> bool {
        self.call.lock().await.current_connection().is_some()
    }

    fn create_player(&self, behavior: NoSubscriberBehavior) -> Arc<dyn AudioPlayer> {
        let (events, _) = broadcast::channel(32);
        Arc::new(SongbirdPlayer {
            inner: Arc::new(PlayerInner {
                call: Arc::clone(&self.call),
                behavior,
                http_client: self.http_client.clone(),
                scratch_dir: self.scratch_dir.clone(),
                state: SyncMutex::new(PlayerState {
                    track: None,
                    status: PlayerStatus::Idle,
                    subscribed: false,
                }),
                events,
            }),
        })
    }

    fn subscribe(&self, player: &Arc<dyn AudioPlayer>) {
        self.subscription.switch_to(player);
    }

    async fn disconnect(&self) {
        self.subscription.clear();
        if let Err(e) = self.manager.remove(self.guild).await {
            warn!("Error al desconectar de guild {}: {:?}", self.guild, e);
        }
        info!("👋 Desconectado del canal de voz en guild {}", self.guild);
    }
}

struct PlayerState {
    track: Option<TrackHandle>,
    status: PlayerStatus,
    subscribed: bool,
}

struct PlayerInner {
    call: Arc<Mutex<Call>>,
    behavior: NoSubscriberBehavior,
    http_client: reqwest::Client,
    scratch_dir: PathBuf,
    state: SyncMutex<PlayerState>,
    events: broadcast::Sender<PlayerEvent>,
}

impl PlayerInner {
    fn transition(&self, state: &mut PlayerState, new: PlayerStatus) {
        let old = std::mem::replace(&mut state.status, new);
        if old != new {
            let _ = self.events.send(PlayerEvent { old, new });
        }
    }

    /// Fin natural (o error) de una pista. Ignora pistas ya reemplazadas.
    fn track_finished(&self, uuid: Uuid) {
        let mut state = self.state.lock();
        if state.track.as_ref().map(|t| t.uuid()) != Some(uuid) {
            return;
        }
        state.track = None;
        self.transition(&mut state, PlayerStatus::Idle);
    }
}

/// Un reproductor lógico sobre la llamada de songbird.
///
/// Songbird mezcla todas las pistas de la llamada, así que la suscripción se
/// emula: el reproductor que la pierde pausa (o detiene) su propia pista.
pub struct SongbirdPlayer {
    inner: Arc<PlayerInner>,
}

impl SongbirdPlayer {
    async fn input_for(&self, source: PlayableSource) -> Result<(Input, Option<PathBuf>), PlaybackError> {
        match source {
            PlayableSource::File(path) => Ok((FileInput::new(path).into(), None)),
            PlayableSource::Url(url) => Ok((HttpRequest::new(self.inner.http_client.clone(), url).into(), None)),
            PlayableSource::Bytes { data, content_type } => {
                let ext = match content_type.as_deref() {
                    Some("audio/ogg" | "audio/opus") => "ogg",
                    Some("audio/wav" | "audio/x-wav") => "wav",
                    Some("audio/aac") => "aac",
                    Some("audio/flac") => "flac",
                    _ => "mp3",
                };
                let path = self
                    .inner
                    .scratch_dir
                    .join(format!(".stream-{:08x}.{}", fastrand::u32(..), ext));
                tokio::fs::write(&path, &data).await?;
                Ok((FileInput::new(path.clone()).into(), Some(path)))
            }
        }
    }
}

#[async_trait]
impl AudioPlayer for SongbirdPlayer {
    async fn play(&self, source: PlayableSource) -> Result<(), PlaybackError> {
        let (input, scratch) = self.input_for(source).await?;

        let handle = {
            let mut call = self.inner.call.lock().await;
            // La pista anterior queda obsoleta antes de detenerla
            let previous = self.inner.state.lock().track.take();
            if let Some(previous) = previous {
                let _ = previous.stop();
            }
            call.play_input(input)
        };

        if let Err(e) = handle.make_playable_async().await {
            if let Some(path) = &scratch {
                let _ = tokio::fs::remove_file(path).await;
            }
            let mut state = self.inner.state.lock();
            self.inner.transition(&mut state, PlayerStatus::Idle);
            return Err(PlaybackError::PlaybackStartFailed(e.to_string()));
        }

        let notifier = TrackEndNotifier {
            player: Arc::downgrade(&self.inner),
            uuid: handle.uuid(),
            scratch,
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(Event::Track(event), notifier.clone())
                .map_err(|e| PlaybackError::PlaybackStartFailed(format!("Error al agregar event handler: {}", e)))?;
        }

        let mut state = self.inner.state.lock();
        let next = if state.subscribed || self.inner.behavior == NoSubscriberBehavior::Stop {
            PlayerStatus::Playing
        } else {
            let _ = handle.pause();
            PlayerStatus::AutoPaused
        };
        state.track = Some(handle);
        self.inner.transition(&mut state, next);
        Ok(())
    }

    fn pause(&self) -> bool {
        let mut state = self.inner.state.lock();
        if !matches!(state.status, PlayerStatus::Playing | PlayerStatus::AutoPaused) {
            return false;
        }
        if let Some(track) = &state.track {
            let _ = track.pause();
        }
        self.inner.transition(&mut state, PlayerStatus::Paused);
        true
    }

    fn unpause(&self) -> bool {
        let mut state = self.inner.state.lock();
        if !matches!(state.status, PlayerStatus::Paused | PlayerStatus::AutoPaused) {
            return false;
        }
        if let Some(track) = &state.track {
            let _ = track.play();
        }
        self.inner.transition(&mut state, PlayerStatus::Playing);
        true
    }

    fn stop(&self) -> bool {
        let mut state = self.inner.state.lock();
        let Some(track) = state.track.take() else {
            return false;
        };
        let _ = track.stop();
        self.inner.transition(&mut state, PlayerStatus::Idle);
        true
    }

    fn status(&self) -> PlayerStatus {
        self.inner.state.lock().status
    }

    fn events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.inner.events.subscribe()
    }

    fn set_subscribed(&self, subscribed: bool) {
        let mut state = self.inner.state.lock();
        state.subscribed = subscribed;

        match (subscribed, state.status, self.inner.behavior) {
            (false, PlayerStatus::Playing, NoSubscriberBehavior::Pause) => {
                if let Some(track) = &state.track {
                    let _ = track.pause();
                }
                self.inner.transition(&mut state, PlayerStatus::AutoPaused);
            }
            (false, PlayerStatus::Playing | PlayerStatus::Paused, NoSubscriberBehavior::Stop) => {
                if let Some(track) = state.track.take() {
                    let _ = track.stop();
                }
                self.inner.transition(&mut state, PlayerStatus::Idle);
            }
            (true, PlayerStatus::AutoPaused, _) => {
                if let Some(track) = &state.track {
                    let _ = track.play();
                }
                self.inner.transition(&mut state, PlayerStatus::Playing);
            }
            _ => {}
        }
    }
}

/// Handler para cuando termina una canción
#[derive(Clone)]
struct TrackEndNotifier {
    player: Weak<PlayerInner>,
    uuid: Uuid,
    scratch: Option<PathBuf>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _) in tracks.iter() {
                if let songbird::tracks::PlayMode::Errored(e) = &state.playing {
                    warn!("Pista terminó con error: {:?}", e);
                }
            }
        }

        if let Some(path) = &self.scratch {
            let _ = tokio::fs::remove_file(path).await;
        }

        match self.player.upgrade() {
            Some(player) => {
                debug!("Track terminado: {}", self.uuid);
                player.track_finished(self.uuid);
            }
            None => debug!("Track terminado sin reproductor: {}", self.uuid),
        }

        Some(Event::Cancel)
    }
}
