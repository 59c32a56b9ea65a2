use dashmap::DashMap;
use serenity::all::GuildId;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast::error::RecvError, watch, Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::queue::{EnqueueOutcome, GuildPlaybackState, QueueSnapshot};
use crate::{
    error::PlaybackError,
    sources::{MediaResolver, SongRef},
    storage::GuildConfigProvider,
    ui::{buttons::MusicAction, PlaybackUi},
    voice::{GuildRef, VoiceSession},
};

/// Estado visible de la reproducción de una guild
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    Playing(String),
    Paused(String),
}

/// Fallo al iniciar una canción.
///
/// `song` es lo que se sacó de la cola, si algo. No se vuelve a encolar: quien
/// llama decide si reintentar, saltar o reportar.
#[derive(Debug)]
pub struct StartFailure {
    pub song: Option<SongRef>,
    pub error: PlaybackError,
}

impl From<StartFailure> for PlaybackError {
    fn from(failure: StartFailure) -> Self {
        failure.error
    }
}

struct GuildSlot {
    state: Arc<Mutex<GuildPlaybackState>>,
    status: watch::Sender<PlaybackStatus>,
}

/// Máquina de estados de reproducción, una por guild
pub struct PlaybackController {
    slots: DashMap<GuildId, Arc<GuildSlot>>,
    voice: Arc<VoiceSession>,
    resolver: Arc<MediaResolver>,
    ui: Arc<dyn PlaybackUi>,
    guild_config: Arc<dyn GuildConfigProvider>,
    max_queue_size: usize,
    me: Weak<Self>,
}

impl PlaybackController {
    pub fn new(
        voice: Arc<VoiceSession>,
        resolver: Arc<MediaResolver>,
        ui: Arc<dyn PlaybackUi>,
        guild_config: Arc<dyn GuildConfigProvider>,
        max_queue_size: usize,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            slots: DashMap::new(),
            voice,
            resolver,
            ui,
            guild_config,
            max_queue_size,
            me: me.clone(),
        })
    }

    pub fn voice(&self) -> &Arc<VoiceSession> {
        &self.voice
    }

    pub fn resolver(&self) -> &Arc<MediaResolver> {
        &self.resolver
    }

    fn slot(&self, guild_id: GuildId) -> Arc<GuildSlot> {
        if let Some(slot) = self.slots.get(&guild_id) {
            return Arc::clone(&slot);
        }

        let mut created = false;
        let slot = self
            .slots
            .entry(guild_id)
            .or_insert_with(|| {
                created = true;
                Arc::new(GuildSlot {
                    state: Arc::new(Mutex::new(GuildPlaybackState::new(guild_id, self.max_queue_size))),
                    status: watch::channel(PlaybackStatus::Idle).0,
                })
            })
            .clone();

        if created {
            self.spawn_control_loop(guild_id);
        }
        slot
    }

    /// Consume las señales de idle del reproductor principal.
    ///
    /// Una tarea por guild; cada fin natural se atiende una sola vez, con el
    /// slot de comandos tomado.
    fn spawn_control_loop(&self, guild_id: GuildId) {
        let mut events = self.voice.events(guild_id);
        let controller = self.me.clone();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.is_idle_signal() => {
                        let Some(controller) = controller.upgrade() else { break };
                        controller.on_natural_end(guild_id).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Guild {}: {} eventos del reproductor perdidos", guild_id, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Control loop terminado para guild {}", guild_id);
        });
    }

    /// Toma el slot de comandos de la guild.
    ///
    /// Un solo comando modifica la guild a la vez; el slot se libera al soltar
    /// el [`GuildCommand`] devuelto.
    pub async fn acquire(&self, guild: &GuildRef) -> GuildCommand<'_> {
        let slot = self.slot(guild.guild_id);
        let mut state = Arc::clone(&slot.state).lock_owned().await;

        if let Some(channel) = guild.text_channel {
            state.set_text_channel(channel);
        }

        let mut command = GuildCommand {
            controller: self,
            guild: *guild,
            slot,
            state,
        };
        command.reconcile().await;
        command
    }

    /// Estado observable de la guild
    pub fn watch(&self, guild_id: GuildId) -> watch::Receiver<PlaybackStatus> {
        self.slot(guild_id).status.subscribe()
    }

    /// Encola y, si es lo primero, empieza a reproducir.
    ///
    /// El texto devuelto resume el resultado para quien lo pidió. Los fallos al
    /// iniciar van en el texto; solo los errores al encolar se devuelven.
    pub async fn add_and_play(&self, guild: &GuildRef, songs: Vec<SongRef>) -> Result<String, PlaybackError> {
        let Some(first) = songs.first().cloned() else {
            return Err(PlaybackError::QueueEmpty);
        };
        let count = songs.len();

        let mut command = self.acquire(guild).await;
        let outcome = command.add_songs(songs).await?;

        let added = if count > 1 {
            format!("Added to the queue: \"{}\" and {} more songs.", first.title(), count - 1)
        } else {
            format!("Added to the queue: \"{}\"", first.title())
        };

        if outcome == EnqueueOutcome::AddedWhileActive {
            return Ok(added);
        }

        let prefix = if count > 1 { format!("{} ", added) } else { String::new() };
        match command.start_playback().await {
            Ok(song) => Ok(format!("{}Playing: \"{}\".", prefix, song.title())),
            Err(failure) => {
                let title = failure.song.as_ref().unwrap_or(&first).title().to_string();
                Ok(format!("Error playing: \"{}\". {}", title, failure.error.user_message()))
            }
        }
    }

    async fn on_natural_end(&self, guild_id: GuildId) {
        let mut command = self.acquire(&GuildRef::new(guild_id)).await;

        let Some(finished) = command.state.take_current() else {
            debug!("Guild {}: señal de idle sin canción actual", guild_id);
            return;
        };
        command.remove_card().await;
        command.publish(PlaybackStatus::Idle);
        debug!("⏹️ Guild {}: terminó {}", guild_id, finished.title());

        if command.state.is_empty() {
            debug!("Cola vacía para guild {}", guild_id);
            return;
        }

        command.guild.text_channel = command.state.text_channel();
        command.start_or_report().await;
    }
}

/// Comando en curso sobre una guild, con el slot tomado
pub struct GuildCommand<'a> {
    controller: &'a PlaybackController,
    guild: GuildRef,
    slot: Arc<GuildSlot>,
    state: OwnedMutexGuard<GuildPlaybackState>,
}

impl GuildCommand<'_> {
    fn guild_id(&self) -> GuildId {
        self.guild.guild_id
    }

    fn publish(&self, status: PlaybackStatus) {
        self.slot.status.send_replace(status);
    }

    /// La sesión de voz se cerró por inactividad: no queda nada sonando
    async fn reconcile(&mut self) {
        if self.state.current().is_some() && self.controller.voice.handle(self.guild_id()).is_none() {
            debug!("Guild {}: sesión de voz cerrada, limpiando canción actual", self.guild_id());
            self.state.take_current();
            self.remove_card().await;
            self.publish(PlaybackStatus::Idle);
        }
    }

    async fn remove_card(&mut self) {
        if let Some(card) = self.state.take_now_playing() {
            self.controller.ui.remove(card).await;
        }
    }

    async fn show_card(&mut self, song: &SongRef) {
        self.remove_card().await;
        if let Some(channel) = self.state.text_channel() {
            let card = self
                .controller
                .ui
                .show_now_playing(channel, song, self.state.len())
                .await;
            self.state.set_now_playing(card);
        }
    }

    pub async fn add_songs(&mut self, songs: Vec<SongRef>) -> Result<EnqueueOutcome, PlaybackError> {
        if songs.is_empty() {
            return Err(PlaybackError::QueueEmpty);
        }

        let outcome = self.state.enqueue(songs.clone())?;
        if outcome == EnqueueOutcome::AddedWhileActive {
            if let Some(channel) = self.state.text_channel() {
                self.controller.ui.announce_added(channel, &songs).await;
            }
        }
        Ok(outcome)
    }

    /// Saca la siguiente canción, la resuelve y la reproduce
    pub async fn start_playback(&mut self) -> Result<SongRef, StartFailure> {
        let Some(song) = self.state.dequeue() else {
            return Err(StartFailure {
                song: None,
                error: PlaybackError::QueueEmpty,
            });
        };

        let started = async {
            let source = self.controller.resolver.resolve(&song).await?;
            self.controller.voice.play(&self.guild, source).await
        }
        .await;

        match started {
            Ok(()) => {
                info!("🎵 Guild {}: reproduciendo {}", self.guild_id(), song.title());
                self.state.set_current(Some(song.clone()));
                self.publish(PlaybackStatus::Playing(song.title().to_string()));
                self.show_card(&song).await;
                Ok(song)
            }
            Err(error) => {
                if error.is_control_flow() {
                    debug!("Guild {}: {} no disponible: {}", self.guild_id(), song.title(), error);
                } else {
                    error!("❌ Guild {}: error al reproducir {}: {}", self.guild_id(), song.title(), error);
                }
                self.remove_card().await;
                Err(StartFailure {
                    song: Some(song),
                    error,
                })
            }
        }
    }

    pub async fn pause(&mut self) -> bool {
        let Some(title) = self.state.current().map(|s| s.title().to_string()) else {
            return false;
        };
        if !self.controller.voice.pause(self.guild_id()) {
            return false;
        }

        info!("⏸️ Reproducción pausada en guild {}", self.guild_id());
        self.publish(PlaybackStatus::Paused(title));
        if let Some(card) = self.state.now_playing() {
            self.controller.ui.set_paused(card, true).await;
        }
        true
    }

    pub async fn resume(&mut self) -> bool {
        let Some(title) = self.state.current().map(|s| s.title().to_string()) else {
            return false;
        };
        if !self.controller.voice.unpause(self.guild_id()) {
            return false;
        }

        info!("▶️ Reproducción reanudada en guild {}", self.guild_id());
        self.publish(PlaybackStatus::Playing(title));
        if let Some(card) = self.state.now_playing() {
            self.controller.ui.set_paused(card, false).await;
        }
        true
    }

    /// Inicia la siguiente canción; un fallo se reporta en el canal de texto
    async fn start_or_report(&mut self) -> bool {
        match self.start_playback().await {
            Ok(_) => true,
            Err(failure) => {
                if let (Some(channel), Some(song)) = (self.state.text_channel(), failure.song.as_ref()) {
                    self.controller.ui.report_failure(channel, song, &failure.error).await;
                }
                false
            }
        }
    }

    /// Detiene la canción actual; el control loop avanza a la siguiente.
    ///
    /// Sin canción actual (tras un inicio fallido) arranca la siguiente en cola.
    pub async fn skip(&mut self) -> bool {
        if self.state.current().is_none() {
            if self.state.is_empty() {
                return false;
            }
            info!("⏭️ Guild {}: sin canción actual, iniciando la siguiente", self.guild_id());
            self.start_or_report().await;
            return true;
        }
        info!("⏭️ Saltando canción en guild {}", self.guild_id());
        self.controller.voice.stop(self.guild_id());
        true
    }

    /// Vacía la cola y detiene el reproductor
    pub fn stop(&mut self) -> bool {
        self.state.clear();
        let had_song = self.state.current().is_some();
        self.controller.voice.stop(self.guild_id());
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id());
        had_song
    }

    pub async fn run(&mut self, action: MusicAction) -> bool {
        match action {
            MusicAction::Pause => self.pause().await,
            MusicAction::Resume => self.resume().await,
            MusicAction::Skip => self.skip().await,
            MusicAction::Stop => self.stop(),
        }
    }

    pub fn remove(&mut self, text: &str) -> bool {
        self.state.remove_by_title_substring(text)
    }

    pub fn clear(&mut self) {
        self.state.clear();
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let limit = self
            .controller
            .guild_config
            .settings(self.guild_id())
            .max_queue_display;
        self.state.snapshot(limit)
    }

    pub fn current(&self) -> Option<&SongRef> {
        self.state.current()
    }

    pub fn queued_titles(&self) -> Vec<String> {
        self.state.queued().map(|s| s.title().to_string()).collect()
    }
}
