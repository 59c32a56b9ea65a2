use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::all::{ChannelId, GuildId};
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::gateway::{
    AudioPlayer, GuildRef, NoSubscriberBehavior, PlayerEvent, PlayerStatus, VoiceConnection,
    VoiceGateway,
};
use crate::{error::PlaybackError, sources::PlayableSource};

/// Conexión y reproductor principal de una guild
pub struct VoiceSessionHandle {
    // Cambia si la conexión se cae y se vuelve a unir
    connection: Mutex<Arc<dyn VoiceConnection>>,
    player: Arc<dyn AudioPlayer>,
    last_activity: Mutex<Instant>,
}

impl VoiceSessionHandle {
    pub fn connection(&self) -> Arc<dyn VoiceConnection> {
        self.connection.lock().clone()
    }

    pub fn player(&self) -> &Arc<dyn AudioPlayer> {
        &self.player
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_since(&self) -> Instant {
        *self.last_activity.lock()
    }
}

/// Ciclo de vida de las conexiones de voz por guild.
///
/// Es dueño de la conexión y del reproductor principal de cada guild; el
/// controlador y el overlay pasan siempre por aquí. Solo el barrido de
/// inactividad destruye un handle: si la conexión se cae, se vuelve a unir
/// y el mismo reproductor se suscribe a la nueva.
pub struct VoiceSession {
    gateway: Arc<dyn VoiceGateway>,
    connections: DashMap<GuildId, Arc<dyn VoiceConnection>>,
    handles: DashMap<GuildId, Arc<VoiceSessionHandle>>,
    // Un relay por guild que sobrevive a la recreación del reproductor
    relays: DashMap<GuildId, broadcast::Sender<PlayerEvent>>,
    setup_locks: DashMap<GuildId, Arc<tokio::sync::Mutex<()>>>,
    idle_timeout: Duration,
}

impl VoiceSession {
    pub fn new(gateway: Arc<dyn VoiceGateway>, idle_timeout: Duration) -> Self {
        Self {
            gateway,
            connections: DashMap::new(),
            handles: DashMap::new(),
            relays: DashMap::new(),
            setup_locks: DashMap::new(),
            idle_timeout,
        }
    }

    fn setup_lock(&self, guild_id: GuildId) -> Arc<tokio::sync::Mutex<()>> {
        self.setup_locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn relay(&self, guild_id: GuildId) -> broadcast::Sender<PlayerEvent> {
        self.relays
            .entry(guild_id)
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }

    /// Transiciones del reproductor principal de la guild, incluso de reproductores futuros
    pub fn events(&self, guild_id: GuildId) -> broadcast::Receiver<PlayerEvent> {
        self.relay(guild_id).subscribe()
    }

    pub fn handle(&self, guild_id: GuildId) -> Option<Arc<VoiceSessionHandle>> {
        self.handles.get(&guild_id).map(|h| Arc::clone(&h))
    }

    pub async fn ensure_connection(&self, guild: &GuildRef) -> Result<Arc<dyn VoiceConnection>, PlaybackError> {
        let lock = self.setup_lock(guild.guild_id);
        let _setup = lock.lock().await;
        self.ensure_connection_locked(guild).await
    }

    async fn ensure_connection_locked(&self, guild: &GuildRef) -> Result<Arc<dyn VoiceConnection>, PlaybackError> {
        let guild_id = guild.guild_id;

        let existing = self.connections.get(&guild_id).map(|c| Arc::clone(&c));
        if let Some(connection) = existing {
            if connection.is_ready().await {
                return Ok(connection);
            }
            warn!("🔌 Conexión de voz caída en guild {}, reconectando", guild_id);
            self.connections.remove(&guild_id);
        }

        let channel = self.pick_channel(guild).await?;
        let connection = self.gateway.join(guild_id, channel).await?;
        self.connections.insert(guild_id, Arc::clone(&connection));

        if let Some(handle) = self.handle(guild_id) {
            *handle.connection.lock() = Arc::clone(&connection);
            connection.subscribe(&handle.player);
            debug!("🎛️ Reproductor de guild {} movido a la nueva conexión", guild_id);
        }

        info!("🔊 Conectado al canal de voz {} en guild {}", channel, guild_id);
        Ok(connection)
    }

    /// Canal del solicitante, o el más poblado (primero en caso de empate)
    async fn pick_channel(&self, guild: &GuildRef) -> Result<ChannelId, PlaybackError> {
        if let Some(user) = guild.requester {
            if let Some(channel) = self.gateway.requester_channel(guild.guild_id, user).await {
                return Ok(channel);
            }
        }

        let channels = self.gateway.voice_channels(guild.guild_id).await?;
        let mut best: Option<(ChannelId, usize)> = None;
        for (channel, members) in channels {
            if best.map_or(true, |(_, max)| members > max) {
                best = Some((channel, members));
            }
        }

        best.map(|(channel, _)| channel)
            .ok_or(PlaybackError::NoVoiceChannel)
    }

    /// Reproductor principal de la guild, creado la primera vez.
    ///
    /// Las llamadas repetidas devuelven el mismo reproductor y refrescan la actividad.
    pub async fn get_player(&self, guild: &GuildRef) -> Result<Arc<dyn AudioPlayer>, PlaybackError> {
        let lock = self.setup_lock(guild.guild_id);
        let _setup = lock.lock().await;

        let connection = self.ensure_connection_locked(guild).await?;

        if let Some(handle) = self.handle(guild.guild_id) {
            handle.touch();
            return Ok(Arc::clone(&handle.player));
        }

        let player = connection.create_player(NoSubscriberBehavior::Pause);
        connection.subscribe(&player);

        let handle = Arc::new(VoiceSessionHandle {
            connection: Mutex::new(connection),
            player: Arc::clone(&player),
            last_activity: Mutex::new(Instant::now()),
        });
        self.spawn_relay(guild.guild_id, &handle);
        self.handles.insert(guild.guild_id, handle);

        debug!("🎛️ Reproductor creado para guild {}", guild.guild_id);
        Ok(player)
    }

    /// Reenvía los eventos del reproductor al relay de la guild
    fn spawn_relay(&self, guild_id: GuildId, handle: &Arc<VoiceSessionHandle>) {
        let mut events = handle.player.events();
        let relay = self.relay(guild_id);
        let weak: Weak<VoiceSessionHandle> = Arc::downgrade(handle);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(handle) = weak.upgrade() else { break };
                        if event.new == PlayerStatus::Playing {
                            handle.touch();
                        }
                        drop(handle);
                        let _ = relay.send(event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Relay de guild {} perdió {} eventos", guild_id, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Relay de eventos terminado para guild {}", guild_id);
        });
    }

    /// Reemplaza lo que suena en el reproductor principal. No espera a que termine.
    pub async fn play(&self, guild: &GuildRef, source: PlayableSource) -> Result<(), PlaybackError> {
        let player = self.get_player(guild).await?;
        debug!("▶️ Guild {}: {}", guild.guild_id, source.describe());
        player.play(source).await
    }

    pub fn pause(&self, guild_id: GuildId) -> bool {
        self.handle(guild_id).is_some_and(|h| h.player.pause())
    }

    pub fn unpause(&self, guild_id: GuildId) -> bool {
        self.handle(guild_id).is_some_and(|h| h.player.unpause())
    }

    /// Detiene el reproductor principal; emite la señal de idle si había algo cargado
    pub fn stop(&self, guild_id: GuildId) -> bool {
        self.handle(guild_id).is_some_and(|h| h.player.stop())
    }

    pub fn status(&self, guild_id: GuildId) -> PlayerStatus {
        self.handle(guild_id)
            .map(|h| h.player.status())
            .unwrap_or(PlayerStatus::Idle)
    }

    /// Crea un reproductor secundario y le pasa la conexión
    pub async fn attach_overlay(&self, guild: &GuildRef) -> Result<Arc<dyn AudioPlayer>, PlaybackError> {
        // El principal debe existir para poder volver a él
        self.get_player(guild).await?;
        let handle = self
            .handle(guild.guild_id)
            .ok_or_else(|| PlaybackError::PlaybackStartFailed("sesión de voz no disponible".into()))?;

        let connection = handle.connection();
        let overlay = connection.create_player(NoSubscriberBehavior::Stop);
        connection.subscribe(&overlay);
        Ok(overlay)
    }

    /// Devuelve la conexión al reproductor principal
    pub fn restore_primary(&self, guild_id: GuildId) {
        if let Some(handle) = self.handle(guild_id) {
            handle.connection().subscribe(&handle.player);
        }
    }

    async fn teardown(&self, guild_id: GuildId) {
        self.handles.remove(&guild_id);
        if let Some((_, connection)) = self.connections.remove(&guild_id) {
            connection.disconnect().await;
        }
    }

    /// Desconecta las guilds inactivas y retorna cuántas se cerraron
    pub async fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<GuildId> = self
            .handles
            .iter()
            .filter(|entry| {
                let handle = entry.value();
                if handle.player.status() == PlayerStatus::Playing {
                    handle.touch();
                    return false;
                }
                now.duration_since(handle.idle_since()) >= self.idle_timeout
            })
            .map(|entry| *entry.key())
            .collect();

        let mut closed = 0;
        for guild_id in expired {
            let lock = self.setup_lock(guild_id);
            let _setup = lock.lock().await;

            // Pudo volver a usarse mientras esperábamos el lock
            let Some(handle) = self.handle(guild_id) else { continue };
            if Instant::now().duration_since(handle.idle_since()) < self.idle_timeout {
                continue;
            }

            info!("💤 Desconectando la guild {} por inactividad", guild_id);
            drop(handle);
            self.teardown(guild_id).await;
            closed += 1;
        }

        closed
    }

    pub fn spawn_idle_sweep(self: Arc<Self>, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // El primer tick es inmediato
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let closed = self.sweep_idle().await;
                        if closed > 0 {
                            debug!("Voice sweep: {} conexiones cerradas", closed);
                        }
                    }
                }
            }
        })
    }

    /// Desconecta todo, usado al apagar
    pub async fn shutdown(&self) {
        let guilds: Vec<GuildId> = self.connections.iter().map(|e| *e.key()).collect();
        futures::future::join_all(guilds.into_iter().map(|guild_id| self.teardown(guild_id))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::fake::FakeGateway;
    use serenity::all::UserId;

    const GUILD: GuildId = GuildId::new(10);

    // `unwrap_err` necesita Debug en el tipo Ok
    impl std::fmt::Debug for dyn VoiceConnection {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("VoiceConnection")
        }
    }

    fn session(gateway: FakeGateway) -> (Arc<FakeGateway>, VoiceSession) {
        let gateway = Arc::new(gateway);
        let session = VoiceSession::new(gateway.clone(), Duration::from_secs(60 * 60));
        (gateway, session)
    }

    #[tokio::test]
    async fn get_player_is_idempotent() {
        let (gateway, session) = session(FakeGateway::new().with_channel(ChannelId::new(1), 0));
        let guild = GuildRef::new(GUILD);

        let first = session.get_player(&guild).await.unwrap();
        let second = session.get_player(&guild).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(gateway.joins(), 1);
        let (_, conn) = gateway.last_connection().unwrap();
        assert_eq!(conn.players().len(), 1);
        assert!(conn.players()[0].is_subscribed());
    }

    #[tokio::test]
    async fn joins_the_requester_channel_first() {
        let user = UserId::new(7);
        let (gateway, session) = session(
            FakeGateway::new()
                .with_channel(ChannelId::new(1), 5)
                .with_member(user, ChannelId::new(2)),
        );

        session
            .ensure_connection(&GuildRef::new(GUILD).with_requester(user))
            .await
            .unwrap();
        assert_eq!(gateway.last_connection().unwrap().0, ChannelId::new(2));
    }

    #[tokio::test]
    async fn falls_back_to_most_populated_channel() {
        let (gateway, session) = session(
            FakeGateway::new()
                .with_channel(ChannelId::new(1), 2)
                .with_channel(ChannelId::new(2), 4)
                .with_channel(ChannelId::new(3), 4),
        );

        session
            .ensure_connection(&GuildRef::new(GUILD).with_requester(UserId::new(99)))
            .await
            .unwrap();
        assert_eq!(gateway.last_connection().unwrap().0, ChannelId::new(2));
    }

    #[tokio::test]
    async fn no_channels_is_an_error() {
        let (_, session) = session(FakeGateway::new());
        let err = session.ensure_connection(&GuildRef::new(GUILD)).await.unwrap_err();
        assert!(matches!(err, PlaybackError::NoVoiceChannel));
    }

    #[tokio::test]
    async fn dead_connection_is_rejoined_with_the_same_player() {
        let (gateway, session) = session(FakeGateway::new().with_channel(ChannelId::new(1), 0));
        let guild = GuildRef::new(GUILD);

        let first = session.get_player(&guild).await.unwrap();
        first.play(PlayableSource::Url("https://a".into())).await.unwrap();
        gateway.last_connection().unwrap().1.drop_connection();

        let second = session.get_player(&guild).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(gateway.joins(), 2);
        assert_eq!(second.status(), PlayerStatus::Playing);

        let (_, rejoined) = gateway.last_connection().unwrap();
        let handle = session.handle(GUILD).unwrap();
        assert_eq!(
            Arc::as_ptr(&handle.connection()) as *const (),
            Arc::as_ptr(&rejoined) as *const ()
        );
        assert!(rejoined.players().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sweep_spares_playing_guilds() {
        let (gateway, session) = session(FakeGateway::new().with_channel(ChannelId::new(1), 0));
        let guild = GuildRef::new(GUILD);
        let player = session.get_player(&guild).await.unwrap();
        player.play(PlayableSource::Url("https://a".into())).await.unwrap();

        tokio::time::advance(Duration::from_secs(2 * 60 * 60)).await;
        assert_eq!(session.sweep_idle().await, 0);

        player.stop();
        tokio::time::advance(Duration::from_secs(2 * 60 * 60)).await;
        assert_eq!(session.sweep_idle().await, 1);
        assert!(session.handle(GUILD).is_none());
        assert!(!gateway.last_connection().unwrap().1.is_ready().await);
    }

    #[tokio::test]
    async fn relay_survives_reconnection() {
        let (gateway, session) = session(FakeGateway::new().with_channel(ChannelId::new(1), 0));
        let guild = GuildRef::new(GUILD);
        let mut events = session.events(GUILD);

        let player = session.get_player(&guild).await.unwrap();
        player.play(PlayableSource::Url("https://a".into())).await.unwrap();
        assert_eq!(events.recv().await.unwrap().new, PlayerStatus::Playing);

        gateway.last_connection().unwrap().1.drop_connection();
        let player = session.get_player(&guild).await.unwrap();
        assert!(player.stop());
        assert!(events.recv().await.unwrap().is_idle_signal());
    }

    #[tokio::test(start_paused = true)]
    async fn relay_survives_player_recreation() {
        let (_, session) = session(FakeGateway::new().with_channel(ChannelId::new(1), 0));
        let guild = GuildRef::new(GUILD);
        let mut events = session.events(GUILD);

        session.get_player(&guild).await.unwrap();
        tokio::time::advance(Duration::from_secs(2 * 60 * 60)).await;
        assert_eq!(session.sweep_idle().await, 1);

        let player = session.get_player(&guild).await.unwrap();
        player.play(PlayableSource::Url("https://b".into())).await.unwrap();
        assert_eq!(events.recv().await.unwrap().new, PlayerStatus::Playing);
    }
}
