//! In-memory voice backend for tests.
//!
//! Players only track state transitions; [`FakePlayer::finish`] simulates the
//! end of the current resource so tests can drive natural ends
//! deterministically.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::all::{ChannelId, GuildId, UserId};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::broadcast;

use super::gateway::{
    AudioPlayer, NoSubscriberBehavior, PlayerEvent, PlayerStatus, Subscription, VoiceConnection,
    VoiceGateway,
};
use crate::{error::PlaybackError, sources::PlayableSource};

pub struct FakePlayer {
    behavior: NoSubscriberBehavior,
    status: Mutex<PlayerStatus>,
    subscribed: AtomicBool,
    played: Mutex<Vec<String>>,
    fail_next: AtomicBool,
    events: broadcast::Sender<PlayerEvent>,
}

impl FakePlayer {
    fn new(behavior: NoSubscriberBehavior) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            behavior,
            status: Mutex::new(PlayerStatus::Idle),
            subscribed: AtomicBool::new(false),
            played: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
            events,
        }
    }

    fn transition(&self, new: PlayerStatus) {
        let old = std::mem::replace(&mut *self.status.lock(), new);
        if old != new {
            let _ = self.events.send(PlayerEvent { old, new });
        }
    }

    /// El recurso actual terminó solo
    pub fn finish(&self) {
        self.transition(PlayerStatus::Idle);
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    pub fn fail_next_play(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioPlayer for FakePlayer {
    async fn play(&self, source: PlayableSource) -> Result<(), PlaybackError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PlaybackError::PlaybackStartFailed("decoder roto".into()));
        }
        self.played.lock().push(source.describe());
        self.transition(PlayerStatus::Playing);
        Ok(())
    }

    fn pause(&self) -> bool {
        let can = matches!(*self.status.lock(), PlayerStatus::Playing | PlayerStatus::AutoPaused);
        if can {
            self.transition(PlayerStatus::Paused);
        }
        can
    }

    fn unpause(&self) -> bool {
        let can = matches!(*self.status.lock(), PlayerStatus::Paused | PlayerStatus::AutoPaused);
        if can {
            self.transition(PlayerStatus::Playing);
        }
        can
    }

    fn stop(&self) -> bool {
        let active = *self.status.lock() != PlayerStatus::Idle;
        self.transition(PlayerStatus::Idle);
        active
    }

    fn status(&self) -> PlayerStatus {
        *self.status.lock()
    }

    fn events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    fn set_subscribed(&self, subscribed: bool) {
        self.subscribed.store(subscribed, Ordering::SeqCst);
        let status = self.status();
        match (subscribed, status, self.behavior) {
            (false, PlayerStatus::Playing, NoSubscriberBehavior::Pause) => {
                self.transition(PlayerStatus::AutoPaused)
            }
            (false, PlayerStatus::Playing | PlayerStatus::Paused, NoSubscriberBehavior::Stop) => {
                self.transition(PlayerStatus::Idle)
            }
            (true, PlayerStatus::AutoPaused, _) => self.transition(PlayerStatus::Playing),
            _ => {}
        }
    }
}

pub struct FakeConnection {
    ready: AtomicBool,
    players: Mutex<Vec<Arc<FakePlayer>>>,
    subscription: Subscription,
}

impl FakeConnection {
    fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            players: Mutex::new(Vec::new()),
            subscription: Subscription::default(),
        }
    }

    /// Reproductores creados sobre esta conexión, en orden
    pub fn players(&self) -> Vec<Arc<FakePlayer>> {
        self.players.lock().clone()
    }

    pub fn drop_connection(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn create_player(&self, behavior: NoSubscriberBehavior) -> Arc<dyn AudioPlayer> {
        let player = Arc::new(FakePlayer::new(behavior));
        self.players.lock().push(Arc::clone(&player));
        player
    }

    fn subscribe(&self, player: &Arc<dyn AudioPlayer>) {
        self.subscription.switch_to(player);
    }

    async fn disconnect(&self) {
        self.subscription.clear();
        self.ready.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeGateway {
    members: Mutex<HashMap<UserId, ChannelId>>,
    channels: Mutex<Vec<(ChannelId, usize)>>,
    connections: Mutex<Vec<(ChannelId, Arc<FakeConnection>)>>,
    joins: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(self, user: UserId, channel: ChannelId) -> Self {
        self.members.lock().insert(user, channel);
        self
    }

    pub fn with_channel(self, channel: ChannelId, members: usize) -> Self {
        self.channels.lock().push((channel, members));
        self
    }

    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    /// Canal y conexión del último join
    pub fn last_connection(&self) -> Option<(ChannelId, Arc<FakeConnection>)> {
        self.connections.lock().last().cloned()
    }

    /// Primer reproductor de la última conexión
    pub fn primary(&self) -> Option<Arc<FakePlayer>> {
        self.last_connection()
            .and_then(|(_, conn)| conn.players().first().cloned())
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn requester_channel(&self, _guild: GuildId, user: UserId) -> Option<ChannelId> {
        self.members.lock().get(&user).copied()
    }

    async fn voice_channels(&self, _guild: GuildId) -> Result<Vec<(ChannelId, usize)>, PlaybackError> {
        Ok(self.channels.lock().clone())
    }

    async fn join(&self, _guild: GuildId, channel: ChannelId) -> Result<Arc<dyn VoiceConnection>, PlaybackError> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        let connection = Arc::new(FakeConnection::new());
        self.connections.lock().push((channel, Arc::clone(&connection)));
        Ok(connection)
    }
}
