use dashmap::DashMap;
use serenity::all::GuildId;
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::PlaybackError,
    sources::PlayableSource,
    voice::{GuildRef, PlayerStatus, VoiceSession},
};

/// Fin de un anuncio de voz en curso
#[derive(Debug)]
pub struct SpeechHandle {
    done: oneshot::Receiver<()>,
}

impl SpeechHandle {
    /// Espera a que el anuncio termine y la música vuelva
    pub async fn finished(self) {
        let _ = self.done.await;
    }
}

/// Reproduce audio corto por encima de la música.
///
/// El reproductor principal se pausa (si sonaba), la conexión pasa a un
/// reproductor de un solo uso y todo vuelve a su lugar cuando éste queda
/// idle. Un solo overlay por guild; las llamadas siguientes esperan.
pub struct InterruptOverlay {
    voice: Arc<VoiceSession>,
    sessions: DashMap<GuildId, Arc<Mutex<()>>>,
}

impl InterruptOverlay {
    pub fn new(voice: Arc<VoiceSession>) -> Self {
        Self {
            voice,
            sessions: DashMap::new(),
        }
    }

    fn session_lock(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Inicia el anuncio y retorna en cuanto empieza a sonar
    pub async fn speak(&self, guild: &GuildRef, audio: PlayableSource) -> Result<SpeechHandle, PlaybackError> {
        let guild_id = guild.guild_id;
        let session = self.session_lock(guild_id).lock_owned().await;

        let was_playing = self.voice.status(guild_id) == PlayerStatus::Playing;
        if was_playing {
            self.voice.pause(guild_id);
        }

        let overlay = match self.voice.attach_overlay(guild).await {
            Ok(overlay) => overlay,
            Err(e) => {
                if was_playing {
                    self.voice.unpause(guild_id);
                }
                return Err(e);
            }
        };

        let mut events = overlay.events();
        debug!("🗣️ Guild {}: anuncio {}", guild_id, audio.describe());
        if let Err(e) = overlay.play(audio).await {
            warn!("No se pudo reproducir el anuncio en guild {}: {}", guild_id, e);
            self.restore(guild_id, was_playing);
            return Err(e);
        }
        info!("🗣️ Anuncio en curso en guild {}", guild_id);

        let (done_tx, done_rx) = oneshot::channel();
        let voice = Arc::clone(&self.voice);
        tokio::spawn(async move {
            // El lock de la guild vive hasta que el anuncio termina
            let _session = session;
            loop {
                match events.recv().await {
                    Ok(event) if event.new == PlayerStatus::Idle => break,
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => {
                        if overlay.status() == PlayerStatus::Idle {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            voice.restore_primary(guild_id);
            if was_playing {
                voice.unpause(guild_id);
            }
            drop(overlay);
            debug!("🗣️ Anuncio terminado en guild {}", guild_id);
            let _ = done_tx.send(());
        });

        Ok(SpeechHandle { done: done_rx })
    }

    fn restore(&self, guild_id: GuildId, was_playing: bool) {
        self.voice.restore_primary(guild_id);
        if was_playing {
            self.voice.unpause(guild_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::fake::FakeGateway;
    use bytes::Bytes;
    use serenity::all::ChannelId;
    use std::time::Duration;

    const GUILD: GuildId = GuildId::new(3);

    fn setup() -> (Arc<FakeGateway>, Arc<VoiceSession>, Arc<InterruptOverlay>) {
        let gateway = Arc::new(FakeGateway::new().with_channel(ChannelId::new(1), 1));
        let voice = Arc::new(VoiceSession::new(gateway.clone(), Duration::from_secs(3600)));
        let overlay = Arc::new(InterruptOverlay::new(voice.clone()));
        (gateway, voice, overlay)
    }

    fn speech() -> PlayableSource {
        PlayableSource::Bytes {
            data: Bytes::from_static(b"ID3"),
            content_type: Some("audio/mpeg".into()),
        }
    }

    #[tokio::test]
    async fn music_pauses_and_comes_back() {
        let (gateway, voice, overlay) = setup();
        let guild = GuildRef::new(GUILD);
        voice
            .play(&guild, PlayableSource::Url("https://a".into()))
            .await
            .unwrap();

        let handle = overlay.speak(&guild, speech()).await.unwrap();
        assert_eq!(voice.status(GUILD), PlayerStatus::Paused);

        let (_, conn) = gateway.last_connection().unwrap();
        let players = conn.players();
        assert_eq!(players.len(), 2);
        assert!(players[1].is_subscribed());
        assert!(!players[0].is_subscribed());

        players[1].finish();
        handle.finished().await;

        assert_eq!(voice.status(GUILD), PlayerStatus::Playing);
        assert!(players[0].is_subscribed());
    }

    #[tokio::test]
    async fn idle_primary_stays_idle() {
        let (gateway, voice, overlay) = setup();
        let guild = GuildRef::new(GUILD);

        let handle = overlay.speak(&guild, speech()).await.unwrap();
        let players = gateway.last_connection().unwrap().1.players();
        players[1].finish();
        handle.finished().await;

        assert_eq!(voice.status(GUILD), PlayerStatus::Idle);
        assert!(players[0].is_subscribed());
    }

    #[tokio::test]
    async fn user_pause_survives_the_announcement() {
        let (gateway, voice, overlay) = setup();
        let guild = GuildRef::new(GUILD);
        voice
            .play(&guild, PlayableSource::Url("https://a".into()))
            .await
            .unwrap();
        voice.pause(GUILD);

        let handle = overlay.speak(&guild, speech()).await.unwrap();
        gateway.last_connection().unwrap().1.players()[1].finish();
        handle.finished().await;

        assert_eq!(voice.status(GUILD), PlayerStatus::Paused);
    }

    #[tokio::test]
    async fn second_announcement_waits_for_the_first() {
        let (gateway, _voice, overlay) = setup();
        let guild = GuildRef::new(GUILD);

        let first = overlay.speak(&guild, speech()).await.unwrap();

        let waiting = {
            let overlay = Arc::clone(&overlay);
            tokio::spawn(async move { overlay.speak(&guild, speech()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let conn = gateway.last_connection().unwrap().1;
        assert_eq!(conn.players().len(), 2);
        assert!(!waiting.is_finished());

        conn.players()[1].finish();
        first.finished().await;

        let second = waiting.await.unwrap().unwrap();
        assert_eq!(conn.players().len(), 3);
        conn.players()[2].finish();
        second.finished().await;
    }

    #[tokio::test]
    async fn no_voice_channel_is_reported() {
        let gateway = Arc::new(FakeGateway::new());
        let voice = Arc::new(VoiceSession::new(gateway, Duration::from_secs(60)));
        let overlay = InterruptOverlay::new(voice);

        let err = overlay.speak(&GuildRef::new(GUILD), speech()).await.err().unwrap();
        assert!(matches!(err, PlaybackError::NoVoiceChannel));
    }
}
