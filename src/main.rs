use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use roboto_music::{
    audio::{InterruptOverlay, PlaybackController},
    bot::RobotoBot,
    cache::MediaCache,
    config::Config,
    sources::{GeneratedTrackSource, LocalFileSource, MediaResolver, RemoteVideoSource, YtDlpClient},
    speech::{Announcer, ElevenLabsSpeech, OpenAiSpeech, TtsProvider},
    storage::JsonStorage,
    ui::DiscordUi,
    voice::{SongbirdGateway, VoiceSession},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("roboto_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Roboto Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());

    // Configuración por servidor
    let storage = Arc::new(JsonStorage::new(config.data_dir.clone()).await?);

    // Fuentes de audio
    let media_cache = Arc::new(MediaCache::new(config.cache_dir.clone(), config.cache_max_age));
    let ytdlp = Arc::new(YtDlpClient::new(config.ytdlp_path.clone(), config.ytdlp_cookies.clone()));
    match ytdlp.verify().await {
        Ok(version) => info!("✅ yt-dlp {}", version),
        Err(e) => warn!("⚠️ yt-dlp no disponible, YouTube fallará: {:?}", e),
    }

    let resolver = Arc::new(
        MediaResolver::new(config.search_results)
            .register(Arc::new(RemoteVideoSource::new(
                ytdlp,
                Arc::clone(&media_cache),
                config.download_timeout,
            )))
            .register(Arc::new(LocalFileSource::new(config.local_audio_dir.clone())))
            .register(Arc::new(GeneratedTrackSource)),
    );

    // Voz
    let songbird = Songbird::serenity();
    let gateway = Arc::new(SongbirdGateway::new(Arc::clone(&songbird), config.cache_dir.clone()));
    let voice = Arc::new(VoiceSession::new(gateway.clone(), config.voice_idle_timeout));

    let http = Arc::new(Http::new(&config.discord_token));
    let controller = PlaybackController::new(
        Arc::clone(&voice),
        resolver,
        Arc::new(DiscordUi::new(http)),
        storage.clone(),
        config.max_queue_size,
    );

    let overlay = Arc::new(InterruptOverlay::new(Arc::clone(&voice)));
    let mut announcer = Announcer::new(config.tts_provider, overlay, storage.clone());
    if let Some(api_key) = &config.tts_api_key {
        let provider = OpenAiSpeech::new(
            api_key.clone(),
            &config.tts_base_url,
            config.tts_model.clone(),
            config.tts_voice.clone(),
        )?;
        announcer = announcer.with_provider(TtsProvider::OpenAi, Arc::new(provider));
    }
    if let Some(api_key) = &config.elevenlabs_api_key {
        let provider = ElevenLabsSpeech::new(
            api_key.clone(),
            config.elevenlabs_model.clone(),
            config.elevenlabs_voice_id.clone(),
        )?;
        announcer = announcer.with_provider(TtsProvider::ElevenLabs, Arc::new(provider));
    }
    let announcer = if announcer.has_providers() {
        Some(Arc::new(announcer))
    } else {
        info!("🔇 Sin TTS_API_KEY ni ELEVENLABS_API_KEY, /speak desactivado");
        None
    };

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Crear handler del bot
    let handler = RobotoBot::new(config.clone(), controller, announcer);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;
    gateway.attach_cache(Arc::clone(&client.cache));

    // Tareas de mantenimiento
    let shutdown = CancellationToken::new();
    let cache_sweeper = Arc::clone(&media_cache).spawn_sweeper(config.cache_sweep_interval, shutdown.clone());
    let voice_sweeper = Arc::clone(&voice).spawn_idle_sweep(config.voice_sweep_interval, shutdown.clone());

    // Manejar shutdown graceful
    let shard_manager = Arc::clone(&client.shard_manager);
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        signal.cancel();
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    shutdown.cancel();
    let _ = tokio::join!(cache_sweeper, voice_sweeper);
    voice.shutdown().await;
    info!("👋 Bot detenido");

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
