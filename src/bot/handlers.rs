use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::application::{CommandInteraction, ComponentInteraction},
    prelude::Context,
};
use std::str::FromStr;
use tracing::{debug, info};

use crate::{
    bot::RobotoBot,
    error::PlaybackError,
    sources::{youtube::VideoLink, Provider, SongRef},
    ui::{buttons::MusicAction, embeds},
    voice::GuildRef,
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &RobotoBot) -> Result<()> {
    let guild = match GuildRef::from_interaction(command.guild_id, command.user.id, command.channel_id) {
        Ok(guild) => guild,
        Err(e) => return reply(ctx, &command, &e.user_message(), true).await,
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild.guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild).await?,
        "mp3" => handle_mp3(ctx, &command, bot, guild).await?,
        "pause" => handle_control(ctx, &command, bot, guild, MusicAction::Pause).await?,
        "resume" => handle_control(ctx, &command, bot, guild, MusicAction::Resume).await?,
        "skip" => handle_control(ctx, &command, bot, guild, MusicAction::Skip).await?,
        "stop" => handle_control(ctx, &command, bot, guild, MusicAction::Stop).await?,
        "list" => handle_list(ctx, &command, bot, guild).await?,
        "remove" => handle_remove(ctx, &command, bot, guild).await?,
        "clear" => handle_clear(ctx, &command, bot, guild).await?,
        "speak" => handle_speak(ctx, &command, bot, guild).await?,
        _ => reply(ctx, &command, "❌ Comando no reconocido", true).await?,
    }

    Ok(())
}

/// Maneja los botones del mensaje "reproduciendo ahora"
pub async fn handle_component(ctx: &Context, component: ComponentInteraction, bot: &RobotoBot) -> Result<()> {
    let action = match MusicAction::from_str(&component.data.custom_id) {
        Ok(action) => action,
        Err(e) => {
            debug!("Componente ignorado: {}", e);
            return Ok(());
        }
    };

    let guild = match GuildRef::from_interaction(component.guild_id, component.user.id, component.channel_id) {
        Ok(guild) => guild,
        Err(e) => return reply_component(ctx, &component, &e.user_message()).await,
    };

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild.guild_id
    );

    let applied = bot.controller().acquire(&guild).await.run(action).await;
    if applied {
        // La tarjeta la actualiza el controlador
        component
            .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
            .await?;
    } else {
        reply_component(ctx, &component, "❌ No hay nada reproduciéndose actualmente").await?;
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(ctx: &Context, command: &CommandInteraction, bot: &RobotoBot, guild: GuildRef) -> Result<()> {
    let Some(query) = string_option(command, "query") else {
        return reply(ctx, command, "❌ Falta la búsqueda", true).await;
    };

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let result = async {
        let mut songs = bot
            .controller()
            .resolver()
            .search(Provider::RemoteVideo, query, None)
            .await?;

        // Una búsqueda de texto reproduce solo el mejor resultado
        if VideoLink::parse(query).is_none() {
            songs.truncate(1);
        }
        play_songs(bot, guild, query, songs).await
    }
    .await;

    finish_deferred(ctx, command, result).await
}

async fn handle_mp3(ctx: &Context, command: &CommandInteraction, bot: &RobotoBot, guild: GuildRef) -> Result<()> {
    let Some(name) = string_option(command, "name") else {
        return reply(ctx, command, "❌ Falta el nombre del archivo", true).await;
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let result = async {
        let songs = bot
            .controller()
            .resolver()
            .search(Provider::LocalFile, name, Some(1))
            .await?;
        play_songs(bot, guild, name, songs).await
    }
    .await;

    finish_deferred(ctx, command, result).await
}

async fn play_songs(bot: &RobotoBot, guild: GuildRef, query: &str, songs: Vec<SongRef>) -> Result<String, PlaybackError> {
    if songs.is_empty() {
        return Err(PlaybackError::ResolutionNotFound(query.to_string()));
    }
    bot.controller().add_and_play(&guild, songs).await
}

async fn handle_control(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &RobotoBot,
    guild: GuildRef,
    action: MusicAction,
) -> Result<()> {
    let applied = bot.controller().acquire(&guild).await.run(action).await;

    let message = match (action, applied) {
        (MusicAction::Pause, true) => "⏸️ Reproducción pausada",
        (MusicAction::Resume, true) => "▶️ Reproducción reanudada",
        (MusicAction::Skip, true) => "⏭️ Canción saltada",
        (MusicAction::Stop, true) => "⏹️ Reproducción detenida y cola limpiada",
        (MusicAction::Stop, false) => "⏹️ Cola limpiada",
        (MusicAction::Resume, false) => "❌ No hay nada en pausa",
        _ => "❌ No hay nada reproduciéndose actualmente",
    };

    reply(ctx, command, message, !applied).await
}

async fn handle_list(ctx: &Context, command: &CommandInteraction, bot: &RobotoBot, guild: GuildRef) -> Result<()> {
    let snapshot = bot.controller().acquire(&guild).await.snapshot();

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embeds::queue(&snapshot)),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_remove(ctx: &Context, command: &CommandInteraction, bot: &RobotoBot, guild: GuildRef) -> Result<()> {
    let Some(title) = string_option(command, "title") else {
        return reply(ctx, command, "❌ Falta el título", true).await;
    };

    let removed = bot.controller().acquire(&guild).await.remove(title);
    if removed {
        reply(ctx, command, &format!("🗑️ Quitada de la cola: \"{}\"", title), false).await
    } else {
        reply(ctx, command, &format!("🔍 Ninguna canción en cola contiene \"{}\"", title), true).await
    }
}

async fn handle_clear(ctx: &Context, command: &CommandInteraction, bot: &RobotoBot, guild: GuildRef) -> Result<()> {
    bot.controller().acquire(&guild).await.clear();
    reply(ctx, command, "🧹 Cola limpiada", false).await
}

async fn handle_speak(ctx: &Context, command: &CommandInteraction, bot: &RobotoBot, guild: GuildRef) -> Result<()> {
    let Some(announcer) = bot.announcer() else {
        return reply(ctx, command, "❌ La voz sintetizada no está configurada", true).await;
    };
    let Some(text) = string_option(command, "text") else {
        return reply(ctx, command, "❌ Falta el texto", true).await;
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new().ephemeral(true)),
        )
        .await?;

    let result = announcer
        .say(&guild, text)
        .await
        .map(|_| "🗣️ Mensaje en curso".to_string());

    finish_deferred(ctx, command, result).await
}

// Funciones auxiliares

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

async fn reply(ctx: &Context, command: &CommandInteraction, content: &str, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

async fn reply_component(ctx: &Context, component: &ComponentInteraction, content: &str) -> Result<()> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

async fn finish_deferred(
    ctx: &Context,
    command: &CommandInteraction,
    result: Result<String, PlaybackError>,
) -> Result<()> {
    let content = match result {
        Ok(text) => text,
        Err(e) => {
            if !e.is_control_flow() {
                tracing::warn!("Comando /{} falló: {}", command.data.name, e);
            }
            e.user_message()
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;

    Ok(())
}
