use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Comandos slash del bot
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        mp3_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        list_command(),
        remove_command(),
        clear_command(),
        speak_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o playlist de YouTube")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

fn mp3_command() -> CreateCommand {
    CreateCommand::new("mp3")
        .description("Reproduce un archivo de audio local")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "name", "Nombre del archivo")
                .required(true),
        )
}

// Comandos de control

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola")
}

// Comandos de cola

fn list_command() -> CreateCommand {
    CreateCommand::new("list").description("Muestra la cola de reproducción")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita de la cola la primera canción cuyo título contenga el texto")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "title", "Parte del título")
                .required(true),
        )
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Limpia la cola de reproducción")
}

// Voz

fn speak_command() -> CreateCommand {
    CreateCommand::new("speak")
        .description("Dice un mensaje en el canal de voz sobre la música")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "text", "Texto a pronunciar")
                .required(true)
                .max_length(1000),
        )
}
