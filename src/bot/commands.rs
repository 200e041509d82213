use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registers the commands globally
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers the commands on a single guild (development)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        leave_command(),
        play_command(),
        pause_command(),
        resume_command(),
        stop_command(),
        skip_command(),
        queue_command(),
        nowplaying_command(),
        shuffle_command(),
        remove_command(),
        move_command(),
        loop_command(),
        volume_command(),
        clear_command(),
    ]
}

// Connection

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Joins (or moves to) your voice channel")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Clears the queue and leaves the voice channel")
}

// Playback

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Queues a song or playlist")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "URL or search term")
                .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pauses the current song")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resumes the paused song")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stops playback and clears the queue")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skips to the next song")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Shows the current song")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop").description("Toggles looping of the current song")
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Shows or sets the volume")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "level", "Volume (0-100)")
                .min_int_value(0)
                .max_int_value(100),
        )
}

// Queue

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Lists the queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Page number")
                .min_int_value(1),
        )
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Shuffles the queue")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Removes a song from the queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "index", "Position in the queue")
                .min_int_value(1)
                .required(true),
        )
}

fn move_command() -> CreateCommand {
    CreateCommand::new("move")
        .description("Moves a song to another position in the queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "from", "Current position")
                .min_int_value(1)
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "to", "New position")
                .min_int_value(1)
                .required(true),
        )
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Clears the queue")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_command_names_are_unique() {
        let names: Vec<String> = all_commands()
            .iter()
            .map(|command| serde_json::to_value(command).unwrap()["name"].as_str().unwrap().to_string())
            .collect();
        let unique: HashSet<&String> = names.iter().collect();

        assert_eq!(unique.len(), names.len());
        for expected in ["play", "skip", "move", "remove", "volume", "leave"] {
            assert!(names.iter().any(|name| name == expected), "missing /{}", expected);
        }
    }
}
