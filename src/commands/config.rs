use super::require_admin;
use crate::state::{AgentConfig, Context};

const PARAMS: &str = "`max_iter`, `top_k`, `chunk_size`, `chunk_overlap`";

/// Configure agent parameters (admin only)
#[poise::command(slash_command, guild_only)]
pub async fn config(
    ctx: Context<'_>,
    #[description = "max_iter | top_k | chunk_size | chunk_overlap"] param: Option<String>,
    #[description = "New value"] value: Option<u32>,
) -> Result<(), anyhow::Error> {
    if !require_admin(&ctx).await? {
        return Ok(());
    }

    match (param.as_deref(), value) {
        // Show current config
        (None, _) => {
            let config = *ctx.data().config.read().await;
            ctx.say(format!(
                "**Agent Configuration:**\n\
                 `max_iter`: {}\n\
                 `top_k`: {}\n\
                 `chunk_size`: {}\n\
                 `chunk_overlap`: {}",
                config.max_iter, config.top_k, config.chunk_size, config.chunk_overlap
            ))
            .await?;
        }
        // Set a parameter
        (Some(key), Some(val)) => {
            let mut config = ctx.data().config.write().await;
            let reply = match apply(&mut config, key, val) {
                Ok(()) => format!("`{}` set to {}", key, val),
                Err(msg) => msg,
            };
            drop(config);
            ctx.say(reply).await?;
        }
        (Some(_), None) => {
            ctx.say("Provide both `param` and `value`. Example: `/deepsearch config max_iter 5`")
                .await?;
        }
    }

    Ok(())
}

/// Validate and set one parameter. The error is the message shown to the admin.
fn apply(config: &mut AgentConfig, key: &str, val: u32) -> Result<(), String> {
    let val_usize = val as usize;
    match key {
        "max_iter" => config.max_iter = val,
        "top_k" if val == 0 => return Err("`top_k` must be at least 1".to_string()),
        "top_k" => config.top_k = val_usize,
        "chunk_size" if val_usize <= config.chunk_overlap => {
            return Err(format!(
                "`chunk_size` must be larger than `chunk_overlap` ({})",
                config.chunk_overlap
            ))
        }
        "chunk_size" => config.chunk_size = val_usize,
        "chunk_overlap" if val_usize >= config.chunk_size => {
            return Err(format!(
                "`chunk_overlap` must be smaller than `chunk_size` ({})",
                config.chunk_size
            ))
        }
        "chunk_overlap" => config.chunk_overlap = val_usize,
        _ => return Err(format!("Unknown param `{}`. Valid: {}", key, PARAMS)),
    }
    Ok(())
}
