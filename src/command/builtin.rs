//! The commands the proxy ships with.

use std::sync::Arc;

use crate::format;
use crate::proxy::Session;
use crate::stats::{self, StatsError};

use super::{Command, CommandError, CommandResult, Invocation, Parameter, Registry};

const STATCHECK_PARAMS: &[Parameter] =
    &[Parameter::optional("ign"), Parameter::optional("mode")];

/// Build the process-wide command registry.
pub fn registry() -> Registry {
    Registry::new(vec![
        Command {
            name: "requeue",
            aliases: &["rq"],
            params: &[],
            variadic: false,
            run: requeue,
        },
        Command {
            // Mmm, garlic bread.
            name: "garlicbread",
            aliases: &[],
            params: &[],
            variadic: false,
            run: garlicbread,
        },
        Command {
            name: "statcheck",
            aliases: &["sc"],
            params: STATCHECK_PARAMS,
            variadic: true,
            run: statcheck,
        },
    ])
}

/// Queue the mode of the game we're in (or were last in).
fn requeue(session: &Arc<Session>, _invocation: &Invocation) -> CommandResult {
    let mode = {
        let world = session.world.lock().unwrap();
        if !world.game.mode.is_empty() {
            world.game.mode.clone()
        } else {
            world.rq_game.mode.clone()
        }
    };

    if mode.is_empty() {
        return Err(CommandError::new("§9§l∎ §4No game to requeue!"));
    }
    if session.send_server_chat(&format!("/play {}", mode)).is_err() {
        return Err(CommandError::new("§9§l∎ §4Couldn't reach the server!"));
    }
    Ok(None)
}

fn garlicbread(_session: &Arc<Session>, _invocation: &Invocation) -> CommandResult {
    Ok(Some("§eMmm, garlic bread.".to_owned()))
}

/// Look a player up at the stats service and print selected stats.
fn statcheck(session: &Arc<Session>, invocation: &Invocation) -> CommandResult {
    let (username, gametype) = {
        let world = session.world.lock().unwrap();
        (world.username.clone(), world.game.gametype.clone())
    };

    let ign = invocation
        .arg(0)
        .map(str::to_owned)
        .unwrap_or(username);

    let gamemode = match invocation.arg(1) {
        None => stats::resolve_gamemode(&gametype).unwrap_or("bedwars"),
        Some(mode) => stats::resolve_gamemode(mode).ok_or_else(|| {
            CommandError::new(format!("§9§l∎ §4Unknown gamemode '{}'!", mode))
        })?,
    };

    let tail = invocation.tail(2);
    let stat_names: Vec<&'static str> = if tail.is_empty() {
        match gamemode {
            "skywars" => vec!["Kills", "KDR", "Wins", "WLR"],
            _ => vec!["Finals", "FKDR", "Wins", "WLR"],
        }
    } else {
        let mut resolved = Vec::with_capacity(tail.len());
        for stat in tail {
            match stats::resolve_statistic(stat, gamemode) {
                Some(canonical) => resolved.push(canonical),
                None => {
                    return Err(CommandError::new(format!(
                        "§9§l∎ §4Unknown statistic '{}' for gamemode {}!",
                        stat, gamemode
                    )))
                }
            }
        }
        resolved
    };

    let player = session.stats.lookup(&ign).map_err(|e| match e {
        StatsError::NotFound => {
            CommandError::new(format!("§9§l∎ §4Player '{}' not found!", ign))
        }
        StatsError::InvalidKey => CommandError::new("§9§l∎ §4Invalid API Key!"),
        StatsError::RateLimited => CommandError::new(
            "§9§l∎ §4Your API key is being rate limited; please wait a little bit!",
        ),
        StatsError::Transport(_) => CommandError::new(format!(
            "§9§l∎ §4An unknown error occurred while fetching player '{}'!",
            ign
        )),
    })?;

    Ok(Some(format::format_stats(&player, gamemode, &stat_names)))
}
