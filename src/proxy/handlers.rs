//! Intercepted packet handlers.
//!
//! Everything registered in [`super::registry`] lands here. Handlers
//! that don't forward their frame consume it; synthetic frames are
//! written straight to the owning leg.

use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use serde_repr::Serialize_repr;
use uuid::Uuid;

use crate::command::Invocation;
use crate::errors::*;
use crate::format;
use crate::serial::{
    strip_codes, Chat, GenericArray, GenericOption, Long, Readable, UnsignedByte, UnsignedShort,
    VarInt, Writable,
};
use crate::stats::{self, StatsError};
use crate::stream::Frame;
use crate::world::{PlayerEntry, PlayerProperty, StatsEntry, Team};

use super::{Phase, Session};

/// Protocol numbers this proxy understands.
#[derive(Serialize_repr, Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u16)]
pub enum Protocol {
    /// Server versions 1.8-1.8.9
    V47 = 47,
}

/// How many times the locraw probe retries out of limbo.
const LOCRAW_ATTEMPTS: u32 = 3;

const DESCRIPTION: &str = "Sekisho; the checkpoint on the road to Hypixel";

// 1x1 transparent png
const FAVICON_B64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

#[derive(Serialize, Debug)]
struct StatusVersion {
    name: &'static str,
    protocol: Protocol,
}

#[derive(Serialize, Debug)]
struct StatusPlayers {
    max: u32,
    online: u32,
}

#[derive(Serialize, Debug)]
struct StatusDescription {
    text: &'static str,
}

/// The server list ping response body.
#[derive(Serialize, Debug)]
struct StatusResponse {
    version: StatusVersion,
    players: StatusPlayers,
    description: StatusDescription,
    favicon: String,
}

// Handshaking ------

/// Client 0x00: route the connection to Status or Login. A Login
/// handshake opens the upstream leg and re-declares the handshake
/// with the real server's address.
pub fn handshake(session: &Arc<Session>, frame: Frame) -> SekishoResult<()> {
    // degenerate server list pings carry no real handshake
    if frame.payload.len() <= 2 {
        return Ok(());
    }

    let mut buf = &frame.payload[..];
    let protocol = VarInt::read_from(&mut buf)?.0;
    if protocol != Protocol::V47 as i32 {
        warn!("Client speaks protocol {}, expected 47", protocol);
    }
    String::read_from(&mut buf)?; // requested address
    UnsignedShort::read_from(&mut buf)?; // requested port
    let next_state = VarInt::read_from(&mut buf)?.0;

    match next_state {
        1 => {
            session.set_phase(Phase::Status);
            Ok(())
        }
        2 => {
            session.set_phase(Phase::Login);

            let (host, port) = session.upstream.clone();
            info!("Opening upstream connection to {}:{}", host, port);
            let sock = TcpStream::connect((&host[..], port))?;
            let reader_sock = sock.try_clone()?;
            session.attach_server(sock)?;
            session.spawn_server_loop(reader_sock);

            let mut payload = Vec::new();
            VarInt(Protocol::V47 as i32).write_to(&mut payload)?;
            host.write_to(&mut payload)?;
            port.write_to(&mut payload)?;
            VarInt(2).write_to(&mut payload)?;
            session.send_server(0x00, &payload)
        }
        other => Err(Error::from(ProtocolViolation {
            expected: format!("next state 1 or 2, not {}", other),
        })),
    }
}

// Status -----------

/// Client 0x00: answer the server list ping ourselves. No upstream
/// connection is ever opened for a Status session.
pub fn status_request(session: &Arc<Session>, _frame: Frame) -> SekishoResult<()> {
    let response = StatusResponse {
        version: StatusVersion {
            name: "1.8.9",
            protocol: Protocol::V47,
        },
        players: StatusPlayers { max: 1, online: 0 },
        description: StatusDescription { text: DESCRIPTION },
        favicon: format!("data:image/png;base64,{}", FAVICON_B64),
    };

    let mut payload = Vec::new();
    serde_json::to_string(&response)?.write_to(&mut payload)?;
    session.send_client(0x00, &payload)
}

/// Client 0x01: echo the ping payload, then close.
pub fn ping_request(session: &Arc<Session>, frame: Frame) -> SekishoResult<()> {
    let mut buf = &frame.payload[..];
    let token = Long::read_from(&mut buf)?;

    let mut payload = Vec::new();
    token.write_to(&mut payload)?;
    session.send_client(0x01, &payload)?;

    session.close();
    Ok(())
}

// Login ------------

/// Client 0x00: remember who's connecting and pass the name upstream.
pub fn login_start(session: &Arc<Session>, frame: Frame) -> SekishoResult<()> {
    let mut buf = &frame.payload[..];
    let username = String::read_from(&mut buf)?;
    info!("{} logging in through the proxy", username);
    session.world.lock().unwrap().username = username;
    session.send_server(frame.id, &frame.payload)
}

// Play -------------

/// Server 0x01: a new game. Reset the world model, forward, and probe
/// for where we ended up.
pub fn join_game(session: &Arc<Session>, frame: Frame) -> SekishoResult<()> {
    {
        let mut world = session.world.lock().unwrap();
        world.reset_for_join();
        world.waiting_for_locraw = true;
        world.locraw_retries = 0;
    }
    session.send_client(frame.id, &frame.payload)?;
    spawn_locraw_probe(session, 0);
    Ok(())
}

fn spawn_locraw_probe(session: &Arc<Session>, attempt: u32) {
    let session = Arc::clone(session);
    thread::spawn(move || {
        // give the server a moment to settle after the join
        thread::sleep(Duration::from_millis(100));
        if session.is_closed() {
            return;
        }
        {
            let mut world = session.world.lock().unwrap();
            world.waiting_for_locraw = true;
            world.locraw_retries = attempt;
        }
        if let Err(e) = session.send_server_chat("/locraw") {
            warn!("Couldn't send the locraw probe: {:?}", e);
        }
    });
}

/// Server 0x02: chat. While a locraw probe is outstanding, a message
/// whose cleartext is a JSON object is the answer and gets consumed;
/// everything else passes through.
pub fn server_chat(session: &Arc<Session>, frame: Frame) -> SekishoResult<()> {
    let waiting = session.world.lock().unwrap().waiting_for_locraw;

    if waiting {
        let mut buf = &frame.payload[..];
        if let Ok(chat) = Chat::read_from(&mut buf) {
            let text = chat.plain();
            if text.starts_with('{') && text.ends_with('}') {
                if let Ok(json) = serde_json::from_str::<Value>(&text) {
                    consume_locraw(session, &json);
                    return Ok(());
                }
            }
        }
    }

    session.send_client(frame.id, &frame.payload)
}

fn consume_locraw(session: &Arc<Session>, json: &Value) {
    let in_limbo = json
        .get("server")
        .and_then(Value::as_str)
        .map(|s| s.contains("limbo"))
        .unwrap_or(false);

    if in_limbo {
        let attempt = session.world.lock().unwrap().locraw_retries;
        if attempt + 1 < LOCRAW_ATTEMPTS {
            spawn_locraw_probe(session, attempt + 1);
        } else {
            // limbo for good; leave the game blank
            session.world.lock().unwrap().waiting_for_locraw = false;
            debug!("Giving up on locraw after {} attempts", attempt + 1);
        }
        return;
    }

    let mut world = session.world.lock().unwrap();
    world.game.update(json);
    if !world.game.mode.is_empty() {
        world.rq_game = world.game.clone();
    }
    world.waiting_for_locraw = false;
    info!(
        "Now in {} ({})",
        if world.game.lobbyname.is_empty() {
            &world.game.server
        } else {
            &world.game.lobbyname
        },
        world.game.gametype
    );
}

/// Client 0x01: chat. Slash commands are ours to answer; everything
/// else (including unknown commands) belongs to the server.
pub fn client_chat(session: &Arc<Session>, frame: Frame) -> SekishoResult<()> {
    let mut buf = &frame.payload[..];
    let message = String::read_from(&mut buf)?;

    if !message.starts_with('/') {
        return session.send_server(frame.id, &frame.payload);
    }

    let invocation = match Invocation::parse(&message) {
        Some(invocation) => invocation,
        None => return session.send_server(frame.id, &frame.payload),
    };
    let command = match session.commands.find(invocation.name()) {
        Some(command) => command,
        None => return session.send_server(frame.id, &frame.payload),
    };

    match command.invoke(session, &invocation) {
        Err(err) => session.send_client_chat(&err.message),
        Ok(Some(output)) => {
            if invocation.echoes_upstream() {
                session.send_server_chat(&strip_codes(&output))
            } else {
                session.send_client_chat(&output)
            }
        }
        Ok(None) => Ok(()),
    }
}

/// Client 0x17: plugin channel. Forwarded verbatim; `MC|Brand` also
/// tells us which client we're fronting for.
pub fn plugin_message(session: &Arc<Session>, frame: Frame) -> SekishoResult<()> {
    session.send_server(frame.id, &frame.payload)?;

    let mut buf = &frame.payload[..];
    let channel = String::read_from(&mut buf)?;
    if channel == "MC|Brand" {
        let brand = if contains(buf, b"lunarclient") {
            "lunar"
        } else if contains(buf, b"vanilla") {
            "vanilla"
        } else {
            ""
        };
        if !brand.is_empty() {
            debug!("Client brand: {}", brand);
            session.world.lock().unwrap().client_brand = brand.to_owned();
        }
    }
    Ok(())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Server 0x3E: scoreboard teams. Apply to the model, forward, then
/// re-emit cached display names, since new affixes may wrap them.
pub fn teams(session: &Arc<Session>, frame: Frame) -> SekishoResult<()> {
    let mut buf = &frame.payload[..];
    let name = String::read_from(&mut buf)?;
    let mode = UnsignedByte::read_from(&mut buf)?;

    {
        let mut world = session.world.lock().unwrap();
        match mode {
            0 => {
                let display_name = String::read_from(&mut buf)?;
                let prefix = String::read_from(&mut buf)?;
                let suffix = String::read_from(&mut buf)?;
                let friendly_fire = UnsignedByte::read_from(&mut buf)?;
                let name_tag_visibility = String::read_from(&mut buf)?;
                let color = UnsignedByte::read_from(&mut buf)?;
                let players: Vec<String> = GenericArray::<VarInt, String>::read_from(&mut buf)?.into();
                world.teams.create(Team {
                    name: name.clone(),
                    display_name,
                    prefix,
                    suffix,
                    friendly_fire,
                    name_tag_visibility,
                    color,
                    players: players.into_iter().collect(),
                });
            }
            1 => world.teams.remove(&name),
            2 => {
                let display_name = String::read_from(&mut buf)?;
                let prefix = String::read_from(&mut buf)?;
                let suffix = String::read_from(&mut buf)?;
                let friendly_fire = UnsignedByte::read_from(&mut buf)?;
                let name_tag_visibility = String::read_from(&mut buf)?;
                let color = UnsignedByte::read_from(&mut buf)?;
                world.teams.update_info(
                    &name,
                    display_name,
                    prefix,
                    suffix,
                    friendly_fire,
                    name_tag_visibility,
                    color,
                );
            }
            3 | 4 => {
                let players: Vec<String> = GenericArray::<VarInt, String>::read_from(&mut buf)?.into();
                if mode == 3 {
                    world.teams.add_players(&name, &players);
                } else {
                    world.teams.remove_players(&name, &players);
                }
            }
            other => debug!("Ignoring unknown teams mode {}", other),
        }
    }

    session.send_client(frame.id, &frame.payload)?;
    refresh_cached_displays(session)?;
    scan_for_stats(session);
    Ok(())
}

/// Server 0x38: tab list updates, kept in `players` and mirrored to
/// the `players_old` snapshot for late-arriving lookups.
pub fn player_list_item(session: &Arc<Session>, frame: Frame) -> SekishoResult<()> {
    let mut buf = &frame.payload[..];
    let action = VarInt::read_from(&mut buf)?.0;
    let count = VarInt::read_from(&mut buf)?.0;

    {
        let mut world = session.world.lock().unwrap();
        for _ in 0..count {
            let uuid = Uuid::read_from(&mut buf)?;
            match action {
                0 => {
                    let name = String::read_from(&mut buf)?;
                    let properties: Vec<PlayerProperty> =
                        GenericArray::<VarInt, PlayerProperty>::read_from(&mut buf)?.into();
                    let gamemode = VarInt::read_from(&mut buf)?.0;
                    let ping = VarInt::read_from(&mut buf)?.0;
                    let display = GenericOption::<Chat>::read_from(&mut buf)?.0;
                    let entry = PlayerEntry {
                        uuid,
                        name,
                        gamemode,
                        ping,
                        display,
                        properties,
                    };
                    world.players_old.insert(uuid, entry.clone());
                    world.players.insert(uuid, entry);
                }
                1 => {
                    let gamemode = VarInt::read_from(&mut buf)?.0;
                    if let Some(player) = world.players.get_mut(&uuid) {
                        player.gamemode = gamemode;
                    }
                }
                2 => {
                    let ping = VarInt::read_from(&mut buf)?.0;
                    if let Some(player) = world.players.get_mut(&uuid) {
                        player.ping = ping;
                    }
                }
                3 => {
                    let display = GenericOption::<Chat>::read_from(&mut buf)?.0;
                    if let Some(player) = world.players.get_mut(&uuid) {
                        player.display = display;
                    }
                }
                4 => {
                    world.players.remove(&uuid);
                }
                other => {
                    return Err(Error::from(ProtocolViolation {
                        expected: format!("player list action 0..=4, not {}", other),
                    }));
                }
            }
        }
    }

    session.send_client(frame.id, &frame.payload)?;
    scan_for_stats(session);
    Ok(())
}

// Enrichment -------

/// Re-send every cached display line wrapped in its team's current
/// prefix and suffix.
fn refresh_cached_displays(session: &Arc<Session>) -> SekishoResult<()> {
    let updates: Vec<(Uuid, String)> = {
        let world = session.world.lock().unwrap();
        let mut updates = Vec::new();
        for team in world.teams.iter() {
            if !team.holds_real_players() {
                continue;
            }
            for player in &team.players {
                if let Some(entry) = world.players_with_stats.get(&player.to_lowercase()) {
                    updates.push((
                        entry.uuid,
                        format!("{}{}{}", team.prefix, entry.display, team.suffix),
                    ));
                }
            }
        }
        updates
    };

    for (uuid, display) in updates {
        send_display_update(session, uuid, &display)?;
    }
    Ok(())
}

/// Synthetic player-list-item, action 3 (update display name).
fn send_display_update(session: &Arc<Session>, uuid: Uuid, display: &str) -> SekishoResult<()> {
    let mut payload = Vec::new();
    VarInt(3).write_to(&mut payload)?;
    VarInt(1).write_to(&mut payload)?;
    uuid.write_to(&mut payload)?;
    true.write_to(&mut payload)?;
    Chat::from(display).write_to(&mut payload)?;
    session.send_client(0x38, &payload)
}

/// Fan out one stat lookup per unresolved name on the real-player
/// teams. The in-flight set keeps overlapping scans from ever
/// double-fetching a name.
fn scan_for_stats(session: &Arc<Session>) {
    let pending: Vec<(String, bool)> = {
        let mut world = session.world.lock().unwrap();
        let candidates: Vec<(String, bool)> = world
            .teams
            .iter()
            .filter(|team| team.holds_real_players())
            .flat_map(|team| {
                let decoy = team.is_decoy();
                team.players.iter().cloned().map(move |name| (name, decoy))
            })
            .collect();

        let mut pending = Vec::new();
        for (name, decoy) in candidates {
            if !name.is_ascii() {
                continue;
            }
            if world.begin_stat_lookup(&name) {
                pending.push((name, decoy));
            }
        }
        pending
    };

    for (name, decoy) in pending {
        let session = Arc::clone(session);
        thread::spawn(move || resolve_stats(&session, &name, decoy));
    }
}

/// One enrichment task: look the name up, classify the result, cache
/// it and push the synthetic display update. Always releases the
/// in-flight marker.
fn resolve_stats(session: &Arc<Session>, name: &str, decoy: bool) {
    let result = session.stats.lookup(name);

    if session.is_closed() {
        session.world.lock().unwrap().finish_stat_lookup(name);
        return;
    }

    let resolved: Option<(Uuid, String)> = match result {
        Ok(player) => {
            let gametype = session.world.lock().unwrap().game.gametype.clone();
            let gamemode = stats::resolve_gamemode(&gametype).unwrap_or("bedwars");
            let rank = format::rank_prefix(&player);
            if decoy && !rank.starts_with("§c") {
                // the red hidden team pads itself with names that
                // collide with real accounts; a non-red rank there
                // means it isn't really this player
                debug!("Skipping decoy entry {}", name);
                None
            } else {
                let display = format::display_line(&player, gamemode);
                match Uuid::parse_str(&player.uuid) {
                    Ok(uuid) => Some((uuid, display)),
                    Err(_) => session
                        .world
                        .lock()
                        .unwrap()
                        .uuid_for_name(name)
                        .map(|uuid| (uuid, display)),
                }
            }
        }
        Err(StatsError::NotFound) => {
            // no profile under this name: almost certainly a nick
            session
                .world
                .lock()
                .unwrap()
                .uuid_for_name(name)
                .map(|uuid| (uuid, format!("§5[NICK] {}", name)))
        }
        Err(e) => {
            warn!("Stat lookup for {} failed: {}", name, e);
            None
        }
    };

    match resolved {
        Some((uuid, display)) => {
            let wrapped = {
                let mut world = session.world.lock().unwrap();
                world.players_with_stats.insert(
                    name.to_lowercase(),
                    StatsEntry {
                        uuid,
                        display: display.clone(),
                    },
                );
                world.finish_stat_lookup(name);
                match world.teams.team_of(name) {
                    Some(team) => format!("{}{}{}", team.prefix, display, team.suffix),
                    None => display,
                }
            };
            if let Err(e) = send_display_update(session, uuid, &wrapped) {
                debug!("Couldn't push a display update for {}: {:?}", name, e);
            }
        }
        None => session.world.lock().unwrap().finish_stat_lookup(name),
    }
}
