//! Per-session model of the lobby or game the operator is in.
//!
//! Everything here is mutated by packet handlers and read by the
//! command surface and the stat enrichment tasks.

use std::collections::{HashMap, HashSet};
use std::io;

use serde_json::Value;
use uuid::Uuid;

use crate::errors::SekishoResult;
use crate::serial::{Chat, GenericOption, Readable, Writable};

/// Team prefixes the server uses for live players during pregame.
pub const REAL_TEAM_PREFIXES: [&str; 7] = ["§a", "§b", "§6", "§c", "§2", "§d", "§7"];

/// Current game descriptor, as reported by locraw. All strings are
/// lowercased at set time.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Game {
    pub server: String,
    pub gametype: String,
    pub mode: String,
    pub map: String,
    pub lobbyname: String,
    pub pregame: bool,
}

impl Game {
    /// Full overwrite from a locraw JSON object. Missing keys reset
    /// their field to the empty string.
    pub fn update(&mut self, data: &Value) {
        self.server = field(data, "server");
        self.gametype = field(data, "gametype");
        self.mode = field(data, "mode");
        self.map = field(data, "map");
        self.lobbyname = field(data, "lobbyname");
        // a lobby without a queued mode is by definition pre-game
        self.pregame = self.mode.is_empty() && !self.lobbyname.is_empty();
    }
}

fn field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .unwrap_or_default()
}

/// One scoreboard team, keyed by its stable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub name: String,
    pub display_name: String,
    pub prefix: String,
    pub suffix: String,
    pub friendly_fire: u8,
    pub name_tag_visibility: String,
    pub color: u8,
    pub players: HashSet<String>,
}

impl Team {
    /// Whether this team's prefix marks its members as live players.
    pub fn holds_real_players(&self) -> bool {
        REAL_TEAM_PREFIXES.contains(&self.prefix.as_str())
    }

    /// The red hidden-nametag team the server stocks with fake names.
    pub fn is_decoy(&self) -> bool {
        self.prefix == "§c" && self.name_tag_visibility == "never"
    }
}

/// Ordered collection of [`Team`]s, unique by name. A player name is
/// a member of at most one team at a time.
#[derive(Debug, Default, Clone)]
pub struct Teams(Vec<Team>);

impl Teams {
    pub fn get(&self, name: &str) -> Option<&Team> {
        self.0.iter().find(|t| t.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Team> {
        self.0.iter_mut().find(|t| t.name == name)
    }

    /// Mode 0. Ignored if a team with that name already exists.
    pub fn create(&mut self, team: Team) {
        if self.get(&team.name).is_some() {
            return;
        }
        for other in self.0.iter_mut() {
            for player in &team.players {
                other.players.remove(player);
            }
        }
        self.0.push(team);
    }

    /// Mode 1.
    pub fn remove(&mut self, name: &str) {
        self.0.retain(|t| t.name != name);
    }

    /// Mode 2. No-op if the team doesn't exist; the player set is
    /// untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn update_info(
        &mut self,
        name: &str,
        display_name: String,
        prefix: String,
        suffix: String,
        friendly_fire: u8,
        name_tag_visibility: String,
        color: u8,
    ) {
        if let Some(team) = self.get_mut(name) {
            team.display_name = display_name;
            team.prefix = prefix;
            team.suffix = suffix;
            team.friendly_fire = friendly_fire;
            team.name_tag_visibility = name_tag_visibility;
            team.color = color;
        }
    }

    /// Mode 3. Joining a team leaves whichever team the player was on.
    pub fn add_players(&mut self, name: &str, players: &[String]) {
        if self.get(name).is_none() {
            return;
        }
        for team in self.0.iter_mut() {
            if team.name != name {
                for player in players {
                    team.players.remove(player);
                }
            }
        }
        if let Some(team) = self.get_mut(name) {
            for player in players {
                team.players.insert(player.clone());
            }
        }
    }

    /// Mode 4. Removing a non-member is tolerated.
    pub fn remove_players(&mut self, name: &str, players: &[String]) {
        if let Some(team) = self.get_mut(name) {
            for player in players {
                team.players.remove(player);
            }
        }
    }

    /// The team a player name currently belongs to.
    pub fn team_of(&self, player: &str) -> Option<&Team> {
        self.0.iter().find(|t| t.players.contains(player))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Team> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A property attached to a player list entry (skin blobs, mostly).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerProperty {
    pub name: String,
    pub value: String,
    pub signature: Option<String>,
}

impl Readable for PlayerProperty {
    fn read_from<T: io::Read>(buf: &mut T) -> SekishoResult<Self> {
        Ok(Self {
            name: String::read_from(buf)?,
            value: String::read_from(buf)?,
            signature: GenericOption::read_from(buf)?.0,
        })
    }
}

impl Writable for PlayerProperty {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> SekishoResult<()> {
        self.name.write_to(buf)?;
        self.value.write_to(buf)?;
        GenericOption(self.signature.clone()).write_to(buf)
    }
}

/// One entry of the tab list, keyed by uuid.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEntry {
    pub uuid: Uuid,
    pub name: String,
    pub gamemode: i32,
    pub ping: i32,
    pub display: Option<Chat>,
    pub properties: Vec<PlayerProperty>,
}

/// A resolved stat lookup: where the display name should attach, and
/// the rendered (unwrapped) line itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsEntry {
    pub uuid: Uuid,
    pub display: String,
}

/// The whole mutable per-session state.
#[derive(Debug, Default)]
pub struct World {
    pub game: Game,
    /// Snapshot of the last game with a non-empty mode; requeue target.
    pub rq_game: Game,
    pub teams: Teams,
    pub players: HashMap<Uuid, PlayerEntry>,
    /// Last snapshot, kept so lookups finishing after a player left can
    /// still be matched back to a uuid.
    pub players_old: HashMap<Uuid, PlayerEntry>,
    /// Lowercased name -> resolved display line.
    pub players_with_stats: HashMap<String, StatsEntry>,
    /// Lowercased names with a lookup in flight.
    pub players_getting_stats: HashSet<String>,
    pub waiting_for_locraw: bool,
    pub locraw_retries: u32,
    pub username: String,
    pub client_brand: String,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wipe everything a join-game invalidates. The requeue snapshot
    /// survives so `/rq` works from the post-game lobby.
    pub fn reset_for_join(&mut self) {
        self.players.clear();
        self.players_old.clear();
        self.players_with_stats.clear();
        self.players_getting_stats.clear();
        self.game = Game::default();
    }

    /// Case-insensitive uuid lookup, falling back to the old snapshot.
    pub fn uuid_for_name(&self, name: &str) -> Option<Uuid> {
        let lower = name.to_lowercase();
        self.players
            .values()
            .chain(self.players_old.values())
            .find(|p| p.name.to_lowercase() == lower)
            .map(|p| p.uuid)
    }

    /// Mark a name as being resolved. Returns `false` (and does
    /// nothing) when it's already cached or already in flight, so
    /// concurrent scans dispatch exactly one lookup per name.
    pub fn begin_stat_lookup(&mut self, name: &str) -> bool {
        let key = name.to_lowercase();
        if self.players_with_stats.contains_key(&key) || self.players_getting_stats.contains(&key) {
            return false;
        }
        self.players_getting_stats.insert(key);
        true
    }

    /// Release an in-flight marker, with or without a result.
    pub fn finish_stat_lookup(&mut self, name: &str) {
        self.players_getting_stats.remove(&name.to_lowercase());
    }
}
