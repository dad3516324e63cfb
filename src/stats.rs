//! The player statistics service and its on-disk cache.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stats API endpoint.
pub const API_URL: &str = "https://api.hypixel.net/player";

/// Seconds a cached player record stays usable.
pub const CACHE_TTL: u64 = 3600;

/// Resolve a gamemode alias to its canonical name.
pub fn resolve_gamemode(value: &str) -> Option<&'static str> {
    match value.to_lowercase().as_str() {
        "bedwars" | "bw" => Some("bedwars"),
        "skywars" | "sw" | "s" => Some("skywars"),
        _ => None,
    }
}

/// Resolve a statistic alias within a gamemode.
pub fn resolve_statistic(stat: &str, gamemode: &str) -> Option<&'static str> {
    let stat = stat.to_lowercase();
    match gamemode {
        "bedwars" => match stat.as_str() {
            "finals" | "final" | "fk" | "fks" => Some("Finals"),
            "fkdr" | "fk/d" => Some("FKDR"),
            "wins" | "win" | "w" => Some("Wins"),
            "wlr" | "w/l" => Some("WLR"),
            _ => None,
        },
        "skywars" => match stat.as_str() {
            "kills" | "kill" | "k" => Some("Kills"),
            "kdr" | "k/d" => Some("KDR"),
            "wins" | "win" | "w" => Some("Wins"),
            "wlr" | "w/l" => Some("WLR"),
            _ => None,
        },
        _ => None,
    }
}

/// Why a lookup produced no stats.
#[derive(Debug, PartialEq, Eq)]
pub enum StatsError {
    /// No profile under that name; on Hypixel this usually means a nick.
    NotFound,
    InvalidKey,
    RateLimited,
    Transport(String),
}

impl std::error::Error for StatsError {}

impl std::fmt::Display for StatsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "player not found"),
            Self::InvalidKey => write!(f, "invalid API key"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BedwarsStats {
    pub level: i64,
    pub final_kills: i64,
    pub fkdr: f64,
    pub wins: i64,
    pub wlr: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SkywarsStats {
    pub level: i64,
    pub kills: i64,
    pub kdr: f64,
    pub wins: i64,
    pub wlr: f64,
}

/// Everything the proxy wants to know about one player.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerStats {
    pub name: String,
    /// Undashed hex uuid, as the API reports it.
    pub uuid: String,
    /// Raw rank name ("MVP+", "ADMIN", ... or empty for none).
    pub rank: String,
    /// Formatting code for the rank's plus signs, when customized.
    pub plus_color: Option<String>,
    pub bedwars: BedwarsStats,
    pub skywars: SkywarsStats,
}

/// The statistics backend the enrichment pipeline talks to.
pub trait StatsProvider: Send + Sync {
    fn lookup(&self, name: &str) -> Result<PlayerStats, StatsError>;

    /// Flush any state before shutdown.
    fn close(&self) {}
}

/// Direct `ureq` client against the Hypixel player endpoint.
pub struct HypixelClient {
    key: String,
    agent: ureq::Agent,
}

impl HypixelClient {
    pub fn new(key: String) -> Self {
        Self {
            key,
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(10))
                .build(),
        }
    }
}

impl StatsProvider for HypixelClient {
    fn lookup(&self, name: &str) -> Result<PlayerStats, StatsError> {
        let response = match self
            .agent
            .get(API_URL)
            .query("key", &self.key)
            .query("name", name)
            .call()
        {
            Ok(r) => r,
            Err(ureq::Error::Status(403, _)) => return Err(StatsError::InvalidKey),
            Err(ureq::Error::Status(429, _)) => return Err(StatsError::RateLimited),
            Err(ureq::Error::Status(code, _)) => {
                return Err(StatsError::Transport(format!("status {}", code)))
            }
            Err(e) => return Err(StatsError::Transport(e.to_string())),
        };

        let body = response
            .into_string()
            .map_err(|e| StatsError::Transport(e.to_string()))?;
        let json: Value =
            serde_json::from_str(&body).map_err(|e| StatsError::Transport(e.to_string()))?;

        match json.get("player") {
            Some(player) if !player.is_null() => Ok(parse_player(player)),
            _ => Err(StatsError::NotFound),
        }
    }
}

fn parse_player(player: &Value) -> PlayerStats {
    let bedwars = player
        .pointer("/stats/Bedwars")
        .cloned()
        .unwrap_or(Value::Null);
    let skywars = player
        .pointer("/stats/SkyWars")
        .cloned()
        .unwrap_or(Value::Null);

    PlayerStats {
        name: str_field(player, "displayname"),
        uuid: str_field(player, "uuid"),
        rank: rank_of(player),
        plus_color: player
            .get("rankPlusColor")
            .and_then(Value::as_str)
            .map(plus_code),
        bedwars: BedwarsStats {
            level: player
                .pointer("/achievements/bedwars_level")
                .and_then(Value::as_i64)
                .unwrap_or(0),
            final_kills: int_field(&bedwars, "final_kills_bedwars"),
            fkdr: ratio(
                int_field(&bedwars, "final_kills_bedwars"),
                int_field(&bedwars, "final_deaths_bedwars"),
            ),
            wins: int_field(&bedwars, "wins_bedwars"),
            wlr: ratio(
                int_field(&bedwars, "wins_bedwars"),
                int_field(&bedwars, "losses_bedwars"),
            ),
        },
        skywars: SkywarsStats {
            level: skywars
                .get("levelFormatted")
                .and_then(Value::as_str)
                .map(|s| {
                    s.chars()
                        .filter(char::is_ascii_digit)
                        .collect::<String>()
                        .parse::<i64>()
                        .unwrap_or(0)
                })
                .unwrap_or(0),
            kills: int_field(&skywars, "kills"),
            kdr: ratio(int_field(&skywars, "kills"), int_field(&skywars, "deaths")),
            wins: int_field(&skywars, "wins"),
            wlr: ratio(int_field(&skywars, "wins"), int_field(&skywars, "losses")),
        },
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

fn int_field(value: &Value, key: &str) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or(0)
}

/// Two decimal places; a zero denominator yields the numerator.
fn ratio(num: i64, den: i64) -> f64 {
    let raw = if den == 0 {
        num as f64
    } else {
        num as f64 / den as f64
    };
    (raw * 100.0).round() / 100.0
}

fn rank_of(player: &Value) -> String {
    if let Some(rank) = player.get("rank").and_then(Value::as_str) {
        match rank {
            "NORMAL" => {}
            "YOUTUBER" => return "YOUTUBE".to_owned(),
            "GAME_MASTER" => return "GAME MASTER".to_owned(),
            other => return other.to_owned(),
        }
    }
    if player.get("monthlyPackageRank").and_then(Value::as_str) == Some("SUPERSTAR") {
        return "MVP++".to_owned();
    }
    match player.get("newPackageRank").and_then(Value::as_str) {
        Some("VIP") => "VIP".to_owned(),
        Some("VIP_PLUS") => "VIP+".to_owned(),
        Some("MVP") => "MVP".to_owned(),
        Some("MVP_PLUS") => "MVP+".to_owned(),
        _ => String::new(),
    }
}

fn plus_code(color: &str) -> String {
    match color {
        "BLACK" => "§0",
        "DARK_BLUE" => "§1",
        "DARK_GREEN" => "§2",
        "DARK_AQUA" => "§3",
        "DARK_RED" => "§4",
        "DARK_PURPLE" => "§5",
        "GOLD" => "§6",
        "GRAY" => "§7",
        "DARK_GRAY" => "§8",
        "BLUE" => "§9",
        "GREEN" => "§a",
        "AQUA" => "§b",
        "YELLOW" => "§e",
        "WHITE" => "§f",
        "LIGHT_PURPLE" => "§d",
        _ => "§c",
    }
    .to_owned()
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    stats: PlayerStats,
    fetched_at: u64,
}

/// Best-effort file cache in front of another provider, keyed by
/// lowercased name. Entries older than [`CACHE_TTL`] are refetched;
/// a corrupt or missing cache file rebuilds empty.
pub struct CachedStats<P: StatsProvider> {
    inner: P,
    path: PathBuf,
    entries: Mutex<HashMap<String, CacheRecord>>,
}

impl<P: StatsProvider> CachedStats<P> {
    pub fn new(inner: P, path: PathBuf) -> Self {
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("Discarding unreadable stats cache: {}", e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            inner,
            path,
            entries: Mutex::new(entries),
        }
    }

    fn persist(&self, entries: &HashMap<String, CacheRecord>) {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let serialized = match serde_json::to_string(entries) {
            Ok(s) => s,
            Err(e) => {
                warn!("Couldn't serialize stats cache: {}", e);
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, serialized) {
            warn!("Couldn't write stats cache: {}", e);
        }
    }
}

impl<P: StatsProvider> StatsProvider for CachedStats<P> {
    fn lookup(&self, name: &str) -> Result<PlayerStats, StatsError> {
        let key = name.to_lowercase();
        let now = epoch_secs();

        {
            let entries = self.entries.lock().unwrap();
            if let Some(record) = entries.get(&key) {
                if now.saturating_sub(record.fetched_at) < CACHE_TTL {
                    return Ok(record.stats.clone());
                }
            }
        }

        let stats = self.inner.lookup(name)?;

        let entries = {
            let mut entries = self.entries.lock().unwrap();
            entries.insert(
                key,
                CacheRecord {
                    stats: stats.clone(),
                    fetched_at: now,
                },
            );
            entries
        };
        self.persist(&entries);

        Ok(stats)
    }

    fn close(&self) {
        self.persist(&self.entries.lock().unwrap());
        self.inner.close();
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
