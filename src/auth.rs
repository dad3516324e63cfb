//! Operator credentials and the Mojang session join.
//!
//! Acquiring a fresh token (the Microsoft/Xbox cascade) is someone
//! else's job; this module only consumes tokens handed to it through
//! the environment and remembers them across runs.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::errors::*;

/// Server join request session-server.
pub const JOIN_SERVER: &str = "https://sessionserver.mojang.com/session/minecraft/join";

/// Seconds before a cached access token is treated as stale. Tokens
/// expire after 86 400; leave a little space.
pub const TOKEN_HORIZON: u64 = 86_000;

/// Everything a session needs to act as the operator.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
    pub uuid: String,
    pub username: String,
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedProfile {
    username: String,
    uuid: String,
    access_token: String,
    generated_at: u64,
}

/// Information required by /join.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinRequest {
    access_token: String,
    /// Profile uuid without dashes.
    selected_profile: String,
    /// The non-standard hex digest over the encryption exchange.
    server_id: String,
}

/// Load operator credentials. `ACCESS_TOKEN`/`UUID`/`USERNAME` in the
/// environment win and refresh the cache; otherwise a cached profile
/// younger than [`TOKEN_HORIZON`] is used.
pub fn load_credentials(cache_dir: &Path) -> SekishoResult<Credentials> {
    let api_key = env::var("HYPIXEL_API_KEY").unwrap_or_default();
    if api_key.is_empty() {
        warn!("HYPIXEL_API_KEY is not set; stat lookups will fail");
    }

    let cache_path = cache_dir.join("auth.json");

    if let (Ok(access_token), Ok(uuid), Ok(username)) = (
        env::var("ACCESS_TOKEN"),
        env::var("UUID"),
        env::var("USERNAME"),
    ) {
        store_profile(
            &cache_path,
            &CachedProfile {
                username: username.clone(),
                uuid: uuid.clone(),
                access_token: access_token.clone(),
                generated_at: epoch_secs(),
            },
        );
        return Ok(Credentials {
            access_token,
            uuid,
            username,
            api_key,
        });
    }

    match load_profile(&cache_path) {
        Some(profile) if epoch_secs().saturating_sub(profile.generated_at) < TOKEN_HORIZON => {
            info!("Using cached credentials for {}", profile.username);
            Ok(Credentials {
                access_token: profile.access_token,
                uuid: profile.uuid,
                username: profile.username,
                api_key,
            })
        }
        Some(_) => Err(Error::from(AuthFailure {
            message: "cached access token expired; set ACCESS_TOKEN, UUID and USERNAME".to_owned(),
        })),
        None => Err(Error::from(AuthFailure {
            message: "no cached credentials; set ACCESS_TOKEN, UUID and USERNAME".to_owned(),
        })),
    }
}

fn load_profile(path: &Path) -> Option<CachedProfile> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

fn store_profile(path: &Path, profile: &CachedProfile) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    match serde_json::to_string(profile) {
        Ok(serialized) => {
            if let Err(e) = fs::write(path, serialized) {
                warn!("Couldn't cache credentials: {}", e);
            }
        }
        Err(e) => warn!("Couldn't serialize credentials: {}", e),
    }
}

/// Declare the join to the session server on the operator's behalf.
/// Only a 204 counts as success; anything else kills the login.
pub fn join_session(
    credentials: &Credentials,
    server_id: &str,
    shared_secret: &[u8],
    public_key: &[u8],
) -> SekishoResult<()> {
    let request = JoinRequest {
        access_token: credentials.access_token.clone(),
        selected_profile: credentials.uuid.replace('-', ""),
        server_id: crypto::server_digest(server_id, shared_secret, public_key),
    };

    let response = ureq::post(JOIN_SERVER)
        .set("content-type", "application/json")
        .send_string(&serde_json::to_string(&request)?);

    match response {
        Ok(r) if r.status() == 204 => Ok(()),
        Ok(r) => Err(Error::from(AuthFailure {
            message: format!("session server returned {}", r.status()),
        })),
        Err(ureq::Error::Status(code, _)) => Err(Error::from(AuthFailure {
            message: format!("session server returned {}", code),
        })),
        Err(e) => Err(Error::from(AuthFailure {
            message: e.to_string(),
        })),
    }
}

/// `CACHE_DIR`, or `$HOME/.cache/sekisho`.
pub fn default_cache_dir() -> PathBuf {
    if let Ok(dir) = env::var("CACHE_DIR") {
        return PathBuf::from(dir);
    }
    let home = env::var("HOME").unwrap_or_else(|_| ".".to_owned());
    Path::new(&home).join(".cache").join("sekisho")
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
