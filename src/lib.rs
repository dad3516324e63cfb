/*!
A man-in-the-middle proxy for Minecraft's v47 server protocol.

A game client connects to the proxy as if it were the real server; the
proxy logs into the real server with the operator's credentials and
then relays every frame, intercepting a handful of packet kinds to
answer in-proxy slash commands, mirror the current game and scoreboard
state, and dress the tab list up with player statistics fetched from
the Hypixel API.

# Examples
```no_run
use std::net::TcpListener;
use std::sync::Arc;

use sekisho::{auth, command, proxy, stats};
use sekisho::stats::StatsProvider;

let cache_dir = auth::default_cache_dir();
let creds = Arc::new(auth::load_credentials(&cache_dir).unwrap());
let provider: Arc<dyn StatsProvider> = Arc::new(stats::CachedStats::new(
    stats::HypixelClient::new(creds.api_key.clone()),
    cache_dir.join("players.json"),
));
let commands = Arc::new(command::builtin::registry());

let listener = TcpListener::bind("127.0.0.1:13876").unwrap();
for sock in listener.incoming().flatten() {
    let session = proxy::Session::new(
        sock,
        Arc::clone(&creds),
        Arc::clone(&commands),
        Arc::clone(&provider),
        ("mc.hypixel.net".to_owned(), 25565),
    )
    .unwrap();
    std::thread::spawn(move || session.run());
}
```
*/

pub mod auth;
pub mod command;
pub mod crypto;
pub mod errors;
pub mod format;
pub mod proxy;
pub mod serial;
pub mod stats;
pub mod stream;
pub mod world;

pub use errors::SekishoResult;

#[cfg(test)]
mod tests;
