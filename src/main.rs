//! The proxy binary: load credentials, bind, and hand every accepted
//! client its own session.

use std::env;
use std::net::TcpListener;
use std::process;
use std::sync::Arc;
use std::thread;

use log::{error, info, warn};

use sekisho::auth;
use sekisho::command;
use sekisho::proxy::Session;
use sekisho::stats::{CachedStats, HypixelClient, StatsProvider};
use sekisho::SekishoResult;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        error!("{:?}", e);
        process::exit(1);
    }
}

fn run() -> SekishoResult<()> {
    let bind = env::var("PROXY_BIND").unwrap_or_else(|_| "127.0.0.1:13876".to_owned());
    let upstream = parse_upstream(
        &env::var("PROXY_UPSTREAM").unwrap_or_else(|_| "mc.hypixel.net:25565".to_owned()),
    );

    let cache_dir = auth::default_cache_dir();
    let creds = Arc::new(auth::load_credentials(&cache_dir)?);
    let provider: Arc<dyn StatsProvider> = Arc::new(CachedStats::new(
        HypixelClient::new(creds.api_key.clone()),
        cache_dir.join("players.json"),
    ));
    let commands = Arc::new(command::builtin::registry());

    let listener = TcpListener::bind(&bind)?;
    info!("Listening on {}, proxying {}:{}", bind, upstream.0, upstream.1);

    for stream in listener.incoming() {
        match stream {
            Ok(sock) => {
                let creds = Arc::clone(&creds);
                let commands = Arc::clone(&commands);
                let provider = Arc::clone(&provider);
                let upstream = upstream.clone();
                thread::spawn(move || {
                    match Session::new(sock, creds, commands, provider, upstream) {
                        Ok(session) => session.run(),
                        Err(e) => warn!("Couldn't start a session: {:?}", e),
                    }
                });
            }
            Err(e) => warn!("Couldn't accept a connection: {}", e),
        }
    }

    Ok(())
}

fn parse_upstream(raw: &str) -> (String, u16) {
    match raw.rsplit_once(':') {
        Some((host, port)) => (host.to_owned(), port.parse().unwrap_or(25565)),
        None => (raw.to_owned(), 25565),
    }
}
