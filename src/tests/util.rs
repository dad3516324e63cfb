//! Shared fixtures: loopback sessions and a scripted stats backend.

use std::collections::HashMap;
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::auth::Credentials;
use crate::command;
use crate::proxy::Session;
use crate::serial::Writable;
use crate::stats::{PlayerStats, StatsError, StatsProvider};

/// A scripted stats backend that records every lookup it serves.
/// Names it doesn't know about resolve to [`StatsError::NotFound`].
#[derive(Default)]
pub struct StubStats {
    pub players: Mutex<HashMap<String, PlayerStats>>,
    pub calls: Mutex<Vec<String>>,
    pub delay: Option<Duration>,
}

impl StubStats {
    pub fn with_player(stats: PlayerStats) -> Arc<Self> {
        let stub = Self::default();
        stub.players
            .lock()
            .unwrap()
            .insert(stats.name.to_lowercase(), stats);
        Arc::new(stub)
    }
}

impl StatsProvider for StubStats {
    fn lookup(&self, name: &str) -> Result<PlayerStats, StatsError> {
        self.calls.lock().unwrap().push(name.to_lowercase());
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.players
            .lock()
            .unwrap()
            .get(&name.to_lowercase())
            .cloned()
            .ok_or(StatsError::NotFound)
    }
}

/// A session over a loopback socket pair. The returned stream is the
/// "game client" end.
pub fn test_session_with(provider: Arc<dyn StatsProvider>) -> (Arc<Session>, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = TcpStream::connect(addr).unwrap();
    let (sock, _) = listener.accept().unwrap();

    let creds = Arc::new(Credentials {
        access_token: "token".to_owned(),
        uuid: "069a79f4-44e9-4726-a5be-fca90e38aaf5".to_owned(),
        username: "tester".to_owned(),
        api_key: String::new(),
    });
    let session = Session::new(
        sock,
        creds,
        Arc::new(command::builtin::registry()),
        provider,
        ("127.0.0.1".to_owned(), 25565),
    )
    .unwrap();
    (session, peer)
}

pub fn test_session() -> (Arc<Session>, TcpStream) {
    test_session_with(Arc::new(StubStats::default()))
}

/// Wire a fake upstream into the session; the returned stream is the
/// "real server" end.
pub fn attach_fake_server(session: &Arc<Session>) -> TcpStream {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let sock = TcpStream::connect(addr).unwrap();
    let (peer, _) = listener.accept().unwrap();
    session.attach_server(sock).unwrap();
    peer
}

/// Serverbound chat payload (a bare string).
pub fn chat_payload(message: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    message.to_owned().write_to(&mut payload).unwrap();
    payload
}
