//! Per-connection proxy sessions.
//!
//! A [`Session`] owns both legs of one proxied connection. The client
//! leg is pumped on the accepting thread; the server leg gets its own
//! thread once the client asks to log in. Handlers and enrichment
//! tasks share the session through an `Arc` and the world model
//! through its `Mutex`.

pub mod handlers;
pub mod login;
pub mod registry;

use std::io::BufReader;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{info, warn};

use crate::auth::Credentials;
use crate::command;
use crate::errors::*;
use crate::serial::{Chat, Writable};
use crate::stats::StatsProvider;
use crate::stream::{FrameReader, FrameWriter};
use crate::world::World;

/// Connection phase. Only ever moves forward.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Phase {
    Handshaking,
    Status,
    Login,
    Play,
    Closed,
}

/// Sender of a frame.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Direction {
    /// Server sent frame.
    ClientBound,
    /// Client sent frame.
    ServerBound,
}

/// One proxied connection: the accepted client plus, after the
/// handshake asks for Login, the outbound leg to the real server.
pub struct Session {
    pub creds: Arc<Credentials>,
    pub commands: Arc<command::Registry>,
    pub stats: Arc<dyn StatsProvider>,
    pub upstream: (String, u16),
    pub world: Mutex<World>,
    phase: Mutex<Phase>,
    client_tx: Mutex<FrameWriter<TcpStream>>,
    server_tx: Mutex<Option<FrameWriter<TcpStream>>>,
    client_sock: TcpStream,
    server_sock: Mutex<Option<TcpStream>>,
    /// Threshold handle of the client-leg reader, registered by
    /// [`Session::run`] so the login orchestrator on the server leg
    /// can flip it.
    client_rx_threshold: Mutex<Option<Arc<AtomicI32>>>,
    closed: AtomicBool,
}

impl Session {
    pub fn new(
        client: TcpStream,
        creds: Arc<Credentials>,
        commands: Arc<command::Registry>,
        stats: Arc<dyn StatsProvider>,
        upstream: (String, u16),
    ) -> SekishoResult<Arc<Self>> {
        let client_tx = FrameWriter::new(client.try_clone()?);
        Ok(Arc::new(Self {
            creds,
            commands,
            stats,
            upstream,
            world: Mutex::new(World::new()),
            phase: Mutex::new(Phase::Handshaking),
            client_tx: Mutex::new(client_tx),
            server_tx: Mutex::new(None),
            client_sock: client,
            server_sock: Mutex::new(None),
            client_rx_threshold: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }

    /// Serve the client leg on the calling thread. Returns once the
    /// session is torn down.
    pub fn run(self: &Arc<Self>) {
        let reader = match self.client_sock.try_clone() {
            Ok(sock) => FrameReader::new(BufReader::new(sock)),
            Err(e) => {
                warn!("Couldn't split the client stream: {}", e);
                return;
            }
        };
        *self.client_rx_threshold.lock().unwrap() = Some(reader.threshold_handle());
        if let Err(e) = self.pump_client(reader) {
            warn!("Client leg ended with an error: {:?}", e);
        }
        self.close();
    }

    /// Dispatch loop for frames from the client.
    fn pump_client<R: std::io::Read>(
        self: &Arc<Self>,
        mut rx: FrameReader<R>,
    ) -> SekishoResult<()> {
        loop {
            let frame = match rx.read_frame()? {
                Some(frame) => frame,
                None => return Ok(()),
            };
            let phase = self.phase();
            if phase == Phase::Closed {
                return Ok(());
            }
            match registry::lookup(Direction::ServerBound, phase, frame.id) {
                Some(registry::Handler::Blocking(run)) => run(self, frame)?,
                Some(registry::Handler::Spawned(run)) => self.spawn_handler(run, frame),
                None => self.send_server(frame.id, &frame.payload)?,
            }
        }
    }

    /// Dispatch loop for frames from the server; runs on its own
    /// thread. Login is orchestrated sequentially before the Play
    /// dispatch starts, since it re-keys this very reader.
    pub(crate) fn spawn_server_loop(self: &Arc<Self>, sock: TcpStream) {
        let session = Arc::clone(self);
        thread::spawn(move || {
            let mut rx = FrameReader::new(BufReader::new(sock));
            let result = login::perform(&session, &mut rx).and_then(|logged_in| {
                if logged_in {
                    session.pump_server(rx)
                } else {
                    Ok(())
                }
            });
            if let Err(e) = result {
                warn!("Server leg ended with an error: {:?}", e);
            }
            session.close();
        });
    }

    fn pump_server<R: std::io::Read>(
        self: &Arc<Self>,
        mut rx: FrameReader<R>,
    ) -> SekishoResult<()> {
        loop {
            let frame = match rx.read_frame()? {
                Some(frame) => frame,
                None => return Ok(()),
            };
            let phase = self.phase();
            if phase == Phase::Closed {
                return Ok(());
            }
            match registry::lookup(Direction::ClientBound, phase, frame.id) {
                Some(registry::Handler::Blocking(run)) => run(self, frame)?,
                Some(registry::Handler::Spawned(run)) => self.spawn_handler(run, frame),
                None => self.send_client(frame.id, &frame.payload)?,
            }
        }
    }

    fn spawn_handler(self: &Arc<Self>, run: registry::HandlerFn, frame: crate::stream::Frame) {
        let session = Arc::clone(self);
        thread::spawn(move || {
            let id = frame.id;
            if let Err(e) = run(&session, frame) {
                warn!("Handler for [{:x}] failed: {:?}", id, e);
            }
        });
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap()
    }

    /// Advance the connection phase. Regressions are ignored.
    pub fn set_phase(&self, phase: Phase) {
        let mut current = self.phase.lock().unwrap();
        if phase > *current {
            info!("Switching connection state from {:?} -> {:?}", *current, phase);
            *current = phase;
        }
    }

    /// Wire up the outbound leg. The reader half is handed to
    /// [`Session::spawn_server_loop`] separately.
    pub fn attach_server(&self, sock: TcpStream) -> SekishoResult<()> {
        *self.server_tx.lock().unwrap() = Some(FrameWriter::new(sock.try_clone()?));
        *self.server_sock.lock().unwrap() = Some(sock);
        Ok(())
    }

    pub fn send_client(&self, id: i32, payload: &[u8]) -> SekishoResult<()> {
        self.client_tx.lock().unwrap().write_frame(id, payload)
    }

    pub fn send_server(&self, id: i32, payload: &[u8]) -> SekishoResult<()> {
        match self.server_tx.lock().unwrap().as_mut() {
            Some(tx) => tx.write_frame(id, payload),
            None => Err(Error::from(ProtocolViolation {
                expected: "an upstream connection".to_owned(),
            })),
        }
    }

    /// Chat shown to the client (clientbound 0x02, chat-box position).
    pub fn send_client_chat(&self, message: &str) -> SekishoResult<()> {
        let mut payload = Vec::new();
        Chat::from(message).write_to(&mut payload)?;
        0u8.write_to(&mut payload)?;
        self.send_client(0x02, &payload)
    }

    /// Chat spoken upstream as the operator (serverbound 0x01).
    pub fn send_server_chat(&self, message: &str) -> SekishoResult<()> {
        let mut payload = Vec::new();
        message.to_owned().write_to(&mut payload)?;
        self.send_server(0x01, &payload)
    }

    pub fn set_server_cipher(&self, key: &[u8; 16]) -> SekishoResult<()> {
        match self.server_tx.lock().unwrap().as_mut() {
            Some(tx) => tx.set_cipher(key),
            None => Err(Error::from(ProtocolViolation {
                expected: "an upstream connection".to_owned(),
            })),
        }
    }

    pub fn set_server_compression(&self, threshold: i32) {
        if let Some(tx) = self.server_tx.lock().unwrap().as_mut() {
            tx.set_compression(threshold);
        }
    }

    /// Apply the negotiated threshold to the client leg, writer and
    /// reader both.
    pub fn set_client_compression(&self, threshold: i32) {
        self.client_tx.lock().unwrap().set_compression(threshold);
        if let Some(handle) = self.client_rx_threshold.lock().unwrap().as_ref() {
            handle.store(threshold, Ordering::SeqCst);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tear the session down. Both sockets are shut down so the other
    /// pump loop observes EOF on its next read; spawned tasks see the
    /// closed flag and discard their results.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.phase.lock().unwrap() = Phase::Closed;
        let _ = self.client_sock.shutdown(Shutdown::Both);
        if let Some(sock) = self.server_sock.lock().unwrap().as_ref() {
            let _ = sock.shutdown(Shutdown::Both);
        }
        info!("Session closed");
    }
}
