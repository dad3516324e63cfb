//! The dispatch table: (direction, phase, packet id) -> handler.

use std::sync::Arc;

use crate::errors::SekishoResult;
use crate::stream::Frame;

use super::{handlers, Direction, Phase, Session};

pub type HandlerFn = fn(&Arc<Session>, Frame) -> SekishoResult<()>;

/// How a handler is scheduled relative to its reader loop.
pub enum Handler {
    /// Runs inline; the next frame isn't read until it returns.
    Blocking(HandlerFn),
    /// Runs on its own thread; the reader continues immediately.
    Spawned(HandlerFn),
}

/// Look up the handler for a frame. Frames not named here are
/// forwarded verbatim to the other leg.
///
/// Serverbound Login traffic is absent on purpose: the upstream
/// login exchange is driven sequentially by [`super::login`].
pub fn lookup(direction: Direction, phase: Phase, id: i32) -> Option<Handler> {
    use Direction::*;
    use Handler::*;
    use Phase::*;

    match (direction, phase, id) {
        (ServerBound, Handshaking, 0x00) => Some(Blocking(handlers::handshake)),
        (ServerBound, Status, 0x00) => Some(Blocking(handlers::status_request)),
        (ServerBound, Status, 0x01) => Some(Blocking(handlers::ping_request)),
        (ServerBound, Login, 0x00) => Some(Blocking(handlers::login_start)),
        (ServerBound, Play, 0x01) => Some(Spawned(handlers::client_chat)),
        (ServerBound, Play, 0x17) => Some(Spawned(handlers::plugin_message)),
        (ClientBound, Play, 0x01) => Some(Blocking(handlers::join_game)),
        (ClientBound, Play, 0x02) => Some(Blocking(handlers::server_chat)),
        (ClientBound, Play, 0x38) => Some(Blocking(handlers::player_list_item)),
        (ClientBound, Play, 0x3E) => Some(Blocking(handlers::teams)),
        _ => None,
    }
}
