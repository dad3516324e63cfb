//! Upstream login orchestration.
//!
//! The server leg stays in here until the connection enters Play. The
//! encryption and compression switch-overs mutate the frame reader,
//! which only its owning loop may touch, so this phase runs as a
//! sequential exchange instead of going through the dispatch table.

use std::io::Read;
use std::sync::Arc;

use log::{info, warn};

use crate::auth;
use crate::crypto;
use crate::errors::*;
use crate::serial::{ByteArray, Chat, Readable, VarInt, Writable};
use crate::stream::FrameReader;

use super::{Phase, Session};

/// Drive the Login phase of the upstream leg. `Ok(true)` once the
/// session is in Play, `Ok(false)` if a side closed first.
pub fn perform<R: Read>(session: &Arc<Session>, rx: &mut FrameReader<R>) -> SekishoResult<bool> {
    loop {
        let frame = match rx.read_frame()? {
            Some(frame) => frame,
            None => return Ok(false),
        };
        if session.is_closed() {
            return Ok(false);
        }
        let mut buf = &frame.payload[..];

        match frame.id {
            // encryption request
            0x01 => {
                let server_id = String::read_from(&mut buf)?;
                let public_key = ByteArray::read_from(&mut buf)?.0;
                let verify_token = ByteArray::read_from(&mut buf)?.0;

                let secret = crypto::generate_shared_secret()?;
                auth::join_session(&session.creds, &server_id, &secret, &public_key)?;

                let mut payload = Vec::new();
                ByteArray(crypto::rsa_encrypt_der(&public_key, &secret)?).write_to(&mut payload)?;
                ByteArray(crypto::rsa_encrypt_der(&public_key, &verify_token)?)
                    .write_to(&mut payload)?;
                // the response itself still goes out in the clear
                session.send_server(0x01, &payload)?;

                session.set_server_cipher(&secret)?;
                rx.set_cipher(&secret)?;
                info!("Upstream encryption enabled");
            }
            // login success
            0x02 => {
                session.send_client(0x02, &frame.payload)?;
                session.set_phase(Phase::Play);
                return Ok(true);
            }
            // set compression, on both transports
            0x03 => {
                let threshold = VarInt::read_from(&mut buf)?.0;
                rx.set_compression(threshold);
                session.set_server_compression(threshold);
                // the notice itself is the last plain frame the client
                // sees; everything after it uses the compressed shape
                session.send_client(0x03, &frame.payload)?;
                session.set_client_compression(threshold);
                info!("Compression threshold set to {} on both legs", threshold);
            }
            // disconnect
            0x00 => {
                let reason = Chat::read_from(&mut buf)
                    .map(|c| c.plain())
                    .unwrap_or_default();
                warn!("Disconnected during login: {}", reason);
                session.send_client(0x00, &frame.payload)?;
                return Ok(false);
            }
            id => {
                return Err(Error::from(ProtocolViolation {
                    expected: format!("a login packet, not [{:x}]", id),
                }));
            }
        }
    }
}
