//! Length-prefixed frame transport with optional zlib compression
//! and optional AES/CFB8 encryption.
//!
//! A connection is split into a [`FrameReader`] and a [`FrameWriter`],
//! one per direction. Each half carries its own cipher state; once a
//! key is set every byte of that direction passes through the same
//! cipher, so the halves must never be re-initialized.

use crate::crypto::StreamCipher;
use crate::errors::*;
use crate::serial::{Readable, VarInt, Writable};

use std::io::{self, prelude::*};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use flate2::read::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;

/// A single wire packet: id plus undecoded payload.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Frame {
    pub id: i32,
    pub payload: Vec<u8>,
}

/// Reading half of a connection.
pub struct FrameReader<R: Read> {
    inner: R,
    cipher: Option<StreamCipher>,
    /// Compression threshold. `-1` disables the compressed frame shape
    /// entirely. Shared, so the threshold negotiated on the other leg
    /// can reach a reader that is already blocked waiting for its next
    /// frame; the value is read once per frame, after the length.
    threshold: Arc<AtomicI32>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cipher: None,
            threshold: Arc::new(AtomicI32::new(-1)),
        }
    }

    /// Switch the stream into encrypted mode. Irreversible.
    pub fn set_cipher(&mut self, key: &[u8; 16]) -> SekishoResult<()> {
        self.cipher = Some(StreamCipher::new(key)?);
        Ok(())
    }

    pub fn set_compression(&mut self, threshold: i32) {
        self.threshold.store(threshold, Ordering::SeqCst);
    }

    /// Handle for setting this reader's threshold from outside the
    /// loop that owns it.
    pub fn threshold_handle(&self) -> Arc<AtomicI32> {
        Arc::clone(&self.threshold)
    }

    /// Read one frame. `None` means the peer closed the stream at a
    /// frame boundary; EOF in the middle of a frame is an error.
    pub fn read_frame(&mut self) -> SekishoResult<Option<Frame>> {
        let len = match self.read_length()? {
            Some(l) => l,
            None => return Ok(None),
        };
        if len == 0 {
            return Ok(None);
        }

        let mut body = vec![0; len];
        self.read_decrypted(&mut body)?;

        let data: Vec<u8> = if self.threshold.load(Ordering::SeqCst) >= 0 {
            let mut slice = &body[..];
            let uncompressed = VarInt::read_from(&mut slice)?.0;
            if uncompressed > 0 {
                let mut inflated = Vec::with_capacity(uncompressed as usize);
                ZlibDecoder::new(slice).read_to_end(&mut inflated)?;
                if inflated.len() != uncompressed as usize {
                    return Err(Error::from(ProtocolViolation {
                        expected: format!("{} bytes after inflation", uncompressed),
                    }));
                }
                inflated
            } else {
                slice.to_vec()
            }
        } else {
            body
        };

        let mut slice = &data[..];
        let id = VarInt::read_from(&mut slice)?.0;
        Ok(Some(Frame {
            id,
            payload: slice.to_vec(),
        }))
    }

    /// Length prefix of the next frame, or `None` on a clean EOF.
    fn read_length(&mut self) -> SekishoResult<Option<usize>> {
        let mut res: u32 = 0;

        for byte_index in 0..5 {
            let byte: u8 = if byte_index == 0 {
                match self.read_first_byte()? {
                    Some(b) => b,
                    None => return Ok(None),
                }
            } else {
                let mut b = [0; 1];
                self.read_decrypted(&mut b)?;
                b[0]
            };
            let byte = byte as u32;

            res |= (byte & 0x7F) << (byte_index * 7);

            if (byte & 0x80) == 0 {
                return Ok(Some(res as usize));
            }
        }

        Err(Error::from(ProtocolViolation {
            expected: "frame length terminating within 5 bytes".to_owned(),
        }))
    }

    fn read_first_byte(&mut self) -> SekishoResult<Option<u8>> {
        let mut b = [0; 1];
        loop {
            match self.inner.read(&mut b) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if let Some(cipher) = &mut self.cipher {
            cipher.decrypt(&mut b);
        }
        Ok(Some(b[0]))
    }

    fn read_decrypted(&mut self, buf: &mut [u8]) -> SekishoResult<()> {
        self.inner.read_exact(buf)?;
        if let Some(cipher) = &mut self.cipher {
            cipher.decrypt(buf);
        }
        Ok(())
    }
}

/// Writing half of a connection.
pub struct FrameWriter<W: Write> {
    inner: W,
    cipher: Option<StreamCipher>,
    threshold: i32,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            cipher: None,
            threshold: -1,
        }
    }

    /// Switch the stream into encrypted mode. Irreversible.
    pub fn set_cipher(&mut self, key: &[u8; 16]) -> SekishoResult<()> {
        self.cipher = Some(StreamCipher::new(key)?);
        Ok(())
    }

    pub fn set_compression(&mut self, threshold: i32) {
        self.threshold = threshold;
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Frame and send one packet. Payloads at or above the threshold
    /// go out as a zlib stream; below it the data-length field is 0.
    pub fn write_frame(&mut self, id: i32, payload: &[u8]) -> SekishoResult<()> {
        let mut body = Vec::with_capacity(payload.len() + 5);
        VarInt(id).write_to(&mut body)?;
        body.extend_from_slice(payload);

        let mut framed = Vec::with_capacity(body.len() + 10);
        if self.threshold >= 0 {
            let mut data = Vec::with_capacity(body.len() + 5);
            if body.len() >= self.threshold as usize {
                VarInt(body.len() as i32).write_to(&mut data)?;
                ZlibEncoder::new(&body[..], Compression::default()).read_to_end(&mut data)?;
            } else {
                VarInt(0).write_to(&mut data)?;
                data.extend_from_slice(&body);
            }
            VarInt(data.len() as i32).write_to(&mut framed)?;
            framed.extend_from_slice(&data);
        } else {
            VarInt(body.len() as i32).write_to(&mut framed)?;
            framed.extend_from_slice(&body);
        }

        if let Some(cipher) = &mut self.cipher {
            cipher.encrypt(&mut framed);
        }
        self.inner.write_all(&framed)?;
        Ok(self.inner.flush()?)
    }
}
