//! Encryption primitives for the two proxy legs.

use crate::errors::SekishoResult;

pub use openssl::rand::rand_bytes;
use openssl::rsa::{Padding, Rsa};
pub use openssl::sha::Sha1;

use aes::Aes128;
use cfb8::cipher::{AsyncStreamCipher, NewCipher};
use cfb8::Cfb8;

/// Generate the 16 byte shared secret exchanged during login.
#[inline]
pub fn generate_shared_secret() -> SekishoResult<[u8; 16]> {
    let mut secret = [0; 16];
    rand_bytes(&mut secret)?;
    Ok(secret)
}

/// Encrypt some data under a DER encoded RSA public key with
/// PKCS#1 v1.5 padding. The v47 login exchange uses this exactly
/// twice: once for the shared secret, once for the verify token.
pub fn rsa_encrypt_der(der: &[u8], data: &[u8]) -> SekishoResult<Vec<u8>> {
    let key = Rsa::public_key_from_der(der)?;
    let mut encrypted = vec![0; key.size() as usize];
    let len = key.public_encrypt(data, &mut encrypted, Padding::PKCS1)?;
    encrypted.truncate(len);
    Ok(encrypted)
}

/// Minecraft's stream cipher. AES/CFB8 with the IV equal to the key.
///
/// One instance holds one direction's cipher state; it must see every
/// byte of that direction exactly once, in order.
pub struct StreamCipher {
    cipher: Cfb8<Aes128>,
}

impl StreamCipher {
    #[inline]
    pub fn new(key: &[u8; 16]) -> SekishoResult<Self> {
        Ok(Self {
            cipher: Cfb8::new_from_slices(key, key)?,
        })
    }

    /// Decrypt data in place using the internal cipher.
    #[inline]
    pub fn decrypt(&mut self, data: &mut [u8]) {
        self.cipher.decrypt(data)
    }

    /// Encrypt data in place using the internal cipher.
    #[inline]
    pub fn encrypt(&mut self, data: &mut [u8]) {
        self.cipher.encrypt(data)
    }
}

/// The digest POSTed to the session server on join.
///
/// SHA-1 over the server id, the shared secret and the server's DER
/// key, rendered the way the vanilla client renders it rather than as
/// an ordinary hex dump: the 20 hash bytes are one signed big-endian
/// integer, printed in lowercase hex with a minus sign standing in
/// for the sign bit.
pub fn server_digest(server_id: &str, shared_secret: &[u8], public_key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(server_id.as_bytes());
    hasher.update(shared_secret);
    hasher.update(public_key);
    signed_hex(hasher.finish())
}

fn signed_hex(mut hash: [u8; 20]) -> String {
    let negative = hash[0] & 0x80 != 0;

    if negative {
        // magnitude of a negative value: flip every byte, then ripple
        // a one up from the low end
        let mut carry = 1u16;
        for byte in hash.iter_mut().rev() {
            let sum = u16::from(!*byte) + carry;
            *byte = sum as u8;
            carry = sum >> 8;
        }
    }

    let mut digits = String::with_capacity(40);
    for byte in &hash {
        digits.push_str(&format!("{:02x}", byte));
    }

    // an integer carries no leading zeros
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        "0".to_owned()
    } else if negative {
        format!("-{}", digits)
    } else {
        digits.to_owned()
    }
}
