//! All possible errors.

use std::io;
use std::string;

use cfb8::cipher::errors::InvalidLength;
use openssl::error::ErrorStack;
use serde_json::Error as serde_error;

/// A frame or field that doesn't line up with the v47 protocol.
/// Always fatal to the session that read it.
#[derive(Debug)]
pub struct ProtocolViolation {
    pub expected: String,
}

impl std::error::Error for ProtocolViolation {}

impl std::fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Protocol violation. Expected: {}", self.expected)
    }
}

/// Failure to authenticate the operator with the session server.
#[derive(Debug)]
pub struct AuthFailure {
    pub message: String,
}

impl std::error::Error for AuthFailure {}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Authentication failed: {}", self.message)
    }
}

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    FromUtf8Error(string::FromUtf8Error),
    Serde(serde_error),
    SSLErrorStack(ErrorStack),
    InvalidKeyLen(InvalidLength),
    Protocol(ProtocolViolation),
    Auth(AuthFailure),
}

impl From<io::Error> for Error {
    fn from(item: io::Error) -> Self {
        Self::Io(item)
    }
}

impl From<string::FromUtf8Error> for Error {
    fn from(item: string::FromUtf8Error) -> Self {
        Self::FromUtf8Error(item)
    }
}

impl From<serde_error> for Error {
    fn from(item: serde_error) -> Self {
        Self::Serde(item)
    }
}

impl From<ErrorStack> for Error {
    fn from(item: ErrorStack) -> Self {
        Self::SSLErrorStack(item)
    }
}

impl From<InvalidLength> for Error {
    fn from(item: InvalidLength) -> Self {
        Self::InvalidKeyLen(item)
    }
}

impl From<ProtocolViolation> for Error {
    fn from(item: ProtocolViolation) -> Self {
        Self::Protocol(item)
    }
}

impl From<AuthFailure> for Error {
    fn from(item: AuthFailure) -> Self {
        Self::Auth(item)
    }
}

pub type SekishoResult<T> = Result<T, Error>;
