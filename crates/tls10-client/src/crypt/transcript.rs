//! Dual MD5+SHA-1 handshake transcript hash.
//!
//! TLS 1.0 binds Finished and CertificateVerify to the concatenation
//! MD5(handshake_messages) || SHA1(handshake_messages), 36 bytes total.
//!
//! Uses a message buffer + replay approach: `current_hash()` hashes the
//! buffered messages with fresh digests, so the accumulator is never
//! consumed and `update()` keeps working afterwards.

use md5::{Digest as _, Md5};
use sha1::Sha1;

/// Combined MD5 || SHA-1 transcript hash length.
pub const TRANSCRIPT_HASH_LEN: usize = 36;

/// Running transcript over handshake messages.
///
/// hello_request messages are never fed in; each Finished message is fed in
/// only after its own verify data has been captured from the prior state.
/// Both rules are the caller's responsibility.
#[derive(Default)]
pub struct TranscriptHash {
    message_buffer: Vec<u8>,
}

impl TranscriptHash {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw handshake message bytes (header included) into the transcript.
    pub fn update(&mut self, data: &[u8]) {
        self.message_buffer.extend_from_slice(data);
    }

    /// The current 36-byte MD5 || SHA-1 hash, without consuming the state.
    pub fn current_hash(&self) -> [u8; TRANSCRIPT_HASH_LEN] {
        let mut out = [0u8; TRANSCRIPT_HASH_LEN];
        out[..16].copy_from_slice(&Md5::digest(&self.message_buffer));
        out[16..].copy_from_slice(&Sha1::digest(&self.message_buffer));
        out
    }

    /// The SHA-1 half alone, used by DSA/ECDSA signature strategies.
    pub fn current_sha1(&self) -> [u8; 20] {
        Sha1::digest(&self.message_buffer).into()
    }
}
