//! TLS 1.0 handshake protocol: message codecs, key exchange strategies, and
//! the client state machine.

pub mod client;
pub mod codec;
pub mod codec_kx;
pub mod key_exchange;
pub mod signing;

use tls10_types::TlsError;

/// Handshake message types (RFC 2246 §7.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    HelloRequest = 0,
    ClientHello = 1,
    ServerHello = 2,
    Certificate = 11,
    ServerKeyExchange = 12,
    CertificateRequest = 13,
    ServerHelloDone = 14,
    CertificateVerify = 15,
    ClientKeyExchange = 16,
    Finished = 20,
}

impl HandshakeType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(HandshakeType::HelloRequest),
            1 => Some(HandshakeType::ClientHello),
            2 => Some(HandshakeType::ServerHello),
            11 => Some(HandshakeType::Certificate),
            12 => Some(HandshakeType::ServerKeyExchange),
            13 => Some(HandshakeType::CertificateRequest),
            14 => Some(HandshakeType::ServerHelloDone),
            15 => Some(HandshakeType::CertificateVerify),
            16 => Some(HandshakeType::ClientKeyExchange),
            20 => Some(HandshakeType::Finished),
            _ => None,
        }
    }
}

pub const HANDSHAKE_HEADER_LEN: usize = 4;

/// Upper bound on a single handshake message (24-bit length field).
pub const MAX_HANDSHAKE_MESSAGE_LEN: usize = 0x00FF_FFFF;

/// A complete handshake message pulled out of the record stream.
#[derive(Debug, Clone)]
pub struct HandshakeMessage {
    pub msg_type: HandshakeType,
    pub body: Vec<u8>,
    /// Header and body as they appeared on the wire, for the transcript.
    pub raw: Vec<u8>,
}

/// Reassembles handshake messages from record fragments.
///
/// Record boundaries and message boundaries are independent: one record may
/// carry several messages, and one message may span several records. Bytes
/// are buffered until a whole message (4-byte header plus body) is present.
#[derive(Default)]
pub struct MessageReassembler {
    buffer: Vec<u8>,
}

impl MessageReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the payload of one handshake record.
    pub fn push(&mut self, fragment: &[u8]) {
        self.buffer.extend_from_slice(fragment);
    }

    /// True when partial message bytes are still buffered.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Pop the next complete message, or None if more records are needed.
    pub fn next_message(&mut self) -> Result<Option<HandshakeMessage>, TlsError> {
        if self.buffer.len() < HANDSHAKE_HEADER_LEN {
            return Ok(None);
        }
        let msg_type = HandshakeType::from_u8(self.buffer[0]).ok_or_else(|| {
            TlsError::unexpected_message(format!("unknown handshake type {}", self.buffer[0]))
        })?;
        let length = ((self.buffer[1] as usize) << 16)
            | ((self.buffer[2] as usize) << 8)
            | (self.buffer[3] as usize);
        if length > MAX_HANDSHAKE_MESSAGE_LEN {
            return Err(TlsError::decode_error("handshake message too long"));
        }
        let total = HANDSHAKE_HEADER_LEN + length;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let raw: Vec<u8> = self.buffer.drain(..total).collect();
        let body = raw[HANDSHAKE_HEADER_LEN..].to_vec();
        Ok(Some(HandshakeMessage {
            msg_type,
            body,
            raw,
        }))
    }
}
