//! TLS 1.0 record layer: framing, fragmentation, and record protection.
//!
//! ```text
//! struct {
//!     ContentType type;        /* 1 byte  */
//!     ProtocolVersion version; /* 0x0301  */
//!     uint16 length;
//!     opaque fragment[length];
//! } TLSRecord;
//! ```
//!
//! Protection is per-direction and swapped atomically on change_cipher_spec:
//! records written before activation go out in the clear, every record after
//! activation (handshake, alert, and application data alike) is protected.

pub mod block;
pub mod stream;

use std::io::{Read, Write};

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use md5::Md5;
use rand_core::CryptoRngCore;
use sha1::Sha1;

use crate::crypt::key_schedule::KeyBlock;
use crate::crypt::{BulkCipher, CipherSuiteParams, MacDigest};
use crate::PROTOCOL_VERSION;
use block::{CbcDecryptor, CbcEncryptor};
use stream::{Rc4Decryptor, Rc4Encryptor};
use tls10_types::{AlertDescription, TlsError};

/// Maximum plaintext fragment length (2^14).
pub const MAX_PLAINTEXT_LENGTH: usize = 16384;

/// Maximum protected fragment length (2^14 + 2048, RFC 2246 §6.2.3).
pub const MAX_CIPHERTEXT_LENGTH: usize = MAX_PLAINTEXT_LENGTH + 2048;

pub const RECORD_HEADER_LEN: usize = 5;

/// TLS record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            20 => Some(ContentType::ChangeCipherSpec),
            21 => Some(ContentType::Alert),
            22 => Some(ContentType::Handshake),
            23 => Some(ContentType::ApplicationData),
            _ => None,
        }
    }
}

/// A parsed TLS record.
#[derive(Debug, Clone)]
pub struct Record {
    pub content_type: ContentType,
    pub version: u16,
    pub fragment: Vec<u8>,
}

/// Compute the record MAC (RFC 2246 §6.2.3.1).
///
/// ```text
/// HMAC_hash(MAC_write_secret, seq_num(8) + type(1) + version(2) +
///           length(2) + fragment)
/// ```
pub(crate) fn compute_record_mac(
    digest: MacDigest,
    mac_key: &[u8],
    seq: u64,
    content_type: ContentType,
    fragment: &[u8],
) -> Result<Vec<u8>, TlsError> {
    fn run<M: Mac + KeyInit>(
        key: &[u8],
        seq: u64,
        content_type: ContentType,
        fragment: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        let mut mac = <M as Mac>::new_from_slice(key)
            .map_err(|_| TlsError::internal_error("HMAC key rejected"))?;
        mac.update(&seq.to_be_bytes());
        mac.update(&[content_type as u8]);
        mac.update(&PROTOCOL_VERSION.to_be_bytes());
        mac.update(&(fragment.len() as u16).to_be_bytes());
        mac.update(fragment);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    match digest {
        MacDigest::Md5 => run::<Hmac<Md5>>(mac_key, seq, content_type, fragment),
        MacDigest::Sha1 => run::<Hmac<Sha1>>(mac_key, seq, content_type, fragment),
    }
}

/// Outgoing record protection, one variant per bulk cipher family.
pub enum RecordEncryptor {
    Block(CbcEncryptor),
    Stream(Rc4Encryptor),
}

impl RecordEncryptor {
    /// Build the client-write protector from the negotiated key block.
    pub fn for_client_write(
        params: &CipherSuiteParams,
        keys: &KeyBlock,
    ) -> Result<Self, TlsError> {
        match params.bulk {
            BulkCipher::Aes128Cbc | BulkCipher::Aes256Cbc => Ok(RecordEncryptor::Block(
                CbcEncryptor::new(params, &keys.client_key, &keys.client_mac_key, &keys.client_iv)?,
            )),
            BulkCipher::Rc4_128 => Ok(RecordEncryptor::Stream(Rc4Encryptor::new(
                params,
                &keys.client_key,
                &keys.client_mac_key,
            )?)),
        }
    }

    pub fn encrypt(
        &mut self,
        rng: &mut dyn CryptoRngCore,
        content_type: ContentType,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        match self {
            RecordEncryptor::Block(enc) => enc.encrypt(rng, content_type, plaintext),
            RecordEncryptor::Stream(enc) => enc.encrypt(content_type, plaintext),
        }
    }

    pub fn sequence_number(&self) -> u64 {
        match self {
            RecordEncryptor::Block(enc) => enc.sequence_number(),
            RecordEncryptor::Stream(enc) => enc.sequence_number(),
        }
    }
}

/// Incoming record protection.
pub enum RecordDecryptor {
    Block(CbcDecryptor),
    Stream(Rc4Decryptor),
}

impl RecordDecryptor {
    /// Build the server-write protector from the negotiated key block.
    pub fn for_server_write(
        params: &CipherSuiteParams,
        keys: &KeyBlock,
    ) -> Result<Self, TlsError> {
        match params.bulk {
            BulkCipher::Aes128Cbc | BulkCipher::Aes256Cbc => Ok(RecordDecryptor::Block(
                CbcDecryptor::new(params, &keys.server_key, &keys.server_mac_key, &keys.server_iv)?,
            )),
            BulkCipher::Rc4_128 => Ok(RecordDecryptor::Stream(Rc4Decryptor::new(
                params,
                &keys.server_key,
                &keys.server_mac_key,
            )?)),
        }
    }

    pub fn decrypt(
        &mut self,
        content_type: ContentType,
        fragment: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        match self {
            RecordDecryptor::Block(dec) => dec.decrypt(content_type, fragment),
            RecordDecryptor::Stream(dec) => dec.decrypt(content_type, fragment),
        }
    }

    pub fn sequence_number(&self) -> u64 {
        match self {
            RecordDecryptor::Block(dec) => dec.sequence_number(),
            RecordDecryptor::Stream(dec) => dec.sequence_number(),
        }
    }
}

/// Record layer state for one connection.
///
/// Write protection and read protection activate independently: the client
/// activates writing when it sends change_cipher_spec and reading when it
/// receives one.
pub struct RecordLayer {
    pub max_fragment_size: usize,
    encryptor: Option<RecordEncryptor>,
    decryptor: Option<RecordDecryptor>,
}

impl RecordLayer {
    pub fn new() -> Self {
        Self {
            max_fragment_size: MAX_PLAINTEXT_LENGTH,
            encryptor: None,
            decryptor: None,
        }
    }

    pub fn is_encrypting(&self) -> bool {
        self.encryptor.is_some()
    }

    pub fn is_decrypting(&self) -> bool {
        self.decryptor.is_some()
    }

    /// Switch outgoing records to the protected state. Sequence numbers
    /// restart at zero.
    pub fn activate_write_protection(
        &mut self,
        params: &CipherSuiteParams,
        keys: &KeyBlock,
    ) -> Result<(), TlsError> {
        self.encryptor = Some(RecordEncryptor::for_client_write(params, keys)?);
        Ok(())
    }

    /// Switch incoming records to the protected state.
    pub fn activate_read_protection(
        &mut self,
        params: &CipherSuiteParams,
        keys: &KeyBlock,
    ) -> Result<(), TlsError> {
        self.decryptor = Some(RecordDecryptor::for_server_write(params, keys)?);
        Ok(())
    }

    /// Protect (if active) and serialize a single fragment.
    pub fn seal_record(
        &mut self,
        rng: &mut dyn CryptoRngCore,
        content_type: ContentType,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        if plaintext.len() > self.max_fragment_size {
            return Err(TlsError::internal_error(
                "plaintext exceeds max fragment size",
            ));
        }
        let fragment = match &mut self.encryptor {
            Some(enc) => enc.encrypt(rng, content_type, plaintext)?,
            None => plaintext.to_vec(),
        };
        Ok(serialize_record(&Record {
            content_type,
            version: PROTOCOL_VERSION,
            fragment,
        }))
    }

    /// Fragment `data` at the record boundary, seal each fragment, and write
    /// the resulting records to the transport.
    ///
    /// An empty `data` produces exactly one empty-plaintext record.
    pub fn write_data<S: Write>(
        &mut self,
        io: &mut S,
        rng: &mut dyn CryptoRngCore,
        content_type: ContentType,
        data: &[u8],
    ) -> Result<(), TlsError> {
        let mut out = Vec::new();
        if data.is_empty() {
            out.extend_from_slice(&self.seal_record(rng, content_type, &[])?);
        } else {
            for chunk in data.chunks(self.max_fragment_size) {
                out.extend_from_slice(&self.seal_record(rng, content_type, chunk)?);
            }
        }
        io.write_all(&out)?;
        io.flush()?;
        Ok(())
    }

    /// Read one record from the transport, verify its header, and remove
    /// protection if active.
    pub fn read_record<S: Read>(
        &mut self,
        io: &mut S,
    ) -> Result<(ContentType, Vec<u8>), TlsError> {
        let mut header = [0u8; RECORD_HEADER_LEN];
        io.read_exact(&mut header)?;

        let content_type = ContentType::from_u8(header[0]).ok_or_else(|| {
            TlsError::unexpected_message(format!("unknown record content type {}", header[0]))
        })?;
        let version = u16::from_be_bytes([header[1], header[2]]);
        if version != PROTOCOL_VERSION {
            return Err(TlsError::fatal(
                AlertDescription::ProtocolVersion,
                format!("record version 0x{version:04x}, expected 0x0301"),
            ));
        }

        let length = u16::from_be_bytes([header[3], header[4]]) as usize;
        let limit = if self.is_decrypting() {
            MAX_CIPHERTEXT_LENGTH
        } else {
            MAX_PLAINTEXT_LENGTH
        };
        if length > limit {
            return Err(TlsError::fatal(
                AlertDescription::RecordOverflow,
                format!("record length {length} exceeds limit {limit}"),
            ));
        }

        let mut fragment = vec![0u8; length];
        io.read_exact(&mut fragment)?;

        let plaintext = match &mut self.decryptor {
            Some(dec) => dec.decrypt(content_type, &fragment)?,
            None => fragment,
        };
        if plaintext.len() > MAX_PLAINTEXT_LENGTH {
            return Err(TlsError::fatal(
                AlertDescription::RecordOverflow,
                "decrypted fragment exceeds 2^14",
            ));
        }
        Ok((content_type, plaintext))
    }
}

impl Default for RecordLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize a record to wire bytes.
pub fn serialize_record(record: &Record) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RECORD_HEADER_LEN + record.fragment.len());
    buf.push(record.content_type as u8);
    buf.extend_from_slice(&record.version.to_be_bytes());
    buf.extend_from_slice(&(record.fragment.len() as u16).to_be_bytes());
    buf.extend_from_slice(&record.fragment);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CipherSuite;
    use rand::rngs::OsRng;

    fn aes_params() -> CipherSuiteParams {
        CipherSuiteParams::from_suite(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA).unwrap()
    }

    fn test_keys(params: &CipherSuiteParams) -> KeyBlock {
        KeyBlock {
            client_mac_key: vec![0x0A; params.mac_len()],
            server_mac_key: vec![0x0B; params.mac_len()],
            client_key: vec![0x0C; params.key_len()],
            server_key: vec![0x0D; params.key_len()],
            client_iv: vec![0x0E; params.iv_len()],
            server_iv: vec![0x0F; params.iv_len()],
        }
    }

    #[test]
    fn test_plaintext_roundtrip_through_transport() {
        let mut writer = RecordLayer::new();
        let mut reader = RecordLayer::new();

        let mut wire = Vec::new();
        writer
            .write_data(&mut wire, &mut OsRng, ContentType::Handshake, b"hello")
            .unwrap();

        assert_eq!(wire[0], 22);
        assert_eq!(&wire[1..3], &[0x03, 0x01]);
        assert_eq!(u16::from_be_bytes([wire[3], wire[4]]), 5);

        let mut cursor = std::io::Cursor::new(wire);
        let (ct, body) = reader.read_record(&mut cursor).unwrap();
        assert_eq!(ct, ContentType::Handshake);
        assert_eq!(body, b"hello");
    }

    #[test]
    fn test_fragmentation_at_record_boundary() {
        let mut writer = RecordLayer::new();
        let mut reader = RecordLayer::new();

        let data = vec![0x55u8; MAX_PLAINTEXT_LENGTH + 100];
        let mut wire = Vec::new();
        writer
            .write_data(&mut wire, &mut OsRng, ContentType::ApplicationData, &data)
            .unwrap();

        let mut cursor = std::io::Cursor::new(wire);
        let (_, first) = reader.read_record(&mut cursor).unwrap();
        let (_, second) = reader.read_record(&mut cursor).unwrap();
        assert_eq!(first.len(), MAX_PLAINTEXT_LENGTH);
        assert_eq!(second.len(), 100);
        let mut joined = first;
        joined.extend_from_slice(&second);
        assert_eq!(joined, data);
    }

    #[test]
    fn test_rejects_wrong_record_version() {
        let mut reader = RecordLayer::new();
        // SSLv3 version in the header
        let wire = [22u8, 0x03, 0x00, 0x00, 0x01, 0x00];
        let mut cursor = std::io::Cursor::new(&wire[..]);
        let err = reader.read_record(&mut cursor).unwrap_err();
        assert_eq!(err.alert_to_send(), Some(AlertDescription::ProtocolVersion));
    }

    #[test]
    fn test_rejects_unknown_content_type() {
        let mut reader = RecordLayer::new();
        let wire = [99u8, 0x03, 0x01, 0x00, 0x00];
        let mut cursor = std::io::Cursor::new(&wire[..]);
        assert!(reader.read_record(&mut cursor).is_err());
    }

    #[test]
    fn test_rejects_oversized_record() {
        let mut reader = RecordLayer::new();
        // length 0x4801 > 2^14 in plaintext mode
        let wire = [23u8, 0x03, 0x01, 0x48, 0x01];
        let mut cursor = std::io::Cursor::new(&wire[..]);
        let err = reader.read_record(&mut cursor).unwrap_err();
        assert_eq!(err.alert_to_send(), Some(AlertDescription::RecordOverflow));
    }

    #[test]
    fn test_protected_roundtrip_after_activation() {
        let params = aes_params();
        let keys = test_keys(&params);

        let mut writer = RecordLayer::new();
        writer.activate_write_protection(&params, &keys).unwrap();
        assert!(writer.is_encrypting());

        // The reader decrypts with the client-write keys, standing in for the
        // server side of the same direction.
        let mut reader = RecordLayer::new();
        let read_keys = KeyBlock {
            client_mac_key: keys.server_mac_key.clone(),
            server_mac_key: keys.client_mac_key.clone(),
            client_key: keys.server_key.clone(),
            server_key: keys.client_key.clone(),
            client_iv: keys.server_iv.clone(),
            server_iv: keys.client_iv.clone(),
        };
        reader.activate_read_protection(&params, &read_keys).unwrap();

        let mut wire = Vec::new();
        writer
            .write_data(&mut wire, &mut OsRng, ContentType::ApplicationData, b"top secret")
            .unwrap();
        // Ciphertext on the wire, not the plaintext.
        assert!(!wire.windows(10).any(|w| w == b"top secret"));

        let mut cursor = std::io::Cursor::new(wire);
        let (ct, body) = reader.read_record(&mut cursor).unwrap();
        assert_eq!(ct, ContentType::ApplicationData);
        assert_eq!(body, b"top secret");
    }

    #[test]
    fn test_empty_plaintext_still_produces_a_record() {
        let params = aes_params();
        let keys = test_keys(&params);
        let mut writer = RecordLayer::new();
        writer.activate_write_protection(&params, &keys).unwrap();

        let mut wire = Vec::new();
        writer
            .write_data(&mut wire, &mut OsRng, ContentType::ApplicationData, &[])
            .unwrap();
        // MAC and padding survive even with no payload.
        let length = u16::from_be_bytes([wire[3], wire[4]]) as usize;
        assert!(length >= 32);
        assert_eq!(wire.len(), RECORD_HEADER_LEN + length);
    }
}
