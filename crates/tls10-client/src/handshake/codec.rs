//! TLS 1.0 handshake message encoding/decoding (RFC 2246 §7.4).
//!
//! ServerKeyExchange and ClientKeyExchange bodies vary by key exchange
//! family and live in [`super::codec_kx`].

use crate::{CipherSuite, CompressionMethod, PROTOCOL_VERSION};
use tls10_types::TlsError;

use super::HandshakeType;

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// A raw hello extension (RFC 3546 framing, accepted by TLS 1.0 servers that
/// understand extended hellos).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub extension_type: u16,
    pub data: Vec<u8>,
}

impl Extension {
    pub const SERVER_NAME: u16 = 0;
    pub const SRP: u16 = 12;
    /// RFC 5746. Never offered as an extension (the SCSV stands in for it)
    /// but servers may answer the SCSV with it.
    pub const RENEGOTIATION_INFO: u16 = 0xFF01;

    /// server_name extension carrying a single host_name entry.
    pub fn server_name(host: &str) -> Self {
        let name = host.as_bytes();
        let mut data = Vec::with_capacity(5 + name.len());
        data.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes());
        data.push(0); // name_type: host_name
        data.extend_from_slice(&(name.len() as u16).to_be_bytes());
        data.extend_from_slice(name);
        Self {
            extension_type: Self::SERVER_NAME,
            data,
        }
    }

    /// srp extension carrying the user name (RFC 5054 §2.8.1). Required when
    /// SRP suites are offered: the server needs the identity before it can
    /// build its key exchange parameters.
    pub fn srp_identity(username: &str) -> Self {
        let name = username.as_bytes();
        let mut data = Vec::with_capacity(1 + name.len());
        data.push(name.len() as u8);
        data.extend_from_slice(name);
        Self {
            extension_type: Self::SRP,
            data,
        }
    }
}

/// ClientHello message.
#[derive(Debug, Clone)]
pub struct ClientHello {
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suites: Vec<CipherSuite>,
    pub compression_methods: Vec<CompressionMethod>,
    pub extensions: Vec<Extension>,
}

/// ServerHello message.
#[derive(Debug, Clone)]
pub struct ServerHello {
    pub version: u16,
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suite: CipherSuite,
    pub compression_method: CompressionMethod,
    pub extensions: Vec<Extension>,
}

/// Certificate message: a DER chain, leaf first.
#[derive(Debug, Clone)]
pub struct CertificateMsg {
    pub certificate_list: Vec<Vec<u8>>,
}

/// CertificateRequest message (RFC 2246 §7.4.4 — no signature algorithm
/// list in this protocol version).
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    /// rsa_sign(1), dss_sign(2), ecdsa_sign(64).
    pub cert_types: Vec<u8>,
    /// DER-encoded distinguished names of acceptable CAs.
    pub ca_names: Vec<Vec<u8>>,
}

impl CertificateRequest {
    pub const CERT_TYPE_RSA_SIGN: u8 = 1;
    pub const CERT_TYPE_DSS_SIGN: u8 = 2;
    pub const CERT_TYPE_ECDSA_SIGN: u8 = 64;
}

// ---------------------------------------------------------------------------
// Handshake header
// ---------------------------------------------------------------------------

pub(crate) fn read_u24(data: &[u8]) -> u32 {
    ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | (data[2] as u32)
}

/// Wrap a handshake body with the 4-byte msg_type || length(3) header.
pub fn wrap_handshake(msg_type: HandshakeType, body: &[u8]) -> Vec<u8> {
    let len = body.len();
    let mut out = Vec::with_capacity(4 + len);
    out.push(msg_type as u8);
    out.push((len >> 16) as u8);
    out.push((len >> 8) as u8);
    out.push(len as u8);
    out.extend_from_slice(body);
    out
}

// ---------------------------------------------------------------------------
// ClientHello
// ---------------------------------------------------------------------------

/// Encode a ClientHello as a complete handshake message (header + body).
///
/// The extensions block is omitted entirely when no extensions are present:
/// older servers reject trailing bytes after compression_methods.
pub fn encode_client_hello(ch: &ClientHello) -> Vec<u8> {
    let mut body = Vec::with_capacity(64 + ch.cipher_suites.len() * 2);

    body.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    body.extend_from_slice(&ch.random);

    body.push(ch.session_id.len() as u8);
    body.extend_from_slice(&ch.session_id);

    let suites_len = (ch.cipher_suites.len() * 2) as u16;
    body.extend_from_slice(&suites_len.to_be_bytes());
    for s in &ch.cipher_suites {
        body.extend_from_slice(&s.0.to_be_bytes());
    }

    body.push(ch.compression_methods.len() as u8);
    for c in &ch.compression_methods {
        body.push(c.0);
    }

    if !ch.extensions.is_empty() {
        let ext_data = encode_extensions(&ch.extensions);
        body.extend_from_slice(&(ext_data.len() as u16).to_be_bytes());
        body.extend_from_slice(&ext_data);
    }

    wrap_handshake(HandshakeType::ClientHello, &body)
}

fn encode_extensions(extensions: &[Extension]) -> Vec<u8> {
    let mut out = Vec::new();
    for ext in extensions {
        out.extend_from_slice(&ext.extension_type.to_be_bytes());
        out.extend_from_slice(&(ext.data.len() as u16).to_be_bytes());
        out.extend_from_slice(&ext.data);
    }
    out
}

fn decode_extensions(data: &[u8]) -> Result<Vec<Extension>, TlsError> {
    let err = |msg: &str| TlsError::decode_error(format!("extensions: {msg}"));

    if data.len() < 2 {
        return Err(err("too short for length"));
    }
    let total = u16::from_be_bytes([data[0], data[1]]) as usize;
    if data.len() != 2 + total {
        return Err(err("length mismatch"));
    }

    let mut extensions = Vec::new();
    let mut pos = 2;
    while pos < data.len() {
        if data.len() < pos + 4 {
            return Err(err("entry header truncated"));
        }
        let extension_type = u16::from_be_bytes([data[pos], data[pos + 1]]);
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 4;
        if data.len() < pos + len {
            return Err(err("entry body truncated"));
        }
        extensions.push(Extension {
            extension_type,
            data: data[pos..pos + len].to_vec(),
        });
        pos += len;
    }
    Ok(extensions)
}

// ---------------------------------------------------------------------------
// ServerHello
// ---------------------------------------------------------------------------

/// Decode a ServerHello body (after the handshake header).
pub fn decode_server_hello(data: &[u8]) -> Result<ServerHello, TlsError> {
    let mut pos = 0;
    let err = |msg: &str| TlsError::decode_error(format!("ServerHello: {msg}"));

    if data.len() < pos + 2 {
        return Err(err("too short for version"));
    }
    let version = u16::from_be_bytes([data[pos], data[pos + 1]]);
    pos += 2;

    if data.len() < pos + 32 {
        return Err(err("too short for random"));
    }
    let mut random = [0u8; 32];
    random.copy_from_slice(&data[pos..pos + 32]);
    pos += 32;

    if data.len() < pos + 1 {
        return Err(err("too short for session_id length"));
    }
    let sid_len = data[pos] as usize;
    pos += 1;
    if sid_len > 32 {
        return Err(err("session_id longer than 32"));
    }
    if data.len() < pos + sid_len {
        return Err(err("too short for session_id"));
    }
    let session_id = data[pos..pos + sid_len].to_vec();
    pos += sid_len;

    if data.len() < pos + 3 {
        return Err(err("too short for suite and compression"));
    }
    let cipher_suite = CipherSuite(u16::from_be_bytes([data[pos], data[pos + 1]]));
    let compression_method = CompressionMethod(data[pos + 2]);
    pos += 3;

    let extensions = if data.len() > pos {
        decode_extensions(&data[pos..])?
    } else {
        vec![]
    };

    Ok(ServerHello {
        version,
        random,
        session_id,
        cipher_suite,
        compression_method,
        extensions,
    })
}

// ---------------------------------------------------------------------------
// Certificate
// ---------------------------------------------------------------------------

/// Encode a Certificate message. An empty list is the client's "no
/// certificate" answer to a CertificateRequest.
pub fn encode_certificate(cert: &CertificateMsg) -> Vec<u8> {
    let total_len: usize = cert.certificate_list.iter().map(|c| 3 + c.len()).sum();

    let mut body = Vec::with_capacity(3 + total_len);
    body.push((total_len >> 16) as u8);
    body.push((total_len >> 8) as u8);
    body.push(total_len as u8);

    for cert_data in &cert.certificate_list {
        let len = cert_data.len();
        body.push((len >> 16) as u8);
        body.push((len >> 8) as u8);
        body.push(len as u8);
        body.extend_from_slice(cert_data);
    }

    wrap_handshake(HandshakeType::Certificate, &body)
}

/// Decode a Certificate message body.
pub fn decode_certificate(body: &[u8]) -> Result<CertificateMsg, TlsError> {
    let err = |msg: &str| TlsError::decode_error(format!("Certificate: {msg}"));

    if body.len() < 3 {
        return Err(err("too short"));
    }
    let total_len = read_u24(body) as usize;
    if body.len() != 3 + total_len {
        return Err(err("length mismatch"));
    }

    let mut certs = Vec::new();
    let mut offset = 3;
    let end = 3 + total_len;
    while offset < end {
        if offset + 3 > end {
            return Err(err("entry header truncated"));
        }
        let cert_len = read_u24(&body[offset..]) as usize;
        offset += 3;
        if offset + cert_len > end {
            return Err(err("entry data truncated"));
        }
        certs.push(body[offset..offset + cert_len].to_vec());
        offset += cert_len;
    }

    Ok(CertificateMsg {
        certificate_list: certs,
    })
}

// ---------------------------------------------------------------------------
// CertificateRequest
// ---------------------------------------------------------------------------

/// Decode a CertificateRequest message body.
pub fn decode_certificate_request(body: &[u8]) -> Result<CertificateRequest, TlsError> {
    let err = |msg: &str| TlsError::decode_error(format!("CertificateRequest: {msg}"));

    if body.is_empty() {
        return Err(err("empty"));
    }

    let mut offset = 0;
    let cert_types_len = body[offset] as usize;
    offset += 1;
    if body.len() < offset + cert_types_len {
        return Err(err("cert_types truncated"));
    }
    let cert_types = body[offset..offset + cert_types_len].to_vec();
    offset += cert_types_len;

    if body.len() < offset + 2 {
        return Err(err("ca_list length truncated"));
    }
    let ca_total = u16::from_be_bytes([body[offset], body[offset + 1]]) as usize;
    offset += 2;
    if body.len() != offset + ca_total {
        return Err(err("ca_list length mismatch"));
    }

    let ca_end = offset + ca_total;
    let mut ca_names = Vec::new();
    while offset < ca_end {
        if offset + 2 > ca_end {
            return Err(err("ca entry truncated"));
        }
        let dn_len = u16::from_be_bytes([body[offset], body[offset + 1]]) as usize;
        offset += 2;
        if offset + dn_len > ca_end {
            return Err(err("ca DN truncated"));
        }
        ca_names.push(body[offset..offset + dn_len].to_vec());
        offset += dn_len;
    }

    Ok(CertificateRequest {
        cert_types,
        ca_names,
    })
}

// ---------------------------------------------------------------------------
// Finished, ServerHelloDone, ChangeCipherSpec
// ---------------------------------------------------------------------------

pub const FINISHED_VERIFY_DATA_LEN: usize = 12;

/// Encode a Finished message (12-byte verify_data).
pub fn encode_finished(verify_data: &[u8; FINISHED_VERIFY_DATA_LEN]) -> Vec<u8> {
    wrap_handshake(HandshakeType::Finished, verify_data)
}

/// Decode a Finished message body.
pub fn decode_finished(body: &[u8]) -> Result<[u8; FINISHED_VERIFY_DATA_LEN], TlsError> {
    if body.len() != FINISHED_VERIFY_DATA_LEN {
        return Err(TlsError::decode_error(format!(
            "Finished verify_data must be 12 bytes, got {}",
            body.len()
        )));
    }
    let mut out = [0u8; FINISHED_VERIFY_DATA_LEN];
    out.copy_from_slice(body);
    Ok(out)
}

/// The single-byte change_cipher_spec payload (content type 20, not a
/// handshake message).
pub fn encode_change_cipher_spec() -> Vec<u8> {
    vec![0x01]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::MessageReassembler;

    fn decode_one(encoded: &[u8]) -> (HandshakeType, Vec<u8>) {
        let mut r = MessageReassembler::new();
        r.push(encoded);
        let m = r.next_message().unwrap().unwrap();
        assert!(r.next_message().unwrap().is_none());
        (m.msg_type, m.body)
    }

    #[test]
    fn test_client_hello_wire_form() {
        let ch = ClientHello {
            random: [0x42; 32],
            session_id: vec![],
            cipher_suites: vec![
                CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
                CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV,
            ],
            compression_methods: vec![CompressionMethod::NULL],
            extensions: vec![],
        };
        let encoded = encode_client_hello(&ch);
        let (msg_type, body) = decode_one(&encoded);
        assert_eq!(msg_type, HandshakeType::ClientHello);

        assert_eq!(&body[..2], &[0x03, 0x01]);
        assert_eq!(&body[2..34], &[0x42; 32]);
        assert_eq!(body[34], 0); // empty session_id
        assert_eq!(&body[35..37], &[0x00, 0x04]); // two suites
        assert_eq!(&body[37..41], &[0x00, 0x2F, 0x00, 0xFF]);
        assert_eq!(&body[41..43], &[0x01, 0x00]); // one compression: null
        // No extensions block when none are offered.
        assert_eq!(body.len(), 43);
    }

    #[test]
    fn test_client_hello_with_server_name() {
        let ch = ClientHello {
            random: [0; 32],
            session_id: vec![],
            cipher_suites: vec![CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA],
            compression_methods: vec![CompressionMethod::NULL],
            extensions: vec![Extension::server_name("example.com")],
        };
        let encoded = encode_client_hello(&ch);
        let (_, body) = decode_one(&encoded);

        // type 0, list: len(2) || host_name(0) || len(2) || "example.com"
        let ext = Extension::server_name("example.com");
        assert_eq!(ext.data[2], 0);
        assert_eq!(&ext.data[5..], b"example.com");
        let tail = &body[body.len() - ext.data.len()..];
        assert_eq!(tail, &ext.data[..]);
    }

    #[test]
    fn test_server_hello_roundtrip() {
        // Hand-built ServerHello body.
        let mut body = Vec::new();
        body.extend_from_slice(&[0x03, 0x01]);
        body.extend_from_slice(&[0x5A; 32]);
        body.push(4);
        body.extend_from_slice(&[9, 9, 9, 9]);
        body.extend_from_slice(&[0x00, 0x2F]);
        body.push(0);

        let sh = decode_server_hello(&body).unwrap();
        assert_eq!(sh.version, 0x0301);
        assert_eq!(sh.random, [0x5A; 32]);
        assert_eq!(sh.session_id, vec![9, 9, 9, 9]);
        assert_eq!(sh.cipher_suite, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        assert_eq!(sh.compression_method, CompressionMethod::NULL);
        assert!(sh.extensions.is_empty());
    }

    #[test]
    fn test_server_hello_truncations_rejected() {
        assert!(decode_server_hello(&[]).is_err());
        assert!(decode_server_hello(&[0x03, 0x01]).is_err());
        let mut body = vec![0x03, 0x01];
        body.extend_from_slice(&[0; 32]);
        body.push(33); // session_id too long
        body.extend_from_slice(&[0; 40]);
        assert!(decode_server_hello(&body).is_err());
    }

    #[test]
    fn test_server_hello_trailing_garbage_rejected() {
        let mut body = Vec::new();
        body.extend_from_slice(&[0x03, 0x01]);
        body.extend_from_slice(&[0; 32]);
        body.push(0);
        body.extend_from_slice(&[0x00, 0x2F]);
        body.push(0);
        body.push(0xEE); // one stray byte, not a valid extensions block
        assert!(decode_server_hello(&body).is_err());
    }

    #[test]
    fn test_certificate_roundtrip() {
        let cert = CertificateMsg {
            certificate_list: vec![vec![0x30, 0x82, 0x01, 0x00], vec![0x30, 0x82, 0x02, 0x00]],
        };
        let encoded = encode_certificate(&cert);
        let (msg_type, body) = decode_one(&encoded);
        assert_eq!(msg_type, HandshakeType::Certificate);

        let decoded = decode_certificate(&body).unwrap();
        assert_eq!(decoded.certificate_list, cert.certificate_list);
    }

    #[test]
    fn test_empty_certificate_roundtrip() {
        let encoded = encode_certificate(&CertificateMsg {
            certificate_list: vec![],
        });
        let (_, body) = decode_one(&encoded);
        assert_eq!(body, &[0, 0, 0]);
        assert!(decode_certificate(&body).unwrap().certificate_list.is_empty());
    }

    #[test]
    fn test_certificate_length_mismatch_rejected() {
        // Outer length claims more than is present.
        assert!(decode_certificate(&[0x00, 0x00, 0x08, 0x00, 0x00, 0x01, 0xAA]).is_err());
        // Inner entry overruns the outer list.
        assert!(decode_certificate(&[0x00, 0x00, 0x04, 0x00, 0x00, 0x09, 0xAA]).is_err());
    }

    #[test]
    fn test_certificate_request_decode() {
        let mut body = vec![2u8, 1, 2]; // rsa_sign, dss_sign
        let dn = [0x30u8, 0x0A, 0x31, 0x08];
        body.extend_from_slice(&((dn.len() + 2) as u16).to_be_bytes());
        body.extend_from_slice(&(dn.len() as u16).to_be_bytes());
        body.extend_from_slice(&dn);

        let cr = decode_certificate_request(&body).unwrap();
        assert_eq!(cr.cert_types, vec![1, 2]);
        assert_eq!(cr.ca_names, vec![dn.to_vec()]);
    }

    #[test]
    fn test_certificate_request_truncations_rejected() {
        assert!(decode_certificate_request(&[]).is_err());
        assert!(decode_certificate_request(&[2, 1]).is_err());
        assert!(decode_certificate_request(&[1, 1, 0x00, 0x05, 0x00]).is_err());
    }

    #[test]
    fn test_finished_codec() {
        let vd = [0xABu8; 12];
        let encoded = encode_finished(&vd);
        let (msg_type, body) = decode_one(&encoded);
        assert_eq!(msg_type, HandshakeType::Finished);
        assert_eq!(decode_finished(&body).unwrap(), vd);

        assert!(decode_finished(&[0; 11]).is_err());
        assert!(decode_finished(&[0; 13]).is_err());
    }

    #[test]
    fn test_change_cipher_spec_payload() {
        assert_eq!(encode_change_cipher_spec(), vec![0x01]);
    }
}
