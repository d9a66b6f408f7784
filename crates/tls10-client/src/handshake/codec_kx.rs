//! ServerKeyExchange and ClientKeyExchange wire forms.
//!
//! Both messages are polymorphic: the body layout is implied by the
//! negotiated key exchange family, with no tag on the wire. In this protocol
//! version a ServerKeyExchange signature is a bare length-prefixed opaque —
//! the algorithm is implied by the suite, there are no algorithm bytes.

use crate::crypt::KeyExchangeAlg;
use tls10_types::TlsError;

use super::HandshakeType;

// ---------------------------------------------------------------------------
// Parameter blocks
// ---------------------------------------------------------------------------

/// ServerDHParams (RFC 2246 §7.4.3): p, g, and the server public value, each
/// as a length-prefixed big-endian integer.
#[derive(Debug, Clone)]
pub struct ServerDhParams {
    pub p: Vec<u8>,
    pub g: Vec<u8>,
    pub public: Vec<u8>,
}

impl ServerDhParams {
    /// Re-encode exactly as received, for signature verification.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + self.p.len() + self.g.len() + self.public.len());
        write_vec16(&mut out, &self.p);
        write_vec16(&mut out, &self.g);
        write_vec16(&mut out, &self.public);
        out
    }
}

/// ECParameters + public point (RFC 4492 §5.4), named_curve form only.
#[derive(Debug, Clone)]
pub struct ServerEcdhParams {
    pub named_curve: u16,
    pub point: Vec<u8>,
}

impl ServerEcdhParams {
    pub const CURVE_TYPE_NAMED: u8 = 3;
    pub const SECP256R1: u16 = 23;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.point.len());
        out.push(Self::CURVE_TYPE_NAMED);
        out.extend_from_slice(&self.named_curve.to_be_bytes());
        out.push(self.point.len() as u8);
        out.extend_from_slice(&self.point);
        out
    }
}

/// ServerSRPParams (RFC 5054 §2.5.3): modulus N, generator g, salt s, and
/// the server public value B.
#[derive(Debug, Clone)]
pub struct ServerSrpParams {
    pub n: Vec<u8>,
    pub g: Vec<u8>,
    pub salt: Vec<u8>,
    pub b_public: Vec<u8>,
}

impl ServerSrpParams {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_vec16(&mut out, &self.n);
        write_vec16(&mut out, &self.g);
        write_vec8(&mut out, &self.salt);
        write_vec16(&mut out, &self.b_public);
        out
    }
}

/// Decoded ServerKeyExchange, one variant per family that may receive one.
#[derive(Debug, Clone)]
pub enum ServerKeyExchange {
    Dh {
        params: ServerDhParams,
        signature: Option<Vec<u8>>,
    },
    Ecdh {
        params: ServerEcdhParams,
        signature: Option<Vec<u8>>,
    },
    Srp {
        params: ServerSrpParams,
        signature: Option<Vec<u8>>,
    },
    PskHint {
        hint: Vec<u8>,
    },
    DhePsk {
        hint: Vec<u8>,
        params: ServerDhParams,
    },
}

impl ServerKeyExchange {
    /// The exact parameter bytes the server's signature covers, if this
    /// variant is ever signed.
    pub fn signed_params(&self) -> Option<Vec<u8>> {
        match self {
            ServerKeyExchange::Dh { params, .. } => Some(params.encode()),
            ServerKeyExchange::Ecdh { params, .. } => Some(params.encode()),
            ServerKeyExchange::Srp { params, .. } => Some(params.encode()),
            ServerKeyExchange::PskHint { .. } | ServerKeyExchange::DhePsk { .. } => None,
        }
    }

    pub fn signature(&self) -> Option<&[u8]> {
        match self {
            ServerKeyExchange::Dh { signature, .. }
            | ServerKeyExchange::Ecdh { signature, .. }
            | ServerKeyExchange::Srp { signature, .. } => signature.as_deref(),
            ServerKeyExchange::PskHint { .. } | ServerKeyExchange::DhePsk { .. } => None,
        }
    }

    /// The PSK identity hint, for the families that carry one.
    pub fn identity_hint(&self) -> Option<&[u8]> {
        match self {
            ServerKeyExchange::PskHint { hint } | ServerKeyExchange::DhePsk { hint, .. } => {
                Some(hint)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Length-prefixed opaque helpers
// ---------------------------------------------------------------------------

fn write_vec8(out: &mut Vec<u8>, data: &[u8]) {
    out.push(data.len() as u8);
    out.extend_from_slice(data);
}

fn write_vec16(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u16).to_be_bytes());
    out.extend_from_slice(data);
}

fn read_vec8(data: &[u8], pos: &mut usize, what: &str) -> Result<Vec<u8>, TlsError> {
    if data.len() < *pos + 1 {
        return Err(TlsError::decode_error(format!("{what}: length truncated")));
    }
    let len = data[*pos] as usize;
    *pos += 1;
    if data.len() < *pos + len {
        return Err(TlsError::decode_error(format!("{what}: body truncated")));
    }
    let out = data[*pos..*pos + len].to_vec();
    *pos += len;
    Ok(out)
}

fn read_vec16(data: &[u8], pos: &mut usize, what: &str) -> Result<Vec<u8>, TlsError> {
    if data.len() < *pos + 2 {
        return Err(TlsError::decode_error(format!("{what}: length truncated")));
    }
    let len = u16::from_be_bytes([data[*pos], data[*pos + 1]]) as usize;
    *pos += 2;
    if data.len() < *pos + len {
        return Err(TlsError::decode_error(format!("{what}: body truncated")));
    }
    let out = data[*pos..*pos + len].to_vec();
    *pos += len;
    Ok(out)
}

fn expect_end(data: &[u8], pos: usize, what: &str) -> Result<(), TlsError> {
    if pos != data.len() {
        return Err(TlsError::decode_error(format!("{what}: trailing bytes")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ServerKeyExchange decoding
// ---------------------------------------------------------------------------

fn read_dh_params(body: &[u8], pos: &mut usize) -> Result<ServerDhParams, TlsError> {
    Ok(ServerDhParams {
        p: read_vec16(body, pos, "dh_p")?,
        g: read_vec16(body, pos, "dh_g")?,
        public: read_vec16(body, pos, "dh_Ys")?,
    })
}

fn read_signature(
    body: &[u8],
    pos: &mut usize,
    signed: bool,
) -> Result<Option<Vec<u8>>, TlsError> {
    if signed {
        Ok(Some(read_vec16(body, pos, "signature")?))
    } else {
        Ok(None)
    }
}

/// Decode a ServerKeyExchange body for the negotiated family.
pub fn decode_server_key_exchange(
    alg: KeyExchangeAlg,
    body: &[u8],
) -> Result<ServerKeyExchange, TlsError> {
    let signed = alg.server_signature().is_some();
    let mut pos = 0;

    let ske = match alg {
        KeyExchangeAlg::DheDss | KeyExchangeAlg::DheRsa => {
            let params = read_dh_params(body, &mut pos)?;
            let signature = read_signature(body, &mut pos, signed)?;
            ServerKeyExchange::Dh { params, signature }
        }
        KeyExchangeAlg::EcdheEcdsa | KeyExchangeAlg::EcdheRsa => {
            if body.len() < pos + 3 {
                return Err(TlsError::decode_error("ec params truncated"));
            }
            let curve_type = body[pos];
            if curve_type != ServerEcdhParams::CURVE_TYPE_NAMED {
                return Err(TlsError::illegal_parameter(format!(
                    "unsupported curve type {curve_type}"
                )));
            }
            let named_curve = u16::from_be_bytes([body[pos + 1], body[pos + 2]]);
            pos += 3;
            let point = read_vec8(body, &mut pos, "ec point")?;
            let signature = read_signature(body, &mut pos, signed)?;
            ServerKeyExchange::Ecdh {
                params: ServerEcdhParams { named_curve, point },
                signature,
            }
        }
        KeyExchangeAlg::Srp | KeyExchangeAlg::SrpRsa => {
            let params = ServerSrpParams {
                n: read_vec16(body, &mut pos, "srp_N")?,
                g: read_vec16(body, &mut pos, "srp_g")?,
                salt: read_vec8(body, &mut pos, "srp_s")?,
                b_public: read_vec16(body, &mut pos, "srp_B")?,
            };
            let signature = read_signature(body, &mut pos, signed)?;
            ServerKeyExchange::Srp { params, signature }
        }
        KeyExchangeAlg::Psk | KeyExchangeAlg::RsaPsk => {
            let hint = read_vec16(body, &mut pos, "psk_identity_hint")?;
            ServerKeyExchange::PskHint { hint }
        }
        KeyExchangeAlg::DhePsk => {
            let hint = read_vec16(body, &mut pos, "psk_identity_hint")?;
            let params = read_dh_params(body, &mut pos)?;
            ServerKeyExchange::DhePsk { hint, params }
        }
        KeyExchangeAlg::Rsa
        | KeyExchangeAlg::DhDss
        | KeyExchangeAlg::DhRsa
        | KeyExchangeAlg::EcdhEcdsa
        | KeyExchangeAlg::EcdhRsa => {
            return Err(TlsError::unexpected_message(
                "ServerKeyExchange is not legal for this cipher suite",
            ))
        }
    };

    expect_end(body, pos, "ServerKeyExchange")?;
    Ok(ske)
}

/// The bytes a ServerKeyExchange signature covers:
/// client_random || server_random || params.
pub fn build_signed_data(
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    params: &[u8],
) -> Vec<u8> {
    let mut data = Vec::with_capacity(64 + params.len());
    data.extend_from_slice(client_random);
    data.extend_from_slice(server_random);
    data.extend_from_slice(params);
    data
}

// ---------------------------------------------------------------------------
// ClientKeyExchange encoding
// ---------------------------------------------------------------------------

/// ClientKeyExchange payload, one variant per family.
#[derive(Debug, Clone)]
pub enum ClientKeyExchangeBody {
    /// RSA-encrypted premaster, sent with a 2-byte length prefix.
    RsaEncryptedPremaster(Vec<u8>),
    /// Explicit finite-field DH public value.
    DhPublic(Vec<u8>),
    /// Uncompressed EC point with a 1-byte length prefix.
    EcdhPoint(Vec<u8>),
    /// SRP client public value A.
    SrpPublic(Vec<u8>),
    Psk {
        identity: Vec<u8>,
    },
    RsaPsk {
        identity: Vec<u8>,
        encrypted_premaster: Vec<u8>,
    },
    DhePsk {
        identity: Vec<u8>,
        public: Vec<u8>,
    },
}

/// Encode a ClientKeyExchange as a complete handshake message.
pub fn encode_client_key_exchange(body: &ClientKeyExchangeBody) -> Vec<u8> {
    let mut out = Vec::new();
    match body {
        ClientKeyExchangeBody::RsaEncryptedPremaster(enc) => write_vec16(&mut out, enc),
        ClientKeyExchangeBody::DhPublic(yc) => write_vec16(&mut out, yc),
        ClientKeyExchangeBody::EcdhPoint(point) => write_vec8(&mut out, point),
        ClientKeyExchangeBody::SrpPublic(a) => write_vec16(&mut out, a),
        ClientKeyExchangeBody::Psk { identity } => write_vec16(&mut out, identity),
        ClientKeyExchangeBody::RsaPsk {
            identity,
            encrypted_premaster,
        } => {
            write_vec16(&mut out, identity);
            write_vec16(&mut out, encrypted_premaster);
        }
        ClientKeyExchangeBody::DhePsk { identity, public } => {
            write_vec16(&mut out, identity);
            write_vec16(&mut out, public);
        }
    }
    super::codec::wrap_handshake(HandshakeType::ClientKeyExchange, &out)
}

/// Encode a CertificateVerify: a bare length-prefixed signature.
pub fn encode_certificate_verify(signature: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + signature.len());
    write_vec16(&mut out, signature);
    super::codec::wrap_handshake(HandshakeType::CertificateVerify, &out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dh_body(signed: bool) -> Vec<u8> {
        let params = ServerDhParams {
            p: vec![0xFF; 128],
            g: vec![0x02],
            public: vec![0xAB; 128],
        };
        let mut body = params.encode();
        if signed {
            write_vec16(&mut body, &[0xEE; 64]);
        }
        body
    }

    #[test]
    fn test_decode_dhe_signed() {
        let ske = decode_server_key_exchange(KeyExchangeAlg::DheRsa, &dh_body(true)).unwrap();
        match &ske {
            ServerKeyExchange::Dh { params, signature } => {
                assert_eq!(params.p.len(), 128);
                assert_eq!(params.g, vec![0x02]);
                assert_eq!(signature.as_deref(), Some(&[0xEE; 64][..]));
            }
            other => panic!("wrong variant: {other:?}"),
        }
        // Re-encoded params must match the wire bytes the signature covers.
        let signed = ske.signed_params().unwrap();
        assert_eq!(signed, dh_body(false));
    }

    #[test]
    fn test_dhe_missing_signature_rejected() {
        // DHE_RSA requires a signature; a body without one is truncated.
        assert!(decode_server_key_exchange(KeyExchangeAlg::DheRsa, &dh_body(false)).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut body = dh_body(true);
        body.push(0x00);
        assert!(decode_server_key_exchange(KeyExchangeAlg::DheRsa, &body).is_err());
    }

    #[test]
    fn test_decode_ecdhe() {
        let params = ServerEcdhParams {
            named_curve: ServerEcdhParams::SECP256R1,
            point: vec![0x04; 65],
        };
        let mut body = params.encode();
        write_vec16(&mut body, &[0xCC; 70]);

        let ske = decode_server_key_exchange(KeyExchangeAlg::EcdheEcdsa, &body).unwrap();
        match &ske {
            ServerKeyExchange::Ecdh { params, signature } => {
                assert_eq!(params.named_curve, 23);
                assert_eq!(params.point.len(), 65);
                assert!(signature.is_some());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_decode_ecdhe_explicit_curve_rejected() {
        // curve_type 1 (explicit_prime) is not supported.
        let body = [1u8, 0, 23, 1, 0x04];
        let err = decode_server_key_exchange(KeyExchangeAlg::EcdheRsa, &body).unwrap_err();
        assert_eq!(
            err.alert_to_send(),
            Some(tls10_types::AlertDescription::IllegalParameter)
        );
    }

    #[test]
    fn test_decode_srp() {
        let params = ServerSrpParams {
            n: vec![0xFF; 128],
            g: vec![0x02],
            salt: vec![0x5A; 16],
            b_public: vec![0x77; 128],
        };
        let body = params.encode();
        let ske = decode_server_key_exchange(KeyExchangeAlg::Srp, &body).unwrap();
        match ske {
            ServerKeyExchange::Srp { params, signature } => {
                assert_eq!(params.salt.len(), 16);
                assert!(signature.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_decode_psk_hint() {
        let mut body = Vec::new();
        write_vec16(&mut body, b"hint-value");
        let ske = decode_server_key_exchange(KeyExchangeAlg::Psk, &body).unwrap();
        match ske {
            ServerKeyExchange::PskHint { hint } => assert_eq!(hint, b"hint-value"),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_decode_dhe_psk() {
        let mut body = Vec::new();
        write_vec16(&mut body, b"");
        body.extend_from_slice(&dh_body(false));
        let ske = decode_server_key_exchange(KeyExchangeAlg::DhePsk, &body).unwrap();
        match ske {
            ServerKeyExchange::DhePsk { hint, params } => {
                assert!(hint.is_empty());
                assert_eq!(params.public.len(), 128);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_ske_illegal_for_rsa_suite() {
        let err = decode_server_key_exchange(KeyExchangeAlg::Rsa, &[0, 0]).unwrap_err();
        assert_eq!(
            err.alert_to_send(),
            Some(tls10_types::AlertDescription::UnexpectedMessage)
        );
    }

    #[test]
    fn test_signed_data_layout() {
        let signed = build_signed_data(&[1; 32], &[2; 32], &[3, 4, 5]);
        assert_eq!(signed.len(), 67);
        assert_eq!(&signed[..32], &[1; 32]);
        assert_eq!(&signed[32..64], &[2; 32]);
        assert_eq!(&signed[64..], &[3, 4, 5]);
    }

    #[test]
    fn test_cke_rsa_has_length_prefix() {
        let encoded =
            encode_client_key_exchange(&ClientKeyExchangeBody::RsaEncryptedPremaster(vec![
                0xAA;
                256
            ]));
        // header(4) || len(2) || ciphertext
        assert_eq!(encoded.len(), 4 + 2 + 256);
        assert_eq!(&encoded[4..6], &[0x01, 0x00]);
    }

    #[test]
    fn test_cke_ecdh_uses_one_byte_prefix() {
        let encoded =
            encode_client_key_exchange(&ClientKeyExchangeBody::EcdhPoint(vec![0x04; 65]));
        assert_eq!(encoded[4], 65);
        assert_eq!(encoded.len(), 4 + 1 + 65);
    }

    #[test]
    fn test_cke_rsa_psk_layout() {
        let encoded = encode_client_key_exchange(&ClientKeyExchangeBody::RsaPsk {
            identity: b"alice".to_vec(),
            encrypted_premaster: vec![0xBB; 128],
        });
        assert_eq!(&encoded[4..6], &[0x00, 0x05]);
        assert_eq!(&encoded[6..11], b"alice");
        assert_eq!(&encoded[11..13], &[0x00, 0x80]);
    }

    #[test]
    fn test_certificate_verify_layout() {
        let encoded = encode_certificate_verify(&[0xDD; 48]);
        assert_eq!(encoded[0], HandshakeType::CertificateVerify as u8);
        assert_eq!(&encoded[4..6], &[0x00, 0x30]);
        assert_eq!(encoded.len(), 4 + 2 + 48);
    }
}
