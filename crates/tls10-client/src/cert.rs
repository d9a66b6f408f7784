//! Server certificate handling: leaf public key extraction and keyUsage
//! enforcement.
//!
//! Chain building and trust decisions belong to the configured
//! [`crate::config::ServerAuthenticator`]; this module only pulls what the
//! handshake itself needs out of the leaf.

use dsa::pkcs8::DecodePublicKey as _;
use x509_parser::oid_registry::{
    OID_KEY_TYPE_DSA, OID_KEY_TYPE_EC_PUBLIC_KEY, OID_PKCS1_RSAENCRYPTION,
};
use x509_parser::prelude::*;

use tls10_types::{AlertDescription, TlsError};

/// PKCS#3 dhKeyAgreement and ANSI X9.42 dhpublicnumber.
const OID_DH_PKCS3: &str = "1.2.840.113549.1.3.1";
const OID_DH_X942: &str = "1.2.840.10046.2.1";

/// The leaf public key, in the form the key exchange strategies consume.
#[derive(Debug)]
pub enum ServerPublicKey {
    Rsa(rsa::RsaPublicKey),
    Dsa(dsa::VerifyingKey),
    EcP256(p256::PublicKey),
    /// Static DH parameters and public value, big-endian.
    Dh {
        p: Vec<u8>,
        g: Vec<u8>,
        public: Vec<u8>,
    },
}

/// What the negotiated suite uses the leaf key for, checked against the
/// keyUsage extension when one is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsagePurpose {
    KeyEncipherment,
    DigitalSignature,
    KeyAgreement,
}

fn bad_certificate(reason: impl Into<String>) -> TlsError {
    TlsError::fatal(AlertDescription::BadCertificate, reason)
}

fn unsupported_certificate(reason: impl Into<String>) -> TlsError {
    TlsError::fatal(AlertDescription::UnsupportedCertificate, reason)
}

/// Parse the leaf certificate and extract its public key, enforcing
/// `purpose` against keyUsage if the certificate carries that extension.
pub fn extract_server_public_key(
    leaf_der: &[u8],
    purpose: KeyUsagePurpose,
) -> Result<ServerPublicKey, TlsError> {
    let (rem, cert) = X509Certificate::from_der(leaf_der)
        .map_err(|e| bad_certificate(format!("leaf certificate does not parse: {e}")))?;
    if !rem.is_empty() {
        return Err(bad_certificate("trailing bytes after leaf certificate"));
    }

    check_key_usage(&cert, purpose)?;

    let spki = cert.public_key();
    let alg = &spki.algorithm.algorithm;

    if *alg == OID_PKCS1_RSAENCRYPTION {
        let key = rsa::RsaPublicKey::from_public_key_der(spki.raw)
            .map_err(|_| bad_certificate("malformed RSA public key"))?;
        return Ok(ServerPublicKey::Rsa(key));
    }
    if *alg == OID_KEY_TYPE_EC_PUBLIC_KEY {
        let key = p256::PublicKey::from_public_key_der(spki.raw)
            .map_err(|_| unsupported_certificate("EC key is not a valid P-256 key"))?;
        return Ok(ServerPublicKey::EcP256(key));
    }
    if *alg == OID_KEY_TYPE_DSA {
        let key = dsa::VerifyingKey::from_public_key_der(spki.raw)
            .map_err(|_| bad_certificate("malformed DSA public key"))?;
        return Ok(ServerPublicKey::Dsa(key));
    }

    let alg_id = alg.to_id_string();
    if alg_id == OID_DH_PKCS3 || alg_id == OID_DH_X942 {
        return extract_dh_key(spki);
    }

    Err(unsupported_certificate(format!(
        "unsupported public key algorithm {alg_id}"
    )))
}

/// DH SPKI: parameters = SEQUENCE { p INTEGER, g INTEGER, ... },
/// subjectPublicKey = INTEGER y inside the BIT STRING.
fn extract_dh_key(spki: &SubjectPublicKeyInfo<'_>) -> Result<ServerPublicKey, TlsError> {
    use x509_parser::der_parser::ber::parse_ber_integer;

    let params = spki
        .algorithm
        .parameters
        .as_ref()
        .ok_or_else(|| bad_certificate("DH key without domain parameters"))?;
    let content: &[u8] = params.data.as_ref();

    let (rest, p) =
        parse_ber_integer(content).map_err(|_| bad_certificate("DH modulus does not parse"))?;
    let (_, g) =
        parse_ber_integer(rest).map_err(|_| bad_certificate("DH generator does not parse"))?;

    let (_, y) = parse_ber_integer(spki.subject_public_key.data.as_ref())
        .map_err(|_| bad_certificate("DH public value does not parse"))?;

    let int_bytes = |obj: &x509_parser::der_parser::ber::BerObject<'_>| -> Result<Vec<u8>, TlsError> {
        obj.as_slice()
            .map(|s| s.to_vec())
            .map_err(|_| bad_certificate("DH integer has no content"))
    };

    Ok(ServerPublicKey::Dh {
        p: int_bytes(&p)?,
        g: int_bytes(&g)?,
        public: int_bytes(&y)?,
    })
}

fn check_key_usage(cert: &X509Certificate<'_>, purpose: KeyUsagePurpose) -> Result<(), TlsError> {
    let usage = match cert
        .key_usage()
        .map_err(|_| bad_certificate("duplicate keyUsage extension"))?
    {
        Some(ext) => ext.value,
        // No extension: any usage is acceptable.
        None => return Ok(()),
    };

    let allowed = match purpose {
        KeyUsagePurpose::KeyEncipherment => usage.key_encipherment(),
        KeyUsagePurpose::DigitalSignature => usage.digital_signature(),
        KeyUsagePurpose::KeyAgreement => usage.key_agreement(),
    };
    if !allowed {
        return Err(bad_certificate(format!(
            "leaf keyUsage does not permit {purpose:?}"
        )));
    }
    Ok(())
}
