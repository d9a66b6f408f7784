//! Signature strategies (RFC 2246 §7.4.3, §7.4.8; RFC 4492 §5.4).
//!
//! RSA signatures cover the concatenated MD5 || SHA-1 digest of the signed
//! data, padded with PKCS#1 v1.5 but with no DigestInfo prefix. DSA and
//! ECDSA signatures cover the SHA-1 digest alone, DER-encoded.

use dsa::pkcs8::der::Encode as _;
use md5::{Digest as _, Md5};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::Sha1;

use crate::cert::ServerPublicKey;
use crate::crypt::transcript::TRANSCRIPT_HASH_LEN;
use crate::crypt::SignatureAlgorithm;
use tls10_types::TlsError;

/// MD5(data) || SHA1(data), the 36-byte digest RSA signatures cover.
pub fn dual_hash(data: &[u8]) -> [u8; TRANSCRIPT_HASH_LEN] {
    let mut out = [0u8; TRANSCRIPT_HASH_LEN];
    out[..16].copy_from_slice(&Md5::digest(data));
    out[16..].copy_from_slice(&Sha1::digest(data));
    out
}

fn sha1_hash(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

/// Verify a ServerKeyExchange signature against the leaf public key.
pub fn verify_server_signature(
    algorithm: SignatureAlgorithm,
    key: &ServerPublicKey,
    signed_data: &[u8],
    signature: &[u8],
) -> Result<(), TlsError> {
    let fail = || TlsError::decrypt_error("ServerKeyExchange signature verification failed");

    match (algorithm, key) {
        (SignatureAlgorithm::Rsa, ServerPublicKey::Rsa(public)) => {
            let hash = dual_hash(signed_data);
            public
                .verify(Pkcs1v15Sign::new_unprefixed(), &hash, signature)
                .map_err(|_| fail())
        }
        (SignatureAlgorithm::Dsa, ServerPublicKey::Dsa(public)) => {
            let sig = dsa::Signature::try_from(signature).map_err(|_| fail())?;
            public
                .verify_prehash(&sha1_hash(signed_data), &sig)
                .map_err(|_| fail())
        }
        (SignatureAlgorithm::Ecdsa, ServerPublicKey::EcP256(public)) => {
            let sig = p256::ecdsa::Signature::from_der(signature).map_err(|_| fail())?;
            let verifier = p256::ecdsa::VerifyingKey::from(public);
            verifier
                .verify_prehash(&sha1_hash(signed_data), &sig)
                .map_err(|_| fail())
        }
        _ => Err(TlsError::unexpected_message(
            "certificate key does not match the suite's signature algorithm",
        )),
    }
}

/// Client signing key for CertificateVerify.
pub enum ClientSigner {
    Rsa(Box<RsaPrivateKey>),
    Dsa(Box<dsa::SigningKey>),
    EcdsaP256(Box<p256::ecdsa::SigningKey>),
}

impl ClientSigner {
    /// The ClientCertificateType code this signer satisfies.
    pub fn cert_type(&self) -> u8 {
        match self {
            ClientSigner::Rsa(_) => super::codec::CertificateRequest::CERT_TYPE_RSA_SIGN,
            ClientSigner::Dsa(_) => super::codec::CertificateRequest::CERT_TYPE_DSS_SIGN,
            ClientSigner::EcdsaP256(_) => {
                super::codec::CertificateRequest::CERT_TYPE_ECDSA_SIGN
            }
        }
    }

    /// Sign the CertificateVerify digest: the 36-byte transcript hash for
    /// RSA, its SHA-1 half for DSA and ECDSA.
    pub fn sign_certificate_verify(
        &self,
        transcript_hash: &[u8; TRANSCRIPT_HASH_LEN],
    ) -> Result<Vec<u8>, TlsError> {
        match self {
            ClientSigner::Rsa(private) => private
                .sign(Pkcs1v15Sign::new_unprefixed(), transcript_hash)
                .map_err(|_| TlsError::internal_error("RSA CertificateVerify signing failed")),
            ClientSigner::Dsa(signing) => {
                let sig: dsa::Signature = signing
                    .sign_prehash(&sha1_half(transcript_hash)?)
                    .map_err(|_| TlsError::internal_error("DSA CertificateVerify signing failed"))?;
                sig.to_der()
                    .map_err(|_| TlsError::internal_error("DSA signature encoding failed"))
            }
            ClientSigner::EcdsaP256(signing) => {
                let sig: p256::ecdsa::Signature = signing
                    .sign_prehash(&sha1_half(transcript_hash)?)
                    .map_err(|_| TlsError::internal_error("ECDSA CertificateVerify signing failed"))?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
        }
    }
}

fn sha1_half(transcript_hash: &[u8; TRANSCRIPT_HASH_LEN]) -> Result<[u8; 20], TlsError> {
    transcript_hash[16..]
        .try_into()
        .map_err(|_| TlsError::internal_error("bad transcript hash length"))
}
