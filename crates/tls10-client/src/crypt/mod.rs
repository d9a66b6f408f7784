//! Cipher suite parameters, key exchange families, and key derivation.

pub mod key_schedule;
pub mod prf;
pub mod transcript;

use crate::CipherSuite;
use tls10_types::TlsError;

/// Bulk confidentiality transform of a cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkCipher {
    Aes128Cbc,
    Aes256Cbc,
    Rc4_128,
}

impl BulkCipher {
    pub fn key_len(self) -> usize {
        match self {
            BulkCipher::Aes128Cbc | BulkCipher::Rc4_128 => 16,
            BulkCipher::Aes256Cbc => 32,
        }
    }

    /// Block size, or 0 for stream ciphers.
    pub fn block_len(self) -> usize {
        match self {
            BulkCipher::Aes128Cbc | BulkCipher::Aes256Cbc => 16,
            BulkCipher::Rc4_128 => 0,
        }
    }

    pub fn is_block(self) -> bool {
        self.block_len() != 0
    }
}

/// MAC digest of a cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacDigest {
    Md5,
    Sha1,
}

impl MacDigest {
    pub fn mac_len(self) -> usize {
        match self {
            MacDigest::Md5 => 16,
            MacDigest::Sha1 => 20,
        }
    }

    /// Internal compression block size of the digest (both are 64 bytes).
    pub fn block_len(self) -> usize {
        64
    }
}

/// Key exchange family selected by a cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeAlg {
    Rsa,
    DhDss,
    DhRsa,
    DheDss,
    DheRsa,
    EcdhEcdsa,
    EcdhRsa,
    EcdheEcdsa,
    EcdheRsa,
    Srp,
    SrpRsa,
    Psk,
    RsaPsk,
    DhePsk,
}

/// Whether a ServerKeyExchange message is legal for a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKeyExchangeRule {
    /// The message must arrive (ephemeral/anonymous/SRP parameters).
    Required,
    /// The message must not arrive (parameters come from the certificate
    /// or from out-of-band keys).
    Forbidden,
    /// The message may arrive (PSK identity hint).
    Optional,
}

impl KeyExchangeAlg {
    /// True when the server authenticates with a certificate.
    pub fn requires_server_certificate(self) -> bool {
        !matches!(self, KeyExchangeAlg::Srp | KeyExchangeAlg::Psk | KeyExchangeAlg::DhePsk)
    }

    pub fn server_key_exchange(self) -> ServerKeyExchangeRule {
        match self {
            KeyExchangeAlg::Rsa
            | KeyExchangeAlg::DhDss
            | KeyExchangeAlg::DhRsa
            | KeyExchangeAlg::EcdhEcdsa
            | KeyExchangeAlg::EcdhRsa => ServerKeyExchangeRule::Forbidden,
            KeyExchangeAlg::DheDss
            | KeyExchangeAlg::DheRsa
            | KeyExchangeAlg::EcdheEcdsa
            | KeyExchangeAlg::EcdheRsa
            | KeyExchangeAlg::Srp
            | KeyExchangeAlg::SrpRsa
            | KeyExchangeAlg::DhePsk => ServerKeyExchangeRule::Required,
            KeyExchangeAlg::Psk | KeyExchangeAlg::RsaPsk => ServerKeyExchangeRule::Optional,
        }
    }

    /// The signature family a signed ServerKeyExchange must carry, if any.
    pub fn server_signature(self) -> Option<SignatureAlgorithm> {
        match self {
            KeyExchangeAlg::DheRsa | KeyExchangeAlg::EcdheRsa | KeyExchangeAlg::SrpRsa => {
                Some(SignatureAlgorithm::Rsa)
            }
            KeyExchangeAlg::DheDss => Some(SignatureAlgorithm::Dsa),
            KeyExchangeAlg::EcdheEcdsa => Some(SignatureAlgorithm::Ecdsa),
            _ => None,
        }
    }

    /// True when a CertificateRequest from the server is legal.
    pub fn allows_certificate_request(self) -> bool {
        self.requires_server_certificate()
            && !matches!(self, KeyExchangeAlg::RsaPsk)
    }
}

/// Signature family used for ServerKeyExchange and CertificateVerify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Rsa,
    Dsa,
    Ecdsa,
}

/// Negotiated per-suite parameters driving key derivation and the record
/// layer runtimes.
#[derive(Debug, Clone, Copy)]
pub struct CipherSuiteParams {
    pub suite: CipherSuite,
    pub key_exchange: KeyExchangeAlg,
    pub bulk: BulkCipher,
    pub mac: MacDigest,
}

impl CipherSuiteParams {
    pub fn from_suite(suite: CipherSuite) -> Result<Self, TlsError> {
        use BulkCipher::*;
        use KeyExchangeAlg::*;
        use MacDigest::*;

        let (key_exchange, bulk, mac) = match suite {
            CipherSuite::TLS_RSA_WITH_RC4_128_MD5 => (Rsa, Rc4_128, Md5),
            CipherSuite::TLS_RSA_WITH_RC4_128_SHA => (Rsa, Rc4_128, Sha1),
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA => (Rsa, Aes128Cbc, Sha1),
            CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA => (Rsa, Aes256Cbc, Sha1),
            CipherSuite::TLS_DH_DSS_WITH_AES_128_CBC_SHA => (DhDss, Aes128Cbc, Sha1),
            CipherSuite::TLS_DH_RSA_WITH_AES_128_CBC_SHA => (DhRsa, Aes128Cbc, Sha1),
            CipherSuite::TLS_DHE_DSS_WITH_AES_128_CBC_SHA => (DheDss, Aes128Cbc, Sha1),
            CipherSuite::TLS_DHE_RSA_WITH_AES_128_CBC_SHA => (DheRsa, Aes128Cbc, Sha1),
            CipherSuite::TLS_DHE_RSA_WITH_AES_256_CBC_SHA => (DheRsa, Aes256Cbc, Sha1),
            CipherSuite::TLS_ECDH_ECDSA_WITH_AES_128_CBC_SHA => (EcdhEcdsa, Aes128Cbc, Sha1),
            CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA => (EcdheEcdsa, Aes128Cbc, Sha1),
            CipherSuite::TLS_ECDH_RSA_WITH_AES_128_CBC_SHA => (EcdhRsa, Aes128Cbc, Sha1),
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA => (EcdheRsa, Aes128Cbc, Sha1),
            CipherSuite::TLS_SRP_SHA_WITH_AES_128_CBC_SHA => (Srp, Aes128Cbc, Sha1),
            CipherSuite::TLS_SRP_SHA_RSA_WITH_AES_128_CBC_SHA => (SrpRsa, Aes128Cbc, Sha1),
            CipherSuite::TLS_PSK_WITH_AES_128_CBC_SHA => (Psk, Aes128Cbc, Sha1),
            CipherSuite::TLS_DHE_PSK_WITH_AES_128_CBC_SHA => (DhePsk, Aes128Cbc, Sha1),
            CipherSuite::TLS_RSA_PSK_WITH_AES_128_CBC_SHA => (RsaPsk, Aes128Cbc, Sha1),
            other => {
                return Err(TlsError::internal_error(format!(
                    "unsupported cipher suite 0x{:04x}",
                    other.0
                )))
            }
        };

        Ok(Self {
            suite,
            key_exchange,
            bulk,
            mac,
        })
    }

    pub fn mac_len(&self) -> usize {
        self.mac.mac_len()
    }

    pub fn key_len(&self) -> usize {
        self.bulk.key_len()
    }

    pub fn iv_len(&self) -> usize {
        self.bulk.block_len()
    }

    /// Total key material: MAC keys, cipher keys, and (block only) IVs for
    /// both directions, in that fixed order.
    pub fn key_block_len(&self) -> usize {
        2 * self.mac_len() + 2 * self.key_len() + 2 * self.iv_len()
    }
}
