#![forbid(unsafe_code)]
#![doc = "TLS 1.0 client protocol engine."]

pub mod cert;
pub mod config;
pub mod connection;
pub mod crypt;
pub mod handshake;
pub mod record;

pub use connection::TlsClientConnection;
pub use tls10_types::{Alert, AlertDescription, AlertLevel, TlsError};

/// The only protocol version this engine speaks on the wire.
pub const PROTOCOL_VERSION: u16 = 0x0301;

/// TLS cipher suite identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CipherSuite(pub u16);

impl CipherSuite {
    // RSA key transport
    pub const TLS_RSA_WITH_RC4_128_MD5: Self = Self(0x0004);
    pub const TLS_RSA_WITH_RC4_128_SHA: Self = Self(0x0005);
    pub const TLS_RSA_WITH_AES_128_CBC_SHA: Self = Self(0x002F);
    pub const TLS_RSA_WITH_AES_256_CBC_SHA: Self = Self(0x0035);

    // Static and ephemeral finite-field Diffie-Hellman
    pub const TLS_DH_DSS_WITH_AES_128_CBC_SHA: Self = Self(0x0030);
    pub const TLS_DH_RSA_WITH_AES_128_CBC_SHA: Self = Self(0x0031);
    pub const TLS_DHE_DSS_WITH_AES_128_CBC_SHA: Self = Self(0x0032);
    pub const TLS_DHE_RSA_WITH_AES_128_CBC_SHA: Self = Self(0x0033);
    pub const TLS_DHE_RSA_WITH_AES_256_CBC_SHA: Self = Self(0x0039);

    // Static and ephemeral elliptic-curve Diffie-Hellman (RFC 4492)
    pub const TLS_ECDH_ECDSA_WITH_AES_128_CBC_SHA: Self = Self(0xC004);
    pub const TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA: Self = Self(0xC009);
    pub const TLS_ECDH_RSA_WITH_AES_128_CBC_SHA: Self = Self(0xC00E);
    pub const TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA: Self = Self(0xC013);

    // SRP (RFC 5054)
    pub const TLS_SRP_SHA_WITH_AES_128_CBC_SHA: Self = Self(0xC01D);
    pub const TLS_SRP_SHA_RSA_WITH_AES_128_CBC_SHA: Self = Self(0xC01E);

    // Pre-shared key (RFC 4279)
    pub const TLS_PSK_WITH_AES_128_CBC_SHA: Self = Self(0x008C);
    pub const TLS_DHE_PSK_WITH_AES_128_CBC_SHA: Self = Self(0x0090);
    pub const TLS_RSA_PSK_WITH_AES_128_CBC_SHA: Self = Self(0x0094);

    /// Signaling value appended to the offer when no renegotiation_info
    /// extension is sent (RFC 5746). Never selectable by the server.
    pub const TLS_EMPTY_RENEGOTIATION_INFO_SCSV: Self = Self(0x00FF);
}

/// Record-layer compression method identifier.
///
/// Only the null transform is offered; the abstraction exists so that the
/// active pair can be swapped atomically on change_cipher_spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionMethod(pub u8);

impl CompressionMethod {
    pub const NULL: Self = Self(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scsv_value() {
        assert_eq!(CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV.0, 0x00FF);
    }

    #[test]
    fn test_wire_codes() {
        assert_eq!(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA.0, 0x002F);
        assert_eq!(CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA.0, 0xC013);
        assert_eq!(CipherSuite::TLS_SRP_SHA_WITH_AES_128_CBC_SHA.0, 0xC01D);
        assert_eq!(CompressionMethod::NULL.0, 0);
        assert_eq!(PROTOCOL_VERSION, 0x0301);
    }
}
