//! TLS client configuration with builder pattern.

use std::fmt;
use std::sync::Arc;

use crate::handshake::signing::ClientSigner;
use crate::CipherSuite;
use zeroize::Zeroize;

/// What the handshake learned about the server, handed to the
/// authentication callback for the trust decision.
#[derive(Debug)]
pub struct ServerIdentity<'a> {
    /// DER chain as sent, leaf first.
    pub certificate_chain: &'a [Vec<u8>],
    /// Whether the server acknowledged the renegotiation SCSV with an
    /// empty renegotiation_info extension. Legacy servers leave it out.
    pub secure_renegotiation: bool,
}

/// Chain validation callback: decides whether to trust the presented
/// server identity. Path building, expiry, and name checks live behind
/// this seam, outside the protocol engine.
pub type ServerAuthenticator = Arc<dyn Fn(&ServerIdentity<'_>) -> bool + Send + Sync>;

/// Observer for the PSK identity hint the server may send in its
/// ServerKeyExchange. The configured identity is used either way.
pub type PskHintObserver = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Pre-shared key credentials for the PSK suite families.
#[derive(Clone)]
pub struct PskIdentity {
    /// Identity sent in ClientKeyExchange.
    pub identity: Vec<u8>,
    pub key: Vec<u8>,
}

impl Drop for PskIdentity {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for PskIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PskIdentity")
            .field("identity", &self.identity)
            .field("key", &format!("[{} bytes]", self.key.len()))
            .finish()
    }
}

/// SRP credentials (RFC 5054). The user name also goes out in the
/// ClientHello srp extension.
#[derive(Clone)]
pub struct SrpIdentity {
    pub username: String,
    pub password: Vec<u8>,
}

impl Drop for SrpIdentity {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

impl fmt::Debug for SrpIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SrpIdentity")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Client certificate and signing key, answered to a CertificateRequest.
#[derive(Clone)]
pub struct ClientCredentials {
    /// DER chain, leaf first.
    pub certificate_chain: Vec<Vec<u8>>,
    pub signer: Arc<ClientSigner>,
}

/// TLS client configuration.
#[derive(Clone)]
pub struct TlsConfig {
    /// Enabled cipher suites, in preference order.
    pub cipher_suites: Vec<CipherSuite>,
    /// Host name for the server_name extension. None disables SNI.
    pub server_name: Option<String>,
    /// Append TLS_EMPTY_RENEGOTIATION_INFO_SCSV to the offer.
    pub send_scsv: bool,
    /// Server chain validation. None accepts any chain; the handshake still
    /// enforces key type and keyUsage against the negotiated suite.
    pub server_authenticator: Option<ServerAuthenticator>,
    /// Client certificate for mutual authentication.
    pub client_credentials: Option<ClientCredentials>,
    pub psk: Option<PskIdentity>,
    pub psk_hint_observer: Option<PskHintObserver>,
    pub srp: Option<SrpIdentity>,
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("cipher_suites", &self.cipher_suites)
            .field("server_name", &self.server_name)
            .field("send_scsv", &self.send_scsv)
            .field(
                "server_authenticator",
                &self.server_authenticator.as_ref().map(|_| "<callback>"),
            )
            .field(
                "client_credentials",
                &self.client_credentials.as_ref().map(|_| "<credentials>"),
            )
            .field("psk", &self.psk)
            .field(
                "psk_hint_observer",
                &self.psk_hint_observer.as_ref().map(|_| "<callback>"),
            )
            .field("srp", &self.srp.as_ref().map(|s| &s.username))
            .finish()
    }
}

impl TlsConfig {
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// The suites this configuration can actually complete: PSK and SRP
    /// families need their credentials configured up front.
    pub fn offerable_suites(&self) -> Vec<CipherSuite> {
        use crate::crypt::{CipherSuiteParams, KeyExchangeAlg};
        self.cipher_suites
            .iter()
            .copied()
            .filter(|&suite| {
                let Ok(params) = CipherSuiteParams::from_suite(suite) else {
                    return false;
                };
                match params.key_exchange {
                    KeyExchangeAlg::Psk | KeyExchangeAlg::RsaPsk | KeyExchangeAlg::DhePsk => {
                        self.psk.is_some()
                    }
                    KeyExchangeAlg::Srp | KeyExchangeAlg::SrpRsa => self.srp.is_some(),
                    _ => true,
                }
            })
            .collect()
    }
}

/// Builder for `TlsConfig`.
pub struct TlsConfigBuilder {
    cipher_suites: Vec<CipherSuite>,
    server_name: Option<String>,
    send_scsv: bool,
    server_authenticator: Option<ServerAuthenticator>,
    client_credentials: Option<ClientCredentials>,
    psk: Option<PskIdentity>,
    psk_hint_observer: Option<PskHintObserver>,
    srp: Option<SrpIdentity>,
}

impl Default for TlsConfigBuilder {
    fn default() -> Self {
        Self {
            cipher_suites: vec![
                CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA,
                CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
                CipherSuite::TLS_DHE_RSA_WITH_AES_256_CBC_SHA,
                CipherSuite::TLS_DHE_RSA_WITH_AES_128_CBC_SHA,
                CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA,
                CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
            ],
            server_name: None,
            send_scsv: true,
            server_authenticator: None,
            client_credentials: None,
            psk: None,
            psk_hint_observer: None,
            srp: None,
        }
    }
}

impl TlsConfigBuilder {
    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.cipher_suites = suites.to_vec();
        self
    }

    pub fn server_name(mut self, name: &str) -> Self {
        self.server_name = Some(name.to_string());
        self
    }

    pub fn send_scsv(mut self, enabled: bool) -> Self {
        self.send_scsv = enabled;
        self
    }

    pub fn server_authenticator(mut self, authenticator: ServerAuthenticator) -> Self {
        self.server_authenticator = Some(authenticator);
        self
    }

    pub fn client_credentials(mut self, credentials: ClientCredentials) -> Self {
        self.client_credentials = Some(credentials);
        self
    }

    pub fn psk(mut self, identity: PskIdentity) -> Self {
        self.psk = Some(identity);
        self
    }

    pub fn psk_hint_observer(mut self, observer: PskHintObserver) -> Self {
        self.psk_hint_observer = Some(observer);
        self
    }

    pub fn srp(mut self, identity: SrpIdentity) -> Self {
        self.srp = Some(identity);
        self
    }

    pub fn build(self) -> TlsConfig {
        TlsConfig {
            cipher_suites: self.cipher_suites,
            server_name: self.server_name,
            send_scsv: self.send_scsv,
            server_authenticator: self.server_authenticator,
            client_credentials: self.client_credentials,
            psk: self.psk,
            psk_hint_observer: self.psk_hint_observer,
            srp: self.srp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = TlsConfig::builder().build();
        assert!(config.send_scsv);
        assert!(config.server_name.is_none());
        assert!(!config.cipher_suites.is_empty());
        // Ephemeral suites are preferred over plain RSA by default.
        assert_eq!(
            config.cipher_suites[0],
            CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA
        );
    }

    #[test]
    fn test_offerable_suites_filters_unconfigured_psk_and_srp() {
        let config = TlsConfig::builder()
            .cipher_suites(&[
                CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
                CipherSuite::TLS_PSK_WITH_AES_128_CBC_SHA,
                CipherSuite::TLS_SRP_SHA_WITH_AES_128_CBC_SHA,
            ])
            .build();
        assert_eq!(
            config.offerable_suites(),
            vec![CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA]
        );

        let config = TlsConfig::builder()
            .cipher_suites(&[
                CipherSuite::TLS_PSK_WITH_AES_128_CBC_SHA,
                CipherSuite::TLS_SRP_SHA_WITH_AES_128_CBC_SHA,
            ])
            .psk(PskIdentity {
                identity: b"id".to_vec(),
                key: vec![1, 2, 3],
            })
            .srp(SrpIdentity {
                username: "alice".into(),
                password: b"pw".to_vec(),
            })
            .build();
        assert_eq!(config.offerable_suites().len(), 2);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = TlsConfig::builder()
            .psk(PskIdentity {
                identity: b"id".to_vec(),
                key: vec![0xAA; 32],
            })
            .srp(SrpIdentity {
                username: "alice".into(),
                password: b"hunter2".to_vec(),
            })
            .build();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("aa"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[32 bytes]"));
    }
}
