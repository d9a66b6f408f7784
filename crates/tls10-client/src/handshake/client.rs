//! Client handshake state machine.
//!
//! The machine is transport-free: the connection layer feeds it reassembled
//! handshake messages and executes the [`HandshakeAction`]s it emits. Every
//! handshake byte sent or received flows through the transcript here, with
//! two exceptions the protocol demands: hello_request is never hashed, and
//! each Finished is hashed only after its own verify data was captured.

use std::sync::Arc;

use rand_core::CryptoRngCore;
use subtle::ConstantTimeEq;

use crate::cert::{extract_server_public_key, KeyUsagePurpose, ServerPublicKey};
use crate::config::{ServerIdentity, TlsConfig};
use crate::crypt::key_schedule::{
    compute_verify_data, derive_key_block, derive_master_secret, KeyBlock, MASTER_SECRET_LEN,
};
use crate::crypt::transcript::TranscriptHash;
use crate::crypt::{CipherSuiteParams, KeyExchangeAlg, ServerKeyExchangeRule};
use crate::{CipherSuite, CompressionMethod, PROTOCOL_VERSION};
use tls10_types::{AlertDescription, TlsError};
use zeroize::Zeroize;

use super::codec::{
    decode_certificate, decode_certificate_request, decode_finished, decode_server_hello,
    encode_certificate, encode_client_hello, encode_finished, CertificateMsg, CertificateRequest,
    ClientHello, Extension,
};
use super::codec_kx::{
    build_signed_data, decode_server_key_exchange, encode_certificate_verify,
    encode_client_key_exchange, ServerKeyExchange,
};
use super::key_exchange::{ExchangeInputs, KeyExchange};
use super::signing::verify_server_signature;
use super::{HandshakeMessage, HandshakeType};

/// What the connection layer must do next.
#[derive(Debug)]
pub enum HandshakeAction {
    /// Send these bytes as handshake-content records.
    SendHandshake(Vec<u8>),
    /// Send change_cipher_spec and activate outgoing protection with the
    /// negotiated keys.
    SendChangeCipherSpec,
    /// The server Finished verified; the connection is established.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    AwaitServerHello,
    /// Certificate / ServerKeyExchange / CertificateRequest / ServerHelloDone,
    /// in that order, presence governed by the negotiated suite.
    AwaitServerFlight,
    AwaitChangeCipherSpec,
    AwaitFinished,
    Complete,
}

/// Client-side handshake driver for one connection.
pub struct ClientHandshake {
    config: Arc<TlsConfig>,
    state: State,
    transcript: TranscriptHash,

    client_random: [u8; 32],
    server_random: [u8; 32],
    offered_suites: Vec<CipherSuite>,
    offered_extension_types: Vec<u16>,

    params: Option<CipherSuiteParams>,
    secure_renegotiation: bool,
    server_public_key: Option<ServerPublicKey>,
    server_key_exchange: Option<ServerKeyExchange>,
    certificate_request: Option<CertificateRequest>,
    seen_certificate: bool,

    master_secret: Option<[u8; MASTER_SECRET_LEN]>,
    keys: Option<KeyBlock>,
}

impl Drop for ClientHandshake {
    fn drop(&mut self) {
        if let Some(master) = self.master_secret.as_mut() {
            master.zeroize();
        }
    }
}

impl ClientHandshake {
    pub fn new(config: Arc<TlsConfig>) -> Self {
        Self {
            config,
            state: State::Start,
            transcript: TranscriptHash::new(),
            client_random: [0u8; 32],
            server_random: [0u8; 32],
            offered_suites: Vec::new(),
            offered_extension_types: Vec::new(),
            params: None,
            secure_renegotiation: false,
            server_public_key: None,
            server_key_exchange: None,
            certificate_request: None,
            seen_certificate: false,
            master_secret: None,
            keys: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    pub fn cipher_params(&self) -> Option<&CipherSuiteParams> {
        self.params.as_ref()
    }

    /// The derived key block, available once the client flight was built.
    pub fn key_block(&self) -> Option<&KeyBlock> {
        self.keys.as_ref()
    }

    /// Build and hash the ClientHello. Returns the message bytes to send.
    pub fn start(&mut self, rng: &mut dyn CryptoRngCore) -> Result<Vec<u8>, TlsError> {
        if self.state != State::Start {
            return Err(TlsError::internal_error("handshake already started"));
        }

        let mut suites = self.config.offerable_suites();
        if suites.is_empty() {
            return Err(TlsError::internal_error(
                "no usable cipher suites configured",
            ));
        }
        if self.config.send_scsv {
            suites.push(CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV);
        }

        let mut extensions = Vec::new();
        if let Some(name) = &self.config.server_name {
            extensions.push(Extension::server_name(name));
        }
        let offers_srp = suites.iter().any(|&s| {
            matches!(
                CipherSuiteParams::from_suite(s).map(|p| p.key_exchange),
                Ok(KeyExchangeAlg::Srp) | Ok(KeyExchangeAlg::SrpRsa)
            )
        });
        if offers_srp {
            // offerable_suites() guarantees credentials exist here.
            if let Some(srp) = &self.config.srp {
                extensions.push(Extension::srp_identity(&srp.username));
            }
        }

        rng.fill_bytes(&mut self.client_random);
        // gmt_unix_time in the first four bytes (RFC 2246 §7.4.1.2).
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        self.client_random[..4].copy_from_slice(&now.to_be_bytes());
        let hello = ClientHello {
            random: self.client_random,
            session_id: vec![],
            cipher_suites: suites.clone(),
            compression_methods: vec![CompressionMethod::NULL],
            extensions: extensions.clone(),
        };

        self.offered_suites = suites;
        self.offered_extension_types = extensions.iter().map(|e| e.extension_type).collect();

        let encoded = encode_client_hello(&hello);
        self.transcript.update(&encoded);
        self.state = State::AwaitServerHello;
        Ok(encoded)
    }

    /// Process one handshake message and return the resulting actions.
    pub fn handle_message(
        &mut self,
        rng: &mut dyn CryptoRngCore,
        msg: HandshakeMessage,
    ) -> Result<Vec<HandshakeAction>, TlsError> {
        // A hello_request mid-handshake is ignored and never hashed.
        if msg.msg_type == HandshakeType::HelloRequest {
            log::debug!("ignoring hello_request during handshake");
            return Ok(vec![]);
        }

        match (self.state, msg.msg_type) {
            (State::AwaitServerHello, HandshakeType::ServerHello) => {
                self.transcript.update(&msg.raw);
                self.on_server_hello(&msg.body)?;
                Ok(vec![])
            }
            (State::AwaitServerFlight, HandshakeType::Certificate) => {
                self.transcript.update(&msg.raw);
                self.on_certificate(&msg.body)?;
                Ok(vec![])
            }
            (State::AwaitServerFlight, HandshakeType::ServerKeyExchange) => {
                self.transcript.update(&msg.raw);
                self.on_server_key_exchange(&msg.body)?;
                Ok(vec![])
            }
            (State::AwaitServerFlight, HandshakeType::CertificateRequest) => {
                self.transcript.update(&msg.raw);
                self.on_certificate_request(&msg.body)?;
                Ok(vec![])
            }
            (State::AwaitServerFlight, HandshakeType::ServerHelloDone) => {
                if !msg.body.is_empty() {
                    return Err(TlsError::decode_error("ServerHelloDone carries a body"));
                }
                self.transcript.update(&msg.raw);
                self.on_server_hello_done(rng)
            }
            (State::AwaitFinished, HandshakeType::Finished) => self.on_server_finished(&msg),
            (state, msg_type) => Err(TlsError::unexpected_message(format!(
                "{msg_type:?} not expected in state {state:?}"
            ))),
        }
    }

    /// The server's change_cipher_spec arrived. Legal only after our own
    /// Finished went out.
    pub fn on_change_cipher_spec(&mut self) -> Result<(), TlsError> {
        if self.state != State::AwaitChangeCipherSpec {
            return Err(TlsError::unexpected_message(
                "change_cipher_spec out of order",
            ));
        }
        self.state = State::AwaitFinished;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Server flight
    // -----------------------------------------------------------------------

    fn on_server_hello(&mut self, body: &[u8]) -> Result<(), TlsError> {
        let sh = decode_server_hello(body)?;

        if sh.version != PROTOCOL_VERSION {
            return Err(TlsError::fatal(
                AlertDescription::ProtocolVersion,
                format!("server selected version 0x{:04x}", sh.version),
            ));
        }
        if sh.cipher_suite == CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV
            || !self.offered_suites.contains(&sh.cipher_suite)
        {
            return Err(TlsError::illegal_parameter(format!(
                "server selected unoffered cipher suite 0x{:04x}",
                sh.cipher_suite.0
            )));
        }
        if sh.compression_method != CompressionMethod::NULL {
            return Err(TlsError::illegal_parameter(
                "server selected a compression method we did not offer",
            ));
        }
        let mut seen_types: Vec<u16> = Vec::new();
        for ext in &sh.extensions {
            if seen_types.contains(&ext.extension_type) {
                return Err(TlsError::illegal_parameter(format!(
                    "duplicate server extension type {}",
                    ext.extension_type
                )));
            }
            seen_types.push(ext.extension_type);
            if ext.extension_type == Extension::RENEGOTIATION_INFO {
                // Answer to the SCSV. On a fresh connection the field must
                // hold the empty renegotiated_connection encoding.
                if ext.data != [0u8] {
                    return Err(TlsError::fatal(
                        AlertDescription::HandshakeFailure,
                        "renegotiation_info is not the empty encoding",
                    ));
                }
                self.secure_renegotiation = true;
                continue;
            }
            if !self.offered_extension_types.contains(&ext.extension_type) {
                return Err(TlsError::illegal_parameter(format!(
                    "server echoed unoffered extension type {}",
                    ext.extension_type
                )));
            }
        }
        if !self.secure_renegotiation {
            // Tolerated for legacy servers; the authentication callback sees
            // the flag and can decline.
            log::debug!("server did not acknowledge secure renegotiation");
        }

        let params = CipherSuiteParams::from_suite(sh.cipher_suite)?;
        log::debug!(
            "negotiated cipher suite 0x{:04x} ({:?})",
            sh.cipher_suite.0,
            params.key_exchange
        );
        self.server_random = sh.random;
        self.params = Some(params);
        self.state = State::AwaitServerFlight;
        Ok(())
    }

    fn negotiated(&self) -> Result<CipherSuiteParams, TlsError> {
        self.params
            .ok_or_else(|| TlsError::internal_error("no negotiated cipher suite"))
    }

    fn on_certificate(&mut self, body: &[u8]) -> Result<(), TlsError> {
        let alg = self.negotiated()?.key_exchange;
        if !alg.requires_server_certificate() {
            return Err(TlsError::unexpected_message(
                "Certificate not legal for this cipher suite",
            ));
        }
        if self.seen_certificate
            || self.server_key_exchange.is_some()
            || self.certificate_request.is_some()
        {
            return Err(TlsError::unexpected_message("Certificate out of order"));
        }

        let cert = decode_certificate(body)?;
        let Some(leaf) = cert.certificate_list.first() else {
            return Err(TlsError::fatal(
                AlertDescription::BadCertificate,
                "server sent an empty certificate chain",
            ));
        };

        if let Some(authenticator) = &self.config.server_authenticator {
            let identity = ServerIdentity {
                certificate_chain: &cert.certificate_list,
                secure_renegotiation: self.secure_renegotiation,
            };
            if !authenticator(&identity) {
                return Err(TlsError::fatal(
                    AlertDescription::BadCertificate,
                    "server certificate chain rejected",
                ));
            }
        }

        let key = extract_server_public_key(leaf, certificate_purpose(alg))?;
        self.server_public_key = Some(key);
        self.seen_certificate = true;
        Ok(())
    }

    fn on_server_key_exchange(&mut self, body: &[u8]) -> Result<(), TlsError> {
        let params = self.negotiated()?;
        let alg = params.key_exchange;

        if alg.server_key_exchange() == ServerKeyExchangeRule::Forbidden {
            return Err(TlsError::unexpected_message(
                "ServerKeyExchange is not legal for this cipher suite",
            ));
        }
        if self.server_key_exchange.is_some() || self.certificate_request.is_some() {
            return Err(TlsError::unexpected_message("ServerKeyExchange out of order"));
        }
        if alg.requires_server_certificate() && !self.seen_certificate {
            return Err(TlsError::unexpected_message(
                "ServerKeyExchange before Certificate",
            ));
        }

        let ske = decode_server_key_exchange(alg, body)?;

        if let Some(sig_alg) = alg.server_signature() {
            let key = self.server_public_key.as_ref().ok_or_else(|| {
                TlsError::unexpected_message("signed ServerKeyExchange without a certificate key")
            })?;
            let signed_params = ske.signed_params().ok_or_else(|| {
                TlsError::internal_error("signed family without signable parameters")
            })?;
            let signature = ske
                .signature()
                .ok_or_else(|| TlsError::decode_error("ServerKeyExchange missing signature"))?;
            let data = build_signed_data(&self.client_random, &self.server_random, &signed_params);
            verify_server_signature(sig_alg, key, &data, signature)?;
        }

        if let (Some(hint), Some(observer)) =
            (ske.identity_hint(), &self.config.psk_hint_observer)
        {
            observer(hint);
        }

        self.server_key_exchange = Some(ske);
        Ok(())
    }

    fn on_certificate_request(&mut self, body: &[u8]) -> Result<(), TlsError> {
        let alg = self.negotiated()?.key_exchange;
        if !alg.allows_certificate_request() {
            return Err(TlsError::unexpected_message(
                "CertificateRequest not legal for this cipher suite",
            ));
        }
        if !self.seen_certificate {
            return Err(TlsError::unexpected_message(
                "CertificateRequest before Certificate",
            ));
        }
        if self.certificate_request.is_some() {
            return Err(TlsError::unexpected_message("duplicate CertificateRequest"));
        }
        let request = decode_certificate_request(body)?;
        if request.cert_types.is_empty() {
            return Err(TlsError::decode_error("empty certificate type list"));
        }
        // rsa_sign .. dss_ephemeral_dh (RFC 2246) and the ECC types (RFC 4492).
        const REGISTERED_CERT_TYPES: [u8; 9] = [1, 2, 3, 4, 5, 6, 64, 65, 66];
        if let Some(&t) = request
            .cert_types
            .iter()
            .find(|t| !REGISTERED_CERT_TYPES.contains(t))
        {
            return Err(TlsError::illegal_parameter(format!(
                "unknown client certificate type {t}"
            )));
        }
        self.certificate_request = Some(request);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Client flight
    // -----------------------------------------------------------------------

    fn on_server_hello_done(
        &mut self,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Vec<HandshakeAction>, TlsError> {
        let params = self.negotiated()?;
        let alg = params.key_exchange;

        if alg.requires_server_certificate() && !self.seen_certificate {
            return Err(TlsError::unexpected_message(
                "ServerHelloDone without the required Certificate",
            ));
        }
        if alg.server_key_exchange() == ServerKeyExchangeRule::Required
            && self.server_key_exchange.is_none()
        {
            return Err(TlsError::unexpected_message(
                "ServerHelloDone without the required ServerKeyExchange",
            ));
        }

        let mut actions = Vec::new();

        // Certificate answer, if one was requested. An empty chain is the
        // "no certificate" reply.
        let mut send_certificate_verify = false;
        if let Some(request) = &self.certificate_request {
            let chain = match &self.config.client_credentials {
                Some(creds) if request.cert_types.contains(&creds.signer.cert_type()) => {
                    send_certificate_verify = !creds.certificate_chain.is_empty();
                    creds.certificate_chain.clone()
                }
                _ => vec![],
            };
            let encoded = encode_certificate(&CertificateMsg {
                certificate_list: chain,
            });
            self.transcript.update(&encoded);
            actions.push(HandshakeAction::SendHandshake(encoded));
        }

        // Key exchange.
        let inputs = ExchangeInputs {
            server_key_exchange: self.server_key_exchange.as_ref(),
            server_public_key: self.server_public_key.as_ref(),
            psk: self.config.psk.as_ref(),
            srp: self.config.srp.as_ref(),
        };
        let outcome = KeyExchange::for_suite(alg).perform(rng, &inputs)?;

        let encoded = encode_client_key_exchange(&outcome.client_key_exchange);
        self.transcript.update(&encoded);
        actions.push(HandshakeAction::SendHandshake(encoded));

        // CertificateVerify covers the transcript through ClientKeyExchange.
        if send_certificate_verify {
            if let Some(creds) = &self.config.client_credentials {
                let hash = self.transcript.current_hash();
                let signature = creds.signer.sign_certificate_verify(&hash)?;
                let encoded = encode_certificate_verify(&signature);
                self.transcript.update(&encoded);
                actions.push(HandshakeAction::SendHandshake(encoded));
            }
        }

        // Key derivation. The premaster is dropped (and wiped) here.
        let master = derive_master_secret(
            outcome.premaster.as_bytes(),
            &self.client_random,
            &self.server_random,
        )?;
        let keys = derive_key_block(&master, &self.client_random, &self.server_random, &params)?;
        self.master_secret = Some(master);
        self.keys = Some(keys);

        actions.push(HandshakeAction::SendChangeCipherSpec);

        // Client Finished: verify data is captured before the message itself
        // enters the transcript.
        let hash = self.transcript.current_hash();
        let verify_data = compute_verify_data(&master, "client finished", &hash)?;
        let encoded = encode_finished(&verify_data);
        self.transcript.update(&encoded);
        actions.push(HandshakeAction::SendHandshake(encoded));

        self.state = State::AwaitChangeCipherSpec;
        Ok(actions)
    }

    fn on_server_finished(
        &mut self,
        msg: &HandshakeMessage,
    ) -> Result<Vec<HandshakeAction>, TlsError> {
        let received = decode_finished(&msg.body)?;
        let master = self
            .master_secret
            .as_ref()
            .ok_or_else(|| TlsError::internal_error("Finished before key derivation"))?;

        let hash = self.transcript.current_hash();
        let expected = compute_verify_data(master, "server finished", &hash)?;
        if !bool::from(expected.ct_eq(&received)) {
            return Err(TlsError::decrypt_error(
                "server Finished verify data mismatch",
            ));
        }
        self.transcript.update(&msg.raw);

        log::debug!("handshake complete");
        self.state = State::Complete;
        Ok(vec![HandshakeAction::Complete])
    }
}

/// keyUsage bit the negotiated suite exercises on the leaf key.
fn certificate_purpose(alg: KeyExchangeAlg) -> KeyUsagePurpose {
    match alg {
        KeyExchangeAlg::Rsa | KeyExchangeAlg::RsaPsk => KeyUsagePurpose::KeyEncipherment,
        KeyExchangeAlg::DhDss
        | KeyExchangeAlg::DhRsa
        | KeyExchangeAlg::EcdhEcdsa
        | KeyExchangeAlg::EcdhRsa => KeyUsagePurpose::KeyAgreement,
        _ => KeyUsagePurpose::DigitalSignature,
    }
}
