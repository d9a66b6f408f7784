//! Blocking TLS 1.0 client connection over any `Read + Write` transport.
//!
//! `connect()` drives the handshake to completion; afterwards `read` and
//! `write` move application data. Any fatal condition sends the matching
//! alert, closes the connection permanently, and surfaces the error.

use std::io::{Read, Write};
use std::sync::Arc;

use rand_core::CryptoRngCore;

use crate::config::TlsConfig;
use crate::crypt::CipherSuiteParams;
use crate::handshake::client::{ClientHandshake, HandshakeAction};
use crate::handshake::{HandshakeType, MessageReassembler};
use crate::record::{ContentType, RecordLayer};
use tls10_types::{Alert, AlertDescription, AlertLevel, TlsError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Idle,
    Handshaking,
    Established,
    Closed,
}

/// A TLS 1.0 client connection.
pub struct TlsClientConnection<S: Read + Write> {
    io: S,
    config: Arc<TlsConfig>,
    rng: Box<dyn CryptoRngCore>,
    record_layer: RecordLayer,
    reassembler: MessageReassembler,
    handshake: Option<ClientHandshake>,
    params: Option<CipherSuiteParams>,
    state: ConnectionState,
    /// Decrypted application bytes not yet handed to the caller.
    read_buffer: Vec<u8>,
    sent_first_application_record: bool,
    close_notify_sent: bool,
}

impl<S: Read + Write> TlsClientConnection<S> {
    pub fn new(io: S, config: Arc<TlsConfig>, rng: Box<dyn CryptoRngCore>) -> Self {
        Self {
            io,
            config,
            rng,
            record_layer: RecordLayer::new(),
            reassembler: MessageReassembler::new(),
            handshake: None,
            params: None,
            state: ConnectionState::Idle,
            read_buffer: Vec::new(),
            sent_first_application_record: false,
            close_notify_sent: false,
        }
    }

    /// Run the handshake to completion. Callable exactly once.
    pub fn connect(&mut self) -> Result<(), TlsError> {
        if self.state != ConnectionState::Idle {
            return Err(TlsError::internal_error("connect() called twice"));
        }
        self.state = ConnectionState::Handshaking;
        match self.run_handshake() {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Write application data. Blocks until all records are on the wire.
    pub fn write(&mut self, data: &[u8]) -> Result<(), TlsError> {
        if self.state != ConnectionState::Established {
            return Err(TlsError::Closed);
        }

        // First application record on a CBC suite is empty: the attacker
        // never sees a chained IV encrypt predictable plaintext.
        if !self.sent_first_application_record {
            self.sent_first_application_record = true;
            if self.params.map(|p| p.bulk.is_block()).unwrap_or(false) {
                if let Err(err) = self.record_layer.write_data(
                    &mut self.io,
                    self.rng.as_mut(),
                    ContentType::ApplicationData,
                    &[],
                ) {
                    return Err(self.fail(err));
                }
            }
        }

        if data.is_empty() {
            return Ok(());
        }
        match self.record_layer.write_data(
            &mut self.io,
            self.rng.as_mut(),
            ContentType::ApplicationData,
            data,
        ) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Read decrypted application data into `buf`. Returns 0 after the peer
    /// closed the connection cleanly.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, TlsError> {
        loop {
            if !self.read_buffer.is_empty() {
                let n = self.read_buffer.len().min(buf.len());
                buf[..n].copy_from_slice(&self.read_buffer[..n]);
                self.read_buffer.drain(..n);
                return Ok(n);
            }
            if self.state == ConnectionState::Closed {
                return Ok(0);
            }
            if self.state != ConnectionState::Established {
                return Err(TlsError::Closed);
            }

            let (content_type, payload) = match self.record_layer.read_record(&mut self.io) {
                Ok(record) => record,
                Err(err) => return Err(self.fail(err)),
            };
            match content_type {
                ContentType::ApplicationData => {
                    // An empty record (peer countermeasure) just loops.
                    self.read_buffer.extend_from_slice(&payload);
                }
                ContentType::Alert => {
                    if let Err(err) = self.handle_alert(&payload) {
                        return Err(err);
                    }
                }
                ContentType::Handshake => {
                    if let Err(err) = self.handle_post_handshake_message(&payload) {
                        return Err(self.fail(err));
                    }
                }
                ContentType::ChangeCipherSpec => {
                    return Err(self.fail(TlsError::unexpected_message(
                        "change_cipher_spec outside a handshake",
                    )));
                }
            }
        }
    }

    /// Send close_notify and close the connection.
    pub fn shutdown(&mut self) -> Result<(), TlsError> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        if let Err(err) = self.send_alert(AlertLevel::Warning, AlertDescription::CloseNotify) {
            return Err(self.fail(err));
        }
        self.close_notify_sent = true;
        self.state = ConnectionState::Closed;
        Ok(())
    }

    pub fn is_established(&self) -> bool {
        self.state == ConnectionState::Established
    }

    /// Release the underlying transport.
    pub fn into_inner(self) -> S {
        self.io
    }

    // -----------------------------------------------------------------------
    // Handshake loop
    // -----------------------------------------------------------------------

    fn run_handshake(&mut self) -> Result<(), TlsError> {
        let mut hs = ClientHandshake::new(self.config.clone());
        let client_hello = hs.start(self.rng.as_mut())?;
        self.record_layer.write_data(
            &mut self.io,
            self.rng.as_mut(),
            ContentType::Handshake,
            &client_hello,
        )?;
        self.handshake = Some(hs);

        while self.state == ConnectionState::Handshaking {
            let (content_type, payload) = self.record_layer.read_record(&mut self.io)?;
            match content_type {
                ContentType::Handshake => {
                    self.reassembler.push(&payload);
                    self.drain_handshake_messages()?;
                }
                ContentType::ChangeCipherSpec => self.handle_change_cipher_spec(&payload)?,
                ContentType::Alert => self.handle_alert(&payload)?,
                ContentType::ApplicationData => {
                    return Err(TlsError::unexpected_message(
                        "application data during the handshake",
                    ));
                }
            }
        }
        Ok(())
    }

    fn drain_handshake_messages(&mut self) -> Result<(), TlsError> {
        while let Some(msg) = self.reassembler.next_message()? {
            let actions = {
                let hs = self.handshake.as_mut().ok_or_else(|| {
                    TlsError::unexpected_message("handshake message after completion")
                })?;
                hs.handle_message(self.rng.as_mut(), msg)?
            };
            for action in actions {
                self.execute(action)?;
            }
        }
        Ok(())
    }

    fn execute(&mut self, action: HandshakeAction) -> Result<(), TlsError> {
        match action {
            HandshakeAction::SendHandshake(bytes) => self.record_layer.write_data(
                &mut self.io,
                self.rng.as_mut(),
                ContentType::Handshake,
                &bytes,
            ),
            HandshakeAction::SendChangeCipherSpec => {
                self.record_layer.write_data(
                    &mut self.io,
                    self.rng.as_mut(),
                    ContentType::ChangeCipherSpec,
                    &[0x01],
                )?;
                let hs = self
                    .handshake
                    .as_ref()
                    .ok_or_else(|| TlsError::internal_error("no active handshake"))?;
                let params = *hs
                    .cipher_params()
                    .ok_or_else(|| TlsError::internal_error("keys not derived"))?;
                let keys = hs
                    .key_block()
                    .ok_or_else(|| TlsError::internal_error("keys not derived"))?;
                self.record_layer.activate_write_protection(&params, keys)
            }
            HandshakeAction::Complete => {
                let hs = self
                    .handshake
                    .take()
                    .ok_or_else(|| TlsError::internal_error("no active handshake"))?;
                self.params = hs.cipher_params().copied();
                self.state = ConnectionState::Established;
                Ok(())
            }
        }
    }

    fn handle_change_cipher_spec(&mut self, payload: &[u8]) -> Result<(), TlsError> {
        if payload != [0x01] {
            return Err(TlsError::decode_error("malformed change_cipher_spec"));
        }
        // A handshake message must not straddle the cipher change.
        if self.reassembler.has_pending() {
            return Err(TlsError::unexpected_message(
                "change_cipher_spec interleaved with a partial handshake message",
            ));
        }
        let hs = self
            .handshake
            .as_mut()
            .ok_or_else(|| TlsError::unexpected_message("change_cipher_spec outside a handshake"))?;
        hs.on_change_cipher_spec()?;
        let params = *hs
            .cipher_params()
            .ok_or_else(|| TlsError::internal_error("keys not derived"))?;
        let keys = hs
            .key_block()
            .ok_or_else(|| TlsError::internal_error("keys not derived"))?;
        self.record_layer.activate_read_protection(&params, keys)
    }

    // -----------------------------------------------------------------------
    // Alerts and post-handshake messages
    // -----------------------------------------------------------------------

    fn handle_alert(&mut self, payload: &[u8]) -> Result<(), TlsError> {
        let alert = parse_alert(payload).map_err(|err| self.fail(err))?;
        match (alert.level, alert.description) {
            (_, AlertDescription::CloseNotify) => {
                // Orderly shutdown: answer in kind and stop.
                if !self.close_notify_sent {
                    let _ = self.send_alert(AlertLevel::Warning, AlertDescription::CloseNotify);
                    self.close_notify_sent = true;
                }
                self.state = ConnectionState::Closed;
                if self.handshake.is_some() {
                    // Mid-handshake closure is not orderly for the caller.
                    return Err(TlsError::Closed);
                }
                Ok(())
            }
            (AlertLevel::Fatal, description) => {
                log::warn!("fatal alert from peer: {description:?}");
                self.state = ConnectionState::Closed;
                Err(TlsError::PeerAlert(description))
            }
            (AlertLevel::Warning, description) => {
                log::debug!("warning alert from peer: {description:?}");
                Ok(())
            }
        }
    }

    fn handle_post_handshake_message(&mut self, payload: &[u8]) -> Result<(), TlsError> {
        self.reassembler.push(payload);
        while let Some(msg) = self.reassembler.next_message()? {
            if msg.msg_type != HandshakeType::HelloRequest {
                return Err(TlsError::unexpected_message(format!(
                    "{:?} after handshake completion",
                    msg.msg_type
                )));
            }
            // Renegotiation is declined, politely.
            self.send_alert(AlertLevel::Warning, AlertDescription::NoRenegotiation)?;
        }
        Ok(())
    }

    fn send_alert(
        &mut self,
        level: AlertLevel,
        description: AlertDescription,
    ) -> Result<(), TlsError> {
        self.record_layer.write_data(
            &mut self.io,
            self.rng.as_mut(),
            ContentType::Alert,
            &[level as u8, description as u8],
        )
    }

    /// Send the matching fatal alert (best effort) and close permanently.
    fn fail(&mut self, err: TlsError) -> TlsError {
        if let Some(description) = err.alert_to_send() {
            let _ = self.send_alert(AlertLevel::Fatal, description);
        }
        self.state = ConnectionState::Closed;
        self.handshake = None;
        err
    }
}

fn parse_alert(payload: &[u8]) -> Result<Alert, TlsError> {
    if payload.len() != 2 {
        return Err(TlsError::decode_error("alert record must be 2 bytes"));
    }
    let level = AlertLevel::from_u8(payload[0])
        .map_err(|v| TlsError::decode_error(format!("unknown alert level {v}")))?;
    let description = AlertDescription::from_u8(payload[1])
        .map_err(|v| TlsError::decode_error(format!("unknown alert description {v}")))?;
    Ok(Alert { level, description })
}
