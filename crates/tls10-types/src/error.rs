//! Error taxonomy for the TLS 1.0 client engine.
//!
//! Every protocol or cryptographic failure carries the fatal alert that must
//! be sent before closing. Only the connection driver converts an error into
//! "send alert, close the transport".

use crate::alert::AlertDescription;

/// TLS protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// A local fatal condition. The alert description is sent to the peer
    /// before the connection is torn down.
    #[error("fatal: {alert:?} ({reason})")]
    Fatal {
        alert: AlertDescription,
        reason: String,
    },
    /// The peer sent a fatal alert.
    #[error("fatal alert received from peer: {0:?}")]
    PeerAlert(AlertDescription),
    /// Orderly closure: close_notify was sent or received, or the connection
    /// was used after it entered the closed state.
    #[error("connection closed")]
    Closed,
    /// Transport failure on the underlying byte channel.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TlsError {
    pub fn fatal(alert: AlertDescription, reason: impl Into<String>) -> Self {
        TlsError::Fatal {
            alert,
            reason: reason.into(),
        }
    }

    /// Out-of-state or otherwise illegal message.
    pub fn unexpected_message(reason: impl Into<String>) -> Self {
        Self::fatal(AlertDescription::UnexpectedMessage, reason)
    }

    /// A field value outside its legal range or not among what was offered.
    pub fn illegal_parameter(reason: impl Into<String>) -> Self {
        Self::fatal(AlertDescription::IllegalParameter, reason)
    }

    /// Malformed wire structure (truncated or inconsistent lengths).
    pub fn decode_error(reason: impl Into<String>) -> Self {
        Self::fatal(AlertDescription::DecodeError, reason)
    }

    /// Signature or Finished verification failure. The reason must never
    /// distinguish the root cause beyond the message it occurred in.
    pub fn decrypt_error(reason: impl Into<String>) -> Self {
        Self::fatal(AlertDescription::DecryptError, reason)
    }

    /// Record decryption failure. Deliberately generic: padding and MAC
    /// failures are indistinguishable.
    pub fn bad_record_mac() -> Self {
        Self::fatal(AlertDescription::BadRecordMac, "bad record MAC")
    }

    /// A condition only reachable through an implementation defect.
    pub fn internal_error(reason: impl Into<String>) -> Self {
        Self::fatal(AlertDescription::InternalError, reason)
    }

    /// The fatal alert to send for this error, if any.
    pub fn alert_to_send(&self) -> Option<AlertDescription> {
        match self {
            TlsError::Fatal { alert, .. } => Some(*alert),
            TlsError::PeerAlert(_) | TlsError::Closed | TlsError::Io(_) => None,
        }
    }
}
