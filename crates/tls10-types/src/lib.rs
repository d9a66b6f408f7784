#![forbid(unsafe_code)]
#![doc = "Shared types for the tls10 client protocol engine."]

pub mod alert;
pub mod error;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub use error::TlsError;
