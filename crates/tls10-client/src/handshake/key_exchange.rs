//! Client-side key exchange strategies.
//!
//! Each negotiated cipher suite maps to one strategy. After ServerHelloDone
//! the strategy consumes the server's parameters (ServerKeyExchange,
//! certificate public key, or configured secrets), produces the premaster
//! secret, and builds the ClientKeyExchange payload.

use num_bigint_dig::{prime, BigUint};
use rand_core::CryptoRngCore;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use sha1::{Digest, Sha1};
use zeroize::Zeroize;

use crate::cert::ServerPublicKey;
use crate::config::{PskIdentity, SrpIdentity};
use crate::crypt::KeyExchangeAlg;
use crate::PROTOCOL_VERSION;
use tls10_types::{AlertDescription, TlsError};

use super::codec_kx::{ClientKeyExchangeBody, ServerDhParams, ServerEcdhParams, ServerKeyExchange};

/// Minimum accepted finite-field group size, for both DH and SRP.
pub const MIN_FF_GROUP_BITS: usize = 1024;

const PRIME_TEST_ROUNDS: usize = 20;

/// Adapts the threaded `&mut dyn CryptoRngCore` to the sized generic bound
/// the rsa and p256 APIs take.
pub(crate) struct RngAdapter<'a>(pub &'a mut dyn CryptoRngCore);

impl rand_core::RngCore for RngAdapter<'_> {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }
    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest)
    }
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.0.try_fill_bytes(dest)
    }
}

impl rand_core::CryptoRng for RngAdapter<'_> {}

/// Premaster secret, wiped on drop.
#[derive(Debug)]
pub struct Premaster(Vec<u8>);

impl Premaster {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for Premaster {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// What a completed exchange hands back to the state machine.
#[derive(Debug)]
pub struct KeyExchangeOutcome {
    pub premaster: Premaster,
    pub client_key_exchange: ClientKeyExchangeBody,
}

/// Server-side material the strategy draws from.
pub struct ExchangeInputs<'a> {
    pub server_key_exchange: Option<&'a ServerKeyExchange>,
    pub server_public_key: Option<&'a ServerPublicKey>,
    pub psk: Option<&'a PskIdentity>,
    pub srp: Option<&'a SrpIdentity>,
}

/// PSK sub-strategy: what fills the other_secret half of the premaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PskExchange {
    Plain,
    Rsa,
    EphemeralDh,
}

/// Key exchange strategy, one variant per family the engine speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchange {
    Rsa,
    StaticDh,
    EphemeralDh,
    StaticEcdh,
    EphemeralEcdh,
    Srp,
    Psk(PskExchange),
}

impl KeyExchange {
    pub fn for_suite(alg: KeyExchangeAlg) -> Self {
        match alg {
            KeyExchangeAlg::Rsa => KeyExchange::Rsa,
            KeyExchangeAlg::DhDss | KeyExchangeAlg::DhRsa => KeyExchange::StaticDh,
            KeyExchangeAlg::DheDss | KeyExchangeAlg::DheRsa => KeyExchange::EphemeralDh,
            KeyExchangeAlg::EcdhEcdsa | KeyExchangeAlg::EcdhRsa => KeyExchange::StaticEcdh,
            KeyExchangeAlg::EcdheEcdsa | KeyExchangeAlg::EcdheRsa => KeyExchange::EphemeralEcdh,
            KeyExchangeAlg::Srp | KeyExchangeAlg::SrpRsa => KeyExchange::Srp,
            KeyExchangeAlg::Psk => KeyExchange::Psk(PskExchange::Plain),
            KeyExchangeAlg::RsaPsk => KeyExchange::Psk(PskExchange::Rsa),
            KeyExchangeAlg::DhePsk => KeyExchange::Psk(PskExchange::EphemeralDh),
        }
    }

    /// Run the exchange: derive the premaster secret and the
    /// ClientKeyExchange payload.
    pub fn perform(
        &self,
        rng: &mut dyn CryptoRngCore,
        inputs: &ExchangeInputs<'_>,
    ) -> Result<KeyExchangeOutcome, TlsError> {
        match self {
            KeyExchange::Rsa => rsa_exchange(rng, require_rsa_key(inputs)?),
            KeyExchange::StaticDh => {
                let params = match inputs.server_public_key {
                    Some(ServerPublicKey::Dh { p, g, public }) => ServerDhParams {
                        p: p.clone(),
                        g: g.clone(),
                        public: public.clone(),
                    },
                    _ => {
                        return Err(TlsError::unexpected_message(
                            "static DH suite without a DH certificate key",
                        ))
                    }
                };
                let (premaster, public) = dh_exchange(rng, &params)?;
                Ok(KeyExchangeOutcome {
                    premaster,
                    client_key_exchange: ClientKeyExchangeBody::DhPublic(public),
                })
            }
            KeyExchange::EphemeralDh => {
                let params = match inputs.server_key_exchange {
                    Some(ServerKeyExchange::Dh { params, .. }) => params,
                    _ => {
                        return Err(TlsError::unexpected_message(
                            "ephemeral DH suite without ServerKeyExchange parameters",
                        ))
                    }
                };
                let (premaster, public) = dh_exchange(rng, params)?;
                Ok(KeyExchangeOutcome {
                    premaster,
                    client_key_exchange: ClientKeyExchangeBody::DhPublic(public),
                })
            }
            KeyExchange::StaticEcdh => {
                let point = match inputs.server_public_key {
                    Some(ServerPublicKey::EcP256(key)) => key.to_sec1_bytes().to_vec(),
                    _ => {
                        return Err(TlsError::unexpected_message(
                            "static ECDH suite without an EC certificate key",
                        ))
                    }
                };
                let (premaster, public) = ecdh_exchange(rng, &point)?;
                Ok(KeyExchangeOutcome {
                    premaster,
                    client_key_exchange: ClientKeyExchangeBody::EcdhPoint(public),
                })
            }
            KeyExchange::EphemeralEcdh => {
                let params = match inputs.server_key_exchange {
                    Some(ServerKeyExchange::Ecdh { params, .. }) => params,
                    _ => {
                        return Err(TlsError::unexpected_message(
                            "ephemeral ECDH suite without ServerKeyExchange parameters",
                        ))
                    }
                };
                if params.named_curve != ServerEcdhParams::SECP256R1 {
                    return Err(TlsError::illegal_parameter(format!(
                        "unsupported named curve {}",
                        params.named_curve
                    )));
                }
                let (premaster, public) = ecdh_exchange(rng, &params.point)?;
                Ok(KeyExchangeOutcome {
                    premaster,
                    client_key_exchange: ClientKeyExchangeBody::EcdhPoint(public),
                })
            }
            KeyExchange::Srp => {
                let identity = inputs.srp.ok_or_else(|| {
                    TlsError::internal_error("SRP suite negotiated without SRP credentials")
                })?;
                let params = match inputs.server_key_exchange {
                    Some(ServerKeyExchange::Srp { params, .. }) => params,
                    _ => {
                        return Err(TlsError::unexpected_message(
                            "SRP suite without ServerKeyExchange parameters",
                        ))
                    }
                };
                srp_exchange(rng, identity, params)
            }
            KeyExchange::Psk(inner) => {
                let identity = inputs.psk.ok_or_else(|| {
                    TlsError::internal_error("PSK suite negotiated without a configured key")
                })?;
                psk_exchange(rng, *inner, identity, inputs)
            }
        }
    }
}

fn require_rsa_key<'a>(inputs: &ExchangeInputs<'a>) -> Result<&'a RsaPublicKey, TlsError> {
    match inputs.server_public_key {
        Some(ServerPublicKey::Rsa(key)) => Ok(key),
        _ => Err(TlsError::unexpected_message(
            "RSA key transport without an RSA certificate key",
        )),
    }
}

// ---------------------------------------------------------------------------
// RSA key transport
// ---------------------------------------------------------------------------

/// Premaster = offered_version(2) || 46 random bytes, encrypted under the
/// server's RSA key with PKCS#1 v1.5.
fn rsa_exchange(
    rng: &mut dyn CryptoRngCore,
    server_key: &RsaPublicKey,
) -> Result<KeyExchangeOutcome, TlsError> {
    let (premaster, encrypted) = rsa_encrypted_premaster(rng, server_key)?;
    Ok(KeyExchangeOutcome {
        premaster,
        client_key_exchange: ClientKeyExchangeBody::RsaEncryptedPremaster(encrypted),
    })
}

fn rsa_encrypted_premaster(
    rng: &mut dyn CryptoRngCore,
    server_key: &RsaPublicKey,
) -> Result<(Premaster, Vec<u8>), TlsError> {
    let mut premaster = vec![0u8; 48];
    premaster[..2].copy_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    rng.fill_bytes(&mut premaster[2..]);

    let encrypted = server_key
        .encrypt(&mut RngAdapter(rng), Pkcs1v15Encrypt, &premaster)
        .map_err(|_| TlsError::internal_error("RSA premaster encryption failed"))?;
    Ok((Premaster::new(premaster), encrypted))
}

// ---------------------------------------------------------------------------
// Finite-field Diffie-Hellman
// ---------------------------------------------------------------------------

fn validate_dh_group(p: &BigUint, g: &BigUint, server_public: &BigUint) -> Result<(), TlsError> {
    if p.bits() < MIN_FF_GROUP_BITS {
        return Err(TlsError::fatal(
            AlertDescription::InsufficientSecurity,
            format!("DH modulus of {} bits below minimum", p.bits()),
        ));
    }
    if !prime::probably_prime(p, PRIME_TEST_ROUNDS) {
        return Err(TlsError::illegal_parameter("DH modulus is not prime"));
    }
    let two = BigUint::from(2u32);
    if g < &two || g > &(p - &two) {
        return Err(TlsError::illegal_parameter("DH generator out of range"));
    }
    if server_public <= &BigUint::from(1u32) || server_public >= &(p - 1u32) {
        return Err(TlsError::illegal_parameter("DH server public out of range"));
    }
    Ok(())
}

/// Random private exponent in [2, p-2].
fn random_exponent(rng: &mut dyn CryptoRngCore, p: &BigUint) -> BigUint {
    let mut bytes = vec![0u8; (p.bits() + 7) / 8];
    rng.fill_bytes(&mut bytes);
    let raw = BigUint::from_bytes_be(&bytes);
    (raw % (p - 3u32)) + 2u32
}

/// Classic DH: premaster is the shared value with leading zero bytes
/// stripped (RFC 2246 §8.1.2).
fn dh_exchange(
    rng: &mut dyn CryptoRngCore,
    params: &ServerDhParams,
) -> Result<(Premaster, Vec<u8>), TlsError> {
    let p = BigUint::from_bytes_be(&params.p);
    let g = BigUint::from_bytes_be(&params.g);
    let server_public = BigUint::from_bytes_be(&params.public);
    validate_dh_group(&p, &g, &server_public)?;

    let x = random_exponent(rng, &p);
    let client_public = g.modpow(&x, &p);
    let shared = server_public.modpow(&x, &p);

    Ok((
        Premaster::new(shared.to_bytes_be()),
        client_public.to_bytes_be(),
    ))
}

// ---------------------------------------------------------------------------
// Elliptic-curve Diffie-Hellman (P-256)
// ---------------------------------------------------------------------------

/// ECDH over P-256: premaster is the x-coordinate of the shared point
/// (RFC 4492 §5.10), client point sent uncompressed.
fn ecdh_exchange(
    rng: &mut dyn CryptoRngCore,
    server_point: &[u8],
) -> Result<(Premaster, Vec<u8>), TlsError> {
    let peer = p256::PublicKey::from_sec1_bytes(server_point)
        .map_err(|_| TlsError::illegal_parameter("server EC point is not on the curve"))?;

    let secret = p256::ecdh::EphemeralSecret::random(&mut RngAdapter(rng));
    let client_point = secret.public_key().to_sec1_bytes().to_vec();
    let shared = secret.diffie_hellman(&peer);

    Ok((
        Premaster::new(shared.raw_secret_bytes().to_vec()),
        client_point,
    ))
}

// ---------------------------------------------------------------------------
// SRP (RFC 5054)
// ---------------------------------------------------------------------------

/// Left-pad to the length of N.
fn srp_pad(value: &BigUint, n_len: usize) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    let mut out = vec![0u8; n_len.saturating_sub(bytes.len())];
    out.extend_from_slice(&bytes);
    out
}

fn sha1_concat(parts: &[&[u8]]) -> Vec<u8> {
    let mut h = Sha1::new();
    for part in parts {
        h.update(part);
    }
    h.finalize().to_vec()
}

/// SRP-6a client computation for TLS (RFC 5054 §2.5.4, §2.6).
///
/// ```text
/// x = SHA1(s | SHA1(I | ":" | P))
/// k = SHA1(N | PAD(g))      u = SHA1(PAD(A) | PAD(B))
/// A = g^a % N               S = (B - k * g^x) ^ (a + u * x) % N
/// premaster = S with leading zeros stripped
/// ```
fn srp_exchange(
    rng: &mut dyn CryptoRngCore,
    identity: &SrpIdentity,
    params: &super::codec_kx::ServerSrpParams,
) -> Result<KeyExchangeOutcome, TlsError> {
    let n = BigUint::from_bytes_be(&params.n);
    let g = BigUint::from_bytes_be(&params.g);
    let b_public = BigUint::from_bytes_be(&params.b_public);

    if n.bits() < MIN_FF_GROUP_BITS {
        return Err(TlsError::fatal(
            AlertDescription::InsufficientSecurity,
            format!("SRP modulus of {} bits below minimum", n.bits()),
        ));
    }
    if !prime::probably_prime(&n, PRIME_TEST_ROUNDS) {
        return Err(TlsError::illegal_parameter("SRP modulus is not prime"));
    }
    let two = BigUint::from(2u32);
    if g < two || g > &n - 2u32 {
        return Err(TlsError::illegal_parameter("SRP generator out of range"));
    }
    if (&b_public % &n) == BigUint::from(0u32) {
        return Err(TlsError::illegal_parameter("SRP server public B % N == 0"));
    }

    let n_len = params.n.len();

    let inner = sha1_concat(&[identity.username.as_bytes(), b":", &identity.password]);
    let x = BigUint::from_bytes_be(&sha1_concat(&[&params.salt, &inner]));
    let k = BigUint::from_bytes_be(&sha1_concat(&[&params.n, &srp_pad(&g, n_len)]));

    let a = random_exponent(rng, &n);
    let a_public = g.modpow(&a, &n);

    let u = BigUint::from_bytes_be(&sha1_concat(&[
        &srp_pad(&a_public, n_len),
        &srp_pad(&b_public, n_len),
    ]));
    if u == BigUint::from(0u32) {
        return Err(TlsError::illegal_parameter("SRP scrambling parameter is zero"));
    }

    // S = (B - k * g^x) ^ (a + u * x) % N, with the subtraction kept positive.
    let v = g.modpow(&x, &n);
    let kv = (&k * &v) % &n;
    let base = ((&b_public % &n) + (&n - kv)) % &n;
    let exponent = &a + &u * &x;
    let shared = base.modpow(&exponent, &n);

    Ok(KeyExchangeOutcome {
        premaster: Premaster::new(shared.to_bytes_be()),
        client_key_exchange: ClientKeyExchangeBody::SrpPublic(a_public.to_bytes_be()),
    })
}

// ---------------------------------------------------------------------------
// Pre-shared key (RFC 4279)
// ---------------------------------------------------------------------------

/// premaster = len(other_secret) || other_secret || len(psk) || psk,
/// both lengths as uint16.
fn psk_premaster(other_secret: &[u8], psk: &[u8]) -> Premaster {
    let mut out = Vec::with_capacity(4 + other_secret.len() + psk.len());
    out.extend_from_slice(&(other_secret.len() as u16).to_be_bytes());
    out.extend_from_slice(other_secret);
    out.extend_from_slice(&(psk.len() as u16).to_be_bytes());
    out.extend_from_slice(psk);
    Premaster::new(out)
}

fn psk_exchange(
    rng: &mut dyn CryptoRngCore,
    inner: PskExchange,
    identity: &PskIdentity,
    inputs: &ExchangeInputs<'_>,
) -> Result<KeyExchangeOutcome, TlsError> {
    match inner {
        PskExchange::Plain => {
            // other_secret is all zeros, the same length as the key.
            let zeros = vec![0u8; identity.key.len()];
            Ok(KeyExchangeOutcome {
                premaster: psk_premaster(&zeros, &identity.key),
                client_key_exchange: ClientKeyExchangeBody::Psk {
                    identity: identity.identity.clone(),
                },
            })
        }
        PskExchange::Rsa => {
            let server_key = require_rsa_key(inputs)?;
            let (rsa_premaster, encrypted) = rsa_encrypted_premaster(rng, server_key)?;
            Ok(KeyExchangeOutcome {
                premaster: psk_premaster(rsa_premaster.as_bytes(), &identity.key),
                client_key_exchange: ClientKeyExchangeBody::RsaPsk {
                    identity: identity.identity.clone(),
                    encrypted_premaster: encrypted,
                },
            })
        }
        PskExchange::EphemeralDh => {
            let params = match inputs.server_key_exchange {
                Some(ServerKeyExchange::DhePsk { params, .. }) => params,
                _ => {
                    return Err(TlsError::unexpected_message(
                        "DHE_PSK suite without ServerKeyExchange parameters",
                    ))
                }
            };
            let (dh_premaster, public) = dh_exchange(rng, params)?;
            Ok(KeyExchangeOutcome {
                premaster: psk_premaster(dh_premaster.as_bytes(), &identity.key),
                client_key_exchange: ClientKeyExchangeBody::DhePsk {
                    identity: identity.identity.clone(),
                    public,
                },
            })
        }
    }
}
