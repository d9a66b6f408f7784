//! TLS 1.0 PRF (RFC 2246 §5).
//!
//! ```text
//! PRF(secret, label, seed) = P_MD5(S1, label + seed) XOR P_SHA1(S2, label + seed)
//!
//! P_hash(secret, seed) = HMAC_hash(secret, A(1) + seed) ||
//!                        HMAC_hash(secret, A(2) + seed) || ...
//! A(0) = seed
//! A(i) = HMAC_hash(secret, A(i-1))
//! ```
//!
//! S1 and S2 are the first and last `ceil(len/2)` bytes of the secret and
//! overlap by one byte when the secret length is odd.

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use tls10_types::TlsError;

fn hmac_once<M>(key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, TlsError>
where
    M: Mac + KeyInit,
{
    let mut mac = <M as Mac>::new_from_slice(key)
        .map_err(|_| TlsError::internal_error("HMAC key rejected"))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

/// P_hash expansion for one half of the PRF.
fn p_hash<M>(secret: &[u8], seed: &[u8], output_len: usize) -> Result<Vec<u8>, TlsError>
where
    M: Mac + KeyInit,
{
    let mut result = Vec::with_capacity(output_len);

    // A(0) = seed
    let mut a = seed.to_vec();

    while result.len() < output_len {
        // A(i) = HMAC_hash(secret, A(i-1))
        a = hmac_once::<M>(secret, &[&a])?;
        let block = hmac_once::<M>(secret, &[&a, seed])?;
        result.extend_from_slice(&block);
    }

    result.truncate(output_len);
    Ok(result)
}

/// TLS 1.0 PRF: derive `output_len` bytes from `secret`, `label`, and `seed`.
pub fn prf(
    secret: &[u8],
    label: &str,
    seed: &[u8],
    output_len: usize,
) -> Result<Vec<u8>, TlsError> {
    let mut label_seed = Vec::with_capacity(label.len() + seed.len());
    label_seed.extend_from_slice(label.as_bytes());
    label_seed.extend_from_slice(seed);

    let half = secret.len().div_ceil(2);
    let s1 = &secret[..half];
    let s2 = &secret[secret.len() - half..];

    let md5_out = p_hash::<Hmac<Md5>>(s1, &label_seed, output_len)?;
    let sha_out = p_hash::<Hmac<Sha1>>(s2, &label_seed, output_len)?;

    Ok(md5_out
        .iter()
        .zip(sha_out.iter())
        .map(|(a, b)| a ^ b)
        .collect())
}
