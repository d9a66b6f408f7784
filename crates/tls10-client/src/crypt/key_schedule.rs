//! Master secret and key block derivation (RFC 2246 §6.3, §8.1).

use zeroize::Zeroize;

use super::prf::prf;
use super::transcript::TRANSCRIPT_HASH_LEN;
use super::CipherSuiteParams;
use tls10_types::TlsError;

pub const MASTER_SECRET_LEN: usize = 48;
pub const VERIFY_DATA_LEN: usize = 12;

/// Derive the 48-byte master secret from a premaster secret.
///
/// ```text
/// master_secret = PRF(pre_master_secret, "master secret",
///                     ClientHello.random + ServerHello.random)[0..47]
/// ```
pub fn derive_master_secret(
    premaster: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Result<[u8; MASTER_SECRET_LEN], TlsError> {
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(client_random);
    seed[32..].copy_from_slice(server_random);

    let mut out = prf(premaster, "master secret", &seed, MASTER_SECRET_LEN)?;
    let mut master = [0u8; MASTER_SECRET_LEN];
    master.copy_from_slice(&out);
    out.zeroize();
    Ok(master)
}

/// Directional key material sliced out of the expanded key block.
///
/// IVs are empty for stream suites.
pub struct KeyBlock {
    pub client_mac_key: Vec<u8>,
    pub server_mac_key: Vec<u8>,
    pub client_key: Vec<u8>,
    pub server_key: Vec<u8>,
    pub client_iv: Vec<u8>,
    pub server_iv: Vec<u8>,
}

impl Drop for KeyBlock {
    fn drop(&mut self) {
        self.client_mac_key.zeroize();
        self.server_mac_key.zeroize();
        self.client_key.zeroize();
        self.server_key.zeroize();
        self.client_iv.zeroize();
        self.server_iv.zeroize();
    }
}

/// Expand the master secret into per-direction keys.
///
/// ```text
/// key_block = PRF(master_secret, "key expansion",
///                 ServerHello.random + ClientHello.random)
/// ```
///
/// sliced in the fixed order client_write_MAC_secret, server_write_MAC_secret,
/// client_write_key, server_write_key, client_write_IV, server_write_IV.
pub fn derive_key_block(
    master_secret: &[u8; MASTER_SECRET_LEN],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    params: &CipherSuiteParams,
) -> Result<KeyBlock, TlsError> {
    // Note the reversed random order relative to the master secret.
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(server_random);
    seed[32..].copy_from_slice(client_random);

    let mut block = prf(master_secret, "key expansion", &seed, params.key_block_len())?;

    let mac_len = params.mac_len();
    let key_len = params.key_len();
    let iv_len = params.iv_len();

    let mut pos = 0;
    let mut take = |len: usize| {
        let slice = block[pos..pos + len].to_vec();
        pos += len;
        slice
    };

    let kb = KeyBlock {
        client_mac_key: take(mac_len),
        server_mac_key: take(mac_len),
        client_key: take(key_len),
        server_key: take(key_len),
        client_iv: take(iv_len),
        server_iv: take(iv_len),
    };
    block.zeroize();
    Ok(kb)
}

/// Finished message verify data over the 36-byte transcript hash.
///
/// `label` is "client finished" or "server finished".
pub fn compute_verify_data(
    master_secret: &[u8; MASTER_SECRET_LEN],
    label: &str,
    transcript_hash: &[u8; TRANSCRIPT_HASH_LEN],
) -> Result<[u8; VERIFY_DATA_LEN], TlsError> {
    let out = prf(master_secret, label, transcript_hash, VERIFY_DATA_LEN)?;
    let mut verify = [0u8; VERIFY_DATA_LEN];
    verify.copy_from_slice(&out);
    Ok(verify)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CipherSuite;

    fn test_params() -> CipherSuiteParams {
        CipherSuiteParams::from_suite(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA).unwrap()
    }

    #[test]
    fn test_master_secret_length_and_determinism() {
        let pm = [0x11u8; 48];
        let cr = [0x22u8; 32];
        let sr = [0x33u8; 32];
        let m1 = derive_master_secret(&pm, &cr, &sr).unwrap();
        let m2 = derive_master_secret(&pm, &cr, &sr).unwrap();
        assert_eq!(m1, m2);
        assert_eq!(m1.len(), 48);
    }

    #[test]
    fn test_master_secret_random_order() {
        // Swapping client and server randoms must change the output: the seed
        // is client_random || server_random, not a symmetric mix.
        let pm = [0x11u8; 48];
        let cr = [0x22u8; 32];
        let sr = [0x33u8; 32];
        let forward = derive_master_secret(&pm, &cr, &sr).unwrap();
        let swapped = derive_master_secret(&pm, &sr, &cr).unwrap();
        assert_ne!(forward, swapped);
    }

    #[test]
    fn test_key_block_slicing() {
        let master = [0x42u8; 48];
        let cr = [1u8; 32];
        let sr = [2u8; 32];
        let params = test_params();
        let kb = derive_key_block(&master, &cr, &sr, &params).unwrap();

        assert_eq!(kb.client_mac_key.len(), 20);
        assert_eq!(kb.server_mac_key.len(), 20);
        assert_eq!(kb.client_key.len(), 16);
        assert_eq!(kb.server_key.len(), 16);
        assert_eq!(kb.client_iv.len(), 16);
        assert_eq!(kb.server_iv.len(), 16);

        // Slices must be consecutive ranges of one PRF output: reconstruct
        // the raw block and compare.
        let mut seed = Vec::new();
        seed.extend_from_slice(&sr);
        seed.extend_from_slice(&cr);
        let raw = prf(&master, "key expansion", &seed, params.key_block_len()).unwrap();
        let mut rebuilt = Vec::new();
        rebuilt.extend_from_slice(&kb.client_mac_key);
        rebuilt.extend_from_slice(&kb.server_mac_key);
        rebuilt.extend_from_slice(&kb.client_key);
        rebuilt.extend_from_slice(&kb.server_key);
        rebuilt.extend_from_slice(&kb.client_iv);
        rebuilt.extend_from_slice(&kb.server_iv);
        assert_eq!(rebuilt, raw);
    }

    #[test]
    fn test_key_block_stream_suite_no_ivs() {
        let master = [0x42u8; 48];
        let params =
            CipherSuiteParams::from_suite(CipherSuite::TLS_RSA_WITH_RC4_128_SHA).unwrap();
        let kb = derive_key_block(&master, &[0u8; 32], &[0u8; 32], &params).unwrap();
        assert!(kb.client_iv.is_empty());
        assert!(kb.server_iv.is_empty());
        assert_eq!(kb.client_key.len(), 16);
    }

    #[test]
    fn test_verify_data_labels_differ() {
        let master = [0x77u8; 48];
        let hash = [0x99u8; 36];
        let client = compute_verify_data(&master, "client finished", &hash).unwrap();
        let server = compute_verify_data(&master, "server finished", &hash).unwrap();
        assert_eq!(client.len(), 12);
        assert_ne!(client, server);
    }
}
