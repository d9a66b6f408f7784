//! TLS 1.0 CBC MAC-then-encrypt record protection (RFC 2246 §6.2.3.2).
//!
//! ```text
//! fragment = CBC-encrypt(plaintext || MAC || padding || padding_length)
//! ```
//!
//! TLS 1.0 has no explicit IV: the first record is chained off the IV from
//! the key block, and every later record is chained off the last ciphertext
//! block of the previous record.
//!
//! Padding bytes all carry the value `padding_length`, and the sender may
//! add up to `255 - base` extra padding bytes in whole blocks to mask the
//! true plaintext length. The receiver validates padding and MAC without
//! revealing which of the two failed: the only error is bad_record_mac, and
//! the number of MAC compression invocations is the same whether the padding
//! was valid or not.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256};
use hmac::{Hmac, Mac};
use md5::Md5;
use rand_core::CryptoRngCore;
use sha1::Sha1;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::{compute_record_mac, ContentType, MAX_CIPHERTEXT_LENGTH, MAX_PLAINTEXT_LENGTH};
use crate::crypt::{BulkCipher, CipherSuiteParams, MacDigest};
use tls10_types::TlsError;

const BLOCK_SIZE: usize = 16;
const MAX_PADDING: usize = 255;

/// Length of the MAC pseudo-header (seq + type + version + length).
const MAC_HEADER_LEN: usize = 13;

enum AesCipher {
    Aes128(Aes128),
    Aes256(Aes256),
}

impl AesCipher {
    fn new(bulk: BulkCipher, key: &[u8]) -> Result<Self, TlsError> {
        match bulk {
            BulkCipher::Aes128Cbc => Ok(AesCipher::Aes128(
                Aes128::new_from_slice(key)
                    .map_err(|_| TlsError::internal_error("bad AES-128 key length"))?,
            )),
            BulkCipher::Aes256Cbc => Ok(AesCipher::Aes256(
                Aes256::new_from_slice(key)
                    .map_err(|_| TlsError::internal_error("bad AES-256 key length"))?,
            )),
            BulkCipher::Rc4_128 => Err(TlsError::internal_error("RC4 is not a block cipher")),
        }
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            AesCipher::Aes128(c) => c.encrypt_block(block),
            AesCipher::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            AesCipher::Aes128(c) => c.decrypt_block(block),
            AesCipher::Aes256(c) => c.decrypt_block(block),
        }
    }
}

/// CBC-encrypt in place, chaining off `iv`. Data must be block-aligned.
fn cbc_encrypt(cipher: &AesCipher, iv: &[u8; BLOCK_SIZE], data: &mut [u8]) {
    let mut prev = *iv;
    for chunk in data.chunks_mut(BLOCK_SIZE) {
        for i in 0..BLOCK_SIZE {
            chunk[i] ^= prev[i];
        }
        cipher.encrypt_block(chunk);
        prev.copy_from_slice(chunk);
    }
}

/// CBC-decrypt in place, chaining off `iv`. Data must be block-aligned.
fn cbc_decrypt(cipher: &AesCipher, iv: &[u8; BLOCK_SIZE], data: &mut [u8]) {
    let mut prev = *iv;
    for chunk in data.chunks_mut(BLOCK_SIZE) {
        let ct_copy: [u8; BLOCK_SIZE] = chunk.try_into().unwrap();
        cipher.decrypt_block(chunk);
        for i in 0..BLOCK_SIZE {
            chunk[i] ^= prev[i];
        }
        prev = ct_copy;
    }
}

/// HMAC compression invocations needed to MAC `msg_len` bytes.
///
/// Inner hash: one compression for the padded key, then the message plus at
/// least 9 bytes of digest padding. Outer hash: two compressions. MD5 and
/// SHA-1 share the 64-byte compression block.
fn mac_compression_count(msg_len: usize) -> u64 {
    ((64 + msg_len + 9).div_ceil(64) + 2) as u64
}

/// TLS 1.0 CBC record encryptor (client write direction).
pub struct CbcEncryptor {
    cipher: AesCipher,
    mac_key: Vec<u8>,
    mac: MacDigest,
    iv: [u8; BLOCK_SIZE],
    seq: u64,
}

impl Drop for CbcEncryptor {
    fn drop(&mut self) {
        self.mac_key.zeroize();
        self.iv.zeroize();
    }
}

impl CbcEncryptor {
    pub fn new(
        params: &CipherSuiteParams,
        key: &[u8],
        mac_key: &[u8],
        iv: &[u8],
    ) -> Result<Self, TlsError> {
        if iv.len() != BLOCK_SIZE {
            return Err(TlsError::internal_error("bad CBC IV length"));
        }
        let mut iv_arr = [0u8; BLOCK_SIZE];
        iv_arr.copy_from_slice(iv);
        Ok(Self {
            cipher: AesCipher::new(params.bulk, key)?,
            mac_key: mac_key.to_vec(),
            mac: params.mac,
            iv: iv_arr,
            seq: 0,
        })
    }

    /// MAC, pad, and encrypt one fragment.
    ///
    /// The padding length is the minimum needed to reach a block boundary,
    /// plus a random number of whole extra blocks (capped at 255 total), so
    /// the ciphertext length does not reveal the exact plaintext length.
    pub fn encrypt(
        &mut self,
        rng: &mut dyn CryptoRngCore,
        content_type: ContentType,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        if plaintext.len() > MAX_PLAINTEXT_LENGTH {
            return Err(TlsError::internal_error("plaintext exceeds maximum"));
        }
        if self.seq == u64::MAX {
            return Err(TlsError::internal_error("write sequence number overflow"));
        }

        let mac = compute_record_mac(self.mac, &self.mac_key, self.seq, content_type, plaintext)?;

        let data_len = plaintext.len() + mac.len();
        let base_padding = (BLOCK_SIZE - ((data_len + 1) % BLOCK_SIZE)) % BLOCK_SIZE;
        let max_extra_blocks = (MAX_PADDING - base_padding) / BLOCK_SIZE;
        let extra_blocks = (rng.next_u32() as usize) % (max_extra_blocks + 1);
        let padding_length = base_padding + extra_blocks * BLOCK_SIZE;

        let mut data = Vec::with_capacity(data_len + padding_length + 1);
        data.extend_from_slice(plaintext);
        data.extend_from_slice(&mac);
        data.resize(data_len + padding_length + 1, padding_length as u8);

        cbc_encrypt(&self.cipher, &self.iv, &mut data);
        // Chain the next record off this record's last ciphertext block.
        self.iv.copy_from_slice(&data[data.len() - BLOCK_SIZE..]);

        self.seq += 1;
        Ok(data)
    }

    pub fn sequence_number(&self) -> u64 {
        self.seq
    }
}

/// TLS 1.0 CBC record decryptor (server write direction).
pub struct CbcDecryptor {
    cipher: AesCipher,
    mac_key: Vec<u8>,
    mac: MacDigest,
    iv: [u8; BLOCK_SIZE],
    seq: u64,
    mac_ops: u64,
}

impl Drop for CbcDecryptor {
    fn drop(&mut self) {
        self.mac_key.zeroize();
        self.iv.zeroize();
    }
}

impl CbcDecryptor {
    pub fn new(
        params: &CipherSuiteParams,
        key: &[u8],
        mac_key: &[u8],
        iv: &[u8],
    ) -> Result<Self, TlsError> {
        if iv.len() != BLOCK_SIZE {
            return Err(TlsError::internal_error("bad CBC IV length"));
        }
        let mut iv_arr = [0u8; BLOCK_SIZE];
        iv_arr.copy_from_slice(iv);
        Ok(Self {
            cipher: AesCipher::new(params.bulk, key)?,
            mac_key: mac_key.to_vec(),
            mac: params.mac,
            iv: iv_arr,
            seq: 0,
            mac_ops: 0,
        })
    }

    /// Decrypt one fragment, validate padding and MAC, strip both.
    ///
    /// Any padding or MAC failure surfaces as bad_record_mac, after the same
    /// amount of MAC work a valid record of this length would have taken.
    pub fn decrypt(
        &mut self,
        content_type: ContentType,
        fragment: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        let mac_len = self.mac.mac_len();
        let min_len = (mac_len + 1).div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
        if fragment.len() < min_len
            || fragment.len() > MAX_CIPHERTEXT_LENGTH
            || fragment.len() % BLOCK_SIZE != 0
        {
            return Err(TlsError::bad_record_mac());
        }
        if self.seq == u64::MAX {
            return Err(TlsError::internal_error("read sequence number overflow"));
        }

        let mut decrypted = fragment.to_vec();
        cbc_decrypt(&self.cipher, &self.iv, &mut decrypted);
        self.iv.copy_from_slice(&fragment[fragment.len() - BLOCK_SIZE..]);

        let padding_length = decrypted[decrypted.len() - 1] as usize;
        let total_overhead = padding_length + 1 + mac_len;
        let length_ok: u8 = u8::from(total_overhead <= decrypted.len());

        // Padding scan over a fixed window so the work done does not depend
        // on the claimed padding length.
        let pad_start = decrypted.len().saturating_sub(padding_length + 1);
        let scan_start = decrypted.len().saturating_sub(MAX_PADDING + 1);
        let mut pad_ok = length_ok;
        for (i, &b) in decrypted.iter().enumerate().skip(scan_start) {
            let in_padding = u8::from(i >= pad_start);
            pad_ok &= b.ct_eq(&(padding_length as u8)).unwrap_u8() | (1 - in_padding);
        }

        // Content length with invalid padding treated as zero padding, so a
        // MAC is still computed over something of plausible length.
        let content_len = if length_ok == 1 {
            decrypted.len() - total_overhead
        } else {
            decrypted.len() - mac_len - 1
        };

        let expected_mac =
            compute_record_mac(self.mac, &self.mac_key, self.seq, content_type, &decrypted[..content_len])?;
        self.mac_ops += mac_compression_count(MAC_HEADER_LEN + content_len);

        // Equalize: a record of this ciphertext length costs the same number
        // of compressions no matter where the padding boundary fell.
        let max_content = decrypted.len() - mac_len - 1;
        let deficit = mac_compression_count(MAC_HEADER_LEN + max_content)
            - mac_compression_count(MAC_HEADER_LEN + content_len);
        self.run_dummy_compressions(deficit)?;

        let mac_slice = &decrypted[content_len..content_len + mac_len];
        let mac_ok = mac_slice.ct_eq(&expected_mac).unwrap_u8();

        if pad_ok & mac_ok != 1 {
            return Err(TlsError::bad_record_mac());
        }

        self.seq += 1;
        decrypted.truncate(content_len);
        Ok(decrypted)
    }

    fn run_dummy_compressions(&mut self, count: u64) -> Result<(), TlsError> {
        let filler = vec![0u8; count as usize * 64];
        let digest = match self.mac {
            MacDigest::Md5 => {
                let mut mac = <Hmac<Md5> as Mac>::new_from_slice(&self.mac_key)
                    .map_err(|_| TlsError::internal_error("HMAC key rejected"))?;
                mac.update(&filler);
                mac.finalize().into_bytes().to_vec()
            }
            MacDigest::Sha1 => {
                let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(&self.mac_key)
                    .map_err(|_| TlsError::internal_error("HMAC key rejected"))?;
                mac.update(&filler);
                mac.finalize().into_bytes().to_vec()
            }
        };
        // The result is discarded; only the work matters.
        std::hint::black_box(digest);
        self.mac_ops += count;
        Ok(())
    }

    pub fn sequence_number(&self) -> u64 {
        self.seq
    }

    /// Total MAC compression invocations performed so far, dummy work
    /// included. Diagnostic hook for timing-uniformity checks.
    pub fn mac_compressions_performed(&self) -> u64 {
        self.mac_ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CipherSuite;
    use rand::rngs::OsRng;

    fn params(suite: CipherSuite) -> CipherSuiteParams {
        CipherSuiteParams::from_suite(suite).unwrap()
    }

    fn pair(suite: CipherSuite) -> (CbcEncryptor, CbcDecryptor) {
        let p = params(suite);
        let key = vec![0x42u8; p.key_len()];
        let mac_key = vec![0xABu8; p.mac_len()];
        let iv = vec![0x17u8; 16];
        (
            CbcEncryptor::new(&p, &key, &mac_key, &iv).unwrap(),
            CbcDecryptor::new(&p, &key, &mac_key, &iv).unwrap(),
        )
    }

    #[test]
    fn test_roundtrip_aes128() {
        let (mut enc, mut dec) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        let pt = b"attack at dawn";
        let ct = enc.encrypt(&mut OsRng, ContentType::ApplicationData, pt).unwrap();
        assert_eq!(ct.len() % 16, 0);
        let out = dec.decrypt(ContentType::ApplicationData, &ct).unwrap();
        assert_eq!(out, pt);
    }

    #[test]
    fn test_roundtrip_aes256() {
        let (mut enc, mut dec) = pair(CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA);
        let pt = vec![0x5Au8; 1000];
        let ct = enc.encrypt(&mut OsRng, ContentType::Handshake, &pt).unwrap();
        let out = dec.decrypt(ContentType::Handshake, &ct).unwrap();
        assert_eq!(out, pt);
    }

    #[test]
    fn test_iv_chaining_across_records() {
        // Several records in a row only decrypt if both sides keep chaining
        // the IV off the previous ciphertext.
        let (mut enc, mut dec) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        for i in 0..6u8 {
            let msg = vec![i; 40];
            let ct = enc.encrypt(&mut OsRng, ContentType::ApplicationData, &msg).unwrap();
            assert_eq!(dec.decrypt(ContentType::ApplicationData, &ct).unwrap(), msg);
        }
        assert_eq!(enc.sequence_number(), 6);
        assert_eq!(dec.sequence_number(), 6);
    }

    #[test]
    fn test_identical_plaintexts_give_distinct_ciphertexts() {
        let (mut enc, _) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        let a = enc.encrypt(&mut OsRng, ContentType::ApplicationData, b"same").unwrap();
        let b = enc.encrypt(&mut OsRng, ContentType::ApplicationData, b"same").unwrap();
        // Different chained IV and different sequence number in the MAC.
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let (mut enc, mut dec) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        let mut ct = enc.encrypt(&mut OsRng, ContentType::ApplicationData, b"secret").unwrap();
        ct[0] ^= 0x01;
        let err = dec.decrypt(ContentType::ApplicationData, &ct).unwrap_err();
        assert_eq!(
            err.alert_to_send(),
            Some(tls10_types::AlertDescription::BadRecordMac)
        );
    }

    #[test]
    fn test_wrong_content_type_rejected() {
        // The MAC covers the record type, so replaying a handshake fragment
        // as application data must fail.
        let (mut enc, mut dec) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        let ct = enc.encrypt(&mut OsRng, ContentType::Handshake, b"finished").unwrap();
        assert!(dec.decrypt(ContentType::ApplicationData, &ct).is_err());
    }

    #[test]
    fn test_misaligned_and_short_fragments_rejected() {
        let (_, mut dec) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        assert!(dec.decrypt(ContentType::ApplicationData, &[0u8; 15]).is_err());
        assert!(dec.decrypt(ContentType::ApplicationData, &[0u8; 33]).is_err());
        assert!(dec.decrypt(ContentType::ApplicationData, &[0u8; 16]).is_err());
    }

    #[test]
    fn test_failure_mode_is_always_bad_record_mac() {
        // Corrupting the final block scrambles the padding; corrupting an
        // early block scrambles the MAC. Both must surface identically.
        let (mut enc, _) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        let ct = enc.encrypt(&mut OsRng, ContentType::ApplicationData, &[0x77u8; 64]).unwrap();

        for flip_at in [0, ct.len() - 1] {
            let (_, mut dec) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
            let mut bad = ct.clone();
            bad[flip_at] ^= 0x80;
            let err = dec.decrypt(ContentType::ApplicationData, &bad).unwrap_err();
            assert_eq!(
                err.alert_to_send(),
                Some(tls10_types::AlertDescription::BadRecordMac)
            );
            let msg = err.to_string().to_lowercase();
            assert!(!msg.contains("padding"));
        }
    }

    #[test]
    fn test_mac_work_independent_of_padding_validity() {
        // Same ciphertext length must cost the same number of MAC
        // compressions whether the record is intact, has broken padding, or
        // has a broken MAC.
        let (mut enc, _) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        let ct = enc.encrypt(&mut OsRng, ContentType::ApplicationData, &[0x31u8; 128]).unwrap();

        let mut counts = Vec::new();

        // Intact record.
        let (_, mut dec) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        dec.decrypt(ContentType::ApplicationData, &ct).unwrap();
        counts.push(dec.mac_compressions_performed());

        // Last block corrupted: padding byte damage.
        let (_, mut dec) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        let mut bad_pad = ct.clone();
        let n = bad_pad.len();
        bad_pad[n - 1] ^= 0xFF;
        assert!(dec.decrypt(ContentType::ApplicationData, &bad_pad).is_err());
        counts.push(dec.mac_compressions_performed());

        // First block corrupted: content and MAC damage, padding intact.
        let (_, mut dec) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        let mut bad_mac = ct.clone();
        bad_mac[3] ^= 0x01;
        assert!(dec.decrypt(ContentType::ApplicationData, &bad_mac).is_err());
        counts.push(dec.mac_compressions_performed());

        assert_eq!(counts[0], counts[1]);
        assert_eq!(counts[1], counts[2]);
    }

    #[test]
    fn test_random_extra_padding_stays_within_bounds() {
        let (mut enc, mut dec) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        for _ in 0..50 {
            let ct = enc.encrypt(&mut OsRng, ContentType::ApplicationData, b"x").unwrap();
            // 1 byte + 20 MAC + padding: never more than 256 bytes past the
            // minimum and always block-aligned.
            assert_eq!(ct.len() % 16, 0);
            assert!(ct.len() >= 32);
            assert!(ct.len() <= 32 + 256);
            assert_eq!(dec.decrypt(ContentType::ApplicationData, &ct).unwrap(), b"x");
        }
    }
}
