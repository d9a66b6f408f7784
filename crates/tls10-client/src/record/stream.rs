//! TLS 1.0 RC4 MAC-then-encrypt record protection (RFC 2246 §6.2.3.1).
//!
//! Stream suites carry no IV and no padding: the fragment is the keystream
//! XOR of plaintext || MAC, and the cipher state runs continuously across
//! records in one direction.

use rc4::consts::U16;
use rc4::{Key, KeyInit, Rc4, StreamCipher};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::{compute_record_mac, ContentType, MAX_CIPHERTEXT_LENGTH, MAX_PLAINTEXT_LENGTH};
use crate::crypt::{BulkCipher, CipherSuiteParams, MacDigest};
use tls10_types::TlsError;

fn make_rc4(bulk: BulkCipher, key: &[u8]) -> Result<Rc4<U16>, TlsError> {
    if bulk != BulkCipher::Rc4_128 || key.len() != 16 {
        return Err(TlsError::internal_error("bad RC4 key"));
    }
    Ok(Rc4::new(Key::<U16>::from_slice(key)))
}

/// RC4 record encryptor (client write direction).
pub struct Rc4Encryptor {
    cipher: Rc4<U16>,
    mac_key: Vec<u8>,
    mac: MacDigest,
    seq: u64,
}

impl Drop for Rc4Encryptor {
    fn drop(&mut self) {
        self.mac_key.zeroize();
    }
}

impl Rc4Encryptor {
    pub fn new(params: &CipherSuiteParams, key: &[u8], mac_key: &[u8]) -> Result<Self, TlsError> {
        Ok(Self {
            cipher: make_rc4(params.bulk, key)?,
            mac_key: mac_key.to_vec(),
            mac: params.mac,
            seq: 0,
        })
    }

    pub fn encrypt(
        &mut self,
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
        let mut data = Vec::with_capacity(plaintext.len() + mac.len());
        data.extend_from_slice(plaintext);
        data.extend_from_slice(&mac);
        self.cipher.apply_keystream(&mut data);

        self.seq += 1;
        Ok(data)
    }

    pub fn sequence_number(&self) -> u64 {
        self.seq
    }
}

/// RC4 record decryptor (server write direction).
pub struct Rc4Decryptor {
    cipher: Rc4<U16>,
    mac_key: Vec<u8>,
    mac: MacDigest,
    seq: u64,
}

impl Drop for Rc4Decryptor {
    fn drop(&mut self) {
        self.mac_key.zeroize();
    }
}

impl Rc4Decryptor {
    pub fn new(params: &CipherSuiteParams, key: &[u8], mac_key: &[u8]) -> Result<Self, TlsError> {
        Ok(Self {
            cipher: make_rc4(params.bulk, key)?,
            mac_key: mac_key.to_vec(),
            mac: params.mac,
            seq: 0,
        })
    }

    pub fn decrypt(
        &mut self,
        content_type: ContentType,
        fragment: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        let mac_len = self.mac.mac_len();
        if fragment.len() < mac_len || fragment.len() > MAX_CIPHERTEXT_LENGTH {
            return Err(TlsError::bad_record_mac());
        }
        if self.seq == u64::MAX {
            return Err(TlsError::internal_error("read sequence number overflow"));
        }

        let mut data = fragment.to_vec();
        self.cipher.apply_keystream(&mut data);

        let content_len = data.len() - mac_len;
        let expected =
            compute_record_mac(self.mac, &self.mac_key, self.seq, content_type, &data[..content_len])?;
        if data[content_len..].ct_eq(&expected).unwrap_u8() != 1 {
            return Err(TlsError::bad_record_mac());
        }

        self.seq += 1;
        data.truncate(content_len);
        Ok(data)
    }

    pub fn sequence_number(&self) -> u64 {
        self.seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CipherSuite;

    fn pair(suite: CipherSuite) -> (Rc4Encryptor, Rc4Decryptor) {
        let p = CipherSuiteParams::from_suite(suite).unwrap();
        let key = vec![0x42u8; 16];
        let mac_key = vec![0xABu8; p.mac_len()];
        (
            Rc4Encryptor::new(&p, &key, &mac_key).unwrap(),
            Rc4Decryptor::new(&p, &key, &mac_key).unwrap(),
        )
    }

    #[test]
    fn test_roundtrip_rc4_sha() {
        let (mut enc, mut dec) = pair(CipherSuite::TLS_RSA_WITH_RC4_128_SHA);
        let pt = b"stream suite payload";
        let ct = enc.encrypt(ContentType::ApplicationData, pt).unwrap();
        assert_eq!(ct.len(), pt.len() + 20);
        assert_eq!(dec.decrypt(ContentType::ApplicationData, &ct).unwrap(), pt);
    }

    #[test]
    fn test_roundtrip_rc4_md5() {
        let (mut enc, mut dec) = pair(CipherSuite::TLS_RSA_WITH_RC4_128_MD5);
        let ct = enc.encrypt(ContentType::ApplicationData, b"md5 mac").unwrap();
        assert_eq!(ct.len(), 7 + 16);
        assert_eq!(dec.decrypt(ContentType::ApplicationData, &ct).unwrap(), b"md5 mac");
    }

    #[test]
    fn test_keystream_continuity() {
        // Records must be decrypted in order: the stream state advances with
        // every byte, so skipping one record desynchronizes the keystream.
        let (mut enc, mut dec) = pair(CipherSuite::TLS_RSA_WITH_RC4_128_SHA);
        let first = enc.encrypt(ContentType::ApplicationData, b"first").unwrap();
        let second = enc.encrypt(ContentType::ApplicationData, b"second").unwrap();
        // Skipping `first` makes `second` garbage.
        assert!(dec.decrypt(ContentType::ApplicationData, &second).is_err());
        let _ = first;
    }

    #[test]
    fn test_tampering_detected() {
        let (mut enc, mut dec) = pair(CipherSuite::TLS_RSA_WITH_RC4_128_SHA);
        let mut ct = enc.encrypt(ContentType::ApplicationData, b"payload").unwrap();
        ct[2] ^= 0x40;
        let err = dec.decrypt(ContentType::ApplicationData, &ct).unwrap_err();
        assert_eq!(
            err.alert_to_send(),
            Some(tls10_types::AlertDescription::BadRecordMac)
        );
    }

    #[test]
    fn test_short_fragment_rejected() {
        let (_, mut dec) = pair(CipherSuite::TLS_RSA_WITH_RC4_128_SHA);
        assert!(dec.decrypt(ContentType::ApplicationData, &[0u8; 19]).is_err());
    }
}
