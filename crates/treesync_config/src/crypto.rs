//! Key derivation and the authenticated-encryption envelope.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

const IV_LEN: usize = 16;
const MAC_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum KeysError {
    #[error("per-user TLV record is too short to derive keys from")]
    RecordTooShort,
}

/// The three secrets derived from a per-user TLV record: the AES cipher
/// key, the HMAC authentication key, and the filename tag used to name the
/// two slot files on disk. Each is an independent HKDF expansion of the
/// same input keying material so compromising one does not reveal another.
pub struct Keys {
    pub cipher_key: [u8; 16],
    pub mac_key: [u8; 16],
    pub filename_tag: [u8; 16],
}

impl Keys {
    pub fn derive(tlv_record: &[u8]) -> Result<Self, KeysError> {
        if tlv_record.len() < 16 {
            return Err(KeysError::RecordTooShort);
        }
        let hk = Hkdf::<Sha256>::new(None, tlv_record);
        let mut cipher_key = [0u8; 16];
        let mut mac_key = [0u8; 16];
        let mut filename_tag = [0u8; 16];
        // `expand` only fails when the output length is unreasonably large
        // relative to the hash's output size; 16 bytes never triggers that.
        hk.expand(b"treesync-config-cipher-key", &mut cipher_key)
            .expect("16-byte expand always fits");
        hk.expand(b"treesync-config-mac-key", &mut mac_key)
            .expect("16-byte expand always fits");
        hk.expand(b"treesync-config-filename-tag", &mut filename_tag)
            .expect("16-byte expand always fits");
        Ok(Self {
            cipher_key,
            mac_key,
            filename_tag,
        })
    }

    pub fn filename_tag_hex(&self) -> String {
        self.filename_tag.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("ciphertext is too short to contain an IV and MAC")]
    Truncated,
    #[error("MAC verification failed")]
    MacMismatch,
    #[error("padding or block alignment error during decryption")]
    Decrypt,
}

/// Encrypts `plaintext` and returns the full on-disk layout:
/// `ciphertext || iv || mac`.
pub fn seal(plaintext: &[u8], keys: &Keys) -> Vec<u8> {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext = Aes128CbcEnc::new(&keys.cipher_key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut mac = HmacSha256::new_from_slice(&keys.mac_key).expect("hmac accepts any key length");
    mac.update(&ciphertext);
    mac.update(&iv);
    let tag = mac.finalize().into_bytes();

    let mut out = Vec::with_capacity(ciphertext.len() + IV_LEN + MAC_LEN);
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&tag);
    out
}

/// Verifies the MAC and decrypts an envelope produced by [`seal`].
pub fn open(envelope: &[u8], keys: &Keys) -> Result<Vec<u8>, EnvelopeError> {
    if envelope.len() < IV_LEN + MAC_LEN {
        return Err(EnvelopeError::Truncated);
    }
    let mac_start = envelope.len() - MAC_LEN;
    let iv_start = mac_start - IV_LEN;

    let ciphertext = &envelope[..iv_start];
    let iv = &envelope[iv_start..mac_start];
    let tag = &envelope[mac_start..];

    let mut mac = HmacSha256::new_from_slice(&keys.mac_key).expect("hmac accepts any key length");
    mac.update(ciphertext);
    mac.update(iv);
    mac.verify_slice(tag).map_err(|_| EnvelopeError::MacMismatch)?;

    let iv_arr: [u8; IV_LEN] = iv.try_into().expect("slice length checked above");
    Aes128CbcDec::new(&keys.cipher_key.into(), &iv_arr.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| EnvelopeError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_round_trips() {
        let keys = Keys::derive(b"0123456789abcdef-per-user-record").unwrap();
        let plaintext = b"{\"sy\":[]}";
        let envelope = seal(plaintext, &keys);
        let recovered = open(&envelope, &keys).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn tampered_mac_is_rejected() {
        let keys = Keys::derive(b"0123456789abcdef-per-user-record").unwrap();
        let mut envelope = seal(b"hello world", &keys);
        let last = envelope.len() - 1;
        envelope[last] ^= 0xff;
        assert!(matches!(open(&envelope, &keys), Err(EnvelopeError::MacMismatch)));
    }

    #[test]
    fn different_records_derive_different_keys() {
        let a = Keys::derive(b"record-aaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let b = Keys::derive(b"record-bbbbbbbbbbbbbbbbbbbbbbbb").unwrap();
        assert_ne!(a.cipher_key, b.cipher_key);
        assert_ne!(a.filename_tag, b.filename_tag);
    }
}
