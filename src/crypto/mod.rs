//! Integrity protection for data the node keeps outside RAM
//!
//! Frame encryption and MIC computation belong to the radio/MAC layer. The
//! core only needs to recognise a session snapshot read back from
//! non-volatile storage as one it wrote itself, so snapshots carry an
//! AES-CMAC tag under the device's root key.

use aes::Aes128;
use cmac::{Cmac, Mac};

use crate::config::device::AESKey;

/// Tag size in bytes
pub const TAG_SIZE: usize = 16;

fn keyed(key: &AESKey) -> Cmac<Aes128> {
    <Cmac<Aes128> as Mac>::new(key.as_bytes().into())
}

/// Compute the AES-CMAC tag of `data`
pub fn seal(key: &AESKey, data: &[u8]) -> [u8; TAG_SIZE] {
    let mut mac = keyed(key);
    mac.update(data);
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    tag
}

/// Check `tag` against `data` in constant time
pub fn verify(key: &AESKey, data: &[u8], tag: &[u8]) -> bool {
    let mut mac = keyed(key);
    mac.update(data);
    mac.verify_slice(tag).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc4493_vector() {
        // RFC 4493, example 2 (16 byte message)
        let key = AESKey::new([
            0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf,
            0x4f, 0x3c,
        ]);
        let message = [
            0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93,
            0x17, 0x2a,
        ];
        let expected = [
            0x07, 0x0a, 0x16, 0xb4, 0x6b, 0x4d, 0x41, 0x44, 0xf7, 0x9b, 0xdd, 0x9d, 0xd0, 0x4a,
            0x28, 0x7c,
        ];

        assert_eq!(seal(&key, &message), expected);
        assert!(verify(&key, &message, &expected));
    }

    #[test]
    fn tampering_is_detected() {
        let key = AESKey::new([0x11; 16]);
        let mut data = [0x42u8; 40];
        let tag = seal(&key, &data);

        data[7] ^= 0x01;
        assert!(!verify(&key, &data, &tag));
        assert!(!verify(&AESKey::new([0x12; 16]), &[0x42u8; 40], &tag));
    }
}
