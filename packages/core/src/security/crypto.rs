use aes::cipher::{
    BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher,
    block_padding::ZeroPadding,
    generic_array::{
        GenericArray,
        typenum::{U8, U13, U16},
    },
};
use ccm::aead::{Aead, Payload};

type Aes128Ofb = ofb::Ofb<aes::Aes128>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
pub type Aes128Ccm = ccm::Ccm<aes::Aes128, U8, U13>;

pub const AES_BLOCK_SIZE: usize = 16;

pub fn encrypt_aes_ecb(plaintext: &[u8], key: &[u8]) -> Vec<u8> {
    let cipher = aes::Aes128::new(key.into());

    let mut block: GenericArray<u8, U16> = [0; AES_BLOCK_SIZE].into();
    block.copy_from_slice(plaintext);
    cipher.encrypt_block(&mut block);

    block.to_vec()
}

pub fn encrypt_aes_ofb(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Vec<u8> {
    let mut cipher = <Aes128Ofb as KeyIvInit>::new(key.into(), iv.into());

    let mut buf = plaintext.to_vec();
    cipher.apply_keystream(&mut buf);
    buf
}

pub fn decrypt_aes_ofb(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Vec<u8> {
    // OFB is symmetric
    encrypt_aes_ofb(ciphertext, key, iv)
}

/// Computes the 8-byte CBC-MAC used by Security S0
pub fn compute_mac(plaintext: &[u8], key: &[u8]) -> Vec<u8> {
    let iv = [0u8; AES_BLOCK_SIZE];
    compute_mac_iv(plaintext, key, &iv)
}

pub fn compute_mac_iv(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Vec<u8> {
    let cipher = Aes128CbcEnc::new(key.into(), iv.into());
    let buf = cipher.encrypt_padded_vec_mut::<ZeroPadding>(plaintext);
    // The MAC is the first 8 bytes of the last 16 byte block
    buf[buf.len() - AES_BLOCK_SIZE..][..8].to_vec()
}

/// Encrypts and authenticates with AES-128-CCM (8-byte MAC, 13-byte nonce).
/// Returns ciphertext with the auth tag appended.
pub fn encrypt_ccm(plaintext: &[u8], key: &[u8], nonce: &[u8], aad: &[u8]) -> Vec<u8> {
    let cipher = <Aes128Ccm as KeyInit>::new(key.into());
    cipher
        .encrypt(
            nonce.into(),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .expect("CCM encryption cannot fail for valid input sizes")
}

/// Decrypts and verifies an AES-128-CCM message. Returns `None` when the
/// authentication tag does not match.
pub fn decrypt_ccm(ciphertext: &[u8], key: &[u8], nonce: &[u8], aad: &[u8]) -> Option<Vec<u8>> {
    let cipher = <Aes128Ccm as KeyInit>::new(key.into());
    cipher
        .decrypt(
            nonce.into(),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .ok()
}

const Z128: [u8; 16] = [0; 16];
const R128: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x87];

/// Computes the byte-wise XOR of two slices with the same length
pub fn xor_slices(a: &[u8], b: &[u8]) -> Vec<u8> {
    assert!(a.len() == b.len(), "Slices must have the same length");
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}

/// Computes the byte-wise XOR of two slices with the same length, mutating
/// the first slice
pub fn xor_slice_mut(a: &mut [u8], b: &[u8]) {
    assert!(a.len() == b.len(), "Slices must have the same length");
    a.iter_mut().zip(b.iter()).for_each(|(x, y)| *x ^= y);
}

// Creates a new vec from a slice in MSB ordering by left-shifting it one bit
fn left_shift_1(input: &[u8]) -> Vec<u8> {
    if input.is_empty() {
        return vec![];
    }

    let mut ret = vec![0; input.len()];
    for i in 0..input.len() - 1 {
        ret[i] = (input[i] << 1) + if input[i + 1] & 0x80 != 0 { 1 } else { 0 };
    }
    ret[input.len() - 1] = input[input.len() - 1] << 1;

    ret
}

/// Increments a multi-byte unsigned integer in big-endian order by 1
pub fn increment_slice_mut(buffer: &mut [u8]) {
    for i in (0..buffer.len()).rev() {
        buffer[i] = buffer[i].wrapping_add(1);
        if buffer[i] != 0x00 {
            break;
        }
    }
}

fn generate_aes128_cmac_subkeys(key: &[u8]) -> (Vec<u8>, Vec<u8>) {
    // NIST SP 800-38B, chapter 6.1
    let l = encrypt_aes_ecb(&Z128, key);
    let k1 = if l[0] & 0x80 == 0 {
        left_shift_1(&l)
    } else {
        xor_slices(&left_shift_1(&l), &R128)
    };
    let k2 = if k1[0] & 0x80 == 0 {
        left_shift_1(&k1)
    } else {
        xor_slices(&left_shift_1(&k1), &R128)
    };

    (k1, k2)
}

/// Computes an AES-128-CMAC (NIST SP 800-38B) as used by the Security S2
/// key derivation
pub fn compute_cmac(message: &[u8], key: &[u8]) -> Vec<u8> {
    let block_size = AES_BLOCK_SIZE;
    let remainder = message.len() % block_size;
    let num_blocks = message.len() / block_size + if remainder == 0 { 0 } else { 1 };

    let (k1, k2) = generate_aes128_cmac_subkeys(key);

    // Pad the last block if it is incomplete (or the message is empty)
    let last_block_is_complete = !message.is_empty() && remainder == 0;
    let mut last_block = if last_block_is_complete {
        message[message.len() - block_size..].to_vec()
    } else {
        let mut last_block = message[(num_blocks.max(1) - 1) * block_size..].to_vec();
        last_block.push(0x80);
        last_block.resize(block_size, 0);
        last_block
    };
    let subkey = if last_block_is_complete { &k1 } else { &k2 };
    xor_slice_mut(&mut last_block, subkey);

    // Chain all blocks but the last one
    let mut ret = Z128.to_vec();
    if num_blocks > 0 {
        for i in 0..num_blocks - 1 {
            let block = &message[i * block_size..(i + 1) * block_size];
            xor_slice_mut(&mut ret, block);
            ret = encrypt_aes_ecb(&ret, key);
        }
    }

    xor_slice_mut(&mut ret, &last_block);
    encrypt_aes_ecb(&ret, key)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_left_shift_1() {
        assert_eq!(left_shift_1(&[0x00]), vec![0x00]);
        assert_eq!(left_shift_1(&[0x01]), vec![0x02]);
        assert_eq!(left_shift_1(&[0x80]), vec![0x00]);
        assert_eq!(left_shift_1(&[0x01, 0x80]), vec![0x03, 0x00]);
        assert_eq!(left_shift_1(&[0x01, 0x40]), vec![0x02, 0x80]);
    }

    #[test]
    fn test_increment_slice_mut() {
        let mut buf = [0x00, 0xff];
        increment_slice_mut(&mut buf);
        assert_eq!(buf, [0x01, 0x00]);

        let mut buf = [0xff, 0xff];
        increment_slice_mut(&mut buf);
        assert_eq!(buf, [0x00, 0x00]);
    }

    #[test]
    fn test_cmac_rfc4493_vectors() {
        // NIST SP 800-38B / RFC 4493 test vectors for AES-128-CMAC
        let key = hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap();

        let mac = compute_cmac(&[], &key);
        assert_eq!(mac, hex::decode("bb1d6929e95937287fa37d129b756746").unwrap());

        let msg = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();
        let mac = compute_cmac(&msg, &key);
        assert_eq!(mac, hex::decode("070a16b46b4d4144f79bdd9dd04a287c").unwrap());

        let msg = hex::decode(
            "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e5130c81c46a35ce411",
        )
        .unwrap();
        let mac = compute_cmac(&msg, &key);
        assert_eq!(mac, hex::decode("dfa66747de9ae63030ca32611497c827").unwrap());
    }

    #[test]
    fn test_ccm_roundtrip_and_tamper() {
        let key = [0x42u8; 16];
        let nonce = [0x01u8; 13];
        let aad = [0xaau8; 8];
        let plaintext = b"hello node";

        let ciphertext = encrypt_ccm(plaintext, &key, &nonce, &aad);
        assert_eq!(ciphertext.len(), plaintext.len() + 8);
        assert_eq!(
            decrypt_ccm(&ciphertext, &key, &nonce, &aad),
            Some(plaintext.to_vec())
        );

        let mut tampered = ciphertext.clone();
        tampered[0] ^= 0x01;
        assert_eq!(decrypt_ccm(&tampered, &key, &nonce, &aad), None);
    }
}
