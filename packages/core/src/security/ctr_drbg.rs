use super::crypto::{encrypt_aes_ecb, increment_slice_mut, xor_slice_mut};

const KEY_LEN: usize = 16;
const BLOCK_LEN: usize = 16;
const SEED_LEN: usize = KEY_LEN + BLOCK_LEN;

/// AES-128 CTR_DRBG (NIST SP 800-90A) without derivation function, as used
/// to generate the S2 SPAN nonce stream. The counter length equals the
/// block length.
pub struct CtrDrbg {
    v: [u8; BLOCK_LEN],
    key: [u8; KEY_LEN],
}

impl CtrDrbg {
    pub fn new(entropy: [u8; SEED_LEN], personalization: &[u8]) -> Self {
        let mut seed = entropy;
        if !personalization.is_empty() {
            let len = personalization.len().min(SEED_LEN);
            xor_slice_mut(&mut seed[..len], &personalization[..len]);
        }

        let mut ret = Self {
            v: [0; BLOCK_LEN],
            key: [0; KEY_LEN],
        };
        ret.update(Some(seed));
        ret
    }

    fn update(&mut self, provided_data: Option<[u8; SEED_LEN]>) {
        let mut temp: Vec<u8> = Vec::with_capacity(SEED_LEN);
        while temp.len() < SEED_LEN {
            increment_slice_mut(&mut self.v);
            temp.append(&mut encrypt_aes_ecb(&self.v, &self.key));
        }
        temp.truncate(SEED_LEN);

        if let Some(provided_data) = provided_data {
            xor_slice_mut(&mut temp, &provided_data);
        }

        let (key, v) = temp.split_at_mut(KEY_LEN);
        self.key.copy_from_slice(key);
        self.v.copy_from_slice(v);
    }

    pub fn generate(&mut self, bytes: usize) -> Vec<u8> {
        let mut temp: Vec<u8> = Vec::with_capacity(bytes.next_multiple_of(BLOCK_LEN));

        while temp.len() < bytes {
            increment_slice_mut(&mut self.v);
            temp.append(&mut encrypt_aes_ecb(&self.v, &self.key));
        }
        temp.truncate(bytes);

        self.update(None);

        temp
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_deterministic_for_equal_seeds() {
        let entropy = [0x5au8; SEED_LEN];
        let mut a = CtrDrbg::new(entropy, &[]);
        let mut b = CtrDrbg::new(entropy, &[]);
        assert_eq!(a.generate(13), b.generate(13));
        assert_eq!(a.generate(13), b.generate(13));
    }

    #[test]
    fn test_personalization_changes_output() {
        let entropy = [0x5au8; SEED_LEN];
        let mut a = CtrDrbg::new(entropy, &[]);
        let mut b = CtrDrbg::new(entropy, &[0x01; 32]);
        assert_ne!(a.generate(13), b.generate(13));
    }
}
