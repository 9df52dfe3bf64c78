use crc16::*;

/// Computes the XOR checksum used by Serial API frames. The initial value is
/// 0xff so that an all-zero frame does not checksum to zero.
pub fn xor_sum(data: &[u8]) -> u8 {
    data.iter().fold(0xff, |acc, x| acc ^ x)
}

/// Computes the CRC-16/AUG-CCITT checksum used by the CRC16 and Transport
/// Service command classes
pub fn crc16(data: &[u8]) -> u16 {
    State::<AUG_CCITT>::calculate(data)
}

pub struct Crc16(State<AUG_CCITT>);

impl Crc16 {
    pub fn update(mut self, data: &[u8]) -> Self {
        self.0.update(data);
        self
    }

    pub fn get(&self) -> u16 {
        self.0.get()
    }
}

pub fn crc16_incremental() -> Crc16 {
    Crc16(State::<AUG_CCITT>::new())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_xor_sum() {
        let input = hex::decode("030002").unwrap();
        assert_eq!(xor_sum(&input), 0xfe);
    }

    #[test]
    fn test_xor_sum_bit_sensitivity() {
        // Flipping any single bit must change the checksum
        let input = [0x03u8, 0x00, 0x02, 0x15];
        let reference = xor_sum(&input);
        for byte in 0..input.len() {
            for bit in 0..8 {
                let mut flipped = input;
                flipped[byte] ^= 1 << bit;
                assert_ne!(xor_sum(&flipped), reference);
            }
        }
    }

    #[test]
    fn test_crc16() {
        assert_eq!(crc16(&[]), 0x1d0f);
        assert_eq!(crc16(b"A"), 0x9479);
        assert_eq!(crc16(b"123456789"), 0xe5cc);
    }

    #[test]
    fn test_crc16_incremental() {
        let mut crc = crc16_incremental();
        for b in b"123456789" {
            crc = crc.update(&[*b]);
        }
        assert_eq!(crc.get(), 0xe5cc);
    }
}
