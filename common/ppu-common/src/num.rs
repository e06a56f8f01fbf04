use std::ops::RangeInclusive;

pub trait GetBit {
    #[must_use]
    fn bit(self, i: u8) -> bool;

    #[must_use]
    fn bits(self, range: RangeInclusive<u8>) -> Self;
}

macro_rules! impl_get_bit {
    ($($t:ty),* $(,)?) => {
        $(
            impl GetBit for $t {
                #[inline]
                fn bit(self, i: u8) -> bool {
                    debug_assert!(i < (<$t>::BITS as u8));
                    self & (1 << i) != 0
                }

                #[inline]
                fn bits(self, range: RangeInclusive<u8>) -> Self {
                    let start = *range.start();
                    let end = *range.end();
                    debug_assert!(start <= end && end < (<$t>::BITS as u8));

                    let width = u32::from(end - start + 1);
                    let mask = if width == <$t>::BITS { <$t>::MAX } else { (1 << width) - 1 };
                    (self >> start) & mask
                }
            }
        )*
    };
}

impl_get_bit!(u8, u16, u32, usize);

/// Byte access for little-endian 16-bit words (VRAM words, CGRAM colors, low OAM words).
pub trait U16Ext {
    fn lsb(self) -> u8;

    fn msb(self) -> u8;

    fn set_lsb(&mut self, value: u8);

    fn set_msb(&mut self, value: u8);
}

impl U16Ext for u16 {
    #[inline(always)]
    fn lsb(self) -> u8 {
        self as u8
    }

    #[inline(always)]
    fn msb(self) -> u8 {
        (self >> 8) as u8
    }

    #[inline(always)]
    fn set_lsb(&mut self, value: u8) {
        *self = (*self & 0xFF00) | u16::from(value);
    }

    #[inline(always)]
    fn set_msb(&mut self, value: u8) {
        *self = (*self & 0x00FF) | (u16::from(value) << 8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn bit_ranges() {
        assert_eq!(0b101, 0b1011_0100_u8.bits(2..=4));
        assert_eq!(0x1F, 0x7FFF_u16.bits(10..=14));
        assert_eq!(0xFF, 0xFF_u8.bits(0..=7));
        assert!(0x8000_u16.bit(15));
        assert!(!0x8000_u16.bit(14));
    }

    #[test]
    fn word_bytes() {
        let mut word = 0x1234_u16;
        assert_eq!((0x34, 0x12), (word.lsb(), word.msb()));

        word.set_lsb(0xCD);
        word.set_msb(0xAB);
        assert_eq!(0xABCD, word);
    }
}
