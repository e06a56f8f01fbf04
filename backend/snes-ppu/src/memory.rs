//! VRAM, CGRAM, and OAM stores
//!
//! All stores take store-relative addresses and wrap them to the store's real size; no access
//! ever faults.

use crate::api::PowerOnMemory;
use bincode::{Decode, Encode};
use ppu_common::num::{GetBit, U16Ext};
use std::iter;

pub const VRAM_LEN_WORDS: usize = 64 * 1024 / 2;
pub const VRAM_ADDRESS_MASK: u16 = (1 << 15) - 1;

pub const CGRAM_LEN_WORDS: usize = 256;
// One extra entry after the 256 palette colors holds the fixed color written through COLDATA
pub const FIXED_COLOR_INDEX: u16 = 256;
pub const CGRAM_ENTRIES: usize = CGRAM_LEN_WORDS + 1;
const CGRAM_BYTE_ADDRESS_MASK: u32 = 0x1FF;

pub const OAM_LOW_LEN_WORDS: usize = 512 / 2;
pub const OAM_HIGH_LEN_BYTES: usize = 32;
pub const OAM_LEN_BYTES: usize = 2 * OAM_LOW_LEN_WORDS + OAM_HIGH_LEN_BYTES;
// $220-$3FF mirror the high table at $200-$21F
const OAM_BYTE_ADDRESS_MASK: u32 = 0x3FF;

fn boxed_words<const LEN: usize>(power_on: PowerOnMemory) -> Box<[u16; LEN]> {
    iter::repeat_with(|| power_on.next_word())
        .take(LEN)
        .collect::<Vec<_>>()
        .into_boxed_slice()
        .try_into()
        .unwrap()
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Vram(Box<[u16; VRAM_LEN_WORDS]>);

impl Vram {
    pub fn new(power_on: PowerOnMemory) -> Self {
        Self(boxed_words(power_on))
    }

    #[inline]
    pub fn word(&self, address: u16) -> u16 {
        self.0[(address & VRAM_ADDRESS_MASK) as usize]
    }

    #[inline]
    pub fn word_mut(&mut self, address: u16) -> &mut u16 {
        &mut self.0[(address & VRAM_ADDRESS_MASK) as usize]
    }

    pub fn read_byte(&self, address: u32) -> u8 {
        let word = self.word((address >> 1) as u16);
        if address.bit(0) { word.msb() } else { word.lsb() }
    }

    pub fn write_byte(&mut self, address: u32, value: u8) {
        let word = self.word_mut((address >> 1) as u16);
        if address.bit(0) {
            word.set_msb(value);
        } else {
            word.set_lsb(value);
        }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Cgram(Box<[u16; CGRAM_ENTRIES]>);

impl Cgram {
    pub fn new(power_on: PowerOnMemory) -> Self {
        let mut words: Box<[u16; CGRAM_ENTRIES]> = boxed_words(power_on);
        for word in words.iter_mut() {
            *word &= 0x7FFF;
        }
        words[FIXED_COLOR_INDEX as usize] = 0;

        Self(words)
    }

    #[inline]
    pub fn color(&self, index: u16) -> u16 {
        debug_assert!(index <= FIXED_COLOR_INDEX, "CGRAM index out of range: {index}");
        self.0[usize::from(index) % CGRAM_ENTRIES]
    }

    pub fn set_color(&mut self, index: u8, color: u16) {
        self.0[index as usize] = color & 0x7FFF;
    }

    pub fn fixed_color(&self) -> u16 {
        self.0[FIXED_COLOR_INDEX as usize]
    }

    pub fn set_fixed_color(&mut self, color: u16) {
        self.0[FIXED_COLOR_INDEX as usize] = color & 0x7FFF;
    }

    pub fn palette_colors(&self) -> &[u16] {
        &self.0[..CGRAM_LEN_WORDS]
    }

    pub fn read_byte(&self, address: u32) -> u8 {
        let address = address & CGRAM_BYTE_ADDRESS_MASK;
        let word = self.0[(address >> 1) as usize];
        if address.bit(0) { word.msb() } else { word.lsb() }
    }

    pub fn write_byte(&mut self, address: u32, value: u8) {
        let address = address & CGRAM_BYTE_ADDRESS_MASK;
        let word = &mut self.0[(address >> 1) as usize];
        if address.bit(0) {
            // Colors are 15-bit; bit 7 of the high byte is not stored
            word.set_msb(value & 0x7F);
        } else {
            word.set_lsb(value);
        }
    }
}

/// One sprite's attributes, assembled from its 4 low-table bytes and its 2 high-table bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OamEntry {
    pub x: u16,
    pub y: u8,
    pub tile_number: u16,
    pub palette: u8,
    pub priority: u8,
    pub x_flip: bool,
    pub y_flip: bool,
    pub large: bool,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Oam {
    low: Box<[u16; OAM_LOW_LEN_WORDS]>,
    high: [u8; OAM_HIGH_LEN_BYTES],
}

impl Oam {
    pub fn new(power_on: PowerOnMemory) -> Self {
        let low = boxed_words(power_on);
        let high = std::array::from_fn(|_| power_on.next_word() as u8);
        Self { low, high }
    }

    #[inline]
    pub fn low_word(&self, address: u16) -> u16 {
        self.low[usize::from(address) % OAM_LOW_LEN_WORDS]
    }

    #[inline]
    pub fn set_low_word(&mut self, address: u16, value: u16) {
        self.low[usize::from(address) % OAM_LOW_LEN_WORDS] = value;
    }

    #[inline]
    pub fn high_byte(&self, address: u16) -> u8 {
        self.high[usize::from(address) % OAM_HIGH_LEN_BYTES]
    }

    #[inline]
    pub fn set_high_byte(&mut self, address: u16, value: u8) {
        self.high[usize::from(address) % OAM_HIGH_LEN_BYTES] = value;
    }

    pub fn read_byte(&self, address: u32) -> u8 {
        let address = address & OAM_BYTE_ADDRESS_MASK;
        if address < 0x200 {
            let word = self.low_word((address >> 1) as u16);
            if address.bit(0) { word.msb() } else { word.lsb() }
        } else {
            self.high_byte(address as u16)
        }
    }

    pub fn write_byte(&mut self, address: u32, value: u8) {
        let address = address & OAM_BYTE_ADDRESS_MASK;
        if address < 0x200 {
            let word_addr = (address >> 1) as usize;
            if address.bit(0) {
                self.low[word_addr].set_msb(value);
            } else {
                self.low[word_addr].set_lsb(value);
            }
        } else {
            self.set_high_byte(address as u16, value);
        }
    }

    pub fn sprite(&self, oam_idx: u8) -> OamEntry {
        let oam_idx = oam_idx & 0x7F;

        let oam_low_addr = u16::from(oam_idx) << 1;
        let [x_lsb, y] = self.low_word(oam_low_addr).to_le_bytes();
        let [tile_number_lsb, attributes] = self.low_word(oam_low_addr + 1).to_le_bytes();

        // Each high table byte packs 2 bits for each of 4 consecutive sprites
        let oam_high_shift = 2 * (oam_idx & 3);
        let oam_high_bits = self.high_byte((oam_idx >> 2).into()) >> oam_high_shift;

        OamEntry {
            x: u16::from_le_bytes([x_lsb, u8::from(oam_high_bits.bit(0))]),
            y,
            tile_number: u16::from_le_bytes([tile_number_lsb, u8::from(attributes.bit(0))]),
            palette: (attributes >> 1) & 0x07,
            priority: (attributes >> 4) & 0x03,
            x_flip: attributes.bit(6),
            y_flip: attributes.bit(7),
            large: oam_high_bits.bit(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn vram_bytes_are_little_endian_and_wrap() {
        let mut vram = Vram::new(PowerOnMemory::Zeroed);
        vram.write_byte(0x0000, 0x34);
        vram.write_byte(0x0001, 0x12);
        assert_eq!(0x1234, vram.word(0));

        // 64KB byte space wraps
        vram.write_byte(0x1_0002, 0xAB);
        assert_eq!(0xAB, vram.read_byte(0x0002));
        assert_eq!(0x00AB, vram.word(1));
        assert_eq!(0x00AB, vram.word(0x8001));
    }

    #[test]
    fn cgram_drops_high_bit_and_keeps_fixed_color_separate() {
        let mut cgram = Cgram::new(PowerOnMemory::Zeroed);
        cgram.write_byte(0x1FE, 0xFF);
        cgram.write_byte(0x1FF, 0xFF);
        assert_eq!(0x7FFF, cgram.color(255));
        assert_eq!(0xFF, cgram.read_byte(0x1FE));
        assert_eq!(0x7F, cgram.read_byte(0x1FF));

        // Byte addresses wrap inside the 256 palette entries
        cgram.write_byte(0x200, 0x1F);
        assert_eq!(0x001F, cgram.color(0));
        assert_eq!(0, cgram.fixed_color());

        cgram.set_fixed_color(0xFFFF);
        assert_eq!(0x7FFF, cgram.color(FIXED_COLOR_INDEX));
    }

    #[test]
    fn oam_sprite_reads_both_tables() {
        let mut oam = Oam::new(PowerOnMemory::Zeroed);
        // Sprite 5: X=0x10, Y=0x20, tile 0x42
        // Attributes: y-flip, priority 2, palette 3, tile bit 8
        oam.write_byte(5 * 4, 0x10);
        oam.write_byte(5 * 4 + 1, 0x20);
        oam.write_byte(5 * 4 + 2, 0x42);
        oam.write_byte(5 * 4 + 3, 0b1010_0111);
        // High table byte 1, bits 2-3 belong to sprite 5: X MSB set, large size
        oam.write_byte(0x200 + 1, 0b0000_1100);

        let sprite = oam.sprite(5);
        assert_eq!(
            OamEntry {
                x: 0x110,
                y: 0x20,
                tile_number: 0x142,
                palette: 3,
                priority: 2,
                x_flip: false,
                y_flip: true,
                large: true,
            },
            sprite
        );

        // High table mirrors through $3FF
        assert_eq!(0b0000_1100, oam.read_byte(0x3E1));
        assert_eq!(OAM_LEN_BYTES, 544);
    }
}
