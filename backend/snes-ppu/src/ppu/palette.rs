//! CGRAM to display color conversion with master brightness applied

use crate::memory::{CGRAM_ENTRIES, Cgram};
use bincode::{Decode, Encode};
use ppu_common::frontend::Color;

// [brightness][5-bit channel] -> 8-bit channel
const BRIGHTNESS_TABLE: [[u8; 32]; 16] = brightness_table();

const fn brightness_table() -> [[u8; 32]; 16] {
    let mut table = [[0; 32]; 16];

    // Brightness 0 stays all black
    let mut brightness = 1;
    while brightness < 16 {
        let mut channel = 0;
        while channel < 32 {
            let scaled = (channel * (brightness + 1) / 16) as u8;
            table[brightness][channel] = (scaled << 3) | (scaled >> 2);
            channel += 1;
        }
        brightness += 1;
    }

    table
}

pub fn rgb555_to_color(color: u16, brightness: u8) -> Color {
    let table = &BRIGHTNESS_TABLE[(brightness & 0x0F) as usize];
    let r = table[(color & 0x1F) as usize];
    let g = table[((color >> 5) & 0x1F) as usize];
    let b = table[((color >> 10) & 0x1F) as usize];
    Color::rgb(r, g, b)
}

/// All CGRAM entries (fixed color included) pre-converted at the current brightness.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Palette {
    resolved: Box<[Color; CGRAM_ENTRIES]>,
    brightness: u8,
}

impl Palette {
    pub fn new() -> Self {
        Self {
            resolved: vec![Color::BLACK; CGRAM_ENTRIES].into_boxed_slice().try_into().unwrap(),
            brightness: 0,
        }
    }

    pub fn rebuild(&mut self, cgram: &Cgram, brightness: u8) {
        self.brightness = brightness;
        for (index, resolved) in (0..).zip(self.resolved.iter_mut()) {
            *resolved = rgb555_to_color(cgram.color(index), brightness);
        }
    }

    #[inline]
    pub fn resolve(&self, index: u16) -> Color {
        self.resolved[usize::from(index) % CGRAM_ENTRIES]
    }

    /// Convert a color that is not in CGRAM (blend results, direct color).
    #[inline]
    pub fn convert(&self, color: u16) -> Color {
        rgb555_to_color(color, self.brightness)
    }
}
