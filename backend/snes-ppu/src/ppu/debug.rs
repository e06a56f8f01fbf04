use crate::memory::VRAM_LEN_WORDS;
use crate::ppu::Ppu;
use crate::ppu::palette::rgb555_to_color;
use crate::ppu::registers::BitDepth;
use ppu_common::frontend::Color;

const MAX_BRIGHTNESS: u8 = 15;

impl Ppu {
    /// All 256 CGRAM colors at full brightness.
    pub fn copy_cgram(&self, out: &mut [Color]) {
        for (out_color, &cgram_color) in out.iter_mut().zip(self.cgram.palette_colors()) {
            *out_color = rgb555_to_color(cgram_color, MAX_BRIGHTNESS);
        }
    }

    /// VRAM decoded as a sheet of 8x8 tiles at the given depth, `row_len` tiles per row. 2bpp and
    /// 4bpp tiles use the given palette; 8bpp tiles index CGRAM directly.
    pub fn copy_vram_tiles(&self, out: &mut [Color], depth: BitDepth, palette: u8, row_len: usize) {
        let tile_len = depth.tile_len_words();
        let tile_count = VRAM_LEN_WORDS / usize::from(tile_len);
        let palette_base = match depth {
            BitDepth::Eight => 0,
            _ => u16::from(palette) * depth.colors_per_palette(),
        };

        for tile_number in 0..tile_count {
            let out_tile_idx = tile_number / row_len * row_len * 64 + (tile_number % row_len) * 8;
            let tile_address = tile_number as u16 * tile_len;

            for row in 0..8 {
                let pixels = depth.decode_row(&self.vram, tile_address + row as u16);
                for (col, &pixel) in pixels.iter().enumerate() {
                    let Some(out_color) = out.get_mut(out_tile_idx + row * row_len * 8 + col)
                    else {
                        return;
                    };

                    let color = if pixel != 0 {
                        self.cgram.color(palette_base + u16::from(pixel))
                    } else {
                        0
                    };
                    *out_color = rgb555_to_color(color, MAX_BRIGHTNESS);
                }
            }
        }
    }
}
