//! Tiled BG layer rendering for modes 0-6

use crate::memory::Vram;
use crate::ppu::SCREEN_WIDTH;
use crate::ppu::compositor::{LayerLine, LayerPixel, PixelColor};
use crate::ppu::registers::{BgLayerRegisters, BgMode, BitDepth, Registers, TileSize};
use ppu_common::num::GetBit;

impl BitDepth {
    /// Decode one 8-pixel tile row. Bitplanes are stored in pairs, one word per row, with each
    /// successive pair 8 words after the previous one.
    pub fn decode_row(self, vram: &Vram, row_address: u16) -> [u8; 8] {
        let mut pixels = [0; 8];
        for pair in 0..self.bitplanes() / 2 {
            let word = vram.word(row_address.wrapping_add(8 * pair));
            for (i, pixel) in pixels.iter_mut().enumerate() {
                let bit = 7 - i as u8;
                let bits = u8::from(word.bit(bit)) | (u8::from(word.bit(bit + 8)) << 1);
                *pixel |= bits << (2 * pair);
            }
        }
        pixels
    }
}

pub fn tile_size_pixels(mode: BgMode, tile_size: TileSize) -> (u16, u16) {
    match (mode.is_hi_res(), tile_size) {
        // Hi-res modes always use 16-pixel-wide tiles
        (true, TileSize::Small) => (16, 8),
        (false, TileSize::Small) => (8, 8),
        (_, TileSize::Large) => (16, 16),
    }
}

/// Vertical mosaic: lines repeat the first line of their block. Blocks start at V=1, the first
/// visible line.
pub fn mosaic_line(v_line: u16, mosaic_size: u16) -> u16 {
    v_line - (v_line.saturating_sub(1) % mosaic_size)
}

/// 8bpp pixel byte BBGGGRRR plus palette bits bgr form a 15-bit color without CGRAM.
pub fn direct_color(color: u8, palette: u8) -> u16 {
    let color = u16::from(color);
    let palette = u16::from(palette);

    let r = ((color & 0x07) << 2) | ((palette & 0x01) << 1);
    let g = (((color >> 3) & 0x07) << 2) | (palette & 0x02);
    let b = (((color >> 6) & 0x03) << 3) | (palette & 0x04);

    r | (g << 5) | (b << 10)
}

fn map_entry(
    vram: &Vram,
    layer: &BgLayerRegisters,
    (tile_width, tile_height): (u16, u16),
    x: u16,
    y: u16,
) -> u16 {
    let tile_col = (x / tile_width) & 63;
    let tile_row = (y / tile_height) & 63;

    // Maps are 1-4 32x32 screens; a size smaller than 2 screens in a direction mirrors
    let mut address = layer.map_base_address;
    if tile_col >= 32 && layer.screen_size.wide() {
        address = address.wrapping_add(32 * 32);
    }
    if tile_row >= 32 && layer.screen_size.tall() {
        let screens_per_row = if layer.screen_size.wide() { 2 } else { 1 };
        address = address.wrapping_add(screens_per_row * 32 * 32);
    }

    vram.word(address.wrapping_add(32 * (tile_row & 31) + (tile_col & 31)))
}

#[derive(Debug, Clone, Copy)]
struct TileRow {
    key: (u16, u16),
    pixels: [u8; 8],
    palette: u8,
    priority: u8,
}

struct LayerContext<'a> {
    vram: &'a Vram,
    layer: &'a BgLayerRegisters,
    depth: BitDepth,
    tile_dimensions: (u16, u16),
}

impl LayerContext<'_> {
    fn fetch_row(&self, x: u16, y: u16) -> TileRow {
        let entry = map_entry(self.vram, self.layer, self.tile_dimensions, x, y);
        let tile_number = entry & 0x03FF;
        let palette = ((entry >> 10) & 0x07) as u8;
        let x_flip = entry.bit(14);
        let y_flip = entry.bit(15);

        let (tile_width, tile_height) = self.tile_dimensions;
        let mut fine_x = x % tile_width;
        let mut fine_y = y % tile_height;
        if x_flip {
            fine_x = tile_width - 1 - fine_x;
        }
        if y_flip {
            fine_y = tile_height - 1 - fine_y;
        }

        // 16-pixel tiles are built from the neighboring 8x8 tiles to the right and below
        let tile_number = tile_number + fine_x / 8 + 16 * (fine_y / 8);
        let row_address = self
            .layer
            .tile_base_address
            .wrapping_add(tile_number.wrapping_mul(self.depth.tile_len_words()))
            .wrapping_add(fine_y % 8);

        let mut pixels = self.depth.decode_row(self.vram, row_address);
        if x_flip {
            pixels.reverse();
        }

        TileRow { key: (x / 8, y), pixels, palette, priority: u8::from(entry.bit(13)) }
    }
}

/// BG1/BG2 scroll values for one column in an offset-per-tile mode (2/4/6). BG3 map entries
/// supply the offsets; BG3 tile N applies to visible BG1/BG2 tile N+1, and the leftmost visible
/// tile always uses the regular scroll registers.
fn offset_per_tile_scroll(vram: &Vram, registers: &Registers, bg: usize, x: u16) -> (u16, u16) {
    let layer = &registers.bgs[bg];
    let screen_tile = (x + (layer.h_scroll & 0x07)) / 8;
    if screen_tile == 0 {
        return (layer.h_scroll, layer.v_scroll);
    }

    let bg3 = &registers.bgs[2];
    let bg3_tile_dimensions = tile_size_pixels(registers.bg_mode, bg3.tile_size);
    let bg3_x = (8 * (screen_tile - 1)).wrapping_add(bg3.h_scroll & !0x07);
    let bg3_y = bg3.v_scroll;

    let (h_entry, v_entry) = if registers.bg_mode == BgMode::Four {
        // One entry per column; bit 15 selects which scroll it replaces
        let entry = map_entry(vram, bg3, bg3_tile_dimensions, bg3_x, bg3_y);
        if entry.bit(15) { (0, entry) } else { (entry, 0) }
    } else {
        (
            map_entry(vram, bg3, bg3_tile_dimensions, bg3_x, bg3_y),
            map_entry(vram, bg3, bg3_tile_dimensions, bg3_x, bg3_y.wrapping_add(8)),
        )
    };

    // Bit 13 enables the offset for BG1, bit 14 for BG2
    let enable_bit = 13 + bg as u8;
    let h_scroll = if h_entry.bit(enable_bit) {
        (h_entry & 0x03F8) | (layer.h_scroll & 0x07)
    } else {
        layer.h_scroll
    };
    let v_scroll = if v_entry.bit(enable_bit) { v_entry & 0x03FF } else { layer.v_scroll };

    (h_scroll, v_scroll)
}

pub fn render_bg_line(
    vram: &Vram,
    registers: &Registers,
    bg: usize,
    depth: BitDepth,
    v_line: u16,
    out: &mut LayerLine,
) {
    let mode = registers.bg_mode;
    let layer = &registers.bgs[bg];
    let hi_res = mode.is_hi_res();
    let offset_per_tile = mode.is_offset_per_tile() && bg < 2;
    let use_direct_color = depth == BitDepth::Eight && registers.color_math.direct_color;

    let mosaic_size = if layer.mosaic { u16::from(registers.mosaic_size) } else { 1 };
    let y = mosaic_line(v_line, mosaic_size);

    // Mode 0 gives each BG its own 32-color region of CGRAM
    let palette_base = if mode == BgMode::Zero { 32 * bg as u16 } else { 0 };

    let context = LayerContext {
        vram,
        layer,
        depth,
        tile_dimensions: tile_size_pixels(mode, layer.tile_size),
    };
    let mut cached_row: Option<TileRow> = None;

    for x in 0..SCREEN_WIDTH as u16 {
        if x % mosaic_size != 0 {
            out[x as usize] = out[(x - 1) as usize];
            continue;
        }

        let (h_scroll, v_scroll) = if offset_per_tile {
            offset_per_tile_scroll(vram, registers, bg, x)
        } else {
            (layer.h_scroll, layer.v_scroll)
        };
        let (h_scroll, v_scroll) = (h_scroll & 0x03FF, v_scroll & 0x03FF);

        // Hi-res layers are 512 pixels wide with doubled H scroll; this row keeps the odd pixel
        // of each pair, which is the main screen's half
        let (map_x, map_y) = if hi_res {
            ((2 * x + 1).wrapping_add(h_scroll << 1), y.wrapping_add(v_scroll))
        } else {
            (x.wrapping_add(h_scroll), y.wrapping_add(v_scroll))
        };

        let row = match cached_row {
            Some(row) if row.key == (map_x / 8, map_y) => row,
            _ => {
                let row = context.fetch_row(map_x, map_y);
                cached_row = Some(row);
                row
            }
        };

        let color = row.pixels[(map_x % 8) as usize];
        out[x as usize] = (color != 0).then(|| {
            let color = if use_direct_color {
                PixelColor::Direct(direct_color(color, row.palette))
            } else if depth == BitDepth::Eight {
                PixelColor::Cgram(color.into())
            } else {
                PixelColor::Cgram(
                    palette_base
                        + u16::from(row.palette) * depth.colors_per_palette()
                        + u16::from(color),
                )
            };
            LayerPixel { color, priority: row.priority, blendable: true }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PowerOnMemory;
    use test_log::test;

    fn write_tile_row(vram: &mut Vram, row_address: u16, depth: BitDepth, pixels: [u8; 8]) {
        for pair in 0..depth.bitplanes() / 2 {
            let mut word = 0_u16;
            for (i, &pixel) in pixels.iter().enumerate() {
                let bits = pixel >> (2 * pair);
                let bit = 7 - i;
                word |= u16::from(bits & 1) << bit;
                word |= u16::from((bits >> 1) & 1) << (bit + 8);
            }
            *vram.word_mut(row_address + 8 * pair) = word;
        }
    }

    #[test]
    fn decode_all_depths() {
        let mut vram = Vram::new(PowerOnMemory::Zeroed);
        let rows = [
            (BitDepth::Two, [0, 1, 2, 3, 3, 2, 1, 0]),
            (BitDepth::Four, [0, 15, 7, 8, 1, 2, 4, 9]),
            (BitDepth::Eight, [0, 255, 128, 127, 1, 0x55, 0xAA, 3]),
        ];
        for (i, (depth, pixels)) in rows.into_iter().enumerate() {
            let address = 0x100 * i as u16;
            write_tile_row(&mut vram, address, depth, pixels);
            assert_eq!(pixels, depth.decode_row(&vram, address), "{depth:?}");
        }
    }

    #[test]
    fn direct_color_bits() {
        // Channels top out at 30/30/28
        assert_eq!(0x73DE, direct_color(0xFF, 0x07));
        assert_eq!(0x001C, direct_color(0x07, 0x00));
        // Palette bits fill the low bit of each channel's upper 4 bits
        assert_eq!(0x1000 | 0x0040 | 0x0002, direct_color(0x00, 0x07));
    }

    #[test]
    fn vertical_mosaic_blocks_start_at_first_visible_line() {
        assert_eq!(1, mosaic_line(1, 4));
        assert_eq!(1, mosaic_line(4, 4));
        assert_eq!(5, mosaic_line(5, 4));
        assert_eq!(7, mosaic_line(7, 1));
    }

    #[test]
    fn map_entry_screens() {
        let mut vram = Vram::new(PowerOnMemory::Zeroed);
        let mut layer =
            BgLayerRegisters { map_base_address: 0x1000, ..BgLayerRegisters::default() };

        // Entry at tile (33, 34) of a four-screen map lives in the bottom-right screen
        *vram.word_mut(0x1000 + 3 * 0x400 + 32 * 2 + 1) = 0xBEEF;
        layer.screen_size = crate::ppu::registers::BgScreenSize::FourScreen;
        assert_eq!(0xBEEF, map_entry(&vram, &layer, (8, 8), 33 * 8, 34 * 8));

        // One-screen maps mirror
        *vram.word_mut(0x1000 + 32 * 2 + 1) = 0x1234;
        layer.screen_size = crate::ppu::registers::BgScreenSize::OneScreen;
        assert_eq!(0x1234, map_entry(&vram, &layer, (8, 8), 33 * 8, 34 * 8));
        assert_eq!(0x1234, map_entry(&vram, &layer, (8, 8), 8, 2 * 8));
    }
}
