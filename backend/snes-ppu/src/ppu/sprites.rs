//! Sprite evaluation, tile fetch, and line rendering
//!
//! Each line runs in three phases, as on hardware:
//! 1. Range evaluation scans OAM in index order (starting from the priority rotation index) and
//!    keeps the first sprites that intersect the line, up to the per-line sprite limit.
//! 2. Tile fetch walks the kept sprites in reverse order, fetching each sprite's onscreen 8x8
//!    tiles left to right, up to the per-line tile limit.
//! 3. Rendering draws the fetched tiles in fetch order with later tiles overwriting earlier
//!    ones, so lower OAM indices end up in front regardless of their priority bits.

use crate::api::SpriteLimits;
use crate::memory::{Oam, OamEntry, Vram};
use crate::ppu::SCREEN_WIDTH;
use crate::ppu::compositor::{LayerLine, LayerPixel, PixelColor};
use crate::ppu::registers::{BitDepth, ObjRegisters};
use bincode::{Decode, Encode};
use ppu_common::num::GetBit;

const OBJ_PALETTE_BASE: u16 = 128;

/// Only sprites using OBJ palettes 4-7 take part in color math.
pub const fn obj_palette_blends(palette: u8) -> bool {
    palette >= 4
}

fn line_overlaps_sprite(line: u16, sprite_y: u8, sprite_height: u16) -> bool {
    // Sprites wrap vertically, so a sprite near the bottom can cover the top lines
    u16::from((line as u8).wrapping_sub(sprite_y)) < sprite_height
}

fn tile_onscreen(x: u16, width: u16) -> bool {
    // X is 9 bits; positions 256-511 are onscreen only if the sprite wraps past 511
    x < SCREEN_WIDTH as u16 || x + width > 512
}

#[derive(Debug, Clone, Copy, Encode, Decode)]
struct SpriteTile {
    x: u16,
    palette: u8,
    priority: u8,
    colors: [u8; 8],
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct SpriteProcessor {
    in_range: Vec<u8>,
    tiles: Vec<SpriteTile>,
    range_over: bool,
    time_over: bool,
}

impl SpriteProcessor {
    pub fn new() -> Self {
        Self {
            in_range: Vec::with_capacity(32),
            tiles: Vec::with_capacity(34),
            range_over: false,
            time_over: false,
        }
    }

    pub fn range_over(&self) -> bool {
        self.range_over
    }

    pub fn time_over(&self) -> bool {
        self.time_over
    }

    pub fn clear_flags(&mut self) {
        self.range_over = false;
        self.time_over = false;
    }

    fn sprite_size(obj: &ObjRegisters, sprite: &OamEntry) -> (u16, u16) {
        obj.sizes.get(sprite.large)
    }

    pub fn evaluate(
        &mut self,
        oam: &Oam,
        obj: &ObjRegisters,
        first_sprite: u8,
        limits: SpriteLimits,
        line: u16,
    ) {
        self.in_range.clear();

        for i in 0..128 {
            let oam_idx = first_sprite.wrapping_add(i) & 0x7F;
            let sprite = oam.sprite(oam_idx);
            let (width, height) = Self::sprite_size(obj, &sprite);

            if !line_overlaps_sprite(line, sprite.y, height) || !tile_onscreen(sprite.x, width) {
                continue;
            }

            if self.in_range.len() == limits.sprites_per_line() {
                if !self.range_over {
                    log::debug!(
                        "Sprite range over on line {line}: more than {} sprites",
                        limits.sprites_per_line()
                    );
                }
                self.range_over = true;
                break;
            }

            self.in_range.push(oam_idx);
        }

        log::trace!("Line {line}: {} sprites in range", self.in_range.len());
    }

    pub fn fetch_tiles(
        &mut self,
        vram: &Vram,
        oam: &Oam,
        obj: &ObjRegisters,
        limits: SpriteLimits,
        line: u16,
    ) {
        self.tiles.clear();

        for &oam_idx in self.in_range.iter().rev() {
            let sprite = oam.sprite(oam_idx);
            let (width, height) = Self::sprite_size(obj, &sprite);

            let mut sprite_row = u16::from((line as u8).wrapping_sub(sprite.y)) & (height - 1);
            if sprite.y_flip {
                sprite_row = height - 1 - sprite_row;
            }

            for tile_idx in 0..width / 8 {
                let tile_x = if sprite.x_flip {
                    sprite.x + (width - 8) - 8 * tile_idx
                } else {
                    sprite.x + 8 * tile_idx
                } & 0x01FF;

                if !tile_onscreen(tile_x, 8) {
                    continue;
                }

                if self.tiles.len() == limits.tiles_per_line() {
                    if !self.time_over {
                        log::debug!(
                            "Sprite time over on line {line}: more than {} tiles",
                            limits.tiles_per_line()
                        );
                    }
                    self.time_over = true;
                    log::trace!("Line {line}: fetched {} sprite tiles", self.tiles.len());
                    return;
                }

                // Tile numbers for multi-tile sprites wrap within each nibble instead of carrying
                let tile_number = sprite.tile_number;
                let tile_number = (tile_number & !0x0F) | ((tile_number + tile_idx) & 0x0F);
                let tile_number =
                    (tile_number & !0xF0) | ((tile_number + 16 * (sprite_row / 8)) & 0xF0);

                // The second 256-tile page is offset by the OBSEL gap
                let tile_len = BitDepth::OBJ.tile_len_words();
                let page_base = if tile_number.bit(8) {
                    obj.tile_base_address.wrapping_add(256 * tile_len + obj.tile_gap)
                } else {
                    obj.tile_base_address
                };
                let row_address = page_base
                    .wrapping_add((tile_number & 0xFF) * tile_len)
                    .wrapping_add(sprite_row % 8);

                let mut colors = BitDepth::OBJ.decode_row(vram, row_address);
                if sprite.x_flip {
                    colors.reverse();
                }

                self.tiles.push(SpriteTile {
                    x: tile_x,
                    palette: sprite.palette,
                    priority: sprite.priority,
                    colors,
                });
            }
        }

        log::trace!("Line {line}: fetched {} sprite tiles", self.tiles.len());
    }

    /// Skip a line entirely (forced blank): nothing is evaluated or drawn.
    pub fn clear_line(&mut self) {
        self.in_range.clear();
        self.tiles.clear();
    }

    pub fn render(&self, out: &mut LayerLine) {
        out.fill(None);

        for tile in &self.tiles {
            for (dx, &color) in (0..).zip(&tile.colors) {
                let x = (tile.x + dx) & 0x01FF;
                if x >= SCREEN_WIDTH as u16 || color == 0 {
                    continue;
                }

                out[x as usize] = Some(LayerPixel {
                    color: PixelColor::Cgram(
                        OBJ_PALETTE_BASE + 16 * u16::from(tile.palette) + u16::from(color),
                    ),
                    priority: tile.priority,
                    blendable: obj_palette_blends(tile.palette),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PowerOnMemory;
    use crate::memory::Oam;
    use test_log::test;

    fn set_sprite(oam: &mut Oam, idx: u8, x: u16, y: u8, tile: u8, attributes: u8, large: bool) {
        let base = 4 * u32::from(idx);
        oam.write_byte(base, x as u8);
        oam.write_byte(base + 1, y);
        oam.write_byte(base + 2, tile);
        oam.write_byte(base + 3, attributes);

        let high_address = 0x200 + u32::from(idx >> 2);
        let shift = 2 * (idx & 3);
        let mut high = oam.read_byte(high_address) & !(0x03 << shift);
        high |= (u8::from(x.bit(8)) | (u8::from(large) << 1)) << shift;
        oam.write_byte(high_address, high);
    }

    fn hide_all(oam: &mut Oam) {
        for idx in 0..128 {
            set_sprite(oam, idx, 0, 0xF0, 0, 0, false);
        }
    }

    // Tile N: every row is solid color (N & 0x0F), or 1 for tile 0
    fn solid_tiles(vram: &mut Vram) {
        for tile in 0..256_u16 {
            let color = if tile & 0x0F == 0 { 1 } else { (tile & 0x0F) as u8 };
            for row in 0..8 {
                let address = tile * 16 + row;
                let plane = |bit: u8| if color.bit(bit) { 0xFF } else { 0x00 };
                *vram.word_mut(address) = u16::from_le_bytes([plane(0), plane(1)]);
                *vram.word_mut(address + 8) = u16::from_le_bytes([plane(2), plane(3)]);
            }
        }
    }

    #[test]
    fn range_over_keeps_first_32_sprites() {
        let mut oam = Oam::new(PowerOnMemory::Zeroed);
        hide_all(&mut oam);
        for idx in 0..40 {
            set_sprite(&mut oam, idx, u16::from(idx) * 6, 10, 0, 0, false);
        }

        let mut sprites = SpriteProcessor::new();
        sprites.evaluate(&oam, &ObjRegisters::default(), 0, SpriteLimits::default(), 12);

        assert_eq!((0..32).collect::<Vec<u8>>(), sprites.in_range);
        assert!(sprites.range_over());
        assert!(!sprites.time_over());
    }

    #[test]
    fn priority_rotation_changes_first_sprite() {
        let mut oam = Oam::new(PowerOnMemory::Zeroed);
        hide_all(&mut oam);
        for idx in 0..40 {
            set_sprite(&mut oam, idx, 0, 10, 0, 0, false);
        }

        let mut sprites = SpriteProcessor::new();
        sprites.evaluate(&oam, &ObjRegisters::default(), 20, SpriteLimits::default(), 10);

        assert_eq!((20..40).chain(0..12).collect::<Vec<u8>>(), sprites.in_range);
        assert!(sprites.range_over());
    }

    #[test]
    fn time_over_without_range_over() {
        let mut vram = Vram::new(PowerOnMemory::Zeroed);
        solid_tiles(&mut vram);
        let mut oam = Oam::new(PowerOnMemory::Zeroed);
        hide_all(&mut oam);

        // OBSEL size 1: 8x8 / 32x32; 10 large sprites are 40 tiles
        let obj = ObjRegisters {
            sizes: crate::ppu::registers::ObjSizes { small: (8, 8), large: (32, 32) },
            ..ObjRegisters::default()
        };
        for idx in 0..10 {
            set_sprite(&mut oam, idx, u16::from(idx) * 24, 0, 0, 0, true);
        }

        let mut sprites = SpriteProcessor::new();
        sprites.evaluate(&oam, &obj, 0, SpriteLimits::default(), 5);
        sprites.fetch_tiles(&vram, &oam, &obj, SpriteLimits::default(), 5);

        assert!(!sprites.range_over());
        assert!(sprites.time_over());
        assert_eq!(34, sprites.tiles.len());

        // Fetch runs from the highest index down: sprites 9-2 fetch 32 tiles, sprite 1 gets its
        // first 2 tiles, and sprite 0 gets nothing
        let mut line = [None; SCREEN_WIDTH];
        sprites.render(&mut line);
        assert!(line[0..24].iter().all(Option::is_none));
        assert!(line[24..40].iter().all(Option::is_some));
        assert!(line[40..48].iter().all(Option::is_none));
        assert!(line[48..248].iter().all(Option::is_some));
        assert!(line[248..].iter().all(Option::is_none));
    }

    #[test]
    fn large_sprite_tile_numbers_wrap_within_nibble() {
        let mut vram = Vram::new(PowerOnMemory::Zeroed);
        solid_tiles(&mut vram);
        let mut oam = Oam::new(PowerOnMemory::Zeroed);
        hide_all(&mut oam);

        // 16x16 sprite using tile 0x0F: right half is tile 0x00, not 0x10
        set_sprite(&mut oam, 0, 0, 0, 0x0F, 0, true);

        let obj = ObjRegisters::default();
        let mut sprites = SpriteProcessor::new();
        sprites.evaluate(&oam, &obj, 0, SpriteLimits::default(), 0);
        sprites.fetch_tiles(&vram, &oam, &obj, SpriteLimits::default(), 0);

        let mut line = [None; SCREEN_WIDTH];
        sprites.render(&mut line);
        assert_eq!(Some(PixelColor::Cgram(128 + 15)), line[0].map(|pixel| pixel.color));
        assert_eq!(Some(PixelColor::Cgram(128 + 1)), line[8].map(|pixel| pixel.color));
    }

    #[test]
    fn lower_index_wins_and_palette_half_controls_blending() {
        let mut vram = Vram::new(PowerOnMemory::Zeroed);
        solid_tiles(&mut vram);
        let mut oam = Oam::new(PowerOnMemory::Zeroed);
        hide_all(&mut oam);

        // Sprite 0: tile 2, palette 1, priority 0; sprite 1: tile 3, palette 5, priority 3
        set_sprite(&mut oam, 0, 4, 20, 2, 0b0000_0010, false);
        set_sprite(&mut oam, 1, 0, 20, 3, 0b0011_1010, false);

        let obj = ObjRegisters::default();
        let mut sprites = SpriteProcessor::new();
        sprites.evaluate(&oam, &obj, 0, SpriteLimits::default(), 20);
        sprites.fetch_tiles(&vram, &oam, &obj, SpriteLimits::default(), 20);

        let mut line = [None; SCREEN_WIDTH];
        sprites.render(&mut line);

        let front = line[5].expect("sprite pixel");
        assert_eq!(PixelColor::Cgram(128 + 16 + 2), front.color);
        assert_eq!(0, front.priority);
        assert!(!front.blendable);

        let back = line[0].expect("sprite pixel");
        assert_eq!(PixelColor::Cgram(128 + 5 * 16 + 3), back.color);
        assert_eq!(3, back.priority);
        assert!(back.blendable);
    }

    #[test]
    fn sprites_wrap_vertically_and_horizontally() {
        assert!(line_overlaps_sprite(3, 250, 16));
        assert!(!line_overlaps_sprite(10, 250, 16));
        assert!(tile_onscreen(508, 8));
        assert!(!tile_onscreen(300, 8));
    }
}
