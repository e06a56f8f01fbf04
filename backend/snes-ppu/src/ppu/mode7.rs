//! Mode 7 affine-transformed BG1 (and the EXTBG BG2 view of the same pixels)

use crate::memory::Vram;
use crate::ppu::SCREEN_WIDTH;
use crate::ppu::background;
use crate::ppu::compositor::{LayerLine, LayerPixel, PixelColor};
use crate::ppu::registers::{Mode7OobBehavior, Mode7Registers, Registers};
use ppu_common::num::U16Ext;

// 128x128 tiles of 8x8 pixels
const TEXTURE_SIZE: i32 = 1024;

// Scroll minus center is clipped to 10 bits of magnitude but keeps the sign of the full result
fn clip_scroll_offset(value: i32) -> i32 {
    (value & 0x03FF) | ((value >> 31) & !0x03FF)
}

// The hardware drops the low 6 bits of several intermediate products
fn truncate(value: i32) -> i32 {
    value & !0x3F
}

/// Map a screen position to a texture pixel coordinate. The matrix parameters are 8.8 fixed
/// point; the result can fall outside the 1024x1024 texture.
pub fn transform(mode_7: &Mode7Registers, screen_x: u16, screen_y: u16) -> (i32, i32) {
    let a = i32::from(mode_7.a);
    let b = i32::from(mode_7.b);
    let c = i32::from(mode_7.c);
    let d = i32::from(mode_7.d);
    let center_x = i32::from(mode_7.center_x);
    let center_y = i32::from(mode_7.center_y);

    let screen_x = i32::from(if mode_7.h_flip { 255 - screen_x } else { screen_x });
    let screen_y = i32::from(if mode_7.v_flip { 255 - (screen_y & 0xFF) } else { screen_y });

    let offset_x = clip_scroll_offset(i32::from(mode_7.h_scroll) - center_x);
    let offset_y = clip_scroll_offset(i32::from(mode_7.v_scroll) - center_y);

    let texture_x = truncate(a * offset_x)
        + a * screen_x
        + truncate(b * offset_y)
        + truncate(b * screen_y)
        + (center_x << 8);
    let texture_y = truncate(c * offset_x)
        + c * screen_x
        + truncate(d * offset_y)
        + truncate(d * screen_y)
        + (center_y << 8);

    (texture_x >> 8, texture_y >> 8)
}

/// Texture pixel at a transformed coordinate; 0 is transparent.
fn texture_pixel(vram: &Vram, oob_behavior: Mode7OobBehavior, x: i32, y: i32) -> u8 {
    let in_bounds = (0..TEXTURE_SIZE).contains(&x) && (0..TEXTURE_SIZE).contains(&y);

    let (x, y, tile_number) = if in_bounds {
        (x, y, None)
    } else {
        match oob_behavior {
            Mode7OobBehavior::Wrap => (x & (TEXTURE_SIZE - 1), y & (TEXTURE_SIZE - 1), None),
            Mode7OobBehavior::Transparent => return 0,
            Mode7OobBehavior::Tile0 => (x & 0x07, y & 0x07, Some(0)),
        }
    };

    // Tilemap bytes are the low bytes of the first 16K words, pixel bytes are the high bytes
    let tile_number = tile_number.unwrap_or_else(|| {
        let map_address = (y / 8) * (TEXTURE_SIZE / 8) + x / 8;
        vram.word(map_address as u16).lsb()
    });

    let pixel_address = 64 * u16::from(tile_number) + 8 * (y & 0x07) as u16 + (x & 0x07) as u16;
    vram.word(pixel_address).msb()
}

pub fn render_mode_7_line(
    vram: &Vram,
    registers: &Registers,
    v_line: u16,
    bg1_out: &mut LayerLine,
    bg2_out: Option<&mut LayerLine>,
) {
    let mode_7 = &registers.mode_7;

    // Vertical mosaic follows BG1's setting for both views
    let bg1_mosaic = registers.bgs[0].mosaic;
    let mosaic_size = u16::from(registers.mosaic_size);
    let y = if bg1_mosaic { background::mosaic_line(v_line, mosaic_size) } else { v_line };

    let mut texture_row = [0_u8; SCREEN_WIDTH];
    for (x, pixel) in (0..).zip(texture_row.iter_mut()) {
        let (texture_x, texture_y) = transform(mode_7, x, y);
        *pixel = texture_pixel(vram, mode_7.oob_behavior, texture_x, texture_y);
    }

    let mosaic_source = |mosaic: bool, x: usize| {
        if mosaic { x - x % usize::from(mosaic_size) } else { x }
    };

    let direct_color = registers.color_math.direct_color;
    for (x, out) in bg1_out.iter_mut().enumerate() {
        let color = texture_row[mosaic_source(bg1_mosaic, x)];
        *out = (color != 0).then(|| LayerPixel {
            color: if direct_color {
                PixelColor::Direct(background::direct_color(color, 0))
            } else {
                PixelColor::Cgram(color.into())
            },
            priority: 0,
            blendable: true,
        });
    }

    // EXTBG: bit 7 of the pixel becomes a priority bit and the rest is a 128-color index
    if let Some(bg2_out) = bg2_out {
        let bg2_mosaic = registers.bgs[1].mosaic;
        for (x, out) in bg2_out.iter_mut().enumerate() {
            let color = texture_row[mosaic_source(bg2_mosaic, x)];
            *out = (color & 0x7F != 0).then(|| LayerPixel {
                color: PixelColor::Cgram((color & 0x7F).into()),
                priority: color >> 7,
                blendable: true,
            });
        }
    }
}
