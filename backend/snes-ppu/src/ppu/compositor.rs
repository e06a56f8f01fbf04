//! Priority table and main/sub scanline buffers
//!
//! Each layer renders into its own [`LayerLine`]; the compositor then merges the layers into the
//! main and sub screen buffers, where a pixel only lands if its priority slot is at least the
//! slot already stored in that column.

use crate::memory::{Cgram, FIXED_COLOR_INDEX};
use crate::ppu::SCREEN_WIDTH;
use crate::ppu::registers::{BgMode, COLOR_WINDOW_CHANNEL, OBJ_WINDOW_CHANNEL, Registers, Screen};
use crate::ppu::window::WindowMasks;
use bincode::{Decode, Encode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Layer {
    Bg1,
    Bg2,
    Bg3,
    Bg4,
    Obj,
    Backdrop,
}

impl Layer {
    pub fn window_channel(self) -> usize {
        match self {
            Self::Bg1 => 0,
            Self::Bg2 => 1,
            Self::Bg3 => 2,
            Self::Bg4 => 3,
            Self::Obj => OBJ_WINDOW_CHANNEL,
            Self::Backdrop => COLOR_WINDOW_CHANNEL,
        }
    }
}

/// Priority slots for one (mode, BG3 priority bit) combination. Higher slots win; slot 0 is the
/// backdrop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSlots {
    // [bg][tile priority bit]
    pub bg: [[u8; 2]; 4],
    // [OBJ priority 0-3]
    pub obj: [u8; 4],
}

const FOUR_BG_SLOTS: LayerSlots =
    LayerSlots { bg: [[8, 11], [7, 10], [2, 5], [1, 4]], obj: [3, 6, 9, 12] };

// BGMODE bit 3 lifts BG3 priority-1 tiles above everything, in mode 1 only
const MODE_1_BG3_HIGH_SLOTS: LayerSlots =
    LayerSlots { bg: [[8, 11], [7, 10], [2, 13], [1, 4]], obj: [3, 6, 9, 12] };

const TWO_BG_SLOTS: LayerSlots =
    LayerSlots { bg: [[3, 7], [1, 5], [0, 0], [0, 0]], obj: [2, 4, 6, 8] };

/// `PRIORITY_TABLE[mode][bg3 priority bit]`
pub const PRIORITY_TABLE: [[LayerSlots; 2]; 8] = [
    [FOUR_BG_SLOTS, FOUR_BG_SLOTS],
    [FOUR_BG_SLOTS, MODE_1_BG3_HIGH_SLOTS],
    [TWO_BG_SLOTS, TWO_BG_SLOTS],
    [TWO_BG_SLOTS, TWO_BG_SLOTS],
    [TWO_BG_SLOTS, TWO_BG_SLOTS],
    [TWO_BG_SLOTS, TWO_BG_SLOTS],
    [TWO_BG_SLOTS, TWO_BG_SLOTS],
    [TWO_BG_SLOTS, TWO_BG_SLOTS],
];

pub fn priority_slot(mode: BgMode, bg3_high_priority: bool, layer: Layer, priority: u8) -> u8 {
    let slots = &PRIORITY_TABLE[mode.number()][usize::from(bg3_high_priority)];
    match layer {
        Layer::Bg1 | Layer::Bg2 | Layer::Bg3 | Layer::Bg4 => {
            slots.bg[layer.window_channel()][usize::from(priority & 1)]
        }
        Layer::Obj => slots.obj[usize::from(priority & 3)],
        Layer::Backdrop => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum PixelColor {
    Cgram(u16),
    Direct(u16),
}

impl PixelColor {
    pub fn rgb555(self, cgram: &Cgram) -> u16 {
        match self {
            Self::Cgram(index) => cgram.color(index),
            Self::Direct(color) => color,
        }
    }
}

/// One opaque pixel produced by a layer renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct LayerPixel {
    pub color: PixelColor,
    // BG: tile priority bit; OBJ: 0-3
    pub priority: u8,
    // OBJ palettes 0-3 never take part in color math
    pub blendable: bool,
}

/// `None` is a transparent pixel.
pub type LayerLine = [Option<LayerPixel>; SCREEN_WIDTH];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct LinePixel {
    pub color: PixelColor,
    pub layer: Layer,
    pub slot: u8,
    pub blendable: bool,
}

impl LinePixel {
    fn backdrop(color: PixelColor) -> Self {
        Self { color, layer: Layer::Backdrop, slot: 0, blendable: true }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct ScanlineBuffer {
    pixels: Box<[LinePixel; SCREEN_WIDTH]>,
}

impl ScanlineBuffer {
    fn new(backdrop: PixelColor) -> Self {
        Self { pixels: Box::new([LinePixel::backdrop(backdrop); SCREEN_WIDTH]) }
    }

    fn fill(&mut self, backdrop: PixelColor) {
        self.pixels.fill(LinePixel::backdrop(backdrop));
    }

    fn draw(&mut self, x: usize, pixel: LinePixel) {
        if pixel.slot >= self.pixels[x].slot {
            self.pixels[x] = pixel;
        }
    }

    #[inline]
    pub fn get(&self, x: usize) -> LinePixel {
        self.pixels[x]
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Compositor {
    pub main: ScanlineBuffer,
    pub sub: ScanlineBuffer,
}

impl Compositor {
    pub fn new() -> Self {
        Self {
            main: ScanlineBuffer::new(PixelColor::Cgram(0)),
            sub: ScanlineBuffer::new(PixelColor::Cgram(FIXED_COLOR_INDEX)),
        }
    }

    /// Seed the main screen with CGRAM color 0 and the sub screen with the fixed color.
    pub fn begin_line(&mut self) {
        self.main.fill(PixelColor::Cgram(0));
        self.sub.fill(PixelColor::Cgram(FIXED_COLOR_INDEX));
    }

    pub fn draw_layer(
        &mut self,
        layer: Layer,
        line: &LayerLine,
        registers: &Registers,
        window_masks: &WindowMasks,
        draw_sub_screen: bool,
    ) {
        let designation = match layer {
            Layer::Bg1 | Layer::Bg2 | Layer::Bg3 | Layer::Bg4 => {
                &registers.bgs[layer.window_channel()].designation
            }
            Layer::Obj => &registers.obj.designation,
            Layer::Backdrop => return,
        };
        let channel = layer.window_channel();

        for screen in [Screen::Main, Screen::Sub] {
            if !designation.enabled(screen) || (screen == Screen::Sub && !draw_sub_screen) {
                continue;
            }

            let window_clip = designation.window_clip(screen);
            let buffer = match screen {
                Screen::Main => &mut self.main,
                Screen::Sub => &mut self.sub,
            };

            for (x, pixel) in line.iter().enumerate() {
                let Some(pixel) = *pixel else { continue };

                if window_clip && window_masks.in_window(channel, x) {
                    continue;
                }

                let slot = priority_slot(
                    registers.bg_mode,
                    registers.bg3_high_priority,
                    layer,
                    pixel.priority,
                );
                buffer.draw(
                    x,
                    LinePixel { color: pixel.color, layer, slot, blendable: pixel.blendable },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    // Highest to lowest, as listed in hardware documentation
    fn ordering(mode: BgMode, bg3_high: bool) -> Vec<(Layer, u8)> {
        let mut entries: Vec<_> = [Layer::Bg1, Layer::Bg2, Layer::Bg3, Layer::Bg4]
            .into_iter()
            .flat_map(|layer| [(layer, 0), (layer, 1)])
            .chain((0..4).map(|priority| (Layer::Obj, priority)))
            .filter(|&(layer, priority)| priority_slot(mode, bg3_high, layer, priority) != 0)
            .collect();
        entries.sort_by_key(|&(layer, priority)| {
            std::cmp::Reverse(priority_slot(mode, bg3_high, layer, priority))
        });
        entries
    }

    #[test]
    fn mode_1_order() {
        use Layer::*;

        assert_eq!(
            vec![
                (Obj, 3),
                (Bg1, 1),
                (Bg2, 1),
                (Obj, 2),
                (Bg1, 0),
                (Bg2, 0),
                (Obj, 1),
                (Bg3, 1),
                (Bg4, 1),
                (Obj, 0),
                (Bg3, 0),
                (Bg4, 0),
            ],
            ordering(BgMode::One, false)
        );

        assert_eq!((Bg3, 1), ordering(BgMode::One, true)[0]);
        // Mode 0 ignores the BG3 priority bit
        assert_eq!(ordering(BgMode::Zero, false), ordering(BgMode::Zero, true));
    }

    #[test]
    fn two_layer_mode_order() {
        use Layer::*;

        let expected =
            vec![(Obj, 3), (Bg1, 1), (Obj, 2), (Bg2, 1), (Obj, 1), (Bg1, 0), (Obj, 0), (Bg2, 0)];
        for mode in [BgMode::Two, BgMode::Three, BgMode::Four, BgMode::Five, BgMode::Seven] {
            assert_eq!(expected, ordering(mode, true), "{mode:?}");
        }
    }

    #[test]
    fn slots_are_unique_per_mode() {
        for mode in 0..8 {
            for bg3 in 0..2 {
                let slots = PRIORITY_TABLE[mode][bg3];
                let mut all: Vec<u8> =
                    slots.bg.iter().flatten().copied().chain(slots.obj).collect();
                all.retain(|&slot| slot != 0);
                let len = all.len();
                all.sort_unstable();
                all.dedup();
                assert_eq!(len, all.len(), "mode {mode} bg3 {bg3}");
            }
        }
    }

    #[test]
    fn lower_slots_never_overwrite() {
        let mut buffer = ScanlineBuffer::new(PixelColor::Cgram(0));
        let high =
            LinePixel { color: PixelColor::Cgram(5), layer: Layer::Bg1, slot: 11, blendable: true };
        let low =
            LinePixel { color: PixelColor::Cgram(9), layer: Layer::Bg3, slot: 2, blendable: true };

        buffer.draw(0, high);
        buffer.draw(0, low);
        assert_eq!(high, buffer.get(0));

        buffer.draw(1, low);
        buffer.draw(1, high);
        assert_eq!(high, buffer.get(1));

        assert_eq!(Layer::Backdrop, buffer.get(2).layer);
    }
}
