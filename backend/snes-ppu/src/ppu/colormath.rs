//! Color math between the main screen and the sub screen (or fixed color), and the final
//! conversion of a composited row to display colors

use crate::memory::Cgram;
use crate::ppu::compositor::{Compositor, Layer, PixelColor};
use crate::ppu::palette::Palette;
use crate::ppu::registers::{
    COLOR_WINDOW_CHANNEL, ColorMathOperation, ColorWindowCondition, Registers,
};
use crate::ppu::window::WindowMasks;
use ppu_common::frontend::Color;

impl ColorMathOperation {
    /// Per-channel add (clamped to 31) or subtract (clamped to 0), optionally halved afterwards.
    pub fn blend(self, main: u16, sub: u16, half: bool) -> u16 {
        let channels = [0, 5, 10].map(|shift| {
            let a = (main >> shift) & 0x1F;
            let b = (sub >> shift) & 0x1F;
            let value = match self {
                Self::Add => a + b,
                Self::Subtract => a.saturating_sub(b),
            };
            if half { value >> 1 } else { value.min(0x1F) }
        });

        channels[0] | (channels[1] << 5) | (channels[2] << 10)
    }
}

/// Whether the sub screen needs to be composited at all for the current register state.
pub fn sub_screen_needed(registers: &Registers) -> bool {
    registers.color_math.use_sub_screen
        && registers.color_math.math_enabled != ColorWindowCondition::Never
        && (registers.color_math.backdrop
            || registers.obj.designation.color_math
            || registers.bgs.iter().any(|bg| bg.designation.color_math))
}

fn layer_participates(registers: &Registers, layer: Layer) -> bool {
    match layer {
        Layer::Bg1 | Layer::Bg2 | Layer::Bg3 | Layer::Bg4 => {
            registers.bgs[layer.window_channel()].designation.color_math
        }
        Layer::Obj => registers.obj.designation.color_math,
        Layer::Backdrop => registers.color_math.backdrop,
    }
}

/// Apply clip-to-black and color math to every main screen column and write the display colors
/// for the line into `out`.
pub fn compose_line(
    compositor: &Compositor,
    registers: &Registers,
    window_masks: &WindowMasks,
    cgram: &Cgram,
    palette: &Palette,
    out: &mut [Color],
) {
    let color_math = &registers.color_math;

    for (x, out) in out.iter_mut().enumerate() {
        let main = compositor.main.get(x);
        let in_color_window = window_masks.in_window(COLOR_WINDOW_CHANNEL, x);

        let clip_to_black = color_math.clip_to_black.holds(in_color_window);
        let math = color_math.math_enabled.holds(in_color_window)
            && main.blendable
            && layer_participates(registers, main.layer);

        if !math {
            *out = if clip_to_black {
                palette.convert(0)
            } else {
                match main.color {
                    PixelColor::Cgram(index) => palette.resolve(index),
                    PixelColor::Direct(color) => palette.convert(color),
                }
            };
            continue;
        }

        let main_color = if clip_to_black { 0 } else { main.color.rgb555(cgram) };

        let (sub_color, sub_is_backdrop) = if color_math.use_sub_screen {
            // An empty sub screen column holds the fixed color
            let sub = compositor.sub.get(x);
            (sub.color.rgb555(cgram), sub.layer == Layer::Backdrop)
        } else {
            (cgram.fixed_color(), false)
        };

        // Halving is skipped for clipped main pixels and for sub screen columns with no layer
        let half = color_math.half && !clip_to_black && !sub_is_backdrop;
        *out = palette.convert(color_math.operation.blend(main_color, sub_color, half));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PowerOnMemory;
    use crate::ppu::SCREEN_WIDTH;
    use crate::ppu::compositor::LayerPixel;
    use crate::ppu::palette::rgb555_to_color;
    use test_log::test;

    fn rgb(r: u16, g: u16, b: u16) -> u16 {
        r | (g << 5) | (b << 10)
    }

    #[test]
    fn add_clamps_and_subtract_saturates() {
        let white = rgb(31, 31, 31);
        assert_eq!(white, ColorMathOperation::Add.blend(white, white, false));
        assert_eq!(0, ColorMathOperation::Subtract.blend(0, white, false));
        assert_eq!(
            rgb(31, 3, 0),
            ColorMathOperation::Add.blend(rgb(20, 1, 0), rgb(20, 2, 0), false)
        );
        assert_eq!(
            rgb(0, 4, 9),
            ColorMathOperation::Subtract.blend(rgb(5, 7, 9), rgb(10, 3, 0), false)
        );
    }

    #[test]
    fn half_color() {
        assert_eq!(
            rgb(15, 15, 15),
            ColorMathOperation::Add.blend(rgb(10, 10, 10), rgb(20, 20, 20), true)
        );
        // Halving happens after the unclamped sum
        assert_eq!(
            rgb(31, 0, 0),
            ColorMathOperation::Add.blend(rgb(31, 0, 0), rgb(31, 0, 0), true)
        );
        assert_eq!(
            rgb(5, 0, 0),
            ColorMathOperation::Subtract.blend(rgb(20, 0, 0), rgb(10, 0, 0), true)
        );
    }

    struct Fixture {
        compositor: Compositor,
        registers: Registers,
        window_masks: WindowMasks,
        cgram: Cgram,
        palette: Palette,
    }

    impl Fixture {
        fn new() -> Self {
            let mut registers = Registers::new();
            registers.write_inidisp(0x0F);
            registers.write_tm(0x01);

            let mut cgram = Cgram::new(PowerOnMemory::Zeroed);
            cgram.set_color(0, rgb(2, 2, 2));
            cgram.set_color(1, rgb(10, 10, 10));
            cgram.set_color(2, rgb(20, 20, 20));
            cgram.set_fixed_color(rgb(4, 6, 8));

            let mut palette = Palette::new();
            palette.rebuild(&cgram, 15);

            Self {
                compositor: Compositor::new(),
                registers,
                window_masks: WindowMasks::new(),
                cgram,
                palette,
            }
        }

        fn draw_bg1(&mut self, color: u16, columns: std::ops::Range<usize>) {
            let mut line = [None; SCREEN_WIDTH];
            for x in columns {
                line[x] = Some(LayerPixel {
                    color: PixelColor::Cgram(color),
                    priority: 0,
                    blendable: true,
                });
            }
            self.window_masks.build(&self.registers.windows);
            self.compositor.draw_layer(
                Layer::Bg1,
                &line,
                &self.registers,
                &self.window_masks,
                true,
            );
        }

        fn compose(&self) -> Vec<Color> {
            let mut out = vec![Color::BLACK; SCREEN_WIDTH];
            compose_line(
                &self.compositor,
                &self.registers,
                &self.window_masks,
                &self.cgram,
                &self.palette,
                &mut out,
            );
            out
        }
    }

    #[test]
    fn fixed_color_addition() {
        let mut fixture = Fixture::new();
        fixture.registers.write_cgadsub(0x01);
        fixture.compositor.begin_line();
        fixture.draw_bg1(1, 0..8);

        let out = fixture.compose();
        assert_eq!(rgb555_to_color(rgb(14, 16, 18), 15), out[0]);
        // Backdrop does not participate
        assert_eq!(rgb555_to_color(rgb(2, 2, 2), 15), out[8]);
    }

    #[test]
    fn sub_screen_backdrop_skips_halving() {
        let mut fixture = Fixture::new();
        fixture.registers.write_ts(0x01);
        fixture.registers.write_tm(0x00);
        fixture.registers.write_cgwsel(0x02);
        fixture.registers.write_cgadsub(0x60);
        fixture.compositor.begin_line();
        // BG1 only on the sub screen, columns 0-3
        fixture.draw_bg1(2, 0..4);

        let out = fixture.compose();
        // Main backdrop (2) + sub BG1 (20), halved
        assert_eq!(rgb555_to_color(rgb(11, 11, 11), 15), out[0]);
        // Main backdrop + empty sub screen (fixed color), not halved
        assert_eq!(rgb555_to_color(rgb(6, 8, 10), 15), out[4]);
    }

    #[test]
    fn color_window_clips_and_disables_math() {
        let mut fixture = Fixture::new();
        fixture.registers.write_wnsel(4, 0x20);
        fixture.registers.write_window_position(0, 0);
        fixture.registers.write_window_position(1, 3);
        // Clip to black inside the color window, math only outside it
        fixture.registers.write_cgwsel(0b1010_0000);
        fixture.registers.write_cgadsub(0x01);
        fixture.compositor.begin_line();
        fixture.draw_bg1(1, 0..8);

        assert_eq!(ColorWindowCondition::InsideWindow, fixture.registers.color_math.clip_to_black);
        let out = fixture.compose();
        assert_eq!(Color::BLACK, out[0]);
        assert_eq!(rgb555_to_color(rgb(14, 16, 18), 15), out[4]);
    }

    #[test]
    fn unblendable_pixels_skip_math() {
        let mut fixture = Fixture::new();
        fixture.registers.write_tm(0x10);
        fixture.registers.write_cgadsub(0x10);
        fixture.compositor.begin_line();

        let mut line = [None; SCREEN_WIDTH];
        line[0] = Some(LayerPixel { color: PixelColor::Cgram(1), priority: 3, blendable: false });
        line[1] = Some(LayerPixel { color: PixelColor::Cgram(1), priority: 3, blendable: true });
        fixture.window_masks.build(&fixture.registers.windows);
        fixture.compositor.draw_layer(
            Layer::Obj,
            &line,
            &fixture.registers,
            &fixture.window_masks,
            false,
        );

        let out = fixture.compose();
        assert_eq!(rgb555_to_color(rgb(10, 10, 10), 15), out[0]);
        assert_eq!(rgb555_to_color(rgb(14, 16, 18), 15), out[1]);
    }
}
