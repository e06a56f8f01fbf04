//! SNES PPU context: register ports, memory ports, and scanline rendering
//!
//! The host writes registers and memory between calls to [`Ppu::render_scanline`], which renders
//! one visible line at a time using the state as of the call. There is no dot-level timing;
//! register writes take effect at the next line.

mod background;
mod colormath;
mod compositor;
mod debug;
mod mode7;
mod palette;
mod registers;
mod sprites;
mod window;

use crate::api::{ForcedBlankFill, PpuConfig};
use crate::memory::{Cgram, Oam, VRAM_ADDRESS_MASK, Vram};
use bincode::{Decode, Encode};
use compositor::{Compositor, Layer, LayerLine};
use palette::Palette;
use ppu_common::frontend::{Color, FrameSize, TimingMode};
use ppu_common::num::{GetBit, U16Ext};
use registers::{AccessFlipflop, BgMode, Registers, VramIncrementOn};
use sprites::SpriteProcessor;
use std::mem;
use window::WindowMasks;

pub use registers::BitDepth;

pub const SCREEN_WIDTH: usize = 256;
pub const MAX_SCREEN_HEIGHT: usize = 239;

const FRAME_BUFFER_LEN: usize = SCREEN_WIDTH * MAX_SCREEN_HEIGHT;

const OAM_BYTE_ADDRESS_MASK: u16 = 0x03FF;

// Priority slots are unique within a mode, so the order layers are drawn in never changes the
// result
const DRAW_ORDER: [Layer; 5] = [Layer::Bg4, Layer::Bg3, Layer::Bg2, Layer::Bg1, Layer::Obj];

#[derive(Debug, Clone, Encode, Decode)]
struct LayerBuffers {
    bg: Box<[LayerLine; 4]>,
    obj: Box<LayerLine>,
    bg_active: [bool; 4],
}

impl LayerBuffers {
    fn new() -> Self {
        Self {
            bg: Box::new([[None; SCREEN_WIDTH]; 4]),
            obj: Box::new([None; SCREEN_WIDTH]),
            bg_active: [false; 4],
        }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Ppu {
    config: PpuConfig,
    registers: Registers,
    vram: Vram,
    cgram: Cgram,
    oam: Oam,
    palette: Palette,
    window_masks: WindowMasks,
    compositor: Compositor,
    buffers: LayerBuffers,
    sprites: SpriteProcessor,
    display_height: u16,
    ppu1_open_bus: u8,
    ppu2_open_bus: u8,
    frame_buffer: Vec<Color>,
}

impl Ppu {
    pub fn new(config: PpuConfig) -> Self {
        let registers = Registers::new();
        let display_height = registers.v_display_size.lines();

        Self {
            config,
            registers,
            vram: Vram::new(config.power_on_memory),
            cgram: Cgram::new(config.power_on_memory),
            oam: Oam::new(config.power_on_memory),
            palette: Palette::new(),
            window_masks: WindowMasks::new(),
            compositor: Compositor::new(),
            buffers: LayerBuffers::new(),
            sprites: SpriteProcessor::new(),
            display_height,
            ppu1_open_bus: 0,
            ppu2_open_bus: 0,
            frame_buffer: vec![Color::BLACK; FRAME_BUFFER_LEN],
        }
    }

    /// Render visible line `line` (0-based, less than the frame's display height) into the frame
    /// buffer and return the rendered row.
    pub fn render_scanline(&mut self, line: u16) -> &[Color] {
        debug_assert!(
            line < self.display_height,
            "line {line} outside display height {}",
            self.display_height
        );

        self.refresh_caches();

        let row_start = usize::from(line) * SCREEN_WIDTH;
        let row_range = row_start..row_start + SCREEN_WIDTH;

        if self.registers.forced_blank {
            let fill = match self.config.forced_blank_fill {
                ForcedBlankFill::Backdrop => self.palette.resolve(0),
                ForcedBlankFill::Black => Color::BLACK,
            };
            self.frame_buffer[row_range.clone()].fill(fill);
            self.sprites.clear_line();
            return &self.frame_buffer[row_range];
        }

        self.render_sprites(line);

        // BG rendering uses the hardware V counter, where the first visible line is V=1
        self.render_bg_layers(line + 1);

        self.compositor.begin_line();
        let draw_sub_screen = colormath::sub_screen_needed(&self.registers);
        for layer in DRAW_ORDER {
            let line_buffer = match layer {
                Layer::Bg1 | Layer::Bg2 | Layer::Bg3 | Layer::Bg4 => {
                    let bg = layer.window_channel();
                    if !self.buffers.bg_active[bg] {
                        continue;
                    }
                    &self.buffers.bg[bg]
                }
                Layer::Obj => &*self.buffers.obj,
                Layer::Backdrop => continue,
            };

            self.compositor.draw_layer(
                layer,
                line_buffer,
                &self.registers,
                &self.window_masks,
                draw_sub_screen,
            );
        }

        colormath::compose_line(
            &self.compositor,
            &self.registers,
            &self.window_masks,
            &self.cgram,
            &self.palette,
            &mut self.frame_buffer[row_range.clone()],
        );

        &self.frame_buffer[row_range]
    }

    fn refresh_caches(&mut self) {
        let dirty = mem::take(&mut self.registers.dirty);

        if dirty.palette {
            self.palette.rebuild(&self.cgram, self.registers.brightness);
        }

        if dirty.window {
            self.window_masks.build(&self.registers.windows);
        }
    }

    fn render_sprites(&mut self, line: u16) {
        let limits = self.config.sprite_limits;
        let first_sprite = self.registers.obj_first_sprite();

        self.sprites.evaluate(&self.oam, &self.registers.obj, first_sprite, limits, line);
        self.sprites.fetch_tiles(&self.vram, &self.oam, &self.registers.obj, limits, line);
        self.sprites.render(&mut self.buffers.obj);
    }

    fn render_bg_layers(&mut self, v_line: u16) {
        let mode = self.registers.bg_mode;

        if mode == BgMode::Seven {
            let [bg1, bg2, ..] = &mut *self.buffers.bg;
            let bg2 = self.registers.extbg.then_some(bg2);
            mode7::render_mode_7_line(&self.vram, &self.registers, v_line, bg1, bg2);
            self.buffers.bg_active = [true, self.registers.extbg, false, false];
            return;
        }

        for bg in 0..4 {
            let Some(depth) = mode.bg_bit_depth(bg) else {
                self.buffers.bg_active[bg] = false;
                continue;
            };

            background::render_bg_line(
                &self.vram,
                &self.registers,
                bg,
                depth,
                v_line,
                &mut self.buffers.bg[bg],
            );
            self.buffers.bg_active[bg] = true;
        }
    }

    /// Start a new frame: latches the display height and clears the sprite overflow flags
    /// unless forced blank is active.
    pub fn start_frame(&mut self) {
        self.display_height = self.registers.v_display_size.lines();

        if !self.registers.forced_blank {
            self.sprites.clear_flags();
        }
    }

    pub fn write_port(&mut self, address: u32, value: u8) {
        let address = address & 0xFF;

        if log::log_enabled!(log::Level::Trace) {
            // Don't log data port writes
            if address != 0x04 && address != 0x18 && address != 0x19 && address != 0x22 {
                log::trace!("PPU register write: 21{address:02X} {value:02X}");
            }
        }

        match address {
            0x00 => self.registers.write_inidisp(value),
            0x01 => self.registers.write_obsel(value),
            0x02 => self.registers.write_oamaddl(value),
            0x03 => self.registers.write_oamaddh(value),
            0x04 => {
                // OAMDATA: OAM data port (write)
                self.write_oam_data_port(value);
            }
            0x05 => self.registers.write_bgmode(value),
            0x06 => self.registers.write_mosaic(value),
            0x07..=0x0A => self.registers.write_bgnsc((address - 0x07) as usize, value),
            0x0B => self.registers.write_bgnba(0, value),
            0x0C => self.registers.write_bgnba(2, value),
            0x0D..=0x14 => {
                // BG1HOFS-BG4VOFS: alternating horizontal and vertical scroll per BG
                let bg = ((address - 0x0D) >> 1) as usize;
                if (address - 0x0D).bit(0) {
                    self.registers.write_bg_v_scroll(bg, value);
                } else {
                    self.registers.write_bg_h_scroll(bg, value);
                }
            }
            0x15 => self.registers.write_vmain(value),
            0x16 => {
                // VMADDL: VRAM word address, low byte
                self.registers.ports.vram_address.set_lsb(value);
                self.fill_vram_prefetch_buffer();
                log::trace!("  VRAM address: {:04X}", self.registers.ports.vram_address);
            }
            0x17 => {
                // VMADDH: VRAM word address, high byte
                self.registers.ports.vram_address.set_msb(value);
                self.fill_vram_prefetch_buffer();
                log::trace!("  VRAM address: {:04X}", self.registers.ports.vram_address);
            }
            0x18 => {
                // VMDATAL: VRAM data port (write), low byte
                self.write_vram_data_port(value, VramIncrementOn::Low);
            }
            0x19 => {
                // VMDATAH: VRAM data port (write), high byte
                self.write_vram_data_port(value, VramIncrementOn::High);
            }
            0x1A => self.registers.write_m7sel(value),
            0x1B => self.registers.write_m7a(value),
            0x1C => self.registers.write_m7b(value),
            0x1D => self.registers.write_m7c(value),
            0x1E => self.registers.write_m7d(value),
            0x1F => self.registers.write_m7x(value),
            0x20 => self.registers.write_m7y(value),
            0x21 => self.registers.write_cgadd(value),
            0x22 => {
                // CGDATA: CGRAM data port (write)
                self.write_cgram_data_port(value);
            }
            0x23..=0x25 => self.registers.write_wnsel(2 * (address - 0x23) as usize, value),
            0x26..=0x29 => self.registers.write_window_position((address - 0x26) as u8, value),
            0x2A => self.registers.write_wbglog(value),
            0x2B => self.registers.write_wobjlog(value),
            0x2C => self.registers.write_tm(value),
            0x2D => self.registers.write_ts(value),
            0x2E => self.registers.write_tmw(value),
            0x2F => self.registers.write_tsw(value),
            0x30 => self.registers.write_cgwsel(value),
            0x31 => self.registers.write_cgadsub(value),
            0x32 => self.registers.write_coldata(value, &mut self.cgram),
            0x33 => self.registers.write_setini(value),
            _ => {
                // Read-only or unmapped; do nothing
            }
        }
    }

    /// Read a PPU register. Returns `None` for addresses that read CPU open bus.
    pub fn read_port(&mut self, address: u32) -> Option<u8> {
        log::trace!("Read PPU register: {address:06X}");

        let address = address & 0xFF;
        let value = match address {
            0x34..=0x36 => {
                // MPYL/MPYM/MPYH: signed 24-bit product of M7A and M7B
                let product = self.registers.multiply_result();
                (product >> (8 * (address - 0x34))) as u8
            }
            0x38 => {
                // RDOAM: OAM data port, read
                self.read_oam_data_port()
            }
            0x39 => {
                // RDVRAML: VRAM data port, read, low byte
                self.read_vram_data_port(VramIncrementOn::Low)
            }
            0x3A => {
                // RDVRAMH: VRAM data port, read, high byte
                self.read_vram_data_port(VramIncrementOn::High)
            }
            0x3B => {
                // RDCGRAM: CGRAM data port, read
                self.read_cgram_data_port()
            }
            0x3E => {
                // STAT77: PPU1 status and version number
                // Version number hardcoded to 1
                // Bit 4 is PPU1 open bus
                (u8::from(self.sprites.time_over()) << 7)
                    | (u8::from(self.sprites.range_over()) << 6)
                    | (self.ppu1_open_bus & 0x10)
                    | 0x01
            }
            0x3F => {
                // STAT78: PPU2 status and version number
                // Version number hardcoded to 1
                // Bit 5 is PPU2 open bus
                (self.ppu2_open_bus & 0x20)
                    | (u8::from(self.config.timing_mode == TimingMode::Pal) << 4)
                    | 0x01
            }
            0x04 | 0x05 | 0x06 | 0x08 | 0x09 | 0x0A | 0x14 | 0x15 | 0x16 | 0x18 | 0x19 | 0x1A
            | 0x24 | 0x25 | 0x26 | 0x28 | 0x29 | 0x2A => {
                // PPU1 open bus (all 8 bits)
                self.ppu1_open_bus
            }
            _ => {
                // CPU open bus
                return None;
            }
        };

        if (0x34..0x37).contains(&address) || (0x38..0x3B).contains(&address) || address == 0x3E
        {
            // Reading $2134-$2136, $2138-$213A, or $213E sets PPU1 open bus
            self.ppu1_open_bus = value;
        } else if address == 0x3B || address == 0x3F {
            // Reading $213B or $213F sets PPU2 open bus
            self.ppu2_open_bus = value;
        }

        Some(value)
    }

    fn vram_port_address(&self) -> u16 {
        let ports = &self.registers.ports;
        ports.vram_translation.apply(ports.vram_address) & VRAM_ADDRESS_MASK
    }

    fn increment_vram_address(&mut self) {
        let ports = &mut self.registers.ports;
        ports.vram_address = ports.vram_address.wrapping_add(ports.vram_increment_step);
    }

    fn fill_vram_prefetch_buffer(&mut self) {
        self.registers.ports.vram_prefetch = self.vram.word(self.vram_port_address());
    }

    fn write_vram_data_port(&mut self, value: u8, byte: VramIncrementOn) {
        let vram_address = self.vram_port_address();
        let word = self.vram.word_mut(vram_address);
        match byte {
            VramIncrementOn::Low => word.set_lsb(value),
            VramIncrementOn::High => word.set_msb(value),
        }

        if self.registers.ports.vram_increment_on == byte {
            self.increment_vram_address();
        }
    }

    fn read_vram_data_port(&mut self, byte: VramIncrementOn) -> u8 {
        let prefetch = self.registers.ports.vram_prefetch;
        let value = match byte {
            VramIncrementOn::Low => prefetch.lsb(),
            VramIncrementOn::High => prefetch.msb(),
        };

        if self.registers.ports.vram_increment_on == byte {
            // Fill prefetch buffer *before* address increment
            self.fill_vram_prefetch_buffer();
            self.increment_vram_address();
        }

        value
    }

    fn write_oam_data_port(&mut self, value: u8) {
        let address = self.registers.ports.oam_address;

        if address >= 0x200 {
            // High table writes go through immediately; $220-$3FF mirror $200-$21F
            self.oam.write_byte(address.into(), value);
        } else if !address.bit(0) {
            // Low table needs two writes to persist a word
            self.registers.ports.oam_write_latch = value;
        } else {
            let word = u16::from_le_bytes([self.registers.ports.oam_write_latch, value]);
            self.oam.set_low_word(address >> 1, word);
        }

        self.registers.ports.oam_address = (address + 1) & OAM_BYTE_ADDRESS_MASK;
    }

    fn read_oam_data_port(&mut self) -> u8 {
        let address = self.registers.ports.oam_address;
        let value = self.oam.read_byte(address.into());
        self.registers.ports.oam_address = (address + 1) & OAM_BYTE_ADDRESS_MASK;
        value
    }

    fn write_cgram_data_port(&mut self, value: u8) {
        let ports = &mut self.registers.ports;
        match ports.cgram_flipflop {
            AccessFlipflop::First => {
                ports.cgram_write_latch = value;
            }
            AccessFlipflop::Second => {
                // Only bits 6-0 of high byte are persisted
                let color = u16::from_le_bytes([ports.cgram_write_latch, value & 0x7F]);
                self.cgram.set_color(ports.cgram_address, color);
                ports.cgram_address = ports.cgram_address.wrapping_add(1);
                self.registers.dirty.palette = true;
            }
        }
        ports.cgram_flipflop = ports.cgram_flipflop.toggle();
    }

    fn read_cgram_data_port(&mut self) -> u8 {
        let ports = &mut self.registers.ports;
        let word = self.cgram.color(ports.cgram_address.into());

        let value = match ports.cgram_flipflop {
            AccessFlipflop::First => word.lsb(),
            AccessFlipflop::Second => {
                // High byte; bit 7 is PPU2 open bus
                ports.cgram_address = ports.cgram_address.wrapping_add(1);
                (self.ppu2_open_bus & 0x80) | word.msb()
            }
        };
        ports.cgram_flipflop = ports.cgram_flipflop.toggle();

        value
    }

    pub fn read_vram(&self, address: u32) -> u8 {
        self.vram.read_byte(address)
    }

    pub fn write_vram(&mut self, address: u32, value: u8) {
        self.vram.write_byte(address, value);
    }

    pub fn read_cgram(&self, address: u32) -> u8 {
        self.cgram.read_byte(address)
    }

    pub fn write_cgram(&mut self, address: u32, value: u8) {
        self.cgram.write_byte(address, value);
        self.registers.dirty.palette = true;
    }

    pub fn read_oam(&self, address: u32) -> u8 {
        self.oam.read_byte(address)
    }

    pub fn write_oam(&mut self, address: u32, value: u8) {
        self.oam.write_byte(address, value);
    }

    pub fn sprite_range_over(&self) -> bool {
        self.sprites.range_over()
    }

    pub fn sprite_time_over(&self) -> bool {
        self.sprites.time_over()
    }

    pub fn forced_blank(&self) -> bool {
        self.registers.forced_blank
    }

    pub fn frame_size(&self) -> FrameSize {
        FrameSize { width: SCREEN_WIDTH as u32, height: self.display_height.into() }
    }

    /// The visible lines of the current frame, row-major.
    pub fn frame_buffer(&self) -> &[Color] {
        &self.frame_buffer[..self.frame_size().len()]
    }

    pub fn config(&self) -> PpuConfig {
        self.config
    }

    /// Takes effect at the next line. The power-on memory setting only applies to [`Ppu::new`].
    pub fn update_config(&mut self, config: PpuConfig) {
        log::debug!("Updated PPU config: {config}");
        self.config = config;
    }

    /// Return to the power-on register state with forced blank enabled. Memory contents are kept.
    pub fn reset(&mut self) {
        self.registers = Registers::new();
        self.sprites = SpriteProcessor::new();
        self.display_height = self.registers.v_display_size.lines();
    }

    /// Force the palette and window caches to rebuild before the next line.
    pub fn invalidate_caches(&mut self) {
        self.registers.dirty = registers::DirtyFlags::ALL;
    }
}
