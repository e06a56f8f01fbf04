//! Typed view over the $2100-$213F register file
//!
//! Writes never fail; every bit pattern decodes to some hardware-defined configuration.

use crate::memory::Cgram;
use bincode::{Decode, Encode};
use ppu_common::num::GetBit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum VerticalDisplaySize {
    #[default]
    Lines224,
    Lines239,
}

impl VerticalDisplaySize {
    pub fn lines(self) -> u16 {
        match self {
            Self::Lines224 => 224,
            Self::Lines239 => 239,
        }
    }
}

/// Tile bit depth. BG depth is a function of the BG mode; OBJ tiles are always 4bpp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum BitDepth {
    Two,
    Four,
    Eight,
}

impl BitDepth {
    pub const OBJ: Self = Self::Four;

    pub const fn bitplanes(self) -> u16 {
        match self {
            Self::Two => 2,
            Self::Four => 4,
            Self::Eight => 8,
        }
    }

    pub const fn tile_len_words(self) -> u16 {
        // 8 rows, 1 word per bitplane pair per row
        4 * self.bitplanes()
    }

    pub const fn colors_per_palette(self) -> u16 {
        1 << self.bitplanes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum BgMode {
    #[default]
    Zero,
    One,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
}

impl BgMode {
    fn from_byte(byte: u8) -> Self {
        match byte & 0x07 {
            0 => Self::Zero,
            1 => Self::One,
            2 => Self::Two,
            3 => Self::Three,
            4 => Self::Four,
            5 => Self::Five,
            6 => Self::Six,
            7 => Self::Seven,
            _ => unreachable!("value & 0x07 is always <= 7"),
        }
    }

    pub fn number(self) -> usize {
        self as usize
    }

    /// Bit depth of a tiled BG layer in this mode, or `None` if the layer is not a tiled layer
    /// (absent, used only for offset-per-tile data, or drawn by the Mode 7 renderer).
    pub fn bg_bit_depth(self, bg: usize) -> Option<BitDepth> {
        use BitDepth::{Eight, Four, Two};

        match (self, bg) {
            (Self::Zero, 0..=3) | (Self::One, 2) | (Self::Four | Self::Five, 1) => Some(Two),
            (Self::One | Self::Two, 0 | 1)
            | (Self::Three, 1)
            | (Self::Five | Self::Six, 0) => Some(Four),
            (Self::Three | Self::Four, 0) => Some(Eight),
            _ => None,
        }
    }

    pub fn is_offset_per_tile(self) -> bool {
        matches!(self, Self::Two | Self::Four | Self::Six)
    }

    pub fn is_hi_res(self) -> bool {
        matches!(self, Self::Five | Self::Six)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum TileSize {
    #[default]
    Small,
    Large,
}

impl TileSize {
    fn from_bit(bit: bool) -> Self {
        if bit { Self::Large } else { Self::Small }
    }
}

/// OBSEL size pair; each sprite's size bit picks one of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct ObjSizes {
    pub small: (u16, u16),
    pub large: (u16, u16),
}

impl Default for ObjSizes {
    fn default() -> Self {
        Self::from_byte(0)
    }
}

impl ObjSizes {
    fn from_byte(byte: u8) -> Self {
        let (small, large) = match byte >> 5 {
            0 => ((8, 8), (16, 16)),
            1 => ((8, 8), (32, 32)),
            2 => ((8, 8), (64, 64)),
            3 => ((16, 16), (32, 32)),
            4 => ((16, 16), (64, 64)),
            5 => ((32, 32), (64, 64)),
            6 => ((16, 32), (32, 64)),
            7 => ((16, 32), (32, 32)),
            _ => unreachable!("value >> 5 is always <= 7"),
        };
        Self { small, large }
    }

    pub fn get(self, large: bool) -> (u16, u16) {
        if large { self.large } else { self.small }
    }
}

/// Tilemap dimensions in 32x32-entry screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum BgScreenSize {
    #[default]
    OneScreen,
    TwoWide,
    TwoTall,
    FourScreen,
}

impl BgScreenSize {
    fn from_byte(byte: u8) -> Self {
        match byte & 0x03 {
            0 => Self::OneScreen,
            1 => Self::TwoWide,
            2 => Self::TwoTall,
            3 => Self::FourScreen,
            _ => unreachable!("value & 0x03 is always <= 3"),
        }
    }

    pub fn wide(self) -> bool {
        matches!(self, Self::TwoWide | Self::FourScreen)
    }

    pub fn tall(self) -> bool {
        matches!(self, Self::TwoTall | Self::FourScreen)
    }
}

/// Per-channel window enable+invert bits for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum WindowAreaMode {
    #[default]
    Disabled,
    Inside,
    Outside,
}

impl WindowAreaMode {
    fn from_bits(bits: u8) -> Self {
        // Bit 1 enables, bit 0 inverts; the invert bit is ignored while disabled
        match bits & 0x03 {
            0 | 1 => Self::Disabled,
            2 => Self::Inside,
            3 => Self::Outside,
            _ => unreachable!("value & 0x03 is always <= 3"),
        }
    }

    pub fn membership(self, inside: bool) -> Option<bool> {
        match self {
            Self::Disabled => None,
            Self::Inside => Some(inside),
            Self::Outside => Some(!inside),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum WindowMaskLogic {
    #[default]
    Or,
    And,
    Xor,
    Xnor,
}

impl WindowMaskLogic {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Or,
            1 => Self::And,
            2 => Self::Xor,
            3 => Self::Xnor,
            _ => unreachable!("value & 0x03 is always <= 3"),
        }
    }

    /// Combine the two windows' membership tests. The logic operator only applies when both
    /// windows are enabled; a channel with no enabled window is never "in window".
    pub fn combine(self, window_1: Option<bool>, window_2: Option<bool>) -> bool {
        match (window_1, window_2) {
            (Some(w1), Some(w2)) => match self {
                Self::Or => w1 || w2,
                Self::And => w1 && w2,
                Self::Xor => w1 ^ w2,
                Self::Xnor => !(w1 ^ w2),
            },
            (Some(w), None) | (None, Some(w)) => w,
            (None, None) => false,
        }
    }
}

/// Color window condition used by the CGWSEL clip-to-black and prevent-math fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum ColorWindowCondition {
    Never,
    OutsideWindow,
    InsideWindow,
    Always,
}

impl ColorWindowCondition {
    pub fn holds(self, in_color_window: bool) -> bool {
        match self {
            Self::Never => false,
            Self::OutsideWindow => !in_color_window,
            Self::InsideWindow => in_color_window,
            Self::Always => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum ColorMathOperation {
    #[default]
    Add,
    Subtract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum VramAddressTranslation {
    #[default]
    None,
    EightBit,
    NineBit,
    TenBit,
}

impl VramAddressTranslation {
    fn from_byte(byte: u8) -> Self {
        match (byte >> 2) & 0x03 {
            0 => Self::None,
            1 => Self::EightBit,
            2 => Self::NineBit,
            3 => Self::TenBit,
            _ => unreachable!("value & 0x03 is always <= 3"),
        }
    }

    /// Rotate the low N bits of the word address left by 3, so that sequential writes fill a
    /// column of 2bpp/4bpp/8bpp tile rows.
    pub fn apply(self, address: u16) -> u16 {
        let rotated_bits = match self {
            Self::None => return address,
            Self::EightBit => 8,
            Self::NineBit => 9,
            Self::TenBit => 10,
        };

        let mask = (1 << rotated_bits) - 1;
        let low = address & mask;
        (address & !mask) | ((low << 3) & mask) | (low >> (rotated_bits - 3))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum VramIncrementOn {
    #[default]
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum Mode7OobBehavior {
    #[default]
    Wrap,
    Transparent,
    Tile0,
}

impl Mode7OobBehavior {
    fn from_byte(byte: u8) -> Self {
        match byte >> 6 {
            0 | 1 => Self::Wrap,
            2 => Self::Transparent,
            3 => Self::Tile0,
            _ => unreachable!("value >> 6 is always <= 3"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum AccessFlipflop {
    #[default]
    First,
    Second,
}

impl AccessFlipflop {
    #[must_use]
    pub fn toggle(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

/// Screen designation and window clip bits for one layer (BG1-4 or OBJ).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct ScreenDesignation {
    pub main_enabled: bool,
    pub sub_enabled: bool,
    // TMW/TSW: suppress the layer inside its window on that screen
    pub main_window_clip: bool,
    pub sub_window_clip: bool,
    // CGADSUB participation
    pub color_math: bool,
}

impl ScreenDesignation {
    pub fn enabled(&self, screen: Screen) -> bool {
        match screen {
            Screen::Main => self.main_enabled,
            Screen::Sub => self.sub_enabled,
        }
    }

    pub fn window_clip(&self, screen: Screen) -> bool {
        match screen {
            Screen::Main => self.main_window_clip,
            Screen::Sub => self.sub_window_clip,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Main,
    Sub,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct BgLayerRegisters {
    pub screen_size: BgScreenSize,
    pub map_base_address: u16,
    pub tile_base_address: u16,
    pub tile_size: TileSize,
    // Only the low 10 bits are used for rendering
    pub h_scroll: u16,
    pub v_scroll: u16,
    pub mosaic: bool,
    pub designation: ScreenDesignation,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct ObjRegisters {
    pub tile_base_address: u16,
    pub tile_gap: u16,
    pub sizes: ObjSizes,
    pub priority_rotation: bool,
    pub designation: ScreenDesignation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct WindowRange {
    pub left: u16,
    pub right: u16,
}

impl WindowRange {
    pub fn contains(self, x: u16) -> bool {
        self.left <= x && x <= self.right
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct WindowChannelRegisters {
    pub window_1: WindowAreaMode,
    pub window_2: WindowAreaMode,
    pub logic: WindowMaskLogic,
}

impl WindowChannelRegisters {
    pub fn in_window(&self, in_window_1: bool, in_window_2: bool) -> bool {
        self.logic.combine(
            self.window_1.membership(in_window_1),
            self.window_2.membership(in_window_2),
        )
    }
}

/// Window channel order: BG1-4, OBJ, color window.
pub const WINDOW_CHANNELS: usize = 6;
pub const OBJ_WINDOW_CHANNEL: usize = 4;
pub const COLOR_WINDOW_CHANNEL: usize = 5;

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct WindowRegisters {
    pub window_1: WindowRange,
    pub window_2: WindowRange,
    pub channels: [WindowChannelRegisters; WINDOW_CHANNELS],
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct ColorMathRegisters {
    pub clip_to_black: ColorWindowCondition,
    pub math_enabled: ColorWindowCondition,
    pub use_sub_screen: bool,
    pub direct_color: bool,
    pub operation: ColorMathOperation,
    pub half: bool,
    pub backdrop: bool,
}

impl Default for ColorMathRegisters {
    fn default() -> Self {
        Self {
            clip_to_black: ColorWindowCondition::Never,
            math_enabled: ColorWindowCondition::Always,
            use_sub_screen: false,
            direct_color: false,
            operation: ColorMathOperation::default(),
            half: false,
            backdrop: false,
        }
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Mode7Registers {
    pub h_flip: bool,
    pub v_flip: bool,
    pub oob_behavior: Mode7OobBehavior,
    pub a: i16,
    pub b: i16,
    pub c: i16,
    pub d: i16,
    // 13-bit signed values, stored sign-extended
    pub center_x: i16,
    pub center_y: i16,
    pub h_scroll: i16,
    pub v_scroll: i16,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct DataPortRegisters {
    pub vram_address: u16,
    pub vram_increment_step: u16,
    pub vram_translation: VramAddressTranslation,
    pub vram_increment_on: VramIncrementOn,
    pub vram_prefetch: u16,
    // Word address written through OAMADDL/OAMADDH; the byte address reloads from it
    pub oam_reload_address: u16,
    pub oam_address: u16,
    pub oam_write_latch: u8,
    pub cgram_address: u8,
    pub cgram_write_latch: u8,
    pub cgram_flipflop: AccessFlipflop,
}

impl Default for DataPortRegisters {
    fn default() -> Self {
        Self {
            vram_address: 0,
            vram_increment_step: 1,
            vram_translation: VramAddressTranslation::default(),
            vram_increment_on: VramIncrementOn::default(),
            vram_prefetch: 0,
            oam_reload_address: 0,
            oam_address: 0,
            oam_write_latch: 0,
            cgram_address: 0,
            cgram_write_latch: 0,
            cgram_flipflop: AccessFlipflop::default(),
        }
    }
}

/// Cached derived state invalidated by register writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct DirtyFlags {
    pub window: bool,
    pub palette: bool,
}

impl DirtyFlags {
    pub const ALL: Self = Self { window: true, palette: true };
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Registers {
    // INIDISP
    pub forced_blank: bool,
    pub brightness: u8,
    // SETINI
    pub extbg: bool,
    pub v_display_size: VerticalDisplaySize,
    // BGMODE
    pub bg_mode: BgMode,
    pub bg3_high_priority: bool,
    // MOSAIC (block size 1-16)
    pub mosaic_size: u8,
    pub bgs: [BgLayerRegisters; 4],
    pub obj: ObjRegisters,
    pub windows: WindowRegisters,
    pub color_math: ColorMathRegisters,
    pub mode_7: Mode7Registers,
    pub ports: DataPortRegisters,
    // Shared previous-byte latch for BGnHOFS/BGnVOFS
    pub bg_scroll_latch: u8,
    // Separate latch for M7A-M7D, M7X/M7Y, and the Mode 7 view of BG1HOFS/BG1VOFS
    pub mode_7_latch: u8,
    // Multiply unit operands: M7A as written, and the last byte written to M7B
    pub multiply_operand_l: i16,
    pub multiply_operand_r: i8,
    pub dirty: DirtyFlags,
}

impl Registers {
    pub fn new() -> Self {
        Self {
            forced_blank: true,
            brightness: 0,
            extbg: false,
            v_display_size: VerticalDisplaySize::default(),
            bg_mode: BgMode::default(),
            bg3_high_priority: false,
            mosaic_size: 1,
            bgs: Default::default(),
            obj: ObjRegisters::default(),
            windows: WindowRegisters::default(),
            color_math: ColorMathRegisters::default(),
            mode_7: Mode7Registers::default(),
            ports: DataPortRegisters::default(),
            bg_scroll_latch: 0,
            mode_7_latch: 0,
            multiply_operand_l: 0,
            multiply_operand_r: 0,
            dirty: DirtyFlags::ALL,
        }
    }

    pub fn write_inidisp(&mut self, value: u8) {
        // INIDISP: Display control 1
        let prev_forced_blank = self.forced_blank;
        let prev_brightness = self.brightness;
        self.forced_blank = value.bit(7);
        self.brightness = value & 0x0F;

        if self.brightness != prev_brightness {
            self.dirty.palette = true;
        }

        // Leaving forced blank reloads the OAM address
        if prev_forced_blank && !self.forced_blank {
            self.ports.oam_address = self.ports.oam_reload_address << 1;
        }

        log::trace!("  Forced blank: {}", self.forced_blank);
        log::trace!("  Brightness: {}", self.brightness);
    }

    pub fn write_setini(&mut self, value: u8) {
        // SETINI: Display control 2
        // Interlace and pseudo-hires bits (0, 1, 3) are not emulated
        self.v_display_size = if value.bit(2) {
            VerticalDisplaySize::Lines239
        } else {
            VerticalDisplaySize::Lines224
        };
        self.extbg = value.bit(6);

        log::trace!("  V display size: {:?}", self.v_display_size);
        log::trace!("  EXTBG: {}", self.extbg);
    }

    pub fn write_obsel(&mut self, value: u8) {
        // OBSEL: Object size and tile base
        self.obj.tile_base_address = u16::from(value & 0x07) << 13;
        self.obj.tile_gap = u16::from((value >> 3) & 0x03) << 12;
        self.obj.sizes = ObjSizes::from_byte(value);

        log::trace!("  OBJ tile base address: {:04X}", self.obj.tile_base_address);
        log::trace!("  OBJ tile gap: {:04X}", self.obj.tile_gap);
        log::trace!("  OBJ sizes: {:?}", self.obj.sizes);
    }

    pub fn write_oamaddl(&mut self, value: u8) {
        // OAMADDL: OAM word address, low byte
        self.ports.oam_reload_address = (self.ports.oam_reload_address & 0x0100) | u16::from(value);
        self.ports.oam_address = self.ports.oam_reload_address << 1;

        log::trace!("  OAM reload address: {:03X}", self.ports.oam_reload_address);
    }

    pub fn write_oamaddh(&mut self, value: u8) {
        // OAMADDH: OAM word address bit 8, priority rotation
        self.ports.oam_reload_address =
            (self.ports.oam_reload_address & 0x00FF) | (u16::from(value & 0x01) << 8);
        self.ports.oam_address = self.ports.oam_reload_address << 1;
        self.obj.priority_rotation = value.bit(7);

        log::trace!("  OAM reload address: {:03X}", self.ports.oam_reload_address);
        log::trace!("  OBJ priority rotation: {}", self.obj.priority_rotation);
    }

    /// First OAM index scanned during sprite evaluation.
    pub fn obj_first_sprite(&self) -> u8 {
        if self.obj.priority_rotation {
            ((self.ports.oam_reload_address >> 1) & 0x7F) as u8
        } else {
            0
        }
    }

    pub fn write_bgmode(&mut self, value: u8) {
        // BGMODE: BG mode and tile sizes
        self.bg_mode = BgMode::from_byte(value);
        self.bg3_high_priority = value.bit(3);
        for (i, bg) in self.bgs.iter_mut().enumerate() {
            bg.tile_size = TileSize::from_bit(value.bit(4 + i as u8));
        }

        log::trace!("  BG mode: {:?}", self.bg_mode);
        log::trace!("  BG3 high priority: {}", self.bg3_high_priority);
        log::trace!("  BG tile sizes: {:?}", self.bgs.each_ref().map(|bg| bg.tile_size));
    }

    pub fn write_mosaic(&mut self, value: u8) {
        // MOSAIC: Mosaic block size and per-BG enable
        self.mosaic_size = (value >> 4) + 1;
        for (i, bg) in self.bgs.iter_mut().enumerate() {
            bg.mosaic = value.bit(i as u8);
        }

        log::trace!("  Mosaic size: {}", self.mosaic_size);
        log::trace!("  Mosaic enabled: {:?}", self.bgs.each_ref().map(|bg| bg.mosaic));
    }

    pub fn write_bgnsc(&mut self, bg: usize, value: u8) {
        // BG1SC-BG4SC: Tilemap base address and size
        self.bgs[bg].screen_size = BgScreenSize::from_byte(value);
        self.bgs[bg].map_base_address = u16::from(value & 0xFC) << 8;

        log::trace!("  BG{} screen size: {:?}", bg + 1, self.bgs[bg].screen_size);
        log::trace!("  BG{} map base address: {:04X}", bg + 1, self.bgs[bg].map_base_address);
    }

    pub fn write_bgnba(&mut self, first_bg: usize, value: u8) {
        // BG12NBA/BG34NBA: Tile data base addresses, 4 bits per BG
        for (i, nibble) in [value & 0x0F, value >> 4].into_iter().enumerate() {
            let bg = first_bg + i;
            self.bgs[bg].tile_base_address = u16::from(nibble) << 12;
            log::trace!("  BG{} tile base address: {:04X}", bg + 1, self.bgs[bg].tile_base_address);
        }
    }

    pub fn write_bg_h_scroll(&mut self, bg: usize, value: u8) {
        // BGnHOFS: the low 3 bits come from bits 8-10 of the register's old value rather than
        // from the latch, so a low-then-high write pair still behaves as a 16-bit write
        let current = self.bgs[bg].h_scroll;
        self.bgs[bg].h_scroll = (u16::from(value) << 8)
            | u16::from(self.bg_scroll_latch & !0x07)
            | ((current >> 8) & 0x07);
        self.bg_scroll_latch = value;

        if bg == 0 {
            // M7HOFS shares the address but uses the Mode 7 latch
            self.mode_7.h_scroll = sign_extend_13(u16::from_le_bytes([self.mode_7_latch, value]));
            self.mode_7_latch = value;
            log::trace!("  Mode 7 H scroll: {}", self.mode_7.h_scroll);
        }

        log::trace!("  BG{} H scroll: {:03X}", bg + 1, self.bgs[bg].h_scroll);
    }

    pub fn write_bg_v_scroll(&mut self, bg: usize, value: u8) {
        // BGnVOFS
        self.bgs[bg].v_scroll = u16::from_le_bytes([self.bg_scroll_latch, value]);
        self.bg_scroll_latch = value;

        if bg == 0 {
            self.mode_7.v_scroll = sign_extend_13(u16::from_le_bytes([self.mode_7_latch, value]));
            self.mode_7_latch = value;
            log::trace!("  Mode 7 V scroll: {}", self.mode_7.v_scroll);
        }

        log::trace!("  BG{} V scroll: {:03X}", bg + 1, self.bgs[bg].v_scroll);
    }

    pub fn write_vmain(&mut self, value: u8) {
        // VMAIN: VRAM port increment settings
        self.ports.vram_increment_step = match value & 0x03 {
            0 => 1,
            1 => 32,
            _ => 128,
        };
        self.ports.vram_translation = VramAddressTranslation::from_byte(value);
        self.ports.vram_increment_on =
            if value.bit(7) { VramIncrementOn::High } else { VramIncrementOn::Low };

        log::trace!("  VRAM increment step: {}", self.ports.vram_increment_step);
        log::trace!("  VRAM address translation: {:?}", self.ports.vram_translation);
        log::trace!("  VRAM increment on: {:?}", self.ports.vram_increment_on);
    }

    pub fn write_m7sel(&mut self, value: u8) {
        // M7SEL: Mode 7 flip and out-of-bounds behavior
        self.mode_7.h_flip = value.bit(0);
        self.mode_7.v_flip = value.bit(1);
        self.mode_7.oob_behavior = Mode7OobBehavior::from_byte(value);

        log::trace!("  Mode 7 H flip: {}", self.mode_7.h_flip);
        log::trace!("  Mode 7 V flip: {}", self.mode_7.v_flip);
        log::trace!("  Mode 7 OOB behavior: {:?}", self.mode_7.oob_behavior);
    }

    fn mode_7_word(&mut self, value: u8) -> u16 {
        let word = u16::from_le_bytes([self.mode_7_latch, value]);
        self.mode_7_latch = value;
        word
    }

    pub fn write_m7a(&mut self, value: u8) {
        // M7A: Matrix A, also the 16-bit multiply operand
        self.mode_7.a = self.mode_7_word(value) as i16;
        self.multiply_operand_l = self.mode_7.a;
        log::trace!("  Mode 7 A: {:04X}", self.mode_7.a);
    }

    pub fn write_m7b(&mut self, value: u8) {
        // M7B: Matrix B; the most recent byte is the 8-bit multiply operand
        self.mode_7.b = self.mode_7_word(value) as i16;
        self.multiply_operand_r = value as i8;
        log::trace!("  Mode 7 B: {:04X}", self.mode_7.b);
    }

    pub fn write_m7c(&mut self, value: u8) {
        self.mode_7.c = self.mode_7_word(value) as i16;
        log::trace!("  Mode 7 C: {:04X}", self.mode_7.c);
    }

    pub fn write_m7d(&mut self, value: u8) {
        self.mode_7.d = self.mode_7_word(value) as i16;
        log::trace!("  Mode 7 D: {:04X}", self.mode_7.d);
    }

    pub fn write_m7x(&mut self, value: u8) {
        // M7X: Rotation/scaling center X
        self.mode_7.center_x = sign_extend_13(self.mode_7_word(value));
        log::trace!("  Mode 7 center X: {}", self.mode_7.center_x);
    }

    pub fn write_m7y(&mut self, value: u8) {
        // M7Y: Rotation/scaling center Y
        self.mode_7.center_y = sign_extend_13(self.mode_7_word(value));
        log::trace!("  Mode 7 center Y: {}", self.mode_7.center_y);
    }

    pub fn write_cgadd(&mut self, value: u8) {
        // CGADD: CGRAM port word address
        self.ports.cgram_address = value;
        self.ports.cgram_flipflop = AccessFlipflop::First;

        log::trace!("  CGRAM address: {value:02X}");
    }

    pub fn write_wnsel(&mut self, first_channel: usize, value: u8) {
        // W12SEL/W34SEL/WOBJSEL: 4 bits per channel, window 1 in the low pair
        for (i, nibble) in [value & 0x0F, value >> 4].into_iter().enumerate() {
            let channel = &mut self.windows.channels[first_channel + i];
            channel.window_1 = WindowAreaMode::from_bits(nibble);
            channel.window_2 = WindowAreaMode::from_bits(nibble >> 2);

            log::trace!(
                "  Window channel {} areas: {:?} / {:?}",
                first_channel + i,
                channel.window_1,
                channel.window_2
            );
        }
        self.dirty.window = true;
    }

    pub fn write_window_position(&mut self, index: u8, value: u8) {
        // WH0-WH3: Window 1 left/right, window 2 left/right
        let value = value.into();
        match index & 0x03 {
            0 => self.windows.window_1.left = value,
            1 => self.windows.window_1.right = value,
            2 => self.windows.window_2.left = value,
            3 => self.windows.window_2.right = value,
            _ => unreachable!("value & 0x03 is always <= 3"),
        }
        self.dirty.window = true;

        log::trace!("  Window 1: {:?}", self.windows.window_1);
        log::trace!("  Window 2: {:?}", self.windows.window_2);
    }

    pub fn write_wbglog(&mut self, value: u8) {
        // WBGLOG: BG1-4 window logic
        for (i, channel) in self.windows.channels[..4].iter_mut().enumerate() {
            channel.logic = WindowMaskLogic::from_bits(value >> (2 * i));
        }
        self.dirty.window = true;

        log::trace!(
            "  BG window logic: {:?}",
            self.windows.channels[..4].iter().map(|channel| channel.logic).collect::<Vec<_>>()
        );
    }

    pub fn write_wobjlog(&mut self, value: u8) {
        // WOBJLOG: OBJ and color window logic
        self.windows.channels[OBJ_WINDOW_CHANNEL].logic = WindowMaskLogic::from_bits(value);
        self.windows.channels[COLOR_WINDOW_CHANNEL].logic = WindowMaskLogic::from_bits(value >> 2);
        self.dirty.window = true;

        log::trace!("  OBJ window logic: {:?}", self.windows.channels[OBJ_WINDOW_CHANNEL].logic);
        log::trace!(
            "  Color window logic: {:?}",
            self.windows.channels[COLOR_WINDOW_CHANNEL].logic
        );
    }

    fn designations_mut(&mut self) -> impl Iterator<Item = &mut ScreenDesignation> {
        self.bgs
            .iter_mut()
            .map(|bg| &mut bg.designation)
            .chain(std::iter::once(&mut self.obj.designation))
    }

    fn designation_bits(&self, field: impl Fn(&ScreenDesignation) -> bool) -> [bool; 5] {
        [
            field(&self.bgs[0].designation),
            field(&self.bgs[1].designation),
            field(&self.bgs[2].designation),
            field(&self.bgs[3].designation),
            field(&self.obj.designation),
        ]
    }

    pub fn write_tm(&mut self, value: u8) {
        // TM: Main screen designation (BG1-4, OBJ)
        for (i, designation) in self.designations_mut().enumerate() {
            designation.main_enabled = value.bit(i as u8);
        }
        log::trace!("  Main screen enabled: {:?}", self.designation_bits(|d| d.main_enabled));
    }

    pub fn write_ts(&mut self, value: u8) {
        // TS: Sub screen designation
        for (i, designation) in self.designations_mut().enumerate() {
            designation.sub_enabled = value.bit(i as u8);
        }
        log::trace!("  Sub screen enabled: {:?}", self.designation_bits(|d| d.sub_enabled));
    }

    pub fn write_tmw(&mut self, value: u8) {
        // TMW: Main screen window clip
        for (i, designation) in self.designations_mut().enumerate() {
            designation.main_window_clip = value.bit(i as u8);
        }
        log::trace!(
            "  Main screen window clip: {:?}",
            self.designation_bits(|d| d.main_window_clip)
        );
    }

    pub fn write_tsw(&mut self, value: u8) {
        // TSW: Sub screen window clip
        for (i, designation) in self.designations_mut().enumerate() {
            designation.sub_window_clip = value.bit(i as u8);
        }
        log::trace!("  Sub screen window clip: {:?}", self.designation_bits(|d| d.sub_window_clip));
    }

    pub fn write_cgwsel(&mut self, value: u8) {
        // CGWSEL: Color math window conditions and source
        self.color_math.direct_color = value.bit(0);
        self.color_math.use_sub_screen = value.bit(1);
        self.color_math.math_enabled = match (value >> 4) & 0x03 {
            0 => ColorWindowCondition::Always,
            1 => ColorWindowCondition::InsideWindow,
            2 => ColorWindowCondition::OutsideWindow,
            3 => ColorWindowCondition::Never,
            _ => unreachable!("value & 0x03 is always <= 3"),
        };
        self.color_math.clip_to_black = match value >> 6 {
            0 => ColorWindowCondition::Never,
            1 => ColorWindowCondition::OutsideWindow,
            2 => ColorWindowCondition::InsideWindow,
            3 => ColorWindowCondition::Always,
            _ => unreachable!("value >> 6 is always <= 3"),
        };

        log::trace!("  Direct color: {}", self.color_math.direct_color);
        log::trace!("  Color math uses sub screen: {}", self.color_math.use_sub_screen);
        log::trace!("  Color math enabled: {:?}", self.color_math.math_enabled);
        log::trace!("  Clip to black: {:?}", self.color_math.clip_to_black);
    }

    pub fn write_cgadsub(&mut self, value: u8) {
        // CGADSUB: Color math layer participation and operation
        for (i, designation) in self.designations_mut().enumerate() {
            designation.color_math = value.bit(i as u8);
        }
        self.color_math.backdrop = value.bit(5);
        self.color_math.half = value.bit(6);
        self.color_math.operation =
            if value.bit(7) { ColorMathOperation::Subtract } else { ColorMathOperation::Add };

        log::trace!("  Color math layers: {:?}", self.designation_bits(|d| d.color_math));
        log::trace!("  Color math backdrop: {}", self.color_math.backdrop);
        log::trace!("  Color math half: {}", self.color_math.half);
        log::trace!("  Color math operation: {:?}", self.color_math.operation);
    }

    /// COLDATA updates the fixed color, which lives in the extra CGRAM entry.
    pub fn write_coldata(&mut self, value: u8, cgram: &mut Cgram) {
        let intensity = u16::from(value & 0x1F);
        let mut color = cgram.fixed_color();
        for (bit, shift) in [(5, 0), (6, 5), (7, 10)] {
            if value.bit(bit) {
                color = (color & !(0x1F << shift)) | (intensity << shift);
            }
        }
        cgram.set_fixed_color(color);
        self.dirty.palette = true;

        log::trace!("  Fixed color: {color:04X}");
    }

    pub fn multiply_result(&self) -> i32 {
        i32::from(self.multiply_operand_l) * i32::from(self.multiply_operand_r)
    }
}

pub fn sign_extend_13(value: u16) -> i16 {
    (((value & 0x1FFF) << 3) as i16) >> 3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PowerOnMemory;
    use test_log::test;

    #[test]
    fn h_scroll_latch_merges_fine_scroll() {
        let mut registers = Registers::new();
        registers.write_bg_h_scroll(1, 0xFD);
        assert_eq!(0xFD00, registers.bgs[1].h_scroll);
        registers.write_bg_h_scroll(1, 0x02);
        assert_eq!(0x02FD, registers.bgs[1].h_scroll);

        registers.write_bg_h_scroll(1, 0x13);
        registers.write_bg_h_scroll(1, 0x00);
        assert_eq!(0x0013, registers.bgs[1].h_scroll);

        // A lone write takes bits 3-7 from the latch and bits 0-2 from the old high byte
        registers.write_bg_h_scroll(1, 0x01);
        assert_eq!(0x0100, registers.bgs[1].h_scroll);
    }

    #[test]
    fn scroll_and_mode_7_latches_are_independent() {
        let mut registers = Registers::new();
        registers.write_m7a(0x00);
        registers.write_m7a(0x01);
        assert_eq!(0x0100, registers.mode_7.a);

        registers.write_bg_v_scroll(2, 0x34);
        registers.write_m7d(0xFF);
        registers.write_bg_v_scroll(2, 0x01);
        assert_eq!(0x134, registers.bgs[2].v_scroll);
        // M7D picked up M7A's high byte from the Mode 7 latch
        assert_eq!(0xFF01_u16 as i16, registers.mode_7.d);
    }

    #[test]
    fn mode_7_center_is_13_bit_signed() {
        let mut registers = Registers::new();
        registers.write_m7x(0xFF);
        registers.write_m7x(0x1F);
        assert_eq!(-1, registers.mode_7.center_x);

        registers.write_m7y(0xFF);
        registers.write_m7y(0x0F);
        assert_eq!(0x0FFF, registers.mode_7.center_y);
    }

    #[test]
    fn multiply_unit() {
        let mut registers = Registers::new();
        // M7A = -2, M7B high byte = 3
        registers.write_m7a(0xFE);
        registers.write_m7a(0xFF);
        registers.write_m7b(0x00);
        registers.write_m7b(0x03);
        assert_eq!(-6, registers.multiply_result());
    }

    #[test]
    fn coldata_updates_selected_channels() {
        let mut registers = Registers::new();
        let mut cgram = Cgram::new(PowerOnMemory::Zeroed);

        registers.write_coldata(0xE0 | 0x1F, &mut cgram);
        assert_eq!(0x7FFF, cgram.fixed_color());

        registers.write_coldata(0x40 | 0x03, &mut cgram);
        assert_eq!(0x7C7F, cgram.fixed_color());
    }

    #[test]
    fn cgwsel_conditions() {
        let mut registers = Registers::new();
        registers.write_cgwsel(0b0110_0010);
        assert_eq!(ColorWindowCondition::OutsideWindow, registers.color_math.clip_to_black);
        assert_eq!(ColorWindowCondition::OutsideWindow, registers.color_math.math_enabled);
        assert!(registers.color_math.use_sub_screen);
        assert!(!registers.color_math.direct_color);
    }

    #[test]
    fn bit_depth_per_mode() {
        assert_eq!(Some(BitDepth::Two), BgMode::Zero.bg_bit_depth(3));
        assert_eq!(Some(BitDepth::Two), BgMode::One.bg_bit_depth(2));
        assert_eq!(None, BgMode::One.bg_bit_depth(3));
        assert_eq!(None, BgMode::Two.bg_bit_depth(2));
        assert_eq!(Some(BitDepth::Eight), BgMode::Three.bg_bit_depth(0));
        assert_eq!(Some(BitDepth::Two), BgMode::Four.bg_bit_depth(1));
        assert_eq!(None, BgMode::Six.bg_bit_depth(1));
        assert_eq!(None, BgMode::Seven.bg_bit_depth(0));
    }

    #[test]
    fn vram_address_translation() {
        assert_eq!(0x1234, VramAddressTranslation::None.apply(0x1234));
        // aaaaaaaaYYYxxxxx -> aaaaaaaaxxxxxYYY
        assert_eq!(0xFF00 | (0x15 << 3) | 0x05, VramAddressTranslation::EightBit.apply(0xFFB5));
        assert_eq!(0x0208, VramAddressTranslation::NineBit.apply(0x0201));
        assert_eq!(0x0007, VramAddressTranslation::TenBit.apply(0x0380));
    }

    #[test]
    fn window_writes_mark_masks_dirty() {
        let mut registers = Registers::new();
        registers.dirty = DirtyFlags::default();

        registers.write_tm(0x1F);
        assert!(!registers.dirty.window);

        registers.write_window_position(1, 0x80);
        assert!(registers.dirty.window);
        assert_eq!(WindowRange { left: 0, right: 0x80 }, registers.windows.window_1);
    }

    #[test]
    fn inidisp_marks_palette_dirty_on_brightness_change() {
        let mut registers = Registers::new();
        registers.dirty = DirtyFlags::default();

        registers.write_inidisp(0x00);
        assert!(!registers.dirty.palette);

        registers.write_inidisp(0x0F);
        assert!(registers.dirty.palette);
        assert!(!registers.forced_blank);
    }
}
