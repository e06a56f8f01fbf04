//! SNES PPU public configuration and save state interface

use crate::ppu::Ppu;
use bincode::error::{DecodeError, EncodeError};
use bincode::{Decode, Encode};
use ppu_common::frontend::TimingMode;
use ppu_proc_macros::{ConfigDisplay, EnumDisplay};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, ConfigDisplay)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpriteLimits {
    pub max_sprites_per_line: u8,
    pub max_tiles_per_line: u8,
}

impl SpriteLimits {
    pub const HARDWARE: Self = Self { max_sprites_per_line: 32, max_tiles_per_line: 34 };

    #[inline]
    #[must_use]
    pub fn sprites_per_line(self) -> usize {
        self.max_sprites_per_line.max(1).into()
    }

    #[inline]
    #[must_use]
    pub fn tiles_per_line(self) -> usize {
        self.max_tiles_per_line.max(1).into()
    }
}

impl Default for SpriteLimits {
    fn default() -> Self {
        Self::HARDWARE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode, EnumDisplay)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ForcedBlankFill {
    /// Solid CGRAM color 0 at the current brightness
    #[default]
    Backdrop,
    Black,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode, EnumDisplay)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PowerOnMemory {
    #[default]
    Zeroed,
    Randomized,
}

impl PowerOnMemory {
    pub(crate) fn next_word(self) -> u16 {
        match self {
            Self::Zeroed => 0,
            Self::Randomized => rand::random(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode, ConfigDisplay)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PpuConfig {
    #[cfg_display(indent_nested)]
    pub sprite_limits: SpriteLimits,
    pub forced_blank_fill: ForcedBlankFill,
    pub timing_mode: TimingMode,
    pub power_on_memory: PowerOnMemory,
}

#[derive(Debug, Error)]
pub enum PpuStateError {
    #[error("Error encoding PPU state: {0}")]
    Encode(#[from] EncodeError),
    #[error("Error decoding PPU state: {0}")]
    Decode(#[from] DecodeError),
    #[error("PPU state has {0} trailing bytes")]
    TrailingBytes(usize),
}

/// Serialize the full PPU state, including memory contents and render caches.
///
/// # Errors
///
/// Propagates any error from the bincode encoder.
pub fn save_state(ppu: &Ppu) -> Result<Vec<u8>, PpuStateError> {
    let bytes = bincode::encode_to_vec(ppu, bincode::config::standard())?;
    Ok(bytes)
}

/// Restore a PPU from bytes produced by [`save_state`].
///
/// # Errors
///
/// Returns an error if the bytes do not decode to a PPU state or contain extra data after it.
pub fn load_state(bytes: &[u8]) -> Result<Ppu, PpuStateError> {
    let (mut ppu, bytes_read): (Ppu, usize) =
        bincode::decode_from_slice(bytes, bincode::config::standard())?;
    if bytes_read != bytes.len() {
        return Err(PpuStateError::TrailingBytes(bytes.len() - bytes_read));
    }

    ppu.invalidate_caches();

    log::debug!("Loaded PPU state ({} bytes)", bytes.len());

    Ok(ppu)
}
