pub mod api;
mod memory;
mod ppu;

pub use api::{ForcedBlankFill, PowerOnMemory, PpuConfig, PpuStateError, SpriteLimits};
pub use ppu::{BitDepth, MAX_SCREEN_HEIGHT, Ppu, SCREEN_WIDTH};
pub use ppu_common::frontend::{Color, FrameSize, TimingMode};
