//! Per-column window masks for the BG1-4, OBJ, and color window channels
//!
//! A mask entry is the raw "in window" result of the channel's window logic. How it is consumed
//! depends on the channel: BG/OBJ layers are hidden where the mask is set (if TMW/TSW enables
//! clipping for that screen), while the color window is fed to the CGWSEL conditions, which can
//! act either inside or outside it.

use crate::ppu::SCREEN_WIDTH;
use crate::ppu::registers::{WINDOW_CHANNELS, WindowRegisters};
use bincode::{Decode, Encode};

#[derive(Debug, Clone, Encode, Decode)]
pub struct WindowMasks {
    in_window: Box<[[bool; SCREEN_WIDTH]; WINDOW_CHANNELS]>,
}

impl WindowMasks {
    pub fn new() -> Self {
        Self { in_window: Box::new([[false; SCREEN_WIDTH]; WINDOW_CHANNELS]) }
    }

    /// Windows are full-height bands, so the masks only depend on the window registers.
    pub fn build(&mut self, windows: &WindowRegisters) {
        for (channel, mask) in windows.channels.iter().zip(self.in_window.iter_mut()) {
            for (x, in_window) in (0..).zip(mask.iter_mut()) {
                *in_window =
                    channel.in_window(windows.window_1.contains(x), windows.window_2.contains(x));
            }
        }

        log::trace!("Rebuilt window masks: {:?} / {:?}", windows.window_1, windows.window_2);
    }

    #[inline]
    pub fn in_window(&self, channel: usize, x: usize) -> bool {
        self.in_window[channel][x]
    }
}
