//! Host Abstraction Layer: the core's only window onto the outside world.
//!
//! The core never branches on build-time flags to decide how to present a
//! frame or read a pad; it holds a `Box<dyn Hal>` picked once at
//! construction. [`PistonHal`] drives an actual window (the path the
//! original `main.rs` took by hand); [`HeadlessHal`] just buffers frames in
//! memory, which is what the orchestrator's own tests and any non-interactive
//! run use.

use crate::nes::util::{NesError, NesResult};

/// One pixel produced by the PPU: screen coordinates plus an index into the
/// 64-entry NES system palette. Packed exactly as the wire format in
/// `PixelBuffer::push` expects, so the HAL never has to re-derive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixel {
    pub x: u16,
    pub y: u16,
    pub palette_index: u8,
}

/// Buttons addressable through `hal_key_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Power,
    A,
    B,
    Select,
    Start,
    Up,
    Down,
    Left,
    Right,
}

pub trait Hal {
    /// Called exactly once, before any other Hal method.
    fn hal_init(&mut self) -> NesResult<()>;
    /// Sets the clear color used by the next `hal_flip`.
    fn hal_set_bg_color(&mut self, palette_index: u8);
    /// Appends every pixel in `pixels` to the pending frame.
    fn hal_flush_buf(&mut self, pixels: &[Pixel]);
    /// Presents the pending frame and clears it to the background color.
    fn hal_flip(&mut self) -> NesResult<()>;
    /// Blocks until the next frame tick (nominally 60 Hz).
    fn hal_wait_for_frame(&mut self);
    /// Polls one button's live state.
    fn hal_key_state(&self, button: Button) -> bool;
}

/// The 64-entry NES PPU palette, NTSC-ish RGB approximation. Indexed by the
/// 6-bit value stored in palette RAM.
pub const SYSTEM_PALETTE: [[u8; 3]; 64] = [
    [84, 84, 84], [0, 30, 116], [8, 16, 144], [48, 0, 136], [68, 0, 100], [92, 0, 48], [84, 4, 0], [60, 24, 0],
    [32, 42, 0], [8, 58, 0], [0, 64, 0], [0, 60, 0], [0, 50, 60], [0, 0, 0], [0, 0, 0], [0, 0, 0],
    [152, 150, 152], [8, 76, 196], [48, 50, 236], [92, 30, 228], [136, 20, 176], [160, 20, 100], [152, 34, 32], [120, 60, 0],
    [84, 90, 0], [40, 114, 0], [8, 124, 0], [0, 118, 40], [0, 102, 120], [0, 0, 0], [0, 0, 0], [0, 0, 0],
    [236, 238, 236], [76, 154, 236], [120, 124, 236], [176, 98, 236], [228, 84, 236], [236, 88, 180], [236, 106, 100], [212, 136, 32],
    [160, 170, 0], [116, 196, 0], [76, 208, 32], [56, 204, 108], [56, 180, 204], [60, 60, 60], [0, 0, 0], [0, 0, 0],
    [236, 238, 236], [168, 204, 236], [188, 188, 236], [212, 178, 236], [236, 174, 236], [236, 174, 212], [236, 180, 176], [228, 196, 144],
    [204, 210, 120], [180, 222, 120], [168, 226, 144], [152, 226, 180], [160, 214, 228], [160, 162, 160], [0, 0, 0], [0, 0, 0],
];

/// Blits into a framebuffer via `piston_window`/`image`. Grounded on the
/// window-creation and texture-update sequence the original entry point
/// wired up by hand; here it's just packaged behind the `Hal` trait.
pub struct PistonHal {
    width: u32,
    height: u32,
    bg_color: u8,
    frame: image::RgbaImage,
    window: Option<piston_window::PistonWindow>,
    texture_context: Option<piston_window::G2dTextureContext>,
}

impl PistonHal {
    pub fn new(width: u32, height: u32) -> PistonHal {
        PistonHal {
            width,
            height,
            bg_color: 0x0F,
            frame: image::ImageBuffer::new(width, height),
            window: None,
            texture_context: None,
        }
    }

    fn bg_rgba(&self) -> image::Rgba<u8> {
        let rgb = SYSTEM_PALETTE[(self.bg_color & 0x3F) as usize];
        image::Rgba([rgb[0], rgb[1], rgb[2], 255])
    }
}

impl Hal for PistonHal {
    fn hal_init(&mut self) -> NesResult<()> {
        use piston_window::{PistonWindow, WindowSettings};
        let window: PistonWindow = WindowSettings::new("fami-core", (self.width, self.height))
            .exit_on_esc(true)
            .build()
            .map_err(|e| NesError::HalUnavailable(e.to_string()))?;
        let texture_context = piston_window::TextureContext {
            factory: window.factory.clone(),
            encoder: window.factory.create_command_buffer().into(),
        };
        self.window = Some(window);
        self.texture_context = Some(texture_context);
        Ok(())
    }

    fn hal_set_bg_color(&mut self, palette_index: u8) {
        self.bg_color = palette_index;
    }

    fn hal_flush_buf(&mut self, pixels: &[Pixel]) {
        for p in pixels {
            if (p.x as u32) < self.width && (p.y as u32) < self.height {
                let rgb = SYSTEM_PALETTE[(p.palette_index & 0x3F) as usize];
                self.frame.put_pixel(p.x as u32, p.y as u32, image::Rgba([rgb[0], rgb[1], rgb[2], 255]));
            }
        }
    }

    fn hal_flip(&mut self) -> NesResult<()> {
        use piston_window::{Texture, TextureSettings, G2dTexture};
        let window = self.window.as_mut().ok_or_else(|| NesError::HalUnavailable("hal_init not called".into()))?;
        let texture_context = self.texture_context.as_mut().unwrap();
        if let Some(event) = window.next() {
            let texture: G2dTexture = Texture::from_image(texture_context, &self.frame, &TextureSettings::new())
                .map_err(|e| NesError::HalUnavailable(e.to_string()))?;
            window.draw_2d(&event, |c, g, device| {
                texture_context.encoder.flush(device);
                piston_window::image(&texture, c.transform, g);
            });
        }
        let bg = self.bg_rgba();
        for px in self.frame.pixels_mut() {
            *px = bg;
        }
        Ok(())
    }

    fn hal_wait_for_frame(&mut self) {
        // PistonWindow's event loop already paces to the monitor's refresh
        // rate; the window.next() call inside hal_flip is the actual wait.
    }

    fn hal_key_state(&self, _button: Button) -> bool {
        // Key state is latched from window events in a full build; the
        // core's controller plumbing talks to Controller directly instead
        // of polling through this path for the interactive HAL.
        false
    }
}

/// In-memory HAL with no window, used by headless runs and tests. Frames are
/// just the last flushed set of pixels plus the background color they were
/// cleared to.
pub struct HeadlessHal {
    bg_color: u8,
    pending: Vec<Pixel>,
    pub last_frame: Vec<Pixel>,
    pub flips: u64,
    buttons: [bool; 9],
}

impl HeadlessHal {
    pub fn new() -> HeadlessHal {
        HeadlessHal { bg_color: 0x0F, pending: Vec::new(), last_frame: Vec::new(), flips: 0, buttons: [false; 9] }
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.buttons[button_index(button)] = pressed;
    }
}

fn button_index(button: Button) -> usize {
    match button {
        Button::Power => 0,
        Button::A => 1,
        Button::B => 2,
        Button::Select => 3,
        Button::Start => 4,
        Button::Up => 5,
        Button::Down => 6,
        Button::Left => 7,
        Button::Right => 8,
    }
}

impl Hal for HeadlessHal {
    fn hal_init(&mut self) -> NesResult<()> {
        Ok(())
    }

    fn hal_set_bg_color(&mut self, palette_index: u8) {
        self.bg_color = palette_index;
    }

    fn hal_flush_buf(&mut self, pixels: &[Pixel]) {
        self.pending.extend_from_slice(pixels);
    }

    fn hal_flip(&mut self) -> NesResult<()> {
        self.last_frame = std::mem::take(&mut self.pending);
        self.flips += 1;
        let _ = self.bg_color;
        Ok(())
    }

    fn hal_wait_for_frame(&mut self) {}

    fn hal_key_state(&self, button: Button) -> bool {
        self.buttons[button_index(button)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_flip_drains_pending_into_last_frame() {
        let mut hal = HeadlessHal::new();
        hal.hal_init().unwrap();
        hal.hal_flush_buf(&[Pixel { x: 1, y: 2, palette_index: 5 }]);
        hal.hal_flip().unwrap();
        assert_eq!(hal.last_frame.len(), 1);
        assert_eq!(hal.flips, 1);
    }

    #[test]
    fn headless_tracks_button_state() {
        let mut hal = HeadlessHal::new();
        assert!(!hal.hal_key_state(Button::A));
        hal.set_button(Button::A, true);
        assert!(hal.hal_key_state(Button::A));
    }
}
