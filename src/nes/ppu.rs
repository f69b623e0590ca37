//! NES PPU: an 8-register scanline rasterizer.
//!
//! The PPU and CPU run on the same 262-scanline frame clock but are driven
//! from the orchestrator (see `nes::Nes`), not from each other; this module
//! only exposes `step_scanline`, the register read/write pair the CPU bus
//! dispatches through, and the three pixel buffers a frame accumulates.

use bitflags::bitflags;

use crate::nes::cartridge::{Cartridge, Mirroring};
use crate::nes::hal::Pixel;
use crate::nes::ppu_databus::PpuRegs;

pub const OAM_SIZE: usize = 256;
const VRAM_SIZE: usize = 0x800;
const PALETTE_SIZE: usize = 0x20;
pub const SCANLINES_PER_FRAME: u16 = 262;
const POST_RENDER_LINE: u16 = 240;
const VBLANK_START_LINE: u16 = 241;
const PRE_RENDER_LINE: u16 = 261;

bitflags! {
    pub struct CtrlFlags: u8 {
        const NAMETABLE_LO          = 0b0000_0001;
        const NAMETABLE_HI          = 0b0000_0010;
        const VRAM_INCREMENT_32     = 0b0000_0100;
        const SPRITE_PATTERN_HI     = 0b0000_1000;
        const BACKGROUND_PATTERN_HI = 0b0001_0000;
        const SPRITE_SIZE_16        = 0b0010_0000;
        const MASTER_SLAVE          = 0b0100_0000;
        const NMI_ENABLE            = 0b1000_0000;
    }
}

bitflags! {
    pub struct MaskFlags: u8 {
        const GREYSCALE          = 0b0000_0001;
        const SHOW_BG_LEFT       = 0b0000_0010;
        const SHOW_SPRITES_LEFT  = 0b0000_0100;
        const SHOW_BACKGROUND    = 0b0000_1000;
        const SHOW_SPRITES       = 0b0001_0000;
        const EMPHASIZE_RED      = 0b0010_0000;
        const EMPHASIZE_GREEN    = 0b0100_0000;
        const EMPHASIZE_BLUE     = 0b1000_0000;
    }
}

bitflags! {
    pub struct StatusFlags: u8 {
        const SPRITE_OVERFLOW = 0b0010_0000;
        const SPRITE_ZERO_HIT = 0b0100_0000;
        const VBLANK          = 0b1000_0000;
    }
}

/// The scroll/address registers, kept in the "loopy" v/t/fine-x shape the
/// real PPU uses so mid-frame `$2005`/`$2006` writes behave correctly.
#[derive(Default)]
struct Registers {
    ctrl: u8,
    mask: u8,
    status: u8,
    oam_addr: u8,
    /// Current VRAM address (15 bits): fine-Y(3) | NN(2) | coarse-Y(5) | coarse-X(5).
    v: u16,
    /// Temporary VRAM address, same layout, latched by $2005/$2006's first write.
    t: u16,
    fine_x: u8,
    /// Shared write-toggle for $2005/$2006.
    write_latch: bool,
    /// Buffered byte for non-palette $2007 reads.
    data_buffer: u8,
}

pub struct Ppu {
    regs: Registers,
    oam: [u8; OAM_SIZE],
    nametables: [u8; VRAM_SIZE],
    palette: [u8; PALETTE_SIZE],
    mirroring: Mirroring,
    scanline: u16,
    bbg: Vec<Pixel>,
    bg: Vec<Pixel>,
    fg: Vec<Pixel>,
}

impl Ppu {
    pub fn new(mirroring: Mirroring) -> Ppu {
        Ppu {
            regs: Registers::default(),
            oam: [0u8; OAM_SIZE],
            nametables: [0u8; VRAM_SIZE],
            palette: [0u8; PALETTE_SIZE],
            mirroring,
            scanline: 0,
            bbg: Vec::new(),
            bg: Vec::new(),
            fg: Vec::new(),
        }
    }

    fn ctrl(&self) -> CtrlFlags {
        CtrlFlags::from_bits_truncate(self.regs.ctrl)
    }

    fn mask(&self) -> MaskFlags {
        MaskFlags::from_bits_truncate(self.regs.mask)
    }

    fn status(&self) -> StatusFlags {
        StatusFlags::from_bits_truncate(self.regs.status)
    }

    // ----- PPU-bus (16 KiB) dispatch -----------------------------------

    /// Maps a `$2000-$3EFF` nametable address onto the 2 KiB of physical
    /// VRAM according to the cartridge's mirroring mode.
    fn resolve_nametable_addr(&self, addr: u16) -> usize {
        let addr = (addr - 0x2000) % 0x1000;
        let table = addr / 0x400;
        let offset = (addr % 0x400) as usize;
        let physical_table = match self.mirroring {
            Mirroring::Horizontal => table / 2,
            Mirroring::Vertical => table % 2,
        };
        physical_table as usize * 0x400 + offset
    }

    fn ppu_bus_read(&self, cart: &Cartridge, addr: u16) -> u8 {
        let addr = addr & 0x3FFF;
        match addr {
            0x0000..=0x1FFF => cart.ppu_chr_read(addr),
            0x2000..=0x3EFF => self.nametables[self.resolve_nametable_addr(addr)],
            0x3F00..=0x3FFF => self.palette[Self::palette_index(addr)],
            _ => 0,
        }
    }

    fn ppu_bus_write(&mut self, cart: &mut Cartridge, addr: u16, value: u8) {
        let addr = addr & 0x3FFF;
        match addr {
            0x0000..=0x1FFF => cart.ppu_chr_write(addr, value),
            0x2000..=0x3EFF => {
                let idx = self.resolve_nametable_addr(addr);
                self.nametables[idx] = value;
            }
            0x3F00..=0x3FFF => {
                let idx = Self::palette_index(addr);
                self.palette[idx] = value;
            }
            _ => {}
        }
    }

    /// `$3F10/14/18/1C` mirror `$3F00/04/08/0C`.
    fn palette_index(addr: u16) -> usize {
        let mut idx = (addr - 0x3F00) % 0x20;
        if idx >= 0x10 && idx % 4 == 0 {
            idx -= 0x10;
        }
        idx as usize
    }

    fn vram_increment(&self) -> u16 {
        if self.ctrl().contains(CtrlFlags::VRAM_INCREMENT_32) { 32 } else { 1 }
    }

    // ----- CPU-facing register protocol ($2000-$2007) ------------------

    pub fn read_register(&mut self, reg: PpuRegs, cart: &Cartridge) -> u8 {
        log::trace!("ppu read {:?} (v={:#06x})", reg, self.regs.v);
        match reg {
            PpuRegs::Status => {
                let value = self.regs.status;
                self.regs.status &= !StatusFlags::VBLANK.bits;
                self.regs.write_latch = false;
                value
            }
            PpuRegs::OamData => self.oam[self.regs.oam_addr as usize],
            PpuRegs::PpuData => {
                let addr = self.regs.v & 0x3FFF;
                let value = if addr >= 0x3F00 {
                    // Palette reads are immediate; the internal buffer is
                    // still refilled, from the nametable mirror one page below.
                    self.regs.data_buffer = self.ppu_bus_read(cart, addr - 0x1000);
                    self.ppu_bus_read(cart, addr)
                } else {
                    let buffered = self.regs.data_buffer;
                    self.regs.data_buffer = self.ppu_bus_read(cart, addr);
                    buffered
                };
                self.regs.v = self.regs.v.wrapping_add(self.vram_increment()) & 0x7FFF;
                value
            }
            _ => 0,
        }
    }

    pub fn write_register(&mut self, reg: PpuRegs, value: u8, cart: &mut Cartridge) {
        log::trace!("ppu write {:?} = {:#04x} (v={:#06x})", reg, value, self.regs.v);
        match reg {
            PpuRegs::Ctrl => {
                self.regs.ctrl = value;
                self.regs.t = (self.regs.t & !0x0C00) | (((value & 0x03) as u16) << 10);
            }
            PpuRegs::Mask => self.regs.mask = value,
            PpuRegs::Status => {}
            PpuRegs::OamAddr => self.regs.oam_addr = value,
            PpuRegs::OamData => {
                self.oam[self.regs.oam_addr as usize] = value;
                self.regs.oam_addr = self.regs.oam_addr.wrapping_add(1);
            }
            PpuRegs::Scroll => {
                if !self.regs.write_latch {
                    self.regs.fine_x = value & 0x07;
                    self.regs.t = (self.regs.t & !0x001F) | ((value >> 3) as u16);
                } else {
                    self.regs.t = (self.regs.t & !0x73E0)
                        | (((value & 0x07) as u16) << 12)
                        | (((value >> 3) as u16) << 5);
                }
                self.regs.write_latch = !self.regs.write_latch;
            }
            PpuRegs::PpuAddr => {
                if !self.regs.write_latch {
                    self.regs.t = (self.regs.t & 0x00FF) | (((value & 0x3F) as u16) << 8);
                } else {
                    self.regs.t = (self.regs.t & 0xFF00) | value as u16;
                    self.regs.v = self.regs.t;
                }
                self.regs.write_latch = !self.regs.write_latch;
            }
            PpuRegs::PpuData => {
                let addr = self.regs.v & 0x3FFF;
                self.ppu_bus_write(cart, addr, value);
                self.regs.v = self.regs.v.wrapping_add(self.vram_increment()) & 0x7FFF;
            }
        }
    }

    /// Entry point for `$4014` OAM DMA: writes one byte at the current OAM
    /// address and advances it, the same way a direct `$2004` write would.
    pub fn dma_write(&mut self, value: u8) {
        self.oam[self.regs.oam_addr as usize] = value;
        self.regs.oam_addr = self.regs.oam_addr.wrapping_add(1);
    }

    pub fn oam_addr(&self) -> u8 {
        self.regs.oam_addr
    }

    // ----- Scanline-level scroll bookkeeping (NESDEV "loopy" algorithm) --

    fn copy_horizontal_bits(&mut self) {
        self.regs.v = (self.regs.v & !0x041F) | (self.regs.t & 0x041F);
    }

    fn copy_vertical_bits(&mut self) {
        self.regs.v = (self.regs.v & !0x7BE0) | (self.regs.t & 0x7BE0);
    }

    fn increment_y(&mut self) {
        let mut v = self.regs.v;
        if (v & 0x7000) != 0x7000 {
            v += 0x1000;
        } else {
            v &= !0x7000;
            let mut y = (v & 0x03E0) >> 5;
            if y == 29 {
                y = 0;
                v ^= 0x0800;
            } else if y == 31 {
                y = 0;
            } else {
                y += 1;
            }
            v = (v & !0x03E0) | (y << 5);
        }
        self.regs.v = v;
    }

    fn rendering_enabled(&self) -> bool {
        self.mask().contains(MaskFlags::SHOW_BACKGROUND) || self.mask().contains(MaskFlags::SHOW_SPRITES)
    }

    /// Advances the PPU by exactly one scanline. Returns `true` the one
    /// time an NMI should be delivered to the CPU (vblank's start, gated on
    /// PPUCTRL bit 7).
    pub fn step_scanline(&mut self, cart: &Cartridge) -> bool {
        let mut nmi = false;
        match self.scanline {
            0..=239 => {
                if self.rendering_enabled() {
                    self.copy_horizontal_bits();
                }
                self.render_background_scanline(cart);
                self.render_sprites_scanline(cart);
                if self.rendering_enabled() {
                    self.increment_y();
                }
            }
            l if l == POST_RENDER_LINE => {}
            l if l == VBLANK_START_LINE => {
                self.regs.status |= StatusFlags::VBLANK.bits;
                if self.ctrl().contains(CtrlFlags::NMI_ENABLE) {
                    nmi = true;
                }
            }
            l if l == PRE_RENDER_LINE => {
                self.regs.status &= !(StatusFlags::VBLANK.bits
                    | StatusFlags::SPRITE_ZERO_HIT.bits
                    | StatusFlags::SPRITE_OVERFLOW.bits);
                if self.rendering_enabled() {
                    self.copy_vertical_bits();
                }
            }
            _ => {}
        }

        self.scanline += 1;
        if self.scanline >= SCANLINES_PER_FRAME {
            self.scanline = 0;
        }
        nmi
    }

    fn render_background_scanline(&mut self, cart: &Cartridge) {
        if !self.mask().contains(MaskFlags::SHOW_BACKGROUND) {
            return;
        }
        let y = self.scanline;
        let fine_y = (self.regs.v >> 12) & 0x07;
        let nt_select = (self.regs.v >> 10) & 0x03;
        let nt_base = 0x2000 + nt_select * 0x400;
        let coarse_y = (self.regs.v >> 5) & 0x1F;
        let start_coarse_x = self.regs.v & 0x001F;
        let pattern_table: u16 = if self.ctrl().contains(CtrlFlags::BACKGROUND_PATTERN_HI) { 0x1000 } else { 0x0000 };

        // One extra tile so fine-X scrolling still has a next tile to pull from.
        for tile_x in 0..33u16 {
            let coarse_x = (start_coarse_x + tile_x) % 32;
            let nt_addr = nt_base + coarse_y * 32 + coarse_x;
            let tile_index = self.ppu_bus_read(cart, nt_addr);

            let attr_addr = nt_base + 0x3C0 + (coarse_y / 4) * 8 + coarse_x / 4;
            let attr_byte = self.ppu_bus_read(cart, attr_addr);
            let shift = ((coarse_y % 4) / 2 * 2 + (coarse_x % 4) / 2) * 2;
            let palette_select = (attr_byte >> shift) & 0x03;

            let pattern_addr = pattern_table + (tile_index as u16) * 16 + fine_y;
            let low = self.ppu_bus_read(cart, pattern_addr);
            let high = self.ppu_bus_read(cart, pattern_addr + 8);

            for px in 0..8u16 {
                let bit = 7 - px;
                let lo_bit = (low >> bit) & 1;
                let hi_bit = (high >> bit) & 1;
                let color_idx = (hi_bit << 1) | lo_bit;
                if color_idx == 0 {
                    continue;
                }
                let screen_x = tile_x as i32 * 8 + px as i32 - self.regs.fine_x as i32;
                if screen_x < 0 || screen_x >= 256 {
                    continue;
                }
                if screen_x < 8 && !self.mask().contains(MaskFlags::SHOW_BG_LEFT) {
                    continue;
                }
                let palette_addr = 0x3F00 + (palette_select as u16) * 4 + color_idx as u16;
                let pal = self.ppu_bus_read(cart, palette_addr);
                self.bg.push(Pixel { x: screen_x as u16, y, palette_index: pal });
            }
        }
    }

    fn sprite_height(&self) -> u16 {
        if self.ctrl().contains(CtrlFlags::SPRITE_SIZE_16) { 16 } else { 8 }
    }

    fn render_sprites_scanline(&mut self, cart: &Cartridge) {
        if !self.mask().contains(MaskFlags::SHOW_SPRITES) {
            return;
        }
        let y = self.scanline;
        let height = self.sprite_height();
        let mut found = 0u8;

        for i in 0..64usize {
            let base = i * 4;
            let sprite_y = self.oam[base] as u16 + 1;
            if y < sprite_y || y >= sprite_y + height {
                continue;
            }
            if found == 8 {
                self.regs.status |= StatusFlags::SPRITE_OVERFLOW.bits;
                break;
            }
            found += 1;

            let tile = self.oam[base + 1];
            let attr = self.oam[base + 2];
            let x = self.oam[base + 3];
            let flip_h = attr & 0x40 != 0;
            let flip_v = attr & 0x80 != 0;
            let behind_bg = attr & 0x20 != 0;
            let palette_select = attr & 0x03;

            let row_in_sprite = y - sprite_y;
            let row_in_sprite = if flip_v { height - 1 - row_in_sprite } else { row_in_sprite };

            let pattern_addr = if height == 16 {
                let table = if tile & 0x01 != 0 { 0x1000u16 } else { 0x0000 };
                let tile_idx = (tile & 0xFE) as u16 + if row_in_sprite >= 8 { 1 } else { 0 };
                table + tile_idx * 16 + (row_in_sprite % 8)
            } else {
                let table: u16 = if self.ctrl().contains(CtrlFlags::SPRITE_PATTERN_HI) { 0x1000 } else { 0x0000 };
                table + (tile as u16) * 16 + row_in_sprite
            };
            let low = self.ppu_bus_read(cart, pattern_addr);
            let high = self.ppu_bus_read(cart, pattern_addr + 8);

            for px in 0..8u16 {
                let bit = if flip_h { px } else { 7 - px };
                let lo_bit = (low >> bit) & 1;
                let hi_bit = (high >> bit) & 1;
                let color_idx = (hi_bit << 1) | lo_bit;
                if color_idx == 0 {
                    continue;
                }
                let screen_x = x as i32 + px as i32;
                if screen_x < 0 || screen_x >= 256 {
                    continue;
                }
                if screen_x < 8 && !self.mask().contains(MaskFlags::SHOW_SPRITES_LEFT) {
                    continue;
                }

                if i == 0 && screen_x != 255 {
                    let bg_opaque = self.bg.iter().any(|p| p.x == screen_x as u16 && p.y == y);
                    if bg_opaque {
                        self.regs.status |= StatusFlags::SPRITE_ZERO_HIT.bits;
                    }
                }

                let palette_addr = 0x3F10 + (palette_select as u16) * 4 + color_idx as u16;
                let pal = self.ppu_bus_read(cart, palette_addr);
                let pixel = Pixel { x: screen_x as u16, y, palette_index: pal };
                if behind_bg {
                    self.bbg.push(pixel);
                } else {
                    self.fg.push(pixel);
                }
            }
        }
    }

    /// Drains this frame's three priority buffers in back-to-front order:
    /// behind-background sprites, background, then foreground sprites.
    pub fn take_frame(&mut self) -> Vec<Pixel> {
        let mut out = Vec::with_capacity(self.bbg.len() + self.bg.len() + self.fg.len());
        out.append(&mut self.bbg);
        out.append(&mut self.bg);
        out.append(&mut self.fg);
        out
    }

    pub fn vblank(&self) -> bool {
        self.status().contains(StatusFlags::VBLANK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_cart() -> Cartridge {
        let mut bytes = vec![0x4E, 0x45, 0x53, 0x1A, 1, 0, 0, 0];
        bytes.extend(vec![0u8; 8]);
        bytes.extend(vec![0u8; 0x4000]);
        Cartridge::load(&bytes).unwrap()
    }

    #[test]
    fn status_read_clears_vblank_and_latch() {
        let mut cart = blank_cart();
        let mut ppu = Ppu::new(Mirroring::Horizontal);
        ppu.write_register(PpuRegs::PpuAddr, 0x20, &mut cart);
        ppu.regs.status |= StatusFlags::VBLANK.bits;
        ppu.regs.write_latch = true;
        let value = ppu.read_register(PpuRegs::Status, &cart);
        assert_eq!(value & StatusFlags::VBLANK.bits, StatusFlags::VBLANK.bits);
        assert!(!ppu.regs.write_latch);
        assert_eq!(ppu.regs.status & StatusFlags::VBLANK.bits, 0);
    }

    #[test]
    fn horizontal_mirroring_pairs_top_tables() {
        let mut cart = blank_cart();
        let mut ppu = Ppu::new(Mirroring::Horizontal);
        ppu.ppu_bus_write(&mut cart, 0x2000, 0x55);
        assert_eq!(ppu.ppu_bus_read(&cart, 0x2400), 0x55);
    }

    #[test]
    fn vertical_mirroring_pairs_left_tables() {
        let mut cart = blank_cart();
        let mut ppu = Ppu::new(Mirroring::Vertical);
        ppu.ppu_bus_write(&mut cart, 0x2000, 0x77);
        assert_eq!(ppu.ppu_bus_read(&cart, 0x2800), 0x77);
    }

    #[test]
    fn palette_mirrors_every_fourth_entry() {
        let mut cart = blank_cart();
        let mut ppu = Ppu::new(Mirroring::Horizontal);
        ppu.ppu_bus_write(&mut cart, 0x3F00, 0x0F);
        assert_eq!(ppu.ppu_bus_read(&cart, 0x3F10), 0x0F);
    }

    #[test]
    fn vblank_asserted_with_nmi_at_scanline_241() {
        let mut cart = blank_cart();
        let mut ppu = Ppu::new(Mirroring::Horizontal);
        ppu.write_register(PpuRegs::Ctrl, 0x80, &mut cart);
        let mut nmi_fired = false;
        for _ in 0..=241 {
            if ppu.step_scanline(&cart) {
                nmi_fired = true;
            }
        }
        assert!(nmi_fired);
        assert!(ppu.vblank());
    }

    #[test]
    fn pre_render_line_clears_status_flags() {
        let cart = blank_cart();
        let mut ppu = Ppu::new(Mirroring::Horizontal);
        ppu.regs.status = StatusFlags::VBLANK.bits | StatusFlags::SPRITE_ZERO_HIT.bits | StatusFlags::SPRITE_OVERFLOW.bits;
        ppu.scanline = PRE_RENDER_LINE;
        ppu.step_scanline(&cart);
        assert_eq!(ppu.regs.status, 0);
    }
}
