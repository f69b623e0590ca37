//! The `Nes` aggregate: the orchestrator that owns the CPU, the bus (which
//! in turn owns the PPU, the cartridge, and the controller), and the HAL,
//! and drives them one frame at a time. This replaces the free-standing
//! globals the original emulator kept at module scope — everything lives
//! behind one struct passed by exclusive reference into each component's
//! `step`/`run` calls.

pub mod bus;
pub mod cartridge;
pub mod cpu;
pub mod hal;
pub mod input;
pub mod ppu;
pub mod ppu_databus;
pub mod util;

use bus::Bus;
use cartridge::Cartridge;
use cpu::Cpu;
use hal::{Button, Hal};
use input::{
    BUTTON_A, BUTTON_B, BUTTON_DOWN, BUTTON_LEFT, BUTTON_RIGHT, BUTTON_SELECT, BUTTON_START, BUTTON_UP,
};
use ppu::Ppu;
use util::NesResult;

/// CPU cycles granted to one scanline's worth of PPU progress: the NTSC
/// ratio of roughly 3 PPU dots per CPU cycle, 341 dots per scanline, rounded
/// down to keep CPU and PPU from drifting across a frame.
const CYCLES_PER_SCANLINE: u32 = 113;

/// Every button polled once per frame, paired with the bit position
/// `Controller::read` expects it at.
const BUTTON_MAP: [(usize, Button); 8] = [
    (BUTTON_A, Button::A),
    (BUTTON_B, Button::B),
    (BUTTON_SELECT, Button::Select),
    (BUTTON_START, Button::Start),
    (BUTTON_UP, Button::Up),
    (BUTTON_DOWN, Button::Down),
    (BUTTON_LEFT, Button::Left),
    (BUTTON_RIGHT, Button::Right),
];

pub struct Nes {
    cpu: Cpu,
    bus: Bus,
    hal: Box<dyn Hal>,
}

impl Nes {
    /// Parses `rom_bytes` as an iNES image and wires up a fresh CPU/PPU/bus
    /// around it. Does not touch the HAL yet; call [`Nes::power_on`] for that.
    pub fn load(rom_bytes: &[u8], hal: Box<dyn Hal>) -> NesResult<Nes> {
        let cart = Cartridge::load(rom_bytes)?;
        let mirroring = cart.mirroring();
        let bus = Bus::new(cart, Ppu::new(mirroring));
        Ok(Nes { cpu: Cpu::new(), bus, hal })
    }

    /// One-time startup: brings up the HAL, then runs the CPU reset sequence
    /// (PC from `$FFFC/$FFFD`, SP = `0xFD`, P = `0x24`).
    pub fn power_on(&mut self) -> NesResult<()> {
        self.hal.hal_init()?;
        self.cpu.reset(&mut self.bus);
        Ok(())
    }

    /// Drives exactly one 262-scanline frame: for each scanline, the PPU
    /// advances first (so its register side effects and any NMI assertion
    /// are observed before the CPU's budget for that scanline runs), then
    /// the CPU interprets whole instructions until it has spent at least
    /// `CYCLES_PER_SCANLINE` cycles. The frame is flushed to the HAL once
    /// all 262 scanlines have run.
    pub fn run_frame(&mut self) -> NesResult<()> {
        self.poll_controller();
        self.hal.hal_wait_for_frame();

        for _ in 0..ppu::SCANLINES_PER_FRAME {
            let nmi = self.bus.ppu.step_scanline(&self.bus.cart);
            if nmi {
                self.cpu.request_nmi();
            }
            self.cpu.run(&mut self.bus, CYCLES_PER_SCANLINE);
        }

        let pixels = self.bus.ppu.take_frame();
        self.hal.hal_flush_buf(&pixels);
        self.hal.hal_flip()
    }

    fn poll_controller(&mut self) {
        for (index, button) in BUTTON_MAP {
            let pressed = self.hal.hal_key_state(button);
            self.bus.set_button(index, pressed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::HeadlessHal;

    fn rom_with_prg(mut prg: Vec<u8>) -> Vec<u8> {
        prg.resize(0x4000, 0);
        // Reset vector ($FFFC/$FFFD, at PRG offset $3FFC) points at $8000,
        // the start of this bank's mirrored window, unless the caller
        // already placed something more specific there.
        if prg[0x3FFC] == 0 && prg[0x3FFD] == 0 {
            prg[0x3FFC] = 0x00;
            prg[0x3FFD] = 0x80;
        }
        let mut bytes = vec![0x4E, 0x45, 0x53, 0x1A, 1, 1, 0, 0];
        bytes.extend(vec![0u8; 8]);
        bytes.extend(prg);
        bytes.extend(vec![0u8; 0x2000]);
        bytes
    }

    #[test]
    fn rejects_invalid_magic_at_load() {
        let mut bytes = rom_with_prg(vec![0u8; 1]);
        bytes[0] = b'X';
        let hal = Box::new(HeadlessHal::new());
        assert!(Nes::load(&bytes, hal).is_err());
    }

    #[test]
    fn power_on_and_one_frame_runs_without_error() {
        let bytes = rom_with_prg(vec![0xEA]); // NOP forever
        let hal = Box::new(HeadlessHal::new());
        let mut nes = Nes::load(&bytes, hal).unwrap();
        nes.power_on().unwrap();
        assert!(nes.run_frame().is_ok());
    }

    #[test]
    fn nmi_is_delivered_once_per_frame_when_enabled() {
        // LDA #$80 ; STA $2000 (enables NMI-on-vblank) ; loop: JMP loop
        let prg_code = vec![0xA9, 0x80, 0x8D, 0x00, 0x20, 0x4C, 0x06, 0x80];
        let bytes = rom_with_prg(prg_code);
        let hal = Box::new(HeadlessHal::new());
        let mut nes = Nes::load(&bytes, hal).unwrap();
        nes.power_on().unwrap();
        nes.run_frame().unwrap();
        assert!(nes.bus.ppu.vblank());
    }
}
