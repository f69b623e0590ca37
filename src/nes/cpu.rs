//! 6502 (Ricoh 2A03) interpreter.
//!
//! Instructions execute as atomic units rather than clock-by-clock; only the
//! resulting cycle count is tracked, which is all the orchestrator needs to
//! keep the CPU and PPU in lockstep. The arithmetic helpers below reuse the
//! classic 6502 idioms (ADC/SBC sharing one adder, CMP as a carry-less ADC)
//! since those fall straight out of how the real chip is wired.

mod opcodes;

use bitflags::bitflags;

use crate::nes::bus::Bus;
use crate::nes::util::NesError;

const ADDR_STACK_UPPER: u16 = 0x0100;
const ADDR_VEC_NMI: u16 = 0xFFFA;
const ADDR_VEC_RESET: u16 = 0xFFFC;
const ADDR_VEC_IRQ: u16 = 0xFFFE;

bitflags! {
    pub struct Flags: u8 {
        const CARRY       = 0b0000_0001;
        const ZERO        = 0b0000_0010;
        const INT_DISABLE = 0b0000_0100;
        const DECIMAL     = 0b0000_1000;
        /// Only ever set in the copy of P pushed to the stack; never in
        /// the live status register itself.
        const BREAK       = 0b0001_0000;
        const UNUSED      = 0b0010_0000;
        const OVERFLOW    = 0b0100_0000;
        const NEGATIVE    = 0b1000_0000;
    }
}

#[derive(Default, Clone, Copy)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub s: u8,
    pub p: u8,
    pub pc: u16,
}

impl Registers {
    pub fn int_disabled(&self) -> bool {
        self.p & Flags::INT_DISABLE.bits != 0
    }

    pub fn flags_on(&mut self, flags: Flags) {
        self.p |= flags.bits;
    }

    pub fn flags_off(&mut self, flags: Flags) {
        self.p &= !flags.bits;
    }

    pub fn flag(&self, flags: Flags) -> bool {
        self.p & flags.bits != 0
    }

    pub fn change_negative_by_value(&mut self, val: u8) {
        self.p = (self.p & !Flags::NEGATIVE.bits) | (val & Flags::NEGATIVE.bits);
    }

    pub fn change_zero_by_value(&mut self, val: u8) {
        let z = ((val == 0) as u8) << 1;
        self.p = (self.p & !Flags::ZERO.bits) | z;
    }

    fn add_with_carry(val1: u8, val2: u8, carry: bool) -> (u8, bool) {
        let result: u16 = (val1 as u16) + (val2 as u16) + (carry as u16);
        let new_carry = (result & 0x0100) != 0;
        (result as u8, new_carry)
    }

    /// ADC: A = A + val + C, with the classic overflow test
    /// `(A^result) & (val^result) & 0x80`.
    pub fn a_add(&mut self, val: u8) {
        let (result, carry) = Self::add_with_carry(self.a, val, self.flag(Flags::CARRY));
        self.p = (self.p & !Flags::CARRY.bits) | carry as u8;
        let overflowed = ((self.a ^ result) & (val ^ result) & 0x80) != 0;
        self.p = (self.p & !Flags::OVERFLOW.bits) | ((overflowed as u8) << 6);
        self.change_negative_by_value(result);
        self.change_zero_by_value(result);
        self.a = result;
    }

    /// SBC = ADC with the one's complement of the operand; the 6502 shares
    /// one adder between the two and SBC's "borrow" is just ADC's carry
    /// inverted, which falls out for free here.
    pub fn a_sub(&mut self, val: u8) {
        self.a_add(!val);
    }

    /// CMP/CPX/CPY: a non-carry-affecting ADC of the two's complement,
    /// with V left untouched.
    pub fn a_cmp(&self, reg: u8, val: u8) -> u8 {
        let (result, carry) = Self::add_with_carry(reg, val.wrapping_neg(), false);
        let mut p = self.p;
        p = (p & !Flags::CARRY.bits) | carry as u8;
        p = (p & !Flags::NEGATIVE.bits) | (result & Flags::NEGATIVE.bits);
        let z = ((result == 0) as u8) << 1;
        p = (p & !Flags::ZERO.bits) | z;
        p
    }
}

pub struct Cpu {
    pub regs: Registers,
    cycles: u64,
    nmi_pending: bool,
    logged_opcodes: std::collections::HashSet<u8>,
}

impl Cpu {
    pub fn new() -> Cpu {
        Cpu {
            regs: Registers::default(),
            cycles: 0,
            nmi_pending: false,
            logged_opcodes: std::collections::HashSet::new(),
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Reset sequence: PC from `$FFFC/$FFFD`, SP = 0xFD, P = 0x24 (I set,
    /// U set, everything else clear) — the literal post-reset contract,
    /// rather than however `power_on` happens to build that byte up.
    pub fn reset(&mut self, bus: &mut Bus) {
        self.regs.a = 0;
        self.regs.x = 0;
        self.regs.y = 0;
        self.regs.s = 0xFD;
        self.regs.p = 0x24;
        self.regs.pc = bus.cpu_read16(ADDR_VEC_RESET);
    }

    pub fn request_nmi(&mut self) {
        self.nmi_pending = true;
    }

    fn push(&mut self, bus: &mut Bus, value: u8) {
        if self.regs.s == 0x00 {
            log::debug!("stack overflow at pc={:#06x}", self.regs.pc);
        }
        bus.cpu_write(ADDR_STACK_UPPER + self.regs.s as u16, value);
        self.regs.s = self.regs.s.wrapping_sub(1);
    }

    fn pull(&mut self, bus: &mut Bus) -> u8 {
        if self.regs.s == 0xFF {
            log::debug!("stack underflow at pc={:#06x}", self.regs.pc);
        }
        self.regs.s = self.regs.s.wrapping_add(1);
        bus.cpu_read(ADDR_STACK_UPPER + self.regs.s as u16)
    }

    fn push16(&mut self, bus: &mut Bus, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    fn pull16(&mut self, bus: &mut Bus) -> u16 {
        let lo = self.pull(bus);
        let hi = self.pull(bus);
        crate::nes::util::make_addr(hi, lo)
    }

    /// Services a pending NMI between instructions: push PC and P (with B
    /// clear, U set in the stack copy only), set I, and jump through the
    /// NMI vector. Costs 7 cycles, matching a BRK/IRQ entry.
    fn service_nmi(&mut self, bus: &mut Bus) -> u32 {
        self.push16(bus, self.regs.pc);
        let stacked_p = (self.regs.p & !Flags::BREAK.bits) | Flags::UNUSED.bits;
        self.push(bus, stacked_p);
        self.regs.flags_on(Flags::INT_DISABLE);
        self.regs.pc = bus.cpu_read16(ADDR_VEC_NMI);
        7
    }

    /// Executes whole instructions until at least `budget` cycles have
    /// elapsed for this call (plus whatever OAM DMA stall the bus is
    /// holding), and returns the number of cycles actually spent.
    pub fn run(&mut self, bus: &mut Bus, budget: u32) -> u32 {
        let mut spent = bus.take_dma_stall();
        while spent < budget {
            if self.nmi_pending {
                self.nmi_pending = false;
                spent += self.service_nmi(bus);
                continue;
            }
            spent += self.step(bus);
            spent += bus.take_dma_stall();
        }
        self.cycles += spent as u64;
        spent
    }

    fn fetch_byte(&mut self, bus: &mut Bus) -> u8 {
        let value = bus.cpu_read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        value
    }

    /// Decodes and executes exactly one instruction, returning its cycle
    /// count (base cost plus any addressing-mode/branch penalty).
    fn step(&mut self, bus: &mut Bus) -> u32 {
        let pc = self.regs.pc;
        let opcode = self.fetch_byte(bus);
        let cycles = match opcodes::dispatch(self, bus, opcode) {
            Some(cycles) => cycles,
            None => {
                if self.logged_opcodes.insert(opcode) {
                    log::warn!("{}", NesError::UnknownOpcode(opcode));
                }
                2
            }
        };
        log::trace!(
            "pc={:#06x} op={:#04x} a={:#04x} x={:#04x} y={:#04x} s={:#04x} p={:#010b} cycles={}",
            pc,
            opcode,
            self.regs.a,
            self.regs.x,
            self.regs.y,
            self.regs.s,
            self.regs.p,
            self.cycles() + cycles as u64,
        );
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::cartridge::{Cartridge, Mirroring};
    use crate::nes::ppu::Ppu;

    fn bus_with_prg(mut prg: Vec<u8>) -> Bus {
        prg.resize(0x4000, 0);
        let mut bytes = vec![0x4E, 0x45, 0x53, 0x1A, 1, 1, 0, 0];
        bytes.extend(vec![0u8; 8]);
        bytes.extend(prg);
        bytes.extend(vec![0u8; 0x2000]);
        let cart = Cartridge::load(&bytes).unwrap();
        Bus::new(cart, Ppu::new(Mirroring::Horizontal))
    }

    #[test]
    fn reset_reads_pc_from_vector_and_sets_status() {
        let mut prg = vec![0u8; 0x4000];
        prg[0x3FFC] = 0x34;
        prg[0x3FFD] = 0x12;
        let mut bus = bus_with_prg(prg);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        assert_eq!(cpu.regs.pc, 0x1234);
        assert_eq!(cpu.regs.s, 0xFD);
        assert_eq!(cpu.regs.p, 0x24);
    }

    #[test]
    fn adc_sets_overflow_on_signed_overflow() {
        let mut regs = Registers::default();
        regs.a = 0x50;
        regs.a_add(0x50);
        assert_eq!(regs.a, 0xA0);
        assert!(regs.flag(Flags::OVERFLOW));
        assert!(regs.flag(Flags::NEGATIVE));
        assert!(!regs.flag(Flags::ZERO));
        assert!(!regs.flag(Flags::CARRY));
    }

    #[test]
    fn unknown_opcode_is_treated_as_two_cycle_nop() {
        // $FFFF cannot be a valid opcode for this instruction set, but all
        // unofficial codes we recognize are listed; pick a reserved one.
        let prg = vec![0x02]; // JAM/KIL-style byte, unimplemented here
        let mut bus = bus_with_prg(prg);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.regs.pc = 0x8000;
        let cycles = cpu.step(&mut bus);
        assert_eq!(cycles, 2);
    }

    #[test]
    fn stack_push_pull_round_trips() {
        let prg = vec![0u8; 1];
        let mut bus = bus_with_prg(prg);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        let sp_before = cpu.regs.s;
        cpu.push(&mut bus, 0x42);
        let value = cpu.pull(&mut bus);
        assert_eq!(value, 0x42);
        assert_eq!(cpu.regs.s, sp_before);
    }
}
