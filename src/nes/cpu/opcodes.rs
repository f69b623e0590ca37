//! The 256-entry opcode table and its addressing-mode resolver.
//!
//! Each entry pairs an addressing mode with an [`OpKind`] describing *how*
//! the resolved operand is used (read into a register, written to memory,
//! read-modify-write, ...). A single dispatcher (`execute`) interprets that
//! pair, which keeps the table itself mostly declarative data instead of
//! 256 hand-written wrapper functions.

use super::{Cpu, Flags, Registers};
use crate::nes::bus::Bus;
use crate::nes::util::{make_addr, page_crossed};

#[derive(Clone, Copy)]
pub enum AddrMode {
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndexedIndirectX,
    IndirectIndexedY,
    Relative,
    Implied,
}

#[derive(Clone, Copy)]
pub enum OpKind {
    /// Reads a byte via the addressing mode and hands it to a register-update fn.
    Read(fn(&mut Cpu, u8)),
    /// Writes a byte produced from CPU state to the resolved address.
    Store(fn(&Cpu) -> u8),
    /// Reads, transforms, and writes back; `Accumulator` mode targets `A` directly.
    Rmw(fn(&mut Registers, u8) -> u8),
    /// Read-modify-write to memory followed by an accumulator-combining op
    /// (the unofficial SLO/RLA/SRE/RRA/DCP/ISC family).
    RmwCombo(fn(&mut Registers, u8) -> u8, fn(&mut Cpu, u8)),
    /// No operand fetch; acts purely on CPU/bus state (transfers, flag ops, stack).
    Implied(fn(&mut Cpu, &mut Bus)),
    Branch(fn(&Registers) -> bool),
    Jmp,
    Jsr,
    Rts,
    Rti,
    Brk,
}

#[derive(Clone, Copy)]
pub struct OpEntry {
    pub name: &'static str,
    pub mode: AddrMode,
    pub cycles: u32,
    pub page_penalty: bool,
    pub kind: OpKind,
}

macro_rules! op {
    ($name:expr, $mode:expr, $cycles:expr, $penalty:expr, $kind:expr) => {
        Some(OpEntry { name: $name, mode: $mode, cycles: $cycles, page_penalty: $penalty, kind: $kind })
    };
}

impl Cpu {
    fn fetch_word(&mut self, bus: &mut Bus) -> u16 {
        let lo = self.fetch_byte(bus);
        let hi = self.fetch_byte(bus);
        make_addr(hi, lo)
    }

    /// Resolves the operand address for every mode except `Accumulator`,
    /// `Implied`, and `Relative`, which have nothing to resolve here.
    fn resolve(&mut self, bus: &mut Bus, mode: AddrMode) -> (u16, bool) {
        match mode {
            AddrMode::Immediate => {
                let addr = self.regs.pc;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                (addr, false)
            }
            AddrMode::ZeroPage => (self.fetch_byte(bus) as u16, false),
            AddrMode::ZeroPageX => ((self.fetch_byte(bus).wrapping_add(self.regs.x)) as u16, false),
            AddrMode::ZeroPageY => ((self.fetch_byte(bus).wrapping_add(self.regs.y)) as u16, false),
            AddrMode::Absolute => (self.fetch_word(bus), false),
            AddrMode::AbsoluteX => {
                let base = self.fetch_word(bus);
                let addr = base.wrapping_add(self.regs.x as u16);
                (addr, page_crossed(base, addr))
            }
            AddrMode::AbsoluteY => {
                let base = self.fetch_word(bus);
                let addr = base.wrapping_add(self.regs.y as u16);
                (addr, page_crossed(base, addr))
            }
            AddrMode::IndexedIndirectX => {
                let zp = self.fetch_byte(bus).wrapping_add(self.regs.x);
                let lo = bus.cpu_read(zp as u16);
                let hi = bus.cpu_read(zp.wrapping_add(1) as u16);
                (make_addr(hi, lo), false)
            }
            AddrMode::IndirectIndexedY => {
                let zp = self.fetch_byte(bus);
                let lo = bus.cpu_read(zp as u16);
                let hi = bus.cpu_read(zp.wrapping_add(1) as u16);
                let base = make_addr(hi, lo);
                let addr = base.wrapping_add(self.regs.y as u16);
                (addr, page_crossed(base, addr))
            }
            AddrMode::Indirect => {
                // The infamous page-wrap bug: if the pointer's low byte is
                // $FF, the high byte is fetched from the *start* of the
                // same page instead of the next page.
                let ptr = self.fetch_word(bus);
                let lo = bus.cpu_read(ptr);
                let hi_addr = if ptr & 0x00FF == 0x00FF { ptr & 0xFF00 } else { ptr.wrapping_add(1) };
                let hi = bus.cpu_read(hi_addr);
                (make_addr(hi, lo), false)
            }
            AddrMode::Accumulator | AddrMode::Implied | AddrMode::Relative => (0, false),
        }
    }
}

fn execute(cpu: &mut Cpu, bus: &mut Bus, entry: &OpEntry) -> u32 {
    let mut cycles = entry.cycles;
    match entry.kind {
        OpKind::Read(apply) => {
            let (addr, crossed) = cpu.resolve(bus, entry.mode);
            let val = bus.cpu_read(addr);
            apply(cpu, val);
            if entry.page_penalty && crossed {
                cycles += 1;
            }
        }
        OpKind::Store(value_of) => {
            let (addr, _) = cpu.resolve(bus, entry.mode);
            bus.cpu_write(addr, value_of(cpu));
        }
        OpKind::Rmw(apply) => {
            if matches!(entry.mode, AddrMode::Accumulator) {
                cpu.regs.a = apply(&mut cpu.regs, cpu.regs.a);
            } else {
                let (addr, _) = cpu.resolve(bus, entry.mode);
                let val = bus.cpu_read(addr);
                let result = apply(&mut cpu.regs, val);
                bus.cpu_write(addr, result);
            }
        }
        OpKind::RmwCombo(modify, combine) => {
            let (addr, _) = cpu.resolve(bus, entry.mode);
            let val = bus.cpu_read(addr);
            let result = modify(&mut cpu.regs, val);
            bus.cpu_write(addr, result);
            combine(cpu, result);
        }
        OpKind::Implied(apply) => apply(cpu, bus),
        OpKind::Branch(taken) => {
            let offset = cpu.fetch_byte(bus) as i8;
            if taken(&cpu.regs) {
                cycles += 1;
                let target = cpu.regs.pc.wrapping_add(offset as i16 as u16);
                if page_crossed(cpu.regs.pc, target) {
                    cycles += 1;
                }
                cpu.regs.pc = target;
            }
        }
        OpKind::Jmp => {
            let (addr, _) = cpu.resolve(bus, entry.mode);
            cpu.regs.pc = addr;
        }
        OpKind::Jsr => {
            let (addr, _) = cpu.resolve(bus, entry.mode);
            let return_addr = cpu.regs.pc.wrapping_sub(1);
            cpu.push16(bus, return_addr);
            cpu.regs.pc = addr;
        }
        OpKind::Rts => {
            let addr = cpu.pull16(bus);
            cpu.regs.pc = addr.wrapping_add(1);
        }
        OpKind::Rti => {
            let p = cpu.pull(bus);
            cpu.regs.p = (p & !Flags::BREAK.bits) | Flags::UNUSED.bits;
            cpu.regs.pc = cpu.pull16(bus);
        }
        OpKind::Brk => {
            cpu.regs.pc = cpu.regs.pc.wrapping_add(1);
            cpu.push16(bus, cpu.regs.pc);
            let stacked = cpu.regs.p | Flags::BREAK.bits | Flags::UNUSED.bits;
            cpu.push(bus, stacked);
            cpu.regs.flags_on(Flags::INT_DISABLE);
            cpu.regs.pc = bus.cpu_read16(0xFFFE);
        }
    }
    cycles
}

/// Looks up and immediately runs the opcode at `opcode`, returning its
/// cycle cost, or `None` if the byte isn't one we decode.
pub fn dispatch(cpu: &mut Cpu, bus: &mut Bus, opcode: u8) -> Option<u32> {
    table()[opcode as usize].map(|entry| execute(cpu, bus, &entry))
}

fn table() -> &'static [Option<OpEntry>; 256] {
    static TABLE: std::sync::OnceLock<[Option<OpEntry>; 256]> = std::sync::OnceLock::new();
    TABLE.get_or_init(build_table)
}

// ----- per-mnemonic leaf functions --------------------------------------

fn ld_a(cpu: &mut Cpu, v: u8) { cpu.regs.a = v; cpu.regs.change_negative_by_value(v); cpu.regs.change_zero_by_value(v); }
fn ld_x(cpu: &mut Cpu, v: u8) { cpu.regs.x = v; cpu.regs.change_negative_by_value(v); cpu.regs.change_zero_by_value(v); }
fn ld_y(cpu: &mut Cpu, v: u8) { cpu.regs.y = v; cpu.regs.change_negative_by_value(v); cpu.regs.change_zero_by_value(v); }
fn lax(cpu: &mut Cpu, v: u8) { ld_a(cpu, v); cpu.regs.x = v; }
fn ora(cpu: &mut Cpu, v: u8) { cpu.regs.a |= v; let a = cpu.regs.a; cpu.regs.change_negative_by_value(a); cpu.regs.change_zero_by_value(a); }
fn and(cpu: &mut Cpu, v: u8) { cpu.regs.a &= v; let a = cpu.regs.a; cpu.regs.change_negative_by_value(a); cpu.regs.change_zero_by_value(a); }
fn eor(cpu: &mut Cpu, v: u8) { cpu.regs.a ^= v; let a = cpu.regs.a; cpu.regs.change_negative_by_value(a); cpu.regs.change_zero_by_value(a); }
fn adc(cpu: &mut Cpu, v: u8) { cpu.regs.a_add(v); }
fn sbc(cpu: &mut Cpu, v: u8) { cpu.regs.a_sub(v); }
fn cmp(cpu: &mut Cpu, v: u8) { cpu.regs.p = cpu.regs.a_cmp(cpu.regs.a, v); }
fn cpx(cpu: &mut Cpu, v: u8) { cpu.regs.p = cpu.regs.a_cmp(cpu.regs.x, v); }
fn cpy(cpu: &mut Cpu, v: u8) { cpu.regs.p = cpu.regs.a_cmp(cpu.regs.y, v); }
fn bit(cpu: &mut Cpu, v: u8) {
    let r = cpu.regs.a & v;
    cpu.regs.change_zero_by_value(r);
    cpu.regs.p = (cpu.regs.p & !(Flags::NEGATIVE.bits | Flags::OVERFLOW.bits)) | (v & 0xC0);
}

fn st_a(cpu: &Cpu) -> u8 { cpu.regs.a }
fn st_x(cpu: &Cpu) -> u8 { cpu.regs.x }
fn st_y(cpu: &Cpu) -> u8 { cpu.regs.y }
fn sax(cpu: &Cpu) -> u8 { cpu.regs.a & cpu.regs.x }

fn asl(regs: &mut Registers, v: u8) -> u8 {
    let carry = v & 0x80 != 0;
    let r = v << 1;
    regs.p = (regs.p & !Flags::CARRY.bits) | carry as u8;
    regs.change_negative_by_value(r);
    regs.change_zero_by_value(r);
    r
}
fn lsr(regs: &mut Registers, v: u8) -> u8 {
    let carry = v & 0x01 != 0;
    let r = v >> 1;
    regs.p = (regs.p & !Flags::CARRY.bits) | carry as u8;
    regs.change_negative_by_value(r);
    regs.change_zero_by_value(r);
    r
}
fn rol(regs: &mut Registers, v: u8) -> u8 {
    let carry_in = regs.p & Flags::CARRY.bits;
    let carry_out = v & 0x80 != 0;
    let r = (v << 1) | carry_in;
    regs.p = (regs.p & !Flags::CARRY.bits) | carry_out as u8;
    regs.change_negative_by_value(r);
    regs.change_zero_by_value(r);
    r
}
fn ror(regs: &mut Registers, v: u8) -> u8 {
    let carry_in = (regs.p & Flags::CARRY.bits) << 7;
    let carry_out = v & 0x01 != 0;
    let r = (v >> 1) | carry_in;
    regs.p = (regs.p & !Flags::CARRY.bits) | carry_out as u8;
    regs.change_negative_by_value(r);
    regs.change_zero_by_value(r);
    r
}
fn inc(regs: &mut Registers, v: u8) -> u8 {
    let r = v.wrapping_add(1);
    regs.change_negative_by_value(r);
    regs.change_zero_by_value(r);
    r
}
fn dec(regs: &mut Registers, v: u8) -> u8 {
    let r = v.wrapping_sub(1);
    regs.change_negative_by_value(r);
    regs.change_zero_by_value(r);
    r
}

fn slo_combine(cpu: &mut Cpu, modified: u8) { cpu.regs.a |= modified; let a = cpu.regs.a; cpu.regs.change_negative_by_value(a); cpu.regs.change_zero_by_value(a); }
fn rla_combine(cpu: &mut Cpu, modified: u8) { cpu.regs.a &= modified; let a = cpu.regs.a; cpu.regs.change_negative_by_value(a); cpu.regs.change_zero_by_value(a); }
fn sre_combine(cpu: &mut Cpu, modified: u8) { cpu.regs.a ^= modified; let a = cpu.regs.a; cpu.regs.change_negative_by_value(a); cpu.regs.change_zero_by_value(a); }
fn rra_combine(cpu: &mut Cpu, modified: u8) { cpu.regs.a_add(modified); }
fn dcp_combine(cpu: &mut Cpu, modified: u8) { cpu.regs.p = cpu.regs.a_cmp(cpu.regs.a, modified); }
fn isc_combine(cpu: &mut Cpu, modified: u8) { cpu.regs.a_sub(modified); }

fn implied_tax(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.x = cpu.regs.a; let v = cpu.regs.x; cpu.regs.change_negative_by_value(v); cpu.regs.change_zero_by_value(v); }
fn implied_tay(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.y = cpu.regs.a; let v = cpu.regs.y; cpu.regs.change_negative_by_value(v); cpu.regs.change_zero_by_value(v); }
fn implied_txa(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.a = cpu.regs.x; let v = cpu.regs.a; cpu.regs.change_negative_by_value(v); cpu.regs.change_zero_by_value(v); }
fn implied_tya(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.a = cpu.regs.y; let v = cpu.regs.a; cpu.regs.change_negative_by_value(v); cpu.regs.change_zero_by_value(v); }
fn implied_tsx(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.x = cpu.regs.s; let v = cpu.regs.x; cpu.regs.change_negative_by_value(v); cpu.regs.change_zero_by_value(v); }
fn implied_txs(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.s = cpu.regs.x; }
fn implied_inx(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.x = cpu.regs.x.wrapping_add(1); let v = cpu.regs.x; cpu.regs.change_negative_by_value(v); cpu.regs.change_zero_by_value(v); }
fn implied_dex(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.x = cpu.regs.x.wrapping_sub(1); let v = cpu.regs.x; cpu.regs.change_negative_by_value(v); cpu.regs.change_zero_by_value(v); }
fn implied_iny(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.y = cpu.regs.y.wrapping_add(1); let v = cpu.regs.y; cpu.regs.change_negative_by_value(v); cpu.regs.change_zero_by_value(v); }
fn implied_dey(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.y = cpu.regs.y.wrapping_sub(1); let v = cpu.regs.y; cpu.regs.change_negative_by_value(v); cpu.regs.change_zero_by_value(v); }
fn implied_clc(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.flags_off(Flags::CARRY); }
fn implied_sec(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.flags_on(Flags::CARRY); }
fn implied_cli(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.flags_off(Flags::INT_DISABLE); }
fn implied_sei(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.flags_on(Flags::INT_DISABLE); }
fn implied_clv(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.flags_off(Flags::OVERFLOW); }
fn implied_cld(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.flags_off(Flags::DECIMAL); }
fn implied_sed(cpu: &mut Cpu, _: &mut Bus) { cpu.regs.flags_on(Flags::DECIMAL); }
fn implied_nop(_: &mut Cpu, _: &mut Bus) {}
fn implied_pha(cpu: &mut Cpu, bus: &mut Bus) { let a = cpu.regs.a; cpu.push(bus, a); }
fn implied_php(cpu: &mut Cpu, bus: &mut Bus) { let p = cpu.regs.p | Flags::BREAK.bits | Flags::UNUSED.bits; cpu.push(bus, p); }
fn implied_pla(cpu: &mut Cpu, bus: &mut Bus) { let v = cpu.pull(bus); cpu.regs.a = v; cpu.regs.change_negative_by_value(v); cpu.regs.change_zero_by_value(v); }
fn implied_plp(cpu: &mut Cpu, bus: &mut Bus) { let v = cpu.pull(bus); cpu.regs.p = (v & !Flags::BREAK.bits) | Flags::UNUSED.bits; }

fn branch_bpl(r: &Registers) -> bool { !r.flag(Flags::NEGATIVE) }
fn branch_bmi(r: &Registers) -> bool { r.flag(Flags::NEGATIVE) }
fn branch_bvc(r: &Registers) -> bool { !r.flag(Flags::OVERFLOW) }
fn branch_bvs(r: &Registers) -> bool { r.flag(Flags::OVERFLOW) }
fn branch_bcc(r: &Registers) -> bool { !r.flag(Flags::CARRY) }
fn branch_bcs(r: &Registers) -> bool { r.flag(Flags::CARRY) }
fn branch_bne(r: &Registers) -> bool { !r.flag(Flags::ZERO) }
fn branch_beq(r: &Registers) -> bool { r.flag(Flags::ZERO) }

use AddrMode::*;
use OpKind::*;

fn build_table() -> [Option<OpEntry>; 256] {
    let mut t: [Option<OpEntry>; 256] = [None; 256];

    // ADC
    t[0x69] = op!("ADC", Immediate, 2, false, Read(adc));
    t[0x65] = op!("ADC", ZeroPage, 3, false, Read(adc));
    t[0x75] = op!("ADC", ZeroPageX, 4, false, Read(adc));
    t[0x6D] = op!("ADC", Absolute, 4, false, Read(adc));
    t[0x7D] = op!("ADC", AbsoluteX, 4, true, Read(adc));
    t[0x79] = op!("ADC", AbsoluteY, 4, true, Read(adc));
    t[0x61] = op!("ADC", IndexedIndirectX, 6, false, Read(adc));
    t[0x71] = op!("ADC", IndirectIndexedY, 5, true, Read(adc));

    // AND
    t[0x29] = op!("AND", Immediate, 2, false, Read(and));
    t[0x25] = op!("AND", ZeroPage, 3, false, Read(and));
    t[0x35] = op!("AND", ZeroPageX, 4, false, Read(and));
    t[0x2D] = op!("AND", Absolute, 4, false, Read(and));
    t[0x3D] = op!("AND", AbsoluteX, 4, true, Read(and));
    t[0x39] = op!("AND", AbsoluteY, 4, true, Read(and));
    t[0x21] = op!("AND", IndexedIndirectX, 6, false, Read(and));
    t[0x31] = op!("AND", IndirectIndexedY, 5, true, Read(and));

    // ASL
    t[0x0A] = op!("ASL", Accumulator, 2, false, Rmw(asl));
    t[0x06] = op!("ASL", ZeroPage, 5, false, Rmw(asl));
    t[0x16] = op!("ASL", ZeroPageX, 6, false, Rmw(asl));
    t[0x0E] = op!("ASL", Absolute, 6, false, Rmw(asl));
    t[0x1E] = op!("ASL", AbsoluteX, 7, false, Rmw(asl));

    // Branches
    t[0x90] = op!("BCC", Relative, 2, false, Branch(branch_bcc));
    t[0xB0] = op!("BCS", Relative, 2, false, Branch(branch_bcs));
    t[0xF0] = op!("BEQ", Relative, 2, false, Branch(branch_beq));
    t[0x30] = op!("BMI", Relative, 2, false, Branch(branch_bmi));
    t[0xD0] = op!("BNE", Relative, 2, false, Branch(branch_bne));
    t[0x10] = op!("BPL", Relative, 2, false, Branch(branch_bpl));
    t[0x50] = op!("BVC", Relative, 2, false, Branch(branch_bvc));
    t[0x70] = op!("BVS", Relative, 2, false, Branch(branch_bvs));

    // BIT
    t[0x24] = op!("BIT", ZeroPage, 3, false, Read(bit));
    t[0x2C] = op!("BIT", Absolute, 4, false, Read(bit));

    // BRK
    t[0x00] = op!("BRK", Implied, 7, false, Brk);

    // Flag ops
    t[0x18] = op!("CLC", Implied, 2, false, Implied(implied_clc));
    t[0xD8] = op!("CLD", Implied, 2, false, Implied(implied_cld));
    t[0x58] = op!("CLI", Implied, 2, false, Implied(implied_cli));
    t[0xB8] = op!("CLV", Implied, 2, false, Implied(implied_clv));
    t[0x38] = op!("SEC", Implied, 2, false, Implied(implied_sec));
    t[0xF8] = op!("SED", Implied, 2, false, Implied(implied_sed));
    t[0x78] = op!("SEI", Implied, 2, false, Implied(implied_sei));

    // CMP / CPX / CPY
    t[0xC9] = op!("CMP", Immediate, 2, false, Read(cmp));
    t[0xC5] = op!("CMP", ZeroPage, 3, false, Read(cmp));
    t[0xD5] = op!("CMP", ZeroPageX, 4, false, Read(cmp));
    t[0xCD] = op!("CMP", Absolute, 4, false, Read(cmp));
    t[0xDD] = op!("CMP", AbsoluteX, 4, true, Read(cmp));
    t[0xD9] = op!("CMP", AbsoluteY, 4, true, Read(cmp));
    t[0xC1] = op!("CMP", IndexedIndirectX, 6, false, Read(cmp));
    t[0xD1] = op!("CMP", IndirectIndexedY, 5, true, Read(cmp));
    t[0xE0] = op!("CPX", Immediate, 2, false, Read(cpx));
    t[0xE4] = op!("CPX", ZeroPage, 3, false, Read(cpx));
    t[0xEC] = op!("CPX", Absolute, 4, false, Read(cpx));
    t[0xC0] = op!("CPY", Immediate, 2, false, Read(cpy));
    t[0xC4] = op!("CPY", ZeroPage, 3, false, Read(cpy));
    t[0xCC] = op!("CPY", Absolute, 4, false, Read(cpy));

    // DEC / INC
    t[0xC6] = op!("DEC", ZeroPage, 5, false, Rmw(dec));
    t[0xD6] = op!("DEC", ZeroPageX, 6, false, Rmw(dec));
    t[0xCE] = op!("DEC", Absolute, 6, false, Rmw(dec));
    t[0xDE] = op!("DEC", AbsoluteX, 7, false, Rmw(dec));
    t[0xE6] = op!("INC", ZeroPage, 5, false, Rmw(inc));
    t[0xF6] = op!("INC", ZeroPageX, 6, false, Rmw(inc));
    t[0xEE] = op!("INC", Absolute, 6, false, Rmw(inc));
    t[0xFE] = op!("INC", AbsoluteX, 7, false, Rmw(inc));
    t[0xCA] = op!("DEX", Implied, 2, false, Implied(implied_dex));
    t[0x88] = op!("DEY", Implied, 2, false, Implied(implied_dey));
    t[0xE8] = op!("INX", Implied, 2, false, Implied(implied_inx));
    t[0xC8] = op!("INY", Implied, 2, false, Implied(implied_iny));

    // EOR
    t[0x49] = op!("EOR", Immediate, 2, false, Read(eor));
    t[0x45] = op!("EOR", ZeroPage, 3, false, Read(eor));
    t[0x55] = op!("EOR", ZeroPageX, 4, false, Read(eor));
    t[0x4D] = op!("EOR", Absolute, 4, false, Read(eor));
    t[0x5D] = op!("EOR", AbsoluteX, 4, true, Read(eor));
    t[0x59] = op!("EOR", AbsoluteY, 4, true, Read(eor));
    t[0x41] = op!("EOR", IndexedIndirectX, 6, false, Read(eor));
    t[0x51] = op!("EOR", IndirectIndexedY, 5, true, Read(eor));

    // JMP / JSR / RTS / RTI
    t[0x4C] = op!("JMP", Absolute, 3, false, Jmp);
    t[0x6C] = op!("JMP", Indirect, 5, false, Jmp);
    t[0x20] = op!("JSR", Absolute, 6, false, Jsr);
    t[0x60] = op!("RTS", Implied, 6, false, Rts);
    t[0x40] = op!("RTI", Implied, 6, false, Rti);

    // LDA / LDX / LDY
    t[0xA9] = op!("LDA", Immediate, 2, false, Read(ld_a));
    t[0xA5] = op!("LDA", ZeroPage, 3, false, Read(ld_a));
    t[0xB5] = op!("LDA", ZeroPageX, 4, false, Read(ld_a));
    t[0xAD] = op!("LDA", Absolute, 4, false, Read(ld_a));
    t[0xBD] = op!("LDA", AbsoluteX, 4, true, Read(ld_a));
    t[0xB9] = op!("LDA", AbsoluteY, 4, true, Read(ld_a));
    t[0xA1] = op!("LDA", IndexedIndirectX, 6, false, Read(ld_a));
    t[0xB1] = op!("LDA", IndirectIndexedY, 5, true, Read(ld_a));
    t[0xA2] = op!("LDX", Immediate, 2, false, Read(ld_x));
    t[0xA6] = op!("LDX", ZeroPage, 3, false, Read(ld_x));
    t[0xB6] = op!("LDX", ZeroPageY, 4, false, Read(ld_x));
    t[0xAE] = op!("LDX", Absolute, 4, false, Read(ld_x));
    t[0xBE] = op!("LDX", AbsoluteY, 4, true, Read(ld_x));
    t[0xA0] = op!("LDY", Immediate, 2, false, Read(ld_y));
    t[0xA4] = op!("LDY", ZeroPage, 3, false, Read(ld_y));
    t[0xB4] = op!("LDY", ZeroPageX, 4, false, Read(ld_y));
    t[0xAC] = op!("LDY", Absolute, 4, false, Read(ld_y));
    t[0xBC] = op!("LDY", AbsoluteX, 4, true, Read(ld_y));

    // LSR
    t[0x4A] = op!("LSR", Accumulator, 2, false, Rmw(lsr));
    t[0x46] = op!("LSR", ZeroPage, 5, false, Rmw(lsr));
    t[0x56] = op!("LSR", ZeroPageX, 6, false, Rmw(lsr));
    t[0x4E] = op!("LSR", Absolute, 6, false, Rmw(lsr));
    t[0x5E] = op!("LSR", AbsoluteX, 7, false, Rmw(lsr));

    // NOP
    t[0xEA] = op!("NOP", Implied, 2, false, Implied(implied_nop));

    // ORA
    t[0x09] = op!("ORA", Immediate, 2, false, Read(ora));
    t[0x05] = op!("ORA", ZeroPage, 3, false, Read(ora));
    t[0x15] = op!("ORA", ZeroPageX, 4, false, Read(ora));
    t[0x0D] = op!("ORA", Absolute, 4, false, Read(ora));
    t[0x1D] = op!("ORA", AbsoluteX, 4, true, Read(ora));
    t[0x19] = op!("ORA", AbsoluteY, 4, true, Read(ora));
    t[0x01] = op!("ORA", IndexedIndirectX, 6, false, Read(ora));
    t[0x11] = op!("ORA", IndirectIndexedY, 5, true, Read(ora));

    // Stack ops
    t[0x48] = op!("PHA", Implied, 3, false, Implied(implied_pha));
    t[0x08] = op!("PHP", Implied, 3, false, Implied(implied_php));
    t[0x68] = op!("PLA", Implied, 4, false, Implied(implied_pla));
    t[0x28] = op!("PLP", Implied, 4, false, Implied(implied_plp));

    // ROL / ROR
    t[0x2A] = op!("ROL", Accumulator, 2, false, Rmw(rol));
    t[0x26] = op!("ROL", ZeroPage, 5, false, Rmw(rol));
    t[0x36] = op!("ROL", ZeroPageX, 6, false, Rmw(rol));
    t[0x2E] = op!("ROL", Absolute, 6, false, Rmw(rol));
    t[0x3E] = op!("ROL", AbsoluteX, 7, false, Rmw(rol));
    t[0x6A] = op!("ROR", Accumulator, 2, false, Rmw(ror));
    t[0x66] = op!("ROR", ZeroPage, 5, false, Rmw(ror));
    t[0x76] = op!("ROR", ZeroPageX, 6, false, Rmw(ror));
    t[0x6E] = op!("ROR", Absolute, 6, false, Rmw(ror));
    t[0x7E] = op!("ROR", AbsoluteX, 7, false, Rmw(ror));

    // SBC
    t[0xE9] = op!("SBC", Immediate, 2, false, Read(sbc));
    t[0xE5] = op!("SBC", ZeroPage, 3, false, Read(sbc));
    t[0xF5] = op!("SBC", ZeroPageX, 4, false, Read(sbc));
    t[0xED] = op!("SBC", Absolute, 4, false, Read(sbc));
    t[0xFD] = op!("SBC", AbsoluteX, 4, true, Read(sbc));
    t[0xF9] = op!("SBC", AbsoluteY, 4, true, Read(sbc));
    t[0xE1] = op!("SBC", IndexedIndirectX, 6, false, Read(sbc));
    t[0xF1] = op!("SBC", IndirectIndexedY, 5, true, Read(sbc));

    // STA / STX / STY
    t[0x85] = op!("STA", ZeroPage, 3, false, Store(st_a));
    t[0x95] = op!("STA", ZeroPageX, 4, false, Store(st_a));
    t[0x8D] = op!("STA", Absolute, 4, false, Store(st_a));
    t[0x9D] = op!("STA", AbsoluteX, 5, false, Store(st_a));
    t[0x99] = op!("STA", AbsoluteY, 5, false, Store(st_a));
    t[0x81] = op!("STA", IndexedIndirectX, 6, false, Store(st_a));
    t[0x91] = op!("STA", IndirectIndexedY, 6, false, Store(st_a));
    t[0x86] = op!("STX", ZeroPage, 3, false, Store(st_x));
    t[0x96] = op!("STX", ZeroPageY, 4, false, Store(st_x));
    t[0x8E] = op!("STX", Absolute, 4, false, Store(st_x));
    t[0x84] = op!("STY", ZeroPage, 3, false, Store(st_y));
    t[0x94] = op!("STY", ZeroPageX, 4, false, Store(st_y));
    t[0x8C] = op!("STY", Absolute, 4, false, Store(st_y));

    // Transfers
    t[0xAA] = op!("TAX", Implied, 2, false, Implied(implied_tax));
    t[0xA8] = op!("TAY", Implied, 2, false, Implied(implied_tay));
    t[0xBA] = op!("TSX", Implied, 2, false, Implied(implied_tsx));
    t[0x8A] = op!("TXA", Implied, 2, false, Implied(implied_txa));
    t[0x9A] = op!("TXS", Implied, 2, false, Implied(implied_txs));
    t[0x98] = op!("TYA", Implied, 2, false, Implied(implied_tya));

    // ----- unofficial opcodes tolerated because common ROMs use them -----

    // LAX (LDA+LDX combined)
    t[0xA7] = op!("LAX", ZeroPage, 3, false, Read(lax));
    t[0xB7] = op!("LAX", ZeroPageY, 4, false, Read(lax));
    t[0xAF] = op!("LAX", Absolute, 4, false, Read(lax));
    t[0xBF] = op!("LAX", AbsoluteY, 4, true, Read(lax));
    t[0xA3] = op!("LAX", IndexedIndirectX, 6, false, Read(lax));
    t[0xB3] = op!("LAX", IndirectIndexedY, 5, true, Read(lax));

    // SAX (store A & X)
    t[0x87] = op!("SAX", ZeroPage, 3, false, Store(sax));
    t[0x97] = op!("SAX", ZeroPageY, 4, false, Store(sax));
    t[0x8F] = op!("SAX", Absolute, 4, false, Store(sax));
    t[0x83] = op!("SAX", IndexedIndirectX, 6, false, Store(sax));

    // DCP (DEC then CMP)
    t[0xC7] = op!("DCP", ZeroPage, 5, false, RmwCombo(dec, dcp_combine));
    t[0xD7] = op!("DCP", ZeroPageX, 6, false, RmwCombo(dec, dcp_combine));
    t[0xCF] = op!("DCP", Absolute, 6, false, RmwCombo(dec, dcp_combine));
    t[0xDF] = op!("DCP", AbsoluteX, 7, false, RmwCombo(dec, dcp_combine));
    t[0xDB] = op!("DCP", AbsoluteY, 7, false, RmwCombo(dec, dcp_combine));
    t[0xC3] = op!("DCP", IndexedIndirectX, 8, false, RmwCombo(dec, dcp_combine));
    t[0xD3] = op!("DCP", IndirectIndexedY, 8, false, RmwCombo(dec, dcp_combine));

    // ISC (INC then SBC)
    t[0xE7] = op!("ISC", ZeroPage, 5, false, RmwCombo(inc, isc_combine));
    t[0xF7] = op!("ISC", ZeroPageX, 6, false, RmwCombo(inc, isc_combine));
    t[0xEF] = op!("ISC", Absolute, 6, false, RmwCombo(inc, isc_combine));
    t[0xFF] = op!("ISC", AbsoluteX, 7, false, RmwCombo(inc, isc_combine));
    t[0xFB] = op!("ISC", AbsoluteY, 7, false, RmwCombo(inc, isc_combine));
    t[0xE3] = op!("ISC", IndexedIndirectX, 8, false, RmwCombo(inc, isc_combine));
    t[0xF3] = op!("ISC", IndirectIndexedY, 8, false, RmwCombo(inc, isc_combine));

    // SLO (ASL then ORA)
    t[0x07] = op!("SLO", ZeroPage, 5, false, RmwCombo(asl, slo_combine));
    t[0x17] = op!("SLO", ZeroPageX, 6, false, RmwCombo(asl, slo_combine));
    t[0x0F] = op!("SLO", Absolute, 6, false, RmwCombo(asl, slo_combine));
    t[0x1F] = op!("SLO", AbsoluteX, 7, false, RmwCombo(asl, slo_combine));
    t[0x1B] = op!("SLO", AbsoluteY, 7, false, RmwCombo(asl, slo_combine));
    t[0x03] = op!("SLO", IndexedIndirectX, 8, false, RmwCombo(asl, slo_combine));
    t[0x13] = op!("SLO", IndirectIndexedY, 8, false, RmwCombo(asl, slo_combine));

    // RLA (ROL then AND)
    t[0x27] = op!("RLA", ZeroPage, 5, false, RmwCombo(rol, rla_combine));
    t[0x37] = op!("RLA", ZeroPageX, 6, false, RmwCombo(rol, rla_combine));
    t[0x2F] = op!("RLA", Absolute, 6, false, RmwCombo(rol, rla_combine));
    t[0x3F] = op!("RLA", AbsoluteX, 7, false, RmwCombo(rol, rla_combine));
    t[0x3B] = op!("RLA", AbsoluteY, 7, false, RmwCombo(rol, rla_combine));
    t[0x23] = op!("RLA", IndexedIndirectX, 8, false, RmwCombo(rol, rla_combine));
    t[0x33] = op!("RLA", IndirectIndexedY, 8, false, RmwCombo(rol, rla_combine));

    // SRE (LSR then EOR)
    t[0x47] = op!("SRE", ZeroPage, 5, false, RmwCombo(lsr, sre_combine));
    t[0x57] = op!("SRE", ZeroPageX, 6, false, RmwCombo(lsr, sre_combine));
    t[0x4F] = op!("SRE", Absolute, 6, false, RmwCombo(lsr, sre_combine));
    t[0x5F] = op!("SRE", AbsoluteX, 7, false, RmwCombo(lsr, sre_combine));
    t[0x5B] = op!("SRE", AbsoluteY, 7, false, RmwCombo(lsr, sre_combine));
    t[0x43] = op!("SRE", IndexedIndirectX, 8, false, RmwCombo(lsr, sre_combine));
    t[0x53] = op!("SRE", IndirectIndexedY, 8, false, RmwCombo(lsr, sre_combine));

    // RRA (ROR then ADC)
    t[0x67] = op!("RRA", ZeroPage, 5, false, RmwCombo(ror, rra_combine));
    t[0x77] = op!("RRA", ZeroPageX, 6, false, RmwCombo(ror, rra_combine));
    t[0x6F] = op!("RRA", Absolute, 6, false, RmwCombo(ror, rra_combine));
    t[0x7F] = op!("RRA", AbsoluteX, 7, false, RmwCombo(ror, rra_combine));
    t[0x7B] = op!("RRA", AbsoluteY, 7, false, RmwCombo(ror, rra_combine));
    t[0x63] = op!("RRA", IndexedIndirectX, 8, false, RmwCombo(ror, rra_combine));
    t[0x73] = op!("RRA", IndirectIndexedY, 8, false, RmwCombo(ror, rra_combine));

    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::bus::Bus;
    use crate::nes::cartridge::{Cartridge, Mirroring};
    use crate::nes::ppu::Ppu;
    use crate::nes::cpu::Cpu;

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
    fn branch_with_page_cross_costs_four_cycles() {
        // BNE at $80FE with offset +4 and Z=0: lands on $8104, crossing a page.
        let mut prg = vec![0u8; 0x4000];
        let pc_in_prg = 0x00FE;
        prg[pc_in_prg] = 0xD0; // BNE
        prg[pc_in_prg + 1] = 0x04;
        let mut bus = bus_with_prg(prg);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.regs.pc = 0x80FE;
        cpu.regs.flags_off(Flags::ZERO);
        let opcode = cpu.fetch_byte(&mut bus);
        let cycles = dispatch(&mut cpu, &mut bus, opcode).unwrap();
        assert_eq!(cpu.regs.pc, 0x8104);
        assert_eq!(cycles, 4);
    }

    #[test]
    fn jmp_indirect_reproduces_page_wrap_bug() {
        let mut prg = vec![0u8; 0x4000];
        // JMP ($80FF) at $8003: low byte read from $80FF, high byte
        // incorrectly re-read from $8000 instead of $8100.
        prg[3] = 0x6C;
        prg[4] = 0xFF;
        prg[5] = 0x80;
        prg[0x00FF] = 0x00; // low byte of the resolved target
        prg[0x0100] = 0x80; // would supply the high byte if the bug were absent
        prg[0x0000] = 0x12; // actually used due to the wrap
        let mut bus = bus_with_prg(prg);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.regs.pc = 0x8003;
        let opcode = cpu.fetch_byte(&mut bus);
        dispatch(&mut cpu, &mut bus, opcode).unwrap();
        assert_eq!(cpu.regs.pc, 0x1200);
    }
}

