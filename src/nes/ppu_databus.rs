//! The register identifiers shared between the CPU bus's `$2000-$2007`
//! dispatch and the PPU's register implementation.

use num_derive::FromPrimitive;

#[derive(Debug, FromPrimitive)]
pub enum PpuRegs {
    /// $2000
    Ctrl = 0,
    /// $2001
    Mask = 1,
    /// $2002
    Status = 2,
    /// $2003
    OamAddr = 3,
    /// $2004
    OamData = 4,
    /// $2005
    Scroll = 5,
    /// $2006
    PpuAddr = 6,
    /// $2007
    PpuData = 7,
}
