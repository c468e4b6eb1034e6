//! Instruction Fault Status Register decoding (ARMv7-R, PMSA format).

use core::fmt;

bitflags::bitflags! {
    /// IFSR bits outside the fault status field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IfsrFlags: u32 {
        /// FS[4], the high bit of the fault status field.
        const FS4 = 1 << 10;
        /// External abort type: AXI slave error rather than decode error.
        const EXT = 1 << 12;
    }
}

/// Low four bits of the fault status field.
const FS_LOW_MASK: u32 = 0xf;

/// Source of a prefetch abort, from IFSR.FS[4:0].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultStatus {
    /// Fetch from an address no MPU region covers.
    Background,
    /// Debug event (breakpoint or vector catch).
    Debug,
    /// Synchronous external abort on the fetch.
    SyncExternal,
    /// MPU permission fault.
    Permission,
    /// Cache lockdown abort.
    Lockdown,
    /// Coprocessor abort.
    Coprocessor,
    /// Parity or ECC error on the fetch.
    Parity,
    /// A status encoding this decoder does not know.
    Unknown(u8),
}

impl FaultStatus {
    /// Decodes the fault status field of `ifsr`.
    #[must_use]
    pub fn from_ifsr(ifsr: u32) -> Self {
        match fs(ifsr) {
            0b00000 => Self::Background,
            0b00010 => Self::Debug,
            0b01000 => Self::SyncExternal,
            0b01101 => Self::Permission,
            0b10100 => Self::Lockdown,
            0b11010 => Self::Coprocessor,
            0b11001 => Self::Parity,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for FaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Background => f.write_str("background fault"),
            Self::Debug => f.write_str("debug event"),
            Self::SyncExternal => f.write_str("synchronous external abort"),
            Self::Permission => f.write_str("permission fault"),
            Self::Lockdown => f.write_str("lockdown abort"),
            Self::Coprocessor => f.write_str("coprocessor abort"),
            Self::Parity => f.write_str("parity error"),
            Self::Unknown(fs) => write!(f, "unknown status {fs:#07b}"),
        }
    }
}

/// Assembles FS[4:0] from bit 10 and bits 3..0.
fn fs(ifsr: u32) -> u8 {
    let high = u32::from(IfsrFlags::from_bits_truncate(ifsr).contains(IfsrFlags::FS4)) << 4;
    // Five bits, always fits.
    #[allow(clippy::cast_possible_truncation)]
    let fs = (high | (ifsr & FS_LOW_MASK)) as u8;
    fs
}
