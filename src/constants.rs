//! Memory layout defaults and register geometry shared by every ISA.

/// Width of a machine word in bits.
pub const WORD_WIDTH: usize = 16;

/// Size of both data and program memory, in bytes.
pub const MEMORY_SIZE: usize = 1024;

/// Byte index the program listing is loaded at; initial value of `IP`.
pub const PROGRAM_START: usize = 512;

/// Initial value of `TOS`, the register-stack top pointer (stack ISA).
/// The register stack grows towards higher addresses.
pub const TOS_START: usize = 256;

/// Initial value of `SP` and `BP`. The memory stack grows towards lower
/// addresses, so the first push lands in the last two bytes of memory.
pub const STACK_START: usize = 1024;

/// Byte window of the memory-mapped shell device.
pub const MMIO_START: usize = 1004;
pub const MMIO_END: usize = 1024;

/// Port the shell device is bound to in port I/O mode.
pub const SHELL_PORT: u16 = 1;

/// Bit offsets of the four flags inside the 16-bit flag register.
pub const CF_BIT: usize = 12;
pub const ZF_BIT: usize = 13;
pub const OF_BIT: usize = 14;
pub const SF_BIT: usize = 15;

/// Width of a register code in instruction encodings.
pub const REG_CODE_WIDTH: usize = 3;

/// Number of 16-bit lanes in a SIMD vector (CISC).
pub const SIMD_LANES: usize = 4;
