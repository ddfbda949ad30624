use thiserror::Error;

/// Errors surfaced by the virtual processor.
///
/// The engine never recovers internally: every error propagates to whoever
/// called [`Cpu::step`](crate::Cpu::step) (or another entry point) and leaves
/// the machine in the state it had reached when the fault was detected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimulatorError {
    /// A port I/O instruction was executed while the device map is
    /// memory-mapped (or the other way around).
    #[error("instruction is not available in {mode} I/O mode")]
    IllegalInstructionInMode { mode: &'static str },

    /// A read or write reached beyond the end of a memory.
    #[error("memory access out of range: bits {start}..{end} of {size}")]
    MemoryOutOfRange {
        start: usize,
        end: usize,
        size: usize,
    },

    /// Pop from an empty memory stack or register stack.
    #[error("stack underflow")]
    StackUnderflow,

    /// `input_finish` was called while no `in` instruction is pending.
    #[error("no input is pending")]
    UnbalancedInput,

    /// A register was asked to store a value wider than a machine word.
    #[error("register {name} cannot hold a {width}-bit value")]
    RegisterOverflow { name: String, width: usize },

    /// Integer division or remainder by zero in the ALU.
    #[error("division by zero")]
    DivisionByZero,

    /// The fetched opcode has no entry in the ISA's table.
    #[error("unknown opcode {opcode}")]
    UnknownOpcode { opcode: String },

    /// A register name or binary code that the ISA does not declare.
    #[error("unknown register {0}")]
    UnknownRegister(String),

    /// No device is bound to the addressed port.
    #[error("no device bound to port {0}")]
    UnknownPort(u16),

    /// The program listing contained characters other than `'0'` and `'1'`.
    #[error("program listing contains characters other than '0' and '1'")]
    InvalidListing,
}
