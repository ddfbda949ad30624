//! Core of an educational simulator for a family of toy instruction set
//! architectures.
//!
//! The crate provides the virtual processor half of the simulator: a
//! bit-addressable [`Memory`], named 16-bit [`Register`]s, declarative
//! [`InstructionSet`] tables keyed by [`Isa`], an ALU, and the [`Cpu`]
//! fetch/decode/execute engine that presenters drive one [`Cpu::step`] at a
//! time. The companion `simasm` crate translates assembly text into the
//! bit-string listings [`Cpu::new`] loads.
//!
//! Four programming models are supported (`stack`, `accumulator`, `risc`,
//! `cisc`), each with its own instruction width, opcode table and register
//! set. All of that is data: the tables ship as JSON resources and are
//! parsed into typed descriptors, so the engine itself contains no per-ISA
//! opcode knowledge beyond the result-category dispatch.

pub mod bits;
pub mod constants;

mod alu;
mod error;
mod isa;
mod memory;
mod processor;
mod register;
mod shell;

#[cfg(test)]
mod test;

pub use crate::bits::Bits;
pub use crate::error::SimulatorError;
pub use crate::isa::{
    Architecture, Category, InstructionSet, Isa, IoMode, OpcodeEntry, Operand, ParseEnumError,
    RegisterInfo, TableError,
};
pub use crate::memory::Memory;
pub use crate::processor::{Cpu, Flags};
pub use crate::register::Register;
pub use crate::shell::Shell;

/// The simulator's machine word: registers and stack slots are 16 bits.
pub type Word = u16;
