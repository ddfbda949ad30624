use thiserror::Error;

/// Errors surfaced to the user by the assembler. Input is never silently
/// repaired: any malformed line aborts the whole translation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblerError {
    #[error("assembly program file is missing or unreadable: {0}")]
    MissingFile(String),

    #[error("unknown instruction set architecture: {0}")]
    UnknownIsa(String),

    #[error("not a valid mnemonic for this architecture: {0}")]
    UnknownMnemonic(String),

    #[error("invalid operands for this instruction: {0}")]
    InvalidOperand(String),

    #[error("immediate constant out of range: {0}")]
    ImmediateOutOfRange(i64),

    #[error("operand is missing its trailing comma: {0}")]
    MissingComma(String),
}
