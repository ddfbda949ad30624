//! Assembler for the [simcpu](../simcpu/index.html) virtual processor
//! family.
//!
//! [`assemble`] accepts a program written in the flat assembly dialect the
//! simulator understands - one instruction per line, operands separated by
//! commas - and produces the bit-string listing [`simcpu::Cpu::new`] loads:
//! one line of `'0'`/`'1'` characters per instruction, blank source lines
//! preserved as blank output lines.
//!
//! Operand syntax:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `%NAME` | a register |
//! | `[%NAME]` | memory addressed by a register |
//! | `$value` | a signed decimal immediate |
//! | `[$value]` | memory at an immediate address |
//! | `%NAME+$off` / `[%NAME+$off]` | register plus offset (CISC) |
//!
//! A mnemonic may have several encodings that differ only in operand types
//! (`mov %R00, %R01` versus `mov %R00, $5`); they are tried in table order
//! and the first one whose operands validate wins.

mod error;

#[cfg(test)]
mod test;

pub use crate::error::AssemblerError;

use simcpu::bits;
use simcpu::{InstructionSet, Isa, OpcodeEntry, Operand};

/// Translates assembly `text` for `isa` into a bit-string listing.
pub fn assemble(isa: Isa, text: &str) -> Result<String, AssemblerError> {
    let set = InstructionSet::load(isa);
    let mut output = String::new();
    for line in text.split('\n') {
        if line.trim().is_empty() {
            output.push('\n');
            continue;
        }
        let encoded = translate_line(isa, &set, line)?;
        log::debug!("assembled \"{}\" -> {}", line, encoded);
        output.push_str(&encoded);
        output.push('\n');
    }
    Ok(output)
}

/// The hexadecimal rendering of a listing: one `0x...` word per non-empty
/// line.
pub fn assemble_hex(isa: Isa, text: &str) -> Result<String, AssemblerError> {
    let listing = assemble(isa, text)?;
    let lines: Vec<String> = listing
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(|line| format!("{:#x}", u64::from_str_radix(line, 2).unwrap_or(0)))
        .collect();
    Ok(lines.join("\n"))
}

fn translate_line(isa: Isa, set: &InstructionSet, line: &str) -> Result<String, AssemblerError> {
    let mut tokens = line.split(' ');
    let mnemonic = tokens.next().unwrap_or("");
    let raw: Vec<&str> = tokens.collect();

    // Every operand but the last must end with a comma; a trailing comma on
    // the final operand is tolerated and stripped.
    let mut operands = Vec::with_capacity(raw.len());
    for (index, token) in raw.iter().enumerate() {
        if index + 1 < raw.len() {
            let stripped = token
                .strip_suffix(',')
                .ok_or_else(|| AssemblerError::MissingComma((*token).to_owned()))?;
            operands.push(stripped);
        } else {
            operands.push(token.strip_suffix(',').unwrap_or(*token));
        }
    }

    let encodings = set.encodings(mnemonic);
    if encodings.is_empty() {
        return Err(AssemblerError::UnknownMnemonic(mnemonic.to_owned()));
    }

    if let [(opcode, entry)] = encodings.as_slice() {
        return encode_line(isa, set, opcode, entry, &operands);
    }

    // Overloaded mnemonic: try each encoding in table order, first Ok wins.
    for (opcode, entry) in &encodings {
        let mut opcode = (*opcode).to_owned();
        // Low/high byte moves carry a 5-bit opcode; the table stores the two
        // 6-bit patterns it can decode as.
        if (mnemonic == "mov_low" || mnemonic == "mov_high") && opcode.len() != 5 {
            opcode.pop();
        }
        if let Ok(encoded) = encode_line(isa, set, &opcode, entry, &operands) {
            return Ok(encoded);
        }
    }
    Err(AssemblerError::InvalidOperand(line.to_owned()))
}

fn encode_line(
    isa: Isa,
    set: &InstructionSet,
    opcode: &str,
    entry: &OpcodeEntry,
    operands: &[&str],
) -> Result<String, AssemblerError> {
    // Implicit aliases (tos, acc, memir, ...) are supplied by the machine
    // and never appear in source.
    let syntactic: Vec<Operand> = entry
        .operands
        .iter()
        .copied()
        .filter(|alias| alias.is_syntactic())
        .collect();
    if syntactic.len() != operands.len() {
        return Err(AssemblerError::InvalidOperand(operands.join(" ")));
    }

    let mut line = String::from(opcode);
    let mut codes: Vec<String> = Vec::new();
    let mut words: Vec<String> = Vec::new();
    let long_width = isa.byte_bits() * 2;

    for (alias, token) in syntactic.iter().zip(operands) {
        match alias {
            Operand::Reg => {
                let code = register_code(set, token)?;
                emit_code(isa, &mut line, &mut codes, code);
            }
            Operand::MemReg | Operand::SimdReg => {
                let inner = strip_brackets(token)?;
                let code = register_code(set, inner)?;
                emit_code(isa, &mut line, &mut codes, code);
            }
            Operand::Imm(width) => {
                let value = parse_immediate(token)?;
                let field = immediate_field(value, *width)?;
                if isa == Isa::Risc {
                    line.push_str(&field);
                } else {
                    words.push(field);
                }
            }
            Operand::MemImm => {
                let inner = strip_brackets(token)?;
                let value = parse_immediate(inner)?;
                words.push(immediate_field(value, long_width)?);
            }
            Operand::RegOff | Operand::MemRegOff => {
                let inner = match alias {
                    Operand::MemRegOff => strip_brackets(token)?,
                    _ => *token,
                };
                let mut parts = inner.splitn(2, '+');
                let reg_part = parts.next().unwrap_or("");
                let imm_part = parts
                    .next()
                    .ok_or_else(|| AssemblerError::InvalidOperand((*token).to_owned()))?;
                codes.push(register_code(set, reg_part)?.to_owned());
                let value = parse_immediate(imm_part)?;
                words.push(immediate_field(value, long_width)?);
            }
            _ => unreachable!("implicit aliases are filtered out"),
        }
    }

    // CISC register codes share one byte after the opcode.
    if !codes.is_empty() {
        let mut pack = codes.concat();
        while pack.len() < isa.byte_bits() {
            pack.push('0');
        }
        line.push_str(&pack);
    }
    for word in words {
        line.push_str(&word);
    }
    while line.len() < isa.instruction_bits() {
        line.push('0');
    }
    Ok(line)
}

fn emit_code(isa: Isa, line: &mut String, codes: &mut Vec<String>, code: &str) {
    if isa == Isa::Cisc {
        codes.push(code.to_owned());
    } else {
        line.push_str(code);
    }
}

fn register_code<'a>(
    set: &'a InstructionSet,
    token: &str,
) -> Result<&'a str, AssemblerError> {
    let name = token
        .strip_prefix('%')
        .ok_or_else(|| AssemblerError::InvalidOperand(token.to_owned()))?;
    set.register_code(name)
        .ok_or_else(|| AssemblerError::InvalidOperand(token.to_owned()))
}

fn strip_brackets(token: &str) -> Result<&str, AssemblerError> {
    token
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| AssemblerError::InvalidOperand(token.to_owned()))
}

fn parse_immediate(token: &str) -> Result<i64, AssemblerError> {
    let digits = token
        .strip_prefix('$')
        .ok_or_else(|| AssemblerError::InvalidOperand(token.to_owned()))?;
    digits
        .parse()
        .map_err(|_| AssemblerError::InvalidOperand(token.to_owned()))
}

/// Encodes a signed immediate as `width` bits of two's complement. The range
/// is strict on both sides: a `width`-bit field admits neither
/// `-2^(width-1)` nor `+2^(width-1)`.
fn immediate_field(value: i64, width: usize) -> Result<String, AssemblerError> {
    if !bits::fits_signed(value, width) {
        return Err(AssemblerError::ImmediateOutOfRange(value));
    }
    Ok(bits::render(&bits::from_unsigned(
        bits::encode_signed(value, width),
        width,
    )))
}
