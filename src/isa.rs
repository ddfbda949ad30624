//! ISA descriptors: architecture enums, operand aliases, result categories
//! and the declarative opcode/register tables they are loaded from.
//!
//! The tables live in `resources/instructions.json` and
//! `resources/registers.json`, keyed by canonical ISA name. They are data,
//! not code: [`InstructionSet::from_json`] accepts caller-supplied tables
//! with the same shape, and the embedded resources are only a default.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const INSTRUCTIONS_JSON: &str = include_str!("../resources/instructions.json");
const REGISTERS_JSON: &str = include_str!("../resources/registers.json");

/// Failure to parse one of the small configuration enums from a string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to parse \"{value}\" as {enum_name}")]
pub struct ParseEnumError {
    pub value: String,
    pub enum_name: &'static str,
}

impl ParseEnumError {
    fn new(value: &str, enum_name: &'static str) -> ParseEnumError {
        ParseEnumError {
            value: value.to_owned(),
            enum_name,
        }
    }
}

/// The four supported instruction set architectures.
///
/// `FromStr` also accepts the historical aliases `risc1`/`risc2`/`risc3`
/// (stack, accumulator and register machine respectively), in any case.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Isa {
    Stack,
    Accumulator,
    Risc,
    Cisc,
}

impl Isa {
    pub const ALL: [Isa; 4] = [Isa::Stack, Isa::Accumulator, Isa::Risc, Isa::Cisc];

    pub fn name(self) -> &'static str {
        match self {
            Isa::Stack => "stack",
            Isa::Accumulator => "accumulator",
            Isa::Risc => "risc",
            Isa::Cisc => "cisc",
        }
    }

    /// `(instruction bits, opcode bits, byte bits)` for this ISA.
    pub fn instruction_size(self) -> (usize, usize, usize) {
        match self {
            Isa::Stack => (6, 6, 6),
            Isa::Accumulator => (8, 8, 8),
            Isa::Risc => (16, 6, 8),
            Isa::Cisc => (8, 8, 8),
        }
    }

    pub fn instruction_bits(self) -> usize {
        self.instruction_size().0
    }

    pub fn opcode_bits(self) -> usize {
        self.instruction_size().1
    }

    pub fn byte_bits(self) -> usize {
        self.instruction_size().2
    }
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Isa {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Isa, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "stack" | "risc1" => Ok(Isa::Stack),
            "accumulator" | "risc2" => Ok(Isa::Accumulator),
            "risc" | "risc3" => Ok(Isa::Risc),
            "cisc" => Ok(Isa::Cisc),
            _ => Err(ParseEnumError::new(s, "Isa")),
        }
    }
}

/// Memory topology: `Neumann` and `Harvardm` share one memory between
/// program and data, `Harvard` allocates two.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Architecture {
    Neumann,
    Harvard,
    Harvardm,
}

impl FromStr for Architecture {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Architecture, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "neumann" => Ok(Architecture::Neumann),
            "harvard" => Ok(Architecture::Harvard),
            "harvardm" => Ok(Architecture::Harvardm),
            _ => Err(ParseEnumError::new(s, "Architecture")),
        }
    }
}

/// I/O style: devices mapped into a memory window, or addressed by port
/// number through dedicated instructions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IoMode {
    Mmio,
    Special,
}

impl IoMode {
    pub fn name(self) -> &'static str {
        match self {
            IoMode::Mmio => "mmio",
            IoMode::Special => "special",
        }
    }
}

impl FromStr for IoMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<IoMode, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "mmio" => Ok(IoMode::Mmio),
            "special" => Ok(IoMode::Special),
            _ => Err(ParseEnumError::new(s, "IoMode")),
        }
    }
}

/// Result category of an opcode: what the execute engine does with the
/// operand values and where the result goes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Category {
    /// All-zero opcode; never executed, fetching it stops the machine.
    Halt,
    /// Executed as a cycle that does nothing.
    Nop,
    /// ALU result into the first operand (register machines).
    FirstOp,
    /// ALU result discarded, only the flag register is updated.
    Flags,
    /// ALU result pushed onto the register stack (stack ISA).
    Tos,
    /// ALU result stored at the byte address popped off the register stack.
    MemTos,
    /// ALU result into the accumulator.
    Acc,
    /// ALU result into the index register.
    Ir,
    /// ALU result into the flag register.
    Fr,
    /// Compare: like `Flags`, for the accumulator machine.
    Cmp,
    /// ALU result stored at the byte address held in the index register.
    MemIr,
    Call,
    Ret,
    Jmp,
    Enter,
    Leave,
    StackPush,
    StackPop,
    StackPopF,
    Out,
    In,
    Swap,
    Simd,
    SimdLoad,
    SimdStore,
}

impl FromStr for Category {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Category, ParseEnumError> {
        Ok(match s {
            "halt" => Category::Halt,
            "nop" => Category::Nop,
            "firstop" => Category::FirstOp,
            "flags" => Category::Flags,
            "tos" => Category::Tos,
            "memtos" => Category::MemTos,
            "acc" => Category::Acc,
            "ir" => Category::Ir,
            "fr" => Category::Fr,
            "cmp" => Category::Cmp,
            "memir" => Category::MemIr,
            "call" => Category::Call,
            "ret" => Category::Ret,
            "jmp" => Category::Jmp,
            "enter" => Category::Enter,
            "leave" => Category::Leave,
            "stackpush" => Category::StackPush,
            "stackpop" => Category::StackPop,
            "stackpopf" => Category::StackPopF,
            "out" => Category::Out,
            "in" => Category::In,
            "swap" => Category::Swap,
            "simd" => Category::Simd,
            "simdload" => Category::SimdLoad,
            "simdstore" => Category::SimdStore,
            _ => return Err(ParseEnumError::new(s, "Category")),
        })
    }
}

/// Operand alias: how one operand of an instruction is encoded and where
/// its value comes from at execution time.
///
/// Aliases split into *syntactic* ones, which correspond to a token in
/// assembly source and to bits in the encoding, and *implicit* ones
/// (`tos*`, `acc`, `fr`, `ir`, `memtos`, `memir`, `one`), which the machine
/// supplies on its own.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operand {
    /// `%NAME` - a register's state.
    Reg,
    /// `[%NAME]` - the memory word at the register's byte address.
    MemReg,
    /// `[%NAME+$off]` - the memory word at register plus signed offset.
    MemRegOff,
    /// `%NAME+$off` - register plus signed offset as a value.
    RegOff,
    /// `$value` - an N-bit signed immediate.
    Imm(usize),
    /// Word just below the register-stack top.
    Tos,
    /// Word two slots below the register-stack top.
    Tos2,
    /// Word below the register-stack top; popping it.
    TosPop,
    /// Memory word at the byte address popped off the register stack.
    MemTos,
    /// Memory word at the byte address held in the index register.
    MemIr,
    /// `[$addr]` - memory word at an immediate byte address.
    MemImm,
    Fr,
    Ir,
    Acc,
    /// The literal word `0x0001`.
    One,
    /// `[%NAME]` - a 64-bit vector at the register's byte address.
    SimdReg,
}

impl Operand {
    /// Whether this alias consumes a token in assembly source (and emits
    /// bits in the encoding).
    pub fn is_syntactic(self) -> bool {
        matches!(
            self,
            Operand::Reg
                | Operand::MemReg
                | Operand::MemRegOff
                | Operand::RegOff
                | Operand::Imm(_)
                | Operand::MemImm
                | Operand::SimdReg
        )
    }
}

impl FromStr for Operand {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Operand, ParseEnumError> {
        if let Some(width) = s.strip_prefix("imm") {
            let width: usize = width
                .parse()
                .map_err(|_| ParseEnumError::new(s, "Operand"))?;
            return Ok(Operand::Imm(width));
        }
        Ok(match s {
            "reg" => Operand::Reg,
            "memreg" => Operand::MemReg,
            "memregoff" => Operand::MemRegOff,
            "regoff" => Operand::RegOff,
            "tos" => Operand::Tos,
            "tos2" => Operand::Tos2,
            "tospop" => Operand::TosPop,
            "memtos" => Operand::MemTos,
            "memir" => Operand::MemIr,
            "memimm" => Operand::MemImm,
            "fr" => Operand::Fr,
            "ir" => Operand::Ir,
            "acc" => Operand::Acc,
            "one" => Operand::One,
            "simdreg" => Operand::SimdReg,
            _ => return Err(ParseEnumError::new(s, "Operand")),
        })
    }
}

/// One opcode table row.
#[derive(Clone, Debug, PartialEq)]
pub struct OpcodeEntry {
    pub mnemonic: String,
    pub category: Category,
    pub operands: Vec<Operand>,
}

/// One register table row.
#[derive(Clone, Debug, PartialEq)]
pub struct RegisterInfo {
    pub name: String,
    pub general_purpose: bool,
    pub code: String,
}

/// Errors raised while loading ISA descriptor tables.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("table has no entry for ISA {0}")]
    MissingIsa(&'static str),
    #[error("malformed table resource: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("{0}")]
    BadName(#[from] ParseEnumError),
    #[error("opcode key {key} is not {width} bits of '0'/'1'")]
    BadOpcodeKey { key: String, width: usize },
}

/// The full descriptor of one ISA: its opcode table (in declaration order)
/// and its register table.
#[derive(Clone, Debug)]
pub struct InstructionSet {
    isa: Isa,
    entries: Vec<(String, OpcodeEntry)>,
    by_opcode: HashMap<String, usize>,
    registers: Vec<RegisterInfo>,
}

impl InstructionSet {
    /// Loads the embedded descriptor tables for `isa`.
    pub fn load(isa: Isa) -> InstructionSet {
        InstructionSet::from_json(isa, INSTRUCTIONS_JSON, REGISTERS_JSON)
            .expect("embedded ISA tables are well-formed")
    }

    /// Parses descriptor tables from JSON text. `instructions` maps ISA name
    /// to `{opcode-bits: [mnemonic, category, [operand, ...]]}`; `registers`
    /// maps ISA name to `[[name, general-purpose, code], ...]`.
    pub fn from_json(
        isa: Isa,
        instructions: &str,
        registers: &str,
    ) -> Result<InstructionSet, TableError> {
        type RawInstructions = HashMap<String, serde_json::Map<String, serde_json::Value>>;
        type RawRegisters = HashMap<String, Vec<(String, u8, String)>>;

        let mut raw_instr: RawInstructions = serde_json::from_str(instructions)?;
        let raw_table = raw_instr
            .remove(isa.name())
            .ok_or_else(|| TableError::MissingIsa(isa.name()))?;

        let mut entries = Vec::with_capacity(raw_table.len());
        let mut by_opcode = HashMap::with_capacity(raw_table.len());
        for (opcode, value) in raw_table {
            if opcode.len() != isa.opcode_bits() || opcode.bytes().any(|b| b != b'0' && b != b'1')
            {
                return Err(TableError::BadOpcodeKey {
                    key: opcode,
                    width: isa.opcode_bits(),
                });
            }
            let (mnemonic, category, operands): (String, String, Vec<String>) =
                serde_json::from_value(value)?;
            let entry = OpcodeEntry {
                mnemonic,
                category: category.parse()?,
                operands: operands
                    .iter()
                    .map(|alias| alias.parse())
                    .collect::<Result<_, _>>()?,
            };
            by_opcode.insert(opcode.clone(), entries.len());
            entries.push((opcode, entry));
        }

        let mut raw_regs: RawRegisters = serde_json::from_str(registers)?;
        let registers = raw_regs
            .remove(isa.name())
            .ok_or_else(|| TableError::MissingIsa(isa.name()))?
            .into_iter()
            .map(|(name, general_purpose, code)| RegisterInfo {
                name,
                general_purpose: general_purpose == 1,
                code,
            })
            .collect();

        Ok(InstructionSet {
            isa,
            entries,
            by_opcode,
            registers,
        })
    }

    pub fn isa(&self) -> Isa {
        self.isa
    }

    /// The table row for an exact opcode bit pattern.
    pub fn entry(&self, opcode: &str) -> Option<&OpcodeEntry> {
        self.by_opcode.get(opcode).map(|&i| &self.entries[i].1)
    }

    /// All rows, in table order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &OpcodeEntry)> {
        self.entries.iter().map(|(op, e)| (op.as_str(), e))
    }

    /// All encodings of one mnemonic, in table order. Overloaded mnemonics
    /// (same name, different operand shapes) return more than one row.
    pub fn encodings(&self, mnemonic: &str) -> Vec<(&str, &OpcodeEntry)> {
        self.entries()
            .filter(|(_, e)| e.mnemonic == mnemonic)
            .collect()
    }

    pub fn registers(&self) -> &[RegisterInfo] {
        &self.registers
    }

    /// The binary code of a register, by name.
    pub fn register_code(&self, name: &str) -> Option<&str> {
        self.registers
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.code.as_str())
    }
}

/// The CISC style table: the top three opcode bits select how many register
/// codes and how many two-byte immediates follow the opcode.
pub(crate) fn cisc_style(style: &crate::bits::BitStr) -> Option<(usize, usize)> {
    match (style[0], style[1], style[2]) {
        (false, false, false) => Some((1, 0)),
        (false, false, true) => Some((0, 0)),
        (false, true, false) => Some((0, 1)),
        (false, true, true) => Some((2, 0)),
        (true, false, false) => Some((1, 1)),
        (true, false, true) => Some((2, 1)),
        (true, true, false) => Some((1, 2)),
        (true, true, true) => None,
    }
}
