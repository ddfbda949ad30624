//! The virtual processor: fetch, decode, execute, and the step API that
//! presenters drive.

mod exec;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::bits::{self, BitStr, Bits};
use crate::constants::{
    CF_BIT, MEMORY_SIZE, MMIO_END, MMIO_START, OF_BIT, SF_BIT, SHELL_PORT, TOS_START, WORD_WIDTH,
    ZF_BIT,
};
use crate::constants::STACK_START;
use crate::error::SimulatorError;
use crate::isa::{self, Architecture, InstructionSet, IoMode, Isa};
use crate::memory::Memory;
use crate::register::Register;
use crate::shell::Shell;
use crate::Word;

/// The four status flags, unpacked from the low bits of `FR`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Flags {
    pub carry: bool,
    pub zero: bool,
    pub overflow: bool,
    pub sign: bool,
}

/// Where an instruction's result goes.
#[derive(Clone, Debug)]
pub(crate) enum Destination {
    Register(usize),
    /// A byte address in data memory.
    Memory(usize),
    Port(u16),
    None,
}

pub(crate) struct PendingInput {
    dest: Destination,
    tos_push: bool,
}

/// A single-threaded cooperative stepper over one loaded program.
///
/// A `Cpu` is constructed per program load and owns its memories, registers
/// and device map for its whole lifetime. [`Cpu::step`] is the only progress
/// function; it advances by at most one instruction and is a no-op once an
/// all-zero opcode (halt) has been fetched or while an `in` instruction
/// waits for [`Cpu::input_finish`].
pub struct Cpu {
    isa: Isa,
    set: InstructionSet,
    architecture: Architecture,
    io: IoMode,

    registers: Vec<Register>,
    by_name: HashMap<String, usize>,
    by_code: HashMap<String, usize>,

    data_memory: Rc<RefCell<Memory>>,
    program_memory: Rc<RefCell<Memory>>,
    ports: HashMap<u16, Shell>,

    // Decoded state of the instruction currently visible at `IP`.
    instruction: Bits,
    opcode: Bits,
    long_registers: Vec<String>,
    long_register_result: Option<String>,
    long_immediates: Vec<Bits>,
    long_immediate_result: Option<Bits>,
    additional_jump: usize,

    // Byte size of every loaded instruction, indexed by instruction number.
    // Jump distances are counted in instructions, so this list converts them
    // to bytes in both directions.
    instr_sizes: Vec<usize>,
    program_pointer: i64,

    first_instruction: bool,
    pending_input: Option<PendingInput>,
}

impl Cpu {
    /// Builds a fresh machine and loads `listing` (the assembler's bit-string
    /// output) at the program start address.
    pub fn new(
        isa: Isa,
        architecture: Architecture,
        io: IoMode,
        listing: &str,
    ) -> Result<Cpu, SimulatorError> {
        let set = InstructionSet::load(isa);
        Cpu::with_tables(set, architecture, io, listing)
    }

    /// Like [`Cpu::new`], but with a caller-supplied instruction set.
    pub fn with_tables(
        set: InstructionSet,
        architecture: Architecture,
        io: IoMode,
        listing: &str,
    ) -> Result<Cpu, SimulatorError> {
        let isa = set.isa();
        let data_memory = Rc::new(RefCell::new(Memory::new(MEMORY_SIZE)));
        let program_memory = match architecture {
            Architecture::Harvard => Rc::new(RefCell::new(Memory::new(MEMORY_SIZE))),
            Architecture::Neumann | Architecture::Harvardm => Rc::clone(&data_memory),
        };

        let mut registers = Vec::new();
        let mut by_name = HashMap::new();
        let mut by_code = HashMap::new();
        for info in set.registers() {
            let mut register = Register::new(&info.name, info.general_purpose);
            match info.name.as_str() {
                "IP" => register.write_word(crate::constants::PROGRAM_START as Word),
                "TOS" => register.write_word(TOS_START as Word),
                "SP" | "BP" => register.write_word(STACK_START as Word),
                _ => {}
            }
            by_name.insert(info.name.clone(), registers.len());
            by_code.insert(info.code.clone(), registers.len());
            registers.push(register);
        }

        let shell = match io {
            IoMode::Mmio => Shell::mmio(MMIO_START, MMIO_END),
            IoMode::Special => Shell::special(),
        };
        let mut ports = HashMap::new();
        ports.insert(SHELL_PORT, shell);

        let mut cpu = Cpu {
            isa,
            set,
            architecture,
            io,
            registers,
            by_name,
            by_code,
            data_memory,
            program_memory,
            ports,
            instruction: Bits::new(),
            opcode: Bits::new(),
            long_registers: Vec::new(),
            long_register_result: None,
            long_immediates: Vec::new(),
            long_immediate_result: None,
            additional_jump: 0,
            instr_sizes: Vec::new(),
            program_pointer: 0,
            first_instruction: true,
            pending_input: None,
        };
        cpu.load_program(listing)?;
        log::debug!(
            "created CPU (isa: {}, architecture: {:?}, io: {})",
            isa,
            architecture,
            io.name()
        );
        Ok(cpu)
    }

    fn load_program(&mut self, listing: &str) -> Result<(), SimulatorError> {
        let byte_bits = self.isa.byte_bits();
        let flat: String = listing.chars().filter(|c| *c != '\n').collect();
        let program = bits::from_text(&flat).ok_or(SimulatorError::InvalidListing)?;
        let start = self.reg_word("IP")? as usize;
        if !program.is_empty() {
            self.program_memory
                .borrow_mut()
                .write(start * byte_bits, &program)?;
        }
        self.instr_sizes = listing
            .split('\n')
            .map(|line| line.len() / byte_bits)
            .collect();
        self.program_pointer = 0;
        log::debug!(
            "program loaded at byte {} ({} lines)",
            start,
            self.instr_sizes.len()
        );
        Ok(())
    }

    /// Advances the machine by at most one instruction.
    ///
    /// The first call only fetches; every later call executes the fetched
    /// instruction and then fetches the next one, so the raw instruction
    /// visible through [`Cpu::instruction_bits`] is always the one about to
    /// run. Once the fetched opcode is all zeroes (halt) or while input is
    /// pending, `step` returns without progress.
    pub fn step(&mut self) -> Result<(), SimulatorError> {
        if self.is_halted() {
            log::debug!("halt reached, step is a no-op");
            return Ok(());
        }
        if self.pending_input.is_some() {
            log::debug!("waiting for input, step is a no-op");
            return Ok(());
        }
        if self.first_instruction {
            self.first_instruction = false;
        } else {
            self.execute_cycle()?;
            self.update_devices()?;
        }
        self.read_instruction()
    }

    /// Resumes a machine suspended on `in`, writing `value` to the
    /// destination recorded when the instruction executed.
    pub fn input_finish(&mut self, value: Word) -> Result<(), SimulatorError> {
        let pending = self
            .pending_input
            .take()
            .ok_or(SimulatorError::UnbalancedInput)?;
        self.write_result(&pending.dest, pending.tos_push, &bits::word_bits(value))
    }

    /// Steps until the machine halts, suspends on input, or `max_steps`
    /// cycles have run.
    pub fn run(&mut self, max_steps: usize) -> Result<(), SimulatorError> {
        for _ in 0..max_steps {
            if self.is_halted() || self.is_waiting_for_input() {
                break;
            }
            self.step()?;
        }
        Ok(())
    }

    fn read_instruction(&mut self) -> Result<(), SimulatorError> {
        let (instr_bits, opcode_bits, byte_bits) = self.isa.instruction_size();
        let start = self.reg_word("IP")? as usize;
        let mut pos = start * byte_bits;

        let program = self.program_memory.borrow();
        let instruction = program.read(pos, pos + instr_bits)?;
        pos += instr_bits;
        let opcode = instruction[..opcode_bits].to_bitvec();

        let (reg_count, imm_count) = match self.isa {
            Isa::Stack | Isa::Accumulator => (0, if opcode[0] { 1 } else { 0 }),
            Isa::Risc => (0, 0),
            Isa::Cisc => isa::cisc_style(&opcode[..3]).ok_or_else(|| {
                SimulatorError::UnknownOpcode {
                    opcode: bits::render(&opcode),
                }
            })?,
        };

        let mut additional_jump = 0;
        let mut long_registers = Vec::new();
        if reg_count > 0 {
            let pack = program.read(pos, pos + byte_bits)?;
            // Reversed so popping yields register codes in source order.
            if reg_count == 2 {
                long_registers.push(bits::render(&pack[3..6]));
            }
            long_registers.push(bits::render(&pack[0..3]));
            pos += byte_bits;
            additional_jump += 1;
        }
        let long_register_result = long_registers.last().cloned();

        let mut long_immediates = Vec::new();
        for _ in 0..imm_count {
            let raw = program.read(pos, pos + 2 * byte_bits)?;
            long_immediates.push(bits::sign_extend(&raw, WORD_WIDTH));
            pos += 2 * byte_bits;
            additional_jump += 2;
        }
        let long_immediate_result = long_immediates.first().cloned();
        long_immediates.reverse();
        drop(program);

        log::debug!(
            "fetch: instruction {}, opcode {}, extra bytes {}",
            bits::render(&instruction),
            bits::render(&opcode),
            additional_jump
        );

        self.instruction = instruction;
        self.opcode = opcode;
        self.long_registers = long_registers;
        self.long_register_result = long_register_result;
        self.long_immediates = long_immediates;
        self.long_immediate_result = long_immediate_result;
        self.additional_jump = additional_jump;
        Ok(())
    }

    fn execute_cycle(&mut self) -> Result<(), SimulatorError> {
        let opcode = bits::render(&self.opcode);
        let entry = self
            .set
            .entry(&opcode)
            .ok_or(SimulatorError::UnknownOpcode { opcode })?
            .clone();
        log::debug!("execute: {} ({:?})", entry.mnemonic, entry.category);

        let advance = match entry.category {
            crate::isa::Category::Nop | crate::isa::Category::Halt => true,
            _ => self.execute(&entry)?,
        };

        if advance {
            let (instr_bits, _, byte_bits) = self.isa.instruction_size();
            let ip = self.reg_word("IP")? as usize;
            let next = ip + instr_bits / byte_bits + self.additional_jump;
            self.set_reg_word("IP", next as Word)?;
            self.program_pointer += 1;
        }
        Ok(())
    }

    fn update_devices(&mut self) -> Result<(), SimulatorError> {
        let memory = self.data_memory.borrow();
        for shell in self.ports.values_mut() {
            if shell.io_type() == IoMode::Mmio {
                shell.refresh(&memory)?;
            }
        }
        Ok(())
    }

    // -- memory stack (SP, grows downward) ---------------------------------

    fn push_stack(&mut self, value: &BitStr) -> Result<(), SimulatorError> {
        let sp_bits = self.reg_word("SP")? as usize * 8;
        let size = self.data_memory.borrow().len_bits();
        if sp_bits < WORD_WIDTH || sp_bits > size {
            return Err(SimulatorError::MemoryOutOfRange {
                start: sp_bits.saturating_sub(WORD_WIDTH),
                end: sp_bits,
                size,
            });
        }
        self.data_memory
            .borrow_mut()
            .write(sp_bits - WORD_WIDTH, value)?;
        self.set_reg_word("SP", (sp_bits / 8 - 2) as Word)?;
        log::debug!("push to stack: {}", bits::to_hex(value));
        Ok(())
    }

    fn pop_stack(&mut self) -> Result<Bits, SimulatorError> {
        let sp = self.reg_word("SP")? as usize;
        if sp >= STACK_START {
            return Err(SimulatorError::StackUnderflow);
        }
        let value = self.data_memory.borrow().read(sp * 8, sp * 8 + WORD_WIDTH)?;
        self.set_reg_word("SP", (sp + 2) as Word)?;
        log::debug!("pop from stack: {}", bits::to_hex(&value));
        Ok(value)
    }

    // -- register stack (TOS, grows upward; stack ISA) ---------------------

    fn pop_tos(&mut self, second: bool, pop: bool) -> Result<Bits, SimulatorError> {
        let tos = self.reg_word("TOS")? as usize;
        let mut below = tos * 8;
        if second && below > TOS_START * 8 {
            below -= WORD_WIDTH;
        }
        if below < TOS_START * 8 + WORD_WIDTH {
            return Err(SimulatorError::StackUnderflow);
        }
        let value = self
            .data_memory
            .borrow()
            .read(below - WORD_WIDTH, below)?;
        if pop {
            self.set_reg_word("TOS", (tos - 2) as Word)?;
        }
        Ok(value)
    }

    // -- register access ---------------------------------------------------

    fn reg_index(&self, name: &str) -> Result<usize, SimulatorError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| SimulatorError::UnknownRegister(name.to_owned()))
    }

    fn reg_by_code(&self, code: &str) -> Result<usize, SimulatorError> {
        self.by_code
            .get(code)
            .copied()
            .ok_or_else(|| SimulatorError::UnknownRegister(code.to_owned()))
    }

    fn reg_word(&self, name: &str) -> Result<Word, SimulatorError> {
        Ok(self.registers[self.reg_index(name)?].word())
    }

    fn set_reg_word(&mut self, name: &str, value: Word) -> Result<(), SimulatorError> {
        let index = self.reg_index(name)?;
        self.registers[index].write_word(value);
        Ok(())
    }

    fn write_result(
        &mut self,
        dest: &Destination,
        tos_push: bool,
        value: &BitStr,
    ) -> Result<(), SimulatorError> {
        match dest {
            Destination::Memory(byte) => {
                self.data_memory.borrow_mut().write(byte * 8, value)?;
                if tos_push {
                    self.set_reg_word("TOS", (*byte + 2) as Word)?;
                }
            }
            Destination::Register(index) => self.registers[*index].write(value)?,
            Destination::Port(_) | Destination::None => {}
        }
        Ok(())
    }

    // -- observable state --------------------------------------------------

    pub fn isa(&self) -> Isa {
        self.isa
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn io(&self) -> IoMode {
        self.io
    }

    /// The machine is halted once the fetched instruction's opcode bits are
    /// all zero, whatever the remaining operand bits hold.
    pub fn is_halted(&self) -> bool {
        !self.instruction.is_empty() && self.opcode.not_any()
    }

    pub fn is_waiting_for_input(&self) -> bool {
        self.pending_input.is_some()
    }

    /// The raw bits of the instruction about to execute.
    pub fn instruction_bits(&self) -> String {
        bits::render(&self.instruction)
    }

    /// Registers in table declaration order.
    pub fn registers(&self) -> impl Iterator<Item = &Register> {
        self.registers.iter()
    }

    pub fn register_value(&self, name: &str) -> Option<Word> {
        self.by_name.get(name).map(|&i| self.registers[i].word())
    }

    pub fn register_hex(&self, name: &str) -> Option<String> {
        self.by_name.get(name).map(|&i| self.registers[i].to_hex())
    }

    pub fn flags(&self) -> Flags {
        match self.by_name.get("FR") {
            Some(&i) => {
                let fr = &self.registers[i];
                Flags {
                    carry: fr.bit(CF_BIT),
                    zero: fr.bit(ZF_BIT),
                    overflow: fr.bit(OF_BIT),
                    sign: fr.bit(SF_BIT),
                }
            }
            None => Flags::default(),
        }
    }

    pub fn memory_hex(&self) -> String {
        self.data_memory.borrow().to_hex()
    }

    pub fn program_memory_hex(&self) -> String {
        self.program_memory.borrow().to_hex()
    }

    /// Concatenated output of all devices, in port order.
    pub fn output(&self) -> String {
        let mut ports: Vec<_> = self.ports.iter().collect();
        ports.sort_by_key(|(port, _)| **port);
        ports.iter().map(|(_, shell)| shell.to_string()).collect()
    }

    // -- manual edits between steps ----------------------------------------

    /// Overwrites a register by name. Intended for presenters editing state
    /// between steps; widths are preserved by construction.
    pub fn write_register(&mut self, name: &str, value: Word) -> Result<(), SimulatorError> {
        self.set_reg_word(name, value)
    }

    /// Overwrites the four flag bits.
    pub fn write_flags(&mut self, flags: Flags) -> Result<(), SimulatorError> {
        let index = self.reg_index("FR")?;
        let fr = &mut self.registers[index];
        fr.set_bit(CF_BIT, flags.carry);
        fr.set_bit(ZF_BIT, flags.zero);
        fr.set_bit(OF_BIT, flags.overflow);
        fr.set_bit(SF_BIT, flags.sign);
        Ok(())
    }
}
