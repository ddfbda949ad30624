//! The execute engine: operand assembly, destination resolution and the
//! per-category handlers.

use std::convert::TryFrom;

use super::{Cpu, Destination, PendingInput};
use crate::alu::{self, AluOp};
use crate::bits::{self, Bits};
use crate::constants::{REG_CODE_WIDTH, SIMD_LANES, WORD_WIDTH};
use crate::error::SimulatorError;
use crate::isa::{Category, IoMode, Isa, OpcodeEntry, Operand};
use crate::Word;

impl Cpu {
    /// Runs one decoded instruction. Returns whether the instruction pointer
    /// should auto-advance afterwards (control transfers move it themselves).
    pub(super) fn execute(&mut self, entry: &OpcodeEntry) -> Result<bool, SimulatorError> {
        if matches!(entry.category, Category::Out | Category::In) && self.io() == IoMode::Mmio {
            return Err(SimulatorError::IllegalInstructionInMode { mode: "mmio" });
        }

        let start = self.operand_start(entry);
        let mut cursor = start;
        let values = self.operand_values(&mut cursor, &entry.operands)?;
        let (dest, tos_push) = self.result_destination(start, entry)?;

        match entry.category {
            Category::Nop | Category::Halt => Ok(true),

            Category::Call => {
                let next = self.pp() + 1;
                if self.isa() == Isa::Risc {
                    self.set_reg_word("LR", next as Word)?;
                } else {
                    self.push_stack(&bits::word_bits(next as Word))?;
                }
                let delta = bits::to_signed(values.first().ok_or_else(|| self.malformed())?);
                self.jump_by(delta)?;
                Ok(false)
            }

            Category::Ret => {
                let return_point = if self.isa() == Isa::Risc {
                    i64::from(self.reg_word("LR")?)
                } else {
                    i64::from(bits::to_word(&self.pop_stack()?))
                };
                let delta = return_point - self.pp();
                self.jump_by(delta)?;
                Ok(false)
            }

            Category::Jmp => self.conditional_jump(entry, &values),

            Category::Enter => {
                let frame = i64::from(bits::to_word(
                    values.first().ok_or_else(|| self.malformed())?,
                ));
                let saved = self.registers[self.reg_index("BP")?].state().to_bitvec();
                self.push_stack(&saved)?;
                let sp = self.reg_word("SP")?;
                self.set_reg_word("BP", sp)?;
                let new_sp = i64::from(sp) - frame;
                let new_sp =
                    u16::try_from(new_sp).map_err(|_| SimulatorError::StackUnderflow)?;
                self.set_reg_word("SP", new_sp)?;
                Ok(true)
            }

            Category::Leave => {
                let bp = self.reg_word("BP")?;
                self.set_reg_word("SP", bp)?;
                let saved = self.pop_stack()?;
                let index = self.reg_index("BP")?;
                self.registers[index].write(&saved)?;
                Ok(true)
            }

            Category::StackPush => {
                let value = values.first().cloned().ok_or_else(|| self.malformed())?;
                self.push_stack(&value)?;
                Ok(true)
            }

            Category::StackPop | Category::StackPopF => {
                let value = self.pop_stack()?;
                self.write_result(&dest, tos_push, &value)?;
                Ok(true)
            }

            Category::Out => {
                let value = values.last().cloned().ok_or_else(|| self.malformed())?;
                let port = match dest {
                    Destination::Port(port) => port,
                    _ => return Err(self.malformed()),
                };
                self.ports
                    .get_mut(&port)
                    .ok_or(SimulatorError::UnknownPort(port))?
                    .out_shell(&value);
                Ok(true)
            }

            Category::In => {
                log::debug!("suspended waiting for input");
                self.pending_input = Some(PendingInput { dest, tos_push });
                Ok(true)
            }

            Category::Swap => {
                let byte = match dest {
                    Destination::Memory(byte) => byte,
                    _ => return Err(self.malformed()),
                };
                let top = values.first().cloned().ok_or_else(|| self.malformed())?;
                let second = values.get(1).cloned().ok_or_else(|| self.malformed())?;
                {
                    let mut memory = self.data_memory.borrow_mut();
                    memory.write(byte * 8, &top)?;
                    memory.write(byte * 8 + WORD_WIDTH, &second)?;
                }
                self.set_reg_word("TOS", (byte + 4) as Word)?;
                Ok(true)
            }

            Category::Simd => {
                // The scalar ALU function is the mnemonic with its trailing
                // vector marker stripped.
                let scalar_name = &entry.mnemonic[..entry.mnemonic.len() - 1];
                let op = AluOp::for_mnemonic(scalar_name).ok_or_else(|| self.malformed())?;
                let vector = values.first().cloned().ok_or_else(|| self.malformed())?;
                let operand = values.last().cloned().ok_or_else(|| self.malformed())?;
                if vector.len() < SIMD_LANES * WORD_WIDTH {
                    return Err(self.malformed());
                }
                let fr = self.reg_index("FR")?;
                let mut result = Bits::new();
                for lane in 0..SIMD_LANES {
                    let slice = vector[lane * WORD_WIDTH..(lane + 1) * WORD_WIDTH].to_bitvec();
                    let lane_result =
                        alu::apply(op, &[slice, operand.clone()], &mut self.registers[fr])?;
                    result.extend_from_bitslice(&lane_result);
                }
                self.write_result(&dest, tos_push, &result)?;
                Ok(true)
            }

            Category::SimdLoad => {
                let vector = values.first().cloned().ok_or_else(|| self.malformed())?;
                if vector.len() < SIMD_LANES * WORD_WIDTH {
                    return Err(self.malformed());
                }
                for lane in 0..SIMD_LANES {
                    let index = self.reg_index(&format!("R{:02}", lane))?;
                    self.registers[index]
                        .write(&vector[lane * WORD_WIDTH..(lane + 1) * WORD_WIDTH])?;
                }
                Ok(true)
            }

            Category::SimdStore => {
                let mut gathered = Bits::new();
                for lane in 0..SIMD_LANES {
                    let index = self.reg_index(&format!("R{:02}", lane))?;
                    gathered.extend_from_bitslice(self.registers[index].state());
                }
                self.write_result(&dest, tos_push, &gathered)?;
                Ok(true)
            }

            // Everything else is an ALU operation whose category only named
            // the destination.
            _ => {
                let op =
                    AluOp::for_mnemonic(&entry.mnemonic).ok_or_else(|| self.malformed())?;
                let fr = self.reg_index("FR")?;
                let result = alu::apply(op, &values, &mut self.registers[fr])?;
                self.write_result(&dest, tos_push, &result)?;
                Ok(true)
            }
        }
    }

    fn conditional_jump(
        &mut self,
        entry: &OpcodeEntry,
        values: &[Bits],
    ) -> Result<bool, SimulatorError> {
        let flags = self.flags();
        let should_jump = match entry.mnemonic.as_str() {
            "jmp" => true,
            "jc" => values
                .first()
                .map_or(false, |v| v.len() == WORD_WIDTH && v.all()),
            "je" => flags.zero,
            "jne" => !flags.zero,
            "jg" => flags.sign == flags.overflow && !flags.zero,
            "jge" => flags.sign == flags.overflow,
            "jl" => flags.sign != flags.overflow,
            "jle" => flags.sign != flags.overflow || flags.zero,
            _ => false,
        };
        if !should_jump {
            log::debug!("{}: condition not met", entry.mnemonic);
            return Ok(true);
        }

        let delta = match self.isa() {
            Isa::Risc | Isa::Cisc => {
                bits::to_signed(values.first().ok_or_else(|| self.malformed())?)
            }
            Isa::Stack | Isa::Accumulator => {
                // The target is on the operand stack for stack-flavoured
                // aliases, otherwise it is the long immediate.
                let from_values = matches!(
                    entry.operands.last(),
                    Some(Operand::Tos)
                        | Some(Operand::Tos2)
                        | Some(Operand::TosPop)
                        | Some(Operand::Acc)
                        | Some(Operand::RegOff)
                );
                if from_values {
                    bits::to_signed(values.last().ok_or_else(|| self.malformed())?)
                } else {
                    bits::to_signed(
                        self.long_immediate_result
                            .as_ref()
                            .ok_or_else(|| self.malformed())?,
                    )
                }
            }
        };
        self.jump_by(delta)?;
        Ok(false)
    }

    /// Moves `IP` by `delta` instructions, converting to bytes through the
    /// per-instruction size list recorded at load time.
    fn jump_by(&mut self, delta: i64) -> Result<(), SimulatorError> {
        let distance = self.instruction_span(self.pp(), delta);
        let ip = i64::from(self.reg_word("IP")?) + distance;
        let ip = u16::try_from(ip).map_err(|_| SimulatorError::MemoryOutOfRange {
            start: 0,
            end: 0,
            size: self.data_memory.borrow().len_bits(),
        })?;
        self.set_reg_word("IP", ip)?;
        self.program_pointer += delta;
        log::debug!("jump: {} instructions, {} bytes", delta, distance);
        Ok(())
    }

    /// Byte distance covered by `delta` instructions starting at instruction
    /// `from`; negative deltas measure backwards.
    fn instruction_span(&self, from: i64, delta: i64) -> i64 {
        let len = self.instr_sizes.len() as i64;
        let clamp = |v: i64| v.max(0).min(len) as usize;
        if delta >= 0 {
            self.instr_sizes[clamp(from)..clamp(from + delta)]
                .iter()
                .map(|&s| s as i64)
                .sum()
        } else {
            -self.instr_sizes[clamp(from + delta)..clamp(from)]
                .iter()
                .map(|&s| s as i64)
                .sum::<i64>()
        }
    }

    fn pp(&self) -> i64 {
        self.program_pointer
    }

    fn malformed(&self) -> SimulatorError {
        SimulatorError::UnknownOpcode {
            opcode: bits::render(&self.opcode),
        }
    }

    /// Bit offset where inline operands start. Only the RISC machine encodes
    /// operands inside the instruction word; its `mov_low`/`mov_high` carry
    /// a 5-bit opcode, everything else a 6-bit one.
    fn operand_start(&self, entry: &OpcodeEntry) -> usize {
        match self.isa() {
            Isa::Risc => {
                if entry.mnemonic == "mov_low" || entry.mnemonic == "mov_high" {
                    5
                } else {
                    self.isa().opcode_bits()
                }
            }
            _ => 0,
        }
    }

    /// A register code for an inline (RISC) or long-pack (CISC) operand.
    fn take_reg_code(&mut self, cursor: &mut usize) -> Result<String, SimulatorError> {
        if self.isa() == Isa::Cisc {
            self.long_registers.pop().ok_or_else(|| self.malformed())
        } else {
            if *cursor + REG_CODE_WIDTH > self.instruction.len() {
                return Err(self.malformed());
            }
            let code = bits::render(&self.instruction[*cursor..*cursor + REG_CODE_WIDTH]);
            *cursor += REG_CODE_WIDTH;
            Ok(code)
        }
    }

    fn pop_long_immediate(&mut self) -> Result<Bits, SimulatorError> {
        self.long_immediates.pop().ok_or_else(|| self.malformed())
    }

    /// Walks the operand alias list and collects the 16-bit (or, for SIMD
    /// vectors, 64-bit) values the handler will consume.
    fn operand_values(
        &mut self,
        cursor: &mut usize,
        aliases: &[Operand],
    ) -> Result<Vec<Bits>, SimulatorError> {
        let mut values = Vec::with_capacity(aliases.len());
        for alias in aliases {
            match alias {
                Operand::Reg => {
                    let code = self.take_reg_code(cursor)?;
                    let index = self.reg_by_code(&code)?;
                    values.push(self.registers[index].state().to_bitvec());
                }

                Operand::RegOff => {
                    let code = self.long_registers.pop().ok_or_else(|| self.malformed())?;
                    let index = self.reg_by_code(&code)?;
                    let base = bits::to_signed(self.registers[index].state());
                    let offset = bits::to_signed(&self.pop_long_immediate()?);
                    values.push(bits::from_unsigned(
                        bits::encode_signed(base + offset, WORD_WIDTH),
                        WORD_WIDTH,
                    ));
                }

                Operand::MemReg | Operand::SimdReg => {
                    let code = self.take_reg_code(cursor)?;
                    let index = self.reg_by_code(&code)?;
                    let addr = self.registers[index].word() as usize * 8;
                    let width = match alias {
                        Operand::SimdReg => SIMD_LANES * WORD_WIDTH,
                        _ => WORD_WIDTH,
                    };
                    values.push(self.data_memory.borrow().read(addr, addr + width)?);
                }

                Operand::MemRegOff => {
                    let code = self.long_registers.pop().ok_or_else(|| self.malformed())?;
                    let index = self.reg_by_code(&code)?;
                    let base = bits::to_signed(self.registers[index].state());
                    let offset = bits::to_signed(&self.pop_long_immediate()?);
                    let byte = self.byte_address(base + offset)?;
                    values.push(
                        self.data_memory
                            .borrow()
                            .read(byte * 8, byte * 8 + WORD_WIDTH)?,
                    );
                }

                Operand::Imm(width) => {
                    if self.isa() == Isa::Risc {
                        if *cursor + width > self.instruction.len() {
                            return Err(self.malformed());
                        }
                        values.push(self.instruction[*cursor..*cursor + width].to_bitvec());
                        *cursor += width;
                    } else {
                        values.push(self.pop_long_immediate()?);
                    }
                }

                Operand::Tos => values.push(self.pop_tos(false, false)?),
                Operand::Tos2 => values.push(self.pop_tos(true, false)?),
                Operand::TosPop => values.push(self.pop_tos(false, true)?),

                Operand::MemTos => {
                    let addr = bits::to_unsigned(&self.pop_tos(false, true)?) as usize * 8;
                    values.push(self.data_memory.borrow().read(addr, addr + WORD_WIDTH)?);
                }

                Operand::MemIr => {
                    let addr = self.reg_word("IR")? as usize * 8;
                    values.push(self.data_memory.borrow().read(addr, addr + WORD_WIDTH)?);
                }

                Operand::MemImm => {
                    let imm = self
                        .long_immediate_result
                        .clone()
                        .ok_or_else(|| self.malformed())?;
                    let addr = bits::to_unsigned(&imm) as usize * 8;
                    values.push(self.data_memory.borrow().read(addr, addr + WORD_WIDTH)?);
                }

                Operand::Fr => values.push(self.registers[self.reg_index("FR")?].state().to_bitvec()),
                Operand::Ir => values.push(self.registers[self.reg_index("IR")?].state().to_bitvec()),
                Operand::Acc => {
                    values.push(self.registers[self.reg_index("ACC")?].state().to_bitvec())
                }

                Operand::One => values.push(bits::word_bits(1)),
            }
        }
        Ok(values)
    }

    fn byte_address(&self, byte: i64) -> Result<usize, SimulatorError> {
        usize::try_from(byte).map_err(|_| SimulatorError::MemoryOutOfRange {
            start: 0,
            end: 0,
            size: self.data_memory.borrow().len_bits(),
        })
    }

    /// Resolves where the result of this instruction is written, and whether
    /// the write pushes the register stack (advancing `TOS` afterwards).
    fn result_destination(
        &mut self,
        start: usize,
        entry: &OpcodeEntry,
    ) -> Result<(Destination, bool), SimulatorError> {
        let dest = match self.isa() {
            Isa::Stack => match entry.category {
                Category::Tos | Category::In | Category::Swap | Category::StackPop => {
                    let tos = self.reg_word("TOS")? as usize;
                    return Ok((Destination::Memory(tos), true));
                }
                Category::MemTos => {
                    let addr = bits::to_unsigned(&self.pop_tos(false, true)?) as usize;
                    Destination::Memory(addr)
                }
                Category::Fr | Category::StackPopF | Category::Cmp => {
                    Destination::Register(self.reg_index("FR")?)
                }
                Category::Out => Destination::Port(self.port_from_long_immediate()?),
                _ => Destination::None,
            },

            Isa::Accumulator => match entry.category {
                Category::Acc | Category::In => Destination::Register(self.reg_index("ACC")?),
                Category::StackPop => {
                    let name = match entry.operands.first() {
                        Some(Operand::Ir) => "IR",
                        Some(Operand::Fr) => "FR",
                        _ => "ACC",
                    };
                    Destination::Register(self.reg_index(name)?)
                }
                Category::MemIr => Destination::Memory(self.reg_word("IR")? as usize),
                Category::Out => Destination::Port(self.port_from_long_immediate()?),
                Category::Cmp | Category::Fr | Category::StackPopF => {
                    Destination::Register(self.reg_index("FR")?)
                }
                Category::Ir => Destination::Register(self.reg_index("IR")?),
                _ => Destination::None,
            },

            Isa::Risc | Isa::Cisc => match entry.category {
                Category::FirstOp
                | Category::In
                | Category::StackPop
                | Category::Simd
                | Category::SimdStore => {
                    let code = if self.isa() == Isa::Cisc {
                        self.long_register_result
                            .clone()
                            .ok_or_else(|| self.malformed())?
                    } else {
                        if start + REG_CODE_WIDTH > self.instruction.len() {
                            return Err(self.malformed());
                        }
                        bits::render(&self.instruction[start..start + REG_CODE_WIDTH])
                    };
                    let index = self.reg_by_code(&code)?;
                    match entry.operands.first() {
                        Some(Operand::Reg) => Destination::Register(index),
                        Some(Operand::MemReg) | Some(Operand::SimdReg) => {
                            Destination::Memory(self.registers[index].word() as usize)
                        }
                        Some(Operand::MemRegOff) => {
                            let offset = bits::to_signed(
                                self.long_immediate_result
                                    .as_ref()
                                    .ok_or_else(|| self.malformed())?,
                            );
                            let base = i64::from(self.registers[index].word());
                            Destination::Memory(self.byte_address(base + offset)?)
                        }
                        _ => Destination::None,
                    }
                }
                Category::Flags | Category::StackPopF => {
                    Destination::Register(self.reg_index("FR")?)
                }
                Category::Out => {
                    let port = if self.isa() == Isa::Cisc {
                        self.port_from_long_immediate()?
                    } else {
                        match entry.operands.first() {
                            Some(Operand::Imm(width)) => {
                                if start + width > self.instruction.len() {
                                    return Err(self.malformed());
                                }
                                bits::to_word(&self.instruction[start..start + width])
                            }
                            _ => return Err(self.malformed()),
                        }
                    };
                    Destination::Port(port)
                }
                _ => Destination::None,
            },
        };
        Ok((dest, false))
    }

    fn port_from_long_immediate(&self) -> Result<u16, SimulatorError> {
        let imm = self
            .long_immediate_result
            .as_ref()
            .ok_or_else(|| self.malformed())?;
        Ok(bits::to_word(imm))
    }
}
