use super::*;
use crate::bits;
use crate::constants::{CF_BIT, OF_BIT, SF_BIT, ZF_BIT};


fn flag_register() -> Register {
    Register::new("FR", false)
}

fn flags_of(fr: &Register) -> (bool, bool, bool, bool) {
    (fr.bit(CF_BIT), fr.bit(ZF_BIT), fr.bit(OF_BIT), fr.bit(SF_BIT))
}

#[test]
fn signed_encoding_round_trip() {
    for value in -63i64..=63 {
        let encoded = bits::encode_signed(value, 7);
        assert_eq!(bits::decode_signed(encoded, 7), value);
    }
}

#[test]
fn strict_immediate_range() {
    assert!(bits::fits_signed(63, 7));
    assert!(bits::fits_signed(-63, 7));
    assert!(!bits::fits_signed(64, 7));
    assert!(!bits::fits_signed(-64, 7));
}

#[test]
fn bit_text_round_trip() {
    let text = "100101110";
    let parsed = bits::from_text(text).unwrap();
    assert_eq!(bits::render(&parsed), text);
    assert!(bits::from_text("10x1").is_none());
}

#[test]
fn signed_interpretation_uses_own_width() {
    let minus_one = bits::from_text("1111111").unwrap();
    assert_eq!(bits::to_signed(&minus_one), -1);
    let five = bits::from_text("0000101").unwrap();
    assert_eq!(bits::to_signed(&five), 5);
}

#[test]
fn sign_extension_copies_msb() {
    let negative = bits::from_text("1100").unwrap();
    assert_eq!(bits::render(&bits::sign_extend(&negative, 8)), "11111100");
    let positive = bits::from_text("0100").unwrap();
    assert_eq!(bits::render(&bits::sign_extend(&positive, 8)), "00000100");
}

#[test]
fn hex_rendering() {
    assert_eq!(bits::to_hex(&bits::word_bits(0x0A0B)), "0a0b");
    assert_eq!(bits::to_hex(&bits::word_bits(0)), "0000");
}

#[test]
fn memory_round_trip_unaligned() {
    let mut memory = Memory::new(4);
    let value = bits::from_text("101").unwrap();
    memory.write(3, &value).unwrap();
    assert_eq!(bits::render(&memory.read(3, 6).unwrap()), "101");
    assert_eq!(memory.len_bits(), 32);
}

#[test]
fn memory_rejects_out_of_range() {
    let mut memory = Memory::new(4);
    let value = bits::from_text("101").unwrap();
    assert!(matches!(
        memory.write(30, &value),
        Err(SimulatorError::MemoryOutOfRange { .. })
    ));
    assert!(matches!(
        memory.read(0, 33),
        Err(SimulatorError::MemoryOutOfRange { .. })
    ));
}

#[test]
fn register_pads_narrow_writes() {
    let mut register = Register::new("R00", true);
    register.write(&bits::from_text("101").unwrap()).unwrap();
    assert_eq!(register.word(), 5);
    assert_eq!(register.to_hex(), "0005");
}

#[test]
fn register_rejects_wide_writes() {
    let mut register = Register::new("R00", true);
    let wide = bits::zeroes(17);
    assert!(matches!(
        register.write(&wide),
        Err(SimulatorError::RegisterOverflow { .. })
    ));
}

#[test]
fn alu_add_carry_and_zero() {
    let mut fr = flag_register();
    let result = crate::alu::apply(
        crate::alu::AluOp::Add,
        &[bits::word_bits(0xFFFF), bits::word_bits(1)],
        &mut fr,
    )
    .unwrap();
    assert_eq!(bits::to_word(&result), 0);
    assert_eq!(flags_of(&fr), (true, true, false, false));
}

#[test]
fn alu_add_signed_overflow() {
    let mut fr = flag_register();
    let result = crate::alu::apply(
        crate::alu::AluOp::Add,
        &[bits::word_bits(0x7FFF), bits::word_bits(1)],
        &mut fr,
    )
    .unwrap();
    assert_eq!(bits::to_word(&result), 0x8000);
    assert_eq!(flags_of(&fr), (false, false, true, true));
}

#[test]
fn alu_sub_borrow() {
    let mut fr = flag_register();
    let result = crate::alu::apply(
        crate::alu::AluOp::Sub,
        &[bits::word_bits(0), bits::word_bits(1)],
        &mut fr,
    )
    .unwrap();
    assert_eq!(bits::to_word(&result), 0xFFFF);
    let (carry, zero, _, sign) = flags_of(&fr);
    assert!(carry && !zero && sign);
}

#[test]
fn alu_cmp_flags() {
    // cmp a, b with a == b: zero set.
    let mut fr = flag_register();
    crate::alu::apply(
        crate::alu::AluOp::Cmp,
        &[bits::word_bits(7), bits::word_bits(7)],
        &mut fr,
    )
    .unwrap();
    let (_, zero, _, _) = flags_of(&fr);
    assert!(zero);

    // 1 > -1 signed: sign == overflow, zero clear.
    let mut fr = flag_register();
    crate::alu::apply(
        crate::alu::AluOp::Cmp,
        &[bits::word_bits(1), bits::word_bits(0xFFFF)],
        &mut fr,
    )
    .unwrap();
    let (_, zero, overflow, sign) = flags_of(&fr);
    assert!(!zero && sign == overflow);

    // -1 < 1 signed: sign != overflow.
    let mut fr = flag_register();
    crate::alu::apply(
        crate::alu::AluOp::Cmp,
        &[bits::word_bits(0xFFFF), bits::word_bits(1)],
        &mut fr,
    )
    .unwrap();
    let (_, _, overflow, sign) = flags_of(&fr);
    assert_ne!(sign, overflow);
}

#[test]
fn alu_cmp_returns_flag_state() {
    let mut fr = flag_register();
    let result = crate::alu::apply(
        crate::alu::AluOp::Cmp,
        &[bits::word_bits(3), bits::word_bits(3)],
        &mut fr,
    )
    .unwrap();
    assert_eq!(bits::render(&result), bits::render(fr.state()));
}

#[test]
fn alu_division_by_zero() {
    let mut fr = flag_register();
    assert!(matches!(
        crate::alu::apply(
            crate::alu::AluOp::Div,
            &[bits::word_bits(5), bits::word_bits(0)],
            &mut fr,
        ),
        Err(SimulatorError::DivisionByZero)
    ));
}

#[test]
fn alu_mov_sign_extends_narrow_operands() {
    let mut fr = flag_register();
    let result = crate::alu::apply(
        crate::alu::AluOp::Mov,
        &[bits::word_bits(0), bits::from_text("1111111").unwrap()],
        &mut fr,
    )
    .unwrap();
    assert_eq!(bits::to_word(&result), 0xFFFF);
}

#[test]
fn alu_byte_moves() {
    let mut fr = flag_register();
    let result = crate::alu::apply(
        crate::alu::AluOp::MovLow,
        &[bits::word_bits(0x1234), bits::word_bits(0x00AB)],
        &mut fr,
    )
    .unwrap();
    assert_eq!(bits::to_word(&result), 0x12AB);

    let result = crate::alu::apply(
        crate::alu::AluOp::MovHigh,
        &[bits::word_bits(0x1234), bits::word_bits(0x00AB)],
        &mut fr,
    )
    .unwrap();
    assert_eq!(bits::to_word(&result), 0xAB34);
}

#[test]
fn alu_multiply_truncation() {
    let mut fr = flag_register();
    let result = crate::alu::apply(
        crate::alu::AluOp::Mul,
        &[bits::word_bits(0x4000), bits::word_bits(4)],
        &mut fr,
    )
    .unwrap();
    assert_eq!(bits::to_word(&result), 0);
    let (carry, _, overflow, _) = flags_of(&fr);
    assert!(carry && overflow);
}

#[test]
fn tables_load_for_every_isa() {
    for &isa in Isa::ALL.iter() {
        let set = InstructionSet::load(isa);
        assert!(set.entries().count() > 0);
        for (opcode, entry) in set.entries() {
            assert_eq!(opcode.len(), isa.opcode_bits(), "{} {}", isa, opcode);
            assert!(!entry.mnemonic.is_empty());
        }
        assert!(set.register_code("FR").is_some());
        for register in set.registers() {
            assert_eq!(register.code.len(), crate::constants::REG_CODE_WIDTH);
        }
    }
}

#[test]
fn risc_mov_is_overloaded() {
    let set = InstructionSet::load(Isa::Risc);
    assert_eq!(set.encodings("mov").len(), 4);
    assert_eq!(set.encodings("mov_low").len(), 2);
}

#[test]
fn cisc_styles_match_operand_shapes() {
    let set = InstructionSet::load(Isa::Cisc);
    for (opcode, entry) in set.entries() {
        if entry.category == Category::Halt {
            continue;
        }
        let style = bits::from_text(&opcode[..3]).unwrap();
        let (reg_count, imm_count) = crate::isa::cisc_style(&style).unwrap();
        let mut regs = 0;
        let mut imms = 0;
        for operand in &entry.operands {
            match operand {
                Operand::Reg | Operand::MemReg | Operand::SimdReg => regs += 1,
                Operand::RegOff | Operand::MemRegOff => {
                    regs += 1;
                    imms += 1;
                }
                Operand::Imm(_) | Operand::MemImm => imms += 1,
                _ => {}
            }
        }
        assert_eq!((regs, imms), (reg_count, imm_count), "opcode {}", opcode);
    }
}

#[test]
fn stack_long_immediate_flag_matches_msb() {
    // Stack and accumulator opcodes with the high bit set take a long
    // immediate; their operand lists must agree.
    for &isa in [Isa::Stack, Isa::Accumulator].iter() {
        let set = InstructionSet::load(isa);
        for (opcode, entry) in set.entries() {
            let takes_imm = entry
                .operands
                .iter()
                .any(|o| matches!(o, Operand::Imm(_) | Operand::MemImm));
            assert_eq!(
                opcode.starts_with('1'),
                takes_imm,
                "{} opcode {}",
                isa,
                opcode
            );
        }
    }
}

#[test]
fn isa_names_and_aliases() {
    assert_eq!("RISC3".parse::<Isa>().unwrap(), Isa::Risc);
    assert_eq!("risc1".parse::<Isa>().unwrap(), Isa::Stack);
    assert_eq!("Risc2".parse::<Isa>().unwrap(), Isa::Accumulator);
    assert_eq!("cisc".parse::<Isa>().unwrap(), Isa::Cisc);
    assert_eq!("accumulator".parse::<Isa>().unwrap(), Isa::Accumulator);
    assert!("vliw".parse::<Isa>().is_err());
}
