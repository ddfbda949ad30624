use super::*;
use matches::assert_matches;
use simcpu::{Architecture, Cpu, IoMode};

fn run_on(isa: Isa, io: IoMode, source: &str) -> Cpu {
    let listing = assemble(isa, source).unwrap();
    let mut cpu = Cpu::new(isa, Architecture::Neumann, io, &listing).unwrap();
    cpu.run(1000).unwrap();
    cpu
}

fn run(isa: Isa, source: &str) -> Cpu {
    run_on(isa, IoMode::Special, source)
}

fn mem_word(cpu: &Cpu, byte: usize) -> String {
    cpu.memory_hex()[byte * 2..byte * 2 + 4].to_owned()
}

// -- encodings -------------------------------------------------------------

#[test]
fn encodes_immediate_move() {
    assert_eq!(
        assemble(Isa::Risc, "mov %R00, $5").unwrap(),
        "0000111000000101\n"
    );
}

#[test]
fn encodes_register_move() {
    assert_eq!(
        assemble(Isa::Risc, "mov %R00, %R01").unwrap(),
        "0000101001010000\n"
    );
}

#[test]
fn trailing_comma_on_final_operand_is_tolerated() {
    assert_eq!(
        assemble(Isa::Risc, "mov %R00, $5,").unwrap(),
        assemble(Isa::Risc, "mov %R00, $5").unwrap()
    );
}

#[test]
fn blank_lines_are_preserved() {
    let listing = assemble(Isa::Risc, "nop\n\nnop").unwrap();
    assert_eq!(listing, "0000010000000000\n\n0000010000000000\n");
}

#[test]
fn missing_comma_is_rejected() {
    assert_matches!(
        assemble(Isa::Risc, "add %R00 %R01"),
        Err(AssemblerError::MissingComma(_))
    );
}

#[test]
fn unknown_mnemonic_is_rejected() {
    assert_matches!(
        assemble(Isa::Risc, "frobnicate %R00,"),
        Err(AssemblerError::UnknownMnemonic(_))
    );
}

#[test]
fn invalid_register_is_rejected() {
    assert_matches!(
        assemble(Isa::Risc, "mov %R00, R01"),
        Err(AssemblerError::InvalidOperand(_))
    );
}

#[test]
fn operand_count_must_match() {
    assert_matches!(
        assemble(Isa::Risc, "add %R00"),
        Err(AssemblerError::InvalidOperand(_))
    );
}

#[test]
fn immediate_bounds_are_strict() {
    // A 10-bit field admits neither -512 nor +512.
    assert_matches!(
        assemble(Isa::Risc, "jmp $512"),
        Err(AssemblerError::ImmediateOutOfRange(512))
    );
    assert_matches!(
        assemble(Isa::Risc, "jmp $-512"),
        Err(AssemblerError::ImmediateOutOfRange(-512))
    );
    assert!(assemble(Isa::Risc, "jmp $511").is_ok());
    assert!(assemble(Isa::Risc, "jmp $-511").is_ok());
}

#[test]
fn stack_long_immediates_follow_the_opcode() {
    assert_eq!(
        assemble(Isa::Stack, "push $4").unwrap(),
        "100000000000000100\n"
    );
}

#[test]
fn cisc_packs_register_codes_into_one_byte() {
    assert_eq!(
        assemble(Isa::Cisc, "mov %R00, %R01").unwrap(),
        "0110000010010100\n"
    );
    assert_eq!(
        assemble(Isa::Cisc, "enter $4").unwrap(),
        "010000000000000000000100\n"
    );
    assert_eq!(
        assemble(Isa::Cisc, "mov %R00, $5").unwrap(),
        "10000000100000000000000000000101\n"
    );
}

#[test]
fn cisc_register_offset_operands() {
    assert_eq!(
        assemble(Isa::Cisc, "mov %R00, [%R01+$2]").unwrap(),
        "10100000100101000000000000000010\n"
    );
}

#[test]
fn hex_listing_matches_binary() {
    assert_eq!(assemble_hex(Isa::Risc, "mov %R00, $5").unwrap(), "0xe05");
}

#[test]
fn assembled_opcodes_decode_to_their_mnemonic() {
    let programs = [
        (Isa::Risc, "mov %R00, $5"),
        (Isa::Risc, "mov_low %R00, $7"),
        (Isa::Risc, "call $3"),
        (Isa::Stack, "push $4"),
        (Isa::Accumulator, "load $65"),
        (Isa::Cisc, "enter $4"),
    ];
    for &(isa, source) in programs.iter() {
        let set = InstructionSet::load(isa);
        let listing = assemble(isa, source).unwrap();
        let line = listing.lines().next().unwrap();
        let opcode = &line[..isa.opcode_bits()];
        let mnemonic = source.split(' ').next().unwrap();
        assert_eq!(set.entry(opcode).unwrap().mnemonic, mnemonic);
    }
}

// -- end-to-end scenarios --------------------------------------------------

#[test]
fn scenario_move_add() {
    let cpu = run(Isa::Risc, "mov %R00, $5\nmov %R01, $7\nadd %R00, %R01");
    assert!(cpu.is_halted());
    assert_eq!(cpu.register_value("R00"), Some(0x000C));
    let flags = cpu.flags();
    assert!(!flags.zero && !flags.sign);
}

#[test]
fn scenario_signed_compare_and_jump() {
    let source = "mov %R00, $1\n\
                  mov %R01, $-1\n\
                  cmp %R00, %R01\n\
                  jg $2\n\
                  mov %R02, $0\n\
                  mov %R02, $1";
    let cpu = run(Isa::Risc, source);
    assert_eq!(cpu.register_value("R02"), Some(0x0001));
}

#[test]
fn scenario_call_and_ret() {
    let source = "call $3\n\
                  mov %R00, $9\n\
                  halt\n\
                  mov %R00, $3\n\
                  ret";
    let cpu = run(Isa::Risc, source);
    assert!(cpu.is_halted());
    assert_eq!(cpu.register_value("R00"), Some(0x0009));
}

#[test]
fn scenario_stack_push_add() {
    let cpu = run(Isa::Stack, "push $4\npush $6\nadd");
    assert_eq!(cpu.register_value("TOS"), Some(258));
    assert_eq!(mem_word(&cpu, 256), "000a");
}

#[test]
fn scenario_cisc_enter_leave() {
    let cpu = run(Isa::Cisc, "enter $4\nleave\nhalt");
    assert_eq!(cpu.register_value("SP"), Some(1024));
    assert_eq!(cpu.register_value("BP"), Some(1024));
    assert_eq!(mem_word(&cpu, 1022), "0400");
}

#[test]
fn scenario_port_io_echo() {
    let listing = assemble(Isa::Risc, "in %R00, $1\nout $1, %R00").unwrap();
    let mut cpu = Cpu::new(Isa::Risc, Architecture::Neumann, IoMode::Special, &listing).unwrap();
    cpu.run(10).unwrap();
    assert!(cpu.is_waiting_for_input());
    cpu.input_finish(0x0041).unwrap();
    cpu.run(10).unwrap();
    assert_eq!(cpu.output(), "A");
}

// -- further programs ------------------------------------------------------

#[test]
fn push_pop_round_trip() {
    let source = "mov %R00, $44\n\
                  push %R00\n\
                  mov %R00, $0\n\
                  pop %R01";
    let cpu = run(Isa::Risc, source);
    assert_eq!(cpu.register_value("R01"), Some(44));
    assert_eq!(cpu.register_value("SP"), Some(1024));
}

#[test]
fn popf_restores_flags_from_the_stack() {
    let source = "mov %R00, $15\n\
                  push %R00\n\
                  popf";
    let cpu = run(Isa::Risc, source);
    let flags = cpu.flags();
    assert!(flags.carry && flags.zero && flags.overflow && flags.sign);
}

#[test]
fn accumulator_index_register_round_trip() {
    let source = "mov_ir $300\n\
                  load $7\n\
                  store\n\
                  load $0\n\
                  load [$300]";
    let cpu = run(Isa::Accumulator, source);
    assert_eq!(cpu.register_value("ACC"), Some(7));
    assert_eq!(cpu.register_value("IR"), Some(300));
    assert_eq!(mem_word(&cpu, 300), "0007");
}

#[test]
fn accumulator_inc_and_out() {
    let cpu = run(Isa::Accumulator, "load $65\ninc\nout $1");
    assert_eq!(cpu.register_value("ACC"), Some(66));
    assert_eq!(cpu.output(), "B");
}

#[test]
fn stack_dup_and_store() {
    let cpu = run(Isa::Stack, "push $3\ndup\nadd");
    assert_eq!(mem_word(&cpu, 256), "0006");
}

#[test]
fn stack_store_pops_value_then_address() {
    // push the address first, the value second.
    let cpu = run(Isa::Stack, "push $100\npush $42\nstore");
    assert_eq!(mem_word(&cpu, 100), "002a");
    assert_eq!(cpu.register_value("TOS"), Some(256));
}

#[test]
fn cisc_lea_computes_an_address() {
    let source = "mov %R00, $200\n\
                  lea %R01, %R00+$4";
    let cpu = run(Isa::Cisc, source);
    assert_eq!(cpu.register_value("R01"), Some(204));
}

#[test]
fn accumulator_jc_jumps_on_all_ones() {
    let taken = run(
        Isa::Accumulator,
        "load $-1\njc $3\nload $1\nhalt\nload $5",
    );
    assert_eq!(taken.register_value("ACC"), Some(5));

    let not_taken = run(
        Isa::Accumulator,
        "load $0\njc $3\nload $1\nhalt\nload $5",
    );
    assert_eq!(not_taken.register_value("ACC"), Some(1));
}

#[test]
fn cisc_memory_offset_round_trip() {
    let source = "mov %R00, $200\n\
                  mov [%R00+$4], $99\n\
                  mov %R01, [%R00+$4]";
    let cpu = run(Isa::Cisc, source);
    assert_eq!(cpu.register_value("R01"), Some(99));
    assert_eq!(mem_word(&cpu, 204), "0063");
}
