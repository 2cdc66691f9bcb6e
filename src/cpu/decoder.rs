//! The Decoder: reads bytes at the current IP and produces a
//! `DecodedInstruction`. Never mutates machine state; never advances IP
//! (the Executor does that). Mirrors the progressive opcode
//! classification (full-byte, 7-bit, 6-bit, 4-bit prefixes) documented
//! for the supported 8086 subset, grounded on `sim8086_decoder.cpp`'s
//! `Decoder::Disasm` dispatch.

use crate::machine::{Machine, BYTE_REG_NAMES, WORD_REG_NAMES};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
	Mov,
	Add,
	Sub,
	Cmp,
	Test,
	Je,
	Jl,
	Jle,
	Jb,
	Jbe,
	Jp,
	Jo,
	Js,
	Jne,
	Jnl,
	Jnle,
	Jnb,
	Jnbe,
	Jnp,
	Jno,
	Jns,
	Loop,
	Loopz,
	Loopnz,
	Jcxz,
	Undefined,
}

impl Opcode {
	pub fn mnemonic(self) -> &'static str {
		match self {
			Opcode::Mov => "mov",
			Opcode::Add => "add",
			Opcode::Sub => "sub",
			Opcode::Cmp => "cmp",
			Opcode::Test => "test",
			Opcode::Je => "je",
			Opcode::Jl => "jl",
			Opcode::Jle => "jle",
			Opcode::Jb => "jb",
			Opcode::Jbe => "jbe",
			Opcode::Jp => "jp",
			Opcode::Jo => "jo",
			Opcode::Js => "js",
			Opcode::Jne => "jne",
			Opcode::Jnl => "jnl",
			Opcode::Jnle => "jnle",
			Opcode::Jnb => "jnb",
			Opcode::Jnbe => "jnbe",
			Opcode::Jnp => "jnp",
			Opcode::Jno => "jno",
			Opcode::Jns => "jns",
			Opcode::Loop => "loop",
			Opcode::Loopz => "loopz",
			Opcode::Loopnz => "loopnz",
			Opcode::Jcxz => "jcxz",
			Opcode::Undefined => "(undefined)",
		}
	}

	pub fn is_branch(self) -> bool {
		matches!(
			self,
			Opcode::Je
				| Opcode::Jl | Opcode::Jle
				| Opcode::Jb | Opcode::Jbe
				| Opcode::Jp | Opcode::Jo
				| Opcode::Js | Opcode::Jne
				| Opcode::Jnl | Opcode::Jnle
				| Opcode::Jnb | Opcode::Jnbe
				| Opcode::Jnp | Opcode::Jno
				| Opcode::Jns | Opcode::Loop
				| Opcode::Loopz | Opcode::Loopnz
				| Opcode::Jcxz
		)
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Width {
	Byte,
	Word,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OperandKind {
	Register,
	Memory,
	Immediate,
	Accumulator,
	JumpTarget,
	None,
}

/// Decoded instruction. `dest`/`source` are the rendered NASM operand
/// strings; `dest_reg`/`source_reg`/`memory_index`/`immediate` are the
/// canonical numeric representations the Executor operates on -
/// strings exist purely for rendering (spec.md's Design Note: tagged
/// variants over strings as the canonical form).
#[derive(Clone, Debug)]
pub struct DecodedInstruction {
	pub opcode: Opcode,
	pub dest: String,
	pub source: String,
	pub dest_kind: OperandKind,
	pub source_kind: OperandKind,
	pub width: Width,
	pub reg_is_dest: bool,
	pub signed_extend: bool,
	pub mod_field: u8,
	pub reg_field: u8,
	pub rm_field: u8,
	pub memory_index: Option<u16>,
	/// Raw encoded displacement (0 when the addressing mode has none),
	/// used only by the clock estimator's EA table.
	pub displacement: i32,
	pub length: u8,
	pub branch_target: i8,
	pub flags_affected: bool,
	pub dest_reg: Option<usize>,
	pub source_reg: Option<usize>,
	pub immediate: i32,
}

impl DecodedInstruction {
	fn new() -> Self {
		DecodedInstruction {
			opcode: Opcode::Undefined,
			dest: String::new(),
			source: String::new(),
			dest_kind: OperandKind::None,
			source_kind: OperandKind::None,
			width: Width::Byte,
			reg_is_dest: false,
			signed_extend: false,
			mod_field: 0,
			reg_field: 0,
			rm_field: 0,
			memory_index: None,
			displacement: 0,
			length: 1,
			branch_target: 0,
			flags_affected: false,
			dest_reg: None,
			source_reg: None,
			immediate: 0,
		}
	}
}

fn reg_name(index: u8, width: Width) -> &'static str {
	match width {
		Width::Word => WORD_REG_NAMES[index as usize],
		Width::Byte => BYTE_REG_NAMES[index as usize],
	}
}

const EFFECTIVE_ADDRESS_EXPR: [&str; 8] = [
	"bx + si", "bx + di", "bp + si", "bp + di", "si", "di", "bp", "bx",
];

// Word-register indices contributing to each rm's effective address.
// (base, index) pair; index is None for the four single-register forms.
fn ea_registers(rm: u8) -> (usize, Option<usize>) {
	const BX: usize = 3;
	const BP: usize = 5;
	const SI: usize = 6;
	const DI: usize = 7;
	match rm {
		0 => (BX, Some(SI)),
		1 => (BX, Some(DI)),
		2 => (BP, Some(SI)),
		3 => (BP, Some(DI)),
		4 => (SI, None),
		5 => (DI, None),
		6 => (BP, None),
		7 => (BX, None),
		_ => unreachable!("rm field is 3 bits"),
	}
}

/// Reads the ModR/M's effective-address operand: resolves the linear
/// memory address and renders its `[expr +/- N]` text. Returns
/// `(text, memory_index, extra_bytes_consumed_after_modrm, displacement)`.
fn decode_effective_address(machine: &Machine, modrm_ip: u16, mod_field: u8, rm: u8) -> (String, u16, u8, i32) {
	if mod_field == 0b00 && rm == 0b110 {
		let addr = machine.read_word(modrm_ip.wrapping_add(1));
		return (format!("[{}]", addr), addr, 2, 0);
	}

	let (base, index) = ea_registers(rm);
	let mut memory_index = machine.reg16(base);
	if let Some(index_reg) = index {
		memory_index = memory_index.wrapping_add(machine.reg16(index_reg));
	}

	let (disp, extra): (i32, u8) = match mod_field {
		0b01 => (machine.read_byte(modrm_ip.wrapping_add(1)) as i8 as i32, 1),
		0b10 => (machine.read_word(modrm_ip.wrapping_add(1)) as i16 as i32, 2),
		_ => (0, 0),
	};

	memory_index = memory_index.wrapping_add(disp as i16 as u16);

	let mut text = format!("[{}", EFFECTIVE_ADDRESS_EXPR[rm as usize]);
	if disp != 0 {
		if disp < 0 {
			text.push_str(&format!(" - {}", -disp));
		} else {
			text.push_str(&format!(" + {}", disp));
		}
	}
	text.push(']');

	(text, memory_index, extra, disp)
}

/// Shared ModR/M decode for reg/mem <-> reg forms (MOV/ADD/SUB/CMP/TEST).
fn decode_regmem_to_from_reg(inst: &mut DecodedInstruction, machine: &Machine, ip: u16) {
	let hi = machine.read_byte(ip);
	let lo = machine.read_byte(ip.wrapping_add(1));

	inst.width = if hi & 1 != 0 { Width::Word } else { Width::Byte };
	inst.reg_is_dest = hi & 0b10 != 0;
	inst.reg_field = (lo >> 3) & 0b111;
	inst.rm_field = lo & 0b111;
	inst.mod_field = lo >> 6;

	let mut length = 2u8;

	if inst.mod_field == 0b11 {
		let reg_name = reg_name(inst.reg_field, inst.width).to_string();
		let rm_name = reg_name_indexed(inst.rm_field, inst.width).to_string();
		if inst.reg_is_dest {
			inst.dest = reg_name;
			inst.dest_kind = OperandKind::Register;
			inst.dest_reg = Some(inst.reg_field as usize);
			inst.source = rm_name;
			inst.source_kind = OperandKind::Register;
			inst.source_reg = Some(inst.rm_field as usize);
		} else {
			inst.dest = rm_name;
			inst.dest_kind = OperandKind::Register;
			inst.dest_reg = Some(inst.rm_field as usize);
			inst.source = reg_name;
			inst.source_kind = OperandKind::Register;
			inst.source_reg = Some(inst.reg_field as usize);
		}
	} else {
		let (text, memory_index, extra, disp) =
			decode_effective_address(machine, ip.wrapping_add(1), inst.mod_field, inst.rm_field);
		length += extra;
		inst.displacement = disp;

		let reg_name = reg_name(inst.reg_field, inst.width).to_string();
		if inst.reg_is_dest {
			inst.dest = reg_name;
			inst.dest_kind = OperandKind::Register;
			inst.dest_reg = Some(inst.reg_field as usize);
			inst.source = text;
			inst.source_kind = OperandKind::Memory;
			inst.memory_index = Some(memory_index);
		} else {
			inst.dest = text;
			inst.dest_kind = OperandKind::Memory;
			inst.memory_index = Some(memory_index);
			inst.source = reg_name;
			inst.source_kind = OperandKind::Register;
			inst.source_reg = Some(inst.reg_field as usize);
		}
	}

	inst.length = length;
}

fn reg_name_indexed(index: u8, width: Width) -> &'static str {
	reg_name(index, width)
}

/// Shared ModR/M decode for immediate-to-reg/mem forms
/// (MOV/TEST unconditionally full-width immediate; ADD/SUB/CMP honor
/// the `s` sign-extend bit when `honors_sign_bit` is set).
fn decode_imm_to_regmem(inst: &mut DecodedInstruction, machine: &Machine, ip: u16, honors_sign_bit: bool) {
	let hi = machine.read_byte(ip);
	let lo = machine.read_byte(ip.wrapping_add(1));

	inst.width = if hi & 1 != 0 { Width::Word } else { Width::Byte };
	inst.signed_extend = honors_sign_bit && (hi & 0b10 != 0);
	inst.mod_field = lo >> 6;
	inst.rm_field = lo & 0b111;
	inst.source_kind = OperandKind::Immediate;

	let mut length = 2u8;
	let is_memory_dest = inst.mod_field != 0b11;

	let (dest_text, extra_disp) = if is_memory_dest {
		let (text, memory_index, extra, disp) =
			decode_effective_address(machine, ip.wrapping_add(1), inst.mod_field, inst.rm_field);
		inst.dest_kind = OperandKind::Memory;
		inst.memory_index = Some(memory_index);
		inst.displacement = disp;
		(text, extra)
	} else {
		let name = reg_name(inst.rm_field, inst.width).to_string();
		inst.dest_kind = OperandKind::Register;
		inst.dest_reg = Some(inst.rm_field as usize);
		(name, 0)
	};
	length += extra_disp;

	let imm_ip = ip.wrapping_add(2).wrapping_add(extra_disp as u16);
	let (imm_text, imm_value, imm_bytes) = if inst.width == Width::Word && !inst.signed_extend {
		let value = machine.read_word(imm_ip);
		(format!("{}", value as i16), value as i32, 2u8)
	} else {
		let value = machine.read_byte(imm_ip) as i8;
		(format!("{}", value), value as i32, 1u8)
	};
	length += imm_bytes;

	inst.dest = if is_memory_dest {
		let qualifier = if inst.width == Width::Word { "word " } else { "byte " };
		format!("{}{}", qualifier, dest_text)
	} else {
		dest_text
	};
	inst.source = imm_text;
	inst.immediate = imm_value;
	inst.length = length;
}

/// Shared decode for immediate-to-accumulator forms
/// (ADD/SUB/CMP/TEST immediate against AL/AX).
fn decode_imm_to_acc(inst: &mut DecodedInstruction, machine: &Machine, ip: u16) {
	let hi = machine.read_byte(ip);
	inst.width = if hi & 1 != 0 { Width::Word } else { Width::Byte };
	inst.dest_kind = OperandKind::Accumulator;
	inst.dest_reg = Some(0);
	inst.source_kind = OperandKind::Immediate;

	let mut length = 1u8;
	if inst.width == Width::Word {
		let value = machine.read_word(ip.wrapping_add(1));
		inst.dest = "ax".to_string();
		inst.source = format!("{}", value as i16);
		inst.immediate = value as i16 as i32;
		length += 2;
	} else {
		let value = machine.read_byte(ip.wrapping_add(1)) as i8;
		inst.dest = "al".to_string();
		inst.source = format!("{}", value);
		inst.immediate = value as i32;
		length += 1;
	}
	inst.length = length;
}

const JUMP_LOOP_TABLE: [(u8, Opcode); 20] = [
	(0x74, Opcode::Je),
	(0x7C, Opcode::Jl),
	(0x7E, Opcode::Jle),
	(0x72, Opcode::Jb),
	(0x76, Opcode::Jbe),
	(0x7A, Opcode::Jp),
	(0x70, Opcode::Jo),
	(0x78, Opcode::Js),
	(0x75, Opcode::Jne),
	(0x7D, Opcode::Jnl),
	(0x7F, Opcode::Jnle),
	(0x73, Opcode::Jnb),
	(0x77, Opcode::Jnbe),
	(0x7B, Opcode::Jnp),
	(0x71, Opcode::Jno),
	(0x79, Opcode::Jns),
	(0xE2, Opcode::Loop),
	(0xE1, Opcode::Loopz),
	(0xE0, Opcode::Loopnz),
	(0xE3, Opcode::Jcxz),
];

/// Decodes the instruction at `ip`. Never mutates `machine`, never
/// touches its IP - the caller (Executor) advances IP using `length`.
pub fn decode(machine: &Machine, ip: u16) -> DecodedInstruction {
	let mut inst = DecodedInstruction::new();
	let byte0 = machine.read_byte(ip);

	if let Some((_, opcode)) = JUMP_LOOP_TABLE.iter().find(|(b, _)| *b == byte0) {
		inst.opcode = *opcode;
		inst.length = 2;
		inst.dest_kind = OperandKind::JumpTarget;
		let displacement = machine.read_byte(ip.wrapping_add(1)) as i8;
		inst.branch_target = displacement;
		let n = displacement as i16 + 2;
		inst.dest = if n >= 0 {
			format!("$+{}", n)
		} else {
			format!("${}", n)
		};
		return inst;
	}

	match byte0 >> 1 {
		0b1100011 => {
			inst.opcode = Opcode::Mov;
			decode_imm_to_regmem(&mut inst, machine, ip, false);
			return inst;
		}
		0b1010000 => {
			inst.opcode = Opcode::Mov;
			inst.width = if byte0 & 1 != 0 { Width::Word } else { Width::Byte };
			let addr = machine.read_word(ip.wrapping_add(1));
			inst.dest = if inst.width == Width::Word { "ax" } else { "al" }.to_string();
			inst.dest_kind = OperandKind::Accumulator;
			inst.dest_reg = Some(0);
			inst.source = format!("[{}]", addr);
			inst.source_kind = OperandKind::Memory;
			inst.memory_index = Some(addr);
			inst.length = 3;
			return inst;
		}
		0b1010001 => {
			inst.opcode = Opcode::Mov;
			inst.width = if byte0 & 1 != 0 { Width::Word } else { Width::Byte };
			let addr = machine.read_word(ip.wrapping_add(1));
			inst.source = if inst.width == Width::Word { "ax" } else { "al" }.to_string();
			inst.source_kind = OperandKind::Accumulator;
			inst.source_reg = Some(0);
			inst.dest = format!("[{}]", addr);
			inst.dest_kind = OperandKind::Memory;
			inst.memory_index = Some(addr);
			inst.length = 3;
			return inst;
		}
		0b0000010 => {
			inst.opcode = Opcode::Add;
			inst.flags_affected = true;
			decode_imm_to_acc(&mut inst, machine, ip);
			return inst;
		}
		0b0010110 => {
			inst.opcode = Opcode::Sub;
			inst.flags_affected = true;
			decode_imm_to_acc(&mut inst, machine, ip);
			return inst;
		}
		0b0011110 => {
			inst.opcode = Opcode::Cmp;
			inst.flags_affected = true;
			decode_imm_to_acc(&mut inst, machine, ip);
			return inst;
		}
		0b1111011 => {
			inst.opcode = Opcode::Test;
			decode_imm_to_regmem(&mut inst, machine, ip, false);
			return inst;
		}
		0b1010100 => {
			inst.opcode = Opcode::Test;
			decode_imm_to_acc(&mut inst, machine, ip);
			return inst;
		}
		_ => {}
	}

	match byte0 >> 2 {
		0b100010 => {
			inst.opcode = Opcode::Mov;
			decode_regmem_to_from_reg(&mut inst, machine, ip);
			return inst;
		}
		0b000000 => {
			inst.opcode = Opcode::Add;
			inst.flags_affected = true;
			decode_regmem_to_from_reg(&mut inst, machine, ip);
			return inst;
		}
		0b001010 => {
			inst.opcode = Opcode::Sub;
			inst.flags_affected = true;
			decode_regmem_to_from_reg(&mut inst, machine, ip);
			return inst;
		}
		0b001110 => {
			inst.opcode = Opcode::Cmp;
			inst.flags_affected = true;
			decode_regmem_to_from_reg(&mut inst, machine, ip);
			return inst;
		}
		0b100000 => {
			let modrm = machine.read_byte(ip.wrapping_add(1));
			match (modrm >> 3) & 0b111 {
				0b000 => {
					inst.opcode = Opcode::Add;
					inst.flags_affected = true;
					decode_imm_to_regmem(&mut inst, machine, ip, true);
				}
				0b101 => {
					inst.opcode = Opcode::Sub;
					inst.flags_affected = true;
					decode_imm_to_regmem(&mut inst, machine, ip, true);
				}
				0b111 => {
					inst.opcode = Opcode::Cmp;
					inst.flags_affected = true;
					decode_imm_to_regmem(&mut inst, machine, ip, true);
				}
				_ => {
					mark_undefined(&mut inst, 2);
				}
			}
			return inst;
		}
		0b000100 => {
			inst.opcode = Opcode::Test;
			decode_regmem_to_from_reg(&mut inst, machine, ip);
			return inst;
		}
		_ => {}
	}

	if byte0 >> 4 == 0b1011 {
		inst.opcode = Opcode::Mov;
		inst.width = if byte0 & 0b1000 != 0 { Width::Word } else { Width::Byte };
		let reg = byte0 & 0b111;
		inst.reg_field = reg;
		inst.dest = reg_name(reg, inst.width).to_string();
		inst.dest_kind = OperandKind::Register;
		inst.dest_reg = Some(reg as usize);
		inst.source_kind = OperandKind::Immediate;

		if inst.width == Width::Word {
			let value = machine.read_word(ip.wrapping_add(1));
			inst.source = format!("{}", value as i16);
			inst.immediate = value as i32;
			inst.length = 3;
		} else {
			// NASM renders this unqualified byte immediate unsigned.
			let value = machine.read_byte(ip.wrapping_add(1));
			inst.source = format!("{}", value);
			inst.immediate = value as i32;
			inst.length = 2;
		}
		return inst;
	}

	mark_undefined(&mut inst, 1);
	inst
}

/// Marks `inst` as undecodable, matching the reference simulator's
/// diagnostic for a byte it has no mnemonic for.
fn mark_undefined(inst: &mut DecodedInstruction, length: u8) {
	log::warn!("Undefined register!");
	println!("Undefined register!");
	inst.opcode = Opcode::Undefined;
	inst.length = length;
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::machine::Machine;

	fn machine_with(bytes: &[u8]) -> Machine {
		let mut m = Machine::new();
		m.load_program(bytes);
		m
	}

	#[test]
	fn decodes_mov_reg_reg() {
		let m = machine_with(&[0x89, 0xD8]); // mov ax, bx
		let inst = decode(&m, 0);
		assert_eq!(inst.opcode, Opcode::Mov);
		assert_eq!(inst.dest, "ax");
		assert_eq!(inst.source, "bx");
		assert_eq!(inst.length, 2);
	}

	#[test]
	fn decodes_mov_imm_to_reg_word() {
		let m = machine_with(&[0xB8, 0x39, 0x05]); // mov ax, 1337
		let inst = decode(&m, 0);
		assert_eq!(inst.opcode, Opcode::Mov);
		assert_eq!(inst.dest, "ax");
		assert_eq!(inst.source, "1337");
		assert_eq!(inst.length, 3);
	}

	#[test]
	fn decodes_add_reg_reg_sets_flags_affected() {
		let m = machine_with(&[0x01, 0xD8]); // add ax, bx
		let inst = decode(&m, 0);
		assert_eq!(inst.opcode, Opcode::Add);
		assert!(inst.flags_affected);
	}

	#[test]
	fn mod00_rm110_consumes_two_displacement_bytes() {
		// mov [1234], al -> 88 06 d2 04
		let m = machine_with(&[0x88, 0x06, 0xD2, 0x04]);
		let inst = decode(&m, 0);
		assert_eq!(inst.length, 4);
		assert_eq!(inst.memory_index, Some(1234));
	}

	#[test]
	fn decodes_loop_as_branch_with_displacement() {
		let m = machine_with(&[0xE2, 0xFD]); // loop $-1
		let inst = decode(&m, 0);
		assert_eq!(inst.opcode, Opcode::Loop);
		assert_eq!(inst.branch_target, -3);
		assert_eq!(inst.length, 2);
	}

	#[test]
	fn decodes_memory_operand_with_positive_displacement() {
		// mov ax, [bx+si+8] -> 8B 40 08
		let m = machine_with(&[0x8B, 0x40, 0x08]);
		let inst = decode(&m, 0);
		assert_eq!(inst.source, "[bx + si + 8]");
	}
}
