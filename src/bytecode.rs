//! Bytecode data model shared between the emitter and the VM.
//!
//! A module is a set of top-level functions keyed by interned name, plus
//! the string-literal pool inherited from the lexer. Each function is a
//! linear sequence of stack-machine instructions; an instruction is an
//! opcode and at most one operand.
//!
//! Jump targets are absolute instruction indices carried in the immediate
//! operand. Forward jumps are emitted with a placeholder and patched once
//! the target address is known.
//!
//! The variant names here are descriptive; [`Op::mnemonic`] maps each to
//! the VM's short opcode name, which is also what the disassembly prints.

use std::collections::HashMap;
use std::fmt;

use crate::nametable::{NameId, NameTable};

/// Opcodes of the stack machine, in the VM's numbering order.
///
/// The grammar currently never emits the object, container-literal and
/// coroutine groups; they are part of the VM contract nonetheless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Nop,
    Invalid,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    IntDiv,
    Neg,

    // Bitwise
    BitXor,
    BitAnd,
    BitOr,
    BitNot,
    Shl,
    Shr,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And,
    Or,
    Not,

    // Load immediates
    LoadInt,
    LoadNum,
    LoadNull,
    LoadBool,
    LoadStr,
    LoadArray,
    LoadObject,
    LoadLambda,

    // Scope access
    LoadGlobal,
    LoadLocal,
    StoreGlobal,
    StoreLocal,

    // Stack manipulation
    PopN,
    Swap,
    Rot3,
    Dup,

    // Objects
    GetProp,
    SetProp,
    GetDyn,
    SetDyn,
    NewObject,

    // Control flow
    Jump,
    JumpZero,
    JumpNonZero,
    Call,
    Ret,
    RetNull,
    Yield,
}

impl Op {
    /// The VM's short name for this opcode, used by disassembly.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Nop => "NOP",
            Op::Invalid => "INVALID",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Mod => "MOD",
            Op::Pow => "POW",
            Op::IntDiv => "IDIV",
            Op::Neg => "NEG",
            Op::BitXor => "BXOR",
            Op::BitAnd => "BAND",
            Op::BitOr => "BOR",
            Op::BitNot => "BNOT",
            Op::Shl => "SHL",
            Op::Shr => "SHR",
            Op::Eq => "EQ",
            Op::Ne => "NE",
            Op::Lt => "LT",
            Op::Le => "LE",
            Op::Gt => "GT",
            Op::Ge => "GE",
            Op::And => "AND",
            Op::Or => "OR",
            Op::Not => "NOT",
            Op::LoadInt => "LII",
            Op::LoadNum => "LIN",
            Op::LoadNull => "LINULL",
            Op::LoadBool => "LIBOOL",
            Op::LoadStr => "LISTR",
            Op::LoadArray => "LIARR",
            Op::LoadObject => "LIOBJ",
            Op::LoadLambda => "LILAMBDA",
            Op::LoadGlobal => "LDGLOBAL",
            Op::LoadLocal => "LDLOCAL",
            Op::StoreGlobal => "STGLOBAL",
            Op::StoreLocal => "STLOCAL",
            Op::PopN => "POPN",
            Op::Swap => "SWP",
            Op::Rot3 => "ROT3",
            Op::Dup => "DUP",
            Op::GetProp => "GET",
            Op::SetProp => "SET",
            Op::GetDyn => "GETDNY",
            Op::SetDyn => "SETDNY",
            Op::NewObject => "NEWOBJ",
            Op::Jump => "JMP",
            Op::JumpZero => "JZ",
            Op::JumpNonZero => "JNZ",
            Op::Call => "CALL",
            Op::Ret => "RET",
            Op::RetNull => "RETNULL",
            Op::Yield => "YIELD",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// An instruction's single operand. `Imm` doubles as integer literal, jump
/// target, local slot index, name ID and bool (0/1) depending on the opcode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    None,
    /// Pop count or call argument count.
    Count(u32),
    Imm(u64),
    Num(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub operand: Operand,
}

impl Instruction {
    pub fn new(op: Op) -> Self {
        Self {
            op,
            operand: Operand::None,
        }
    }

    pub fn count(op: Op, n: u32) -> Self {
        Self {
            op,
            operand: Operand::Count(n),
        }
    }

    pub fn imm(op: Op, value: u64) -> Self {
        Self {
            op,
            operand: Operand::Imm(value),
        }
    }

    pub fn num(op: Op, value: f64) -> Self {
        Self {
            op,
            operand: Operand::Num(value),
        }
    }

    pub fn boolean(op: Op, value: bool) -> Self {
        Self::imm(op, value as u64)
    }

    /// The immediate operand, for jump-target and slot inspection.
    pub fn imm_value(&self) -> Option<u64> {
        match self.operand {
            Operand::Imm(v) => Some(v),
            _ => None,
        }
    }
}

/// A compiled function: its interned name, how many of its locals are
/// parameters, and its instruction stream. The first `arg_count` local
/// slots hold the parameters.
#[derive(Debug, Clone, Default)]
pub struct BytecodeFunction {
    pub name: NameId,
    pub arg_count: usize,
    pub local_count: usize,
    pub instructions: Vec<Instruction>,
}

impl BytecodeFunction {
    pub fn new(name: NameId) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Append an instruction and return its address.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    /// Point every jump in `jumps` (addresses of previously emitted jump
    /// instructions) at the next instruction address.
    pub fn patch_jumps(&mut self, jumps: &[usize]) {
        let target = self.instructions.len() as u64;
        for &jump in jumps {
            self.instructions[jump].operand = Operand::Imm(target);
        }
    }
}

/// A compiled module: top-level functions by name ID, the string-literal
/// pool, and the (currently never populated) global variable names.
#[derive(Debug, Clone, Default)]
pub struct BytecodeModule {
    pub functions: HashMap<NameId, BytecodeFunction>,
    pub str_lits: Vec<String>,
    pub global_names: Vec<NameId>,
}

impl BytecodeModule {
    /// Human-readable listing of every function, resolved against `names`.
    /// Functions print sorted by name ID so output is deterministic.
    pub fn disassemble<'a>(&'a self, names: &'a NameTable) -> Disassembly<'a> {
        Disassembly {
            module: self,
            names,
        }
    }
}

/// Displayable disassembly of a [`BytecodeModule`].
pub struct Disassembly<'a> {
    module: &'a BytecodeModule,
    names: &'a NameTable,
}

impl fmt::Display for Disassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<NameId> = self.module.functions.keys().copied().collect();
        ids.sort_unstable();

        for id in ids {
            let func = &self.module.functions[&id];
            writeln!(
                f,
                "Function {}(args = {}, locals = {}):",
                self.names.get_name(func.name),
                func.arg_count,
                func.local_count
            )?;

            for (addr, ins) in func.instructions.iter().enumerate() {
                write!(f, "\t+{:04}: {}", addr, ins.op)?;
                match (ins.op, ins.operand) {
                    (Op::LoadInt, Operand::Imm(v)) => write!(f, "\t{}", v)?,
                    (Op::LoadNum, Operand::Num(v)) => write!(f, "\t{}", v)?,
                    (Op::LoadBool, Operand::Imm(v)) => write!(f, "\t{}", v != 0)?,
                    (Op::LoadStr, Operand::Imm(v)) => {
                        write!(f, "\t\"{}\"", self.module.str_lits[v as usize])?
                    }
                    (
                        Op::LoadLocal | Op::StoreLocal | Op::Jump | Op::JumpZero | Op::JumpNonZero,
                        Operand::Imm(v),
                    ) => write!(f, "\t{}", v)?,
                    (Op::LoadGlobal | Op::StoreGlobal, Operand::Imm(v)) => {
                        write!(f, "\t{}", self.names.get_name(v as NameId))?
                    }
                    (Op::Call | Op::PopN, Operand::Count(n)) => write!(f, "\t{}", n)?,
                    _ => {}
                }
                writeln!(f)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_returns_addresses() {
        let mut func = BytecodeFunction::new(0);
        assert_eq!(func.emit(Instruction::imm(Op::LoadInt, 1)), 0);
        assert_eq!(func.emit(Instruction::new(Op::Ret)), 1);
    }

    #[test]
    fn test_patch_jumps() {
        let mut func = BytecodeFunction::new(0);
        let jump = func.emit(Instruction::imm(Op::JumpZero, u64::MAX));
        func.emit(Instruction::imm(Op::LoadInt, 1));
        func.patch_jumps(&[jump]);
        assert_eq!(func.instructions[jump].imm_value(), Some(2));
    }

    #[test]
    fn test_disassembly_format() {
        let mut names = NameTable::new();
        let f_id = names.get_id_or_insert("f");
        let g_id = names.get_id_or_insert("g");

        let mut func = BytecodeFunction::new(f_id);
        func.local_count = 1;
        func.emit(Instruction::imm(Op::LoadInt, 10));
        func.emit(Instruction::imm(Op::LoadStr, 0));
        func.emit(Instruction::boolean(Op::LoadBool, true));
        func.emit(Instruction::imm(Op::LoadGlobal, g_id as u64));
        func.emit(Instruction::count(Op::Call, 2));
        func.emit(Instruction::imm(Op::StoreLocal, 0));
        func.emit(Instruction::new(Op::RetNull));

        let mut module = BytecodeModule::default();
        module.str_lits.push("hi".to_string());
        module.functions.insert(f_id, func);

        let text = module.disassemble(&names).to_string();
        assert_eq!(
            text,
            "Function f(args = 0, locals = 1):\n\
             \t+0000: LII\t10\n\
             \t+0001: LISTR\t\"hi\"\n\
             \t+0002: LIBOOL\ttrue\n\
             \t+0003: LDGLOBAL\tg\n\
             \t+0004: CALL\t2\n\
             \t+0005: STLOCAL\t0\n\
             \t+0006: RETNULL\n\
             \n"
        );
    }

    #[test]
    fn test_disassembly_orders_functions_by_name_id() {
        let mut names = NameTable::new();
        let b = names.get_id_or_insert("b");
        let a = names.get_id_or_insert("a");

        let mut module = BytecodeModule::default();
        module.functions.insert(a, BytecodeFunction::new(a));
        module.functions.insert(b, BytecodeFunction::new(b));

        let text = module.disassemble(&names).to_string();
        let b_pos = text.find("Function b").unwrap();
        let a_pos = text.find("Function a").unwrap();
        assert!(b_pos < a_pos, "b interned first, so it prints first");
    }
}
