use enum_ordinalize::Ordinalize;
use smallvec::SmallVec;

use crate::types::TypeId;
use crate::value::{BlockId, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ordinalize)]
#[repr(u8)]
pub enum BinOp {
    Add, Sub, Mul, SDiv, UDiv, SRem, URem,
    And, Or, Xor, Shl, LShr, AShr,
    FAdd, FSub, FMul, FDiv,
}

const BIN_OP_MNEMONICS: [&str; BinOp::VARIANT_COUNT] = [
    "add", "sub", "mul", "sdiv", "udiv", "srem", "urem",
    "and", "or", "xor", "shl", "lshr", "ashr",
    "fadd", "fsub", "fmul", "fdiv",
];

impl BinOp {
    pub fn mnemonic(self) -> &'static str {
        BIN_OP_MNEMONICS[self.ordinal() as usize]
    }

    pub fn is_float(self) -> bool {
        matches!(self, BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ordinalize)]
#[repr(u8)]
pub enum CastOp {
    BitCast,
    AddrSpaceCast,
    ZExt,
    SExt,
    Trunc,
    SIToFP,
    FPToSI,
}

const CAST_OP_MNEMONICS: [&str; CastOp::VARIANT_COUNT] =
    ["bitcast", "addrspacecast", "zext", "sext", "trunc", "sitofp", "fptosi"];

impl CastOp {
    pub fn mnemonic(self) -> &'static str {
        CAST_OP_MNEMONICS[self.ordinal() as usize]
    }
}

pub type SwitchCases = SmallVec<[(i64, BlockId); 8]>;

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Load { ptr: Value },
    Store { value: Value, ptr: Value },
    /// Constant-index address computation. The first index steps over the
    /// pointer, the rest index into aggregates.
    Gep { ptr: Value, indices: SmallVec<[u32; 4]> },
    Cast { op: CastOp, value: Value },
    Binary { op: BinOp, lhs: Value, rhs: Value },
    Call { callee: Value, args: SmallVec<[Value; 8]> },
    Switch { cond: Value, default: BlockId, cases: SwitchCases },
    Br { target: BlockId },
    Ret { value: Option<Value> },
    Unreachable,
}

impl Inst {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Inst::Switch { .. } | Inst::Br { .. } | Inst::Ret { .. } | Inst::Unreachable)
    }

    pub fn operands(&self) -> SmallVec<[&Value; 8]> {
        let mut out = SmallVec::new();
        match self {
            Inst::Load { ptr } => out.push(ptr),
            Inst::Store { value, ptr } => {
                out.push(value);
                out.push(ptr);
            }
            Inst::Gep { ptr, .. } => out.push(ptr),
            Inst::Cast { value, .. } => out.push(value),
            Inst::Binary { lhs, rhs, .. } => {
                out.push(lhs);
                out.push(rhs);
            }
            Inst::Call { callee, args } => {
                out.push(callee);
                out.extend(args.iter());
            }
            Inst::Switch { cond, .. } => out.push(cond),
            Inst::Ret { value: Some(v) } => out.push(v),
            Inst::Ret { value: None } | Inst::Br { .. } | Inst::Unreachable => {}
        }
        out
    }

    pub fn operands_mut(&mut self) -> SmallVec<[&mut Value; 8]> {
        let mut out = SmallVec::new();
        match self {
            Inst::Load { ptr } => out.push(ptr),
            Inst::Store { value, ptr } => {
                out.push(value);
                out.push(ptr);
            }
            Inst::Gep { ptr, .. } => out.push(ptr),
            Inst::Cast { value, .. } => out.push(value),
            Inst::Binary { lhs, rhs, .. } => {
                out.push(lhs);
                out.push(rhs);
            }
            Inst::Call { callee, args } => {
                out.push(callee);
                out.extend(args.iter_mut());
            }
            Inst::Switch { cond, .. } => out.push(cond),
            Inst::Ret { value: Some(v) } => out.push(v),
            Inst::Ret { value: None } | Inst::Br { .. } | Inst::Unreachable => {}
        }
        out
    }
}

/// An instruction together with its result type and optional name.
#[derive(Debug, Clone, PartialEq)]
pub struct InstData {
    pub inst: Inst,
    pub ty: TypeId,
    pub name: Option<String>,
}
