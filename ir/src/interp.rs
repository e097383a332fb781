//! Reference interpreter for IR modules.
//!
//! Executes functions over a flat little-endian byte memory. Global
//! variables are materialized on first use. Function addresses live above
//! [`FUNCTION_BASE`] so that they can round-trip through memory.

use std::rc::Rc;

use tracing::{trace, warn};

use crate::context::Context;
use crate::errors::InterpError;
use crate::function::Function;
use crate::instruction::{BinOp, CastOp, Inst};
use crate::ir_hasher::HashMap;
use crate::layout::round_up;
use crate::module::Module;
use crate::types::{Type, TypeId};
use crate::value::{Constant, FuncId, GlobalId, GlobalRef, Value};

pub const FUNCTION_BASE: u64 = 1 << 62;
const MEMORY_BASE: u64 = 16;
const DEFAULT_MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RtValue {
    Void,
    Int(i64),
    Float(f64),
    Ptr(u64),
    Function(FuncId),
}

impl RtValue {
    pub fn as_int(self) -> Option<i64> {
        match self {
            RtValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(self) -> Option<f64> {
        match self {
            RtValue::Float(v) => Some(v),
            _ => None,
        }
    }

    fn address(self) -> Result<u64, InterpError> {
        match self {
            RtValue::Ptr(p) => Ok(p),
            RtValue::Function(f) => Ok(FUNCTION_BASE + f.0 as u64),
            _ => Err(InterpError::TypeMismatch("pointer operand")),
        }
    }
}

/// Sign-extends the low `bits` bits of `value`.
#[inline]
fn normalize(bits: u32, value: i64) -> i64 {
    if bits == 0 || bits >= 64 {
        return value;
    }
    let shift = 64 - bits;
    (value << shift) >> shift
}

#[inline]
fn mask(bits: u32) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// Byte-addressed memory. Address 0 is never handed out.
#[derive(Debug, Clone)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Default for Memory {
    fn default() -> Self {
        Self { bytes: vec![0; MEMORY_BASE as usize] }
    }
}

impl Memory {
    pub fn alloc(&mut self, size: u64, align: u64) -> u64 {
        let addr = round_up(self.bytes.len() as u64, align.max(1));
        self.bytes.resize((addr + size.max(1)) as usize, 0);
        addr
    }

    fn range(&self, addr: u64, len: u64) -> Result<std::ops::Range<usize>, InterpError> {
        if addr == 0 {
            return Err(InterpError::NullDereference);
        }
        let end = addr.checked_add(len).ok_or(InterpError::OutOfBounds { addr, len })?;
        if end > self.bytes.len() as u64 {
            return Err(InterpError::OutOfBounds { addr, len });
        }
        Ok(addr as usize..end as usize)
    }

    pub fn read(&self, addr: u64, len: u64) -> Result<&[u8], InterpError> {
        let range = self.range(addr, len)?;
        Ok(&self.bytes[range])
    }

    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), InterpError> {
        let range = self.range(addr, data.len() as u64)?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    pub fn read_uint(&self, addr: u64, len: u64) -> Result<u64, InterpError> {
        if len > 8 {
            return Err(InterpError::TypeMismatch("scalar wider than 64 bits"));
        }
        let mut buf = [0u8; 8];
        buf[..len as usize].copy_from_slice(self.read(addr, len)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn write_uint(&mut self, addr: u64, len: u64, value: u64) -> Result<(), InterpError> {
        if len > 8 {
            return Err(InterpError::TypeMismatch("scalar wider than 64 bits"));
        }
        self.write(addr, &value.to_le_bytes()[..len as usize])
    }

    pub fn write_i32(&mut self, addr: u64, value: i32) -> Result<(), InterpError> {
        self.write(addr, &value.to_le_bytes())
    }

    pub fn read_i32(&self, addr: u64) -> Result<i32, InterpError> {
        Ok(self.read_uint(addr, 4)? as u32 as i32)
    }

    pub fn write_f32(&mut self, addr: u64, value: f32) -> Result<(), InterpError> {
        self.write(addr, &value.to_le_bytes())
    }

    pub fn read_f32(&self, addr: u64) -> Result<f32, InterpError> {
        Ok(f32::from_bits(self.read_uint(addr, 4)? as u32))
    }
}

pub struct Interpreter<'m> {
    module: &'m Module,
    ctx: Rc<Context>,
    memory: Memory,
    globals: HashMap<GlobalId, u64>,
    depth: usize,
    max_depth: usize,
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m Module) -> Self {
        Self {
            module,
            ctx: Rc::clone(module.context()),
            memory: Memory::default(),
            globals: HashMap::default(),
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn call_by_name(&mut self, name: &str, args: &[RtValue]) -> Result<RtValue, InterpError> {
        let func = self
            .module
            .get_function(name)
            .ok_or_else(|| InterpError::UnknownFunction(name.to_owned()))?;
        self.call(func, args)
    }

    pub fn call(&mut self, func: FuncId, args: &[RtValue]) -> Result<RtValue, InterpError> {
        let module = self.module;
        let f = module.function(func);
        if f.is_declaration() {
            return Err(InterpError::UndefinedFunction(f.name().to_owned()));
        }
        let (_, params, var_arg) = self
            .ctx
            .function_signature(f.ty)
            .ok_or(InterpError::TypeMismatch("function type"))?;
        if args.len() < params.len() || (!var_arg && args.len() != params.len()) {
            return Err(InterpError::ArgumentCount {
                function: f.name().to_owned(),
                expected: params.len(),
                found: args.len(),
            });
        }
        if self.depth >= self.max_depth {
            warn!(function = f.name(), depth = self.depth, "call depth exhausted");
            return Err(InterpError::StackOverflow(self.max_depth));
        }
        trace!(function = f.name(), depth = self.depth, "call");
        self.depth += 1;
        let result = self.run(func, f, args);
        self.depth -= 1;
        if let Err(err) = &result {
            trace!(function = f.name(), %err, "call failed");
        }
        result
    }

    fn run(&mut self, func: FuncId, f: &'m Function, args: &[RtValue]) -> Result<RtValue, InterpError> {
        let module = self.module;
        let mut regs = vec![RtValue::Void; f.body().0.len()];
        let mut block = f.entry_block().ok_or_else(|| InterpError::UndefinedFunction(f.name().to_owned()))?;

        'blocks: loop {
            for &id in &f.block(block).insts {
                let data = f.inst(id);
                let result = match &data.inst {
                    Inst::Load { ptr } => {
                        let addr = self.eval(ptr, &regs, args)?.address()?;
                        self.load(addr, data.ty)?
                    }
                    Inst::Store { value, ptr } => {
                        let v = self.eval(value, &regs, args)?;
                        let addr = self.eval(ptr, &regs, args)?.address()?;
                        self.store(addr, module.value_type(func, value), v)?;
                        RtValue::Void
                    }
                    Inst::Gep { ptr, indices } => {
                        let base = self.eval(ptr, &regs, args)?.address()?;
                        let ptr_ty = module.value_type(func, ptr);
                        RtValue::Ptr(base.wrapping_add(self.gep_offset(ptr_ty, indices)?))
                    }
                    Inst::Cast { op, value } => {
                        let v = self.eval(value, &regs, args)?;
                        self.cast(*op, v, module.value_type(func, value), data.ty)?
                    }
                    Inst::Binary { op, lhs, rhs } => {
                        let l = self.eval(lhs, &regs, args)?;
                        let r = self.eval(rhs, &regs, args)?;
                        self.binary(*op, l, r, data.ty)?
                    }
                    Inst::Call { callee, args: call_args } => {
                        let target = self.eval(callee, &regs, args)?;
                        let target = self.resolve_callee(target)?;
                        let values = call_args
                            .iter()
                            .map(|a| self.eval(a, &regs, args))
                            .collect::<Result<Vec<_>, _>>()?;
                        self.call(target, &values)?
                    }
                    Inst::Switch { cond, default, cases } => {
                        let bits = self.ctx.int_width(module.value_type(func, cond)).unwrap_or(64);
                        let v = self
                            .eval(cond, &regs, args)?
                            .as_int()
                            .ok_or(InterpError::TypeMismatch("switch condition"))?;
                        block = cases
                            .iter()
                            .find(|(case, _)| normalize(bits, *case) == normalize(bits, v))
                            .map_or(*default, |(_, dest)| *dest);
                        continue 'blocks;
                    }
                    Inst::Br { target } => {
                        block = *target;
                        continue 'blocks;
                    }
                    Inst::Ret { value } => {
                        return match value {
                            Some(v) => self.eval(v, &regs, args),
                            None => Ok(RtValue::Void),
                        };
                    }
                    Inst::Unreachable => return Err(InterpError::Unreachable(f.name().to_owned())),
                };
                regs[id.index()] = result;
            }
            return Err(InterpError::FellOffBlock { function: f.name().to_owned(), block: block.0 });
        }
    }

    fn eval(&mut self, value: &Value, regs: &[RtValue], args: &[RtValue]) -> Result<RtValue, InterpError> {
        match value {
            Value::Arg(n) => args.get(*n as usize).copied().ok_or(InterpError::TypeMismatch("argument")),
            Value::Inst(id) => Ok(regs[id.index()]),
            Value::Const(c) => self.eval_constant(c),
        }
    }

    fn eval_constant(&mut self, c: &Constant) -> Result<RtValue, InterpError> {
        match c {
            Constant::Int { ty, value } => Ok(RtValue::Int(normalize(self.ctx.int_width(*ty).unwrap_or(64), *value))),
            Constant::Float { value, .. } => Ok(RtValue::Float(*value)),
            Constant::Null(_) => Ok(RtValue::Ptr(0)),
            Constant::Undef(ty) | Constant::Zero(ty) => Ok(match self.ctx.ty(*ty) {
                Type::Float | Type::Double => RtValue::Float(0.0),
                Type::Pointer { .. } => RtValue::Ptr(0),
                _ => RtValue::Int(0),
            }),
            Constant::Aggregate { .. } => Err(InterpError::TypeMismatch("aggregate operand")),
            Constant::Global(GlobalRef::Function(f)) => Ok(RtValue::Function(*f)),
            Constant::Global(GlobalRef::Variable(g)) => Ok(RtValue::Ptr(self.global_address(*g)?)),
            Constant::Global(GlobalRef::Alias(a)) => {
                let aliasee = self.module.alias(*a).aliasee.clone();
                self.eval_constant(&aliasee)
            }
        }
    }

    /// Address of a global variable, materializing it on first use.
    pub fn global_address(&mut self, id: GlobalId) -> Result<u64, InterpError> {
        if let Some(&addr) = self.globals.get(&id) {
            return Ok(addr);
        }
        let global = self.module.global(id);
        let Some(init) = &global.initializer else {
            return Err(InterpError::UndefinedGlobal(global.name().to_owned()));
        };
        let layout = self.module.data_layout.layout_of(&self.ctx, global.value_type)?;
        let addr = self.memory.alloc(layout.size, layout.align);
        self.globals.insert(id, addr);
        self.write_constant(addr, global.value_type, init)?;
        Ok(addr)
    }

    fn write_constant(&mut self, addr: u64, ty: TypeId, c: &Constant) -> Result<(), InterpError> {
        match c {
            Constant::Aggregate { elements, .. } => {
                let dl = self.module.data_layout;
                for (i, element) in elements.iter().enumerate() {
                    let offset = dl.element_offset(&self.ctx, ty, i as u32)?;
                    let element_ty = self
                        .ctx
                        .element_type(ty, i as u32)
                        .ok_or(InterpError::TypeMismatch("aggregate initializer"))?;
                    self.write_constant(addr + offset, element_ty, element)?;
                }
                Ok(())
            }
            // Fresh allocations are already zeroed.
            Constant::Zero(_) | Constant::Undef(_) => Ok(()),
            _ => {
                let v = self.eval_constant(c)?;
                self.store(addr, ty, v)
            }
        }
    }

    fn resolve_callee(&self, target: RtValue) -> Result<FuncId, InterpError> {
        match target {
            RtValue::Function(f) => Ok(f),
            RtValue::Ptr(p) if p >= FUNCTION_BASE => Ok(FuncId((p - FUNCTION_BASE) as u32)),
            _ => Err(InterpError::BadCallee),
        }
    }

    fn gep_offset(&self, ptr_ty: TypeId, indices: &[u32]) -> Result<u64, InterpError> {
        let dl = self.module.data_layout;
        let mut ty = self.ctx.pointee_type(ptr_ty).ok_or(InterpError::TypeMismatch("gep base"))?;
        let Some((&first, rest)) = indices.split_first() else {
            return Ok(0);
        };
        let elem = dl.layout_of(&self.ctx, ty)?;
        let mut offset = round_up(elem.size, elem.align) * u64::from(first);
        for &index in rest {
            offset += dl.element_offset(&self.ctx, ty, index)?;
            ty = self.ctx.element_type(ty, index).ok_or(InterpError::TypeMismatch("gep index"))?;
        }
        Ok(offset)
    }

    pub fn load(&self, addr: u64, ty: TypeId) -> Result<RtValue, InterpError> {
        match self.ctx.ty(ty) {
            Type::Int(bits) => {
                let size = self.module.data_layout.size_of(&self.ctx, ty)?;
                let raw = self.memory.read_uint(addr, size)?;
                Ok(RtValue::Int(normalize(bits, raw as i64)))
            }
            Type::Float => Ok(RtValue::Float(f64::from(self.memory.read_f32(addr)?))),
            Type::Double => Ok(RtValue::Float(f64::from_bits(self.memory.read_uint(addr, 8)?))),
            Type::Pointer { .. } => {
                let size = self.module.data_layout.pointer_size;
                Ok(RtValue::Ptr(self.memory.read_uint(addr, size)?))
            }
            _ => Err(InterpError::TypeMismatch("load of non-scalar")),
        }
    }

    pub fn store(&mut self, addr: u64, ty: TypeId, value: RtValue) -> Result<(), InterpError> {
        match (self.ctx.ty(ty), value) {
            (Type::Int(_), RtValue::Int(v)) => {
                let size = self.module.data_layout.size_of(&self.ctx, ty)?;
                self.memory.write_uint(addr, size, v as u64)
            }
            (Type::Float, RtValue::Float(v)) => self.memory.write_f32(addr, v as f32),
            (Type::Double, RtValue::Float(v)) => self.memory.write_uint(addr, 8, v.to_bits()),
            (Type::Pointer { .. }, v @ (RtValue::Ptr(_) | RtValue::Function(_))) => {
                let size = self.module.data_layout.pointer_size;
                self.memory.write_uint(addr, size, v.address()?)
            }
            _ => Err(InterpError::TypeMismatch("store")),
        }
    }

    fn cast(&self, op: CastOp, v: RtValue, from: TypeId, to: TypeId) -> Result<RtValue, InterpError> {
        let from_bits = self.ctx.int_width(from).unwrap_or(64);
        let to_bits = self.ctx.int_width(to).unwrap_or(64);
        let single = matches!(self.ctx.ty(to), Type::Float);
        Ok(match (op, v) {
            (CastOp::BitCast, RtValue::Int(i)) if single => RtValue::Float(f64::from(f32::from_bits(i as u32))),
            (CastOp::BitCast, RtValue::Int(i)) if matches!(self.ctx.ty(to), Type::Double) => {
                RtValue::Float(f64::from_bits(i as u64))
            }
            (CastOp::BitCast, RtValue::Float(f)) if self.ctx.int_width(to).is_some() => {
                if matches!(self.ctx.ty(from), Type::Float) {
                    RtValue::Int(normalize(32, i64::from((f as f32).to_bits())))
                } else {
                    RtValue::Int(f.to_bits() as i64)
                }
            }
            (CastOp::BitCast | CastOp::AddrSpaceCast, v) => v,
            (CastOp::ZExt, RtValue::Int(i)) => RtValue::Int(((i as u64) & mask(from_bits)) as i64),
            (CastOp::SExt, RtValue::Int(i)) => RtValue::Int(normalize(from_bits, i)),
            (CastOp::Trunc, RtValue::Int(i)) => RtValue::Int(normalize(to_bits, i)),
            (CastOp::SIToFP, RtValue::Int(i)) if single => RtValue::Float(f64::from(i as f32)),
            (CastOp::SIToFP, RtValue::Int(i)) => RtValue::Float(i as f64),
            (CastOp::FPToSI, RtValue::Float(f)) => RtValue::Int(normalize(to_bits, f as i64)),
            _ => return Err(InterpError::TypeMismatch("cast")),
        })
    }

    fn binary(&self, op: BinOp, l: RtValue, r: RtValue, ty: TypeId) -> Result<RtValue, InterpError> {
        if op.is_float() {
            let (RtValue::Float(a), RtValue::Float(b)) = (l, r) else {
                return Err(InterpError::TypeMismatch("float arithmetic"));
            };
            let v = match op {
                BinOp::FAdd => a + b,
                BinOp::FSub => a - b,
                BinOp::FMul => a * b,
                _ => a / b,
            };
            let single = matches!(self.ctx.ty(ty), Type::Float);
            return Ok(RtValue::Float(if single { f64::from(v as f32) } else { v }));
        }

        let (RtValue::Int(a), RtValue::Int(b)) = (l, r) else {
            return Err(InterpError::TypeMismatch("integer arithmetic"));
        };
        let bits = self.ctx.int_width(ty).unwrap_or(64);
        let m = mask(bits);
        let (ua, ub) = ((a as u64) & m, (b as u64) & m);
        let shift = (b as u32) & 63;
        let v = match op {
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
            BinOp::Mul => a.wrapping_mul(b),
            BinOp::SDiv | BinOp::SRem | BinOp::UDiv | BinOp::URem if ub == 0 => {
                return Err(InterpError::DivisionByZero);
            }
            BinOp::SDiv => a.wrapping_div(b),
            BinOp::SRem => a.wrapping_rem(b),
            BinOp::UDiv => (ua / ub) as i64,
            BinOp::URem => (ua % ub) as i64,
            BinOp::And => a & b,
            BinOp::Or => a | b,
            BinOp::Xor => a ^ b,
            BinOp::Shl => a.wrapping_shl(shift),
            BinOp::LShr => (ua >> shift) as i64,
            BinOp::AShr => a >> shift,
            BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv => unreachable!("handled above"),
        };
        Ok(RtValue::Int(normalize(bits, v)))
    }
}
