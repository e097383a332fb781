use std::rc::Rc;

use smallvec::SmallVec;

use crate::context::Context;
use crate::instruction::{BinOp, CastOp, Inst, InstData, SwitchCases};
use crate::module::Module;
use crate::types::TypeId;
use crate::value::{BlockId, FuncId, InstId, Value};

/// Appends instructions to the end of a block of one function.
///
/// Result types are derived from operand types, so callers only name the
/// target type of casts.
pub struct FunctionBuilder<'m> {
    module: &'m mut Module,
    ctx: Rc<Context>,
    func: FuncId,
    block: Option<BlockId>,
}

impl<'m> FunctionBuilder<'m> {
    pub fn new(module: &'m mut Module, func: FuncId) -> Self {
        let ctx = Rc::clone(module.context());
        Self { module, ctx, func, block: None }
    }

    pub fn function(&self) -> FuncId {
        self.func
    }

    pub fn create_block(&mut self, name: Option<&str>) -> BlockId {
        self.module.function_mut(self.func).add_block(name)
    }

    pub fn position_at_end(&mut self, block: BlockId) {
        self.block = Some(block);
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.block
    }

    pub fn value_type(&self, value: &Value) -> TypeId {
        self.module.value_type(self.func, value)
    }

    /// Names parameter `index` in printed output.
    pub fn set_param_name(&mut self, index: usize, name: &str) {
        let names = &mut self.module.function_mut(self.func).param_names;
        if names.len() <= index {
            names.resize(index + 1, None);
        }
        names[index] = Some(name.to_owned());
    }

    fn push(&mut self, inst: Inst, ty: TypeId, name: Option<&str>) -> InstId {
        let block = self
            .block
            .unwrap_or_else(|| panic!("builder for {:?} is not positioned", self.func));
        let data = InstData { inst, ty, name: name.map(str::to_owned) };
        self.module.function_mut(self.func).push_inst(block, data)
    }

    fn push_value(&mut self, inst: Inst, ty: TypeId, name: Option<&str>) -> Value {
        Value::Inst(self.push(inst, ty, name))
    }

    pub fn load(&mut self, ptr: Value, name: Option<&str>) -> Value {
        let ptr_ty = self.value_type(&ptr);
        let ty = self
            .ctx
            .pointee_type(ptr_ty)
            .unwrap_or_else(|| panic!("load through non-pointer {}", self.ctx.type_name(ptr_ty)));
        self.push_value(Inst::Load { ptr }, ty, name)
    }

    pub fn store(&mut self, value: Value, ptr: Value) -> InstId {
        let void = self.ctx.void_type();
        self.push(Inst::Store { value, ptr }, void, None)
    }

    pub fn gep(&mut self, ptr: Value, indices: &[u32], name: Option<&str>) -> Value {
        let ptr_ty = self.value_type(&ptr);
        let address_space = self.ctx.address_space(ptr_ty).unwrap_or(0);
        let mut ty = self
            .ctx
            .pointee_type(ptr_ty)
            .unwrap_or_else(|| panic!("gep on non-pointer {}", self.ctx.type_name(ptr_ty)));
        for &index in indices.iter().skip(1) {
            ty = self
                .ctx
                .element_type(ty, index)
                .unwrap_or_else(|| panic!("gep index {index} out of range"));
        }
        let result = self.ctx.pointer_type(ty, address_space);
        self.push_value(Inst::Gep { ptr, indices: SmallVec::from_slice(indices) }, result, name)
    }

    /// Address of field `field` of the struct `ptr` points at.
    pub fn struct_gep(&mut self, ptr: Value, field: u32, name: Option<&str>) -> Value {
        self.gep(ptr, &[0, field], name)
    }

    pub fn cast(&mut self, op: CastOp, value: Value, ty: TypeId, name: Option<&str>) -> Value {
        self.push_value(Inst::Cast { op, value }, ty, name)
    }

    pub fn bitcast(&mut self, value: Value, ty: TypeId, name: Option<&str>) -> Value {
        self.cast(CastOp::BitCast, value, ty, name)
    }

    pub fn binary(&mut self, op: BinOp, lhs: Value, rhs: Value, name: Option<&str>) -> Value {
        let ty = self.value_type(&lhs);
        self.push_value(Inst::Binary { op, lhs, rhs }, ty, name)
    }

    pub fn call(&mut self, callee: Value, args: &[Value], name: Option<&str>) -> Value {
        let callee_ty = self.value_type(&callee);
        let fn_ty = self.ctx.pointee_type(callee_ty).unwrap_or(callee_ty);
        let ret = self
            .ctx
            .function_return(fn_ty)
            .unwrap_or_else(|| panic!("call through non-function {}", self.ctx.type_name(fn_ty)));
        let name = if self.ctx.is_void(ret) { None } else { name };
        self.push_value(Inst::Call { callee, args: args.iter().cloned().collect() }, ret, name)
    }

    pub fn switch(&mut self, cond: Value, default: BlockId) -> InstId {
        let void = self.ctx.void_type();
        self.push(Inst::Switch { cond, default, cases: SwitchCases::new() }, void, None)
    }

    pub fn br(&mut self, target: BlockId) -> InstId {
        let void = self.ctx.void_type();
        self.push(Inst::Br { target }, void, None)
    }

    pub fn ret(&mut self, value: Option<Value>) -> InstId {
        let void = self.ctx.void_type();
        self.push(Inst::Ret { value }, void, None)
    }

    pub fn unreachable(&mut self) -> InstId {
        let void = self.ctx.void_type();
        self.push(Inst::Unreachable, void, None)
    }
}
