use std::fmt::{self, Write};

use crate::context::Context;
use crate::function::Function;
use crate::instruction::Inst;
use crate::ir_hasher::HashMap;
use crate::metadata::{MdNodeId, MdOperand};
use crate::module::Module;
use crate::types::TypeId;
use crate::value::{Constant, FuncId, InstId, Value};

/// Renders a module as LLVM-flavoured text.
///
/// Metadata nodes are numbered by first reach from the named lists, so two
/// modules whose side tables have the same shape print identically.
pub struct IrPrettyPrinter<'m> {
    module: &'m Module,
    indent_size: usize,
}

impl<'m> IrPrettyPrinter<'m> {
    pub fn new(module: &'m Module) -> Self {
        Self { module, indent_size: 2 }
    }

    /// Set the indentation size (default is 2 spaces)
    pub fn with_indent_size(mut self, size: usize) -> Self {
        self.indent_size = size;
        self
    }

    fn ctx(&self) -> &Context {
        self.module.context()
    }

    fn indent(&self) -> String {
        " ".repeat(self.indent_size)
    }

    pub fn format_module(&self) -> Result<String, fmt::Error> {
        let mut out = String::new();
        let m = self.module;
        writeln!(out, "; ModuleID = '{}'", m.name())?;
        if !m.target_triple.is_empty() {
            writeln!(out, "target triple = \"{}\"", m.target_triple)?;
        }

        let structs = m.identified_struct_types();
        if !structs.is_empty() {
            writeln!(out)?;
        }
        let mut named: Vec<(String, TypeId)> = structs
            .into_iter()
            .map(|t| (self.ctx().type_name(t), t))
            .collect();
        named.sort();
        for (name, ty) in named {
            writeln!(out, "{name} = type {}", self.ctx().struct_body_string(ty))?;
        }

        for (_, g) in m.globals() {
            writeln!(out)?;
            let kind = if g.constant { "constant" } else { "global" };
            write!(out, "@{} = {}{kind} {}", g.name(), g.linkage.keyword(), self.ctx().type_name(g.value_type))?;
            if let Some(init) = &g.initializer {
                write!(out, " {}", self.constant(init))?;
            }
            writeln!(out)?;
        }
        for (_, a) in m.aliases() {
            writeln!(out)?;
            writeln!(
                out,
                "@{} = {}alias {}, {}",
                a.name(),
                a.linkage.keyword(),
                self.ctx().type_name(a.value_type),
                self.typed_constant(&a.aliasee)
            )?;
        }
        if !m.global_ctors().is_empty() {
            writeln!(out)?;
            let entries: Vec<String> = m
                .global_ctors()
                .iter()
                .map(|c| format!("{{ i32 {}, {} }}", c.priority, self.constant(&c.function)))
                .collect();
            writeln!(out, "@llvm.global_ctors = [{}]", entries.join(", "))?;
        }

        for (id, f) in m.functions() {
            writeln!(out)?;
            self.format_function(&mut out, id, f)?;
        }

        self.format_metadata(&mut out)?;
        Ok(out)
    }

    fn format_function(&self, out: &mut String, id: FuncId, f: &Function) -> fmt::Result {
        let ctx = self.ctx();
        let (ret, params, var_arg) = ctx.function_signature(f.ty).unwrap_or((f.ty, Default::default(), false));
        let keyword = if f.is_declaration() { "declare" } else { "define" };
        write!(out, "{keyword} {}{} @{}(", f.linkage.keyword(), ctx.type_name(ret), f.name())?;
        for (i, p) in params.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            write!(out, "{} {}", ctx.type_name(*p), self.arg_name(f, i as u32))?;
        }
        if var_arg {
            out.push_str(if params.is_empty() { "..." } else { ", ..." });
        }
        out.push(')');
        if let Some(section) = &f.section {
            write!(out, " section \"{section}\"")?;
        }
        if f.is_declaration() {
            return writeln!(out);
        }
        writeln!(out, " {{")?;
        for (block_id, block) in f.blocks() {
            if block_id.index() > 0 {
                writeln!(out)?;
            }
            writeln!(out, "{}:", self.block_name(f, block_id.index()))?;
            for &inst_id in &block.insts {
                write!(out, "{}", self.indent())?;
                self.format_inst(out, id, f, inst_id)?;
                writeln!(out)?;
            }
        }
        writeln!(out, "}}")
    }

    fn format_inst(&self, out: &mut String, id: FuncId, f: &Function, inst_id: InstId) -> fmt::Result {
        let ctx = self.ctx();
        let data = f.inst(inst_id);
        let operand = |v: &Value| self.typed_value(id, f, v);
        if !ctx.is_void(data.ty) {
            write!(out, "{} = ", self.inst_name(f, inst_id.index()))?;
        }
        match &data.inst {
            Inst::Load { ptr } => write!(out, "load {}, {}", ctx.type_name(data.ty), operand(ptr)),
            Inst::Store { value, ptr } => write!(out, "store {}, {}", operand(value), operand(ptr)),
            Inst::Gep { ptr, indices } => {
                let base = ctx.pointee_type(self.module.value_type(id, ptr)).unwrap_or(data.ty);
                write!(out, "getelementptr {}, {}", ctx.type_name(base), operand(ptr))?;
                for index in indices {
                    write!(out, ", i32 {index}")?;
                }
                Ok(())
            }
            Inst::Cast { op, value } => {
                write!(out, "{} {} to {}", op.mnemonic(), operand(value), ctx.type_name(data.ty))
            }
            Inst::Binary { op, lhs, rhs } => {
                write!(out, "{} {}, {}", op.mnemonic(), operand(lhs), self.value(f, rhs))
            }
            Inst::Call { callee, args } => {
                let args: Vec<String> = args.iter().map(operand).collect();
                write!(
                    out,
                    "call {} {}({})",
                    ctx.type_name(data.ty),
                    self.value(f, callee),
                    args.join(", ")
                )
            }
            Inst::Switch { cond, default, cases } => {
                write!(out, "switch {}, label %{} [", operand(cond), self.block_name(f, default.index()))?;
                let cond_ty = ctx.type_name(self.module.value_type(id, cond));
                for (value, dest) in cases {
                    write!(out, " {cond_ty} {value}, label %{}", self.block_name(f, dest.index()))?;
                }
                out.push_str(if cases.is_empty() { "]" } else { " ]" });
                Ok(())
            }
            Inst::Br { target } => write!(out, "br label %{}", self.block_name(f, target.index())),
            Inst::Ret { value: Some(v) } => write!(out, "ret {}", operand(v)),
            Inst::Ret { value: None } => write!(out, "ret void"),
            Inst::Unreachable => write!(out, "unreachable"),
        }
    }

    fn arg_name(&self, f: &Function, index: u32) -> String {
        match f.param_names.get(index as usize).and_then(Option::as_deref) {
            Some(name) => format!("%{name}"),
            None => format!("%arg{index}"),
        }
    }

    fn inst_name(&self, f: &Function, index: usize) -> String {
        match &f.body().0[index].name {
            Some(name) => format!("%{name}.{index}"),
            None => format!("%{index}"),
        }
    }

    fn block_name(&self, f: &Function, index: usize) -> String {
        match &f.body().1[index].name {
            Some(name) => name.clone(),
            None => format!("bb{index}"),
        }
    }

    fn value(&self, f: &Function, v: &Value) -> String {
        match v {
            Value::Arg(n) => self.arg_name(f, *n),
            Value::Inst(inst) => self.inst_name(f, inst.index()),
            Value::Const(c) => self.constant(c),
        }
    }

    fn typed_value(&self, id: FuncId, f: &Function, v: &Value) -> String {
        let ty = self.module.value_type(id, v);
        format!("{} {}", self.ctx().type_name(ty), self.value(f, v))
    }

    fn typed_constant(&self, c: &Constant) -> String {
        format!("{} {}", self.ctx().type_name(self.module.constant_type(c)), self.constant(c))
    }

    fn constant(&self, c: &Constant) -> String {
        match c {
            Constant::Int { value, .. } => value.to_string(),
            Constant::Float { value, .. } => format!("{value:e}"),
            Constant::Null(_) => "null".to_owned(),
            Constant::Undef(_) => "undef".to_owned(),
            Constant::Zero(_) => "zeroinitializer".to_owned(),
            Constant::Aggregate { elements, .. } => {
                let parts: Vec<String> = elements.iter().map(|e| self.typed_constant(e)).collect();
                format!("{{ {} }}", parts.join(", "))
            }
            Constant::Global(g) => format!("@{}", self.module.global_name(*g)),
        }
    }

    // =====================================================
    // Metadata
    // =====================================================

    fn format_metadata(&self, out: &mut String) -> fmt::Result {
        let table = self.module.metadata();
        let mut numbering: HashMap<MdNodeId, usize> = HashMap::default();
        let mut order: Vec<MdNodeId> = Vec::new();
        for list in table.named_lists() {
            for &node in &list.nodes {
                self.number_node(node, &mut numbering, &mut order);
            }
        }

        let mut wrote_header = false;
        for list in table.named_lists() {
            if !wrote_header {
                writeln!(out)?;
                wrote_header = true;
            }
            let refs: Vec<String> = list.nodes.iter().map(|n| format!("!{}", numbering[n])).collect();
            writeln!(out, "!{} = !{{{}}}", list.name, refs.join(", "))?;
        }
        for (number, node) in order.iter().enumerate() {
            let Some(md) = table.node(*node) else {
                continue;
            };
            let ops: Vec<String> = md.operands.iter().map(|op| self.md_operand(op, &numbering)).collect();
            writeln!(out, "!{number} = !{{{}}}", ops.join(", "))?;
        }
        Ok(())
    }

    fn number_node(&self, root: MdNodeId, numbering: &mut HashMap<MdNodeId, usize>, order: &mut Vec<MdNodeId>) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if numbering.contains_key(&node) {
                continue;
            }
            numbering.insert(node, order.len());
            order.push(node);
            if let Some(md) = self.module.metadata().node(node) {
                for op in md.operands.iter().rev() {
                    if let MdOperand::Node(child) = op {
                        stack.push(*child);
                    }
                }
            }
        }
    }

    fn md_operand(&self, op: &MdOperand, numbering: &HashMap<MdNodeId, usize>) -> String {
        match op {
            MdOperand::Null => "null".to_owned(),
            MdOperand::String(s) => format!("!\"{}\"", s.escape_default()),
            MdOperand::Int { bits, value } => format!("i{bits} {value}"),
            MdOperand::Type(t) => format!("type {}", self.ctx().type_name(*t)),
            MdOperand::Value(c) => self.typed_constant(c),
            MdOperand::Node(n) => match numbering.get(n) {
                Some(number) => format!("!{number}"),
                None => "!<dangling>".to_owned(),
            },
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&IrPrettyPrinter::new(self).format_module()?)
    }
}
