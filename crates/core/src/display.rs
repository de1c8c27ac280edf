//! Textual rendering of modules, for logs and golden tests.
//!
//! The format is deliberately close to the usual SSA assembly style:
//! `%vN` for instruction results, `%N` for parameters, `@name` for
//! globals, labels followed by a colon.

use crate::function::{BlockId, Function};
use crate::instruction::{Constant, InstId, InstKind, Terminator, Value};
use crate::module::{Initializer, Module};
use crate::types::{Type, TypeId};
use std::fmt::{self, Write};

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module '{}'", self.name)?;
        for (_, global) in self.globals() {
            let mut line = String::new();
            write!(
                line,
                "@{} = {} {}",
                global.name,
                linkage_str(global.linkage),
                if global.is_constant { "constant" } else { "global" },
            )?;
            write!(line, " {}", type_str(self, global.ty))?;
            match &global.init {
                Some(Initializer::Bytes(bytes)) => write!(line, " c\"{}\"", escape_bytes(bytes))?,
                Some(Initializer::Int { value, .. }) => write!(line, " {value}")?,
                Some(Initializer::Zero) => write!(line, " zeroinitializer")?,
                None => {}
            }
            writeln!(f, "{line}")?;
        }
        for (_, func) in self.functions() {
            writeln!(f)?;
            write_function(f, self, func)?;
        }
        Ok(())
    }
}

fn write_function(f: &mut fmt::Formatter<'_>, module: &Module, func: &Function) -> fmt::Result {
    let params = func
        .sig
        .params
        .iter()
        .enumerate()
        .map(|(i, &ty)| format!("{} %{}", type_str(module, ty), i))
        .collect::<Vec<_>>()
        .join(", ");
    let header = format!(
        "{} {} @{}({})",
        linkage_str(func.linkage),
        type_str(module, func.sig.ret),
        func.name,
        params
    );
    if func.is_declaration() {
        return writeln!(f, "declare {header}");
    }
    writeln!(f, "define {header} {{")?;
    for block in func.block_ids() {
        write_block(f, module, func, block)?;
    }
    writeln!(f, "}}")
}

fn write_block(
    f: &mut fmt::Formatter<'_>,
    module: &Module,
    func: &Function,
    block: BlockId,
) -> fmt::Result {
    let bb = func.block(block);
    writeln!(f, "{}:", bb.label)?;
    for &id in bb.phis.iter().chain(bb.insts.iter()) {
        writeln!(f, "  {}", inst_str(module, func, id))?;
    }
    writeln!(f, "  {}", term_str(module, func, &bb.terminator))
}

fn inst_str(module: &Module, func: &Function, id: InstId) -> String {
    let inst = func.inst(id);
    let result = if module.types.is_void(inst.ty) {
        String::new()
    } else {
        format!("%v{} = ", id.index())
    };
    let ty = type_str(module, inst.ty);
    let body = match &inst.kind {
        InstKind::Phi { incoming } => {
            let arms = incoming
                .iter()
                .map(|(b, v)| format!("[ {}, {} ]", value_str(module, v), func.block(*b).label))
                .collect::<Vec<_>>()
                .join(", ");
            format!("phi {ty} {arms}")
        }
        InstKind::Binary { op, lhs, rhs } => format!(
            "{} {ty} {}, {}",
            op.mnemonic(),
            value_str(module, lhs),
            value_str(module, rhs)
        ),
        InstKind::Icmp { pred, lhs, rhs } => format!(
            "icmp {} {}, {}",
            pred.mnemonic(),
            value_str(module, lhs),
            value_str(module, rhs)
        ),
        InstKind::Load { ptr } => format!("load {ty}, {}", value_str(module, ptr)),
        InstKind::Store { value, ptr } => format!(
            "store {}, {}",
            value_str(module, value),
            value_str(module, ptr)
        ),
        InstKind::Alloca { elem, count } => match count {
            Some(count) => format!(
                "alloca {}, {}",
                type_str(module, *elem),
                value_str(module, count)
            ),
            None => format!("alloca {}", type_str(module, *elem)),
        },
        InstKind::Gep { elem, base, index } => format!(
            "gep {}, {}, {}",
            type_str(module, *elem),
            value_str(module, base),
            value_str(module, index)
        ),
        InstKind::Call { callee, args } => {
            let args = args
                .iter()
                .map(|v| value_str(module, v))
                .collect::<Vec<_>>()
                .join(", ");
            format!("call {ty} @{}({args})", module.function(*callee).name)
        }
        InstKind::Select {
            cond,
            if_true,
            if_false,
        } => format!(
            "select {}, {}, {}",
            value_str(module, cond),
            value_str(module, if_true),
            value_str(module, if_false)
        ),
        InstKind::Cast { op, value } => {
            let op = match op {
                crate::instruction::CastOp::Zext => "zext",
                crate::instruction::CastOp::Sext => "sext",
                crate::instruction::CastOp::Trunc => "trunc",
                crate::instruction::CastOp::Bitcast => "bitcast",
            };
            format!("{op} {} to {ty}", value_str(module, value))
        }
    };
    format!("{result}{body}")
}

fn term_str(module: &Module, func: &Function, term: &Terminator) -> String {
    match term {
        Terminator::Br { target } => format!("br label {}", func.block(*target).label),
        Terminator::CondBr {
            cond,
            then_dest,
            else_dest,
        } => format!(
            "br {}, label {}, label {}",
            value_str(module, cond),
            func.block(*then_dest).label,
            func.block(*else_dest).label
        ),
        Terminator::Switch {
            value,
            default,
            cases,
        } => {
            let arms = cases
                .iter()
                .map(|(v, b)| format!("{v} -> {}", func.block(*b).label))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "switch {}, default {} [{arms}]",
                value_str(module, value),
                func.block(*default).label
            )
        }
        Terminator::Ret { value: Some(value) } => format!("ret {}", value_str(module, value)),
        Terminator::Ret { value: None } => "ret void".to_string(),
        Terminator::Unreachable => "unreachable".to_string(),
    }
}

fn value_str(module: &Module, value: &Value) -> String {
    match value {
        Value::Inst(id) => format!("%v{}", id.index()),
        Value::Param(i) => format!("%{i}"),
        Value::Global(id) => match module.global(*id) {
            Some(g) => format!("@{}", g.name),
            None => "@<removed>".to_string(),
        },
        Value::Const(Constant::Int { value, .. }) => value.to_string(),
        Value::Const(Constant::Null) => "null".to_string(),
    }
}

fn type_str(module: &Module, id: TypeId) -> String {
    match module.types.get(id) {
        Type::Void => "void".to_string(),
        Type::Int(bits) => format!("i{bits}"),
        Type::Ptr => "ptr".to_string(),
        Type::Array { elem, len } => format!("[{len} x {}]", type_str(module, *elem)),
        Type::Func { ret, params } => {
            let params = params
                .iter()
                .map(|&p| type_str(module, p))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} ({params})", type_str(module, *ret))
        }
    }
}

fn linkage_str(linkage: crate::function::Linkage) -> &'static str {
    match linkage {
        crate::function::Linkage::External => "external",
        crate::function::Linkage::Internal => "internal",
        crate::function::Linkage::Private => "private",
    }
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        if (0x20..0x7f).contains(&b) && b != b'"' && b != b'\\' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\{b:02x}"));
        }
    }
    out
}
