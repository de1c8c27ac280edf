//! Reference interpreter.
//!
//! Executes IR functions on concrete arguments against a flat byte memory.
//! This is not a production backend: it exists so that the test suite can
//! state semantic-equivalence properties ("the transformed module computes
//! the same results as the original") the same way the bytecode world
//! validates transforms by simulating execution.
//!
//! Integer values are held canonically as `i64`, sign-extended from their
//! declared bit width. Pointers are byte offsets into the interpreter's
//! memory. Allocation is a bump pointer; nothing is ever freed, which is
//! adequate for the bounded programs the test suite runs.

use crate::function::{BlockId, Function};
use crate::instruction::{
    BinaryOp, CastOp, CmpPred, Constant, InstKind, Terminator, Value,
};
use crate::module::{FuncId, GlobalId, Initializer, Module};
use crate::types::TypeId;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("cannot execute declaration '{0}'")]
    Declaration(String),
    #[error("argument count mismatch calling '{0}'")]
    ArityMismatch(String),
    #[error("step limit exceeded")]
    StepLimit,
    #[error("call depth exceeded")]
    CallDepth,
    #[error("division by zero")]
    DivideByZero,
    #[error("memory access out of bounds at {0:#x}")]
    OutOfBounds(u64),
    #[error("executed an unreachable terminator")]
    UnreachableExecuted,
    #[error("phi has no incoming value for the taken edge")]
    PhiEdgeMissing,
    #[error("use of an instruction that has not executed")]
    UndefinedValue,
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

const MAX_CALL_DEPTH: usize = 128;

pub struct Interpreter<'m> {
    module: &'m Module,
    mem: Vec<u8>,
    global_addrs: HashMap<GlobalId, u64>,
    steps_left: u64,
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m Module) -> Self {
        let mut interp = Self {
            module,
            // keep address zero unused so null stays distinguishable
            mem: vec![0; 16],
            global_addrs: HashMap::new(),
            steps_left: 10_000_000,
        };
        for (id, global) in module.globals() {
            let size = module.types.byte_size(global.ty).unwrap_or(8).max(1);
            let addr = interp.bump(size);
            match &global.init {
                Some(Initializer::Bytes(bytes)) => {
                    let end = (addr as usize + bytes.len()).min(interp.mem.len());
                    let len = end - addr as usize;
                    interp.mem[addr as usize..end].copy_from_slice(&bytes[..len]);
                }
                Some(Initializer::Int { ty, value }) => {
                    let size = module.types.byte_size(*ty).unwrap_or(8);
                    interp.write_le(addr, *value as u64, size as usize);
                }
                Some(Initializer::Zero) | None => {}
            }
            interp.global_addrs.insert(id, addr);
        }
        interp
    }

    pub fn with_step_limit(mut self, steps: u64) -> Self {
        self.steps_left = steps;
        self
    }

    /// Calls a function by name with integer arguments; returns its result
    /// (`None` for void).
    pub fn call_by_name(&mut self, name: &str, args: &[i64]) -> Result<Option<i64>, EvalError> {
        let id = self
            .module
            .function_by_name(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        self.call(id, args)
    }

    pub fn call(&mut self, id: FuncId, args: &[i64]) -> Result<Option<i64>, EvalError> {
        let func = self.module.function(id);
        if args.len() != func.param_count() {
            return Err(EvalError::ArityMismatch(func.name.clone()));
        }
        let args: Vec<i64> = args
            .iter()
            .zip(&func.sig.params)
            .map(|(&a, &ty)| self.canon_typed(a, ty))
            .collect();
        self.run(id, args, 0)
    }

    /// Reads a NUL-terminated byte string at `addr`.
    pub fn read_c_string(&self, addr: i64) -> Vec<u8> {
        let mut out = Vec::new();
        let mut at = addr as usize;
        while at < self.mem.len() && self.mem[at] != 0 {
            out.push(self.mem[at]);
            at += 1;
        }
        out
    }

    fn run(&mut self, id: FuncId, args: Vec<i64>, depth: usize) -> Result<Option<i64>, EvalError> {
        if depth > MAX_CALL_DEPTH {
            return Err(EvalError::CallDepth);
        }
        let func = self.module.function(id);
        if func.is_declaration() {
            return Err(EvalError::Declaration(func.name.clone()));
        }
        let entry = func
            .entry()
            .ok_or_else(|| EvalError::Declaration(func.name.clone()))?;

        let mut values: HashMap<u32, i64> = HashMap::new();
        let mut block = entry;
        let mut prev: Option<BlockId> = None;
        loop {
            self.tick()?;
            let bb = func.block(block);

            // phis read their inputs simultaneously against the taken edge
            let mut phi_results = Vec::with_capacity(bb.phis.len());
            for &phi in &bb.phis {
                if let InstKind::Phi { incoming } = &func.inst(phi).kind {
                    let pred = prev.ok_or(EvalError::PhiEdgeMissing)?;
                    let (_, value) = incoming
                        .iter()
                        .find(|(b, _)| *b == pred)
                        .ok_or(EvalError::PhiEdgeMissing)?;
                    let v = self.eval(func, &values, &args, value)?;
                    phi_results.push((phi, self.canon_typed(v, func.inst(phi).ty)));
                }
            }
            for (phi, v) in phi_results {
                values.insert(phi.index() as u32, v);
            }

            for &inst in &bb.insts {
                self.tick()?;
                if let Some(result) = self.exec(func, &values, &args, inst, depth)? {
                    values.insert(inst.index() as u32, result);
                }
            }

            match &bb.terminator {
                Terminator::Br { target } => {
                    prev = Some(block);
                    block = *target;
                }
                Terminator::CondBr {
                    cond,
                    then_dest,
                    else_dest,
                } => {
                    let taken = self.eval(func, &values, &args, cond)? != 0;
                    prev = Some(block);
                    block = if taken { *then_dest } else { *else_dest };
                }
                Terminator::Switch {
                    value,
                    default,
                    cases,
                } => {
                    let v = self.eval(func, &values, &args, value)?;
                    prev = Some(block);
                    block = cases
                        .iter()
                        .find(|(case, _)| *case == v)
                        .map(|(_, b)| *b)
                        .unwrap_or(*default);
                }
                Terminator::Ret { value } => {
                    return match value {
                        Some(value) => Ok(Some(self.eval(func, &values, &args, value)?)),
                        None => Ok(None),
                    };
                }
                Terminator::Unreachable => return Err(EvalError::UnreachableExecuted),
            }
        }
    }

    fn exec(
        &mut self,
        func: &Function,
        values: &HashMap<u32, i64>,
        args: &[i64],
        inst_id: crate::instruction::InstId,
        depth: usize,
    ) -> Result<Option<i64>, EvalError> {
        let inst = func.inst(inst_id);
        let result = match &inst.kind {
            InstKind::Phi { .. } => return Err(EvalError::Unsupported("phi outside block head")),
            InstKind::Binary { op, lhs, rhs } => {
                let bits = self.module.types.bit_width(inst.ty).unwrap_or(64);
                let l = self.eval(func, values, args, lhs)?;
                let r = self.eval(func, values, args, rhs)?;
                Some(self.binary(*op, l, r, bits)?)
            }
            InstKind::Icmp { pred, lhs, rhs } => {
                let l = self.eval(func, values, args, lhs)?;
                let r = self.eval(func, values, args, rhs)?;
                let holds = match pred {
                    CmpPred::Eq => l == r,
                    CmpPred::Ne => l != r,
                    CmpPred::Slt => l < r,
                    CmpPred::Sle => l <= r,
                    CmpPred::Sgt => l > r,
                    CmpPred::Sge => l >= r,
                };
                Some(canon(holds as i128, 1))
            }
            InstKind::Load { ptr } => {
                let addr = self.eval(func, values, args, ptr)? as u64;
                let size = self.module.types.byte_size(inst.ty).unwrap_or(8) as usize;
                let raw = self.read_le(addr, size)?;
                Some(self.canon_typed(raw as i64, inst.ty))
            }
            InstKind::Store { value, ptr } => {
                let v = self.eval(func, values, args, value)?;
                let addr = self.eval(func, values, args, ptr)? as u64;
                let size = self
                    .value_type(func, value)
                    .and_then(|ty| self.module.types.byte_size(ty))
                    .unwrap_or(8) as usize;
                self.write_le_checked(addr, v as u64, size)?;
                None
            }
            InstKind::Alloca { elem, count } => {
                let elem_size = self.module.types.byte_size(*elem).unwrap_or(8).max(1);
                let count = match count {
                    Some(count) => self.eval(func, values, args, count)?.max(0) as u64,
                    None => 1,
                };
                Some(self.bump(elem_size * count.max(1)) as i64)
            }
            InstKind::Gep { elem, base, index } => {
                let base = self.eval(func, values, args, base)?;
                let index = self.eval(func, values, args, index)?;
                let size = self.module.types.byte_size(*elem).unwrap_or(1) as i64;
                Some(base.wrapping_add(index.wrapping_mul(size)))
            }
            InstKind::Call { callee, args: call_args } => {
                let mut lowered = Vec::with_capacity(call_args.len());
                for arg in call_args {
                    lowered.push(self.eval(func, values, args, arg)?);
                }
                let callee_func = self.module.function(*callee);
                let lowered: Vec<i64> = lowered
                    .into_iter()
                    .zip(&callee_func.sig.params)
                    .map(|(a, &ty)| self.canon_typed(a, ty))
                    .collect();
                self.run(*callee, lowered, depth + 1)?
            }
            InstKind::Select {
                cond,
                if_true,
                if_false,
            } => {
                let cond = self.eval(func, values, args, cond)?;
                let v = if cond != 0 {
                    self.eval(func, values, args, if_true)?
                } else {
                    self.eval(func, values, args, if_false)?
                };
                Some(v)
            }
            InstKind::Cast { op, value } => {
                let src_bits = self
                    .value_type(func, value)
                    .and_then(|ty| self.module.types.bit_width(ty))
                    .unwrap_or(64);
                let dst_bits = self.module.types.bit_width(inst.ty).unwrap_or(64);
                let v = self.eval(func, values, args, value)?;
                let out = match op {
                    CastOp::Zext => to_unsigned(v, src_bits) as i64,
                    CastOp::Sext => v,
                    CastOp::Trunc => canon(v as i128, dst_bits),
                    CastOp::Bitcast => v,
                };
                Some(self.canon_typed(out, inst.ty))
            }
        };
        Ok(result)
    }

    fn binary(&self, op: BinaryOp, l: i64, r: i64, bits: u8) -> Result<i64, EvalError> {
        let amount = |r: i64| (r as u64 % bits as u64) as u32;
        let out = match op {
            BinaryOp::Add => canon(l as i128 + r as i128, bits),
            BinaryOp::Sub => canon(l as i128 - r as i128, bits),
            BinaryOp::Mul => canon(l as i128 * r as i128, bits),
            BinaryOp::Div => {
                if r == 0 {
                    return Err(EvalError::DivideByZero);
                }
                canon(l as i128 / r as i128, bits)
            }
            BinaryOp::And => canon((l & r) as i128, bits),
            BinaryOp::Or => canon((l | r) as i128, bits),
            BinaryOp::Xor => canon((l ^ r) as i128, bits),
            BinaryOp::Shl => canon((l as i128) << amount(r), bits),
            BinaryOp::Lshr => canon((to_unsigned(l, bits) >> amount(r)) as i128, bits),
            BinaryOp::Ashr => canon((l >> amount(r)) as i128, bits),
        };
        Ok(out)
    }

    fn eval(
        &self,
        func: &Function,
        values: &HashMap<u32, i64>,
        args: &[i64],
        value: &Value,
    ) -> Result<i64, EvalError> {
        match value {
            Value::Inst(id) => values
                .get(&(id.index() as u32))
                .copied()
                .ok_or(EvalError::UndefinedValue),
            Value::Param(i) => args
                .get(*i as usize)
                .copied()
                .ok_or(EvalError::UndefinedValue),
            Value::Global(id) => self
                .global_addrs
                .get(id)
                .map(|&a| a as i64)
                .ok_or(EvalError::UndefinedValue),
            Value::Const(Constant::Int { ty, value }) => Ok(self.canon_typed(*value, *ty)),
            Value::Const(Constant::Null) => Ok(0),
        }
    }

    /// Static type of an operand, used for store/cast sizing. `None`
    /// means pointer-sized (globals and null have no interned type here).
    fn value_type(&self, func: &Function, value: &Value) -> Option<TypeId> {
        match value {
            Value::Inst(id) => Some(func.inst(*id).ty),
            Value::Param(i) => func.sig.params.get(*i as usize).copied(),
            Value::Global(_) | Value::Const(Constant::Null) => None,
            Value::Const(Constant::Int { ty, .. }) => Some(*ty),
        }
    }

    fn canon_typed(&self, v: i64, ty: TypeId) -> i64 {
        match self.module.types.bit_width(ty) {
            Some(bits) => canon(v as i128, bits),
            None => v,
        }
    }

    fn bump(&mut self, size: u64) -> u64 {
        let addr = self.mem.len() as u64;
        self.mem.extend(std::iter::repeat(0).take(size as usize));
        addr
    }

    fn tick(&mut self) -> Result<(), EvalError> {
        if self.steps_left == 0 {
            return Err(EvalError::StepLimit);
        }
        self.steps_left -= 1;
        Ok(())
    }

    fn read_le(&self, addr: u64, size: usize) -> Result<u64, EvalError> {
        let start = addr as usize;
        let end = start + size;
        if end > self.mem.len() {
            return Err(EvalError::OutOfBounds(addr));
        }
        let mut out = 0u64;
        for (i, &b) in self.mem[start..end].iter().enumerate() {
            out |= (b as u64) << (8 * i);
        }
        Ok(out)
    }

    fn write_le_checked(&mut self, addr: u64, value: u64, size: usize) -> Result<(), EvalError> {
        let start = addr as usize;
        let end = start + size;
        if end > self.mem.len() {
            return Err(EvalError::OutOfBounds(addr));
        }
        for i in 0..size {
            self.mem[start + i] = (value >> (8 * i)) as u8;
        }
        Ok(())
    }

    fn write_le(&mut self, addr: u64, value: u64, size: usize) {
        let _ = self.write_le_checked(addr, value, size);
    }
}

/// Sign-extends the low `bits` of `raw` into a canonical `i64`.
fn canon(raw: i128, bits: u8) -> i64 {
    if bits >= 64 {
        return raw as i64;
    }
    let mask = (1i128 << bits) - 1;
    let v = raw & mask;
    let sign = 1i128 << (bits - 1);
    ((v ^ sign) - sign) as i64
}

/// The low `bits` of a canonical value, zero-extended.
fn to_unsigned(v: i64, bits: u8) -> u64 {
    if bits >= 64 {
        v as u64
    } else {
        (v as u64) & ((1u64 << bits) - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{Linkage, Signature};
    use crate::module::GlobalVariable;

    #[test]
    fn evaluates_straight_line_arithmetic() {
        let mut module = Module::new("m");
        let i32_ty = module.types.int(32);
        let func = module.add_function(Function::new(
            "add",
            Signature {
                ret: i32_ty,
                params: vec![i32_ty, i32_ty],
            },
            Linkage::External,
        ));
        let mut b = module.builder(func);
        let sum = b.binary(BinaryOp::Add, i32_ty, Value::Param(0), Value::Param(1));
        b.ret(Some(sum));

        let mut interp = Interpreter::new(&module);
        assert_eq!(interp.call_by_name("add", &[3, 5]).unwrap(), Some(8));
        assert_eq!(interp.call_by_name("add", &[-1, 1]).unwrap(), Some(0));
        // 32-bit wrap-around
        assert_eq!(
            interp.call_by_name("add", &[i32::MAX as i64, 1]).unwrap(),
            Some(i32::MIN as i64)
        );
    }

    #[test]
    fn evaluates_loops_through_memory() {
        // sum = 0; for (i = n; i > 0; i--) sum += i; return sum;
        let mut module = Module::new("m");
        let i32_ty = module.types.int(32);
        let func = module.add_function(Function::new(
            "triangle",
            Signature {
                ret: i32_ty,
                params: vec![i32_ty],
            },
            Linkage::External,
        ));
        let mut b = module.builder(func);
        let header = b.block("header");
        let body = b.block("body");
        let done = b.block("done");
        let sum_slot = b.alloca(i32_ty, None);
        let i_slot = b.alloca(i32_ty, None);
        b.store(Value::const_int(i32_ty, 0), sum_slot);
        b.store(Value::Param(0), i_slot);
        b.br(header);

        b.switch_to(header);
        let i = b.load(i32_ty, i_slot);
        let more = b.icmp(CmpPred::Sgt, i, Value::const_int(i32_ty, 0));
        b.cond_br(more, body, done);

        b.switch_to(body);
        let i = b.load(i32_ty, i_slot);
        let sum = b.load(i32_ty, sum_slot);
        let sum = b.binary(BinaryOp::Add, i32_ty, sum, i);
        b.store(sum, sum_slot);
        let next = b.binary(BinaryOp::Sub, i32_ty, i, Value::const_int(i32_ty, 1));
        b.store(next, i_slot);
        b.br(header);

        b.switch_to(done);
        let sum = b.load(i32_ty, sum_slot);
        b.ret(Some(sum));

        crate::verify::verify_module(&module).unwrap();
        let mut interp = Interpreter::new(&module);
        assert_eq!(interp.call_by_name("triangle", &[10]).unwrap(), Some(55));
        assert_eq!(interp.call_by_name("triangle", &[0]).unwrap(), Some(0));
    }

    #[test]
    fn reads_global_strings() {
        let mut module = Module::new("m");
        let i8_ty = module.types.int(8);
        let arr = module.types.array(i8_ty, 6);
        let gid = module.add_global(GlobalVariable {
            name: "greeting".into(),
            ty: arr,
            is_constant: true,
            linkage: Linkage::Private,
            init: Some(Initializer::Bytes(b"Hello\0".to_vec())),
        });
        let ptr = module.types.ptr();
        let func = module.add_function(Function::new(
            "greeting_ptr",
            Signature {
                ret: ptr,
                params: vec![],
            },
            Linkage::External,
        ));
        let mut b = module.builder(func);
        b.ret(Some(Value::Global(gid)));

        let mut interp = Interpreter::new(&module);
        let addr = interp.call_by_name("greeting_ptr", &[]).unwrap().unwrap();
        assert_eq!(interp.read_c_string(addr), b"Hello");
    }
}
