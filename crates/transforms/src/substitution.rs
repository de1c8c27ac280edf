//! Instruction substitution.
//!
//! Rewrites integer add, sub and power-of-two mul into equivalent
//! bit-twiddling sequences:
//!
//! - `a + b`  →  `(a ^ b) + ((a & b) << 1)`
//! - `a - b`  →  `(a ^ b) - ((~a & b) << 1)`
//! - `a * c`  →  `a << log2(c)` for constant power-of-two `c`
//!
//! The identities hold bitwise in two's complement, overflow included, so
//! the rewrite is exact for every operand pair. Non-power-of-two
//! multiplies are left untouched. The original instruction keeps its id
//! and is rewritten in place, so no use-site ever needs patching.

use crate::Transform;
use rand::rngs::StdRng;
use tracing::debug;
use umbra_core::{BinaryOp, InstKind, Instruction, Module, TypeId, Value};
use umbra_utils::errors::TransformError;

pub struct InstructionSubstitution;

impl Transform for InstructionSubstitution {
    fn name(&self) -> &'static str {
        "instruction_substitution"
    }

    fn apply(&self, module: &mut Module, _rng: &mut StdRng) -> Result<bool, TransformError> {
        let mut rewritten = 0usize;
        for fid in module.func_ids() {
            if module.function(fid).is_declaration() {
                continue;
            }
            let blocks: Vec<_> = module.function(fid).block_ids().collect();
            for block in blocks {
                // walk backwards so insertions never shift unvisited slots
                let len = module.function(fid).block(block).insts.len();
                for pos in (0..len).rev() {
                    let iid = module.function(fid).block(block).insts[pos];
                    let inst = module.function(fid).inst(iid);
                    let Some(bits) = module.types.bit_width(inst.ty) else {
                        continue;
                    };
                    if bits > 64 {
                        continue;
                    }
                    let ty = inst.ty;
                    let (op, lhs, rhs) = match &inst.kind {
                        InstKind::Binary { op, lhs, rhs }
                            if matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul) =>
                        {
                            (*op, *lhs, *rhs)
                        }
                        _ => continue,
                    };

                    let func = module.function_mut(fid);
                    let one = Value::const_int(ty, 1);
                    match op {
                        BinaryOp::Add => {
                            let xor = func.insert_inst(
                                block,
                                pos,
                                bin(BinaryOp::Xor, ty, lhs, rhs),
                            );
                            let and = func.insert_inst(
                                block,
                                pos + 1,
                                bin(BinaryOp::And, ty, lhs, rhs),
                            );
                            let carry = func.insert_inst(
                                block,
                                pos + 2,
                                bin(BinaryOp::Shl, ty, Value::Inst(and), one),
                            );
                            func.inst_mut(iid).kind = InstKind::Binary {
                                op: BinaryOp::Add,
                                lhs: Value::Inst(xor),
                                rhs: Value::Inst(carry),
                            };
                            rewritten += 1;
                        }
                        BinaryOp::Sub => {
                            let xor = func.insert_inst(
                                block,
                                pos,
                                bin(BinaryOp::Xor, ty, lhs, rhs),
                            );
                            let not_lhs = func.insert_inst(
                                block,
                                pos + 1,
                                bin(BinaryOp::Xor, ty, lhs, Value::const_int(ty, -1)),
                            );
                            let and = func.insert_inst(
                                block,
                                pos + 2,
                                bin(BinaryOp::And, ty, Value::Inst(not_lhs), rhs),
                            );
                            let borrow = func.insert_inst(
                                block,
                                pos + 3,
                                bin(BinaryOp::Shl, ty, Value::Inst(and), one),
                            );
                            func.inst_mut(iid).kind = InstKind::Binary {
                                op: BinaryOp::Sub,
                                lhs: Value::Inst(xor),
                                rhs: Value::Inst(borrow),
                            };
                            rewritten += 1;
                        }
                        BinaryOp::Mul => {
                            let Some(c) = rhs.as_const_int() else { continue };
                            if c <= 0 || (c & (c - 1)) != 0 {
                                continue;
                            }
                            let shift = c.trailing_zeros();
                            if shift >= bits as u32 {
                                continue;
                            }
                            func.inst_mut(iid).kind = InstKind::Binary {
                                op: BinaryOp::Shl,
                                lhs,
                                rhs: Value::const_int(ty, shift as i64),
                            };
                            rewritten += 1;
                        }
                        _ => {}
                    }
                }
            }
        }
        if rewritten > 0 {
            debug!("substituted {rewritten} arithmetic instructions");
        }
        Ok(rewritten > 0)
    }
}

fn bin(op: BinaryOp, ty: TypeId, lhs: Value, rhs: Value) -> Instruction {
    Instruction::new(InstKind::Binary { op, lhs, rhs }, ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use umbra_core::interp::Interpreter;
    use umbra_core::{Function, Linkage, Signature};

    fn binop_module(op: BinaryOp) -> Module {
        let mut module = Module::new("m");
        let i32_ty = module.types.int(32);
        let func = module.add_function(Function::new(
            "f",
            Signature {
                ret: i32_ty,
                params: vec![i32_ty, i32_ty],
            },
            Linkage::External,
        ));
        let mut b = module.builder(func);
        let out = b.binary(op, i32_ty, Value::Param(0), Value::Param(1));
        b.ret(Some(out));
        module
    }

    fn run(module: &mut Module) {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(InstructionSubstitution.apply(module, &mut rng).unwrap());
        umbra_core::verify_module(module).unwrap();
    }

    #[test]
    fn addition_survives_substitution() {
        let mut module = binop_module(BinaryOp::Add);
        run(&mut module);
        let mut interp = Interpreter::new(&module);
        for (a, b) in [(3, 5), (-1, 1), (i32::MAX as i64, 1), (-7, -9), (0, 0)] {
            assert_eq!(
                interp.call_by_name("f", &[a, b]).unwrap(),
                Some((a as i32).wrapping_add(b as i32) as i64),
                "a={a} b={b}"
            );
        }
    }

    #[test]
    fn subtraction_survives_substitution() {
        let mut module = binop_module(BinaryOp::Sub);
        run(&mut module);
        let mut interp = Interpreter::new(&module);
        for (a, b) in [(8, 3), (0, 1), (i32::MIN as i64, 1), (-5, -5), (100, -100)] {
            assert_eq!(
                interp.call_by_name("f", &[a, b]).unwrap(),
                Some((a as i32).wrapping_sub(b as i32) as i64),
                "a={a} b={b}"
            );
        }
    }

    #[test]
    fn power_of_two_multiply_becomes_shift() {
        let mut module = Module::new("m");
        let i32_ty = module.types.int(32);
        let func = module.add_function(Function::new(
            "times8",
            Signature {
                ret: i32_ty,
                params: vec![i32_ty],
            },
            Linkage::External,
        ));
        let mut b = module.builder(func);
        let out = b.binary(
            BinaryOp::Mul,
            i32_ty,
            Value::Param(0),
            Value::const_int(i32_ty, 8),
        );
        b.ret(Some(out));
        run(&mut module);

        let fid = module.function_by_name("times8").unwrap();
        let func = module.function(fid);
        let entry = func.entry().unwrap();
        let kinds: Vec<_> = func
            .block(entry)
            .insts
            .iter()
            .map(|&i| &func.inst(i).kind)
            .collect();
        assert!(kinds.iter().any(|k| matches!(
            k,
            InstKind::Binary {
                op: BinaryOp::Shl,
                ..
            }
        )));

        let mut interp = Interpreter::new(&module);
        assert_eq!(interp.call_by_name("times8", &[5]).unwrap(), Some(40));
        assert_eq!(interp.call_by_name("times8", &[-3]).unwrap(), Some(-24));
    }

    #[test]
    fn odd_multiplier_is_left_alone() {
        let mut module = Module::new("m");
        let i32_ty = module.types.int(32);
        let func = module.add_function(Function::new(
            "times3",
            Signature {
                ret: i32_ty,
                params: vec![i32_ty],
            },
            Linkage::External,
        ));
        let mut b = module.builder(func);
        let out = b.binary(
            BinaryOp::Mul,
            i32_ty,
            Value::Param(0),
            Value::const_int(i32_ty, 3),
        );
        b.ret(Some(out));

        let mut rng = StdRng::seed_from_u64(0);
        let changed = InstructionSubstitution.apply(&mut module, &mut rng).unwrap();
        assert!(!changed);
    }

    #[test]
    fn repeated_application_accumulates() {
        let mut module = binop_module(BinaryOp::Add);
        run(&mut module);
        let first = module.inst_count();
        run(&mut module);
        assert!(module.inst_count() > first);
        let mut interp = Interpreter::new(&module);
        assert_eq!(interp.call_by_name("f", &[3, 5]).unwrap(), Some(8));
    }
}
