//! Bogus control flow.
//!
//! Splits eligible blocks around an opaque-true predicate,
//! `((x * (x + 1)) mod 2) == 0` for a fresh constant x, which holds for
//! every integer because x·(x+1) is a product of consecutive integers.
//! Static analysis sees two plausible paths; at runtime control always
//! flows through `bogus_true` into the join block carrying the original
//! suffix. Both junk arms are filled with distinct meaningless
//! alloca/store/load/arithmetic sequences.

use crate::{PassConfig, Transform, RESERVED_PREFIX};
use rand::{rngs::StdRng, Rng};
use tracing::debug;
use umbra_core::{
    BinaryOp, BlockId, CmpPred, FuncId, InstKind, Instruction, Module, Terminator, TypeId, Value,
};
use umbra_utils::errors::TransformError;

pub struct BogusControlFlow {
    config: PassConfig,
}

impl BogusControlFlow {
    pub fn new(config: PassConfig) -> Self {
        Self { config }
    }
}

impl Transform for BogusControlFlow {
    fn name(&self) -> &'static str {
        "bogus_control_flow"
    }

    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool, TransformError> {
        let i1_ty = module.types.int(1);
        let i32_ty = module.types.int(32);
        let void_ty = module.types.void();
        let ptr_ty = module.types.ptr();
        let tys = Tys {
            i1: i1_ty,
            i32: i32_ty,
            void: void_ty,
            ptr: ptr_ty,
        };

        let mut inserted = 0usize;
        for fid in module.func_ids() {
            {
                let func = module.function(fid);
                if func.is_declaration()
                    || func.name.starts_with(RESERVED_PREFIX)
                    || func.num_blocks() < 2
                {
                    continue;
                }
            }
            let originals: Vec<BlockId> = module.function(fid).block_ids().collect();
            for block in originals {
                if !rng.random_bool(self.config.bogus_ratio) {
                    continue;
                }
                if !eligible(module, fid, block) {
                    continue;
                }
                insert_bogus_flow(module, fid, block, &tys, rng);
                inserted += 1;
            }
        }
        if inserted > 0 {
            debug!("inserted {inserted} bogus branches");
        }
        Ok(inserted > 0)
    }
}

struct Tys {
    i1: TypeId,
    i32: TypeId,
    void: TypeId,
    ptr: TypeId,
}

/// Phi-free blocks ending in a plain branch or return.
fn eligible(module: &Module, fid: FuncId, block: BlockId) -> bool {
    let bb = module.function(fid).block(block);
    bb.phis.is_empty()
        && matches!(
            bb.terminator,
            Terminator::Br { .. } | Terminator::CondBr { .. } | Terminator::Ret { .. }
        )
}

fn insert_bogus_flow(module: &mut Module, fid: FuncId, block: BlockId, tys: &Tys, rng: &mut StdRng) {
    let func = module.function_mut(fid);

    let split = rng.random_range(0..=func.block(block).insts.len());
    let suffix = func.block_mut(block).insts.split_off(split);
    let original_term =
        std::mem::replace(&mut func.block_mut(block).terminator, Terminator::Unreachable);

    // opaque predicate over a fresh constant
    let x = Value::const_int(tys.i32, rng.random_range(1..=100));
    let one = Value::const_int(tys.i32, 1);
    let x_plus_1 = func.append_inst(
        block,
        Instruction::new(
            InstKind::Binary {
                op: BinaryOp::Add,
                lhs: x,
                rhs: one,
            },
            tys.i32,
        ),
    );
    let product = func.append_inst(
        block,
        Instruction::new(
            InstKind::Binary {
                op: BinaryOp::Mul,
                lhs: x,
                rhs: Value::Inst(x_plus_1),
            },
            tys.i32,
        ),
    );
    let parity = func.append_inst(
        block,
        Instruction::new(
            InstKind::Binary {
                op: BinaryOp::And,
                lhs: Value::Inst(product),
                rhs: one,
            },
            tys.i32,
        ),
    );
    let is_even = func.append_inst(
        block,
        Instruction::new(
            InstKind::Icmp {
                pred: CmpPred::Eq,
                lhs: Value::Inst(parity),
                rhs: Value::const_int(tys.i32, 0),
            },
            tys.i1,
        ),
    );

    let tag = func.num_blocks();
    let bogus_true = func.add_block(format!("bogus_true{tag}"));
    let bogus_false = func.add_block(format!("bogus_false{tag}"));
    let bogus_join = func.add_block(format!("bogus_join{tag}"));

    // the join inherits the suffix and the original terminator, so every
    // successor's phi must now name the join as its predecessor
    func.block_mut(bogus_join).insts = suffix;
    for succ in original_term.successors() {
        replace_phi_pred(func, succ, block, bogus_join);
    }
    func.set_terminator(bogus_join, original_term);

    func.set_terminator(
        block,
        Terminator::CondBr {
            cond: Value::Inst(is_even),
            then_dest: bogus_true,
            else_dest: bogus_false,
        },
    );

    // junk arm one: slot = 42; slot += 13
    let slot = func.append_inst(
        bogus_true,
        Instruction::new(
            InstKind::Alloca {
                elem: tys.i32,
                count: None,
            },
            tys.ptr,
        ),
    );
    store(func, bogus_true, Value::const_int(tys.i32, 42), slot, tys.void);
    let loaded = func.append_inst(
        bogus_true,
        Instruction::new(
            InstKind::Load {
                ptr: Value::Inst(slot),
            },
            tys.i32,
        ),
    );
    let bumped = func.append_inst(
        bogus_true,
        Instruction::new(
            InstKind::Binary {
                op: BinaryOp::Add,
                lhs: Value::Inst(loaded),
                rhs: Value::const_int(tys.i32, 13),
            },
            tys.i32,
        ),
    );
    store(func, bogus_true, Value::Inst(bumped), slot, tys.void);
    func.set_terminator(bogus_true, Terminator::Br { target: bogus_join });

    // junk arm two: slot = 17; slot *= 3
    let slot = func.append_inst(
        bogus_false,
        Instruction::new(
            InstKind::Alloca {
                elem: tys.i32,
                count: None,
            },
            tys.ptr,
        ),
    );
    store(func, bogus_false, Value::const_int(tys.i32, 17), slot, tys.void);
    let loaded = func.append_inst(
        bogus_false,
        Instruction::new(
            InstKind::Load {
                ptr: Value::Inst(slot),
            },
            tys.i32,
        ),
    );
    let scaled = func.append_inst(
        bogus_false,
        Instruction::new(
            InstKind::Binary {
                op: BinaryOp::Mul,
                lhs: Value::Inst(loaded),
                rhs: Value::const_int(tys.i32, 3),
            },
            tys.i32,
        ),
    );
    store(func, bogus_false, Value::Inst(scaled), slot, tys.void);
    func.set_terminator(bogus_false, Terminator::Br { target: bogus_join });
}

fn store(
    func: &mut umbra_core::Function,
    block: BlockId,
    value: Value,
    ptr: umbra_core::InstId,
    void_ty: TypeId,
) {
    func.append_inst(
        block,
        Instruction::new(
            InstKind::Store {
                value,
                ptr: Value::Inst(ptr),
            },
            void_ty,
        ),
    );
}

/// Retargets phi incomings in `block` from predecessor `old` to `new`.
pub(crate) fn replace_phi_pred(
    func: &mut umbra_core::Function,
    block: BlockId,
    old: BlockId,
    new: BlockId,
) {
    let phis: Vec<_> = func.block(block).phis.clone();
    for phi in phis {
        if let InstKind::Phi { incoming } = &mut func.inst_mut(phi).kind {
            for (pred, _) in incoming.iter_mut() {
                if *pred == old {
                    *pred = new;
                }
            }
        }
    }
}
