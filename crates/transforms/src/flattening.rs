//! Control-flow flattening.
//!
//! Rewrites an eligible function's CFG into a dispatcher-and-switch state
//! machine: an integer `state` stack slot selects the next original block
//! through a synthesized dispatcher, so the static edge structure
//! collapses into one hub.
//!
//! Construction:
//! 1. `state` (and, for non-void functions, a `retval` slot initialized
//!    to the zero value) are alloca'd at the top of the entry block.
//! 2. Non-entry blocks are numbered 1..=N and become switch cases; the
//!    switch default targets a synthesized `end` block.
//! 3. Unconditional branches become `store state; br dispatcher`;
//!    conditional branches select between two trampolines that each store
//!    their arm's state; returns write `retval` and branch to `end`,
//!    which returns the slot's value.
//!
//! Returned values flow through the `retval` slot, so mid-function
//! returns keep their meaning. Functions containing phi nodes are
//! skipped: the state machine rewires every edge through the dispatcher,
//! which would orphan their incoming lists.

use crate::{PassConfig, Transform, RESERVED_PREFIX};
use rand::rngs::StdRng;
use std::collections::HashMap;
use tracing::debug;
use umbra_core::{
    BlockId, Constant, FuncId, InstKind, Instruction, Module, Terminator, Type, TypeId, Value,
};
use umbra_utils::errors::TransformError;

pub struct ControlFlowFlattening {
    config: PassConfig,
}

impl ControlFlowFlattening {
    pub fn new(config: PassConfig) -> Self {
        Self { config }
    }
}

impl Transform for ControlFlowFlattening {
    fn name(&self) -> &'static str {
        "control_flow_flattening"
    }

    fn apply(&self, module: &mut Module, _rng: &mut StdRng) -> Result<bool, TransformError> {
        let mut flattened = 0usize;
        for fid in module.func_ids() {
            if !eligible(module, fid, self.config.min_flatten_blocks) {
                continue;
            }
            flatten_function(module, fid);
            flattened += 1;
        }
        if flattened > 0 {
            debug!("flattened {flattened} functions");
        }
        Ok(flattened > 0)
    }
}

fn eligible(module: &Module, fid: FuncId, min_blocks: usize) -> bool {
    let func = module.function(fid);
    if func.is_declaration()
        || func.name == "main"
        || func.name.starts_with(RESERVED_PREFIX)
        || func.num_blocks() < min_blocks
    {
        return false;
    }
    // the rewiring cannot preserve phi incoming lists
    if func.block_ids().any(|b| !func.block(b).phis.is_empty()) {
        return false;
    }
    // the return-value slot only models int, pointer and void returns
    matches!(
        module.types.get(func.sig.ret),
        Type::Void | Type::Int(_) | Type::Ptr
    )
}

fn flatten_function(module: &mut Module, fid: FuncId) {
    let i32_ty = module.types.int(32);
    let ptr_ty = module.types.ptr();
    let void_ty = module.types.void();
    let ret_ty = module.function(fid).sig.ret;
    let ret_zero = zero_value(module, ret_ty);

    let func = module.function_mut(fid);
    let entry = func.entry().expect("eligible function has a body");
    let originals: Vec<BlockId> = func.block_ids().collect();

    // state slot first, so later allocas keep their relative order
    let state_slot = func.insert_inst(
        entry,
        0,
        Instruction::new(
            InstKind::Alloca {
                elem: i32_ty,
                count: None,
            },
            ptr_ty,
        ),
    );
    func.insert_inst(
        entry,
        1,
        Instruction::new(
            InstKind::Store {
                value: Value::const_int(i32_ty, 0),
                ptr: Value::Inst(state_slot),
            },
            void_ty,
        ),
    );
    let ret_slot = ret_zero.map(|zero| {
        let slot = func.insert_inst(
            entry,
            2,
            Instruction::new(
                InstKind::Alloca {
                    elem: ret_ty,
                    count: None,
                },
                ptr_ty,
            ),
        );
        func.insert_inst(
            entry,
            3,
            Instruction::new(
                InstKind::Store {
                    value: zero,
                    ptr: Value::Inst(slot),
                },
                void_ty,
            ),
        );
        slot
    });

    // number every non-entry block
    let mut state_of: HashMap<BlockId, i64> = HashMap::new();
    let mut counter = 1i64;
    for &block in &originals {
        if block != entry {
            state_of.insert(block, counter);
            counter += 1;
        }
    }

    let tag = func.num_blocks();
    let dispatcher = func.add_block(format!("dispatcher{tag}"));
    let end = func.add_block(format!("end{tag}"));

    let state = func.append_inst(
        dispatcher,
        Instruction::new(
            InstKind::Load {
                ptr: Value::Inst(state_slot),
            },
            i32_ty,
        ),
    );
    let mut cases: Vec<(i64, BlockId)> = state_of.iter().map(|(&b, &n)| (n, b)).collect();
    cases.sort_by_key(|&(n, _)| n);
    func.set_terminator(
        dispatcher,
        Terminator::Switch {
            value: Value::Inst(state),
            default: end,
            cases,
        },
    );

    match ret_slot {
        Some(slot) => {
            let value = func.append_inst(
                end,
                Instruction::new(
                    InstKind::Load {
                        ptr: Value::Inst(slot),
                    },
                    ret_ty,
                ),
            );
            func.set_terminator(
                end,
                Terminator::Ret {
                    value: Some(Value::Inst(value)),
                },
            );
        }
        None => func.set_terminator(end, Terminator::Ret { value: None }),
    }

    // reroute every original edge through the dispatcher
    for &block in &originals {
        let terminator = func.block(block).terminator.clone();
        match terminator {
            Terminator::Br { target } => {
                if let Some(&next) = state_of.get(&target) {
                    func.append_inst(
                        block,
                        Instruction::new(
                            InstKind::Store {
                                value: Value::const_int(i32_ty, next),
                                ptr: Value::Inst(state_slot),
                            },
                            void_ty,
                        ),
                    );
                    func.set_terminator(block, Terminator::Br { target: dispatcher });
                }
                // a branch to the entry cannot occur in a well-formed
                // module; anything unnumbered is left untouched
            }
            Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
            } => {
                let tag = func.num_blocks();
                let then_tramp = trampoline(
                    func,
                    format!("flat_then{tag}"),
                    then_dest,
                    &state_of,
                    state_slot,
                    dispatcher,
                    i32_ty,
                    void_ty,
                );
                let else_tramp = trampoline(
                    func,
                    format!("flat_else{tag}"),
                    else_dest,
                    &state_of,
                    state_slot,
                    dispatcher,
                    i32_ty,
                    void_ty,
                );
                func.set_terminator(
                    block,
                    Terminator::CondBr {
                        cond,
                        then_dest: then_tramp,
                        else_dest: else_tramp,
                    },
                );
            }
            Terminator::Ret { value } => {
                if let (Some(slot), Some(value)) = (ret_slot, value) {
                    func.append_inst(
                        block,
                        Instruction::new(
                            InstKind::Store {
                                value,
                                ptr: Value::Inst(slot),
                            },
                            void_ty,
                        ),
                    );
                }
                func.set_terminator(block, Terminator::Br { target: end });
            }
            // switch hubs from an earlier flattening and unreachable
            // blocks keep their terminators; their targets stay valid
            Terminator::Switch { .. } | Terminator::Unreachable => {}
        }
    }
}

/// A one-store block that forwards control to the dispatcher (or straight
/// to an unnumbered target).
#[allow(clippy::too_many_arguments)]
fn trampoline(
    func: &mut umbra_core::Function,
    label: String,
    target: BlockId,
    state_of: &HashMap<BlockId, i64>,
    state_slot: umbra_core::InstId,
    dispatcher: BlockId,
    i32_ty: TypeId,
    void_ty: TypeId,
) -> BlockId {
    let block = func.add_block(label);
    match state_of.get(&target) {
        Some(&next) => {
            func.append_inst(
                block,
                Instruction::new(
                    InstKind::Store {
                        value: Value::const_int(i32_ty, next),
                        ptr: Value::Inst(state_slot),
                    },
                    void_ty,
                ),
            );
            func.set_terminator(block, Terminator::Br { target: dispatcher });
        }
        None => func.set_terminator(block, Terminator::Br { target }),
    }
    block
}

/// Zero value of a return type; `None` for void.
fn zero_value(module: &Module, ty: TypeId) -> Option<Value> {
    match module.types.get(ty) {
        Type::Void => None,
        Type::Int(_) => Some(Value::const_int(ty, 0)),
        _ => Some(Value::Const(Constant::Null)),
    }
}
