//! Well-formedness verifier.
//!
//! Transforms must leave the module in an invariant-respecting state at
//! pass exit; the driver asserts this in debug builds and the test suite
//! checks it after every pass. Verified invariants:
//!
//! - a non-declaration function has at least one block, and its entry
//!   block has no predecessors;
//! - block labels are unique within a function;
//! - every instruction is placed in at most one block, phis only in the
//!   phi section;
//! - every terminator successor names an existing block;
//! - every phi has exactly one incoming value per predecessor edge;
//! - every operand refers to a placed instruction, an in-range parameter,
//!   or a live global.

use crate::function::{BlockId, Function};
use crate::instruction::Value;
use crate::module::{FuncId, Module};
use std::collections::{HashMap, HashSet};
use tracing::trace;
use umbra_utils::errors::IrError;

/// Checks every function body in the module.
pub fn verify_module(module: &Module) -> Result<(), IrError> {
    for (id, _) in module.functions() {
        verify_function(module, id)?;
    }
    trace!("module '{}' is well-formed", module.name);
    Ok(())
}

/// Checks a single function body.
pub fn verify_function(module: &Module, id: FuncId) -> Result<(), IrError> {
    let func = module.function(id);
    if func.is_declaration() {
        return Ok(());
    }
    let entry = func
        .entry()
        .ok_or_else(|| IrError::EmptyFunction(func.name.clone()))?;

    if !func.predecessors(entry).is_empty() {
        return Err(IrError::EntryHasPredecessors(func.name.clone()));
    }

    check_labels(func)?;
    let placed = check_placement(func)?;

    for block in func.block_ids() {
        check_successors(func, block)?;
        check_phis(func, block)?;
        check_operands(module, func, block, &placed)?;
    }
    Ok(())
}

fn check_labels(func: &Function) -> Result<(), IrError> {
    let mut seen = HashSet::new();
    for block in func.block_ids() {
        let label = &func.block(block).label;
        if !seen.insert(label.clone()) {
            return Err(IrError::DuplicateLabel {
                func: func.name.clone(),
                label: label.clone(),
            });
        }
    }
    Ok(())
}

/// Returns the set of placed instruction ids, rejecting double placement
/// and phis outside block heads.
fn check_placement(func: &Function) -> Result<HashSet<u32>, IrError> {
    let mut placed = HashSet::new();
    for block in func.block_ids() {
        let bb = func.block(block);
        for &id in bb.phis.iter().chain(bb.insts.iter()) {
            if !placed.insert(id.index() as u32) {
                return Err(IrError::DuplicatePlacement {
                    func: func.name.clone(),
                });
            }
        }
        for &id in &bb.insts {
            if func.inst(id).kind.is_phi() {
                return Err(IrError::MisplacedPhi {
                    func: func.name.clone(),
                    block: bb.label.clone(),
                });
            }
        }
        for &id in &bb.phis {
            if !func.inst(id).kind.is_phi() {
                return Err(IrError::MisplacedPhi {
                    func: func.name.clone(),
                    block: bb.label.clone(),
                });
            }
        }
    }
    Ok(placed)
}

fn check_successors(func: &Function, block: BlockId) -> Result<(), IrError> {
    for succ in func.block(block).terminator.successors() {
        if succ.index() >= func.num_blocks() {
            return Err(IrError::UnknownSuccessor {
                func: func.name.clone(),
                block: func.block(block).label.clone(),
            });
        }
    }
    Ok(())
}

fn check_phis(func: &Function, block: BlockId) -> Result<(), IrError> {
    let preds: HashSet<BlockId> = func.predecessors(block).into_iter().collect();
    for &phi in &func.block(block).phis {
        let incoming = match &func.inst(phi).kind {
            crate::instruction::InstKind::Phi { incoming } => incoming,
            _ => continue,
        };
        let mut counts: HashMap<BlockId, usize> = HashMap::new();
        for (pred, _) in incoming {
            *counts.entry(*pred).or_default() += 1;
        }
        let incoming_set: HashSet<BlockId> = counts.keys().copied().collect();
        let one_per_edge = counts.values().all(|&n| n == 1);
        if incoming_set != preds || !one_per_edge {
            return Err(IrError::PhiPredecessorMismatch {
                func: func.name.clone(),
                block: func.block(block).label.clone(),
            });
        }
    }
    Ok(())
}

fn check_operands(
    module: &Module,
    func: &Function,
    block: BlockId,
    placed: &HashSet<u32>,
) -> Result<(), IrError> {
    let bb = func.block(block);
    let inst_operands = bb
        .phis
        .iter()
        .chain(bb.insts.iter())
        .flat_map(|&id| func.inst(id).kind.operands());
    for value in inst_operands.chain(bb.terminator.operands()) {
        check_value(module, func, block, placed, value)?;
    }
    Ok(())
}

fn check_value(
    module: &Module,
    func: &Function,
    block: BlockId,
    placed: &HashSet<u32>,
    value: &Value,
) -> Result<(), IrError> {
    match value {
        Value::Inst(id) => {
            if !placed.contains(&(id.index() as u32)) {
                return Err(IrError::UndefinedValue {
                    func: func.name.clone(),
                    block: func.block(block).label.clone(),
                });
            }
        }
        Value::Param(index) => {
            if *index as usize >= func.param_count() {
                return Err(IrError::ParamOutOfRange {
                    func: func.name.clone(),
                    index: *index,
                });
            }
        }
        Value::Global(id) => {
            if module.global(*id).is_none() {
                return Err(IrError::DanglingGlobal {
                    func: func.name.clone(),
                });
            }
        }
        Value::Const(_) => {}
    }
    Ok(())
}
