//! Anti-analysis hardening.
//!
//! Four semi-independent sub-transformations:
//!
//! - **Symbol renaming**: internal functions get random `umbra_`-prefixed
//!   identifiers. The entry point, externally linked functions, and
//!   anything already carrying the reserved prefix keep their names.
//! - **Junk insertion**: side-effect-free sequences (constant
//!   arithmetic, a throwaway stack slot, shift round-trips, dead
//!   compares) dropped behind ~10% of instruction sites.
//! - **Fake jumps**: an opaque-false branch, `(x & 1) == 2`, into a
//!   synthesized block that ends in `unreachable`; x & 1 is 0 or 1, so
//!   the edge never fires.
//! - **Metadata scrubbing**: source locations cleared everywhere, named
//!   metadata under the debug sentinel dropped.

use crate::bogus_flow::replace_phi_pred;
use crate::{PassConfig, Transform, RESERVED_PREFIX};
use rand::{rngs::StdRng, Rng};
use tracing::debug;
use umbra_core::{
    BinaryOp, BlockId, CmpPred, Function, InstKind, Instruction, Linkage, Module, Terminator,
    TypeId, Value,
};
use umbra_utils::errors::TransformError;

/// Named metadata beginning with this prefix is treated as debug info.
pub const DEBUG_MD_PREFIX: &str = "umbra.dbg";

pub struct AntiAnalysis {
    config: PassConfig,
}

impl AntiAnalysis {
    pub fn new(config: PassConfig) -> Self {
        Self { config }
    }
}

impl Transform for AntiAnalysis {
    fn name(&self) -> &'static str {
        "anti_analysis"
    }

    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool, TransformError> {
        let mut changed = rename_symbols(module, rng);
        changed |= insert_junk(module, rng, self.config.junk_ratio);
        changed |= add_fake_jumps(module, rng, self.config.fake_jump_ratio);
        changed |= scrub_metadata(module);
        Ok(changed)
    }
}

fn rename_symbols(module: &mut Module, rng: &mut StdRng) -> bool {
    let mut changed = false;
    for fid in module.func_ids() {
        {
            let func = module.function(fid);
            if func.is_declaration()
                || func.name == "main"
                || func.linkage == Linkage::External
                || func.name.starts_with("__")
                || func.name.starts_with(RESERVED_PREFIX)
            {
                continue;
            }
        }
        let fresh = loop {
            let candidate = random_identifier(rng);
            if module.function_by_name(&candidate).is_none() {
                break candidate;
            }
        };
        debug!("renamed '{}' to '{}'", module.function(fid).name, fresh);
        module.function_mut(fid).name = fresh;
        changed = true;
    }
    changed
}

fn random_identifier(rng: &mut StdRng) -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let suffix: String = (0..8)
        .map(|_| CHARS[rng.random_range(0..CHARS.len())] as char)
        .collect();
    format!("{RESERVED_PREFIX}{suffix}")
}

fn insert_junk(module: &mut Module, rng: &mut StdRng, ratio: f64) -> bool {
    let i1_ty = module.types.int(1);
    let i32_ty = module.types.int(32);
    let void_ty = module.types.void();
    let ptr_ty = module.types.ptr();
    let mut inserted = 0usize;

    for fid in module.func_ids() {
        if module.function(fid).is_declaration() {
            continue;
        }
        let blocks: Vec<BlockId> = module.function(fid).block_ids().collect();
        for block in blocks {
            let len = module.function(fid).block(block).insts.len();
            for pos in (0..len).rev() {
                if !rng.random_bool(ratio) {
                    continue;
                }
                let func = module.function_mut(fid);
                let shape = rng.random_range(0..4);
                let a = rng.random_range(1..=1000);
                let b = rng.random_range(1..=1000);
                match shape {
                    0 => {
                        // constant add feeding a multiply by one
                        let sum = func.insert_inst(
                            block,
                            pos + 1,
                            Instruction::new(
                                InstKind::Binary {
                                    op: BinaryOp::Add,
                                    lhs: Value::const_int(i32_ty, a),
                                    rhs: Value::const_int(i32_ty, b),
                                },
                                i32_ty,
                            ),
                        );
                        func.insert_inst(
                            block,
                            pos + 2,
                            Instruction::new(
                                InstKind::Binary {
                                    op: BinaryOp::Mul,
                                    lhs: Value::Inst(sum),
                                    rhs: Value::const_int(i32_ty, 1),
                                },
                                i32_ty,
                            ),
                        );
                    }
                    1 => {
                        // throwaway stack slot
                        let slot = func.insert_inst(
                            block,
                            pos + 1,
                            Instruction::new(
                                InstKind::Alloca {
                                    elem: i32_ty,
                                    count: None,
                                },
                                ptr_ty,
                            ),
                        );
                        func.insert_inst(
                            block,
                            pos + 2,
                            Instruction::new(
                                InstKind::Store {
                                    value: Value::const_int(i32_ty, a),
                                    ptr: Value::Inst(slot),
                                },
                                void_ty,
                            ),
                        );
                        func.insert_inst(
                            block,
                            pos + 3,
                            Instruction::new(
                                InstKind::Load {
                                    ptr: Value::Inst(slot),
                                },
                                i32_ty,
                            ),
                        );
                    }
                    2 => {
                        // shift left then right, net zero
                        let shifted = func.insert_inst(
                            block,
                            pos + 1,
                            Instruction::new(
                                InstKind::Binary {
                                    op: BinaryOp::Shl,
                                    lhs: Value::const_int(i32_ty, a),
                                    rhs: Value::const_int(i32_ty, 1),
                                },
                                i32_ty,
                            ),
                        );
                        func.insert_inst(
                            block,
                            pos + 2,
                            Instruction::new(
                                InstKind::Binary {
                                    op: BinaryOp::Lshr,
                                    lhs: Value::Inst(shifted),
                                    rhs: Value::const_int(i32_ty, 1),
                                },
                                i32_ty,
                            ),
                        );
                    }
                    _ => {
                        // dead comparison
                        func.insert_inst(
                            block,
                            pos + 1,
                            Instruction::new(
                                InstKind::Icmp {
                                    pred: CmpPred::Eq,
                                    lhs: Value::const_int(i32_ty, a),
                                    rhs: Value::const_int(i32_ty, b),
                                },
                                i1_ty,
                            ),
                        );
                    }
                }
                inserted += 1;
            }
        }
    }
    if inserted > 0 {
        debug!("inserted {inserted} junk sequences");
    }
    inserted > 0
}

fn add_fake_jumps(module: &mut Module, rng: &mut StdRng, ratio: f64) -> bool {
    let i1_ty = module.types.int(1);
    let i32_ty = module.types.int(32);
    let void_ty = module.types.void();
    let ptr_ty = module.types.ptr();
    let mut added = 0usize;

    for fid in module.func_ids() {
        {
            let func = module.function(fid);
            if func.is_declaration() || func.num_blocks() < 2 {
                continue;
            }
        }
        let originals: Vec<BlockId> = module.function(fid).block_ids().collect();
        for block in originals {
            if !rng.random_bool(ratio) {
                continue;
            }
            {
                let func = module.function(fid);
                let bb = func.block(block);
                let plain = matches!(
                    bb.terminator,
                    Terminator::Br { .. } | Terminator::CondBr { .. } | Terminator::Ret { .. }
                );
                if !bb.phis.is_empty() || !plain {
                    continue;
                }
            }
            let func = module.function_mut(fid);
            let tag = func.num_blocks();
            let fake = func.add_block(format!("fake_block{tag}"));
            let cont = func.add_block(format!("real_continue{tag}"));

            // the continuation takes over the original terminator
            let original_term =
                std::mem::replace(&mut func.block_mut(block).terminator, Terminator::Unreachable);
            for succ in original_term.successors() {
                replace_phi_pred(func, succ, block, cont);
            }
            func.set_terminator(cont, original_term);

            // (x & 1) == 2 never holds
            let x = Value::const_int(i32_ty, rng.random_range(2..=100));
            let masked = func.append_inst(
                block,
                Instruction::new(
                    InstKind::Binary {
                        op: BinaryOp::And,
                        lhs: x,
                        rhs: Value::const_int(i32_ty, 1),
                    },
                    i32_ty,
                ),
            );
            let never = func.append_inst(
                block,
                Instruction::new(
                    InstKind::Icmp {
                        pred: CmpPred::Eq,
                        lhs: Value::Inst(masked),
                        rhs: Value::const_int(i32_ty, 2),
                    },
                    i1_ty,
                ),
            );
            func.set_terminator(
                block,
                Terminator::CondBr {
                    cond: Value::Inst(never),
                    then_dest: fake,
                    else_dest: cont,
                },
            );

            fill_fake_block(func, fake, i32_ty, void_ty, ptr_ty);
            added += 1;
        }
    }
    if added > 0 {
        debug!("added {added} fake jumps");
    }
    added > 0
}

fn fill_fake_block(
    func: &mut Function,
    block: BlockId,
    i32_ty: TypeId,
    void_ty: TypeId,
    ptr_ty: TypeId,
) {
    let slot = func.append_inst(
        block,
        Instruction::new(
            InstKind::Alloca {
                elem: i32_ty,
                count: None,
            },
            ptr_ty,
        ),
    );
    func.append_inst(
        block,
        Instruction::new(
            InstKind::Store {
                value: Value::const_int(i32_ty, 0xDEADBEEFu32 as i32 as i64),
                ptr: Value::Inst(slot),
            },
            void_ty,
        ),
    );
    let loaded = func.append_inst(
        block,
        Instruction::new(
            InstKind::Load {
                ptr: Value::Inst(slot),
            },
            i32_ty,
        ),
    );
    func.append_inst(
        block,
        Instruction::new(
            InstKind::Binary {
                op: BinaryOp::Add,
                lhs: Value::Inst(loaded),
                rhs: Value::const_int(i32_ty, 1),
            },
            i32_ty,
        ),
    );
    func.set_terminator(block, Terminator::Unreachable);
}

fn scrub_metadata(module: &mut Module) -> bool {
    let mut changed = false;
    for fid in module.func_ids() {
        let func = module.function_mut(fid);
        if func.loc.take().is_some() {
            changed = true;
        }
        let inst_ids: Vec<_> = func.inst_ids().collect();
        for iid in inst_ids {
            if func.inst_mut(iid).loc.take().is_some() {
                changed = true;
            }
        }
    }
    let before = module.named_metadata.len();
    module
        .named_metadata
        .retain(|md| !md.name.starts_with(DEBUG_MD_PREFIX));
    changed | (module.named_metadata.len() != before)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use umbra_core::interp::Interpreter;
    use umbra_core::{NamedMetadata, Signature, SourceLoc};

    fn sample_module() -> Module {
        let mut module = Module::new("m");
        let i32_ty = module.types.int(32);
        let helper = module.add_function(Function::new(
            "helper",
            Signature {
                ret: i32_ty,
                params: vec![i32_ty],
            },
            Linkage::Internal,
        ));
        let mut b = module.builder(helper);
        let doubled = b.binary(BinaryOp::Add, i32_ty, Value::Param(0), Value::Param(0));
        b.ret(Some(doubled));

        let main_fn = module.add_function(Function::new(
            "main",
            Signature {
                ret: i32_ty,
                params: vec![i32_ty],
            },
            Linkage::External,
        ));
        let mut b = module.builder(main_fn);
        let tail = b.block("tail");
        let out = b.call(i32_ty, helper, vec![Value::Param(0)]);
        b.br(tail);
        b.switch_to(tail);
        b.ret(Some(out));

        module.named_metadata.push(NamedMetadata {
            name: format!("{DEBUG_MD_PREFIX}.cu"),
            operands: vec!["demo.c".into()],
        });
        module.named_metadata.push(NamedMetadata {
            name: "umbra.ident".into(),
            operands: vec!["umbra".into()],
        });
        module
    }

    #[test]
    fn fake_jump_predicate_is_always_false() {
        for x in [0i32, 1, 2, 3, -1, i32::MAX, i32::MIN, 99] {
            assert_ne!(x & 1, 2, "x={x}");
        }
    }

    #[test]
    fn renames_internals_but_not_main() {
        let mut module = sample_module();
        let mut rng = StdRng::seed_from_u64(2);
        rename_symbols(&mut module, &mut rng);
        assert!(module.function_by_name("main").is_some());
        assert!(module.function_by_name("helper").is_none());
        let renamed = module
            .functions()
            .find(|(_, f)| f.name != "main")
            .map(|(_, f)| f.name.clone())
            .unwrap();
        assert!(renamed.starts_with(RESERVED_PREFIX));
    }

    #[test]
    fn renaming_is_stable_on_second_run() {
        let mut module = sample_module();
        let mut rng = StdRng::seed_from_u64(2);
        rename_symbols(&mut module, &mut rng);
        let names: Vec<String> = module.functions().map(|(_, f)| f.name.clone()).collect();
        assert!(!rename_symbols(&mut module, &mut rng));
        let again: Vec<String> = module.functions().map(|(_, f)| f.name.clone()).collect();
        assert_eq!(names, again);
    }

    #[test]
    fn behavior_survives_the_full_pass() {
        let mut module = sample_module();
        let mut rng = StdRng::seed_from_u64(9);
        let pass = AntiAnalysis::new(PassConfig {
            junk_ratio: 0.9,
            fake_jump_ratio: 0.9,
            ..PassConfig::default()
        });
        assert!(pass.apply(&mut module, &mut rng).unwrap());
        umbra_core::verify_module(&module).unwrap();

        let mut interp = Interpreter::new(&module);
        for x in [0i64, 1, -3, 21] {
            assert_eq!(interp.call_by_name("main", &[x]).unwrap(), Some(2 * x));
        }
    }

    #[test]
    fn scrubbing_clears_locations_and_debug_metadata() {
        let mut module = sample_module();
        let fid = module.function_by_name("main").unwrap();
        module.function_mut(fid).loc = Some(SourceLoc { line: 3, column: 1 });
        let first_inst = module.function(fid).inst_ids().next().unwrap();
        module.function_mut(fid).inst_mut(first_inst).loc =
            Some(SourceLoc { line: 4, column: 9 });

        assert!(scrub_metadata(&mut module));
        assert!(module.function(fid).loc.is_none());
        assert!(module.function(fid).inst(first_inst).loc.is_none());
        assert_eq!(module.named_metadata.len(), 1);
        assert_eq!(module.named_metadata[0].name, "umbra.ident");
    }
}
