//! String concealment.
//!
//! Replaces constant C-string globals with XOR-encrypted blobs plus a
//! synthesized decoder. Each candidate gets a fresh non-zero single-byte
//! key; one decoder function is emitted per distinct key and every use of
//! the original global becomes `call umbra_decrypt_K(gep enc_global, 0)`.
//!
//! The decoder copies into a fixed-size stack buffer
//! (`PassConfig::decoder_buffer_len`, 1024 by default); plaintexts longer
//! than the buffer are truncated. Encrypted globals carry a `_enc` name
//! suffix, which is also the sentinel that keeps the pass idempotent.

use crate::{PassConfig, Transform, RESERVED_PREFIX};
use rand::{rngs::StdRng, Rng};
use std::collections::HashMap;
use tracing::debug;
use umbra_core::{
    BinaryOp, BlockId, CmpPred, FuncId, Function, GlobalId, GlobalVariable, Initializer, InstKind,
    Instruction, Linkage, Module, Signature, Value,
};
use umbra_utils::errors::TransformError;

const ENCRYPTED_SUFFIX: &str = "_enc";

pub struct StringEncryption {
    config: PassConfig,
}

impl StringEncryption {
    pub fn new(config: PassConfig) -> Self {
        Self { config }
    }
}

impl Transform for StringEncryption {
    fn name(&self) -> &'static str {
        "string_encryption"
    }

    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool, TransformError> {
        let candidates: Vec<GlobalId> = module
            .globals()
            .filter(|(_, g)| is_candidate(g))
            .map(|(id, _)| id)
            .collect();
        if candidates.is_empty() {
            return Ok(false);
        }

        // reuse decoders from earlier runs so repeated application never
        // stacks stubs for the same key
        let mut decoders: HashMap<u8, FuncId> = module
            .functions()
            .filter_map(|(id, f)| {
                f.name
                    .strip_prefix(RESERVED_PREFIX)
                    .and_then(|rest| rest.strip_prefix("decrypt_"))
                    .and_then(|key| key.parse::<u8>().ok())
                    .map(|key| (key, id))
            })
            .collect();

        let mut changed = false;
        for gid in candidates {
            let (name, plaintext) = {
                let global = match module.global(gid) {
                    Some(g) => g,
                    None => continue,
                };
                let bytes = match global.c_string_bytes() {
                    Some(b) => b.to_vec(),
                    None => continue,
                };
                (global.name.clone(), bytes)
            };

            let key: u8 = rng.random_range(1..=255);
            let encrypted: Vec<u8> = plaintext.iter().map(|b| b ^ key).collect();

            let i8_ty = module.types.int(8);
            let enc_ty = module.types.array(i8_ty, encrypted.len() as u64);
            let enc_gid = module.add_global(GlobalVariable {
                name: format!("{name}{ENCRYPTED_SUFFIX}"),
                ty: enc_ty,
                is_constant: true,
                linkage: Linkage::Private,
                init: Some(Initializer::Bytes(encrypted)),
            });

            let decoder = match decoders.get(&key) {
                Some(&id) => id,
                None => {
                    let id = synthesize_decoder(module, key, self.config.decoder_buffer_len);
                    decoders.insert(key, id);
                    id
                }
            };

            let fully_rewritten = rewrite_uses(module, gid, enc_gid, decoder);
            if fully_rewritten {
                module.remove_global(gid);
            }
            changed = true;
            debug!("encrypted global '{name}' with key {key:#04x}");
        }
        Ok(changed)
    }
}

/// Constant, C-string shaped, plaintext of at least two bytes, and not
/// already an output of this pass.
fn is_candidate(global: &GlobalVariable) -> bool {
    if global.name.ends_with(ENCRYPTED_SUFFIX) {
        return false;
    }
    global
        .c_string_bytes()
        .map_or(false, |bytes| bytes.len() >= 3)
}

/// Emits `umbra_decrypt_K(ptr) -> ptr`: a loop XOR-ing bytes into a stack
/// buffer until the byte whose encrypted value equals K, i.e. the
/// encrypted NUL. The NUL itself is decrypted and stored before the loop
/// exits so the buffer is properly terminated.
fn synthesize_decoder(module: &mut Module, key: u8, buffer_len: u64) -> FuncId {
    let ptr_ty = module.types.ptr();
    let i8_ty = module.types.int(8);
    let i32_ty = module.types.int(32);
    let id = module.add_function(Function::new(
        format!("{RESERVED_PREFIX}decrypt_{key}"),
        Signature {
            ret: ptr_ty,
            params: vec![ptr_ty],
        },
        Linkage::Internal,
    ));
    let key_const = Value::const_int(i8_ty, key as i64);

    let mut b = module.builder(id);
    let loop_bb = b.block("loop");
    let exit_bb = b.block("exit");

    let buffer = b.alloca(i8_ty, Some(Value::const_int(i32_ty, buffer_len as i64)));
    let index = b.alloca(i32_ty, None);
    b.store(Value::const_int(i32_ty, 0), index);
    b.br(loop_bb);

    b.switch_to(loop_bb);
    let i = b.load(i32_ty, index);
    let src = b.gep(i8_ty, Value::Param(0), i);
    let enc = b.load(i8_ty, src);
    let at_end = b.icmp(CmpPred::Eq, enc, key_const);
    let dec = b.binary(BinaryOp::Xor, i8_ty, enc, key_const);
    let dst = b.gep(i8_ty, buffer, i);
    b.store(dec, dst);
    let next = b.binary(BinaryOp::Add, i32_ty, i, Value::const_int(i32_ty, 1));
    b.store(next, index);
    b.cond_br(at_end, exit_bb, loop_bb);

    b.switch_to(exit_bb);
    b.ret(Some(buffer));
    id
}

/// Rewrites every use of `old` into a decoder call over `enc`. Returns
/// true when no use survives; phi operands are left alone (a decoder call
/// cannot be placed on a phi edge), keeping the original global alive.
fn rewrite_uses(module: &mut Module, old: GlobalId, enc: GlobalId, decoder: FuncId) -> bool {
    let i8_ty = module.types.int(8);
    let i32_ty = module.types.int(32);
    let ptr_ty = module.types.ptr();
    let mut phi_use_remains = false;

    for fid in module.func_ids() {
        if module.function(fid).is_declaration() {
            continue;
        }
        let blocks: Vec<BlockId> = module.function(fid).block_ids().collect();
        for block in blocks {
            let mut at = 0;
            loop {
                let func = module.function(fid);
                let found = func.block(block).insts[at..]
                    .iter()
                    .position(|&iid| uses_global(func.inst(iid).kind.operands(), old))
                    .map(|p| p + at);
                let Some(pos) = found else { break };

                let func = module.function_mut(fid);
                let gep = func.insert_inst(
                    block,
                    pos,
                    Instruction::new(
                        InstKind::Gep {
                            elem: i8_ty,
                            base: Value::Global(enc),
                            index: Value::const_int(i32_ty, 0),
                        },
                        ptr_ty,
                    ),
                );
                let call = func.insert_inst(
                    block,
                    pos + 1,
                    Instruction::new(
                        InstKind::Call {
                            callee: decoder,
                            args: vec![Value::Inst(gep)],
                        },
                        ptr_ty,
                    ),
                );
                let user = func.block(block).insts[pos + 2];
                for operand in func.inst_mut(user).kind.operands_mut() {
                    if *operand == Value::Global(old) {
                        *operand = Value::Inst(call);
                    }
                }
                at = pos + 3;
            }

            let func = module.function(fid);
            let term_uses = uses_global(func.block(block).terminator.operands(), old);
            if term_uses {
                let func = module.function_mut(fid);
                let end = func.block(block).insts.len();
                let gep = func.insert_inst(
                    block,
                    end,
                    Instruction::new(
                        InstKind::Gep {
                            elem: i8_ty,
                            base: Value::Global(enc),
                            index: Value::const_int(i32_ty, 0),
                        },
                        ptr_ty,
                    ),
                );
                let call = func.insert_inst(
                    block,
                    end + 1,
                    Instruction::new(
                        InstKind::Call {
                            callee: decoder,
                            args: vec![Value::Inst(gep)],
                        },
                        ptr_ty,
                    ),
                );
                for operand in func.block_mut(block).terminator.operands_mut() {
                    if *operand == Value::Global(old) {
                        *operand = Value::Inst(call);
                    }
                }
            }

            let func = module.function(fid);
            for &phi in &func.block(block).phis {
                if uses_global(func.inst(phi).kind.operands(), old) {
                    phi_use_remains = true;
                }
            }
        }
    }
    !phi_use_remains
}

fn uses_global(operands: Vec<&Value>, global: GlobalId) -> bool {
    operands
        .into_iter()
        .any(|v| *v == Value::Global(global))
}
