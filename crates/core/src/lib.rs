//! Typed SSA-IR substrate for the Umbra obfuscation toolchain.
//!
//! The module model uses arena pools with stable integer handles instead
//! of reference cycles: functions, blocks, instructions, globals and types
//! all live in pools owned by the enclosing entity, and every
//! cross-reference is an opaque id resolved through the pool. Cloning a
//! module is therefore a deep copy, which the optimizer exploits for
//! isolated fitness trials.

pub mod builder;
pub mod contracts;
mod display;
pub mod function;
pub mod instruction;
pub mod interp;
pub mod module;
pub mod types;
pub mod verify;

pub use builder::InstBuilder;
pub use function::{BasicBlock, BlockId, Function, Linkage, Signature};
pub use instruction::{
    BinaryOp, CastOp, CmpPred, Constant, InstId, InstKind, Instruction, SourceLoc, Terminator,
    Value,
};
pub use module::{FuncId, GlobalId, GlobalVariable, Initializer, Module, NamedMetadata};
pub use types::{Type, TypeId, TypeTable};
pub use verify::{verify_function, verify_module};
