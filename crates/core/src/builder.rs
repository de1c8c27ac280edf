//! Positioned instruction builder.
//!
//! Transforms that synthesize whole functions (decoder stubs, junk blocks)
//! use this instead of hand-assembling [`Instruction`]s. The builder holds
//! split borrows of one function and the module's type table, tracks a
//! current block, and returns [`Value`] handles for chaining.

use crate::function::{BlockId, Function};
use crate::instruction::{
    BinaryOp, CastOp, CmpPred, InstKind, Instruction, Terminator, Value,
};
use crate::module::{FuncId, Module};
use crate::types::{TypeId, TypeTable};

pub struct InstBuilder<'a> {
    func: &'a mut Function,
    types: &'a mut TypeTable,
    block: BlockId,
}

impl Module {
    /// A builder positioned at the entry of `func`, creating an `entry`
    /// block if the function has none yet.
    pub fn builder(&mut self, func: FuncId) -> InstBuilder<'_> {
        let Module {
            functions, types, ..
        } = self;
        let func = &mut functions[func.index()];
        let block = match func.entry() {
            Some(entry) => entry,
            None => func.add_block("entry"),
        };
        InstBuilder { func, types, block }
    }
}

impl<'a> InstBuilder<'a> {
    pub fn current(&self) -> BlockId {
        self.block
    }

    /// Creates a new block and returns its id without switching to it.
    pub fn block(&mut self, label: impl Into<String>) -> BlockId {
        self.func.add_block(label)
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.block = block;
    }

    pub fn types(&mut self) -> &mut TypeTable {
        self.types
    }

    fn push(&mut self, kind: InstKind, ty: TypeId) -> Value {
        Value::Inst(self.func.append_inst(self.block, Instruction::new(kind, ty)))
    }

    pub fn binary(&mut self, op: BinaryOp, ty: TypeId, lhs: Value, rhs: Value) -> Value {
        self.push(InstKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn icmp(&mut self, pred: CmpPred, lhs: Value, rhs: Value) -> Value {
        let i1 = self.types.int(1);
        self.push(InstKind::Icmp { pred, lhs, rhs }, i1)
    }

    pub fn load(&mut self, ty: TypeId, ptr: Value) -> Value {
        self.push(InstKind::Load { ptr }, ty)
    }

    pub fn store(&mut self, value: Value, ptr: Value) {
        let void = self.types.void();
        self.push(InstKind::Store { value, ptr }, void);
    }

    pub fn alloca(&mut self, elem: TypeId, count: Option<Value>) -> Value {
        let ptr = self.types.ptr();
        self.push(InstKind::Alloca { elem, count }, ptr)
    }

    pub fn gep(&mut self, elem: TypeId, base: Value, index: Value) -> Value {
        let ptr = self.types.ptr();
        self.push(InstKind::Gep { elem, base, index }, ptr)
    }

    pub fn call(&mut self, ret: TypeId, callee: FuncId, args: Vec<Value>) -> Value {
        self.push(InstKind::Call { callee, args }, ret)
    }

    pub fn select(&mut self, ty: TypeId, cond: Value, if_true: Value, if_false: Value) -> Value {
        self.push(
            InstKind::Select {
                cond,
                if_true,
                if_false,
            },
            ty,
        )
    }

    pub fn cast(&mut self, op: CastOp, ty: TypeId, value: Value) -> Value {
        self.push(InstKind::Cast { op, value }, ty)
    }

    pub fn phi(&mut self, ty: TypeId, incoming: Vec<(BlockId, Value)>) -> Value {
        Value::Inst(
            self.func
                .append_phi(self.block, Instruction::new(InstKind::Phi { incoming }, ty)),
        )
    }

    pub fn br(&mut self, target: BlockId) {
        self.func
            .set_terminator(self.block, Terminator::Br { target });
    }

    pub fn cond_br(&mut self, cond: Value, then_dest: BlockId, else_dest: BlockId) {
        self.func.set_terminator(
            self.block,
            Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
            },
        );
    }

    pub fn switch(&mut self, value: Value, default: BlockId, cases: Vec<(i64, BlockId)>) {
        self.func.set_terminator(
            self.block,
            Terminator::Switch {
                value,
                default,
                cases,
            },
        );
    }

    pub fn ret(&mut self, value: Option<Value>) {
        self.func.set_terminator(self.block, Terminator::Ret { value });
    }

    pub fn unreachable(&mut self) {
        self.func.set_terminator(self.block, Terminator::Unreachable);
    }
}
