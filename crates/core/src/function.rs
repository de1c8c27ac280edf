//! Functions and basic blocks.
//!
//! A function owns two pools: its basic blocks (indexed by [`BlockId`],
//! insertion order, entry first) and its instructions (indexed by
//! [`InstId`]). Blocks reference instructions by id, so moving an
//! instruction between blocks never invalidates its uses.

use crate::instruction::{InstId, Instruction, SourceLoc, Terminator};
use crate::types::TypeId;
use serde::{Deserialize, Serialize};

/// Stable handle to a basic block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Linkage class of a function or global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Linkage {
    /// Visible outside the module; name must survive obfuscation.
    External,
    Internal,
    Private,
}

/// Immutable function signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub ret: TypeId,
    pub params: Vec<TypeId>,
}

/// A basic block: phi nodes at the head, straight-line instructions, and
/// exactly one terminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    pub label: String,
    pub phis: Vec<InstId>,
    pub insts: Vec<InstId>,
    pub terminator: Terminator,
}

impl BasicBlock {
    fn new(label: String) -> Self {
        Self {
            label,
            phis: Vec::new(),
            insts: Vec::new(),
            terminator: Terminator::Unreachable,
        }
    }
}

/// A function: name, signature, linkage, and (unless a declaration) a body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub sig: Signature,
    pub linkage: Linkage,
    is_declaration: bool,
    pub loc: Option<SourceLoc>,
    blocks: Vec<BasicBlock>,
    insts: Vec<Instruction>,
}

impl Function {
    pub fn new(name: impl Into<String>, sig: Signature, linkage: Linkage) -> Self {
        Self {
            name: name.into(),
            sig,
            linkage,
            is_declaration: false,
            loc: None,
            blocks: Vec::new(),
            insts: Vec::new(),
        }
    }

    /// A body-less function referencing code outside the module.
    pub fn declaration(name: impl Into<String>, sig: Signature, linkage: Linkage) -> Self {
        Self {
            is_declaration: true,
            ..Self::new(name, sig, linkage)
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.is_declaration
    }

    pub fn param_count(&self) -> usize {
        self.sig.params.len()
    }

    /// The entry block, if a body exists. The first block is always entry.
    pub fn entry(&self) -> Option<BlockId> {
        if self.blocks.is_empty() {
            None
        } else {
            Some(BlockId(0))
        }
    }

    pub fn add_block(&mut self, label: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(label.into()));
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Adds an instruction to the pool without placing it in a block.
    pub fn add_inst(&mut self, inst: Instruction) -> InstId {
        let id = InstId(self.insts.len() as u32);
        self.insts.push(inst);
        id
    }

    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.insts[id.index()]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Instruction {
        &mut self.insts[id.index()]
    }

    pub fn inst_ids(&self) -> impl Iterator<Item = InstId> {
        (0..self.insts.len() as u32).map(InstId)
    }

    /// Creates an instruction and appends it to `block`.
    pub fn append_inst(&mut self, block: BlockId, inst: Instruction) -> InstId {
        let id = self.add_inst(inst);
        self.block_mut(block).insts.push(id);
        id
    }

    /// Creates an instruction and inserts it at `index` within `block`.
    pub fn insert_inst(&mut self, block: BlockId, index: usize, inst: Instruction) -> InstId {
        let id = self.add_inst(inst);
        self.block_mut(block).insts.insert(index, id);
        id
    }

    /// Creates a phi and appends it to the phi section of `block`.
    pub fn append_phi(&mut self, block: BlockId, inst: Instruction) -> InstId {
        debug_assert!(inst.kind.is_phi());
        let id = self.add_inst(inst);
        self.block_mut(block).phis.push(id);
        id
    }

    pub fn set_terminator(&mut self, block: BlockId, terminator: Terminator) {
        self.block_mut(block).terminator = terminator;
    }

    /// Predecessors of `id`, derived from every block's terminator.
    pub fn predecessors(&self, id: BlockId) -> Vec<BlockId> {
        self.block_ids()
            .filter(|&b| self.block(b).terminator.successors().contains(&id))
            .collect()
    }

    /// Number of placed instructions, counting each terminator as one.
    pub fn inst_count(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| b.phis.len() + b.insts.len() + 1)
            .sum()
    }
}
