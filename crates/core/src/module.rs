//! Modules, globals and named metadata.
//!
//! A module exclusively owns every contained entity; inter-entity
//! references are stable handles into its pools. Because cross-references
//! are ids rather than pointers, `Module::clone` is a correct deep copy;
//! the optimizer relies on this for fitness trials.

use crate::function::{Function, Linkage};
use crate::types::{TypeId, TypeTable};
use serde::{Deserialize, Serialize};

/// Stable handle to a function within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FuncId(pub(crate) u32);

impl FuncId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Stable handle to a global variable within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalId(pub(crate) u32);

impl GlobalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Constant initializer of a global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Initializer {
    /// Raw bytes; C-strings are byte arrays with a trailing NUL.
    Bytes(Vec<u8>),
    Int { ty: TypeId, value: i64 },
    /// Zero-fill of the global's type.
    Zero,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: String,
    pub ty: TypeId,
    pub is_constant: bool,
    pub linkage: Linkage,
    pub init: Option<Initializer>,
}

impl GlobalVariable {
    /// The initializer bytes if this global is a well-formed C-string:
    /// a constant byte array ending in NUL with no interior NUL.
    pub fn c_string_bytes(&self) -> Option<&[u8]> {
        if !self.is_constant {
            return None;
        }
        match &self.init {
            Some(Initializer::Bytes(bytes)) => {
                if bytes.last() == Some(&0) && !bytes[..bytes.len() - 1].contains(&0) {
                    Some(bytes)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// A named metadata entry, e.g. debug-info tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedMetadata {
    pub name: String,
    pub operands: Vec<String>,
}

/// A translation unit in IR form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub types: TypeTable,
    pub(crate) functions: Vec<Function>,
    /// Pool with tombstones so removal never invalidates handles.
    pub(crate) globals: Vec<Option<GlobalVariable>>,
    pub named_metadata: Vec<NamedMetadata>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: TypeTable::new(),
            functions: Vec::new(),
            globals: Vec::new(),
            named_metadata: Vec::new(),
        }
    }

    pub fn add_function(&mut self, function: Function) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId(i as u32), f))
    }

    pub fn func_ids(&self) -> Vec<FuncId> {
        (0..self.functions.len() as u32).map(FuncId).collect()
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions()
            .find(|(_, f)| f.name == name)
            .map(|(id, _)| id)
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    pub fn add_global(&mut self, global: GlobalVariable) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(Some(global));
        id
    }

    pub fn global(&self, id: GlobalId) -> Option<&GlobalVariable> {
        self.globals.get(id.index()).and_then(|g| g.as_ref())
    }

    pub fn global_mut(&mut self, id: GlobalId) -> Option<&mut GlobalVariable> {
        self.globals.get_mut(id.index()).and_then(|g| g.as_mut())
    }

    /// Tombstones the global. Its handle becomes dangling; callers must have
    /// rewritten every use first.
    pub fn remove_global(&mut self, id: GlobalId) {
        if let Some(slot) = self.globals.get_mut(id.index()) {
            *slot = None;
        }
    }

    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &GlobalVariable)> {
        self.globals
            .iter()
            .enumerate()
            .filter_map(|(i, g)| g.as_ref().map(|g| (GlobalId(i as u32), g)))
    }

    pub fn num_globals(&self) -> usize {
        self.globals.iter().filter(|g| g.is_some()).count()
    }

    /// Total placed instructions across all function bodies.
    pub fn inst_count(&self) -> usize {
        self.functions
            .iter()
            .filter(|f| !f.is_declaration())
            .map(|f| f.inst_count())
            .sum()
    }

    /// Total basic blocks across all function bodies.
    pub fn block_count(&self) -> usize {
        self.functions
            .iter()
            .filter(|f| !f.is_declaration())
            .map(|f| f.num_blocks())
            .sum()
    }
}
