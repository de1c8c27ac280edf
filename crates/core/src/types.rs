//! Interned type table for the IR.
//!
//! Types are owned by the module and referenced everywhere else through
//! [`TypeId`] handles. Interning keeps handle comparison cheap: two values
//! have the same type exactly when their `TypeId`s are equal.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable handle into a module's [`TypeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A type in the IR.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    /// Integer of the given bit width (1, 8, 16, 32 or 64).
    Int(u8),
    /// Opaque pointer.
    Ptr,
    /// Fixed-length array.
    Array { elem: TypeId, len: u64 },
    /// Function type.
    Func { ret: TypeId, params: Vec<TypeId> },
}

/// Interning table mapping [`Type`]s to stable [`TypeId`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<Type>", into = "Vec<Type>")]
pub struct TypeTable {
    types: Vec<Type>,
    interned: HashMap<Type, TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            interned: HashMap::new(),
        }
    }

    /// Interns a type, returning the existing handle if it was seen before.
    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(&id) = self.interned.get(&ty) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty.clone());
        self.interned.insert(ty, id);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    pub fn void(&mut self) -> TypeId {
        self.intern(Type::Void)
    }

    pub fn int(&mut self, bits: u8) -> TypeId {
        debug_assert!(matches!(bits, 1 | 8 | 16 | 32 | 64));
        self.intern(Type::Int(bits))
    }

    pub fn ptr(&mut self) -> TypeId {
        self.intern(Type::Ptr)
    }

    pub fn array(&mut self, elem: TypeId, len: u64) -> TypeId {
        self.intern(Type::Array { elem, len })
    }

    pub fn func(&mut self, ret: TypeId, params: Vec<TypeId>) -> TypeId {
        self.intern(Type::Func { ret, params })
    }

    /// Bit width of an integer type, `None` for everything else.
    pub fn bit_width(&self, id: TypeId) -> Option<u8> {
        match self.get(id) {
            Type::Int(bits) => Some(*bits),
            _ => None,
        }
    }

    pub fn is_void(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Void)
    }

    pub fn is_ptr(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Ptr)
    }

    /// Byte size of a sized type; `None` for void and function types.
    pub fn byte_size(&self, id: TypeId) -> Option<u64> {
        match self.get(id) {
            Type::Void | Type::Func { .. } => None,
            Type::Int(bits) => Some(((*bits as u64) + 7) / 8),
            Type::Ptr => Some(8),
            Type::Array { elem, len } => Some(self.byte_size(*elem)? * len),
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Type>> for TypeTable {
    fn from(types: Vec<Type>) -> Self {
        let interned = types
            .iter()
            .enumerate()
            .map(|(i, ty)| (ty.clone(), TypeId(i as u32)))
            .collect();
        Self { types, interned }
    }
}

impl From<TypeTable> for Vec<Type> {
    fn from(table: TypeTable) -> Self {
        table.types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut table = TypeTable::new();
        let a = table.int(32);
        let b = table.int(32);
        assert_eq!(a, b);
        assert_ne!(table.int(64), a);
    }

    #[test]
    fn byte_sizes() {
        let mut table = TypeTable::new();
        let i8_ty = table.int(8);
        let arr = table.array(i8_ty, 6);
        assert_eq!(table.byte_size(i8_ty), Some(1));
        assert_eq!(table.byte_size(arr), Some(6));
        let void = table.void();
        assert_eq!(table.byte_size(void), None);
    }
}
