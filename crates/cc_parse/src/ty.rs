//! Canonical type objects (§3 "Type", §4.2).
//!
//! Types are arena-allocated and referenced by [`TypeId`]; `copy_type`
//! shallow-duplicates an entry so call sites can mutate qualifiers (`const`,
//! array length fixups) without disturbing every other holder of the
//! original id.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone)]
pub struct Member {
    pub ty: TypeId,
    pub name_text: Option<String>,
    pub align: usize,
    pub offset: usize,
    pub is_bitfield: bool,
    pub bit_width: u32,
    pub bit_offset: u32,
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Void,
    Bool,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Enum is represented as its own kind (rather than aliasing `Int`) so
    /// diagnostics and `_Generic`-style matching (not implemented) can tell
    /// them apart; arithmetic treats it exactly as `int`.
    Enum,
    Ptr {
        base: TypeId,
    },
    Array {
        base: TypeId,
        len: usize,
    },
    Func {
        return_ty: TypeId,
        params: Vec<TypeId>,
        /// Parallel to `params`; empty names for abstract declarators
        /// (prototypes without parameter names) and implicit declarations.
        param_names: Vec<String>,
        is_variadic: bool,
    },
    Struct {
        members: Vec<Member>,
        is_union: bool,
    },
}

#[derive(Debug, Clone)]
pub struct Type {
    pub kind: TypeKind,
    pub size: usize,
    pub align: usize,
    pub is_unsigned: bool,
    pub is_const: bool,
    pub is_incomplete: bool,
}

impl Type {
    fn prim(kind: TypeKind, size: usize, align: usize, is_unsigned: bool) -> Self {
        Type { kind, size, align, is_unsigned, is_const: false, is_incomplete: false }
    }
}

/// The arena of all `Type` objects created during one compilation, plus the
/// canonical singleton ids for every primitive (§4.2 "construct primitive
/// singletons").
pub struct TypeTable {
    types: Vec<Type>,
    pub void: TypeId,
    pub bool_: TypeId,
    pub char_: TypeId,
    pub uchar: TypeId,
    pub short: TypeId,
    pub ushort: TypeId,
    pub int: TypeId,
    pub uint: TypeId,
    pub long: TypeId,
    pub ulong: TypeId,
    pub float: TypeId,
    pub double: TypeId,
}

impl TypeTable {
    pub fn new() -> Self {
        let mut types = Vec::new();
        let mut push = |t: Type| -> TypeId {
            types.push(t);
            TypeId((types.len() - 1) as u32)
        };
        let void = push(Type::prim(TypeKind::Void, 1, 1, false));
        let bool_ = push(Type::prim(TypeKind::Bool, 1, 1, false));
        let char_ = push(Type::prim(TypeKind::Char, 1, 1, false));
        let uchar = push(Type::prim(TypeKind::Char, 1, 1, true));
        let short = push(Type::prim(TypeKind::Short, 2, 2, false));
        let ushort = push(Type::prim(TypeKind::Short, 2, 2, true));
        let int = push(Type::prim(TypeKind::Int, 4, 4, false));
        let uint = push(Type::prim(TypeKind::Int, 4, 4, true));
        let long = push(Type::prim(TypeKind::Long, 8, 8, false));
        let ulong = push(Type::prim(TypeKind::Long, 8, 8, true));
        let float = push(Type::prim(TypeKind::Float, 4, 4, false));
        let double = push(Type::prim(TypeKind::Double, 8, 8, false));
        TypeTable {
            types,
            void,
            bool_,
            char_,
            uchar,
            short,
            ushort,
            int,
            uint,
            long,
            ulong,
            float,
            double,
        }
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.0 as usize]
    }

    fn push(&mut self, t: Type) -> TypeId {
        self.types.push(t);
        TypeId((self.types.len() - 1) as u32)
    }

    /// Shallow-duplicates the Type at `id` into a fresh entry (§4.2
    /// "copy-type"), so qualifier mutation (e.g. adding `const`) doesn't
    /// affect every other reference to the original.
    pub fn copy_type(&mut self, id: TypeId) -> TypeId {
        let t = self.get(id).clone();
        self.push(t)
    }

    pub fn pointer_to(&mut self, base: TypeId) -> TypeId {
        self.push(Type {
            kind: TypeKind::Ptr { base },
            size: 8,
            align: 8,
            is_unsigned: true,
            is_const: false,
            is_incomplete: false,
        })
    }

    pub fn array_of(&mut self, base: TypeId, len: usize) -> TypeId {
        let elem_size = self.get(base).size;
        self.push(Type {
            kind: TypeKind::Array { base, len },
            size: elem_size * len,
            align: self.get(base).align,
            is_unsigned: false,
            is_const: false,
            is_incomplete: false,
        })
    }

    pub fn func_type(
        &mut self,
        return_ty: TypeId,
        params: Vec<TypeId>,
        param_names: Vec<String>,
        is_variadic: bool,
    ) -> TypeId {
        self.push(Type {
            kind: TypeKind::Func { return_ty, params, param_names, is_variadic },
            size: 1,
            align: 1,
            is_unsigned: false,
            is_const: false,
            is_incomplete: false,
        })
    }

    pub fn enum_type(&mut self) -> TypeId {
        self.push(Type::prim(TypeKind::Enum, 4, 4, false))
    }

    /// Reserves an incomplete struct/union id; layout fills it in later via
    /// `finish_struct`, mirroring the declarator's forward-reference need.
    pub fn incomplete_struct(&mut self, is_union: bool) -> TypeId {
        self.push(Type {
            kind: TypeKind::Struct { members: Vec::new(), is_union },
            size: 0,
            align: 1,
            is_unsigned: false,
            is_const: false,
            is_incomplete: true,
        })
    }

    pub fn finish_struct(&mut self, id: TypeId, members: Vec<Member>, size: usize, align: usize) {
        let is_union = matches!(self.get(id).kind, TypeKind::Struct { is_union, .. } if is_union);
        let t = self.get_mut(id);
        t.kind = TypeKind::Struct { members, is_union };
        t.size = size;
        t.align = align;
        t.is_incomplete = false;
    }

    pub fn size_of(&self, id: TypeId) -> usize {
        self.get(id).size
    }

    pub fn align_of(&self, id: TypeId) -> usize {
        self.get(id).align
    }

    pub fn is_unsigned(&self, id: TypeId) -> bool {
        self.get(id).is_unsigned
    }

    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(
            self.get(id).kind,
            TypeKind::Bool | TypeKind::Char | TypeKind::Short | TypeKind::Int | TypeKind::Long | TypeKind::Enum
        )
    }

    pub fn is_flonum(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::Float | TypeKind::Double)
    }

    pub fn is_numeric(&self, id: TypeId) -> bool {
        self.is_integer(id) || self.is_flonum(id)
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::Ptr { .. })
    }

    pub fn is_array(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::Array { .. })
    }

    /// The pointee for pointers, the element type for arrays; `None`
    /// otherwise (§3 "decay from array to pointer consults `base`").
    pub fn base_of(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id).kind {
            TypeKind::Ptr { base } | TypeKind::Array { base, .. } => Some(base),
            _ => None,
        }
    }

    /// Array-to-pointer (and function-to-pointer) decay, applied by the
    /// parser in most expression contexts (§GLOSSARY "Decay").
    pub fn decay(&mut self, id: TypeId) -> TypeId {
        match self.get(id).kind.clone() {
            TypeKind::Array { base, .. } => self.pointer_to(base),
            TypeKind::Func { .. } => self.pointer_to(id),
            _ => id,
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

pub fn align_to(n: usize, align: usize) -> usize {
    (n + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_sizes_match_target_abi() {
        let t = TypeTable::new();
        assert_eq!(t.size_of(t.int), 4);
        assert_eq!(t.size_of(t.long), 8);
        assert_eq!(t.size_of(t.char_), 1);
        assert_eq!(t.size_of(t.double), 8);
    }

    #[test]
    fn pointer_and_array_share_base_not_kind() {
        let mut t = TypeTable::new();
        let p = t.pointer_to(t.int);
        let a = t.array_of(t.int, 3);
        assert_eq!(t.base_of(p), Some(t.int));
        assert_eq!(t.base_of(a), Some(t.int));
        assert_eq!(t.size_of(a), 12);
    }

    #[test]
    fn decay_turns_array_into_pointer_to_element() {
        let mut t = TypeTable::new();
        let a = t.array_of(t.int, 5);
        let decayed = t.decay(a);
        assert!(t.is_pointer(decayed));
        assert_eq!(t.base_of(decayed), Some(t.int));
    }

    #[test]
    fn copy_type_is_independent_of_original() {
        let mut t = TypeTable::new();
        let c = t.copy_type(t.int);
        t.get_mut(c).is_const = true;
        assert!(!t.get(t.int).is_const);
        assert!(t.get(c).is_const);
    }

    #[test]
    fn align_to_rounds_up_to_boundary() {
        assert_eq!(align_to(1, 4), 4);
        assert_eq!(align_to(4, 4), 4);
        assert_eq!(align_to(9, 8), 16);
    }

    #[test]
    fn struct_layout_respects_requested_size_and_align() {
        let mut t = TypeTable::new();
        let id = t.incomplete_struct(false);
        let members = vec![Member {
            ty: t.int,
            name_text: Some("a".into()),
            align: 4,
            offset: 0,
            is_bitfield: false,
            bit_width: 0,
            bit_offset: 0,
        }];
        t.finish_struct(id, members, 4, 4);
        assert_eq!(t.size_of(id), 4);
        assert!(!t.get(id).is_incomplete);
    }
}
