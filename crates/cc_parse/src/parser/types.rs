//! Type-specifier, declarator, and struct/union/enum parsing (§4.5 "Type
//! specifiers", "Declarators", "Bitfields", "Struct layout").

use super::Parser;
use crate::scope::VarScopeEntry;
use crate::ty::{align_to, Member, TypeId, TypeKind};
use cc_base::Result;

/// Storage-class and qualifier keywords collected alongside a typespec,
/// threaded through declaration parsing (§4.5 "Type specifiers").
pub struct VarAttr {
    pub base_ty: TypeId,
    pub is_static: bool,
    pub is_extern: bool,
    pub is_typedef: bool,
    pub align: Option<usize>,
}

// Type-specifier permutations (e.g. `long int signed`) are matched by
// summing a bit per keyword and comparing the total against every valid
// combination's sum, rather than counting each keyword separately (§4.5
// "Type specifiers").
const VOID: u32 = 1 << 0;
const BOOL: u32 = 1 << 2;
const CHAR: u32 = 1 << 4;
const SHORT: u32 = 1 << 6;
const INT: u32 = 1 << 8;
const LONG: u32 = 1 << 10;
const FLOAT: u32 = 1 << 12;
const DOUBLE: u32 = 1 << 14;
const SIGNED: u32 = 1 << 17;
const UNSIGNED: u32 = 1 << 18;

impl<'t> Parser<'t> {
    fn is_typename(&self) -> bool {
        const KEYWORDS: &[&str] = &[
            "void", "_Bool", "char", "short", "int", "long", "float", "double", "struct", "union",
            "enum", "typedef", "static", "extern", "const", "volatile", "register", "signed",
            "unsigned", "inline", "_Alignas", "_Noreturn", "_Thread_local",
        ];
        let text = self.cur_text();
        if KEYWORDS.contains(&text) {
            return true;
        }
        matches!(self.scopes.find_var(text), Some(VarScopeEntry::Typedef(_)))
    }

    /// Parses a full typespec plus attached storage-class/qualifier
    /// keywords into a [`VarAttr`].
    pub(super) fn typespec_attr(&mut self) -> Result<VarAttr> {
        let mut is_static = false;
        let mut is_extern = false;
        let mut is_typedef = false;
        let mut align = None;
        let mut mask: u32 = 0;
        let mut struct_ty: Option<TypeId> = None;

        loop {
            if self.at("static") {
                is_static = true;
                self.advance();
            } else if self.at("extern") {
                is_extern = true;
                self.advance();
            } else if self.at("typedef") {
                is_typedef = true;
                self.advance();
            } else if self.at("const") || self.at("volatile") || self.at("register") || self.at("inline")
                || self.at("_Noreturn") || self.at("_Thread_local")
            {
                self.advance();
            } else if self.at("_Alignas") {
                self.advance();
                self.expect("(")?;
                let n = if self.is_typename() {
                    let (_, ty) = self.abstract_declarator_or_typename()?;
                    self.types.align_of(ty) as i64
                } else {
                    let e = self.conditional()?;
                    self.add_type(e)?;
                    self.eval_const_node(e)?
                };
                self.expect(")")?;
                align = Some(n as usize);
            } else if self.at("struct") || self.at("union") {
                if struct_ty.is_some() {
                    break;
                }
                struct_ty = Some(self.struct_union_decl()?);
            } else if self.at("enum") {
                if struct_ty.is_some() {
                    break;
                }
                struct_ty = Some(self.enum_decl()?);
            } else if struct_ty.is_none() && self.is_typename() {
                let text = self.cur_text();
                let bit = match text {
                    "void" => VOID,
                    "_Bool" => BOOL,
                    "char" => CHAR,
                    "short" => SHORT,
                    "int" => INT,
                    "long" => LONG,
                    "float" => FLOAT,
                    "double" => DOUBLE,
                    "signed" => SIGNED,
                    "unsigned" => UNSIGNED,
                    _ => {
                        if mask == 0 {
                            if let Some(VarScopeEntry::Typedef(id)) = self.scopes.find_var(text) {
                                struct_ty = Some(*id);
                                self.advance();
                                continue;
                            }
                        }
                        break;
                    }
                };
                mask += bit;
                self.advance();
            } else {
                break;
            }
        }

        let base_ty = if let Some(id) = struct_ty {
            id
        } else {
            self.resolve_basic_type(mask)?
        };
        let base_ty = if let Some(a) = align {
            let c = self.types.copy_type(base_ty);
            self.types.get_mut(c).align = a;
            c
        } else {
            base_ty
        };
        Ok(VarAttr { base_ty, is_static, is_extern, is_typedef, align })
    }

    fn resolve_basic_type(&mut self, mask: u32) -> Result<TypeId> {
        if mask == 0 || mask == SIGNED || mask == INT || mask == INT + SIGNED {
            return Ok(self.types.int);
        }
        if mask == VOID {
            return Ok(self.types.void);
        }
        if mask == BOOL {
            return Ok(self.types.bool_);
        }
        if mask == CHAR || mask == CHAR + SIGNED {
            return Ok(self.types.char_);
        }
        if mask == CHAR + UNSIGNED {
            return Ok(self.types.uchar);
        }
        if mask == SHORT || mask == SHORT + INT || mask == SHORT + SIGNED || mask == SHORT + INT + SIGNED {
            return Ok(self.types.short);
        }
        if mask == SHORT + UNSIGNED || mask == SHORT + UNSIGNED + INT {
            return Ok(self.types.ushort);
        }
        if mask == UNSIGNED || mask == UNSIGNED + INT {
            return Ok(self.types.uint);
        }
        if mask == LONG
            || mask == LONG + INT
            || mask == LONG + LONG
            || mask == LONG + LONG + INT
            || mask == LONG + SIGNED
        {
            return Ok(self.types.long);
        }
        if mask == LONG + UNSIGNED || mask == LONG + LONG + UNSIGNED || mask == LONG + UNSIGNED + INT {
            return Ok(self.types.ulong);
        }
        if mask == FLOAT {
            return Ok(self.types.float);
        }
        if mask == DOUBLE || mask == DOUBLE + LONG {
            return Ok(self.types.double);
        }
        Err(self.err_here("invalid combination of type specifiers"))
    }

    /// `pointers ("(" declarator ")" | ident) type-suffix` (§4.5
    /// "Declarators").
    pub(super) fn declarator(&mut self, mut ty: TypeId) -> Result<(String, TypeId)> {
        while self.consume("*") {
            ty = self.types.pointer_to(ty);
            while self.consume("const") || self.consume("volatile") || self.consume("restrict") {}
        }
        if self.at("(") {
            // Nested `(declarator)`: the suffix after the matching ")"
            // applies to the *outer* type, and that result becomes the base
            // type for a second, real parse of the inner declarator — the
            // two-pass fixed point described in §9 ("the declarator
            // placeholder fixed-point"). The first pass only walks past the
            // inner declarator to find the matching ")"; its result (typed
            // against a throwaway `void` base) is discarded.
            let start = self.pos + 1;
            self.advance();
            self.declarator(self.types.void)?;
            self.expect(")")?;
            let final_ty = self.type_suffix(ty)?;
            let rest = self.pos;
            self.pos = start;
            let (name, inner_ty) = self.declarator(final_ty)?;
            self.pos = rest;
            return Ok((name, inner_ty));
        }
        let name = if self.cur().is_ident() { self.expect_ident()? } else { String::new() };
        let ty = self.type_suffix(ty)?;
        Ok((name, ty))
    }

    /// `"(" func-params | "[" array-dimensions | ε` (§4.5 "Declarators").
    fn type_suffix(&mut self, ty: TypeId) -> Result<TypeId> {
        if self.consume("(") {
            return self.func_params(ty);
        }
        if self.consume("[") {
            return self.array_dimensions(ty);
        }
        Ok(ty)
    }

    fn func_params(&mut self, return_ty: TypeId) -> Result<TypeId> {
        let mut params = Vec::new();
        let mut param_names = Vec::new();
        let mut is_variadic = false;
        // `(void)` is a zero-parameter prototype, not a parameter named `void`.
        if self.at("void") && self.peek(1).is_in(")", self.files) {
            self.advance();
        } else if !self.at(")") {
            loop {
                if self.consume("...") {
                    is_variadic = true;
                    break;
                }
                let attr = self.typespec_attr()?;
                let (name, mut pty) = self.declarator(attr.base_ty)?;
                pty = self.types.decay(pty);
                params.push(pty);
                param_names.push(name);
                if !self.consume(",") {
                    break;
                }
            }
        }
        self.expect(")")?;
        Ok(self.types.func_type(return_ty, params, param_names, is_variadic))
    }

    fn array_dimensions(&mut self, base: TypeId) -> Result<TypeId> {
        if self.consume("]") {
            // Length omitted: caller (the initializer pass) fixes this up
            // once the brace-list length is known.
            let inner = self.type_suffix(base)?;
            return Ok(self.types.array_of(inner, 0));
        }
        let len_node = self.conditional()?;
        self.add_type(len_node)?;
        let len = self.eval_const_node(len_node)? as usize;
        self.expect("]")?;
        let inner = self.type_suffix(base)?;
        Ok(self.types.array_of(inner, len))
    }

    /// Used by `_Alignas(type)` and `sizeof(type)`/casts to tell a typename
    /// apart from a parenthesized expression.
    pub(super) fn abstract_declarator_or_typename(&mut self) -> Result<(String, TypeId)> {
        let attr = self.typespec_attr()?;
        let mut ty = attr.base_ty;
        while self.consume("*") {
            ty = self.types.pointer_to(ty);
        }
        if self.at("[") {
            self.advance();
            ty = self.array_dimensions(ty)?;
        }
        Ok((String::new(), ty))
    }

    fn struct_union_decl(&mut self) -> Result<TypeId> {
        let is_union = self.at("union");
        self.advance();
        let tag = if self.cur().is_ident() { Some(self.expect_ident()?) } else { None };

        if !self.at("{") {
            // Reference to a previously declared (possibly incomplete) tag.
            if let Some(name) = &tag {
                if let Some(ty) = self.scopes.find_tag(name) {
                    return Ok(ty);
                }
                let ty = self.types.incomplete_struct(is_union);
                self.scopes.push_tag(name.clone(), ty);
                return Ok(ty);
            }
            return Err(self.err_here("expected a tag name or '{' after struct/union"));
        }
        self.advance();

        let mut members = Vec::new();
        while !self.consume("}") {
            let attr = self.typespec_attr()?;
            loop {
                let (name, mty) = if self.at(":") {
                    (String::new(), attr.base_ty)
                } else {
                    self.declarator(attr.base_ty)?
                };
                let (is_bitfield, bit_width) = if self.consume(":") {
                    let e = self.conditional()?;
                    self.add_type(e)?;
                    (true, self.eval_const_node(e)? as u32)
                } else {
                    (false, 0)
                };
                members.push(Member {
                    ty: mty,
                    name_text: if name.is_empty() { None } else { Some(name) },
                    align: self.types.align_of(mty),
                    offset: 0,
                    is_bitfield,
                    bit_width,
                    bit_offset: 0,
                });
                if !self.consume(",") {
                    break;
                }
            }
            self.expect(";")?;
        }

        let (members, size, align) = layout_struct(&mut self.types, members, is_union);
        let ty = self.types.incomplete_struct(is_union);
        self.types.finish_struct(ty, members, size, align);
        if let Some(name) = tag {
            self.scopes.push_tag(name, ty);
        }
        Ok(ty)
    }

    fn enum_decl(&mut self) -> Result<TypeId> {
        self.advance();
        let tag = if self.cur().is_ident() { Some(self.expect_ident()?) } else { None };
        if !self.at("{") {
            if let Some(name) = &tag {
                if let Some(ty) = self.scopes.find_tag(name) {
                    return Ok(ty);
                }
            }
            return Err(self.err_here("expected a tag name or '{' after enum"));
        }
        self.advance();
        let ty = self.types.enum_type();
        let mut value: i64 = 0;
        loop {
            if self.consume("}") {
                break;
            }
            let name = self.expect_ident()?;
            if self.consume("=") {
                let e = self.conditional()?;
                self.add_type(e)?;
                value = self.eval_const_node(e)?;
            }
            self.scopes.push_var(name, VarScopeEntry::EnumConst { ty, value });
            value += 1;
            if !self.consume(",") {
                self.expect("}")?;
                break;
            }
        }
        if let Some(name) = tag {
            self.scopes.push_tag(name, ty);
        }
        Ok(ty)
    }
}

/// Bitfield-aware struct/union layout (§4.5 "Bitfields", "Struct layout").
///
/// A bit cursor tracks position within the current storage unit (sized to
/// the member's own type); a field that would cross a unit boundary starts a
/// new unit, and a zero-width field forces alignment to its unit.
fn layout_struct(types: &mut crate::ty::TypeTable, mut members: Vec<Member>, is_union: bool) -> (Vec<Member>, usize, usize) {
    if is_union {
        let mut size = 0usize;
        let mut align = 1usize;
        for m in &mut members {
            m.offset = 0;
            size = size.max(types.size_of(m.ty));
            align = align.max(types.align_of(m.ty));
        }
        return (members, align_to(size, align), align);
    }

    let mut bits: usize = 0;
    let mut align = 1usize;
    for m in &mut members {
        let unit_bits = types.size_of(m.ty) * 8;
        align = align.max(types.align_of(m.ty));
        if m.is_bitfield {
            if m.bit_width == 0 {
                bits = align_to(bits, unit_bits);
                continue;
            }
            if bits / unit_bits != (bits + m.bit_width as usize - 1) / unit_bits {
                bits = align_to(bits, unit_bits);
            }
            m.offset = (bits / 8 / types.size_of(m.ty)) * types.size_of(m.ty);
            m.bit_offset = (bits % unit_bits) as u32;
            bits += m.bit_width as usize;
        } else {
            bits = align_to(bits, types.align_of(m.ty) * 8);
            m.offset = bits / 8;
            bits += types.size_of(m.ty) * 8;
        }
    }
    let size = align_to(align_to(bits, 8), align * 8) / 8;
    (members, size, align)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use cc_base::SourceMap;
    use cc_lex::tokenize;

    fn toks(src: &str) -> (Vec<cc_lex::Token>, SourceMap) {
        let mut files = SourceMap::new();
        let prepared = cc_lex::prepare_source(src);
        let file = files.add_file("<test>".into(), prepared);
        let tokens = tokenize(file, files.contents(file)).unwrap();
        (tokens, files)
    }

    #[test]
    fn bitfield_struct_layout_packs_across_one_storage_unit() {
        let mut types = TypeTable::new();
        let members = vec![
            Member { ty: types.int, name_text: Some("a".into()), align: 4, offset: 0, is_bitfield: true, bit_width: 3, bit_offset: 0 },
            Member { ty: types.int, name_text: Some("b".into()), align: 4, offset: 0, is_bitfield: true, bit_width: 5, bit_offset: 0 },
            Member { ty: types.int, name_text: Some("c".into()), align: 4, offset: 0, is_bitfield: false, bit_width: 0, bit_offset: 0 },
        ];
        let (members, size, align) = layout_struct(&mut types, members, false);
        assert_eq!(size, 8);
        assert_eq!(align, 4);
        assert_eq!(members[2].offset, 4);
    }

    #[test]
    fn struct_with_bitfield_parses_end_to_end() {
        let (t, s) = toks("struct S { int a:3; int b:5; int c; };\nint main(){ return 0; }\n");
        let out = parse(&t, &s).unwrap();
        assert_eq!(out.program.functions.len(), 1);
    }

    #[test]
    fn simple_global_and_function_parse() {
        let (t, s) = toks("int g; int main(){ return g; }\n");
        let out = parse(&t, &s).unwrap();
        assert_eq!(out.program.globals.len(), 1);
        assert_eq!(out.program.functions.len(), 1);
    }
}
