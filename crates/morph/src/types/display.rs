//! Type pretty-printing for diagnostics.
//!
//! Identifiers print as their name and are never expanded, so recursive types
//! print finitely.

use super::{PointerTarget, TypeKind, TypeNode};
use morph_mem::{NameId, NameIndex};
use std::fmt;

/// Display wrapper resolving names through a [`NameIndex`].
pub struct DisplayType<'a> {
    ty: &'a TypeNode,
    names: &'a NameIndex,
}

impl<'a> DisplayType<'a> {
    pub fn new(ty: &'a TypeNode, names: &'a NameIndex) -> Self {
        Self { ty, names }
    }
}

impl fmt::Display for DisplayType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.format_type(self.ty, f)
    }
}

impl DisplayType<'_> {
    fn format_type(&self, ty: &TypeNode, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match ty.kind() {
            TypeKind::Intrinsic(layout) => {
                write!(f, "intrinsic({}, {})", layout.size, layout.align)
            }

            TypeKind::Identifier(ident) => self.format_name(ident.name(), f),

            TypeKind::Raised { source, raise_id } => {
                write!(f, "raised#{raise_id} ")?;
                self.format_type(source, f)
            }

            TypeKind::Structure(s) => {
                let members = s.members();
                if members.is_empty() {
                    return write!(f, "struct {{}}");
                }
                write!(f, "struct {{ ")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    self.format_name(member.name(), f)?;
                    write!(f, ": ")?;
                    self.format_type(member.ty(), f)?;
                }
                write!(f, " }}")
            }

            TypeKind::Species(s) => {
                write!(f, "species [")?;
                for (i, member) in s.members().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    self.format_type(member, f)?;
                }
                write!(f, "]")
            }

            TypeKind::Enum(e) => {
                let variants = e.variants();
                if variants.is_empty() {
                    return write!(f, "enum {{}}");
                }
                write!(f, "enum {{ ")?;
                for (i, variant) in variants.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    self.format_name(variant.name(), f)?;
                    write!(f, "(")?;
                    self.format_type(variant.ty(), f)?;
                    write!(f, ")")?;
                }
                write!(f, " }}")
            }

            TypeKind::Function { child, parent } => {
                write!(f, "fn(")?;
                self.format_type(child, f)?;
                write!(f, ") -> ")?;
                self.format_type(parent, f)
            }

            TypeKind::Pointer(target) => {
                write!(f, "*")?;
                match target {
                    PointerTarget::Owned(source) => self.format_type(source, f),
                    PointerTarget::Back(weak) => match weak.upgrade() {
                        Some(source) => self.format_type(&source, f),
                        None => write!(f, "<released>"),
                    },
                }
            }

            TypeKind::Any => write!(f, "any"),
        }
    }

    fn format_name(&self, name: NameId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.names.name_for_index(name) {
            Some(name) => f.write_str(name),
            None => write!(f, "{name}"),
        }
    }
}
