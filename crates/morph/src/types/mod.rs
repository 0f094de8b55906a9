//! The type node graph.
//!
//! Every value type is a [`TypeNode`] behind a reference-counted [`TypeRef`].
//! The variant set is closed ([`TypeKind`]); aggregates own their members,
//! identifiers and raised types own their source, and recursive types point
//! back at their identifier through a non-owning [`WeakType`], so the owning
//! edges always form a DAG.
//!
//! Nodes are built and mutated through [`TypeSystem`](crate::TypeSystem); this
//! module holds the data model, memoized layouts and read accessors.

mod display;

pub use display::DisplayType;

use crate::combination::CombRef;
use crate::ownership::{Single, WeakSingle};
use bitflags::bitflags;
use morph_mem::NameId;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;

/// Owning handle to a type node.
pub type TypeRef = Single<TypeNode>;

/// Non-owning back-reference to a type node.
pub type WeakType = WeakSingle<TypeNode>;

bitflags! {
    /// Capabilities derived from a node's variant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeFlags: u8 {
        /// Members can be looked up by name.
        const NAMESPACE = 1 << 0;
        /// Named subtypes can be attached.
        const SUBTYPES = 1 << 1;
        /// Combinations can be attached.
        const COMBS = 1 << 2;
    }
}

/// Discriminant of a [`TypeKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Intrinsic,
    Identifier,
    Raised,
    Structure,
    Species,
    Enum,
    Function,
    Pointer,
    Any,
}

impl TypeTag {
    /// Capability flags of this variant.
    #[must_use]
    pub const fn flags(self) -> TypeFlags {
        match self {
            TypeTag::Identifier => TypeFlags::all(),
            TypeTag::Structure | TypeTag::Enum => TypeFlags::NAMESPACE,
            _ => TypeFlags::empty(),
        }
    }

    /// Lower-case variant name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TypeTag::Intrinsic => "intrinsic",
            TypeTag::Identifier => "identifier",
            TypeTag::Raised => "raised",
            TypeTag::Structure => "structure",
            TypeTag::Species => "species",
            TypeTag::Enum => "enum",
            TypeTag::Function => "function",
            TypeTag::Pointer => "pointer",
            TypeTag::Any => "any",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size and alignment of a value, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeLayout {
    pub size: usize,
    pub align: usize,
}

impl TypeLayout {
    /// Layout of a type with no storage.
    pub const EMPTY: TypeLayout = TypeLayout::new(0, 1);

    /// Layout of one machine word (pointers, function references).
    pub const WORD: TypeLayout = TypeLayout::new(size_of::<usize>(), align_of::<usize>());

    /// Layout of an `any` box: a value word plus a type-tag word.
    pub const ANY: TypeLayout = TypeLayout::new(2 * size_of::<usize>(), align_of::<usize>());

    #[must_use]
    pub const fn new(size: usize, align: usize) -> Self {
        TypeLayout { size, align }
    }

    /// Size rounded up to the alignment: the distance between array elements.
    #[must_use]
    pub const fn stride(self) -> usize {
        align_up(self.size, self.align)
    }
}

impl Default for TypeLayout {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Rounds `n` up to a multiple of `align`, which must be a power of two.
#[must_use]
pub const fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Size of an enum discriminant.
const DISCRIMINANT: TypeLayout = TypeLayout::new(4, 4);

/// Discriminant of the variant at `index`.
///
/// # Panics
///
/// Panics (through `fatal!`) once the `u32` discriminant space is exhausted.
fn discriminant_for(index: usize) -> u32 {
    match u32::try_from(index) {
        Ok(discriminant) => discriminant,
        Err(_) => morph_log::fatal!("enum discriminant overflow at variant {index}"),
    }
}

/// A type node: one variant of the closed type universe.
pub struct TypeNode {
    kind: TypeKind,
}

/// Variant payloads.
pub enum TypeKind {
    /// Opaque memory described only by its layout.
    Intrinsic(TypeLayout),
    /// Named wrapper; the only variant carrying combinations and subtypes.
    Identifier(Identifier),
    /// Distinct type with the storage of its source.
    Raised { source: TypeRef, raise_id: u32 },
    Structure(Structure),
    /// Ordered widening chain.
    Species(Species),
    Enum(Enum),
    /// Callable signature: `child` is the argument, `parent` the result.
    Function { child: TypeRef, parent: TypeRef },
    Pointer(PointerTarget),
    /// Boxed value of any type with a runtime tag.
    Any,
}

impl TypeNode {
    pub(crate) fn new(kind: TypeKind) -> Self {
        TypeNode { kind }
    }

    #[must_use]
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    #[must_use]
    pub fn tag(&self) -> TypeTag {
        match &self.kind {
            TypeKind::Intrinsic(_) => TypeTag::Intrinsic,
            TypeKind::Identifier(_) => TypeTag::Identifier,
            TypeKind::Raised { .. } => TypeTag::Raised,
            TypeKind::Structure(_) => TypeTag::Structure,
            TypeKind::Species(_) => TypeTag::Species,
            TypeKind::Enum(_) => TypeTag::Enum,
            TypeKind::Function { .. } => TypeTag::Function,
            TypeKind::Pointer(_) => TypeTag::Pointer,
            TypeKind::Any => TypeTag::Any,
        }
    }

    #[must_use]
    pub fn flags(&self) -> TypeFlags {
        self.tag().flags()
    }

    #[must_use]
    pub fn is_namespace(&self) -> bool {
        self.flags().contains(TypeFlags::NAMESPACE)
    }

    #[must_use]
    pub fn has_subtypes(&self) -> bool {
        self.flags().contains(TypeFlags::SUBTYPES)
    }

    #[must_use]
    pub fn has_combs(&self) -> bool {
        self.flags().contains(TypeFlags::COMBS)
    }

    /// Storage layout of a value of this type.
    ///
    /// A forward-declared identifier without a source has no storage yet.
    #[must_use]
    pub fn layout(&self) -> TypeLayout {
        match &self.kind {
            TypeKind::Intrinsic(layout) => *layout,
            TypeKind::Identifier(ident) => ident
                .source()
                .map_or(TypeLayout::EMPTY, |source| source.layout()),
            TypeKind::Raised { source, .. } => source.layout(),
            TypeKind::Structure(s) => s.layout.get(),
            TypeKind::Species(s) => s.layout.get(),
            TypeKind::Enum(e) => e.layout(),
            TypeKind::Function { .. } | TypeKind::Pointer(_) => TypeLayout::WORD,
            TypeKind::Any => TypeLayout::ANY,
        }
    }

    /// Name of an identifier.
    #[must_use]
    pub fn name(&self) -> Option<NameId> {
        self.as_identifier().map(Identifier::name)
    }

    /// The type one resolution step outward, if any.
    ///
    /// Identifiers resolve to their source, raised types to the type they
    /// were raised from and species to their last (widest) member. Every
    /// other variant is a fixed point.
    #[must_use]
    pub fn resolve_step(&self) -> Option<TypeRef> {
        match &self.kind {
            TypeKind::Identifier(ident) => ident.source(),
            TypeKind::Raised { source, .. } => Some(source.link()),
            TypeKind::Species(species) => species.widest(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_identifier(&self) -> Option<&Identifier> {
        match &self.kind {
            TypeKind::Identifier(ident) => Some(ident),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_structure(&self) -> Option<&Structure> {
        match &self.kind {
            TypeKind::Structure(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_species(&self) -> Option<&Species> {
        match &self.kind {
            TypeKind::Species(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_enum(&self) -> Option<&Enum> {
        match &self.kind {
            TypeKind::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Returns false while storage still depends on an undefined identifier.
    ///
    /// Only complete types can be stored by value in an aggregate; the
    /// aggregate memoizes their layout when they are added.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match &self.kind {
            TypeKind::Identifier(ident) => ident.source().is_some_and(|s| s.is_complete()),
            TypeKind::Raised { source, .. } => source.is_complete(),
            _ => true,
        }
    }

    /// Returns true if `target` is reachable from `self` through owning edges.
    pub(crate) fn owns_path_to(&self, target: &TypeNode) -> bool {
        if std::ptr::eq(self, target) {
            return true;
        }

        match &self.kind {
            TypeKind::Intrinsic(_) | TypeKind::Any => false,
            TypeKind::Identifier(ident) => {
                ident.source().is_some_and(|s| s.owns_path_to(target))
                    || ident.subtypes.borrow().iter().any(|s| s.owns_path_to(target))
                    || ident
                        .combinations
                        .borrow()
                        .iter()
                        .any(|c| c.child().owns_path_to(target))
            }
            TypeKind::Raised { source, .. } => source.owns_path_to(target),
            TypeKind::Structure(s) => s.members.borrow().iter().any(|m| m.ty.owns_path_to(target)),
            TypeKind::Species(s) => s.members.borrow().iter().any(|m| m.owns_path_to(target)),
            TypeKind::Enum(e) => e.variants.borrow().iter().any(|v| v.ty.owns_path_to(target)),
            TypeKind::Function { child, parent } => {
                child.owns_path_to(target) || parent.owns_path_to(target)
            }
            TypeKind::Pointer(PointerTarget::Owned(source)) => source.owns_path_to(target),
            TypeKind::Pointer(PointerTarget::Back(_)) => false,
        }
    }
}

impl fmt::Debug for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = self.layout();
        let mut s = f.debug_struct("TypeNode");
        s.field("tag", &self.tag());
        if let Some(name) = self.name() {
            s.field("name", &name);
        }
        s.field("size", &layout.size).field("align", &layout.align).finish()
    }
}

/// Payload of a named wrapper type.
pub struct Identifier {
    name: NameId,
    source: RefCell<Option<TypeRef>>,
    /// Insertion order; lookup walks it from the back.
    pub(crate) combinations: RefCell<Vec<CombRef>>,
    subtypes: RefCell<Vec<TypeRef>>,
}

impl Identifier {
    pub(crate) fn new(name: NameId, source: Option<TypeRef>) -> Self {
        Identifier {
            name,
            source: RefCell::new(source),
            combinations: RefCell::new(Vec::new()),
            subtypes: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> NameId {
        self.name
    }

    /// The wrapped type; `None` while only forward-declared.
    #[must_use]
    pub fn source(&self) -> Option<TypeRef> {
        self.source.borrow().as_ref().map(Single::link)
    }

    #[must_use]
    pub fn is_defined(&self) -> bool {
        self.source.borrow().is_some()
    }

    pub(crate) fn set_source(&self, source: TypeRef) {
        *self.source.borrow_mut() = Some(source);
    }

    /// Combinations in definition order.
    #[must_use]
    pub fn combinations(&self) -> Vec<CombRef> {
        self.combinations.borrow().clone()
    }

    /// Subtypes in definition order.
    #[must_use]
    pub fn subtypes(&self) -> Vec<TypeRef> {
        self.subtypes.borrow().clone()
    }

    /// Most recently added subtype called `name`.
    #[must_use]
    pub fn find_subtype(&self, name: NameId) -> Option<TypeRef> {
        self.subtypes
            .borrow()
            .iter()
            .rev()
            .find(|sub| sub.name() == Some(name))
            .map(Single::link)
    }

    pub(crate) fn push_subtype(&self, subtype: TypeRef) {
        self.subtypes.borrow_mut().push(subtype);
    }
}

/// A named, positioned field of a structure.
#[derive(Clone)]
pub struct Member {
    name: NameId,
    offset: usize,
    size: usize,
    ty: TypeRef,
}

impl Member {
    #[must_use]
    pub fn name(&self) -> NameId {
        self.name
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("ty", &self.ty.tag())
            .finish()
    }
}

/// Ordered, named aggregate with an incrementally maintained layout.
///
/// Members are placed at the next offset aligned for them; the memoized size
/// carries no tail padding (see [`TypeLayout::stride`]).
pub struct Structure {
    members: RefCell<Vec<Member>>,
    layout: Cell<TypeLayout>,
}

impl Structure {
    pub(crate) fn new() -> Self {
        Structure {
            members: RefCell::new(Vec::new()),
            layout: Cell::new(TypeLayout::EMPTY),
        }
    }

    #[must_use]
    pub fn members(&self) -> Ref<'_, [Member]> {
        Ref::map(self.members.borrow(), Vec::as_slice)
    }

    #[must_use]
    pub fn num_items(&self) -> usize {
        self.members.borrow().len()
    }

    /// First member called `name`.
    #[must_use]
    pub fn find_member(&self, name: NameId) -> Option<Member> {
        self.members.borrow().iter().find(|m| m.name == name).cloned()
    }

    pub(crate) fn push(&self, name: NameId, ty: TypeRef) {
        let member = ty.layout();
        let mut layout = self.layout.get();

        let offset = align_up(layout.size, member.align);
        layout.size = offset + member.size;
        layout.align = layout.align.max(member.align);

        self.layout.set(layout);
        self.members.borrow_mut().push(Member {
            name,
            offset,
            size: member.size,
            ty,
        });
    }
}

/// Ordered widening chain. Earlier members widen into later ones.
pub struct Species {
    members: RefCell<Vec<TypeRef>>,
    layout: Cell<TypeLayout>,
}

impl Species {
    pub(crate) fn new() -> Self {
        Species {
            members: RefCell::new(Vec::new()),
            layout: Cell::new(TypeLayout::EMPTY),
        }
    }

    #[must_use]
    pub fn members(&self) -> Ref<'_, [TypeRef]> {
        Ref::map(self.members.borrow(), Vec::as_slice)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    /// The last member, which every other member widens into.
    #[must_use]
    pub fn widest(&self) -> Option<TypeRef> {
        self.members.borrow().last().map(Single::link)
    }

    pub(crate) fn push(&self, ty: TypeRef) {
        let member = ty.layout();
        let layout = self.layout.get();
        self.layout.set(TypeLayout::new(
            layout.size.max(member.size),
            layout.align.max(member.align),
        ));
        self.members.borrow_mut().push(ty);
    }
}

/// One alternative of an enum.
#[derive(Clone)]
pub struct Variant {
    name: NameId,
    discriminant: u32,
    ty: TypeRef,
}

impl Variant {
    #[must_use]
    pub fn name(&self) -> NameId {
        self.name
    }

    #[must_use]
    pub fn discriminant(&self) -> u32 {
        self.discriminant
    }

    #[must_use]
    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variant")
            .field("name", &self.name)
            .field("discriminant", &self.discriminant)
            .field("ty", &self.ty.tag())
            .finish()
    }
}

/// Tagged union: a `u32` discriminant followed by the largest payload.
pub struct Enum {
    variants: RefCell<Vec<Variant>>,
    payload: Cell<TypeLayout>,
}

impl Enum {
    pub(crate) fn new() -> Self {
        Enum {
            variants: RefCell::new(Vec::new()),
            payload: Cell::new(TypeLayout::EMPTY),
        }
    }

    #[must_use]
    pub fn variants(&self) -> Ref<'_, [Variant]> {
        Ref::map(self.variants.borrow(), Vec::as_slice)
    }

    #[must_use]
    pub fn num_items(&self) -> usize {
        self.variants.borrow().len()
    }

    #[must_use]
    pub fn find_variant(&self, name: NameId) -> Option<Variant> {
        self.variants.borrow().iter().find(|v| v.name == name).cloned()
    }

    /// Offset of the payload, after the discriminant.
    #[must_use]
    pub fn payload_offset(&self) -> usize {
        align_up(DISCRIMINANT.size, self.payload.get().align)
    }

    #[must_use]
    pub fn layout(&self) -> TypeLayout {
        let payload = self.payload.get();
        TypeLayout::new(
            self.payload_offset() + payload.size,
            DISCRIMINANT.align.max(payload.align),
        )
    }

    pub(crate) fn push(&self, name: NameId, ty: TypeRef) {
        let member = ty.layout();
        let payload = self.payload.get();
        self.payload.set(TypeLayout::new(
            payload.size.max(member.size),
            payload.align.max(member.align),
        ));

        let mut variants = self.variants.borrow_mut();
        let discriminant = discriminant_for(variants.len());
        variants.push(Variant {
            name,
            discriminant,
            ty,
        });
    }
}

/// What a pointer refers to.
pub enum PointerTarget {
    Owned(TypeRef),
    /// Back-edge of a recursive type; does not keep the target alive.
    Back(WeakType),
}

impl PointerTarget {
    /// The pointee, or `None` if a back-edge outlived its target.
    #[must_use]
    pub fn get(&self) -> Option<TypeRef> {
        match self {
            PointerTarget::Owned(ty) => Some(ty.link()),
            PointerTarget::Back(weak) => weak.upgrade(),
        }
    }

    #[must_use]
    pub fn is_back(&self) -> bool {
        matches!(self, PointerTarget::Back(_))
    }
}
