//! The type system context.
//!
//! A [`TypeSystem`] owns everything process-wide in the type engine: the name
//! index, an arena for collaborators (AST and IR nodes), the raise counter and
//! the core types. Independent instances share nothing, so tests and tools
//! can create as many as they like.
//!
//! The core types are identifiers registered as subtypes of `root`:
//!
//! | core type  | source                         |
//! |------------|--------------------------------|
//! | `char`     | `intrinsic(1, 1)`              |
//! | `int`      | `intrinsic(8, 8)`              |
//! | `real`     | `intrinsic(8, 8)`              |
//! | `point`    | `struct { x: real, y: real }`  |
//! | `pointer`  | `*any`                         |
//! | `callable` | `fn(any) -> any`               |
//! | `any`      | `any`                          |
//! | `init`     | `struct {}`                    |
//! | `finish`   | `struct {}`                    |
//!
//! # Example
//!
//! ```
//! use morph::TypeSystem;
//!
//! let mut ts = TypeSystem::new().unwrap();
//!
//! let pair = ts.create_structure().unwrap();
//! ts.add_member_to_structure(&pair, ts.char().link(), "tag").unwrap();
//! ts.add_member_to_structure(&pair, ts.real().link(), "value").unwrap();
//! assert_eq!(pair.layout().size, 16);
//!
//! let named = ts.create_identifier(pair, "pair").unwrap();
//! assert_eq!(ts.display(&named).to_string(), "pair");
//! ```

use crate::error::{Error, Result};
use crate::ownership::Single;
use crate::types::{
    DisplayType, Enum, Identifier, Member, PointerTarget, Species, Structure, TypeKind, TypeLayout,
    TypeNode, TypeRef,
};
use morph_mem::arena::DEFAULT_POOL_SIZE;
use morph_mem::names::NAME_POOL_SIZE;
use morph_mem::{NameId, NameIndex, PoolArena};
use std::cell::Cell;
use std::fmt;

/// Sizing of a [`TypeSystem`]'s memory pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSystemConfig {
    /// First sub-pool size of the collaborator arena.
    pub arena_pool_size: usize,
    /// First sub-pool size of the name storage.
    pub name_pool_size: usize,
}

impl Default for TypeSystemConfig {
    fn default() -> Self {
        TypeSystemConfig {
            arena_pool_size: DEFAULT_POOL_SIZE,
            name_pool_size: NAME_POOL_SIZE,
        }
    }
}

/// The built-in types every [`TypeSystem`] starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreType {
    Root,
    Char,
    Int,
    Real,
    Point,
    Pointer,
    Callable,
    Any,
    Init,
    Finish,
}

impl CoreType {
    pub const ALL: [CoreType; 10] = [
        CoreType::Root,
        CoreType::Char,
        CoreType::Int,
        CoreType::Real,
        CoreType::Point,
        CoreType::Pointer,
        CoreType::Callable,
        CoreType::Any,
        CoreType::Init,
        CoreType::Finish,
    ];

    /// The identifier name of this core type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            CoreType::Root => "root",
            CoreType::Char => "char",
            CoreType::Int => "int",
            CoreType::Real => "real",
            CoreType::Point => "point",
            CoreType::Pointer => "pointer",
            CoreType::Callable => "callable",
            CoreType::Any => "any",
            CoreType::Init => "init",
            CoreType::Finish => "finish",
        }
    }
}

impl fmt::Display for CoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Core type table.
struct CoreTypes {
    root: TypeRef,
    char: TypeRef,
    int: TypeRef,
    real: TypeRef,
    point: TypeRef,
    pointer: TypeRef,
    callable: TypeRef,
    any: TypeRef,
    init: TypeRef,
    finish: TypeRef,
}

impl CoreTypes {
    fn install(names: &mut NameIndex) -> Result<Self> {
        let mut named = |source: TypeRef, name: &str| -> Result<TypeRef> {
            let id = names.index_for_name(name)?;
            new_node(TypeKind::Identifier(Identifier::new(id, Some(source))))
        };

        let root = named(new_node(TypeKind::Structure(Structure::new()))?, "root")?;
        let char = named(intrinsic(1, 1)?, "char")?;
        let int = named(intrinsic(8, 8)?, "int")?;
        let real = named(intrinsic(8, 8)?, "real")?;
        let any = named(new_node(TypeKind::Any)?, "any")?;

        let body = new_node(TypeKind::Structure(Structure::new()))?;
        let pointer = named(
            new_node(TypeKind::Pointer(PointerTarget::Owned(any.link())))?,
            "pointer",
        )?;
        let callable = named(
            new_node(TypeKind::Function {
                child: any.link(),
                parent: any.link(),
            })?,
            "callable",
        )?;
        let init = named(new_node(TypeKind::Structure(Structure::new()))?, "init")?;
        let finish = named(new_node(TypeKind::Structure(Structure::new()))?, "finish")?;

        let (x, y) = (names.index_for_name("x")?, names.index_for_name("y")?);
        if let Some(fields) = body.as_structure() {
            fields.push(x, real.link());
            fields.push(y, real.link());
        }
        let point = new_node(TypeKind::Identifier(Identifier::new(
            names.index_for_name("point")?,
            Some(body),
        )))?;

        let core = CoreTypes {
            root,
            char,
            int,
            real,
            point,
            pointer,
            callable,
            any,
            init,
            finish,
        };

        if let Some(root) = core.root.as_identifier() {
            for ty in CoreType::ALL.into_iter().skip(1) {
                root.push_subtype(core.get(ty).link());
            }
        }
        Ok(core)
    }

    fn get(&self, ty: CoreType) -> &TypeRef {
        match ty {
            CoreType::Root => &self.root,
            CoreType::Char => &self.char,
            CoreType::Int => &self.int,
            CoreType::Real => &self.real,
            CoreType::Point => &self.point,
            CoreType::Pointer => &self.pointer,
            CoreType::Callable => &self.callable,
            CoreType::Any => &self.any,
            CoreType::Init => &self.init,
            CoreType::Finish => &self.finish,
        }
    }
}

fn new_node(kind: TypeKind) -> Result<TypeRef> {
    let node = Single::new(TypeNode::new(kind))?;
    morph_log::trace!("created {} node", node.tag());
    Ok(node)
}

fn intrinsic(size: usize, align: usize) -> Result<TypeRef> {
    if !align.is_power_of_two() {
        return Err(Error::InvalidAlignment { alignment: align });
    }
    new_node(TypeKind::Intrinsic(TypeLayout::new(size, align)))
}

/// Type engine context: names, core types and every constructor.
///
/// Constructors return an owned [`TypeRef`]. Appending a member moves the
/// member's reference into the aggregate; link it first to keep one.
pub struct TypeSystem {
    core: CoreTypes,
    names: NameIndex,
    arena: PoolArena,
    next_raise_id: Cell<u32>,
    config: TypeSystemConfig,
}

impl TypeSystem {
    /// Creates a type system with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the core types cannot be allocated.
    pub fn new() -> Result<Self> {
        Self::with_config(TypeSystemConfig::default())
    }

    /// Creates a type system with explicit pool sizes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the core types cannot be allocated.
    pub fn with_config(config: TypeSystemConfig) -> Result<Self> {
        let mut names = NameIndex::with_pool_size(config.name_pool_size);
        let core = CoreTypes::install(&mut names)?;

        morph_log::info!("type system ready with {} core types", CoreType::ALL.len());

        Ok(TypeSystem {
            core,
            names,
            arena: PoolArena::new(config.arena_pool_size),
            next_raise_id: Cell::new(0),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> TypeSystemConfig {
        self.config
    }

    /// Returns a core type.
    #[must_use]
    pub fn core(&self, ty: CoreType) -> &TypeRef {
        self.core.get(ty)
    }

    #[must_use]
    pub fn root(&self) -> &TypeRef {
        &self.core.root
    }

    #[must_use]
    pub fn char(&self) -> &TypeRef {
        &self.core.char
    }

    #[must_use]
    pub fn int(&self) -> &TypeRef {
        &self.core.int
    }

    #[must_use]
    pub fn real(&self) -> &TypeRef {
        &self.core.real
    }

    #[must_use]
    pub fn point(&self) -> &TypeRef {
        &self.core.point
    }

    #[must_use]
    pub fn pointer(&self) -> &TypeRef {
        &self.core.pointer
    }

    #[must_use]
    pub fn callable(&self) -> &TypeRef {
        &self.core.callable
    }

    #[must_use]
    pub fn any(&self) -> &TypeRef {
        &self.core.any
    }

    #[must_use]
    pub fn init(&self) -> &TypeRef {
        &self.core.init
    }

    #[must_use]
    pub fn finish(&self) -> &TypeRef {
        &self.core.finish
    }

    /// The name index shared by identifiers, members and source files.
    #[must_use]
    pub fn names(&self) -> &NameIndex {
        &self.names
    }

    /// Returns the dense id of `name`, interning it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the name cannot be stored.
    pub fn index_for_name(&mut self, name: &str) -> Result<NameId> {
        Ok(self.names.index_for_name(name)?)
    }

    #[must_use]
    pub fn name_for_index(&self, id: NameId) -> Option<&str> {
        self.names.name_for_index(id)
    }

    /// Name of an identifier type.
    #[must_use]
    pub fn name_of(&self, ty: &TypeNode) -> Option<&str> {
        ty.name().and_then(|id| self.names.name_for_index(id))
    }

    /// Arena for AST and IR nodes that live as long as this type system.
    pub fn arena_mut(&mut self) -> &mut PoolArena {
        &mut self.arena
    }

    /// Pretty-printer for `ty`.
    #[must_use]
    pub fn display<'a>(&'a self, ty: &'a TypeNode) -> DisplayType<'a> {
        DisplayType::new(ty, &self.names)
    }

    /// Creates an opaque type of `size` bytes aligned to `align`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAlignment`] if `align` is not a power of two
    /// - [`Error::OutOfMemory`] if the node cannot be allocated
    pub fn create_intrinsic(&self, size: usize, align: usize) -> Result<TypeRef> {
        intrinsic(size, align)
    }

    /// Names `source`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] on allocation failure.
    pub fn create_identifier(&mut self, source: TypeRef, name: &str) -> Result<TypeRef> {
        let id = self.names.index_for_name(name)?;
        new_node(TypeKind::Identifier(Identifier::new(id, Some(source))))
    }

    /// Creates an identifier whose source is supplied later by
    /// [`define_identifier`](Self::define_identifier), so the source can
    /// point back at it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] on allocation failure.
    pub fn declare_identifier(&mut self, name: &str) -> Result<TypeRef> {
        let id = self.names.index_for_name(name)?;
        new_node(TypeKind::Identifier(Identifier::new(id, None)))
    }

    /// Supplies the source of a declared identifier.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyDefined`] if `ident` already has a source
    /// - [`Error::CyclicType`] if `source` owns `ident`
    ///
    /// # Panics
    ///
    /// Panics (through `fatal!`) if `ident` is not an identifier.
    pub fn define_identifier(&self, ident: &TypeNode, source: TypeRef) -> Result<()> {
        let Some(identifier) = ident.as_identifier() else {
            morph_log::fatal!("cannot define a {} type as an identifier", ident.tag());
        };
        if identifier.is_defined() {
            return Err(Error::AlreadyDefined);
        }
        if source.owns_path_to(ident) {
            return Err(Error::CyclicType);
        }

        identifier.set_source(source);
        Ok(())
    }

    /// Creates a type with the storage of `source` that only equals types
    /// raised by the same operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] on allocation failure.
    pub fn create_raised(&self, source: TypeRef) -> Result<TypeRef> {
        let raise_id = self.next_raise_id.get();
        self.next_raise_id.set(raise_id + 1);
        new_node(TypeKind::Raised { source, raise_id })
    }

    /// Raises `source` through the same operation that produced `like`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] on allocation failure.
    ///
    /// # Panics
    ///
    /// Panics (through `fatal!`) if `like` is not a raised type.
    pub fn create_raised_as(&self, source: TypeRef, like: &TypeNode) -> Result<TypeRef> {
        let TypeKind::Raised { raise_id, .. } = like.kind() else {
            morph_log::fatal!("cannot raise like a {} type", like.tag());
        };
        new_node(TypeKind::Raised {
            source,
            raise_id: *raise_id,
        })
    }

    /// Creates a pointer owning its pointee.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] on allocation failure.
    pub fn create_pointer(&self, source: TypeRef) -> Result<TypeRef> {
        new_node(TypeKind::Pointer(PointerTarget::Owned(source)))
    }

    /// Creates a pointer back at `target` that does not keep it alive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] on allocation failure.
    pub fn create_back_pointer(&self, target: &TypeRef) -> Result<TypeRef> {
        new_node(TypeKind::Pointer(PointerTarget::Back(Single::downgrade(target))))
    }

    /// Creates the signature `fn(child) -> parent`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] on allocation failure.
    pub fn create_function(&self, child: TypeRef, parent: TypeRef) -> Result<TypeRef> {
        new_node(TypeKind::Function { child, parent })
    }

    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] on allocation failure.
    pub fn create_any(&self) -> Result<TypeRef> {
        new_node(TypeKind::Any)
    }

    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] on allocation failure.
    pub fn create_structure(&self) -> Result<TypeRef> {
        new_node(TypeKind::Structure(Structure::new()))
    }

    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] on allocation failure.
    pub fn create_species(&self) -> Result<TypeRef> {
        new_node(TypeKind::Species(Species::new()))
    }

    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] on allocation failure.
    pub fn create_enum(&self) -> Result<TypeRef> {
        new_node(TypeKind::Enum(Enum::new()))
    }

    /// Appends `member` as field `name`, updating the structure's layout.
    ///
    /// # Errors
    ///
    /// - [`Error::CyclicType`] if `member` owns `structure`
    /// - [`Error::IncompleteType`] if `member` is a declared but undefined
    ///   identifier
    /// - [`Error::OutOfMemory`] if the name cannot be stored
    ///
    /// # Panics
    ///
    /// Panics (through `fatal!`) if `structure` is not a structure.
    pub fn add_member_to_structure(
        &mut self,
        structure: &TypeNode,
        member: TypeRef,
        name: &str,
    ) -> Result<()> {
        let Some(fields) = structure.as_structure() else {
            morph_log::fatal!("cannot add member {name:?} to a {} type", structure.tag());
        };
        if member.owns_path_to(structure) {
            return Err(Error::CyclicType);
        }
        if !member.is_complete() {
            return Err(Error::IncompleteType);
        }

        let id = self.names.index_for_name(name)?;
        fields.push(id, member);
        Ok(())
    }

    /// Appends `member` to the end (widest position) of a species chain.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateSpeciesMember`] if `member` is already in the chain
    /// - [`Error::CyclicType`] if `member` owns `species`
    /// - [`Error::IncompleteType`] if `member` has no storage yet
    ///
    /// # Panics
    ///
    /// Panics (through `fatal!`) if `species` is not a species.
    pub fn add_member_to_species(&self, species: &TypeNode, member: TypeRef) -> Result<()> {
        let Some(chain) = species.as_species() else {
            morph_log::fatal!("cannot add a species member to a {} type", species.tag());
        };
        if chain.members().iter().any(|m| TypeRef::ptr_eq(m, &member)) {
            return Err(Error::DuplicateSpeciesMember);
        }
        if member.owns_path_to(species) {
            return Err(Error::CyclicType);
        }
        if !member.is_complete() {
            return Err(Error::IncompleteType);
        }

        chain.push(member);
        Ok(())
    }

    /// Appends variant `name` carrying `member`.
    ///
    /// # Errors
    ///
    /// - [`Error::CyclicType`] if `member` owns `enumeration`
    /// - [`Error::IncompleteType`] if `member` has no storage yet
    /// - [`Error::OutOfMemory`] if the name cannot be stored
    ///
    /// # Panics
    ///
    /// Panics (through `fatal!`) if `enumeration` is not an enum.
    pub fn add_member_to_enum(
        &mut self,
        enumeration: &TypeNode,
        member: TypeRef,
        name: &str,
    ) -> Result<()> {
        let Some(variants) = enumeration.as_enum() else {
            morph_log::fatal!("cannot add variant {name:?} to a {} type", enumeration.tag());
        };
        if member.owns_path_to(enumeration) {
            return Err(Error::CyclicType);
        }
        if !member.is_complete() {
            return Err(Error::IncompleteType);
        }

        let id = self.names.index_for_name(name)?;
        variants.push(id, member);
        Ok(())
    }

    /// Field `name` of a structure (or of the structure an identifier names).
    #[must_use]
    pub fn find_member(&self, structure: &TypeNode, name: &str) -> Option<Member> {
        let id = self.names.get(name)?;
        match structure.as_identifier() {
            Some(ident) => ident
                .source()
                .and_then(|source| self.find_member(&source, name)),
            None => structure.as_structure()?.find_member(id),
        }
    }

    /// Attaches a named subtype to `parent` and returns it.
    ///
    /// The subtype is an identifier over `source` with its own combination
    /// list; `parent` keeps a reference to it.
    ///
    /// # Errors
    ///
    /// - [`Error::CyclicType`] if `source` owns `parent`
    /// - [`Error::OutOfMemory`] on allocation failure
    ///
    /// # Panics
    ///
    /// Panics (through `fatal!`) if `parent` cannot carry subtypes.
    pub fn add_subtype(&mut self, parent: &TypeNode, name: &str, source: TypeRef) -> Result<TypeRef> {
        let Some(ident) = parent.as_identifier() else {
            morph_log::fatal!("cannot add subtype {name:?} to a {} type", parent.tag());
        };
        if source.owns_path_to(parent) {
            return Err(Error::CyclicType);
        }

        let subtype = self.create_identifier(source, name)?;
        ident.push_subtype(subtype.link());
        morph_log::debug!("added subtype {name:?}");
        Ok(subtype)
    }

    /// Most recent subtype of `parent` called `name`.
    #[must_use]
    pub fn find_subtype(&self, parent: &TypeNode, name: &str) -> Option<TypeRef> {
        let id = self.names.get(name)?;
        parent.as_identifier()?.find_subtype(id)
    }
}

impl Drop for TypeSystem {
    fn drop(&mut self) {
        morph_log::debug!("releasing core types");
    }
}

impl fmt::Debug for TypeSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSystem")
            .field("names", &self.names.len())
            .field("arena", &self.arena.stats())
            .field("next_raise_id", &self.next_raise_id.get())
            .finish()
    }
}
