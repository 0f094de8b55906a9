//! Bidirectional name ↔ dense-index table.
//!
//! The [`NameIndex`] hands out a [`NameId`] for every distinct string it sees
//! and never forgets one: there is no removal. It backs source-position
//! tracking (file names) and the member, identifier and subtype names of the
//! type graph.
//!
//! String bytes are copied once into a [`PoolArena`]; the hash map and the
//! append-only id table both point at that single copy.
//!
//! ```
//! use morph_mem::NameIndex;
//!
//! let mut names = NameIndex::new();
//!
//! let a = names.index_for_name("main.mo").unwrap();
//! let b = names.index_for_name("lib.mo").unwrap();
//! assert_eq!(names.index_for_name("main.mo").unwrap(), a);
//! assert_eq!((a.as_u32(), b.as_u32()), (0, 1));
//!
//! assert_eq!(names.name_for_index(b), Some("lib.mo"));
//! assert_eq!(names.name_for_index(morph_mem::NameId::new(9)), None);
//! ```

use crate::arena::{AllocError, PoolArena};
use crate::name_id::NameId;
use fxhash::FxBuildHasher;
use hashbrown::HashMap;
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;

/// Initial sub-pool size for name storage.
pub const NAME_POOL_SIZE: usize = 4096;

/// A string stored in the index's arena.
///
/// Only ever dereferenced while the owning `NameIndex` (and so its arena) is
/// alive; the arena is never reset.
#[derive(Clone, Copy)]
struct ArenaStr(NonNull<str>);

impl ArenaStr {
    #[inline]
    fn as_str(&self) -> &str {
        // SAFETY: points into the owning NameIndex's arena, which outlives
        // every ArenaStr it created and never rewinds.
        unsafe { self.0.as_ref() }
    }
}

impl PartialEq for ArenaStr {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for ArenaStr {}

impl Hash for ArenaStr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl Borrow<str> for ArenaStr {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

/// Append-only string interning table.
pub struct NameIndex {
    /// Name -> id. Keys point into `arena`.
    ids: HashMap<ArenaStr, NameId, FxBuildHasher>,
    /// Id -> name, indexed by `NameId::index`.
    names: Vec<ArenaStr>,
    /// Declared last so it is dropped after everything pointing into it.
    arena: PoolArena,
}

impl NameIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::with_pool_size(NAME_POOL_SIZE)
    }

    /// Creates an empty index whose first storage pool holds `pool_size` bytes.
    #[must_use]
    pub fn with_pool_size(pool_size: usize) -> Self {
        NameIndex {
            ids: HashMap::with_hasher(FxBuildHasher::default()),
            names: Vec::new(),
            arena: PoolArena::new(pool_size),
        }
    }

    /// Returns the id for `name`, assigning the next dense id if it is new.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::OutOfMemory`] if the string cannot be stored or
    /// the id space is exhausted.
    pub fn index_for_name(&mut self, name: &str) -> Result<NameId, AllocError> {
        if let Some(&id) = self.ids.get(name) {
            return Ok(id);
        }

        let raw = u32::try_from(self.names.len())
            .ok()
            .filter(|&raw| raw != NameId::INVALID.as_u32())
            .ok_or(AllocError::OutOfMemory { requested: name.len() })?;
        let id = NameId::new(raw);

        let stored = ArenaStr(self.arena.alloc_str(name)?);
        self.names.push(stored);
        self.ids.insert(stored, id);

        morph_log::trace!("interned {name:?} as {id}");
        Ok(id)
    }

    /// Returns the id of `name` without interning it.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<NameId> {
        self.ids.get(name).copied()
    }

    /// Returns the name behind `id`, or `None` if `id` was never handed out.
    #[must_use]
    pub fn name_for_index(&self, id: NameId) -> Option<&str> {
        self.names.get(id.index()).map(ArenaStr::as_str)
    }

    /// Number of distinct names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no name has been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates over `(id, name)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (NameId, &str)> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(|(index, name)| (NameId::new(index as u32), name.as_str()))
    }

    /// Bytes of string storage in use.
    #[must_use]
    pub fn storage_bytes(&self) -> usize {
        self.arena.stats().total_allocated
    }
}

impl Default for NameIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NameIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
