//! # Morph
//!
//! Type engine and method-dispatch core of a compiled scripting runtime.
//!
//! - [`ownership`]: reference-counted single pointers ([`Single`], [`WeakSingle`])
//! - [`types`]: the type node graph ([`TypeNode`], [`TypeKind`], [`TypeRef`])
//! - [`compare`]: structural classification ([`compare()`], [`Expand`])
//! - [`combination`]: combination registry and resolver ([`find_combination`])
//! - [`system`]: the [`TypeSystem`] context with the core types and constructors
//!
//! Memory pools and the name index live in `morph-mem`; logging in `morph-log`.
//!
//! # Example
//!
//! ```
//! use morph::{compare, Expand, TypeSystem};
//!
//! let mut ts = TypeSystem::new().unwrap();
//!
//! let num = ts.create_species().unwrap();
//! ts.add_member_to_species(&num, ts.char().link()).unwrap();
//! ts.add_member_to_species(&num, ts.real().link()).unwrap();
//! let num = ts.create_identifier(num, "num").unwrap();
//!
//! assert_eq!(compare(&num, ts.char()), Expand::Matching);
//! assert_eq!(ts.display(&num).to_string(), "num");
//! ```

pub mod combination;
pub mod compare;
pub mod error;
pub mod ownership;
pub mod system;
pub mod types;

pub use combination::{
    CallNumber, CallRequest, Callable, CallableRef, CombMatch, CombNode, CombRef, Operation,
    VirtualMachine, combination_info, combinations, define_combination, find_combination,
    find_exact_combination, generate_call_number, into_callable, undefine_combination,
};
pub use compare::{Expand, compare, compare_in_chain, widens};
pub use error::{Error, Result};
pub use morph_mem::NameId;
pub use ownership::{Single, WeakSingle};
pub use system::{CoreType, TypeSystem, TypeSystemConfig};
pub use types::{
    DisplayType, Member, PointerTarget, TypeFlags, TypeKind, TypeLayout, TypeNode, TypeRef,
    TypeTag, Variant, WeakType,
};
