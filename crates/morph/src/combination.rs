//! Combination registry and resolver.
//!
//! A *combination* registers an implementation for `(operation, argument
//! type)` on an identifier type. Identifiers (including subtypes, which are
//! identifiers themselves) keep their combinations in definition order;
//! lookups walk that list most-recent-first, so redefining shadows.
//!
//! [`find_combination`] resolves a call site:
//!
//! 1. Walk the parent's own list and keep the best classification of the
//!    argument against each candidate (`Same` over `Equal` over `Matching`,
//!    the most recent candidate winning ties).
//! 2. If nothing matched, step the parent outward (identifier to source,
//!    raised type to source, species to its widest member) and repeat.
//! 3. Stop with no result at a type that does not step any further.
//!
//! When the parent's resolution path passes through a species, arguments are
//! also classified by their position in that chain, so a combination taking
//! a wide member accepts every narrower member.
//!
//! # Example
//!
//! ```
//! use morph::{find_combination, define_combination, Expand, Operation, TypeSystem};
//! # use morph::{into_callable, CallRequest, Callable, Single, VirtualMachine};
//! # struct Native(&'static str);
//! # impl Callable for Native {
//! #     fn name(&self) -> &str { self.0 }
//! #     fn request_call_number(&self, vm: &mut dyn VirtualMachine) -> morph::Result<CallRequest> {
//! #         vm.reserve_call_slot(self.0).map(CallRequest::Assigned)
//! #     }
//! # }
//!
//! let mut ts = TypeSystem::new().unwrap();
//! let vec2 = ts.create_identifier(ts.point().link(), "vec2").unwrap();
//! let add = into_callable(Single::new(Native("vec2_add")).unwrap());
//!
//! define_combination(&vec2, Operation::Add, ts.point().link(), add).unwrap();
//!
//! let found = find_combination(&vec2, Operation::Add, ts.point()).unwrap();
//! assert_eq!(found.expand, Expand::Equal);
//! assert_eq!(found.node.callable().name(), "vec2_add");
//! assert!(find_combination(&vec2, Operation::Sub, &vec2).is_none());
//! ```

use crate::compare::{Expand, compare, compare_in_chain};
use crate::error::{Error, Result};
use crate::ownership::{Single, SingleBox};
use crate::types::{Species, TypeNode, TypeRef};
use morph_mem::NameId;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::{self, NonNull};

/// Maximum number of outward resolution steps in one lookup.
pub const MAX_RESOLVE_DEPTH: usize = 64;

/// Owning handle to a registered combination.
pub type CombRef = Single<CombNode>;

/// Owning handle to an implementation.
pub type CallableRef = Single<dyn Callable>;

/// The operation a combination implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Indexing, `parent[child]`.
    At,
    Call,
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Compare,
    Construct,
    Destruct,
    /// A named method.
    Named(NameId),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::At => write!(f, "at"),
            Operation::Call => write!(f, "call"),
            Operation::Assign => write!(f, "assign"),
            Operation::Add => write!(f, "add"),
            Operation::Sub => write!(f, "sub"),
            Operation::Mul => write!(f, "mul"),
            Operation::Div => write!(f, "div"),
            Operation::Compare => write!(f, "compare"),
            Operation::Construct => write!(f, "construct"),
            Operation::Destruct => write!(f, "destruct"),
            Operation::Named(name) => write!(f, "named({name})"),
        }
    }
}

/// Virtual machine call slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallNumber(u32);

impl CallNumber {
    #[must_use]
    pub const fn new(slot: u32) -> Self {
        Self(slot)
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CallNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call#{}", self.0)
    }
}

/// Answer of a callable asked for its call slot.
pub enum CallRequest {
    /// The callable itself occupies `number`.
    Assigned(CallNumber),
    /// The callable was replaced (specialized, translated); the registry must
    /// store `callable` from now on.
    Rebound {
        callable: CallableRef,
        number: CallNumber,
    },
}

/// An implementation the registry can hand out.
///
/// The registry never inspects a callable: it only links, unlinks and asks
/// for a call number. A callable that needs to reach the identifier it is
/// registered on must hold a [`WeakType`](crate::WeakType), never a strong
/// handle, or the pair will never be released.
pub trait Callable {
    /// Name for diagnostics.
    fn name(&self) -> &str;

    /// Reserves (or reports) the call slot for this callable.
    ///
    /// # Errors
    ///
    /// Propagates the virtual machine's failure to reserve a slot.
    fn request_call_number(&self, vm: &mut dyn VirtualMachine) -> Result<CallRequest>;
}

/// The bytecode virtual machine, as seen by call-site generation.
pub trait VirtualMachine {
    /// Reserves a fresh call slot for the callable called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CallSlotsExhausted`](crate::Error::CallSlotsExhausted)
    /// when no slot is left.
    fn reserve_call_slot(&mut self, name: &str) -> Result<CallNumber>;
}

/// Erases the concrete callable type.
#[must_use]
pub fn into_callable<C: Callable + 'static>(callable: Single<C>) -> CallableRef {
    let raw: NonNull<SingleBox<dyn Callable>> = callable.into_raw_box();
    // SAFETY: raw was just released by into_raw_box and keeps its reference.
    unsafe { Single::from_raw_box(raw) }
}

/// One registered combination.
pub struct CombNode {
    op: Operation,
    child: TypeRef,
    callable: RefCell<CallableRef>,
    call_number: Cell<Option<CallNumber>>,
}

impl CombNode {
    #[must_use]
    pub fn op(&self) -> Operation {
        self.op
    }

    /// The argument type.
    #[must_use]
    pub fn child(&self) -> &TypeRef {
        &self.child
    }

    /// The current implementation.
    #[must_use]
    pub fn callable(&self) -> CallableRef {
        self.callable.borrow().link()
    }

    /// The call slot, once generated.
    #[must_use]
    pub fn call_number(&self) -> Option<CallNumber> {
        self.call_number.get()
    }
}

impl fmt::Debug for CombNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombNode")
            .field("op", &self.op)
            .field("child", &self.child)
            .field("callable", &self.callable.borrow().name())
            .field("call_number", &self.call_number.get())
            .finish()
    }
}

/// A resolved combination and how the argument matched it.
#[derive(Debug, Clone)]
pub struct CombMatch {
    pub node: CombRef,
    /// `Equal` for an exact argument, `Matching` for a widened one.
    pub expand: Expand,
}

/// Registers `callable` for `(op, child)` on `parent`, shadowing any earlier
/// registration it overlaps.
///
/// Ownership of `child` and `callable` moves into the registry. A `child`
/// that owns `parent` would keep it alive forever; pass its source or a back
/// pointer instead.
///
/// # Errors
///
/// - [`Error::CyclicType`](crate::Error::CyclicType) if `child` owns `parent`
/// - [`Error::OutOfMemory`](crate::Error::OutOfMemory) if the node cannot be
///   allocated
///
/// # Panics
///
/// Panics (through `fatal!`) if `parent` carries no combination list.
pub fn define_combination(
    parent: &TypeNode,
    op: Operation,
    child: TypeRef,
    callable: CallableRef,
) -> Result<CombRef> {
    let Some(ident) = parent.as_identifier() else {
        morph_log::fatal!(
            "cannot define {op} on a {} type: it carries no combination list",
            parent.tag()
        );
    };

    if child.owns_path_to(parent) {
        return Err(Error::CyclicType);
    }

    morph_log::debug!("defining {op} as {} on {}", callable.name(), ident.name());

    let node = Single::new(CombNode {
        op,
        child,
        callable: RefCell::new(callable),
        call_number: Cell::new(None),
    })?;
    ident.combinations.borrow_mut().push(node.link());
    Ok(node)
}

/// Removes `node` from `parent`'s list, releasing the registry's reference.
///
/// Returns false if `node` is not registered on `parent`.
pub fn undefine_combination(parent: &TypeNode, node: &CombNode) -> bool {
    let Some(ident) = parent.as_identifier() else {
        return false;
    };

    let removed = {
        let mut list = ident.combinations.borrow_mut();
        list.iter()
            .position(|comb| ptr::eq(&**comb, node))
            .map(|index| list.remove(index))
    };

    match removed {
        Some(comb) => {
            morph_log::debug!("undefined {} on {}", comb.op, ident.name());
            true
        }
        None => false,
    }
}

/// Combinations registered on `parent`, in definition order.
#[must_use]
pub fn combinations(parent: &TypeNode) -> Vec<CombRef> {
    parent
        .as_identifier()
        .map(|ident| ident.combinations())
        .unwrap_or_default()
}

/// The most recent own combination for `op` whose argument type is `Same` or
/// `Equal` to `child`. Never looks past `parent`.
#[must_use]
pub fn find_exact_combination(parent: &TypeNode, op: Operation, child: &TypeNode) -> Option<CombRef> {
    let ident = parent.as_identifier()?;
    ident
        .combinations
        .borrow()
        .iter()
        .rev()
        .find(|comb| comb.op == op && compare(&comb.child, child).is_exact())
        .map(Single::link)
}

/// Resolves `(parent, op, child)` to a combination, walking outward from
/// `parent` until one matches or the type stops resolving.
#[must_use]
pub fn find_combination(parent: &TypeNode, op: Operation, child: &TypeNode) -> Option<CombMatch> {
    let outer = nearest_species(parent);
    let chain = parent
        .as_species()
        .or_else(|| outer.as_ref().and_then(|s| s.as_species()));

    let mut current: Option<TypeRef> = None;
    for _ in 0..=MAX_RESOLVE_DEPTH {
        let node = current.as_deref().unwrap_or(parent);

        if let Some(found) = best_in_list(node, op, child, chain) {
            morph_log::debug!("resolved {op} on {} ({})", node.tag(), found.expand);
            return Some(found);
        }

        current = Some(node.resolve_step()?);
    }

    morph_log::warn!("resolution of {op} exceeded {MAX_RESOLVE_DEPTH} steps");
    None
}

/// The argument type and current implementation of `node`.
#[must_use]
pub fn combination_info(node: &CombNode) -> (TypeRef, CallableRef) {
    (node.child.link(), node.callable())
}

/// Returns the call slot of `node`, requesting one on first use.
///
/// If the callable answers with a replacement, the registry stores the
/// replacement and releases the old callable. Later calls return the cached
/// slot without asking again.
///
/// # Errors
///
/// Propagates the callable's (or virtual machine's) failure; the node is left
/// unchanged in that case.
pub fn generate_call_number(node: &CombNode, vm: &mut dyn VirtualMachine) -> Result<CallNumber> {
    if let Some(number) = node.call_number.get() {
        return Ok(number);
    }

    let callable = node.callable();
    let number = match callable.request_call_number(vm)? {
        CallRequest::Assigned(number) => number,
        CallRequest::Rebound {
            callable: rebound,
            number,
        } => {
            morph_log::debug!("{} rebound to {} at {number}", callable.name(), rebound.name());
            let old = node.callable.replace(rebound);
            drop(old);
            number
        }
    };

    node.call_number.set(Some(number));
    Ok(number)
}

/// First species on the resolution path beyond `ty`.
fn nearest_species(ty: &TypeNode) -> Option<TypeRef> {
    let mut current = ty.resolve_step()?;
    for _ in 0..MAX_RESOLVE_DEPTH {
        if current.as_species().is_some() {
            return Some(current);
        }
        current = current.resolve_step()?;
    }
    None
}

fn best_in_list(
    node: &TypeNode,
    op: Operation,
    child: &TypeNode,
    chain: Option<&Species>,
) -> Option<CombMatch> {
    let ident = node.as_identifier()?;
    let list = ident.combinations.borrow();

    let mut best: Option<(&CombRef, Expand)> = None;
    for comb in list.iter().rev() {
        if comb.op != op {
            continue;
        }

        let expand = match chain {
            Some(species) => compare_in_chain(species, &comb.child, child),
            None => compare(&comb.child, child),
        };
        if !expand.is_match() {
            continue;
        }

        if best.is_none_or(|(_, b)| expand > b) {
            best = Some((comb, expand));
            if expand == Expand::Same {
                break;
            }
        }
    }

    best.map(|(comb, expand)| CombMatch {
        node: comb.link(),
        expand: expand.structural(),
    })
}
