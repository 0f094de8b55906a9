//! Structural type comparison.
//!
//! [`compare`] classifies an `actual` type against a `target` type as one of
//! four [`Expand`] results, strongest first:
//!
//! - `Same`: the identical node
//! - `Equal`: structurally interchangeable
//! - `Matching`: `actual` is accepted by `target` through widening
//! - `Different`: no relationship
//!
//! Identifiers are transparent here: either side is unwrapped to its source
//! before anything else is decided. Raised types are the exception to
//! structural equality: they only equal another raised type produced by the
//! same raising operation.
//!
//! `Matching` is directional. A species target accepts any of its members,
//! but a plain target only accepts a species whose widest member it equals.
//!
//! ```
//! use morph::{compare, Expand, TypeSystem};
//!
//! let ts = TypeSystem::new().unwrap();
//! let byte = ts.create_intrinsic(1, 1).unwrap();
//!
//! assert_eq!(compare(ts.int(), ts.int()), Expand::Same);
//! assert_eq!(compare(ts.int(), ts.real()), Expand::Equal);
//! assert_eq!(compare(ts.any(), &byte), Expand::Matching);
//! assert_eq!(compare(&byte, ts.any()), Expand::Different);
//! ```

use crate::types::{Species, TypeKind, TypeNode, TypeRef};
use std::fmt;
use std::ptr;

/// Recursion limit for one comparison.
///
/// Only reached by distinct but isomorphic recursive types; the comparison
/// then gives up with `Different`.
pub const MAX_COMPARE_DEPTH: usize = 64;

/// Classification of one type against another.
///
/// Variants are ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Expand {
    Different,
    Matching,
    Equal,
    Same,
}

impl Expand {
    /// Anything but `Different`.
    #[must_use]
    pub fn is_match(self) -> bool {
        self != Expand::Different
    }

    /// `Same` or `Equal`.
    #[must_use]
    pub fn is_exact(self) -> bool {
        self >= Expand::Equal
    }

    /// Demotes `Same` to `Equal`, for results about a node's constituents
    /// rather than the node itself.
    #[must_use]
    pub fn structural(self) -> Self {
        self.min(Expand::Equal)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Expand::Different => "different",
            Expand::Matching => "matching",
            Expand::Equal => "equal",
            Expand::Same => "same",
        }
    }
}

impl fmt::Display for Expand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies `actual` against `target`.
#[must_use]
pub fn compare(target: &TypeNode, actual: &TypeNode) -> Expand {
    compare_at(target, actual, 0)
}

/// Classifies `actual` against `target` inside a widening chain.
///
/// Falls back to [`compare`] unless both types sit in `species` with `actual`
/// strictly before `target`, in which case `actual` widens into `target`.
#[must_use]
pub fn compare_in_chain(species: &Species, target: &TypeNode, actual: &TypeNode) -> Expand {
    let direct = compare(target, actual);
    if direct.is_exact() {
        return direct;
    }

    match (chain_position(species, target), chain_position(species, actual)) {
        (Some(t), Some(a)) if a < t => Expand::Matching,
        _ => direct,
    }
}

/// Returns true if `from` widens into `to` along `species`.
#[must_use]
pub fn widens(species: &Species, from: &TypeNode, to: &TypeNode) -> bool {
    compare_in_chain(species, to, from).is_match()
}

/// Position of `ty` in the chain: the identical member if present, otherwise
/// the first structurally equal one.
#[must_use]
pub fn chain_position(species: &Species, ty: &TypeNode) -> Option<usize> {
    let members = species.members();
    members
        .iter()
        .position(|m| ptr::eq(&**m, ty))
        .or_else(|| members.iter().position(|m| compare(m, ty).is_exact()))
}

fn compare_at(target: &TypeNode, actual: &TypeNode, depth: usize) -> Expand {
    if ptr::eq(target, actual) {
        return Expand::Same;
    }
    if depth >= MAX_COMPARE_DEPTH {
        morph_log::warn!(
            "comparison of {} and {} exceeded depth {MAX_COMPARE_DEPTH}",
            target.tag(),
            actual.tag()
        );
        return Expand::Different;
    }
    let depth = depth + 1;

    if let TypeKind::Identifier(ident) = target.kind() {
        return match ident.source() {
            Some(source) => compare_at(&source, actual, depth).structural(),
            None => Expand::Different,
        };
    }
    if let TypeKind::Identifier(ident) = actual.kind() {
        return match ident.source() {
            Some(source) => compare_at(target, &source, depth).structural(),
            None => Expand::Different,
        };
    }

    match (target.kind(), actual.kind()) {
        (TypeKind::Any, TypeKind::Any) => Expand::Equal,
        (TypeKind::Any, _) => Expand::Matching,
        (_, TypeKind::Any) => Expand::Different,

        (
            TypeKind::Raised {
                source: t,
                raise_id: t_id,
            },
            TypeKind::Raised {
                source: a,
                raise_id: a_id,
            },
        ) => {
            if t_id == a_id && compare_at(t, a, depth).is_exact() {
                Expand::Equal
            } else {
                Expand::Different
            }
        }
        (TypeKind::Raised { .. }, _) | (_, TypeKind::Raised { .. }) => Expand::Different,

        (TypeKind::Species(t), TypeKind::Species(a)) => compare_species(t, a, depth),
        (TypeKind::Species(t), _) => {
            if t.members().iter().any(|m| compare_at(m, actual, depth).is_exact()) {
                Expand::Matching
            } else {
                Expand::Different
            }
        }
        (_, TypeKind::Species(a)) => match a.widest() {
            Some(widest) if compare_at(target, &widest, depth).is_exact() => Expand::Matching,
            _ => Expand::Different,
        },

        (TypeKind::Intrinsic(t), TypeKind::Intrinsic(a)) => {
            if t == a {
                Expand::Equal
            } else {
                Expand::Different
            }
        }

        (TypeKind::Structure(t), TypeKind::Structure(a)) => {
            let (t, a) = (t.members(), a.members());
            positional(t.iter().map(|m| m.ty()), a.iter().map(|m| m.ty()), depth)
        }

        (TypeKind::Enum(t), TypeKind::Enum(a)) => {
            let (t, a) = (t.variants(), a.variants());
            positional(t.iter().map(|v| v.ty()), a.iter().map(|v| v.ty()), depth)
        }

        (
            TypeKind::Function {
                child: tc,
                parent: tp,
            },
            TypeKind::Function {
                child: ac,
                parent: ap,
            },
        ) => positional([tc, tp].into_iter(), [ac, ap].into_iter(), depth),

        (TypeKind::Pointer(t), TypeKind::Pointer(a)) => match (t.get(), a.get()) {
            (Some(t), Some(a)) if TypeRef::ptr_eq(&t, &a) => Expand::Equal,
            (Some(t), Some(a)) => compare_at(&t, &a, depth).structural(),
            _ => Expand::Different,
        },

        _ => Expand::Different,
    }
}

fn compare_species(target: &Species, actual: &Species, depth: usize) -> Expand {
    let (t, a) = (target.members(), actual.members());

    if t.len() == a.len() && t.iter().zip(a.iter()).all(|(t, a)| compare_at(t, a, depth).is_exact()) {
        return Expand::Equal;
    }

    let common = t
        .iter()
        .any(|t| a.iter().any(|a| compare_at(t, a, depth).is_exact()));
    if common { Expand::Matching } else { Expand::Different }
}

/// Pairwise comparison of constituents; the weakest pair decides.
fn positional<'a>(
    targets: impl ExactSizeIterator<Item = &'a TypeRef>,
    actuals: impl ExactSizeIterator<Item = &'a TypeRef>,
    depth: usize,
) -> Expand {
    if targets.len() != actuals.len() {
        return Expand::Different;
    }

    let mut result = Expand::Equal;
    for (t, a) in targets.zip(actuals) {
        let r = compare_at(t, a, depth).structural();
        if r == Expand::Different {
            return r;
        }
        result = result.min(r);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TypeSystem;

    #[test]
    fn test_expand_ordering() {
        assert!(Expand::Same > Expand::Equal);
        assert!(Expand::Equal > Expand::Matching);
        assert!(Expand::Matching > Expand::Different);
        assert_eq!(Expand::Same.structural(), Expand::Equal);
        assert_eq!(Expand::Matching.structural(), Expand::Matching);
    }

    #[test]
    fn test_identity_is_same() {
        let ts = TypeSystem::new().unwrap();
        let s = ts.create_structure().unwrap();
        assert_eq!(compare(&s, &s), Expand::Same);
    }

    #[test]
    fn test_intrinsics() {
        let ts = TypeSystem::new().unwrap();
        let a = ts.create_intrinsic(4, 4).unwrap();
        let b = ts.create_intrinsic(4, 4).unwrap();
        let c = ts.create_intrinsic(4, 2).unwrap();

        assert_eq!(compare(&a, &b), Expand::Equal);
        assert_eq!(compare(&a, &c), Expand::Different);
    }

    #[test]
    fn test_identifier_is_transparent() {
        let mut ts = TypeSystem::new().unwrap();
        let word = ts.create_intrinsic(8, 8).unwrap();
        let alias = ts.create_identifier(word.link(), "word").unwrap();

        assert_eq!(compare(&alias, &word), Expand::Equal);
        assert_eq!(compare(&word, &alias), Expand::Equal);
        assert_eq!(compare(&alias, ts.int()), Expand::Equal);
    }

    #[test]
    fn test_undefined_identifier_only_matches_itself() {
        let mut ts = TypeSystem::new().unwrap();
        let node = ts.declare_identifier("node").unwrap();
        assert_eq!(compare(&node, &node), Expand::Same);
        assert_eq!(compare(&node, ts.int()), Expand::Different);
    }

    #[test]
    fn test_structures_by_position() {
        let mut ts = TypeSystem::new().unwrap();
        let a = ts.create_structure().unwrap();
        ts.add_member_to_structure(&a, ts.int().link(), "x").unwrap();
        ts.add_member_to_structure(&a, ts.char().link(), "y").unwrap();

        let b = ts.create_structure().unwrap();
        ts.add_member_to_structure(&b, ts.int().link(), "left").unwrap();
        ts.add_member_to_structure(&b, ts.char().link(), "right").unwrap();

        let c = ts.create_structure().unwrap();
        ts.add_member_to_structure(&c, ts.char().link(), "y").unwrap();
        ts.add_member_to_structure(&c, ts.int().link(), "x").unwrap();

        assert_eq!(compare(&a, &b), Expand::Equal);
        assert_eq!(compare(&a, &c), Expand::Different);
    }

    #[test]
    fn test_structure_member_count() {
        let mut ts = TypeSystem::new().unwrap();
        let a = ts.create_structure().unwrap();
        ts.add_member_to_structure(&a, ts.int().link(), "x").unwrap();
        let b = ts.create_structure().unwrap();

        assert_eq!(compare(&a, &b), Expand::Different);
        assert_eq!(compare(&b, &ts.create_structure().unwrap()), Expand::Equal);
    }

    #[test]
    fn test_structure_with_any_member_matches() {
        let mut ts = TypeSystem::new().unwrap();
        let boxed = ts.create_structure().unwrap();
        ts.add_member_to_structure(&boxed, ts.any().link(), "value").unwrap();
        let concrete = ts.create_structure().unwrap();
        ts.add_member_to_structure(&concrete, ts.int().link(), "value").unwrap();

        assert_eq!(compare(&boxed, &concrete), Expand::Matching);
        assert_eq!(compare(&concrete, &boxed), Expand::Different);
    }

    #[test]
    fn test_raised_types() {
        let mut ts = TypeSystem::new().unwrap();
        let meters = ts.create_raised(ts.real().link()).unwrap();
        let seconds = ts.create_raised(ts.real().link()).unwrap();
        let meters_again = ts.create_raised_as(ts.real().link(), &meters).unwrap();

        assert_eq!(compare(&meters, ts.real()), Expand::Different);
        assert_eq!(compare(ts.real(), &meters), Expand::Different);
        assert_eq!(compare(&meters, &seconds), Expand::Different);
        assert_eq!(compare(&meters, &meters_again), Expand::Equal);
    }

    #[test]
    fn test_species_accepts_members() {
        let mut ts = TypeSystem::new().unwrap();
        let num = ts.create_species().unwrap();
        ts.add_member_to_species(&num, ts.char().link()).unwrap();
        ts.add_member_to_species(&num, ts.real().link()).unwrap();

        assert_eq!(compare(&num, ts.char()), Expand::Matching);
        assert_eq!(compare(&num, ts.real()), Expand::Matching);

        let short = ts.create_intrinsic(2, 2).unwrap();
        assert_eq!(compare(&num, &short), Expand::Different);
    }

    #[test]
    fn test_plain_target_accepts_only_widest_member() {
        let mut ts = TypeSystem::new().unwrap();
        let num = ts.create_species().unwrap();
        ts.add_member_to_species(&num, ts.char().link()).unwrap();
        ts.add_member_to_species(&num, ts.real().link()).unwrap();

        assert_eq!(compare(ts.real(), &num), Expand::Matching);
        assert_eq!(compare(ts.char(), &num), Expand::Different);
    }

    #[test]
    fn test_species_against_species() {
        let mut ts = TypeSystem::new().unwrap();
        let build = |ts: &mut TypeSystem, members: &[&TypeRef]| {
            let s = ts.create_species().unwrap();
            for m in members {
                ts.add_member_to_species(&s, m.link()).unwrap();
            }
            s
        };
        let (char_, int, point) = (ts.char().link(), ts.int().link(), ts.point().link());

        let a = build(&mut ts, &[&char_, &int]);
        let b = build(&mut ts, &[&char_, &int]);
        let c = build(&mut ts, &[&int, &point]);
        let d = build(&mut ts, &[&point]);

        assert_eq!(compare(&a, &b), Expand::Equal);
        assert_eq!(compare(&a, &c), Expand::Matching);
        assert_eq!(compare(&a, &d), Expand::Different);
    }

    #[test]
    fn test_any_is_top() {
        let ts = TypeSystem::new().unwrap();
        assert_eq!(compare(ts.any(), ts.point()), Expand::Matching);
        assert_eq!(compare(ts.point(), ts.any()), Expand::Different);
        assert_eq!(compare(ts.any(), &ts.create_any().unwrap()), Expand::Equal);
    }

    #[test]
    fn test_functions() {
        let ts = TypeSystem::new().unwrap();
        let f = ts.create_function(ts.int().link(), ts.real().link()).unwrap();
        let g = ts.create_function(ts.real().link(), ts.int().link()).unwrap();
        let h = ts.create_function(ts.char().link(), ts.int().link()).unwrap();
        let any_arg = ts.create_function(ts.any().link(), ts.int().link()).unwrap();

        assert_eq!(compare(&f, &g), Expand::Equal);
        assert_eq!(compare(&f, &h), Expand::Different);
        assert_eq!(compare(&any_arg, &h), Expand::Matching);
    }

    #[test]
    fn test_pointers() {
        let ts = TypeSystem::new().unwrap();
        let p = ts.create_pointer(ts.int().link()).unwrap();
        let q = ts.create_pointer(ts.int().link()).unwrap();
        let r = ts.create_pointer(ts.real().link()).unwrap();
        let s = ts.create_pointer(ts.point().link()).unwrap();

        assert_eq!(compare(&p, &q), Expand::Equal);
        assert_eq!(compare(&p, &r), Expand::Equal);
        assert_eq!(compare(&p, &s), Expand::Different);
    }

    #[test]
    fn test_chain_widening() {
        let mut ts = TypeSystem::new().unwrap();
        let num = ts.create_species().unwrap();
        for ty in [ts.char().link(), ts.int().link(), ts.real().link()] {
            ts.add_member_to_species(&num, ty).unwrap();
        }
        let chain = num.as_species().unwrap();

        assert_eq!(chain_position(chain, ts.char()), Some(0));
        assert_eq!(chain_position(chain, ts.real()), Some(2));
        assert_eq!(compare_in_chain(chain, ts.real(), ts.char()), Expand::Matching);
        assert_eq!(compare_in_chain(chain, ts.char(), ts.real()), Expand::Different);
        assert!(widens(chain, ts.char(), ts.real()));
        assert!(!widens(chain, ts.real(), ts.char()));
    }

    #[test]
    fn test_recursive_types_terminate() {
        let mut ts = TypeSystem::new().unwrap();
        let make_list = |ts: &mut TypeSystem, name: &str| {
            let list = ts.declare_identifier(name).unwrap();
            let body = ts.create_structure().unwrap();
            ts.add_member_to_structure(&body, ts.int().link(), "value").unwrap();
            let next = ts.create_back_pointer(&list).unwrap();
            ts.add_member_to_structure(&body, next, "next").unwrap();
            ts.define_identifier(&list, body).unwrap();
            list
        };
        let a = make_list(&mut ts, "list_a");
        let b = make_list(&mut ts, "list_b");

        assert_eq!(compare(&a, &a), Expand::Same);
        assert_eq!(compare(&a, &b), Expand::Different);
    }
}
