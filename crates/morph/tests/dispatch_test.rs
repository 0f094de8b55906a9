//! Combination definition, resolution and call-site generation.

mod common;

use common::{DropCounter, SlotVm, callable, rebinding_callable, species, type_system};
use morph::{
    CombRef, Error, Expand, Operation, Single, define_combination, find_combination,
    find_exact_combination, generate_call_number, undefine_combination,
};
use std::cell::Cell;
use std::rc::Rc;

#[test]
fn test_shadowing_then_undefine_restores_previous() {
    let mut ts = type_system();
    let id = ts.create_identifier(ts.real().link(), "vector").unwrap();

    let first = define_combination(&id, Operation::At, ts.real().link(), callable("first")).unwrap();
    let second = define_combination(&id, Operation::At, ts.real().link(), callable("second")).unwrap();

    let found = find_combination(&id, Operation::At, ts.real()).unwrap();
    assert!(CombRef::ptr_eq(&found.node, &second));

    undefine_combination(&id, &second);
    let found = find_combination(&id, Operation::At, ts.real()).unwrap();
    assert!(CombRef::ptr_eq(&found.node, &first));

    undefine_combination(&id, &first);
    assert!(find_combination(&id, Operation::At, ts.real()).is_none());
}

#[test]
fn test_species_widening_char_to_real() {
    let mut ts = type_system();
    let (c, i, r) = (ts.char().link(), ts.int().link(), ts.real().link());
    let chain = species(&ts, &[&c, &i, &r]);
    let num = ts.create_identifier(chain, "num").unwrap();

    define_combination(&num, Operation::At, ts.real().link(), callable("at_real")).unwrap();

    let found = find_combination(&num, Operation::At, ts.char()).unwrap();
    assert_eq!(found.node.callable().name(), "at_real");
    assert_eq!(found.expand, Expand::Matching);

    let found = find_combination(&num, Operation::At, ts.real()).unwrap();
    assert_eq!(found.expand, Expand::Equal);
}

#[test]
fn test_narrow_combination_does_not_accept_wider_argument() {
    let mut ts = type_system();
    let (c, p) = (ts.char().link(), ts.point().link());
    let chain = species(&ts, &[&c, &p]);
    let id = ts.create_identifier(chain, "shape").unwrap();

    define_combination(&id, Operation::At, ts.char().link(), callable("at_char")).unwrap();
    assert!(find_combination(&id, Operation::At, ts.point()).is_none());
}

#[test]
fn test_species_parent_steps_to_widest_member() {
    let mut ts = type_system();
    let wide = ts.create_identifier(ts.real().link(), "wide").unwrap();
    define_combination(&wide, Operation::Div, ts.real().link(), callable("div")).unwrap();

    let c = ts.char().link();
    let chain = species(&ts, &[&c, &wide]);
    let num = ts.create_identifier(chain, "num").unwrap();

    let found = find_combination(&num, Operation::Div, ts.real()).unwrap();
    assert_eq!(found.node.callable().name(), "div");
}

#[test]
fn test_inherited_through_identifier_chain() {
    let mut ts = type_system();
    let animal = ts.create_identifier(ts.point().link(), "animal").unwrap();
    let dog = ts.create_identifier(animal.link(), "dog").unwrap();
    let puppy = ts.create_identifier(dog.link(), "puppy").unwrap();

    define_combination(&animal, Operation::Call, ts.any().link(), callable("speak")).unwrap();
    define_combination(&dog, Operation::Call, ts.int().link(), callable("bark")).unwrap();

    let found = find_combination(&puppy, Operation::Call, ts.int()).unwrap();
    assert_eq!(found.node.callable().name(), "bark");

    let found = find_combination(&puppy, Operation::Call, ts.point()).unwrap();
    assert_eq!(found.node.callable().name(), "speak");
    assert_eq!(found.expand, Expand::Matching);

    assert!(find_exact_combination(&puppy, Operation::Call, ts.int()).is_none());
}

#[test]
fn test_named_operations_are_distinct() {
    let mut ts = type_system();
    let id = ts.create_identifier(ts.point().link(), "vec").unwrap();
    let (length, norm) = (ts.index_for_name("length").unwrap(), ts.index_for_name("norm").unwrap());

    define_combination(&id, Operation::Named(length), ts.any().link(), callable("length")).unwrap();

    assert!(find_combination(&id, Operation::Named(length), ts.int()).is_some());
    assert!(find_combination(&id, Operation::Named(norm), ts.int()).is_none());
}

#[test]
fn test_subtype_combinations_are_separate() {
    let mut ts = type_system();
    let shape = ts.create_identifier(ts.point().link(), "shape").unwrap();
    let circle = ts.add_subtype(&shape, "circle", ts.real().link()).unwrap();

    define_combination(&circle, Operation::Construct, ts.real().link(), callable("circle_new")).unwrap();

    assert!(find_combination(&shape, Operation::Construct, ts.real()).is_none());
    let sub = ts.find_subtype(&shape, "circle").unwrap();
    let found = find_combination(&sub, Operation::Construct, ts.real()).unwrap();
    assert_eq!(found.node.callable().name(), "circle_new");
}

#[test]
fn test_raised_argument_needs_raised_combination() {
    let mut ts = type_system();
    let meters = ts.create_raised(ts.real().link()).unwrap();
    let id = ts.create_identifier(ts.real().link(), "distance").unwrap();

    define_combination(&id, Operation::Add, meters.link(), callable("add_meters")).unwrap();

    assert!(find_combination(&id, Operation::Add, ts.real()).is_none());
    let same_raise = ts.create_raised_as(ts.real().link(), &meters).unwrap();
    assert!(find_combination(&id, Operation::Add, &same_raise).is_some());
}

#[test]
fn test_call_number_idempotent() {
    let mut ts = type_system();
    let id = ts.create_identifier(ts.int().link(), "f").unwrap();
    let comb = define_combination(&id, Operation::Call, ts.int().link(), callable("f")).unwrap();
    let mut vm = SlotVm::default();

    let numbers: Vec<_> = (0..5)
        .map(|_| generate_call_number(&comb, &mut vm).unwrap())
        .collect();
    assert!(numbers.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(vm.reserved, ["f"]);
}

#[test]
fn test_rebinding_swaps_callable_without_leak() {
    let mut ts = type_system();
    let id = ts.create_identifier(ts.int().link(), "g").unwrap();
    let counter = DropCounter::new();
    let requests = Rc::new(Cell::new(0));

    let generic = rebinding_callable("generic", "jit_g", &requests, &counter);
    let comb = define_combination(&id, Operation::Call, ts.int().link(), generic).unwrap();
    let mut vm = SlotVm::default();

    let a = generate_call_number(&comb, &mut vm).unwrap();
    assert_eq!(counter.get(), 1, "old callable released exactly once");
    assert_eq!(comb.callable().name(), "jit_g");

    let b = generate_call_number(&comb, &mut vm).unwrap();
    assert_eq!(a, b);
    assert_eq!(requests.get(), 1);
    assert_eq!(counter.get(), 1);
    assert_eq!(comb.call_number(), Some(a));
}

#[test]
fn test_call_slots_exhausted() {
    let mut ts = type_system();
    let id = ts.create_identifier(ts.int().link(), "h").unwrap();
    let a = define_combination(&id, Operation::Add, ts.int().link(), callable("a")).unwrap();
    let b = define_combination(&id, Operation::Sub, ts.int().link(), callable("b")).unwrap();
    let mut vm = SlotVm {
        reserved: Vec::new(),
        limit: Some(1),
    };

    assert!(generate_call_number(&a, &mut vm).is_ok());
    assert_eq!(generate_call_number(&b, &mut vm), Err(Error::CallSlotsExhausted));
    assert!(b.call_number().is_none());
}

#[test]
fn test_resolution_depth_on_long_identifier_chain() {
    let mut ts = type_system();
    let base = ts.create_identifier(ts.int().link(), "level0").unwrap();
    define_combination(&base, Operation::At, ts.int().link(), callable("deep")).unwrap();

    let mut top = base.link();
    for level in 1..=8 {
        top = ts.create_identifier(top, &format!("level{level}")).unwrap();
    }

    assert!(find_combination(&top, Operation::At, ts.int()).is_some());
    assert_eq!(Single::strong_count(&base), 2);
}
