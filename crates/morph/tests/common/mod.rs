// Common test utilities for integration tests
//
// Shared callables, a call-slot virtual machine and finalizer counters.

#![allow(dead_code)]

use morph::{
    CallNumber, CallRequest, Callable, CallableRef, Error, Result, Single, TypeRef, TypeSystem,
    VirtualMachine, into_callable,
};
use std::cell::Cell;
use std::rc::Rc;

/// Counts how many payloads carrying it were finalized.
#[derive(Clone, Default)]
pub struct DropCounter(Rc<Cell<usize>>);

impl DropCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }

    pub fn token(&self) -> DropToken {
        DropToken(self.0.clone())
    }
}

/// Increments its counter when dropped.
pub struct DropToken(Rc<Cell<usize>>);

impl Drop for DropToken {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

/// A callable that records how often it was asked for a call number.
pub struct TestCallable {
    pub name: String,
    pub requests: Rc<Cell<usize>>,
    pub rebind_to: Option<String>,
    _token: Option<DropToken>,
}

impl Callable for TestCallable {
    fn name(&self) -> &str {
        &self.name
    }

    fn request_call_number(&self, vm: &mut dyn VirtualMachine) -> Result<CallRequest> {
        self.requests.set(self.requests.get() + 1);
        let number = vm.reserve_call_slot(&self.name)?;

        match &self.rebind_to {
            Some(name) => Ok(CallRequest::Rebound {
                callable: callable(name),
                number,
            }),
            None => Ok(CallRequest::Assigned(number)),
        }
    }
}

/// Creates a plain callable.
pub fn callable(name: &str) -> CallableRef {
    into_callable(
        Single::new(TestCallable {
            name: name.to_string(),
            requests: Rc::default(),
            rebind_to: None,
            _token: None,
        })
        .expect("Failed to allocate callable"),
    )
}

/// Creates a callable whose finalization is counted by `counter`.
pub fn tracked_callable(name: &str, counter: &DropCounter) -> CallableRef {
    into_callable(
        Single::new(TestCallable {
            name: name.to_string(),
            requests: Rc::default(),
            rebind_to: None,
            _token: Some(counter.token()),
        })
        .expect("Failed to allocate callable"),
    )
}

/// Creates a callable that rebinds to `target` on its first call-number
/// request; `requests` counts those requests.
pub fn rebinding_callable(
    name: &str,
    target: &str,
    requests: &Rc<Cell<usize>>,
    counter: &DropCounter,
) -> CallableRef {
    into_callable(
        Single::new(TestCallable {
            name: name.to_string(),
            requests: requests.clone(),
            rebind_to: Some(target.to_string()),
            _token: Some(counter.token()),
        })
        .expect("Failed to allocate callable"),
    )
}

/// Virtual machine handing out consecutive call slots.
#[derive(Default)]
pub struct SlotVm {
    pub reserved: Vec<String>,
    pub limit: Option<usize>,
}

impl VirtualMachine for SlotVm {
    fn reserve_call_slot(&mut self, name: &str) -> Result<CallNumber> {
        if self.limit.is_some_and(|limit| self.reserved.len() >= limit) {
            return Err(Error::CallSlotsExhausted);
        }
        self.reserved.push(name.to_string());
        Ok(CallNumber::new((self.reserved.len() - 1) as u32))
    }
}

/// Creates a type system with default configuration.
pub fn type_system() -> TypeSystem {
    TypeSystem::new().expect("Failed to create type system")
}

/// Builds an anonymous species over `members`, in order.
pub fn species(ts: &TypeSystem, members: &[&TypeRef]) -> TypeRef {
    let s = ts.create_species().expect("Failed to create species");
    for member in members {
        ts.add_member_to_species(&s, member.link())
            .expect("Failed to add species member");
    }
    s
}
