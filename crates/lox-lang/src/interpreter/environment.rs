use crate::interpreter::value::Value;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::rc::Rc;

// Most scopes hold ≤4 locals, so inline storage avoids a heap alloc
pub type Slots = SmallVec<[Value; 4]>;

/// One local scope: a block body, a call frame, a bound `this` or `super`.
///
/// Values are addressed by slot, in the order they were defined. The outermost
/// local scope has no enclosing environment; globals are kept by the
/// interpreter in a name-keyed table instead.
#[derive(Debug, Default)]
pub struct Environment {
    enclosing: Option<Rc<Environment>>,
    values: RefCell<Slots>,
}

impl Environment {
    pub fn new(enclosing: Option<Rc<Environment>>) -> Self {
        Self {
            enclosing,
            values: RefCell::new(SmallVec::new()),
        }
    }

    /// Create a function-call environment pre-populated with arguments.
    pub fn new_for_call(enclosing: Option<Rc<Environment>>, args: Vec<Value>) -> Self {
        Self {
            enclosing,
            values: RefCell::new(args.into_iter().collect()),
        }
    }

    pub fn define(&self, value: Value) {
        self.values.borrow_mut().push(value);
    }

    // Walk up the chain 'depth' times
    fn ancestor(&self, depth: usize) -> Option<&Environment> {
        let mut current = self;
        for _ in 0..depth {
            current = current.enclosing.as_deref()?;
        }
        Some(current)
    }

    /// `None` when the chain is shorter than `depth` or the slot is missing,
    /// which means the resolver and interpreter disagree.
    pub fn get_at(&self, depth: usize, slot: usize) -> Option<Value> {
        let env = self.ancestor(depth)?;
        let values = env.values.borrow();
        values.get(slot).cloned()
    }

    pub fn assign_at(&self, depth: usize, slot: usize, value: Value) -> Option<()> {
        let env = self.ancestor(depth)?;
        let mut values = env.values.borrow_mut();
        let target = values.get_mut(slot)?;
        *target = value;
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_follow_definition_order() {
        let env = Environment::new(None);
        env.define(Value::Num(1.0));
        env.define(Value::Bool(true));
        assert_eq!(env.get_at(0, 0), Some(Value::Num(1.0)));
        assert_eq!(env.get_at(0, 1), Some(Value::Bool(true)));
        assert_eq!(env.get_at(0, 2), None);
    }

    #[test]
    fn reads_walk_enclosing_scopes() {
        let outer = Rc::new(Environment::new(None));
        outer.define(Value::Num(10.0));
        let inner = Environment::new_for_call(Some(outer.clone()), vec![Value::Nil]);

        assert_eq!(inner.get_at(1, 0), Some(Value::Num(10.0)));
        inner.assign_at(1, 0, Value::Num(11.0)).expect("slot exists");
        assert_eq!(outer.get_at(0, 0), Some(Value::Num(11.0)));
    }

    #[test]
    fn out_of_range_lookups_are_none() {
        let env = Environment::new(None);
        assert_eq!(env.get_at(0, 0), None);
        assert_eq!(env.get_at(3, 0), None);
        assert_eq!(env.assign_at(1, 0, Value::Nil), None);
    }
}
