use crate::error::RuntimeError;
use crate::interpreter::value::Value;
use crate::interpreter::Interpreter;
use lox_core::span::Span;
use std::rc::Rc;

/// Anything a Lox program can put parentheses after.
///
/// The interpreter checks the argument count against [`Callable::arity`]
/// before calling, so implementations can rely on receiving exactly that
/// many arguments. `span` points at the call site for error reporting.
pub trait Callable {
    fn arity(&self) -> usize;

    fn call(
        self: Rc<Self>,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
        span: Span,
    ) -> Result<Value, RuntimeError>;
}
