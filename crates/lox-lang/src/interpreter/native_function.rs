use crate::error::RuntimeError;
use crate::interpreter::callable::Callable;
use crate::interpreter::value::Value;
use crate::interpreter::Interpreter;
use lox_core::span::Span;
use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, String>;

/// A callable implemented in Rust. An `Err` message becomes a runtime error
/// at the call site.
pub struct NativeFunction {
    pub name: Rc<str>,
    pub arity: usize,
    pub func: Box<NativeFn>,
}

impl NativeFunction {
    pub fn new(
        name: &str,
        arity: usize,
        func: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) -> Self {
        Self {
            name: Rc::from(name),
            arity,
            func: Box::new(func),
        }
    }
}

impl Callable for NativeFunction {
    fn arity(&self) -> usize {
        self.arity
    }

    fn call(
        self: Rc<Self>,
        _interpreter: &mut Interpreter,
        arguments: Vec<Value>,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        (self.func)(&arguments).map_err(|message| RuntimeError::new(span, message))
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

pub fn all_native_functions() -> Vec<NativeFunction> {
    vec![native_clock()]
}

// Seconds since the Unix epoch, as a float.
fn native_clock() -> NativeFunction {
    NativeFunction::new("clock", 0, |_args| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| Value::Num(elapsed.as_secs_f64()))
            .map_err(|e| format!("clock: {}", e))
    })
}
