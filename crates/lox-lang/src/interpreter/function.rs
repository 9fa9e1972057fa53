use crate::error::RuntimeError;
use crate::interpreter::callable::Callable;
use crate::interpreter::class::Instance;
use crate::interpreter::environment::Environment;
use crate::interpreter::value::Value;
use crate::interpreter::{ControlFlow, Interpreter};
use lox_core::parser::ast::FunctionDecl;
use lox_core::span::Span;
use std::fmt;
use std::rc::Rc;

/// A user-defined function or method together with the scope it closes over.
pub struct Function {
    pub declaration: Rc<FunctionDecl>,
    // None when declared at top level, where only globals are visible
    pub closure: Option<Rc<Environment>>,
    pub is_initializer: bool,
}

impl Function {
    pub fn new(
        declaration: Rc<FunctionDecl>,
        closure: Option<Rc<Environment>>,
        is_initializer: bool,
    ) -> Self {
        Self {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> &str {
        &self.declaration.name.lexeme
    }

    pub fn is_getter(&self) -> bool {
        self.declaration.is_getter
    }

    /// Wraps the closure in a scope holding `this` at slot 0.
    pub fn bind(&self, instance: Rc<Instance>) -> Rc<Function> {
        let env = Environment::new(self.closure.clone());
        env.define(Value::Instance(instance));
        Rc::new(Function {
            declaration: Rc::clone(&self.declaration),
            closure: Some(Rc::new(env)),
            is_initializer: self.is_initializer,
        })
    }

    // `init` always hands back the instance, whatever its body returns.
    fn bound_this(&self, span: Span) -> Result<Value, RuntimeError> {
        self.closure
            .as_ref()
            .and_then(|env| env.get_at(0, 0))
            .ok_or_else(|| RuntimeError::internal(span, "initializer is not bound to an instance"))
    }
}

impl Callable for Function {
    fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    fn call(
        self: Rc<Self>,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        let env = Rc::new(Environment::new_for_call(self.closure.clone(), arguments));
        let flow = interpreter.execute_block(&self.declaration.body, env)?;

        if self.is_initializer {
            return self.bound_this(span);
        }

        match flow {
            ControlFlow::Return(value) => Ok(value),
            _ => Ok(Value::Nil),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name())
            .field("arity", &self.arity())
            .field("closure", &"<env>")
            .field("is_initializer", &self.is_initializer)
            .finish()
    }
}
