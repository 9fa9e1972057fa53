pub mod callable;
pub mod class;
pub mod environment;
pub mod function;
pub mod native_function;
pub mod value;

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::interpreter::callable::Callable;
use crate::interpreter::class::{Class, Instance};
use crate::interpreter::environment::Environment;
use crate::interpreter::function::Function;
use crate::interpreter::native_function::{all_native_functions, NativeFunction};
use crate::interpreter::value::Value;
use lox_core::parser::ast::{
    Expr, ExprKind, Literal, Local, Program, Resolution, Stmt, StmtKind,
};
use lox_core::scanner::token::{Token, TokenType};
use lox_core::span::Span;
use lox_core::stack::ensure_sufficient_stack;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;
use tracing::{debug, trace};

// How a statement finished. `break`, `continue` and `return` travel outwards
// as values until the loop or call that handles them.
#[derive(Debug, Clone)]
pub(crate) enum ControlFlow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

pub struct Interpreter {
    globals: HashMap<String, Value>,
    // innermost local scope; None while running top-level code
    env: Option<Rc<Environment>>,
    config: RuntimeConfig,
    out: Box<dyn Write>,
    call_depth: usize,
}

impl Interpreter {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_output(config, Box::new(io::stdout()))
    }

    /// An interpreter whose `print` statements write to `out`.
    pub fn with_output(config: RuntimeConfig, out: Box<dyn Write>) -> Self {
        let mut interpreter = Self {
            globals: HashMap::new(),
            env: None,
            config,
            out,
            call_depth: 0,
        };
        interpreter.define_native_functions();
        interpreter
    }

    fn define_native_functions(&mut self) {
        for native in all_native_functions() {
            self.globals
                .insert(native.name.to_string(), Value::NativeFn(Rc::new(native)));
        }
    }

    pub fn define_native(
        &mut self,
        name: &str,
        arity: usize,
        func: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) {
        let native = NativeFunction::new(name, arity, func);
        self.globals
            .insert(name.to_string(), Value::NativeFn(Rc::new(native)));
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    pub fn global_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.globals.keys().map(String::as_str)
    }

    pub fn interpret(&mut self, program: &Program) -> Result<(), RuntimeError> {
        debug!(statements = program.statements.len(), "interpreting");
        for stmt in &program.statements {
            if let Err(error) = self.execute(stmt) {
                debug!(%error, "runtime error");
                // unwind back to global scope
                self.env = None;
                self.call_depth = 0;
                let _ = self.out.flush();
                return Err(error);
            }
        }
        self.out
            .flush()
            .map_err(|e| RuntimeError::internal(Span::default(), e.to_string()))
    }

    fn execute(&mut self, stmt: &Stmt) -> Result<ControlFlow, RuntimeError> {
        ensure_sufficient_stack(|| self.execute_stmt(stmt))
    }

    fn execute_stmt(&mut self, stmt: &Stmt) -> Result<ControlFlow, RuntimeError> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(ControlFlow::Normal)
            }
            StmtKind::Print(expr) => {
                let value = self.evaluate(expr)?;
                writeln!(self.out, "{}", value)
                    .map_err(|e| RuntimeError::internal(stmt.span, e.to_string()))?;
                Ok(ControlFlow::Normal)
            }
            StmtKind::Var { name, initializer } => {
                let value = match initializer {
                    Some(init) => self.evaluate(init)?,
                    None => Value::Nil,
                };
                self.define(&name.lexeme, value);
                Ok(ControlFlow::Normal)
            }
            StmtKind::Block(statements) => {
                let env = Rc::new(Environment::new(self.env.clone()));
                self.execute_block(statements, env)
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(ControlFlow::Normal)
                }
            }
            StmtKind::While {
                condition,
                body,
                increment,
            } => {
                while self.evaluate(condition)?.is_truthy() {
                    match self.execute(body)? {
                        ControlFlow::Break => break,
                        ControlFlow::Return(v) => return Ok(ControlFlow::Return(v)),
                        ControlFlow::Normal | ControlFlow::Continue => {}
                    }
                    if let Some(increment) = increment {
                        self.evaluate(increment)?;
                    }
                }
                Ok(ControlFlow::Normal)
            }
            StmtKind::Function(declaration) => {
                // the closure is the very scope the function is defined into,
                // so it sees itself and anything declared after it
                let function = Function::new(Rc::clone(declaration), self.env.clone(), false);
                self.define(&declaration.name.lexeme, Value::Fn(Rc::new(function)));
                Ok(ControlFlow::Normal)
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                Ok(ControlFlow::Return(value))
            }
            StmtKind::Class {
                name,
                superclass,
                methods,
            } => {
                let superclass = match superclass {
                    Some(expr) => match self.evaluate(expr)? {
                        Value::Class(class) => Some(class),
                        _ => {
                            return Err(RuntimeError::new(
                                expr.span,
                                "Superclass must be a class.",
                            ))
                        }
                    },
                    None => None,
                };

                // methods of a subclass close over a scope holding `super`
                let method_env = match &superclass {
                    Some(class) => {
                        let env = Environment::new(self.env.clone());
                        env.define(Value::Class(Rc::clone(class)));
                        Some(Rc::new(env))
                    }
                    None => self.env.clone(),
                };

                let methods = methods
                    .iter()
                    .map(|method| {
                        let is_initializer = method.name.lexeme == "init" && !method.is_getter;
                        let function =
                            Function::new(Rc::clone(method), method_env.clone(), is_initializer);
                        (method.name.lexeme.clone(), Rc::new(function))
                    })
                    .collect();

                let class = Class::new(name.lexeme.clone(), superclass, methods);
                self.define(&name.lexeme, Value::Class(Rc::new(class)));
                Ok(ControlFlow::Normal)
            }
            StmtKind::Break => Ok(ControlFlow::Break),
            StmtKind::Continue => Ok(ControlFlow::Continue),
        }
    }

    /// Runs `statements` with `env` as the innermost scope. The previous scope
    /// is restored afterwards, whether or not the block failed.
    pub(crate) fn execute_block(
        &mut self,
        statements: &[Stmt],
        env: Rc<Environment>,
    ) -> Result<ControlFlow, RuntimeError> {
        let previous = std::mem::replace(&mut self.env, Some(env));

        let result: Result<ControlFlow, RuntimeError> = (|| {
            for stmt in statements {
                match self.execute(stmt)? {
                    ControlFlow::Normal => {}
                    other => return Ok(other),
                }
            }
            Ok(ControlFlow::Normal)
        })();

        self.env = previous;
        result
    }

    fn define(&mut self, name: &str, value: Value) {
        match &self.env {
            Some(env) => env.define(value),
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    fn local_at(&self, local: Local, span: Span) -> Result<Value, RuntimeError> {
        self.env
            .as_ref()
            .and_then(|env| env.get_at(local.depth, local.slot))
            .ok_or_else(|| {
                RuntimeError::internal(
                    span,
                    format!("no local at depth {} slot {}", local.depth, local.slot),
                )
            })
    }

    fn look_up_variable(
        &self,
        name: &Token,
        resolved: &Resolution,
    ) -> Result<Value, RuntimeError> {
        match resolved.get() {
            Some(local) => self.local_at(local, name.span),
            None => self.globals.get(&name.lexeme).cloned().ok_or_else(|| {
                RuntimeError::new(name.span, format!("Undefined variable '{}'.", name.lexeme))
            }),
        }
    }

    fn assign_variable(
        &mut self,
        name: &Token,
        resolved: &Resolution,
        value: Value,
    ) -> Result<(), RuntimeError> {
        match resolved.get() {
            Some(local) => self
                .env
                .as_ref()
                .and_then(|env| env.assign_at(local.depth, local.slot, value))
                .ok_or_else(|| {
                    RuntimeError::internal(
                        name.span,
                        format!("no local at depth {} slot {}", local.depth, local.slot),
                    )
                }),
            None => match self.globals.get_mut(&name.lexeme) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(RuntimeError::new(
                    name.span,
                    format!("Undefined variable '{}'.", name.lexeme),
                )),
            },
        }
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        ensure_sufficient_stack(|| self.evaluate_expr(expr))
    }

    fn evaluate_expr(&mut self, expression: &Expr) -> Result<Value, RuntimeError> {
        match &expression.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                Literal::Nil => Value::Nil,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Num(*n),
                Literal::String(s) => Value::Str(Rc::from(s.as_str())),
            }),
            ExprKind::Grouping(inner) => self.evaluate(inner),
            ExprKind::Variable { name, resolved } => self.look_up_variable(name, resolved),
            ExprKind::Assign {
                name,
                value,
                resolved,
            } => {
                let value = self.evaluate(value)?;
                self.assign_variable(name, resolved, value.clone())?;
                Ok(value)
            }
            ExprKind::Unary { operator, operand } => {
                let operand = self.evaluate(operand)?;
                match (&operator.token_type, operand) {
                    (TokenType::Minus, Value::Num(n)) => Ok(Value::Num(-n)),
                    (TokenType::Minus, _) => {
                        Err(RuntimeError::new(operator.span, "Operand must be a number."))
                    }
                    (TokenType::Bang, value) => Ok(Value::Bool(!value.is_truthy())),
                    (op, _) => Err(RuntimeError::internal(
                        operator.span,
                        format!("unknown unary operator {:?}", op),
                    )),
                }
            }
            ExprKind::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                binary(operator, left, right)
            }
            ExprKind::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                // the deciding operand is the result, not a bool
                let short_circuits = match operator.token_type {
                    TokenType::Or => left.is_truthy(),
                    _ => !left.is_truthy(),
                };
                if short_circuits {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }
            ExprKind::Call { callee, arguments } => {
                let callee = self.evaluate(callee)?;
                let mut argument_values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    argument_values.push(self.evaluate(argument)?);
                }
                self.call_value(callee, argument_values, expression.span)
            }
            ExprKind::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => self.get_property(&instance, name),
                _ => Err(RuntimeError::new(
                    name.span,
                    "Only instances have properties.",
                )),
            },
            ExprKind::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object)? else {
                    return Err(RuntimeError::new(name.span, "Only instances have fields."));
                };
                let value = self.evaluate(value)?;
                instance.set_field(&name.lexeme, value.clone());
                Ok(value)
            }
            ExprKind::This { resolved } => match resolved.get() {
                Some(local) => self.local_at(local, expression.span),
                None => Err(RuntimeError::internal(
                    expression.span,
                    "'this' was not resolved",
                )),
            },
            ExprKind::Super { method, resolved } => {
                self.super_method(method, resolved, expression.span)
            }
            ExprKind::Lambda(declaration) => {
                let function = Function::new(Rc::clone(declaration), self.env.clone(), false);
                Ok(Value::Fn(Rc::new(function)))
            }
        }
    }

    // Fields shadow methods. Getters run on access.
    fn get_property(
        &mut self,
        instance: &Rc<Instance>,
        name: &Token,
    ) -> Result<Value, RuntimeError> {
        if let Some(value) = instance.field(&name.lexeme) {
            return Ok(value);
        }

        match instance.class.find_method(&name.lexeme) {
            Some(method) => self.bound_method(&method, instance, name.span),
            None => Err(RuntimeError::new(
                name.span,
                format!("Undefined property '{}'.", name.lexeme),
            )),
        }
    }

    fn bound_method(
        &mut self,
        method: &Function,
        instance: &Rc<Instance>,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        let bound = method.bind(Rc::clone(instance));
        if bound.is_getter() {
            self.invoke(bound, Vec::new(), span)
        } else {
            Ok(Value::Fn(bound))
        }
    }

    // `super` sits one scope outside the `this` scope of the running method.
    fn super_method(
        &mut self,
        method: &Token,
        resolved: &Resolution,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        let local = resolved
            .get()
            .ok_or_else(|| RuntimeError::internal(span, "'super' was not resolved"))?;
        let this_depth = local
            .depth
            .checked_sub(1)
            .ok_or_else(|| RuntimeError::internal(span, "'super' has no 'this' scope"))?;

        let Value::Class(superclass) = self.local_at(local, span)? else {
            return Err(RuntimeError::internal(span, "'super' is not a class"));
        };
        let this = self.local_at(
            Local {
                depth: this_depth,
                slot: 0,
            },
            span,
        )?;
        let Value::Instance(instance) = this else {
            return Err(RuntimeError::internal(span, "'this' is not an instance"));
        };

        match superclass.find_method(&method.lexeme) {
            Some(found) => self.bound_method(&found, &instance, method.span),
            None => Err(RuntimeError::new(
                method.span,
                format!("Undefined property '{}'.", method.lexeme),
            )),
        }
    }

    pub(crate) fn call_value(
        &mut self,
        callee: Value,
        arguments: Vec<Value>,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        let Some(callable) = callee.as_callable() else {
            return Err(RuntimeError::new(
                span,
                "Can only call functions and classes.",
            ));
        };

        if arguments.len() != callable.arity() {
            return Err(RuntimeError::new(
                span,
                format!(
                    "Expected {} arguments but got {}.",
                    callable.arity(),
                    arguments.len()
                ),
            ));
        }

        self.invoke(callable, arguments, span)
    }

    fn invoke(
        &mut self,
        callable: Rc<dyn Callable>,
        arguments: Vec<Value>,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        if self.call_depth >= self.config.max_call_depth {
            return Err(RuntimeError::StackOverflow { span });
        }

        self.call_depth += 1;
        trace!(depth = self.call_depth, line = span.line, "call");
        let result = callable.call(self, arguments, span);
        self.call_depth -= 1;
        result
    }
}

fn binary(operator: &Token, left: Value, right: Value) -> Result<Value, RuntimeError> {
    let numbers_only = || RuntimeError::new(operator.span, "Operands must be numbers.");

    match (&operator.token_type, left, right) {
        // arithmetic; division by zero follows IEEE 754
        (TokenType::Plus, Value::Num(n1), Value::Num(n2)) => Ok(Value::Num(n1 + n2)),
        (TokenType::Plus, Value::Str(s1), Value::Str(s2)) => {
            let mut s = String::with_capacity(s1.len() + s2.len());
            s.push_str(&s1);
            s.push_str(&s2);
            Ok(Value::Str(Rc::from(s)))
        }
        (TokenType::Plus, _, _) => Err(RuntimeError::new(
            operator.span,
            "Operands must be two numbers or two strings.",
        )),
        (TokenType::Minus, Value::Num(n1), Value::Num(n2)) => Ok(Value::Num(n1 - n2)),
        (TokenType::Star, Value::Num(n1), Value::Num(n2)) => Ok(Value::Num(n1 * n2)),
        (TokenType::Slash, Value::Num(n1), Value::Num(n2)) => Ok(Value::Num(n1 / n2)),

        // comparison
        (TokenType::Greater, Value::Num(n1), Value::Num(n2)) => Ok(Value::Bool(n1 > n2)),
        (TokenType::GreaterEqual, Value::Num(n1), Value::Num(n2)) => Ok(Value::Bool(n1 >= n2)),
        (TokenType::Less, Value::Num(n1), Value::Num(n2)) => Ok(Value::Bool(n1 < n2)),
        (TokenType::LessEqual, Value::Num(n1), Value::Num(n2)) => Ok(Value::Bool(n1 <= n2)),
        (
            TokenType::Minus
            | TokenType::Star
            | TokenType::Slash
            | TokenType::Greater
            | TokenType::GreaterEqual
            | TokenType::Less
            | TokenType::LessEqual,
            _,
            _,
        ) => Err(numbers_only()),

        // equality works across all types
        (TokenType::EqualEqual, v1, v2) => Ok(Value::Bool(v1 == v2)),
        (TokenType::BangEqual, v1, v2) => Ok(Value::Bool(v1 != v2)),

        (op, _, _) => Err(RuntimeError::internal(
            operator.span,
            format!("unknown binary operator {:?}", op),
        )),
    }
}
