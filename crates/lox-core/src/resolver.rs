use crate::parser::ast::{
    Expr, ExprKind, FunctionDecl, Local, Program, Resolution, Stmt, StmtKind,
};
use crate::scanner::token::Token;
use crate::span::Span;
use crate::stack::ensure_sufficient_stack;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Error)]
#[error("[line {}] Error{location}: {message}", .span.line)]
pub struct ResolutionError {
    pub span: Span,
    pub location: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FunctionKind {
    None,
    Function,
    Method,
    Initializer,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ClassKind {
    None,
    Class,
    Subclass,
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    slot: usize,
    defined: bool,
}

/// Static pass that binds every local variable use to its declaration.
///
/// Each scope hands out slots in declaration order, mirroring the order in
/// which the interpreter pushes values into an environment, so a `(depth,
/// slot)` pair written here is exactly where the value will be at run time.
/// Names that are not found in any local scope are left unresolved and looked
/// up by name among the globals.
pub struct Resolver {
    scopes: Vec<HashMap<String, Binding>>,
    // top-level names: false while the initializer is being resolved
    globals: HashMap<String, bool>,
    function: FunctionKind,
    class: ClassKind,
    loop_depth: usize,
    errors: Vec<ResolutionError>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            globals: HashMap::new(),
            function: FunctionKind::None,
            class: ClassKind::None,
            loop_depth: 0,
            errors: Vec::new(),
        }
    }

    /// Marks `name` as an existing global, such as a native installed by the
    /// host, so a top-level `var name = name;` may read it.
    pub fn define_global(&mut self, name: &str) {
        self.globals.insert(name.to_string(), true);
    }

    pub fn resolve(&mut self, program: &Program) -> Result<(), Vec<ResolutionError>> {
        debug!(statements = program.statements.len(), "resolving");
        for stmt in &program.statements {
            self.resolve_stmt(stmt);
        }

        if self.errors.is_empty() {
            Ok(())
        } else {
            debug!(errors = self.errors.len(), "resolution failed");
            Err(std::mem::take(&mut self.errors))
        }
    }

    fn error(&mut self, span: Span, lexeme: &str, message: &str) {
        self.errors.push(ResolutionError {
            span,
            location: format!(" at '{}'", lexeme),
            message: message.to_string(),
        });
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) {
        let Some(scope) = self.scopes.last_mut() else {
            // redefining a global keeps it readable
            self.globals.entry(name.lexeme.clone()).or_insert(false);
            return;
        };

        if scope.contains_key(&name.lexeme) {
            self.error(
                name.span,
                &name.lexeme,
                "Already a variable with this name in this scope.",
            );
            return;
        }

        let slot = scope.len();
        scope.insert(
            name.lexeme.clone(),
            Binding {
                slot,
                defined: false,
            },
        );
    }

    fn define(&mut self, name: &Token) {
        match self.scopes.last_mut() {
            Some(scope) => {
                if let Some(binding) = scope.get_mut(&name.lexeme) {
                    binding.defined = true;
                }
            }
            None => {
                self.globals.insert(name.lexeme.clone(), true);
            }
        }
    }

    // Binds an implicit name (`this`, `super`) in a fresh scope at slot 0.
    fn begin_implicit_scope(&mut self, name: &str) {
        let mut scope = HashMap::new();
        scope.insert(
            name.to_string(),
            Binding {
                slot: 0,
                defined: true,
            },
        );
        self.scopes.push(scope);
    }

    fn resolve_local(&mut self, name: &str, resolved: &Resolution) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if let Some(binding) = scope.get(name) {
                trace!(name, depth, slot = binding.slot, "resolved local");
                resolved.set(Some(Local {
                    depth,
                    slot: binding.slot,
                }));
                return;
            }
        }
        // not found: global
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        ensure_sufficient_stack(|| self.visit_stmt(stmt))
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(statements) => {
                self.begin_scope();
                for stmt in statements {
                    self.resolve_stmt(stmt);
                }
                self.end_scope();
            }
            StmtKind::Var { name, initializer } => {
                self.declare(name);
                if let Some(init) = initializer {
                    self.resolve_expr(init);
                }
                self.define(name);
            }
            StmtKind::Function(function) => {
                // defined before the body so the function can recurse
                self.declare(&function.name);
                self.define(&function.name);
                self.resolve_function(function, FunctionKind::Function);
            }
            StmtKind::Class {
                name,
                superclass,
                methods,
            } => self.resolve_class(name, superclass.as_ref(), methods),
            StmtKind::Expression(expr) | StmtKind::Print(expr) => self.resolve_expr(expr),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            StmtKind::While {
                condition,
                body,
                increment,
            } => {
                self.resolve_expr(condition);
                self.loop_depth += 1;
                self.resolve_stmt(body);
                self.loop_depth -= 1;
                if let Some(increment) = increment {
                    self.resolve_expr(increment);
                }
            }
            StmtKind::Return(value) => {
                if self.function == FunctionKind::None {
                    self.error(stmt.span, "return", "Can't return from top-level code.");
                }
                if let Some(value) = value {
                    if self.function == FunctionKind::Initializer {
                        self.error(
                            stmt.span,
                            "return",
                            "Can't return a value from an initializer.",
                        );
                    }
                    self.resolve_expr(value);
                }
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    self.error(stmt.span, "break", "Can't use 'break' outside of a loop.");
                }
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    self.error(
                        stmt.span,
                        "continue",
                        "Can't use 'continue' outside of a loop.",
                    );
                }
            }
        }
    }

    fn resolve_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
    ) {
        let enclosing_class = self.class;
        self.class = ClassKind::Class;

        self.declare(name);
        self.define(name);

        if let Some(superclass) = superclass {
            if let ExprKind::Variable { name: super_name, .. } = &superclass.kind {
                if super_name.lexeme == name.lexeme {
                    self.error(
                        super_name.span,
                        &super_name.lexeme,
                        "A class can't inherit from itself.",
                    );
                }
            }
            self.class = ClassKind::Subclass;
            self.resolve_expr(superclass);
            self.begin_implicit_scope("super");
        }

        self.begin_implicit_scope("this");
        for method in methods {
            let kind = if method.name.lexeme == "init" && !method.is_getter {
                FunctionKind::Initializer
            } else {
                FunctionKind::Method
            };
            self.resolve_function(method, kind);
        }
        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }

        self.class = enclosing_class;
    }

    fn resolve_function(&mut self, function: &FunctionDecl, kind: FunctionKind) {
        let enclosing_function = self.function;
        let enclosing_loops = self.loop_depth;
        self.function = kind;
        self.loop_depth = 0;

        // parameters and body share one scope, like the call environment
        self.begin_scope();
        for param in &function.params {
            self.declare(param);
            self.define(param);
        }
        for stmt in &function.body {
            self.resolve_stmt(stmt);
        }
        self.end_scope();

        self.function = enclosing_function;
        self.loop_depth = enclosing_loops;
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        ensure_sufficient_stack(|| self.visit_expr(expr))
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Variable { name, resolved } => {
                let in_own_initializer = match self.scopes.last() {
                    Some(scope) => scope.get(&name.lexeme).is_some_and(|b| !b.defined),
                    None => {
                        self.function == FunctionKind::None
                            && self.globals.get(&name.lexeme) == Some(&false)
                    }
                };
                if in_own_initializer {
                    self.error(
                        name.span,
                        &name.lexeme,
                        "Can't read local variable in its own initializer.",
                    );
                }
                self.resolve_local(&name.lexeme, resolved);
            }
            ExprKind::Assign {
                name,
                value,
                resolved,
            } => {
                self.resolve_expr(value);
                self.resolve_local(&name.lexeme, resolved);
            }
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            ExprKind::Unary { operand, .. } => self.resolve_expr(operand),
            ExprKind::Grouping(inner) => self.resolve_expr(inner),
            ExprKind::Literal(_) => {}
            ExprKind::Call { callee, arguments } => {
                self.resolve_expr(callee);
                for argument in arguments {
                    self.resolve_expr(argument);
                }
            }
            // properties are looked up dynamically
            ExprKind::Get { object, .. } => self.resolve_expr(object),
            ExprKind::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            ExprKind::This { resolved } => {
                if self.class == ClassKind::None {
                    self.error(expr.span, "this", "Can't use 'this' outside of a class.");
                    return;
                }
                self.resolve_local("this", resolved);
            }
            ExprKind::Super { resolved, .. } => {
                match self.class {
                    ClassKind::None => {
                        self.error(expr.span, "super", "Can't use 'super' outside of a class.")
                    }
                    ClassKind::Class => self.error(
                        expr.span,
                        "super",
                        "Can't use 'super' in a class with no superclass.",
                    ),
                    ClassKind::Subclass => {}
                }
                self.resolve_local("super", resolved);
            }
            ExprKind::Lambda(function) => self.resolve_function(function, FunctionKind::Function),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner::Scanner;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Program {
        let tokens = Scanner::new(source).scan_tokens().tokens;
        Parser::new(tokens).parse().expect("source parses")
    }

    fn resolve_errors(source: &str) -> Vec<String> {
        let program = parse(source);
        match Resolver::new().resolve(&program) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.into_iter().map(|e| e.message).collect(),
        }
    }

    // Resolution recorded on the first `print` statement's expression.
    fn first_print_resolution(statements: &[Stmt]) -> Option<Option<Local>> {
        for stmt in statements {
            match &stmt.kind {
                StmtKind::Print(Expr {
                    kind: ExprKind::Variable { resolved, .. },
                    ..
                }) => return Some(resolved.get()),
                StmtKind::Block(inner) => {
                    if let Some(found) = first_print_resolution(inner) {
                        return Some(found);
                    }
                }
                StmtKind::Function(function) => {
                    if let Some(found) = first_print_resolution(&function.body) {
                        return Some(found);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn resolved_print(source: &str) -> Option<Local> {
        let program = parse(source);
        Resolver::new().resolve(&program).expect("resolves");
        first_print_resolution(&program.statements).expect("a print statement")
    }

    #[test]
    fn global_reads_stay_unresolved() {
        assert_eq!(resolved_print("var a = 1; print a;"), None);
    }

    #[test]
    fn block_local_gets_depth_and_slot() {
        assert_eq!(
            resolved_print("{ var a = 1; var b = 2; print b; }"),
            Some(Local { depth: 0, slot: 1 })
        );
    }

    #[test]
    fn enclosing_scope_is_counted() {
        assert_eq!(
            resolved_print("{ var a = 1; { var c = 3; print a; } }"),
            Some(Local { depth: 1, slot: 0 })
        );
    }

    #[test]
    fn parameters_take_the_first_slots() {
        assert_eq!(
            resolved_print("fun f(x, y) { var z; print y; }"),
            Some(Local { depth: 0, slot: 1 })
        );
    }

    #[test]
    fn own_initializer_local() {
        assert_eq!(
            resolve_errors("{ var a = a; }"),
            vec!["Can't read local variable in its own initializer."]
        );
    }

    #[test]
    fn own_initializer_global() {
        assert_eq!(
            resolve_errors("var a = a;"),
            vec!["Can't read local variable in its own initializer."]
        );
    }

    #[test]
    fn global_may_be_redefined_from_itself() {
        assert!(resolve_errors("var a = 1; var a = a + 1;").is_empty());
    }

    #[test]
    fn predefined_global_may_initialize_itself() {
        let program = parse("var clock = clock;");
        let mut resolver = Resolver::new();
        resolver.define_global("clock");
        assert!(resolver.resolve(&program).is_ok());
    }

    #[test]
    fn global_read_inside_function_is_deferred() {
        assert!(resolve_errors("var f = fun () { return f; };").is_empty());
    }

    #[test]
    fn duplicate_local() {
        assert_eq!(
            resolve_errors("{ var a = 1; var a = 2; }"),
            vec!["Already a variable with this name in this scope."]
        );
        assert!(resolve_errors("var a = 1; var a = 2;").is_empty());
    }

    #[test]
    fn return_rules() {
        assert_eq!(
            resolve_errors("return 1;"),
            vec!["Can't return from top-level code."]
        );
        assert_eq!(
            resolve_errors("class A { init() { return 1; } }"),
            vec!["Can't return a value from an initializer."]
        );
        assert!(resolve_errors("class A { init() { return; } }").is_empty());
    }

    #[test]
    fn this_and_super_rules() {
        assert_eq!(
            resolve_errors("print this;"),
            vec!["Can't use 'this' outside of a class."]
        );
        assert_eq!(
            resolve_errors("fun f() { super.g(); }"),
            vec!["Can't use 'super' outside of a class."]
        );
        assert_eq!(
            resolve_errors("class A { f() { super.f(); } }"),
            vec!["Can't use 'super' in a class with no superclass."]
        );
    }

    #[test]
    fn class_cannot_inherit_from_itself() {
        assert_eq!(
            resolve_errors("class A < A {}"),
            vec!["A class can't inherit from itself."]
        );
    }

    #[test]
    fn break_and_continue_need_a_loop() {
        assert_eq!(
            resolve_errors("break; while (true) { fun f() { continue; } }"),
            vec![
                "Can't use 'break' outside of a loop.",
                "Can't use 'continue' outside of a loop.",
            ]
        );
        assert!(resolve_errors("for (;;) { if (true) break; else continue; }").is_empty());
    }

    #[test]
    fn errors_accumulate() {
        assert_eq!(resolve_errors("return; print this;").len(), 2);
    }
}
