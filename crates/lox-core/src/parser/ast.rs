use crate::scanner::token::Token;
use crate::span::Span;
use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// Where a local variable lives relative to the scope that reads it.
///
/// `depth` counts enclosing environments to walk outwards, `slot` is the
/// index of the binding inside that environment. The resolver fills these
/// in; an expression left unresolved refers to a global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Local {
    pub depth: usize,
    pub slot: usize,
}

pub type Resolution = Cell<Option<Local>>;

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expression(Expr),
    Print(Expr),
    Var {
        name: Token,
        initializer: Option<Expr>,
    },
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
        // set when desugared from `for`; still runs after `continue`
        increment: Option<Expr>,
    },
    Function(Rc<FunctionDecl>),
    Return(Option<Expr>),
    Class {
        name: Token,
        superclass: Option<Expr>,
        methods: Vec<Rc<FunctionDecl>>,
    },
    Break,
    Continue,
}

/// A named function, method, getter or anonymous `fun` expression.
#[derive(Debug)]
pub struct FunctionDecl {
    pub name: Token,
    pub params: Vec<Token>,
    pub body: Vec<Stmt>,
    pub is_getter: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Grouping(Box<Expr>),
    Variable {
        name: Token,
        resolved: Resolution,
    },
    Assign {
        name: Token,
        value: Box<Expr>,
        resolved: Resolution,
    },
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Unary {
        operator: Token,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },
    Get {
        object: Box<Expr>,
        name: Token,
    },
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },
    This {
        resolved: Resolution,
    },
    Super {
        method: Token,
        resolved: Resolution,
    },
    Lambda(Rc<FunctionDecl>),
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Stmt { kind, span }
    }
}

// Dropping field by field recurses once per nesting level and can exhaust the
// native stack on long chains like `0+1+1+...`. Each node instead hands its
// children to a heap work-list, leaving itself a leaf.
enum Detached {
    Expr(Expr),
    Stmt(Stmt),
}

impl Drop for Expr {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        detach_expr(&mut self.kind, &mut pending);
        drain(pending);
    }
}

impl Drop for Stmt {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        detach_stmt(&mut self.kind, &mut pending);
        drain(pending);
    }
}

fn drain(mut pending: Vec<Detached>) {
    while let Some(node) = pending.pop() {
        match node {
            Detached::Expr(mut expr) => detach_expr(&mut expr.kind, &mut pending),
            Detached::Stmt(mut stmt) => detach_stmt(&mut stmt.kind, &mut pending),
        }
    }
}

fn detach_expr(kind: &mut ExprKind, pending: &mut Vec<Detached>) {
    match std::mem::replace(kind, ExprKind::Literal(Literal::Nil)) {
        ExprKind::Literal(_)
        | ExprKind::Variable { .. }
        | ExprKind::This { .. }
        | ExprKind::Super { .. } => {}
        ExprKind::Grouping(inner)
        | ExprKind::Assign { value: inner, .. }
        | ExprKind::Unary { operand: inner, .. }
        | ExprKind::Get { object: inner, .. } => pending.push(Detached::Expr(*inner)),
        ExprKind::Binary { left, right, .. }
        | ExprKind::Logical { left, right, .. }
        | ExprKind::Set {
            object: left,
            value: right,
            ..
        } => {
            pending.push(Detached::Expr(*left));
            pending.push(Detached::Expr(*right));
        }
        ExprKind::Call { callee, arguments } => {
            pending.push(Detached::Expr(*callee));
            pending.extend(arguments.into_iter().map(Detached::Expr));
        }
        ExprKind::Lambda(function) => detach_function(function, pending),
    }
}

fn detach_stmt(kind: &mut StmtKind, pending: &mut Vec<Detached>) {
    match std::mem::replace(kind, StmtKind::Break) {
        StmtKind::Break | StmtKind::Continue => {}
        StmtKind::Expression(expr) | StmtKind::Print(expr) => {
            pending.push(Detached::Expr(expr))
        }
        StmtKind::Var { initializer, .. } | StmtKind::Return(initializer) => {
            pending.extend(initializer.map(Detached::Expr))
        }
        StmtKind::Block(statements) => pending.extend(statements.into_iter().map(Detached::Stmt)),
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            pending.push(Detached::Expr(condition));
            pending.push(Detached::Stmt(*then_branch));
            pending.extend(else_branch.map(|stmt| Detached::Stmt(*stmt)));
        }
        StmtKind::While {
            condition,
            body,
            increment,
        } => {
            pending.push(Detached::Expr(condition));
            pending.push(Detached::Stmt(*body));
            pending.extend(increment.map(Detached::Expr));
        }
        StmtKind::Function(function) => detach_function(function, pending),
        StmtKind::Class {
            superclass,
            methods,
            ..
        } => {
            pending.extend(superclass.map(Detached::Expr));
            for method in methods {
                detach_function(method, pending);
            }
        }
    }
}

// Bodies still shared with a live function value are left to the last owner.
fn detach_function(function: Rc<FunctionDecl>, pending: &mut Vec<Detached>) {
    if let Ok(function) = Rc::try_unwrap(function) {
        pending.extend(function.body.into_iter().map(Detached::Stmt));
    }
}
