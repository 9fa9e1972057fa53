//! Parenthesized prefix rendering of the syntax tree, as shown by
//! `lox --mode ast`.

use crate::parser::ast::{Expr, ExprKind, FunctionDecl, Literal, Program, Stmt, StmtKind};
use crate::stack::ensure_sufficient_stack;

pub fn print_program(program: &Program) -> String {
    program
        .statements
        .iter()
        .map(print_stmt)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn print_stmt(stmt: &Stmt) -> String {
    ensure_sufficient_stack(|| match &stmt.kind {
        StmtKind::Expression(expr) => parenthesize(";", [print_expr(expr)]),
        StmtKind::Print(expr) => parenthesize("print", [print_expr(expr)]),
        StmtKind::Var { name, initializer } => match initializer {
            Some(init) => format!("(var {} = {})", name.lexeme, print_expr(init)),
            None => format!("(var {})", name.lexeme),
        },
        StmtKind::Block(statements) => parenthesize("block", statements.iter().map(print_stmt)),
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => match else_branch {
            Some(else_branch) => parenthesize(
                "if-else",
                [
                    print_expr(condition),
                    print_stmt(then_branch),
                    print_stmt(else_branch),
                ],
            ),
            None => parenthesize("if", [print_expr(condition), print_stmt(then_branch)]),
        },
        StmtKind::While {
            condition,
            body,
            increment,
        } => {
            let mut parts = vec![print_expr(condition), print_stmt(body)];
            parts.extend(increment.iter().map(print_expr));
            parenthesize("while", parts)
        }
        StmtKind::Function(function) => print_function(function),
        StmtKind::Return(value) => parenthesize("return", value.iter().map(print_expr)),
        StmtKind::Class {
            name,
            superclass,
            methods,
        } => {
            let mut head = format!("class {}", name.lexeme);
            if let Some(superclass) = superclass {
                head.push_str(" < ");
                head.push_str(&print_expr(superclass));
            }
            parenthesize(&head, methods.iter().map(|m| print_function(m)))
        }
        StmtKind::Break => "(break)".to_string(),
        StmtKind::Continue => "(continue)".to_string(),
    })
}

pub fn print_expr(expr: &Expr) -> String {
    ensure_sufficient_stack(|| match &expr.kind {
        ExprKind::Literal(literal) => match literal {
            Literal::Nil => "nil".to_string(),
            Literal::Bool(b) => b.to_string(),
            Literal::Number(n) => n.to_string(),
            Literal::String(s) => format!("\"{}\"", s),
        },
        ExprKind::Grouping(inner) => parenthesize("group", [print_expr(inner)]),
        ExprKind::Variable { name, .. } => name.lexeme.clone(),
        ExprKind::Assign { name, value, .. } => {
            parenthesize("=", [name.lexeme.clone(), print_expr(value)])
        }
        ExprKind::Binary {
            left,
            operator,
            right,
        }
        | ExprKind::Logical {
            left,
            operator,
            right,
        } => parenthesize(&operator.lexeme, [print_expr(left), print_expr(right)]),
        ExprKind::Unary { operator, operand } => {
            parenthesize(&operator.lexeme, [print_expr(operand)])
        }
        ExprKind::Call { callee, arguments } => parenthesize(
            "call",
            std::iter::once(print_expr(callee)).chain(arguments.iter().map(print_expr)),
        ),
        ExprKind::Get { object, name } => {
            parenthesize(".", [print_expr(object), name.lexeme.clone()])
        }
        ExprKind::Set {
            object,
            name,
            value,
        } => parenthesize(
            "set",
            [print_expr(object), name.lexeme.clone(), print_expr(value)],
        ),
        ExprKind::This { .. } => "this".to_string(),
        ExprKind::Super { method, .. } => parenthesize("super", [method.lexeme.clone()]),
        ExprKind::Lambda(function) => {
            let params = params_list(function);
            parenthesize(
                "fun",
                std::iter::once(params).chain(function.body.iter().map(print_stmt)),
            )
        }
    })
}

fn print_function(function: &FunctionDecl) -> String {
    let body = function.body.iter().map(print_stmt);
    if function.is_getter {
        parenthesize(&format!("getter {}", function.name.lexeme), body)
    } else {
        let head = format!("fun {} {}", function.name.lexeme, params_list(function));
        parenthesize(&head, body)
    }
}

fn params_list(function: &FunctionDecl) -> String {
    let names: Vec<&str> = function.params.iter().map(|p| p.lexeme.as_str()).collect();
    format!("({})", names.join(" "))
}

fn parenthesize(name: &str, parts: impl IntoIterator<Item = String>) -> String {
    let mut out = format!("({}", name);
    for part in parts {
        out.push(' ');
        out.push_str(&part);
    }
    out.push(')');
    out
}
