//! Abstract syntax tree for the embedded script language.

use std::sync::Arc;

use rustc_hash::FxHashMap;

/// Unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Numeric negation
    Neg,
    /// Logical not
    Not,
}

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Expression node.
#[derive(Debug, Clone)]
pub enum Expr {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    /// Member access: `base.name`
    Member { base: Box<Expr>, name: String },
    /// Call: `callee(args...)`
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Flatten a pure `Ident` / `Member`-of-`Ident` chain into a dotted
    /// path, used for namespace resolution of call targets. Returns None
    /// when the expression is not such a chain.
    pub fn flatten_path(&self) -> Option<Vec<String>> {
        match self {
            Expr::Ident(name) => Some(vec![name.clone()]),
            Expr::Member { base, name } => {
                let mut path = base.flatten_path()?;
                path.push(name.clone());
                Some(path)
            }
            _ => None,
        }
    }
}

/// Statement node.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `let name = expr;`
    Let { name: String, value: Expr },
    /// `target = expr;` where target is an identifier or member access
    Assign { target: Expr, value: Expr },
    /// Expression statement
    Expr(Expr),
    /// `return expr?;`
    Return(Option<Expr>),
    /// `if cond { ... } else { ... }`
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
}

/// A script-defined function.
#[derive(Debug)]
pub struct FnDef {
    /// Function name
    pub name: String,
    /// Parameter names
    pub params: Vec<String>,
    /// Body statements
    pub body: Vec<Stmt>,
}

/// A compiled script: top-level statements plus hoisted function
/// definitions.
#[derive(Debug, Default)]
pub struct Program {
    /// Top-level statements in source order
    pub stmts: Vec<Stmt>,
    /// Function definitions by name
    pub functions: FxHashMap<String, Arc<FnDef>>,
}
