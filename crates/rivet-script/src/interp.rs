//! Tree-walking evaluator for the embedded script language.
//!
//! The interpreter owns the variable scope stack; everything that touches
//! native state goes through the `Bridge`. Call targets resolve in this
//! order: a local variable holding a callable wrapper, a script-defined
//! function, a registered native function reached through its dotted
//! namespace path.

use rustc_hash::FxHashMap;

use crate::ast::{BinaryOp, Expr, Program, Stmt, UnaryOp};
use crate::bridge::Bridge;
use crate::error::ScriptError;
use crate::value::ScriptValue;

/// Statement outcome.
enum Flow {
    Normal,
    Return(ScriptValue),
}

/// Script evaluator state: a stack of lexical scopes. The bottom scope is
/// the global scope and survives between protocol calls.
pub(crate) struct Interp {
    scopes: Vec<FxHashMap<String, ScriptValue>>,
}

impl Interp {
    pub(crate) fn new() -> Self {
        Self {
            scopes: vec![FxHashMap::default()],
        }
    }

    /// Discard all script state, leaving an empty global scope.
    pub(crate) fn reset(&mut self) {
        self.scopes = vec![FxHashMap::default()];
    }

    pub(crate) fn define_global(&mut self, name: &str, value: ScriptValue) {
        self.scopes[0].insert(name.to_string(), value);
    }

    pub(crate) fn global(&self, name: &str) -> Option<ScriptValue> {
        self.scopes[0].get(name).cloned()
    }

    pub(crate) fn globals(&self) -> &FxHashMap<String, ScriptValue> {
        &self.scopes[0]
    }

    fn lookup(&self, name: &str) -> Option<ScriptValue> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }

    fn is_defined(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|scope| scope.contains_key(name))
    }

    fn assign_var(&mut self, name: &str, value: ScriptValue) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return;
            }
        }
        // Assigning an undeclared name defines it in the current scope.
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    /// Execute a program's top-level statements. A top-level `return`
    /// yields the program's value.
    pub(crate) fn run_program(
        &mut self,
        bridge: &mut Bridge,
        prog: &Program,
    ) -> Result<ScriptValue, ScriptError> {
        match self.exec_stmts(bridge, prog, &prog.stmts)? {
            Flow::Return(v) => Ok(v),
            Flow::Normal => Ok(ScriptValue::Nil),
        }
    }

    /// Call a script-defined function with positional arguments. Missing
    /// arguments bind nil; excess arguments are ignored.
    pub(crate) fn call_function(
        &mut self,
        bridge: &mut Bridge,
        prog: &Program,
        name: &str,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        let def = prog
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::UnknownFunction(name.to_string()))?;
        let mut scope = FxHashMap::default();
        for (i, param) in def.params.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or(ScriptValue::Nil);
            scope.insert(param.clone(), value);
        }
        self.scopes.push(scope);
        let flow = self.exec_stmts(bridge, prog, &def.body);
        self.scopes.pop();
        Ok(match flow? {
            Flow::Return(v) => v,
            Flow::Normal => ScriptValue::Nil,
        })
    }

    fn exec_stmts(
        &mut self,
        bridge: &mut Bridge,
        prog: &Program,
        stmts: &[Stmt],
    ) -> Result<Flow, ScriptError> {
        for stmt in stmts {
            match self.exec_stmt(bridge, prog, stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(
        &mut self,
        bridge: &mut Bridge,
        prog: &Program,
        stmt: &Stmt,
    ) -> Result<Flow, ScriptError> {
        match stmt {
            Stmt::Let { name, value } => {
                let v = self.eval(bridge, prog, value)?;
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.clone(), v);
                }
                Ok(Flow::Normal)
            }
            Stmt::Assign { target, value } => {
                let v = self.eval(bridge, prog, value)?;
                match target {
                    Expr::Ident(name) => self.assign_var(name, v),
                    Expr::Member { base, name } => {
                        let base_value = self.eval(bridge, prog, base)?;
                        match base_value {
                            ScriptValue::Wrapper(handle) => {
                                bridge.set_member(&handle, name, &v);
                            }
                            _ => log::debug!("assignment to member '{name}' of a non-object"),
                        }
                    }
                    // The parser only produces the two forms above.
                    _ => {}
                }
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval(bridge, prog, expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Return(expr) => {
                let v = match expr {
                    Some(e) => self.eval(bridge, prog, e)?,
                    None => ScriptValue::Nil,
                };
                Ok(Flow::Return(v))
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let branch = if self.eval(bridge, prog, cond)?.truthy() {
                    then_body
                } else {
                    else_body
                };
                self.scopes.push(FxHashMap::default());
                let flow = self.exec_stmts(bridge, prog, branch);
                self.scopes.pop();
                flow
            }
        }
    }

    fn eval(
        &mut self,
        bridge: &mut Bridge,
        prog: &Program,
        expr: &Expr,
    ) -> Result<ScriptValue, ScriptError> {
        match expr {
            Expr::Nil => Ok(ScriptValue::Nil),
            Expr::Bool(b) => Ok(ScriptValue::Bool(*b)),
            Expr::Int(i) => Ok(ScriptValue::Int(*i)),
            Expr::Float(f) => Ok(ScriptValue::Float(*f)),
            Expr::Str(s) => Ok(ScriptValue::Str(s.clone())),
            // Unknown identifiers read as nil, matching the silent-miss
            // resolution policy.
            Expr::Ident(name) => Ok(self.lookup(name).unwrap_or(ScriptValue::Nil)),
            Expr::Member { base, name } => {
                let base_value = self.eval(bridge, prog, base)?;
                match base_value {
                    ScriptValue::Wrapper(handle) => Ok(bridge.resolve_member(&handle, name)),
                    _ => Ok(ScriptValue::Nil),
                }
            }
            Expr::Unary { op, expr } => {
                let v = self.eval(bridge, prog, expr)?;
                match op {
                    UnaryOp::Not => Ok(ScriptValue::Bool(!v.truthy())),
                    UnaryOp::Neg => match v {
                        ScriptValue::Int(i) => Ok(ScriptValue::Int(-i)),
                        ScriptValue::Float(f) => Ok(ScriptValue::Float(-f)),
                        other => Err(ScriptError::Runtime(format!(
                            "cannot negate a {} value",
                            other.type_name()
                        ))),
                    },
                }
            }
            Expr::Binary { op, lhs, rhs } => self.eval_binary(bridge, prog, *op, lhs, rhs),
            Expr::Call { callee, args } => self.eval_call(bridge, prog, callee, args),
        }
    }

    fn eval_binary(
        &mut self,
        bridge: &mut Bridge,
        prog: &Program,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<ScriptValue, ScriptError> {
        // Short-circuit forms first.
        match op {
            BinaryOp::And => {
                let l = self.eval(bridge, prog, lhs)?;
                if !l.truthy() {
                    return Ok(l);
                }
                return self.eval(bridge, prog, rhs);
            }
            BinaryOp::Or => {
                let l = self.eval(bridge, prog, lhs)?;
                if l.truthy() {
                    return Ok(l);
                }
                return self.eval(bridge, prog, rhs);
            }
            _ => {}
        }

        let l = self.eval(bridge, prog, lhs)?;
        let r = self.eval(bridge, prog, rhs)?;
        match op {
            BinaryOp::Eq => Ok(ScriptValue::Bool(l.loose_eq(&r))),
            BinaryOp::Ne => Ok(ScriptValue::Bool(!l.loose_eq(&r))),
            BinaryOp::Add => add_values(l, r),
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                numeric_op(op, l, r)
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare_values(op, l, r),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    fn eval_call(
        &mut self,
        bridge: &mut Bridge,
        prog: &Program,
        callee: &Expr,
        args: &[Expr],
    ) -> Result<ScriptValue, ScriptError> {
        // Syntactic path resolution: `Add(...)`, `game.math.Add(...)`.
        // Only applies when the head is not a script variable.
        if let Some(path) = callee.flatten_path() {
            if !self.is_defined(&path[0]) {
                if path.len() == 1 && prog.functions.contains_key(&path[0]) {
                    let argv = self.eval_args(bridge, prog, args)?;
                    return self.call_function(bridge, prog, &path[0], &argv);
                }
                if let Some(func) = bridge.lookup_global_path(&path) {
                    let argv = self.eval_args(bridge, prog, args)?;
                    return Ok(bridge.call_native(&func, &argv));
                }
                if path.len() == 1 {
                    log::warn!("call to unknown function '{}'", path[0]);
                    return Err(ScriptError::UnknownFunction(path.join(".")));
                }
            }
        }

        let target = self.eval(bridge, prog, callee)?;
        let argv = self.eval_args(bridge, prog, args)?;
        match target {
            ScriptValue::Wrapper(handle) => bridge.call_wrapper(&handle, &argv),
            ScriptValue::Nil => Err(ScriptError::Runtime(
                "attempt to call a nil value".to_string(),
            )),
            other => Err(ScriptError::Runtime(format!(
                "a {} value is not callable",
                other.type_name()
            ))),
        }
    }

    fn eval_args(
        &mut self,
        bridge: &mut Bridge,
        prog: &Program,
        args: &[Expr],
    ) -> Result<Vec<ScriptValue>, ScriptError> {
        args.iter()
            .map(|a| self.eval(bridge, prog, a))
            .collect()
    }
}

fn add_values(l: ScriptValue, r: ScriptValue) -> Result<ScriptValue, ScriptError> {
    use ScriptValue::*;
    match (&l, &r) {
        (Str(_), _) | (_, Str(_)) => Ok(Str(format!("{}{}", l.to_display(), r.to_display()))),
        (Int(a), Int(b)) => Ok(Int(a.wrapping_add(*b))),
        _ => numeric_op(BinaryOp::Add, l, r),
    }
}

fn numeric_op(op: BinaryOp, l: ScriptValue, r: ScriptValue) -> Result<ScriptValue, ScriptError> {
    use ScriptValue::*;
    match (&l, &r) {
        (Int(a), Int(b)) => {
            let (a, b) = (*a, *b);
            match op {
                BinaryOp::Add => Ok(Int(a.wrapping_add(b))),
                BinaryOp::Sub => Ok(Int(a.wrapping_sub(b))),
                BinaryOp::Mul => Ok(Int(a.wrapping_mul(b))),
                BinaryOp::Div => {
                    if b == 0 {
                        Err(ScriptError::Runtime("integer division by zero".to_string()))
                    } else {
                        Ok(Int(a.wrapping_div(b)))
                    }
                }
                BinaryOp::Rem => {
                    if b == 0 {
                        Err(ScriptError::Runtime("integer remainder by zero".to_string()))
                    } else {
                        Ok(Int(a.wrapping_rem(b)))
                    }
                }
                _ => Err(ScriptError::Runtime("invalid numeric operator".to_string())),
            }
        }
        (Int(_) | Float(_), Int(_) | Float(_)) => {
            let (a, b) = (l.as_float(), r.as_float());
            let out = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Rem => a % b,
                _ => return Err(ScriptError::Runtime("invalid numeric operator".to_string())),
            };
            Ok(Float(out))
        }
        _ => Err(ScriptError::Runtime(format!(
            "cannot apply arithmetic to {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn compare_values(op: BinaryOp, l: ScriptValue, r: ScriptValue) -> Result<ScriptValue, ScriptError> {
    use ScriptValue::*;
    let ordering = match (&l, &r) {
        (Str(a), Str(b)) => a.partial_cmp(b),
        (Int(_) | Float(_), Int(_) | Float(_)) => l.as_float().partial_cmp(&r.as_float()),
        _ => {
            return Err(ScriptError::Runtime(format!(
                "cannot compare {} and {}",
                l.type_name(),
                r.type_name()
            )))
        }
    };
    let Some(ordering) = ordering else {
        return Ok(Bool(false));
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => false,
    };
    Ok(Bool(result))
}
