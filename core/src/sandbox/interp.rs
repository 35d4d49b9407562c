//! Tree-walking evaluator for the baseline dialect.
//!
//! Execution is cooperative: every statement and expression counts as one
//! interpretation step, and every [`STEP_QUANTUM`] steps the evaluator
//! yields back to the host scheduler. Cancellation happens at those yield
//! points when the caller's deadline future drops this one.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::js::ast::*;

use super::logsink::LogSink;
use super::value::{FnData, HeapObj, Native, ObjectData, Value};

pub(crate) const STEP_QUANTUM: u64 = 100;
pub(crate) const GLOBAL_SCOPE: usize = 0;

/// Maximum depth when stringifying self-referential structures.
const TO_STRING_DEPTH: u32 = 16;

/// Non-local control flow inside the evaluator. `Abort` is not catchable
/// by rule-level try/catch; it carries engine contract failures out.
#[derive(Debug)]
pub(crate) enum Control {
    Return(Value),
    Break,
    Continue,
    Throw(Value),
    Abort(Abort),
}

#[derive(Debug)]
pub(crate) enum Abort {
    ContractViolation(String),
}

pub(crate) type EvalResult<T> = Result<T, Control>;

pub(crate) struct ScopeData {
    pub vars: HashMap<String, Value>,
    pub parent: Option<usize>,
}

pub(crate) struct Interp {
    pub heap: Vec<HeapObj>,
    pub scopes: Vec<ScopeData>,
    pub sink: LogSink,
    pub input_value: Value,
    pub output: Option<bool>,
    pub steps: u64,
    pub call_depth: u32,
    pub max_call_depth: u32,
}

impl Interp {
    pub fn new(sink: LogSink, max_call_depth: u32) -> Self {
        Self {
            heap: Vec::new(),
            scopes: vec![ScopeData {
                vars: HashMap::new(),
                parent: None,
            }],
            sink,
            input_value: Value::Undefined,
            output: None,
            steps: 0,
            call_depth: 0,
            max_call_depth,
        }
    }

    // ---- heap and scope plumbing ----

    pub fn alloc(&mut self, obj: HeapObj) -> usize {
        self.heap.push(obj);
        self.heap.len() - 1
    }

    pub fn push_scope(&mut self, parent: Option<usize>) -> usize {
        self.scopes.push(ScopeData {
            vars: HashMap::new(),
            parent,
        });
        self.scopes.len() - 1
    }

    pub fn lookup(&self, scope: usize, name: &str) -> Option<Value> {
        let mut cur = Some(scope);
        while let Some(idx) = cur {
            if let Some(v) = self.scopes[idx].vars.get(name) {
                return Some(v.clone());
            }
            cur = self.scopes[idx].parent;
        }
        None
    }

    /// Assign to an existing binding; false when the name is undeclared.
    fn set_var(&mut self, scope: usize, name: &str, value: Value) -> bool {
        let mut cur = Some(scope);
        while let Some(idx) = cur {
            if let Some(slot) = self.scopes[idx].vars.get_mut(name) {
                *slot = value;
                return true;
            }
            cur = self.scopes[idx].parent;
        }
        false
    }

    fn declare_if_absent(&mut self, scope: usize, name: &str) {
        if !self.scopes[scope].vars.contains_key(name) {
            self.scopes[scope]
                .vars
                .insert(name.to_string(), Value::Undefined);
        }
    }

    async fn tick(&mut self) {
        self.steps += 1;
        if self.steps % STEP_QUANTUM == 0 {
            tokio::task::yield_now().await;
        }
    }

    // ---- errors ----

    pub fn alloc_error_value(&mut self, name: &str, msg: String) -> Value {
        let idx = self.alloc(HeapObj::Object(ObjectData {
            props: vec![
                ("name".to_string(), Value::Str(name.to_string())),
                ("message".to_string(), Value::Str(msg)),
            ],
            proto: None,
        }));
        Value::Ref(idx)
    }

    fn throw_with(&mut self, name: &'static str, msg: String) -> Control {
        let v = self.alloc_error_value(name, msg);
        Control::Throw(v)
    }

    pub fn throw_type_error(&mut self, msg: impl Into<String>) -> Control {
        self.throw_with("TypeError", msg.into())
    }

    fn throw_reference_error(&mut self, msg: impl Into<String>) -> Control {
        self.throw_with("ReferenceError", msg.into())
    }

    fn throw_range_error(&mut self, msg: impl Into<String>) -> Control {
        self.throw_with("RangeError", msg.into())
    }

    pub fn throw_syntax_error(&mut self, msg: impl Into<String>) -> Control {
        self.throw_with("SyntaxError", msg.into())
    }

    /// Render a thrown value for the host-facing runtime error message.
    pub fn format_thrown(&self, v: &Value) -> String {
        if let Value::Ref(idx) = v {
            if let HeapObj::Object(obj) = &self.heap[*idx] {
                if let (Some(Value::Str(name)), Some(Value::Str(msg))) =
                    (obj.get("name"), obj.get("message"))
                {
                    return if msg.is_empty() {
                        name.clone()
                    } else {
                        format!("{name}: {msg}")
                    };
                }
            }
        }
        self.to_display_string(v)
    }

    // ---- hoisting ----

    fn alloc_closure(
        &mut self,
        name: Option<String>,
        params: Vec<Param>,
        body: Arc<Vec<Stmt>>,
        scope: usize,
    ) -> Value {
        let idx = self.alloc(HeapObj::Function(FnData {
            name,
            params,
            body,
            scope,
            props: Vec::new(),
        }));
        Value::Ref(idx)
    }

    /// Hoist `var` names and function declarations into the activation
    /// scope, without descending into nested functions.
    fn hoist(&mut self, stmts: &[Stmt], scope: usize) {
        for s in stmts {
            self.hoist_stmt(s, scope);
        }
    }

    fn hoist_stmt(&mut self, stmt: &Stmt, scope: usize) {
        match stmt {
            Stmt::VarDecl { decls, .. } => {
                for (pat, _) in decls {
                    if let Pattern::Ident(name) = pat {
                        self.declare_if_absent(scope, name);
                    }
                }
            }
            Stmt::FunctionDecl { name, params, body } => {
                let f = self.alloc_closure(
                    Some(name.clone()),
                    params.clone(),
                    Arc::new(body.clone()),
                    scope,
                );
                self.scopes[scope].vars.insert(name.clone(), f);
            }
            Stmt::If { cons, alt, .. } => {
                self.hoist_stmt(cons, scope);
                if let Some(alt) = alt {
                    self.hoist_stmt(alt, scope);
                }
            }
            Stmt::Block(stmts) => self.hoist(stmts, scope),
            Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => {
                self.hoist_stmt(body, scope)
            }
            Stmt::For { init, body, .. } => {
                if let Some(ForInit::VarDecl { decls, .. }) = init {
                    for (pat, _) in decls {
                        if let Pattern::Ident(name) = pat {
                            self.declare_if_absent(scope, name);
                        }
                    }
                }
                self.hoist_stmt(body, scope);
            }
            Stmt::ForIn {
                decl, name, body, ..
            } => {
                if *decl {
                    self.declare_if_absent(scope, name);
                }
                self.hoist_stmt(body, scope);
            }
            Stmt::Try {
                block,
                catch,
                finally,
            } => {
                self.hoist(block, scope);
                if let Some((_, stmts)) = catch {
                    self.hoist(stmts, scope);
                }
                if let Some(stmts) = finally {
                    self.hoist(stmts, scope);
                }
            }
            Stmt::Switch { cases, .. } => {
                for (_, stmts) in cases {
                    self.hoist(stmts, scope);
                }
            }
            _ => {}
        }
    }

    // ---- program and statement evaluation ----

    pub async fn eval_program(&mut self, program: &[Stmt]) -> EvalResult<()> {
        self.hoist(program, GLOBAL_SCOPE);
        for s in program {
            self.eval_stmt(s, GLOBAL_SCOPE).await?;
        }
        Ok(())
    }

    async fn eval_stmts_in(&mut self, stmts: &[Stmt], scope: usize) -> EvalResult<()> {
        for s in stmts {
            self.eval_stmt(s, scope).await?;
        }
        Ok(())
    }

    fn eval_stmt<'a>(&'a mut self, stmt: &'a Stmt, scope: usize) -> BoxFuture<'a, EvalResult<()>> {
        Box::pin(async move {
            self.tick().await;
            match stmt {
                Stmt::Empty | Stmt::FunctionDecl { .. } => Ok(()),
                Stmt::Break => Err(Control::Break),
                Stmt::Continue => Err(Control::Continue),
                Stmt::VarDecl { decls, .. } => {
                    for (pat, init) in decls {
                        let Pattern::Ident(name) = pat else {
                            unreachable!("evaluator receives lowered declarations")
                        };
                        if let Some(init) = init {
                            let v = self.eval_expr(init, scope).await?;
                            if !self.set_var(scope, name, v.clone()) {
                                self.scopes[scope].vars.insert(name.clone(), v);
                            }
                        }
                    }
                    Ok(())
                }
                Stmt::Expr(e) => {
                    self.eval_expr(e, scope).await?;
                    Ok(())
                }
                Stmt::Return(e) => {
                    let v = match e {
                        Some(e) => self.eval_expr(e, scope).await?,
                        None => Value::Undefined,
                    };
                    Err(Control::Return(v))
                }
                Stmt::Throw(e) => {
                    let v = self.eval_expr(e, scope).await?;
                    Err(Control::Throw(v))
                }
                Stmt::If { test, cons, alt } => {
                    let t = self.eval_expr(test, scope).await?;
                    if self.truthy(&t) {
                        self.eval_stmt(cons, scope).await
                    } else if let Some(alt) = alt {
                        self.eval_stmt(alt, scope).await
                    } else {
                        Ok(())
                    }
                }
                Stmt::Block(stmts) => self.eval_stmts_in(stmts, scope).await,
                Stmt::While { test, body } => {
                    loop {
                        let t = self.eval_expr(test, scope).await?;
                        if !self.truthy(&t) {
                            break;
                        }
                        match self.eval_stmt(body, scope).await {
                            Ok(()) | Err(Control::Continue) => {}
                            Err(Control::Break) => break,
                            Err(c) => return Err(c),
                        }
                    }
                    Ok(())
                }
                Stmt::DoWhile { body, test } => {
                    loop {
                        match self.eval_stmt(body, scope).await {
                            Ok(()) | Err(Control::Continue) => {}
                            Err(Control::Break) => break,
                            Err(c) => return Err(c),
                        }
                        let t = self.eval_expr(test, scope).await?;
                        if !self.truthy(&t) {
                            break;
                        }
                    }
                    Ok(())
                }
                Stmt::For {
                    init,
                    test,
                    update,
                    body,
                } => {
                    match init {
                        Some(ForInit::VarDecl { decls, .. }) => {
                            for (pat, init) in decls {
                                let Pattern::Ident(name) = pat else {
                                    unreachable!("evaluator receives lowered declarations")
                                };
                                if let Some(init) = init {
                                    let v = self.eval_expr(init, scope).await?;
                                    if !self.set_var(scope, name, v.clone()) {
                                        self.scopes[scope].vars.insert(name.clone(), v);
                                    }
                                }
                            }
                        }
                        Some(ForInit::Expr(e)) => {
                            self.eval_expr(e, scope).await?;
                        }
                        None => {}
                    }
                    loop {
                        self.tick().await;
                        if let Some(test) = test {
                            let t = self.eval_expr(test, scope).await?;
                            if !self.truthy(&t) {
                                break;
                            }
                        }
                        match self.eval_stmt(body, scope).await {
                            Ok(()) | Err(Control::Continue) => {}
                            Err(Control::Break) => break,
                            Err(c) => return Err(c),
                        }
                        if let Some(update) = update {
                            self.eval_expr(update, scope).await?;
                        }
                    }
                    Ok(())
                }
                Stmt::ForIn {
                    name, object, body, ..
                } => {
                    let obj = self.eval_expr(object, scope).await?;
                    let keys = self.enum_keys(&obj);
                    for key in keys {
                        let v = Value::Str(key);
                        if !self.set_var(scope, name, v.clone()) {
                            self.scopes[GLOBAL_SCOPE].vars.insert(name.clone(), v);
                        }
                        match self.eval_stmt(body, scope).await {
                            Ok(()) | Err(Control::Continue) => {}
                            Err(Control::Break) => break,
                            Err(c) => return Err(c),
                        }
                    }
                    Ok(())
                }
                Stmt::Switch { disc, cases } => {
                    let d = self.eval_expr(disc, scope).await?;
                    let mut start = None;
                    for (i, (test, _)) in cases.iter().enumerate() {
                        if let Some(test) = test {
                            let t = self.eval_expr(test, scope).await?;
                            if self.strict_eq(&d, &t) {
                                start = Some(i);
                                break;
                            }
                        }
                    }
                    let start = start.or_else(|| {
                        cases.iter().position(|(test, _)| test.is_none())
                    });
                    if let Some(start) = start {
                        for (_, stmts) in &cases[start..] {
                            match self.eval_stmts_in(stmts, scope).await {
                                Ok(()) => {}
                                Err(Control::Break) => return Ok(()),
                                Err(c) => return Err(c),
                            }
                        }
                    }
                    Ok(())
                }
                Stmt::Try {
                    block,
                    catch,
                    finally,
                } => {
                    let mut result = self.eval_stmts_in(block, scope).await;
                    if let (Err(Control::Throw(v)), Some((name, stmts))) = (&result, catch) {
                        let v = v.clone();
                        let catch_scope = self.push_scope(Some(scope));
                        self.scopes[catch_scope].vars.insert(name.clone(), v);
                        result = self.eval_stmts_in(stmts, catch_scope).await;
                    }
                    if let Some(stmts) = finally {
                        // A finally that completes abruptly wins.
                        self.eval_stmts_in(stmts, scope).await?;
                    }
                    result
                }
                Stmt::ForOf { .. } | Stmt::Class(_) => {
                    unreachable!("lowering removes for-of and class statements")
                }
            }
        })
    }

    // ---- expression evaluation ----

    pub(crate) fn eval_expr<'a>(
        &'a mut self,
        expr: &'a Expr,
        scope: usize,
    ) -> BoxFuture<'a, EvalResult<Value>> {
        Box::pin(async move {
            self.tick().await;
            match expr {
                Expr::Num(n) => Ok(Value::Num(*n)),
                Expr::Str(s) => Ok(Value::Str(s.clone())),
                Expr::Bool(b) => Ok(Value::Bool(*b)),
                Expr::Null => Ok(Value::Null),
                Expr::Undefined => Ok(Value::Undefined),
                Expr::This => Ok(self
                    .lookup(scope, "this")
                    .unwrap_or(Value::Undefined)),
                Expr::Ident(name) => match self.lookup(scope, name) {
                    Some(v) => Ok(v),
                    None => Err(self.throw_reference_error(format!("{name} is not defined"))),
                },
                Expr::Array(elems) => {
                    let mut out = Vec::with_capacity(elems.len());
                    for e in elems {
                        out.push(self.eval_expr(e, scope).await?);
                    }
                    Ok(Value::Ref(self.alloc(HeapObj::Array(out))))
                }
                Expr::Object(props) => {
                    let mut data = ObjectData::default();
                    for (key, value) in props {
                        let v = self.eval_expr(value, scope).await?;
                        data.set(&key.as_str(), v);
                    }
                    Ok(Value::Ref(self.alloc(HeapObj::Object(data))))
                }
                Expr::Function(FnExpr { name, params, body }) => Ok(self.alloc_closure(
                    name.clone(),
                    params.clone(),
                    Arc::new(body.clone()),
                    scope,
                )),
                Expr::Seq(exprs) => {
                    let mut last = Value::Undefined;
                    for e in exprs {
                        last = self.eval_expr(e, scope).await?;
                    }
                    Ok(last)
                }
                Expr::Unary { op, expr: operand } => {
                    if let (UnaryOp::Typeof, Expr::Ident(name)) = (op, &**operand) {
                        // typeof never throws on undeclared names.
                        return Ok(match self.lookup(scope, name) {
                            Some(v) => Value::Str(self.type_of(&v).to_string()),
                            None => Value::Str("undefined".to_string()),
                        });
                    }
                    let v = self.eval_expr(operand, scope).await?;
                    Ok(match op {
                        UnaryOp::Not => Value::Bool(!self.truthy(&v)),
                        UnaryOp::Neg => Value::Num(-self.to_number(&v)),
                        UnaryOp::Pos => Value::Num(self.to_number(&v)),
                        UnaryOp::BitNot => Value::Num(!to_int32(self.to_number(&v)) as f64),
                        UnaryOp::Typeof => Value::Str(self.type_of(&v).to_string()),
                        UnaryOp::Void => Value::Undefined,
                    })
                }
                Expr::Update {
                    inc,
                    prefix,
                    target,
                } => {
                    let delta = if *inc { 1.0 } else { -1.0 };
                    match &**target {
                        Expr::Ident(name) => {
                            let Some(old) = self.lookup(scope, name) else {
                                return Err(self
                                    .throw_reference_error(format!("{name} is not defined")));
                            };
                            let old = self.to_number(&old);
                            let new = Value::Num(old + delta);
                            self.set_var(scope, name, new.clone());
                            Ok(if *prefix { new } else { Value::Num(old) })
                        }
                        Expr::Member { obj, prop } => {
                            let recv = self.eval_expr(obj, scope).await?;
                            let key = self.member_key(prop, scope).await?;
                            let old = self.get_property(&recv, &key)?;
                            let old = self.to_number(&old);
                            let new = Value::Num(old + delta);
                            self.set_property(&recv, &key, new.clone())?;
                            Ok(if *prefix { new } else { Value::Num(old) })
                        }
                        _ => unreachable!("parser validates update targets"),
                    }
                }
                Expr::Logical { and, left, right } => {
                    let l = self.eval_expr(left, scope).await?;
                    let take_right = if *and {
                        self.truthy(&l)
                    } else {
                        !self.truthy(&l)
                    };
                    if take_right {
                        self.eval_expr(right, scope).await
                    } else {
                        Ok(l)
                    }
                }
                Expr::Binary { op, left, right } => {
                    let l = self.eval_expr(left, scope).await?;
                    let r = self.eval_expr(right, scope).await?;
                    self.apply_binop(*op, l, r)
                }
                Expr::Cond { test, cons, alt } => {
                    let t = self.eval_expr(test, scope).await?;
                    if self.truthy(&t) {
                        self.eval_expr(cons, scope).await
                    } else {
                        self.eval_expr(alt, scope).await
                    }
                }
                Expr::Assign { op, target, value } => {
                    self.eval_assign(*op, target, value, scope).await
                }
                Expr::Member { obj, prop } => {
                    let recv = self.eval_expr(obj, scope).await?;
                    let key = self.member_key(prop, scope).await?;
                    self.get_property(&recv, &key)
                }
                Expr::Call { callee, args } => match &**callee {
                    Expr::Member { obj, prop } => {
                        let recv = self.eval_expr(obj, scope).await?;
                        let key = self.member_key(prop, scope).await?;
                        let mut argv = Vec::with_capacity(args.len());
                        for a in args {
                            argv.push(self.eval_expr(a, scope).await?);
                        }
                        self.call_method(recv, &key, argv).await
                    }
                    _ => {
                        let f = self.eval_expr(callee, scope).await?;
                        let mut argv = Vec::with_capacity(args.len());
                        for a in args {
                            argv.push(self.eval_expr(a, scope).await?);
                        }
                        let what = describe_callee(callee);
                        self.call_value(f, Value::Undefined, argv, &what).await
                    }
                },
                Expr::New { callee, args } => {
                    let f = self.eval_expr(callee, scope).await?;
                    let mut argv = Vec::with_capacity(args.len());
                    for a in args {
                        argv.push(self.eval_expr(a, scope).await?);
                    }
                    self.construct(f, argv).await
                }
                Expr::Arrow { .. } | Expr::Template(_) => {
                    unreachable!("lowering removes arrows and templates")
                }
            }
        })
    }

    async fn eval_assign(
        &mut self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
        scope: usize,
    ) -> EvalResult<Value> {
        match target {
            Expr::Ident(name) => {
                let v = match op {
                    AssignOp::Assign => self.eval_expr(value, scope).await?,
                    _ => {
                        let Some(old) = self.lookup(scope, name) else {
                            return Err(
                                self.throw_reference_error(format!("{name} is not defined"))
                            );
                        };
                        let rhs = self.eval_expr(value, scope).await?;
                        self.apply_binop(compound_op(op), old, rhs)?
                    }
                };
                if !self.set_var(scope, name, v.clone()) {
                    // Non-strict implicit global.
                    self.scopes[GLOBAL_SCOPE]
                        .vars
                        .insert(name.clone(), v.clone());
                }
                Ok(v)
            }
            Expr::Member { obj, prop } => {
                let recv = self.eval_expr(obj, scope).await?;
                let key = self.member_key(prop, scope).await?;
                let v = match op {
                    AssignOp::Assign => self.eval_expr(value, scope).await?,
                    _ => {
                        let old = self.get_property(&recv, &key)?;
                        let rhs = self.eval_expr(value, scope).await?;
                        self.apply_binop(compound_op(op), old, rhs)?
                    }
                };
                self.set_property(&recv, &key, v.clone())?;
                Ok(v)
            }
            _ => unreachable!("parser validates assignment targets"),
        }
    }

    async fn member_key(&mut self, prop: &MemberProp, scope: usize) -> EvalResult<String> {
        match prop {
            MemberProp::Dot(name) => Ok(name.clone()),
            MemberProp::Index(e) => {
                let v = self.eval_expr(e, scope).await?;
                Ok(self.to_display_string(&v))
            }
        }
    }

    // ---- calls ----

    pub(crate) async fn call_value(
        &mut self,
        f: Value,
        this: Value,
        args: Vec<Value>,
        what: &str,
    ) -> EvalResult<Value> {
        let callee = match f {
            Value::Ref(idx) => match &self.heap[idx] {
                HeapObj::Function(_) => Callee::Func(idx),
                HeapObj::Native(n) => Callee::Native(*n),
                _ => Callee::NotCallable,
            },
            _ => Callee::NotCallable,
        };
        match callee {
            Callee::Func(idx) => self.call_function(idx, this, args).await,
            Callee::Native(n) => self.call_native(n, args),
            Callee::NotCallable => {
                Err(self.throw_type_error(format!("{what} is not a function")))
            }
        }
    }

    pub(crate) fn call_function<'a>(
        &'a mut self,
        idx: usize,
        this: Value,
        args: Vec<Value>,
    ) -> BoxFuture<'a, EvalResult<Value>> {
        Box::pin(async move {
            if self.call_depth >= self.max_call_depth {
                return Err(self.throw_range_error("Maximum call stack size exceeded"));
            }
            let (params, body, closure) = match &self.heap[idx] {
                HeapObj::Function(f) => (f.params.clone(), f.body.clone(), f.scope),
                _ => return Err(self.throw_type_error("value is not a function")),
            };
            let scope = self.push_scope(Some(closure));
            self.scopes[scope].vars.insert("this".to_string(), this);
            for (i, p) in params.iter().enumerate() {
                let v = args.get(i).cloned().unwrap_or(Value::Undefined);
                self.scopes[scope].vars.insert(p.name().to_string(), v);
            }
            self.call_depth += 1;
            self.hoist(&body, scope);
            let mut result = Ok(Value::Undefined);
            for s in body.iter() {
                match self.eval_stmt(s, scope).await {
                    Ok(()) => {}
                    Err(Control::Return(v)) => {
                        result = Ok(v);
                        break;
                    }
                    Err(c) => {
                        result = Err(c);
                        break;
                    }
                }
            }
            self.call_depth -= 1;
            result
        })
    }

    async fn construct(&mut self, f: Value, args: Vec<Value>) -> EvalResult<Value> {
        let Value::Ref(idx) = f else {
            return Err(self.throw_type_error("value is not a constructor"));
        };
        let kind = match &self.heap[idx] {
            HeapObj::Native(Native::ErrorCtor(name)) => Callee::Native(Native::ErrorCtor(*name)),
            HeapObj::Function(_) => Callee::Func(idx),
            _ => Callee::NotCallable,
        };
        match kind {
            Callee::Native(Native::ErrorCtor(name)) => {
                let msg = match args.first() {
                    Some(v) => self.to_display_string(v),
                    None => String::new(),
                };
                Ok(self.alloc_error_value(name, msg))
            }
            Callee::Func(idx) => {
                let proto = match self.get_property(&f, "prototype")? {
                    Value::Ref(p) => Some(p),
                    _ => None,
                };
                let obj = self.alloc(HeapObj::Object(ObjectData {
                    props: Vec::new(),
                    proto,
                }));
                let r = self.call_function(idx, Value::Ref(obj), args).await?;
                Ok(match r {
                    Value::Ref(_) => r,
                    _ => Value::Ref(obj),
                })
            }
            _ => Err(self.throw_type_error("value is not a constructor")),
        }
    }

    // ---- properties ----

    pub(crate) fn get_property(&mut self, recv: &Value, key: &str) -> EvalResult<Value> {
        match recv {
            Value::Undefined | Value::Null => {
                let kind = if matches!(recv, Value::Null) {
                    "null"
                } else {
                    "undefined"
                };
                Err(self.throw_type_error(format!("Cannot read property '{key}' of {kind}")))
            }
            Value::Str(s) => {
                if key == "length" {
                    return Ok(Value::Num(s.chars().count() as f64));
                }
                if let Ok(i) = key.parse::<usize>() {
                    return Ok(match s.chars().nth(i) {
                        Some(c) => Value::Str(c.to_string()),
                        None => Value::Undefined,
                    });
                }
                Ok(Value::Undefined)
            }
            Value::Num(_) | Value::Bool(_) => Ok(Value::Undefined),
            Value::Ref(idx) => {
                let idx = *idx;
                match &self.heap[idx] {
                    HeapObj::Array(elems) => {
                        if key == "length" {
                            return Ok(Value::Num(elems.len() as f64));
                        }
                        if let Ok(i) = key.parse::<usize>() {
                            return Ok(elems.get(i).cloned().unwrap_or(Value::Undefined));
                        }
                        Ok(Value::Undefined)
                    }
                    HeapObj::Object(_) => {
                        let mut cur = Some(idx);
                        while let Some(i) = cur {
                            let HeapObj::Object(obj) = &self.heap[i] else {
                                break;
                            };
                            if let Some(v) = obj.get(key) {
                                return Ok(v.clone());
                            }
                            cur = obj.proto;
                        }
                        Ok(Value::Undefined)
                    }
                    HeapObj::Function(f) => {
                        if let Some((_, v)) = f.props.iter().find(|(k, _)| k == key) {
                            return Ok(v.clone());
                        }
                        if key == "prototype" {
                            // Created on first access so `new` has something
                            // to link instances to.
                            let proto =
                                self.alloc(HeapObj::Object(ObjectData::default()));
                            let HeapObj::Function(f) = &mut self.heap[idx] else {
                                unreachable!()
                            };
                            f.props
                                .push(("prototype".to_string(), Value::Ref(proto)));
                            return Ok(Value::Ref(proto));
                        }
                        Ok(Value::Undefined)
                    }
                    HeapObj::Native(_) => Ok(Value::Undefined),
                }
            }
        }
    }

    pub(crate) fn set_property(
        &mut self,
        recv: &Value,
        key: &str,
        value: Value,
    ) -> EvalResult<()> {
        match recv {
            Value::Undefined | Value::Null => {
                Err(self
                    .throw_type_error(format!("Cannot set property '{key}' of undefined")))
            }
            Value::Ref(idx) => {
                let idx = *idx;
                match &mut self.heap[idx] {
                    HeapObj::Array(elems) => {
                        if key == "length" {
                            let n = value_as_len(&value);
                            elems.resize(n, Value::Undefined);
                        } else if let Ok(i) = key.parse::<usize>() {
                            if i >= elems.len() {
                                elems.resize(i + 1, Value::Undefined);
                            }
                            elems[i] = value;
                        }
                        Ok(())
                    }
                    HeapObj::Object(obj) => {
                        obj.set(key, value);
                        Ok(())
                    }
                    HeapObj::Function(f) => {
                        if let Some(slot) = f.props.iter_mut().find(|(k, _)| k == key) {
                            slot.1 = value;
                        } else {
                            f.props.push((key.to_string(), value));
                        }
                        Ok(())
                    }
                    HeapObj::Native(_) => Ok(()),
                }
            }
            // Assignments to primitive properties are silently dropped.
            _ => Ok(()),
        }
    }

    /// Enumerable keys for for-in, walking the prototype chain the way
    /// assigned (enumerable) properties behave.
    fn enum_keys(&self, v: &Value) -> Vec<String> {
        match v {
            Value::Str(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
            Value::Ref(idx) => match &self.heap[*idx] {
                HeapObj::Array(elems) => (0..elems.len()).map(|i| i.to_string()).collect(),
                HeapObj::Object(_) => {
                    let mut keys = Vec::new();
                    let mut cur = Some(*idx);
                    while let Some(i) = cur {
                        let HeapObj::Object(obj) = &self.heap[i] else {
                            break;
                        };
                        for (k, _) in &obj.props {
                            if !keys.contains(k) {
                                keys.push(k.clone());
                            }
                        }
                        cur = obj.proto;
                    }
                    keys
                }
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Own enumerable keys only (`Object.keys`).
    pub(crate) fn own_keys(&self, v: &Value) -> Vec<String> {
        match v {
            Value::Ref(idx) => match &self.heap[*idx] {
                HeapObj::Array(elems) => (0..elems.len()).map(|i| i.to_string()).collect(),
                HeapObj::Object(obj) => obj.props.iter().map(|(k, _)| k.clone()).collect(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    // ---- coercions and operators ----

    pub(crate) fn type_of(&self, v: &Value) -> &'static str {
        match v {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Ref(idx) => match self.heap[*idx] {
                HeapObj::Function(_) | HeapObj::Native(_) => "function",
                _ => "object",
            },
        }
    }

    pub(crate) fn truthy(&self, v: &Value) -> bool {
        match v {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Ref(_) => true,
        }
    }

    pub(crate) fn to_number(&self, v: &Value) -> f64 {
        match v {
            Value::Num(n) => *n,
            Value::Bool(true) => 1.0,
            Value::Bool(false) | Value::Null => 0.0,
            Value::Undefined => f64::NAN,
            Value::Str(s) => str_to_number(s),
            Value::Ref(_) => str_to_number(&self.to_display_string(v)),
        }
    }

    /// ToString, with a depth bound against self-referential structures.
    pub(crate) fn to_display_string(&self, v: &Value) -> String {
        self.display_with_depth(v, 0)
    }

    fn display_with_depth(&self, v: &Value, depth: u32) -> String {
        if depth > TO_STRING_DEPTH {
            return String::new();
        }
        match v {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => crate::js::format_number(*n),
            Value::Str(s) => s.clone(),
            Value::Ref(idx) => match &self.heap[*idx] {
                HeapObj::Array(elems) => elems
                    .iter()
                    .map(|e| match e {
                        Value::Undefined | Value::Null => String::new(),
                        other => self.display_with_depth(other, depth + 1),
                    })
                    .collect::<Vec<_>>()
                    .join(","),
                HeapObj::Object(_) => "[object Object]".to_string(),
                HeapObj::Function(f) => match &f.name {
                    Some(n) => format!("function {n}() {{ ... }}"),
                    None => "function () { ... }".to_string(),
                },
                HeapObj::Native(_) => "function () { [native code] }".to_string(),
            },
        }
    }

    pub(crate) fn strict_eq(&self, l: &Value, r: &Value) -> bool {
        match (l, r) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            _ => false,
        }
    }

    fn loose_eq(&self, l: &Value, r: &Value) -> bool {
        match (l, r) {
            (Value::Null | Value::Undefined, Value::Null | Value::Undefined) => true,
            (Value::Num(_), Value::Num(_))
            | (Value::Str(_), Value::Str(_))
            | (Value::Bool(_), Value::Bool(_))
            | (Value::Ref(_), Value::Ref(_)) => self.strict_eq(l, r),
            (Value::Num(a), Value::Str(_)) => *a == self.to_number(r),
            (Value::Str(_), Value::Num(b)) => self.to_number(l) == *b,
            (Value::Bool(_), _) => self.loose_eq(&Value::Num(self.to_number(l)), r),
            (_, Value::Bool(_)) => self.loose_eq(l, &Value::Num(self.to_number(r))),
            (Value::Ref(_), Value::Num(_) | Value::Str(_)) => {
                self.loose_eq(&Value::Str(self.to_display_string(l)), r)
            }
            (Value::Num(_) | Value::Str(_), Value::Ref(_)) => {
                self.loose_eq(l, &Value::Str(self.to_display_string(r)))
            }
            _ => false,
        }
    }

    pub(crate) fn apply_binop(&mut self, op: BinOp, l: Value, r: Value) -> EvalResult<Value> {
        Ok(match op {
            BinOp::Add => {
                // String wins: if either side stringifies, concatenate.
                if matches!(l, Value::Str(_) | Value::Ref(_))
                    || matches!(r, Value::Str(_) | Value::Ref(_))
                {
                    Value::Str(format!(
                        "{}{}",
                        self.to_display_string(&l),
                        self.to_display_string(&r)
                    ))
                } else {
                    Value::Num(self.to_number(&l) + self.to_number(&r))
                }
            }
            BinOp::Sub => Value::Num(self.to_number(&l) - self.to_number(&r)),
            BinOp::Mul => Value::Num(self.to_number(&l) * self.to_number(&r)),
            BinOp::Div => Value::Num(self.to_number(&l) / self.to_number(&r)),
            BinOp::Rem => Value::Num(self.to_number(&l) % self.to_number(&r)),
            BinOp::Pow => Value::Num(self.to_number(&l).powf(self.to_number(&r))),
            BinOp::Eq => Value::Bool(self.loose_eq(&l, &r)),
            BinOp::NotEq => Value::Bool(!self.loose_eq(&l, &r)),
            BinOp::StrictEq => Value::Bool(self.strict_eq(&l, &r)),
            BinOp::StrictNotEq => Value::Bool(!self.strict_eq(&l, &r)),
            BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq => {
                self.relational(op, &l, &r)
            }
            BinOp::BitAnd => {
                Value::Num((to_int32(self.to_number(&l)) & to_int32(self.to_number(&r))) as f64)
            }
            BinOp::BitOr => {
                Value::Num((to_int32(self.to_number(&l)) | to_int32(self.to_number(&r))) as f64)
            }
            BinOp::BitXor => {
                Value::Num((to_int32(self.to_number(&l)) ^ to_int32(self.to_number(&r))) as f64)
            }
            BinOp::Shl => Value::Num(
                (to_int32(self.to_number(&l)) << (to_uint32(self.to_number(&r)) & 31)) as f64,
            ),
            BinOp::Shr => Value::Num(
                (to_int32(self.to_number(&l)) >> (to_uint32(self.to_number(&r)) & 31)) as f64,
            ),
            BinOp::UShr => Value::Num(
                (to_uint32(self.to_number(&l)) >> (to_uint32(self.to_number(&r)) & 31)) as f64,
            ),
            BinOp::In => {
                let key = self.to_display_string(&l);
                match &r {
                    Value::Ref(_) => {
                        let own = self.enum_keys(&r).contains(&key)
                            || key == "length" && self.is_indexable(&r);
                        Value::Bool(own)
                    }
                    _ => {
                        return Err(self.throw_type_error(
                            "Cannot use 'in' operator on a non-object",
                        ))
                    }
                }
            }
            BinOp::Instanceof => {
                let Value::Ref(fidx) = r else {
                    return Err(
                        self.throw_type_error("Right-hand side of 'instanceof' is not callable")
                    );
                };
                if !matches!(self.heap[fidx], HeapObj::Function(_)) {
                    return Err(
                        self.throw_type_error("Right-hand side of 'instanceof' is not callable")
                    );
                }
                let proto = match self.get_property(&Value::Ref(fidx), "prototype")? {
                    Value::Ref(p) => p,
                    _ => return Ok(Value::Bool(false)),
                };
                let mut cur = match l {
                    Value::Ref(i) => match &self.heap[i] {
                        HeapObj::Object(o) => o.proto,
                        _ => None,
                    },
                    _ => None,
                };
                let mut found = false;
                while let Some(i) = cur {
                    if i == proto {
                        found = true;
                        break;
                    }
                    cur = match &self.heap[i] {
                        HeapObj::Object(o) => o.proto,
                        _ => None,
                    };
                }
                Value::Bool(found)
            }
        })
    }

    fn is_indexable(&self, v: &Value) -> bool {
        matches!(v, Value::Ref(idx) if matches!(self.heap[*idx], HeapObj::Array(_)))
    }

    fn relational(&self, op: BinOp, l: &Value, r: &Value) -> Value {
        if let (Value::Str(a), Value::Str(b)) = (l, r) {
            return Value::Bool(match op {
                BinOp::Lt => a < b,
                BinOp::Gt => a > b,
                BinOp::LtEq => a <= b,
                BinOp::GtEq => a >= b,
                _ => unreachable!(),
            });
        }
        let a = self.to_number(l);
        let b = self.to_number(r);
        if a.is_nan() || b.is_nan() {
            return Value::Bool(false);
        }
        Value::Bool(match op {
            BinOp::Lt => a < b,
            BinOp::Gt => a > b,
            BinOp::LtEq => a <= b,
            BinOp::GtEq => a >= b,
            _ => unreachable!(),
        })
    }
}

/// Pre-read callee shape so heap borrows end before the call dispatch.
enum Callee {
    Func(usize),
    Native(Native),
    NotCallable,
}

fn compound_op(op: AssignOp) -> BinOp {
    match op {
        AssignOp::Add => BinOp::Add,
        AssignOp::Sub => BinOp::Sub,
        AssignOp::Mul => BinOp::Mul,
        AssignOp::Div => BinOp::Div,
        AssignOp::Rem => BinOp::Rem,
        AssignOp::Assign => unreachable!("plain assignment is handled separately"),
    }
}

fn describe_callee(e: &Expr) -> String {
    match e {
        Expr::Ident(name) => name.clone(),
        _ => "expression".to_string(),
    }
}

pub(crate) fn str_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return match u64::from_str_radix(hex, 16) {
            Ok(n) => n as f64,
            Err(_) => f64::NAN,
        };
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

pub(crate) fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let m = n.trunc() % 4294967296.0;
    let m = if m < 0.0 { m + 4294967296.0 } else { m };
    m as u32
}

pub(crate) fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

fn value_as_len(v: &Value) -> usize {
    match v {
        Value::Num(n) if n.is_finite() && *n >= 0.0 => *n as usize,
        _ => 0,
    }
}
