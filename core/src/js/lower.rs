//! Desugar the parsed AST to the core ES5 node set.
//!
//! After this pass no `Arrow`, `Template`, `Class`, `ForOf`, `Let`/`Const`,
//! `Pow`, default-parameter, or destructuring nodes remain; the emitter and
//! the evaluator only ever deal with the core subset.

use super::ast::*;

pub(crate) fn lower(stmts: Vec<Stmt>) -> Vec<Stmt> {
    Lowerer { next_tmp: 0 }.lower_stmts(stmts)
}

struct Lowerer {
    next_tmp: u32,
}

impl Lowerer {
    fn tmp(&mut self, prefix: &str) -> String {
        let n = self.next_tmp;
        self.next_tmp += 1;
        format!("__{prefix}{n}")
    }

    fn lower_stmts(&mut self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        let mut out = Vec::with_capacity(stmts.len());
        for s in stmts {
            out.extend(self.lower_stmt(s));
        }
        out
    }

    fn lower_block(&mut self, stmt: Stmt) -> Box<Stmt> {
        let lowered = self.lower_stmt(stmt);
        if lowered.len() == 1 {
            Box::new(lowered.into_iter().next().expect("one statement"))
        } else {
            Box::new(Stmt::Block(lowered))
        }
    }

    fn lower_stmt(&mut self, stmt: Stmt) -> Vec<Stmt> {
        match stmt {
            Stmt::VarDecl { kind: _, decls } => self.lower_var_decls(decls),
            Stmt::FunctionDecl { name, params, body } => {
                let (params, body) = self.lower_function(params, body);
                vec![Stmt::FunctionDecl { name, params, body }]
            }
            Stmt::Class(decl) => self.lower_class(decl),
            Stmt::Return(e) => vec![Stmt::Return(e.map(|e| self.lower_expr(e)))],
            Stmt::If { test, cons, alt } => vec![Stmt::If {
                test: self.lower_expr(test),
                cons: self.lower_block(*cons),
                alt: alt.map(|a| self.lower_block(*a)),
            }],
            Stmt::Block(stmts) => vec![Stmt::Block(self.lower_stmts(stmts))],
            Stmt::While { test, body } => vec![Stmt::While {
                test: self.lower_expr(test),
                body: self.lower_block(*body),
            }],
            Stmt::DoWhile { body, test } => vec![Stmt::DoWhile {
                body: self.lower_block(*body),
                test: self.lower_expr(test),
            }],
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.lower_for(init, test, update, *body),
            Stmt::ForIn {
                decl,
                name,
                object,
                body,
            } => vec![Stmt::ForIn {
                decl,
                name,
                object: self.lower_expr(object),
                body: self.lower_block(*body),
            }],
            Stmt::ForOf {
                name,
                iterable,
                body,
            } => self.lower_for_of(name, iterable, *body),
            Stmt::Break => vec![Stmt::Break],
            Stmt::Continue => vec![Stmt::Continue],
            Stmt::Throw(e) => vec![Stmt::Throw(self.lower_expr(e))],
            Stmt::Try {
                block,
                catch,
                finally,
            } => vec![Stmt::Try {
                block: self.lower_stmts(block),
                catch: catch.map(|(name, stmts)| (name, self.lower_stmts(stmts))),
                finally: finally.map(|stmts| self.lower_stmts(stmts)),
            }],
            Stmt::Switch { disc, cases } => vec![Stmt::Switch {
                disc: self.lower_expr(disc),
                cases: cases
                    .into_iter()
                    .map(|(test, stmts)| {
                        (test.map(|t| self.lower_expr(t)), self.lower_stmts(stmts))
                    })
                    .collect(),
            }],
            Stmt::Expr(e) => vec![Stmt::Expr(self.lower_expr(e))],
            Stmt::Empty => vec![Stmt::Empty],
        }
    }

    /// Expand declarators; destructuring patterns become a temporary binding
    /// plus one plain `var` per destructured name.
    fn lower_var_decls(&mut self, decls: Vec<(Pattern, Option<Expr>)>) -> Vec<Stmt> {
        let mut out = Vec::new();
        for (pat, init) in decls {
            let init = init.map(|e| self.lower_expr(e));
            match pat {
                Pattern::Ident(name) => out.push(Stmt::VarDecl {
                    kind: DeclKind::Var,
                    decls: vec![(Pattern::Ident(name), init)],
                }),
                pat => {
                    let t = self.tmp("dst");
                    out.push(Stmt::VarDecl {
                        kind: DeclKind::Var,
                        decls: vec![(Pattern::Ident(t.clone()), init)],
                    });
                    out.extend(self.destructure_into_vars(&t, &pat));
                }
            }
        }
        out
    }

    fn destructure_into_vars(&mut self, source: &str, pat: &Pattern) -> Vec<Stmt> {
        let mut out = Vec::new();
        match pat {
            Pattern::Ident(_) => unreachable!("simple patterns are not expanded"),
            Pattern::Object(props) => {
                for p in props {
                    let read = Expr::Member {
                        obj: Box::new(Expr::Ident(source.to_string())),
                        prop: MemberProp::Dot(p.key.clone()),
                    };
                    let value = self.with_default(read, p.default.clone());
                    out.push(Stmt::VarDecl {
                        kind: DeclKind::Var,
                        decls: vec![(Pattern::Ident(p.binding.clone()), Some(value))],
                    });
                }
            }
            Pattern::Array(elems) => {
                for (i, elem) in elems.iter().enumerate() {
                    let Some(elem) = elem else { continue };
                    let read = Expr::Member {
                        obj: Box::new(Expr::Ident(source.to_string())),
                        prop: MemberProp::Index(Box::new(Expr::Num(i as f64))),
                    };
                    let value = self.with_default(read, elem.default.clone());
                    out.push(Stmt::VarDecl {
                        kind: DeclKind::Var,
                        decls: vec![(Pattern::Ident(elem.binding.clone()), Some(value))],
                    });
                }
            }
        }
        out
    }

    /// `read === undefined ? default : read`
    fn with_default(&mut self, read: Expr, default: Option<Expr>) -> Expr {
        match default {
            None => read,
            Some(d) => {
                let d = self.lower_expr(d);
                Expr::Cond {
                    test: Box::new(Expr::Binary {
                        op: BinOp::StrictEq,
                        left: Box::new(read.clone()),
                        right: Box::new(Expr::Undefined),
                    }),
                    cons: Box::new(d),
                    alt: Box::new(read),
                }
            }
        }
    }

    /// Reduce every parameter to a plain identifier, moving defaults and
    /// destructuring into a body prologue.
    fn lower_function(&mut self, params: Vec<Param>, body: Vec<Stmt>) -> (Vec<Param>, Vec<Stmt>) {
        let mut simple = Vec::with_capacity(params.len());
        let mut prologue = Vec::new();
        for param in params {
            match param.pat {
                Pattern::Ident(name) => {
                    if let Some(d) = param.default {
                        let d = self.lower_expr(d);
                        prologue.push(Stmt::If {
                            test: Expr::Binary {
                                op: BinOp::StrictEq,
                                left: Box::new(Expr::Ident(name.clone())),
                                right: Box::new(Expr::Undefined),
                            },
                            cons: Box::new(Stmt::Expr(Expr::Assign {
                                op: AssignOp::Assign,
                                target: Box::new(Expr::Ident(name.clone())),
                                value: Box::new(d),
                            })),
                            alt: None,
                        });
                    }
                    simple.push(Param::ident(name));
                }
                pat => {
                    let t = self.tmp("arg");
                    prologue.extend(self.destructure_into_vars(&t, &pat));
                    simple.push(Param::ident(t));
                }
            }
        }
        let mut out_body = prologue;
        out_body.extend(self.lower_stmts(body));
        (simple, out_body)
    }

    fn lower_class(&mut self, decl: ClassDecl) -> Vec<Stmt> {
        let ClassDecl {
            name,
            ctor,
            methods,
        } = decl;
        let (ctor_params, ctor_body) = ctor.unwrap_or_default();
        let (params, body) = self.lower_function(ctor_params, ctor_body);
        let mut out = vec![Stmt::FunctionDecl {
            name: name.clone(),
            params,
            body,
        }];
        for m in methods {
            let (params, body) = self.lower_function(m.params, m.body);
            let func = Expr::Function(FnExpr {
                name: None,
                params,
                body,
            });
            let target = if m.is_static {
                Expr::Member {
                    obj: Box::new(Expr::Ident(name.clone())),
                    prop: MemberProp::Dot(m.name),
                }
            } else {
                Expr::Member {
                    obj: Box::new(Expr::Member {
                        obj: Box::new(Expr::Ident(name.clone())),
                        prop: MemberProp::Dot("prototype".to_string()),
                    }),
                    prop: MemberProp::Dot(m.name),
                }
            };
            out.push(Stmt::Expr(Expr::Assign {
                op: AssignOp::Assign,
                target: Box::new(target),
                value: Box::new(func),
            }));
        }
        out
    }

    fn lower_for(
        &mut self,
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Stmt,
    ) -> Vec<Stmt> {
        let mut out = Vec::new();
        let init = match init {
            None => None,
            Some(ForInit::Expr(e)) => Some(ForInit::Expr(self.lower_expr(e))),
            Some(ForInit::VarDecl { kind: _, decls }) => {
                let simple = decls
                    .iter()
                    .all(|(pat, _)| matches!(pat, Pattern::Ident(_)));
                if simple {
                    let decls = decls
                        .into_iter()
                        .map(|(pat, init)| (pat, init.map(|e| self.lower_expr(e))))
                        .collect();
                    Some(ForInit::VarDecl {
                        kind: DeclKind::Var,
                        decls,
                    })
                } else {
                    // Hoist destructuring inits ahead of the loop; `var`
                    // scoping is function-level so the meaning is unchanged.
                    out.extend(self.lower_var_decls(decls));
                    None
                }
            }
        };
        out.push(Stmt::For {
            init,
            test: test.map(|e| self.lower_expr(e)),
            update: update.map(|e| self.lower_expr(e)),
            body: self.lower_block(body),
        });
        out
    }

    /// `for (var v of xs) body` → index loop over a captured array.
    fn lower_for_of(&mut self, name: String, iterable: Expr, body: Stmt) -> Vec<Stmt> {
        let arr = self.tmp("iter");
        let idx = self.tmp("i");
        let iterable = self.lower_expr(iterable);

        let mut loop_body = vec![Stmt::VarDecl {
            kind: DeclKind::Var,
            decls: vec![(
                Pattern::Ident(name),
                Some(Expr::Member {
                    obj: Box::new(Expr::Ident(arr.clone())),
                    prop: MemberProp::Index(Box::new(Expr::Ident(idx.clone()))),
                }),
            )],
        }];
        match self.lower_stmt(body) {
            stmts if stmts.len() == 1 && matches!(stmts[0], Stmt::Block(_)) => {
                let Some(Stmt::Block(inner)) = stmts.into_iter().next() else {
                    unreachable!()
                };
                loop_body.extend(inner);
            }
            stmts => loop_body.extend(stmts),
        }

        vec![
            Stmt::VarDecl {
                kind: DeclKind::Var,
                decls: vec![(Pattern::Ident(arr.clone()), Some(iterable))],
            },
            Stmt::For {
                init: Some(ForInit::VarDecl {
                    kind: DeclKind::Var,
                    decls: vec![(Pattern::Ident(idx.clone()), Some(Expr::Num(0.0)))],
                }),
                test: Some(Expr::Binary {
                    op: BinOp::Lt,
                    left: Box::new(Expr::Ident(idx.clone())),
                    right: Box::new(Expr::Member {
                        obj: Box::new(Expr::Ident(arr)),
                        prop: MemberProp::Dot("length".to_string()),
                    }),
                }),
                update: Some(Expr::Update {
                    inc: true,
                    prefix: false,
                    target: Box::new(Expr::Ident(idx)),
                }),
                body: Box::new(Stmt::Block(loop_body)),
            },
        ]
    }

    fn lower_expr(&mut self, expr: Expr) -> Expr {
        match expr {
            Expr::Arrow { params, body } => {
                let (params, body) = self.lower_function(params, body);
                Expr::Function(FnExpr {
                    name: None,
                    params,
                    body,
                })
            }
            Expr::Function(FnExpr { name, params, body }) => {
                let (params, body) = self.lower_function(params, body);
                Expr::Function(FnExpr { name, params, body })
            }
            Expr::Template(chunks) => self.lower_template(chunks),
            Expr::Binary { op: BinOp::Pow, left, right } => Expr::Call {
                callee: Box::new(Expr::Member {
                    obj: Box::new(Expr::Ident("Math".to_string())),
                    prop: MemberProp::Dot("pow".to_string()),
                }),
                args: vec![self.lower_expr(*left), self.lower_expr(*right)],
            },
            Expr::Unary { op, expr } => Expr::Unary {
                op,
                expr: Box::new(self.lower_expr(*expr)),
            },
            Expr::Update {
                inc,
                prefix,
                target,
            } => Expr::Update {
                inc,
                prefix,
                target: Box::new(self.lower_expr(*target)),
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op,
                left: Box::new(self.lower_expr(*left)),
                right: Box::new(self.lower_expr(*right)),
            },
            Expr::Logical { and, left, right } => Expr::Logical {
                and,
                left: Box::new(self.lower_expr(*left)),
                right: Box::new(self.lower_expr(*right)),
            },
            Expr::Assign { op, target, value } => Expr::Assign {
                op,
                target: Box::new(self.lower_expr(*target)),
                value: Box::new(self.lower_expr(*value)),
            },
            Expr::Cond { test, cons, alt } => Expr::Cond {
                test: Box::new(self.lower_expr(*test)),
                cons: Box::new(self.lower_expr(*cons)),
                alt: Box::new(self.lower_expr(*alt)),
            },
            Expr::Call { callee, args } => Expr::Call {
                callee: Box::new(self.lower_expr(*callee)),
                args: args.into_iter().map(|a| self.lower_expr(a)).collect(),
            },
            Expr::New { callee, args } => Expr::New {
                callee: Box::new(self.lower_expr(*callee)),
                args: args.into_iter().map(|a| self.lower_expr(a)).collect(),
            },
            Expr::Member { obj, prop } => Expr::Member {
                obj: Box::new(self.lower_expr(*obj)),
                prop: match prop {
                    MemberProp::Dot(name) => MemberProp::Dot(name),
                    MemberProp::Index(e) => MemberProp::Index(Box::new(self.lower_expr(*e))),
                },
            },
            Expr::Array(elems) => {
                Expr::Array(elems.into_iter().map(|e| self.lower_expr(e)).collect())
            }
            Expr::Object(props) => Expr::Object(
                props
                    .into_iter()
                    .map(|(k, v)| (k, self.lower_expr(v)))
                    .collect(),
            ),
            Expr::Seq(exprs) => {
                Expr::Seq(exprs.into_iter().map(|e| self.lower_expr(e)).collect())
            }
            leaf @ (Expr::Num(_)
            | Expr::Str(_)
            | Expr::Bool(_)
            | Expr::Null
            | Expr::Undefined
            | Expr::This
            | Expr::Ident(_)) => leaf,
        }
    }

    /// Fold template chunks into string concatenation. The leading literal
    /// chunk anchors the chain as a string, so numeric substitutions still
    /// concatenate.
    fn lower_template(&mut self, chunks: Vec<TplChunk>) -> Expr {
        let mut iter = chunks.into_iter();
        let mut acc = match iter.next() {
            Some(TplChunk::Str(s)) => Expr::Str(s),
            Some(TplChunk::Expr(_)) | None => Expr::Str(String::new()),
        };
        for chunk in iter {
            let rhs = match chunk {
                TplChunk::Str(s) if s.is_empty() => continue,
                TplChunk::Str(s) => Expr::Str(s),
                TplChunk::Expr(e) => self.lower_expr(e),
            };
            acc = Expr::Binary {
                op: BinOp::Add,
                left: Box::new(acc),
                right: Box::new(rhs),
            };
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::{parse, Flavor};
    use super::*;

    fn lowered(src: &str) -> Vec<Stmt> {
        lower(parse(src, Flavor::Es).unwrap())
    }

    fn assert_core(stmts: &[Stmt]) {
        // Spot-check that no ES6-level nodes survive lowering.
        fn walk_expr(e: &Expr) {
            match e {
                Expr::Arrow { .. } => panic!("arrow survived lowering"),
                Expr::Template(_) => panic!("template survived lowering"),
                Expr::Binary { op: BinOp::Pow, .. } => panic!("** survived lowering"),
                Expr::Function(f) => {
                    for p in &f.params {
                        assert!(matches!(p.pat, Pattern::Ident(_)) && p.default.is_none());
                    }
                    walk_stmts(&f.body);
                }
                Expr::Unary { expr, .. } => walk_expr(expr),
                Expr::Update { target, .. } => walk_expr(target),
                Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                    walk_expr(left);
                    walk_expr(right);
                }
                Expr::Assign { target, value, .. } => {
                    walk_expr(target);
                    walk_expr(value);
                }
                Expr::Cond { test, cons, alt } => {
                    walk_expr(test);
                    walk_expr(cons);
                    walk_expr(alt);
                }
                Expr::Call { callee, args } | Expr::New { callee, args } => {
                    walk_expr(callee);
                    args.iter().for_each(walk_expr);
                }
                Expr::Member { obj, prop } => {
                    walk_expr(obj);
                    if let MemberProp::Index(e) = prop {
                        walk_expr(e);
                    }
                }
                Expr::Array(es) | Expr::Seq(es) => es.iter().for_each(walk_expr),
                Expr::Object(props) => props.iter().for_each(|(_, v)| walk_expr(v)),
                _ => {}
            }
        }
        fn walk_stmts(stmts: &[Stmt]) {
            for s in stmts {
                match s {
                    Stmt::Class(_) => panic!("class survived lowering"),
                    Stmt::ForOf { .. } => panic!("for-of survived lowering"),
                    Stmt::VarDecl { kind, decls } => {
                        assert_eq!(*kind, DeclKind::Var);
                        for (pat, init) in decls {
                            assert!(matches!(pat, Pattern::Ident(_)));
                            if let Some(e) = init {
                                walk_expr(e);
                            }
                        }
                    }
                    Stmt::FunctionDecl { body, params, .. } => {
                        for p in params {
                            assert!(matches!(p.pat, Pattern::Ident(_)) && p.default.is_none());
                        }
                        walk_stmts(body);
                    }
                    Stmt::Return(Some(e)) | Stmt::Throw(e) | Stmt::Expr(e) => walk_expr(e),
                    Stmt::If { test, cons, alt } => {
                        walk_expr(test);
                        walk_stmts(std::slice::from_ref(cons.as_ref()));
                        if let Some(a) = alt {
                            walk_stmts(std::slice::from_ref(a.as_ref()));
                        }
                    }
                    Stmt::Block(b) => walk_stmts(b),
                    Stmt::While { test, body } | Stmt::DoWhile { body, test } => {
                        walk_expr(test);
                        walk_stmts(std::slice::from_ref(body.as_ref()));
                    }
                    Stmt::For {
                        init,
                        test,
                        update,
                        body,
                    } => {
                        if let Some(ForInit::Expr(e)) = init {
                            walk_expr(e);
                        }
                        test.iter().for_each(walk_expr);
                        update.iter().for_each(walk_expr);
                        walk_stmts(std::slice::from_ref(body.as_ref()));
                    }
                    Stmt::ForIn { object, body, .. } => {
                        walk_expr(object);
                        walk_stmts(std::slice::from_ref(body.as_ref()));
                    }
                    Stmt::Try {
                        block,
                        catch,
                        finally,
                    } => {
                        walk_stmts(block);
                        if let Some((_, c)) = catch {
                            walk_stmts(c);
                        }
                        if let Some(f) = finally {
                            walk_stmts(f);
                        }
                    }
                    Stmt::Switch { disc, cases } => {
                        walk_expr(disc);
                        for (t, ss) in cases {
                            t.iter().for_each(walk_expr);
                            walk_stmts(ss);
                        }
                    }
                    _ => {}
                }
            }
        }
        walk_stmts(stmts);
    }

    #[test]
    fn arrows_become_functions() {
        let stmts = lowered("var f = (a, b) => a + b;");
        assert_core(&stmts);
    }

    #[test]
    fn let_and_const_become_var() {
        let stmts = lowered("let a = 1; const b = 2;");
        assert_core(&stmts);
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn templates_become_concatenation() {
        let stmts = lowered("var s = `a${x}b${y}`;");
        assert_core(&stmts);
        let Stmt::VarDecl { decls, .. } = &stmts[0] else {
            panic!()
        };
        // ((("a" + x) + "b") + y)
        assert!(matches!(
            decls[0].1,
            Some(Expr::Binary { op: BinOp::Add, .. })
        ));
    }

    #[test]
    fn destructuring_expands_to_vars() {
        let stmts = lowered("var {a, b: c, d = 1} = o;");
        assert_core(&stmts);
        // tmp + a + c + d
        assert_eq!(stmts.len(), 4);
    }

    #[test]
    fn for_of_becomes_index_loop() {
        let stmts = lowered("for (var v of xs) { use(v); }");
        assert_core(&stmts);
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[1], Stmt::For { .. }));
    }

    #[test]
    fn classes_become_prototype_assignments() {
        let stmts =
            lowered("class P { constructor(x) { this.x = x; } getX() { return this.x; } }");
        assert_core(&stmts);
        assert!(matches!(stmts[0], Stmt::FunctionDecl { .. }));
        assert!(matches!(stmts[1], Stmt::Expr(Expr::Assign { .. })));
    }

    #[test]
    fn default_params_move_into_prologue() {
        let stmts = lowered("function f(a, b = 2) { return a + b; }");
        assert_core(&stmts);
        let Stmt::FunctionDecl { params, body, .. } = &stmts[0] else {
            panic!()
        };
        assert_eq!(params.len(), 2);
        assert!(matches!(body[0], Stmt::If { .. }));
    }

    #[test]
    fn pow_becomes_math_pow() {
        let stmts = lowered("var x = 2 ** 10;");
        assert_core(&stmts);
    }
}
