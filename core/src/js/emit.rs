//! ES5 source printer for the lowered core AST.
//!
//! Output is the baseline dialect handed to the sandbox; precedence is
//! tracked so parentheses are emitted exactly where the tree requires them.

use super::ast::*;
use super::number::format_number;

pub(crate) fn emit(stmts: &[Stmt]) -> String {
    let mut e = Emitter {
        out: String::new(),
        indent: 0,
    };
    for s in stmts {
        e.stmt(s);
    }
    e.out
}

const PREC_SEQ: u8 = 0;
const PREC_ASSIGN: u8 = 1;
const PREC_COND: u8 = 2;
const PREC_UNARY: u8 = 13;
const PREC_POSTFIX: u8 = 14;
const PREC_CALL: u8 = 15;
const PREC_PRIMARY: u8 = 16;

fn prec(e: &Expr) -> u8 {
    match e {
        Expr::Seq(_) => PREC_SEQ,
        Expr::Assign { .. } => PREC_ASSIGN,
        Expr::Cond { .. } => PREC_COND,
        Expr::Logical { and: false, .. } => 3,
        Expr::Logical { and: true, .. } => 4,
        Expr::Binary { op, .. } => match op {
            BinOp::BitOr => 5,
            BinOp::BitXor => 6,
            BinOp::BitAnd => 7,
            BinOp::Eq | BinOp::NotEq | BinOp::StrictEq | BinOp::StrictNotEq => 8,
            BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq | BinOp::In | BinOp::Instanceof => 9,
            BinOp::Shl | BinOp::Shr | BinOp::UShr => 10,
            BinOp::Add | BinOp::Sub => 11,
            BinOp::Mul | BinOp::Div | BinOp::Rem | BinOp::Pow => 12,
        },
        Expr::Unary { .. } => PREC_UNARY,
        Expr::Update { prefix: true, .. } => PREC_UNARY,
        Expr::Update { prefix: false, .. } => PREC_POSTFIX,
        Expr::Call { .. } | Expr::New { .. } | Expr::Member { .. } => PREC_CALL,
        _ => PREC_PRIMARY,
    }
}

fn bin_op_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Rem => "%",
        BinOp::Pow => "**",
        BinOp::Eq => "==",
        BinOp::NotEq => "!=",
        BinOp::StrictEq => "===",
        BinOp::StrictNotEq => "!==",
        BinOp::Lt => "<",
        BinOp::Gt => ">",
        BinOp::LtEq => "<=",
        BinOp::GtEq => ">=",
        BinOp::In => "in",
        BinOp::Instanceof => "instanceof",
        BinOp::BitAnd => "&",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
        BinOp::Shl => "<<",
        BinOp::Shr => ">>",
        BinOp::UShr => ">>>",
    }
}

fn assign_op_str(op: AssignOp) -> &'static str {
    match op {
        AssignOp::Assign => "=",
        AssignOp::Add => "+=",
        AssignOp::Sub => "-=",
        AssignOp::Mul => "*=",
        AssignOp::Div => "/=",
        AssignOp::Rem => "%=",
    }
}

fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// True when an expression statement would begin with `{` or `function` and
/// therefore needs wrapping parentheses.
fn starts_ambiguously(e: &Expr) -> bool {
    match e {
        Expr::Function(_) | Expr::Object(_) => true,
        Expr::Binary { left, .. }
        | Expr::Logical { left, .. } => starts_ambiguously(left),
        Expr::Assign { target, .. } => starts_ambiguously(target),
        Expr::Cond { test, .. } => starts_ambiguously(test),
        Expr::Call { callee, .. } => starts_ambiguously(callee),
        Expr::Member { obj, .. } => starts_ambiguously(obj),
        Expr::Update {
            prefix: false,
            target,
            ..
        } => starts_ambiguously(target),
        Expr::Seq(exprs) => exprs.first().is_some_and(starts_ambiguously),
        _ => false,
    }
}

struct Emitter {
    out: String,
    indent: usize,
}

impl Emitter {
    fn pad(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    fn stmt(&mut self, s: &Stmt) {
        match s {
            Stmt::VarDecl { decls, .. } => {
                self.pad();
                self.var_decl_inline(decls);
                self.out.push_str(";\n");
            }
            Stmt::FunctionDecl { name, params, body } => {
                self.pad();
                self.out.push_str("function ");
                self.out.push_str(name);
                self.param_list(params);
                self.brace_body(body);
                self.out.push('\n');
            }
            Stmt::Return(e) => {
                self.pad();
                match e {
                    Some(e) => {
                        self.out.push_str("return ");
                        self.expr(e, PREC_SEQ);
                    }
                    None => self.out.push_str("return"),
                }
                self.out.push_str(";\n");
            }
            Stmt::If { test, cons, alt } => {
                self.pad();
                self.if_chain(test, cons, alt.as_deref());
                self.out.push('\n');
            }
            Stmt::Block(stmts) => {
                self.pad();
                self.brace_body(stmts);
                self.out.push('\n');
            }
            Stmt::While { test, body } => {
                self.pad();
                self.out.push_str("while (");
                self.expr(test, PREC_SEQ);
                self.out.push_str(") ");
                self.nested_body(body);
                self.out.push('\n');
            }
            Stmt::DoWhile { body, test } => {
                self.pad();
                self.out.push_str("do ");
                self.nested_body(body);
                self.out.push_str(" while (");
                self.expr(test, PREC_SEQ);
                self.out.push_str(");\n");
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                self.pad();
                self.out.push_str("for (");
                match init {
                    Some(ForInit::VarDecl { decls, .. }) => self.var_decl_inline(decls),
                    Some(ForInit::Expr(e)) => self.expr(e, PREC_SEQ),
                    None => {}
                }
                self.out.push_str("; ");
                if let Some(t) = test {
                    self.expr(t, PREC_SEQ);
                }
                self.out.push_str("; ");
                if let Some(u) = update {
                    self.expr(u, PREC_SEQ);
                }
                self.out.push_str(") ");
                self.nested_body(body);
                self.out.push('\n');
            }
            Stmt::ForIn {
                decl,
                name,
                object,
                body,
            } => {
                self.pad();
                self.out.push_str("for (");
                if *decl {
                    self.out.push_str("var ");
                }
                self.out.push_str(name);
                self.out.push_str(" in ");
                self.expr(object, PREC_SEQ);
                self.out.push_str(") ");
                self.nested_body(body);
                self.out.push('\n');
            }
            Stmt::ForOf { .. } | Stmt::Class(_) => {
                unreachable!("lowering removes for-of and class statements")
            }
            Stmt::Break => {
                self.pad();
                self.out.push_str("break;\n");
            }
            Stmt::Continue => {
                self.pad();
                self.out.push_str("continue;\n");
            }
            Stmt::Throw(e) => {
                self.pad();
                self.out.push_str("throw ");
                self.expr(e, PREC_SEQ);
                self.out.push_str(";\n");
            }
            Stmt::Try {
                block,
                catch,
                finally,
            } => {
                self.pad();
                self.out.push_str("try ");
                self.brace_body(block);
                if let Some((name, stmts)) = catch {
                    self.out.push_str(&format!(" catch ({name}) "));
                    self.brace_body(stmts);
                }
                if let Some(stmts) = finally {
                    self.out.push_str(" finally ");
                    self.brace_body(stmts);
                }
                self.out.push('\n');
            }
            Stmt::Switch { disc, cases } => {
                self.pad();
                self.out.push_str("switch (");
                self.expr(disc, PREC_SEQ);
                self.out.push_str(") {\n");
                self.indent += 1;
                for (test, stmts) in cases {
                    self.pad();
                    match test {
                        Some(t) => {
                            self.out.push_str("case ");
                            self.expr(t, PREC_SEQ);
                            self.out.push_str(":\n");
                        }
                        None => self.out.push_str("default:\n"),
                    }
                    self.indent += 1;
                    for s in stmts {
                        self.stmt(s);
                    }
                    self.indent -= 1;
                }
                self.indent -= 1;
                self.pad();
                self.out.push_str("}\n");
            }
            Stmt::Expr(e) => {
                self.pad();
                if starts_ambiguously(e) {
                    self.out.push('(');
                    self.expr(e, PREC_SEQ);
                    self.out.push(')');
                } else {
                    self.expr(e, PREC_SEQ);
                }
                self.out.push_str(";\n");
            }
            Stmt::Empty => {
                self.pad();
                self.out.push_str(";\n");
            }
        }
    }

    fn if_chain(&mut self, test: &Expr, cons: &Stmt, alt: Option<&Stmt>) {
        self.out.push_str("if (");
        self.expr(test, PREC_SEQ);
        self.out.push_str(") ");
        self.nested_body(cons);
        if let Some(alt) = alt {
            self.out.push_str(" else ");
            if let Stmt::If {
                test: t,
                cons: c,
                alt: a,
            } = alt
            {
                self.if_chain(t, c, a.as_deref());
            } else {
                self.nested_body(alt);
            }
        }
    }

    /// Emit a loop/branch body as a braced block regardless of its shape.
    fn nested_body(&mut self, body: &Stmt) {
        match body {
            Stmt::Block(stmts) => self.brace_body(stmts),
            single => self.brace_body(std::slice::from_ref(single)),
        }
    }

    fn brace_body(&mut self, stmts: &[Stmt]) {
        self.out.push_str("{\n");
        self.indent += 1;
        for s in stmts {
            self.stmt(s);
        }
        self.indent -= 1;
        self.pad();
        self.out.push('}');
    }

    fn var_decl_inline(&mut self, decls: &[(Pattern, Option<Expr>)]) {
        self.out.push_str("var ");
        for (i, (pat, init)) in decls.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            let Pattern::Ident(name) = pat else {
                unreachable!("lowering removes destructuring declarations")
            };
            self.out.push_str(name);
            if let Some(e) = init {
                self.out.push_str(" = ");
                self.expr(e, PREC_ASSIGN);
            }
        }
    }

    fn param_list(&mut self, params: &[Param]) {
        self.out.push('(');
        for (i, p) in params.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.out.push_str(p.name());
        }
        self.out.push_str(") ");
    }

    fn expr(&mut self, e: &Expr, min: u8) {
        let p = prec(e);
        if p < min {
            self.out.push('(');
            self.expr_inner(e);
            self.out.push(')');
        } else {
            self.expr_inner(e);
        }
    }

    fn expr_inner(&mut self, e: &Expr) {
        match e {
            Expr::Num(n) => self.out.push_str(&format_number(*n)),
            Expr::Str(s) => self.out.push_str(&quote_str(s)),
            Expr::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            Expr::Null => self.out.push_str("null"),
            Expr::Undefined => self.out.push_str("undefined"),
            Expr::This => self.out.push_str("this"),
            Expr::Ident(name) => self.out.push_str(name),
            Expr::Array(elems) => {
                self.out.push('[');
                for (i, el) in elems.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(el, PREC_ASSIGN);
                }
                self.out.push(']');
            }
            Expr::Object(props) => {
                self.out.push('{');
                for (i, (key, value)) in props.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    match key {
                        PropKey::Ident(name) => self.out.push_str(name),
                        PropKey::Str(s) => self.out.push_str(&quote_str(s)),
                        PropKey::Num(n) => self.out.push_str(&format_number(*n)),
                    }
                    self.out.push_str(": ");
                    self.expr(value, PREC_ASSIGN);
                }
                self.out.push('}');
            }
            Expr::Function(FnExpr { name, params, body }) => {
                self.out.push_str("function");
                if let Some(name) = name {
                    self.out.push(' ');
                    self.out.push_str(name);
                }
                self.param_list(params);
                self.brace_body(body);
            }
            Expr::Unary { op, expr } => {
                let op_str = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                    UnaryOp::Pos => "+",
                    UnaryOp::BitNot => "~",
                    UnaryOp::Typeof => "typeof ",
                    UnaryOp::Void => "void ",
                };
                self.out.push_str(op_str);
                let start = self.out.len();
                self.expr(expr, PREC_UNARY);
                // `- -x` must not fuse into `--x`.
                if matches!(op, UnaryOp::Neg | UnaryOp::Pos) {
                    let first = self.out[start..].chars().next();
                    if first == op_str.chars().next() {
                        self.out.insert(start, ' ');
                    }
                }
            }
            Expr::Update {
                inc,
                prefix,
                target,
            } => {
                let op = if *inc { "++" } else { "--" };
                if *prefix {
                    self.out.push_str(op);
                    self.expr(target, PREC_CALL);
                } else {
                    self.expr(target, PREC_CALL);
                    self.out.push_str(op);
                }
            }
            Expr::Binary { op, left, right } => {
                let p = prec(e);
                self.expr(left, p);
                self.out.push(' ');
                self.out.push_str(bin_op_str(*op));
                self.out.push(' ');
                self.expr(right, p + 1);
            }
            Expr::Logical { and, left, right } => {
                let p = prec(e);
                self.expr(left, p);
                self.out.push_str(if *and { " && " } else { " || " });
                self.expr(right, p + 1);
            }
            Expr::Assign { op, target, value } => {
                self.expr(target, PREC_CALL);
                self.out.push(' ');
                self.out.push_str(assign_op_str(*op));
                self.out.push(' ');
                self.expr(value, PREC_ASSIGN);
            }
            Expr::Cond { test, cons, alt } => {
                self.expr(test, PREC_COND + 1);
                self.out.push_str(" ? ");
                self.expr(cons, PREC_ASSIGN);
                self.out.push_str(" : ");
                self.expr(alt, PREC_ASSIGN);
            }
            Expr::Call { callee, args } => {
                self.expr(callee, PREC_CALL);
                self.arg_list(args);
            }
            Expr::New { callee, args } => {
                self.out.push_str("new ");
                self.expr(callee, PREC_CALL);
                self.arg_list(args);
            }
            Expr::Member { obj, prop } => {
                if matches!(**obj, Expr::Num(_)) {
                    self.out.push('(');
                    self.expr_inner(obj);
                    self.out.push(')');
                } else {
                    self.expr(obj, PREC_CALL);
                }
                match prop {
                    MemberProp::Dot(name) => {
                        self.out.push('.');
                        self.out.push_str(name);
                    }
                    MemberProp::Index(idx) => {
                        self.out.push('[');
                        self.expr(idx, PREC_SEQ);
                        self.out.push(']');
                    }
                }
            }
            Expr::Seq(exprs) => {
                for (i, ex) in exprs.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(ex, PREC_ASSIGN);
                }
            }
            Expr::Arrow { .. } | Expr::Template(_) => {
                unreachable!("lowering removes arrows and templates")
            }
        }
    }

    fn arg_list(&mut self, args: &[Expr]) {
        self.out.push('(');
        for (i, a) in args.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(a, PREC_ASSIGN);
        }
        self.out.push(')');
    }
}

#[cfg(test)]
mod tests {
    use super::super::lower::lower;
    use super::super::parser::{parse, Flavor};
    use super::*;

    fn transpile(src: &str) -> String {
        emit(&lower(parse(src, Flavor::Es).unwrap()))
    }

    #[test]
    fn emitted_source_reparses() {
        let out = transpile(
            "function main(xs) { var n = 0; for (var x of xs) { n += x.a; } return n > 2 ? true : false; }",
        );
        assert!(parse(&out, Flavor::Es).is_ok(), "emitted: {out}");
        assert!(!out.contains("of "));
    }

    #[test]
    fn precedence_parens_preserved() {
        let out = transpile("var x = (1 + 2) * 3;");
        assert!(out.contains("(1 + 2) * 3"), "emitted: {out}");
    }

    #[test]
    fn no_spurious_parens_for_same_precedence() {
        let out = transpile("var x = 1 + 2 + 3;");
        assert!(out.contains("1 + 2 + 3"), "emitted: {out}");
    }

    #[test]
    fn right_associative_subtraction_parenthesized() {
        let out = transpile("var x = 1 - (2 - 3);");
        assert!(out.contains("1 - (2 - 3)"), "emitted: {out}");
    }

    #[test]
    fn arrow_emits_function_keyword() {
        let out = transpile("var f = (a) => a + 1;");
        assert!(out.contains("function (a)") || out.contains("function(a)"), "emitted: {out}");
        assert!(!out.contains("=>"));
    }

    #[test]
    fn template_emits_concatenation() {
        let out = transpile("var s = `v=${v}!`;");
        assert!(out.contains("\"v=\" + v + \"!\""), "emitted: {out}");
    }

    #[test]
    fn strings_are_escaped() {
        let out = transpile("var s = 'a\"b\\n';");
        assert!(out.contains("\"a\\\"b\\n\""), "emitted: {out}");
    }

    #[test]
    fn double_negation_keeps_space() {
        let out = transpile("var x = -(-y);");
        assert!(out.contains("- -y"), "emitted: {out}");
    }

    #[test]
    fn let_emits_var() {
        let out = transpile("let a = 1;");
        assert!(out.starts_with("var a = 1;"), "emitted: {out}");
    }
}
