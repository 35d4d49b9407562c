use super::ast::*;
use super::error::ParseError;
use super::lexer::{lex, Token, Tok, TplPart};

/// Which type syntax the parser accepts. `Ts` additionally parses and
/// discards type-only constructs; the produced AST is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flavor {
    Es,
    Ts,
}

const MAX_PARSE_DEPTH: u32 = 200;

/// Words that cannot be used as binding names.
const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "default", "delete", "do", "else",
    "extends", "false", "finally", "for", "function", "if", "in", "instanceof", "new", "null",
    "return", "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while",
];

pub(crate) fn parse(source: &str, flavor: Flavor) -> Result<Vec<Stmt>, ParseError> {
    let toks = lex(source)?;
    let mut parser = Parser {
        toks,
        pos: 0,
        ts: flavor == Flavor::Ts,
        depth: 0,
        fn_depth: 0,
        iter_depth: 0,
        break_depth: 0,
        arrow_depth: 0,
    };
    parser.parse_program()
}

/// Parse a single expression (used for template literal substitutions).
fn parse_expr_source(source: &str, ts: bool) -> Result<Expr, ParseError> {
    let toks = lex(source)?;
    let mut parser = Parser {
        toks,
        pos: 0,
        ts,
        depth: 0,
        fn_depth: 0,
        iter_depth: 0,
        break_depth: 0,
        arrow_depth: 0,
    };
    let expr = parser.parse_expr(false)?;
    if !matches!(parser.tok(), Tok::Eof) {
        return Err(parser.error_here("unexpected token after expression"));
    }
    Ok(expr)
}

struct Parser {
    toks: Vec<Token>,
    pos: usize,
    ts: bool,
    depth: u32,
    fn_depth: u32,
    iter_depth: u32,
    break_depth: u32,
    arrow_depth: u32,
}

impl Parser {
    fn cur(&self) -> &Token {
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn tok(&self) -> &Tok {
        &self.cur().tok
    }

    fn peek_tok(&self, offset: usize) -> &Tok {
        let idx = (self.pos + offset).min(self.toks.len() - 1);
        &self.toks[idx].tok
    }

    fn prev_line(&self) -> u32 {
        if self.pos == 0 {
            1
        } else {
            self.toks[self.pos - 1].line
        }
    }

    fn bump(&mut self) -> Token {
        let t = self.cur().clone();
        if self.pos < self.toks.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn at_punct(&self, p: &str) -> bool {
        matches!(self.tok(), Tok::Punct(q) if *q == p)
    }

    fn at_word(&self, w: &str) -> bool {
        matches!(self.tok(), Tok::Ident(name) if name == w)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.at_punct(p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error_here(&self, msg: impl Into<String>) -> ParseError {
        let t = self.cur();
        ParseError::new(msg, t.line, t.col)
    }

    fn expect_punct(&mut self, p: &'static str) -> Result<(), ParseError> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{p}'")))
        }
    }

    /// A binding name: any identifier that is not a reserved word.
    fn expect_binding_ident(&mut self) -> Result<String, ParseError> {
        match self.tok().clone() {
            Tok::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                self.bump();
                Ok(name)
            }
            Tok::Ident(name) => Err(self.error_here(format!("'{name}' is a reserved word"))),
            _ => Err(self.error_here("expected identifier")),
        }
    }

    /// A property name after `.` or in an object literal; reserved words are
    /// allowed here.
    fn expect_property_name(&mut self) -> Result<String, ParseError> {
        match self.tok().clone() {
            Tok::Ident(name) => {
                self.bump();
                Ok(name)
            }
            _ => Err(self.error_here("expected property name")),
        }
    }

    /// Automatic semicolon insertion: an explicit `;`, a closing brace, end
    /// of input, or a line break all terminate a statement.
    fn expect_semi(&mut self) -> Result<(), ParseError> {
        if self.eat_punct(";") {
            return Ok(());
        }
        if self.at_punct("}") || matches!(self.tok(), Tok::Eof) {
            return Ok(());
        }
        if self.cur().line > self.prev_line() {
            return Ok(());
        }
        Err(self.error_here("expected ';'"))
    }

    fn parse_program(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !matches!(self.tok(), Tok::Eof) {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    // ---- statements ----

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            return Err(self.error_here("statement nesting is too deep"));
        }
        let r = self.parse_stmt_inner();
        self.depth -= 1;
        r
    }

    fn parse_stmt_inner(&mut self) -> Result<Stmt, ParseError> {
        match self.tok().clone() {
            Tok::Punct("{") => {
                self.bump();
                let stmts = self.parse_block_rest()?;
                Ok(Stmt::Block(stmts))
            }
            Tok::Punct(";") => {
                self.bump();
                Ok(Stmt::Empty)
            }
            Tok::Ident(word) => match word.as_str() {
                "var" | "let" | "const" => {
                    let kind = self.decl_kind();
                    self.bump();
                    let decls = self.parse_var_declarators(false)?;
                    self.expect_semi()?;
                    Ok(Stmt::VarDecl { kind, decls })
                }
                "function" => self.parse_function_decl(),
                "class" => self.parse_class_decl(),
                "return" => self.parse_return(),
                "if" => self.parse_if(),
                "while" => self.parse_while(),
                "do" => self.parse_do_while(),
                "for" => self.parse_for(),
                "break" => {
                    if self.break_depth == 0 {
                        return Err(self.error_here("'break' outside of a loop or switch"));
                    }
                    self.bump();
                    self.expect_semi()?;
                    Ok(Stmt::Break)
                }
                "continue" => {
                    if self.iter_depth == 0 {
                        return Err(self.error_here("'continue' outside of a loop"));
                    }
                    self.bump();
                    self.expect_semi()?;
                    Ok(Stmt::Continue)
                }
                "throw" => {
                    self.bump();
                    let e = self.parse_expr(false)?;
                    self.expect_semi()?;
                    Ok(Stmt::Throw(e))
                }
                "try" => self.parse_try(),
                "switch" => self.parse_switch(),
                "import" => Err(self.error_here("import statements are not supported")),
                "export" => {
                    self.bump();
                    if self.at_word("default") {
                        return Err(self.error_here("'export default' is not supported"));
                    }
                    self.parse_stmt()
                }
                "interface" if self.ts && matches!(self.peek_tok(1), Tok::Ident(_)) => {
                    self.skip_interface()?;
                    Ok(Stmt::Empty)
                }
                "type"
                    if self.ts
                        && matches!(self.peek_tok(1), Tok::Ident(_))
                        && matches!(self.peek_tok(2), Tok::Punct("=") | Tok::Punct("<")) =>
                {
                    self.skip_type_alias()?;
                    Ok(Stmt::Empty)
                }
                "enum" if self.ts => Err(self.error_here("TypeScript enums are not supported")),
                "declare" | "namespace" if self.ts => {
                    Err(self.error_here("TypeScript declarations are not supported"))
                }
                _ => self.parse_expr_stmt(),
            },
            _ => self.parse_expr_stmt(),
        }
    }

    fn decl_kind(&self) -> DeclKind {
        match self.tok() {
            Tok::Ident(w) if w == "let" => DeclKind::Let,
            Tok::Ident(w) if w == "const" => DeclKind::Const,
            _ => DeclKind::Var,
        }
    }

    fn parse_expr_stmt(&mut self) -> Result<Stmt, ParseError> {
        let e = self.parse_expr(false)?;
        self.expect_semi()?;
        Ok(Stmt::Expr(e))
    }

    fn parse_block_rest(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !self.at_punct("}") {
            if matches!(self.tok(), Tok::Eof) {
                return Err(self.error_here("unexpected end of input, expected '}'"));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.bump();
        Ok(stmts)
    }

    fn parse_var_declarators(
        &mut self,
        no_in: bool,
    ) -> Result<Vec<(Pattern, Option<Expr>)>, ParseError> {
        let mut decls = Vec::new();
        loop {
            let pat = self.parse_binding_pattern()?;
            if self.ts && self.at_punct(":") {
                self.bump();
                self.skip_type(&[",", ";", "="])?;
            }
            let init = if self.eat_punct("=") {
                Some(self.parse_assign_expr(no_in)?)
            } else {
                None
            };
            if init.is_none() && !matches!(pat, Pattern::Ident(_)) {
                return Err(self.error_here("destructuring declaration requires an initializer"));
            }
            decls.push((pat, init));
            if !self.eat_punct(",") {
                return Ok(decls);
            }
        }
    }

    fn parse_binding_pattern(&mut self) -> Result<Pattern, ParseError> {
        if self.at_punct("{") {
            self.bump();
            let mut props = Vec::new();
            while !self.at_punct("}") {
                if self.at_punct("...") {
                    return Err(self.error_here("rest elements are not supported"));
                }
                let key = self.expect_binding_ident()?;
                let mut binding = key.clone();
                let mut default = None;
                if self.eat_punct(":") {
                    if self.at_punct("{") || self.at_punct("[") {
                        return Err(self.error_here("nested destructuring is not supported"));
                    }
                    binding = self.expect_binding_ident()?;
                }
                if self.eat_punct("=") {
                    default = Some(self.parse_assign_expr(false)?);
                }
                props.push(ObjectPatProp {
                    key,
                    binding,
                    default,
                });
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.expect_punct("}")?;
            Ok(Pattern::Object(props))
        } else if self.at_punct("[") {
            self.bump();
            let mut elems = Vec::new();
            while !self.at_punct("]") {
                if self.eat_punct(",") {
                    elems.push(None);
                    continue;
                }
                if self.at_punct("...") {
                    return Err(self.error_here("rest elements are not supported"));
                }
                if self.at_punct("{") || self.at_punct("[") {
                    return Err(self.error_here("nested destructuring is not supported"));
                }
                let binding = self.expect_binding_ident()?;
                let default = if self.eat_punct("=") {
                    Some(self.parse_assign_expr(false)?)
                } else {
                    None
                };
                elems.push(Some(ArrayPatElem { binding, default }));
                if !self.at_punct("]") {
                    self.expect_punct(",")?;
                }
            }
            self.bump();
            Ok(Pattern::Array(elems))
        } else {
            Ok(Pattern::Ident(self.expect_binding_ident()?))
        }
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();
        while !self.at_punct(")") {
            if self.at_punct("...") {
                return Err(self.error_here("rest parameters are not supported"));
            }
            let pat = self.parse_binding_pattern()?;
            if self.ts {
                self.eat_punct("?");
                if self.eat_punct(":") {
                    self.skip_type(&[",", ")", "="])?;
                }
            }
            let default = if self.eat_punct("=") {
                Some(self.parse_assign_expr(false)?)
            } else {
                None
            };
            params.push(Param { pat, default });
            if !self.at_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok(params)
    }

    /// Parse a function body block, entering a fresh function context.
    fn parse_function_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_punct("{")?;
        let saved_iter = std::mem::replace(&mut self.iter_depth, 0);
        let saved_break = std::mem::replace(&mut self.break_depth, 0);
        let saved_arrow = std::mem::replace(&mut self.arrow_depth, 0);
        self.fn_depth += 1;
        let body = self.parse_block_rest();
        self.fn_depth -= 1;
        self.iter_depth = saved_iter;
        self.break_depth = saved_break;
        self.arrow_depth = saved_arrow;
        body
    }

    fn parse_function_decl(&mut self) -> Result<Stmt, ParseError> {
        self.bump();
        let name = self.expect_binding_ident()?;
        if self.ts && self.at_punct("<") {
            self.skip_type_params()?;
        }
        self.expect_punct("(")?;
        let params = self.parse_params()?;
        self.expect_punct(")")?;
        if self.ts && self.eat_punct(":") {
            self.skip_type(&["{"])?;
        }
        let body = self.parse_function_body()?;
        Ok(Stmt::FunctionDecl { name, params, body })
    }

    fn parse_class_decl(&mut self) -> Result<Stmt, ParseError> {
        self.bump();
        let name = self.expect_binding_ident()?;
        if self.at_word("extends") {
            return Err(self.error_here("class inheritance is not supported"));
        }
        if self.ts && self.at_punct("<") {
            self.skip_type_params()?;
        }
        self.expect_punct("{")?;
        let mut ctor = None;
        let mut methods = Vec::new();
        while !self.at_punct("}") {
            if self.eat_punct(";") {
                continue;
            }
            let is_static = self.at_word("static") && matches!(self.peek_tok(1), Tok::Ident(_));
            if is_static {
                self.bump();
            }
            let mname = self.expect_property_name()?;
            if (mname == "get" || mname == "set") && !self.at_punct("(") {
                return Err(self.error_here("class accessors are not supported"));
            }
            if !self.at_punct("(") && !(self.ts && self.at_punct("<")) {
                return Err(self.error_here("class fields are not supported"));
            }
            if self.ts && self.at_punct("<") {
                self.skip_type_params()?;
            }
            self.expect_punct("(")?;
            let params = self.parse_params()?;
            self.expect_punct(")")?;
            if self.ts && self.eat_punct(":") {
                self.skip_type(&["{"])?;
            }
            let body = self.parse_function_body()?;
            if mname == "constructor" && !is_static {
                ctor = Some((params, body));
            } else {
                methods.push(ClassMethod {
                    name: mname,
                    is_static,
                    params,
                    body,
                });
            }
        }
        self.bump();
        Ok(Stmt::Class(ClassDecl {
            name,
            ctor,
            methods,
        }))
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        if self.fn_depth == 0 {
            return Err(self.error_here("'return' outside of a function"));
        }
        let return_line = self.cur().line;
        self.bump();
        if self.at_punct(";") {
            self.bump();
            return Ok(Stmt::Return(None));
        }
        if self.at_punct("}")
            || matches!(self.tok(), Tok::Eof)
            || self.cur().line > return_line
        {
            return Ok(Stmt::Return(None));
        }
        let e = self.parse_expr(false)?;
        self.expect_semi()?;
        Ok(Stmt::Return(Some(e)))
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.bump();
        self.expect_punct("(")?;
        let test = self.parse_expr(false)?;
        self.expect_punct(")")?;
        let cons = Box::new(self.parse_stmt()?);
        let alt = if self.at_word("else") {
            self.bump();
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If { test, cons, alt })
    }

    fn parse_loop_body(&mut self) -> Result<Box<Stmt>, ParseError> {
        self.iter_depth += 1;
        self.break_depth += 1;
        let body = self.parse_stmt();
        self.iter_depth -= 1;
        self.break_depth -= 1;
        Ok(Box::new(body?))
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        self.bump();
        self.expect_punct("(")?;
        let test = self.parse_expr(false)?;
        self.expect_punct(")")?;
        let body = self.parse_loop_body()?;
        Ok(Stmt::While { test, body })
    }

    fn parse_do_while(&mut self) -> Result<Stmt, ParseError> {
        self.bump();
        let body = self.parse_loop_body()?;
        if !self.at_word("while") {
            return Err(self.error_here("expected 'while' after do-block"));
        }
        self.bump();
        self.expect_punct("(")?;
        let test = self.parse_expr(false)?;
        self.expect_punct(")")?;
        self.expect_semi()?;
        Ok(Stmt::DoWhile { body, test })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.bump();
        self.expect_punct("(")?;

        if matches!(self.tok(), Tok::Ident(w) if w == "var" || w == "let" || w == "const") {
            let kind = self.decl_kind();
            self.bump();
            let pat = self.parse_binding_pattern()?;
            if self.at_word("in") || self.at_word("of") {
                let of = self.at_word("of");
                let Pattern::Ident(name) = pat else {
                    return Err(
                        self.error_here("destructuring is not supported in for-in/for-of")
                    );
                };
                self.bump();
                let object = self.parse_expr(false)?;
                self.expect_punct(")")?;
                let body = self.parse_loop_body()?;
                return Ok(if of {
                    Stmt::ForOf {
                        name,
                        iterable: object,
                        body,
                    }
                } else {
                    Stmt::ForIn {
                        decl: true,
                        name,
                        object,
                        body,
                    }
                });
            }
            // Plain C-style init: re-join the first declarator with the rest.
            if self.ts && self.at_punct(":") {
                self.bump();
                self.skip_type(&[",", ";", "="])?;
            }
            let init = if self.eat_punct("=") {
                Some(self.parse_assign_expr(true)?)
            } else {
                None
            };
            let mut decls = vec![(pat, init)];
            if self.eat_punct(",") {
                decls.extend(self.parse_var_declarators(true)?);
            }
            self.expect_punct(";")?;
            return self.parse_for_rest(Some(ForInit::VarDecl { kind, decls }));
        }

        if self.at_punct(";") {
            self.bump();
            return self.parse_for_rest(None);
        }

        let first = self.parse_expr(true)?;
        if self.at_word("in") || self.at_word("of") {
            let of = self.at_word("of");
            let Expr::Ident(name) = first else {
                return Err(self.error_here("for-in/for-of target must be an identifier"));
            };
            self.bump();
            let object = self.parse_expr(false)?;
            self.expect_punct(")")?;
            let body = self.parse_loop_body()?;
            return Ok(if of {
                Stmt::ForOf {
                    name,
                    iterable: object,
                    body,
                }
            } else {
                Stmt::ForIn {
                    decl: false,
                    name,
                    object,
                    body,
                }
            });
        }
        self.expect_punct(";")?;
        self.parse_for_rest(Some(ForInit::Expr(first)))
    }

    fn parse_for_rest(&mut self, init: Option<ForInit>) -> Result<Stmt, ParseError> {
        let test = if self.at_punct(";") {
            None
        } else {
            Some(self.parse_expr(false)?)
        };
        self.expect_punct(";")?;
        let update = if self.at_punct(")") {
            None
        } else {
            Some(self.parse_expr(false)?)
        };
        self.expect_punct(")")?;
        let body = self.parse_loop_body()?;
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn parse_try(&mut self) -> Result<Stmt, ParseError> {
        self.bump();
        self.expect_punct("{")?;
        let block = self.parse_block_rest()?;
        let mut catch = None;
        if self.at_word("catch") {
            self.bump();
            self.expect_punct("(")?;
            let name = self.expect_binding_ident()?;
            if self.ts && self.eat_punct(":") {
                self.skip_type(&[")"])?;
            }
            self.expect_punct(")")?;
            self.expect_punct("{")?;
            catch = Some((name, self.parse_block_rest()?));
        }
        let mut finally = None;
        if self.at_word("finally") {
            self.bump();
            self.expect_punct("{")?;
            finally = Some(self.parse_block_rest()?);
        }
        if catch.is_none() && finally.is_none() {
            return Err(self.error_here("try statement requires catch or finally"));
        }
        Ok(Stmt::Try {
            block,
            catch,
            finally,
        })
    }

    fn parse_switch(&mut self) -> Result<Stmt, ParseError> {
        self.bump();
        self.expect_punct("(")?;
        let disc = self.parse_expr(false)?;
        self.expect_punct(")")?;
        self.expect_punct("{")?;
        self.break_depth += 1;
        let result = self.parse_switch_cases();
        self.break_depth -= 1;
        let cases = result?;
        Ok(Stmt::Switch { disc, cases })
    }

    fn parse_switch_cases(&mut self) -> Result<Vec<(Option<Expr>, Vec<Stmt>)>, ParseError> {
        let mut cases = Vec::new();
        let mut saw_default = false;
        while !self.at_punct("}") {
            let test = if self.at_word("case") {
                self.bump();
                let e = self.parse_expr(false)?;
                Some(e)
            } else if self.at_word("default") {
                if saw_default {
                    return Err(self.error_here("multiple default clauses"));
                }
                saw_default = true;
                self.bump();
                None
            } else {
                return Err(self.error_here("expected 'case' or 'default'"));
            };
            self.expect_punct(":")?;
            let mut stmts = Vec::new();
            while !self.at_punct("}") && !self.at_word("case") && !self.at_word("default") {
                stmts.push(self.parse_stmt()?);
            }
            cases.push((test, stmts));
        }
        self.bump();
        Ok(cases)
    }

    // ---- expressions ----

    fn parse_expr(&mut self, no_in: bool) -> Result<Expr, ParseError> {
        let first = self.parse_assign_expr(no_in)?;
        if !self.at_punct(",") {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.eat_punct(",") {
            exprs.push(self.parse_assign_expr(no_in)?);
        }
        Ok(Expr::Seq(exprs))
    }

    fn parse_assign_expr(&mut self, no_in: bool) -> Result<Expr, ParseError> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            return Err(self.error_here("expression nesting is too deep"));
        }
        let r = self.parse_assign_expr_inner(no_in);
        self.depth -= 1;
        r
    }

    fn parse_assign_expr_inner(&mut self, no_in: bool) -> Result<Expr, ParseError> {
        // Arrow function lookahead: `x => ...` or `(a, b) => ...`.
        if let Tok::Ident(name) = self.tok() {
            if !RESERVED.contains(&name.as_str()) && matches!(self.peek_tok(1), Tok::Punct("=>")) {
                let name = name.clone();
                self.bump();
                self.bump();
                return self.parse_arrow_body(vec![Param::ident(name)]);
            }
        }
        if self.at_punct("(") && self.is_arrow_ahead() {
            self.bump();
            let params = self.parse_params()?;
            self.expect_punct(")")?;
            if self.ts && self.eat_punct(":") {
                self.skip_type(&["=>"])?;
            }
            self.expect_punct("=>")?;
            return self.parse_arrow_body(params);
        }

        let expr = self.parse_cond_expr(no_in)?;
        let op = match self.tok() {
            Tok::Punct("=") => Some(AssignOp::Assign),
            Tok::Punct("+=") => Some(AssignOp::Add),
            Tok::Punct("-=") => Some(AssignOp::Sub),
            Tok::Punct("*=") => Some(AssignOp::Mul),
            Tok::Punct("/=") => Some(AssignOp::Div),
            Tok::Punct("%=") => Some(AssignOp::Rem),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(expr);
        };
        if !matches!(expr, Expr::Ident(_) | Expr::Member { .. }) {
            return Err(self.error_here("invalid assignment target"));
        }
        self.bump();
        let value = self.parse_assign_expr(no_in)?;
        Ok(Expr::Assign {
            op,
            target: Box::new(expr),
            value: Box::new(value),
        })
    }

    /// Look ahead from a `(` to see whether the matching `)` is followed by
    /// `=>`. Only token balance matters here; the params are re-parsed
    /// properly on the arrow path.
    fn is_arrow_ahead(&self) -> bool {
        let mut depth = 0usize;
        let mut i = self.pos;
        loop {
            match &self.toks[i.min(self.toks.len() - 1)].tok {
                Tok::Eof => return false,
                Tok::Punct("(") | Tok::Punct("[") | Tok::Punct("{") => depth += 1,
                Tok::Punct(")") | Tok::Punct("]") | Tok::Punct("}") => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return matches!(
                            self.toks[(i + 1).min(self.toks.len() - 1)].tok,
                            Tok::Punct("=>")
                        );
                    }
                }
                _ => {}
            }
            i += 1;
        }
    }

    fn parse_arrow_body(&mut self, params: Vec<Param>) -> Result<Expr, ParseError> {
        self.arrow_depth += 1;
        let body = if self.at_punct("{") {
            self.expect_punct("{")?;
            self.fn_depth += 1;
            let saved_iter = std::mem::replace(&mut self.iter_depth, 0);
            let saved_break = std::mem::replace(&mut self.break_depth, 0);
            let stmts = self.parse_block_rest();
            self.iter_depth = saved_iter;
            self.break_depth = saved_break;
            self.fn_depth -= 1;
            stmts
        } else {
            self.parse_assign_expr(false)
                .map(|e| vec![Stmt::Return(Some(e))])
        };
        self.arrow_depth -= 1;
        Ok(Expr::Arrow {
            params,
            body: body?,
        })
    }

    fn parse_cond_expr(&mut self, no_in: bool) -> Result<Expr, ParseError> {
        let test = self.parse_binary_expr(1, no_in)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let cons = self.parse_assign_expr(false)?;
        self.expect_punct(":")?;
        let alt = self.parse_assign_expr(no_in)?;
        Ok(Expr::Cond {
            test: Box::new(test),
            cons: Box::new(cons),
            alt: Box::new(alt),
        })
    }

    fn binary_op(&self, no_in: bool) -> Option<(BinOp, u8, bool)> {
        let (op, prec) = match self.tok() {
            Tok::Punct("||") | Tok::Punct("&&") => return None, // handled as Logical below
            Tok::Punct("|") => (BinOp::BitOr, 3),
            Tok::Punct("^") => (BinOp::BitXor, 4),
            Tok::Punct("&") => (BinOp::BitAnd, 5),
            Tok::Punct("==") => (BinOp::Eq, 6),
            Tok::Punct("!=") => (BinOp::NotEq, 6),
            Tok::Punct("===") => (BinOp::StrictEq, 6),
            Tok::Punct("!==") => (BinOp::StrictNotEq, 6),
            Tok::Punct("<") => (BinOp::Lt, 7),
            Tok::Punct(">") => (BinOp::Gt, 7),
            Tok::Punct("<=") => (BinOp::LtEq, 7),
            Tok::Punct(">=") => (BinOp::GtEq, 7),
            Tok::Ident(w) if w == "in" && !no_in => (BinOp::In, 7),
            Tok::Ident(w) if w == "instanceof" => (BinOp::Instanceof, 7),
            Tok::Punct("<<") => (BinOp::Shl, 8),
            Tok::Punct(">>") => (BinOp::Shr, 8),
            Tok::Punct(">>>") => (BinOp::UShr, 8),
            Tok::Punct("+") => (BinOp::Add, 9),
            Tok::Punct("-") => (BinOp::Sub, 9),
            Tok::Punct("*") => (BinOp::Mul, 10),
            Tok::Punct("/") => (BinOp::Div, 10),
            Tok::Punct("%") => (BinOp::Rem, 10),
            Tok::Punct("**") => (BinOp::Pow, 11),
            _ => return None,
        };
        Some((op, prec, matches!(op, BinOp::Pow)))
    }

    fn parse_binary_expr(&mut self, min_prec: u8, no_in: bool) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary_expr()?;
        loop {
            // Logical operators first: they sit below the bitwise tier.
            let logical = match self.tok() {
                Tok::Punct("||") => Some((false, 1u8)),
                Tok::Punct("&&") => Some((true, 2u8)),
                _ => None,
            };
            if let Some((and, prec)) = logical {
                if prec < min_prec {
                    return Ok(left);
                }
                self.bump();
                let right = self.parse_binary_expr(prec + 1, no_in)?;
                left = Expr::Logical {
                    and,
                    left: Box::new(left),
                    right: Box::new(right),
                };
                continue;
            }

            let Some((op, prec, right_assoc)) = self.binary_op(no_in) else {
                return Ok(left);
            };
            if prec < min_prec {
                return Ok(left);
            }
            self.bump();
            let next_min = if right_assoc { prec } else { prec + 1 };
            let right = self.parse_binary_expr(next_min, no_in)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary_expr(&mut self) -> Result<Expr, ParseError> {
        let op = match self.tok() {
            Tok::Punct("!") => Some(UnaryOp::Not),
            Tok::Punct("~") => Some(UnaryOp::BitNot),
            Tok::Punct("+") => Some(UnaryOp::Pos),
            Tok::Punct("-") => Some(UnaryOp::Neg),
            Tok::Ident(w) if w == "typeof" => Some(UnaryOp::Typeof),
            Tok::Ident(w) if w == "void" => Some(UnaryOp::Void),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let expr = self.parse_unary_expr()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
            });
        }
        if self.at_punct("++") || self.at_punct("--") {
            let inc = self.at_punct("++");
            self.bump();
            let target = self.parse_unary_expr()?;
            if !matches!(target, Expr::Ident(_) | Expr::Member { .. }) {
                return Err(self.error_here("invalid increment/decrement target"));
            }
            return Ok(Expr::Update {
                inc,
                prefix: true,
                target: Box::new(target),
            });
        }
        if matches!(self.tok(), Tok::Ident(w) if w == "delete") {
            return Err(self.error_here("the delete operator is not supported"));
        }
        self.parse_postfix_expr()
    }

    fn parse_postfix_expr(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_call_member_expr()?;
        if (self.at_punct("++") || self.at_punct("--")) && self.cur().line == self.prev_line() {
            let inc = self.at_punct("++");
            if !matches!(expr, Expr::Ident(_) | Expr::Member { .. }) {
                return Err(self.error_here("invalid increment/decrement target"));
            }
            self.bump();
            return Ok(Expr::Update {
                inc,
                prefix: false,
                target: Box::new(expr),
            });
        }
        Ok(expr)
    }

    fn parse_call_member_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = if self.at_word("new") {
            self.bump();
            let callee = self.parse_new_callee()?;
            let args = if self.at_punct("(") {
                self.parse_args()?
            } else {
                Vec::new()
            };
            Expr::New {
                callee: Box::new(callee),
                args,
            }
        } else {
            self.parse_primary_expr()?
        };

        loop {
            if self.eat_punct(".") {
                let name = self.expect_property_name()?;
                expr = Expr::Member {
                    obj: Box::new(expr),
                    prop: MemberProp::Dot(name),
                };
            } else if self.at_punct("[") {
                self.bump();
                let idx = self.parse_expr(false)?;
                self.expect_punct("]")?;
                expr = Expr::Member {
                    obj: Box::new(expr),
                    prop: MemberProp::Index(Box::new(idx)),
                };
            } else if self.at_punct("(") {
                let args = self.parse_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if self.ts && self.at_word("as") {
                self.bump();
                self.skip_type(&[",", ")", "]", "}", ";"])?;
            } else if matches!(self.tok(), Tok::Template(_)) {
                return Err(self.error_here("tagged template literals are not supported"));
            } else {
                return Ok(expr);
            }
        }
    }

    /// A `new` callee: a primary expression plus member accesses, but no
    /// call — calls after `new X(...)` belong to the result.
    fn parse_new_callee(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            if self.eat_punct(".") {
                let name = self.expect_property_name()?;
                expr = Expr::Member {
                    obj: Box::new(expr),
                    prop: MemberProp::Dot(name),
                };
            } else if self.at_punct("[") {
                self.bump();
                let idx = self.parse_expr(false)?;
                self.expect_punct("]")?;
                expr = Expr::Member {
                    obj: Box::new(expr),
                    prop: MemberProp::Index(Box::new(idx)),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.at_punct(")") {
            if self.at_punct("...") {
                return Err(self.error_here("spread arguments are not supported"));
            }
            args.push(self.parse_assign_expr(false)?);
            if !self.at_punct(")") {
                self.expect_punct(",")?;
            }
        }
        self.bump();
        Ok(args)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, ParseError> {
        match self.tok().clone() {
            Tok::Num(n) => {
                self.bump();
                Ok(Expr::Num(n))
            }
            Tok::Str(s) => {
                self.bump();
                Ok(Expr::Str(s))
            }
            Tok::Template(parts) => {
                let line = self.cur().line;
                self.bump();
                let mut chunks = Vec::new();
                for part in parts {
                    match part {
                        TplPart::Str(s) => chunks.push(TplChunk::Str(s)),
                        TplPart::Expr(raw) => {
                            let expr = parse_expr_source(&raw, self.ts).map_err(|mut e| {
                                e.line += line - 1;
                                e
                            })?;
                            chunks.push(TplChunk::Expr(expr));
                        }
                    }
                }
                Ok(Expr::Template(chunks))
            }
            Tok::Punct("(") => {
                self.bump();
                let e = self.parse_expr(false)?;
                self.expect_punct(")")?;
                Ok(e)
            }
            Tok::Punct("[") => {
                self.bump();
                let mut elems = Vec::new();
                while !self.at_punct("]") {
                    if self.eat_punct(",") {
                        elems.push(Expr::Undefined);
                        continue;
                    }
                    if self.at_punct("...") {
                        return Err(self.error_here("spread elements are not supported"));
                    }
                    elems.push(self.parse_assign_expr(false)?);
                    if !self.at_punct("]") {
                        self.expect_punct(",")?;
                    }
                }
                self.bump();
                Ok(Expr::Array(elems))
            }
            Tok::Punct("{") => self.parse_object_literal(),
            Tok::Punct("...") => Err(self.error_here("spread syntax is not supported")),
            Tok::Ident(word) => match word.as_str() {
                "true" => {
                    self.bump();
                    Ok(Expr::Bool(true))
                }
                "false" => {
                    self.bump();
                    Ok(Expr::Bool(false))
                }
                "null" => {
                    self.bump();
                    Ok(Expr::Null)
                }
                "undefined" => {
                    self.bump();
                    Ok(Expr::Undefined)
                }
                "this" => {
                    if self.arrow_depth > 0 {
                        return Err(
                            self.error_here("'this' inside arrow functions is not supported")
                        );
                    }
                    self.bump();
                    Ok(Expr::This)
                }
                "function" => {
                    self.bump();
                    let name = if matches!(self.tok(), Tok::Ident(n) if !RESERVED.contains(&n.as_str()))
                    {
                        Some(self.expect_binding_ident()?)
                    } else {
                        None
                    };
                    if self.ts && self.at_punct("<") {
                        self.skip_type_params()?;
                    }
                    self.expect_punct("(")?;
                    let params = self.parse_params()?;
                    self.expect_punct(")")?;
                    if self.ts && self.eat_punct(":") {
                        self.skip_type(&["{"])?;
                    }
                    let body = self.parse_function_body()?;
                    Ok(Expr::Function(FnExpr { name, params, body }))
                }
                "class" => Err(self.error_here("class expressions are not supported")),
                w if RESERVED.contains(&w) => {
                    Err(self.error_here(format!("unexpected keyword '{w}'")))
                }
                _ => {
                    self.bump();
                    Ok(Expr::Ident(word))
                }
            },
            Tok::Punct(p) => Err(self.error_here(format!("unexpected token '{p}'"))),
            Tok::Eof => Err(self.error_here("unexpected end of input")),
        }
    }

    fn parse_object_literal(&mut self) -> Result<Expr, ParseError> {
        self.expect_punct("{")?;
        let mut props = Vec::new();
        while !self.at_punct("}") {
            if self.at_punct("...") {
                return Err(self.error_here("spread properties are not supported"));
            }
            if self.at_punct("[") {
                return Err(self.error_here("computed property keys are not supported"));
            }
            let key = match self.tok().clone() {
                Tok::Ident(name) => {
                    self.bump();
                    PropKey::Ident(name)
                }
                Tok::Str(s) => {
                    self.bump();
                    PropKey::Str(s)
                }
                Tok::Num(n) => {
                    self.bump();
                    PropKey::Num(n)
                }
                _ => return Err(self.error_here("expected property key")),
            };
            if let PropKey::Ident(name) = &key {
                if (name == "get" || name == "set")
                    && !self.at_punct(":")
                    && !self.at_punct(",")
                    && !self.at_punct("}")
                    && !self.at_punct("(")
                {
                    return Err(self.error_here("object accessors are not supported"));
                }
            }
            let value = if self.eat_punct(":") {
                self.parse_assign_expr(false)?
            } else if self.at_punct("(") {
                // Method shorthand desugars directly to a function property.
                self.bump();
                let params = self.parse_params()?;
                self.expect_punct(")")?;
                if self.ts && self.eat_punct(":") {
                    self.skip_type(&["{"])?;
                }
                let body = self.parse_function_body()?;
                Expr::Function(FnExpr {
                    name: None,
                    params,
                    body,
                })
            } else {
                // Shorthand `{a}`.
                match &key {
                    PropKey::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                        Expr::Ident(name.clone())
                    }
                    _ => return Err(self.error_here("expected ':' after property key")),
                }
            };
            props.push((key, value));
            if !self.at_punct("}") {
                self.expect_punct(",")?;
            }
        }
        self.bump();
        Ok(Expr::Object(props))
    }

    // ---- TypeScript type skipping ----

    /// Consume a type annotation, stopping before any of `stops` at bracket
    /// depth zero. End of input is accepted as a terminator for
    /// statement-final annotations.
    fn skip_type(&mut self, stops: &[&str]) -> Result<(), ParseError> {
        let mut paren = 0u32;
        let mut angle = 0u32;
        loop {
            match self.tok() {
                Tok::Eof => {
                    if paren == 0 && angle == 0 {
                        return Ok(());
                    }
                    return Err(self.error_here("unterminated type annotation"));
                }
                Tok::Punct(p) => {
                    let p = *p;
                    if paren == 0 && angle == 0 && stops.contains(&p) {
                        return Ok(());
                    }
                    match p {
                        "(" | "[" | "{" => paren += 1,
                        ")" | "]" | "}" => {
                            if paren == 0 {
                                return Ok(());
                            }
                            paren -= 1;
                        }
                        "<" => angle += 1,
                        ">" => angle = angle.saturating_sub(1),
                        ">>" => angle = angle.saturating_sub(2),
                        ">>>" => angle = angle.saturating_sub(3),
                        _ => {}
                    }
                    self.bump();
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn skip_type_params(&mut self) -> Result<(), ParseError> {
        self.expect_punct("<")?;
        let mut depth = 1u32;
        loop {
            match self.tok() {
                Tok::Eof => return Err(self.error_here("unterminated type parameter list")),
                Tok::Punct("<") => depth += 1,
                Tok::Punct(">") => depth -= 1,
                Tok::Punct(">>") => depth = depth.saturating_sub(2),
                Tok::Punct(">>>") => depth = depth.saturating_sub(3),
                _ => {}
            }
            self.bump();
            if depth == 0 {
                return Ok(());
            }
        }
    }

    fn skip_interface(&mut self) -> Result<(), ParseError> {
        self.bump(); // interface
        self.expect_binding_ident()?;
        if self.at_punct("<") {
            self.skip_type_params()?;
        }
        while !self.at_punct("{") {
            if matches!(self.tok(), Tok::Eof) {
                return Err(self.error_here("unterminated interface declaration"));
            }
            self.bump();
        }
        let mut depth = 0u32;
        loop {
            match self.tok() {
                Tok::Eof => return Err(self.error_here("unterminated interface declaration")),
                Tok::Punct("{") => depth += 1,
                Tok::Punct("}") => depth -= 1,
                _ => {}
            }
            self.bump();
            if depth == 0 {
                return Ok(());
            }
        }
    }

    fn skip_type_alias(&mut self) -> Result<(), ParseError> {
        self.bump(); // type
        self.expect_binding_ident()?;
        if self.at_punct("<") {
            self.skip_type_params()?;
        }
        self.expect_punct("=")?;
        self.skip_type(&[";"])?;
        self.expect_semi()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_es(src: &str) -> Vec<Stmt> {
        parse(src, Flavor::Es).unwrap()
    }

    fn parse_ts(src: &str) -> Vec<Stmt> {
        parse(src, Flavor::Ts).unwrap()
    }

    #[test]
    fn function_decl_with_return() {
        let prog = parse_es("function main(inp) { return true; }");
        let Stmt::FunctionDecl { name, params, body } = &prog[0] else {
            panic!("expected function decl");
        };
        assert_eq!(name, "main");
        assert_eq!(params.len(), 1);
        assert_eq!(body, &vec![Stmt::Return(Some(Expr::Bool(true)))]);
    }

    #[test]
    fn precedence_binds_mul_over_add() {
        let prog = parse_es("var x = 1 + 2 * 3;");
        let Stmt::VarDecl { decls, .. } = &prog[0] else {
            panic!()
        };
        let Some(Expr::Binary { op: BinOp::Add, right, .. }) = &decls[0].1 else {
            panic!("expected + at the top");
        };
        assert!(matches!(**right, Expr::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn asi_accepts_newline_terminated_statements() {
        let prog = parse_es("var a = 1\nvar b = 2\n");
        assert_eq!(prog.len(), 2);
    }

    #[test]
    fn restricted_return_production() {
        let prog = parse_es("function f() { return\n1; }");
        let Stmt::FunctionDecl { body, .. } = &prog[0] else {
            panic!()
        };
        assert_eq!(body[0], Stmt::Return(None));
    }

    #[test]
    fn return_outside_function_rejected() {
        assert!(parse("return 1;", Flavor::Es).is_err());
    }

    #[test]
    fn arrow_functions_parse() {
        let prog = parse_es("var f = (a, b) => a + b;");
        let Stmt::VarDecl { decls, .. } = &prog[0] else {
            panic!()
        };
        assert!(matches!(decls[0].1, Some(Expr::Arrow { .. })));
    }

    #[test]
    fn this_in_arrow_rejected() {
        assert!(parse("var f = () => this.x;", Flavor::Es).is_err());
    }

    #[test]
    fn this_in_function_inside_arrow_allowed() {
        assert!(parse("var f = () => function() { return this; };", Flavor::Es).is_ok());
    }

    #[test]
    fn spread_rejected() {
        assert!(parse("f(...args);", Flavor::Es).is_err());
        assert!(parse("var a = [...b];", Flavor::Es).is_err());
    }

    #[test]
    fn regex_literals_rejected() {
        // '/' lexes as division; a leading regex literal cannot parse.
        assert!(parse("var r = /a+/;", Flavor::Es).is_err());
    }

    #[test]
    fn ts_annotations_skipped() {
        let prog = parse_ts("function f(a: number, b?: string): boolean { return a > 0; }");
        let Stmt::FunctionDecl { params, .. } = &prog[0] else {
            panic!()
        };
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn ts_interface_and_alias_skipped() {
        let prog = parse_ts("interface Foo { a: number; b: string[] }\ntype Bar = Foo | null;\nvar x = 1;");
        assert_eq!(
            prog.iter().filter(|s| !matches!(s, Stmt::Empty)).count(),
            1
        );
    }

    #[test]
    fn ts_as_cast_skipped() {
        let prog = parse_ts("var x = (y as Array<string>).length;");
        let Stmt::VarDecl { decls, .. } = &prog[0] else {
            panic!()
        };
        assert!(matches!(decls[0].1, Some(Expr::Member { .. })));
    }

    #[test]
    fn ts_generic_type_args_in_annotation() {
        let prog = parse_ts("var m: Map<string, Array<number>> = x;");
        assert_eq!(prog.len(), 1);
    }

    #[test]
    fn class_with_methods() {
        let prog = parse_es("class A { constructor(x) { this.x = x; } get2() { return 2; } }");
        let Stmt::Class(decl) = &prog[0] else { panic!() };
        assert!(decl.ctor.is_some());
        assert_eq!(decl.methods.len(), 1);
    }

    #[test]
    fn class_extends_rejected() {
        assert!(parse("class A extends B {}", Flavor::Es).is_err());
    }

    #[test]
    fn template_literal_chunks() {
        let prog = parse_es("var s = `a${x + 1}b`;");
        let Stmt::VarDecl { decls, .. } = &prog[0] else {
            panic!()
        };
        let Some(Expr::Template(chunks)) = &decls[0].1 else {
            panic!()
        };
        assert_eq!(chunks.len(), 3);
        assert!(matches!(chunks[1], TplChunk::Expr(Expr::Binary { .. })));
    }

    #[test]
    fn for_in_and_for_of() {
        assert!(matches!(
            parse_es("for (var k in o) {}")[0],
            Stmt::ForIn { decl: true, .. }
        ));
        assert!(matches!(
            parse_es("for (var v of a) {}")[0],
            Stmt::ForOf { .. }
        ));
    }

    #[test]
    fn in_operator_allowed_outside_for_init() {
        let prog = parse_es("var x = 'k' in o;");
        let Stmt::VarDecl { decls, .. } = &prog[0] else {
            panic!()
        };
        assert!(matches!(
            decls[0].1,
            Some(Expr::Binary { op: BinOp::In, .. })
        ));
    }

    #[test]
    fn destructuring_declarations() {
        let prog = parse_es("var {a, b: c, d = 1} = o; var [x, , y] = arr;");
        assert_eq!(prog.len(), 2);
    }

    #[test]
    fn nested_destructuring_rejected() {
        assert!(parse("var {a: {b}} = o;", Flavor::Es).is_err());
    }

    #[test]
    fn deep_nesting_bounded() {
        let src = format!("var x = {}1{};", "(".repeat(300), ")".repeat(300));
        assert!(parse(&src, Flavor::Es).is_err());
    }

    #[test]
    fn error_carries_position() {
        let err = parse("var x = ;", Flavor::Es).unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.col > 1);
    }

    #[test]
    fn export_prefix_stripped() {
        let prog = parse_es("export function main(p) { return true; }");
        assert!(matches!(prog[0], Stmt::FunctionDecl { .. }));
    }

    #[test]
    fn import_rejected() {
        assert!(parse("import x from 'y';", Flavor::Es).is_err());
    }

    #[test]
    fn switch_cases_parse() {
        let prog = parse_es(
            "function f(x) { switch (x) { case 1: return 'a'; default: return 'b'; } }",
        );
        let Stmt::FunctionDecl { body, .. } = &prog[0] else {
            panic!()
        };
        let Stmt::Switch { cases, .. } = &body[0] else {
            panic!()
        };
        assert_eq!(cases.len(), 2);
        assert!(cases[1].0.is_none());
    }
}
