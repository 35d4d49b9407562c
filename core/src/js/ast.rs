//! AST for the accepted scripting subset.
//!
//! The parser produces the full node set. [`super::lower`] desugars every
//! ES6-level node (`Arrow`, `Template`, `Class`, `ForOf`, `Pow`,
//! default/destructuring parameters, `Let`/`Const`) into the core ES5 nodes,
//! which are the only ones the emitter prints and the evaluator executes.

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
    This,
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(PropKey, Expr)>),
    Function(FnExpr),
    Arrow {
        params: Vec<Param>,
        body: Vec<Stmt>,
    },
    Template(Vec<TplChunk>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Update {
        inc: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        and: bool,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Cond {
        test: Box<Expr>,
        cons: Box<Expr>,
        alt: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        obj: Box<Expr>,
        prop: MemberProp,
    },
    Seq(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FnExpr {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TplChunk {
    Str(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PropKey {
    Ident(String),
    Str(String),
    Num(f64),
}

impl PropKey {
    pub fn as_str(&self) -> String {
        match self {
            PropKey::Ident(s) | PropKey::Str(s) => s.clone(),
            PropKey::Num(n) => super::number::format_number(*n),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MemberProp {
    Dot(String),
    Index(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
    Pos,
    BitNot,
    Typeof,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    In,
    Instanceof,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// A function parameter. Lowering reduces every parameter to a plain
/// identifier with no default.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Param {
    pub pat: Pattern,
    pub default: Option<Expr>,
}

impl Param {
    pub fn ident(name: impl Into<String>) -> Self {
        Self {
            pat: Pattern::Ident(name.into()),
            default: None,
        }
    }

    /// The identifier name of an already-lowered parameter.
    pub fn name(&self) -> &str {
        match &self.pat {
            Pattern::Ident(name) => name,
            _ => unreachable!("parameter patterns are lowered before evaluation"),
        }
    }
}

/// Binding patterns. Destructuring is accepted one level deep.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Pattern {
    Ident(String),
    /// `{key, alias: name, other = default}`
    Object(Vec<ObjectPatProp>),
    /// `[a, , b = 1]` — `None` marks an elision.
    Array(Vec<Option<ArrayPatElem>>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ObjectPatProp {
    pub key: String,
    pub binding: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ArrayPatElem {
    pub binding: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    VarDecl {
        kind: DeclKind,
        decls: Vec<(Pattern, Option<Expr>)>,
    },
    FunctionDecl {
        name: String,
        params: Vec<Param>,
        body: Vec<Stmt>,
    },
    Class(ClassDecl),
    Return(Option<Expr>),
    If {
        test: Expr,
        cons: Box<Stmt>,
        alt: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForIn {
        decl: bool,
        name: String,
        object: Expr,
        body: Box<Stmt>,
    },
    ForOf {
        name: String,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        catch: Option<(String, Vec<Stmt>)>,
        finally: Option<Vec<Stmt>>,
    },
    Switch {
        disc: Expr,
        /// `None` test marks the default case.
        cases: Vec<(Option<Expr>, Vec<Stmt>)>,
    },
    Expr(Expr),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ForInit {
    VarDecl {
        kind: DeclKind,
        decls: Vec<(Pattern, Option<Expr>)>,
    },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ClassDecl {
    pub name: String,
    pub ctor: Option<(Vec<Param>, Vec<Stmt>)>,
    pub methods: Vec<ClassMethod>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ClassMethod {
    pub name: String,
    pub is_static: bool,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}
