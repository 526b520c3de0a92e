use warren_var::{Symbol, Var};

/// One actual argument in a call or list constructor.
#[derive(Debug, PartialEq, Clone)]
pub enum Arg {
    Normal(Expr),
    Splice(Expr),
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ScatterKind {
    Required,
    Optional,
    Rest,
}

/// One target in a destructuring assignment `{a, ?b = 1, @rest} = ...`.
#[derive(Debug, PartialEq, Clone)]
pub struct ScatterItem {
    pub kind: ScatterKind,
    pub id: Symbol,
    pub expr: Option<Expr>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Eq,
    NEq,
    Gt,
    GtE,
    Lt,
    LtE,
    In,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Exp => "^",
            Self::Eq => "==",
            Self::NEq => "!=",
            Self::Gt => ">",
            Self::GtE => ">=",
            Self::Lt => "<",
            Self::LtE => "<=",
            Self::In => "in",
        };
        f.write_str(s)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// The code set a catch expression or except arm handles.
#[derive(Debug, PartialEq, Clone)]
pub enum CatchCodes {
    Codes(Vec<Arg>),
    Any,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    Value(Var),
    Id(Symbol),
    Assign {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Pass {
        args: Vec<Arg>,
    },
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Prop {
        location: Box<Expr>,
        property: Box<Expr>,
    },
    Verb {
        location: Box<Expr>,
        verb: Box<Expr>,
        args: Vec<Arg>,
    },
    Call {
        function: Symbol,
        args: Vec<Arg>,
    },
    Index(Box<Expr>, Box<Expr>),
    Range {
        base: Box<Expr>,
        from: Box<Expr>,
        to: Box<Expr>,
    },
    Cond {
        condition: Box<Expr>,
        consequence: Box<Expr>,
        alternative: Box<Expr>,
    },
    Catch {
        trye: Box<Expr>,
        codes: CatchCodes,
        except: Option<Box<Expr>>,
    },
    List(Vec<Arg>),
    Scatter(Vec<ScatterItem>, Box<Expr>),
    /// The `$` inside an index or range: the length of the collection being
    /// indexed.
    Length,
}

#[derive(Debug, PartialEq, Clone)]
pub struct CondArm {
    pub condition: Expr,
    pub statements: Vec<Stmt>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ExceptArm {
    pub id: Option<Symbol>,
    pub codes: CatchCodes,
    pub statements: Vec<Stmt>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Stmt {
    pub node: StmtNode,
    /// Line number in the verb source, for tracebacks.
    pub line: usize,
}

impl Stmt {
    pub fn new(node: StmtNode, line: usize) -> Self {
        Stmt { node, line }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum StmtNode {
    Cond {
        arms: Vec<CondArm>,
        otherwise: Vec<Stmt>,
    },
    ForList {
        id: Symbol,
        expr: Expr,
        body: Vec<Stmt>,
    },
    ForRange {
        id: Symbol,
        from: Expr,
        to: Expr,
        body: Vec<Stmt>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    TryExcept {
        body: Vec<Stmt>,
        excepts: Vec<ExceptArm>,
    },
    TryFinally {
        body: Vec<Stmt>,
        handler: Vec<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Expr(Expr),
}

/// A parsed verb body: the executable, cacheable unit.
#[derive(Debug, PartialEq, Clone)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}
