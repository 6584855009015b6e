use std::time::Duration;

/// Parsed rule expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    NumberLiteral(f64),
    StringLiteral(String),
    Selector(Selector),
    Range {
        expr: Box<Expr>,
        range: Duration,
    },
    Subquery {
        expr: Box<Expr>,
        range: Duration,
        step: Option<Duration>,
    },
    Offset {
        expr: Box<Expr>,
        offset: Duration,
        negative: bool,
    },
    At {
        expr: Box<Expr>,
        at: AtModifier,
    },
    Call {
        func: String,
        args: Vec<Expr>,
        grouping: Option<Grouping>,
    },
    Aggregate {
        op: String,
        args: Vec<Expr>,
        grouping: Option<Grouping>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        modifiers: BinaryModifiers,
    },
    Paren(Box<Expr>),
}

/// Series or log stream selector. Log pipelines only follow selectors
/// without a metric name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    pub name: Option<String>,
    pub matchers: Vec<Matcher>,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Matcher {
    pub name: String,
    pub op: MatchOp,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Equal,
    NotEqual,
    Regex,
    NotRegex,
}

/// Evaluation time pinned with `@`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AtModifier {
    Timestamp(f64),
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    pub without: bool,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Unless,
    Eql,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And | Self::Unless => 2,
            Self::Eql | Self::Neq | Self::Lt | Self::Lte | Self::Gt | Self::Gte => 3,
            Self::Add | Self::Sub => 4,
            Self::Mul | Self::Div | Self::Mod => 5,
            Self::Pow => 6,
        }
    }

    pub fn is_comparison(self) -> bool {
        self.precedence() == 3
    }

    pub fn is_set_operator(self) -> bool {
        matches!(self, Self::Or | Self::And | Self::Unless)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryModifiers {
    pub return_bool: bool,
    pub matching: Option<VectorMatching>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorMatching {
    pub on: bool,
    pub labels: Vec<String>,
    pub group: Option<GroupSide>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSide {
    Left(Vec<String>),
    Right(Vec<String>),
}

/// One step of a log pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Alternatives joined with `or` match when any of them does.
    LineFilter {
        op: LineFilterOp,
        values: Vec<LineFilterValue>,
    },
    Parser {
        name: String,
        argument: Option<String>,
        flags: Vec<String>,
        params: Vec<ExtractionParam>,
    },
    LineFormat(String),
    LabelFormat(Vec<LabelAssignment>),
    Unwrap { label: String, conversion: Option<String> },
    Drop(Vec<String>),
    Keep(Vec<String>),
    LabelFilter(LabelFilter),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFilterOp {
    Contains,
    NotContains,
    Regex,
    NotRegex,
    Pattern,
    NotPattern,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineFilterValue {
    Text(String),
    Ip(String),
}

/// `label` or `label="expression"` argument of `json` and `logfmt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionParam {
    pub label: String,
    pub expression: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelAssignment {
    pub target: String,
    pub source: String,
    pub template: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LabelFilter {
    Compare {
        label: String,
        op: FilterOp,
        value: FilterValue,
    },
    And(Box<LabelFilter>, Box<LabelFilter>),
    Or(Box<LabelFilter>, Box<LabelFilter>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Match(MatchOp),
    Eql,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    String(String),
    Ip(String),
    Number(f64),
    Duration(Duration),
    Bytes(u64),
}
