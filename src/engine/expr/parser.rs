use std::net::IpAddr;
use std::time::Duration;

use regex::Regex;

use crate::engine::expr::ast::{
    AtModifier, BinaryModifiers, BinaryOp, Expr, ExtractionParam, FilterOp, FilterValue,
    GroupSide, Grouping, LabelAssignment, LabelFilter, LineFilterOp, LineFilterValue, MatchOp,
    Matcher, Selector, Stage, UnaryOp, VectorMatching,
};
use crate::engine::expr::lexer::{Token, TokenKind, tokenize};
use crate::engine::expr::{ExprError, ExpressionParser};
use crate::engine::labels::{METRIC_NAME_LABEL, matches_label_name_grammar};

/// Bundled parser for rule expressions.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParser;

impl ExpressionParser for QueryParser {
    type Ast = Expr;

    fn parse(&self, input: &str) -> Result<Expr, ExprError> {
        parse_expr(input)
    }
}

/// Parses `input` into an [`Expr`].
pub fn parse_expr(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
        depth: 0,
    };
    if parser.peek() == &TokenKind::Eof {
        return Err(parser.error_here("no expression found in input"));
    }
    let expr = parser.expression(0)?;
    if parser.peek() != &TokenKind::Eof {
        return Err(parser.unexpected("expression"));
    }
    Ok(expr)
}

const KEYWORDS: &[&str] = &[
    "by",
    "without",
    "on",
    "ignoring",
    "group_left",
    "group_right",
    "bool",
    "offset",
    "and",
    "or",
    "unless",
];

const AGGREGATIONS: &[(&str, usize)] = &[
    ("sum", 1),
    ("avg", 1),
    ("min", 1),
    ("max", 1),
    ("count", 1),
    ("group", 1),
    ("stddev", 1),
    ("stdvar", 1),
    ("sort", 1),
    ("sort_desc", 1),
    ("topk", 2),
    ("bottomk", 2),
    ("approx_topk", 2),
    ("limitk", 2),
    ("limit_ratio", 2),
    ("quantile", 2),
    ("count_values", 2),
];

/// Function name, minimum and maximum argument count (`None` is variadic).
const FUNCTIONS: &[(&str, usize, Option<usize>)] = &[
    ("abs", 1, Some(1)),
    ("absent", 1, Some(1)),
    ("absent_over_time", 1, Some(1)),
    ("acos", 1, Some(1)),
    ("acosh", 1, Some(1)),
    ("asin", 1, Some(1)),
    ("asinh", 1, Some(1)),
    ("atan", 1, Some(1)),
    ("atanh", 1, Some(1)),
    ("avg_over_time", 1, Some(1)),
    ("bytes_over_time", 1, Some(1)),
    ("bytes_rate", 1, Some(1)),
    ("ceil", 1, Some(1)),
    ("changes", 1, Some(1)),
    ("clamp", 3, Some(3)),
    ("clamp_max", 2, Some(2)),
    ("clamp_min", 2, Some(2)),
    ("cos", 1, Some(1)),
    ("cosh", 1, Some(1)),
    ("count_over_time", 1, Some(1)),
    ("day_of_month", 0, Some(1)),
    ("day_of_week", 0, Some(1)),
    ("day_of_year", 0, Some(1)),
    ("days_in_month", 0, Some(1)),
    ("deg", 1, Some(1)),
    ("delta", 1, Some(1)),
    ("deriv", 1, Some(1)),
    ("double_exponential_smoothing", 3, Some(3)),
    ("exp", 1, Some(1)),
    ("first_over_time", 1, Some(1)),
    ("floor", 1, Some(1)),
    ("histogram_avg", 1, Some(1)),
    ("histogram_count", 1, Some(1)),
    ("histogram_fraction", 3, Some(3)),
    ("histogram_quantile", 2, Some(2)),
    ("histogram_stddev", 1, Some(1)),
    ("histogram_stdvar", 1, Some(1)),
    ("histogram_sum", 1, Some(1)),
    ("holt_winters", 3, Some(3)),
    ("hour", 0, Some(1)),
    ("idelta", 1, Some(1)),
    ("increase", 1, Some(1)),
    ("info", 1, Some(2)),
    ("irate", 1, Some(1)),
    ("label_join", 3, None),
    ("label_replace", 5, Some(5)),
    ("last_over_time", 1, Some(1)),
    ("ln", 1, Some(1)),
    ("log10", 1, Some(1)),
    ("log2", 1, Some(1)),
    ("mad_over_time", 1, Some(1)),
    ("max_over_time", 1, Some(1)),
    ("min_over_time", 1, Some(1)),
    ("minute", 0, Some(1)),
    ("month", 0, Some(1)),
    ("pi", 0, Some(0)),
    ("predict_linear", 2, Some(2)),
    ("present_over_time", 1, Some(1)),
    ("quantile_over_time", 2, Some(2)),
    ("rad", 1, Some(1)),
    ("rate", 1, Some(1)),
    ("rate_counter", 1, Some(1)),
    ("resets", 1, Some(1)),
    ("round", 1, Some(2)),
    ("scalar", 1, Some(1)),
    ("sgn", 1, Some(1)),
    ("sin", 1, Some(1)),
    ("sinh", 1, Some(1)),
    ("sort_by_label", 1, None),
    ("sort_by_label_desc", 1, None),
    ("sqrt", 1, Some(1)),
    ("stddev_over_time", 1, Some(1)),
    ("stdvar_over_time", 1, Some(1)),
    ("sum_over_time", 1, Some(1)),
    ("tan", 1, Some(1)),
    ("tanh", 1, Some(1)),
    ("time", 0, Some(0)),
    ("timestamp", 1, Some(1)),
    ("ts_of_last_over_time", 1, Some(1)),
    ("ts_of_max_over_time", 1, Some(1)),
    ("ts_of_min_over_time", 1, Some(1)),
    ("vector", 1, Some(1)),
    ("year", 0, Some(1)),
];

const UNWRAP_CONVERSIONS: &[&str] = &["bytes", "duration", "duration_seconds"];

const PARSER_FLAGS: &[&str] = &["strict", "keep-empty"];

/// Nested sub-expressions deeper than this are rejected instead of
/// exhausting the stack.
const MAX_NESTING_DEPTH: usize = 128;

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn expression(&mut self, min_precedence: u8) -> Result<Expr, ExprError> {
        self.enter()?;
        let expr = self.binary_expression(min_precedence);
        self.depth -= 1;
        expr
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error_here("expression nesting too deep"));
        }
        self.depth += 1;
        Ok(())
    }

    fn binary_expression(&mut self, min_precedence: u8) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.binary_op() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let modifiers = self.binary_modifiers(op)?;
            let next_min = if op == BinaryOp::Pow {
                precedence
            } else {
                precedence + 1
            };
            let rhs = self.expression(next_min)?;
            if is_log_pipeline(&lhs) || is_log_pipeline(&rhs) {
                return Err(self.error_here("log queries cannot be used in binary operations"));
            }
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                modifiers,
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek() {
            TokenKind::Sub => UnaryOp::Minus,
            TokenKind::Add => UnaryOp::Plus,
            _ => {
                let primary = self.primary()?;
                return self.postfix(primary);
            }
        };
        self.advance();
        let operand = self.expression(BinaryOp::Pow.precedence())?;
        Ok(Expr::Unary {
            op,
            expr: Box::new(operand),
        })
    }

    fn binary_op(&self) -> Option<BinaryOp> {
        Some(match self.peek() {
            TokenKind::Eql => BinaryOp::Eql,
            TokenKind::Neq => BinaryOp::Neq,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Lte => BinaryOp::Lte,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Gte => BinaryOp::Gte,
            TokenKind::Add => BinaryOp::Add,
            TokenKind::Sub => BinaryOp::Sub,
            TokenKind::Mul => BinaryOp::Mul,
            TokenKind::Div => BinaryOp::Div,
            TokenKind::Mod => BinaryOp::Mod,
            TokenKind::Pow => BinaryOp::Pow,
            TokenKind::Ident(word) => match word.as_str() {
                "or" => BinaryOp::Or,
                "and" => BinaryOp::And,
                "unless" => BinaryOp::Unless,
                _ => return None,
            },
            _ => return None,
        })
    }

    fn binary_modifiers(&mut self, op: BinaryOp) -> Result<BinaryModifiers, ExprError> {
        let mut modifiers = BinaryModifiers::default();
        if self.peek_ident() == Some("bool") {
            if !op.is_comparison() {
                return Err(
                    self.error_here("bool modifier can only be used on comparison operators"),
                );
            }
            self.advance();
            modifiers.return_bool = true;
        }

        let on = match self.peek_ident() {
            Some("on") => true,
            Some("ignoring") => false,
            _ => return Ok(modifiers),
        };
        self.advance();
        let labels = self.label_list()?;

        let group = match self.peek_ident() {
            Some(side @ ("group_left" | "group_right")) => {
                if op.is_set_operator() {
                    return Err(self.error_here(format!(
                        "no grouping allowed for \"{}\" operation",
                        self.token_text()
                    )));
                }
                let left = side == "group_left";
                self.advance();
                let extra = if self.peek() == &TokenKind::LeftParen {
                    self.label_list()?
                } else {
                    Vec::new()
                };
                Some(if left {
                    GroupSide::Left(extra)
                } else {
                    GroupSide::Right(extra)
                })
            }
            _ => None,
        };

        modifiers.matching = Some(VectorMatching { on, labels, group });
        Ok(modifiers)
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.peek().clone() {
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expr::NumberLiteral(value))
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(Expr::StringLiteral(value))
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.expression(0)?;
                self.expect(TokenKind::RightParen, "paren expression")?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            TokenKind::LeftBrace => self.selector(None),
            TokenKind::Ident(word) => self.identifier_expression(word),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn identifier_expression(&mut self, word: String) -> Result<Expr, ExprError> {
        let lowered = word.to_ascii_lowercase();
        if lowered == "inf" || lowered == "nan" {
            self.advance();
            let value = if lowered == "inf" { f64::INFINITY } else { f64::NAN };
            return Ok(Expr::NumberLiteral(value));
        }

        if let Some(&(_, arity)) = AGGREGATIONS.iter().find(|(name, _)| *name == word) {
            let next = self.peek_nth(1);
            let opens = matches!(next, TokenKind::LeftParen)
                || matches!(next, TokenKind::Ident(kw) if kw == "by" || kw == "without");
            if opens {
                return self.aggregation(word, arity);
            }
        }

        if self.peek_nth(1) == &TokenKind::LeftParen {
            return self.call(word);
        }

        if KEYWORDS.contains(&word.as_str()) {
            return Err(self.unexpected("expression"));
        }
        self.advance();
        if self.peek() == &TokenKind::LeftBrace {
            self.selector(Some(word))
        } else {
            Ok(Expr::Selector(Selector {
                name: Some(word),
                ..Selector::default()
            }))
        }
    }

    fn aggregation(&mut self, op: String, arity: usize) -> Result<Expr, ExprError> {
        self.advance();
        let mut grouping = self.grouping()?;
        let args = self.arguments()?;
        if grouping.is_none() {
            grouping = self.grouping()?;
        }
        if args.len() != arity {
            return Err(self.error_here(format!(
                "wrong number of arguments for aggregate expression provided, expected {arity}, got {}",
                args.len()
            )));
        }
        Ok(Expr::Aggregate { op, args, grouping })
    }

    fn call(&mut self, func: String) -> Result<Expr, ExprError> {
        let Some(&(_, min, max)) = FUNCTIONS.iter().find(|(name, _, _)| *name == func) else {
            return Err(self.error_here(format!("unknown function with name {func:?}")));
        };
        self.advance();
        let args = self.arguments()?;
        let too_many = max.is_some_and(|max| args.len() > max);
        if args.len() < min || too_many {
            return Err(self.error_here(format!(
                "wrong number of arguments for function {func:?}: got {}",
                args.len()
            )));
        }
        let grouping = if func.ends_with("_over_time") {
            self.grouping()?
        } else {
            None
        };
        Ok(Expr::Call {
            func,
            args,
            grouping,
        })
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ExprError> {
        self.expect(TokenKind::LeftParen, "argument list")?;
        let mut args = Vec::new();
        if self.peek() == &TokenKind::RightParen {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.expression(0)?);
            match self.peek() {
                TokenKind::Comma => self.advance(),
                TokenKind::RightParen => {
                    self.advance();
                    return Ok(args);
                }
                _ => return Err(self.unexpected("argument list")),
            }
        }
    }

    fn grouping(&mut self) -> Result<Option<Grouping>, ExprError> {
        let without = match self.peek_ident() {
            Some("by") => false,
            Some("without") => true,
            _ => return Ok(None),
        };
        self.advance();
        let labels = self.label_list()?;
        Ok(Some(Grouping { without, labels }))
    }

    fn label_list(&mut self) -> Result<Vec<String>, ExprError> {
        self.expect(TokenKind::LeftParen, "label list")?;
        let mut labels = Vec::new();
        loop {
            match self.peek().clone() {
                TokenKind::RightParen => {
                    self.advance();
                    return Ok(labels);
                }
                TokenKind::Ident(label) => {
                    if !matches_label_name_grammar(&label) {
                        return Err(self.error_here(format!("invalid label name {label:?}")));
                    }
                    self.advance();
                    labels.push(label);
                    match self.peek() {
                        TokenKind::Comma => self.advance(),
                        TokenKind::RightParen => {}
                        _ => return Err(self.unexpected("label list")),
                    }
                }
                _ => return Err(self.unexpected("label list")),
            }
        }
    }

    fn selector(&mut self, name: Option<String>) -> Result<Expr, ExprError> {
        let mut selector = Selector {
            name,
            ..Selector::default()
        };
        if self.peek() == &TokenKind::LeftBrace {
            selector.matchers = self.matchers()?;
        }

        if selector.name.is_some() {
            if selector
                .matchers
                .iter()
                .any(|matcher| matcher.name == METRIC_NAME_LABEL)
            {
                return Err(self.error_here("metric name must not be set twice"));
            }
        } else {
            if selector.matchers.is_empty() {
                return Err(self.error_here("selector must contain at least one label matcher"));
            }
            self.stages(&mut selector.stages)?;
        }
        Ok(Expr::Selector(selector))
    }

    fn matchers(&mut self) -> Result<Vec<Matcher>, ExprError> {
        self.expect(TokenKind::LeftBrace, "label matchers")?;
        let mut matchers = Vec::new();
        loop {
            match self.peek().clone() {
                TokenKind::RightBrace => {
                    self.advance();
                    return Ok(matchers);
                }
                TokenKind::Ident(name) => {
                    if !matches_label_name_grammar(&name) {
                        return Err(self.error_here(format!("invalid label name {name:?}")));
                    }
                    self.advance();
                    let op = self
                        .match_op()
                        .ok_or_else(|| self.unexpected("label matching operator"))?;
                    self.advance();
                    let value = self.string("label matcher")?;
                    if matches!(op, MatchOp::Regex | MatchOp::NotRegex) {
                        self.check_regex(&format!("^(?:{value})$"))?;
                    }
                    matchers.push(Matcher { name, op, value });
                    match self.peek() {
                        TokenKind::Comma => self.advance(),
                        TokenKind::RightBrace => {}
                        _ => return Err(self.unexpected("label matchers")),
                    }
                }
                _ => return Err(self.unexpected("label matchers")),
            }
        }
    }

    fn match_op(&self) -> Option<MatchOp> {
        match self.peek() {
            TokenKind::Assign => Some(MatchOp::Equal),
            TokenKind::Neq => Some(MatchOp::NotEqual),
            TokenKind::RegexMatch => Some(MatchOp::Regex),
            TokenKind::RegexNotMatch => Some(MatchOp::NotRegex),
            _ => None,
        }
    }

    fn at_stage(&self) -> bool {
        match self.peek() {
            TokenKind::Pipe
            | TokenKind::PipeExact
            | TokenKind::PipeRegex
            | TokenKind::RegexNotMatch
            | TokenKind::PipePattern
            | TokenKind::PatternNotMatch => true,
            TokenKind::Neq => self.line_filter_value_at(1),
            _ => false,
        }
    }

    fn stages(&mut self, stages: &mut Vec<Stage>) -> Result<(), ExprError> {
        while self.at_stage() {
            let stage = match self.peek() {
                TokenKind::Pipe => {
                    self.advance();
                    self.pipe_stage()?
                }
                _ => self.line_filter()?,
            };
            stages.push(stage);
        }
        Ok(())
    }

    fn line_filter(&mut self) -> Result<Stage, ExprError> {
        let op = match self.peek() {
            TokenKind::PipeExact => LineFilterOp::Contains,
            TokenKind::Neq => LineFilterOp::NotContains,
            TokenKind::PipeRegex => LineFilterOp::Regex,
            TokenKind::RegexNotMatch => LineFilterOp::NotRegex,
            TokenKind::PipePattern => LineFilterOp::Pattern,
            TokenKind::PatternNotMatch => LineFilterOp::NotPattern,
            _ => return Err(self.unexpected("line filter")),
        };
        self.advance();
        let mut values = vec![self.line_filter_value(op)?];
        while self.peek_ident() == Some("or") && self.line_filter_value_at(1) {
            self.advance();
            values.push(self.line_filter_value(op)?);
        }
        Ok(Stage::LineFilter { op, values })
    }

    fn line_filter_value_at(&self, n: usize) -> bool {
        match self.peek_nth(n) {
            TokenKind::String(_) => true,
            TokenKind::Ident(word) => word == "ip" && self.peek_nth(n + 1) == &TokenKind::LeftParen,
            _ => false,
        }
    }

    fn line_filter_value(&mut self, op: LineFilterOp) -> Result<LineFilterValue, ExprError> {
        if self.peek_ident() == Some("ip") {
            if !matches!(op, LineFilterOp::Contains | LineFilterOp::NotContains) {
                return Err(self.error_here("ip filter can only be used with |= or !="));
            }
            return Ok(LineFilterValue::Ip(self.ip_argument()?));
        }
        let pattern = self.string("line filter")?;
        if matches!(op, LineFilterOp::Regex | LineFilterOp::NotRegex) {
            self.check_regex(&pattern)?;
        }
        Ok(LineFilterValue::Text(pattern))
    }

    /// `ip("<address | cidr | range>")`
    fn ip_argument(&mut self) -> Result<String, ExprError> {
        self.advance();
        self.expect(TokenKind::LeftParen, "ip filter")?;
        let pattern = self.string("ip filter")?;
        if !is_ip_pattern(&pattern) {
            return Err(self.error_here(format!("invalid ip pattern {pattern:?}")));
        }
        self.expect(TokenKind::RightParen, "ip filter")?;
        Ok(pattern)
    }

    fn pipe_stage(&mut self) -> Result<Stage, ExprError> {
        if self.peek() == &TokenKind::LeftParen {
            return Ok(Stage::LabelFilter(self.label_filter_or()?));
        }
        let TokenKind::Ident(word) = self.peek().clone() else {
            return Err(self.unexpected("pipeline stage"));
        };

        // `| level="error"` is a label filter even when the label shares a stage name.
        if self.filter_op_at(1).is_some() {
            return Ok(Stage::LabelFilter(self.label_filter_or()?));
        }

        match word.as_str() {
            "json" | "logfmt" => {
                self.advance();
                let flags = if word == "logfmt" {
                    self.parser_flags()?
                } else {
                    Vec::new()
                };
                let params = self.extraction_params()?;
                Ok(Stage::Parser {
                    name: word,
                    argument: None,
                    flags,
                    params,
                })
            }
            "unpack" | "decolorize" => {
                self.advance();
                Ok(Stage::Parser {
                    name: word,
                    argument: None,
                    flags: Vec::new(),
                    params: Vec::new(),
                })
            }
            "regexp" => {
                self.advance();
                let pattern = self.string("regexp stage")?;
                let regex = self.check_regex(&pattern)?;
                if regex.capture_names().flatten().next().is_none() {
                    return Err(self.error_here("at least one named capture must be supplied"));
                }
                Ok(Stage::Parser {
                    name: word,
                    argument: Some(pattern),
                    flags: Vec::new(),
                    params: Vec::new(),
                })
            }
            "pattern" => {
                self.advance();
                let pattern = self.string("pattern stage")?;
                if !pattern.contains('<') {
                    return Err(self.error_here("at least one capture is required in pattern"));
                }
                Ok(Stage::Parser {
                    name: word,
                    argument: Some(pattern),
                    flags: Vec::new(),
                    params: Vec::new(),
                })
            }
            "line_format" => {
                self.advance();
                Ok(Stage::LineFormat(self.string("line_format stage")?))
            }
            "label_format" => {
                self.advance();
                Ok(Stage::LabelFormat(self.label_assignments()?))
            }
            "unwrap" => {
                self.advance();
                self.unwrap_stage()
            }
            "drop" | "keep" => {
                self.advance();
                let labels = self.label_selection()?;
                Ok(if word == "drop" {
                    Stage::Drop(labels)
                } else {
                    Stage::Keep(labels)
                })
            }
            _ => Err(self.error_here(format!("unknown pipeline stage {word:?}"))),
        }
    }

    /// `--strict` and `--keep-empty`; the lexer splits them into `-` and identifiers.
    fn parser_flags(&mut self) -> Result<Vec<String>, ExprError> {
        let mut flags = Vec::new();
        while self.peek() == &TokenKind::Sub && self.peek_nth(1) == &TokenKind::Sub {
            self.advance();
            self.advance();
            let mut flag = self.label_ident("parser flag")?;
            while !PARSER_FLAGS.contains(&flag.as_str())
                && self.peek() == &TokenKind::Sub
                && matches!(self.peek_nth(1), TokenKind::Ident(_))
            {
                self.advance();
                flag.push('-');
                flag.push_str(&self.label_ident("parser flag")?);
            }
            if !PARSER_FLAGS.contains(&flag.as_str()) {
                return Err(self.error_here(format!("invalid parser flag \"--{flag}\"")));
            }
            flags.push(flag);
        }
        Ok(flags)
    }

    fn extraction_params(&mut self) -> Result<Vec<ExtractionParam>, ExprError> {
        let mut params = Vec::new();
        if !matches!(self.peek(), TokenKind::Ident(word) if !KEYWORDS.contains(&word.as_str())) {
            return Ok(params);
        }
        loop {
            let label = self.label_ident("extraction parameter")?;
            let expression = if self.peek() == &TokenKind::Assign {
                self.advance();
                Some(self.string("extraction parameter")?)
            } else {
                None
            };
            params.push(ExtractionParam { label, expression });
            if self.peek() != &TokenKind::Comma {
                return Ok(params);
            }
            self.advance();
        }
    }

    fn label_assignments(&mut self) -> Result<Vec<LabelAssignment>, ExprError> {
        let mut assignments = Vec::new();
        loop {
            let target = self.label_ident("label_format stage")?;
            self.expect(TokenKind::Assign, "label_format stage")?;
            let assignment = match self.peek().clone() {
                TokenKind::Ident(source) => {
                    self.advance();
                    LabelAssignment {
                        target,
                        source,
                        template: false,
                    }
                }
                TokenKind::String(source) => {
                    self.advance();
                    LabelAssignment {
                        target,
                        source,
                        template: true,
                    }
                }
                _ => return Err(self.unexpected("label_format stage")),
            };
            assignments.push(assignment);
            if self.peek() != &TokenKind::Comma {
                return Ok(assignments);
            }
            self.advance();
        }
    }

    fn unwrap_stage(&mut self) -> Result<Stage, ExprError> {
        let name = self.label_ident("unwrap stage")?;
        if self.peek() != &TokenKind::LeftParen {
            return Ok(Stage::Unwrap {
                label: name,
                conversion: None,
            });
        }
        if !UNWRAP_CONVERSIONS.contains(&name.as_str()) {
            return Err(self.error_here(format!("unknown unwrap conversion {name:?}")));
        }
        self.advance();
        let label = self.label_ident("unwrap stage")?;
        self.expect(TokenKind::RightParen, "unwrap stage")?;
        Ok(Stage::Unwrap {
            label,
            conversion: Some(name),
        })
    }

    fn label_selection(&mut self) -> Result<Vec<String>, ExprError> {
        let mut labels = Vec::new();
        loop {
            let label = self.label_ident("label selection")?;
            if self.match_op().is_some() {
                self.advance();
                self.string("label selection")?;
            }
            labels.push(label);
            if self.peek() != &TokenKind::Comma {
                return Ok(labels);
            }
            self.advance();
        }
    }

    fn label_filter_or(&mut self) -> Result<LabelFilter, ExprError> {
        let mut lhs = self.label_filter_and()?;
        while self.peek_ident() == Some("or") && self.filter_continues() {
            self.advance();
            let rhs = self.label_filter_and()?;
            lhs = LabelFilter::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn label_filter_and(&mut self) -> Result<LabelFilter, ExprError> {
        let mut lhs = self.label_filter_primary()?;
        loop {
            let joined = match self.peek() {
                TokenKind::Comma => true,
                TokenKind::Ident(word) => word == "and",
                _ => false,
            };
            if !joined || !self.filter_continues() {
                return Ok(lhs);
            }
            self.advance();
            let rhs = self.label_filter_primary()?;
            lhs = LabelFilter::And(Box::new(lhs), Box::new(rhs));
        }
    }

    /// True when the token after a joiner starts another label filter.
    fn filter_continues(&self) -> bool {
        match self.peek_nth(1) {
            TokenKind::LeftParen => true,
            TokenKind::Ident(_) => self.filter_op_at(2).is_some(),
            _ => false,
        }
    }

    fn label_filter_primary(&mut self) -> Result<LabelFilter, ExprError> {
        if self.peek() == &TokenKind::LeftParen {
            self.advance();
            self.enter()?;
            let inner = self.label_filter_or()?;
            self.depth -= 1;
            self.expect(TokenKind::RightParen, "label filter")?;
            return Ok(inner);
        }

        let label = self.label_ident("label filter")?;
        let op = self
            .filter_op_at(0)
            .ok_or_else(|| self.unexpected("label filter"))?;
        self.advance();

        let value = match self.peek().clone() {
            TokenKind::Ident(word)
                if word == "ip"
                    && matches!(op, FilterOp::Match(MatchOp::Equal | MatchOp::NotEqual)) =>
            {
                let value = FilterValue::Ip(self.ip_argument()?);
                return Ok(LabelFilter::Compare { label, op, value });
            }
            TokenKind::String(value) => {
                if matches!(op, FilterOp::Match(MatchOp::Regex | MatchOp::NotRegex)) {
                    self.check_regex(&format!("^(?:{value})$"))?;
                }
                FilterValue::String(value)
            }
            _ if matches!(op, FilterOp::Match(MatchOp::Regex | MatchOp::NotRegex)) => {
                return Err(self.unexpected("label filter"));
            }
            TokenKind::Number(value) => FilterValue::Number(value),
            TokenKind::Duration(value) => FilterValue::Duration(value),
            TokenKind::Bytes(value) => FilterValue::Bytes(value),
            _ => return Err(self.unexpected("label filter")),
        };
        self.advance();
        Ok(LabelFilter::Compare { label, op, value })
    }

    fn filter_op_at(&self, n: usize) -> Option<FilterOp> {
        Some(match self.peek_nth(n) {
            TokenKind::Assign => FilterOp::Match(MatchOp::Equal),
            TokenKind::Neq => FilterOp::Match(MatchOp::NotEqual),
            TokenKind::RegexMatch => FilterOp::Match(MatchOp::Regex),
            TokenKind::RegexNotMatch => FilterOp::Match(MatchOp::NotRegex),
            TokenKind::Eql => FilterOp::Eql,
            TokenKind::Lt => FilterOp::Lt,
            TokenKind::Lte => FilterOp::Lte,
            TokenKind::Gt => FilterOp::Gt,
            TokenKind::Gte => FilterOp::Gte,
            _ => return None,
        })
    }

    fn postfix(&mut self, mut expr: Expr) -> Result<Expr, ExprError> {
        let (mut has_offset, mut has_at) = (false, false);
        loop {
            if self.peek() == &TokenKind::LeftBracket {
                expr = self.range(expr)?;
            } else if self.peek_ident() == Some("offset") {
                if has_offset {
                    return Err(self.error_here("offset may not be set multiple times"));
                }
                if !accepts_modifier(&expr) {
                    return Err(self.error_here(
                        "offset modifier must be preceded by a selector, range or subquery",
                    ));
                }
                has_offset = true;
                self.advance();
                let negative = self.peek() == &TokenKind::Sub;
                if negative {
                    self.advance();
                }
                let offset = self.duration("offset")?;
                expr = Expr::Offset {
                    expr: Box::new(expr),
                    offset,
                    negative,
                };
            } else if self.peek() == &TokenKind::At {
                if has_at {
                    return Err(self.error_here("@ <timestamp> may not be set multiple times"));
                }
                if !accepts_modifier(&expr) {
                    return Err(self.error_here(
                        "@ modifier must be preceded by a selector, range or subquery",
                    ));
                }
                has_at = true;
                self.advance();
                let at = self.at_modifier()?;
                expr = Expr::At {
                    expr: Box::new(expr),
                    at,
                };
            } else if self.at_stage() && is_log_range(&expr) {
                if let Expr::Range { expr: inner, .. } = &mut expr {
                    if let Expr::Selector(selector) = inner.as_mut() {
                        self.stages(&mut selector.stages)?;
                    }
                }
            } else {
                return Ok(expr);
            }
        }
    }

    fn range(&mut self, expr: Expr) -> Result<Expr, ExprError> {
        self.expect(TokenKind::LeftBracket, "range")?;
        let range = self.duration("range")?;
        if self.peek() == &TokenKind::Colon {
            self.advance();
            let step = if self.peek() == &TokenKind::RightBracket {
                None
            } else {
                Some(self.duration("subquery step")?)
            };
            self.expect(TokenKind::RightBracket, "subquery")?;
            return Ok(Expr::Subquery {
                expr: Box::new(expr),
                range,
                step,
            });
        }
        self.expect(TokenKind::RightBracket, "range")?;
        if !matches!(expr, Expr::Selector(_)) {
            return Err(self.error_here("ranges only allowed for vector selectors"));
        }
        Ok(Expr::Range {
            expr: Box::new(expr),
            range,
        })
    }

    fn at_modifier(&mut self) -> Result<AtModifier, ExprError> {
        match self.peek().clone() {
            TokenKind::Number(value) => {
                self.advance();
                Ok(AtModifier::Timestamp(value))
            }
            sign @ (TokenKind::Sub | TokenKind::Add) => {
                self.advance();
                let TokenKind::Number(value) = self.peek().clone() else {
                    return Err(self.unexpected("@ modifier"));
                };
                self.advance();
                let negative = sign == TokenKind::Sub;
                Ok(AtModifier::Timestamp(if negative { -value } else { value }))
            }
            TokenKind::Ident(word)
                if (word == "start" || word == "end")
                    && self.peek_nth(1) == &TokenKind::LeftParen
                    && self.peek_nth(2) == &TokenKind::RightParen =>
            {
                self.advance();
                self.advance();
                self.advance();
                Ok(if word == "start" {
                    AtModifier::Start
                } else {
                    AtModifier::End
                })
            }
            _ => Err(self.unexpected("@ modifier")),
        }
    }

    fn duration(&mut self, context: &str) -> Result<Duration, ExprError> {
        match self.peek() {
            TokenKind::Duration(value) => {
                let value = *value;
                self.advance();
                Ok(value)
            }
            _ => Err(self.unexpected(context)),
        }
    }

    fn string(&mut self, context: &str) -> Result<String, ExprError> {
        match self.peek().clone() {
            TokenKind::String(value) => {
                self.advance();
                Ok(value)
            }
            _ => Err(self.unexpected(context)),
        }
    }

    fn label_ident(&mut self, context: &str) -> Result<String, ExprError> {
        match self.peek().clone() {
            TokenKind::Ident(name) if matches_label_name_grammar(&name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(context)),
        }
    }

    fn check_regex(&self, pattern: &str) -> Result<Regex, ExprError> {
        Regex::new(pattern)
            .map_err(|err| self.error_here(format!("invalid regular expression: {err}")))
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Result<(), ExprError> {
        if self.peek() == &kind {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(context))
        }
    }

    fn peek(&self) -> &TokenKind {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .or_else(|| self.tokens.last())
            .map_or(&TokenKind::Eof, |token| &token.kind)
    }

    fn peek_ident(&self) -> Option<&str> {
        match self.peek() {
            TokenKind::Ident(word) => Some(word.as_str()),
            _ => None,
        }
    }

    fn token_text(&self) -> String {
        self.peek().to_string()
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.input.len(), |token| token.offset)
    }

    fn error_here(&self, message: impl Into<String>) -> ExprError {
        ExprError::at(self.input, self.offset(), message)
    }

    fn unexpected(&self, context: &str) -> ExprError {
        self.error_here(format!("unexpected {} in {context}", self.peek()))
    }
}

/// Log stream selector carrying a pipeline, outside of any range.
fn is_log_pipeline(expr: &Expr) -> bool {
    match expr {
        Expr::Selector(selector) => !selector.stages.is_empty(),
        Expr::Paren(inner) => is_log_pipeline(inner),
        _ => false,
    }
}

/// `offset` and `@` only apply to selectors, ranges and subqueries.
fn accepts_modifier(expr: &Expr) -> bool {
    match expr {
        Expr::Selector(_) | Expr::Range { .. } | Expr::Subquery { .. } => true,
        Expr::Offset { expr, .. } | Expr::At { expr, .. } => accepts_modifier(expr),
        _ => false,
    }
}

/// Single address, CIDR block or `start-end` range.
fn is_ip_pattern(pattern: &str) -> bool {
    let pattern = pattern.trim();
    if let Some((start, end)) = pattern.split_once('-') {
        return start.trim().parse::<IpAddr>().is_ok() && end.trim().parse::<IpAddr>().is_ok();
    }
    if let Some((address, prefix)) = pattern.split_once('/') {
        let max_prefix = match address.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => 32,
            Ok(IpAddr::V6(_)) => 128,
            Err(_) => return false,
        };
        return prefix.parse::<u8>().is_ok_and(|prefix| prefix <= max_prefix);
    }
    pattern.parse::<IpAddr>().is_ok()
}

/// `{...}[range]` may still be followed by pipeline stages.
fn is_log_range(expr: &Expr) -> bool {
    match expr {
        Expr::Range { expr, .. } => {
            matches!(expr.as_ref(), Expr::Selector(selector) if selector.name.is_none())
        }
        _ => false,
    }
}
