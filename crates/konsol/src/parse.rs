use std::fmt;

use crate::expressions::{Builtin, CmpOperator, Expr, ExprLoc, Literal, Operator, Program, StrPart, UnaryOp};

/// A source location (1-based line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

/// Parse failure with the location where the lexer or parser gave up.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    message: String,
    line: usize,
    column: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            line: span.line,
            column: span.column,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    #[must_use]
    pub fn column(&self) -> usize {
        self.column
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.message, self.line, self.column)
    }
}

impl std::error::Error for ParseError {}

/// Parses one snippet into its statement list.
pub(crate) fn parse(code: &str) -> Result<Program, ParseError> {
    let tokens = Lexer::new(code).tokenize()?;
    Parser { tokens, pos: 0 }.parse_program()
}

// =============================================================================
// Lexer
// =============================================================================

/// A raw segment of a double-quoted string, before interpolation segments
/// are parsed into expressions.
#[derive(Debug, Clone, PartialEq)]
enum RawPart {
    Text(String),
    /// Source of a `#{...}` segment plus where it started.
    Code { src: String, span: Span },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(Vec<RawPart>),
    Ident(String),
    Newline,
    Semi,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    AndAnd,
    OrOr,
    Bang,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(_) => write!(f, "integer literal"),
            Self::Float(_) => write!(f, "float literal"),
            Self::Str(_) => write!(f, "string literal"),
            Self::Ident(name) => write!(f, "'{name}'"),
            Self::Newline => write!(f, "newline"),
            Self::Semi => write!(f, "';'"),
            Self::Assign => write!(f, "'='"),
            Self::PlusAssign => write!(f, "'+='"),
            Self::MinusAssign => write!(f, "'-='"),
            Self::StarAssign => write!(f, "'*='"),
            Self::SlashAssign => write!(f, "'/='"),
            Self::EqEq => write!(f, "'=='"),
            Self::NotEq => write!(f, "'!='"),
            Self::Lt => write!(f, "'<'"),
            Self::Le => write!(f, "'<='"),
            Self::Gt => write!(f, "'>'"),
            Self::Ge => write!(f, "'>='"),
            Self::Plus => write!(f, "'+'"),
            Self::Minus => write!(f, "'-'"),
            Self::Star => write!(f, "'*'"),
            Self::Slash => write!(f, "'/'"),
            Self::Percent => write!(f, "'%'"),
            Self::AndAnd => write!(f, "'&&'"),
            Self::OrOr => write!(f, "'||'"),
            Self::Bang => write!(f, "'!'"),
            Self::LParen => write!(f, "'('"),
            Self::RParen => write!(f, "')'"),
            Self::LBracket => write!(f, "'['"),
            Self::RBracket => write!(f, "']'"),
            Self::Comma => write!(f, "','"),
            Self::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone)]
struct TokenLoc {
    token: Token,
    span: Span,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(code: &str) -> Self {
        Self {
            chars: code.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn tokenize(mut self) -> Result<Vec<TokenLoc>, ParseError> {
        let mut tokens = Vec::new();
        while let Some(ch) = self.peek() {
            let span = self.span();
            match ch {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' => {
                    self.bump();
                    tokens.push(TokenLoc {
                        token: Token::Newline,
                        span,
                    });
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '0'..='9' => tokens.push(TokenLoc {
                    token: self.lex_number(span)?,
                    span,
                }),
                '"' => tokens.push(TokenLoc {
                    token: self.lex_double_quoted(span)?,
                    span,
                }),
                '\'' => tokens.push(TokenLoc {
                    token: self.lex_single_quoted(span)?,
                    span,
                }),
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let mut name = String::new();
                    while let Some(c) = self.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            name.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    tokens.push(TokenLoc {
                        token: Token::Ident(name),
                        span,
                    });
                }
                _ => tokens.push(TokenLoc {
                    token: self.lex_symbol(span)?,
                    span,
                }),
            }
        }
        tokens.push(TokenLoc {
            token: Token::Eof,
            span: self.span(),
        });
        Ok(tokens)
    }

    fn lex_symbol(&mut self, span: Span) -> Result<Token, ParseError> {
        let ch = self.bump().expect("symbol start already peeked");
        let token = match ch {
            '=' => self.either('=', Token::EqEq, Token::Assign),
            '!' => self.either('=', Token::NotEq, Token::Bang),
            '<' => self.either('=', Token::Le, Token::Lt),
            '>' => self.either('=', Token::Ge, Token::Gt),
            '+' => self.either('=', Token::PlusAssign, Token::Plus),
            '-' => self.either('=', Token::MinusAssign, Token::Minus),
            '*' => self.either('=', Token::StarAssign, Token::Star),
            '/' => self.either('=', Token::SlashAssign, Token::Slash),
            '%' => Token::Percent,
            '&' => {
                if self.peek() == Some('&') {
                    self.bump();
                    Token::AndAnd
                } else {
                    return Err(ParseError::new("unexpected '&'", span));
                }
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.bump();
                    Token::OrOr
                } else {
                    return Err(ParseError::new("unexpected '|'", span));
                }
            }
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            ';' => Token::Semi,
            other => return Err(ParseError::new(format!("unexpected character '{other}'"), span)),
        };
        Ok(token)
    }

    fn either(&mut self, follow: char, matched: Token, otherwise: Token) -> Token {
        if self.peek() == Some(follow) {
            self.bump();
            matched
        } else {
            otherwise
        }
    }

    fn lex_number(&mut self, span: Span) -> Result<Token, ParseError> {
        let mut digits = String::new();
        self.take_digits(&mut digits);
        let is_float = self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit());
        if is_float {
            digits.push('.');
            self.bump();
            self.take_digits(&mut digits);
            let value: f64 = digits
                .parse()
                .map_err(|_| ParseError::new(format!("invalid float literal '{digits}'"), span))?;
            Ok(Token::Float(value))
        } else {
            let value: i64 = digits
                .parse()
                .map_err(|_| ParseError::new(format!("integer literal '{digits}' out of range"), span))?;
            Ok(Token::Int(value))
        }
    }

    /// Consumes a digit run, allowing `_` separators between digits.
    fn take_digits(&mut self, out: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                out.push(c);
                self.bump();
            } else if c == '_' && self.peek_next().is_some_and(|n| n.is_ascii_digit()) {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn lex_double_quoted(&mut self, span: Span) -> Result<Token, ParseError> {
        self.bump();
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return Err(ParseError::new("unterminated string literal", span));
            };
            match ch {
                '"' => break,
                '\\' => {
                    let Some(escaped) = self.bump() else {
                        return Err(ParseError::new("unterminated string literal", span));
                    };
                    match escaped {
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        'r' => text.push('\r'),
                        '0' => text.push('\0'),
                        other => text.push(other),
                    }
                }
                '#' if self.peek() == Some('{') => {
                    let code_span = self.span();
                    self.bump();
                    if !text.is_empty() {
                        parts.push(RawPart::Text(std::mem::take(&mut text)));
                    }
                    parts.push(RawPart::Code {
                        src: self.take_interpolation(span)?,
                        span: code_span,
                    });
                }
                other => text.push(other),
            }
        }
        if !text.is_empty() || parts.is_empty() {
            parts.push(RawPart::Text(text));
        }
        Ok(Token::Str(parts))
    }

    /// Consumes interpolation source up to the matching `}`.
    ///
    /// Braces nest; quotes inside the segment are not tracked, so a brace
    /// inside an interpolated string literal needs balancing.
    fn take_interpolation(&mut self, span: Span) -> Result<String, ParseError> {
        let mut depth = 1usize;
        let mut src = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return Err(ParseError::new("unterminated string interpolation", span));
            };
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(src);
                    }
                }
                _ => {}
            }
            src.push(ch);
        }
    }

    fn lex_single_quoted(&mut self, span: Span) -> Result<Token, ParseError> {
        self.bump();
        let mut text = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return Err(ParseError::new("unterminated string literal", span));
            };
            match ch {
                '\'' => break,
                '\\' => {
                    let Some(escaped) = self.bump() else {
                        return Err(ParseError::new("unterminated string literal", span));
                    };
                    match escaped {
                        '\'' | '\\' => text.push(escaped),
                        other => {
                            text.push('\\');
                            text.push(other);
                        }
                    }
                }
                other => text.push(other),
            }
        }
        Ok(Token::Str(vec![RawPart::Text(text)]))
    }
}

// =============================================================================
// Parser
// =============================================================================

struct Parser {
    tokens: Vec<TokenLoc>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenLoc {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_ahead(&self, offset: usize) -> &TokenLoc {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> TokenLoc {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at(&self, token: &Token) -> bool {
        &self.peek().token == token
    }

    fn expect(&mut self, token: &Token) -> Result<TokenLoc, ParseError> {
        if self.at(token) {
            Ok(self.bump())
        } else {
            let found = self.peek();
            Err(ParseError::new(
                format!("expected {token}, found {}", found.token),
                found.span,
            ))
        }
    }

    /// Skips newlines, used inside brackets and after operators so
    /// multi-line expressions parse.
    fn skip_newlines(&mut self) {
        while self.at(&Token::Newline) {
            self.bump();
        }
    }

    fn skip_terminators(&mut self) {
        while self.at(&Token::Newline) || self.at(&Token::Semi) {
            self.bump();
        }
    }

    fn parse_program(mut self) -> Result<Program, ParseError> {
        let mut program = Vec::new();
        self.skip_terminators();
        while !self.at(&Token::Eof) {
            program.push(self.parse_expr()?);
            if !self.at(&Token::Eof) {
                if self.at(&Token::Newline) || self.at(&Token::Semi) {
                    self.skip_terminators();
                } else {
                    let found = self.peek();
                    return Err(ParseError::new(format!("unexpected {}", found.token), found.span));
                }
            }
        }
        Ok(program)
    }

    fn parse_expr(&mut self) -> Result<ExprLoc, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<ExprLoc, ParseError> {
        if let Token::Ident(name) = &self.peek().token {
            if Builtin::resolve(name).is_none() && !is_keyword(name) {
                let compound = match &self.peek_ahead(1).token {
                    Token::Assign => Some(None),
                    Token::PlusAssign => Some(Some(Operator::Add)),
                    Token::MinusAssign => Some(Some(Operator::Sub)),
                    Token::StarAssign => Some(Some(Operator::Mul)),
                    Token::SlashAssign => Some(Some(Operator::Div)),
                    _ => None,
                };
                if let Some(op) = compound {
                    let span = self.peek().span;
                    let name = name.clone();
                    self.bump();
                    self.bump();
                    self.skip_newlines();
                    let value = Box::new(self.parse_assignment()?);
                    let expr = match op {
                        None => Expr::Assign { name, value },
                        Some(op) => Expr::OpAssign { name, op, value },
                    };
                    return Ok(ExprLoc::new(expr, span));
                }
            }
        }
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<ExprLoc, ParseError> {
        let mut left = self.parse_and()?;
        while self.at(&Token::OrOr) {
            let span = left.span;
            self.bump();
            self.skip_newlines();
            let right = self.parse_and()?;
            left = ExprLoc::new(
                Expr::Or {
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ExprLoc, ParseError> {
        let mut left = self.parse_equality()?;
        while self.at(&Token::AndAnd) {
            let span = left.span;
            self.bump();
            self.skip_newlines();
            let right = self.parse_equality()?;
            left = ExprLoc::new(
                Expr::And {
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<ExprLoc, ParseError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match &self.peek().token {
                Token::EqEq => CmpOperator::Eq,
                Token::NotEq => CmpOperator::Ne,
                _ => break,
            };
            let span = left.span;
            self.bump();
            self.skip_newlines();
            let right = self.parse_comparison()?;
            left = ExprLoc::new(
                Expr::CmpOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<ExprLoc, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match &self.peek().token {
                Token::Lt => CmpOperator::Lt,
                Token::Le => CmpOperator::Le,
                Token::Gt => CmpOperator::Gt,
                Token::Ge => CmpOperator::Ge,
                _ => break,
            };
            let span = left.span;
            self.bump();
            self.skip_newlines();
            let right = self.parse_additive()?;
            left = ExprLoc::new(
                Expr::CmpOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<ExprLoc, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match &self.peek().token {
                Token::Plus => Operator::Add,
                Token::Minus => Operator::Sub,
                _ => break,
            };
            let span = left.span;
            self.bump();
            self.skip_newlines();
            let right = self.parse_term()?;
            left = ExprLoc::new(
                Expr::Op {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<ExprLoc, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match &self.peek().token {
                Token::Star => Operator::Mul,
                Token::Slash => Operator::Div,
                Token::Percent => Operator::Mod,
                _ => break,
            };
            let span = left.span;
            self.bump();
            self.skip_newlines();
            let right = self.parse_unary()?;
            left = ExprLoc::new(
                Expr::Op {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ExprLoc, ParseError> {
        let op = match &self.peek().token {
            Token::Minus => Some(UnaryOp::Neg),
            Token::Bang => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let span = self.peek().span;
            self.bump();
            let operand = Box::new(self.parse_unary()?);
            return Ok(ExprLoc::new(Expr::Unary { op, operand }, span));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<ExprLoc, ParseError> {
        let mut object = self.parse_primary()?;
        while self.at(&Token::LBracket) {
            let span = object.span;
            self.bump();
            self.skip_newlines();
            let index = self.parse_expr()?;
            self.skip_newlines();
            self.expect(&Token::RBracket)?;
            object = ExprLoc::new(
                Expr::Index {
                    object: Box::new(object),
                    index: Box::new(index),
                },
                span,
            );
        }
        Ok(object)
    }

    fn parse_primary(&mut self) -> Result<ExprLoc, ParseError> {
        let TokenLoc { token, span } = self.peek().clone();
        match token {
            Token::Int(value) => {
                self.bump();
                Ok(ExprLoc::new(Expr::Literal(Literal::Int(value)), span))
            }
            Token::Float(value) => {
                self.bump();
                Ok(ExprLoc::new(Expr::Literal(Literal::Float(value)), span))
            }
            Token::Str(parts) => {
                self.bump();
                build_string(parts, span)
            }
            Token::Ident(name) => {
                self.bump();
                match name.as_str() {
                    "nil" => Ok(ExprLoc::new(Expr::Literal(Literal::Nil), span)),
                    "true" => Ok(ExprLoc::new(Expr::Literal(Literal::True), span)),
                    "false" => Ok(ExprLoc::new(Expr::Literal(Literal::False), span)),
                    _ => match Builtin::resolve(&name) {
                        Some(builtin) => self.parse_builtin_call(builtin, span),
                        None => Ok(ExprLoc::new(Expr::Name(name), span)),
                    },
                }
            }
            Token::LParen => {
                self.bump();
                self.skip_newlines();
                let inner = self.parse_expr()?;
                self.skip_newlines();
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                self.bump();
                self.skip_newlines();
                let mut items = Vec::new();
                if !self.at(&Token::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        self.skip_newlines();
                        if self.at(&Token::Comma) {
                            self.bump();
                            self.skip_newlines();
                            // Trailing comma before the closing bracket.
                            if self.at(&Token::RBracket) {
                                break;
                            }
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket)?;
                Ok(ExprLoc::new(Expr::Array(items), span))
            }
            other => Err(ParseError::new(format!("unexpected {other}"), span)),
        }
    }

    /// Parses builtin call arguments, parenthesized or command style.
    ///
    /// `puts("hi")` and `puts "hi"` are both accepted; a builtin followed by
    /// a terminator or an operator is a zero-argument call.
    fn parse_builtin_call(&mut self, builtin: Builtin, span: Span) -> Result<ExprLoc, ParseError> {
        let mut args = Vec::new();
        if self.at(&Token::LParen) {
            self.bump();
            self.skip_newlines();
            if !self.at(&Token::RParen) {
                loop {
                    args.push(self.parse_expr()?);
                    self.skip_newlines();
                    if self.at(&Token::Comma) {
                        self.bump();
                        self.skip_newlines();
                    } else {
                        break;
                    }
                }
            }
            self.expect(&Token::RParen)?;
        } else if self.starts_command_arg() {
            loop {
                args.push(self.parse_expr()?);
                if self.at(&Token::Comma) {
                    self.bump();
                    self.skip_newlines();
                } else {
                    break;
                }
            }
        }
        Ok(ExprLoc::new(Expr::Call { builtin, args }, span))
    }

    fn starts_command_arg(&self) -> bool {
        matches!(
            self.peek().token,
            Token::Int(_)
                | Token::Float(_)
                | Token::Str(_)
                | Token::Ident(_)
                | Token::LBracket
                | Token::Minus
                | Token::Bang
        )
    }
}

/// Converts raw string segments into a literal or interpolated string.
fn build_string(parts: Vec<RawPart>, span: Span) -> Result<ExprLoc, ParseError> {
    if parts.iter().all(|part| matches!(part, RawPart::Text(_))) {
        let mut text = String::new();
        for part in parts {
            if let RawPart::Text(segment) = part {
                text.push_str(&segment);
            }
        }
        return Ok(ExprLoc::new(Expr::Literal(Literal::Str(text)), span));
    }

    let mut built = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            RawPart::Text(text) => built.push(StrPart::Text(text)),
            RawPart::Code { src, span: code_span } => {
                built.push(StrPart::Interp(parse_interpolation(&src, code_span)?));
            }
        }
    }
    Ok(ExprLoc::new(Expr::StrInterp(built), span))
}

/// Parses one `#{...}` segment as a single expression.
fn parse_interpolation(src: &str, span: Span) -> Result<ExprLoc, ParseError> {
    let mut program =
        parse(src).map_err(|err| ParseError::new(format!("in string interpolation: {}", err.message), span))?;
    if program.len() != 1 {
        return Err(ParseError::new(
            "string interpolation must contain a single expression",
            span,
        ));
    }
    Ok(program.remove(0))
}

fn is_keyword(name: &str) -> bool {
    matches!(name, "nil" | "true" | "false")
}
