//! Template Syntax Scanner
//!
//! Splits a template into `{{ }}`, `{% %}` and `{# #}` regions, tokenizes the
//! expression inside each one, and checks it against the allowed forms:
//!
//! - output: a name or literal followed by zero or more allowed filters
//! - tags: `if` / `elif` / `else` / `endif`; conditions may combine operands
//!   with `and`, `or`, `not`, `==`, `!=`, `is [not] <test>` and parentheses
//!
//! Filter arguments must be literals. Known but disallowed constructs
//! (attribute access, subscripts, calls, loops, assignments, includes, ...)
//! are reported as [`TemplateError::Forbidden`]; anything else malformed is a
//! [`TemplateError::Syntax`]. The renderer only ever sees templates that
//! passed this scanner.

use std::collections::HashSet;

use crate::error::{TemplateError, TemplateResult};

/// Filters that may follow `|`.
pub const ALLOWED_FILTERS: &[&str] = &["default", "d", "upper", "lower", "trim", "title", "capitalize"];

/// Tests that may follow `is` / `is not`.
pub const ALLOWED_TESTS: &[&str] = &["defined", "undefined", "none"];

/// Names provided by the engine itself. Never inferred as placeholders.
pub const RESERVED_NAMES: &[&str] = &["now", "user", "app"];

const FORBIDDEN_TAGS: &[&str] = &[
    "for", "endfor", "set", "endset", "macro", "endmacro", "call", "endcall", "filter",
    "endfilter", "include", "import", "from", "extends", "block", "endblock", "raw", "endraw",
    "with", "endwith", "autoescape", "endautoescape", "do", "break", "continue",
];

const KEYWORDS: &[&str] = &["and", "or", "not", "is", "in", "if", "elif", "else", "endif"];

const LITERAL_KEYWORDS: &[&str] = &["true", "True", "false", "False", "none", "None"];

/// Whether `name` is provided by the engine rather than the caller.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// How a placeholder is used at one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseRole {
    /// Substituted into the output
    Output,
    /// Tested for truthiness in a condition
    Truthiness,
    /// Compared against a value or checked with a test
    Compared,
}

/// Literal value appearing in a template expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
}

/// One occurrence of a placeholder name.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderUse {
    pub name: String,
    /// Byte offset in the template text
    pub offset: usize,
    pub role: UseRole,
    /// Literal passed to a leading `default` filter
    pub default: Option<Literal>,
}

/// Everything a scan found: placeholder uses in source order, and problems.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub uses: Vec<PlaceholderUse>,
    pub errors: Vec<TemplateError>,
}

impl ScanReport {
    /// Distinct non-reserved placeholder names in order of first appearance.
    pub fn names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.uses
            .iter()
            .filter(|u| !is_reserved(&u.name))
            .filter(|u| seen.insert(u.name.as_str()))
            .map(|u| u.name.clone())
            .collect()
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// The uses, or the first problem found.
    pub fn into_result(self) -> TemplateResult<Vec<PlaceholderUse>> {
        let ScanReport { uses, errors } = self;
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(uses),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Output,
    Tag,
    Comment,
}

impl Region {
    fn closer(&self) -> &'static str {
        match self {
            Region::Output => "}}",
            Region::Tag => "%}",
            Region::Comment => "#}",
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Region::Output => "expression",
            Region::Tag => "tag",
            Region::Comment => "comment",
        }
    }
}

struct IfFrame {
    offset: usize,
    seen_else: bool,
}

/// Scan a template once. Never fails; problems are collected in the report
/// and scanning continues with the next region.
pub fn scan(source: &str) -> ScanReport {
    let mut report = ScanReport::default();
    let mut blocks: Vec<IfFrame> = Vec::new();
    let bytes = source.as_bytes();
    let mut pos = 0;

    while let Some(rel) = source[pos..].find('{') {
        let start = pos + rel;
        let region = match bytes.get(start + 1) {
            Some(b'{') => Region::Output,
            Some(b'%') => Region::Tag,
            Some(b'#') => Region::Comment,
            _ => {
                pos = start + 1;
                continue;
            }
        };

        let Some(close) = find_close(source, start + 2, region) else {
            report.errors.push(TemplateError::syntax(
                format!("unterminated {}", region.describe()),
                start,
            ));
            break;
        };

        let (body, offset) = trim_markers(source, start + 2, close);
        match region {
            Region::Output => scan_output(body, offset, &mut report),
            Region::Tag => scan_tag(body, offset, start, &mut blocks, &mut report),
            Region::Comment => {}
        }
        pos = close + 2;
    }

    for frame in blocks {
        report
            .errors
            .push(TemplateError::syntax("unclosed 'if' block", frame.offset));
    }
    report
}

/// Byte index of the region closer, skipping over quoted strings.
fn find_close(source: &str, from: usize, region: Region) -> Option<usize> {
    let closer = region.closer().as_bytes();
    let bytes = source.as_bytes();
    if region == Region::Comment {
        return source[from..].find(region.closer()).map(|i| from + i);
    }

    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 2;
                    continue;
                }
                if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'\'' || b == b'"' {
                    quote = Some(b);
                } else if bytes[i..].starts_with(closer) {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

/// Strip `-` / `+` whitespace-control markers from a region body.
fn trim_markers(source: &str, mut start: usize, mut end: usize) -> (&str, usize) {
    let bytes = source.as_bytes();
    if end > start && matches!(bytes[start], b'-' | b'+') {
        start += 1;
    }
    if end > start && matches!(bytes[end - 1], b'-' | b'+') {
        end -= 1;
    }
    (&source[start..end], start)
}

fn scan_output(body: &str, offset: usize, report: &mut ScanReport) {
    let tokens = match tokenize(body, offset) {
        Ok(tokens) => tokens,
        Err(err) => {
            report.errors.push(err);
            return;
        }
    };
    let mut parser = Parser::new(&tokens, offset + body.len());
    let result = parser.parse_output();
    settle(parser, &tokens, UseRole::Output, result, report);
}

fn scan_tag(
    body: &str,
    offset: usize,
    tag_start: usize,
    blocks: &mut Vec<IfFrame>,
    report: &mut ScanReport,
) {
    let tokens = match tokenize(body, offset) {
        Ok(tokens) => tokens,
        Err(err) => {
            report.errors.push(err);
            return;
        }
    };
    let Some(first) = tokens.first() else {
        report.errors.push(TemplateError::syntax("empty tag", tag_start));
        return;
    };
    let Tok::Ident(keyword) = &first.tok else {
        report.errors.push(unexpected(first));
        return;
    };

    let rest = &tokens[1..];
    let mut parser = Parser::new(rest, offset + body.len());
    let result = match keyword.as_str() {
        "if" => {
            blocks.push(IfFrame {
                offset: tag_start,
                seen_else: false,
            });
            parser.parse_condition_clause()
        }
        "elif" => match blocks.last() {
            None => Err(TemplateError::syntax("'elif' without matching 'if'", tag_start)),
            Some(frame) if frame.seen_else => {
                Err(TemplateError::syntax("'elif' after 'else'", tag_start))
            }
            Some(_) => parser.parse_condition_clause(),
        },
        "else" => match blocks.last_mut() {
            None => Err(TemplateError::syntax("'else' without matching 'if'", tag_start)),
            Some(frame) if frame.seen_else => {
                Err(TemplateError::syntax("duplicate 'else'", tag_start))
            }
            Some(frame) => {
                frame.seen_else = true;
                parser.finish()
            }
        },
        "endif" => match blocks.pop() {
            None => Err(TemplateError::syntax("'endif' without matching 'if'", tag_start)),
            Some(_) => parser.finish(),
        },
        kw if FORBIDDEN_TAGS.contains(&kw) => {
            report
                .errors
                .push(TemplateError::forbidden(format!("tag '{}'", kw), first.offset));
            return;
        }
        other => {
            report.errors.push(TemplateError::syntax(
                format!("unknown tag '{}'", other),
                first.offset,
            ));
            return;
        }
    };
    settle(parser, rest, UseRole::Truthiness, result, report);
}

/// Keep the parser's uses on success; on failure record the error and fall
/// back to a loose pass so inference still sees the names.
fn settle(
    parser: Parser<'_>,
    tokens: &[Token],
    role: UseRole,
    result: TemplateResult<()>,
    report: &mut ScanReport,
) {
    match result {
        Ok(()) => report.uses.extend(parser.uses),
        Err(err) => {
            report.uses.extend(loose_uses(tokens, role));
            report.errors.push(err);
        }
    }
}

fn loose_uses(tokens: &[Token], role: UseRole) -> Vec<PlaceholderUse> {
    tokens
        .iter()
        .enumerate()
        .filter_map(|(i, token)| {
            let Tok::Ident(name) = &token.tok else {
                return None;
            };
            if is_keyword(name) || ALLOWED_TESTS.contains(&name.as_str()) {
                return None;
            }
            let prev = i.checked_sub(1).map(|p| &tokens[p].tok);
            let after_pipe_or_dot = matches!(prev, Some(Tok::Pipe))
                || matches!(prev, Some(Tok::Op(op)) if op == ".");
            let called = matches!(tokens.get(i + 1).map(|t| &t.tok), Some(Tok::LParen));
            if after_pipe_or_dot || called {
                return None;
            }
            Some(PlaceholderUse {
                name: name.clone(),
                offset: token.offset,
                role,
                default: None,
            })
        })
        .collect()
}

fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name) || LITERAL_KEYWORDS.contains(&name)
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Pipe,
    LParen,
    RParen,
    Comma,
    Eq,
    Ne,
    /// Any other punctuation; rejected wherever the parser meets it
    Op(String),
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(name) => format!("'{}'", name),
            Tok::Str(_) => "string literal".to_string(),
            Tok::Int(_) | Tok::Float(_) => "number".to_string(),
            Tok::Pipe => "'|'".to_string(),
            Tok::LParen => "'('".to_string(),
            Tok::RParen => "')'".to_string(),
            Tok::Comma => "','".to_string(),
            Tok::Eq => "'=='".to_string(),
            Tok::Ne => "'!='".to_string(),
            Tok::Op(op) => format!("'{}'", op),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    offset: usize,
}

fn tokenize(body: &str, base: usize) -> TemplateResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = body.char_indices().peekable();

    while let Some(&(i, c)) = chars.peek() {
        let offset = base + i;

        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    ident.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token {
                tok: Tok::Ident(ident),
                offset,
            });
        } else if c.is_ascii_digit() {
            let mut digits = String::new();
            let mut is_float = false;
            while let Some(&(j, c)) = chars.peek() {
                if c.is_ascii_digit() {
                    digits.push(c);
                    chars.next();
                } else if c == '.'
                    && !is_float
                    && body[j + 1..].starts_with(|n: char| n.is_ascii_digit())
                {
                    is_float = true;
                    digits.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let tok = if is_float {
                digits.parse::<f64>().ok().map(Tok::Float)
            } else {
                digits.parse::<i64>().ok().map(Tok::Int)
            };
            let tok = tok.ok_or_else(|| TemplateError::syntax("invalid number literal", offset))?;
            tokens.push(Token { tok, offset });
        } else if c == '\'' || c == '"' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some((_, ch)) = chars.next() {
                match ch {
                    '\\' => match chars.next() {
                        Some((_, 'n')) => value.push('\n'),
                        Some((_, 't')) => value.push('\t'),
                        Some((_, other)) => value.push(other),
                        None => break,
                    },
                    ch if ch == c => {
                        closed = true;
                        break;
                    }
                    ch => value.push(ch),
                }
            }
            if !closed {
                return Err(TemplateError::syntax("unterminated string literal", offset));
            }
            tokens.push(Token {
                tok: Tok::Str(value),
                offset,
            });
        } else {
            chars.next();
            let next_is_eq = matches!(chars.peek(), Some(&(_, '=')));
            let tok = match c {
                '|' => Tok::Pipe,
                '(' => Tok::LParen,
                ')' => Tok::RParen,
                ',' => Tok::Comma,
                '=' if next_is_eq => {
                    chars.next();
                    Tok::Eq
                }
                '!' if next_is_eq => {
                    chars.next();
                    Tok::Ne
                }
                other => Tok::Op(other.to_string()),
            };
            tokens.push(Token { tok, offset });
        }
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

fn unexpected(token: &Token) -> TemplateError {
    match &token.tok {
        Tok::Op(op) => {
            let construct = match op.as_str() {
                "." => "attribute access".to_string(),
                "[" => "subscript".to_string(),
                "=" => "assignment".to_string(),
                "~" => "string concatenation".to_string(),
                other => format!("operator '{}'", other),
            };
            TemplateError::forbidden(construct, token.offset)
        }
        Tok::Ident(kw) if kw == "in" => TemplateError::forbidden("operator 'in'", token.offset),
        other => TemplateError::syntax(format!("unexpected {}", other.describe()), token.offset),
    }
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    /// Offset reported for "expected ..." at end of input
    end: usize,
    uses: Vec<PlaceholderUse>,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token], end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end,
            uses: Vec::new(),
        }
    }

    fn peek(&self) -> Option<&'t Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek_ident(&self) -> Option<&'t str> {
        match self.peek() {
            Some(Tok::Ident(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    fn advance(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eof(&self, expected: &str) -> TemplateError {
        TemplateError::syntax(format!("expected {}", expected), self.end)
    }

    fn finish(&self) -> TemplateResult<()> {
        match self.tokens.get(self.pos) {
            Some(token) => Err(unexpected(token)),
            None => Ok(()),
        }
    }

    fn parse_output(&mut self) -> TemplateResult<()> {
        if self.peek().is_none() {
            return Err(self.eof("expression"));
        }
        self.parse_filtered(UseRole::Output)?;
        self.finish()
    }

    fn parse_condition_clause(&mut self) -> TemplateResult<()> {
        if self.peek().is_none() {
            return Err(self.eof("condition"));
        }
        self.parse_or()?;
        self.finish()
    }

    fn parse_or(&mut self) -> TemplateResult<()> {
        self.parse_and()?;
        while self.peek_ident() == Some("or") {
            self.advance();
            self.parse_and()?;
        }
        Ok(())
    }

    fn parse_and(&mut self) -> TemplateResult<()> {
        self.parse_not()?;
        while self.peek_ident() == Some("and") {
            self.advance();
            self.parse_not()?;
        }
        Ok(())
    }

    fn parse_not(&mut self) -> TemplateResult<()> {
        if self.peek_ident() == Some("not") {
            self.advance();
            return self.parse_not();
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> TemplateResult<()> {
        let first_use = self.uses.len();
        self.parse_operand(UseRole::Truthiness)?;

        match self.peek() {
            Some(Tok::Eq) | Some(Tok::Ne) => {
                self.advance();
                self.mark_compared(first_use);
                self.parse_operand(UseRole::Compared)?;
            }
            Some(Tok::Ident(kw)) if kw == "is" => {
                self.advance();
                self.mark_compared(first_use);
                if self.peek_ident() == Some("not") {
                    self.advance();
                }
                let token = self.advance().ok_or_else(|| self.eof("test name"))?;
                match &token.tok {
                    Tok::Ident(test) if ALLOWED_TESTS.contains(&test.as_str()) => {}
                    Tok::Ident(test) => {
                        return Err(TemplateError::forbidden(
                            format!("test '{}'", test),
                            token.offset,
                        ))
                    }
                    _ => return Err(unexpected(token)),
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn mark_compared(&mut self, from: usize) {
        for u in &mut self.uses[from..] {
            if u.role == UseRole::Truthiness {
                u.role = UseRole::Compared;
            }
        }
    }

    fn parse_operand(&mut self, role: UseRole) -> TemplateResult<()> {
        if self.peek() == Some(&Tok::LParen) {
            self.advance();
            self.parse_or()?;
            return match self.advance() {
                Some(Token {
                    tok: Tok::RParen, ..
                }) => Ok(()),
                Some(token) => Err(unexpected(token)),
                None => Err(self.eof("')'")),
            };
        }
        self.parse_filtered(role).map(|_| ())
    }

    /// Primary followed by filters. Returns the index of the recorded use
    /// when the primary is a placeholder name.
    fn parse_filtered(&mut self, role: UseRole) -> TemplateResult<Option<usize>> {
        let subject = self.parse_primary(role)?;
        let mut first = true;

        while self.peek() == Some(&Tok::Pipe) {
            self.advance();
            let token = self.advance().ok_or_else(|| self.eof("filter name"))?;
            let Tok::Ident(name) = &token.tok else {
                return Err(unexpected(token));
            };
            if !ALLOWED_FILTERS.contains(&name.as_str()) {
                return Err(TemplateError::forbidden(
                    format!("filter '{}'", name),
                    token.offset,
                ));
            }
            let args = if self.peek() == Some(&Tok::LParen) {
                self.parse_literal_args()?
            } else {
                Vec::new()
            };
            if first && matches!(name.as_str(), "default" | "d") {
                if let (Some(index), Some(literal)) = (subject, args.into_iter().next()) {
                    self.uses[index].default = Some(literal);
                }
            }
            first = false;
        }
        Ok(subject)
    }

    fn parse_primary(&mut self, role: UseRole) -> TemplateResult<Option<usize>> {
        let token = self.advance().ok_or_else(|| self.eof("expression"))?;
        match &token.tok {
            Tok::Ident(name) if LITERAL_KEYWORDS.contains(&name.as_str()) => Ok(None),
            Tok::Ident(name) if KEYWORDS.contains(&name.as_str()) => Err(unexpected(token)),
            Tok::Ident(name) => {
                if self.peek() == Some(&Tok::LParen) {
                    return Err(TemplateError::forbidden(
                        format!("call to '{}'", name),
                        token.offset,
                    ));
                }
                self.uses.push(PlaceholderUse {
                    name: name.clone(),
                    offset: token.offset,
                    role,
                    default: None,
                });
                Ok(Some(self.uses.len() - 1))
            }
            Tok::Str(_) | Tok::Int(_) | Tok::Float(_) => Ok(None),
            Tok::Op(op) if op == "-" && matches!(self.peek(), Some(Tok::Int(_) | Tok::Float(_))) => {
                self.advance();
                Ok(None)
            }
            _ => Err(unexpected(token)),
        }
    }

    fn parse_literal_args(&mut self) -> TemplateResult<Vec<Literal>> {
        self.advance();
        let mut args = Vec::new();
        if self.peek() == Some(&Tok::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_literal()?);
            match self.advance() {
                Some(Token {
                    tok: Tok::Comma, ..
                }) => continue,
                Some(Token {
                    tok: Tok::RParen, ..
                }) => return Ok(args),
                Some(token) => return Err(unexpected(token)),
                None => return Err(self.eof("')'")),
            }
        }
    }

    fn parse_literal(&mut self) -> TemplateResult<Literal> {
        let token = self.advance().ok_or_else(|| self.eof("literal"))?;
        match &token.tok {
            Tok::Str(s) => Ok(Literal::Str(s.clone())),
            Tok::Int(i) => Ok(Literal::Int(*i)),
            Tok::Float(f) => Ok(Literal::Float(*f)),
            Tok::Ident(name) => match name.as_str() {
                "true" | "True" => Ok(Literal::Bool(true)),
                "false" | "False" => Ok(Literal::Bool(false)),
                "none" | "None" => Ok(Literal::None),
                _ => Err(TemplateError::forbidden(
                    format!("non-literal filter argument '{}'", name),
                    token.offset,
                )),
            },
            Tok::Op(op) if op == "-" => match self.advance() {
                Some(Token {
                    tok: Tok::Int(i), ..
                }) => Ok(Literal::Int(-*i)),
                Some(Token {
                    tok: Tok::Float(f), ..
                }) => Ok(Literal::Float(-*f)),
                Some(other) => Err(unexpected(other)),
                None => Err(self.eof("number")),
            },
            _ => Err(unexpected(token)),
        }
    }
}
