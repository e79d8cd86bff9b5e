//! Numeric expressions as they appear in operands, data directives and constants.
//!
//! The grammar, lowest precedence first:
//! ```text
//!     expr      ::= shiftexpr [("&" | "|" | "^") shiftexpr]*
//!     shiftexpr ::= addexpr [("<<" | ">>") addexpr]*
//!     addexpr   ::= mulexpr [("+" | "-") mulexpr]*
//!     mulexpr   ::= unary [("*" | "/" | "%") unary]*
//!     unary     ::= "-" unary | atom
//!     atom      ::= number | label | "LSB(" expr ")" | "BYTEn(" expr ")" | "(" expr ")"
//! ```
//! Numbers may be written as decimal, `$1F`, `0x1F`, `1FH`, `%0101`, `b0101`, `0b0101`
//! or a character constant such as `'a'`.
use crate::error::{Error, ErrorKind};
use std::collections::BTreeSet;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;
use std::vec::IntoIter;

type TokenIter = Peekable<IntoIter<Token>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Number,
    Label,
    Add,
    Sub,
    Star,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    LParen,
    RParen,
    /// `LSB(`: least significant byte of the enclosed expression
    Lsb,
    /// `BYTEn(`: the n-th byte of the enclosed expression
    Byte(u8),
    /// unary minus
    Neg,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub ttype: TokenType,
    pub raw: String,
    pub value: Option<i128>,
}
impl Token {
    fn new(ttype: TokenType, raw: &str, value: Option<i128>) -> Token {
        Token {
            ttype,
            raw: raw.to_string(),
            value,
        }
    }
}
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.raw) }
}

/// Anything that can turn a label into a value.
pub trait LabelResolver {
    fn resolve(&self, label: &str) -> Option<i128>;
}

impl LabelResolver for std::collections::HashMap<String, i128> {
    fn resolve(&self, label: &str) -> Option<i128> { self.get(label).copied() }
}

/// A resolver that knows no labels. Used where only literal expressions are allowed.
pub struct NoLabels;
impl LabelResolver for NoLabels {
    fn resolve(&self, _label: &str) -> Option<i128> { None }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueNode {
    pub token: Token,
    left: Option<Box<ValueNode>>,
    right: Option<Box<ValueNode>>,
}

impl ValueNode {
    fn new(token: Token, left: Option<ValueNode>, right: Option<ValueNode>) -> ValueNode {
        ValueNode {
            token,
            left: left.map(Box::new),
            right: right.map(Box::new),
        }
    }
    pub fn eval(&self, lr: &dyn LabelResolver) -> Result<i128, Error> {
        match self.token.ttype {
            TokenType::Number => self
                .token
                .value
                .ok_or_else(|| Error::new(ErrorKind::Syntax, None, "number token without a value")),
            TokenType::Label => lr.resolve(&self.token.raw).ok_or_else(|| {
                Error::new(
                    ErrorKind::Label,
                    None,
                    &format!("unknown label \"{}\"", self.token.raw),
                )
            }),
            TokenType::Neg => Ok(-self.eval_child(&self.left, lr)?),
            TokenType::Lsb => Ok(self.eval_child(&self.left, lr)? & 0xff),
            TokenType::Byte(n) => {
                let v = self.eval_child(&self.left, lr)?;
                Ok(if n >= 16 { 0 } else { (v >> (8 * n as u32)) & 0xff })
            }
            _ => self.eval_binary(lr),
        }
    }
    fn eval_child(&self, child: &Option<Box<ValueNode>>, lr: &dyn LabelResolver) -> Result<i128, Error> {
        child
            .as_ref()
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::Syntax,
                    None,
                    &format!("missing operand for \"{}\"", self.token.raw),
                )
            })?
            .eval(lr)
    }
    fn eval_binary(&self, lr: &dyn LabelResolver) -> Result<i128, Error> {
        let left = self.eval_child(&self.left, lr)?;
        let right = self.eval_child(&self.right, lr)?;
        let overflow = || Error::new(ErrorKind::Range, None, &format!("arithmetic overflow in \"{}\"", self.token.raw));
        match self.token.ttype {
            TokenType::Add => left.checked_add(right).ok_or_else(overflow),
            TokenType::Sub => left.checked_sub(right).ok_or_else(overflow),
            TokenType::Star => left.checked_mul(right).ok_or_else(overflow),
            TokenType::Div | TokenType::Mod if right == 0 => {
                Err(Error::new(ErrorKind::Range, None, "division by zero"))
            }
            TokenType::Div => Ok(left / right),
            TokenType::Mod => Ok(left.rem_euclid(right)),
            TokenType::And => Ok(left & right),
            TokenType::Or => Ok(left | right),
            TokenType::Xor => Ok(left ^ right),
            TokenType::Shl => u32::try_from(right)
                .ok()
                .and_then(|r| left.checked_shl(r))
                .ok_or_else(overflow),
            TokenType::Shr => u32::try_from(right)
                .ok()
                .map(|r| if r >= 128 { 0 } else { left >> r })
                .ok_or_else(overflow),
            _ => Err(Error::new(
                ErrorKind::Syntax,
                None,
                &format!("unexpected token \"{}\" in expression", self.token.raw),
            )),
        }
    }
    fn collect_labels(&self, labels: &mut BTreeSet<String>) {
        if self.token.ttype == TokenType::Label {
            labels.insert(self.token.raw.clone());
        }
        if let Some(l) = self.left.as_ref() {
            l.collect_labels(labels);
        }
        if let Some(r) = self.right.as_ref() {
            r.collect_labels(labels);
        }
    }
}

/// A parsed expression along with the text it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    text: String,
    root: ValueNode,
}

impl Expression {
    pub fn parse(text: &str) -> Result<Expression, Error> {
        let mut token_iter = tokenize(text)?.into_iter().peekable();
        let root = parse_expr(&mut token_iter)?;
        if let Some(t) = token_iter.next() {
            return Err(Error::new(
                ErrorKind::Syntax,
                None,
                &format!("unexpected \"{}\" in expression \"{}\"", t, text.trim()),
            ));
        }
        Ok(Expression {
            text: text.trim().to_string(),
            root,
        })
    }
    /// An expression that always evaluates to `value`.
    pub fn literal(value: i128) -> Expression {
        let text = value.to_string();
        Expression {
            root: ValueNode::new(Token::new(TokenType::Number, &text, Some(value)), None, None),
            text,
        }
    }
    pub fn text(&self) -> &str { &self.text }
    pub fn eval(&self, lr: &dyn LabelResolver) -> Result<i128, Error> { self.root.eval(lr) }
    pub fn contained_labels(&self) -> BTreeSet<String> {
        let mut labels = BTreeSet::new();
        self.root.collect_labels(&mut labels);
        labels
    }
    pub fn contains_register_labels<'a, I>(&self, registers: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        let labels = self.contained_labels();
        registers.into_iter().any(|r| labels.contains(r))
    }
}
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.text) }
}

/// Evaluate a string expression in one go.
pub fn eval_str(text: &str, lr: &dyn LabelResolver) -> Result<i128, Error> { Expression::parse(text)?.eval(lr) }

/// Parse a bare numeric literal (no operators, no labels).
pub fn parse_numeric_literal(s: &str) -> Option<i128> {
    let tokens = tokenize(s.trim()).ok()?;
    match tokens.as_slice() {
        [t] if t.ttype == TokenType::Number => t.value,
        [n, t] if n.ttype == TokenType::Sub && t.ttype == TokenType::Number => t.value.map(|v| -v),
        _ => None,
    }
}

/// Decode the backslash escapes of a quoted string body.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('x') => {
                let mut digits = String::new();
                while digits.len() < 2 {
                    match chars.next_if(|d| d.is_ascii_hexdigit()) {
                        Some(d) => digits.push(d),
                        None => break,
                    }
                }
                match u8::from_str_radix(&digits, 16) {
                    Ok(b) => out.push(b as char),
                    Err(_) => out.push_str("\\x"),
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Labels start with a letter, or with a single `.` or `_` followed by at least one word character.
pub fn is_valid_label(s: &str) -> bool {
    if s.starts_with("__") || s.starts_with("..") {
        return false;
    }
    let mut chars = s.chars();
    let word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => chars.all(word),
        Some('.') | Some('_') => {
            let rest = chars.as_str();
            !rest.is_empty() && rest.chars().all(word)
        }
        _ => false,
    }
}

/// ```text
///     expr ::= shiftexpr [("&" | "|" | "^") shiftexpr]*
/// ```
fn parse_expr(token_iter: &mut TokenIter) -> Result<ValueNode, Error> {
    let mut node = parse_shiftexpr(token_iter)?;
    while let Some(op_token) = token_iter.next_if(|t| matches!(t.ttype, TokenType::And | TokenType::Or | TokenType::Xor)) {
        let right = parse_shiftexpr(token_iter)?;
        node = ValueNode::new(op_token, Some(node), Some(right));
    }
    Ok(node)
}
/// ```text
///     shiftexpr ::= addexpr [("<<" | ">>") addexpr]*
/// ```
fn parse_shiftexpr(token_iter: &mut TokenIter) -> Result<ValueNode, Error> {
    let mut node = parse_addexpr(token_iter)?;
    while let Some(op_token) = token_iter.next_if(|t| matches!(t.ttype, TokenType::Shl | TokenType::Shr)) {
        let right = parse_addexpr(token_iter)?;
        node = ValueNode::new(op_token, Some(node), Some(right));
    }
    Ok(node)
}
/// ```text
///     addexpr ::= mulexpr [("+" | "-") mulexpr]*
/// ```
fn parse_addexpr(token_iter: &mut TokenIter) -> Result<ValueNode, Error> {
    let mut node = parse_mulexpr(token_iter)?;
    while let Some(op_token) = token_iter.next_if(|t| matches!(t.ttype, TokenType::Add | TokenType::Sub)) {
        let right = parse_mulexpr(token_iter)?;
        node = ValueNode::new(op_token, Some(node), Some(right));
    }
    Ok(node)
}
/// ```text
///     mulexpr ::= unary [("*" | "/" | "%") unary]*
/// ```
fn parse_mulexpr(token_iter: &mut TokenIter) -> Result<ValueNode, Error> {
    let mut node = parse_unary(token_iter)?;
    while let Some(op_token) =
        token_iter.next_if(|t| matches!(t.ttype, TokenType::Star | TokenType::Div | TokenType::Mod))
    {
        let right = parse_unary(token_iter)?;
        node = ValueNode::new(op_token, Some(node), Some(right));
    }
    Ok(node)
}
/// ```text
///     unary ::= "-" unary | atom
/// ```
fn parse_unary(token_iter: &mut TokenIter) -> Result<ValueNode, Error> {
    if let Some(sub) = token_iter.next_if(|t| t.ttype == TokenType::Sub) {
        let operand = parse_unary(token_iter)?;
        return Ok(ValueNode::new(
            Token::new(TokenType::Neg, &sub.raw, None),
            Some(operand),
            None,
        ));
    }
    parse_atom(token_iter)
}
/// ```text
///     atom ::= number | label | "LSB(" expr ")" | "BYTEn(" expr ")" | "(" expr ")"
/// ```
fn parse_atom(token_iter: &mut TokenIter) -> Result<ValueNode, Error> {
    if let Some(token) = token_iter.next() {
        match token.ttype {
            TokenType::Number | TokenType::Label => return Ok(ValueNode::new(token, None, None)),
            TokenType::LParen | TokenType::Lsb | TokenType::Byte(_) => {
                let inner = parse_expr(token_iter)?;
                if token_iter.next_if(|t| t.ttype == TokenType::RParen).is_none() {
                    return Err(Error::new(ErrorKind::Syntax, None, "missing closing parenthesis"));
                }
                if token.ttype == TokenType::LParen {
                    return Ok(inner);
                }
                return Ok(ValueNode::new(token, Some(inner), None));
            }
            _ => {
                return Err(Error::new(
                    ErrorKind::Syntax,
                    None,
                    &format!("unexpected \"{}\" where a value was expected", token),
                ))
            }
        }
    }
    Err(Error::new(ErrorKind::Syntax, None, "missing label or value"))
}

/// Tokenize the given string and return a Vec<Token>.
fn tokenize(input: &str) -> Result<Vec<Token>, Error> {
    let mut chars = input.chars();
    let mut current = chars.next();
    let mut output = Vec::new();
    let syntax = |msg: String| Error::new(ErrorKind::Syntax, None, &msg);
    while let Some(ch) = current {
        if ch.is_whitespace() {
            current = chars.next();
            continue;
        }
        match ch {
            '$' => {
                current = chars.next();
                let digits = take_while(&mut current, &mut chars, |c| c.is_ascii_hexdigit());
                output.push(number_token(&format!("${}", digits), &digits, 16)?);
            }
            '%' => {
                // binary constant when followed by a binary digit and not preceded by a value
                let prev_is_value = output
                    .last()
                    .map_or(false, |t: &Token| matches!(t.ttype, TokenType::Number | TokenType::Label | TokenType::RParen));
                current = chars.next();
                if !prev_is_value && current.map_or(false, |c| c == '0' || c == '1') {
                    let digits = take_while(&mut current, &mut chars, |c| c == '0' || c == '1');
                    output.push(number_token(&format!("%{}", digits), &digits, 2)?);
                } else {
                    output.push(Token::new(TokenType::Mod, "%", None));
                }
            }
            '\'' => {
                current = chars.next();
                let c = match current {
                    Some('\\') => {
                        current = chars.next();
                        match current {
                            Some('n') => '\n',
                            Some('r') => '\r',
                            Some('t') => '\t',
                            Some('0') => '\0',
                            Some(c) => c,
                            None => return Err(syntax("unterminated character constant".to_string())),
                        }
                    }
                    Some(c) => c,
                    None => return Err(syntax("unterminated character constant".to_string())),
                };
                current = chars.next();
                if current != Some('\'') {
                    return Err(syntax("character constant missing closing quote".to_string()));
                }
                current = chars.next();
                output.push(Token::new(TokenType::Number, &format!("'{}'", c), Some(c as i128)));
            }
            '0'..='9' => {
                let word = take_while(&mut current, &mut chars, |c| c.is_ascii_alphanumeric() || c == '_');
                output.push(number_from_word(&word)?);
            }
            'a'..='z' | 'A'..='Z' | '_' | '.' => {
                let mut word = String::new();
                if ch == '.' {
                    word.push('.');
                    current = chars.next();
                }
                word.push_str(&take_while(&mut current, &mut chars, |c| c.is_ascii_alphanumeric() || c == '_'));
                if current == Some('(') {
                    if word == "LSB" {
                        current = chars.next();
                        output.push(Token::new(TokenType::Lsb, "LSB(", None));
                        continue;
                    }
                    if let Some(n) = word.strip_prefix("BYTE").and_then(|d| d.parse::<u8>().ok()) {
                        if word.len() == 5 {
                            current = chars.next();
                            output.push(Token::new(TokenType::Byte(n), &format!("{}(", word), None));
                            continue;
                        }
                    }
                }
                if word.len() > 1 && (word.starts_with('b') || word.starts_with('B')) && word[1..].chars().all(|c| c == '0' || c == '1') {
                    output.push(number_token(&word, &word[1..], 2)?);
                } else if is_valid_label(&word) {
                    output.push(Token::new(TokenType::Label, &word, None));
                } else {
                    return Err(syntax(format!("invalid label \"{}\"", word)));
                }
            }
            '<' | '>' => {
                current = chars.next();
                if current != Some(ch) {
                    return Err(syntax(format!("unexpected character '{}'", ch)));
                }
                current = chars.next();
                if ch == '<' {
                    output.push(Token::new(TokenType::Shl, "<<", None));
                } else {
                    output.push(Token::new(TokenType::Shr, ">>", None));
                }
            }
            _ => {
                let ttype = match ch {
                    '+' => TokenType::Add,
                    '-' => TokenType::Sub,
                    '*' => TokenType::Star,
                    '/' => TokenType::Div,
                    '&' => TokenType::And,
                    '|' => TokenType::Or,
                    '^' => TokenType::Xor,
                    '(' => TokenType::LParen,
                    ')' => TokenType::RParen,
                    _ => return Err(syntax(format!("unexpected character '{}'", ch))),
                };
                output.push(Token::new(ttype, &ch.to_string(), None));
                current = chars.next();
            }
        }
    }
    Ok(output)
}

fn take_while<F: Fn(char) -> bool>(current: &mut Option<char>, chars: &mut Chars, pred: F) -> String {
    let mut raw = String::new();
    while let Some(c) = *current {
        if !pred(c) {
            break;
        }
        raw.push(c);
        *current = chars.next();
    }
    raw
}

fn number_token(raw: &str, digits: &str, radix: u32) -> Result<Token, Error> {
    if digits.is_empty() {
        return Err(Error::new(
            ErrorKind::Syntax,
            None,
            &format!("missing digits in numeric constant \"{}\"", raw),
        ));
    }
    let value = i128::from_str_radix(digits, radix).map_err(|_| {
        Error::new(
            ErrorKind::Syntax,
            None,
            &format!("invalid numeric constant \"{}\"", raw),
        )
    })?;
    Ok(Token::new(TokenType::Number, raw, Some(value)))
}

/// Numbers that start with a decimal digit: `123`, `0x7F`, `0b101`, `7FH`.
fn number_from_word(word: &str) -> Result<Token, Error> {
    let lower = word.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        number_token(word, hex, 16)
    } else if let Some(bin) = lower.strip_prefix("0b").filter(|b| !b.is_empty() && b.chars().all(|c| c == '0' || c == '1')) {
        number_token(word, bin, 2)
    } else if let Some(hex) = lower.strip_suffix('h') {
        number_token(word, hex, 16)
    } else {
        number_token(word, &lower, 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    #[test]
    fn literals() -> Result<(), Error> {
        for (s, v) in [
            ("42", 42),
            ("$ff", 255),
            ("0x1F", 31),
            ("1FH", 31),
            ("%101", 5),
            ("b101", 5),
            ("0b11", 3),
            ("'A'", 65),
            ("'\\n'", 10),
        ] {
            assert_eq!(eval_str(s, &NoLabels)?, v, "literal {}", s);
        }
        assert_eq!(parse_numeric_literal("-4"), Some(-4));
        assert_eq!(parse_numeric_literal("a+1"), None);
        Ok(())
    }
    #[test]
    fn precedence() -> Result<(), Error> {
        assert_eq!(eval_str("1 + 2 * 3", &NoLabels)?, 7);
        assert_eq!(eval_str("(1 + 2) * 3", &NoLabels)?, 9);
        assert_eq!(eval_str("1 << 2 + 1", &NoLabels)?, 8);
        assert_eq!(eval_str("$f0 | 1 << 2", &NoLabels)?, 0xf4);
        assert_eq!(eval_str("-2 + 5", &NoLabels)?, 3);
        assert_eq!(eval_str("7 % 4", &NoLabels)?, 3);
        assert_eq!(eval_str("10 / 3", &NoLabels)?, 3);
        assert_eq!(eval_str("LSB($1234)", &NoLabels)?, 0x34);
        assert_eq!(eval_str("BYTE1($1234)", &NoLabels)?, 0x12);
        assert_eq!(eval_str("BYTE2(-1)", &NoLabels)?, 0xff);
        Ok(())
    }
    #[test]
    fn labels() -> Result<(), Error> {
        let mut labels: HashMap<String, i128> = HashMap::new();
        labels.insert("start".to_string(), 0x100);
        labels.insert(".loop".to_string(), 0x104);
        let e = Expression::parse("start + .loop - _missing")?;
        assert_eq!(
            e.contained_labels().into_iter().collect::<Vec<_>>(),
            vec![".loop".to_string(), "_missing".to_string(), "start".to_string()]
        );
        let err = e.eval(&labels).err().map(|e| e.kind);
        assert_eq!(err, Some(ErrorKind::Label));
        assert_eq!(eval_str(".loop - start", &labels)?, 4);
        let regs = vec!["a".to_string()];
        assert!(Expression::parse("a + 1")?.contains_register_labels(&regs));
        assert!(!Expression::parse("start")?.contains_register_labels(&regs));
        Ok(())
    }
    #[test]
    fn malformed() {
        assert!(Expression::parse("(1 + 2").is_err());
        assert!(Expression::parse("1 +").is_err());
        assert!(Expression::parse("1 2").is_err());
        assert!(Expression::parse("[1]").is_err());
        assert!(eval_str("1 / 0", &NoLabels).is_err());
    }
    #[test]
    fn label_rules() {
        assert!(is_valid_label("start"));
        assert!(is_valid_label(".local"));
        assert!(is_valid_label("_file1"));
        assert!(!is_valid_label("__reserved"));
        assert!(!is_valid_label("..x"));
        assert!(!is_valid_label("1abc"));
        assert!(!is_valid_label("."));
    }
    #[test]
    fn escapes() {
        assert_eq!(unescape(r"a\tb\n"), "a\tb\n");
        assert_eq!(unescape(r#"\x41\\\""#), "A\\\"");
        assert_eq!(unescape(r"end\\"), "end\\");
    }
}
