//! Conditional compilation.
//!
//! `#if`, `#ifdef` and `#ifndef` open a block; `#elif` and `#else` replace the top of the
//! stack with a condition whose parent is the entry they replace; `#endif` closes the block.
//! Conditions are evaluated lazily against the current symbol table, so a `#define` after an
//! `#if` is seen by a later `#elif`.
//!
//! The `#if` expression grammar:
//! ```text
//!     condition ::= operand [comparison operand]
//!     comparison ::= "==" | "!=" | ">" | ">=" | "<" | "<="
//! ```
//! An `#if` with no comparison is true when its operand is non-zero.
use super::{Preprocessor, LANGUAGE_NAME, LANGUAGE_VERSION};
use crate::error::{Error, ErrorKind};
use crate::model::parse_version;
use crate::parse::{parse_numeric_literal, Expression, NoLabels};
use crate::pathid::LineId;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    pub fn from_str(op: &str) -> Option<Comparison> {
        match op.trim() {
            "==" => Some(Comparison::Eq),
            "!=" => Some(Comparison::Ne),
            ">" => Some(Comparison::Gt),
            ">=" => Some(Comparison::Ge),
            "<" => Some(Comparison::Lt),
            "<=" => Some(Comparison::Le),
            _ => None,
        }
    }
    pub fn compare<T: Ord + ?Sized>(&self, lhs: &T, rhs: &T) -> bool { self.holds(lhs.cmp(rhs)) }
    fn holds(&self, ord: Ordering) -> bool {
        match self {
            Comparison::Eq => ord == Ordering::Equal,
            Comparison::Ne => ord != Ordering::Equal,
            Comparison::Gt => ord == Ordering::Greater,
            Comparison::Ge => ord != Ordering::Less,
            Comparison::Lt => ord == Ordering::Less,
            Comparison::Le => ord != Ordering::Greater,
        }
    }
    /// The phrase used when a language requirement fails.
    fn describe(&self) -> &'static str {
        match self {
            Comparison::Eq => "exactly",
            Comparison::Ne => "anything but",
            Comparison::Gt => "greater than",
            Comparison::Ge => "at least",
            Comparison::Lt => "less than",
            Comparison::Le => "up to",
        }
    }
}
impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.describe()) }
}

/// `lhs op rhs` as written in an `#if` or `#elif`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Test {
    lhs: String,
    op: Comparison,
    rhs: String,
}

impl Test {
    pub fn parse(text: &str, line: &LineId) -> Result<Test, Error> {
        let text = text.trim();
        if text.is_empty() {
            return Err(pp_err(line, "conditional directive is missing its condition"));
        }
        let test = match find_comparison(text) {
            Some((at, len)) => {
                let op = Comparison::from_str(&text[at..at + len])
                    .ok_or_else(|| pp_err(line, &format!("bad comparison in \"{}\"", text)))?;
                let (lhs, rhs) = (text[..at].trim(), unquote(text[at + len..].trim()));
                if lhs.is_empty() || rhs.is_empty() {
                    return Err(pp_err(line, &format!("comparison \"{}\" needs two operands", text)));
                }
                Test {
                    lhs: lhs.to_string(),
                    op,
                    rhs: rhs.to_string(),
                }
            }
            None => Test {
                lhs: text.to_string(),
                op: Comparison::Ne,
                rhs: "0".to_string(),
            },
        };
        Ok(test)
    }

    pub fn evaluate(&self, pp: &Preprocessor, line: &LineId) -> Result<bool, Error> {
        let lhs = pp.resolve_symbols(line, &self.lhs)?;
        let rhs = pp.resolve_symbols(line, &self.rhs)?;
        let mentions_language = [&self.lhs, &self.rhs]
            .iter()
            .any(|s| s.contains("__LANGUAGE_"));
        if mentions_language {
            if [&self.lhs, &self.rhs]
                .iter()
                .any(|s| s.contains(['&', '|', '^', '(', ')']))
            {
                return Err(pp_err(
                    line,
                    &format!(
                        "language symbols like {} and {} can't be combined with expression operators",
                        LANGUAGE_NAME, LANGUAGE_VERSION
                    ),
                ));
            }
            return Ok(self.compare_text(&lhs, &rhs));
        }
        let parsed = (Expression::parse(&lhs), Expression::parse(&rhs));
        match parsed {
            (Ok(l), Ok(r)) if l.contained_labels().is_empty() && r.contained_labels().is_empty() => {
                let l = l.eval(&NoLabels).map_err(|e| e.at(line))?;
                let r = r.eval(&NoLabels).map_err(|e| e.at(line))?;
                Ok(self.op.compare(&l, &r))
            }
            _ => Ok(self.compare_text(&lhs, &rhs)),
        }
    }

    /// Compare as versions when both sides are dotted versions, numerically when both are
    /// numbers, and as plain text otherwise.
    fn compare_text(&self, lhs: &str, rhs: &str) -> bool {
        let (lhs, rhs) = (unquote(lhs.trim()), unquote(rhs.trim()));
        if lhs.contains('.') || rhs.contains('.') {
            if let (Some(l), Some(r)) = (parse_version(lhs), parse_version(rhs)) {
                return self.op.compare(&l, &r);
            }
        }
        if let (Some(l), Some(r)) = (parse_numeric_literal(lhs), parse_numeric_literal(rhs)) {
            return self.op.compare(&l, &r);
        }
        self.op.compare(lhs, rhs)
    }
}

fn pp_err(line: &LineId, msg: &str) -> Error { Error::new(ErrorKind::Preprocessor, Some(line), msg) }

fn unquote(text: &str) -> &str {
    for q in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(q) && text.ends_with(q) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

/// Position and length of the first comparison operator outside quotes. Shift operators
/// are skipped.
fn find_comparison(text: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let next = bytes.get(i + 1).copied();
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match (c, next) {
            (b'"', _) | (b'\'', _) => quote = Some(c),
            (b'<', Some(b'<')) | (b'>', Some(b'>')) => i += 1,
            (b'=', Some(b'=')) | (b'!', Some(b'=')) | (b'<', Some(b'=')) | (b'>', Some(b'=')) => {
                return Some((i, 2))
            }
            (b'<', _) | (b'>', _) => return Some((i, 1)),
            _ => {}
        }
        i += 1;
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionKind {
    If(Test),
    Elif(Test),
    Else,
    Endif,
    /// `#ifdef` when `negate` is false, `#ifndef` when true
    Ifdef { symbol: String, negate: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub line: LineId,
    parent: Option<Box<Condition>>,
    /// whether the block enclosing this one was active when it opened
    enclosing_active: bool,
}

impl Condition {
    /// Parse a conditional directive. `directive` is the word after `#`, `rest` what follows it.
    pub fn parse(directive: &str, rest: &str, line: &LineId) -> Result<Condition, Error> {
        let kind = match directive {
            "if" => ConditionKind::If(Test::parse(rest, line)?),
            "elif" => ConditionKind::Elif(Test::parse(rest, line)?),
            "else" => ConditionKind::Else,
            "endif" => ConditionKind::Endif,
            "ifdef" | "ifndef" => {
                let symbol = rest.trim();
                if !super::is_valid_symbol(symbol) {
                    return Err(pp_err(line, &format!("#{} needs a single symbol name", directive)));
                }
                ConditionKind::Ifdef {
                    symbol: symbol.to_string(),
                    negate: directive == "ifndef",
                }
            }
            _ => return Err(pp_err(line, &format!("#{} is not a conditional directive", directive))),
        };
        Ok(Condition {
            kind,
            line: line.clone(),
            parent: None,
            enclosing_active: true,
        })
    }
    pub fn is_conditional_directive(directive: &str) -> bool {
        matches!(directive, "if" | "elif" | "else" | "endif" | "ifdef" | "ifndef")
    }

    pub fn evaluate(&self, pp: &Preprocessor) -> Result<bool, Error> {
        match &self.kind {
            ConditionKind::If(test) => test.evaluate(pp, &self.line),
            ConditionKind::Elif(test) => {
                if self.parent_lineage_true(pp)? {
                    Ok(false)
                } else {
                    test.evaluate(pp, &self.line)
                }
            }
            ConditionKind::Else => Ok(!self.parent_lineage_true(pp)?),
            ConditionKind::Ifdef { symbol, negate } => Ok(pp.is_defined(symbol) != *negate),
            ConditionKind::Endif => Ok(true),
        }
    }
    fn parent_lineage_true(&self, pp: &Preprocessor) -> Result<bool, Error> {
        match self.parent.as_ref() {
            Some(p) => p.is_lineage_true(pp),
            None => Ok(false),
        }
    }
    /// True if this condition or any earlier branch of the same block was taken.
    fn is_lineage_true(&self, pp: &Preprocessor) -> Result<bool, Error> {
        Ok(self.parent_lineage_true(pp)? || self.evaluate(pp)?)
    }
}

/// Open conditional blocks of one source file plus its `#mute` depth.
#[derive(Debug, Default)]
pub struct ConditionStack {
    stack: Vec<Condition>,
    mute_depth: usize,
}

impl ConditionStack {
    pub fn new() -> Self { ConditionStack::default() }

    pub fn process(&mut self, mut condition: Condition, pp: &Preprocessor) -> Result<(), Error> {
        match condition.kind {
            ConditionKind::If(_) | ConditionKind::Ifdef { .. } => {
                condition.enclosing_active = self.currently_active(pp)?;
                self.stack.push(condition);
            }
            ConditionKind::Elif(_) | ConditionKind::Else => {
                let previous = self.pop_matching(&condition)?;
                if previous.kind == ConditionKind::Else {
                    return Err(pp_err(&condition.line, "conditional branch follows an #else"));
                }
                condition.enclosing_active = previous.enclosing_active;
                condition.parent = Some(Box::new(previous));
                self.stack.push(condition);
            }
            ConditionKind::Endif => {
                self.pop_matching(&condition)?;
            }
        }
        Ok(())
    }
    fn pop_matching(&mut self, condition: &Condition) -> Result<Condition, Error> {
        self.stack
            .pop()
            .ok_or_else(|| pp_err(&condition.line, "Preprocessor condition has no matching counterpart"))
    }

    pub fn currently_active(&self, pp: &Preprocessor) -> Result<bool, Error> {
        match self.stack.last() {
            None => Ok(true),
            Some(top) => Ok(top.enclosing_active && top.evaluate(pp)?),
        }
    }
    /// The innermost block still open, used to report unterminated blocks.
    pub fn open_block(&self) -> Option<&Condition> { self.stack.last() }

    pub fn mute(&mut self) { self.mute_depth += 1; }
    /// Returns false if there was no matching `#mute`.
    pub fn unmute(&mut self) -> bool {
        if self.mute_depth == 0 {
            return false;
        }
        self.mute_depth -= 1;
        true
    }
    pub fn is_muted(&self) -> bool { self.mute_depth > 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> LineId { LineId::new(Some(0), "cond.asm", n) }
    fn push(stack: &mut ConditionStack, pp: &Preprocessor, directive: &str, rest: &str) -> Result<bool, Error> {
        stack.process(Condition::parse(directive, rest, &line(1))?, pp)?;
        stack.currently_active(pp)
    }

    #[test]
    fn comparisons() -> Result<(), Error> {
        let mut pp = Preprocessor::new();
        let l = line(1);
        pp.create_symbol("MODE", Some("3"), &l)?;
        pp.create_symbol("NAME", Some("\"fast\""), &l)?;
        let check = |text: &str| Test::parse(text, &l).and_then(|t| t.evaluate(&pp, &l));
        assert!(check("MODE == 3")?);
        assert!(check("MODE >= 2")?);
        assert!(!check("MODE < 3")?);
        assert!(check("MODE << 1 == 6")?);
        assert!(check("MODE")?);
        assert!(!check("MODE - 3")?);
        assert!(check("NAME == 'fast'")?);
        assert!(check("UNDEFINED_THING != other")?);
        assert!(Test::parse("", &l).is_err());
        Ok(())
    }
    #[test]
    fn language_symbols_compare_as_versions() -> Result<(), Error> {
        let mut pp = Preprocessor::new();
        let l = line(1);
        pp.create_symbol(LANGUAGE_VERSION, Some("1.10.0"), &l)?;
        pp.create_symbol(LANGUAGE_NAME, Some("my_isa"), &l)?;
        let check = |text: &str| Test::parse(text, &l).and_then(|t| t.evaluate(&pp, &l));
        assert!(check("__LANGUAGE_VERSION__ >= 1.9.0")?);
        assert!(check("__LANGUAGE_NAME__ == \"my_isa\"")?);
        assert!(check("(__LANGUAGE_VERSION__) > 1").is_err());
        Ok(())
    }
    #[test]
    fn if_elif_else_chain() -> Result<(), Error> {
        let mut pp = Preprocessor::new();
        pp.create_symbol("V", Some("2"), &line(1))?;
        let mut stack = ConditionStack::new();
        assert!(!push(&mut stack, &pp, "if", "V == 1")?);
        assert!(push(&mut stack, &pp, "elif", "V == 2")?);
        assert!(!push(&mut stack, &pp, "elif", "V >= 2")?);
        assert!(!push(&mut stack, &pp, "else", "")?);
        assert!(push(&mut stack, &pp, "endif", "")?);
        assert!(push(&mut stack, &pp, "ifndef", "MISSING")?);
        assert!(!push(&mut stack, &pp, "else", "")?);
        assert!(push(&mut stack, &pp, "endif", "")?);
        assert!(stack.process(Condition::parse("endif", "", &line(9))?, &pp).is_err());
        Ok(())
    }
    #[test]
    fn nested_blocks_inherit_inactivity() -> Result<(), Error> {
        let pp = Preprocessor::new();
        let mut stack = ConditionStack::new();
        assert!(!push(&mut stack, &pp, "if", "0")?);
        assert!(!push(&mut stack, &pp, "if", "1")?);
        assert!(!push(&mut stack, &pp, "else", "")?);
        assert!(!push(&mut stack, &pp, "endif", "")?);
        assert!(push(&mut stack, &pp, "else", "")?);
        assert!(stack.process(Condition::parse("elif", "1", &line(2))?, &pp).is_err());
        Ok(())
    }
    #[test]
    fn mute_counter() {
        let mut stack = ConditionStack::new();
        assert!(!stack.unmute());
        stack.mute();
        stack.mute();
        assert!(stack.unmute());
        assert!(stack.is_muted());
        assert!(stack.unmute());
        assert!(!stack.is_muted());
    }
}
