//! Parsing of `#` lines into [Directive]s. Nothing here touches assembler state; the loader
//! decides what each directive does to the condition stack, symbols, scopes and zones.
use super::condition::Condition;
use super::is_valid_symbol;
use crate::error::{Error, ErrorKind};
use crate::named_scope::DEFAULT_SCOPE_PREFIX;
use crate::parse::{parse_numeric_literal, unescape};
use crate::pathid::LineId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl PrintColor {
    fn from_name(name: &str) -> Option<PrintColor> {
        match name {
            "black" => Some(PrintColor::Black),
            "red" => Some(PrintColor::Red),
            "green" => Some(PrintColor::Green),
            "yellow" => Some(PrintColor::Yellow),
            "blue" => Some(PrintColor::Blue),
            "magenta" => Some(PrintColor::Magenta),
            "cyan" => Some(PrintColor::Cyan),
            "white" => Some(PrintColor::White),
            _ => None,
        }
    }
    /// ANSI foreground color code.
    pub fn ansi_code(&self) -> u8 {
        match self {
            PrintColor::Black => 30,
            PrintColor::Red => 31,
            PrintColor::Green => 32,
            PrintColor::Yellow => 33,
            PrintColor::Blue => 34,
            PrintColor::Magenta => 35,
            PrintColor::Cyan => 36,
            PrintColor::White => 37,
        }
    }
    pub fn paint(&self, msg: &str) -> String { format!("\x1b[{}m{}\x1b[0m", self.ansi_code(), msg) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Include(String),
    Define { name: String, value: Option<String> },
    Condition(Condition),
    Mute,
    /// `#unmute` or its alias `#emit`
    Unmute,
    Error(Option<String>),
    Print {
        level: u8,
        color: Option<PrintColor>,
        message: String,
    },
    Require(String),
    CreateMemzone { name: String, start: i128, end: i128 },
    CreateScope { name: String, prefix: String },
    UseScope(String),
    DeactivateScope(String),
}

fn pp_err(line: &LineId, msg: String) -> Error { Error::new(ErrorKind::Preprocessor, Some(line), &msg) }

/// Split a leading `"..."` or `'...'` off `text`. Returns the unescaped body and the rest.
fn take_quoted(text: &str) -> Option<(String, &str)> {
    let text = text.trim_start();
    let quote = text.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let mut escaped = false;
    for (i, c) in text.char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some((unescape(&text[1..i]), &text[i + 1..]));
        }
    }
    None
}

/// A directive argument that must be exactly one quoted string.
fn single_quoted(directive: &str, rest: &str, line: &LineId) -> Result<String, Error> {
    match take_quoted(rest) {
        Some((body, tail)) if tail.trim().is_empty() => Ok(body),
        _ => Err(pp_err(line, format!("#{} expects a single quoted argument", directive))),
    }
}

impl Directive {
    /// Parse a preprocessor line. `text` starts at the `#`.
    pub fn parse(text: &str, line: &LineId) -> Result<Directive, Error> {
        let body = text.trim().trim_start_matches('#');
        let (word, rest) = match body.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (body, ""),
        };
        if Condition::is_conditional_directive(word) {
            return Ok(Directive::Condition(Condition::parse(word, rest, line)?));
        }
        let directive = match word {
            "include" => Directive::Include(single_quoted(word, rest, line)?),
            "define" => {
                let (name, value) = match rest.split_once(char::is_whitespace) {
                    Some((n, v)) => (n, Some(v.trim().to_string())),
                    None => (rest, None),
                };
                if !is_valid_symbol(name) {
                    return Err(pp_err(line, format!("#define has an invalid symbol name \"{}\"", name)));
                }
                Directive::Define {
                    name: name.to_string(),
                    value: value.filter(|v| !v.is_empty()),
                }
            }
            "mute" if rest.is_empty() => Directive::Mute,
            "unmute" | "emit" if rest.is_empty() => Directive::Unmute,
            "error" => {
                if rest.is_empty() {
                    Directive::Error(None)
                } else {
                    Directive::Error(Some(single_quoted(word, rest, line)?))
                }
            }
            "print" => Directive::parse_print(rest, line)?,
            "require" => Directive::Require(single_quoted(word, rest, line)?),
            "create_memzone" => {
                let fields: Vec<&str> = rest.split_whitespace().collect();
                let parsed = match fields.as_slice() {
                    [name, start, end] => parse_numeric_literal(start)
                        .zip(parse_numeric_literal(end))
                        .map(|(s, e)| (name.to_string(), s, e)),
                    _ => None,
                };
                let (name, start, end) = parsed.ok_or_else(|| {
                    pp_err(
                        line,
                        "#create_memzone expects a zone name followed by numeric start and end addresses".to_string(),
                    )
                })?;
                Directive::CreateMemzone { name, start, end }
            }
            "create-scope" => {
                let (name, tail) = take_quoted(rest)
                    .ok_or_else(|| pp_err(line, "#create-scope expects a quoted scope name".to_string()))?;
                let tail = tail.trim();
                let prefix = if tail.is_empty() {
                    DEFAULT_SCOPE_PREFIX.to_string()
                } else {
                    let value = tail
                        .strip_prefix("prefix")
                        .map(str::trim_start)
                        .and_then(|t| t.strip_prefix('='))
                        .and_then(take_quoted)
                        .filter(|(_, after)| after.trim().is_empty())
                        .map(|(p, _)| p);
                    value.ok_or_else(|| {
                        pp_err(line, format!("#create-scope has unexpected text \"{}\"", tail))
                    })?
                };
                Directive::CreateScope { name, prefix }
            }
            "use-scope" => Directive::UseScope(single_quoted(word, rest, line)?),
            "deactivate-scope" => Directive::DeactivateScope(single_quoted(word, rest, line)?),
            _ => return Err(pp_err(line, format!("unknown preprocessor directive \"#{}\"", word))),
        };
        Ok(directive)
    }

    /// `#print [level] [color] "message"`
    fn parse_print(rest: &str, line: &LineId) -> Result<Directive, Error> {
        let mut level = 0u8;
        let mut color = None;
        let mut remaining = rest.trim_start();
        while !remaining.is_empty() && !remaining.starts_with(['"', '\'']) {
            let (word, tail) = remaining
                .split_once(char::is_whitespace)
                .unwrap_or((remaining, ""));
            if let Ok(n) = word.parse::<u8>() {
                level = n;
            } else if let Some(c) = PrintColor::from_name(&word.to_lowercase()) {
                color = Some(c);
            } else {
                return Err(pp_err(line, format!("#print does not understand \"{}\"", word)));
            }
            remaining = tail.trim_start();
        }
        let message = single_quoted("print", remaining, line)?;
        Ok(Directive::Print { level, color, message })
    }

    /// Conditional directives are the only ones processed inside an inactive block.
    pub fn is_conditional(&self) -> bool { matches!(self, Directive::Condition(_)) }
}
