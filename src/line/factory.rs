//! Turns the text of one source line into [LineObject]s.
//!
//! A line is split at the first `;` outside quotes; what precedes it has preprocessor symbols
//! substituted and is then consumed statement by statement:
//! ```text
//!     line      ::= statement*
//!     statement ::= label ":" | constant | directive | string | instruction
//!     constant  ::= name ("=" | "EQU") expr          ; consumes the rest of the line
//!     directive ::= "." name arguments               ; consumes the rest of the line
//!     instruction ::= mnemonic operands              ; ends where the next mnemonic starts
//! ```
use super::data::{directive_value_bytes, DataLine};
use super::{LineKind, LineObject};
use crate::context::CompilationContext;
use crate::error::{Error, ErrorKind};
use crate::label_scope::ScopeId;
use crate::memzone::ZoneId;
use crate::model::generator::{parse_instruction, split_operands};
use crate::named_scope::ActiveNamedScopeList;
use crate::parse::{is_valid_label, Expression};
use crate::pathid::LineId;
use regex::Regex;

/// Where the loader is when it hands a line to the factory.
#[derive(Debug, Clone)]
pub struct LineState {
    pub zone: ZoneId,
    pub scope: ScopeId,
    pub named_scopes: ActiveNamedScopeList,
    pub compilable: bool,
    pub muted: bool,
}

pub struct LineFactory {
    label: Regex,
    constant: Regex,
    directive: Regex,
}

/// Split `text` at the first `;` that isn't inside quotes.
pub fn split_comment(text: &str) -> (&str, &str) {
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == ';' => return (&text[..i], text[i + 1..].trim()),
            None => {}
        }
    }
    (text, "")
}

/// Byte offset just past the closing quote of the string `text` starts with.
fn quoted_len(text: &str) -> Option<usize> {
    let quote = text.chars().next()?;
    let mut escaped = false;
    for (i, c) in text.char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(i + 1);
        }
    }
    None
}

fn is_word_char(c: char) -> bool { c.is_ascii_alphanumeric() || c == '_' || c == '.' }

impl LineFactory {
    pub fn new() -> Result<Self, Error> {
        Ok(LineFactory {
            label: Regex::new(r"^(\.?\w+):")?,
            constant: Regex::new(r"(?i)^(\.?\w+)(?:\s*=\s*|\s+equ\s+)(.+)$")?,
            directive: Regex::new(r"^\.(\w+)(?:\s+(.*))?$")?,
        })
    }

    /// Parse one (non-preprocessor) line.
    pub fn parse_line(
        &self, ctx: &CompilationContext, line_id: &LineId, text: &str, state: &LineState,
    ) -> Result<Vec<LineObject>, Error> {
        let (code, comment) = split_comment(text);
        let code = ctx.preprocessor.resolve_symbols(line_id, code)?;
        let mut kinds = Vec::new();
        let mut rest = code.trim();
        while !rest.is_empty() {
            if let Some(caps) = self.label.captures(rest) {
                let name = &caps[1];
                self.check_label(ctx, line_id, name)?;
                kinds.push((caps[0].to_string(), LineKind::Label(name.to_string())));
                rest = rest[caps[0].len()..].trim_start();
                continue;
            }
            if let Some(caps) = self.constant.captures(rest) {
                let name = &caps[1];
                self.check_label(ctx, line_id, name)?;
                let expr = Expression::parse(&caps[2]).map_err(|e| e.at(line_id))?;
                let value = expr
                    .eval(&ctx.labels(state.scope, &state.named_scopes))
                    .map_err(|e| e.at(line_id))?;
                kinds.push((
                    rest.to_string(),
                    LineKind::Constant {
                        name: name.to_string(),
                        value,
                    },
                ));
                break;
            }
            if rest.starts_with('.') {
                kinds.push((rest.to_string(), self.parse_directive(ctx, line_id, rest)?));
                break;
            }
            if rest.starts_with('"') && ctx.model.allow_embedded_strings {
                let len = quoted_len(rest).ok_or_else(|| syntax_err!(line_id, "unterminated string {}", rest))?;
                let data = DataLine::embedded_string(&rest[..len], line_id, ctx.model)?;
                kinds.push((rest[..len].to_string(), LineKind::Data(data)));
                rest = rest[len..].trim_start();
                continue;
            }
            let mnemonic: String = rest.chars().take_while(|c| is_word_char(*c)).collect();
            if mnemonic.is_empty() || !ctx.model.instructions.contains(&mnemonic) {
                return Err(syntax_err!(line_id, "unknown instruction \"{}\"", rest));
            }
            let end = self.instruction_end(ctx, rest, mnemonic.len());
            let instr = parse_instruction(ctx.model, line_id, &rest[..end], &ctx.zones)?;
            kinds.push((rest[..end].trim().to_string(), LineKind::Instruction(instr)));
            rest = rest[end..].trim_start();
        }
        if kinds.is_empty() {
            kinds.push((code.trim().to_string(), LineKind::Plain));
        }
        Ok(kinds
            .into_iter()
            .map(|(text, kind)| {
                let mut obj = LineObject::new(line_id, &text, comment, state.zone, state.scope, kind);
                obj.named_scopes = state.named_scopes.clone();
                obj.compilable = state.compilable;
                obj.muted = state.muted;
                obj
            })
            .collect())
    }

    fn check_label(&self, ctx: &CompilationContext, line_id: &LineId, name: &str) -> Result<(), Error> {
        if !is_valid_label(name) {
            return Err(line_err!(line_id, ErrorKind::Label, "invalid label name \"{}\"", name));
        }
        if ctx.model.registers.contains(name) {
            return Err(line_err!(
                line_id,
                ErrorKind::Label,
                "register name \"{}\" can't be used as a label",
                name
            ));
        }
        Ok(())
    }

    /// End of the instruction starting at the beginning of `text`: the start of the next word
    /// that is a mnemonic and follows a complete operand, or the end of the text.
    fn instruction_end(&self, ctx: &CompilationContext, text: &str, mnemonic_len: usize) -> usize {
        let mut quote: Option<char> = None;
        let mut depth = 0i32;
        let mut prev_significant = 'x';
        let mut after_space = false;
        for (i, c) in text.char_indices().skip_while(|(i, _)| *i < mnemonic_len) {
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                }
                prev_significant = c;
                continue;
            }
            match c {
                '"' | '\'' => quote = Some(c),
                '[' | '(' | '{' => depth += 1,
                ']' | ')' | '}' => depth -= 1,
                _ => {}
            }
            if c.is_whitespace() {
                after_space = true;
                continue;
            }
            let ends_operand = prev_significant.is_ascii_alphanumeric()
                || matches!(prev_significant, '_' | ']' | ')' | '"' | '\'');
            if after_space && depth == 0 && ends_operand && is_word_char(c) {
                let word: String = text[i..].chars().take_while(|c| is_word_char(*c)).collect();
                if ctx.model.instructions.contains(&word) {
                    return i;
                }
            }
            after_space = false;
            prev_significant = c;
        }
        text.len()
    }

    fn parse_directive(&self, ctx: &CompilationContext, line_id: &LineId, text: &str) -> Result<LineKind, Error> {
        let caps = self
            .directive
            .captures(text)
            .ok_or_else(|| syntax_err!(line_id, "malformed directive \"{}\"", text))?;
        let name = caps[1].to_lowercase();
        let args = caps.get(2).map_or("", |m| m.as_str()).trim();
        let expr = |t: &str| Expression::parse(t).map_err(|e| e.at(line_id));
        let need_args = |count: usize| -> Result<Vec<String>, Error> {
            let parts = split_operands(args);
            if parts.len() != count || parts.iter().any(|p| p.is_empty()) {
                return Err(syntax_err!(
                    line_id,
                    ".{} takes {} argument{}",
                    name,
                    count,
                    if count == 1 { "" } else { "s" }
                ));
            }
            Ok(parts)
        };
        let kind = match name.as_str() {
            "org" => {
                let (expr_text, zone_name) = match args.strip_suffix('"').and_then(|a| a.rsplit_once('"')) {
                    Some((e, zone)) => (e.trim(), Some(zone.to_string())),
                    None => (args, None),
                };
                if expr_text.is_empty() {
                    return Err(syntax_err!(line_id, ".org needs an address"));
                }
                if let Some(zone) = zone_name.as_deref() {
                    self.zone_by_name(ctx, line_id, zone)?;
                }
                LineKind::Org {
                    expr: expr(expr_text)?,
                    zone_name,
                }
            }
            "memzone" => {
                let zone = args.trim_matches('"');
                if zone.is_empty() {
                    return Err(syntax_err!(line_id, ".memzone needs a memory zone name"));
                }
                self.zone_by_name(ctx, line_id, zone)?;
                LineKind::SetZone(zone.to_string())
            }
            "fill" => {
                let parts = need_args(2)?;
                LineKind::Fill {
                    count: expr(&parts[0])?,
                    value: expr(&parts[1])?,
                }
            }
            "zero" => LineKind::Fill {
                count: expr(&need_args(1)?[0])?,
                value: Expression::literal(0),
            },
            "zerountil" => LineKind::FillUntil {
                until: expr(&need_args(1)?[0])?,
                value: Expression::literal(0),
            },
            "align" => LineKind::PageAlign(if args.is_empty() { None } else { Some(expr(args)?) }),
            _ if directive_value_bytes(&name).is_some() => LineKind::Data(DataLine::parse(&name, args, line_id, ctx.model)?),
            _ => return Err(syntax_err!(line_id, "unknown directive \".{}\"", name)),
        };
        Ok(kind)
    }

    fn zone_by_name(&self, ctx: &CompilationContext, line_id: &LineId, name: &str) -> Result<ZoneId, Error> {
        ctx.zones
            .zone(name)
            .ok_or_else(|| syntax_err!(line_id, "unknown memory zone \"{}\"", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssemblerOptions;
    use crate::model::{AsmModel, TEST_ISA};

    fn parse(ctx: &CompilationContext, text: &str) -> Result<Vec<LineObject>, Error> {
        let state = LineState {
            zone: ctx.zones.global_zone(),
            scope: ctx.scopes.global(),
            named_scopes: ActiveNamedScopeList::new(),
            compilable: true,
            muted: false,
        };
        LineFactory::new()?.parse_line(ctx, &LineId::synthetic("factory"), text, &state)
    }
    fn kinds(objs: &[LineObject]) -> Vec<&str> {
        objs.iter()
            .map(|o| match &o.kind {
                LineKind::Plain => "plain",
                LineKind::Label(_) => "label",
                LineKind::Constant { .. } => "constant",
                LineKind::Instruction(_) => "instruction",
                LineKind::Data(_) => "data",
                LineKind::Fill { .. } | LineKind::FillUntil { .. } => "fill",
                LineKind::PageAlign(_) => "align",
                LineKind::Org { .. } => "org",
                LineKind::SetZone(_) => "memzone",
            })
            .collect()
    }

    #[test]
    fn comments_and_statements() -> Result<(), Error> {
        assert_eq!(split_comment("nop ; go"), ("nop ", "go"));
        assert_eq!(split_comment(".cstr \"a;b\" ;c"), (".cstr \"a;b\" ", "c"));
        let model = AsmModel::from_yaml_str(TEST_ISA, "test")?;
        let ctx = CompilationContext::new(&model, AssemblerOptions::default())?;
        let objs = parse(&ctx, "loop: nop hlt ; twice")?;
        assert_eq!(kinds(&objs), vec!["label", "instruction", "instruction"]);
        assert_eq!(objs[1].text, "nop");
        assert_eq!(objs[2].comment, "twice");
        let objs = parse(&ctx, "mov a, [the_byte] jmp_twice target")?;
        assert_eq!(kinds(&objs), vec!["instruction", "instruction"]);
        assert_eq!(objs[0].text, "mov a, [the_byte]");
        assert_eq!(kinds(&parse(&ctx, "   ; only a comment")?), vec!["plain"]);
        Ok(())
    }
    #[test]
    fn constants_and_directives() -> Result<(), Error> {
        let model = AsmModel::from_yaml_str(TEST_ISA, "test")?;
        let ctx = CompilationContext::new(&model, AssemblerOptions::default())?;
        match &parse(&ctx, "port2 = io_port + 1")?[0].kind {
            LineKind::Constant { name, value } => {
                assert_eq!(name, "port2");
                assert_eq!(*value, 0x81);
            }
            other => return Err(general_err!("expected a constant, got {:?}", other)),
        }
        assert_eq!(kinds(&parse(&ctx, "WIDTH EQU 8")?), vec!["constant"]);
        assert_eq!(kinds(&parse(&ctx, "start: .org $100")?), vec!["label", "org"]);
        assert_eq!(kinds(&parse(&ctx, ".fill 4, $ff")?), vec!["fill"]);
        assert_eq!(kinds(&parse(&ctx, ".zerountil $20")?), vec!["fill"]);
        assert_eq!(kinds(&parse(&ctx, ".align")?), vec!["align"]);
        assert_eq!(kinds(&parse(&ctx, ".2byte 1, 2")?), vec!["data"]);
        assert_eq!(kinds(&parse(&ctx, ".memzone GLOBAL")?), vec!["memzone"]);
        Ok(())
    }
    #[test]
    fn rejected_lines() -> Result<(), Error> {
        let model = AsmModel::from_yaml_str(TEST_ISA, "test")?;
        let ctx = CompilationContext::new(&model, AssemblerOptions::default())?;
        let kind = |t: &str| parse(&ctx, t).err().map(|e| e.kind);
        assert_eq!(kind("frobnicate a"), Some(ErrorKind::Syntax));
        assert_eq!(kind("a: nop"), Some(ErrorKind::Label));
        assert_eq!(kind("x = missing + 1"), Some(ErrorKind::Label));
        assert_eq!(kind(".memzone nowhere"), Some(ErrorKind::Syntax));
        assert_eq!(kind(".org 0 \"nowhere\""), Some(ErrorKind::Syntax));
        assert_eq!(kind(".fill 4"), Some(ErrorKind::Syntax));
        assert_eq!(kind(".bogus 1"), Some(ErrorKind::Syntax));
        assert_eq!(kind("\"embedded\""), Some(ErrorKind::Syntax));
        Ok(())
    }
}
