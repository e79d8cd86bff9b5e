//! Preprocessor symbols and the checks that run before a line is parsed.
//!
//! Symbols come from four places, in this order: the language identification of the ISA,
//! the ISA's `predefined.symbols`, `-D` on the command line, and `#define` lines. A symbol
//! may be defined only once.
pub mod condition;
pub mod directive;

use crate::error::{Error, ErrorKind};
use crate::model::{parse_version, AsmModel};
use crate::pathid::LineId;
use std::collections::BTreeMap;

pub const LANGUAGE_NAME: &str = "__LANGUAGE_NAME__";
pub const LANGUAGE_VERSION: &str = "__LANGUAGE_VERSION__";
pub const LANGUAGE_VERSION_MAJOR: &str = "__LANGUAGE_VERSION_MAJOR__";
pub const LANGUAGE_VERSION_MINOR: &str = "__LANGUAGE_VERSION_MINOR__";
pub const LANGUAGE_VERSION_PATCH: &str = "__LANGUAGE_VERSION_PATCH__";

/// Substitution passes before a chain of symbols is considered circular.
const MAX_RESOLVE_PASSES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub value: Option<String>,
    pub line: LineId,
}

#[derive(Debug, Default)]
pub struct Preprocessor {
    symbols: BTreeMap<String, Symbol>,
}

fn is_symbol_start(c: char) -> bool { c.is_ascii_alphabetic() || c == '_' }
fn is_symbol_char(c: char) -> bool { c.is_ascii_alphanumeric() || c == '_' }

pub fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if is_symbol_start(c)) && chars.all(is_symbol_char)
}

impl Preprocessor {
    pub fn new() -> Self { Preprocessor::default() }

    /// A preprocessor seeded with the language symbols, the ISA's predefined symbols and
    /// the command line definitions.
    pub fn for_model(model: &AsmModel, defines: &[(String, String)]) -> Result<Self, Error> {
        let mut pp = Preprocessor::new();
        let isa_line = LineId::synthetic(&model.name);
        let (major, minor, patch) = model.version_triple();
        pp.create_symbol(LANGUAGE_NAME, Some(&model.name), &isa_line)?;
        pp.create_symbol(LANGUAGE_VERSION, Some(&model.version), &isa_line)?;
        pp.create_symbol(LANGUAGE_VERSION_MAJOR, Some(&major.to_string()), &isa_line)?;
        pp.create_symbol(LANGUAGE_VERSION_MINOR, Some(&minor.to_string()), &isa_line)?;
        pp.create_symbol(LANGUAGE_VERSION_PATCH, Some(&patch.to_string()), &isa_line)?;
        for (name, value) in &model.symbols {
            pp.create_symbol(name, value.as_deref(), &isa_line)?;
        }
        let cli_line = LineId::synthetic("command line");
        for (name, value) in defines {
            let value = if value.is_empty() { None } else { Some(value.as_str()) };
            pp.create_symbol(name, value, &cli_line)?;
        }
        Ok(pp)
    }

    pub fn create_symbol(&mut self, name: &str, value: Option<&str>, line: &LineId) -> Result<(), Error> {
        if !is_valid_symbol(name) {
            return Err(Error::new(
                ErrorKind::Preprocessor,
                Some(line),
                &format!("invalid preprocessor symbol name \"{}\"", name),
            ));
        }
        if let Some(existing) = self.symbols.get(name) {
            return Err(Error::new(
                ErrorKind::Preprocessor,
                Some(line),
                &format!(
                    "preprocessor symbol {} is defined multiple times, first at {}",
                    name, existing.line
                ),
            ));
        }
        self.symbols.insert(
            name.to_string(),
            Symbol {
                name: name.to_string(),
                value: value.map(str::to_string),
                line: line.clone(),
            },
        );
        Ok(())
    }
    pub fn get_symbol(&self, name: &str) -> Option<&Symbol> { self.symbols.get(name) }
    pub fn is_defined(&self, name: &str) -> bool { self.symbols.contains_key(name) }

    /// Replace every symbol that has a value with that value, repeatedly, so symbols may be
    /// defined in terms of other symbols. Quoted text is left alone.
    pub fn resolve_symbols(&self, line: &LineId, text: &str) -> Result<String, Error> {
        let mut current = text.to_string();
        for _ in 0..MAX_RESOLVE_PASSES {
            let (next, changed) = self.substitute_once(&current);
            if !changed {
                return Ok(next);
            }
            current = next;
        }
        Err(Error::new(
            ErrorKind::Preprocessor,
            Some(line),
            &format!("preprocessor symbols in \"{}\" refer to each other in a cycle", text.trim()),
        ))
    }

    fn substitute_once(&self, text: &str) -> (String, bool) {
        let mut out = String::with_capacity(text.len());
        let mut changed = false;
        let mut quote: Option<char> = None;
        let mut chars = text.char_indices().peekable();
        while let Some((start, c)) = chars.next() {
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                }
                out.push(c);
                continue;
            }
            if c == '"' || c == '\'' {
                quote = Some(c);
                out.push(c);
                continue;
            }
            // a word that starts with a digit is a number, not a symbol
            if c.is_ascii_digit() {
                out.push(c);
                while let Some((_, d)) = chars.next_if(|(_, d)| is_symbol_char(*d)) {
                    out.push(d);
                }
                continue;
            }
            if !is_symbol_start(c) {
                out.push(c);
                continue;
            }
            let mut end = start + c.len_utf8();
            while let Some((i, d)) = chars.next_if(|(_, d)| is_symbol_char(*d)) {
                end = i + d.len_utf8();
            }
            let word = &text[start..end];
            match self.symbols.get(word).and_then(|s| s.value.as_deref()) {
                Some(value) if value != word => {
                    out.push_str(value);
                    changed = true;
                }
                _ => out.push_str(word),
            }
        }
        (out, changed)
    }

    /// Check a `#require "language [op version]"` requirement against the ISA identity.
    pub fn check_required_language(&self, requirement: &str, line: &LineId) -> Result<(), Error> {
        let name = self
            .get_symbol(LANGUAGE_NAME)
            .and_then(|s| s.value.clone())
            .unwrap_or_default();
        let version = self
            .get_symbol(LANGUAGE_VERSION)
            .and_then(|s| s.value.clone())
            .unwrap_or_default();
        let requirement = requirement.trim();
        let split_at = requirement.find(['=', '<', '>']);
        let (language, comparison) = match split_at {
            Some(i) => (requirement[..i].trim(), Some(requirement[i..].trim())),
            None => (requirement, None),
        };
        if language != name {
            return Err(Error::new(
                ErrorKind::Preprocessor,
                Some(line),
                &format!(
                    "language \"{}\" is required but the ISA configuration declares language \"{}\"",
                    language, name
                ),
            ));
        }
        let comparison = match comparison {
            Some(c) => c,
            None => {
                verbose_println!(2, "Code requires language \"{}\"; ISA declares {} v{}", language, name, version);
                return Ok(());
            }
        };
        let op_len = if comparison.starts_with(">=") || comparison.starts_with("<=") || comparison.starts_with("==") {
            2
        } else {
            1
        };
        let (op, wanted_text) = comparison.split_at(op_len);
        let op = condition::Comparison::from_str(op).ok_or_else(|| {
            Error::new(
                ErrorKind::Preprocessor,
                Some(line),
                &format!("language requirement comparison \"{}\" is not understood", op),
            )
        })?;
        let bad_version = |v: &str| {
            Error::new(
                ErrorKind::Preprocessor,
                Some(line),
                &format!("\"{}\" is not a valid language version", v),
            )
        };
        let wanted = parse_version(wanted_text).ok_or_else(|| bad_version(wanted_text.trim()))?;
        let have = parse_version(&version).ok_or_else(|| bad_version(&version))?;
        if !op.compare(&have, &wanted) {
            return Err(Error::new(
                ErrorKind::Preprocessor,
                Some(line),
                &format!(
                    "language version {} {} is required but the ISA configuration declares version {}",
                    op,
                    wanted_text.trim(),
                    version
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TEST_ISA;

    #[test]
    fn symbols_resolve_recursively() -> Result<(), Error> {
        let line = LineId::synthetic("pp");
        let mut pp = Preprocessor::new();
        pp.create_symbol("WIDTH", Some("HEIGHT * 2"), &line)?;
        pp.create_symbol("HEIGHT", Some("4"), &line)?;
        pp.create_symbol("FLAG", None, &line)?;
        assert_eq!(pp.resolve_symbols(&line, "ld a, WIDTH + 1")?, "ld a, 4 * 2 + 1");
        assert_eq!(pp.resolve_symbols(&line, "\"WIDTH\" FLAG 0xWIDTH")?, "\"WIDTH\" FLAG 0xWIDTH");
        assert!(pp.create_symbol("WIDTH", Some("1"), &line).is_err());
        assert!(pp.create_symbol("9lives", None, &line).is_err());
        pp.create_symbol("LOOP_A", Some("LOOP_B"), &line)?;
        pp.create_symbol("LOOP_B", Some("LOOP_A"), &line)?;
        assert!(pp.resolve_symbols(&line, "LOOP_A").is_err());
        Ok(())
    }
    #[test]
    fn language_symbols_and_requirements() -> Result<(), Error> {
        let model = AsmModel::from_yaml_str(TEST_ISA, "test")?;
        let pp = Preprocessor::for_model(&model, &[("DEBUG".to_string(), String::new())])?;
        assert!(pp.is_defined("DEBUG"));
        assert_eq!(
            pp.get_symbol(LANGUAGE_VERSION_MINOR).and_then(|s| s.value.clone()),
            Some("2".to_string())
        );
        let line = LineId::synthetic("req");
        pp.check_required_language("test_isa", &line)?;
        pp.check_required_language("test_isa >= 1.0.0", &line)?;
        pp.check_required_language("test_isa == 1.2.3", &line)?;
        assert!(pp.check_required_language("test_isa > 1.2.3", &line).is_err());
        assert!(pp.check_required_language("other_isa", &line).is_err());
        Ok(())
    }
}
