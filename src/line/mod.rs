//! Line objects: what one statement of a source line becomes once parsed. A source line
//! can produce several objects (`loop: nop nop` gives a label and two instructions).
//!
//! Objects are placed by the first pass ([LineObject::assign_address]) and produce their
//! words in the second ([LineObject::generate_words]).
pub mod data;
pub mod factory;

use crate::bytecode::{low_mask, AssembledInstruction, PartContext, Word};
use crate::error::{Error, ErrorKind};
use crate::label_scope::{LabelScopes, ScopeId};
use crate::memzone::{MemoryZoneManager, ZoneId};
use crate::model::AsmModel;
use crate::named_scope::{ActiveNamedScopeList, NamedScopeManager};
use crate::parse::{Expression, LabelResolver};
use crate::pathid::LineId;
use data::DataLine;

/// Label lookup for one line: active named scopes first, then the line's own scope chain.
pub struct ScopedLabels<'a> {
    pub scopes: &'a LabelScopes,
    pub named: &'a NamedScopeManager,
    pub scope: ScopeId,
    pub active: &'a ActiveNamedScopeList,
}

impl LabelResolver for ScopedLabels<'_> {
    fn resolve(&self, label: &str) -> Option<i128> {
        self.named
            .get_label_value(label, self.active)
            .or_else(|| self.scopes.get_label_value(self.scope, label))
    }
}

/// Read-only state both passes look at.
pub struct LineEnv<'a> {
    pub model: &'a AsmModel,
    pub zones: &'a MemoryZoneManager,
    pub scopes: &'a LabelScopes,
    pub named: &'a NamedScopeManager,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// blank, comment-only, preprocessor or inactive line
    Plain,
    Label(String),
    /// `name = expr`, valued when parsed
    Constant { name: String, value: i128 },
    Instruction(AssembledInstruction),
    Data(DataLine),
    /// `.fill count, value` and `.zero count`
    Fill { count: Expression, value: Expression },
    /// `.zerountil address`: fill through `until`, inclusive
    FillUntil { until: Expression, value: Expression },
    /// `.align [page]`
    PageAlign(Option<Expression>),
    /// `.org expr ["zone"]`
    Org { expr: Expression, zone_name: Option<String> },
    /// `.memzone name`
    SetZone(String),
}

#[derive(Debug, Clone)]
pub struct LineObject {
    pub line_id: LineId,
    pub text: String,
    pub comment: String,
    pub zone: ZoneId,
    pub address: Option<i128>,
    pub scope: ScopeId,
    pub named_scopes: ActiveNamedScopeList,
    /// false for lines inside an inactive conditional block
    pub compilable: bool,
    /// placed and checked but not emitted
    pub muted: bool,
    pub kind: LineKind,
    word_count: usize,
    words: Vec<Word>,
}

impl LineObject {
    pub fn new(line_id: &LineId, text: &str, comment: &str, zone: ZoneId, scope: ScopeId, kind: LineKind) -> Self {
        LineObject {
            line_id: line_id.clone(),
            text: text.to_string(),
            comment: comment.to_string(),
            zone,
            address: None,
            scope,
            named_scopes: ActiveNamedScopeList::new(),
            compilable: true,
            muted: false,
            kind,
            word_count: 0,
            words: Vec::new(),
        }
    }
    pub fn plain(line_id: &LineId, text: &str, zone: ZoneId, scope: ScopeId) -> Self {
        LineObject::new(line_id, text, "", zone, scope, LineKind::Plain)
    }

    pub fn labels<'a>(&'a self, env: &LineEnv<'a>) -> ScopedLabels<'a> {
        ScopedLabels {
            scopes: env.scopes,
            named: env.named,
            scope: self.scope,
            active: &self.named_scopes,
        }
    }
    fn eval(&self, expr: &Expression, env: &LineEnv) -> Result<i128, Error> {
        expr.eval(&self.labels(env)).map_err(|e| e.at(&self.line_id))
    }

    /// Size in words. Known once the first pass has placed the object.
    pub fn word_count(&self) -> usize { self.word_count }
    pub fn words(&self) -> &[Word] { &self.words }
    /// Lines that occupy address space.
    pub fn produces_words(&self) -> bool { self.word_count > 0 }
    /// A label whose value is the line's address, as opposed to a constant.
    pub fn address_label(&self) -> Option<&str> {
        match &self.kind {
            LineKind::Label(name) => Some(name),
            _ => None,
        }
    }

    /// Place the object at `cursor`, or wherever the directive says, and work out its size.
    /// Returns the zone cursor position after the object.
    pub fn assign_address(&mut self, cursor: i128, env: &LineEnv) -> Result<i128, Error> {
        let (address, size) = match &self.kind {
            LineKind::Org { expr, zone_name } => {
                let offset = self.eval(expr, env)?;
                let address = match zone_name {
                    Some(_) => env.zones.get(self.zone).start + offset,
                    None => offset,
                };
                let global = env.zones.get(env.zones.global_zone());
                if !global.contains(address) {
                    return Err(range_err!(
                        &self.line_id,
                        ".org address 0x{:x} is outside the address range 0x{:x}-0x{:x}",
                        address,
                        global.start,
                        global.end
                    ));
                }
                (address, 0)
            }
            LineKind::PageAlign(page) => {
                let page_size = match page {
                    Some(expr) => self.eval(expr, env)?,
                    None => env.model.page_size,
                };
                if page_size < 1 {
                    return Err(range_err!(&self.line_id, "page size {} must be at least 1", page_size));
                }
                let offset = cursor.rem_euclid(page_size);
                let aligned = if offset == 0 { cursor } else { cursor + page_size - offset };
                (aligned, 0)
            }
            LineKind::Fill { count, .. } => {
                let count = self.eval(count, env)?;
                if count < 0 {
                    return Err(range_err!(&self.line_id, "fill count {} is negative", count));
                }
                (cursor, count)
            }
            LineKind::FillUntil { until, .. } => {
                let until = self.eval(until, env)?;
                (cursor, if until >= cursor { until - cursor + 1 } else { 0 })
            }
            LineKind::Instruction(instr) => (cursor, instr.word_count() as i128),
            LineKind::Data(data) => (cursor, data.word_count() as i128),
            LineKind::Plain
            | LineKind::Label(_)
            | LineKind::Constant { .. }
            | LineKind::SetZone(_) => (cursor, 0),
        };
        self.address = Some(address);
        self.word_count = size as usize;
        Ok(address + size)
    }

    /// For `.zerountil`, the target address when it lies before the word preceding `cursor`,
    /// meaning the directive fills nothing.
    pub fn fill_target_behind(&self, cursor: i128, env: &LineEnv) -> Result<Option<i128>, Error> {
        match &self.kind {
            LineKind::FillUntil { until, .. } => {
                let until = self.eval(until, env)?;
                Ok(if until + 1 < cursor { Some(until) } else { None })
            }
            _ => Ok(None),
        }
    }

    /// Produce the object's words. Warnings (truncated data) are appended to `warnings`.
    pub fn generate_words(&mut self, env: &LineEnv, warnings: &mut Vec<String>) -> Result<(), Error> {
        let address = self.address.ok_or_else(|| {
            Error::new(
                ErrorKind::General,
                Some(&self.line_id),
                "words requested before an address was assigned",
            )
        })?;
        let words = match &self.kind {
            LineKind::Instruction(instr) => {
                let labels = self.labels(env);
                let ctx = PartContext {
                    labels: &labels,
                    zones: env.zones,
                    address,
                    size: self.word_count as i128,
                };
                instr.generate_words(&ctx, &env.model.word_layout())?
            }
            LineKind::Data(data) => data.generate(&self.labels(env), &self.line_id, warnings)?,
            LineKind::Fill { value, .. } | LineKind::FillUntil { value, .. } => {
                let value = self.eval(value, env)? as u128 & low_mask(env.model.word_size);
                let word = Word::new(
                    value,
                    env.model.word_size,
                    env.model.segment_size,
                    env.model.intra_word_endian,
                )
                .map_err(|e| e.at(&self.line_id))?;
                vec![word; self.word_count]
            }
            _ => Vec::new(),
        };
        if words.len() != self.word_count {
            return Err(Error::new(
                ErrorKind::General,
                Some(&self.line_id),
                &format!("generated {} words but {} were reserved", words.len(), self.word_count),
            ));
        }
        self.words = words;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TEST_ISA;

    struct Fixture {
        model: AsmModel,
        zones: MemoryZoneManager,
        scopes: LabelScopes,
        named: NamedScopeManager,
    }
    impl Fixture {
        fn new() -> Result<Self, Error> {
            let model = AsmModel::from_yaml_str(TEST_ISA, "test")?;
            let mut zones = MemoryZoneManager::new(model.address_size, 0)?;
            zones.create_zone(0x8000, 0x8fff, "rom", None)?;
            Ok(Fixture {
                model,
                zones,
                scopes: LabelScopes::new(),
                named: NamedScopeManager::new(),
            })
        }
        fn env(&self) -> LineEnv {
            LineEnv {
                model: &self.model,
                zones: &self.zones,
                scopes: &self.scopes,
                named: &self.named,
            }
        }
        fn line(&self, kind: LineKind) -> LineObject {
            LineObject::new(
                &LineId::synthetic("line"),
                "",
                "",
                self.zones.global_zone(),
                self.scopes.global(),
                kind,
            )
        }
    }

    #[test]
    fn directives_place_themselves() -> Result<(), Error> {
        let f = Fixture::new()?;
        let mut align = f.line(LineKind::PageAlign(Some(Expression::parse("16")?)));
        assert_eq!(align.assign_address(0x21, &f.env())?, 0x30);
        assert_eq!(align.assign_address(0x30, &f.env())?, 0x30);

        let mut org = f.line(LineKind::Org {
            expr: Expression::parse("$10")?,
            zone_name: Some("rom".to_string()),
        });
        org.zone = f.zones.zone("rom").ok_or_else(|| general_err!("no rom zone"))?;
        assert_eq!(org.assign_address(0, &f.env())?, 0x8010);
        let mut bad = f.line(LineKind::Org {
            expr: Expression::parse("$10000")?,
            zone_name: None,
        });
        assert_eq!(bad.assign_address(0, &f.env()).err().map(|e| e.kind), Some(ErrorKind::Range));

        let mut until = f.line(LineKind::FillUntil {
            until: Expression::parse("$13")?,
            value: Expression::literal(0),
        });
        assert_eq!(until.assign_address(0x10, &f.env())?, 0x14);
        assert_eq!(until.word_count(), 4);
        assert_eq!(until.assign_address(0x20, &f.env())?, 0x20);
        assert_eq!(until.fill_target_behind(0x20, &f.env())?, Some(0x13));
        assert_eq!(until.fill_target_behind(0x14, &f.env())?, None);
        Ok(())
    }
    #[test]
    fn fill_words_are_masked() -> Result<(), Error> {
        let f = Fixture::new()?;
        let mut fill = f.line(LineKind::Fill {
            count: Expression::parse("3")?,
            value: Expression::parse("$1ab")?,
        });
        fill.assign_address(0, &f.env())?;
        let mut warnings = Vec::new();
        fill.generate_words(&f.env(), &mut warnings)?;
        let values: Vec<u128> = fill.words().iter().map(|w| w.value()).collect();
        assert_eq!(values, vec![0xab, 0xab, 0xab]);
        Ok(())
    }
    #[test]
    fn named_scopes_shadow_the_scope_chain() -> Result<(), Error> {
        let mut f = Fixture::new()?;
        let line = LineId::new(Some(0), "lib.asm", 1);
        let global = f.scopes.global();
        f.scopes.set_label_value(global, "m_sin", 1, &line)?;
        f.named.create_scope("math", "m_", &line)?;
        let mut active = ActiveNamedScopeList::new();
        active.activate("math");
        f.named.set_label_value("m_sin", 2, &line, &active)?;
        let mut obj = f.line(LineKind::Plain);
        assert_eq!(obj.labels(&f.env()).resolve("m_sin"), Some(1));
        obj.named_scopes = active;
        assert_eq!(obj.labels(&f.env()).resolve("m_sin"), Some(2));
        Ok(())
    }
}
