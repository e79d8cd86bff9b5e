//! Matching an instruction's operand list against its configured operands.
//!
//! Specific operand tuples are tried first, in configuration order. When none of them match,
//! every position is matched against its operand set, and the resulting combination is
//! rejected if it is listed as a disallowed pair.
use super::operand::{BytecodePosition, EncodingDefaults, Operand, OperandSet, ParsedOperand};
use super::schema::OperandsConfig;
use crate::bytecode::ByteCodePart;
use crate::error::Error;
use crate::memzone::MemoryZoneManager;
use crate::pathid::LineId;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

#[derive(Debug)]
struct SpecificOperands {
    operands: Vec<Operand>,
    reverse_argument_order: bool,
    reverse_bytecode_order: bool,
}

#[derive(Debug)]
struct OperandSets {
    sets: Vec<Rc<OperandSet>>,
    disallowed_pairs: Vec<Vec<String>>,
    reverse_argument_order: bool,
    reverse_bytecode_order: bool,
}

#[derive(Debug)]
pub struct OperandParser {
    count: usize,
    specific: Vec<SpecificOperands>,
    operand_sets: Option<OperandSets>,
}

/// Operands that matched, in source order, plus the ordering flags of whatever matched them.
#[derive(Debug, Clone)]
pub struct MatchedOperandSet {
    pub operands: Vec<ParsedOperand>,
    reverse_argument_order: bool,
    reverse_bytecode_order: bool,
}

impl MatchedOperandSet {
    pub fn empty() -> Self {
        MatchedOperandSet {
            operands: Vec::new(),
            reverse_argument_order: false,
            reverse_bytecode_order: false,
        }
    }

    /// Lay out the instruction's parts: prefix operand bytecodes, the base bytecode, suffix
    /// operand bytecodes, the instruction's bytecode suffix, and finally the arguments.
    pub fn generate_bytecode(&self, base: Option<ByteCodePart>, suffix: Option<ByteCodePart>) -> Vec<ByteCodePart> {
        let mut prefix_parts = Vec::new();
        let mut suffix_parts = Vec::new();
        for op in &self.operands {
            if let Some(bytecode) = op.bytecode.as_ref() {
                match op.position {
                    BytecodePosition::Prefix => prefix_parts.insert(0, bytecode.clone()),
                    BytecodePosition::Suffix => suffix_parts.push(bytecode.clone()),
                }
            }
        }
        if self.reverse_bytecode_order {
            prefix_parts.reverse();
            suffix_parts.reverse();
        }
        let mut parts = prefix_parts;
        parts.extend(base);
        parts.extend(suffix_parts);
        parts.extend(suffix);

        let mut arguments: Vec<ByteCodePart> = self.operands.iter().filter_map(|op| op.argument.clone()).collect();
        if self.reverse_argument_order {
            arguments.reverse();
        }
        parts.extend(arguments);
        parts
    }
}

impl OperandParser {
    pub fn from_config(
        instruction: &str, cfg: &OperandsConfig, sets: &BTreeMap<String, Rc<OperandSet>>, defaults: &EncodingDefaults,
    ) -> Result<OperandParser, Error> {
        let count = cfg.count.ok_or_else(|| {
            config_err!(
                "configuration for instruction \"{}\" does not have a \"count\" element",
                instruction
            )
        })?;
        let mut specific = Vec::new();
        if let Some(specific_cfg) = cfg.specific_operands.as_ref() {
            for (_, tuple) in specific_cfg.iter() {
                let operands = tuple
                    .list
                    .iter()
                    .map(|(id, op_cfg)| Operand::from_config(id, op_cfg, defaults))
                    .collect::<Result<Vec<Operand>, Error>>()
                    .map_err(|e| config_err!("instruction \"{}\": {}", instruction, e.msg))?;
                specific.push(SpecificOperands {
                    operands,
                    reverse_argument_order: tuple.reverse_argument_order,
                    reverse_bytecode_order: tuple.reverse_bytecode_order,
                });
            }
        }
        let operand_sets = match cfg.operand_sets.as_ref() {
            Some(sets_cfg) => {
                let names = sets_cfg.list.as_ref().ok_or_else(|| {
                    config_err!(
                        "operand set configuration is missing the \"list\" key for instruction \"{}\"",
                        instruction
                    )
                })?;
                let resolved = names
                    .iter()
                    .map(|name| {
                        sets.get(name).cloned().ok_or_else(|| {
                            config_err!(
                                "instruction \"{}\" references unknown operand set \"{}\"",
                                instruction,
                                name
                            )
                        })
                    })
                    .collect::<Result<Vec<_>, Error>>()?;
                if resolved.len() != count {
                    return Err(config_err!(
                        "the number of configured operand sets ({}) does not match the operand count ({}) for instruction \"{}\"",
                        resolved.len(),
                        count,
                        instruction
                    ));
                }
                Some(OperandSets {
                    sets: resolved,
                    disallowed_pairs: sets_cfg.disallowed_pairs.clone(),
                    reverse_argument_order: sets_cfg.reverse_argument_order,
                    reverse_bytecode_order: sets_cfg.reverse_bytecode_order,
                })
            }
            None => None,
        };
        Ok(OperandParser {
            count,
            specific,
            operand_sets,
        })
    }
    pub fn operand_count(&self) -> usize { self.count }

    /// None means this parser doesn't accept the operands; errors are for operands that are
    /// recognizably meant for it but malformed.
    pub fn find_matching_operands(
        &self, line_id: &LineId, operands: &[String], registers: &BTreeSet<String>, zones: &MemoryZoneManager,
    ) -> Result<Option<MatchedOperandSet>, Error> {
        if self.count == 0 && operands.is_empty() {
            return Ok(Some(MatchedOperandSet::empty()));
        }
        for tuple in &self.specific {
            if let Some(matched) = self.match_specific(tuple, line_id, operands, registers, zones)? {
                return Ok(Some(matched));
            }
        }
        match self.operand_sets.as_ref() {
            Some(sets) => self.match_sets(sets, line_id, operands, registers, zones),
            None => Ok(None),
        }
    }

    fn match_specific(
        &self, tuple: &SpecificOperands, line_id: &LineId, operands: &[String], registers: &BTreeSet<String>,
        zones: &MemoryZoneManager,
    ) -> Result<Option<MatchedOperandSet>, Error> {
        // a tuple of the wrong arity can't match, but a later one still might
        if tuple.operands.len() != self.count {
            return Ok(None);
        }
        let null_count = tuple.operands.iter().filter(|op| op.is_null()).count();
        if operands.len() + null_count != self.count {
            return Ok(None);
        }
        let mut texts = operands.iter();
        let mut matched = Vec::with_capacity(self.count);
        for op in &tuple.operands {
            let text = if op.is_null() {
                ""
            } else {
                match texts.next() {
                    Some(t) => t.as_str(),
                    None => return Ok(None),
                }
            };
            match op.parse_operand(line_id, text, registers, zones)? {
                Some(parsed) => matched.push(parsed),
                None => return Ok(None),
            }
        }
        Ok(Some(MatchedOperandSet {
            operands: matched,
            reverse_argument_order: tuple.reverse_argument_order,
            reverse_bytecode_order: tuple.reverse_bytecode_order,
        }))
    }

    fn match_sets(
        &self, sets: &OperandSets, line_id: &LineId, operands: &[String], registers: &BTreeSet<String>,
        zones: &MemoryZoneManager,
    ) -> Result<Option<MatchedOperandSet>, Error> {
        if operands.len() != sets.sets.len() {
            return Ok(None);
        }
        let mut matched = Vec::with_capacity(operands.len());
        for (set, text) in sets.sets.iter().zip(operands) {
            match set.parse_operand(line_id, text, registers, zones)? {
                Some(parsed) => matched.push(parsed),
                None => return Ok(None),
            }
        }
        let ids: Vec<&str> = matched.iter().map(|p| p.operand_id.as_str()).collect();
        if sets
            .disallowed_pairs
            .iter()
            .any(|pair| pair.iter().map(String::as_str).eq(ids.iter().copied()))
        {
            return Ok(None);
        }
        Ok(Some(MatchedOperandSet {
            operands: matched,
            reverse_argument_order: sets.reverse_argument_order,
            reverse_bytecode_order: sets.reverse_bytecode_order,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Endian, PartKind};
    use crate::model::schema::OperandSetConfig;

    fn defaults() -> EncodingDefaults {
        EncodingDefaults {
            multi_word_endian: Endian::Little,
            intra_word_endian: Endian::Big,
            registers: ["a", "b", "hl"].iter().map(|s| s.to_string()).collect(),
        }
    }
    fn sets() -> Result<BTreeMap<String, Rc<OperandSet>>, Error> {
        let mut sets = BTreeMap::new();
        let regs: OperandSetConfig = serde_yaml::from_str(
            "operand_values:\n  reg_a: {type: register, register: a, bytecode: {value: 0, size: 2}}\n  \
             reg_b: {type: register, register: b, bytecode: {value: 1, size: 2}}\n",
        )?;
        sets.insert("regs".to_string(), Rc::new(OperandSet::from_config("regs", &regs, &defaults())?));
        let imm: OperandSetConfig = serde_yaml::from_str(
            "operand_values:\n  imm: {type: numeric, bytecode: {value: 3, size: 2}, argument: {size: 8, word_align: true}}\n",
        )?;
        sets.insert("imm".to_string(), Rc::new(OperandSet::from_config("imm", &imm, &defaults())?));
        Ok(sets)
    }
    fn parser(yaml: &str) -> Result<OperandParser, Error> {
        let cfg: OperandsConfig = serde_yaml::from_str(yaml)?;
        OperandParser::from_config("test", &cfg, &sets()?, &defaults())
    }
    fn operands(list: &[&str]) -> Vec<String> { list.iter().map(|s| s.to_string()).collect() }
    fn find(p: &OperandParser, list: &[&str]) -> Result<Option<MatchedOperandSet>, Error> {
        let zones = MemoryZoneManager::new(16, 0)?;
        p.find_matching_operands(&LineId::synthetic("parser"), &operands(list), &defaults().registers, &zones)
    }

    #[test]
    fn operand_sets_and_disallowed_pairs() -> Result<(), Error> {
        let p = parser("count: 2\noperand_sets:\n  list: [regs, regs]\n  disallowed_pairs: [[reg_a, reg_a]]\n")?;
        let m = find(&p, &["a", "b"])?.ok_or_else(|| general_err!("no match"))?;
        let ids: Vec<&str> = m.operands.iter().map(|o| o.operand_id.as_str()).collect();
        assert_eq!(ids, vec!["reg_a", "reg_b"]);
        assert!(find(&p, &["a", "a"])?.is_none());
        assert!(find(&p, &["a"])?.is_none());
        assert!(parser("count: 1\noperand_sets:\n  list: [regs, regs]\n").is_err());
        assert!(parser("operand_sets:\n  list: [regs]\n").is_err());
        assert!(parser("count: 1\noperand_sets:\n  list: [nope]\n").is_err());
        Ok(())
    }
    #[test]
    fn specific_operands_come_first() -> Result<(), Error> {
        let p = parser(
            "count: 2\noperand_sets:\n  list: [regs, imm]\nspecific_operands:\n  \
             short:\n    list:\n      tgt: {type: register, register: a, bytecode: {value: 0, size: 2}}\n      \
             zero: {type: numeric, bytecode: {value: 2, size: 2}, argument: {size: 8}}\n",
        )?;
        let m = find(&p, &["a", "7"])?.ok_or_else(|| general_err!("no match"))?;
        assert_eq!(m.operands[0].operand_id, "tgt");
        let m = find(&p, &["b", "7"])?.ok_or_else(|| general_err!("no match"))?;
        assert_eq!(m.operands[1].operand_id, "imm");
        Ok(())
    }
    #[test]
    fn empty_operands_fill_missing_positions() -> Result<(), Error> {
        let p = parser(
            "count: 2\nspecific_operands:\n  implied:\n    list:\n      \
             acc: {type: empty, bytecode: {value: 1, size: 2}}\n      \
             src: {type: register, register: b, bytecode: {value: 2, size: 2}}\n",
        )?;
        let m = find(&p, &["b"])?.ok_or_else(|| general_err!("no match"))?;
        assert_eq!(m.operands.len(), 2);
        assert!(find(&p, &["b", "b"])?.is_none());
        Ok(())
    }
    #[test]
    fn bytecode_layout_order() -> Result<(), Error> {
        let p = parser(
            "count: 2\nspecific_operands:\n  pair:\n    reverse_argument_order: true\n    list:\n      \
             first: {type: numeric, bytecode: {value: 1, size: 2, position: prefix}, argument: {size: 8}}\n      \
             second: {type: numeric, bytecode: {value: 2, size: 2}, argument: {size: 8}}\n",
        )?;
        let m = find(&p, &["10", "20"])?.ok_or_else(|| general_err!("no match"))?;
        let line = LineId::synthetic("layout");
        let parts = m.generate_bytecode(
            Some(ByteCodePart::numeric(0xf, 4, &line)),
            Some(ByteCodePart::numeric(0, 4, &line)),
        );
        let shape: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
        assert_eq!(parts.len(), 6);
        assert_eq!(parts[0].kind, PartKind::Numeric(1));
        assert_eq!(parts[1].kind, PartKind::Numeric(0xf));
        assert_eq!(parts[2].kind, PartKind::Numeric(2));
        assert_eq!(parts[3].kind, PartKind::Numeric(0));
        assert_eq!(parts[4].instruction_string().as_deref(), Some("20"), "{:?}", shape);
        assert_eq!(parts[5].instruction_string().as_deref(), Some("10"));
        Ok(())
    }
    #[test]
    fn no_operands() -> Result<(), Error> {
        let p = parser("count: 0\n")?;
        assert!(find(&p, &[])?.is_some());
        assert!(find(&p, &["a"])?.is_none());
        Ok(())
    }
}
