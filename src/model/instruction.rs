//! Instructions, macros and the mnemonic table that holds both.
use super::operand::{EncodingDefaults, OperandSet};
use super::operand_parser::OperandParser;
use super::schema::{InstructionBytecodeConfig, InstructionConfig, MacroConfig, OperandsConfig, OrderedMap};
use crate::bytecode::{ByteCodePart, Endian, PartKind};
use crate::error::Error;
use crate::pathid::LineId;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// Directive and function names that can't be used as mnemonics or registers.
pub const KEYWORDS: &[&str] = &[
    "org", "memzone", "align", "fill", "zero", "zerountil", "byte", "2byte", "4byte", "8byte", "cstr", "asciiz",
    "include", "require", "create_memzone", "define", "if", "elif", "else", "endif", "ifdef", "ifndef", "LSB",
    "BYTE0", "BYTE1", "BYTE2", "BYTE3", "BYTE4", "BYTE5", "BYTE6", "BYTE7", "BYTE8", "BYTE9",
];

pub fn is_keyword(name: &str) -> bool { KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(name)) }

/// Fixed opcode bits of a variant.
#[derive(Debug, Clone)]
pub struct BaseBytecode {
    pub value: i128,
    pub size: u32,
    pub suffix: Option<(i128, u32)>,
    pub multi_word_endian: Endian,
    pub intra_word_endian: Endian,
}

impl BaseBytecode {
    fn from_config(mnemonic: &str, cfg: Option<&InstructionBytecodeConfig>, defaults: &EncodingDefaults) -> Result<Self, Error> {
        let missing = || config_err!("instruction \"{}\" does not have a byte code configuration", mnemonic);
        let cfg = cfg.ok_or_else(missing)?;
        let (value, size) = match (cfg.value, cfg.size) {
            (Some(value), Some(size)) => (value as i128, size),
            _ => return Err(missing()),
        };
        Ok(BaseBytecode {
            value,
            size,
            suffix: cfg.suffix.as_ref().map(|s| (s.value as i128, s.size)),
            multi_word_endian: cfg.multi_word_endian.unwrap_or(defaults.multi_word_endian),
            intra_word_endian: cfg.intra_word_endian.unwrap_or(defaults.intra_word_endian),
        })
    }
    fn part(&self, value: i128, size: u32, line_id: &LineId) -> ByteCodePart {
        ByteCodePart::new(
            PartKind::Numeric(value),
            size,
            false,
            self.multi_word_endian,
            self.intra_word_endian,
            line_id,
        )
    }
    pub fn base_part(&self, line_id: &LineId) -> ByteCodePart { self.part(self.value, self.size, line_id) }
    pub fn suffix_part(&self, line_id: &LineId) -> Option<ByteCodePart> {
        self.suffix.map(|(value, size)| self.part(value, size, line_id))
    }
}

fn operand_parser(
    mnemonic: &str, cfg: Option<&OperandsConfig>, sets: &BTreeMap<String, Rc<OperandSet>>, defaults: &EncodingDefaults,
) -> Result<Option<OperandParser>, Error> {
    cfg.map(|c| OperandParser::from_config(mnemonic, c, sets, defaults)).transpose()
}

#[derive(Debug)]
pub struct InstructionVariant {
    pub bytecode: BaseBytecode,
    pub operands: Option<OperandParser>,
}

#[derive(Debug)]
pub struct Instruction {
    pub mnemonic: String,
    pub variants: Vec<InstructionVariant>,
}

impl Instruction {
    fn from_config(
        mnemonic: &str, cfg: &InstructionConfig, sets: &BTreeMap<String, Rc<OperandSet>>, defaults: &EncodingDefaults,
    ) -> Result<Self, Error> {
        let mut variants = vec![InstructionVariant {
            bytecode: BaseBytecode::from_config(mnemonic, cfg.bytecode.as_ref(), defaults)?,
            operands: operand_parser(mnemonic, cfg.operands.as_ref(), sets, defaults)?,
        }];
        for v in &cfg.variants {
            variants.push(InstructionVariant {
                bytecode: BaseBytecode::from_config(mnemonic, v.bytecode.as_ref(), defaults)?,
                operands: operand_parser(mnemonic, v.operands.as_ref(), sets, defaults)?,
            });
        }
        Ok(Instruction {
            mnemonic: mnemonic.to_string(),
            variants,
        })
    }
}

#[derive(Debug)]
pub struct MacroVariant {
    pub operands: Option<OperandParser>,
    /// instruction templates with `@ARG(n)`, `@REG(n)` and `@OP(n)` placeholders
    pub instructions: Vec<String>,
}

#[derive(Debug)]
pub struct Macro {
    pub mnemonic: String,
    pub variants: Vec<MacroVariant>,
}

impl Macro {
    fn from_config(
        mnemonic: &str, cfg: &MacroConfig, sets: &BTreeMap<String, Rc<OperandSet>>, defaults: &EncodingDefaults,
    ) -> Result<Self, Error> {
        let mut variants = Vec::new();
        for v in cfg.variants() {
            if v.instructions.is_empty() {
                return Err(config_err!("macro \"{}\" does not have any instructions configured", mnemonic));
            }
            variants.push(MacroVariant {
                operands: operand_parser(mnemonic, v.operands.as_ref(), sets, defaults)?,
                instructions: v.instructions.clone(),
            });
        }
        if variants.is_empty() {
            return Err(config_err!("macro \"{}\" has no variants", mnemonic));
        }
        Ok(Macro {
            mnemonic: mnemonic.to_string(),
            variants,
        })
    }
}

#[derive(Debug)]
pub enum Operation {
    Instruction(Instruction),
    Macro(Macro),
}

impl Operation {
    pub fn mnemonic(&self) -> &str {
        match self {
            Operation::Instruction(i) => &i.mnemonic,
            Operation::Macro(m) => &m.mnemonic,
        }
    }
}

/// Every mnemonic the ISA knows, aliases included, lowercased.
#[derive(Debug, Default)]
pub struct InstructionSet {
    operations: Vec<Operation>,
    mnemonics: BTreeMap<String, usize>,
}

impl InstructionSet {
    pub fn from_config(
        instructions: &OrderedMap<InstructionConfig>, macros: &OrderedMap<MacroConfig>,
        sets: &BTreeMap<String, Rc<OperandSet>>, defaults: &EncodingDefaults,
    ) -> Result<Self, Error> {
        let mut set = InstructionSet::default();
        for (name, cfg) in instructions.iter() {
            let mnemonic = name.to_lowercase();
            let instruction = Instruction::from_config(&mnemonic, cfg, sets, defaults)?;
            let index = set.operations.len();
            set.operations.push(Operation::Instruction(instruction));
            set.register_mnemonic(&mnemonic, index, "instruction")?;
            for alias in &cfg.aliases {
                set.register_mnemonic(&alias.to_lowercase(), index, "alias")?;
            }
        }
        for (name, cfg) in macros.iter() {
            let mnemonic = name.to_lowercase();
            if set.mnemonics.contains_key(&mnemonic) {
                return Err(config_err!(
                    "macro \"{}\" has same mnemonic as a configured instruction",
                    mnemonic
                ));
            }
            let mac = Macro::from_config(&mnemonic, cfg, sets, defaults)?;
            let index = set.operations.len();
            set.operations.push(Operation::Macro(mac));
            set.register_mnemonic(&mnemonic, index, "macro")?;
        }
        Ok(set)
    }
    fn register_mnemonic(&mut self, mnemonic: &str, index: usize, what: &str) -> Result<(), Error> {
        if is_keyword(mnemonic) {
            return Err(config_err!(
                "ISA configuration defined {} \"{}\" which is also an assembler keyword",
                what,
                mnemonic
            ));
        }
        if self.mnemonics.insert(mnemonic.to_string(), index).is_some() {
            return Err(config_err!("duplicate mnemonic or alias found: \"{}\"", mnemonic));
        }
        Ok(())
    }
    pub fn get(&self, mnemonic: &str) -> Option<&Operation> {
        self.mnemonics
            .get(&mnemonic.to_lowercase())
            .and_then(|i| self.operations.get(*i))
    }
    pub fn contains(&self, mnemonic: &str) -> bool { self.mnemonics.contains_key(&mnemonic.to_lowercase()) }
    /// All mnemonics, aliases and macros included.
    pub fn mnemonics(&self) -> impl Iterator<Item = &String> { self.mnemonics.keys() }
    pub fn macro_mnemonics(&self) -> BTreeSet<&str> {
        self.operations
            .iter()
            .filter_map(|op| match op {
                Operation::Macro(m) => Some(m.mnemonic.as_str()),
                Operation::Instruction(_) => None,
            })
            .collect()
    }
}
