//! Operand kinds and how a textual operand is matched against them.
//!
//! Every kind implements the same contract: given the operand text, either decline (`Ok(None)`)
//! or produce the bytecode and argument parts the operand contributes. Errors are reserved for
//! operand text that structurally matches but is invalid, such as an offset on a register that
//! has none configured.
use super::schema::{ArgumentConfig, OperandConfig, OperandSetConfig};
use crate::bytecode::{ByteCodePart, Endian, PartKind};
use crate::error::Error;
use crate::memzone::{MemoryZoneManager, GLOBAL_ZONE_NAME};
use crate::parse::Expression;
use crate::pathid::LineId;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Settings operands inherit from the `general` section.
#[derive(Debug, Clone)]
pub struct EncodingDefaults {
    pub multi_word_endian: Endian,
    pub intra_word_endian: Endian,
    pub registers: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytecodePosition {
    Prefix,
    Suffix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decorator {
    Plus,
    PlusPlus,
    Minus,
    MinusMinus,
    Exclamation,
    At,
}

impl Decorator {
    fn from_name(name: &str) -> Option<Decorator> {
        match name {
            "plus" => Some(Decorator::Plus),
            "plus_plus" => Some(Decorator::PlusPlus),
            "minus" => Some(Decorator::Minus),
            "minus_minus" => Some(Decorator::MinusMinus),
            "exclamation" => Some(Decorator::Exclamation),
            "at" => Some(Decorator::At),
            _ => None,
        }
    }
    fn text(&self) -> &'static str {
        match self {
            Decorator::Plus => "+",
            Decorator::PlusPlus => "++",
            Decorator::Minus => "-",
            Decorator::MinusMinus => "--",
            Decorator::Exclamation => "!",
            Decorator::At => "@",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoratorSpec {
    pub decorator: Decorator,
    pub is_prefix: bool,
}

impl DecoratorSpec {
    /// Remove the decorator from `text`. None if it isn't there, or if what remains still starts
    /// (or ends) with decorator characters, so `+` never matches `++a`.
    fn strip<'a>(&self, text: &'a str) -> Option<&'a str> {
        let deco_char = |c: char| matches!(c, '+' | '-' | '!' | '@');
        let d = self.decorator.text();
        if self.is_prefix {
            let rest = text.strip_prefix(d)?;
            if rest.starts_with(deco_char) {
                return None;
            }
            Some(rest)
        } else {
            let rest = text.strip_suffix(d)?;
            if rest.ends_with(deco_char) {
                return None;
            }
            Some(rest)
        }
    }
}

/// Width and byte order of an argument or offset field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub size: u32,
    pub word_align: bool,
    pub multi_word_endian: Endian,
    pub intra_word_endian: Endian,
}

impl FieldSpec {
    fn from_config(cfg: &ArgumentConfig, defaults: &EncodingDefaults, what: &str) -> Result<FieldSpec, Error> {
        let size = cfg
            .size
            .ok_or_else(|| config_err!("{} does not have a configured size", what))?;
        Ok(FieldSpec {
            size,
            word_align: cfg.word_align.or(cfg.byte_align).unwrap_or(false),
            multi_word_endian: cfg.multi_word_endian.or(cfg.endian).unwrap_or(defaults.multi_word_endian),
            intra_word_endian: cfg.intra_word_endian.unwrap_or(defaults.intra_word_endian),
        })
    }
    fn part(&self, kind: PartKind, line_id: &LineId) -> ByteCodePart {
        ByteCodePart::new(
            kind,
            self.size,
            self.word_align,
            self.multi_word_endian,
            self.intra_word_endian,
            line_id,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandKind {
    /// matches no text; contributes only its bytecode
    Empty,
    Numeric {
        valid_address: bool,
    },
    /// `[expr]`
    IndirectNumeric {
        valid_address: bool,
    },
    /// `[[expr]]`
    DeferredNumeric {
        valid_address: bool,
    },
    Register,
    /// `[reg]` or `[reg +/- offset]`
    IndirectRegister {
        offset: Option<FieldSpec>,
    },
    /// `reg + index`, or `[reg + index]` when indirect
    IndexedRegister {
        index_operands: Vec<Operand>,
        indirect: bool,
    },
    /// a fixed set of keywords
    Enumeration {
        bytecode_dict: BTreeMap<String, i128>,
        argument_dict: BTreeMap<String, i128>,
    },
    /// a numeric expression whose value selects from a table
    NumericEnumeration {
        bytecode_dict: Option<BTreeMap<i128, i128>>,
        argument_dict: Option<BTreeMap<i128, i128>>,
    },
    /// a numeric expression emitted as bytecode bits rather than an argument
    NumericBytecode {
        max: Option<i128>,
        min: Option<i128>,
    },
    Address {
        memory_zone: String,
        slice_lsb: bool,
        match_address_msb: bool,
    },
    RelativeAddress {
        use_curly_braces: bool,
        min: Option<i128>,
        max: Option<i128>,
        offset_from_instruction_end: bool,
    },
}

impl OperandKind {
    /// Matching precedence inside an operand set, lowest first. More specific shapes
    /// are tried before the catch-all numeric forms.
    pub fn precedence(&self) -> u8 {
        match self {
            OperandKind::Empty => 1,
            OperandKind::IndirectRegister { .. } => 2,
            OperandKind::IndexedRegister { indirect: true, .. } => 3,
            OperandKind::IndirectNumeric { .. } => 4,
            OperandKind::DeferredNumeric { .. } => 5,
            OperandKind::IndexedRegister { indirect: false, .. } => 6,
            OperandKind::Enumeration { .. } | OperandKind::NumericEnumeration { .. } => 7,
            OperandKind::Register => 8,
            OperandKind::Numeric { .. } => 9,
            OperandKind::Address { .. } => 10,
            OperandKind::RelativeAddress { .. } => 11,
            OperandKind::NumericBytecode { .. } => 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    pub id: String,
    pub kind: OperandKind,
    pub bytecode_value: Option<i128>,
    pub bytecode_size: u32,
    pub position: BytecodePosition,
    pub argument: Option<FieldSpec>,
    pub register: Option<String>,
    pub decorator: Option<DecoratorSpec>,
    multi_word_endian: Endian,
    intra_word_endian: Endian,
}

/// The result of a successful match.
#[derive(Debug, Clone)]
pub struct ParsedOperand {
    pub operand_id: String,
    pub position: BytecodePosition,
    pub bytecode: Option<ByteCodePart>,
    pub argument: Option<ByteCodePart>,
    pub register: Option<String>,
    pub text: String,
}

impl ParsedOperand {
    pub fn argument_string(&self) -> Option<String> { self.argument.as_ref().and_then(|a| a.instruction_string()) }
}

fn int_dict(dict: &super::schema::OrderedMap<i64>, id: &str) -> Result<BTreeMap<i128, i128>, Error> {
    dict.iter()
        .map(|(k, v)| {
            crate::parse::parse_numeric_literal(k)
                .map(|key| (key, *v as i128))
                .ok_or_else(|| config_err!("operand \"{}\" has non-numeric enumeration key \"{}\"", id, k))
        })
        .collect()
}

impl Operand {
    pub fn from_config(id: &str, cfg: &OperandConfig, defaults: &EncodingDefaults) -> Result<Operand, Error> {
        let what = format!("operand \"{}\"", id);
        let bytecode_value = cfg.bytecode.as_ref().and_then(|b| b.value).map(i128::from);
        let bytecode_size = cfg.bytecode.as_ref().and_then(|b| b.size).unwrap_or(0);
        if bytecode_value.is_some() && cfg.bytecode.as_ref().and_then(|b| b.size).is_none() {
            return Err(config_err!("{} has a bytecode value but no bytecode size", what));
        }
        let position = match cfg.bytecode.as_ref().and_then(|b| b.position.as_deref()) {
            None | Some("suffix") => BytecodePosition::Suffix,
            Some("prefix") => BytecodePosition::Prefix,
            Some(other) => return Err(config_err!("{} has unknown bytecode position \"{}\"", what, other)),
        };
        let argument = match cfg.argument.as_ref() {
            Some(a) if a.size.is_some() => Some(FieldSpec::from_config(a, defaults, &format!("argument of {}", what))?),
            _ => None,
        };
        let require_argument = || argument.ok_or_else(|| config_err!("{} does not have an argument configuration", what));
        let register = match cfg.register.as_ref() {
            Some(r) => {
                if !defaults.registers.contains(r) {
                    return Err(config_err!(
                        "{} uses register \"{}\" which is not a declared register",
                        what,
                        r
                    ));
                }
                Some(r.clone())
            }
            None => None,
        };
        let require_register = || {
            register
                .clone()
                .ok_or_else(|| config_err!("{} is register based but no register is configured", what))
        };
        let decorator = match cfg.decorator.as_ref() {
            Some(d) => {
                let name = d
                    .kind
                    .as_deref()
                    .ok_or_else(|| config_err!("{} has a decorator without a type", what))?;
                let decorator =
                    Decorator::from_name(name).ok_or_else(|| config_err!("{} has unknown decorator \"{}\"", what, name))?;
                Some(DecoratorSpec {
                    decorator,
                    is_prefix: d.is_prefix,
                })
            }
            None => None,
        };
        let valid_address = cfg.argument.as_ref().map_or(false, |a| a.valid_address);
        let kind = match cfg.kind.as_str() {
            "empty" => OperandKind::Empty,
            "numeric" => {
                require_argument()?;
                OperandKind::Numeric { valid_address }
            }
            "indirect_numeric" => {
                require_argument()?;
                OperandKind::IndirectNumeric { valid_address }
            }
            "deferred_numeric" => {
                require_argument()?;
                OperandKind::DeferredNumeric { valid_address }
            }
            "register" => {
                require_register()?;
                OperandKind::Register
            }
            "indirect_register" => {
                require_register()?;
                let offset = match cfg.offset.as_ref() {
                    Some(o) => Some(FieldSpec::from_config(o, defaults, &format!("offset of {}", what))?),
                    None => None,
                };
                OperandKind::IndirectRegister { offset }
            }
            "indexed_register" | "indirect_indexed_register" => {
                require_register()?;
                let index_cfg = cfg
                    .index_operands
                    .as_ref()
                    .filter(|m| !m.is_empty())
                    .ok_or_else(|| config_err!("{} has no index operands configured", what))?;
                let mut index_operands = Vec::new();
                for (op_id, op_cfg) in index_cfg.iter() {
                    let op = Operand::from_config(op_id, op_cfg, defaults)?;
                    if op.kind == OperandKind::Empty {
                        return Err(config_err!("{} is configured with an empty index \"{}\"", what, op_id));
                    }
                    index_operands.push(op);
                }
                let size = index_operands[0].bytecode_size;
                if index_operands.iter().any(|op| op.bytecode_size != size) {
                    return Err(config_err!(
                        "not all index operands are configured with the same bytecode size for {}",
                        what
                    ));
                }
                index_operands.sort_by_key(|op| op.kind.precedence());
                OperandKind::IndexedRegister {
                    index_operands,
                    indirect: cfg.kind == "indirect_indexed_register",
                }
            }
            "enumeration" => {
                let to_map = |dict: Option<&super::schema::OrderedMap<i64>>| -> BTreeMap<String, i128> {
                    dict.map(|d| d.iter().map(|(k, v)| (k.clone(), *v as i128)).collect())
                        .unwrap_or_default()
                };
                let bytecode_dict = to_map(cfg.bytecode.as_ref().and_then(|b| b.value_dict.as_ref()));
                let argument_dict = to_map(cfg.argument.as_ref().and_then(|a| a.value_dict.as_ref()));
                if !argument_dict.is_empty() {
                    require_argument()?;
                }
                if let Some(key) = bytecode_dict
                    .keys()
                    .chain(argument_dict.keys())
                    .find(|k| defaults.registers.contains(*k))
                {
                    return Err(config_err!("{} uses the register \"{}\" as an enumeration key", what, key));
                }
                OperandKind::Enumeration {
                    bytecode_dict,
                    argument_dict,
                }
            }
            "numeric_enumeration" => {
                let bytecode_dict = match cfg.bytecode.as_ref().and_then(|b| b.value_dict.as_ref()) {
                    Some(d) => Some(int_dict(d, id)?),
                    None => None,
                };
                let argument_dict = match cfg.argument.as_ref().and_then(|a| a.value_dict.as_ref()) {
                    Some(d) => {
                        require_argument()?;
                        Some(int_dict(d, id)?)
                    }
                    None => None,
                };
                OperandKind::NumericEnumeration {
                    bytecode_dict,
                    argument_dict,
                }
            }
            "numeric_bytecode" => {
                let b = cfg
                    .bytecode
                    .as_ref()
                    .ok_or_else(|| config_err!("{} has no bytecode configuration", what))?;
                let (max, min) = (b.max.map(i128::from), b.min.map(i128::from));
                if let (Some(max), Some(min)) = (max, min) {
                    if max < min {
                        return Err(config_err!(
                            "{} has a max value {} smaller than the min value {}",
                            what,
                            max,
                            min
                        ));
                    }
                }
                OperandKind::NumericBytecode { max, min }
            }
            "address" => {
                require_argument()?;
                let a = cfg.argument.as_ref();
                let slice_lsb = a.map_or(false, |a| a.slice_lsb);
                OperandKind::Address {
                    memory_zone: a
                        .and_then(|a| a.memory_zone.clone())
                        .unwrap_or_else(|| GLOBAL_ZONE_NAME.to_string()),
                    slice_lsb,
                    match_address_msb: slice_lsb && a.map_or(false, |a| a.match_address_msb),
                }
            }
            "relative_address" => {
                require_argument()?;
                let a = cfg.argument.as_ref();
                OperandKind::RelativeAddress {
                    use_curly_braces: cfg.use_curly_braces,
                    min: a.and_then(|a| a.min).map(i128::from),
                    max: a.and_then(|a| a.max).map(i128::from),
                    offset_from_instruction_end: cfg.offset_from_instruction_end,
                }
            }
            other => return Err(config_err!("{} was configured with unknown type \"{}\"", what, other)),
        };
        Ok(Operand {
            id: id.to_string(),
            kind,
            bytecode_value,
            bytecode_size,
            position,
            argument,
            register,
            decorator,
            multi_word_endian: defaults.multi_word_endian,
            intra_word_endian: defaults.intra_word_endian,
        })
    }

    /// True for operands that consume no operand text.
    pub fn is_null(&self) -> bool { self.kind == OperandKind::Empty }

    fn numeric_part(&self, value: i128, size: u32, line_id: &LineId) -> ByteCodePart {
        ByteCodePart::new(
            PartKind::Numeric(value),
            size,
            false,
            self.multi_word_endian,
            self.intra_word_endian,
            line_id,
        )
    }
    fn bytecode_part(&self, line_id: &LineId) -> Option<ByteCodePart> {
        self.bytecode_value.map(|v| self.numeric_part(v, self.bytecode_size, line_id))
    }
    fn parsed(&self, text: &str, bytecode: Option<ByteCodePart>, argument: Option<ByteCodePart>) -> ParsedOperand {
        ParsedOperand {
            operand_id: self.id.clone(),
            position: self.position,
            bytecode,
            argument,
            register: self.register.clone(),
            text: text.to_string(),
        }
    }
    fn matches_register(&self, text: &str) -> bool {
        self.register.as_deref().map_or(false, |r| r.eq_ignore_ascii_case(text.trim()))
    }
    /// Strip the configured decorator, or pass the text through untouched when none is configured.
    fn undecorated<'a>(&self, text: &'a str) -> Option<&'a str> {
        match self.decorator.as_ref() {
            Some(d) => d.strip(text),
            None => Some(text),
        }
    }

    /// Try to match `text` against this operand.
    pub fn parse_operand(
        &self, line_id: &LineId, text: &str, registers: &BTreeSet<String>, zones: &MemoryZoneManager,
    ) -> Result<Option<ParsedOperand>, Error> {
        let trimmed = text.trim();
        match &self.kind {
            OperandKind::Empty => Ok(Some(self.parsed(trimmed, self.bytecode_part(line_id), None))),
            OperandKind::Numeric { valid_address } => {
                self.parse_numeric(line_id, trimmed, trimmed, *valid_address, registers, zones)
            }
            OperandKind::IndirectNumeric { valid_address } => match strip_brackets(trimmed) {
                Some(inner) if !inner.contains('[') => {
                    self.parse_numeric(line_id, trimmed, inner, *valid_address, registers, zones)
                }
                _ => Ok(None),
            },
            OperandKind::DeferredNumeric { valid_address } => match strip_brackets(trimmed).and_then(strip_brackets) {
                Some(inner) => self.parse_numeric(line_id, trimmed, inner, *valid_address, registers, zones),
                None => Ok(None),
            },
            OperandKind::Register => match self.undecorated(trimmed) {
                Some(reg) if self.matches_register(reg) => Ok(Some(self.parsed(trimmed, self.bytecode_part(line_id), None))),
                _ => Ok(None),
            },
            OperandKind::IndirectRegister { offset } => self.parse_indirect_register(line_id, trimmed, offset, registers),
            OperandKind::IndexedRegister {
                index_operands,
                indirect,
            } => self.parse_indexed_register(line_id, trimmed, index_operands, *indirect, registers, zones),
            OperandKind::Enumeration {
                bytecode_dict,
                argument_dict,
            } => {
                let bytecode = bytecode_dict
                    .get(trimmed)
                    .map(|v| self.numeric_part(*v, self.bytecode_size, line_id));
                let argument = match (argument_dict.get(trimmed), self.argument.as_ref()) {
                    (Some(v), Some(spec)) => Some(spec.part(PartKind::Numeric(*v), line_id)),
                    _ => None,
                };
                if bytecode.is_none() && argument.is_none() {
                    return Ok(None);
                }
                Ok(Some(self.parsed(trimmed, bytecode, argument)))
            }
            OperandKind::NumericEnumeration {
                bytecode_dict,
                argument_dict,
            } => {
                let expr = match numeric_expression(trimmed, registers) {
                    Some(e) => e,
                    None => return Ok(None),
                };
                let bytecode = bytecode_dict.as_ref().map(|d| {
                    ByteCodePart::new(
                        PartKind::Enumeration {
                            expr: expr.clone(),
                            value_dict: d.clone(),
                        },
                        self.bytecode_size,
                        false,
                        self.multi_word_endian,
                        self.intra_word_endian,
                        line_id,
                    )
                });
                let argument = match (argument_dict.as_ref(), self.argument.as_ref()) {
                    (Some(d), Some(spec)) => Some(spec.part(
                        PartKind::Enumeration {
                            expr,
                            value_dict: d.clone(),
                        },
                        line_id,
                    )),
                    _ => None,
                };
                if bytecode.is_none() && argument.is_none() {
                    return Ok(None);
                }
                Ok(Some(self.parsed(trimmed, bytecode, argument)))
            }
            OperandKind::NumericBytecode { max, min } => match numeric_expression(trimmed, registers) {
                Some(expr) => {
                    let part = ByteCodePart::new(
                        PartKind::ExpressionWithValidation {
                            expr,
                            max: *max,
                            min: *min,
                        },
                        self.bytecode_size,
                        false,
                        self.multi_word_endian,
                        self.intra_word_endian,
                        line_id,
                    );
                    Ok(Some(self.parsed(trimmed, Some(part), None)))
                }
                None => Ok(None),
            },
            OperandKind::Address {
                memory_zone,
                slice_lsb,
                match_address_msb,
            } => {
                let expr = match numeric_expression(trimmed, registers) {
                    Some(e) => e,
                    None => return Ok(None),
                };
                let zone = zones.zone(memory_zone).ok_or_else(|| {
                    line_err!(
                        line_id,
                        crate::error::ErrorKind::Config,
                        "invalid memory zone name \"{}\" for operand \"{}\"",
                        memory_zone,
                        self.id
                    )
                })?;
                let argument = self.argument.as_ref().map(|spec| {
                    spec.part(
                        PartKind::Address {
                            expr,
                            zone,
                            slice_lsb: *slice_lsb,
                            match_address_msb: *match_address_msb,
                        },
                        line_id,
                    )
                });
                Ok(Some(self.parsed(trimmed, self.bytecode_part(line_id), argument)))
            }
            OperandKind::RelativeAddress {
                use_curly_braces,
                min,
                max,
                offset_from_instruction_end,
            } => {
                let inner = if *use_curly_braces {
                    match trimmed.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                        Some(inner) => inner.trim(),
                        None => return Ok(None),
                    }
                } else {
                    trimmed
                };
                let expr = match numeric_expression(inner, registers) {
                    Some(e) => e,
                    None => return Ok(None),
                };
                let argument = self.argument.as_ref().map(|spec| {
                    spec.part(
                        PartKind::RelativeAddress {
                            expr,
                            zone: zones.global_zone(),
                            min: *min,
                            max: *max,
                            offset_from_instruction_end: *offset_from_instruction_end,
                        },
                        line_id,
                    )
                });
                Ok(Some(self.parsed(trimmed, self.bytecode_part(line_id), argument)))
            }
        }
    }

    fn parse_numeric(
        &self, line_id: &LineId, text: &str, expr_text: &str, valid_address: bool, registers: &BTreeSet<String>,
        zones: &MemoryZoneManager,
    ) -> Result<Option<ParsedOperand>, Error> {
        let expr = match numeric_expression(expr_text, registers) {
            Some(e) => e,
            None => return Ok(None),
        };
        let kind = if valid_address {
            PartKind::ExpressionInMemoryZone {
                expr,
                zone: zones.global_zone(),
            }
        } else {
            PartKind::Expression(expr)
        };
        let argument = self.argument.as_ref().map(|spec| spec.part(kind, line_id));
        Ok(Some(self.parsed(text, self.bytecode_part(line_id), argument)))
    }

    fn parse_indirect_register(
        &self, line_id: &LineId, text: &str, offset: &Option<FieldSpec>, registers: &BTreeSet<String>,
    ) -> Result<Option<ParsedOperand>, Error> {
        let inner = match self.undecorated(text).and_then(strip_brackets) {
            Some(inner) => inner,
            None => return Ok(None),
        };
        let (reg, rest) = match self.split_register(inner) {
            Some(split) => split,
            None => return Ok(None),
        };
        let rest = rest.trim();
        let offset_expr = if rest.is_empty() {
            None
        } else {
            let (sign, expr_text) = rest.split_at(1);
            if (sign != "+" && sign != "-") || expr_text.trim().is_empty() {
                return Ok(None);
            }
            let expr_text = if sign == "-" {
                format!("0 - ({})", expr_text.trim())
            } else {
                expr_text.trim().to_string()
            };
            match numeric_expression(&expr_text, registers) {
                Some(e) => Some(e),
                None => return Ok(None),
            }
        };
        let argument = match (offset, offset_expr) {
            (Some(spec), Some(expr)) => Some(spec.part(PartKind::Expression(expr), line_id)),
            (Some(spec), None) => Some(spec.part(PartKind::Numeric(0), line_id)),
            (None, Some(_)) => {
                return Err(syntax_err!(
                    line_id,
                    "an offset was given for indirect register \"{}\" which is not configured to take one",
                    reg
                ))
            }
            (None, None) => None,
        };
        Ok(Some(self.parsed(text, self.bytecode_part(line_id), argument)))
    }

    fn parse_indexed_register(
        &self, line_id: &LineId, text: &str, index_operands: &[Operand], indirect: bool, registers: &BTreeSet<String>,
        zones: &MemoryZoneManager,
    ) -> Result<Option<ParsedOperand>, Error> {
        let body = if indirect {
            match self.undecorated(text).and_then(strip_brackets) {
                Some(inner) => inner,
                None => return Ok(None),
            }
        } else {
            text
        };
        let (_, rest) = match self.split_register(body) {
            Some(split) => split,
            None => return Ok(None),
        };
        // only addition is supported when indexing
        let index_text = match rest.trim_start().strip_prefix('+') {
            Some(t) if !t.trim().is_empty() => t.trim(),
            _ => return Ok(None),
        };
        let base = self
            .bytecode_part(line_id)
            .unwrap_or_else(|| self.numeric_part(0, 0, line_id));
        for index_op in index_operands {
            if let Some(index) = index_op.parse_operand(line_id, index_text, registers, zones)? {
                let bytecode = match index.bytecode {
                    Some(index_bytecode) => {
                        let align = base.word_align;
                        ByteCodePart::composite(vec![base, index_bytecode], align, line_id)
                    }
                    None => base,
                };
                return Ok(Some(self.parsed(text, Some(bytecode), index.argument)));
            }
        }
        Ok(None)
    }

    /// Split `text` into the configured register and what follows it. The register must
    /// not run straight into another word character.
    fn split_register<'a>(&self, text: &'a str) -> Option<(&'a str, &'a str)> {
        let reg = self.register.as_deref()?;
        let text = text.trim_start();
        if text.len() < reg.len() || !text.is_char_boundary(reg.len()) {
            return None;
        }
        let (head, rest) = text.split_at(reg.len());
        if !head.eq_ignore_ascii_case(reg) || rest.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }
        Some((head, rest))
    }
}

/// Parse `text` as a numeric expression that doesn't reference a register. Bracketed or
/// braced text never is one.
fn numeric_expression(text: &str, registers: &BTreeSet<String>) -> Option<Expression> {
    if text.is_empty() || text.contains(['[', ']', '{', '}']) {
        return None;
    }
    let expr = Expression::parse(text).ok()?;
    if expr.contains_register_labels(registers.iter()) {
        return None;
    }
    Some(expr)
}

/// `[ inner ]` -> `inner`, trimmed.
fn strip_brackets(text: &str) -> Option<&str> {
    text.trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .map(str::trim)
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.register.as_ref() {
            Some(r) => write!(f, "Operand<{},register={}>", self.id, r),
            None => write!(f, "Operand<{}>", self.id),
        }
    }
}

/// A named, reusable collection of operands, kept in matching precedence order.
#[derive(Debug, Clone)]
pub struct OperandSet {
    pub name: String,
    operands: Vec<Operand>,
}

impl OperandSet {
    pub fn from_config(name: &str, cfg: &OperandSetConfig, defaults: &EncodingDefaults) -> Result<OperandSet, Error> {
        let mut operands = Vec::new();
        for (id, op_cfg) in cfg.operand_values.iter() {
            let op = Operand::from_config(id, op_cfg, defaults)?;
            if op.is_null() {
                return Err(config_err!(
                    "operand set \"{}\" contains the empty operand \"{}\"; empty operands are only allowed as specific operands",
                    name,
                    id
                ));
            }
            operands.push(op);
        }
        operands.sort_by_key(|op| op.kind.precedence());
        Ok(OperandSet {
            name: name.to_string(),
            operands,
        })
    }
    /// First operand of the set that accepts the text wins.
    pub fn parse_operand(
        &self, line_id: &LineId, text: &str, registers: &BTreeSet<String>, zones: &MemoryZoneManager,
    ) -> Result<Option<ParsedOperand>, Error> {
        for op in &self.operands {
            if let Some(parsed) = op.parse_operand(line_id, text, registers, zones)? {
                return Ok(Some(parsed));
            }
        }
        Ok(None)
    }
    pub fn operands(&self) -> &[Operand] { &self.operands }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::PartContext;
    use crate::parse::NoLabels;

    fn defaults() -> EncodingDefaults {
        EncodingDefaults {
            multi_word_endian: Endian::Big,
            intra_word_endian: Endian::Big,
            registers: ["a", "hl", "ix", "sp"].iter().map(|s| s.to_string()).collect(),
        }
    }
    fn operand(yaml: &str) -> Result<Operand, Error> {
        let cfg: OperandConfig = serde_yaml::from_str(yaml)?;
        Operand::from_config("test", &cfg, &defaults())
    }
    fn parse(op: &Operand, text: &str) -> Result<Option<ParsedOperand>, Error> {
        let zones = MemoryZoneManager::new(16, 0)?;
        op.parse_operand(&LineId::synthetic("operand"), text, &defaults().registers, &zones)
    }

    #[test]
    fn numeric_rejects_registers_and_brackets() -> Result<(), Error> {
        let op = operand("type: numeric\nbytecode: {value: 1, size: 2}\nargument: {size: 8, word_align: true}\n")?;
        let parsed = parse(&op, " label + 2 ")?.ok_or_else(|| general_err!("no match"))?;
        assert_eq!(parsed.argument_string().as_deref(), Some("label + 2"));
        assert!(parse(&op, "a")?.is_none());
        assert!(parse(&op, "[label]")?.is_none());
        assert!(parse(&op, "3 +")?.is_none());
        Ok(())
    }
    #[test]
    fn decorated_registers() -> Result<(), Error> {
        let post_inc = operand("type: register\nregister: hl\ndecorator: {type: plus_plus}\nbytecode: {value: 3, size: 2}\n")?;
        assert!(parse(&post_inc, "hl++")?.is_some());
        assert!(parse(&post_inc, "HL++")?.is_some());
        assert!(parse(&post_inc, "hl+")?.is_none());
        assert!(parse(&post_inc, "hl+++")?.is_none());
        assert!(parse(&post_inc, "hl")?.is_none());
        let pre_dec = operand("type: register\nregister: sp\ndecorator: {type: minus, is_prefix: true}\n")?;
        assert!(parse(&pre_dec, "-sp")?.is_some());
        assert!(parse(&pre_dec, "--sp")?.is_none());
        let plain = operand("type: register\nregister: a\n")?;
        let parsed = parse(&plain, "a")?.ok_or_else(|| general_err!("no match"))?;
        assert_eq!(parsed.register.as_deref(), Some("a"));
        assert!(parse(&plain, "ab")?.is_none());
        Ok(())
    }
    #[test]
    fn indirect_register_offsets() -> Result<(), Error> {
        let op = operand(
            "type: indirect_register\nregister: ix\nbytecode: {value: 5, size: 3}\noffset: {size: 8, word_align: true}\n",
        )?;
        let zones = MemoryZoneManager::new(16, 0)?;
        let ctx = PartContext {
            labels: &NoLabels,
            zones: &zones,
            address: 0,
            size: 1,
        };
        let value_of = |text: &str| -> Result<i128, Error> {
            let parsed = parse(&op, text)?.ok_or_else(|| general_err!("no match for {}", text))?;
            let arg = parsed.argument.ok_or_else(|| general_err!("no offset"))?;
            arg.get_value(&ctx)
        };
        assert_eq!(value_of("[ix]")?, 0);
        assert_eq!(value_of("[ix + 4]")?, 4);
        assert_eq!(value_of("[ix - 4]")?, -4);
        assert_eq!(value_of("[ix-2+1]")?, -3);
        assert!(parse(&op, "[ixy]")?.is_none());
        let no_offset = operand("type: indirect_register\nregister: hl\nbytecode: {value: 1, size: 3}\n")?;
        assert!(parse(&no_offset, "[hl]")?.is_some());
        assert!(parse(&no_offset, "[hl + 1]").is_err());
        Ok(())
    }
    #[test]
    fn indexed_register_uses_index_operand() -> Result<(), Error> {
        let op = operand(
            "type: indexed_register\nregister: hl\nbytecode: {value: 2, size: 2}\nindex_operands:\n  \
             reg_a: {type: register, register: a, bytecode: {value: 1, size: 2}}\n  \
             imm: {type: numeric, bytecode: {value: 0, size: 2}, argument: {size: 8, word_align: true}}\n",
        )?;
        let by_reg = parse(&op, "hl + a")?.ok_or_else(|| general_err!("no match"))?;
        assert!(by_reg.argument.is_none());
        assert_eq!(by_reg.bytecode.map(|b| b.value_size), Some(4));
        let by_imm = parse(&op, "hl+12")?.ok_or_else(|| general_err!("no match"))?;
        assert_eq!(by_imm.argument_string().as_deref(), Some("12"));
        assert!(parse(&op, "hl - 12")?.is_none());
        Ok(())
    }
    #[test]
    fn enumerations() -> Result<(), Error> {
        let op = operand(
            "type: enumeration\nbytecode: {size: 2, value_dict: {nz: 0, z: 1, nc: 2, c: 3}}\n",
        )?;
        let parsed = parse(&op, "nc")?.ok_or_else(|| general_err!("no match"))?;
        assert_eq!(parsed.bytecode.map(|b| b.kind), Some(PartKind::Numeric(2)));
        assert!(parse(&op, "x")?.is_none());
        assert!(operand("type: enumeration\nbytecode: {size: 2, value_dict: {a: 0}}\n").is_err());

        let num = operand("type: numeric_enumeration\nbytecode: {size: 2, value_dict: {1: 0, 2: 1, 4: 2, 8: 3}}\n")?;
        let parsed = parse(&num, "2*2")?.ok_or_else(|| general_err!("no match"))?;
        assert!(matches!(parsed.bytecode.map(|b| b.kind), Some(PartKind::Enumeration { .. })));
        Ok(())
    }
    #[test]
    fn sets_sort_by_precedence() -> Result<(), Error> {
        let cfg: OperandSetConfig = serde_yaml::from_str(
            "operand_values:\n  imm: {type: numeric, argument: {size: 8}}\n  \
             ind: {type: indirect_register, register: hl, bytecode: {value: 1, size: 1}}\n  \
             reg: {type: register, register: a, bytecode: {value: 0, size: 1}}\n",
        )?;
        let set = OperandSet::from_config("s", &cfg, &defaults())?;
        let ids: Vec<&str> = set.operands().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["ind", "reg", "imm"]);
        let zones = MemoryZoneManager::new(16, 0)?;
        let line = LineId::synthetic("set");
        let matched = set.parse_operand(&line, "a", &defaults().registers, &zones)?;
        assert_eq!(matched.map(|p| p.operand_id), Some("reg".to_string()));
        let empty: OperandSetConfig = serde_yaml::from_str("operand_values:\n  e: {type: empty}\n")?;
        assert!(OperandSet::from_config("e", &empty, &defaults()).is_err());
        Ok(())
    }
}
