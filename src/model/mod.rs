//! The instruction set model: a validated, ready-to-match view of an ISA configuration
//! document.
pub mod generator;
pub mod instruction;
pub mod operand;
pub mod operand_parser;
pub mod schema;

use crate::bytecode::{Endian, WordLayout};
use crate::error::Error;
use crate::memzone::GLOBAL_ZONE_NAME;
use instruction::{is_keyword, InstructionSet};
use operand::{EncodingDefaults, OperandSet};
use schema::{GeneralConfig, IsaConfig};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::rc::Rc;

/// The version of this assembler, which `general.min_version` is checked against.
pub const ASSEMBLER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A fixed-address block of repeated words declared in the ISA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredefinedData {
    pub name: String,
    pub address: i128,
    pub value: i128,
    /// number of words
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredefinedZone {
    pub name: String,
    pub start: i128,
    pub end: i128,
}

#[derive(Debug)]
pub struct AsmModel {
    pub description: String,
    pub name: String,
    pub version: String,
    pub extension: String,
    pub address_size: u32,
    pub word_size: u32,
    pub segment_size: u32,
    pub multi_word_endian: Endian,
    pub intra_word_endian: Endian,
    pub registers: BTreeSet<String>,
    pub origin: i128,
    pub page_size: i128,
    pub cstr_terminator: i128,
    pub string_byte_packing: bool,
    pub string_byte_packing_fill: u8,
    pub allow_embedded_strings: bool,
    pub constants: Vec<(String, i128)>,
    pub data_blocks: Vec<PredefinedData>,
    pub memory_zones: Vec<PredefinedZone>,
    /// symbol name and optional value
    pub symbols: Vec<(String, Option<String>)>,
    pub instructions: InstructionSet,
}

/// `x.y.z` with missing trailing components read as 0 and any pre-release tag ignored.
pub fn parse_version(text: &str) -> Option<(u64, u64, u64)> {
    let core = text.trim().trim_start_matches(['v', 'V']);
    let core = core.split(['-', '+']).next()?;
    let mut fields = core.split('.');
    let major = fields.next()?.parse().ok()?;
    let minor = match fields.next() {
        Some(f) => f.parse().ok()?,
        None => 0,
    };
    let patch = match fields.next() {
        Some(f) => f.parse().ok()?,
        None => 0,
    };
    if fields.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

impl AsmModel {
    /// Load a configuration file, choosing the format by extension.
    pub fn load(path: &Path) -> Result<AsmModel, Error> {
        let text = fs::read_to_string(path)
            .map_err(|e| config_err!("could not read ISA configuration {}: {}", path.display(), e))?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "isa".to_string());
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => AsmModel::from_json_str(&text, &stem),
            Some("yaml") | Some("yml") => AsmModel::from_yaml_str(&text, &stem),
            _ => Err(config_err!(
                "unknown ISA configuration file type for {}; expected .json, .yaml or .yml",
                path.display()
            )),
        }
    }
    pub fn from_yaml_str(text: &str, default_name: &str) -> Result<AsmModel, Error> {
        let cfg: Option<IsaConfig> = serde_yaml::from_str(text)?;
        let cfg = cfg.ok_or_else(|| config_err!("ISA configuration is empty"))?;
        AsmModel::from_config(cfg, default_name)
    }
    pub fn from_json_str(text: &str, default_name: &str) -> Result<AsmModel, Error> {
        AsmModel::from_config(serde_json::from_str(text)?, default_name)
    }

    pub fn from_config(cfg: IsaConfig, default_name: &str) -> Result<AsmModel, Error> {
        if cfg.predefined.as_ref().map_or(false, |p| p.memory.is_some()) {
            return Err(config_err!(
                "ISA configuration defines a predefined \"memory\" block; memory blocks have been replaced by \"data\" blocks"
            ));
        }
        let general = cfg
            .general
            .as_ref()
            .ok_or_else(|| config_err!("ISA configuration does not contain a \"general\" section"))?;
        check_min_version(general)?;
        let instructions_cfg = cfg
            .instructions
            .as_ref()
            .ok_or_else(|| config_err!("ISA configuration does not contain an \"instructions\" section"))?;
        if general.string_byte_packing && (general.word_size < 16 || general.word_size % 8 != 0) {
            return Err(config_err!(
                "\"string_byte_packing\" is only allowed if word_size is a multiple of 8 and at least 16"
            ));
        }
        if !(0..=255).contains(&general.string_byte_packing_fill) {
            return Err(config_err!("\"string_byte_packing_fill\" must be an integer between 0 and 255"));
        }
        if general.word_size == 0 || general.address_size == 0 || general.address_size > 64 {
            return Err(config_err!(
                "word_size must be positive and address_size must be in 1..=64"
            ));
        }
        let segment_size = general.word_segment_size.unwrap_or(general.word_size);
        if segment_size == 0 || general.word_size % segment_size != 0 {
            return Err(config_err!(
                "word_segment_size {} does not evenly divide word_size {}",
                segment_size,
                general.word_size
            ));
        }
        if general.page_size < 1 {
            return Err(config_err!("page_size must be at least 1"));
        }

        let (name, version, extension) = identify(general, default_name)?;
        let registers: BTreeSet<String> = general.registers.clone().unwrap_or_default().into_iter().collect();
        if let Some(reg) = registers.iter().find(|r| is_keyword(r)) {
            return Err(config_err!("the ISA configuration uses a keyword as a register name: {}", reg));
        }
        let defaults = EncodingDefaults {
            multi_word_endian: general.multi_word_endianness.or(general.endian).unwrap_or_default(),
            intra_word_endian: general.intra_word_endianness,
            registers: registers.clone(),
        };

        let predefined = cfg.predefined.unwrap_or_default();
        let origin = general.origin as i128;
        let memory_zones: Vec<PredefinedZone> = predefined
            .memory_zones
            .iter()
            .map(|z| PredefinedZone {
                name: z.name.clone(),
                start: z.start as i128,
                end: z.end as i128,
            })
            .collect();
        if let Some(global) = memory_zones.iter().find(|z| z.name == GLOBAL_ZONE_NAME) {
            if origin < global.start {
                return Err(config_err!(
                    "the GLOBAL memory zone was redefined to start at {} which is after the default origin {}",
                    global.start,
                    origin
                ));
            }
        }

        let mut operand_sets = BTreeMap::new();
        for (set_name, set_cfg) in cfg.operand_sets.iter() {
            operand_sets.insert(
                set_name.clone(),
                Rc::new(OperandSet::from_config(set_name, set_cfg, &defaults)?),
            );
        }
        let instructions = InstructionSet::from_config(instructions_cfg, &cfg.macros, &operand_sets, &defaults)?;

        let mut data_blocks = Vec::new();
        for block in &predefined.data {
            if block.size < 0 {
                return Err(config_err!("predefined data block \"{}\" has a negative size", block.name));
            }
            data_blocks.push(PredefinedData {
                name: block.name.clone(),
                address: block.address as i128,
                value: block.value as i128,
                size: block.size as usize,
            });
        }

        Ok(AsmModel {
            description: cfg.description.unwrap_or_else(|| "BespokeASM Assembly".to_string()),
            name,
            version,
            extension,
            address_size: general.address_size,
            word_size: general.word_size,
            segment_size,
            multi_word_endian: defaults.multi_word_endian,
            intra_word_endian: defaults.intra_word_endian,
            registers,
            origin,
            page_size: general.page_size as i128,
            cstr_terminator: (general.cstr_terminator & 0xff) as i128,
            string_byte_packing: general.string_byte_packing,
            string_byte_packing_fill: general.string_byte_packing_fill as u8,
            allow_embedded_strings: general.allow_embedded_strings,
            constants: predefined.constants.iter().map(|c| (c.name.clone(), c.value as i128)).collect(),
            data_blocks,
            memory_zones,
            symbols: predefined
                .symbols
                .iter()
                .map(|s| (s.name.clone(), s.value.as_ref().map(|v| v.0.clone())))
                .collect(),
            instructions,
        })
    }

    /// Word geometry used for bit-packed parts and data.
    pub fn word_layout(&self) -> WordLayout {
        WordLayout {
            word_size: self.word_size,
            segment_size: self.segment_size,
            intra_word_endian: self.intra_word_endian,
        }
    }
    pub fn version_triple(&self) -> (u64, u64, u64) { parse_version(&self.version).unwrap_or((0, 0, 1)) }
}

fn check_min_version(general: &GeneralConfig) -> Result<(), Error> {
    let required = general
        .min_version
        .as_ref()
        .ok_or_else(|| config_err!("ISA configuration does not contain the required \"min_version\" field in the general section"))?;
    let wanted = parse_version(&required.0)
        .ok_or_else(|| config_err!("min_version \"{}\" is not a valid version", required.0))?;
    let have = parse_version(ASSEMBLER_VERSION).unwrap_or((0, 0, 0));
    verbose_println!(
        1,
        "The ISA configuration requires BespokeASM version {}. This is version {}.",
        required.0,
        ASSEMBLER_VERSION
    );
    if wanted > have {
        return Err(config_err!(
            "the ISA configuration requires at least BespokeASM version {}",
            required.0
        ));
    }
    Ok(())
}

fn identify(general: &GeneralConfig, default_name: &str) -> Result<(String, String, String), Error> {
    let id = general.identifier.as_ref();
    let name = id.and_then(|i| i.name.clone()).unwrap_or_else(|| default_name.to_string());
    let version = id
        .and_then(|i| i.version.as_ref())
        .map_or_else(|| "0.0.1".to_string(), |v| v.0.trim().to_string());
    if parse_version(&version).is_none() {
        return Err(config_err!("ISA version \"{}\" is not in semantic versioning format", version));
    }
    let extension = id
        .and_then(|i| i.extension.clone())
        .unwrap_or_else(|| "asm".to_string());
    Ok((name.trim().replace(' ', "_"), version, extension))
}

/// The 8-bit test ISA shared by unit tests across the crate.
#[cfg(test)]
pub const TEST_ISA: &str = r#"
description: test ISA
general:
  address_size: 16
  word_size: 8
  multi_word_endianness: little
  registers: [a, i, sp]
  min_version: 0.3.0
  identifier:
    name: test isa
    version: 1.2.3
    extension: tst
predefined:
  constants:
    - {name: io_port, value: 0x80}
operand_sets:
  register:
    operand_values:
      reg_a:
        type: register
        register: a
        bytecode: {value: 0, size: 3}
      reg_i:
        type: register
        register: i
        bytecode: {value: 1, size: 3}
  source:
    operand_values:
      reg_a:
        type: register
        register: a
        bytecode: {value: 0, size: 3}
      immediate:
        type: numeric
        bytecode: {value: 7, size: 3}
        argument: {size: 8, word_align: true}
      indirect:
        type: indirect_numeric
        bytecode: {value: 6, size: 3}
        argument: {size: 16, word_align: true, multi_word_endian: little}
  jump_target:
    operand_values:
      addr:
        type: numeric
        argument: {size: 16, word_align: true, valid_address: true}
instructions:
  nop:
    bytecode: {value: 0, size: 8}
  hlt:
    bytecode: {value: 0xff, size: 8}
    aliases: [halt]
  mov:
    bytecode: {value: 1, size: 2}
    operands:
      count: 2
      operand_sets:
        list: [register, source]
  jmp:
    bytecode: {value: 0xc3, size: 8}
    operands:
      count: 1
      operand_sets:
        list: [jump_target]
  inc:
    bytecode: {value: 0b10, size: 2}
    operands:
      count: 1
      operand_sets:
        list: [register]
      specific_operands:
        plus_imm:
          list:
            target: {type: register, register: a, bytecode: {value: 7, size: 3}}
    variants:
      - bytecode: {value: 0b10111, size: 5}
        operands:
          count: 1
          specific_operands:
            mem:
              list:
                mem: {type: indirect_numeric, bytecode: {value: 0, size: 3}, argument: {size: 16, word_align: true}}
macros:
  clr:
    - operands:
        count: 1
        operand_sets:
          list: [register]
      instructions:
        - "mov @OP(0), 0"
  jmp_twice:
    - operands:
        count: 1
        operand_sets:
          list: [jump_target]
      instructions:
        - "jmp @ARG(0)"
        - "jmp @ARG(0) + 1"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_the_test_isa() -> Result<(), Error> {
        let model = AsmModel::from_yaml_str(TEST_ISA, "fallback")?;
        assert_eq!(model.name, "test_isa");
        assert_eq!(model.version_triple(), (1, 2, 3));
        assert_eq!(model.extension, "tst");
        assert_eq!(model.segment_size, 8);
        assert_eq!(model.multi_word_endian, Endian::Little);
        assert_eq!(model.constants, vec![("io_port".to_string(), 0x80)]);
        assert!(model.instructions.contains("halt"));
        assert!(model.registers.contains("sp"));
        Ok(())
    }
    #[test]
    fn json_and_defaults() -> Result<(), Error> {
        let json = r#"{
            "general": {"address_size": 8, "min_version": "0.1", "endian": "little"},
            "instructions": {"nop": {"bytecode": {"value": 0, "size": 8}}}
        }"#;
        let model = AsmModel::from_json_str(json, "my cpu")?;
        assert_eq!(model.name, "my_cpu");
        assert_eq!(model.version, "0.0.1");
        assert_eq!(model.extension, "asm");
        assert_eq!(model.word_size, 8);
        assert_eq!(model.page_size, 1);
        assert_eq!(model.multi_word_endian, Endian::Little);
        Ok(())
    }
    #[test]
    fn validation_failures() {
        let base = |general: &str| {
            format!(
                "general:\n  address_size: 16\n{}\ninstructions:\n  nop:\n    bytecode: {{value: 0, size: 8}}\n",
                general
            )
        };
        // missing min_version
        assert!(AsmModel::from_yaml_str(&base("  word_size: 8"), "x").is_err());
        // min_version from the future
        assert!(AsmModel::from_yaml_str(&base("  min_version: 99.0.0"), "x").is_err());
        // packing needs wide words
        assert!(AsmModel::from_yaml_str(&base("  min_version: 0.1.0\n  string_byte_packing: true"), "x").is_err());
        assert!(AsmModel::from_yaml_str(&base("  min_version: 0.1.0\n  string_byte_packing_fill: 300"), "x").is_err());
        assert!(AsmModel::from_yaml_str(&base("  min_version: 0.1.0\n  registers: [byte]"), "x").is_err());
        assert!(AsmModel::from_yaml_str(&base("  min_version: 0.1.0\n  word_segment_size: 3"), "x").is_err());
        let deprecated = format!("{}predefined:\n  memory: {{}}\n", base("  min_version: 0.1.0"));
        assert!(AsmModel::from_yaml_str(&deprecated, "x").is_err());
        assert!(AsmModel::from_yaml_str("general:\n  address_size: 16\n  min_version: 0.1.0\n", "x").is_err());
    }
    #[test]
    fn version_parsing() {
        assert_eq!(parse_version("0.4"), Some((0, 4, 0)));
        assert_eq!(parse_version("v1.2.3-beta"), Some((1, 2, 3)));
        assert_eq!(parse_version("1.x"), None);
    }
}
