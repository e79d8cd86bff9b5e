//! The serde shape of an ISA configuration document. These structs mirror the JSON/YAML
//! layout one to one; [super::AsmModel] turns them into the validated model.
use crate::bytecode::Endian;
use serde::de::{self, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::marker::PhantomData;

/// A string keyed map that keeps document order. Operand matching precedence and
/// instruction variant order both depend on the order entries were written in.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(pub Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self { OrderedMap(Vec::new()) }
}
impl<V> OrderedMap<V> {
    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> { self.0.iter().map(|(k, v)| (k, v)) }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn get(&self, key: &str) -> Option<&V> { self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v) }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;
    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "a map") }
    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::new();
        while let Some((key, value)) = access.next_entry::<ConfigKey, V>()? {
            entries.push((key.0, value));
        }
        Ok(OrderedMap(entries))
    }
    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> { Ok(OrderedMap::default()) }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(OrderedMapVisitor(PhantomData))
    }
}

/// A map key or scalar that may be written as a string or a number. JSON keys are always
/// strings while YAML keys of enumeration tables are often integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigKey(pub String);

struct ConfigKeyVisitor;
impl<'de> Visitor<'de> for ConfigKeyVisitor {
    type Value = ConfigKey;
    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "a string or number") }
    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> { Ok(ConfigKey(v.to_string())) }
    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> { Ok(ConfigKey(v)) }
    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> { Ok(ConfigKey(v.to_string())) }
    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> { Ok(ConfigKey(v.to_string())) }
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> { Ok(ConfigKey(v.to_string())) }
    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> { Ok(ConfigKey(v.to_string())) }
}
impl<'de> Deserialize<'de> for ConfigKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ConfigKeyVisitor)
    }
}

fn default_word_size() -> u32 { 8 }
fn default_page_size() -> i64 { 1 }

#[derive(Debug, Deserialize)]
pub struct IsaConfig {
    #[serde(default)]
    pub description: Option<String>,
    pub general: Option<GeneralConfig>,
    #[serde(default)]
    pub predefined: Option<PredefinedConfig>,
    #[serde(default)]
    pub operand_sets: OrderedMap<OperandSetConfig>,
    pub instructions: Option<OrderedMap<InstructionConfig>>,
    #[serde(default)]
    pub macros: OrderedMap<MacroConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub address_size: u32,
    #[serde(default = "default_word_size", alias = "byte_size")]
    pub word_size: u32,
    pub word_segment_size: Option<u32>,
    pub multi_word_endianness: Option<Endian>,
    /// legacy spelling of `multi_word_endianness`
    pub endian: Option<Endian>,
    #[serde(default)]
    pub intra_word_endianness: Endian,
    #[serde(default)]
    pub registers: Option<Vec<String>>,
    #[serde(default)]
    pub origin: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    #[serde(default)]
    pub cstr_terminator: i64,
    #[serde(default)]
    pub string_byte_packing: bool,
    #[serde(default)]
    pub string_byte_packing_fill: i64,
    pub min_version: Option<ConfigKey>,
    #[serde(default)]
    pub allow_embedded_strings: bool,
    pub identifier: Option<IdentifierConfig>,
}

#[derive(Debug, Deserialize)]
pub struct IdentifierConfig {
    pub name: Option<String>,
    pub version: Option<ConfigKey>,
    pub extension: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PredefinedConfig {
    #[serde(default)]
    pub constants: Vec<ConstantConfig>,
    #[serde(default)]
    pub data: Vec<DataBlockConfig>,
    #[serde(default)]
    pub memory_zones: Vec<MemoryZoneConfig>,
    #[serde(default)]
    pub symbols: Vec<SymbolConfig>,
    /// replaced by `data`; only present to report it
    pub memory: Option<IgnoredAny>,
}

#[derive(Debug, Deserialize)]
pub struct ConstantConfig {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Deserialize)]
pub struct DataBlockConfig {
    pub name: String,
    pub address: i64,
    pub value: i64,
    /// number of words
    pub size: i64,
}

#[derive(Debug, Deserialize)]
pub struct MemoryZoneConfig {
    pub name: String,
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Deserialize)]
pub struct SymbolConfig {
    pub name: String,
    pub value: Option<ConfigKey>,
}

#[derive(Debug, Deserialize)]
pub struct OperandSetConfig {
    pub operand_values: OrderedMap<OperandConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperandConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub bytecode: Option<BytecodeConfig>,
    pub argument: Option<ArgumentConfig>,
    pub register: Option<String>,
    pub decorator: Option<DecoratorConfig>,
    pub offset: Option<ArgumentConfig>,
    pub index_operands: Option<OrderedMap<OperandConfig>>,
    #[serde(default)]
    pub use_curly_braces: bool,
    #[serde(default)]
    pub offset_from_instruction_end: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BytecodeConfig {
    pub value: Option<i64>,
    pub size: Option<u32>,
    pub position: Option<String>,
    pub value_dict: Option<OrderedMap<i64>>,
    pub max: Option<i64>,
    pub min: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArgumentConfig {
    pub size: Option<u32>,
    pub word_align: Option<bool>,
    /// legacy spelling of `word_align`
    pub byte_align: Option<bool>,
    pub multi_word_endian: Option<Endian>,
    /// legacy spelling of `multi_word_endian`
    pub endian: Option<Endian>,
    pub intra_word_endian: Option<Endian>,
    pub value_dict: Option<OrderedMap<i64>>,
    #[serde(default)]
    pub valid_address: bool,
    pub memory_zone: Option<String>,
    #[serde(default)]
    pub slice_lsb: bool,
    #[serde(default)]
    pub match_address_msb: bool,
    pub max: Option<i64>,
    pub min: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecoratorConfig {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub is_prefix: bool,
}

#[derive(Debug, Deserialize)]
pub struct InstructionConfig {
    pub bytecode: Option<InstructionBytecodeConfig>,
    pub operands: Option<OperandsConfig>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub variants: Vec<VariantConfig>,
}

#[derive(Debug, Deserialize)]
pub struct VariantConfig {
    pub bytecode: Option<InstructionBytecodeConfig>,
    pub operands: Option<OperandsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstructionBytecodeConfig {
    pub value: Option<i64>,
    pub size: Option<u32>,
    pub suffix: Option<SuffixConfig>,
    pub multi_word_endian: Option<Endian>,
    pub intra_word_endian: Option<Endian>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuffixConfig {
    pub value: i64,
    pub size: u32,
}

#[derive(Debug, Deserialize)]
pub struct OperandsConfig {
    pub count: Option<usize>,
    pub operand_sets: Option<OperandSetsRefConfig>,
    pub specific_operands: Option<OrderedMap<SpecificOperandConfig>>,
}

#[derive(Debug, Deserialize)]
pub struct OperandSetsRefConfig {
    pub list: Option<Vec<String>>,
    #[serde(default)]
    pub disallowed_pairs: Vec<Vec<String>>,
    #[serde(default)]
    pub reverse_argument_order: bool,
    #[serde(default)]
    pub reverse_bytecode_order: bool,
}

#[derive(Debug, Deserialize)]
pub struct SpecificOperandConfig {
    #[serde(default)]
    pub list: OrderedMap<OperandConfig>,
    #[serde(default)]
    pub reverse_argument_order: bool,
    #[serde(default)]
    pub reverse_bytecode_order: bool,
}

/// Macros are written either as a bare list of variants or as `{variants: [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MacroConfig {
    Variants(Vec<MacroVariantConfig>),
    Documented { variants: Vec<MacroVariantConfig> },
}
impl MacroConfig {
    pub fn variants(&self) -> &[MacroVariantConfig] {
        match self {
            MacroConfig::Variants(v) | MacroConfig::Documented { variants: v } => v,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MacroVariantConfig {
    pub operands: Option<OperandsConfig>,
    #[serde(default)]
    pub instructions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    #[test]
    fn ordered_maps_keep_document_order() -> Result<(), Error> {
        let yaml = "zeta: 1\nalpha: 2\n7: 3\n";
        let map: OrderedMap<i64> = serde_yaml::from_str(yaml)?;
        let keys: Vec<&String> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "7"]);
        assert_eq!(map.get("7"), Some(&3));
        let json: OrderedMap<i64> = serde_json::from_str(r#"{"b": 1, "a": 2}"#)?;
        assert_eq!(json.0[0].0, "b");
        Ok(())
    }
    #[test]
    fn macros_accept_both_forms() -> Result<(), Error> {
        let bare: MacroConfig = serde_yaml::from_str("- instructions: [nop]\n")?;
        assert_eq!(bare.variants().len(), 1);
        let doc: MacroConfig = serde_yaml::from_str("variants:\n  - instructions: [nop, nop]\n")?;
        assert_eq!(doc.variants()[0].instructions.len(), 2);
        Ok(())
    }
}
