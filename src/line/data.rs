//! Data directives: `.byte`, `.2byte`, `.4byte`, `.8byte`, `.cstr`/`.asciiz` and embedded strings.
//!
//! A value wider than a word is split over several words in the multi-word byte order. When
//! the ISA enables string byte packing, string-only `.byte` and `.cstr` lines pack several
//! characters into one word instead of giving each character a word of its own.
use crate::bytecode::{low_mask, Endian, Value, Word};
use crate::error::Error;
use crate::model::generator::split_operands;
use crate::model::AsmModel;
use crate::parse::{unescape, Expression, LabelResolver};
use crate::pathid::LineId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataItem {
    Value(Expression),
    /// a character from a quoted string
    Char(i128),
    /// the string terminator appended by `.cstr`
    Terminator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLine {
    /// directive name used in diagnostics, e.g. `.2byte`
    name: String,
    value_bits: u32,
    items: Vec<DataItem>,
    packed: bool,
    word_size: u32,
    segment_size: u32,
    multi_word_endian: Endian,
    intra_word_endian: Endian,
    terminator: i128,
    packing_fill: u8,
}

/// Bytes per value for a data directive name (without the leading `.`).
pub fn directive_value_bytes(name: &str) -> Option<u32> {
    match name {
        "byte" | "cstr" | "asciiz" => Some(1),
        "2byte" => Some(2),
        "4byte" => Some(4),
        "8byte" => Some(8),
        _ => None,
    }
}

/// The characters of a quoted argument, or None when `text` isn't a string.
/// A single-quoted single character is a character literal, not a string.
fn quoted_chars(text: &str) -> Option<Vec<i128>> {
    let text = text.trim();
    let quote = text.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    if text.len() < 2 || !text.ends_with(quote) {
        return None;
    }
    let body = unescape(&text[1..text.len() - 1]);
    if quote == '\'' && body.chars().count() == 1 {
        return None;
    }
    Some(body.chars().map(|c| c as u32 as i128).collect())
}

impl DataLine {
    fn with_items(name: &str, value_bytes: u32, items: Vec<DataItem>, packed: bool, model: &AsmModel) -> Self {
        DataLine {
            name: name.to_string(),
            value_bits: value_bytes * 8,
            items,
            packed,
            word_size: model.word_size,
            segment_size: model.segment_size,
            multi_word_endian: model.multi_word_endian,
            intra_word_endian: model.intra_word_endian,
            terminator: model.cstr_terminator,
            packing_fill: model.string_byte_packing_fill,
        }
    }

    /// Build a data line from a directive name (without `.`) and its argument text.
    pub fn parse(directive: &str, args: &str, line_id: &LineId, model: &AsmModel) -> Result<DataLine, Error> {
        let value_bytes = directive_value_bytes(directive)
            .ok_or_else(|| syntax_err!(line_id, "unknown data directive \".{}\"", directive))?;
        let terminated = matches!(directive, "cstr" | "asciiz");
        let args = split_operands(args);
        if args.is_empty() || args.iter().any(|a| a.is_empty()) {
            return Err(syntax_err!(line_id, ".{} needs a list of values", directive));
        }
        let mut items = Vec::new();
        let mut only_strings = true;
        for arg in &args {
            match quoted_chars(arg) {
                Some(chars) => {
                    items.extend(chars.into_iter().map(DataItem::Char));
                    if terminated {
                        items.push(DataItem::Terminator);
                    }
                }
                None if terminated => {
                    return Err(syntax_err!(line_id, ".{} only accepts quoted strings, got {}", directive, arg));
                }
                None => {
                    only_strings = false;
                    items.push(DataItem::Value(Expression::parse(arg).map_err(|e| e.at(line_id))?));
                }
            }
        }
        let packed = model.string_byte_packing && only_strings && value_bytes == 1;
        Ok(DataLine::with_items(&format!(".{}", directive), value_bytes, items, packed, model))
    }

    /// A quoted string standing alone on a line. `text` includes the quotes.
    pub fn embedded_string(text: &str, line_id: &LineId, model: &AsmModel) -> Result<DataLine, Error> {
        let chars = quoted_chars(text).ok_or_else(|| syntax_err!(line_id, "{} is not a quoted string", text))?;
        let mut items: Vec<DataItem> = chars.into_iter().map(DataItem::Char).collect();
        items.push(DataItem::Terminator);
        Ok(DataLine::with_items("embedded string", 1, items, model.string_byte_packing, model))
    }

    fn words_per_value(&self) -> usize {
        if self.value_bits <= self.word_size {
            1
        } else {
            ((self.value_bits + self.word_size - 1) / self.word_size) as usize
        }
    }
    fn chars_per_word(&self) -> usize { (self.word_size / 8).max(1) as usize }

    pub fn word_count(&self) -> usize {
        if self.packed {
            (self.items.len() + self.chars_per_word() - 1) / self.chars_per_word()
        } else {
            self.items.len() * self.words_per_value()
        }
    }

    fn word(&self, value: u128) -> Result<Word, Error> {
        Word::new(value, self.word_size, self.segment_size, self.intra_word_endian)
    }

    /// Compute the data words. Truncated values are reported through `warnings`.
    pub fn generate(
        &self, labels: &dyn LabelResolver, line_id: &LineId, warnings: &mut Vec<String>,
    ) -> Result<Vec<Word>, Error> {
        if self.packed {
            return self.generate_packed();
        }
        let mask = low_mask(self.value_bits.min(128)) as i128;
        let mut words = Vec::with_capacity(self.word_count());
        for item in &self.items {
            let masked = match item {
                DataItem::Value(expr) => {
                    let value = expr.eval(labels).map_err(|e| e.at(line_id))?;
                    let masked = value & mask;
                    if masked != value {
                        warnings.push(format!("Data value {} truncated to {} for {}", value, masked, self.name));
                    }
                    masked
                }
                DataItem::Char(c) => c & mask,
                DataItem::Terminator => self.terminator & mask,
            };
            if self.words_per_value() == 1 {
                words.push(self.word(masked as u128 & low_mask(self.word_size)).map_err(|e| e.at(line_id))?);
            } else {
                let value = Value::with_word_count(
                    masked,
                    self.words_per_value(),
                    self.word_size,
                    self.segment_size,
                    self.intra_word_endian,
                    self.multi_word_endian,
                )
                .map_err(|e| e.at(line_id))?;
                words.extend(value.get_words_ordered(None));
            }
        }
        Ok(words)
    }

    /// Several characters per word. Big endian puts the first character in the most
    /// significant byte, little endian in the least significant one.
    fn generate_packed(&self) -> Result<Vec<Word>, Error> {
        let mut bytes: Vec<u128> = self
            .items
            .iter()
            .map(|item| match item {
                DataItem::Char(c) => (*c as u128) & 0xff,
                DataItem::Terminator => (self.terminator as u128) & 0xff,
                DataItem::Value(_) => 0,
            })
            .collect();
        let per_word = self.chars_per_word();
        while bytes.len() % per_word != 0 {
            bytes.push(self.packing_fill as u128);
        }
        bytes
            .chunks(per_word)
            .map(|chunk| {
                let value = match self.multi_word_endian {
                    Endian::Big => chunk.iter().fold(0u128, |acc, b| (acc << 8) | b),
                    Endian::Little => chunk
                        .iter()
                        .enumerate()
                        .fold(0u128, |acc, (i, b)| acc | (b << (8 * i))),
                };
                self.word(value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::word::words_to_bytes;
    use crate::model::TEST_ISA;
    use crate::parse::NoLabels;

    fn bytes(line: &DataLine) -> Result<(Vec<u8>, Vec<String>), Error> {
        let mut warnings = Vec::new();
        let words = line.generate(&NoLabels, &LineId::synthetic("data"), &mut warnings)?;
        assert_eq!(words.len(), line.word_count());
        Ok((words_to_bytes(&words, true), warnings))
    }
    fn wide_model(endian: &str, packing: bool) -> Result<AsmModel, Error> {
        AsmModel::from_yaml_str(
            &format!(
                "general:\n  address_size: 16\n  word_size: 16\n  min_version: 0.1.0\n  \
                 multi_word_endianness: {}\n  string_byte_packing: {}\n  string_byte_packing_fill: 0xee\n\
                 instructions:\n  nop:\n    bytecode: {{value: 0, size: 16}}\n",
                endian, packing
            ),
            "wide",
        )
    }

    #[test]
    fn byte_lists_and_strings() -> Result<(), Error> {
        let model = AsmModel::from_yaml_str(TEST_ISA, "test")?;
        let line = LineId::synthetic("data");
        let data = DataLine::parse("byte", "1, 'A', \"hi\", $ff", &line, &model)?;
        assert_eq!(bytes(&data)?.0, vec![1, 0x41, b'h', b'i', 0xff]);
        let cstr = DataLine::parse("asciiz", "\"ok\\n\"", &line, &model)?;
        assert_eq!(bytes(&cstr)?.0, vec![b'o', b'k', b'\n', 0]);
        assert!(DataLine::parse("cstr", "42", &line, &model).is_err());
        assert!(DataLine::parse("byte", "", &line, &model).is_err());
        Ok(())
    }
    #[test]
    fn multi_byte_values_follow_word_order() -> Result<(), Error> {
        // the test ISA is little endian
        let model = AsmModel::from_yaml_str(TEST_ISA, "test")?;
        let line = LineId::synthetic("data");
        let data = DataLine::parse("2byte", "$1234, 1", &line, &model)?;
        assert_eq!(data.word_count(), 4);
        assert_eq!(bytes(&data)?.0, vec![0x34, 0x12, 0x01, 0x00]);
        let big = wide_model("big", false)?;
        let data = DataLine::parse("4byte", "$12345678", &line, &big)?;
        assert_eq!(bytes(&data)?.0, vec![0x12, 0x34, 0x56, 0x78]);
        Ok(())
    }
    #[test]
    fn truncation_warns() -> Result<(), Error> {
        let model = AsmModel::from_yaml_str(TEST_ISA, "test")?;
        let data = DataLine::parse("byte", "$123", &LineId::synthetic("data"), &model)?;
        let (out, warnings) = bytes(&data)?;
        assert_eq!(out, vec![0x23]);
        assert_eq!(warnings, vec!["Data value 291 truncated to 35 for .byte".to_string()]);
        Ok(())
    }
    #[test]
    fn string_packing() -> Result<(), Error> {
        let line = LineId::synthetic("data");
        let big = wide_model("big", true)?;
        let packed = DataLine::parse("cstr", "\"abc\"", &line, &big)?;
        assert_eq!(packed.word_count(), 2);
        assert_eq!(bytes(&packed)?.0, vec![b'a', b'b', b'c', 0]);
        let odd = DataLine::parse("byte", "\"abc\"", &line, &big)?;
        assert_eq!(bytes(&odd)?.0, vec![b'a', b'b', b'c', 0xee]);
        let little = wide_model("little", true)?;
        let packed = DataLine::parse("byte", "\"ab\"", &line, &little)?;
        assert_eq!(bytes(&packed)?.0, vec![b'b', b'a']);
        // mixing in a number turns packing off
        let mixed = DataLine::parse("byte", "\"ab\", 1", &line, &big)?;
        assert_eq!(mixed.word_count(), 3);
        let embedded = DataLine::embedded_string("\"hi\"", &line, &big)?;
        assert_eq!(bytes(&embedded)?.0, vec![b'h', b'i', 0, 0xee]);
        Ok(())
    }
}
