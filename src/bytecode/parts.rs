use super::{low_mask, Endian, Value, Word, WordSlice};
use crate::error::{Error, ErrorKind};
use crate::memzone::{MemoryZoneManager, ZoneId};
use crate::parse::{Expression, LabelResolver};
use crate::pathid::LineId;
use std::collections::BTreeMap;
use std::fmt;

/// Everything a part needs to compute its value during the second pass.
pub struct PartContext<'a> {
    pub labels: &'a dyn LabelResolver,
    pub zones: &'a MemoryZoneManager,
    /// address of the instruction the part belongs to
    pub address: i128,
    /// size of that instruction in words
    pub size: i128,
}

/// Word geometry of the target. Bit-packed parts are laid out with these settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordLayout {
    pub word_size: u32,
    pub segment_size: u32,
    pub intra_word_endian: Endian,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartKind {
    /// a literal
    Numeric(i128),
    /// an expression evaluated with the line's label scope
    Expression(Expression),
    /// an expression whose value must lie in `min..=max`
    ExpressionWithValidation {
        expr: Expression,
        max: Option<i128>,
        min: Option<i128>,
    },
    /// an expression that must be an address inside a memory zone
    ExpressionInMemoryZone { expr: Expression, zone: ZoneId },
    /// an expression whose value selects the emitted value from a table
    Enumeration {
        expr: Expression,
        value_dict: BTreeMap<i128, i128>,
    },
    /// several parts packed into one bit field, first part most significant
    Composite(Vec<ByteCodePart>),
    /// an address in a zone, optionally reduced to its low `value_size` bits
    Address {
        expr: Expression,
        zone: ZoneId,
        slice_lsb: bool,
        match_address_msb: bool,
    },
    /// distance from the instruction to the target address
    RelativeAddress {
        expr: Expression,
        zone: ZoneId,
        min: Option<i128>,
        max: Option<i128>,
        offset_from_instruction_end: bool,
    },
}

/// One bit-width-tagged contribution to an encoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteCodePart {
    pub kind: PartKind,
    pub value_size: u32,
    pub word_align: bool,
    pub multi_word_endian: Endian,
    pub intra_word_endian: Endian,
    pub line_id: LineId,
}

impl ByteCodePart {
    pub fn new(
        kind: PartKind, value_size: u32, word_align: bool, multi_word_endian: Endian, intra_word_endian: Endian,
        line_id: &LineId,
    ) -> Self {
        ByteCodePart {
            kind,
            value_size,
            word_align,
            multi_word_endian,
            intra_word_endian,
            line_id: line_id.clone(),
        }
    }
    /// An unaligned literal field; the usual shape of opcode bits.
    pub fn numeric(value: i128, value_size: u32, line_id: &LineId) -> Self {
        ByteCodePart::new(
            PartKind::Numeric(value),
            value_size,
            false,
            Endian::Big,
            Endian::Big,
            line_id,
        )
    }
    /// Pack parts into a single field whose width is the sum of theirs.
    pub fn composite(parts: Vec<ByteCodePart>, word_align: bool, line_id: &LineId) -> Self {
        let size = parts.iter().map(|p| p.value_size).sum();
        let (multi, intra) = parts
            .first()
            .map_or((Endian::Big, Endian::Big), |p| (p.multi_word_endian, p.intra_word_endian));
        ByteCodePart::new(PartKind::Composite(parts), size, word_align, multi, intra, line_id)
    }
    pub fn expression(&self) -> Option<&Expression> {
        match &self.kind {
            PartKind::Numeric(_) | PartKind::Composite(_) => None,
            PartKind::Expression(expr)
            | PartKind::ExpressionWithValidation { expr, .. }
            | PartKind::ExpressionInMemoryZone { expr, .. }
            | PartKind::Enumeration { expr, .. }
            | PartKind::Address { expr, .. }
            | PartKind::RelativeAddress { expr, .. } => Some(expr),
        }
    }
    /// The source text this part was built from, used for macro argument substitution.
    pub fn instruction_string(&self) -> Option<String> {
        match &self.kind {
            PartKind::Numeric(v) => Some(v.to_string()),
            PartKind::Composite(_) => None,
            _ => self.expression().map(|e| e.text().to_string()),
        }
    }
    pub fn contains_register_labels<'a, I>(&self, registers: I) -> bool
    where
        I: IntoIterator<Item = &'a String> + Clone,
    {
        match &self.kind {
            PartKind::Composite(parts) => parts.iter().any(|p| p.contains_register_labels(registers.clone())),
            _ => self.expression().map_or(false, |e| e.contains_register_labels(registers)),
        }
    }

    fn eval(&self, expr: &Expression, ctx: &PartContext) -> Result<i128, Error> {
        expr.eval(ctx.labels).map_err(|e| e.at(&self.line_id))
    }
    fn check_in_zone(&self, value: i128, zone: ZoneId, ctx: &PartContext) -> Result<(), Error> {
        let zone = ctx.zones.get(zone);
        if value > zone.end {
            return Err(range_err!(
                &self.line_id,
                "address value 0x{:x} exceeds the maximum address 0x{:x} of memory zone \"{}\"",
                value,
                zone.end,
                zone.name
            ));
        }
        if value < zone.start {
            return Err(range_err!(
                &self.line_id,
                "address value 0x{:x} is below the minimum address 0x{:x} of memory zone \"{}\"",
                value,
                zone.start,
                zone.name
            ));
        }
        Ok(())
    }
    fn check_limits(&self, value: i128, min: Option<i128>, max: Option<i128>, what: &str) -> Result<(), Error> {
        if let Some(max) = max.filter(|&m| value > m) {
            return Err(range_err!(
                &self.line_id,
                "{} of {} exceeds the maximum allowed value of {}",
                what,
                value,
                max
            ));
        }
        if let Some(min) = min.filter(|&m| value < m) {
            return Err(range_err!(
                &self.line_id,
                "{} of {} is less than the minimum allowed value of {}",
                what,
                value,
                min
            ));
        }
        Ok(())
    }

    pub fn get_value(&self, ctx: &PartContext) -> Result<i128, Error> {
        match &self.kind {
            PartKind::Numeric(v) => Ok(*v),
            PartKind::Expression(expr) => self.eval(expr, ctx),
            PartKind::ExpressionWithValidation { expr, max, min } => {
                let value = self.eval(expr, ctx)?;
                self.check_limits(value, *min, *max, "operand value")?;
                Ok(value)
            }
            PartKind::ExpressionInMemoryZone { expr, zone } => {
                let value = self.eval(expr, ctx)?;
                self.check_in_zone(value, *zone, ctx)?;
                Ok(value)
            }
            PartKind::Enumeration { expr, value_dict } => {
                let value = self.eval(expr, ctx)?;
                value_dict.get(&value).copied().ok_or_else(|| {
                    range_err!(
                        &self.line_id,
                        "value {} of \"{}\" is not one of the allowed values {:?}",
                        value,
                        expr,
                        value_dict.keys().collect::<Vec<_>>()
                    )
                })
            }
            PartKind::Composite(parts) => {
                let mut value = 0i128;
                for p in parts {
                    let slice = WordSlice::new(p.get_value(ctx)?, p.value_size).map_err(|e| e.at(&p.line_id))?;
                    value = (value << p.value_size) | slice.get_raw_bits() as i128;
                }
                Ok(value)
            }
            PartKind::Address {
                expr,
                zone,
                slice_lsb,
                match_address_msb,
            } => {
                let value = self.eval(expr, ctx)?;
                self.check_in_zone(value, *zone, ctx)?;
                if !*slice_lsb {
                    return Ok(value);
                }
                let mask = low_mask(self.value_size) as i128;
                let msb = |v: i128| v.checked_shr(self.value_size).unwrap_or(0);
                if *match_address_msb && msb(ctx.address) != msb(value) {
                    return Err(range_err!(
                        &self.line_id,
                        "operand address value 0x{:x} does not have the same MSBs as the instruction address 0x{:x}",
                        value,
                        ctx.address
                    ));
                }
                Ok(value & mask)
            }
            PartKind::RelativeAddress {
                expr,
                zone,
                min,
                max,
                offset_from_instruction_end,
            } => {
                let value = self.eval(expr, ctx)?;
                self.check_in_zone(value, *zone, ctx)?;
                let mut relative = value - ctx.address;
                if *offset_from_instruction_end {
                    relative -= ctx.size - 1;
                }
                self.check_limits(relative, *min, *max, "relative address offset")?;
                Ok(relative)
            }
        }
    }

    /// Number of words `parts` occupy once laid out. Does not need any label values.
    pub fn word_count(parts: &[ByteCodePart], word_size: u32) -> usize {
        let words_for = |bits: u32| ((bits + word_size - 1) / word_size) as usize;
        let mut pending = 0u32;
        let mut count = 0usize;
        for p in parts {
            if p.word_align {
                count += words_for(pending);
                pending = 0;
                count += words_for(p.value_size);
            } else {
                pending += p.value_size;
            }
        }
        count + words_for(pending)
    }

    /// Lay the parts out into words. Consecutive unaligned parts are bit-packed, MSB first,
    /// into shared words; a word-aligned part flushes what is pending (left-aligning a
    /// partial last word) and is then emitted as its own multi-word value.
    pub fn compact_parts_to_words(
        parts: &[ByteCodePart], ctx: &PartContext, layout: &WordLayout,
    ) -> Result<Vec<Word>, Error> {
        let mut words = Vec::new();
        let mut pending: Vec<WordSlice> = Vec::new();
        for p in parts {
            let value = p.get_value(ctx)?;
            let slice = WordSlice::new(value, p.value_size).map_err(|e| e.at(&p.line_id))?;
            if p.word_align {
                flush_slices(&mut pending, &mut words, layout)?;
                let count = ((p.value_size + layout.word_size - 1) / layout.word_size) as usize;
                if count > 0 {
                    let v = Value::with_word_count(
                        slice.get_raw_bits() as i128,
                        count,
                        layout.word_size,
                        layout.segment_size,
                        p.intra_word_endian,
                        p.multi_word_endian,
                    )
                    .map_err(|e| e.at(&p.line_id))?;
                    words.extend(v.get_words_ordered(None));
                }
            } else {
                pending.push(slice);
            }
        }
        flush_slices(&mut pending, &mut words, layout)?;
        Ok(words)
    }
}

/// Pack pending slices into words, splitting slices that straddle a word boundary.
fn flush_slices(pending: &mut Vec<WordSlice>, words: &mut Vec<Word>, layout: &WordLayout) -> Result<(), Error> {
    let word_size = layout.word_size;
    let mut acc = 0u128;
    let mut acc_bits = 0u32;
    for s in pending.drain(..) {
        let mut raw = s.get_raw_bits();
        let mut bits = s.bit_size();
        while bits > 0 {
            let take = bits.min(word_size - acc_bits);
            let chunk = (raw >> (bits - take)) & super::low_mask(take);
            acc = if acc_bits == 0 { chunk } else { (acc << take) | chunk };
            acc_bits += take;
            bits -= take;
            raw &= super::low_mask(bits);
            if acc_bits == word_size {
                words.push(Word::new(acc, word_size, layout.segment_size, layout.intra_word_endian)?);
                acc = 0;
                acc_bits = 0;
            }
        }
    }
    if acc_bits > 0 {
        words.push(Word::new(
            acc << (word_size - acc_bits),
            word_size,
            layout.segment_size,
            layout.intra_word_endian,
        )?);
    }
    Ok(())
}

impl fmt::Display for ByteCodePart {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            PartKind::Numeric(v) => write!(f, "Numeric<{}:{}>", v, self.value_size),
            PartKind::Composite(parts) => {
                write!(f, "Composite<")?;
                for p in parts {
                    write!(f, "{}", p)?;
                }
                write!(f, ">")
            }
            _ => write!(
                f,
                "Expression<\"{}\":{}>",
                self.instruction_string().unwrap_or_default(),
                self.value_size
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::word::words_to_bytes;
    use crate::parse::NoLabels;
    use std::collections::HashMap;

    const LAYOUT: WordLayout = WordLayout {
        word_size: 8,
        segment_size: 8,
        intra_word_endian: Endian::Big,
    };
    fn line() -> LineId { LineId::synthetic("parts") }
    fn expr_part(kind_expr: &str, size: u32, align: bool, multi: Endian) -> Result<ByteCodePart, Error> {
        Ok(ByteCodePart::new(
            PartKind::Expression(Expression::parse(kind_expr)?),
            size,
            align,
            multi,
            Endian::Big,
            &line(),
        ))
    }
    #[test]
    fn unaligned_parts_share_words() -> Result<(), Error> {
        let zones = MemoryZoneManager::new(16, 0)?;
        let ctx = PartContext {
            labels: &NoLabels,
            zones: &zones,
            address: 0,
            size: 3,
        };
        let parts = vec![
            ByteCodePart::numeric(0b01, 2, &line()),
            ByteCodePart::numeric(0b000, 3, &line()),
            ByteCodePart::numeric(0b110, 3, &line()),
            expr_part("$1234", 16, true, Endian::Little)?,
            ByteCodePart::numeric(0b1, 1, &line()),
        ];
        assert_eq!(ByteCodePart::word_count(&parts, 8), 4);
        let words = ByteCodePart::compact_parts_to_words(&parts, &ctx, &LAYOUT)?;
        assert_eq!(words_to_bytes(&words, true), vec![0x46, 0x34, 0x12, 0x80]);
        Ok(())
    }
    #[test]
    fn straddling_fields_split_across_words() -> Result<(), Error> {
        let zones = MemoryZoneManager::new(16, 0)?;
        let ctx = PartContext {
            labels: &NoLabels,
            zones: &zones,
            address: 0,
            size: 2,
        };
        let parts = vec![ByteCodePart::numeric(0xf, 4, &line()), expr_part("$abc", 12, false, Endian::Big)?];
        let words = ByteCodePart::compact_parts_to_words(&parts, &ctx, &LAYOUT)?;
        assert_eq!(words_to_bytes(&words, true), vec![0xfa, 0xbc]);
        let too_big = vec![ByteCodePart::numeric(0x10, 4, &line())];
        assert!(ByteCodePart::compact_parts_to_words(&too_big, &ctx, &LAYOUT).is_err());
        Ok(())
    }
    #[test]
    fn validated_and_address_parts() -> Result<(), Error> {
        let mut zones = MemoryZoneManager::new(16, 0)?;
        let zp = zones.create_zone(0, 0xff, "zero_page", None)?;
        let mut labels: HashMap<String, i128> = HashMap::new();
        labels.insert("target".to_string(), 0x1210);
        labels.insert("near".to_string(), 0x40);
        let ctx = PartContext {
            labels: &labels,
            zones: &zones,
            address: 0x1200,
            size: 2,
        };
        let e = |s: &str| Expression::parse(s);
        let bounded = ByteCodePart::new(
            PartKind::ExpressionWithValidation {
                expr: e("near")?,
                max: Some(0x3f),
                min: Some(0),
            },
            8,
            false,
            Endian::Big,
            Endian::Big,
            &line(),
        );
        assert_eq!(bounded.get_value(&ctx).err().map(|e| e.kind), Some(ErrorKind::Range));
        let in_zone = ByteCodePart::new(
            PartKind::ExpressionInMemoryZone { expr: e("target")?, zone: zp },
            8,
            false,
            Endian::Big,
            Endian::Big,
            &line(),
        );
        assert!(in_zone.get_value(&ctx).is_err());
        let sliced = ByteCodePart::new(
            PartKind::Address {
                expr: e("target")?,
                zone: zones.global_zone(),
                slice_lsb: true,
                match_address_msb: true,
            },
            8,
            false,
            Endian::Big,
            Endian::Big,
            &line(),
        );
        assert_eq!(sliced.get_value(&ctx)?, 0x10);
        let wide = ByteCodePart::new(
            PartKind::Address {
                expr: e("target")?,
                zone: zones.global_zone(),
                slice_lsb: true,
                match_address_msb: true,
            },
            128,
            false,
            Endian::Big,
            Endian::Big,
            &line(),
        );
        assert_eq!(wide.get_value(&ctx)?, 0x1210);
        let far = PartContext { address: 0x1300, ..ctx };
        assert!(sliced.get_value(&far).is_err());
        let relative = ByteCodePart::new(
            PartKind::RelativeAddress {
                expr: e("target")?,
                zone: zones.global_zone(),
                min: Some(-128),
                max: Some(127),
                offset_from_instruction_end: true,
            },
            8,
            false,
            Endian::Big,
            Endian::Big,
            &line(),
        );
        assert_eq!(relative.get_value(&far).err().map(|e| e.kind), Some(ErrorKind::Range));
        let near_ctx = PartContext {
            labels: &labels,
            zones: &zones,
            address: 0x1200,
            size: 2,
        };
        assert_eq!(relative.get_value(&near_ctx)?, 0x10 - 1);
        Ok(())
    }
    #[test]
    fn enumeration_and_composite() -> Result<(), Error> {
        let zones = MemoryZoneManager::new(16, 0)?;
        let ctx = PartContext {
            labels: &NoLabels,
            zones: &zones,
            address: 0,
            size: 1,
        };
        let mut dict = BTreeMap::new();
        dict.insert(1, 0b00);
        dict.insert(8, 0b11);
        let en = ByteCodePart::new(
            PartKind::Enumeration {
                expr: Expression::parse("4 * 2")?,
                value_dict: dict.clone(),
            },
            2,
            false,
            Endian::Big,
            Endian::Big,
            &line(),
        );
        assert_eq!(en.get_value(&ctx)?, 0b11);
        let comp = ByteCodePart::composite(vec![ByteCodePart::numeric(0b10, 2, &line()), en], false, &line());
        assert_eq!(comp.value_size, 4);
        assert_eq!(comp.get_value(&ctx)?, 0b1011);
        Ok(())
    }
}
