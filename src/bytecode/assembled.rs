use super::parts::{ByteCodePart, PartContext, PartKind, WordLayout};
use super::Word;
use crate::error::Error;
use crate::pathid::LineId;

/// The bytecode parts of one instruction (or one expanded macro) and the size they occupy.
/// The size is known as soon as the parts are; values are only computed in the second pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledInstruction {
    pub line_id: LineId,
    parts: Vec<ByteCodePart>,
    word_count: usize,
    byte_size: usize,
}

impl AssembledInstruction {
    pub fn new(line_id: &LineId, parts: Vec<ByteCodePart>, word_size: u32) -> Self {
        let word_count = ByteCodePart::word_count(&parts, word_size);
        let byte_size = byte_size_of(&parts);
        AssembledInstruction {
            line_id: line_id.clone(),
            parts,
            word_count,
            byte_size,
        }
    }
    /// Concatenate several instructions (macro steps) into one.
    pub fn composite(line_id: &LineId, steps: Vec<AssembledInstruction>, word_size: u32) -> Self {
        let parts = steps.into_iter().flat_map(|s| s.parts).collect();
        AssembledInstruction::new(line_id, parts, word_size)
    }
    pub fn parts(&self) -> &[ByteCodePart] { &self.parts }
    pub fn word_count(&self) -> usize { self.word_count }
    pub fn byte_size(&self) -> usize { self.byte_size }

    pub fn generate_words(&self, ctx: &PartContext, layout: &WordLayout) -> Result<Vec<Word>, Error> {
        ByteCodePart::compact_parts_to_words(&self.parts, ctx, layout).map_err(|e| e.at(&self.line_id))
    }
    /// Every non-composite part, depth first.
    pub fn flattened_parts(&self) -> Vec<&ByteCodePart> {
        fn walk<'a>(p: &'a ByteCodePart, out: &mut Vec<&'a ByteCodePart>) {
            match &p.kind {
                PartKind::Composite(children) => children.iter().for_each(|c| walk(c, out)),
                _ => out.push(p),
            }
        }
        let mut out = Vec::new();
        self.parts.iter().for_each(|p| walk(p, &mut out));
        out
    }
}

/// Size in bytes when parts are packed back to back and word-aligned parts start on a byte.
fn byte_size_of(parts: &[ByteCodePart]) -> usize {
    let mut total_bits = 0usize;
    for p in parts {
        if p.word_align && total_bits % 8 != 0 {
            total_bits += 8 - total_bits % 8;
        }
        total_bits += p.value_size as usize;
    }
    (total_bits + 7) / 8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::word::words_to_bytes;
    use crate::bytecode::Endian;
    use crate::memzone::MemoryZoneManager;
    use crate::parse::{Expression, NoLabels};

    #[test]
    fn sizes_and_generation() -> Result<(), Error> {
        let line = LineId::synthetic("assembled");
        let parts = vec![
            ByteCodePart::numeric(0b01, 2, &line),
            ByteCodePart::numeric(0b000, 3, &line),
            ByteCodePart::numeric(0b110, 3, &line),
            ByteCodePart::new(
                PartKind::Expression(Expression::parse("1")?),
                16,
                true,
                Endian::Little,
                Endian::Big,
                &line,
            ),
        ];
        let mov = AssembledInstruction::new(&line, parts, 8);
        assert_eq!(mov.word_count(), 3);
        assert_eq!(mov.byte_size(), 3);
        let nop = AssembledInstruction::new(&line, vec![ByteCodePart::numeric(0, 8, &line)], 8);
        let both = AssembledInstruction::composite(&line, vec![nop, mov], 8);
        assert_eq!(both.word_count(), 4);
        assert_eq!(both.flattened_parts().len(), 5);

        let zones = MemoryZoneManager::new(16, 0)?;
        let ctx = PartContext {
            labels: &NoLabels,
            zones: &zones,
            address: 0,
            size: both.word_count() as i128,
        };
        let layout = WordLayout {
            word_size: 8,
            segment_size: 8,
            intra_word_endian: Endian::Big,
        };
        let words = both.generate_words(&ctx, &layout)?;
        assert_eq!(words_to_bytes(&words, true), vec![0x00, 0x46, 0x01, 0x00]);
        Ok(())
    }
}
