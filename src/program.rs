//! The result of an assembly run and the writers for its output formats.
use crate::error::Error;
use crate::hex::HexRecordCollection;
use crate::line::LineObject;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;

#[derive(Debug)]
pub struct Program {
    /// compilable line objects in address order
    pub lines: Vec<LineObject>,
    /// the emitted words packed into bytes
    pub image: Vec<u8>,
    /// address of the first emitted word
    pub start: i128,
    pub word_size: u32,
    pub warnings: Vec<String>,
}

impl Program {
    /// Byte address of the image start, as Intel HEX records need it.
    fn byte_start(&self) -> u64 { (self.start as u64 * self.word_size as u64) / 8 }

    pub fn write_binary(&self, f: &mut dyn Write) -> Result<(), Error> {
        f.write_all(&self.image)?;
        Ok(())
    }
    pub fn write_hex(&self, f: &mut dyn Write) -> Result<(), Error> {
        HexRecordCollection::from_image(self.byte_start(), &self.image)?.write_to_file(f)
    }
    /// Write the image to `path`, raw or as Intel HEX.
    pub fn write_output_file(&self, path: &Path, hex: bool) -> Result<(), Error> {
        let mut file = File::create(path)?;
        if hex {
            self.write_hex(&mut file)?;
        } else {
            self.write_binary(&mut file)?;
        }
        println!("wrote {} bytes to {}", self.image.len(), path.display());
        Ok(())
    }
    pub fn summary(&self) -> String {
        let words: usize = self.lines.iter().filter(|l| !l.muted).map(|l| l.word_count()).sum();
        format!(
            "{} line objects, {} words of bytecode, {} byte image from address 0x{:x}, {} warning(s)",
            self.lines.len(),
            words,
            self.image.len(),
            self.start,
            self.warnings.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_output_uses_byte_addresses() -> Result<(), Error> {
        let program = Program {
            lines: Vec::new(),
            image: vec![0x12, 0x34, 0x56, 0x78],
            start: 0x80,
            word_size: 16,
            warnings: Vec::new(),
        };
        let mut out = Vec::new();
        program.write_hex(&mut out)?;
        let text = String::from_utf8_lossy(&out).to_string();
        let back = HexRecordCollection::from_str_iter(text.lines())?;
        assert_eq!(back.to_bytes()[0], (0x100, 0x12));
        let mut raw = Vec::new();
        program.write_binary(&mut raw)?;
        assert_eq!(raw, program.image);
        assert!(program.summary().contains("4 byte image from address 0x80"));
        Ok(())
    }
}
