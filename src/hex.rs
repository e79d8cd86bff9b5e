//! Intel HEX output. Data records carry up to 32 bytes; images that reach past 64 KiB
//! get extended linear address records so the full 32-bit byte address is preserved.
//!
//! Record layout follows the Intel HEX description in
//! [this wikipedia article](https://en.wikipedia.org/wiki/Intel_HEX).
use crate::error::Error;
use regex::Regex;
use std::fmt::{self, Display};
use std::io;
use std::ops::Deref;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexRecordType {
    Data = 0,
    EndOfFile = 1,
    ExLinAddr = 4,
}

impl HexRecordType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(HexRecordType::Data),
            1 => Some(HexRecordType::EndOfFile),
            4 => Some(HexRecordType::ExLinAddr),
            _ => None,
        }
    }
}

/// Maximum number of data bytes per record.
const MAX_DATA: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    pub address: u16,
    pub record_type: HexRecordType,
    pub data: Vec<u8>,
}

impl Display for HexRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{:02X}{:04X}{:02X}", self.data.len(), self.address, self.record_type as u8)?;
        for b in &self.data {
            write!(f, "{:02X}", b)?;
        }
        writeln!(f, "{:02X}", self.checksum())
    }
}

impl HexRecord {
    pub fn from_data(address: u16, data: &[u8]) -> Self {
        HexRecord {
            address,
            record_type: HexRecordType::Data,
            data: data.to_vec(),
        }
    }
    /// Upper 16 bits of the byte address for the data records that follow.
    pub fn extended_linear_address(upper: u16) -> Self {
        HexRecord {
            address: 0,
            record_type: HexRecordType::ExLinAddr,
            data: upper.to_be_bytes().to_vec(),
        }
    }
    pub fn eof() -> Self {
        HexRecord {
            address: 0,
            record_type: HexRecordType::EndOfFile,
            data: Vec::new(),
        }
    }
    /// Parse one record line. Returns Ok(None) for lines that aren't records.
    pub fn from_str<S: AsRef<str>>(re: &Regex, s: S) -> Result<Option<Self>, Error> {
        let caps = match re.captures(s.as_ref()) {
            Some(c) => c,
            None => return Ok(None),
        };
        let byte = |t: &str| u8::from_str_radix(t, 16).map_err(|_| general_err!("bad hex digits \"{}\"", t));
        let size = byte(&caps[1])? as usize;
        let address = u16::from_str_radix(&caps[2], 16).map_err(|_| general_err!("bad record address"))?;
        let record_type = HexRecordType::from_u8(byte(&caps[3])?)
            .ok_or_else(|| general_err!("unsupported hex record type {}", &caps[3]))?;
        let payload = &caps[4];
        if payload.len() != size * 2 {
            return Err(general_err!("hex record length does not match its byte count"));
        }
        let data = (0..size)
            .map(|i| byte(&payload[i * 2..i * 2 + 2]))
            .collect::<Result<Vec<u8>, Error>>()?;
        let record = HexRecord {
            address,
            record_type,
            data,
        };
        if record.checksum() != byte(&caps[5])? {
            return Err(general_err!("hex record checksum mismatch"));
        }
        Ok(Some(record))
    }
    fn checksum(&self) -> u8 {
        let mut sum = self.data.len() as u8;
        sum = sum.wrapping_add((self.address >> 8) as u8);
        sum = sum.wrapping_add(self.address as u8);
        sum = sum.wrapping_add(self.record_type as u8);
        for b in &self.data {
            sum = sum.wrapping_add(*b);
        }
        sum.wrapping_neg()
    }
}

#[derive(Debug, Default)]
pub struct HexRecordCollection {
    records: Vec<HexRecord>,
    eof: bool,
}

impl HexRecordCollection {
    pub fn new() -> Self { HexRecordCollection::default() }

    /// Records for `bytes` placed at `base_address`, followed by the EOF record.
    pub fn from_image(base_address: u64, bytes: &[u8]) -> Result<Self, Error> {
        if base_address + bytes.len() as u64 > u32::MAX as u64 + 1 {
            return Err(general_err!("image does not fit in the 32-bit Intel HEX address space"));
        }
        let mut hf = HexRecordCollection::new();
        let mut upper: u16 = 0;
        let mut address = base_address;
        let mut remaining = bytes;
        while !remaining.is_empty() {
            let record_upper = (address >> 16) as u16;
            if record_upper != upper {
                upper = record_upper;
                hf.add_record(HexRecord::extended_linear_address(upper))?;
            }
            // a record may not cross a 64 KiB boundary
            let to_boundary = 0x1_0000 - (address & 0xffff) as usize;
            let len = remaining.len().min(MAX_DATA).min(to_boundary);
            hf.add_record(HexRecord::from_data(address as u16, &remaining[..len]))?;
            address += len as u64;
            remaining = &remaining[len..];
        }
        hf.add_eof()?;
        Ok(hf)
    }
    pub fn from_str_iter<I, T>(iter: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let re = Regex::new(r"(?i)^\s*:([0-9a-f]{2})([0-9a-f]{4})([0-9a-f]{2})((?:[0-9a-f]{2})*)([0-9a-f]{2})\s*$")?;
        let mut hf = HexRecordCollection::new();
        for s in iter {
            if let Some(hr) = HexRecord::from_str(&re, s)? {
                hf.add_record(hr)?
            }
        }
        if hf.eof {
            Ok(hf)
        } else {
            Err(general_err!("EOF record not found in hex file"))
        }
    }
    pub fn add_record(&mut self, h: HexRecord) -> Result<(), Error> {
        if self.eof {
            return Err(general_err!("records after EOF in hex file"));
        }
        if h.record_type == HexRecordType::EndOfFile {
            self.eof = true
        }
        self.records.push(h);
        Ok(())
    }
    pub fn add_eof(&mut self) -> Result<(), Error> { self.add_record(HexRecord::eof()) }
    pub fn write_to_file(&self, f: &mut dyn io::Write) -> Result<(), Error> {
        if !self.eof {
            return Err(general_err!("cannot write hex file without EOF record"));
        }
        for r in self.iter() {
            f.write_all(r.to_string().as_bytes())?;
        }
        Ok(())
    }
    /// Flatten data records back to (byte address, byte) pairs.
    pub fn to_bytes(&self) -> Vec<(u64, u8)> {
        let mut upper = 0u64;
        let mut out = Vec::new();
        for r in &self.records {
            match r.record_type {
                HexRecordType::ExLinAddr => {
                    upper = r.data.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64) << 16;
                }
                HexRecordType::Data => {
                    let base = upper + r.address as u64;
                    out.extend(r.data.iter().enumerate().map(|(i, b)| (base + i as u64, *b)));
                }
                HexRecordType::EndOfFile => {}
            }
        }
        out
    }
}

impl Deref for HexRecordCollection {
    type Target = Vec<HexRecord>;
    fn deref(&self) -> &Self::Target { &self.records }
}
