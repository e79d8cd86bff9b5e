//! Memory zones partition the address space. Each zone owns an address cursor that the
//! assembler advances while assigning addresses; zones are referred to by [ZoneId] so the
//! manager stays the single owner of every cursor.
use crate::error::{Error, ErrorKind};
use crate::pathid::LineId;

pub const GLOBAL_ZONE_NAME: &str = "GLOBAL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneId(usize);

#[derive(Debug, Clone)]
pub struct MemoryZone {
    pub name: String,
    pub address_bits: u32,
    pub start: i128,
    pub end: i128,
    current_address: i128,
}

impl MemoryZone {
    pub fn new(address_bits: u32, start: i128, end: i128, name: &str) -> Result<Self, Error> {
        let max = max_address(address_bits);
        if start < 0 || end > max {
            return Err(Error::new(
                ErrorKind::Config,
                None,
                &format!(
                    "memory zone \"{}\" range 0x{:x}-0x{:x} is outside of the {}-bit address space",
                    name, start, end, address_bits
                ),
            ));
        }
        if start > end {
            return Err(Error::new(
                ErrorKind::Config,
                None,
                &format!("memory zone \"{}\" starts after it ends", name),
            ));
        }
        Ok(MemoryZone {
            name: name.to_string(),
            address_bits,
            start,
            end,
            current_address: start,
        })
    }
    pub fn current_address(&self) -> i128 { self.current_address }
    /// Move the cursor. It may sit one past `end` (zone full) but never beyond.
    pub fn set_current_address(&mut self, address: i128) -> Result<(), Error> {
        if address < self.start {
            return Err(Error::new(
                ErrorKind::Range,
                None,
                &format!(
                    "address 0x{:x} is below the start of memory zone \"{}\" (0x{:x})",
                    address, self.name, self.start
                ),
            ));
        }
        if address > self.end + 1 {
            return Err(Error::new(
                ErrorKind::Range,
                None,
                &format!(
                    "address 0x{:x} would exceed maximum zone address 0x{:x} of memory zone \"{}\"",
                    address, self.end, self.name
                ),
            ));
        }
        self.current_address = address;
        Ok(())
    }
    pub fn contains(&self, address: i128) -> bool { address >= self.start && address <= self.end }
}

pub fn max_address(address_bits: u32) -> i128 {
    if address_bits >= 127 {
        i128::MAX
    } else {
        (1i128 << address_bits) - 1
    }
}

#[derive(Debug, Clone)]
pub struct MemoryZoneManager {
    address_bits: u32,
    zones: Vec<MemoryZone>,
}

impl MemoryZoneManager {
    /// Create the manager with the GLOBAL zone spanning the whole address space and its
    /// cursor at `origin`.
    pub fn new(address_bits: u32, origin: i128) -> Result<Self, Error> {
        let mut global = MemoryZone::new(address_bits, 0, max_address(address_bits), GLOBAL_ZONE_NAME)?;
        global.set_current_address(origin)?;
        Ok(MemoryZoneManager {
            address_bits,
            zones: vec![global],
        })
    }
    pub fn global_zone(&self) -> ZoneId { ZoneId(0) }
    /// Narrow or move the GLOBAL zone to `start..=end`, putting its cursor back at `origin`.
    pub fn redefine_global(&mut self, start: i128, end: i128, origin: i128) -> Result<ZoneId, Error> {
        let mut global = MemoryZone::new(self.address_bits, start, end, GLOBAL_ZONE_NAME)?;
        global.set_current_address(origin)?;
        self.zones[0] = global;
        Ok(self.global_zone())
    }
    pub fn address_bits(&self) -> u32 { self.address_bits }
    pub fn create_zone(&mut self, start: i128, end: i128, name: &str, line: Option<&LineId>) -> Result<ZoneId, Error> {
        if self.zone(name).is_some() {
            return Err(Error::new(
                ErrorKind::Config,
                line,
                &format!("memory zone \"{}\" already exists", name),
            ));
        }
        let zone = MemoryZone::new(self.address_bits, start, end, name).map_err(|e| match line {
            Some(l) => e.at(l),
            None => e,
        })?;
        self.zones.push(zone);
        Ok(ZoneId(self.zones.len() - 1))
    }
    pub fn zone(&self, name: &str) -> Option<ZoneId> { self.zones.iter().position(|z| z.name == name).map(ZoneId) }
    pub fn get(&self, id: ZoneId) -> &MemoryZone { &self.zones[id.0] }
    pub fn get_mut(&mut self, id: ZoneId) -> &mut MemoryZone { &mut self.zones[id.0] }
    pub fn zones(&self) -> impl Iterator<Item = &MemoryZone> { self.zones.iter() }
}
