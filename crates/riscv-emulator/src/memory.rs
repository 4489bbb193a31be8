//! Memory model for the RISC-V emulator.
//!
//! Guest memory is a sparse set of page-aligned regions, each with its own
//! permission mask. Guest accesses (`read`, `write`, `fetch`, `load`, `store`)
//! check permissions; host accesses (`peek`, `poke`) only check mapping.
//! An access must lie entirely within one region.

use std::collections::BTreeMap;

use bitflags::bitflags;
use tracing::debug;

use crate::{
    error::{MemoryAccessKind, MemoryError},
    profile::Endianness,
};

bitflags! {
    /// Region permission mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
        const ALL = Self::READ.bits() | Self::WRITE.bits() | Self::EXEC.bits();
    }
}

impl Permissions {
    fn required_for(kind: MemoryAccessKind) -> Self {
        match kind {
            MemoryAccessKind::Read => Permissions::READ,
            MemoryAccessKind::Write => Permissions::WRITE,
            MemoryAccessKind::InstructionFetch => Permissions::EXEC,
        }
    }
}

/// Description of a mapped region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionInfo {
    pub base: u64,
    pub length: u64,
    pub perms: Permissions,
}

struct Region {
    perms: Permissions,
    bytes: Vec<u8>,
}

impl Region {
    fn length(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Sparse guest address space.
pub struct Memory {
    regions: BTreeMap<u64, Region>,
    page_size: u64,
    endianness: Endianness,
}

impl Memory {
    pub fn new(page_size: u64, endianness: Endianness) -> Self {
        Self {
            regions: BTreeMap::new(),
            page_size,
            endianness,
        }
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Map a zero-filled region.
    pub fn map(&mut self, base: u64, length: u64, perms: Permissions) -> Result<(), MemoryError> {
        let misaligned = MemoryError::Alignment {
            base,
            length,
            page_size: self.page_size,
        };
        if length == 0 || base % self.page_size != 0 || length % self.page_size != 0 {
            return Err(misaligned);
        }
        let last = base.checked_add(length - 1).ok_or(misaligned)?;
        let size = usize::try_from(length).map_err(|_| MemoryError::Alignment {
            base,
            length,
            page_size: self.page_size,
        })?;

        // Regions never overlap, so only the closest one starting at or
        // below `last` can intersect.
        if let Some((&prev_base, prev)) = self.regions.range(..=last).next_back() {
            if prev_base + (prev.length() - 1) >= base {
                return Err(MemoryError::Overlap { base, length });
            }
        }

        debug!(base = format_args!("0x{base:x}"), length, ?perms, "map region");
        self.regions.insert(
            base,
            Region {
                perms,
                bytes: vec![0; size],
            },
        );
        Ok(())
    }

    /// Unmap a region previously mapped with exactly `base` and `length`.
    pub fn unmap(&mut self, base: u64, length: u64) -> Result<(), MemoryError> {
        self.exact(base, length)?;
        debug!(base = format_args!("0x{base:x}"), length, "unmap region");
        self.regions.remove(&base);
        Ok(())
    }

    /// Change the permissions of an exactly-mapped region.
    pub fn protect(
        &mut self,
        base: u64,
        length: u64,
        perms: Permissions,
    ) -> Result<(), MemoryError> {
        self.exact(base, length)?;
        if let Some(region) = self.regions.get_mut(&base) {
            region.perms = perms;
        }
        debug!(base = format_args!("0x{base:x}"), length, ?perms, "protect region");
        Ok(())
    }

    fn exact(&self, base: u64, length: u64) -> Result<(), MemoryError> {
        match self.regions.get(&base) {
            Some(region) if region.length() == length => Ok(()),
            _ => Err(MemoryError::NotMapped { base, length }),
        }
    }

    /// Mapped regions in address order.
    pub fn regions(&self) -> impl Iterator<Item = RegionInfo> + '_ {
        self.regions.iter().map(|(&base, region)| RegionInfo {
            base,
            length: region.length(),
            perms: region.perms,
        })
    }

    /// Locate `size` bytes at `address` inside a single region.
    fn locate(
        &self,
        address: u64,
        size: usize,
        kind: MemoryAccessKind,
    ) -> Result<(u64, usize), MemoryError> {
        let unmapped = MemoryError::UnmappedAccess {
            address,
            size,
            kind,
        };
        let (&base, region) = self
            .regions
            .range(..=address)
            .next_back()
            .ok_or(unmapped.clone())?;
        let offset = address - base;
        match offset.checked_add(size as u64) {
            Some(end) if end <= region.length() => Ok((base, offset as usize)),
            _ => Err(unmapped),
        }
    }

    fn check_perms(
        &self,
        base: u64,
        address: u64,
        size: usize,
        kind: MemoryAccessKind,
    ) -> Result<(), MemoryError> {
        let allowed = self
            .regions
            .get(&base)
            .is_some_and(|r| r.perms.contains(Permissions::required_for(kind)));
        if allowed {
            Ok(())
        } else {
            Err(MemoryError::PermissionDenied {
                address,
                size,
                kind,
            })
        }
    }

    fn read_raw(
        &self,
        address: u64,
        buf: &mut [u8],
        kind: MemoryAccessKind,
        guest: bool,
    ) -> Result<(), MemoryError> {
        let (base, offset) = self.locate(address, buf.len(), kind)?;
        if guest {
            self.check_perms(base, address, buf.len(), kind)?;
        }
        let region = &self.regions[&base];
        buf.copy_from_slice(&region.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn write_raw(&mut self, address: u64, data: &[u8], guest: bool) -> Result<(), MemoryError> {
        let kind = MemoryAccessKind::Write;
        let (base, offset) = self.locate(address, data.len(), kind)?;
        if guest {
            self.check_perms(base, address, data.len(), kind)?;
        }
        if let Some(region) = self.regions.get_mut(&base) {
            region.bytes[offset..offset + data.len()].copy_from_slice(data);
        }
        Ok(())
    }

    /// Guest read; requires READ.
    pub fn read(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.read_raw(address, buf, MemoryAccessKind::Read, true)
    }

    /// Guest write; requires WRITE.
    pub fn write(&mut self, address: u64, data: &[u8]) -> Result<(), MemoryError> {
        self.write_raw(address, data, true)
    }

    /// Fetch a 32-bit instruction; requires EXEC. Always little-endian.
    pub fn fetch(&self, address: u64) -> Result<u32, MemoryError> {
        let mut bytes = [0u8; 4];
        self.read_raw(address, &mut bytes, MemoryAccessKind::InstructionFetch, true)?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Host read, ignoring permissions.
    pub fn peek(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.read_raw(address, buf, MemoryAccessKind::Read, false)
    }

    /// Host write, ignoring permissions.
    pub fn poke(&mut self, address: u64, data: &[u8]) -> Result<(), MemoryError> {
        self.write_raw(address, data, false)
    }

    /// Guest load of 1, 2, 4 or 8 bytes in data byte order, zero-extended.
    pub fn load(&self, address: u64, size: usize) -> Result<u64, MemoryError> {
        let mut bytes = [0u8; 8];
        self.read(address, &mut bytes[..size])?;
        Ok(self.decode_value(&bytes[..size]))
    }

    /// Guest store of the low `size` bytes of `value` in data byte order.
    pub fn store(&mut self, address: u64, size: usize, value: u64) -> Result<(), MemoryError> {
        let bytes = self.encode_value(value, size);
        self.write(address, &bytes[..size])
    }

    fn decode_value(&self, bytes: &[u8]) -> u64 {
        let fold = |acc: u64, b: &u8| (acc << 8) | *b as u64;
        match self.endianness {
            Endianness::Little => bytes.iter().rev().fold(0, fold),
            Endianness::Big => bytes.iter().fold(0, fold),
        }
    }

    fn encode_value(&self, value: u64, size: usize) -> [u8; 8] {
        let mut out = [0u8; 8];
        match self.endianness {
            Endianness::Little => out = value.to_le_bytes(),
            Endianness::Big => {
                let be = value.to_be_bytes();
                out[..size].copy_from_slice(&be[8 - size..]);
            }
        }
        out
    }
}
