//! Header-page record table.
//!
//! The header page (page 0) maps index names to root page ids. Every root
//! replacement in a B+tree updates its record here, so reopening an index by
//! name finds the current root.
//!
//! Records are fixed width: a 32-byte zero-padded name followed by the root
//! page id. A u32 count sits at offset 0. Names longer than 32 bytes are
//! rejected; the zero padding makes the page readable without a separate
//! length field.

use eyre::{ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{
    PageId, HEADER_MAX_RECORDS, HEADER_RECORD_NAME_LEN, HEADER_RECORD_SIZE, PAGE_SIZE,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct HeaderRecord {
    name: [u8; HEADER_RECORD_NAME_LEN],
    root_page_id: U32,
}

fn encode_name(name: &str) -> Result<[u8; HEADER_RECORD_NAME_LEN]> {
    ensure!(
        name.len() <= HEADER_RECORD_NAME_LEN,
        "index name '{}' exceeds {} bytes",
        name,
        HEADER_RECORD_NAME_LEN
    );
    ensure!(!name.is_empty(), "index name must not be empty");
    let mut out = [0u8; HEADER_RECORD_NAME_LEN];
    out[..name.len()].copy_from_slice(name.as_bytes());
    Ok(out)
}

fn record_offset(index: usize) -> usize {
    4 + index * HEADER_RECORD_SIZE
}

/// Read-only view over header-page bytes.
pub struct HeaderPage<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn from_page(data: &'a [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        Ok(Self { data })
    }

    pub fn record_count(&self) -> usize {
        // Clamped so a corrupt count cannot push record offsets off the page.
        (u32::from_le_bytes(self.data[..4].try_into().unwrap()) as usize).min(HEADER_MAX_RECORDS)
    }

    fn record_at(&self, index: usize) -> &HeaderRecord {
        let offset = record_offset(index);
        HeaderRecord::ref_from_bytes(&self.data[offset..offset + HEADER_RECORD_SIZE])
            .unwrap() // INVARIANT: records are unaligned and index < HEADER_MAX_RECORDS
    }

    fn position_of(&self, name: &[u8; HEADER_RECORD_NAME_LEN]) -> Option<usize> {
        (0..self.record_count()).find(|&i| &self.record_at(i).name == name)
    }

    /// Looks up the root page id recorded under `name`.
    pub fn find_record(&self, name: &str) -> Result<Option<PageId>> {
        let name = encode_name(name)?;
        Ok(self
            .position_of(&name)
            .map(|i| self.record_at(i).root_page_id.get()))
    }
}

/// Mutable view over header-page bytes.
pub struct HeaderPageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPageMut<'a> {
    pub fn from_page(data: &'a mut [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        Ok(Self { data })
    }

    fn view(&self) -> HeaderPage<'_> {
        HeaderPage { data: self.data }
    }

    pub fn record_count(&self) -> usize {
        self.view().record_count()
    }

    pub fn find_record(&self, name: &str) -> Result<Option<PageId>> {
        self.view().find_record(name)
    }

    fn set_record_count(&mut self, count: usize) {
        self.data[..4].copy_from_slice(&(count as u32).to_le_bytes());
    }

    fn write_record(&mut self, index: usize, record: HeaderRecord) {
        let offset = record_offset(index);
        self.data[offset..offset + HEADER_RECORD_SIZE].copy_from_slice(record.as_bytes());
    }

    /// Adds a new record. Returns false when the name is already present or
    /// the table is full.
    pub fn insert_record(&mut self, name: &str, root_page_id: PageId) -> Result<bool> {
        let encoded = encode_name(name)?;
        if self.view().position_of(&encoded).is_some() {
            return Ok(false);
        }
        let count = self.record_count();
        if count >= HEADER_MAX_RECORDS {
            return Ok(false);
        }
        self.write_record(
            count,
            HeaderRecord {
                name: encoded,
                root_page_id: U32::new(root_page_id),
            },
        );
        self.set_record_count(count + 1);
        Ok(true)
    }

    /// Overwrites the root page id of an existing record. Returns false when
    /// the name is absent.
    pub fn update_record(&mut self, name: &str, root_page_id: PageId) -> Result<bool> {
        let encoded = encode_name(name)?;
        match self.view().position_of(&encoded) {
            Some(index) => {
                self.write_record(
                    index,
                    HeaderRecord {
                        name: encoded,
                        root_page_id: U32::new(root_page_id),
                    },
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes a record, compacting the table. Returns false when absent.
    pub fn delete_record(&mut self, name: &str) -> Result<bool> {
        let encoded = encode_name(name)?;
        let Some(index) = self.view().position_of(&encoded) else {
            return Ok(false);
        };
        let count = self.record_count();
        for i in index..count - 1 {
            let next = *self.view().record_at(i + 1);
            self.write_record(i, next);
        }
        self.set_record_count(count - 1);
        Ok(true)
    }
}
