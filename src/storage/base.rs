use std::fmt;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Default page size (4KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Table identifier, derived once from the backing file's absolute path
pub type TableId = u64;

/// Page number within a table file (file offset = page_number * page_size)
pub type PageNumber = u32;

/// Slot index within a page
pub type SlotId = u16;

/// Globally identifies one fixed-size page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, Serialize, Deserialize)]
pub struct PageId {
    pub table_id: TableId,
    pub page_number: PageNumber,
}

impl PageId {
    pub fn new(table_id: TableId, page_number: PageNumber) -> Self {
        PageId {
            table_id,
            page_number,
        }
    }

    /// Byte offset of this page inside its table file
    pub fn offset(&self, page_size: usize) -> u64 {
        self.page_number as u64 * page_size as u64
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}:{}", self.table_id, self.page_number)
    }
}

/// Stable tuple address. Deleting the slot invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, Serialize, Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        RecordId { page_id, slot_id }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.page_id, self.slot_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offset() {
        let pid = PageId::new(7, 3);
        assert_eq!(pid.offset(4096), 3 * 4096);
        assert_eq!(PageId::new(7, 0).offset(13), 0);
    }
}
