use std::ops::Range;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::storage::base::{PageId, RecordId, SlotId};
use crate::transaction::TransactionId;
use crate::types::{Tuple, TupleDesc};

/// Tuple slots that fit in one page: each slot costs its tuple bits plus one
/// occupancy bit in the header.
pub fn slots_per_page(page_size: usize, td: &TupleDesc) -> usize {
    (page_size * 8) / (td.byte_size() * 8 + 1)
}

/// Bytes of the occupancy bitmap for `num_slots` slots
pub fn header_size(num_slots: usize) -> usize {
    num_slots.div_ceil(8)
}

/// All-zero page: empty bitmap, no live tuples
pub fn empty_page_data(page_size: usize) -> Vec<u8> {
    vec![0u8; page_size]
}

/// Decoded view of one heap page.
///
/// Layout: `[bitmap: ceil(slots / 8) bytes][slot 0]..[slot n-1][padding]`.
/// Bit `i % 8` of bitmap byte `i / 8` is set when slot `i` holds a tuple.
/// The raw bytes are kept as-is, so a deleted slot keeps its old contents
/// until an insert reuses it.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    td: Arc<TupleDesc>,
    data: Vec<u8>,
    num_slots: usize,
    dirtier: Option<TransactionId>,
}

impl HeapPage {
    /// Wrap `data` (exactly one page) as a heap page of `td` tuples
    pub fn new(pid: PageId, data: Vec<u8>, td: Arc<TupleDesc>) -> Result<Self> {
        let num_slots = slots_per_page(data.len(), &td);
        if num_slots == 0 {
            return Err(Error::Storage(format!(
                "tuple width {} does not fit in a {} byte page",
                td.byte_size(),
                data.len()
            )));
        }
        if num_slots > SlotId::MAX as usize {
            return Err(Error::Storage(format!(
                "{} slots per page exceeds the slot id range",
                num_slots
            )));
        }
        Ok(HeapPage {
            pid,
            td,
            data,
            num_slots,
            dirtier: None,
        })
    }

    pub fn id(&self) -> PageId {
        self.pid
    }

    pub fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.num_slots && (self.data[slot / 8] >> (slot % 8)) & 1 == 1
    }

    fn set_slot_used(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.data[slot / 8] |= mask;
        } else {
            self.data[slot / 8] &= !mask;
        }
    }

    fn slot_range(&self, slot: usize) -> Range<usize> {
        let width = self.td.byte_size();
        let start = header_size(self.num_slots) + slot * width;
        start..start + width
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots).filter(|&i| !self.is_slot_used(i)).count()
    }

    /// First occupied slot at or after `from`
    pub fn next_used_slot(&self, from: usize) -> Option<usize> {
        (from..self.num_slots).find(|&i| self.is_slot_used(i))
    }

    /// Copy of the tuple in `slot`, tagged with its record id; `None` if the slot is free
    pub fn tuple(&self, slot: usize) -> Result<Option<Tuple>> {
        if !self.is_slot_used(slot) {
            return Ok(None);
        }
        let tuple = self.td.parse_tuple(&self.data[self.slot_range(slot)])?;
        Ok(Some(tuple.with_record_id(RecordId::new(self.pid, slot as SlotId))))
    }

    /// Live tuples in increasing slot order
    pub fn tuples(&self) -> impl Iterator<Item = Result<Tuple>> + '_ {
        (0..self.num_slots).filter_map(move |slot| self.tuple(slot).transpose())
    }

    /// Write `tuple` into the first free slot and return its new address
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> Result<RecordId> {
        if !tuple.conforms_to(&self.td) {
            return Err(Error::Storage(format!(
                "tuple does not match page schema [{}]",
                self.td
            )));
        }
        let slot = (0..self.num_slots)
            .find(|&i| !self.is_slot_used(i))
            .ok_or_else(|| Error::Storage(format!("page {} has no empty slot", self.pid)))?;
        let range = self.slot_range(slot);
        tuple.serialize_into(&mut self.data[range])?;
        self.set_slot_used(slot, true);
        Ok(RecordId::new(self.pid, slot as SlotId))
    }

    /// Clear the occupancy bit of the slot `tuple` was read from
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| Error::Storage("tuple has no record id".to_string()))?;
        if rid.page_id != self.pid {
            return Err(Error::Storage(format!(
                "record {} is not on page {}",
                rid, self.pid
            )));
        }
        let slot = rid.slot_id as usize;
        if !self.is_slot_used(slot) {
            return Err(Error::Storage(format!("slot {} is already empty", rid)));
        }
        self.set_slot_used(slot, false);
        Ok(())
    }

    /// Exact on-disk bytes of this page
    pub fn page_data(&self) -> &[u8] {
        &self.data
    }

    pub fn mark_dirty(&mut self, tx: Option<TransactionId>) {
        self.dirtier = tx;
    }

    /// Transaction that last dirtied this page, if it has unflushed changes
    pub fn dirtier(&self) -> Option<TransactionId> {
        self.dirtier
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtier.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, Type};

    fn int_desc() -> Arc<TupleDesc> {
        Arc::new(TupleDesc::from_types(vec![Type::Int]))
    }

    fn int_tuple(n: i32) -> Tuple {
        Tuple::new(vec![Field::Int(n)])
    }

    #[test]
    fn test_slot_math() {
        let td = TupleDesc::from_types(vec![Type::Int, Type::Int]);
        // 4096 * 8 / (64 + 1)
        assert_eq!(slots_per_page(4096, &td), 504);
        assert_eq!(header_size(504), 63);
        assert_eq!(slots_per_page(13, &TupleDesc::from_types(vec![Type::Int])), 3);
    }

    #[test]
    fn test_empty_page_has_no_tuples() {
        let page = HeapPage::new(PageId::new(1, 0), empty_page_data(4096), int_desc()).unwrap();
        assert_eq!(page.num_empty_slots(), page.num_slots());
        assert_eq!(page.tuples().count(), 0);
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_insert_then_read_back() {
        let mut page = HeapPage::new(PageId::new(1, 0), empty_page_data(64), int_desc()).unwrap();
        let before = page.num_empty_slots();
        let rid = page.insert_tuple(&int_tuple(42)).unwrap();
        assert_eq!(page.num_empty_slots(), before - 1);
        let read = page.tuple(rid.slot_id as usize).unwrap().unwrap();
        assert_eq!(read, int_tuple(42));
        assert_eq!(read.record_id(), Some(rid));
    }

    #[test]
    fn test_delete_clears_bit_but_keeps_bytes() {
        let mut page = HeapPage::new(PageId::new(1, 0), empty_page_data(64), int_desc()).unwrap();
        let rid = page.insert_tuple(&int_tuple(7)).unwrap();
        let stored = page.tuple(rid.slot_id as usize).unwrap().unwrap();
        let bytes_before = page.page_data()[page.slot_range(0)].to_vec();

        page.delete_tuple(&stored).unwrap();
        assert!(!page.is_slot_used(0));
        assert_eq!(page.page_data()[page.slot_range(0)], bytes_before[..]);

        let err = page.delete_tuple(&stored).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_insert_into_full_page_fails() {
        let mut page = HeapPage::new(PageId::new(1, 0), empty_page_data(13), int_desc()).unwrap();
        for i in 0..3 {
            page.insert_tuple(&int_tuple(i)).unwrap();
        }
        assert_eq!(page.num_empty_slots(), 0);
        assert!(page.insert_tuple(&int_tuple(3)).is_err());
    }

    #[test]
    fn test_insert_rejects_wrong_schema() {
        let mut page = HeapPage::new(PageId::new(1, 0), empty_page_data(64), int_desc()).unwrap();
        let bad = Tuple::new(vec![Field::String("x".into())]);
        assert!(matches!(page.insert_tuple(&bad), Err(Error::Storage(_))));
    }

    #[test]
    fn test_bitmap_bit_order() {
        let mut page = HeapPage::new(PageId::new(1, 0), empty_page_data(128), int_desc()).unwrap();
        for i in 0..9 {
            page.insert_tuple(&int_tuple(i)).unwrap();
        }
        assert_eq!(page.page_data()[0], 0xff);
        assert_eq!(page.page_data()[1], 0x01);
    }

    #[test]
    fn test_delete_from_other_page_rejected() {
        let mut page = HeapPage::new(PageId::new(1, 0), empty_page_data(64), int_desc()).unwrap();
        page.insert_tuple(&int_tuple(1)).unwrap();
        let foreign = int_tuple(1).with_record_id(RecordId::new(PageId::new(1, 5), 0));
        assert!(matches!(page.delete_tuple(&foreign), Err(Error::Storage(_))));
    }
}
