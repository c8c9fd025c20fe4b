use std::sync::Arc;

use crate::common::{DbError, PageID, RecordID, Result, TransactionID};
use crate::tuple::{Tuple, TupleDesc};

/// One fixed-size page of a heap file.
///
/// Layout: an occupancy bitmap of `header_size(num_slots)` bytes (slot `i`
/// is bit `i % 8` of byte `i / 8`), followed by `num_slots` fixed-width
/// tuple records. Bytes past the last slot are zero.
#[derive(Debug, Clone)]
pub struct HeapPage {
    page_id: PageID,
    desc: Arc<TupleDesc>,
    page_size: usize,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    dirtier: Option<TransactionID>,
    before_image: Option<Vec<u8>>,
}

impl HeapPage {
    pub fn slots_per_page(page_size: usize, tuple_size: usize) -> usize {
        (page_size * 8) / (tuple_size * 8 + 1)
    }

    pub fn header_size(num_slots: usize) -> usize {
        (num_slots + 7) / 8
    }

    /// Bytes of a page with every slot free.
    pub fn empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0; page_size]
    }

    pub fn new_empty(page_id: PageID, desc: Arc<TupleDesc>, page_size: usize) -> Result<Self> {
        Self::from_bytes(page_id, desc, &Self::empty_page_data(page_size))
    }

    /// Decodes a page. The page size is the length of `data`.
    pub fn from_bytes(page_id: PageID, desc: Arc<TupleDesc>, data: &[u8]) -> Result<Self> {
        let page_size = data.len();
        let tuple_size = desc.byte_size();
        if tuple_size == 0 {
            return Err(DbError::SchemaMismatch("tuple has no fields".to_string()));
        }
        let num_slots = Self::slots_per_page(page_size, tuple_size);
        if num_slots == 0 {
            return Err(DbError::MalformedPage {
                page_id,
                reason: format!("{} byte page cannot hold a {} byte tuple", page_size, tuple_size),
            });
        }

        let header_len = Self::header_size(num_slots);
        let header = data[..header_len].to_vec();
        let mut tuples = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if header[slot / 8] & (1 << (slot % 8)) == 0 {
                tuples.push(None);
                continue;
            }
            let start = header_len + slot * tuple_size;
            let mut tuple = Tuple::parse(Arc::clone(&desc), &data[start..start + tuple_size])
                .ok_or_else(|| DbError::MalformedPage {
                    page_id,
                    reason: format!("slot {} does not decode as {}", slot, desc),
                })?;
            tuple.set_record_id(Some(RecordID::new(page_id, slot)));
            tuples.push(Some(tuple));
        }

        Ok(Self {
            page_id,
            desc,
            page_size,
            header,
            tuples,
            dirtier: None,
            before_image: None,
        })
    }

    /// Encodes the page back into exactly `page_size` bytes.
    pub fn page_data(&self) -> Vec<u8> {
        let mut data = vec![0u8; self.page_size];
        let header_len = self.header.len();
        let tuple_size = self.desc.byte_size();

        data[..header_len].copy_from_slice(&self.header);
        for (slot, tuple) in self.tuples.iter().enumerate() {
            if let Some(tuple) = tuple {
                let start = header_len + slot * tuple_size;
                tuple.serialize_into(&mut data[start..start + tuple_size]);
            }
        }
        data
    }

    pub fn id(&self) -> PageID {
        self.page_id
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn num_slots(&self) -> usize {
        self.tuples.len()
    }

    pub fn num_empty_slots(&self) -> usize {
        self.tuples.iter().filter(|t| t.is_none()).count()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.tuples.len() && self.header[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot(&mut self, slot: usize, used: bool) {
        if used {
            self.header[slot / 8] |= 1 << (slot % 8);
        } else {
            self.header[slot / 8] &= !(1 << (slot % 8));
        }
    }

    /// Stores `tuple` in the first free slot and stamps its record id.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> Result<RecordID> {
        if tuple.tuple_desc().as_ref() != self.desc.as_ref() {
            return Err(DbError::SchemaMismatch(format!(
                "tuple {} does not match page schema {}",
                tuple.tuple_desc(),
                self.desc
            )));
        }
        let slot = self
            .tuples
            .iter()
            .position(|t| t.is_none())
            .ok_or(DbError::PageFull(self.page_id))?;

        self.snapshot_if_clean();
        let record_id = RecordID::new(self.page_id, slot);
        tuple.set_record_id(Some(record_id));
        self.tuples[slot] = Some(tuple.clone());
        self.set_slot(slot, true);
        Ok(record_id)
    }

    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        if record_id.page_id != self.page_id {
            return Err(DbError::Other(format!(
                "tuple {} is not on {}",
                record_id, self.page_id
            )));
        }
        if record_id.slot >= self.tuples.len() {
            return Err(DbError::InvalidSlotIndex(record_id.slot));
        }
        if !self.is_slot_used(record_id.slot) {
            return Err(DbError::EmptySlot(record_id.slot));
        }

        self.snapshot_if_clean();
        self.tuples[record_id.slot] = None;
        self.set_slot(record_id.slot, false);
        Ok(())
    }

    pub fn tuple(&self, slot: usize) -> Result<&Tuple> {
        match self.tuples.get(slot) {
            Some(Some(tuple)) => Ok(tuple),
            Some(None) => Err(DbError::EmptySlot(slot)),
            None => Err(DbError::InvalidSlotIndex(slot)),
        }
    }

    /// Occupied tuples in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().flatten()
    }

    pub fn mark_dirty(&mut self, dirty: bool, tid: TransactionID) {
        if dirty {
            self.snapshot_if_clean();
            self.dirtier = Some(tid);
        } else {
            self.dirtier = None;
        }
    }

    /// The transaction that last dirtied this page, if it is dirty.
    pub fn dirtier(&self) -> Option<TransactionID> {
        self.dirtier
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtier.is_some()
    }

    /// Bytes of the page as of its last clean state.
    pub fn before_image(&self) -> Vec<u8> {
        match &self.before_image {
            Some(image) => image.clone(),
            None => self.page_data(),
        }
    }

    /// Forgets the snapshot; the next mutation captures a fresh one.
    pub fn set_before_image(&mut self) {
        self.before_image = None;
    }

    fn snapshot_if_clean(&mut self) {
        if self.dirtier.is_none() && self.before_image.is_none() {
            self.before_image = Some(self.page_data());
        }
    }
}
