use std::ops::Range;

/// Item storage addressed by global index.
///
/// A store covers a contiguous index range: `0..N` for the shared-memory
/// model, or one worker's own partition in the distributed model. Slots are
/// `None` until loaded, and go back to `None` when an item is skipped.
#[derive(Debug)]
pub struct ItemStore<T> {
    base: usize,
    slots: Vec<Option<T>>,
}

impl<T> ItemStore<T> {
    /// Empty store covering `0..len`
    pub fn new(len: usize) -> Self {
        Self::for_range(0..len)
    }

    /// Empty store covering exactly `range`
    pub fn for_range(range: Range<usize>) -> Self {
        let mut slots = Vec::with_capacity(range.len());
        slots.resize_with(range.len(), || None);
        Self {
            base: range.start,
            slots,
        }
    }

    pub(crate) fn from_slots(base: usize, slots: Vec<Option<T>>) -> Self {
        Self { base, slots }
    }

    pub(crate) fn into_slots(self) -> (usize, Vec<Option<T>>) {
        (self.base, self.slots)
    }

    /// Global indices covered by this store
    pub fn indices(&self) -> Range<usize> {
        self.base..self.base + self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn offset(&self, index: usize) -> Option<usize> {
        index
            .checked_sub(self.base)
            .filter(|offset| *offset < self.slots.len())
    }

    /// Mutable access to the slot for `index`, if the store covers it.
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut Option<T>> {
        let offset = self.offset(index)?;
        self.slots.get_mut(offset)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        let offset = self.offset(index)?;
        self.slots[offset].as_ref()
    }

    /// Stores `item` at `index`, returning it back if the index is not covered.
    pub fn insert(&mut self, index: usize, item: T) -> Result<(), T> {
        match self.slot_mut(index) {
            Some(slot) => {
                *slot = Some(item);
                Ok(())
            }
            None => Err(item),
        }
    }

    pub fn take(&mut self, index: usize) -> Option<T> {
        self.slot_mut(index)?.take()
    }

    pub fn is_loaded(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    pub fn loaded_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Loaded items with their global index
    pub fn iter_loaded(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        let base = self.base;
        self.slots
            .iter()
            .enumerate()
            .filter_map(move |(offset, slot)| slot.as_ref().map(|item| (base + offset, item)))
    }
}
