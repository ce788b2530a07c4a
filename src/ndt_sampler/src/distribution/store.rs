//! Dense per-voxel distribution storage with per-slot locking.

use parking_lot::{Mutex, MutexGuard};

use super::NormalDistribution;

/// One [`NormalDistribution`] per grid cell, indexed by flattened voxel index.
///
/// Every slot carries its own lock: concurrent folds into different voxels
/// proceed in parallel, folds into the same voxel are serialized.
#[derive(Debug)]
pub struct DistributionStore {
    slots: Vec<Mutex<NormalDistribution>>,
    num_classes: u16,
}

impl DistributionStore {
    /// Allocate `num_cells` empty slots.
    pub fn new(num_cells: usize, num_classes: u16) -> Self {
        let slots = (0..num_cells)
            .map(|_| Mutex::new(NormalDistribution::default()))
            .collect();

        Self { slots, num_classes }
    }

    /// Number of slots (grid cells).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the store has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Label count the class histograms were sized for.
    pub fn num_classes(&self) -> u16 {
        self.num_classes
    }

    /// Fold a point into the slot at `index`, blocking while another thread
    /// holds that slot.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    pub(crate) fn fold_point(&self, index: usize, point: &[f32; 3], label: Option<u16>) {
        self.slots[index]
            .lock()
            .fold(index, point, label, self.num_classes);
    }

    /// Lock the slot at `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    pub(crate) fn slot(&self, index: usize) -> MutexGuard<'_, NormalDistribution> {
        self.slots[index].lock()
    }

    /// Whether the slot at `index` holds a valid distribution.
    pub fn is_valid(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .is_some_and(|slot| slot.lock().is_valid())
    }

    /// Number of valid distributions.
    pub fn num_valid(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.lock().is_valid())
            .count()
    }

    /// Flattened indices of the valid distributions, ascending.
    pub fn valid_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.lock().is_valid())
            .map(|(index, _)| index)
            .collect()
    }

    /// Copy of the distribution at `index`.
    pub fn snapshot(&self, index: usize) -> Option<NormalDistribution> {
        self.slots.get(index).map(|slot| slot.lock().clone())
    }

    /// Tombstone the distribution at `index`. Returns whether it was valid.
    ///
    /// Requires exclusive access, which serializes removal against readers.
    pub fn remove(&mut self, index: usize) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                let nd = slot.get_mut();
                let was_valid = nd.is_valid();
                nd.clear();
                was_valid
            }
            None => false,
        }
    }

    /// Tombstone every distribution.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.get_mut().clear();
        }
    }
}
