use std::array;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

use crate::consts::SLOT_MAX;
use crate::error::fatal;
use crate::table::TableSpec;

// -----------------------------------------------------------------------------
// Slot State
// -----------------------------------------------------------------------------

/// One registry entry.
///
/// A slot moves `Vacant -> Active -> Retiring -> Vacant`. Creation hooks
/// provision `Active` slots only, so a slot being torn down never gains a
/// new table.
pub(crate) enum SlotState<I> {
  Vacant,
  Active { class: u64, spec: TableSpec<I> },
  Retiring { class: u64 },
}

impl<I> Debug for SlotState<I> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    match self {
      Self::Vacant => f.write_str("Vacant"),
      Self::Active { class, spec } => f
        .debug_struct("Active")
        .field("class", class)
        .field("spec", spec)
        .finish(),
      Self::Retiring { class } => f.debug_struct("Retiring").field("class", class).finish(),
    }
  }
}

// -----------------------------------------------------------------------------
// Slot Registry
// -----------------------------------------------------------------------------

/// Fixed-size table of property-class slots.
///
/// Mutated only by registration and unregistration, which are serialised by
/// the storage's lifecycle lock.
pub(crate) struct SlotRegistry<I> {
  slots: [SlotState<I>; SLOT_MAX],
}

impl<I> SlotRegistry<I> {
  #[inline]
  pub(crate) fn new() -> Self {
    Self {
      slots: array::from_fn(|_| SlotState::Vacant),
    }
  }

  /// Claims the first vacant slot for `class`.
  ///
  /// Returns `None` if every slot is taken.
  pub(crate) fn reserve(&mut self, class: u64, spec: TableSpec<I>) -> Option<usize> {
    let index: usize = self
      .slots
      .iter()
      .position(|slot| matches!(slot, SlotState::Vacant))?;

    self.slots[index] = SlotState::Active { class, spec };

    Some(index)
  }

  /// Marks an active slot as being torn down.
  pub(crate) fn retire(&mut self, index: usize, class: u64) {
    match self.slots.get(index) {
      Some(SlotState::Active { class: owner, .. }) if *owner == class => {}
      _ => fatal!("unregistering a class that does not own its slot"),
    }

    self.slots[index] = SlotState::Retiring { class };
  }

  /// Releases a retired slot for reuse.
  pub(crate) fn vacate(&mut self, index: usize, class: u64) {
    match self.slots.get(index) {
      Some(SlotState::Retiring { class: owner }) if *owner == class => {}
      _ => fatal!("releasing a slot that was not retired"),
    }

    self.slots[index] = SlotState::Vacant;
  }

  /// Returns the table spec of the class occupying `index`, if active.
  #[inline]
  pub(crate) fn spec(&self, index: usize) -> Option<TableSpec<I>> {
    match self.slots.get(index) {
      Some(SlotState::Active { spec, .. }) => Some(*spec),
      _ => None,
    }
  }

  /// Iterates over the active slots and their table specs.
  pub(crate) fn active(&self) -> impl Iterator<Item = (usize, TableSpec<I>)> + '_ {
    self
      .slots
      .iter()
      .enumerate()
      .filter_map(|(index, slot)| match slot {
        SlotState::Active { spec, .. } => Some((index, *spec)),
        _ => None,
      })
  }

  /// Returns the number of active slots.
  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.active().count()
  }
}

impl<I> Debug for SlotRegistry<I> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_list().entries(self.slots.iter()).finish()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(all(test, not(loom)))]
mod tests {
  use super::*;

  fn spec(capacity: usize) -> TableSpec<u64> {
    TableSpec::new(capacity).unwrap()
  }

  #[test]
  fn test_reserve_first_vacant() {
    let mut registry: SlotRegistry<u64> = SlotRegistry::new();

    assert_eq!(registry.reserve(1, spec(4)), Some(0));
    assert_eq!(registry.reserve(2, spec(2)), Some(1));
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.spec(1).map(|spec| spec.capacity()), Some(2));
  }

  #[test]
  fn test_reserve_exhausted() {
    let mut registry: SlotRegistry<u64> = SlotRegistry::new();

    for class in 0..SLOT_MAX as u64 {
      assert!(registry.reserve(class, spec(1)).is_some());
    }

    assert_eq!(registry.reserve(SLOT_MAX as u64, spec(1)), None);
  }

  #[test]
  fn test_retire_hides_slot() {
    let mut registry: SlotRegistry<u64> = SlotRegistry::new();
    let index: usize = registry.reserve(7, spec(4)).unwrap();

    registry.retire(index, 7);

    assert_eq!(registry.spec(index), None);
    assert_eq!(registry.active().count(), 0);

    // A retiring slot is not yet reusable.
    assert_eq!(registry.reserve(8, spec(1)), Some(index + 1));
  }

  #[test]
  fn test_vacate_allows_reuse() {
    let mut registry: SlotRegistry<u64> = SlotRegistry::new();
    let index: usize = registry.reserve(1, spec(4)).unwrap();

    registry.retire(index, 1);
    registry.vacate(index, 1);

    assert_eq!(registry.reserve(2, spec(2)), Some(index));
    assert_eq!(registry.spec(index).map(|spec| spec.capacity()), Some(2));
  }
}
