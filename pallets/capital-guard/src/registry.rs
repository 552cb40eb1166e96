//! Tracked asset and protocol sets.
//!
//! Each class is a bounded vector plus a position index, so membership is a single index read and
//! removal swaps the last element into the vacated slot.

use crate::pallet::{Config, Error, Pallet, TrackedIndex, TrackedSets};
use alloc::vec::Vec;
use frame::prelude::*;
use primitives::SubjectClass;

impl<T: Config> Pallet<T> {
  pub fn is_tracked(class: SubjectClass, subject: &T::AccountId) -> bool {
    TrackedIndex::<T>::contains_key(class, subject)
  }

  pub fn tracked(class: SubjectClass) -> Vec<T::AccountId> {
    TrackedSets::<T>::get(class).into_inner()
  }

  pub fn tracked_assets() -> Vec<T::AccountId> {
    Self::tracked(SubjectClass::Asset)
  }

  pub fn tracked_protocols() -> Vec<T::AccountId> {
    Self::tracked(SubjectClass::Protocol)
  }

  pub(crate) fn track(class: SubjectClass, subject: T::AccountId) -> Result<(), Error<T>> {
    ensure!(!Self::is_tracked(class, &subject), Error::<T>::AlreadyTracked);
    TrackedSets::<T>::try_mutate(class, |set| -> Result<(), Error<T>> {
      let position = set.len() as u32;
      set
        .try_push(subject.clone())
        .map_err(|_| Error::<T>::TooManyTrackedSubjects)?;
      TrackedIndex::<T>::insert(class, &subject, position);
      Ok(())
    })
  }

  pub(crate) fn untrack(class: SubjectClass, subject: &T::AccountId) -> Result<(), Error<T>> {
    let position = TrackedIndex::<T>::take(class, subject).ok_or(Error::<T>::NotTracked)? as usize;
    TrackedSets::<T>::mutate(class, |set| {
      if position < set.len() {
        set.swap_remove(position);
        if let Some(moved) = set.get(position) {
          TrackedIndex::<T>::insert(class, moved, position as u32);
        }
      }
    });
    Ok(())
  }
}
