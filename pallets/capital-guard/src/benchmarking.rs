#![cfg(feature = "runtime-benchmarks")]

extern crate alloc;

use crate::*;
use alloc::vec::Vec;
use frame::prelude::*;
use polkadot_sdk::frame_benchmarking::{account, v2::*};
use polkadot_sdk::frame_system::RawOrigin;
use primitives::{ProtocolKind, Role, SubjectClass};

#[benchmarks]
mod benches {
  use super::*;

  fn bind_owner<T: Config>() -> T::AccountId {
    let owner: T::AccountId = whitelisted_caller();
    Custody::<T>::put(&owner);
    owner
  }

  /// Fills every tracked slot but the last so the next insert hits the bound check
  fn prefill_tracked<T: Config>(class: SubjectClass) -> u32 {
    let free = T::MaxTrackedSubjects::get().saturating_sub(1);
    for i in 0..free {
      let subject: T::AccountId = account("tracked", i, 0);
      Pallet::<T>::track(class, subject).expect("below MaxTrackedSubjects");
    }
    free
  }

  #[benchmark]
  fn force_set_custody() {
    let owner: T::AccountId = account("owner", 0, 0);
    #[extrinsic_call]
    force_set_custody(RawOrigin::Root, owner.clone());
    assert_eq!(Custody::<T>::get(), Some(owner));
  }

  #[benchmark]
  fn grant_role() {
    let owner = bind_owner::<T>();
    let principal: T::AccountId = account("principal", 0, 0);
    #[extrinsic_call]
    grant_role(RawOrigin::Signed(owner), principal.clone(), Role::Execute);
    assert!(Pallet::<T>::has_role(&principal, Role::Execute));
  }

  #[benchmark]
  fn revoke_role() {
    let owner = bind_owner::<T>();
    let principal: T::AccountId = account("principal", 0, 0);
    Roles::<T>::insert(&principal, Role::Execute, true);
    #[extrinsic_call]
    revoke_role(RawOrigin::Signed(owner), principal.clone(), Role::Execute);
    assert!(!Pallet::<T>::has_role(&principal, Role::Execute));
  }

  #[benchmark]
  fn set_allowed(n: Linear<1, { T::MaxBatchTargets::get() }>) {
    let owner = bind_owner::<T>();
    let principal: T::AccountId = account("principal", 0, 0);
    let targets: Vec<T::AccountId> = (0..n).map(|i| account("target", i, 0)).collect();
    let last = targets.last().cloned().expect("n >= 1");
    let targets = BoundedVec::try_from(targets).expect("n <= MaxBatchTargets");
    #[extrinsic_call]
    set_allowed(RawOrigin::Signed(owner), principal.clone(), targets, true);
    assert!(Pallet::<T>::is_allowed(&principal, &last));
  }

  #[benchmark]
  fn set_limits() {
    let owner = bind_owner::<T>();
    let principal: T::AccountId = account("principal", 0, 0);
    let window = T::MinWindowDuration::get();
    #[extrinsic_call]
    set_limits(RawOrigin::Signed(owner), principal.clone(), 1_000, 500, 500, window);
    assert!(Pallet::<T>::limits_of(&principal).configured);
  }

  #[benchmark]
  fn add_tracked() {
    let owner = bind_owner::<T>();
    let expected_index = prefill_tracked::<T>(SubjectClass::Protocol);
    let subject: T::AccountId = account("subject", 0, 0);
    #[extrinsic_call]
    add_tracked(RawOrigin::Signed(owner), SubjectClass::Protocol, subject.clone());
    assert_eq!(
      TrackedIndex::<T>::get(SubjectClass::Protocol, &subject),
      Some(expected_index)
    );
  }

  #[benchmark]
  fn remove_tracked() {
    let owner = bind_owner::<T>();
    prefill_tracked::<T>(SubjectClass::Protocol);
    let subject: T::AccountId = account("tracked", 0, 0);
    #[extrinsic_call]
    remove_tracked(RawOrigin::Signed(owner), SubjectClass::Protocol, subject.clone());
    assert!(!Pallet::<T>::is_tracked(SubjectClass::Protocol, &subject));
  }

  #[benchmark]
  fn set_protocol_kind() {
    let owner = bind_owner::<T>();
    let protocol: T::AccountId = account("protocol", 0, 0);
    #[extrinsic_call]
    set_protocol_kind(
      RawOrigin::Signed(owner),
      protocol.clone(),
      Some(ProtocolKind::ShareVault),
    );
    assert_eq!(ProtocolKinds::<T>::get(&protocol), Some(ProtocolKind::ShareVault));
  }

  #[benchmark]
  fn set_price_source() {
    let owner = bind_owner::<T>();
    let source: T::AccountId = account("oracle", 0, 0);
    #[extrinsic_call]
    set_price_source(RawOrigin::Signed(owner), source.clone());
    assert_eq!(PriceSource::<T>::get(), Some(source));
  }

  #[benchmark]
  fn set_paused() {
    let owner = bind_owner::<T>();
    #[extrinsic_call]
    set_paused(RawOrigin::Signed(owner), true);
    assert!(Paused::<T>::get());
  }

  #[cfg(test)]
  use crate::mock::{Test, new_test_ext};
  #[cfg(test)]
  impl_benchmark_test_suite!(Pallet, new_test_ext(), Test);
}
