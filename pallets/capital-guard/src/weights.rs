#![cfg_attr(rustfmt, rustfmt_skip)]
#![allow(unused_parens)]
#![allow(unused_imports)]
#![allow(missing_docs)]

use core::marker::PhantomData;
use polkadot_sdk::frame_support::{
  traits::Get,
  weights::{constants::RocksDbWeight, Weight},
};

pub trait WeightInfo {
  fn force_set_custody() -> Weight;
  fn grant_role() -> Weight;
  fn revoke_role() -> Weight;
  fn set_allowed(targets: u32) -> Weight;
  fn set_limits() -> Weight;
  fn add_tracked() -> Weight;
  fn remove_tracked() -> Weight;
  fn set_protocol_kind() -> Weight;
  fn set_price_source() -> Weight;
  fn set_paused() -> Weight;
  fn deposit() -> Weight;
  fn withdraw() -> Weight;
  fn transfer() -> Weight;
  fn approve_protocol() -> Weight;
  fn execute(len: u32) -> Weight;
}

pub struct SubstrateWeight<T>(PhantomData<T>);
impl<T: polkadot_sdk::frame_system::Config + crate::Config> WeightInfo for SubstrateWeight<T> {
  fn force_set_custody() -> Weight {
    Weight::from_parts(12_000_000, 500)
      .saturating_add(T::DbWeight::get().writes(1))
  }

  fn grant_role() -> Weight {
    Weight::from_parts(15_000_000, 800)
      .saturating_add(T::DbWeight::get().reads(1))
      .saturating_add(T::DbWeight::get().writes(1))
  }

  fn revoke_role() -> Weight {
    Weight::from_parts(15_000_000, 800)
      .saturating_add(T::DbWeight::get().reads(1))
      .saturating_add(T::DbWeight::get().writes(1))
  }

  fn set_allowed(targets: u32) -> Weight {
    Weight::from_parts(14_000_000, 800)
      .saturating_add(Weight::from_parts(4_000_000, 600).saturating_mul(targets.into()))
      .saturating_add(T::DbWeight::get().reads(1))
      .saturating_add(T::DbWeight::get().writes(targets.into()))
  }

  fn set_limits() -> Weight {
    Weight::from_parts(16_000_000, 900)
      .saturating_add(T::DbWeight::get().reads(1))
      .saturating_add(T::DbWeight::get().writes(1))
  }

  fn add_tracked() -> Weight {
    Weight::from_parts(20_000_000, 2_500)
      .saturating_add(T::DbWeight::get().reads(3))
      .saturating_add(T::DbWeight::get().writes(2))
  }

  fn remove_tracked() -> Weight {
    Weight::from_parts(22_000_000, 2_500)
      .saturating_add(T::DbWeight::get().reads(3))
      .saturating_add(T::DbWeight::get().writes(3))
  }

  fn set_protocol_kind() -> Weight {
    Weight::from_parts(14_000_000, 700)
      .saturating_add(T::DbWeight::get().reads(1))
      .saturating_add(T::DbWeight::get().writes(1))
  }

  fn set_price_source() -> Weight {
    Weight::from_parts(13_000_000, 600)
      .saturating_add(T::DbWeight::get().reads(1))
      .saturating_add(T::DbWeight::get().writes(1))
  }

  fn set_paused() -> Weight {
    Weight::from_parts(12_000_000, 500)
      .saturating_add(T::DbWeight::get().reads(1))
      .saturating_add(T::DbWeight::get().writes(1))
  }

  fn deposit() -> Weight {
    Weight::from_parts(60_000_000, 6_000)
      .saturating_add(T::DbWeight::get().reads(12))
      .saturating_add(T::DbWeight::get().writes(3))
  }

  fn withdraw() -> Weight {
    Weight::from_parts(55_000_000, 6_000)
      .saturating_add(T::DbWeight::get().reads(12))
      .saturating_add(T::DbWeight::get().writes(3))
  }

  fn transfer() -> Weight {
    Weight::from_parts(45_000_000, 5_000)
      .saturating_add(T::DbWeight::get().reads(10))
      .saturating_add(T::DbWeight::get().writes(3))
  }

  fn approve_protocol() -> Weight {
    let scan = u64::from(T::MaxTrackedSubjects::get()).saturating_mul(2);
    Weight::from_parts(50_000_000, 6_000)
      .saturating_add(T::DbWeight::get().reads(scan.saturating_mul(3).saturating_add(10)))
      .saturating_add(T::DbWeight::get().writes(3))
  }

  fn execute(len: u32) -> Weight {
    let scan = u64::from(T::MaxTrackedSubjects::get()).saturating_mul(2);
    Weight::from_parts(70_000_000, 6_000)
      .saturating_add(Weight::from_parts(2_000, 1).saturating_mul(len.into()))
      .saturating_add(T::DbWeight::get().reads(scan.saturating_mul(6).saturating_add(10)))
      .saturating_add(T::DbWeight::get().writes(3))
  }

}

impl WeightInfo for () {
  fn force_set_custody() -> Weight { Weight::from_parts(12_000_000, 500) }
  fn grant_role() -> Weight { Weight::from_parts(15_000_000, 800) }
  fn revoke_role() -> Weight { Weight::from_parts(15_000_000, 800) }
  fn set_allowed(targets: u32) -> Weight {
    Weight::from_parts(14_000_000, 800)
      .saturating_add(Weight::from_parts(4_000_000, 600).saturating_mul(targets.into()))
  }
  fn set_limits() -> Weight { Weight::from_parts(16_000_000, 900) }
  fn add_tracked() -> Weight { Weight::from_parts(20_000_000, 2500) }
  fn remove_tracked() -> Weight { Weight::from_parts(22_000_000, 2500) }
  fn set_protocol_kind() -> Weight { Weight::from_parts(14_000_000, 700) }
  fn set_price_source() -> Weight { Weight::from_parts(13_000_000, 600) }
  fn set_paused() -> Weight { Weight::from_parts(12_000_000, 500) }
  fn deposit() -> Weight { Weight::from_parts(60_000_000, 6000) }
  fn withdraw() -> Weight { Weight::from_parts(55_000_000, 6000) }
  fn transfer() -> Weight { Weight::from_parts(45_000_000, 5000) }
  fn approve_protocol() -> Weight { Weight::from_parts(50_000_000, 6000) }
  fn execute(len: u32) -> Weight {
    Weight::from_parts(70_000_000, 6000)
      .saturating_add(Weight::from_parts(2_000, 1).saturating_mul(len.into()))
  }
}
