#![cfg_attr(not(feature = "std"), no_std)]

pub mod policy;
pub mod pricing;

pub use policy::*;
pub use pricing::*;

/// Balance type shared by every ledger the guard reads from
pub type Balance = u128;
