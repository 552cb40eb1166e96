//! Adapter traits for the capital guard
//!
//! The pallet never touches tokens or protocols directly. Reads go through the ledger and oracle
//! adapters, and every mutation of custody funds is a `RelayCall` executed by the custody relay.

use alloc::vec::Vec;
use frame::prelude::*;
use primitives::{Balance, PriceRound};

/// Price feeds keyed by the configured source and the priced asset
pub trait PriceOracle<AccountId> {
  fn latest_round(source: &AccountId, asset: &AccountId) -> Option<PriceRound>;

  fn decimals(source: &AccountId, asset: &AccountId) -> Option<u8>;
}

/// Fungible token reads
pub trait TokenLedger<AccountId> {
  fn balance_of(token: &AccountId, who: &AccountId) -> Balance;

  fn allowance(token: &AccountId, owner: &AccountId, spender: &AccountId) -> Balance;

  fn decimals(token: &AccountId) -> Option<u8>;
}

/// Protocol-specific position reads.
///
/// Which method applies is decided by the `ProtocolKind` registered for the protocol.
pub trait ProtocolLedger<AccountId> {
  /// Asset a position is denominated in (vault asset, receipt underlying or market base)
  fn underlying_asset(protocol: &AccountId) -> Option<AccountId>;

  /// Underlying assets redeemable for `shares` of a share vault
  fn convert_to_assets(vault: &AccountId, shares: Balance) -> Option<Balance>;

  /// Interest-inclusive base balance of `holder` in a lending market
  fn base_balance(market: &AccountId, holder: &AccountId) -> Balance;
}

/// Call executed on behalf of the custody account
#[derive(Clone, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub enum RelayCall<AccountId> {
  /// Set the custody allowance of `spender` over `token` to exactly `amount`
  Approve {
    token: AccountId,
    spender: AccountId,
    amount: Balance,
  },
  Deposit {
    target: AccountId,
    asset: AccountId,
    amount: Balance,
  },
  /// Redeem `amount` of underlying from `target` back into custody
  Withdraw { target: AccountId, amount: Balance },
  Transfer {
    token: AccountId,
    to: AccountId,
    amount: Balance,
  },
  /// Opaque payload forwarded to `target`
  Raw { target: AccountId, data: Vec<u8> },
}

/// Executes calls as the custody account
pub trait CustodyRelay<AccountId> {
  fn relay(custody: &AccountId, call: &RelayCall<AccountId>) -> DispatchResult;
}

/// No-op oracle: every asset is unpriced.
impl<AccountId> PriceOracle<AccountId> for () {
  fn latest_round(_: &AccountId, _: &AccountId) -> Option<PriceRound> {
    None
  }

  fn decimals(_: &AccountId, _: &AccountId) -> Option<u8> {
    None
  }
}

impl<AccountId> TokenLedger<AccountId> for () {
  fn balance_of(_: &AccountId, _: &AccountId) -> Balance {
    0
  }

  fn allowance(_: &AccountId, _: &AccountId, _: &AccountId) -> Balance {
    0
  }

  fn decimals(_: &AccountId) -> Option<u8> {
    None
  }
}

impl<AccountId> ProtocolLedger<AccountId> for () {
  fn underlying_asset(_: &AccountId) -> Option<AccountId> {
    None
  }

  fn convert_to_assets(_: &AccountId, _: Balance) -> Option<Balance> {
    None
  }

  fn base_balance(_: &AccountId, _: &AccountId) -> Balance {
    0
  }
}

/// Relay that refuses every call.
impl<AccountId> CustodyRelay<AccountId> for () {
  fn relay(_: &AccountId, _: &RelayCall<AccountId>) -> DispatchResult {
    Err(DispatchError::Other("custody relay not configured"))
  }
}
