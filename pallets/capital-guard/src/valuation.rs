//! Oracle-priced valuation of custody holdings.
//!
//! Values are in 18-decimal reference units. A protocol position is priced in its underlying
//! asset after converting it to underlying units according to the registered `ProtocolKind`.

use crate::pallet::{Config, Custody, Error, Pallet, PriceSource, ProtocolKinds};
use crate::{PriceOracle, ProtocolLedger, TokenLedger};
use primitives::{reference_value, Balance, PricingError, ProtocolKind, SubjectClass};
use frame::prelude::Get;

impl<T: Config> Pallet<T> {
  fn pricing_error(err: PricingError) -> Error<T> {
    match err {
      PricingError::Stale => Error::<T>::StalePrice,
      PricingError::Invalid => Error::<T>::InvalidPrice,
      PricingError::Overflow => Error::<T>::ArithmeticOverflow,
    }
  }

  /// Reference value of `amount` units of `asset`.
  ///
  /// The price round is validated even for a zero amount, so an empty holding never hides a
  /// stale or broken feed.
  pub fn value_of(asset: &T::AccountId, amount: Balance) -> Result<Balance, Error<T>> {
    let source = PriceSource::<T>::get().ok_or(Error::<T>::OracleNotConfigured)?;
    let price = T::Oracle::latest_round(&source, asset)
      .ok_or(Error::<T>::InvalidPrice)?
      .validate(Self::now(), T::MaxPriceAge::get())
      .map_err(Self::pricing_error)?;
    if amount == 0 {
      return Ok(0);
    }
    let price_decimals = T::Oracle::decimals(&source, asset).ok_or(Error::<T>::MissingDecimals)?;
    let token_decimals = T::Ledger::decimals(asset).ok_or(Error::<T>::MissingDecimals)?;
    reference_value(amount, token_decimals, price, price_decimals).map_err(Self::pricing_error)
  }

  /// Units `holder` owns in `protocol`: shares, receipt tokens or ledger balance
  pub(crate) fn position_units(
    kind: ProtocolKind,
    protocol: &T::AccountId,
    holder: &T::AccountId,
  ) -> Balance {
    match kind {
      ProtocolKind::ShareVault | ProtocolKind::YieldBearing => T::Ledger::balance_of(protocol, holder),
      ProtocolKind::BaseLedger => T::Protocols::base_balance(protocol, holder),
    }
  }

  /// Position of `holder` in `protocol` expressed in underlying units
  pub(crate) fn position_in_underlying(
    kind: ProtocolKind,
    protocol: &T::AccountId,
    holder: &T::AccountId,
  ) -> Balance {
    let units = Self::position_units(kind, protocol, holder);
    match kind {
      ProtocolKind::ShareVault if units == 0 => 0,
      ProtocolKind::ShareVault => T::Protocols::convert_to_assets(protocol, units).unwrap_or(0),
      ProtocolKind::YieldBearing | ProtocolKind::BaseLedger => units,
    }
  }

  /// Reference value of a protocol position; unregistered or unresolvable protocols are worth zero
  pub fn position_value_of(
    protocol: &T::AccountId,
    holder: &T::AccountId,
  ) -> Result<Balance, Error<T>> {
    let Some(kind) = ProtocolKinds::<T>::get(protocol) else {
      return Ok(0);
    };
    let Some(underlying) = T::Protocols::underlying_asset(protocol) else {
      return Ok(0);
    };
    Self::value_of(&underlying, Self::position_in_underlying(kind, protocol, holder))
  }

  /// Reference value of idle custody balances of tracked assets plus tracked protocol positions
  pub fn portfolio_value() -> Result<Balance, Error<T>> {
    let assets = Self::tracked(SubjectClass::Asset);
    let protocols = Self::tracked(SubjectClass::Protocol);
    if assets.is_empty() && protocols.is_empty() {
      return Err(Error::<T>::NoTrackedSubjects);
    }
    if PriceSource::<T>::get().is_none() {
      return Err(Error::<T>::OracleNotConfigured);
    }
    let custody = Custody::<T>::get().ok_or(Error::<T>::CustodyNotConfigured)?;

    let mut total: Balance = 0;
    for asset in assets.iter() {
      let value = Self::value_of(asset, T::Ledger::balance_of(asset, &custody))?;
      total = total.checked_add(value).ok_or(Error::<T>::ArithmeticOverflow)?;
    }
    for protocol in protocols.iter() {
      let value = Self::position_value_of(protocol, &custody)?;
      total = total.checked_add(value).ok_or(Error::<T>::ArithmeticOverflow)?;
    }
    Ok(total)
  }
}
