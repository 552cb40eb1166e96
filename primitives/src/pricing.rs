//! Reference-unit pricing math.
//!
//! Every value the guard compares is expressed in 18-decimal reference units. Token amounts and
//! oracle prices are rescaled to 18 decimals before multiplying, and every division rounds down.

use crate::{Balance, BPS_DENOMINATOR};
use codec::{Decode, DecodeWithMemTracking, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};
use sp_arithmetic::{helpers_128bit::multiply_by_rational_with_rounding, Rounding};

/// Decimals of the reference unit
pub const REFERENCE_DECIMALS: u8 = 18;
/// One whole reference unit
pub const REFERENCE_UNIT: Balance = 1_000_000_000_000_000_000;

/// Latest answer reported by a price feed
#[derive(
  Clone,
  Copy,
  Debug,
  Decode,
  DecodeWithMemTracking,
  Encode,
  Eq,
  MaxEncodedLen,
  PartialEq,
  TypeInfo,
  Serialize,
  Deserialize,
)]
pub struct PriceRound {
  pub round_id: u128,
  pub answer: i128,
  /// Unix seconds of the last update
  pub updated_at: u64,
  pub answered_in_round: u128,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PricingError {
  /// Round is too old, from the future, never updated, or carried over from an earlier round
  Stale,
  /// Non-positive answer
  Invalid,
  Overflow,
}

impl PriceRound {
  /// Positive price of a round that is fresh at `now`
  pub fn validate(&self, now: u64, max_age: u64) -> Result<Balance, PricingError> {
    if self.answer <= 0 {
      return Err(PricingError::Invalid);
    }
    if self.updated_at == 0 || self.updated_at > now || self.answered_in_round < self.round_id {
      return Err(PricingError::Stale);
    }
    if now - self.updated_at > max_age {
      return Err(PricingError::Stale);
    }
    Ok(self.answer.unsigned_abs())
  }
}

fn pow10(exponent: u8) -> Option<Balance> {
  10u128.checked_pow(exponent as u32)
}

/// Moves `amount` from `from` decimals to `to` decimals, flooring when precision is dropped
pub fn rescale(amount: Balance, from: u8, to: u8) -> Result<Balance, PricingError> {
  if from < to {
    let factor = pow10(to - from).ok_or(PricingError::Overflow)?;
    amount.checked_mul(factor).ok_or(PricingError::Overflow)
  } else {
    // A divisor beyond u128 floors every amount to zero
    Ok(pow10(from - to).map_or(0, |factor| amount / factor))
  }
}

/// Reference value of `amount` token units priced at `price` (`price_decimals` fixed point)
pub fn reference_value(
  amount: Balance,
  token_decimals: u8,
  price: Balance,
  price_decimals: u8,
) -> Result<Balance, PricingError> {
  let amount = rescale(amount, token_decimals, REFERENCE_DECIMALS)?;
  let price = rescale(price, price_decimals, REFERENCE_DECIMALS)?;
  multiply_by_rational_with_rounding(amount, price, REFERENCE_UNIT, Rounding::Down)
    .ok_or(PricingError::Overflow)
}

/// `floor(basis * bps / 10000)`, with `bps` clamped to 100%
pub fn bps_of(basis: Balance, bps: u16) -> Balance {
  let bps = bps.min(BPS_DENOMINATOR) as Balance;
  multiply_by_rational_with_rounding(basis, bps, BPS_DENOMINATOR as Balance, Rounding::Down)
    .unwrap_or(basis)
}

/// Share of `part` in `whole` in basis points, rounded down; zero when `whole` is zero
pub fn share_in_bps(part: Balance, whole: Balance) -> u32 {
  if whole == 0 {
    return 0;
  }
  multiply_by_rational_with_rounding(part, BPS_DENOMINATOR as Balance, whole, Rounding::Down)
    .map_or(u32::MAX, |bps| bps.min(u32::MAX as Balance) as u32)
}
