//! Policy vocabulary for the capital guard.
//!
//! Roles gate which capital actions a principal may request, `LimitConfig` holds the per-principal
//! percentage caps, and `ErrorClass` is the coarse taxonomy every guard failure maps into.

use codec::{Decode, DecodeWithMemTracking, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};

/// Denominator for every basis-point quantity
pub const BPS_DENOMINATOR: u16 = 10_000;

/// Default cap on deposits per window (10%)
pub const DEFAULT_MAX_DEPOSIT_BPS: u16 = 1_000;
/// Default cap on withdrawals and transfers per window (5%)
pub const DEFAULT_MAX_WITHDRAW_BPS: u16 = 500;
/// Default cap on value lost through approvals and generic calls per window (5%)
pub const DEFAULT_MAX_LOSS_BPS: u16 = 500;
/// Default window length in seconds
pub const DEFAULT_WINDOW_DURATION: u64 = 86_400;

/// Capability a principal holds over custody capital.
///
/// Encoded as its integer id so off-chain tooling can address roles numerically.
#[derive(
  Clone,
  Copy,
  Debug,
  Decode,
  DecodeWithMemTracking,
  Encode,
  Eq,
  MaxEncodedLen,
  Ord,
  PartialEq,
  PartialOrd,
  TypeInfo,
  Serialize,
  Deserialize,
)]
pub enum Role {
  Deposit = 0,
  Withdraw = 1,
  Transfer = 2,
  Execute = 3,
}

/// Kind of capital action, also the third component of a usage-window key
#[derive(
  Clone,
  Copy,
  Debug,
  Decode,
  DecodeWithMemTracking,
  Encode,
  Eq,
  MaxEncodedLen,
  Ord,
  PartialEq,
  PartialOrd,
  TypeInfo,
  Serialize,
  Deserialize,
)]
pub enum ActionKind {
  Deposit,
  Withdraw,
  Transfer,
  Approve,
  Execute,
}

impl ActionKind {
  /// Role a principal must hold to request this action
  pub fn required_role(&self) -> Role {
    match self {
      ActionKind::Deposit => Role::Deposit,
      ActionKind::Withdraw => Role::Withdraw,
      ActionKind::Transfer => Role::Transfer,
      ActionKind::Approve | ActionKind::Execute => Role::Execute,
    }
  }
}

/// Position shape of a yield protocol
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
pub enum ProtocolKind {
  /// Tokenized vault: the holder owns shares redeemable for underlying assets
  ShareVault,
  /// Rebasing receipt token held 1:1 against the underlying, interest included
  YieldBearing,
  /// Lending market ledger tracking an interest-inclusive base balance per holder
  BaseLedger,
}

/// Which tracked set a subject belongs to
#[derive(
  Clone,
  Copy,
  Debug,
  Decode,
  DecodeWithMemTracking,
  Encode,
  Eq,
  MaxEncodedLen,
  Ord,
  PartialEq,
  PartialOrd,
  TypeInfo,
  Serialize,
  Deserialize,
)]
pub enum SubjectClass {
  Asset,
  Protocol,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LimitConfigError {
  BpsOutOfRange,
  WindowTooShort,
}

/// Per-principal percentage caps over a sliding window.
///
/// Principals without an explicit entry fall back to `LimitConfig::default()`, which reports
/// `configured = false`.
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
pub struct LimitConfig {
  pub max_deposit_bps: u16,
  pub max_withdraw_bps: u16,
  pub max_loss_bps: u16,
  /// Window length in seconds
  pub window_duration: u64,
  pub configured: bool,
}

impl Default for LimitConfig {
  fn default() -> Self {
    Self {
      max_deposit_bps: DEFAULT_MAX_DEPOSIT_BPS,
      max_withdraw_bps: DEFAULT_MAX_WITHDRAW_BPS,
      max_loss_bps: DEFAULT_MAX_LOSS_BPS,
      window_duration: DEFAULT_WINDOW_DURATION,
      configured: false,
    }
  }
}

impl LimitConfig {
  /// Explicitly configured limits, checked against the bps range and the minimum window
  pub fn new(
    max_deposit_bps: u16,
    max_withdraw_bps: u16,
    max_loss_bps: u16,
    window_duration: u64,
    min_window_duration: u64,
  ) -> Result<Self, LimitConfigError> {
    let config = Self {
      max_deposit_bps,
      max_withdraw_bps,
      max_loss_bps,
      window_duration,
      configured: true,
    };
    config.validate(min_window_duration)?;
    Ok(config)
  }

  pub fn validate(&self, min_window_duration: u64) -> Result<(), LimitConfigError> {
    let in_range = |bps: u16| bps <= BPS_DENOMINATOR;
    if !(in_range(self.max_deposit_bps)
      && in_range(self.max_withdraw_bps)
      && in_range(self.max_loss_bps))
    {
      return Err(LimitConfigError::BpsOutOfRange);
    }
    if self.window_duration < min_window_duration {
      return Err(LimitConfigError::WindowTooShort);
    }
    Ok(())
  }

  /// Cap that applies to `kind`; transfers move value out of custody and share the withdraw cap
  pub fn bps_for(&self, kind: ActionKind) -> u16 {
    match kind {
      ActionKind::Deposit => self.max_deposit_bps,
      ActionKind::Withdraw | ActionKind::Transfer => self.max_withdraw_bps,
      ActionKind::Approve | ActionKind::Execute => self.max_loss_bps,
    }
  }
}

/// Coarse failure taxonomy shared by off-chain monitors
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
pub enum ErrorClass {
  Authorization,
  Allowlist,
  Limit,
  ExternalCall,
  Verification,
  Configuration,
  Oracle,
}
