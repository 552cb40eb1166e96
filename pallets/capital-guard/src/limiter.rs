//! Sliding-window percentage limiter.
//!
//! A window opens on the first action for a `(principal, subject, kind)` key and freezes the basis
//! observed at that moment. Every action inside the window is charged against
//! `floor(basis * bps / 10000)`; once `window_start + duration` is reached the next action opens a
//! fresh window with a fresh basis. `check` is pure: the caller persists the returned window only
//! after the guarded action has been verified.

use frame::prelude::*;
use primitives::{bps_of, Balance};

/// Usage accumulated inside the current window
#[derive(
  Clone,
  Copy,
  Debug,
  Default,
  Decode,
  DecodeWithMemTracking,
  Encode,
  Eq,
  PartialEq,
  TypeInfo,
  MaxEncodedLen,
)]
pub struct UsageWindow {
  /// Unix seconds the window opened at
  pub window_start: u64,
  /// Basis snapshot taken when the window opened
  pub basis: Balance,
  pub used: Balance,
}

impl UsageWindow {
  pub fn is_expired(&self, duration: u64, now: u64) -> bool {
    now >= self.window_start.saturating_add(duration)
  }
}

/// Accepted charge against a window
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WindowCheck {
  /// Window to persist once the action is verified
  pub window: UsageWindow,
  /// A new window was opened by this check
  pub reset: bool,
  pub cap: Balance,
  /// Amount charged by this check
  pub charged: Balance,
}

impl WindowCheck {
  pub fn cumulative(&self) -> Balance {
    self.window.used
  }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LimitExceeded {
  pub cap: Balance,
  pub used: Balance,
  pub requested: Balance,
}

/// Window that would apply to an action at `now`, resetting when absent or expired
pub fn current(
  existing: Option<UsageWindow>,
  basis_snapshot: Balance,
  duration: u64,
  now: u64,
) -> (UsageWindow, bool) {
  match existing {
    Some(window) if !window.is_expired(duration, now) => (window, false),
    _ => (
      UsageWindow {
        window_start: now,
        basis: basis_snapshot,
        used: 0,
      },
      true,
    ),
  }
}

/// Charges `requested` against the window for one key
pub fn check(
  existing: Option<UsageWindow>,
  requested: Balance,
  basis_snapshot: Balance,
  bps: u16,
  duration: u64,
  now: u64,
) -> Result<WindowCheck, LimitExceeded> {
  let (mut window, reset) = current(existing, basis_snapshot, duration, now);
  let cap = bps_of(window.basis, bps);
  let exceeded = LimitExceeded {
    cap,
    used: window.used,
    requested,
  };
  let candidate = window.used.checked_add(requested).ok_or(exceeded)?;
  if candidate > cap {
    return Err(exceeded);
  }
  window.used = candidate;
  Ok(WindowCheck {
    window,
    reset,
    cap,
    charged: requested,
  })
}

/// Headroom left for one key at `now`
pub fn remaining(
  existing: Option<UsageWindow>,
  basis_snapshot: Balance,
  bps: u16,
  duration: u64,
  now: u64,
) -> Balance {
  let (window, _) = current(existing, basis_snapshot, duration, now);
  bps_of(window.basis, bps).saturating_sub(window.used)
}
