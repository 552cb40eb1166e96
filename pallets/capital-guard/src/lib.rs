//! Capital Guard Pallet
//!
//! Lets a custody owner delegate capital movements to principals without giving them the custody
//! account. Principals request deposits into yield protocols, withdrawals, transfers, approvals
//! and generic calls; the pallet checks the principal's role and target allowlist, charges the
//! request against a sliding-window percentage cap, relays the call as the custody account and
//! verifies the observable effect before anything is recorded.
//!
//! Caps are measured against a basis captured when the window opens: the custody balance for
//! deposits and transfers, the custody position for withdrawals, and the oracle-priced value of
//! every tracked asset and protocol position for approvals and generic calls.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub use pallet::*;

pub mod adapters;
pub use adapters::{CustodyRelay, PriceOracle, ProtocolLedger, RelayCall, TokenLedger};

pub mod calldata;
pub mod limiter;
mod registry;
mod valuation;

pub mod weights;
pub use weights::WeightInfo;

#[cfg(test)]
mod mock;

#[cfg(feature = "runtime-benchmarks")]
mod benchmarking;

pub const LOG_TARGET: &str = "runtime::capital-guard";

#[frame::pallet]
pub mod pallet {
  use super::{
    CustodyRelay, LOG_TARGET, PriceOracle, ProtocolLedger, RelayCall, TokenLedger, WeightInfo,
    calldata,
    limiter::{self, UsageWindow, WindowCheck},
  };
  use core::marker::PhantomData;
  use frame::prelude::*;
  use polkadot_sdk::{
    frame_support::traits::{EnsureOrigin, UnixTime},
    sp_runtime::traits::TrailingZeroInput,
  };
  use primitives::{
    ActionKind, BPS_DENOMINATOR, Balance, ErrorClass, LimitConfig, LimitConfigError,
    ProtocolKind, Role, SubjectClass, bps_of, share_in_bps,
  };

  /// Telemetry attached to every executed capital action
  #[derive(
    Clone, Debug, Decode, DecodeWithMemTracking, Encode, Eq, PartialEq, TypeInfo, MaxEncodedLen,
  )]
  pub struct ActionRecord<AccountId> {
    pub principal: AccountId,
    pub target: AccountId,
    pub requested_amount: Balance,
    pub actual_amount: Balance,
    pub basis_before: Balance,
    pub basis_after: Balance,
    pub cumulative_in_window: Balance,
    /// Charged amount relative to `basis_before`, in basis points
    pub percentage_of_basis: u32,
    pub timestamp: u64,
  }

  pub type ActionRecordOf<T> = ActionRecord<<T as frame_system::Config>::AccountId>;

  #[derive(Clone, Copy, Debug, Eq, PartialEq)]
  pub(crate) enum ActionStage {
    Pending,
    AuthChecked,
    AllowlistChecked,
    BasisCaptured,
    LimitChecked,
    Relayed,
    Verified,
    Recorded,
  }

  /// Holds `ActionInFlight` for the lifetime of one capital action
  pub(crate) struct ActionGuard<T: Config>(PhantomData<T>);

  impl<T: Config> ActionGuard<T> {
    fn acquire() -> Result<Self, Error<T>> {
      ensure!(!ActionInFlight::<T>::get(), Error::<T>::Reentrancy);
      ActionInFlight::<T>::put(true);
      Ok(Self(PhantomData))
    }
  }

  impl<T: Config> Drop for ActionGuard<T> {
    fn drop(&mut self) {
      ActionInFlight::<T>::kill();
    }
  }

  pub(crate) struct ActionContext<T: Config> {
    principal: T::AccountId,
    custody: T::AccountId,
    kind: ActionKind,
    limits: LimitConfig,
    now: u64,
    stage: ActionStage,
    _guard: ActionGuard<T>,
  }

  impl<T: Config> ActionContext<T> {
    fn advance(&mut self, stage: ActionStage) {
      log::debug!(
        target: LOG_TARGET,
        "{:?} by {:?}: {:?} -> {:?}",
        self.kind,
        self.principal,
        self.stage,
        stage
      );
      self.stage = stage;
    }
  }

  #[pallet::pallet]
  pub struct Pallet<T>(_);

  #[pallet::config]
  pub trait Config: frame_system::Config {
    /// Wall clock for window and price-age arithmetic
    type Time: UnixTime;

    type Oracle: PriceOracle<Self::AccountId>;
    type Ledger: TokenLedger<Self::AccountId>;
    type Protocols: ProtocolLedger<Self::AccountId>;
    /// Executes calls as the custody account
    type Relay: CustodyRelay<Self::AccountId>;

    /// Origin that may bind the custody owner outside genesis
    type ForceOrigin: EnsureOrigin<Self::RuntimeOrigin>;

    /// Shortest window a principal may be configured with, in seconds
    #[pallet::constant]
    type MinWindowDuration: Get<u64>;
    /// Oldest price round still accepted, in seconds
    #[pallet::constant]
    type MaxPriceAge: Get<u64>;
    #[pallet::constant]
    type MaxTrackedSubjects: Get<u32>;
    #[pallet::constant]
    type MaxBatchTargets: Get<u32>;
    #[pallet::constant]
    type MaxCalldataLen: Get<u32>;
    /// Deposit share of basis above which `UnusualActivity` is emitted
    #[pallet::constant]
    type UnusualDepositBps: Get<u16>;
    /// Withdrawal share of basis above which `UnusualActivity` is emitted
    #[pallet::constant]
    type UnusualWithdrawBps: Get<u16>;

    type WeightInfo: WeightInfo;
  }

  #[pallet::storage]
  #[pallet::getter(fn custody)]
  pub type Custody<T: Config> = StorageValue<_, T::AccountId, OptionQuery>;

  #[pallet::storage]
  pub type Roles<T: Config> =
    StorageDoubleMap<_, Blake2_128Concat, T::AccountId, Twox64Concat, Role, bool, ValueQuery>;

  #[pallet::storage]
  pub type Allowlist<T: Config> = StorageDoubleMap<
    _,
    Blake2_128Concat,
    T::AccountId,
    Blake2_128Concat,
    T::AccountId,
    bool,
    ValueQuery,
  >;

  #[pallet::storage]
  pub type Limits<T: Config> =
    StorageMap<_, Blake2_128Concat, T::AccountId, LimitConfig, OptionQuery>;

  /// Usage windows keyed by principal, then `(subject, kind)`
  #[pallet::storage]
  pub type UsageWindows<T: Config> = StorageDoubleMap<
    _,
    Blake2_128Concat,
    T::AccountId,
    Blake2_128Concat,
    (T::AccountId, ActionKind),
    UsageWindow,
    OptionQuery,
  >;

  #[pallet::storage]
  pub type TrackedSets<T: Config> = StorageMap<
    _,
    Twox64Concat,
    SubjectClass,
    BoundedVec<T::AccountId, T::MaxTrackedSubjects>,
    ValueQuery,
  >;

  /// Position of every tracked subject inside its `TrackedSets` vector
  #[pallet::storage]
  pub type TrackedIndex<T: Config> =
    StorageDoubleMap<_, Twox64Concat, SubjectClass, Blake2_128Concat, T::AccountId, u32, OptionQuery>;

  #[pallet::storage]
  #[pallet::getter(fn protocol_kind)]
  pub type ProtocolKinds<T: Config> =
    StorageMap<_, Blake2_128Concat, T::AccountId, ProtocolKind, OptionQuery>;

  #[pallet::storage]
  #[pallet::getter(fn price_source)]
  pub type PriceSource<T: Config> = StorageValue<_, T::AccountId, OptionQuery>;

  #[pallet::storage]
  #[pallet::getter(fn paused)]
  pub type Paused<T> = StorageValue<_, bool, ValueQuery>;

  #[pallet::storage]
  pub type ActionInFlight<T> = StorageValue<_, bool, ValueQuery>;

  #[pallet::genesis_config]
  #[derive(frame::prelude::DefaultNoBound)]
  pub struct GenesisConfig<T: Config> {
    pub custody: Option<T::AccountId>,
  }

  #[pallet::genesis_build]
  impl<T: Config> BuildGenesisConfig for GenesisConfig<T> {
    fn build(&self) {
      if let Some(owner) = &self.custody {
        Custody::<T>::put(owner);
      }
    }
  }

  #[pallet::hooks]
  impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {
    fn integrity_test() {
      assert!(T::MinWindowDuration::get() > 0, "MinWindowDuration must be non-zero");
      assert!(
        T::UnusualDepositBps::get() <= BPS_DENOMINATOR
          && T::UnusualWithdrawBps::get() <= BPS_DENOMINATOR,
        "unusual activity thresholds are basis points"
      );
      assert!(T::MaxTrackedSubjects::get() > 0, "MaxTrackedSubjects must be non-zero");
    }
  }

  #[pallet::event]
  #[pallet::generate_deposit(pub(super) fn deposit_event)]
  pub enum Event<T: Config> {
    CustodySet {
      owner: T::AccountId,
    },
    RoleGranted {
      principal: T::AccountId,
      role: Role,
    },
    RoleRevoked {
      principal: T::AccountId,
      role: Role,
    },
    AllowlistUpdated {
      principal: T::AccountId,
      target: T::AccountId,
      allowed: bool,
    },
    LimitsConfigured {
      principal: T::AccountId,
      config: LimitConfig,
    },
    TrackedAdded {
      class: SubjectClass,
      subject: T::AccountId,
    },
    TrackedRemoved {
      class: SubjectClass,
      subject: T::AccountId,
    },
    ProtocolKindSet {
      protocol: T::AccountId,
      kind: Option<ProtocolKind>,
    },
    PriceSourceSet {
      source: T::AccountId,
    },
    PausedSet {
      paused: bool,
    },
    /// The action in `record` opened a new usage window; its `basis_before` is the new basis
    /// and its `timestamp` the window start
    WindowReset {
      kind: ActionKind,
      record: ActionRecordOf<T>,
    },
    ActionExecuted {
      kind: ActionKind,
      record: ActionRecordOf<T>,
    },
    /// Single action above the unusual-activity threshold; informational only
    UnusualActivity {
      kind: ActionKind,
      record: ActionRecordOf<T>,
    },
    /// Generic call payload decoded as a protocol withdrawal
    ProtocolWithdrawalObserved {
      principal: T::AccountId,
      target: T::AccountId,
      amount: Balance,
    },
  }

  #[pallet::error]
  pub enum Error<T> {
    /// Caller is not the custody owner
    NotOwner,
    MissingRole,
    /// Zero account where a real account is required
    InvalidAddress,
    TargetNotAllowed,
    /// Generic call payload grants an allowance
    ApprovalNotAllowed,
    DepositLimitExceeded,
    WithdrawLimitExceeded,
    TransferLimitExceeded,
    ApprovalLimitExceeded,
    LossLimitExceeded,
    RelayFailed,
    ApprovalFailed,
    InsufficientSharesReceived,
    InsufficientAssetsReceived,
    TransferVerificationFailed,
    InvalidBps,
    WindowTooShort,
    CustodyNotConfigured,
    OracleNotConfigured,
    NoTrackedSubjects,
    UnknownProtocol,
    AlreadyTracked,
    NotTracked,
    TooManyTrackedSubjects,
    ArithmeticOverflow,
    Paused,
    /// A capital action is already in flight
    Reentrancy,
    StalePrice,
    InvalidPrice,
    MissingDecimals,
  }

  impl<T> Error<T> {
    pub fn class(&self) -> ErrorClass {
      match self {
        Error::NotOwner | Error::MissingRole => ErrorClass::Authorization,
        Error::TargetNotAllowed | Error::ApprovalNotAllowed => ErrorClass::Allowlist,
        Error::DepositLimitExceeded
        | Error::WithdrawLimitExceeded
        | Error::TransferLimitExceeded
        | Error::ApprovalLimitExceeded
        | Error::LossLimitExceeded => ErrorClass::Limit,
        Error::RelayFailed => ErrorClass::ExternalCall,
        Error::ApprovalFailed
        | Error::InsufficientSharesReceived
        | Error::InsufficientAssetsReceived
        | Error::TransferVerificationFailed => ErrorClass::Verification,
        Error::StalePrice | Error::InvalidPrice | Error::MissingDecimals => ErrorClass::Oracle,
        _ => ErrorClass::Configuration,
      }
    }
  }

  impl<T> From<LimitConfigError> for Error<T> {
    fn from(err: LimitConfigError) -> Self {
      match err {
        LimitConfigError::BpsOutOfRange => Error::InvalidBps,
        LimitConfigError::WindowTooShort => Error::WindowTooShort,
      }
    }
  }

  #[pallet::call]
  impl<T: Config> Pallet<T> {
    #[pallet::call_index(0)]
    #[pallet::weight(T::WeightInfo::force_set_custody())]
    pub fn force_set_custody(origin: OriginFor<T>, owner: T::AccountId) -> DispatchResult {
      T::ForceOrigin::ensure_origin(origin)?;
      Self::ensure_account(&owner)?;
      Custody::<T>::put(&owner);
      log::info!(target: LOG_TARGET, "custody bound to {:?}", owner);
      Self::deposit_event(Event::CustodySet { owner });
      Ok(())
    }

    #[pallet::call_index(1)]
    #[pallet::weight(T::WeightInfo::grant_role())]
    pub fn grant_role(origin: OriginFor<T>, principal: T::AccountId, role: Role) -> DispatchResult {
      Self::ensure_owner(origin)?;
      Self::ensure_account(&principal)?;
      Roles::<T>::insert(&principal, role, true);
      Self::deposit_event(Event::RoleGranted { principal, role });
      Ok(())
    }

    #[pallet::call_index(2)]
    #[pallet::weight(T::WeightInfo::revoke_role())]
    pub fn revoke_role(
      origin: OriginFor<T>,
      principal: T::AccountId,
      role: Role,
    ) -> DispatchResult {
      Self::ensure_owner(origin)?;
      Self::ensure_account(&principal)?;
      Roles::<T>::remove(&principal, role);
      Self::deposit_event(Event::RoleRevoked { principal, role });
      Ok(())
    }

    #[pallet::call_index(3)]
    #[pallet::weight(T::WeightInfo::set_allowed(targets.len() as u32))]
    pub fn set_allowed(
      origin: OriginFor<T>,
      principal: T::AccountId,
      targets: BoundedVec<T::AccountId, T::MaxBatchTargets>,
      allowed: bool,
    ) -> DispatchResult {
      Self::ensure_owner(origin)?;
      Self::ensure_account(&principal)?;
      for target in targets.iter() {
        Self::ensure_account(target)?;
      }
      for target in targets {
        if allowed {
          Allowlist::<T>::insert(&principal, &target, true);
        } else {
          Allowlist::<T>::remove(&principal, &target);
        }
        Self::deposit_event(Event::AllowlistUpdated {
          principal: principal.clone(),
          target,
          allowed,
        });
      }
      Ok(())
    }

    #[pallet::call_index(4)]
    #[pallet::weight(T::WeightInfo::set_limits())]
    pub fn set_limits(
      origin: OriginFor<T>,
      principal: T::AccountId,
      max_deposit_bps: u16,
      max_withdraw_bps: u16,
      max_loss_bps: u16,
      window_duration: u64,
    ) -> DispatchResult {
      Self::ensure_owner(origin)?;
      Self::ensure_account(&principal)?;
      let config = LimitConfig::new(
        max_deposit_bps,
        max_withdraw_bps,
        max_loss_bps,
        window_duration,
        T::MinWindowDuration::get(),
      )
      .map_err(Error::<T>::from)?;
      Limits::<T>::insert(&principal, config);
      Self::deposit_event(Event::LimitsConfigured { principal, config });
      Ok(())
    }

    #[pallet::call_index(5)]
    #[pallet::weight(T::WeightInfo::add_tracked())]
    pub fn add_tracked(
      origin: OriginFor<T>,
      class: SubjectClass,
      subject: T::AccountId,
    ) -> DispatchResult {
      Self::ensure_owner(origin)?;
      Self::ensure_account(&subject)?;
      Self::track(class, subject.clone())?;
      Self::deposit_event(Event::TrackedAdded { class, subject });
      Ok(())
    }

    #[pallet::call_index(6)]
    #[pallet::weight(T::WeightInfo::remove_tracked())]
    pub fn remove_tracked(
      origin: OriginFor<T>,
      class: SubjectClass,
      subject: T::AccountId,
    ) -> DispatchResult {
      Self::ensure_owner(origin)?;
      Self::untrack(class, &subject)?;
      Self::deposit_event(Event::TrackedRemoved { class, subject });
      Ok(())
    }

    #[pallet::call_index(7)]
    #[pallet::weight(T::WeightInfo::set_protocol_kind())]
    pub fn set_protocol_kind(
      origin: OriginFor<T>,
      protocol: T::AccountId,
      kind: Option<ProtocolKind>,
    ) -> DispatchResult {
      Self::ensure_owner(origin)?;
      Self::ensure_account(&protocol)?;
      ProtocolKinds::<T>::set(&protocol, kind);
      Self::deposit_event(Event::ProtocolKindSet { protocol, kind });
      Ok(())
    }

    #[pallet::call_index(8)]
    #[pallet::weight(T::WeightInfo::set_price_source())]
    pub fn set_price_source(origin: OriginFor<T>, source: T::AccountId) -> DispatchResult {
      Self::ensure_owner(origin)?;
      Self::ensure_account(&source)?;
      PriceSource::<T>::put(&source);
      Self::deposit_event(Event::PriceSourceSet { source });
      Ok(())
    }

    #[pallet::call_index(9)]
    #[pallet::weight(T::WeightInfo::set_paused())]
    pub fn set_paused(origin: OriginFor<T>, paused: bool) -> DispatchResult {
      Self::ensure_owner(origin)?;
      Paused::<T>::put(paused);
      log::info!(target: LOG_TARGET, "capital actions paused: {}", paused);
      Self::deposit_event(Event::PausedSet { paused });
      Ok(())
    }

    /// Moves `amount` of `asset` from custody into the protocol at `target`.
    ///
    /// Charged against the deposit cap over the custody balance of `asset`. The relayed
    /// allowance must grow by at least `amount` and the custody position in `target` by at
    /// least `min_shares_out` units.
    #[pallet::call_index(10)]
    #[pallet::weight(T::WeightInfo::deposit())]
    pub fn deposit(
      origin: OriginFor<T>,
      target: T::AccountId,
      asset: T::AccountId,
      amount: Balance,
      min_shares_out: Balance,
    ) -> DispatchResult {
      let mut ctx = Self::begin_action(origin, ActionKind::Deposit, &target)?;
      Self::ensure_account(&asset)?;
      let kind = ProtocolKinds::<T>::get(&target).ok_or(Error::<T>::UnknownProtocol)?;

      let basis_before = T::Ledger::balance_of(&asset, &ctx.custody);
      ctx.advance(ActionStage::BasisCaptured);
      let check = Self::check_window(&ctx, &target, amount, basis_before)?;
      ctx.advance(ActionStage::LimitChecked);

      let units_before = Self::position_units(kind, &target, &ctx.custody);
      let allowance_before = T::Ledger::allowance(&asset, &ctx.custody, &target);
      let grant = allowance_before
        .checked_add(amount)
        .ok_or(Error::<T>::ArithmeticOverflow)?;
      Self::relay(
        &ctx.custody,
        RelayCall::Approve {
          token: asset.clone(),
          spender: target.clone(),
          amount: grant,
        },
      )?;
      let granted =
        T::Ledger::allowance(&asset, &ctx.custody, &target).saturating_sub(allowance_before);
      ensure!(granted >= amount, Error::<T>::ApprovalFailed);
      Self::relay(
        &ctx.custody,
        RelayCall::Deposit {
          target: target.clone(),
          asset: asset.clone(),
          amount,
        },
      )?;
      ctx.advance(ActionStage::Relayed);

      let received = Self::position_units(kind, &target, &ctx.custody).saturating_sub(units_before);
      ensure!(
        received >= min_shares_out,
        Error::<T>::InsufficientSharesReceived
      );
      ctx.advance(ActionStage::Verified);

      let basis_after = T::Ledger::balance_of(&asset, &ctx.custody);
      let record = Self::action_record(
        &ctx,
        &target,
        amount,
        basis_before.saturating_sub(basis_after),
        basis_before,
        basis_after,
        &check,
      );
      Self::commit(ctx, target, check, record);
      Ok(())
    }

    /// Redeems `amount` of underlying from the protocol at `target` back into custody.
    ///
    /// Charged against the withdraw cap over the custody position in `target`, expressed in
    /// underlying units. Custody must receive at least `min_assets_out` of the underlying.
    #[pallet::call_index(11)]
    #[pallet::weight(T::WeightInfo::withdraw())]
    pub fn withdraw(
      origin: OriginFor<T>,
      target: T::AccountId,
      amount: Balance,
      min_assets_out: Balance,
    ) -> DispatchResult {
      let mut ctx = Self::begin_action(origin, ActionKind::Withdraw, &target)?;
      let kind = ProtocolKinds::<T>::get(&target).ok_or(Error::<T>::UnknownProtocol)?;
      let underlying = T::Protocols::underlying_asset(&target).ok_or(Error::<T>::UnknownProtocol)?;

      let basis_before = Self::position_in_underlying(kind, &target, &ctx.custody);
      ctx.advance(ActionStage::BasisCaptured);
      let check = Self::check_window(&ctx, &target, amount, basis_before)?;
      ctx.advance(ActionStage::LimitChecked);

      let idle_before = T::Ledger::balance_of(&underlying, &ctx.custody);
      Self::relay(
        &ctx.custody,
        RelayCall::Withdraw {
          target: target.clone(),
          amount,
        },
      )?;
      ctx.advance(ActionStage::Relayed);

      let received = T::Ledger::balance_of(&underlying, &ctx.custody).saturating_sub(idle_before);
      ensure!(
        received >= min_assets_out,
        Error::<T>::InsufficientAssetsReceived
      );
      ctx.advance(ActionStage::Verified);

      let basis_after = Self::position_in_underlying(kind, &target, &ctx.custody);
      let record = Self::action_record(
        &ctx,
        &target,
        amount,
        received,
        basis_before,
        basis_after,
        &check,
      );
      Self::commit(ctx, target, check, record);
      Ok(())
    }

    /// Sends `amount` of `token` from custody to `recipient`; counts against the withdraw cap.
    #[pallet::call_index(12)]
    #[pallet::weight(T::WeightInfo::transfer())]
    pub fn transfer(
      origin: OriginFor<T>,
      token: T::AccountId,
      recipient: T::AccountId,
      amount: Balance,
    ) -> DispatchResult {
      let mut ctx = Self::begin_action(origin, ActionKind::Transfer, &token)?;
      Self::ensure_account(&recipient)?;

      let basis_before = T::Ledger::balance_of(&token, &ctx.custody);
      let recipient_before = T::Ledger::balance_of(&token, &recipient);
      ctx.advance(ActionStage::BasisCaptured);
      let check = Self::check_window(&ctx, &token, amount, basis_before)?;
      ctx.advance(ActionStage::LimitChecked);

      Self::relay(
        &ctx.custody,
        RelayCall::Transfer {
          token: token.clone(),
          to: recipient.clone(),
          amount,
        },
      )?;
      ctx.advance(ActionStage::Relayed);

      let basis_after = T::Ledger::balance_of(&token, &ctx.custody);
      let sent = basis_before.saturating_sub(basis_after);
      let delivered = T::Ledger::balance_of(&token, &recipient).saturating_sub(recipient_before);
      ensure!(
        sent == amount && delivered == amount,
        Error::<T>::TransferVerificationFailed
      );
      ctx.advance(ActionStage::Verified);

      let record = Self::action_record(
        &ctx,
        &token,
        amount,
        delivered,
        basis_before,
        basis_after,
        &check,
      );
      Self::commit(ctx, token, check, record);
      Ok(())
    }

    /// Grants `spender` an allowance of exactly `amount` of `token`.
    ///
    /// The oracle value of `amount` is charged against the loss cap over the whole portfolio
    /// value, since an allowance exposes that value to the spender.
    #[pallet::call_index(13)]
    #[pallet::weight(T::WeightInfo::approve_protocol())]
    pub fn approve_protocol(
      origin: OriginFor<T>,
      token: T::AccountId,
      spender: T::AccountId,
      amount: Balance,
    ) -> DispatchResult {
      let mut ctx = Self::begin_action(origin, ActionKind::Approve, &spender)?;
      Self::ensure_account(&token)?;

      let basis_before = Self::portfolio_value()?;
      let exposed = Self::value_of(&token, amount)?;
      ctx.advance(ActionStage::BasisCaptured);
      let check = Self::check_window(&ctx, &spender, exposed, basis_before)?;
      ctx.advance(ActionStage::LimitChecked);

      Self::relay(
        &ctx.custody,
        RelayCall::Approve {
          token: token.clone(),
          spender: spender.clone(),
          amount,
        },
      )?;
      ctx.advance(ActionStage::Relayed);

      ensure!(
        T::Ledger::allowance(&token, &ctx.custody, &spender) == amount,
        Error::<T>::ApprovalFailed
      );
      ctx.advance(ActionStage::Verified);

      let record = Self::action_record(
        &ctx,
        &spender,
        amount,
        exposed,
        basis_before,
        basis_before,
        &check,
      );
      Self::commit(ctx, spender, check, record);
      Ok(())
    }

    /// Forwards an arbitrary payload to `target` as the custody account.
    ///
    /// Allowance-granting payloads are refused. The portfolio is valued before and after the
    /// call; the decrease may not exceed the loss cap of the pre-call value and is also charged
    /// against the loss window. The loss is only known once the call has been relayed, so the
    /// limit check runs after the relay and stands in for verification.
    #[pallet::call_index(14)]
    #[pallet::weight(T::WeightInfo::execute(data.len() as u32))]
    pub fn execute(
      origin: OriginFor<T>,
      target: T::AccountId,
      data: BoundedVec<u8, T::MaxCalldataLen>,
    ) -> DispatchResult {
      let mut ctx = Self::begin_action(origin, ActionKind::Execute, &target)?;
      calldata::ensure_not_approval(&data).map_err(|blocked| {
        log::warn!(
          target: LOG_TARGET,
          "generic call to {:?} carries allowance selector {:?}",
          target,
          blocked.0
        );
        Error::<T>::ApprovalNotAllowed
      })?;

      let value_before = Self::portfolio_value()?;
      ctx.advance(ActionStage::BasisCaptured);
      let withdrawn = calldata::withdrawal_amount(&data);
      Self::relay(
        &ctx.custody,
        RelayCall::Raw {
          target: target.clone(),
          data: data.into_inner(),
        },
      )?;
      ctx.advance(ActionStage::Relayed);

      let value_after = Self::portfolio_value()?;
      let loss = value_before.saturating_sub(value_after);
      let call_cap = bps_of(value_before, ctx.limits.max_loss_bps);
      if loss > call_cap {
        log::warn!(
          target: LOG_TARGET,
          "generic call by {:?} to {:?} lost {} over per-call cap {}",
          ctx.principal,
          target,
          loss,
          call_cap
        );
        return Err(Error::<T>::LossLimitExceeded.into());
      }
      let check = Self::check_window(&ctx, &target, loss, value_before)?;
      ctx.advance(ActionStage::LimitChecked);

      if let Some(amount) = withdrawn {
        Self::deposit_event(Event::ProtocolWithdrawalObserved {
          principal: ctx.principal.clone(),
          target: target.clone(),
          amount,
        });
      }
      let record = Self::action_record(
        &ctx,
        &target,
        loss,
        loss,
        value_before,
        value_after,
        &check,
      );
      Self::commit(ctx, target, check, record);
      Ok(())
    }
  }

  impl<T: Config> Pallet<T> {
    pub fn has_role(principal: &T::AccountId, role: Role) -> bool {
      Roles::<T>::get(principal, role)
    }

    pub fn is_allowed(principal: &T::AccountId, target: &T::AccountId) -> bool {
      Allowlist::<T>::get(principal, target)
    }

    /// Explicit limits, or the unconfigured defaults
    pub fn limits_of(principal: &T::AccountId) -> LimitConfig {
      Limits::<T>::get(principal).unwrap_or_default()
    }

    pub fn usage_of(
      principal: &T::AccountId,
      subject: &T::AccountId,
      kind: ActionKind,
    ) -> Option<UsageWindow> {
      UsageWindows::<T>::get(principal, (subject.clone(), kind))
    }

    /// Headroom left for one key right now.
    ///
    /// `basis_snapshot` only matters when the next action would open a new window.
    pub fn remaining_capacity(
      principal: &T::AccountId,
      subject: &T::AccountId,
      kind: ActionKind,
      basis_snapshot: Balance,
    ) -> Balance {
      let limits = Self::limits_of(principal);
      limiter::remaining(
        Self::usage_of(principal, subject, kind),
        basis_snapshot,
        limits.bps_for(kind),
        limits.window_duration,
        Self::now(),
      )
    }

    pub(crate) fn now() -> u64 {
      T::Time::now().as_secs()
    }

    fn is_zero_account(who: &T::AccountId) -> bool {
      T::AccountId::decode(&mut TrailingZeroInput::zeroes()).map_or(false, |zero| &zero == who)
    }

    fn ensure_account(who: &T::AccountId) -> Result<(), Error<T>> {
      ensure!(!Self::is_zero_account(who), Error::<T>::InvalidAddress);
      Ok(())
    }

    fn ensure_owner(origin: OriginFor<T>) -> Result<T::AccountId, DispatchError> {
      let who = ensure_signed(origin)?;
      let owner = Custody::<T>::get().ok_or(Error::<T>::CustodyNotConfigured)?;
      ensure!(who == owner, Error::<T>::NotOwner);
      Ok(who)
    }

    fn begin_action(
      origin: OriginFor<T>,
      kind: ActionKind,
      target: &T::AccountId,
    ) -> Result<ActionContext<T>, DispatchError> {
      let principal = ensure_signed(origin)?;
      ensure!(!Paused::<T>::get(), Error::<T>::Paused);
      let guard = ActionGuard::<T>::acquire()?;
      let custody = Custody::<T>::get().ok_or(Error::<T>::CustodyNotConfigured)?;
      let mut ctx = ActionContext {
        limits: Self::limits_of(&principal),
        principal,
        custody,
        kind,
        now: Self::now(),
        stage: ActionStage::Pending,
        _guard: guard,
      };

      ensure!(
        Self::has_role(&ctx.principal, kind.required_role()),
        Error::<T>::MissingRole
      );
      ctx.advance(ActionStage::AuthChecked);
      ensure!(
        Self::is_allowed(&ctx.principal, target),
        Error::<T>::TargetNotAllowed
      );
      ctx.advance(ActionStage::AllowlistChecked);
      Ok(ctx)
    }

    fn limit_error(kind: ActionKind) -> Error<T> {
      match kind {
        ActionKind::Deposit => Error::<T>::DepositLimitExceeded,
        ActionKind::Withdraw => Error::<T>::WithdrawLimitExceeded,
        ActionKind::Transfer => Error::<T>::TransferLimitExceeded,
        ActionKind::Approve => Error::<T>::ApprovalLimitExceeded,
        ActionKind::Execute => Error::<T>::LossLimitExceeded,
      }
    }

    fn check_window(
      ctx: &ActionContext<T>,
      subject: &T::AccountId,
      requested: Balance,
      basis_snapshot: Balance,
    ) -> Result<WindowCheck, DispatchError> {
      let existing = UsageWindows::<T>::get(&ctx.principal, (subject.clone(), ctx.kind));
      limiter::check(
        existing,
        requested,
        basis_snapshot,
        ctx.limits.bps_for(ctx.kind),
        ctx.limits.window_duration,
        ctx.now,
      )
      .map_err(|exceeded| {
        log::warn!(
          target: LOG_TARGET,
          "{:?} by {:?} on {:?} rejected: used {} + requested {} over cap {}",
          ctx.kind,
          ctx.principal,
          subject,
          exceeded.used,
          exceeded.requested,
          exceeded.cap
        );
        Self::limit_error(ctx.kind).into()
      })
    }

    fn relay(custody: &T::AccountId, call: RelayCall<T::AccountId>) -> DispatchResult {
      T::Relay::relay(custody, &call).map_err(|err| {
        log::warn!(target: LOG_TARGET, "relay of {:?} failed: {:?}", call, err);
        Error::<T>::RelayFailed.into()
      })
    }

    fn action_record(
      ctx: &ActionContext<T>,
      target: &T::AccountId,
      requested_amount: Balance,
      actual_amount: Balance,
      basis_before: Balance,
      basis_after: Balance,
      check: &WindowCheck,
    ) -> ActionRecordOf<T> {
      ActionRecord {
        principal: ctx.principal.clone(),
        target: target.clone(),
        requested_amount,
        actual_amount,
        basis_before,
        basis_after,
        cumulative_in_window: check.cumulative(),
        percentage_of_basis: share_in_bps(check.charged, basis_before),
        timestamp: ctx.now,
      }
    }

    fn unusual_threshold(kind: ActionKind) -> Option<u16> {
      match kind {
        ActionKind::Deposit => Some(T::UnusualDepositBps::get()),
        ActionKind::Withdraw => Some(T::UnusualWithdrawBps::get()),
        _ => None,
      }
    }

    /// Persists the charged window and emits the action telemetry
    fn commit(
      mut ctx: ActionContext<T>,
      subject: T::AccountId,
      check: WindowCheck,
      record: ActionRecordOf<T>,
    ) {
      let kind = ctx.kind;
      if check.reset {
        log::info!(
          target: LOG_TARGET,
          "{:?} window for {:?} on {:?} opened at {} with basis {}",
          kind,
          ctx.principal,
          subject,
          check.window.window_start,
          check.window.basis
        );
        Self::deposit_event(Event::WindowReset {
          kind,
          record: record.clone(),
        });
      }
      UsageWindows::<T>::insert(&ctx.principal, (subject, kind), check.window);

      if let Some(threshold) = Self::unusual_threshold(kind) {
        if record.percentage_of_basis > u32::from(threshold) {
          log::warn!(
            target: LOG_TARGET,
            "unusual {:?} by {:?}: {} bps of basis",
            kind,
            ctx.principal,
            record.percentage_of_basis
          );
          Self::deposit_event(Event::UnusualActivity {
            kind,
            record: record.clone(),
          });
        }
      }

      log::info!(
        target: LOG_TARGET,
        "{:?} by {:?} on {:?}: requested {} actual {} cumulative {}",
        kind,
        record.principal,
        record.target,
        record.requested_amount,
        record.actual_amount,
        record.cumulative_in_window
      );
      Self::deposit_event(Event::ActionExecuted { kind, record });
      ctx.advance(ActionStage::Recorded);
    }
  }
}
