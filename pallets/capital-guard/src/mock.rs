use crate as pallet_capital_guard;
use crate::{CustodyRelay, PriceOracle, ProtocolLedger, RelayCall, TokenLedger};
use core::time::Duration;
use polkadot_sdk::frame_support::{
  construct_runtime, derive_impl,
  traits::{ConstU16, ConstU32, ConstU64, UnixTime},
};
use polkadot_sdk::frame_system::{self, EnsureRoot};
use polkadot_sdk::sp_runtime::{
  BuildStorage, DispatchError, DispatchResult,
  testing::H256,
  traits::{BlakeTwo256, IdentityLookup},
};
use primitives::{Balance, PriceRound, ProtocolKind};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

type Block = frame_system::mocking::MockBlock<Test>;
pub type AccountId = u64;

pub const CUSTODY: AccountId = 1;
pub const ALICE: AccountId = 2;
pub const BOB: AccountId = 3;
pub const EVE: AccountId = 4;

pub const USDC: AccountId = 10;
pub const WETH: AccountId = 11;
/// Share vault over USDC
pub const VAULT: AccountId = 20;
/// Rebasing USDC receipt token
pub const AUSDC: AccountId = 21;
/// Lending market with a USDC base ledger
pub const COMET: AccountId = 22;
/// Generic call target
pub const ROUTER: AccountId = 30;
pub const ORACLE: AccountId = 40;

pub const GENESIS_TIME: u64 = 1_700_000_000;
pub const DAY: u64 = 86_400;
pub const MAX_PRICE_AGE: u64 = 3_600;
pub const PRICE_DECIMALS: u8 = 8;
/// $1.00 at 8 decimals
pub const USDC_PRICE: i128 = 100_000_000;
/// $2000.00 at 8 decimals
pub const WETH_PRICE: i128 = 200_000_000_000;
/// Reference units per USDC base unit at $1.00
pub const USDC_TO_REFERENCE: Balance = 1_000_000_000_000;

construct_runtime!(
  pub struct Test {
    System: frame_system,
    CapitalGuard: pallet_capital_guard,
  }
);

#[derive_impl(frame_system::config_preludes::TestDefaultConfig)]
impl frame_system::Config for Test {
  type Block = Block;
  type AccountId = AccountId;
  type Lookup = IdentityLookup<Self::AccountId>;
  type Hash = H256;
  type Hashing = BlakeTwo256;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RelayBehaviour {
  pub fail: bool,
  /// Approvals are accepted but leave the allowance untouched
  pub ignore_approvals: bool,
  /// Share of minted position units withheld by the protocol
  pub deposit_haircut_bps: u16,
  /// Underlying withheld on every withdrawal
  pub withdraw_shortfall: Balance,
  /// Fee taken from every transfer in flight
  pub transfer_fee: Balance,
  /// Re-enter the pallet with a transfer from inside the next relayed call
  pub reenter: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct VaultSupply {
  pub total_assets: Balance,
  pub total_shares: Balance,
}

thread_local! {
  static NOW: Cell<u64> = const { Cell::new(GENESIS_TIME) };
  // (token, holder) -> balance
  static BALANCES: RefCell<BTreeMap<(AccountId, AccountId), Balance>> = const { RefCell::new(BTreeMap::new()) };
  // (token, owner, spender) -> allowance
  static ALLOWANCES: RefCell<BTreeMap<(AccountId, AccountId, AccountId), Balance>> = const { RefCell::new(BTreeMap::new()) };
  static DECIMALS: RefCell<BTreeMap<AccountId, u8>> = const { RefCell::new(BTreeMap::new()) };
  static PRICES: RefCell<BTreeMap<AccountId, PriceRound>> = const { RefCell::new(BTreeMap::new()) };
  static UNDERLYING: RefCell<BTreeMap<AccountId, AccountId>> = const { RefCell::new(BTreeMap::new()) };
  // How the mocked protocol behaves; independent of the kind registered in the pallet
  static SHAPES: RefCell<BTreeMap<AccountId, ProtocolKind>> = const { RefCell::new(BTreeMap::new()) };
  static VAULTS: RefCell<BTreeMap<AccountId, VaultSupply>> = const { RefCell::new(BTreeMap::new()) };
  // (market, holder) -> base balance
  static BASE_LEDGER: RefCell<BTreeMap<(AccountId, AccountId), Balance>> = const { RefCell::new(BTreeMap::new()) };
  // target -> (token, amount) pulled from custody by any raw call
  static RAW_EFFECTS: RefCell<BTreeMap<AccountId, (AccountId, Balance)>> = const { RefCell::new(BTreeMap::new()) };
  static RELAY_BEHAVIOUR: Cell<RelayBehaviour> = Cell::new(RelayBehaviour::default());
  static RELAY_LOG: RefCell<Vec<RelayCall<AccountId>>> = const { RefCell::new(Vec::new()) };
  static REENTRY_RESULT: RefCell<Option<DispatchResult>> = const { RefCell::new(None) };
}

pub fn reset_mock_state() {
  NOW.with(|n| n.set(GENESIS_TIME));
  BALANCES.with(|b| b.borrow_mut().clear());
  ALLOWANCES.with(|a| a.borrow_mut().clear());
  PRICES.with(|p| p.borrow_mut().clear());
  VAULTS.with(|v| v.borrow_mut().clear());
  BASE_LEDGER.with(|l| l.borrow_mut().clear());
  RAW_EFFECTS.with(|r| r.borrow_mut().clear());
  RELAY_BEHAVIOUR.with(|b| b.set(RelayBehaviour::default()));
  RELAY_LOG.with(|l| l.borrow_mut().clear());
  REENTRY_RESULT.with(|r| *r.borrow_mut() = None);

  DECIMALS.with(|d| {
    let mut d = d.borrow_mut();
    d.clear();
    d.insert(USDC, 6);
    d.insert(WETH, 18);
    d.insert(VAULT, 6);
    d.insert(AUSDC, 6);
  });
  UNDERLYING.with(|u| {
    let mut u = u.borrow_mut();
    u.clear();
    u.insert(VAULT, USDC);
    u.insert(AUSDC, USDC);
    u.insert(COMET, USDC);
  });
  SHAPES.with(|s| {
    let mut s = s.borrow_mut();
    s.clear();
    s.insert(VAULT, ProtocolKind::ShareVault);
    s.insert(AUSDC, ProtocolKind::YieldBearing);
    s.insert(COMET, ProtocolKind::BaseLedger);
  });
  set_price(USDC, USDC_PRICE, GENESIS_TIME);
  set_price(WETH, WETH_PRICE, GENESIS_TIME);
}

pub fn now() -> u64 {
  NOW.with(|n| n.get())
}

pub fn advance_time(seconds: u64) {
  NOW.with(|n| n.set(n.get() + seconds));
}

pub fn set_balance(token: AccountId, who: AccountId, amount: Balance) {
  BALANCES.with(|b| b.borrow_mut().insert((token, who), amount));
}

pub fn balance(token: AccountId, who: AccountId) -> Balance {
  BALANCES.with(|b| b.borrow().get(&(token, who)).copied().unwrap_or(0))
}

pub fn set_allowance(token: AccountId, owner: AccountId, spender: AccountId, amount: Balance) {
  ALLOWANCES.with(|a| a.borrow_mut().insert((token, owner, spender), amount));
}

pub fn allowance(token: AccountId, owner: AccountId, spender: AccountId) -> Balance {
  ALLOWANCES.with(|a| a.borrow().get(&(token, owner, spender)).copied().unwrap_or(0))
}

pub fn set_price(asset: AccountId, answer: i128, updated_at: u64) {
  set_round(
    asset,
    PriceRound {
      round_id: 1,
      answer,
      updated_at,
      answered_in_round: 1,
    },
  );
}

pub fn set_round(asset: AccountId, round: PriceRound) {
  PRICES.with(|p| p.borrow_mut().insert(asset, round));
}

pub fn set_decimals(token: AccountId, decimals: u8) {
  DECIMALS.with(|d| d.borrow_mut().insert(token, decimals));
}

pub fn vault_supply(vault: AccountId) -> VaultSupply {
  VAULTS.with(|v| v.borrow().get(&vault).copied().unwrap_or_default())
}

/// Opens a vault position for `holder` at the current share price
pub fn seed_vault(vault: AccountId, holder: AccountId, assets: Balance) {
  let supply = vault_supply(vault);
  let shares = if supply.total_shares == 0 {
    assets
  } else {
    assets * supply.total_shares / supply.total_assets
  };
  VAULTS.with(|v| {
    let mut vaults = v.borrow_mut();
    let supply = vaults.entry(vault).or_default();
    supply.total_assets += assets;
    supply.total_shares += shares;
  });
  credit(vault, holder, shares);
  let underlying = UNDERLYING.with(|u| u.borrow().get(&vault).copied()).unwrap_or(USDC);
  credit(underlying, vault, assets);
}

/// Interest earned by a share vault: assets grow, shares do not
pub fn accrue_vault(vault: AccountId, assets: Balance) {
  VAULTS.with(|v| v.borrow_mut().entry(vault).or_default().total_assets += assets);
  let underlying = UNDERLYING.with(|u| u.borrow().get(&vault).copied()).unwrap_or(USDC);
  set_balance(underlying, vault, balance(underlying, vault) + assets);
}

/// Interest earned on a rebasing receipt or a base ledger position
pub fn accrue_position(protocol: AccountId, holder: AccountId, amount: Balance) {
  match shape(protocol) {
    Some(ProtocolKind::YieldBearing) => set_balance(protocol, holder, balance(protocol, holder) + amount),
    Some(ProtocolKind::BaseLedger) => {
      BASE_LEDGER.with(|l| *l.borrow_mut().entry((protocol, holder)).or_default() += amount)
    }
    _ => accrue_vault(protocol, amount),
  }
}

pub fn base_balance(market: AccountId, holder: AccountId) -> Balance {
  BASE_LEDGER.with(|l| l.borrow().get(&(market, holder)).copied().unwrap_or(0))
}

pub fn set_raw_effect(target: AccountId, token: AccountId, amount: Balance) {
  RAW_EFFECTS.with(|r| r.borrow_mut().insert(target, (token, amount)));
}

pub fn set_relay_behaviour(update: impl FnOnce(&mut RelayBehaviour)) {
  RELAY_BEHAVIOUR.with(|b| {
    let mut behaviour = b.get();
    update(&mut behaviour);
    b.set(behaviour);
  });
}

pub fn relay_log() -> Vec<RelayCall<AccountId>> {
  RELAY_LOG.with(|l| l.borrow().clone())
}

pub fn reentry_result() -> Option<DispatchResult> {
  REENTRY_RESULT.with(|r| *r.borrow())
}

fn shape(protocol: AccountId) -> Option<ProtocolKind> {
  SHAPES.with(|s| s.borrow().get(&protocol).copied())
}

fn debit(token: AccountId, who: AccountId, amount: Balance) -> DispatchResult {
  let current = balance(token, who);
  if current < amount {
    return Err(DispatchError::Other("insufficient balance"));
  }
  set_balance(token, who, current - amount);
  Ok(())
}

fn credit(token: AccountId, who: AccountId, amount: Balance) {
  set_balance(token, who, balance(token, who) + amount);
}

fn haircut(units: Balance, bps: u16) -> Balance {
  units - units * Balance::from(bps) / 10_000
}

pub struct MockTime;
impl UnixTime for MockTime {
  fn now() -> Duration {
    Duration::from_secs(now())
  }
}

pub struct MockOracle;
impl PriceOracle<AccountId> for MockOracle {
  fn latest_round(source: &AccountId, asset: &AccountId) -> Option<PriceRound> {
    if *source != ORACLE {
      return None;
    }
    PRICES.with(|p| p.borrow().get(asset).copied())
  }

  fn decimals(source: &AccountId, _asset: &AccountId) -> Option<u8> {
    (*source == ORACLE).then_some(PRICE_DECIMALS)
  }
}

pub struct MockLedger;
impl TokenLedger<AccountId> for MockLedger {
  fn balance_of(token: &AccountId, who: &AccountId) -> Balance {
    balance(*token, *who)
  }

  fn allowance(token: &AccountId, owner: &AccountId, spender: &AccountId) -> Balance {
    allowance(*token, *owner, *spender)
  }

  fn decimals(token: &AccountId) -> Option<u8> {
    DECIMALS.with(|d| d.borrow().get(token).copied())
  }
}

pub struct MockProtocols;
impl ProtocolLedger<AccountId> for MockProtocols {
  fn underlying_asset(protocol: &AccountId) -> Option<AccountId> {
    UNDERLYING.with(|u| u.borrow().get(protocol).copied())
  }

  fn convert_to_assets(vault: &AccountId, shares: Balance) -> Option<Balance> {
    let supply = VAULTS.with(|v| v.borrow().get(vault).copied())?;
    if supply.total_shares == 0 {
      return Some(shares);
    }
    Some(shares * supply.total_assets / supply.total_shares)
  }

  fn base_balance(market: &AccountId, holder: &AccountId) -> Balance {
    base_balance(*market, *holder)
  }
}

pub struct MockRelay;
impl MockRelay {
  fn deposit(
    custody: AccountId,
    target: AccountId,
    asset: AccountId,
    amount: Balance,
    behaviour: RelayBehaviour,
  ) -> DispatchResult {
    let allowed = allowance(asset, custody, target);
    if allowed < amount {
      return Err(DispatchError::Other("allowance exceeded"));
    }
    debit(asset, custody, amount)?;
    credit(asset, target, amount);
    set_allowance(asset, custody, target, allowed - amount);
    match shape(target) {
      Some(ProtocolKind::ShareVault) => {
        let supply = vault_supply(target);
        let full = if supply.total_shares == 0 {
          amount
        } else {
          amount * supply.total_shares / supply.total_assets
        };
        let minted = haircut(full, behaviour.deposit_haircut_bps);
        VAULTS.with(|v| {
          let mut vaults = v.borrow_mut();
          let supply = vaults.entry(target).or_default();
          supply.total_assets += amount;
          supply.total_shares += minted;
        });
        credit(target, custody, minted);
      }
      Some(ProtocolKind::YieldBearing) => {
        credit(target, custody, haircut(amount, behaviour.deposit_haircut_bps))
      }
      Some(ProtocolKind::BaseLedger) => BASE_LEDGER.with(|l| {
        *l.borrow_mut().entry((target, custody)).or_default() +=
          haircut(amount, behaviour.deposit_haircut_bps)
      }),
      None => return Err(DispatchError::Other("not a protocol")),
    }
    Ok(())
  }

  fn withdraw(
    custody: AccountId,
    target: AccountId,
    amount: Balance,
    behaviour: RelayBehaviour,
  ) -> DispatchResult {
    let underlying = MockProtocols::underlying_asset(&target)
      .ok_or(DispatchError::Other("not a protocol"))?;
    match shape(target) {
      Some(ProtocolKind::ShareVault) => {
        let supply = vault_supply(target);
        if supply.total_assets < amount {
          return Err(DispatchError::Other("vault underfunded"));
        }
        let shares = if supply.total_assets == 0 {
          0
        } else {
          (amount * supply.total_shares).div_ceil(supply.total_assets)
        };
        debit(target, custody, shares)?;
        VAULTS.with(|v| {
          let mut vaults = v.borrow_mut();
          let supply = vaults.entry(target).or_default();
          supply.total_assets -= amount;
          supply.total_shares -= shares;
        });
      }
      Some(ProtocolKind::YieldBearing) => debit(target, custody, amount)?,
      Some(ProtocolKind::BaseLedger) => {
        let current = base_balance(target, custody);
        if current < amount {
          return Err(DispatchError::Other("insufficient base balance"));
        }
        BASE_LEDGER.with(|l| l.borrow_mut().insert((target, custody), current - amount));
      }
      None => return Err(DispatchError::Other("not a protocol")),
    }
    let paid = amount.saturating_sub(behaviour.withdraw_shortfall);
    set_balance(underlying, target, balance(underlying, target).saturating_sub(paid));
    credit(underlying, custody, paid);
    Ok(())
  }

  fn apply(
    custody: AccountId,
    call: &RelayCall<AccountId>,
    behaviour: RelayBehaviour,
  ) -> DispatchResult {
    match call {
      RelayCall::Approve {
        token,
        spender,
        amount,
      } => {
        if !behaviour.ignore_approvals {
          set_allowance(*token, custody, *spender, *amount);
        }
        Ok(())
      }
      RelayCall::Deposit {
        target,
        asset,
        amount,
      } => Self::deposit(custody, *target, *asset, *amount, behaviour),
      RelayCall::Withdraw { target, amount } => Self::withdraw(custody, *target, *amount, behaviour),
      RelayCall::Transfer { token, to, amount } => {
        debit(*token, custody, *amount)?;
        credit(*token, *to, amount.saturating_sub(behaviour.transfer_fee));
        Ok(())
      }
      RelayCall::Raw { target, .. } => {
        if let Some((token, drained)) = RAW_EFFECTS.with(|r| r.borrow().get(target).copied()) {
          debit(token, custody, drained)?;
          credit(token, *target, drained);
        }
        Ok(())
      }
    }
  }
}

impl CustodyRelay<AccountId> for MockRelay {
  fn relay(custody: &AccountId, call: &RelayCall<AccountId>) -> DispatchResult {
    let behaviour = RELAY_BEHAVIOUR.with(|b| b.get());
    if behaviour.reenter {
      set_relay_behaviour(|b| b.reenter = false);
      let inner = CapitalGuard::transfer(RuntimeOrigin::signed(ALICE), USDC, BOB, 1);
      REENTRY_RESULT.with(|r| *r.borrow_mut() = Some(inner));
    }
    RELAY_LOG.with(|l| l.borrow_mut().push(call.clone()));
    if behaviour.fail {
      return Err(DispatchError::Other("relay rejected"));
    }
    Self::apply(*custody, call, behaviour)
  }
}

impl pallet_capital_guard::Config for Test {
  type Time = MockTime;
  type Oracle = MockOracle;
  type Ledger = MockLedger;
  type Protocols = MockProtocols;
  type Relay = MockRelay;
  type ForceOrigin = EnsureRoot<AccountId>;
  type MinWindowDuration = ConstU64<3_600>;
  type MaxPriceAge = ConstU64<MAX_PRICE_AGE>;
  type MaxTrackedSubjects = ConstU32<4>;
  type MaxBatchTargets = ConstU32<8>;
  type MaxCalldataLen = ConstU32<256>;
  type UnusualDepositBps = ConstU16<800>;
  type UnusualWithdrawBps = ConstU16<400>;
  type WeightInfo = ();
}

pub fn new_test_ext() -> polkadot_sdk::sp_io::TestExternalities {
  let mut t = frame_system::GenesisConfig::<Test>::default()
    .build_storage()
    .unwrap();
  pallet_capital_guard::GenesisConfig::<Test> {
    custody: Some(CUSTODY),
  }
  .assimilate_storage(&mut t)
  .unwrap();
  let mut ext = polkadot_sdk::sp_io::TestExternalities::new(t);
  ext.execute_with(|| {
    System::set_block_number(1);
    reset_mock_state();
  });
  ext
}
