//! Selector inspection for generic execute payloads.
//!
//! Only the leading 4-byte selector is inspected. Allowance-granting selectors are refused so that
//! approvals go through the valued `approve_protocol` path; everything else is forwarded as-is.

use primitives::Balance;

pub type Selector = [u8; 4];

/// `approve(address,uint256)`
pub const APPROVE: Selector = [0x09, 0x5e, 0xa7, 0xb3];
/// `increaseAllowance(address,uint256)`
pub const INCREASE_ALLOWANCE: Selector = [0x39, 0x50, 0x93, 0x51];
/// `setApprovalForAll(address,bool)`
pub const SET_APPROVAL_FOR_ALL: Selector = [0xa2, 0x2c, 0xb4, 0x65];
/// `permit(address,address,uint256,uint256,uint8,bytes32,bytes32)`
pub const PERMIT: Selector = [0xd5, 0x05, 0xac, 0xcf];

/// Lending pool `withdraw(address,uint256,address)`
pub const POOL_WITHDRAW: Selector = [0x69, 0x32, 0x8d, 0xec];
/// Tokenized vault `withdraw(uint256,address,address)`
pub const VAULT_WITHDRAW: Selector = [0xb4, 0x60, 0xaf, 0x94];

const BLOCKED: [Selector; 4] = [APPROVE, INCREASE_ALLOWANCE, SET_APPROVAL_FOR_ALL, PERMIT];

const WORD: usize = 32;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ApprovalBlocked(pub Selector);

pub fn selector(data: &[u8]) -> Option<Selector> {
  data.get(..4)?.try_into().ok()
}

pub fn ensure_not_approval(data: &[u8]) -> Result<(), ApprovalBlocked> {
  match selector(data) {
    Some(found) if BLOCKED.contains(&found) => Err(ApprovalBlocked(found)),
    _ => Ok(()),
  }
}

/// Reads the `index`-th 32-byte argument as a balance, saturating values wider than 128 bits
fn word_arg(data: &[u8], index: usize) -> Option<Balance> {
  let start = 4 + index * WORD;
  let word = data.get(start..start + WORD)?;
  let (high, low) = word.split_at(WORD / 2);
  if high.iter().any(|byte| *byte != 0) {
    return Some(Balance::MAX);
  }
  Some(Balance::from_be_bytes(low.try_into().ok()?))
}

/// Amount withdrawn by a recognised protocol withdrawal payload
pub fn withdrawal_amount(data: &[u8]) -> Option<Balance> {
  if data.len() < 4 + 3 * WORD {
    return None;
  }
  match selector(data)? {
    POOL_WITHDRAW => word_arg(data, 1),
    VAULT_WITHDRAW => word_arg(data, 0),
    _ => None,
  }
}
