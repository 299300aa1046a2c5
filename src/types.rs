// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Identity and chain-id primitives shared across the harness.

use codec::{Decode, Encode};
use std::fmt;
use subxt::utils::AccountId32;

/// Numeric identifier of a container chain, as registered on the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct ParaId(pub u32);

impl From<u32> for ParaId {
	fn from(id: u32) -> Self {
		Self(id)
	}
}

impl fmt::Display for ParaId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// A collator identity.
///
/// Everything the harness compares (assigned collators, session key owners,
/// noted block authors, container-side authority records) decodes to the same
/// 32 byte account representation, so equality is canonical no matter which
/// chain a value was read from. Rendered as SS58 in errors and logs.
#[derive(Clone, PartialEq, Eq, Encode, Decode)]
pub struct Identity(AccountId32);

impl Identity {
	pub fn from_raw(raw: [u8; 32]) -> Self {
		Self(AccountId32(raw))
	}
}

impl From<AccountId32> for Identity {
	fn from(account: AccountId32) -> Self {
		Self(account)
	}
}

impl fmt::Display for Identity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl fmt::Debug for Identity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// A raw consensus session key, as stored in the orchestrator authority set.
///
/// Kept opaque: the harness never interprets the key beyond feeding it back
/// into the session key ownership lookup.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub struct AuthorityKey(pub [u8; 32]);

impl AuthorityKey {
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl fmt::Display for AuthorityKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

impl fmt::Debug for AuthorityKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}
