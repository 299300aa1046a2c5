// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Errors a consistency scenario can end with.

use crate::types::ParaId;
use std::{fmt, time::Duration};

pub type Result<T> = std::result::Result<T, Error>;

/// How far a bounded wait got before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitProgress {
	/// Nothing happened at all while waiting.
	Stalled,
	/// Progress was observed, but not enough of it before the deadline.
	TooSlow { observed: u32, wanted: u32 },
}

impl fmt::Display for WaitProgress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Stalled => write!(f, "no progress observed"),
			Self::TooSlow { observed, wanted } => {
				write!(f, "only {observed} of {wanted} observed")
			},
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// A handle is connected to a chain that does not report the expected
	/// runtime identity. Checked once at setup and never retried.
	#[error("Chain at {url} reports '{actual}', expected it to contain '{expected}'")]
	IdentityMismatch { url: String, expected: String, actual: String },

	/// A bounded wait elapsed. `progress` distinguishes a wait that saw
	/// nothing at all from one that was merely too slow.
	#[error("Timeout after {waited:?} waiting for {operation} on {chain}: {progress}")]
	Timeout { chain: String, operation: String, waited: Duration, progress: WaitProgress },

	/// The orchestrator assignment map has no entry for a container chain.
	/// Expected while an onboarding is still converging, fatal elsewhere.
	#[error("Container chain {para_id} has no entry in the orchestrator collator assignment")]
	MissingAssignment { para_id: ParaId },

	/// A cross-chain consistency check failed on otherwise healthy data.
	#[error("Consistency check '{check}' failed for {chain}{}: expected {expected}, found {actual}", fmt_index(.index))]
	InvariantViolation {
		check: &'static str,
		chain: String,
		index: Option<usize>,
		expected: String,
		actual: String,
	},

	/// A submitted transaction did not make it into a block, or its dispatch
	/// failed once included.
	#[error("Registration transaction rejected: {reason}")]
	TransactionRejected { reason: String },

	#[error("RPC error: {0}")]
	Rpc(#[from] subxt::Error),

	#[error("SCALE codec error: {0}")]
	Codec(#[from] codec::Error),
}

fn fmt_index(index: &Option<usize>) -> String {
	match index {
		Some(i) => format!(" at index {i}"),
		None => String::new(),
	}
}
