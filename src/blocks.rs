// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Bounded block-progression waits.

use crate::{
	chain::ChainHandle,
	environment::WaitParams,
	error::{Error, Result, WaitProgress},
};

/// Wait until the chain's best block height has advanced by at least `n`
/// from its value at call time, returning the height reached.
///
/// Subscription driven: progress is observed at the chain's own block
/// cadence, never by polling faster than it. Each call owns its own
/// subscription, so concurrent waits on different chains do not interfere.
/// When `params.block_wait_timeout` elapses first, the resulting
/// [`Error::Timeout`] says whether the chain stalled outright or was merely
/// too slow.
///
/// The block count is a convergence heuristic, "enough blocks for the
/// network to have acted", not an authoritative completion signal.
pub async fn wait_for_blocks(handle: &ChainHandle, n: u32, params: &WaitParams) -> Result<u32> {
	let start = handle.best_number().await?;
	if n == 0 {
		return Ok(start);
	}
	let target = start.saturating_add(n);
	log::debug!("{}: waiting for block {target} (currently at {start})", handle.url());

	let mut best_seen = start;
	let mut blocks = handle.client().blocks().subscribe_best().await?;
	let deadline = tokio::time::sleep(params.block_wait_timeout);
	tokio::pin!(deadline);

	loop {
		tokio::select! {
			() = &mut deadline => {
				let progress = if best_seen > start {
					WaitProgress::TooSlow { observed: best_seen - start, wanted: n }
				} else {
					WaitProgress::Stalled
				};
				return Err(Error::Timeout {
					chain: handle.url().to_string(),
					operation: format!("{n} new blocks"),
					waited: params.block_wait_timeout,
					progress,
				});
			},
			maybe_block = blocks.next() => {
				let Some(block) = maybe_block else {
					return Err(subxt::Error::Other("Best block subscription ended".into()).into());
				};
				let number = block?.number();
				if number > best_seen {
					log::debug!("{}: at block {number}, target {target}", handle.url());
					best_seen = number;
				}
				if number >= target {
					return Ok(number);
				}
			},
		}
	}
}

/// Require the chain to be making progress at all: its height must advance
/// by one block within the wait budget.
pub async fn assert_blocks_being_produced(handle: &ChainHandle, params: &WaitParams) -> Result<u32> {
	let reached = wait_for_blocks(handle, 1, params).await?;
	log::info!("{} is producing blocks (at #{reached})", handle.url());
	Ok(reached)
}
