// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Point-in-time capture of assignment state across chains.

use futures::future::try_join_all;
use std::collections::BTreeMap;

use crate::{
	chain::{ContainerChain, Orchestrator},
	error::{Error, Result},
	types::{AuthorityKey, Identity, ParaId},
};

/// Assignment state captured across the orchestrator and a set of container
/// chains, close together in wall-clock time.
///
/// Per chain, all values come from a single block. Across chains there is no
/// atomicity, so a capture is only meaningful while no assignment rotation
/// is in flight. Snapshots are cheap and never cached; fetch a fresh one per
/// assertion.
#[derive(Debug, Clone)]
pub struct AssignmentSnapshot {
	/// Collators assigned to produce the orchestrator's own blocks.
	pub orchestrator_assignment: Vec<Identity>,
	/// The orchestrator's active consensus authority keys, in order.
	pub orchestrator_authorities: Vec<AuthorityKey>,
	/// Resolved owner of each authority key, positionally aligned with
	/// `orchestrator_authorities`.
	pub orchestrator_key_owners: Vec<Option<Identity>>,
	/// Per container chain: collators the orchestrator assigned to it.
	pub container_assignment: BTreeMap<ParaId, Vec<Identity>>,
	/// Per container chain: authorities the chain itself has recorded.
	pub container_authorities: BTreeMap<ParaId, Vec<Identity>>,
	/// Per container chain: producer of the most recent block the
	/// orchestrator has noted, if any.
	pub latest_author: BTreeMap<ParaId, Option<Identity>>,
}

impl AssignmentSnapshot {
	/// Collators assigned to `para_id`, or [`Error::MissingAssignment`] when
	/// the orchestrator has no entry for it. During onboarding an absent
	/// entry is an expected intermediate state; everywhere else it is a
	/// failure.
	pub fn assignment_for(&self, para_id: ParaId) -> Result<&[Identity]> {
		self.container_assignment
			.get(&para_id)
			.map(Vec::as_slice)
			.ok_or(Error::MissingAssignment { para_id })
	}

	/// Container chain ids this snapshot holds local records for.
	pub fn container_ids(&self) -> impl Iterator<Item = ParaId> + '_ {
		self.container_authorities.keys().copied()
	}
}

/// Capture a fresh snapshot.
///
/// Container ids are resolved from the container chains themselves and then
/// used as keys into the orchestrator's nested assignment map. The container
/// reads run concurrently; the orchestrator parts are read afterwards from
/// one block, which lets them include author notes for every resolved id.
///
/// Capturing a chain the orchestrator has no assignment entry for fails the
/// whole capture with [`Error::MissingAssignment`]; callers that expect the
/// entry to still be forming (mid-onboarding) confirm it exists before
/// capturing.
pub async fn fetch_snapshot(
	orchestrator: &Orchestrator,
	containers: &[ContainerChain],
) -> Result<AssignmentSnapshot> {
	let locals = try_join_all(containers.iter().map(|c| c.local_state())).await?;

	let ids: Vec<ParaId> = locals.iter().map(|local| local.para_id).collect();
	let state = orchestrator.assignment_state(&ids).await?;
	ensure_all_assigned(&state.assigned.container_chains, &ids)?;

	let mut container_authorities = BTreeMap::new();
	for local in locals {
		container_authorities.insert(local.para_id, local.authorities);
	}

	log::debug!(
		"Captured assignment snapshot: {} orchestrator collators, {} authority keys, {} container chains",
		state.assigned.orchestrator_chain.len(),
		state.authorities.len(),
		container_authorities.len(),
	);

	Ok(AssignmentSnapshot {
		orchestrator_assignment: state.assigned.orchestrator_chain,
		orchestrator_authorities: state.authorities,
		orchestrator_key_owners: state.key_owners,
		container_assignment: state.assigned.container_chains,
		container_authorities,
		latest_author: state.latest_authors,
	})
}

/// Every captured container must appear in the orchestrator's assignment
/// map; an unmapped id fails the capture as a whole.
fn ensure_all_assigned(
	assignment: &BTreeMap<ParaId, Vec<Identity>>,
	ids: &[ParaId],
) -> Result<()> {
	for id in ids {
		if !assignment.contains_key(id) {
			return Err(Error::MissingAssignment { para_id: *id });
		}
	}
	Ok(())
}
