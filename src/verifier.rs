// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Consistency checks over an [`AssignmentSnapshot`].
//!
//! All checks are pure functions of an already captured snapshot, so a
//! failing check can be re-examined without touching the network and the
//! edge cases are unit-testable in isolation.

use crate::{
	error::{Error, Result},
	snapshot::AssignmentSnapshot,
	types::ParaId,
};

const ORCHESTRATOR: &str = "orchestrator";

/// The orchestrator's authority set must be exactly its self-assignment:
/// one authority key per assigned collator, and the owner of the key at
/// position `i` must be the collator at position `i`. Order carries
/// authoring slots, so membership alone is not enough.
pub fn check_orchestrator_self_consistency(snapshot: &AssignmentSnapshot) -> Result<()> {
	let check = "orchestrator-self-consistency";
	let assigned = &snapshot.orchestrator_assignment;
	let authorities = &snapshot.orchestrator_authorities;
	let owners = &snapshot.orchestrator_key_owners;

	if assigned.len() != authorities.len() {
		return Err(violation(
			check,
			ORCHESTRATOR,
			None,
			format!("{} authority keys, one per assigned collator", assigned.len()),
			format!("{} authority keys", authorities.len()),
		));
	}
	if owners.len() != authorities.len() {
		return Err(violation(
			check,
			ORCHESTRATOR,
			None,
			format!("{} resolved key owners", authorities.len()),
			format!("{} resolved key owners", owners.len()),
		));
	}

	for (i, (owner, collator)) in owners.iter().zip(assigned).enumerate() {
		match owner {
			None =>
				return Err(violation(
					check,
					ORCHESTRATOR,
					Some(i),
					format!("authority key {} owned by {collator}", authorities[i]),
					"no session key owner recorded".to_string(),
				)),
			Some(owner) if owner != collator =>
				return Err(violation(
					check,
					ORCHESTRATOR,
					Some(i),
					collator.to_string(),
					owner.to_string(),
				)),
			_ => {},
		}
	}
	Ok(())
}

/// What the orchestrator assigned to a container chain must be exactly what
/// that chain has recorded locally, element for element. A length mismatch
/// is reported as such, not as a value mismatch at the shorter length.
pub fn check_container_mirroring(snapshot: &AssignmentSnapshot, para_id: ParaId) -> Result<()> {
	let check = "container-authority-mirroring";
	let chain = format!("container {para_id}");

	let assigned = snapshot.assignment_for(para_id)?;
	let Some(recorded) = snapshot.container_authorities.get(&para_id) else {
		return Err(violation(
			check,
			chain,
			None,
			"a local authority record".to_string(),
			"no record captured for this chain".to_string(),
		));
	};

	if assigned.len() != recorded.len() {
		return Err(violation(
			check,
			chain,
			None,
			format!("{} authorities, mirroring the assignment", assigned.len()),
			format!("{} authorities", recorded.len()),
		));
	}
	for (i, (assigned, recorded)) in assigned.iter().zip(recorded).enumerate() {
		if assigned != recorded {
			return Err(violation(
				check,
				chain,
				Some(i),
				assigned.to_string(),
				recorded.to_string(),
			));
		}
	}
	Ok(())
}

/// The latest author the orchestrator noted for a container chain must be
/// one of the collators assigned to it. Any of them: slot order decides who
/// authored last, so this is a membership check, not a positional one.
///
/// Only meaningful once the orchestrator has advanced enough blocks for
/// authoring to have happened since the assignment took effect; see
/// [`authoring_blocks`](crate::environment::WaitParams::authoring_blocks).
pub fn check_author_membership(snapshot: &AssignmentSnapshot, para_id: ParaId) -> Result<()> {
	let check = "author-membership";
	let chain = format!("container {para_id}");

	let assigned = snapshot.assignment_for(para_id)?;
	let Some(author) = snapshot.latest_author.get(&para_id).and_then(Option::as_ref) else {
		return Err(violation(
			check,
			chain,
			None,
			"a noted author for the latest block".to_string(),
			"none noted yet".to_string(),
		));
	};

	if !assigned.contains(author) {
		return Err(violation(
			check,
			chain,
			None,
			format!(
				"one of [{}]",
				assigned.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
			),
			author.to_string(),
		));
	}
	Ok(())
}

/// Self-consistency plus mirroring for every container chain captured in
/// the snapshot. Author membership is not included here because it is only
/// valid after an explicit authoring wait.
pub fn check_all(snapshot: &AssignmentSnapshot) -> Result<()> {
	check_orchestrator_self_consistency(snapshot)?;
	for para_id in snapshot.container_ids() {
		check_container_mirroring(snapshot, para_id)?;
	}
	Ok(())
}

fn violation(
	check: &'static str,
	chain: impl Into<String>,
	index: Option<usize>,
	expected: String,
	actual: String,
) -> Error {
	Error::InvariantViolation { check, chain: chain.into(), index, expected, actual }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{AuthorityKey, Identity};
	use std::collections::BTreeMap;

	fn identity(tag: u8) -> Identity {
		Identity::from_raw([tag; 32])
	}

	fn identities(tags: &[u8]) -> Vec<Identity> {
		tags.iter().copied().map(|t| identity(t)).collect()
	}

	fn empty_snapshot() -> AssignmentSnapshot {
		AssignmentSnapshot {
			orchestrator_assignment: vec![],
			orchestrator_authorities: vec![],
			orchestrator_key_owners: vec![],
			container_assignment: BTreeMap::new(),
			container_authorities: BTreeMap::new(),
			latest_author: BTreeMap::new(),
		}
	}

	/// Orchestrator with one authority key per collator tag; `owners[i]`
	/// is the resolved owner of key `i`.
	fn orchestrator_snapshot(collators: &[u8], owners: &[Option<u8>]) -> AssignmentSnapshot {
		let mut snapshot = empty_snapshot();
		snapshot.orchestrator_assignment = identities(collators);
		snapshot.orchestrator_authorities =
			(0..owners.len()).map(|i| AuthorityKey([i as u8 + 100; 32])).collect();
		snapshot.orchestrator_key_owners = owners.iter().map(|o| o.map(identity)).collect();
		snapshot
	}

	fn container_snapshot(
		para_id: u32,
		assigned: &[u8],
		recorded: &[u8],
		author: Option<u8>,
	) -> AssignmentSnapshot {
		let mut snapshot = empty_snapshot();
		snapshot.container_assignment.insert(ParaId(para_id), identities(assigned));
		snapshot.container_authorities.insert(ParaId(para_id), identities(recorded));
		snapshot.latest_author.insert(ParaId(para_id), author.map(identity));
		snapshot
	}

	#[test]
	fn self_consistency_passes_when_owners_align() {
		let snapshot = orchestrator_snapshot(&[1, 2], &[Some(1), Some(2)]);
		check_orchestrator_self_consistency(&snapshot).unwrap();
	}

	#[test]
	fn swapped_owners_fail_at_index_zero() {
		// Same membership, wrong order: must be rejected at the first
		// position, not accepted as a set.
		let snapshot = orchestrator_snapshot(&[1, 2], &[Some(2), Some(1)]);
		let err = check_orchestrator_self_consistency(&snapshot).unwrap_err();
		assert!(
			matches!(
				err,
				Error::InvariantViolation {
					check: "orchestrator-self-consistency",
					index: Some(0),
					..
				}
			),
			"unexpected error: {err}"
		);
	}

	#[test]
	fn authority_count_mismatch_is_its_own_failure() {
		let snapshot = orchestrator_snapshot(&[1, 2], &[Some(1)]);
		let err = check_orchestrator_self_consistency(&snapshot).unwrap_err();
		assert!(matches!(err, Error::InvariantViolation { index: None, .. }));
	}

	#[test]
	fn unowned_authority_key_fails_at_its_position() {
		let snapshot = orchestrator_snapshot(&[1, 2], &[Some(1), None]);
		let err = check_orchestrator_self_consistency(&snapshot).unwrap_err();
		assert!(matches!(err, Error::InvariantViolation { index: Some(1), .. }));
	}

	#[test]
	fn mirroring_passes_on_identical_lists() {
		let snapshot = container_snapshot(2000, &[3, 4], &[3, 4], None);
		check_container_mirroring(&snapshot, ParaId(2000)).unwrap();
	}

	#[test]
	fn equal_length_value_mismatch_fails_at_index_zero() {
		let snapshot = container_snapshot(2000, &[3, 4], &[4, 3], None);
		let err = check_container_mirroring(&snapshot, ParaId(2000)).unwrap_err();
		assert!(
			matches!(
				err,
				Error::InvariantViolation {
					check: "container-authority-mirroring",
					index: Some(0),
					..
				}
			),
			"unexpected error: {err}"
		);
	}

	#[test]
	fn length_mismatch_is_reported_as_a_length_mismatch() {
		let snapshot = container_snapshot(2000, &[3, 4], &[3, 4, 5], None);
		let err = check_container_mirroring(&snapshot, ParaId(2000)).unwrap_err();
		match err {
			Error::InvariantViolation { index, expected, actual, .. } => {
				assert_eq!(index, None);
				assert!(expected.contains("2 authorities"), "expected: {expected}");
				assert!(actual.contains("3 authorities"), "actual: {actual}");
			},
			other => panic!("unexpected error: {other}"),
		}
	}

	#[test]
	fn mirroring_requires_an_assignment_entry() {
		let mut snapshot = container_snapshot(2000, &[3], &[3], None);
		snapshot.container_assignment.clear();
		let err = check_container_mirroring(&snapshot, ParaId(2000)).unwrap_err();
		assert!(matches!(err, Error::MissingAssignment { para_id: ParaId(2000) }));
	}

	#[test]
	fn any_assigned_collator_is_a_valid_author() {
		// The author is the second assignee; position does not matter here.
		let snapshot = container_snapshot(2001, &[5, 6], &[5, 6], Some(6));
		check_author_membership(&snapshot, ParaId(2001)).unwrap();
	}

	#[test]
	fn unassigned_author_is_rejected() {
		let snapshot = container_snapshot(2001, &[5, 6], &[5, 6], Some(9));
		let err = check_author_membership(&snapshot, ParaId(2001)).unwrap_err();
		assert!(matches!(
			err,
			Error::InvariantViolation { check: "author-membership", index: None, .. }
		));
	}

	#[test]
	fn missing_author_note_is_rejected() {
		let snapshot = container_snapshot(2001, &[5, 6], &[5, 6], None);
		let err = check_author_membership(&snapshot, ParaId(2001)).unwrap_err();
		assert!(matches!(err, Error::InvariantViolation { check: "author-membership", .. }));
	}

	#[test]
	fn check_all_covers_every_captured_container() {
		let mut snapshot = orchestrator_snapshot(&[1, 2], &[Some(1), Some(2)]);
		snapshot.container_assignment.insert(ParaId(2000), identities(&[3]));
		snapshot.container_authorities.insert(ParaId(2000), identities(&[3]));
		snapshot.container_assignment.insert(ParaId(2001), identities(&[4]));
		snapshot.container_authorities.insert(ParaId(2001), identities(&[7]));

		let err = check_all(&snapshot).unwrap_err();
		// 2000 mirrors correctly, 2001 does not.
		match err {
			Error::InvariantViolation { chain, .. } => assert_eq!(chain, "container 2001"),
			other => panic!("unexpected error: {other}"),
		}
	}
}
