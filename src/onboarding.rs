// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Live registration of a brand-new container chain.
//!
//! The flow walks Submitted -> AwaitingConvergence -> Reachable -> Verified.
//! A failure in any phase ends the run with the originating error; nothing
//! after a failed phase is attempted.

use std::fmt;
use subxt::{dynamic::Value, tx::DynamicPayload};
use subxt_signer::sr25519::Keypair;

use crate::{
	blocks::{assert_blocks_being_produced, wait_for_blocks},
	chain::{ChainHandle, ContainerChain, Orchestrator},
	environment::{WaitParams, CONTAINER_SPEC_NAME},
	error::{Error, Result, WaitProgress},
	snapshot::fetch_snapshot,
	types::ParaId,
	verifier,
};

/// Registration payload for a new container chain: the numeric id it will
/// run under plus the genesis descriptor the registrar wants.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
	pub para_id: ParaId,
	/// Human readable chain name, e.g. "Container Chain 2002".
	pub name: String,
	/// Chain id string, e.g. "container-chain-2002".
	pub id: String,
}

impl RegistrationRequest {
	/// Conventional request for a numbered container chain.
	pub fn numbered(para_id: ParaId) -> Self {
		Self {
			para_id,
			name: format!("Container Chain {para_id}"),
			id: format!("container-chain-{para_id}"),
		}
	}

	/// The registrar's genesis data argument: empty storage, UTF-8 name and
	/// id, default token metadata. The registrar rejects partial structures,
	/// so every field is populated.
	fn genesis_data(&self) -> Value {
		Value::named_composite([
			("storage", Value::unnamed_composite(Vec::<Value>::new())),
			("name", Value::from_bytes(self.name.as_bytes())),
			("id", Value::from_bytes(self.id.as_bytes())),
			("fork_id", Value::unnamed_variant("None", Vec::<Value>::new())),
			("extensions", Value::from_bytes(Vec::<u8>::new())),
			(
				"properties",
				Value::named_composite([
					(
						"token_metadata",
						Value::named_composite([
							("token_symbol", Value::from_bytes("UNIT".as_bytes())),
							("ss58_format", Value::u128(42)),
							("token_decimals", Value::u128(12)),
						]),
					),
					("is_ethereum", Value::bool(false)),
				]),
			),
		])
	}

	/// `Sudo.sudo(Registrar.register(para_id, genesis_data))`, built
	/// dynamically against the orchestrator's metadata.
	pub fn privileged_call(&self) -> DynamicPayload {
		let register = Value::named_variant(
			"register",
			[
				("para_id", Value::u128(self.para_id.0 as u128)),
				("genesis_data", self.genesis_data()),
			],
		);
		let registrar_call = Value::unnamed_variant("Registrar", [register]);
		subxt::tx::dynamic("Sudo", "sudo", vec![registrar_call])
	}
}

/// Progress of a live registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingPhase {
	/// Registration accepted into an orchestrator block.
	Submitted,
	/// Waiting for the network to decide and distribute the assignment.
	AwaitingConvergence,
	/// The new chain's endpoint answers and a handle is connected.
	Reachable,
	/// Identity and assignment checks against the new chain.
	Verified,
}

impl fmt::Display for OnboardingPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let phase = match self {
			Self::Submitted => "submission",
			Self::AwaitingConvergence => "convergence",
			Self::Reachable => "connection",
			Self::Verified => "verification",
		};
		write!(f, "{phase}")
	}
}

/// A chain that completed onboarding: registered, assigned, reachable and
/// consistent with the orchestrator's view.
pub struct OnboardedChain {
	pub para_id: ParaId,
	pub chain: ContainerChain,
}

/// Drives a single registration from submission to a verified, reachable
/// chain. One shot: a duplicate registration is a different action, so the
/// transaction itself is never retried.
pub struct Onboarding<'a> {
	pub orchestrator: &'a Orchestrator,
	pub request: RegistrationRequest,
	/// Endpoint the newly assigned chain is expected to come up on. The node
	/// only starts serving once it has seen its own assignment, so early
	/// connection failures are expected and retried within budget.
	pub endpoint: String,
	pub params: WaitParams,
}

impl Onboarding<'_> {
	pub async fn run(&self, signer: &Keypair) -> Result<OnboardedChain> {
		let para_id = self.request.para_id;
		let mut phase = OnboardingPhase::Submitted;
		let result = self.drive(signer, &mut phase).await;
		match &result {
			Ok(_) => log::info!("Onboarding of container {para_id} complete"),
			Err(err) => log::error!("Onboarding of container {para_id} failed during {phase}: {err}"),
		}
		result
	}

	async fn drive(&self, signer: &Keypair, phase: &mut OnboardingPhase) -> Result<OnboardedChain> {
		let para_id = self.request.para_id;

		// Submitted: privileged registration, resolved at block inclusion.
		let call = self.request.privileged_call();
		self.orchestrator.submit_privileged(&call, signer, &self.params).await?;
		log::info!("Registration of container {para_id} included on the orchestrator");

		// AwaitingConvergence: a fixed block budget, then demand the id to
		// be both registered and assigned. There is no completion signal to
		// subscribe to, so the budget is the proxy.
		*phase = OnboardingPhase::AwaitingConvergence;
		wait_for_blocks(self.orchestrator.handle(), self.params.convergence_blocks, &self.params)
			.await?;
		let registered = self.orchestrator.registered_para_ids().await?;
		if !registered.contains(&para_id) {
			return Err(Error::TransactionRejected {
				reason: format!(
					"container {para_id} not in the registered set {registered:?} after {} blocks",
					self.params.convergence_blocks
				),
			});
		}
		let assignment = self.orchestrator.collator_assignment().await?;
		if !assignment.container_chains.contains_key(&para_id) {
			return Err(Error::MissingAssignment { para_id });
		}
		log::info!("Container {para_id} is registered and has collators assigned");

		// Reachable: connect to the endpoint the chain comes up on.
		*phase = OnboardingPhase::Reachable;
		let chain = ContainerChain(connect_with_retries(&self.endpoint, &self.params).await?);

		// Verified: the same identity and consistency treatment the static
		// chains get, against the grown assignment map.
		*phase = OnboardingPhase::Verified;
		chain.handle().assert_spec_name(CONTAINER_SPEC_NAME).await?;
		let reported = chain.para_id().await?;
		if reported != para_id {
			return Err(Error::IdentityMismatch {
				url: chain.handle().url().to_string(),
				expected: para_id.to_string(),
				actual: reported.to_string(),
			});
		}
		assert_blocks_being_produced(chain.handle(), &self.params).await?;
		let snapshot = fetch_snapshot(self.orchestrator, std::slice::from_ref(&chain)).await?;
		verifier::check_container_mirroring(&snapshot, para_id)?;

		Ok(OnboardedChain { para_id, chain })
	}
}

/// Bounded connection loop for an endpoint that is still coming up.
async fn connect_with_retries(endpoint: &str, params: &WaitParams) -> Result<ChainHandle> {
	let mut last_error = None;
	for attempt in 1..=params.connect_attempts {
		match ChainHandle::connect(endpoint).await {
			Ok(handle) => {
				log::info!("{endpoint} reachable on attempt {attempt}");
				return Ok(handle);
			},
			Err(err) => {
				log::debug!(
					"{endpoint} not reachable yet (attempt {attempt}/{}): {err}",
					params.connect_attempts
				);
				last_error = Some(err);
				// Pause between attempts only; after the last one the
				// caller gets the error straight away.
				if attempt < params.connect_attempts {
					tokio::time::sleep(params.connect_retry_delay).await;
				}
			},
		}
	}

	let detail = match last_error {
		Some(err) => format!("endpoint to accept connections (last error: {err})"),
		None => "endpoint to accept connections".to_string(),
	};
	Err(Error::Timeout {
		chain: endpoint.to_string(),
		operation: detail,
		waited: params.connect_retry_delay * params.connect_attempts.saturating_sub(1),
		progress: WaitProgress::Stalled,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;
	use subxt::ext::scale_value::{At, ValueDef};

	#[test]
	fn numbered_requests_follow_the_naming_convention() {
		let request = RegistrationRequest::numbered(ParaId(2002));
		assert_eq!(request.name, "Container Chain 2002");
		assert_eq!(request.id, "container-chain-2002");
	}

	#[test]
	fn genesis_data_populates_every_registrar_field() {
		let request = RegistrationRequest::numbered(ParaId(2002));
		let genesis = request.genesis_data();

		for field in ["storage", "name", "id", "fork_id", "extensions", "properties"] {
			assert!(genesis.at(field).is_some(), "missing field {field}");
		}
		let fork_id = genesis.at("fork_id").unwrap();
		assert!(
			matches!(&fork_id.value, ValueDef::Variant(v) if v.name == "None"),
			"fork_id should be an explicit None"
		);
		let token = genesis.at("properties").and_then(|p| p.at("token_metadata"));
		assert!(token.and_then(|t| t.at("token_symbol")).is_some());
	}

	#[tokio::test]
	async fn unreachable_endpoint_times_out_within_budget() {
		let params = WaitParams {
			connect_attempts: 2,
			connect_retry_delay: Duration::from_millis(50),
			..WaitParams::default()
		};
		// Nothing listens on the discard port; every attempt fails fast.
		let err = connect_with_retries("ws://127.0.0.1:9/", &params)
			.await
			.err()
			.expect("connecting to an unroutable endpoint must fail");
		assert!(matches!(err, Error::Timeout { .. }), "expected a timeout, got: {err}");
	}

	#[tokio::test]
	async fn retry_loop_pauses_only_between_attempts() {
		let params = WaitParams {
			connect_attempts: 2,
			connect_retry_delay: Duration::from_millis(250),
			..WaitParams::default()
		};
		let started = std::time::Instant::now();
		let err = connect_with_retries("ws://127.0.0.1:9/", &params)
			.await
			.err()
			.expect("connecting to an unroutable endpoint must fail");
		assert!(matches!(err, Error::Timeout { .. }), "expected a timeout, got: {err}");
		// Two attempts mean one pause; a second delay would push the run
		// past the threshold.
		assert!(
			started.elapsed() < Duration::from_millis(450),
			"retry loop slept after the final attempt ({:?})",
			started.elapsed()
		);
	}
}
