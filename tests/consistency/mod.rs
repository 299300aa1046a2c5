// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Live-network consistency suite.
//!
//! Needs a running deployment: one relay chain, one orchestrator parachain,
//! two container chains, plus a free endpoint for the chain registered
//! during the run (see the `*_WS` environment variables). The scenarios run
//! inside a single test because later steps depend on block progression and
//! state changes caused by earlier ones.

use anyhow::{anyhow, Context};
use orchestrator_smoketest::{
	blocks::{assert_blocks_being_produced, wait_for_blocks},
	environment::{initial_clients, TestNetwork},
	onboarding::{Onboarding, RegistrationRequest},
	snapshot::fetch_snapshot,
	types::ParaId,
	verifier,
};
use subxt_signer::sr25519::dev;

const NEW_CONTAINER: ParaId = ParaId(2002);

#[tokio::test(flavor = "multi_thread")]
async fn container_chain_assignment_consistency() -> Result<(), anyhow::Error> {
	let _ = tracing_subscriber::fmt::try_init();

	// Connecting validates each chain's self-reported identity.
	let network = initial_clients().await.context("network setup")?;

	assignment_checks(&network).await?;
	onboarding_flow(&network).await?;

	Ok(())
}

/// Liveness plus the three consistency checks over the static chain set.
async fn assignment_checks(network: &TestNetwork) -> Result<(), anyhow::Error> {
	log::info!("Checking block production on every chain");
	assert_blocks_being_produced(network.orchestrator.handle(), &network.params)
		.await
		.context("orchestrator block production")?;
	for container in &network.containers {
		assert_blocks_being_produced(container.handle(), &network.params)
			.await
			.with_context(|| format!("block production on {}", container.handle().url()))?;
	}

	log::info!("Checking the orchestrator against its own authority set");
	let snapshot = fetch_snapshot(&network.orchestrator, &network.containers)
		.await
		.context("assignment snapshot")?;
	verifier::check_orchestrator_self_consistency(&snapshot)?;

	log::info!("Checking container chains against their assignment entries");
	for para_id in snapshot.container_ids() {
		verifier::check_container_mirroring(&snapshot, para_id)?;
	}

	// Author notes are only meaningful once authoring has had a chance to
	// happen since the assignment took effect.
	log::info!("Waiting {} blocks before author checks", network.params.authoring_blocks);
	wait_for_blocks(network.orchestrator.handle(), network.params.authoring_blocks, &network.params)
		.await?;
	let snapshot = fetch_snapshot(&network.orchestrator, &network.containers)
		.await
		.context("post-authoring snapshot")?;
	for para_id in snapshot.container_ids() {
		verifier::check_author_membership(&snapshot, para_id)?;
	}

	Ok(())
}

/// Register a brand-new container chain and verify it end to end.
async fn onboarding_flow(network: &TestNetwork) -> Result<(), anyhow::Error> {
	log::info!("Registering container {NEW_CONTAINER}");
	let onboarding = Onboarding {
		orchestrator: &network.orchestrator,
		request: RegistrationRequest::numbered(NEW_CONTAINER),
		endpoint: network.endpoints.container_2002.clone(),
		params: network.params.clone(),
	};
	let onboarded =
		onboarding.run(&dev::alice()).await.context("onboarding container 2002")?;
	if onboarded.para_id != NEW_CONTAINER {
		return Err(anyhow!("onboarded chain reports {}", onboarded.para_id));
	}

	// The grown network must be consistent as a whole, not merely the new
	// chain in isolation.
	let mut containers = network.containers.clone();
	containers.push(onboarded.chain);
	let snapshot = fetch_snapshot(&network.orchestrator, &containers)
		.await
		.context("post-onboarding snapshot")?;
	verifier::check_all(&snapshot)?;

	Ok(())
}
