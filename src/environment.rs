// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Where the network lives and how long we are prepared to wait for it.

use crate::{
	chain::{ChainHandle, ContainerChain, Orchestrator},
	error::Result,
};
use std::{env, time::Duration};

/// Runtime spec name substring the relay chain must advertise.
pub const RELAY_SPEC_NAME: &str = "rococo";
/// Runtime spec name substring the orchestrator chain must advertise.
pub const ORCHESTRATOR_SPEC_NAME: &str = "orchestrator-template-parachain";
/// Runtime spec name substring every container chain must advertise.
pub const CONTAINER_SPEC_NAME: &str = "container-chain-template";

// Default ports follow the local zombienet layout: one relay node, then the
// parachain collators in para id order.
const DEFAULT_RELAY_WS: &str = "ws://127.0.0.1:9944";
const DEFAULT_ORCHESTRATOR_WS: &str = "ws://127.0.0.1:9948";
const DEFAULT_CONTAINER_2000_WS: &str = "ws://127.0.0.1:9949";
const DEFAULT_CONTAINER_2001_WS: &str = "ws://127.0.0.1:9950";
const DEFAULT_CONTAINER_2002_WS: &str = "ws://127.0.0.1:9951";

/// WebSocket endpoints of the network under test, overridable through the
/// `*_WS` environment variables.
#[derive(Debug, Clone)]
pub struct Endpoints {
	pub relay: String,
	pub orchestrator: String,
	pub container_2000: String,
	pub container_2001: String,
	/// Endpoint the dynamically registered chain is expected to come up on.
	pub container_2002: String,
}

impl Endpoints {
	pub fn from_env() -> Self {
		Self {
			relay: var_or("RELAY_WS", DEFAULT_RELAY_WS),
			orchestrator: var_or("ORCHESTRATOR_WS", DEFAULT_ORCHESTRATOR_WS),
			container_2000: var_or("CONTAINER_2000_WS", DEFAULT_CONTAINER_2000_WS),
			container_2001: var_or("CONTAINER_2001_WS", DEFAULT_CONTAINER_2001_WS),
			container_2002: var_or("CONTAINER_2002_WS", DEFAULT_CONTAINER_2002_WS),
		}
	}
}

/// Bounds and block-count heuristics for every wait the harness performs.
///
/// The block counts are convergence proxies. The network exposes no single
/// "assignment distributed" signal, so scenarios wait a fixed number of
/// orchestrator blocks before asserting. Generous defaults keep slow local
/// runs from flaking; tighten them through the environment when wanted.
#[derive(Debug, Clone)]
pub struct WaitParams {
	/// Upper bound for a single block-progression wait.
	pub block_wait_timeout: Duration,
	/// Orchestrator blocks to let pass before author-noting assertions, so
	/// authoring has had a chance to happen since the assignment took effect.
	pub authoring_blocks: u32,
	/// Orchestrator blocks to wait after a registration before expecting the
	/// new chain's assignment to be decided and distributed.
	pub convergence_blocks: u32,
	/// How many times to try connecting to a freshly assigned chain.
	pub connect_attempts: u32,
	/// Pause between connection attempts.
	pub connect_retry_delay: Duration,
}

impl Default for WaitParams {
	fn default() -> Self {
		Self {
			block_wait_timeout: Duration::from_secs(300),
			authoring_blocks: 3,
			convergence_blocks: 8,
			connect_attempts: 30,
			connect_retry_delay: Duration::from_secs(6),
		}
	}
}

impl WaitParams {
	/// Read overrides from the environment, falling back to the defaults.
	pub fn from_env() -> Self {
		let default = Self::default();
		Self {
			block_wait_timeout: Duration::from_secs(numeric_var_or(
				"BLOCK_WAIT_SECS",
				default.block_wait_timeout.as_secs(),
			)),
			authoring_blocks: numeric_var_or("AUTHORING_BLOCKS", default.authoring_blocks as u64)
				as u32,
			convergence_blocks: numeric_var_or(
				"CONVERGENCE_BLOCKS",
				default.convergence_blocks as u64,
			) as u32,
			connect_attempts: numeric_var_or("CONNECT_ATTEMPTS", default.connect_attempts as u64)
				as u32,
			connect_retry_delay: Duration::from_secs(numeric_var_or(
				"CONNECT_RETRY_SECS",
				default.connect_retry_delay.as_secs(),
			)),
		}
	}
}

/// Connected, identity-validated handles for the fixed chain set: one relay,
/// one orchestrator and the two container chains present from genesis.
pub struct TestNetwork {
	pub relay: ChainHandle,
	pub orchestrator: Orchestrator,
	pub containers: Vec<ContainerChain>,
	pub endpoints: Endpoints,
	pub params: WaitParams,
}

/// Connect to every chain of the fixed set and validate what each one
/// reports about itself before any scenario logic runs.
pub async fn initial_clients() -> Result<TestNetwork> {
	let endpoints = Endpoints::from_env();
	let params = WaitParams::from_env();

	let (relay, orchestrator, container_2000, container_2001) = futures::try_join!(
		ChainHandle::connect(&endpoints.relay),
		ChainHandle::connect(&endpoints.orchestrator),
		ChainHandle::connect(&endpoints.container_2000),
		ChainHandle::connect(&endpoints.container_2001),
	)?;

	relay.assert_spec_name(RELAY_SPEC_NAME).await?;
	orchestrator.assert_spec_name(ORCHESTRATOR_SPEC_NAME).await?;
	container_2000.assert_spec_name(CONTAINER_SPEC_NAME).await?;
	container_2001.assert_spec_name(CONTAINER_SPEC_NAME).await?;

	Ok(TestNetwork {
		relay,
		orchestrator: Orchestrator(orchestrator),
		containers: vec![ContainerChain(container_2000), ContainerChain(container_2001)],
		endpoints,
		params,
	})
}

fn var_or(key: &str, default: &str) -> String {
	env::var(key).unwrap_or_else(|_| default.to_string())
}

fn numeric_var_or(key: &str, default: u64) -> u64 {
	env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
