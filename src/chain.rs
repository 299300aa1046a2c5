// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Per-chain client handles.
//!
//! Every chain of interest is reached through the same [`ChainHandle`]; the
//! [`Orchestrator`] and [`ContainerChain`] wrappers add the queries that only
//! exist on those runtimes. All state access goes through the dynamic storage
//! API, so the harness works against independently built runtimes without
//! compiled-in metadata.

use codec::{Decode, Encode};
use std::{collections::BTreeMap, future::Future, time::Duration};
use subxt::{
	backend::{legacy::LegacyRpcMethods, rpc::RpcClient},
	blocks::ExtrinsicEvents,
	config::Header as _,
	dynamic::Value,
	ext::scale_value::{Composite, ValueDef},
	storage::Storage,
	tx::{DynamicPayload, TxProgress, TxStatus},
	OnlineClient, PolkadotConfig,
};
use subxt_signer::sr25519::Keypair;

use crate::{
	environment::WaitParams,
	error::{Error, Result},
	types::{AuthorityKey, Identity, ParaId},
};

type Client = OnlineClient<PolkadotConfig>;
pub(crate) type PinnedStorage = Storage<PolkadotConfig, Client>;

/// One connected chain.
#[derive(Clone)]
pub struct ChainHandle {
	url: String,
	client: Client,
	rpc_client: RpcClient,
}

impl ChainHandle {
	/// Connect to a chain over WebSocket.
	pub async fn connect(url: &str) -> Result<Self> {
		let rpc_client = RpcClient::from_url(url).await?;
		let client = Client::from_rpc_client(rpc_client.clone()).await?;
		log::debug!("Connected to {url}");
		Ok(Self { url: url.to_string(), client, rpc_client })
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	pub fn client(&self) -> &Client {
		&self.client
	}

	fn legacy_rpc(&self) -> LegacyRpcMethods<PolkadotConfig> {
		LegacyRpcMethods::new(self.rpc_client.clone())
	}

	/// The runtime spec name the chain reports about itself.
	pub async fn spec_name(&self) -> Result<String> {
		let version = self.legacy_rpc().state_get_runtime_version(None).await?;
		version
			.other
			.get("specName")
			.and_then(serde_json::Value::as_str)
			.map(ToOwned::to_owned)
			.ok_or_else(|| {
				Error::Rpc(subxt::Error::Other(
					"Runtime version response carries no specName".into(),
				))
			})
	}

	/// Require the chain to be what the caller thinks it is: its advertised
	/// runtime spec name must contain `expected`. Run once per handle at
	/// setup; a mismatch is fatal and never retried.
	pub async fn assert_spec_name(&self, expected: &str) -> Result<()> {
		let actual = self.spec_name().await?;
		if !actual.contains(expected) {
			return Err(Error::IdentityMismatch {
				url: self.url.clone(),
				expected: expected.to_string(),
				actual,
			});
		}
		log::info!("{} runs '{actual}'", self.url);
		Ok(())
	}

	/// Current best block number.
	pub async fn best_number(&self) -> Result<u32> {
		let header = self
			.legacy_rpc()
			.chain_get_header(None)
			.await?
			.ok_or_else(|| subxt::Error::Other("No best header returned".into()))?;
		Ok(header.number())
	}

	/// Storage view pinned to the current best block, so that several reads
	/// observe one consistent state of this chain.
	pub(crate) async fn storage_at_best(&self) -> Result<PinnedStorage> {
		Ok(self.client.storage().at_latest().await?)
	}

	/// Sign `call` with `signer` and submit it, resolving once the extrinsic
	/// is in a block and its dispatch succeeded. Anything that keeps it out
	/// of a block, including a status stream that goes quiet for longer than
	/// `params.block_wait_timeout`, surfaces as
	/// [`Error::TransactionRejected`].
	pub async fn submit_watched(
		&self,
		call: &DynamicPayload,
		signer: &Keypair,
		params: &WaitParams,
	) -> Result<ExtrinsicEvents<PolkadotConfig>> {
		let progress =
			self.client.tx().sign_and_submit_then_watch_default(call, signer).await?;
		within_inclusion_budget(params.block_wait_timeout, wait_for_inclusion(progress)).await
	}
}

/// Drive a transaction's status stream until the extrinsic is in a block and
/// its dispatch succeeded, or a terminal status arrives first.
async fn wait_for_inclusion(
	mut progress: TxProgress<PolkadotConfig, Client>,
) -> Result<ExtrinsicEvents<PolkadotConfig>> {
	while let Some(status) = progress.next().await {
		match status? {
			TxStatus::InBestBlock(in_block) | TxStatus::InFinalizedBlock(in_block) => {
				log::info!(
					"Transaction {:?} included in block {:?}",
					in_block.extrinsic_hash(),
					in_block.block_hash()
				);
				return in_block
					.wait_for_success()
					.await
					.map_err(|e| Error::TransactionRejected { reason: e.to_string() });
			},
			TxStatus::Error { message } =>
				return Err(Error::TransactionRejected { reason: format!("node error: {message}") }),
			TxStatus::Invalid { message } =>
				return Err(Error::TransactionRejected { reason: format!("invalid: {message}") }),
			TxStatus::Dropped { message } =>
				return Err(Error::TransactionRejected { reason: format!("dropped: {message}") }),
			// Still in flight (validated, broadcast, retracted, ...).
			_ => continue,
		}
	}

	Err(Error::TransactionRejected { reason: "status stream ended before inclusion".into() })
}

/// Bound an inclusion wait: a node can accept a transaction and then go
/// silent, and that must not hang the caller forever.
async fn within_inclusion_budget<T>(
	limit: Duration,
	wait: impl Future<Output = Result<T>>,
) -> Result<T> {
	match tokio::time::timeout(limit, wait).await {
		Ok(outcome) => outcome,
		Err(_) => Err(Error::TransactionRejected {
			reason: format!("neither included nor rejected within {limit:?}"),
		}),
	}
}

/// Decoded `CollatorAssignment.CollatorContainerChain` storage value: who
/// produces the orchestrator's own blocks and who is assigned to each
/// container chain.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct AssignedCollators {
	pub orchestrator_chain: Vec<Identity>,
	pub container_chains: BTreeMap<ParaId, Vec<Identity>>,
}

/// Assignment-related orchestrator state, captured from a single block.
#[derive(Debug, Clone)]
pub struct OrchestratorState {
	pub assigned: AssignedCollators,
	/// The orchestrator's active consensus authority keys, in order.
	pub authorities: Vec<AuthorityKey>,
	/// Owner of each authority key, positionally aligned with `authorities`.
	pub key_owners: Vec<Option<Identity>>,
	/// Latest container block author the orchestrator noted, per chain.
	pub latest_authors: BTreeMap<ParaId, Option<Identity>>,
}

/// Handle to the orchestrator chain. The assignment map, the orchestrator's
/// own authority set, session key ownership and the container block authors
/// it has noted all live here.
#[derive(Clone)]
pub struct Orchestrator(pub ChainHandle);

impl Orchestrator {
	pub fn handle(&self) -> &ChainHandle {
		&self.0
	}

	/// Everything the orchestrator knows about assignment, read from one
	/// block so the parts cannot straddle a rotation on this chain. Author
	/// notes are fetched for exactly the given container ids.
	pub async fn assignment_state(&self, container_ids: &[ParaId]) -> Result<OrchestratorState> {
		let store = self.0.storage_at_best().await?;

		let assigned: AssignedCollators =
			fetch_or_default(&store, "CollatorAssignment", "CollatorContainerChain", vec![])
				.await?;
		let authorities: Vec<AuthorityKey> =
			fetch_or_default(&store, "Aura", "Authorities", vec![]).await?;

		let mut key_owners = Vec::with_capacity(authorities.len());
		for key in &authorities {
			let owner: Option<Identity> =
				fetch(&store, "Session", "KeyOwner", vec![key_owner_arg(key)]).await?;
			key_owners.push(owner);
		}

		let mut latest_authors = BTreeMap::new();
		for id in container_ids {
			let author: Option<Identity> =
				fetch(&store, "AuthorNoting", "LatestAuthor", vec![Value::u128(id.0 as u128)])
					.await?;
			latest_authors.insert(*id, author);
		}

		Ok(OrchestratorState { assigned, authorities, key_owners, latest_authors })
	}

	/// The assignment map alone, for callers that do not need a full capture.
	pub async fn collator_assignment(&self) -> Result<AssignedCollators> {
		let store = self.0.storage_at_best().await?;
		fetch_or_default(&store, "CollatorAssignment", "CollatorContainerChain", vec![]).await
	}

	/// Container chain ids whose registration has completed.
	pub async fn registered_para_ids(&self) -> Result<Vec<ParaId>> {
		let store = self.0.storage_at_best().await?;
		fetch_or_default(&store, "Registrar", "RegisteredParaIds", vec![]).await
	}

	/// Submit a sudo-wrapped call and require both the extrinsic and the
	/// inner dispatch to succeed.
	pub async fn submit_privileged(
		&self,
		call: &DynamicPayload,
		signer: &Keypair,
		params: &WaitParams,
	) -> Result<()> {
		let events = self.0.submit_watched(call, signer, params).await?;
		ensure_sudo_succeeded(&events)
	}
}

/// Container-chain-local assignment record, captured from a single block.
#[derive(Debug, Clone)]
pub struct ContainerLocalState {
	pub para_id: ParaId,
	/// Authorities the chain's runtime has recorded for itself.
	pub authorities: Vec<Identity>,
}

/// Handle to a container chain.
#[derive(Clone)]
pub struct ContainerChain(pub ChainHandle);

impl ContainerChain {
	pub fn handle(&self) -> &ChainHandle {
		&self.0
	}

	/// The chain's own numeric id, as its runtime reports it. Queried, never
	/// assumed from configuration.
	pub async fn para_id(&self) -> Result<ParaId> {
		let store = self.0.storage_at_best().await?;
		let id: u32 = fetch_or_default(&store, "ParachainInfo", "ParachainId", vec![]).await?;
		Ok(ParaId(id))
	}

	/// Chain id and locally recorded authorities, from one block.
	pub async fn local_state(&self) -> Result<ContainerLocalState> {
		let store = self.0.storage_at_best().await?;
		let id: u32 = fetch_or_default(&store, "ParachainInfo", "ParachainId", vec![]).await?;
		let authorities: Vec<Identity> =
			fetch_or_default(&store, "AuthoritiesNoting", "Authorities", vec![]).await?;
		Ok(ContainerLocalState { para_id: ParaId(id), authorities })
	}
}

/// `Session.KeyOwner` is keyed by `(KeyTypeId, raw key bytes)`.
fn key_owner_arg(key: &AuthorityKey) -> Value {
	Value::unnamed_composite(vec![Value::from_bytes(*b"aura"), Value::from_bytes(key.as_bytes())])
}

/// The sudo wrapper reports the inner dispatch through `Sudid`; a failing
/// inner call still leaves the wrapping extrinsic successful, so it has to
/// be inspected separately.
fn ensure_sudo_succeeded(events: &ExtrinsicEvents<PolkadotConfig>) -> Result<()> {
	for event in events.iter() {
		let event = event?;
		if event.pallet_name() == "Sudo" && event.variant_name() == "Sudid" {
			let fields = event.field_values()?;
			if let Composite::Named(named) = &fields {
				for (name, value) in named {
					if name.as_str() == "sudo_result" {
						if let ValueDef::Variant(var) = &value.value {
							if var.name == "Err" {
								return Err(Error::TransactionRejected {
									reason: format!("sudo dispatch failed: {value}"),
								});
							}
						}
					}
				}
			}
		}
	}
	Ok(())
}

/// Fetch a storage value and decode it from its SCALE bytes, `None` when the
/// entry is unset.
pub(crate) async fn fetch<T: Decode>(
	store: &PinnedStorage,
	pallet: &str,
	entry: &str,
	keys: Vec<Value>,
) -> Result<Option<T>> {
	let addr = subxt::dynamic::storage(pallet, entry, keys);
	let Some(thunk) = store.fetch(&addr).await? else { return Ok(None) };
	let bytes = thunk.into_encoded();
	Ok(Some(T::decode(&mut &bytes[..])?))
}

/// Like [`fetch`], but substituting the type's metadata default when the
/// entry is unset.
pub(crate) async fn fetch_or_default<T: Decode>(
	store: &PinnedStorage,
	pallet: &str,
	entry: &str,
	keys: Vec<Value>,
) -> Result<T> {
	let addr = subxt::dynamic::storage(pallet, entry, keys);
	let thunk = store.fetch_or_default(&addr).await?;
	let bytes = thunk.into_encoded();
	Ok(T::decode(&mut &bytes[..])?)
}
