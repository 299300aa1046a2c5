// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Consistency harness for orchestrator-assigned container chains.
//!
//! Connects to an already running network, a relay chain, an orchestrator
//! parachain and its container chains, and checks that the collator
//! assignment the orchestrator computes is what every chain actually acts
//! on: the orchestrator's own authority set corresponds positionally to its
//! self-assignment, each container chain's local authority record mirrors
//! its entry in the assignment map, and the block authors the orchestrator
//! notes are legitimate assignees. It also drives the registration of a
//! brand-new container chain end to end and verifies it the same way once
//! it is live.
//!
//! The harness only reads state and (for registration) submits extrinsics
//! over WebSocket. Spawning the network is out of scope; point the `*_WS`
//! environment variables at whatever deployment should be exercised.

pub mod blocks;
pub mod chain;
pub mod environment;
pub mod error;
pub mod onboarding;
pub mod snapshot;
pub mod types;
pub mod verifier;

pub use error::{Error, Result};
