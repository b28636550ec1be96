//! # Chaingate Core
//!
//! Core library for the chaingate multi-chain JSON-RPC gateway.
//!
//! This crate provides the foundational components for:
//!
//! - **[`cache`]**: Generic concurrent TTL map with background sweeping, shared by
//!   the response cache and the rate-limit counters.
//!
//! - **[`upstream`]**: Per-chain endpoint pools with continuous health probing,
//!   height-ranked selection, speculative fan-out dispatch, and the atomic pool
//!   registry.
//!
//! - **[`directory`]**: Periodic snapshots of the public EVM chain directory that
//!   feed the primary pool registry.
//!
//! - **[`auth`]**: Startup API-key issuance and the in-memory valid-key set.
//!
//! - **[`metrics`]**: Prometheus metrics for upstream calls, errors, and observed
//!   chain heads.
//!
//! - **[`config`]**: Layered configuration (defaults, TOML file, environment).
//!
//! ## Request Flow
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌──────────────┐
//! │ HTTP frontend│  (crates/server: logging → rate limit → cache middleware)
//! └──────┬───────┘
//!        │ miss
//!        ▼
//! ┌──────────────┐     ┌───────────────┐
//! │  Dispatcher  │────►│ EndpointPool  │  pick(n, exclude)
//! │ (fan-out +   │     │ highest height│
//! │  retry ladder│     │ first, random │
//! │  + fallback) │     │ within a class│
//! └──────┬───────┘     └───────────────┘
//!        │ first success
//!        ▼
//!   Response to client (and into the response cache)
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod directory;
pub mod metrics;
pub mod upstream;
