//! ProposalOS Core - Resilient Conversation Orchestration
//!
//! This crate drives the Basis of Estimate fact-collection dialogue: per-client
//! admission through token buckets, sessions kept on an ordered failover chain
//! of storage backends, and model and compliance calls guarded by circuit
//! breakers so that a failing dependency degrades a turn instead of failing it.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
