//! gitcensus - history-and-blame aggregation engine
//!
//! Turns the commit history and current blame of many git repositories into
//! per-developer, per-team and per-subsystem statistics:
//!
//! - [`identity`] resolves raw authors to canonical developers
//! - [`subsystem`] maps repository paths to subsystems
//! - [`git`] extracts history (`git log --numstat`) and blame
//! - [`aggregate`] folds commits into month buckets; years are sums of months
//! - [`ownership`] folds blame into subsystem ownership and liveness
//! - [`metrics`] derives badges and size rankings
//! - [`store`] persists snapshots, [`pipeline`] runs it all

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod exec;
pub mod git;
pub mod identity;
pub mod language;
pub mod metrics;
pub mod models;
pub mod ownership;
pub mod period;
pub mod pipeline;
pub mod store;
pub mod subsystem;
pub mod teams;
