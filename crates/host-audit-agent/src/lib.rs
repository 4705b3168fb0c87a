//! Host Audit Agent
//!
//! Operational surface over the audit engine: an HTTP handler exposing
//! metrics, SLO alerts and run verification, and the `host-audit` CLI.

pub mod handler;
