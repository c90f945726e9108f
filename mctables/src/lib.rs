// Copyright 2022 Oxide Computer Company

//! Multicast routing table minimisation for TCAM-backed on-chip
//! routers. A routing table is an ordered list of ternary (key, mask)
//! patterns; the router delivers each packet according to the first
//! pattern its key matches. When a table outgrows the router's
//! fixed-size ternary CAM it has to be compressed into a shorter table
//! that routes every previously-routed key identically.
//!
//! Two minimisers are provided:
//!
//! - [`mtrie`] merges patterns that share a route by folding them
//!   through a collapsing ternary trie. Order-insensitive, exact within
//!   a route.
//! - [`ordered`] (ordered covering) additionally merges entries across
//!   the table by exploiting first-match ordering, pruning candidate
//!   merges with an upcheck/downcheck pair until the table stays
//!   semantically equivalent. Requires, and preserves, ascending
//!   generality order.
//!
//! [`defaults`] strips entries equivalent to the router's default
//! straight-through behaviour, and [`stream`] reads and writes the
//! desktop interchange format.

pub use error::Error;
pub use table::{Entry, KeyMask, Table};

pub mod aliases;
pub mod bitset;
pub mod defaults;
pub mod error;
pub mod merge;
pub mod mtrie;
pub mod ordered;
pub mod stream;
pub mod table;
