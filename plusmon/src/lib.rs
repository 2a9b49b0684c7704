//! The plusmon NGINX Plus status collector.
//!
//! This library polls the JSON status API of a single NGINX Plus server and
//! flattens the nested status documents into timestamped, dimensioned
//! [`record::MetricRecord`] values. It supports both the legacy `/status`
//! endpoint and the versioned `/api/{version}` endpoint, negotiating between
//! the two once per [`client::StatusClient`].
//!
//! A host drives the core through two entry points: [`agent::Agent::configure`]
//! and [`agent::Agent::read`]. The `plusmon` binary found elsewhere in this
//! project is one such host.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod agent;
pub mod catalog;
pub mod client;
pub mod config;
pub mod dimension;
pub mod emitter;
pub mod manager;
pub mod options;
pub mod path;
pub mod record;
pub mod sink;
