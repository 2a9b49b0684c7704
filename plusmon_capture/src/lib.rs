//! Crate regarding plusmon's 'capture' files
//!
//! A capture file is a JSON-lines record of every metric plusmon emitted, one
//! observation per line. Its main use is offline inspection of what a status
//! endpoint reported over a run.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::perf)]
#![deny(clippy::suspicious)]
#![deny(clippy::complexity)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

pub mod jsonl;
pub mod line;
