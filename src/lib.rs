//! A client library for Mercurial's command-server protocol: a long-running
//! `hg serve --cmdserver pipe` child process that accepts commands and
//! streams responses over a framed binary protocol on its stdio.
//!
//! Open a [`Session`], then either drive it directly with
//! [`Session::run_command`]/[`Session::get_command_output`] or use one of
//! the typed adapters in [`command`] (`init`, `add`, `commit`, `log`, …).

#![warn(
    anonymous_parameters,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_qualifications,
    variant_size_differences
)]

pub mod command;
pub mod error;
pub mod process;
pub mod protocol;
pub mod session;

pub use error::{CommandError, CommandResult, Error, Result};
pub use session::{InputProviders, OutputSinks, Session};
