//! The reservation stock rule that drives inventory approval/rejection for
//! newly created orders, and the cancellation event sink (spec §4.4.2).

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod consumers;

pub use config::Config;
