#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::similar_names
)]

pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod message;
pub mod ops;
pub mod peer;
pub mod storage;
pub mod transport;

mod dispatch;
mod format;
mod logger;
mod persist;
mod protocol;
mod task;
