#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod asset;
mod blueprint;
mod cache;
mod cancel;
mod core;
mod engine;
mod error;
mod graph;
#[cfg(feature = "logging")]
mod logging;
mod output;
mod parents;
mod utils;

pub use crate::asset::{Asset, Instance};
pub use crate::blueprint::Blueprint;
pub use crate::cancel::Cancellation;
pub use crate::core::{AssetId, File};
pub use crate::engine::{AssetState, Diagnostics, Engine, Execution, Mode, Options, Status};
pub use crate::error::*;
#[cfg(feature = "logging")]
pub use crate::logging::{LOG_ENV, init_logging};
pub use crate::output::{FileRecord, Manifest};
pub use crate::parents::{Parents, Visibility};
