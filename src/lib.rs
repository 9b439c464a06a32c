// SPDX-License-Identifier: MPL-2.0
#![cfg_attr(not(test), no_std)]
//! Open-channel (LightNVM) command shim over the NVMe transport.
//!
//! The generic open-channel layer drives a device through the [`lightnvm::NvmDevOps`]
//! table that [`register::register`] publishes. Each operation marshals a vendor command
//! with the [`commands`] codec, submits it through a [`transport::Transport`] and
//! translates the response back into the generic model.
extern crate alloc;

/// The commands module contains the command codec and every device operation.
pub mod commands;
/// The config module contains the tunables of the shim.
pub mod config;
pub mod error;
/// The geometry module translates identify responses.
pub mod geometry;
/// The lightnvm module contains the generic model and the contracts of its subsystem.
pub mod lightnvm;
#[cfg(feature = "peek")]
pub mod peek;
/// The register module publishes devices to the generic layer.
pub mod register;
/// The structs module contains the wire layouts.
pub mod structs;
pub mod sync;
/// The transport module contains the contract of the underlying block transport.
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
