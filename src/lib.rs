//! Windlass library — exposes modules for integration testing.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod bootstrap;
pub mod command_runner;
pub mod credentials;
pub mod event;
pub mod intake;
pub mod pipeline;
pub mod provision;
pub mod resolver;
pub mod routing;
pub mod settings;
