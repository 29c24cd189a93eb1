// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod auth;
pub mod chain;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod ffi;
pub mod jwt;
pub mod keystore;
pub mod logging;
pub mod metrics;
pub mod protected;
pub mod routes;
pub mod unlock;
pub mod vault;

#[cfg(test)]
mod tests;
