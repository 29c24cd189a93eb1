// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

//! Explicitly-constructed bundle of every shared subsystem, passed by
//! reference into every handler, rather than relying on package-level
//! mutable globals.

use crate::auth::data::AuthData;
use crate::chain::Network;
use crate::config::Configuration;
use crate::ffi::SigningBackend;
use crate::jwt::JsonWebTokenService;
use crate::keystore::KeyStore;
use crate::vault::VaultClient;
use std::sync::Arc;

#[derive(Clone)]
pub struct Context {
    pub config: Arc<Configuration>,
    pub vault: Arc<VaultClient>,
    pub ffi: Arc<dyn SigningBackend>,
    pub keystore: Arc<KeyStore>,
    pub auth_data: Arc<AuthData>,
    pub jwt: Arc<JsonWebTokenService>,
    pub network: Network,
}

impl Context {
    pub fn new(
        config: Arc<Configuration>,
        vault: Arc<VaultClient>,
        ffi: Arc<dyn SigningBackend>,
        keystore: Arc<KeyStore>,
        auth_data: Arc<AuthData>,
        jwt: Arc<JsonWebTokenService>,
    ) -> Self {
        let network = config.server.block_chain_network;
        Self {
            config,
            vault,
            ffi,
            keystore,
            auth_data,
            jwt,
            network,
        }
    }
}
