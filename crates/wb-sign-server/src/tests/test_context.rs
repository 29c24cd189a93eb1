// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::auth::data::{App, AuthData};
use crate::chain::Network;
use crate::config::{AuthConfig, Configuration, LogConfig, ServerConfig, VaultSettings};
use crate::context::Context;
use crate::ffi::fakes::FakeSigner;
use crate::jwt::JsonWebTokenService;
use crate::keystore::KeyStore;
use crate::vault::{VaultClient, VaultConfig};
use serde_json::Value;
use std::sync::Arc;
use warp::http::header::CONTENT_TYPE;
use warp::http::Response;
use warp::hyper::body::Bytes;

fn test_config() -> Configuration {
    Configuration {
        server: ServerConfig {
            log: LogConfig {
                log_path: String::new(),
                log_access: String::new(),
                log_service: String::new(),
            },
            block_chain_network: Network::Testnet,
            port: 0,
            ffi_library_path: String::new(),
        },
        auth: AuthConfig {
            jwt_secret: "test-jwt-secret".to_string(),
            jwt_expires: 3600,
            question_expires: 60,
        },
        vault: VaultSettings {
            username: "test".to_string(),
            password: "test".to_string(),
            app_role: "test".to_string(),
            address: "http://127.0.0.1:0".to_string(),
            white_box_path: "secret/whitebox".to_string(),
            auth_path: "secret/auth".to_string(),
        },
    }
}

/// Builds a [`Context`] wired to a [`FakeSigner`] and an empty key store —
/// no network calls, no native library. `apps` are pre-registered directly
/// into `AuthData` rather than loaded from a live secret store.
pub async fn new_test_context(apps: Vec<App>) -> TestContext {
    let config = Arc::new(test_config());
    let vault = Arc::new(VaultClient::new(VaultConfig {
        address: config.vault.address.clone(),
        username: config.vault.username.clone(),
        password: config.vault.password.clone(),
        app_role: config.vault.app_role.clone(),
    }));
    let ffi: Arc<dyn crate::ffi::SigningBackend> = Arc::new(FakeSigner);
    let keystore = Arc::new(KeyStore::new(
        Arc::clone(&vault),
        ffi.clone(),
        config.vault.white_box_path.clone(),
        config.server.block_chain_network,
    ));

    let auth_data = Arc::new(AuthData::new());
    auth_data.load_apps(apps).await;

    let jwt = Arc::new(JsonWebTokenService::new(&config.auth.jwt_secret));

    let ctx = Context::new(config, vault, ffi, keystore, auth_data, jwt);
    TestContext::new(ctx)
}

#[derive(Clone)]
pub struct TestContext {
    expect_status_code: u16,
    pub inner: Context,
    bearer_token: String,
    remote_addr: std::net::SocketAddr,
}

impl TestContext {
    pub fn new(context: Context) -> Self {
        Self {
            expect_status_code: 200,
            inner: context,
            bearer_token: String::new(),
            remote_addr: "127.0.0.1:9000".parse().unwrap(),
        }
    }

    pub fn expect_status_code(&self, status_code: u16) -> Self {
        let mut ret = self.clone();
        ret.expect_status_code = status_code;
        ret
    }

    pub fn with_bearer_auth(&self, token: String) -> Self {
        let mut ret = self.clone();
        ret.bearer_token = token;
        ret
    }

    pub fn from_addr(&self, addr: &str) -> Self {
        let mut ret = self.clone();
        ret.remote_addr = addr.parse().unwrap();
        ret
    }

    pub async fn post(&self, path: &str, body: Value) -> Value {
        self.execute(
            warp::test::request()
                .remote_addr(self.remote_addr)
                .header("authorization", format!("Bearer {}", self.bearer_token))
                .method("POST")
                .path(path)
                .json(&body),
        )
        .await
    }

    pub async fn reply(&self, req: warp::test::RequestBuilder) -> Response<Bytes> {
        req.reply(&crate::routes::routes(self.inner.clone())).await
    }

    pub async fn execute(&self, req: warp::test::RequestBuilder) -> Value {
        let resp = self.reply(req).await;

        let headers = resp.headers();
        assert_eq!(headers[CONTENT_TYPE], "application/json; charset=utf-8");

        let body = serde_json::from_slice(resp.body()).expect("response body is JSON");
        assert_eq!(
            self.expect_status_code,
            resp.status(),
            "\nresponse: {}",
            pretty(&body)
        );

        body
    }
}

pub fn pretty(val: &Value) -> String {
    serde_json::to_string_pretty(val).unwrap() + "\n"
}

pub fn test_app(name: &str, cidr: &str) -> (App, ed25519_dalek::Keypair) {
    let mut csprng = rand::rngs::OsRng;
    let keypair = ed25519_dalek::Keypair::generate(&mut csprng);
    let app = App::new(
        name.to_string(),
        &keypair.public.to_bytes(),
        &keypair.secret.to_bytes(),
        cidr,
    )
    .unwrap();
    (app, keypair)
}
