// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed client for the remote secret store. Bootstraps via a userpass ->
//! AppRole token exchange and keeps itself alive with a background renewer;
//! the renewer is the only subsystem allowed to terminate the process after
//! startup.

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("secret store transport error: {0}")]
    Transport(String),
    #[error("secret store returned an unexpected response: {0}")]
    Protocol(String),
    #[error("not authenticated")]
    NotAuthenticated,
}

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub address: String,
    pub username: String,
    pub password: String,
    pub app_role: String,
}

struct Auth {
    token: String,
    lease_duration_secs: u64,
}

/// A thin wrapper over the secret store's HTTP KV surface, plus the
/// userpass -> AppRole bootstrap and a self-renewing background task.
pub struct VaultClient {
    config: VaultConfig,
    http: ClientWithMiddleware,
    auth: RwLock<Option<Auth>>,
    shutdown: AtomicBool,
}

impl VaultClient {
    pub fn new(config: VaultConfig) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let http = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Self {
            config,
            http,
            auth: RwLock::new(None),
            shutdown: AtomicBool::new(false),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.auth.read().await.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.address.trim_end_matches('/'), path)
    }

    async fn token(&self) -> Result<String, StoreError> {
        self.auth
            .read()
            .await
            .as_ref()
            .map(|a| a.token.clone())
            .ok_or(StoreError::NotAuthenticated)
    }

    /// Username/password login -> T1 -> AppRole role-id/secret-id -> T2.
    /// Mirrors `vault.go`'s `Connect()`: on any step failing the caller
    /// (the bootstrap/renewer loop) is responsible for deciding whether to
    /// retry; this method itself never retries.
    pub async fn connect(&self) -> Result<(), StoreError> {
        tracing::info!(address = %self.config.address, "connecting to secret store");

        let login_body = serde_json::json!({ "password": self.config.password });
        let login_resp: Value = self
            .http
            .post(self.url(&format!("auth/userpass/login/{}", self.config.username)))
            .json(&login_body)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| StoreError::Protocol(e.to_string()))?;

        let t1 = login_resp["auth"]["client_token"]
            .as_str()
            .ok_or_else(|| StoreError::Protocol("missing auth.client_token".into()))?
            .to_string();

        let role_id_resp: Value = self
            .http
            .get(self.url(&format!(
                "auth/approle/role/{}/role-id",
                self.config.app_role
            )))
            .header("X-Vault-Token", &t1)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| StoreError::Protocol(e.to_string()))?;
        let role_id = role_id_resp["data"]["role_id"]
            .as_str()
            .ok_or_else(|| StoreError::Protocol("missing data.role_id".into()))?
            .to_string();

        let secret_id_resp: Value = self
            .http
            .post(self.url(&format!(
                "auth/approle/role/{}/secret-id",
                self.config.app_role
            )))
            .header("X-Vault-Token", &t1)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| StoreError::Protocol(e.to_string()))?;
        let secret_id = secret_id_resp["data"]["secret_id"]
            .as_str()
            .ok_or_else(|| StoreError::Protocol("missing data.secret_id".into()))?
            .to_string();

        let approle_login_body = serde_json::json!({ "role_id": role_id, "secret_id": secret_id });
        let approle_resp: Value = self
            .http
            .post(self.url("auth/approle/login"))
            .json(&approle_login_body)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| StoreError::Protocol(e.to_string()))?;

        let t2 = approle_resp["auth"]["client_token"]
            .as_str()
            .ok_or_else(|| StoreError::Protocol("missing auth.client_token".into()))?
            .to_string();
        let lease_duration_secs = approle_resp["auth"]["lease_duration"].as_u64().unwrap_or(3600);

        *self.auth.write().await = Some(Auth {
            token: t2,
            lease_duration_secs,
        });
        tracing::info!("secret store bootstrap complete");
        Ok(())
    }

    async fn renew_self(&self) -> Result<u64, StoreError> {
        let token = self.token().await?;
        let resp: Value = self
            .http
            .post(self.url("auth/token/renew-self"))
            .header("X-Vault-Token", &token)
            .json(&serde_json::json!({ "increment": 0 }))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| StoreError::Protocol(e.to_string()))?;
        resp["auth"]["lease_duration"]
            .as_u64()
            .ok_or_else(|| StoreError::Protocol("missing auth.lease_duration".into()))
    }

    /// Spawns the background renewer. Sleeps 80% of the current lease
    /// duration, then self-renews; on failure retries the full bootstrap up
    /// to 5 times with a 10s gap, then terminates the process. This is the
    /// one subsystem allowed to do so after startup.
    pub fn start_auto_renew(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if this.shutdown.load(Ordering::Relaxed) {
                    return;
                }
                let lease = this
                    .auth
                    .read()
                    .await
                    .as_ref()
                    .map(|a| a.lease_duration_secs)
                    .unwrap_or(3600);
                let sleep_secs = lease * 80 / 100;
                tracing::info!(sleep_secs, "secret store token will be renewed");
                tokio::time::sleep(Duration::from_secs(sleep_secs.max(1))).await;

                match this.renew_self().await {
                    Ok(new_lease) => {
                        if let Some(auth) = this.auth.write().await.as_mut() {
                            auth.lease_duration_secs = new_lease;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "secret store token renewal failed, reconnecting");
                        let mut reconnected = false;
                        for attempt in 1..=5 {
                            tracing::info!(attempt, "trying to reconnect to secret store");
                            if this.connect().await.is_ok() {
                                reconnected = true;
                                break;
                            }
                            tokio::time::sleep(Duration::from_secs(10)).await;
                        }
                        if !reconnected {
                            tracing::error!("cannot reconnect to secret store, shutting down");
                            std::process::exit(1);
                        }
                    }
                }
            }
        });
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub async fn list(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let token = self.token().await?;
        let resp: Value = self
            .http
            .request(
                reqwest::Method::from_bytes(b"LIST").unwrap(),
                self.url(path),
            )
            .header("X-Vault-Token", &token)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| StoreError::Protocol(e.to_string()))?;

        Ok(resp["data"]["keys"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn read(&self, path: &str) -> Result<HashMap<String, Value>, StoreError> {
        let token = self.token().await?;
        let resp: Value = self
            .http
            .get(self.url(path))
            .header("X-Vault-Token", &token)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| StoreError::Protocol(e.to_string()))?;

        match resp["data"].as_object() {
            Some(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            None => Err(StoreError::Protocol(format!("no data at {path}"))),
        }
    }

    pub async fn write(&self, path: &str, data: &HashMap<String, Value>) -> Result<(), StoreError> {
        let token = self.token().await?;
        self.http
            .post(self.url(path))
            .header("X-Vault-Token", &token)
            .json(data)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(())
    }
}
