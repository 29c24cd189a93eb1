// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

//! Two-stage startup: if a launch-key secret is mounted, decrypt the
//! config blob directly. Otherwise start a loopback HTTP listener that
//! accepts an unlock key from a companion `unlock` invocation of this same
//! binary, decrypts the blob, and hands off to the real server.
//!
//! Reimplemented on `warp` rather than a `net/rpc`-style protocol: the
//! rest of this service already depends on `warp` for the real HTTP
//! surface, so the unlock listener reuses that stack instead of adding a
//! second one.

use crate::config::{Configuration, ConfigPaths};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use warp::Filter;

const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Serialize, Deserialize)]
struct UnlockRequest {
    /// base64-encoded 32-byte unlock key.
    unlock_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct UnlockResponse {
    message: String,
}

struct UnlockState {
    paths: ConfigPaths,
    attempt: AtomicU32,
}

/// Attempts the launch-key-secret fast path first. If
/// no secret is mounted, blocks running the unlock RPC listener until
/// either a correct key arrives or `MAX_ATTEMPTS` failures occur, in which
/// case the process exits.
pub async fn bootstrap(port: u16) -> Configuration {
    let paths = ConfigPaths::from_env();

    if let Ok(Some(key)) = crate::config::read_launching_key_from_secret(&paths) {
        match crate::config::load_encrypted(&paths, &key) {
            Ok(config) => {
                tracing::info!("unlocked via mounted launch-key secret");
                return config;
            }
            Err(e) => {
                tracing::error!(error = %e, "launch-key secret present but decryption failed");
                std::process::exit(1);
            }
        }
    }

    run_unlock_listener(paths, port).await
}

async fn run_unlock_listener(paths: ConfigPaths, port: u16) -> Configuration {
    let state = Arc::new(UnlockState {
        paths,
        attempt: AtomicU32::new(0),
    });
    let (result_tx, result_rx) = tokio::sync::oneshot::channel::<Option<Configuration>>();
    let result_tx = Arc::new(std::sync::Mutex::new(Some(result_tx)));

    let state_filter = warp::any().map(move || state.clone());
    let tx_filter = warp::any().map(move || result_tx.clone());

    let unlock_route = warp::path("unlock")
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter)
        .and(tx_filter)
        .and_then(handle_unlock);

    let (addr, server) = warp::serve(unlock_route)
        .bind_with_graceful_shutdown(([127, 0, 0, 1], port), async {
            // Shutdown is driven by dropping this future's waker once the
            // caller below decides to stop the listener; see the
            // `tokio::select!` driving both futures to completion.
            futures::future::pending::<()>().await;
        });
    tracing::info!(%addr, "unlock listener ready, waiting for unlock key");

    let server_handle = tokio::spawn(server);

    match result_rx.await {
        Ok(Some(config)) => {
            tracing::info!("unlock succeeded, shutting down unlock listener");
            server_handle.abort();
            config
        }
        _ => {
            tracing::error!("unlock failed {MAX_ATTEMPTS} times, shutting down");
            std::process::exit(1);
        }
    }
}

async fn handle_unlock(
    req: UnlockRequest,
    state: Arc<UnlockState>,
    result_tx: Arc<std::sync::Mutex<Option<tokio::sync::oneshot::Sender<Option<Configuration>>>>>,
) -> Result<impl warp::Reply, Infallible> {
    let attempt = state.attempt.fetch_add(1, Ordering::SeqCst) + 1;

    let key_bytes = match base64::decode(&req.unlock_key) {
        Ok(b) if b.len() == 32 => b,
        _ => {
            return Ok(warp::reply::json(&UnlockResponse {
                message: "Unlock failed.".into(),
            }))
        }
    };
    let mut key = [0u8; 32];
    key.copy_from_slice(&key_bytes);

    match crate::config::load_encrypted(&state.paths, &key) {
        Ok(config) => {
            if let Some(tx) = result_tx.lock().unwrap().take() {
                let _ = tx.send(Some(config));
            }
            Ok(warp::reply::json(&UnlockResponse {
                message: "Unlock succeeded.".into(),
            }))
        }
        Err(_) => {
            if attempt >= MAX_ATTEMPTS {
                if let Some(tx) = result_tx.lock().unwrap().take() {
                    let _ = tx.send(None);
                }
            }
            Ok(warp::reply::json(&UnlockResponse {
                message: "Unlock failed.".into(),
            }))
        }
    }
}

/// Client mode: reads the launch key interactively, hashes it, and posts
/// it to a running unlock listener.
pub async fn unlock_client(port: u16) -> anyhow::Result<()> {
    use sha2::{Digest, Sha256};
    use std::io::Write;

    print!("Enter launching key : ");
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let key = Sha256::digest(input.trim_end_matches(['\r', '\n']).as_bytes());

    let client = reqwest::Client::new();
    let resp: UnlockResponse = client
        .post(format!("http://127.0.0.1:{port}/unlock"))
        .json(&UnlockRequest {
            unlock_key: base64::encode(key),
        })
        .send()
        .await?
        .json()
        .await?;

    println!("{}", resp.message);
    Ok(())
}
