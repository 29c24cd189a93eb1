// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::chain::{BlockChainType, Network};
use crate::ffi::fakes::FakeSigner;
use crate::ffi::SigningBackend;
use crate::keystore::{key_id_for, KeyStore, KeyStoreError};
use crate::vault::{VaultClient, VaultConfig};
use httpmock::prelude::*;
use serde_json::json;
use std::sync::Arc;

async fn connected_vault(server: &MockServer) -> Arc<VaultClient> {
    server.mock(|when, then| {
        when.method(POST).path("/v1/auth/userpass/login/svc");
        then.status(200)
            .json_body(json!({ "auth": { "client_token": "t1" } }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/v1/auth/approle/role/wb/role-id");
        then.status(200).json_body(json!({ "data": { "role_id": "rid" } }));
    });
    server.mock(|when, then| {
        when.method(POST).path("/v1/auth/approle/role/wb/secret-id");
        then.status(200).json_body(json!({ "data": { "secret_id": "sid" } }));
    });
    server.mock(|when, then| {
        when.method(POST).path("/v1/auth/approle/login");
        then.status(200)
            .json_body(json!({ "auth": { "client_token": "t2", "lease_duration": 3600 } }));
    });

    let vault = Arc::new(VaultClient::new(VaultConfig {
        address: server.base_url(),
        username: "svc".to_string(),
        password: "pw".to_string(),
        app_role: "wb".to_string(),
    }));
    vault.connect().await.unwrap();
    vault
}

#[tokio::test]
async fn generate_keypair_writes_record_and_keymap_index() {
    let server = MockServer::start();
    let vault = connected_vault(&server).await;

    let key_id = key_id_for("app-xlm");
    server.mock(|when, then| {
        when.method(GET).path(format!("/v1/secret/whitebox/{key_id}"));
        then.status(404);
    });
    let record_mock = server.mock(|when, then| {
        when.method(POST).path(format!("/v1/secret/whitebox/{key_id}"));
        then.status(200).json_body(json!({}));
    });
    let keymap_mock = server.mock(|when, then| {
        when.method(POST).path_contains("/v1/secret/whitebox/keymap/XLM:");
        then.status(200).json_body(json!({}));
    });

    let keystore = KeyStore::new(vault, Arc::new(FakeSigner), "secret/whitebox".to_string(), Network::Testnet);
    let entry = keystore.generate_keypair("app-xlm", "XLM").await.unwrap();

    assert_eq!(entry.app_id, "app-xlm");
    assert_eq!(entry.bc_type, BlockChainType::XLM);
    assert!(!entry.address.is_empty());
    record_mock.assert();
    keymap_mock.assert();

    let key_map = keystore.get_key_map().await;
    assert_eq!(key_map.get(&key_id).unwrap(), &format!("XLM:{}", entry.address));

    let wb = keystore
        .get_white_box_data(&key_id, BlockChainType::XLM)
        .await
        .unwrap();
    assert_eq!(wb.app_id, "app-xlm");
}

#[tokio::test]
async fn generate_keypair_rejects_duplicate_app_id() {
    let server = MockServer::start();
    let vault = connected_vault(&server).await;

    let key_id = key_id_for("already-there");
    server.mock(|when, then| {
        when.method(GET).path(format!("/v1/secret/whitebox/{key_id}"));
        then.status(200).json_body(json!({
            "data": {
                "appID": "already-there",
                "symbol": "XLM",
                "address": "GASOMEADDRESS",
                "wb": base64::encode("existing"),
            }
        }));
    });

    let keystore = KeyStore::new(vault, Arc::new(FakeSigner), "secret/whitebox".to_string(), Network::Testnet);
    let err = keystore.generate_keypair("already-there", "XLM").await.unwrap_err();
    assert!(matches!(err, KeyStoreError::AlreadyExists(_)));
}

#[tokio::test]
async fn load_accepts_a_self_consistent_store() {
    let server = MockServer::start();
    let vault = connected_vault(&server).await;

    let key_id = key_id_for("app-consistent");
    let wb_bytes = crate::ffi::fakes::FakeSigner.init("app-consistent").unwrap();
    let address = crate::ffi::fakes::FakeSigner
        .public_key(&wb_bytes, BlockChainType::XLM)
        .unwrap();

    server.mock(|when, then| {
        when.method(GET).path("/v1/secret/whitebox");
        then.status(200)
            .json_body(json!({ "data": { "keys": [key_id] } }));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("/v1/secret/whitebox/{key_id}"));
        then.status(200).json_body(json!({
            "data": {
                "appID": "app-consistent",
                "symbol": "XLM",
                "address": address,
                "wb": base64::encode(&wb_bytes.bytes),
            }
        }));
    });

    let keystore = KeyStore::new(vault, Arc::new(FakeSigner), "secret/whitebox".to_string(), Network::Testnet);
    keystore.load().await.unwrap();

    let entries = keystore.list_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].1.address, address);
}

#[tokio::test]
async fn load_rejects_a_store_whose_address_does_not_match_its_whitebox() {
    let server = MockServer::start();
    let vault = connected_vault(&server).await;

    let key_id = key_id_for("app-tampered");
    let wb_bytes = crate::ffi::fakes::FakeSigner.init("app-tampered").unwrap();

    server.mock(|when, then| {
        when.method(GET).path("/v1/secret/whitebox");
        then.status(200)
            .json_body(json!({ "data": { "keys": [key_id] } }));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("/v1/secret/whitebox/{key_id}"));
        then.status(200).json_body(json!({
            "data": {
                "appID": "app-tampered",
                "symbol": "XLM",
                "address": "GDOESNOTMATCHANYTHING",
                "wb": base64::encode(&wb_bytes.bytes),
            }
        }));
    });

    let keystore = KeyStore::new(vault, Arc::new(FakeSigner), "secret/whitebox".to_string(), Network::Testnet);
    let err = keystore.load().await.unwrap_err();
    assert!(matches!(err, KeyStoreError::AddressMismatch { .. }));
}

#[tokio::test]
async fn load_rejects_an_unknown_blockchain_symbol() {
    let server = MockServer::start();
    let vault = connected_vault(&server).await;

    let key_id = key_id_for("app-unknown-chain");
    server.mock(|when, then| {
        when.method(GET).path("/v1/secret/whitebox");
        then.status(200)
            .json_body(json!({ "data": { "keys": [key_id] } }));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("/v1/secret/whitebox/{key_id}"));
        then.status(200).json_body(json!({
            "data": {
                "appID": "app-unknown-chain",
                "symbol": "DOGE",
                "address": "irrelevant",
                "wb": base64::encode("irrelevant"),
            }
        }));
    });

    let keystore = KeyStore::new(vault, Arc::new(FakeSigner), "secret/whitebox".to_string(), Network::Testnet);
    let err = keystore.load().await.unwrap_err();
    assert!(matches!(err, KeyStoreError::UnknownSymbol(_)));
}
