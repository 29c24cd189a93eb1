// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

//! Loaded, verified, in-memory index of WhiteBox records. Owns the
//! derive-equals-stored invariant: every entry that makes it into `storage`
//! has already had its address recomputed and checked against the record
//! that was read back from the secret store.

use crate::chain::{address, BlockChainType, Network};
use crate::ffi::{SigningBackend, WhiteBox};
use crate::vault::VaultClient;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("secret store error: {0}")]
    Store(#[from] crate::vault::StoreError),
    #[error("ffi error: {0}")]
    Ffi(#[from] crate::ffi::FfiError),
    #[error("address derivation failed: {0}")]
    BadKey(#[from] address::BadKeyError),
    #[error("unknown blockchain symbol: {0}")]
    UnknownSymbol(String),
    #[error("derived address {derived} does not match stored address {stored} for keyID {key_id}")]
    AddressMismatch {
        key_id: String,
        stored: String,
        derived: String,
    },
    #[error("keypair already exists for appID {0}")]
    AlreadyExists(String),
    #[error("no such keypair: {0}")]
    NotFound(String),
    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Record persisted at `<WhiteBoxPath>/<keyID>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(rename = "appID")]
    app_id: String,
    symbol: String,
    address: String,
    wb: String, // base64
}

#[derive(Debug, Clone)]
pub struct KeyPairEntry {
    pub app_id: String,
    pub bc_type: BlockChainType,
    pub address: String,
    pub white_box: WhiteBox,
}

pub struct KeyStore {
    vault: Arc<VaultClient>,
    ffi: Arc<dyn SigningBackend>,
    white_box_path: String,
    network: Network,
    storage: RwLock<HashMap<String, KeyPairEntry>>,
}

pub fn key_id_for(app_id: &str) -> String {
    hex::encode(Sha256::digest(app_id.as_bytes()))
}

impl KeyStore {
    pub fn new(
        vault: Arc<VaultClient>,
        ffi: Arc<dyn SigningBackend>,
        white_box_path: String,
        network: Network,
    ) -> Self {
        Self {
            vault,
            ffi,
            white_box_path,
            network,
            storage: RwLock::new(HashMap::new()),
        }
    }

    fn record_path(&self, key_id: &str) -> String {
        format!("{}/{}", self.white_box_path.trim_end_matches('/'), key_id)
    }

    /// Lists `WhiteBoxPath`, reads and verifies every entry. Any violation
    /// (unknown symbol, address mismatch) is fatal: the caller is expected
    /// to abort startup rather than run with a half-loaded key store.
    pub async fn load(&self) -> Result<(), KeyStoreError> {
        let key_ids = self.vault.list(&self.white_box_path).await?;
        let mut storage = HashMap::with_capacity(key_ids.len());

        for key_id in key_ids {
            let raw = self.vault.read(&self.record_path(&key_id)).await?;
            let record = decode_record(&raw)?;

            let bc_type = BlockChainType::from_symbol(&record.symbol)
                .ok_or_else(|| KeyStoreError::UnknownSymbol(record.symbol.clone()))?;

            let wb_bytes = base64::decode(&record.wb)
                .map_err(|e| KeyStoreError::Malformed(format!("bad wb base64: {e}")))?;
            let white_box = WhiteBox {
                app_id: record.app_id.clone(),
                bytes: wb_bytes,
            };

            let pubkey = self.ffi.public_key(&white_box, bc_type)?;
            let derived = address::derive(bc_type, &pubkey, self.network)?;
            if derived != record.address {
                return Err(KeyStoreError::AddressMismatch {
                    key_id,
                    stored: record.address,
                    derived,
                });
            }

            storage.insert(
                key_id,
                KeyPairEntry {
                    app_id: record.app_id,
                    bc_type,
                    address: record.address,
                    white_box,
                },
            );
        }

        tracing::info!(count = storage.len(), "key store loaded");
        *self.storage.write().await = storage;
        Ok(())
    }

    pub async fn get_white_box_data(
        &self,
        key_id: &str,
        bc_type: BlockChainType,
    ) -> Option<WhiteBox> {
        let storage = self.storage.read().await;
        storage.get(key_id).and_then(|entry| {
            if entry.bc_type == bc_type {
                Some(entry.white_box.clone())
            } else {
                None
            }
        })
    }

    /// `keyID -> "SYMBOL:ADDRESS"`, the direction the signing path
    /// consumes (the inverted layout some source variants used is not
    /// served here; see the write-through index in `generate_keypair`).
    pub async fn get_key_map(&self) -> HashMap<String, String> {
        let storage = self.storage.read().await;
        storage
            .iter()
            .map(|(key_id, entry)| {
                (key_id.clone(), format!("{}:{}", entry.bc_type, entry.address))
            })
            .collect()
    }

    /// Administrative: create a fresh WhiteBox keypair for `app_id`.
    /// Writes the primary `keyID -> record` entry plus an
    /// operator-facing `symbol:address -> keyID` convenience index.
    pub async fn generate_keypair(
        &self,
        app_id: &str,
        symbol: &str,
    ) -> Result<KeyPairEntry, KeyStoreError> {
        let bc_type =
            BlockChainType::from_symbol(symbol).ok_or_else(|| KeyStoreError::UnknownSymbol(symbol.to_string()))?;
        let key_id = key_id_for(app_id);

        if !self.vault.read(&self.record_path(&key_id)).await.is_err() {
            return Err(KeyStoreError::AlreadyExists(app_id.to_string()));
        }

        let white_box = self.ffi.init(app_id)?;
        let pubkey = self.ffi.public_key(&white_box, bc_type)?;
        let address = address::derive(bc_type, &pubkey, self.network)?;

        self.write_record(&key_id, app_id, bc_type, &address, &white_box)
            .await?;

        let mut index = HashMap::new();
        index.insert(
            "keyID".to_string(),
            serde_json::Value::String(key_id.clone()),
        );
        self.vault
            .write(
                &format!("{}/keymap/{}:{}", self.white_box_path.trim_end_matches('/'), bc_type, address),
                &index,
            )
            .await?;

        let entry = KeyPairEntry {
            app_id: app_id.to_string(),
            bc_type,
            address,
            white_box,
        };
        self.storage
            .write()
            .await
            .insert(key_id, entry.clone());
        Ok(entry)
    }

    async fn write_record(
        &self,
        key_id: &str,
        app_id: &str,
        bc_type: BlockChainType,
        address: &str,
        white_box: &WhiteBox,
    ) -> Result<(), KeyStoreError> {
        let record = StoredRecord {
            app_id: app_id.to_string(),
            symbol: bc_type.symbol().to_string(),
            address: address.to_string(),
            wb: base64::encode(&white_box.bytes),
        };
        self.vault
            .write(&self.record_path(key_id), &encode_record(&record))
            .await?;
        Ok(())
    }

    pub async fn show_keypair_info(&self, app_id: &str) -> Result<KeyPairEntry, KeyStoreError> {
        let key_id = key_id_for(app_id);
        let storage = self.storage.read().await;
        storage
            .get(&key_id)
            .cloned()
            .ok_or_else(|| KeyStoreError::NotFound(app_id.to_string()))
    }

    /// Reads the secret straight from the store (not the in-memory index)
    /// so a fresh backup always reflects the persisted record.
    pub async fn backup_key_pair(&self, app_id: &str) -> Result<StoredRecordPublic, KeyStoreError> {
        let key_id = key_id_for(app_id);
        let raw = self.vault.read(&self.record_path(&key_id)).await?;
        let record = decode_record(&raw)?;
        Ok(StoredRecordPublic {
            app_id: record.app_id,
            symbol: record.symbol,
            address: record.address,
            whitebox: record.wb,
        })
    }

    /// Restores a keypair from a backup file's parsed contents. Requires
    /// the address to recompute exactly as recorded. Callers are
    /// responsible for operator confirmation before calling this when an
    /// entry already exists for the derived KeyID.
    pub async fn recover_key_pair(
        &self,
        backup: StoredRecordPublic,
    ) -> Result<KeyPairEntry, KeyStoreError> {
        let bc_type = BlockChainType::from_symbol(&backup.symbol)
            .ok_or_else(|| KeyStoreError::UnknownSymbol(backup.symbol.clone()))?;
        let wb_bytes = base64::decode(&backup.whitebox)
            .map_err(|e| KeyStoreError::Malformed(format!("bad wb base64: {e}")))?;
        let white_box = WhiteBox {
            app_id: backup.app_id.clone(),
            bytes: wb_bytes,
        };

        let pubkey = self.ffi.public_key(&white_box, bc_type)?;
        let derived = address::derive(bc_type, &pubkey, self.network)?;
        if derived != backup.address {
            return Err(KeyStoreError::AddressMismatch {
                key_id: key_id_for(&backup.app_id),
                stored: backup.address,
                derived,
            });
        }

        let key_id = key_id_for(&backup.app_id);
        self.write_record(&key_id, &backup.app_id, bc_type, &derived, &white_box)
            .await?;

        let entry = KeyPairEntry {
            app_id: backup.app_id,
            bc_type,
            address: derived,
            white_box,
        };
        self.storage
            .write()
            .await
            .insert(key_id, entry.clone());
        Ok(entry)
    }

    /// Produces an encrypted recovery blob for `app_id`'s WhiteBox under a
    /// pair of 128-byte user/server keys, without exposing the WhiteBox
    /// bytes themselves. Pairs with [`KeyStore::recover_key_pair`], which
    /// consumes a blob produced by the matching `restore` native call.
    pub async fn backup_recovery(
        &self,
        app_id: &str,
        user_key: &[u8],
        server_key: &[u8],
    ) -> Result<Vec<u8>, KeyStoreError> {
        let entry = self.show_keypair_info(app_id).await?;
        Ok(self.ffi.recovery(&entry.white_box, user_key, server_key)?)
    }

    pub async fn exists(&self, app_id: &str) -> bool {
        self.storage.read().await.contains_key(&key_id_for(app_id))
    }

    pub async fn list_entries(&self) -> Vec<(String, KeyPairEntry)> {
        self.storage
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[cfg(test)]
    pub async fn insert_for_test(&self, key_id: String, entry: KeyPairEntry) {
        self.storage.write().await.insert(key_id, entry);
    }
}

/// Public-facing shape of a backup file: `{appID, symbol, address,
/// whitebox(base64)}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecordPublic {
    #[serde(rename = "appID")]
    pub app_id: String,
    pub symbol: String,
    pub address: String,
    pub whitebox: String,
}

fn decode_record(raw: &HashMap<String, serde_json::Value>) -> Result<StoredRecord, KeyStoreError> {
    serde_json::from_value(serde_json::Value::Object(
        raw.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
    ))
    .map_err(|e| KeyStoreError::Malformed(e.to_string()))
}

fn encode_record(record: &StoredRecord) -> HashMap<String, serde_json::Value> {
    match serde_json::to_value(record) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
        _ => HashMap::new(),
    }
}
