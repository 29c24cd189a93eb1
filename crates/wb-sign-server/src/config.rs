// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration model and the AES-CFB at-rest encryption of the config
//! blob. Path defaults are overridable via the `TSS_*` environment
//! variables, matching `config.go`'s `setEnv` convention.

use crate::chain::Network;
use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use std::path::PathBuf;

type Aes256CfbEnc = cfb_mode::Encryptor<aes::Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<aes::Aes256>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found at {0}")]
    NotFound(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("incorrect unlock key")]
    BadKey,
    #[error("malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("ciphertext too short to contain an IV")]
    Truncated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(rename = "log_path")]
    pub log_path: String,
    #[serde(rename = "log_access")]
    pub log_access: String,
    #[serde(rename = "log_service")]
    pub log_service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(flatten)]
    pub log: LogConfig,
    #[serde(rename = "bc_network")]
    pub block_chain_network: Network,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path to the native whitebox-cryptography shared library, dynamically
    /// loaded by the FFI adapter at startup.
    #[serde(rename = "ffi_library_path", default = "default_ffi_library_path")]
    pub ffi_library_path: String,
}

fn default_port() -> u16 {
    3456
}

fn default_ffi_library_path() -> String {
    "libtrustsigner.so".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "jwtSecret")]
    pub jwt_secret: String,
    #[serde(rename = "jwtExpires")]
    pub jwt_expires: i64,
    #[serde(rename = "questionExpires")]
    pub question_expires: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSettings {
    pub username: String,
    pub password: String,
    #[serde(rename = "approle")]
    pub app_role: String,
    pub address: String,
    #[serde(rename = "whiteboxPath")]
    pub white_box_path: String,
    #[serde(rename = "authPath")]
    pub auth_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub vault: VaultSettings,
}

/// Filesystem layout, overridable the same way `config.go` reads
/// `TSS_PATH`/`TSS_CONFIGFILE`/`TSS_RAWCONFIGFILE`/`TSS_SECRETFILE`.
pub struct ConfigPaths {
    pub root: PathBuf,
    pub dot_config_file: PathBuf,
    pub raw_config_file: PathBuf,
    pub raw_config_file_remove: PathBuf,
    pub secret_file: PathBuf,
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl ConfigPaths {
    pub fn from_env() -> Self {
        let root = PathBuf::from(env_or("TSS_PATH", "."));
        let dot_config_file =
            PathBuf::from(env_or("TSS_CONFIGFILE", &format!("{}/etc/.config", root.display())));
        let raw_config_file = PathBuf::from(env_or(
            "TSS_RAWCONFIGFILE",
            &format!("{}/etc/config.json", root.display()),
        ));
        let raw_config_file_remove = PathBuf::from(env_or(
            "TSS_RAWCONFIGFILEREMOVE",
            &format!("{}.REMOVE", raw_config_file.display()),
        ));
        let secret_file = PathBuf::from(env_or("TSS_SECRETFILE", "/run/secrets/tssLaunchingKey"));

        Self {
            root,
            dot_config_file,
            raw_config_file,
            raw_config_file_remove,
            secret_file,
        }
    }
}

/// Reads the mounted launch-key secret, trims trailing CR/LF, and
/// SHA-256-hashes the UTF-8 bytes into the 32-byte unlock key. Returns
/// `None` if no secret file is mounted (the caller then falls back to the
/// interactive/RPC unlock path).
pub fn read_launching_key_from_secret(paths: &ConfigPaths) -> Result<Option<[u8; 32]>, ConfigError> {
    if !paths.secret_file.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&paths.secret_file)?;
    let trimmed = raw.trim_end_matches(['\r', '\n']);
    Ok(Some(Sha256::digest(trimmed.as_bytes()).into()))
}

/// Encrypts `plaintext` under AES-256-CFB with a random IV prefixed to the
/// ciphertext: the IV is the first block-size bytes of the file.
pub fn encrypt_config(key: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
    let mut iv = [0u8; 16];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut iv);

    let mut buf = plaintext.to_vec();
    Aes256CfbEnc::new_from_slices(key, &iv)
        .expect("32-byte key and 16-byte IV are always valid")
        .encrypt(&mut buf);

    let mut out = Vec::with_capacity(16 + buf.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&buf);
    out
}

/// Decrypts a blob produced by [`encrypt_config`] and parses the result as
/// a [`Configuration`]. A wrong key does not fail the AES step (CFB has no
/// MAC) but almost always fails the subsequent JSON parse,
/// which is surfaced uniformly as [`ConfigError::BadKey`].
pub fn decrypt_config(key: &[u8; 32], ciphertext: &[u8]) -> Result<Configuration, ConfigError> {
    if ciphertext.len() < 16 {
        return Err(ConfigError::Truncated);
    }
    let (iv, body) = ciphertext.split_at(16);
    let mut buf = body.to_vec();
    Aes256CfbDec::new_from_slices(key, iv)
        .map_err(|_| ConfigError::Truncated)?
        .decrypt(&mut buf);

    serde_json::from_slice(&buf).map_err(|_| ConfigError::BadKey)
}

pub fn load_encrypted(paths: &ConfigPaths, key: &[u8; 32]) -> Result<Configuration, ConfigError> {
    if !paths.dot_config_file.exists() {
        return Err(ConfigError::NotFound(paths.dot_config_file.clone()));
    }
    let bytes = std::fs::read(&paths.dot_config_file)?;
    decrypt_config(key, &bytes)
}

/// One-time migration: if a plaintext `config.json` is present, encrypt it
/// under `key` into the `.config` blob and rename the plaintext out of the
/// way, mirroring `config.go`'s `init()`.
pub fn seal_raw_config_if_present(paths: &ConfigPaths, key: &[u8; 32]) -> Result<bool, ConfigError> {
    if !paths.raw_config_file.exists() {
        return Ok(false);
    }
    let raw = std::fs::read(&paths.raw_config_file)?;
    let sealed = encrypt_config(key, &raw);
    std::fs::write(&paths.dot_config_file, sealed)?;
    std::fs::rename(&paths.raw_config_file, &paths.raw_config_file_remove)?;
    Ok(true)
}
