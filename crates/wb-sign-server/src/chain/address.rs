// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pure, deterministic (BlockChainType, extended public key, network) ->
//! address derivation. No I/O, no FFI — this module only ever sees ASCII
//! public key material handed back by the FFI adapter.

use super::{BlockChainType, Network};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

const TESTNET3_XPUB_VERSION: [u8; 4] = [0x04, 0x35, 0x87, 0xCF];

const BTC_MAINNET_P2PKH_VERSION: u8 = 0x00;
const BTC_TESTNET_P2PKH_VERSION: u8 = 0x6f;

#[derive(Debug, thiserror::Error)]
pub enum BadKeyError {
    #[error("base58check decode failed: {0}")]
    Base58(String),
    #[error("checksum mismatch")]
    Checksum,
    #[error("extended key has unexpected length {0}, expected 78")]
    Length(usize),
    #[error("invalid secp256k1 point: {0}")]
    Secp256k1(String),
}

/// A parsed BIP-32 extended key: 4-byte version, 33-byte (possibly
/// compressed) public key payload. Depth/fingerprint/chain-code are not
/// needed by address derivation and are discarded.
struct ExtendedKey {
    version: [u8; 4],
    key_bytes: [u8; 33],
}

fn decode_extended_key(s: &str) -> Result<ExtendedKey, BadKeyError> {
    let full = bs58::decode(s)
        .into_vec()
        .map_err(|e| BadKeyError::Base58(e.to_string()))?;
    if full.len() < 4 {
        return Err(BadKeyError::Length(full.len()));
    }
    let (payload, checksum) = full.split_at(full.len() - 4);
    let round1 = Sha256::digest(payload);
    let round2 = Sha256::digest(round1);
    if &round2[0..4] != checksum {
        return Err(BadKeyError::Checksum);
    }
    if payload.len() != 78 {
        return Err(BadKeyError::Length(payload.len()));
    }

    let mut version = [0u8; 4];
    version.copy_from_slice(&payload[0..4]);
    let mut key_bytes = [0u8; 33];
    key_bytes.copy_from_slice(&payload[45..78]);

    Ok(ExtendedKey { version, key_bytes })
}

fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripe);
    out
}

fn derive_btc(pubkey: &str, network: Network) -> Result<String, BadKeyError> {
    let xpub = decode_extended_key(pubkey)?;

    let is_testnet =
        network == Network::Testnet || xpub.version == TESTNET3_XPUB_VERSION;
    let version_byte = if is_testnet {
        BTC_TESTNET_P2PKH_VERSION
    } else {
        BTC_MAINNET_P2PKH_VERSION
    };

    let pkh = hash160(&xpub.key_bytes);
    Ok(bs58::encode(pkh)
        .with_check_version(version_byte)
        .into_string())
}

fn derive_eth(pubkey: &str) -> Result<String, BadKeyError> {
    let xpub = decode_extended_key(pubkey)?;

    let verifying = k256::PublicKey::from_sec1_bytes(&xpub.key_bytes)
        .map_err(|e| BadKeyError::Secp256k1(e.to_string()))?;
    let uncompressed = verifying.to_encoded_point(false);
    let uncompressed_bytes = uncompressed.as_bytes(); // 0x04 || X(32) || Y(32)

    let mut hasher = Keccak::v256();
    let mut hash = [0u8; 32];
    hasher.update(&uncompressed_bytes[1..]);
    hasher.finalize(&mut hash);

    let address_bytes = &hash[12..32];
    Ok(to_eip55(address_bytes))
}

/// EIP-55 mixed-case checksum encoding of a 20-byte address.
fn to_eip55(address: &[u8]) -> String {
    let lower_hex = hex::encode(address);

    let mut hasher = Keccak::v256();
    let mut hash = [0u8; 32];
    hasher.update(lower_hex.as_bytes());
    hasher.finalize(&mut hash);
    let hash_hex = hex::encode(hash);

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (ch, hash_nibble_char) in lower_hex.chars().zip(hash_hex.chars()) {
        if ch.is_ascii_alphabetic() {
            let hash_nibble = hash_nibble_char.to_digit(16).unwrap_or(0);
            if hash_nibble >= 8 {
                out.push(ch.to_ascii_uppercase());
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// Derives the canonical address string for a given chain and extended
/// public key. XLM is a pass-through: the input string already IS an
/// Ed25519 strkey address, handed to us verbatim by the FFI adapter.
pub fn derive(
    bc_type: BlockChainType,
    pubkey: &str,
    network: Network,
) -> Result<String, BadKeyError> {
    match bc_type {
        BlockChainType::BTC => derive_btc(pubkey, network),
        BlockChainType::ETH => derive_eth(pubkey),
        BlockChainType::XLM => Ok(pubkey.to_string()),
    }
}

#[cfg(test)]
pub fn encode_extended_key_for_test(version: [u8; 4], key_bytes: [u8; 33]) -> String {
    let mut payload = Vec::with_capacity(78);
    payload.extend_from_slice(&version);
    payload.push(0); // depth
    payload.extend_from_slice(&[0u8; 4]); // parent fingerprint
    payload.extend_from_slice(&[0u8; 4]); // child number
    payload.extend_from_slice(&[0u8; 32]); // chain code
    payload.extend_from_slice(&key_bytes);

    let round1 = Sha256::digest(&payload);
    let round2 = Sha256::digest(round1);
    payload.extend_from_slice(&round2[0..4]);
    bs58::encode(payload).into_string()
}
