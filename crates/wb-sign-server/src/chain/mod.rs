// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

//! Closed set of supported blockchains and their static parameters. Adding a
//! new chain is a code change: a new enum variant plus a new entry in
//! [`BlockChainType::params`].

pub mod address;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockChainType {
    BTC,
    ETH,
    XLM,
}

/// Static, per-chain parameters the FFI adapter and address deriver need.
pub struct ChainParams {
    pub public_key_length: usize,
    pub signature_length: usize,
    pub hd_depth: u32,
}

impl BlockChainType {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "BTC" => Some(BlockChainType::BTC),
            "ETH" => Some(BlockChainType::ETH),
            "XLM" => Some(BlockChainType::XLM),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BlockChainType::BTC => "BTC",
            BlockChainType::ETH => "ETH",
            BlockChainType::XLM => "XLM",
        }
    }

    pub fn params(&self) -> ChainParams {
        match self {
            BlockChainType::BTC => ChainParams {
                public_key_length: 111,
                signature_length: 65,
                hd_depth: 5,
            },
            BlockChainType::ETH => ChainParams {
                public_key_length: 111,
                signature_length: 65,
                hd_depth: 5,
            },
            BlockChainType::XLM => ChainParams {
                public_key_length: 56,
                signature_length: 64,
                hd_depth: 3,
            },
        }
    }
}

impl fmt::Display for BlockChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Network selector driving BTC's TestNet3 vs MainNet address-version bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn from_str_loose(s: &str) -> Self {
        if s == "mainnet" {
            Network::Mainnet
        } else {
            Network::Testnet
        }
    }
}
