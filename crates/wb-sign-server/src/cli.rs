// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

//! Single-binary multi-mode CLI surface. Administrative
//! subcommands run once and exit; `server` launches the long-running
//! process.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "wb-sign-server", about = "Whitebox-cryptography signing service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Launch the HTTP server.
    Server {
        #[arg(default_value_t = 3456)]
        port: u16,
    },
    /// Connect to an already-running unlock listener and submit the launch key.
    Unlock {
        #[arg(default_value_t = 3456)]
        port: u16,
    },
    /// Create an app auth record: generates an Ed25519 keypair and stores the bind CIDR.
    Appadd { app_name: String, cidr: String },
    /// Create a new WhiteBox keypair for appID.
    Kpgen {
        app_id: String,
        #[arg(value_parser = ["BTC", "ETH", "XLM"])]
        symbol: String,
    },
    /// Print the stored record for appID.
    Kpshow { app_id: String },
    /// List loaded key-store entries.
    Kplist,
    /// Write wb_<keyID>.json (mode 0600).
    Kpbackup { app_id: String },
    /// Restore a keypair from a backup file.
    Kprecover { file_path: String },
}
