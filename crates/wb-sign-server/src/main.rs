// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use std::sync::Arc;
use wb_sign_server::auth::data::{App, AuthData};
use wb_sign_server::cli::{Cli, Command};
use wb_sign_server::context::Context;
use wb_sign_server::ffi::{FfiAdapter, SigningBackend};
use wb_sign_server::jwt::JsonWebTokenService;
use wb_sign_server::keystore::{self, KeyStore};
use wb_sign_server::vault::{VaultClient, VaultConfig};
use wb_sign_server::{config, logging, routes, unlock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Server { port } => run_server(port).await,
        Command::Unlock { port } => unlock::unlock_client(port).await,
        Command::Appadd { app_name, cidr } => run_appadd(app_name, cidr).await,
        Command::Kpgen { app_id, symbol } => run_kpgen(app_id, symbol).await,
        Command::Kpshow { app_id } => run_kpshow(app_id).await,
        Command::Kplist => run_kplist().await,
        Command::Kpbackup { app_id } => run_kpbackup(app_id).await,
        Command::Kprecover { file_path } => run_kprecover(file_path).await,
    }
}

async fn run_server(port: u16) -> anyhow::Result<()> {
    let config = unlock::bootstrap(port).await;
    let _logging_guard = logging::init(Some(&config.server.log));

    tracing::info!(port = config.server.port, "starting whitebox signing service");

    let vault = Arc::new(VaultClient::new(VaultConfig {
        address: config.vault.address.clone(),
        username: config.vault.username.clone(),
        password: config.vault.password.clone(),
        app_role: config.vault.app_role.clone(),
    }));
    vault.connect().await?;
    vault.start_auto_renew();

    let ffi: Arc<dyn SigningBackend> = Arc::new(FfiAdapter::load(&config.server.ffi_library_path)?);

    let keystore = Arc::new(KeyStore::new(
        Arc::clone(&vault),
        Arc::clone(&ffi),
        config.vault.white_box_path.clone(),
        config.server.block_chain_network,
    ));
    keystore.load().await?;

    let auth_data = Arc::new(AuthData::new());
    load_apps(&auth_data, &vault, &config.vault.auth_path).await?;
    auth_data.start_sweeper();

    let jwt = Arc::new(JsonWebTokenService::new(&config.auth.jwt_secret));

    let ctx = Context::new(
        Arc::new(config.clone()),
        vault,
        ffi,
        keystore,
        auth_data,
        jwt,
    );

    let server_port = config.server.port;
    warp::serve(routes::routes(ctx))
        .run(([0, 0, 0, 0], server_port))
        .await;

    Ok(())
}

async fn load_apps(auth_data: &AuthData, vault: &VaultClient, auth_path: &str) -> anyhow::Result<()> {
    let names = vault.list(auth_path).await?;
    let mut apps = Vec::with_capacity(names.len());
    for name in names {
        let raw = vault.read(&format!("{auth_path}/{name}")).await?;
        let public_key = decode_hex_field(&raw, "publicKey")?;
        let private_key = decode_hex_field(&raw, "privateKey")?;
        let bind_cidr = raw
            .get("bind_cidr")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("app {name} missing bind_cidr"))?;
        apps.push(App::new(name, &public_key, &private_key, bind_cidr)?);
    }
    auth_data.load_apps(apps).await;
    Ok(())
}

fn decode_hex_field(raw: &std::collections::HashMap<String, serde_json::Value>, field: &str) -> anyhow::Result<Vec<u8>> {
    let value = raw
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing field {field}"))?;
    Ok(hex::decode(value)?)
}

async fn connect_vault_standalone() -> anyhow::Result<(Arc<VaultClient>, wb_sign_server::config::Configuration)> {
    let paths = config::ConfigPaths::from_env();
    let key = config::read_launching_key_from_secret(&paths)?
        .ok_or_else(|| anyhow::anyhow!("administrative commands require a mounted launch-key secret"))?;
    let cfg = config::load_encrypted(&paths, &key)?;

    let vault = Arc::new(VaultClient::new(VaultConfig {
        address: cfg.vault.address.clone(),
        username: cfg.vault.username.clone(),
        password: cfg.vault.password.clone(),
        app_role: cfg.vault.app_role.clone(),
    }));
    vault.connect().await?;
    Ok((vault, cfg))
}

async fn run_appadd(app_name: String, cidr: String) -> anyhow::Result<()> {
    let (vault, cfg) = connect_vault_standalone().await?;

    cidr.parse::<ipnet::IpNet>()
        .map_err(|e| anyhow::anyhow!("invalid CIDR {cidr}: {e}"))?;

    let mut csprng = rand::rngs::OsRng;
    let keypair = ed25519_dalek::Keypair::generate(&mut csprng);

    let mut record = std::collections::HashMap::new();
    record.insert(
        "publicKey".to_string(),
        serde_json::Value::String(hex::encode(keypair.public.to_bytes())),
    );
    record.insert(
        "privateKey".to_string(),
        serde_json::Value::String(hex::encode(keypair.secret.to_bytes())),
    );
    record.insert("bind_cidr".to_string(), serde_json::Value::String(cidr.clone()));

    vault
        .write(&format!("{}/{}", cfg.vault.auth_path, app_name), &record)
        .await?;

    println!("app {app_name} created, bind_cidr={cidr}");
    Ok(())
}

async fn run_kpgen(app_id: String, symbol: String) -> anyhow::Result<()> {
    let (vault, cfg) = connect_vault_standalone().await?;
    let ffi: Arc<dyn SigningBackend> = Arc::new(FfiAdapter::load(&cfg.server.ffi_library_path)?);
    let keystore = KeyStore::new(
        vault,
        ffi,
        cfg.vault.white_box_path.clone(),
        cfg.server.block_chain_network,
    );

    let entry = keystore.generate_keypair(&app_id, &symbol).await?;
    println!(
        "keyID={} appID={} symbol={} address={}",
        keystore::key_id_for(&app_id),
        entry.app_id,
        entry.bc_type,
        entry.address
    );
    Ok(())
}

async fn run_kpshow(app_id: String) -> anyhow::Result<()> {
    let (vault, cfg) = connect_vault_standalone().await?;
    let ffi: Arc<dyn SigningBackend> = Arc::new(FfiAdapter::load(&cfg.server.ffi_library_path)?);
    let keystore = KeyStore::new(
        vault,
        ffi,
        cfg.vault.white_box_path.clone(),
        cfg.server.block_chain_network,
    );
    keystore.load().await?;

    let entry = keystore.show_keypair_info(&app_id).await?;
    println!(
        "keyID={} appID={} symbol={} address={}",
        keystore::key_id_for(&app_id),
        entry.app_id,
        entry.bc_type,
        entry.address
    );
    Ok(())
}

async fn run_kplist() -> anyhow::Result<()> {
    let (vault, cfg) = connect_vault_standalone().await?;
    let ffi: Arc<dyn SigningBackend> = Arc::new(FfiAdapter::load(&cfg.server.ffi_library_path)?);
    let keystore = KeyStore::new(
        vault,
        ffi,
        cfg.vault.white_box_path.clone(),
        cfg.server.block_chain_network,
    );
    keystore.load().await?;

    for (key_id, entry) in keystore.list_entries().await {
        println!("{key_id}  {}  {}:{}", entry.app_id, entry.bc_type, entry.address);
    }
    Ok(())
}

async fn run_kpbackup(app_id: String) -> anyhow::Result<()> {
    let (vault, cfg) = connect_vault_standalone().await?;
    let ffi: Arc<dyn SigningBackend> = Arc::new(FfiAdapter::load(&cfg.server.ffi_library_path)?);
    let keystore = KeyStore::new(
        vault,
        ffi,
        cfg.vault.white_box_path.clone(),
        cfg.server.block_chain_network,
    );

    let record = keystore.backup_key_pair(&app_id).await?;
    let key_id = keystore::key_id_for(&app_id);
    let file_name = format!("wb_{key_id}.json");
    let json = serde_json::to_vec_pretty(&record)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&file_name)
            .and_then(|mut f| std::io::Write::write_all(&mut f, &json))?;
    }
    #[cfg(not(unix))]
    std::fs::write(&file_name, &json)?;

    println!("wrote {file_name}");
    Ok(())
}

async fn run_kprecover(file_path: String) -> anyhow::Result<()> {
    let (vault, cfg) = connect_vault_standalone().await?;
    let ffi: Arc<dyn SigningBackend> = Arc::new(FfiAdapter::load(&cfg.server.ffi_library_path)?);
    let keystore = KeyStore::new(
        vault,
        ffi,
        cfg.vault.white_box_path.clone(),
        cfg.server.block_chain_network,
    );
    keystore.load().await?;

    let bytes = std::fs::read(&file_path)?;
    let record: keystore::StoredRecordPublic = serde_json::from_slice(&bytes)?;

    if keystore.exists(&record.app_id).await {
        print!("A keypair for appID {} already exists. Overwrite? [YES/no] ", record.app_id);
        std::io::Write::flush(&mut std::io::stdout())?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if answer.trim() != "YES" {
            println!("aborted");
            return Ok(());
        }
    }

    let entry = keystore.recover_key_pair(record).await?;
    println!("recovered keyID={} address={}", keystore::key_id_for(&entry.app_id), entry.address);
    Ok(())
}
