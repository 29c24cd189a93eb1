// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

//! Structured logging setup. Mirrors `config.go`'s `setLogger`: stdout
//! always gets output, and if a service log path is configured, a rolling
//! file sink is layered on top via a non-blocking writer.

use crate::config::LogConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Keeps the background flush thread for the file appender alive for the
/// life of the process; dropping it stops the writer.
pub struct LoggingGuard(#[allow(dead_code)] Option<tracing_appender::non_blocking::WorkerGuard>);

pub fn init(log: Option<&LogConfig>) -> LoggingGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = fmt::layer().with_target(true);

    match log.filter(|l| !l.log_service.is_empty()) {
        Some(log) => {
            let file_appender = tracing_appender::rolling::never(&log.log_path, &log.log_service);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer().with_ansi(false).with_writer(non_blocking);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();

            LoggingGuard(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .init();
            LoggingGuard(None)
        }
    }
}
