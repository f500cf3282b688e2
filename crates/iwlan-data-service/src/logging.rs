// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use crate::error::Result;

pub const DEFAULT_LOG_FILE: &str = "iwlan-data-service.log";

fn env_filter() -> Result<EnvFilter> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;
    Ok(filter)
}

pub fn setup_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter()?)
        .compact()
        .init();
    Ok(())
}

/// Logs to `DEFAULT_LOG_FILE` in `log_dir`. The returned guard flushes pending
/// lines when dropped and must be kept alive for the lifetime of the process.
pub fn setup_logging_to_file<P: AsRef<Path>>(log_dir: P) -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(log_dir, DEFAULT_LOG_FILE);
    let (file_writer, worker_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter()?)
        .compact()
        .with_ansi(false)
        .with_writer(file_writer)
        .init();

    std::panic::set_hook(Box::new(|panic| {
        tracing::error!(message = %panic);
    }));

    Ok(worker_guard)
}
