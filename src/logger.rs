// SPDX-License-Identifier: GPL-3.0-only

use anyhow::Result;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_logger() -> Result<()> {
    let level = if cfg!(debug_assertions) {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };
    let mut filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
        filter = filter.add_directive("rtpvideo_comp=info".parse()?);
    }

    let (journald, journald_err) = match tracing_journald::layer() {
        Ok(layer) => (Some(layer), None),
        Err(err) => (None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .with(journald)
        .try_init()?;
    log_panics::init();

    if let Some(err) = journald_err {
        warn!(?err, "Journald is not available, logging to stderr only");
    }
    info!(
        "Version: {} (git commit {})",
        std::env!("CARGO_PKG_VERSION"),
        std::option_env!("GIT_HASH").unwrap_or("unknown")
    );

    Ok(())
}
