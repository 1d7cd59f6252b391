pub mod ascii;
pub mod checksum;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod estimator;
pub mod modbus;
pub mod options;
pub mod prelude;
pub mod provider;
pub mod register;
pub mod resolve;
pub mod snapshot;
pub mod transport;

pub const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::coordinator::Coordinator;
use crate::prelude::*;

use std::io::Write;

/// Installs the logger. Until [`set_log_level`] runs everything below info
/// is dropped, unless RUST_LOG is set, which then wins.
pub fn init_logging() {
    let from_env = std::env::var_os("RUST_LOG").is_some();

    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();

    if let Err(e) = result {
        eprintln!("Failed to initialise logging: {}", e);
        return;
    }
    if !from_env {
        log::set_max_level(log::LevelFilter::Info);
    }
}

/// Applies the configured `loglevel`.
pub fn set_log_level(level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }

    match level.parse::<log::LevelFilter>() {
        Ok(filter) => log::set_max_level(filter),
        Err(_) => warn!("ignoring invalid loglevel {:?}", level),
    }
}

pub async fn app(
    options: Options,
    config: ConfigWrapper,
    shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) -> Result<()> {
    let mut coordinator = Coordinator::new(config)?;
    info!("{} devices configured", coordinator.devices().len());

    coordinator.probe_all().await;

    if options.once {
        for report in coordinator.poll_all().await {
            println!("{}", serde_json::to_string_pretty(&report.to_json())?);
        }
        return coordinator.persist();
    }

    coordinator.run(shutdown_rx).await
}
