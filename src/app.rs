//! Application runner.
//!
//! It connects to the Web UI, compiles the blocklist and runs one cycle
//! every `core.interval` seconds until `Ctrl-C` is received.
//!
//! The configuration is read again before every cycle, so the thresholds and
//! the blocklist can be changed without a restart. A configuration that can't
//! be loaded is logged and the previous one is kept. The Web UI connection and
//! the logging threshold are only read at startup.
//!
//! Only startup failures stop the application. A cycle that fails is logged
//! and the next one starts on schedule.
use std::sync::Arc;
use std::time::Duration;

use bittorrent_ban_core::blocklist::{Blocklist, CompiledBlocklist};
use bittorrent_ban_core::cycle::CycleOrchestrator;
use bittorrent_ban_core::error::CycleError;
use peer_banner_configuration::{Configuration, Info};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::qbittorrent::WebUi;

/// # Errors
///
/// Will return an error if the blocklist can't be compiled or the Web UI
/// can't be used.
pub async fn run(config: &Configuration, info: &Info) -> Result<(), Error> {
    let blocklist = compile_blocklist(config)?;

    let web_ui = Arc::new(WebUi::new(&config.client).map_err(|source| Error::WebUi { source })?);

    let mut shutdown = shutdown_signal();

    if config.core.start_delay > 0 {
        info!(seconds = config.core.start_delay, "Waiting before the first cycle");

        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs(config.core.start_delay)) => {}
            _ = shutdown.changed() => {
                info!("Peer banner stopped before the first cycle");
                return Ok(());
            }
        }
    }

    web_ui.login().await.map_err(|source| Error::WebUi { source })?;

    match web_ui.version().await {
        Ok(version) => info!(%version, url = %config.client.url, "Connected to qBittorrent"),
        Err(err) => warn!(%err, "Unable to read the qBittorrent version"),
    }

    let mut orchestrator = CycleOrchestrator::new(&config.core, &blocklist, &web_ui, &web_ui, shutdown.clone());

    let mut current = config.clone();
    let mut interval = cycle_interval(current.core.interval, Instant::now());

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }

        match reload(info) {
            Ok((config, blocklist)) => {
                orchestrator.reconfigure(&config.core, &blocklist);

                if config.core.interval != current.core.interval {
                    info!(seconds = config.core.interval, "Cycle interval changed");
                    interval = cycle_interval(config.core.interval, Instant::now() + Duration::from_secs(config.core.interval));
                }

                current = config;
            }
            Err(err) => warn!(%err, "Unable to reload the configuration, keeping the previous one"),
        }

        match orchestrator.run_cycle().await {
            Ok(_) => {}
            Err(CycleError::Interrupted) => break,
            Err(err) => warn!(%err, "Cycle abandoned"),
        }
    }

    info!(bans = orchestrator.engine().ban_list().len(), "Peer banner stopped");

    Ok(())
}

/// It loads the configuration and compiles its blocklist again.
///
/// # Errors
///
/// Will return an error if the configuration can't be loaded or is not
/// valid, or if the blocklist can't be compiled.
pub fn reload(info: &Info) -> Result<(Configuration, Arc<dyn Blocklist>), Error> {
    let config = Configuration::load(info).map_err(|source| Error::Configuration { source })?;
    let blocklist = compile_blocklist(&config)?;

    debug!("Configuration reloaded");

    Ok((config, blocklist))
}

fn compile_blocklist(config: &Configuration) -> Result<Arc<dyn Blocklist>, Error> {
    let blocklist = CompiledBlocklist::compile(&config.blocklist).map_err(|source| Error::Blocklist { source })?;

    Ok(Arc::new(blocklist))
}

fn cycle_interval(seconds: u64, start: Instant) -> Interval {
    let period = Duration::from_secs(seconds);
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// A receiver that turns `true` on `Ctrl-C`.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (sender, receiver) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                let _ = sender.send(true);
            }
            Err(err) => {
                error!(%err, "Unable to listen for the shutdown signal");
                sender.closed().await;
            }
        }
    });

    receiver
}

#[cfg(test)]
mod tests {

    mod reloading_the_configuration {
        use std::net::{IpAddr, Ipv4Addr};

        use bittorrent_ban_core::blocklist::IpListKind;
        use peer_banner_configuration::Info;

        use crate::app::reload;
        use crate::error::Error;

        fn info() -> Info {
            Info::default().with_config_toml_path("banner.toml".to_string())
        }

        #[test]
        fn it_should_read_the_new_thresholds_and_blocklist() {
            figment::Jail::expect_with(|jail| {
                jail.create_file("banner.toml", "[core]\ninterval = 6\n")?;
                let (before, _) = reload(&info()).unwrap();

                jail.create_file("banner.toml", "[core]\ninterval = 30\n\n[blocklist]\nips = [\"1.2.3.0/24\"]\n")?;
                let (after, blocklist) = reload(&info()).unwrap();

                assert_eq!(before.core.interval, 6);
                assert_eq!(after.core.interval, 30);
                assert_eq!(
                    blocklist.match_ip(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))),
                    Some(IpListKind::BlockList)
                );

                Ok(())
            });
        }

        #[test]
        fn it_should_fail_without_a_fatal_error_when_the_new_configuration_is_invalid() {
            figment::Jail::expect_with(|jail| {
                jail.create_file("banner.toml", "[core]\ninterval = 0\n")?;

                assert!(matches!(reload(&info()), Err(Error::Configuration { .. })));

                Ok(())
            });
        }

        #[test]
        fn it_should_fail_when_the_new_blocklist_cannot_be_compiled() {
            figment::Jail::expect_with(|jail| {
                jail.create_file("banner.toml", "[blocklist]\nips = [\"1.2.3.4/99\"]\n")?;

                assert!(matches!(reload(&info()), Err(Error::Blocklist { .. })));

                Ok(())
            });
        }
    }
}
