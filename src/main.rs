use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use signal_hook::consts::SIGHUP;
use signal_hook_tokio::Signals;
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use tracing::{error, info};

use dual_dhcp_core::config::Config;
use dual_dhcp_core::v4::server::{init_v4, sweep as sweep_v4, State4};
use dual_dhcp_core::v4::transport::run_v4_server;
use dual_dhcp_core::v6::server::{init_v6, sweep as sweep_v6, State6};
use dual_dhcp_core::v6::transport::run_v6_server;

fn config_path() -> PathBuf {
    PathBuf::from(
        std::env::var("DHCP_CORE_CONFIG_PATH").unwrap_or_else(|_| "/etc/dual-dhcp-core/config.json".to_string()),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dual_dhcp_core=info".parse().unwrap()),
        )
        .init();

    info!("dual-dhcp-core starting...");

    let path = config_path();
    let config = if path.exists() {
        Config::load_from_file(&path).with_context(|| format!("failed to load config from {}", path.display()))?
    } else {
        info!("no config file found at {}, using defaults", path.display());
        Config::default()
    };

    info!(
        "config loaded: DHCPv4 {}, DHCPv6 {}",
        if config.dhcp4.enabled { "enabled" } else { "disabled" },
        if config.dhcp6.enabled { "enabled" } else { "disabled" },
    );

    let state4: Option<Arc<Mutex<State4>>> = if config.dhcp4.enabled {
        Some(Arc::new(Mutex::new(init_v4(config.dhcp4.clone()).context("invalid DHCPv4 config")?)))
    } else {
        None
    };

    let state6: Option<Arc<Mutex<State6>>> = if config.dhcp6.enabled {
        Some(Arc::new(Mutex::new(init_v6(config.dhcp6.clone()).context("invalid DHCPv6 config")?)))
    } else {
        None
    };

    let sighup_state4 = state4.clone();
    let sighup_state6 = state6.clone();
    tokio::spawn(async move {
        if let Err(e) = handle_sighup(sighup_state4, sighup_state6).await {
            error!("SIGHUP handler error: {}", e);
        }
    });

    if let Some(s) = state4.clone() {
        tokio::spawn(async move {
            if let Err(e) = run_v4_server(s).await {
                error!("DHCPv4 server failed: {}", e);
            }
        });
    }

    if let Some(s) = state6.clone() {
        tokio::spawn(async move {
            if let Err(e) = run_v6_server(s).await {
                error!("DHCPv6 server failed: {}", e);
            }
        });
    }

    {
        let s4 = state4.clone();
        let s6 = state6.clone();
        let sweep_interval = [config.dhcp4.lease_time, config.dhcp6.lease_time, 60].into_iter().min().unwrap();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(sweep_interval as u64)).await;
                let now = dual_dhcp_core::clock::Clock::now(&dual_dhcp_core::clock::SystemClock);
                if let Some(s) = &s4 {
                    sweep_v4(&mut *s.lock().await, now);
                }
                if let Some(s) = &s6 {
                    sweep_v6(&mut *s.lock().await, now);
                }
            }
        });
    }

    info!("dual-dhcp-core started successfully");

    tokio::signal::ctrl_c().await?;
    info!("shutting down...");

    Ok(())
}

async fn handle_sighup(state4: Option<Arc<Mutex<State4>>>, state6: Option<Arc<Mutex<State6>>>) -> Result<()> {
    let mut signals = Signals::new([SIGHUP])?;

    while let Some(signal) = signals.next().await {
        if signal == SIGHUP {
            info!("received SIGHUP, reloading config...");

            let path = config_path();
            match Config::load_from_file(&path) {
                Ok(new_config) => {
                    if let (Some(s), true) = (&state4, new_config.dhcp4.enabled) {
                        if let Err(e) = new_config.dhcp4.validate() {
                            error!("new DHCPv4 config is invalid, keeping previous config: {}", e);
                        } else {
                            let mut guard = s.lock().await;
                            if guard.config.range_start != new_config.dhcp4.range_start
                                || guard.config.range_end != new_config.dhcp4.range_end
                            {
                                guard.pool.resize(new_config.dhcp4.range_start, new_config.dhcp4.range_end);
                            }
                            guard.config = new_config.dhcp4.clone();
                            info!("DHCPv4 config reloaded");
                        }
                    }
                    if let (Some(s), true) = (&state6, new_config.dhcp6.enabled) {
                        if let Err(e) = new_config.dhcp6.validate() {
                            error!("new DHCPv6 config is invalid, keeping previous config: {}", e);
                        } else {
                            let mut guard = s.lock().await;
                            if guard.config.range_start != new_config.dhcp6.range_start
                                || guard.config.range_end != new_config.dhcp6.range_end
                            {
                                guard.pool.resize(new_config.dhcp6.range_start, new_config.dhcp6.range_end);
                            }
                            guard.config = new_config.dhcp6.clone();
                            info!("DHCPv6 config reloaded");
                        }
                    }
                }
                Err(e) => {
                    error!("failed to reload config: {}", e);
                }
            }
        }
    }

    Ok(())
}
