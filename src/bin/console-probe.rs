//! Gateway Probe
//!
//! Connects to a live gateway, checks that the kernel's current
//! configuration still validates, and prints the configured outbounds
//! and route rule order. Useful as a smoke check after deployments.
//!
//! Run with: cargo run --bin console-probe
//!
//! Configuration via environment variables:
//! - GATEWAY_URL: gateway base URL (default: http://127.0.0.1:9090)
//! - GATEWAY_TIMEOUT_SECS: request timeout (default: 10)

use anyhow::{Context, Result};
use singbox_console::{ConsoleClient, HttpConfig, Verdict};
use tracing::{info, warn};

fn config_from_env() -> HttpConfig {
    HttpConfig {
        base_url: std::env::var("GATEWAY_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:9090".to_string()),
        timeout_secs: std::env::var("GATEWAY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = config_from_env();
    info!("probing gateway at {}", config.base_url);

    let client = ConsoleClient::connect(config).context("failed to build gateway client")?;

    let validation = client
        .validator()
        .validate_current()
        .await
        .context("validate-current call failed")?;
    match validation.verdict {
        Verdict::Pass => info!("current configuration validates"),
        Verdict::Rejected => {
            warn!("kernel rejected its current configuration:");
            for diagnostic in &validation.diagnostics {
                warn!(
                    "  {}: {}",
                    diagnostic.entity.as_deref().unwrap_or("-"),
                    diagnostic.message
                );
            }
        }
        Verdict::Unreachable => {
            warn!("gateway unreachable; kernel state unknown");
            for diagnostic in &validation.diagnostics {
                warn!("  {}", diagnostic.message);
            }
            anyhow::bail!("gateway unreachable");
        }
    }

    let outbounds = client.outbounds().await.context("failed to list outbounds")?;
    info!("{} outbound nodes configured", outbounds.len());
    for node in &outbounds {
        info!(
            "  {} ({})",
            node.tag,
            node.params
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown")
        );
    }

    let rules = client.ordering().rules().await.context("failed to list rules")?;
    info!("{} route rules (first match wins)", rules.len());
    for rule in &rules {
        info!("  [{}] {}", rule.position, rule.id);
    }

    match client.kernel().detect_path().await {
        Ok(path) => info!("kernel binary at {} (via {})", path.path, path.detection_method),
        Err(e) => warn!("kernel path detection failed: {}", e),
    }

    Ok(())
}
