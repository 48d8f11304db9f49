//! # 设备集群服务入口
//!
//! 加载配置，初始化日志，启动设备池、连接管理与会话编排，等待退出信号后优雅关闭。
//!
//! ## 主要功能
//! - 按配置选择设备控制工具与自动化桥接实现（模拟器/adb 或进程内模拟）
//! - 启动连接健康监控
//! - 按 `warm_sessions` 预先打开会话
//! - 收到 SIGINT/SIGTERM 后结束所有会话并停止所有设备
//!
//! ## 环境变量
//! - `FLEET_CONFIG`: TOML 配置文件路径（可选）
//! - `FLEET_*`: 覆盖任意配置项，例如 `FLEET_MAX_CONCURRENT_SESSIONS=4`
//! - `RUST_LOG`: 日志过滤（默认使用配置中的 `log_level`）

use std::path::PathBuf;

use anyhow::Context;
use device_fleet::{config::Config, DeviceFleet};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("FLEET_CONFIG").ok().map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Device fleet v{}", device_fleet::VERSION);
    info!(
        "Configuration loaded: tool={:?}, bridge={:?}, ports={}-{}",
        config.tool_backend, config.bridge_backend, config.port_range_start, config.port_range_end
    );

    let fleet = DeviceFleet::from_config(config).context("Failed to build fleet")?;
    fleet.init().await.context("Failed to initialize fleet")?;

    let warm = fleet.warm_up().await;
    if !warm.is_empty() {
        info!("{} warm session(s) open", warm.len());
    }

    wait_for_signal().await?;

    info!("Shutdown signal received, ending sessions...");
    if let Err(e) = fleet.shutdown().await {
        warn!("Shutdown finished with errors: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn wait_for_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM signal"),
            _ = sigint.recv() => info!("Received SIGINT signal"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C signal");
    }

    Ok(())
}
