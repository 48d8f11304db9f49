//! # 设备连接管理
//!
//! 维护每台设备的自动化桥接连接，定期健康检查，失败后自动重连，重试耗尽后移除。
//!
//! ## 主要功能
//! - **连接**: 幂等连接，已连接时直接返回现有句柄；失败时指数退避重试
//! - **健康检查**: 并发探测所有连接，单个探测有超时上限，不会阻塞整轮检查
//! - **自动恢复**: 探测失败时标记为降级并尝试重连；连续失败超过上限后移除并通知订阅者
//! - **指令下发**: 下发手势、执行 shell、截图；传输错误时自动修复连接后重试
//!
//! ## 状态机
//! ```text
//! Disconnected -> Connecting -> Connected -> Degraded -> Reconnecting -> Connected
//!                                                                     -> Degraded
//!                                                                     -> Removed
//! ```
//!
//! ## 模块结构
//! - `traits`: 自动化桥接接口
//! - `types`: 地址、连接记录与健康状态
//! - `manager`: 连接管理器与健康监控
//! - `adb`: 基于 adb 命令行的桥接实现
//! - `mock`: 用于测试的模拟实现

pub mod traits;
pub mod types;
pub mod manager;
pub mod adb;
pub mod mock;


pub use traits::AutomationBridge;
pub use types::{BridgeHandle, ConnectionKind, ConnectionRecord, DeviceAddress, DeviceTarget, HealthReport, HealthState};
pub use manager::{ConnectionOptions, DeviceConnectionManager, HealthMonitor, RecoveryOutcome};
pub use adb::AdbBridge;

// Re-export simulated implementation for development/testing
pub use mock::SimulatedBridge;
