//! # 设备生命周期池
//!
//! 创建、启动、停止虚拟设备实例，分配与回收监听端口，并限制并发实例数量。
//!
//! ## 主要功能
//! - **端口分配**: 按顺序扫描端口区间，跳过已占用端口并通过本地连接探测确认可用
//! - **实例启动**: 调用外部设备控制工具启动实例，轮询就绪状态（有超时上限）
//! - **实例停止**: 先优雅停止，超时或失败后强制终止；无论结果如何都释放端口
//! - **容量控制**: 达到上限时立即返回 `ResourceExhausted`，不排队
//!
//! ## 模块结构
//! - `traits`: 外部设备控制工具与端口探测接口
//! - `types`: 设备配置、实例与状态
//! - `ports`: 端口分配器
//! - `pool`: 设备池实现
//! - `emulator`: 基于 Android 模拟器命令行的实现
//! - `mock`: 用于测试的模拟实现
//!
//! ## 使用示例
//! ```rust,no_run
//! use device_fleet::device::{DeviceConfig, DeviceLifecyclePool, PoolOptions, PortAllocator, SimulatedDeviceTool, TcpPortProbe};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ports = PortAllocator::new(5554..=5654, true, Arc::new(TcpPortProbe::default()));
//! let pool = DeviceLifecyclePool::new(Arc::new(SimulatedDeviceTool::new()), ports, PoolOptions::default());
//!
//! let device = pool.start(DeviceConfig::preset("pixel_6")?).await?;
//! println!("{} listening on {}", device.id, device.listen_port);
//! pool.stop(&device.id).await?;
//! # Ok(())
//! # }
//! ```

pub mod traits;
pub mod types;
pub mod ports;
pub mod pool;
pub mod emulator;
pub mod mock;

#[cfg(test)]
mod tests;

pub use traits::{DeviceControlTool, PortProbe};
pub use types::{DeviceConfig, DeviceInstance, DeviceState, Resolution};
pub use ports::{PortAllocator, TcpPortProbe};
pub use pool::{DeviceLifecyclePool, PoolOptions};
pub use emulator::EmulatorTool;

// Re-export simulated implementations for development/testing
pub use mock::{SimulatedDeviceTool, StaticPortProbe};
