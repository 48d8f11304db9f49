//! # 会话编排层
//!
//! 将设备池、连接管理、手势合成与时序模型组合为有并发上限的"会话"。
//!
//! ## 主要功能
//! - **创建会话**: 获取会话名额（不排队，满额立即返回 `ResourceExhausted`），启动或接入设备并建立连接
//! - **手势操作**: 点击、滑动、长按、捏合；每次操作前按时序模型等待，再合成轨迹并下发
//! - **顺序保证**: 同一会话内的手势严格串行，不会有两个轨迹同时在同一设备上执行
//! - **结束会话**: 幂等；取消进行中的操作，断开连接，按需停止设备
//! - **同步接口**: `BlockingFleet` 在独立运行时上执行同一套异步实现
//!
//! ## 会话状态
//! `Created -> Attaching -> Active -> Ending -> Closed`
//!
//! ## 模块结构
//! - `traits`: 会话编排接口
//! - `types`: 会话、设备来源、操作记录
//! - `orchestrator`: 编排器实现
//! - `blocking`: 同步封装
//!
//! ## 使用示例
//! ```rust,no_run
//! use device_fleet::session::{DeviceOrigin, ReleaseMode, SessionOrchestrator};
//! use device_fleet::timing::BehaviorProfile;
//! use std::sync::Arc;
//!
//! # async fn example(sessions: Arc<dyn SessionOrchestrator>) -> Result<(), Box<dyn std::error::Error>> {
//! let session = sessions
//!     .create_session(DeviceOrigin::preset("pixel_6")?, BehaviorProfile::default())
//!     .await?;
//!
//! sessions.perform_tap(&session.id, 540.0, 1200.0).await?;
//! sessions.perform_swipe(&session.id, (540.0, 1800.0), (540.0, 600.0), None).await?;
//! sessions.end_session(&session.id, ReleaseMode::Stop).await?;
//! # Ok(())
//! # }
//! ```

pub mod traits;
pub mod types;
pub mod orchestrator;
pub mod blocking;


pub use traits::SessionOrchestrator;
pub use types::{ActionRecord, DeviceOrigin, GestureRequest, ReleaseMode, Session, SessionState};
pub use orchestrator::{gesture_profile_for, OrchestratorOptions, SessionOrchestratorImpl};
pub use blocking::BlockingFleet;
