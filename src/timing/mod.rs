//! # 行为节奏模型
//!
//! 根据性格与激进度生成操作之间的延迟序列。
//!
//! ## 主要功能
//! - **对数正态延迟**: 中位数由基准常数、激进度档位与性格决定
//! - **四个激进度档位**: 每个档位对应一个 `[min, max]` 延迟区间
//! - **乘性修正**: 疲劳、时段、偶发分心
//! - **一致性评分**: 基于最近延迟的变异系数，仅供观测，不参与反馈
//!
//! 该模块不依赖其他组件。

pub mod profile;
pub mod model;

#[cfg(test)]
mod tests;

pub use profile::{AggressivenessTier, BehaviorProfile, Personality};
pub use model::{BehaviorTimingModel, DelaySample, RunningState, TimingConfig};
