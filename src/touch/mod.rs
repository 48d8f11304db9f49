//! # 触摸轨迹合成
//!
//! 根据几何参数生成类人的触摸事件序列（点击、滑动、长按、双指缩放）。
//!
//! ## 主要功能
//! - **点击**: 目标点随机偏移与微小抖动，三阶段压力曲线
//! - **滑动**: 二次贝塞尔路径，缓入/匀速/缓出速度曲线
//! - **长按**: 固定采样率下的微动与缓慢正弦漂移
//! - **缩放**: 两条对称手指路径，合成为单条代表轨迹
//!
//! ## 不变量
//! - 时间偏移单调不减
//! - 压力值位于 (0, 1]
//! - 所有坐标位于屏幕范围内
//!
//! 该模块不依赖其他组件；使用固定种子时输出完全可复现。
//!
//! ## 使用示例
//! ```rust
//! use device_fleet::touch::{GestureProfile, ScreenBounds, TouchSynthesizer};
//!
//! let mut synth = TouchSynthesizer::seeded(42);
//! let bounds = ScreenBounds::new(1080, 1920);
//! let tap = synth.tap(540.0, 960.0, &bounds, &GestureProfile::default());
//! assert!(tap.points.len() >= 3);
//! ```

pub mod types;
pub mod synthesizer;


pub use types::{GestureKind, GestureProfile, ScreenBounds, TouchPattern, TouchPoint, MIN_PRESSURE};
pub use synthesizer::{eased_progress, TouchSynthesizer};
