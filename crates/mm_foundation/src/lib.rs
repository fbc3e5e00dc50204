// crates/mm_foundation/src/lib.rs

//! MultiMat Flow Foundation Layer
//!
//! 零依赖基础层，提供整个项目的基础抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型
//! - [`tolerance`]: 共享数值容差常量
//!
//! # 设计原则
//!
//! 1. **纯净性**：仅包含基础设施级别的概念，不引入网格、物理等高层概念
//! 2. **可转换性**：高层错误最终可转换为 [`error::MmError`]
//! 3. **零依赖**：不依赖项目内其他 crate

pub mod error;
pub mod tolerance;

pub use error::{MmError, MmResult};
