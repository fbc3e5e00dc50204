// crates/mm_config/src/lib.rs

//! MultiMat Flow 配置层
//!
//! [`SolverConfig`] 汇集全部求解器参数（JSON 序列化），
//! `validate()` 在启动时做快速失败检查：互相矛盾的边界条件、
//! 不存在的介质引用、非法网格范围等配置错误立即报告。
//!
//! 初始条件区域（平面、球、长方体、椭球、柱-锥、柱-球）提供
//! 点包含测试与带符号距离，用于状态与水平集的初始化。

mod regions;
mod types;

pub use regions::{InitialRegion, RegionShape};
pub use types::{
    ConfigError, EmbeddedSurfaceConfig, LevelSetEntry, MeshConfig, OutputConfig, SolverConfig,
    SolverMode, SolverSection, StateConfig,
};
