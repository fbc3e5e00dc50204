// crates/mm_io/src/lib.rs

//! MultiMat Flow 输出层
//!
//! - [`vtr`]: 直线网格 VTK XML 快照（`.vtr`）与 PVD 时间序列清单
//! - [`probes`]: 探针文件（每个量一个文件）、线图文件与网格列表
//!
//! IO 失败即致命错误：所有写入函数返回 `Result`，调用方（CLI）把
//! 错误转换为退出码 -1。

pub mod probes;
pub mod vtr;

pub use probes::{LinePlotWriter, ProbeWriter};
pub use vtr::SnapshotWriter;
