// crates/mm_grid/src/lib.rs

//! MultiMat Flow 结构化网格层
//!
//! 提供分布式结构化网格的数据抽象：
//!
//! - [`subdomain`]: 子域角标（实域 `i0..imax` 与带幽灵层的 `ii0..iimax`）
//! - [`field`]: 带一层幽灵层的 3D 字段，写作用域守卫在释放时触发
//!   "插入+交换"
//! - [`comm`]: 集合通信接缝（`Allreduce` 族），附带串行实现
//! - [`mesh`]: 全局网格信息（逐轴节点坐标与间距）与外幽灵节点列表
//!
//! # 所有权约定
//!
//! 拥有某节点的进程独占写该节点；幽灵副本只读，在"插入"后刷新。
//! 字段的写访问只能通过 [`field::WriteGuard`] 获得，守卫释放时自动
//! 完成交换，因此"未配对的获取"在类型层面不可表达。

pub mod comm;
pub mod field;
pub mod mesh;
pub mod subdomain;

pub use comm::{Comm, SerialComm};
pub use field::Field3;
pub use mesh::{BoundaryKind, DomainBcs, GhostNode, GlobalMesh, ProjectionKind, Side};
pub use subdomain::SubDomain;
