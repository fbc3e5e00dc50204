// crates/mm_geo/src/lib.rs

//! MultiMat Flow 几何层
//!
//! 提供嵌入边界追踪所需的全部几何工具：
//!
//! - [`geometry`]: 轴对齐包围盒与基础向量工具（基于 [`glam::DVec3`]）
//! - [`triangle`]: 三角形面片判定（投影、加厚板内判定、线段相交）
//! - [`spatial_index`]: 基于 R-tree 的三角形包围盒索引
//! - [`surface`]: 三角化表面类型及网格文件读取

pub mod geometry;
pub mod spatial_index;
pub mod surface;
pub mod triangle;

pub use geometry::Aabb;
pub use spatial_index::TriangleIndex;
pub use surface::TriangulatedSurface;
