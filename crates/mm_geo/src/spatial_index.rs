// crates/mm_geo/src/spatial_index.rs

//! 三角形空间索引
//!
//! 基于 R-tree 的三角形包围盒索引，用于高效回答"哪些三角形的包围盒
//! 与给定查询盒相交"。嵌入边界相交器在每个节点/每条边上都要做这种
//! 候选查询，索引把每次查询的代价从 O(N) 降到 O(log N + k)。
//!
//! # 示例
//!
//! ```
//! use glam::DVec3;
//! use mm_geo::spatial_index::TriangleIndex;
//!
//! let tris = vec![
//!     (DVec3::ZERO, DVec3::ONE),
//!     (DVec3::splat(5.0), DVec3::splat(6.0)),
//! ];
//! let index = TriangleIndex::build(tris.iter().cloned());
//!
//! let mut out = Vec::new();
//! index.find_in_box(DVec3::splat(-0.5), DVec3::splat(0.5), &mut out);
//! assert_eq!(out, vec![0]);
//! ```

use glam::DVec3;
use rstar::{RTree, RTreeObject, AABB};

/// 索引条目：一个三角形的编号与包围盒
#[derive(Debug, Clone)]
pub struct TriangleEnvelope {
    /// 三角形在表面单元列表中的编号
    pub tri_id: usize,
    lo: [f64; 3],
    hi: [f64; 3],
}

impl RTreeObject for TriangleEnvelope {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.lo, self.hi)
    }
}

/// 三角形包围盒索引
///
/// 构建后只读；一个时间步内可被多处共享引用。
#[derive(Debug)]
pub struct TriangleIndex {
    tree: RTree<TriangleEnvelope>,
    len: usize,
}

impl TriangleIndex {
    /// 从 `(min, max)` 包围盒序列批量构建索引
    ///
    /// 条目编号即序列中的位置。
    pub fn build(boxes: impl IntoIterator<Item = (DVec3, DVec3)>) -> Self {
        let entries: Vec<TriangleEnvelope> = boxes
            .into_iter()
            .enumerate()
            .map(|(tri_id, (lo, hi))| TriangleEnvelope {
                tri_id,
                lo: lo.to_array(),
                hi: hi.to_array(),
            })
            .collect();
        let len = entries.len();
        Self {
            tree: RTree::bulk_load(entries),
            len,
        }
    }

    /// 从带编号的包围盒序列构建索引
    ///
    /// 用于子域范围过滤后的"作用域"三角形集合：条目保留原始三角形编号。
    pub fn build_with_ids(boxes: impl IntoIterator<Item = (usize, DVec3, DVec3)>) -> Self {
        let entries: Vec<TriangleEnvelope> = boxes
            .into_iter()
            .map(|(tri_id, lo, hi)| TriangleEnvelope {
                tri_id,
                lo: lo.to_array(),
                hi: hi.to_array(),
            })
            .collect();
        let len = entries.len();
        Self {
            tree: RTree::bulk_load(entries),
            len,
        }
    }

    /// 索引中的三角形数量
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// 索引是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 查询所有包围盒与 `[lo, hi]` 相交的三角形编号
    ///
    /// 结果追加写入 `out`（调用前会清空），无容量上限。
    pub fn find_in_box(&self, lo: DVec3, hi: DVec3, out: &mut Vec<usize>) {
        out.clear();
        let query = AABB::from_corners(lo.to_array(), hi.to_array());
        out.extend(
            self.tree
                .locate_in_envelope_intersecting(&query)
                .map(|e| e.tri_id),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> TriangleIndex {
        TriangleIndex::build(vec![
            (DVec3::ZERO, DVec3::ONE),
            (DVec3::new(0.5, 0.5, 0.5), DVec3::new(1.5, 1.5, 1.5)),
            (DVec3::splat(10.0), DVec3::splat(11.0)),
        ])
    }

    #[test]
    fn test_find_in_box() {
        let index = sample_index();
        let mut out = Vec::new();

        index.find_in_box(DVec3::splat(-1.0), DVec3::splat(0.4), &mut out);
        assert_eq!(out, vec![0]);

        index.find_in_box(DVec3::splat(0.6), DVec3::splat(0.9), &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![0, 1]);

        index.find_in_box(DVec3::splat(20.0), DVec3::splat(21.0), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_build_with_ids() {
        let index = TriangleIndex::build_with_ids(vec![
            (7, DVec3::ZERO, DVec3::ONE),
            (42, DVec3::splat(2.0), DVec3::splat(3.0)),
        ]);
        assert_eq!(index.len(), 2);

        let mut out = Vec::new();
        index.find_in_box(DVec3::splat(2.5), DVec3::splat(2.6), &mut out);
        assert_eq!(out, vec![42]);
    }

    #[test]
    fn test_empty_index() {
        let index = TriangleIndex::build(std::iter::empty());
        assert!(index.is_empty());
        let mut out = vec![1, 2, 3];
        index.find_in_box(DVec3::splat(-1e9), DVec3::splat(1e9), &mut out);
        assert!(out.is_empty());
    }
}
