// crates/mm_geo/src/geometry.rs

//! 基础几何类型
//!
//! 提供 3D 轴对齐包围盒。项目统一使用 [`glam::DVec3`] 作为 3D 向量类型。

use glam::DVec3;

/// 3D 轴对齐包围盒
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// 最小角点
    pub min: DVec3,
    /// 最大角点
    pub max: DVec3,
}

impl Aabb {
    /// 创建新的包围盒
    #[inline]
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// 从一组点构造最小包围盒
    ///
    /// 空输入返回退化的零盒。
    pub fn from_points(points: &[DVec3]) -> Self {
        let mut min = DVec3::splat(f64::INFINITY);
        let mut max = DVec3::splat(f64::NEG_INFINITY);
        for p in points {
            min = min.min(*p);
            max = max.max(*p);
        }
        if points.is_empty() {
            min = DVec3::ZERO;
            max = DVec3::ZERO;
        }
        Self { min, max }
    }

    /// 判断两个包围盒是否相交（含边界接触）
    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// 判断点是否在包围盒内（含边界）
    #[inline]
    pub fn contains_point(&self, p: DVec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// 沿各方向向外扩张
    #[inline]
    pub fn inflated(&self, delta: DVec3) -> Self {
        Self {
            min: self.min - delta,
            max: self.max + delta,
        }
    }

    /// 对角线长度
    #[inline]
    pub fn diagonal(&self) -> f64 {
        (self.max - self.min).length()
    }
}
