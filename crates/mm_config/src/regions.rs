// crates/mm_config/src/regions.rs

//! 初始条件区域
//!
//! 每个区域是一个几何形状加一组初值（状态、介质编号）。形状提供
//! 点包含测试；可以精确给出带符号距离的形状（平面、球、长方体）
//! 直接用于水平集初始化，其余形状给出近似符号函数，由重初始化
//! 恢复距离性质。

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::types::StateConfig;

/// 区域几何形状
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RegionShape {
    /// 半空间：法向指向"外"
    Plane { point: [f64; 3], normal: [f64; 3] },
    /// 球
    Sphere { center: [f64; 3], radius: f64 },
    /// 轴对齐长方体
    Parallelepiped { min: [f64; 3], max: [f64; 3] },
    /// 椭球
    Spheroid {
        center: [f64; 3],
        semi_axes: [f64; 3],
    },
    /// 圆柱加圆锥头（轴向给定）
    CylinderCone {
        base: [f64; 3],
        axis: [f64; 3],
        radius: f64,
        length: f64,
        cone_length: f64,
    },
    /// 圆柱加球头
    CylinderSphere {
        base: [f64; 3],
        axis: [f64; 3],
        radius: f64,
        length: f64,
    },
}

impl RegionShape {
    /// 近似带符号距离：负在内、正在外
    ///
    /// 平面、球、长方体给出精确距离；其余形状给出同号的近似值。
    pub fn signed_distance(&self, p: DVec3) -> f64 {
        match self {
            RegionShape::Plane { point, normal } => {
                let n = DVec3::from_array(*normal).normalize();
                (p - DVec3::from_array(*point)).dot(n)
            }
            RegionShape::Sphere { center, radius } => {
                (p - DVec3::from_array(*center)).length() - radius
            }
            RegionShape::Parallelepiped { min, max } => {
                let lo = DVec3::from_array(*min);
                let hi = DVec3::from_array(*max);
                let c = (lo + hi) * 0.5;
                let half = (hi - lo) * 0.5;
                let q = (p - c).abs() - half;
                let outside = q.max(DVec3::ZERO).length();
                let inside = q.max_element().min(0.0);
                outside + inside
            }
            RegionShape::Spheroid { center, semi_axes } => {
                let d = (p - DVec3::from_array(*center)) / DVec3::from_array(*semi_axes);
                // 归一化半径的近似距离（乘以最小半轴恢复尺度）
                let scale = semi_axes.iter().cloned().fold(f64::INFINITY, f64::min);
                (d.length() - 1.0) * scale
            }
            RegionShape::CylinderCone {
                base,
                axis,
                radius,
                length,
                cone_length,
            } => {
                let (s, r) = Self::axial_coords(p, *base, *axis);
                if s < 0.0 {
                    s.max(r - radius)
                } else if s <= *length {
                    (r - radius).max(s - length - cone_length)
                } else if s <= length + cone_length {
                    // 圆锥段：半径线性收缩到零
                    let shrink = radius * (1.0 - (s - length) / cone_length);
                    r - shrink
                } else {
                    s - (length + cone_length)
                }
            }
            RegionShape::CylinderSphere {
                base,
                axis,
                radius,
                length,
            } => {
                let (s, r) = Self::axial_coords(p, *base, *axis);
                if s < 0.0 {
                    s.max(r - radius)
                } else if s <= *length {
                    r - radius
                } else {
                    // 球头
                    let axis_n = DVec3::from_array(*axis).normalize();
                    let tip_center = DVec3::from_array(*base) + axis_n * *length;
                    (p - tip_center).length() - radius
                }
            }
        }
    }

    /// 点是否在区域内
    #[inline]
    pub fn contains(&self, p: DVec3) -> bool {
        self.signed_distance(p) < 0.0
    }

    /// 轴向坐标 `(s, r)`：沿轴距离与到轴距离
    fn axial_coords(p: DVec3, base: [f64; 3], axis: [f64; 3]) -> (f64, f64) {
        let base = DVec3::from_array(base);
        let axis = DVec3::from_array(axis).normalize();
        let d = p - base;
        let s = d.dot(axis);
        let r = (d - s * axis).length();
        (s, r)
    }
}

/// 初始条件区域：形状 + 初值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialRegion {
    #[serde(flatten)]
    pub shape: RegionShape,
    /// 区域内的初始状态
    pub state: StateConfig,
    /// 区域内的介质编号
    #[serde(default)]
    pub material_id: u16,
}
