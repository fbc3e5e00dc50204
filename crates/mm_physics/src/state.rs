// crates/mm_physics/src/state.rs

//! 流动状态与介质编号
//!
//! 原始状态 V = (ρ, u, v, w, p) 存于单元中心。守恒状态
//! U = (ρ, ρu, ρv, ρw, ρE) 仅在显式更新时出现，二者的互换在合法
//! 状态上是恒等变换（浮点误差内）。

use glam::DVec3;

use crate::materials::Material;

/// 介质编号
///
/// 非负整数，选择该单元由哪个状态方程支配。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u16);

impl MaterialId {
    /// 非活动单元哨兵（固体内部等）
    pub const INACTIVE: MaterialId = MaterialId(u16::MAX);

    /// 是否为非活动单元
    #[inline]
    pub fn is_inactive(self) -> bool {
        self == Self::INACTIVE
    }

    /// 作为介质表下标
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// 原始状态：密度、速度、压强
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimitiveState {
    pub rho: f64,
    pub velocity: DVec3,
    pub p: f64,
}

impl PrimitiveState {
    /// 全零状态（相变修复的累加起点）
    pub const ZERO: PrimitiveState = PrimitiveState {
        rho: 0.0,
        velocity: DVec3::ZERO,
        p: 0.0,
    };

    /// 构造
    #[inline]
    pub fn new(rho: f64, velocity: DVec3, p: f64) -> Self {
        Self { rho, velocity, p }
    }

    /// 按 `[ρ, u, v, w, p]` 顺序展开
    #[inline]
    pub fn to_array(self) -> [f64; 5] {
        [
            self.rho,
            self.velocity.x,
            self.velocity.y,
            self.velocity.z,
            self.p,
        ]
    }

    /// 从 `[ρ, u, v, w, p]` 构造
    #[inline]
    pub fn from_array(v: [f64; 5]) -> Self {
        Self {
            rho: v[0],
            velocity: DVec3::new(v[1], v[2], v[3]),
            p: v[4],
        }
    }

    /// 转换到守恒状态 `[ρ, ρu, ρv, ρw, ρE]`
    #[inline]
    pub fn to_conservative(self, mat: &Material) -> [f64; 5] {
        let e = mat.internal_energy(self.rho, self.p);
        let kinetic = 0.5 * self.velocity.length_squared();
        [
            self.rho,
            self.rho * self.velocity.x,
            self.rho * self.velocity.y,
            self.rho * self.velocity.z,
            self.rho * (e + kinetic),
        ]
    }

    /// 从守恒状态转换
    #[inline]
    pub fn from_conservative(u: [f64; 5], mat: &Material) -> Self {
        let rho = u[0];
        let velocity = DVec3::new(u[1], u[2], u[3]) / rho;
        let e = u[4] / rho - 0.5 * velocity.length_squared();
        Self {
            rho,
            velocity,
            p: mat.pressure(rho, e),
        }
    }

    /// 各分量是否全部有限
    #[inline]
    pub fn is_finite(self) -> bool {
        self.rho.is_finite() && self.velocity.is_finite() && self.p.is_finite()
    }

    /// 加权累加（相变修复用）
    #[inline]
    pub fn add_scaled(&mut self, w: f64, other: &PrimitiveState) {
        self.rho += w * other.rho;
        self.velocity += w * other.velocity;
        self.p += w * other.p;
    }

    /// 整体缩放
    #[inline]
    pub fn scale(&mut self, s: f64) {
        self.rho *= s;
        self.velocity *= s;
        self.p *= s;
    }

    /// 两状态的最大分量差（相同状态捷径判定）
    #[inline]
    pub fn max_abs_diff(&self, other: &PrimitiveState) -> f64 {
        let a = self.to_array();
        let b = other.to_array();
        a.iter()
            .zip(&b)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_sentinel() {
        assert!(MaterialId::INACTIVE.is_inactive());
        assert!(!MaterialId(0).is_inactive());
    }

    #[test]
    fn test_array_roundtrip() {
        let v = PrimitiveState::new(1.2, DVec3::new(3.0, -4.0, 5.0), 101325.0);
        assert_eq!(PrimitiveState::from_array(v.to_array()), v);
    }

    #[test]
    fn test_conservative_roundtrip_identity() {
        let mat = Material::ideal_gas("air", 1.4);
        let v = PrimitiveState::new(0.9, DVec3::new(10.0, -2.0, 0.5), 8.5e4);
        let back = PrimitiveState::from_conservative(v.to_conservative(&mat), &mat);
        assert!(v.max_abs_diff(&back) < 1e-9);
    }

    #[test]
    fn test_add_scaled_and_scale() {
        let mut acc = PrimitiveState::ZERO;
        let a = PrimitiveState::new(1.0, DVec3::X, 2.0);
        let b = PrimitiveState::new(3.0, DVec3::Y, 4.0);
        acc.add_scaled(0.5, &a);
        acc.add_scaled(0.5, &b);
        acc.scale(1.0);
        assert!((acc.rho - 2.0).abs() < 1e-14);
        assert!((acc.p - 3.0).abs() < 1e-14);
        assert!((acc.velocity - DVec3::new(0.5, 0.5, 0.0)).length() < 1e-14);
    }
}
