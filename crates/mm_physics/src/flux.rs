// crates/mm_physics/src/flux.rs

//! Godunov 数值通量与界面黎曼解缓存
//!
//! Godunov 通量是一个薄封装：在面上解精确黎曼问题，然后在所得
//! ξ=0 状态处求物理通量，除此之外不含其他数值处理。
//!
//! 两侧介质编号不一致的面，其黎曼解被缓存进 [`RiemannSolutions`]，
//! 供相变状态修复在同一时间步内消费，步末清空。

use std::collections::HashMap;

use glam::DVec3;

use crate::materials::Material;
use crate::riemann::{ExactRiemannSolver, RiemannSolution};
use crate::state::{MaterialId, PrimitiveState};

/// 方向 `dir`（0~x, 1~y, 2~z）的物理通量 F/G/H
///
/// 分量顺序与守恒状态一致：`[ρu_d, ρu_d u + p δ_x, ρu_d v + p δ_y,
/// ρu_d w + p δ_z, (ρE + p) u_d]`。
#[inline]
pub fn physical_flux(dir: usize, v: &PrimitiveState, mat: &Material) -> [f64; 5] {
    let e = mat.internal_energy(v.rho, v.p);
    let rho_et = v.rho * (e + 0.5 * v.velocity.length_squared());
    let un = v.velocity[dir];
    let mut flux = [
        v.rho * un,
        v.rho * un * v.velocity.x,
        v.rho * un * v.velocity.y,
        v.rho * un * v.velocity.z,
        (rho_et + v.p) * un,
    ];
    flux[1 + dir] += v.p;
    flux
}

/// 单元某一侧面的标识：`(k, j, i)` 角标
pub type CellKey = [i32; 3];

/// 六个面向的界面黎曼解缓存
///
/// 键为单元角标 `(k, j, i)`；值为该面的黎曼解状态与介质编号。
/// 仅在两侧介质编号不一致的面上填充。
#[derive(Debug, Default)]
pub struct RiemannSolutions {
    pub left: HashMap<CellKey, (PrimitiveState, MaterialId)>,
    pub right: HashMap<CellKey, (PrimitiveState, MaterialId)>,
    pub bottom: HashMap<CellKey, (PrimitiveState, MaterialId)>,
    pub top: HashMap<CellKey, (PrimitiveState, MaterialId)>,
    pub back: HashMap<CellKey, (PrimitiveState, MaterialId)>,
    pub front: HashMap<CellKey, (PrimitiveState, MaterialId)>,
}

impl RiemannSolutions {
    /// 创建空缓存
    pub fn new() -> Self {
        Self::default()
    }

    /// 清空全部缓存（步末调用）
    pub fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
        self.bottom.clear();
        self.top.clear();
        self.back.clear();
        self.front.clear();
    }

    /// 缓存条目总数
    pub fn len(&self) -> usize {
        self.left.len()
            + self.right.len()
            + self.bottom.len()
            + self.top.len()
            + self.back.len()
            + self.front.len()
    }

    /// 缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Godunov 通量函子
///
/// 持有精确黎曼求解器；面重构由调用方完成。
pub struct GodunovFlux<'a> {
    riemann: ExactRiemannSolver<'a>,
    materials: &'a [Material],
}

impl<'a> GodunovFlux<'a> {
    /// 创建通量函子
    pub fn new(riemann: ExactRiemannSolver<'a>, materials: &'a [Material]) -> Self {
        Self { riemann, materials }
    }

    /// 黎曼求解器的可变引用（计数器查询用）
    pub fn riemann_mut(&mut self) -> &mut ExactRiemannSolver<'a> {
        &mut self.riemann
    }

    /// 计算方向 `dir` 上的数值通量
    ///
    /// 返回通量与完整黎曼解（调用方按需缓存）。
    pub fn numerical_flux(
        &mut self,
        dir: usize,
        vm: &PrimitiveState,
        idm: MaterialId,
        vp: &PrimitiveState,
        idp: MaterialId,
    ) -> ([f64; 5], RiemannSolution) {
        let normal = match dir {
            0 => DVec3::X,
            1 => DVec3::Y,
            _ => DVec3::Z,
        };
        let sol = self.riemann.solve(normal, vm, idm, vp, idp);
        let mat = &self.materials[sol.id.index()];
        let flux = if sol.vacuum && sol.v_interface.rho == 0.0 {
            [0.0; 5]
        } else {
            physical_flux(dir, &sol.v_interface, mat)
        };
        (flux, sol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::riemann::RiemannParams;

    #[test]
    fn test_physical_flux_directions() {
        let mat = Material::ideal_gas("air", 1.4);
        let v = PrimitiveState::new(1.0, DVec3::new(2.0, 0.0, 0.0), 1.0);
        let f = physical_flux(0, &v, &mat);
        // ρu = 2, ρu²+p = 5
        assert!((f[0] - 2.0).abs() < 1e-14);
        assert!((f[1] - 5.0).abs() < 1e-14);
        assert!((f[2]).abs() < 1e-14);

        // y 方向无流动：只剩压强项
        let g = physical_flux(1, &v, &mat);
        assert!((g[0]).abs() < 1e-14);
        assert!((g[2] - 1.0).abs() < 1e-14);
    }

    #[test]
    fn test_godunov_flux_still_state() {
        let mats = vec![Material::ideal_gas("air", 1.4)];
        let riemann = ExactRiemannSolver::new(&mats, RiemannParams::default());
        let mut godunov = GodunovFlux::new(riemann, &mats);
        let v = PrimitiveState::new(1.0, DVec3::ZERO, 1.0);
        let (flux, sol) = godunov.numerical_flux(0, &v, MaterialId(0), &v, MaterialId(0));
        assert!(!sol.failed);
        // 静止均匀流：质量与能量通量为零，动量通量等于压强
        assert!(flux[0].abs() < 1e-12);
        assert!((flux[1] - 1.0).abs() < 1e-12);
        assert!(flux[4].abs() < 1e-12);
    }

    #[test]
    fn test_cache_bookkeeping() {
        let mut cache = RiemannSolutions::new();
        assert!(cache.is_empty());
        cache.left.insert(
            [0, 0, 1],
            (PrimitiveState::new(1.0, DVec3::ZERO, 1.0), MaterialId(0)),
        );
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
