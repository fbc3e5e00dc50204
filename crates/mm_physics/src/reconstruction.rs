// crates/mm_physics/src/reconstruction.rs

//! 面重构
//!
//! minmod 限制的 MUSCL 线性重构：把单元中心原始状态外推到两侧面，
//! 在间断处自动退化为一阶。重构后的 ρ 或 p 非正时整体回退一阶，
//! 保持状态可用。

use crate::state::PrimitiveState;

/// minmod 限制器
///
/// 两斜率同号取绝对值较小者，异号取零。
#[inline]
pub fn minmod(a: f64, b: f64) -> f64 {
    if a * b <= 0.0 {
        0.0
    } else if a.abs() < b.abs() {
        a
    } else {
        b
    }
}

/// MUSCL 重构器
#[derive(Debug, Clone, Copy)]
pub struct Reconstructor {
    /// 空间精度：1 = 分片常数，2 = minmod 限制线性
    pub order: usize,
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self { order: 2 }
    }
}

impl Reconstructor {
    /// 一阶重构器
    pub fn first_order() -> Self {
        Self { order: 1 }
    }

    /// 中心单元在负向/正向面上的重构状态
    ///
    /// `vm`/`vp` 为两侧邻居。任一重构状态的 ρ 或 p 非正时
    /// 整体回退为一阶。
    pub fn face_states(
        &self,
        vm: &PrimitiveState,
        vc: &PrimitiveState,
        vp: &PrimitiveState,
    ) -> (PrimitiveState, PrimitiveState) {
        if self.order <= 1 {
            return (*vc, *vc);
        }

        let a_m = vm.to_array();
        let a_c = vc.to_array();
        let a_p = vp.to_array();

        let mut lo = [0.0; 5];
        let mut hi = [0.0; 5];
        for c in 0..5 {
            let slope = minmod(a_c[c] - a_m[c], a_p[c] - a_c[c]);
            lo[c] = a_c[c] - 0.5 * slope;
            hi[c] = a_c[c] + 0.5 * slope;
        }

        let v_lo = PrimitiveState::from_array(lo);
        let v_hi = PrimitiveState::from_array(hi);
        if v_lo.rho <= 0.0 || v_lo.p.is_nan() || v_hi.rho <= 0.0 || v_hi.p.is_nan() {
            (*vc, *vc)
        } else {
            (v_lo, v_hi)
        }
    }
}
