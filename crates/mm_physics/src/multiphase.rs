// crates/mm_physics/src/multiphase.rs

//! 介质编号更新与相变状态修复
//!
//! 界面扫过单元后该单元的介质编号改变，其状态变量必须重建。
//! 两种可选策略：
//!
//! - **黎曼解策略**：查询六个面向的界面黎曼解缓存。仅纳入介质编号
//!   与新编号一致的邻面解；上风模式还要求邻居法向速度指向本单元，
//!   并以流入速度分量的大小加权。上风模式无贡献者时回退为等权平均。
//! - **外推策略**：对未变号的同介质邻居按上风方向余弦
//!   `max(0, (x−x_nb)·v_nb / (‖x−x_nb‖‖v_nb‖))` 加权求和。权重和为
//!   零时告警并保持零状态，留给调用方事后裁剪。

use std::collections::HashMap;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use tracing::warn;

use mm_foundation::{MmError, MmResult};
use mm_grid::{Comm, GlobalMesh, SubDomain};

use crate::flux::RiemannSolutions;
use crate::spaceop::{IdField, ScalarField, StateField};
use crate::state::{MaterialId, PrimitiveState};

/// 相变状态修复策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseChangePolicy {
    /// 基于缓存的界面黎曼解
    RiemannSolution,
    /// 基于邻居状态的上风外推
    Extrapolation,
}

/// 多相算子
pub struct MultiPhaseOperator<'a> {
    pub mesh: &'a GlobalMesh,
    pub sub: SubDomain,
    /// 第 m 个水平集对应的介质编号
    pub ls2matid: Vec<MaterialId>,
    pub policy: PhaseChangePolicy,
}

impl<'a> MultiPhaseOperator<'a> {
    /// 创建多相算子
    pub fn new(
        mesh: &'a GlobalMesh,
        sub: SubDomain,
        ls2matid: Vec<MaterialId>,
        policy: PhaseChangePolicy,
    ) -> Self {
        Self {
            mesh,
            sub,
            ls2matid,
            policy,
        }
    }

    /// 由水平集符号重建介质编号（含幽灵区）
    ///
    /// 不变量：Φ_m < 0 当且仅当 ID = m 对应的介质编号。
    /// 检测到界面重叠（同一单元被多个水平集认领）即为拓扑错误。
    pub fn update_material_id(
        &self,
        phis: &[&ScalarField],
        id: &mut IdField,
        comm: &dyn Comm,
    ) -> MmResult<()> {
        id.set_constant(MaterialId(0), true);
        let mut overlap = 0i64;

        let mut w = id.write_scope();
        for (ls, phi) in phis.iter().enumerate() {
            let matid = self.ls2matid[ls];
            for (i, j, k) in phi.ghosted_indices() {
                if phi.at(i, j, k) < 0.0 {
                    let cell = w.at_mut(i, j, k);
                    if *cell != MaterialId(0) {
                        overlap += 1;
                    }
                    *cell = matid;
                }
            }
        }
        drop(w);

        let overlap = comm.allreduce_sum_i64(overlap);
        if overlap > 0 {
            return Err(MmError::topology(format!(
                "检测到重叠的介质界面，重叠单元数: {}",
                overlap
            )));
        }
        Ok(())
    }

    /// 界面移动后的状态修复
    ///
    /// 仅处理实域中 `id != idn` 的单元。
    pub fn update_state_after_interface_motion(
        &self,
        idn: &IdField,
        id: &IdField,
        v: &mut StateField,
        riemann_solutions: &RiemannSolutions,
    ) {
        match self.policy {
            PhaseChangePolicy::RiemannSolution => {
                self.update_by_riemann_solutions(idn, id, v, riemann_solutions)
            }
            PhaseChangePolicy::Extrapolation => self.update_by_extrapolation(idn, id, v),
        }
    }

    fn update_by_riemann_solutions(
        &self,
        idn: &IdField,
        id: &IdField,
        v: &mut StateField,
        riemann_solutions: &RiemannSolutions,
    ) {
        let sub = self.sub;
        let snapshot = v.clone();
        let mut w = v.write_scope();

        for k in sub.k0..sub.kmax {
            for j in sub.j0..sub.jmax {
                for i in sub.i0..sub.imax {
                    if id.at(i, j, k) == idn.at(i, j, k) {
                        continue;
                    }

                    let mut acc = PrimitiveState::ZERO;
                    // 先上风，再回退到等权平均
                    let count = self.local_update_by_riemann_solutions(
                        i,
                        j,
                        k,
                        id.at(i, j, k),
                        &snapshot,
                        riemann_solutions,
                        true,
                        &mut acc,
                    );
                    if count == 0 {
                        acc = PrimitiveState::ZERO;
                        self.local_update_by_riemann_solutions(
                            i,
                            j,
                            k,
                            id.at(i, j, k),
                            &snapshot,
                            riemann_solutions,
                            false,
                            &mut acc,
                        );
                    }
                    *w.at_mut(i, j, k) = acc.to_array();
                }
            }
        }
    }

    /// 六个面向的缓存查询与加权累加，返回贡献者数量
    #[allow(clippy::too_many_arguments)]
    fn local_update_by_riemann_solutions(
        &self,
        i: i32,
        j: i32,
        k: i32,
        new_id: MaterialId,
        v: &StateField,
        cache: &RiemannSolutions,
        upwind: bool,
        acc: &mut PrimitiveState,
    ) -> usize {
        let key = [k, j, i];
        let mut counter = 0usize;
        let mut sum_weight = 0.0;

        // (缓存面, 邻居角标, 速度分量, 流入符号)
        let faces: [(&HashMap<[i32; 3], (PrimitiveState, MaterialId)>, [i32; 3], usize, f64); 6] = [
            (&cache.left, [i - 1, j, k], 0, 1.0),
            (&cache.right, [i + 1, j, k], 0, -1.0),
            (&cache.bottom, [i, j - 1, k], 1, 1.0),
            (&cache.top, [i, j + 1, k], 1, -1.0),
            (&cache.back, [i, j, k - 1], 2, 1.0),
            (&cache.front, [i, j, k + 1], 2, -1.0),
        ];

        for (map, nb, comp, inflow_sign) in faces {
            let Some((sol, sol_id)) = map.get(&key) else {
                continue;
            };
            if *sol_id != new_id {
                continue;
            }
            let vn = PrimitiveState::from_array(v.at(nb[0], nb[1], nb[2]));
            let vel_comp = vn.velocity[comp] * inflow_sign;
            if upwind && vel_comp <= 0.0 {
                continue;
            }
            let weight = if upwind {
                let norm = vn.velocity.length();
                if norm == 0.0 {
                    continue;
                }
                vel_comp / norm
            } else {
                1.0
            };
            sum_weight += weight;
            acc.add_scaled(weight, sol);
            counter += 1;
        }

        if sum_weight > 0.0 {
            acc.scale(1.0 / sum_weight);
        } else if upwind {
            // 上风模式无贡献者：调用方回退到等权平均
        } else {
            warn!(
                "无法通过黎曼解平均修复 ({}, {}, {}) 处的相变状态",
                i, j, k
            );
        }

        counter
    }

    fn update_by_extrapolation(&self, idn: &IdField, id: &IdField, v: &mut StateField) {
        let sub = self.sub;
        let mesh = self.mesh;
        let snapshot = v.clone();
        let mut w = v.write_scope();

        for k in sub.k0..sub.kmax {
            for j in sub.j0..sub.jmax {
                for i in sub.i0..sub.imax {
                    if id.at(i, j, k) == idn.at(i, j, k) {
                        continue;
                    }

                    let x0 = mesh.coords(i, j, k);
                    let mut acc = PrimitiveState::ZERO;
                    let mut sum_weight = 0.0;

                    for nk in k - 1..=k + 1 {
                        for nj in j - 1..=j + 1 {
                            for ni in i - 1..=i + 1 {
                                if id.at(ni, nj, nk) != id.at(i, j, k) {
                                    continue; // 介质不同（含本单元自身变号前后）
                                }
                                if id.at(ni, nj, nk) != idn.at(ni, nj, nk) {
                                    continue; // 该邻居同样刚变号
                                }
                                if sub.outside_physical_domain(ni, nj, nk) {
                                    continue;
                                }

                                let vn = PrimitiveState::from_array(snapshot.at(ni, nj, nk));
                                let v_norm = vn.velocity.length();
                                let dir_v = if v_norm != 0.0 {
                                    vn.velocity / v_norm
                                } else {
                                    DVec3::ZERO
                                };
                                let mut x1x0 = x0 - mesh.coords(ni, nj, nk);
                                let d = x1x0.length();
                                if d == 0.0 {
                                    continue;
                                }
                                x1x0 /= d;

                                let weight = x1x0.dot(dir_v).max(0.0);
                                if weight > 0.0 {
                                    sum_weight += weight;
                                    acc.add_scaled(weight, &vn);
                                }
                            }
                        }
                    }

                    if sum_weight > 0.0 {
                        acc.scale(1.0 / sum_weight);
                    } else {
                        warn!(
                            "外推修复在 ({}, {}, {}) 处权重和为零，状态保持为零",
                            i, j, k
                        );
                    }
                    *w.at_mut(i, j, k) = acc.to_array();
                }
            }
        }
    }
}
