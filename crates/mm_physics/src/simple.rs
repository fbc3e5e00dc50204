// crates/mm_physics/src/simple.rs

//! SIMPLE 族压强-速度耦合
//!
//! 每个时间步做一轮外迭代（首步放宽为 10 倍 `max_its`）：
//!
//! 1. 解三个动量方程得 u*, v*, w*
//! 2. （仅 SIMPLER）先由帽速度解一次**压强**方程
//! 3. 装配压强修正方程（7 点泊松型，角单元钉死）并求解 p'
//! 4. `u ← u* + D·Δp'`，`p ← p + α_P p'`（SIMPLEC 固定 α_P = 1）
//! 5. 以 ‖Δu‖₂/‖u‖₂ 判收敛
//!
//! 线性求解器不收敛只告警；外迭代不收敛也只告警，该步照常接受，
//! 下一步可以自行恢复。外迭代以 `step` 形式暴露，测试代码可以单步
//! 驱动。

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use mm_foundation::{MmError, MmResult};
use mm_grid::{Comm, Field3};

use crate::incompressible::IncompressibleOperator;
use crate::linear::{
    BiCgStabSolver, JacobiPreconditioner, LinearSolverConfig, PcgSolver,
};
use crate::spaceop::{IdField, ScalarField, StateField};

/// SIMPLE 族变体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimpleVariant {
    Simple,
    Simpler,
    Simplec,
}

/// SIMPLE 族配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleConfig {
    pub variant: SimpleVariant,
    /// 每步外迭代上限（首步放宽 10 倍）
    pub max_its: usize,
    /// 外迭代收敛容差（速度相对误差 2 范数）
    pub convergence_tolerance: f64,
    /// 伪时间步松弛因子 E
    pub e_factor: f64,
    /// 压强欠松弛 α_P（SIMPLEC 强制为 1）
    pub alpha_p: f64,
    pub velocity_solver: LinearSolverConfig,
    pub pressure_solver: LinearSolverConfig,
}

impl Default for SimpleConfig {
    fn default() -> Self {
        Self {
            variant: SimpleVariant::Simple,
            max_its: 40,
            convergence_tolerance: 1.0e-5,
            e_factor: 5.0,
            alpha_p: 0.8,
            velocity_solver: LinearSolverConfig {
                rtol: 1.0e-8,
                atol: 1.0e-14,
                max_iter: 500,
            },
            pressure_solver: LinearSolverConfig {
                rtol: 1.0e-8,
                atol: 1.0e-14,
                max_iter: 2000,
            },
        }
    }
}

/// 一轮外迭代的结果
#[derive(Debug, Clone, Copy)]
pub struct OuterIteration {
    /// ‖Δu‖₂ / ‖u‖₂
    pub residual: f64,
    /// 是否低于收敛容差
    pub converged: bool,
}

/// SIMPLE 族时间积分器
pub struct TimeIntegratorSimple<'a> {
    pub inco: IncompressibleOperator<'a>,
    config: SimpleConfig,
    pinned: [i32; 3],
    vel_solver: BiCgStabSolver,
    p_solver: PcgSolver,
    dx: ScalarField,
    dy: ScalarField,
    dz: ScalarField,
}

impl<'a> TimeIntegratorSimple<'a> {
    /// 创建积分器
    ///
    /// 不可压缩分支目前只允许单一介质；E 与 α_P 必须为正。
    pub fn new(inco: IncompressibleOperator<'a>, mut config: SimpleConfig) -> MmResult<Self> {
        if inco.materials.len() > 1 {
            return Err(MmError::invalid_input(
                "不可压缩求解器目前只支持单一介质",
            ));
        }
        if config.e_factor <= 0.0 {
            return Err(MmError::invalid_input("SIMPLE 族方法要求 E 为正值"));
        }
        if config.alpha_p <= 0.0 {
            return Err(MmError::invalid_input(
                "SIMPLE 族方法要求 alphaP 为正值（通常小于 1）",
            ));
        }
        if config.variant == SimpleVariant::Simplec {
            config.alpha_p = 1.0;
        }

        let sub = inco.sub;
        let pinned = [sub.nx - 1, sub.ny - 1, sub.nz - 1];
        let vel_solver = BiCgStabSolver::new(config.velocity_solver.clone());
        let p_solver = PcgSolver::new(config.pressure_solver.clone());
        let dx = Field3::new(&sub, 0.0);
        let dy = Field3::new(&sub, 0.0);
        let dz = Field3::new(&sub, 0.0);

        Ok(Self {
            inco,
            config,
            pinned,
            vel_solver,
            p_solver,
            dx,
            dy,
            dz,
        })
    }

    /// 配置引用
    pub fn config(&self) -> &SimpleConfig {
        &self.config
    }

    /// 推进一个时间步
    ///
    /// 返回 `(最终残差, 是否收敛, 实际外迭代数)`。
    pub fn advance_one_time_step(
        &mut self,
        v: &mut StateField,
        id: &IdField,
        dt: f64,
        time_step: usize,
        comm: &dyn Comm,
    ) -> (f64, bool, usize) {
        let max_iter = if time_step == 1 {
            10 * self.config.max_its
        } else {
            self.config.max_its
        };

        match self.config.variant {
            SimpleVariant::Simplec => info!("运行迭代 SIMPLEC 过程"),
            SimpleVariant::Simpler => info!("运行迭代 SIMPLER 过程"),
            SimpleVariant::Simple => info!("运行迭代 SIMPLE 过程"),
        }

        let mut rel_err = f64::INFINITY;
        let mut converged = false;
        let mut iterations = 0;

        for iter in 0..max_iter {
            iterations = iter + 1;
            let outer = self.step(v, id, dt, comm);
            rel_err = outer.residual;
            if outer.converged {
                converged = true;
                break;
            }
            info!("外迭代 {}: 速度相对误差 (2 范数) = {:e}", iter + 1, rel_err);
        }

        if converged {
            info!(
                "外迭代收敛于 {} 次，速度相对误差 (2 范数) = {:e}",
                iterations, rel_err
            );
        } else {
            warn!("外迭代未收敛，速度相对误差 (2 范数) = {:e}", rel_err);
        }

        (rel_err, converged, iterations)
    }

    /// 单轮外迭代（不动点步）
    pub fn step(
        &mut self,
        v: &mut StateField,
        id: &IdField,
        dt: f64,
        comm: &dyn Comm,
    ) -> OuterIteration {
        self.inco.apply_boundary_conditions(v);

        let simplec = self.config.variant == SimpleVariant::Simplec;
        let e = self.config.e_factor;
        let mesh = self.inco.mesh;

        // ------------------------------------------------------------
        // （仅 SIMPLER）压强预测：帽速度 → 压强方程 → 直接写回 p
        // ------------------------------------------------------------
        if self.config.variant == SimpleVariant::Simpler {
            let mut uhat = Vec::new();
            let mut vhat = Vec::new();
            let mut what = Vec::new();
            self.inco
                .estimate_velocity_for_pressure(0, v, id, &mut uhat, &mut self.dx, false, e, dt);
            if !mesh.is_1d() {
                self.inco
                    .estimate_velocity_for_pressure(1, v, id, &mut vhat, &mut self.dy, false, e, dt);
            } else {
                vhat = self.inco.extract_face_velocities(1, v);
            }
            if !mesh.is_2d() {
                self.inco
                    .estimate_velocity_for_pressure(2, v, id, &mut what, &mut self.dz, false, e, dt);
            } else {
                what = self.inco.extract_face_velocities(2, v);
            }

            let (matrix, b) = self.inco.build_pressure_equation(
                &uhat, &vhat, &what, v, &self.dx, &self.dy, &self.dz, self.pinned,
            );
            let mut p = vec![0.0; matrix.n_rows()];
            let precond = JacobiPreconditioner::from_matrix(&matrix);
            let result = self.p_solver.solve(&matrix, &b, &mut p, &precond);
            if !result.is_converged() {
                warn!(
                    "压强方程线性求解未收敛: {} 次迭代, 残差 {:e}",
                    result.iterations, result.residual_norm
                );
            }
            self.store_cell_pressure(v, &p, 1.0, false);
        }

        // ------------------------------------------------------------
        // 第 1 步：动量方程求 u*, v*, w*
        // ------------------------------------------------------------
        let ustar = self.solve_momentum(0, v, id, simplec, e, dt, "x");
        let vstar = if !mesh.is_1d() {
            self.solve_momentum(1, v, id, simplec, e, dt, "y")
        } else {
            self.inco.extract_face_velocities(1, v)
        };
        let wstar = if !mesh.is_2d() {
            self.solve_momentum(2, v, id, simplec, e, dt, "z")
        } else {
            self.inco.extract_face_velocities(2, v)
        };

        // ------------------------------------------------------------
        // 第 2 步：压强修正方程
        // ------------------------------------------------------------
        let (matrix, b) = self.inco.build_pressure_equation(
            &ustar, &vstar, &wstar, v, &self.dx, &self.dy, &self.dz, self.pinned,
        );
        let mut pprime = vec![0.0; matrix.n_rows()];
        let precond = JacobiPreconditioner::from_matrix(&matrix);
        let result = self.p_solver.solve(&matrix, &b, &mut pprime, &precond);
        if !result.is_converged() {
            warn!(
                "压强修正方程线性求解未收敛: {} 次迭代, 残差 {:e}",
                result.iterations, result.residual_norm
            );
        }

        // ------------------------------------------------------------
        // 第 3 步：更新 u, v, w, p 并计算速度相对误差
        // ------------------------------------------------------------
        let update_p = self.config.variant != SimpleVariant::Simpler;
        let residual = self.update_states(v, &ustar, &vstar, &wstar, &pprime, update_p, comm);

        OuterIteration {
            residual,
            converged: residual < self.config.convergence_tolerance,
        }
    }

    /// 解一个方向的动量方程
    fn solve_momentum(
        &mut self,
        dir: usize,
        v: &StateField,
        id: &IdField,
        simplec: bool,
        e: f64,
        dt: f64,
        label: &str,
    ) -> Vec<f64> {
        let diag = match dir {
            0 => &mut self.dx,
            1 => &mut self.dy,
            _ => &mut self.dz,
        };
        let system = self
            .inco
            .build_velocity_equation(dir, v, id, diag, simplec, e, dt);
        let b = system.full_rhs();
        let mut x = self.inco.extract_face_velocities(dir, v);
        let precond = JacobiPreconditioner::from_matrix(&system.matrix);
        let result = self.vel_solver.solve(&system.matrix, &b, &mut x, &precond);
        if !result.is_converged() {
            warn!(
                "{} 方向动量方程线性求解未收敛: {} 次迭代, 残差 {:e}",
                label, result.iterations, result.residual_norm
            );
        }
        x
    }

    /// 压强写回：`p ← (1−覆盖) p + α p_new`
    fn store_cell_pressure(&self, v: &mut StateField, p: &[f64], alpha: f64, increment: bool) {
        let sub = self.inco.sub;
        let cell_index =
            |i: i32, j: i32, k: i32| -> usize { ((k * sub.ny + j) * sub.nx + i) as usize };
        let mut w = v.write_scope();
        for k in sub.k0..sub.kmax {
            for j in sub.j0..sub.jmax {
                for i in sub.i0..sub.imax {
                    let cell = w.at_mut(i, j, k);
                    if increment {
                        cell[4] += alpha * p[cell_index(i, j, k)];
                    } else {
                        cell[4] = alpha * p[cell_index(i, j, k)];
                    }
                }
            }
        }
    }

    /// 速度修正与压强更新，返回 ‖Δu‖₂/‖u‖₂
    #[allow(clippy::too_many_arguments)]
    fn update_states(
        &self,
        v: &mut StateField,
        ustar: &[f64],
        vstar: &[f64],
        wstar: &[f64],
        pprime: &[f64],
        update_p: bool,
        comm: &dyn Comm,
    ) -> f64 {
        let sub = self.inco.sub;
        let cell_index =
            |i: i32, j: i32, k: i32| -> usize { ((k * sub.ny + j) * sub.nx + i) as usize };

        let mut uerr = 0.0f64;
        let mut unorm = 0.0f64;

        {
            let mut w = v.write_scope();

            // u 面
            for k in 0..sub.nz {
                for j in 0..sub.ny {
                    for i in 1..sub.nx {
                        let row = self.inco.unknown_index(0, i, j, k).expect("面未知量编号越界");
                        let corr = self.dx.at(i, j, k)
                            * (pprime[cell_index(i - 1, j, k)] - pprime[cell_index(i, j, k)]);
                        let unew = ustar[row] + corr;
                        w.at_mut(i, j, k)[1] = unew;
                        uerr += corr * corr;
                        unorm += unew * unew;
                    }
                }
            }
            // v 面
            for k in 0..sub.nz {
                for j in 1..sub.ny {
                    for i in 0..sub.nx {
                        let row = self.inco.unknown_index(1, i, j, k).expect("面未知量编号越界");
                        let corr = self.dy.at(i, j, k)
                            * (pprime[cell_index(i, j - 1, k)] - pprime[cell_index(i, j, k)]);
                        let vnew = vstar[row] + corr;
                        w.at_mut(i, j, k)[2] = vnew;
                        uerr += corr * corr;
                        unorm += vnew * vnew;
                    }
                }
            }
            // w 面
            for k in 1..sub.nz {
                for j in 0..sub.ny {
                    for i in 0..sub.nx {
                        let row = self.inco.unknown_index(2, i, j, k).expect("面未知量编号越界");
                        let corr = self.dz.at(i, j, k)
                            * (pprime[cell_index(i, j, k - 1)] - pprime[cell_index(i, j, k)]);
                        // 修正后的 w 取自 z 分量槽位
                        let wnew = wstar[row] + corr;
                        w.at_mut(i, j, k)[3] = wnew;
                        uerr += corr * corr;
                        unorm += wnew * wnew;
                    }
                }
            }
        }

        if update_p {
            self.store_cell_pressure(v, pprime, self.config.alpha_p, true);
        }

        let unorm = comm.allreduce_sum_f64(unorm);
        let uerr = comm.allreduce_sum_f64(uerr);
        if unorm > 0.0 {
            (uerr / unorm).sqrt()
        } else if uerr > 0.0 {
            uerr.sqrt()
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::Material;
    use crate::state::MaterialId;
    use glam::DVec3;
    use mm_grid::{BoundaryKind, DomainBcs, GlobalMesh, SerialComm};

    fn cavity(
        n: usize,
        viscosity: f64,
    ) -> (GlobalMesh, Vec<Material>, DomainBcs) {
        let mesh = GlobalMesh::uniform([0.0, 1.0, 0.0, 1.0, 0.0, 1.0], n, n, 1).unwrap();
        let mut mat = Material::ideal_gas("fluid", 1.4);
        mat.rho0 = 1.0;
        mat.viscosity = viscosity;
        let bcs = DomainBcs {
            x0: BoundaryKind::StickWall,
            xmax: BoundaryKind::StickWall,
            y0: BoundaryKind::StickWall,
            ymax: BoundaryKind::Inlet,
            z0: BoundaryKind::SlipWall,
            zmax: BoundaryKind::SlipWall,
        };
        (mesh, vec![mat], bcs)
    }

    #[test]
    fn test_rejects_multiple_materials() {
        let (mesh, mut mats, bcs) = cavity(4, 0.01);
        mats.push(Material::ideal_gas("other", 1.4));
        let sub = mesh.serial_subdomain();
        let ghosts = mesh.outer_ghost_nodes(&sub, &bcs);
        let inco = IncompressibleOperator::new(
            &mesh,
            sub,
            &ghosts,
            &mats,
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::ZERO,
        );
        assert!(TimeIntegratorSimple::new(inco, SimpleConfig::default()).is_err());
    }

    #[test]
    fn test_rejects_nonpositive_relaxation() {
        let (mesh, mats, bcs) = cavity(4, 0.01);
        let sub = mesh.serial_subdomain();
        let ghosts = mesh.outer_ghost_nodes(&sub, &bcs);
        let inco = IncompressibleOperator::new(
            &mesh,
            sub,
            &ghosts,
            &mats,
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::ZERO,
        );
        let config = SimpleConfig {
            e_factor: 0.0,
            ..SimpleConfig::default()
        };
        assert!(TimeIntegratorSimple::new(inco, config).is_err());
    }

    #[test]
    fn test_simplec_forces_alpha_p() {
        let (mesh, mats, bcs) = cavity(4, 0.01);
        let sub = mesh.serial_subdomain();
        let ghosts = mesh.outer_ghost_nodes(&sub, &bcs);
        let inco = IncompressibleOperator::new(
            &mesh,
            sub,
            &ghosts,
            &mats,
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::ZERO,
        );
        let config = SimpleConfig {
            variant: SimpleVariant::Simplec,
            alpha_p: 0.3,
            ..SimpleConfig::default()
        };
        let integrator = TimeIntegratorSimple::new(inco, config).unwrap();
        assert_eq!(integrator.config().alpha_p, 1.0);
    }

    #[test]
    fn test_w_faces_updated_from_z_slot() {
        // 3D 封闭盒：w 面扰动产生散度，一轮外迭代后 w 槽位被修正、
        // 离散散度显著下降
        let mesh = GlobalMesh::uniform([0.0, 1.0, 0.0, 1.0, 0.0, 1.0], 4, 4, 4).unwrap();
        let sub = mesh.serial_subdomain();
        let mut mat = Material::ideal_gas("fluid", 1.4);
        mat.rho0 = 1.0;
        mat.viscosity = 0.01;
        let mats = vec![mat];
        let bcs = DomainBcs {
            x0: BoundaryKind::StickWall,
            xmax: BoundaryKind::StickWall,
            y0: BoundaryKind::StickWall,
            ymax: BoundaryKind::StickWall,
            z0: BoundaryKind::StickWall,
            zmax: BoundaryKind::StickWall,
        };
        let ghosts = mesh.outer_ghost_nodes(&sub, &bcs);
        let inco = IncompressibleOperator::new(&mesh, sub, &ghosts, &mats, DVec3::ZERO, DVec3::ZERO);
        let mut integrator = TimeIntegratorSimple::new(inco, SimpleConfig::default()).unwrap();

        let mut v: StateField = Field3::new(&sub, [1.0, 0.0, 0.0, 0.0, 0.0]);
        {
            let mut w = v.write_scope();
            w.at_mut(2, 2, 2)[3] = 0.5; // 内部 w 面扰动
        }
        integrator.inco.apply_boundary_conditions(&mut v);
        let id: IdField = Field3::new(&sub, MaterialId(0));

        let divergence = |v: &StateField| -> f64 {
            let mut total = 0.0;
            for k in 0..4 {
                for j in 0..4 {
                    for i in 0..4 {
                        let d = v.at(i + 1, j, k)[1] - v.at(i, j, k)[1]
                            + v.at(i, j + 1, k)[2]
                            - v.at(i, j, k)[2]
                            + v.at(i, j, k + 1)[3]
                            - v.at(i, j, k)[3];
                        total += d.abs();
                    }
                }
            }
            total
        };
        let div0 = divergence(&v);
        assert!(div0 > 0.5);

        let outer = integrator.step(&mut v, &id, 1.0e3, &SerialComm);
        assert!(outer.residual.is_finite());

        // w 槽位确实被压强修正更新（不再停留在初始扰动值）
        assert!((v.at(2, 2, 2)[3] - 0.5).abs() > 1e-6);
        // 修正后散度大幅下降
        let div1 = divergence(&v);
        assert!(div1 < 0.2 * div0, "散度未下降: {} → {}", div0, div1);
    }

    #[test]
    fn test_outer_iteration_reduces_divergence() {
        // 小腔体：数轮外迭代后速度场散度显著下降
        let (mesh, mats, bcs) = cavity(8, 0.01);
        let sub = mesh.serial_subdomain();
        let ghosts = mesh.outer_ghost_nodes(&sub, &bcs);
        let inco = IncompressibleOperator::new(
            &mesh,
            sub,
            &ghosts,
            &mats,
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::ZERO,
        );
        let mut integrator = TimeIntegratorSimple::new(inco, SimpleConfig::default()).unwrap();

        let mut v: StateField = Field3::new(&sub, [1.0, 0.0, 0.0, 0.0, 0.0]);
        let id: IdField = Field3::new(&sub, MaterialId(0));

        let (rel_err, _converged, its) =
            integrator.advance_one_time_step(&mut v, &id, 1.0e3, 1, &SerialComm);
        assert!(its >= 1);
        assert!(rel_err.is_finite());

        // 腔体流建立：顶盖拖动产生非零内部速度
        let mut max_u = 0.0f64;
        for (i, j, k) in v.real_indices() {
            max_u = max_u.max(v.at(i, j, k)[1].abs());
        }
        assert!(max_u > 1.0e-3, "顶盖未能驱动流动: {}", max_u);
    }
}
