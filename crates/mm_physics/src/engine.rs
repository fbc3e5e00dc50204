// crates/mm_physics/src/engine.rs

//! 时间步进驱动
//!
//! 一个时间步的数据流：
//!
//! 1. 对原始状态 V 与各水平集 Φ 施加边界条件
//! 2. 由全部活动单元的 CFL 条件确定步长（全局最小）
//! 3. 可压缩分支：面重构 → Godunov 通量（介质不一致面缓存黎曼解）→
//!    残差 → 显式更新 → 裁剪
//! 4. Φ 上风输运，按节奏重初始化
//! 5. 由 Φ 重建介质编号 ID；编号变化的单元用缓存的黎曼解（或外推）
//!    修复；缓存步末清空
//! 6. 静态嵌入表面在初始化时运行相交器，固体内单元标记为非活动
//! 7. 不可压缩分支：SIMPLE 族外迭代取代第 3–4 步

use tracing::info;

use mm_foundation::MmResult;
use mm_grid::{Comm, Field3, GhostNode, GlobalMesh};

use crate::flux::{GodunovFlux, RiemannSolutions};
use crate::intersector::Intersector;
use crate::levelset::{LevelSetConfig, LevelSetOperator, Reinitializer};
use crate::materials::Material;
use crate::multiphase::{MultiPhaseOperator, PhaseChangePolicy};
use crate::riemann::{ExactRiemannSolver, RiemannParams};
use crate::simple::TimeIntegratorSimple;
use crate::spaceop::{IdField, ScalarField, SpaceOperator, StateField};
use crate::state::MaterialId;

/// 求解器选项
#[derive(Debug, Clone)]
pub struct SolverOptions {
    pub cfl: f64,
    /// 正值时使用固定步长
    pub fixed_timestep: f64,
    pub max_time: f64,
    pub max_steps: usize,
    pub riemann: RiemannParams,
    pub phase_change: PhaseChangePolicy,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            cfl: 0.5,
            fixed_timestep: 0.0,
            max_time: 1.0,
            max_steps: usize::MAX,
            riemann: RiemannParams::default(),
            phase_change: PhaseChangePolicy::RiemannSolution,
        }
    }
}

/// 单步报告
#[derive(Debug, Clone, Copy)]
pub struct StepReport {
    pub step: usize,
    pub time: f64,
    pub dt: f64,
    pub cfl: f64,
    /// 实域裁剪数
    pub clipped: usize,
    /// 不可压缩分支的外迭代残差
    pub simple_residual: Option<f64>,
}

/// 显式可压缩求解器
///
/// 持有全部状态字段与各算子；不可压缩分支由 [`TimeIntegratorSimple`]
/// 单独驱动（见 [`Solver::advance_incompressible`]）。
pub struct Solver<'a> {
    pub spo: SpaceOperator<'a>,
    pub materials: &'a [Material],
    pub level_sets: Vec<LevelSetOperator<'a>>,
    pub mpo: MultiPhaseOperator<'a>,
    pub options: SolverOptions,

    pub v: StateField,
    pub id: IdField,
    pub phis: Vec<ScalarField>,
    riemann_solutions: RiemannSolutions,

    pub time: f64,
    pub step_count: usize,
}

impl<'a> Solver<'a> {
    /// 创建求解器
    ///
    /// `level_set_configs` 给出每个被追踪介质的水平集配置；
    /// 对应的 Φ 字段由调用方初始化。
    pub fn new(
        mesh: &'a GlobalMesh,
        ghosts: &'a [GhostNode],
        materials: &'a [Material],
        spo: SpaceOperator<'a>,
        level_set_configs: Vec<LevelSetConfig>,
        options: SolverOptions,
    ) -> Self {
        let sub = spo.sub;
        let ls2matid = level_set_configs.iter().map(|c| c.material_id).collect();
        let level_sets = level_set_configs
            .into_iter()
            .map(|c| LevelSetOperator::new(mesh, sub, ghosts, c))
            .collect::<Vec<_>>();
        let phis = level_sets
            .iter()
            .map(|_| Field3::new(&sub, 1.0))
            .collect();
        let mpo = MultiPhaseOperator::new(mesh, sub, ls2matid, options.phase_change);

        Self {
            spo,
            materials,
            level_sets,
            mpo,
            options,
            v: Field3::new(&sub, [0.0; 5]),
            id: Field3::new(&sub, MaterialId(0)),
            phis,
            riemann_solutions: RiemannSolutions::new(),
            time: 0.0,
            step_count: 0,
        }
    }

    /// 静态嵌入表面：固体内与遮蔽单元标记为非活动
    ///
    /// `include_enclosures` 为真时封闭腔（负颜色）也视为固体内部。
    pub fn tag_inactive_cells(&mut self, intersector: &Intersector<'_>, include_enclosures: bool) {
        let mut w = self.id.write_scope();
        for (i, j, k) in intersector.color.real_indices() {
            let c = intersector.color.at(i, j, k);
            if c == 0 || (include_enclosures && c < 0) {
                *w.at_mut(i, j, k) = MaterialId::INACTIVE;
            }
        }
    }

    /// 推进一个显式可压缩时间步
    pub fn advance_one_step(&mut self, comm: &dyn Comm) -> MmResult<StepReport> {
        self.step_count += 1;

        // 1. 边界条件
        self.spo.apply_boundary_conditions(&mut self.v);
        for (lso, phi) in self.level_sets.iter().zip(self.phis.iter_mut()) {
            lso.apply_boundary_conditions(phi);
        }

        // 2. 时间步长
        let (mut dt, cfl) = self.spo.compute_time_step(
            &self.v,
            &self.id,
            self.options.cfl,
            self.options.fixed_timestep,
            comm,
        );
        if self.time + dt > self.options.max_time {
            dt = self.options.max_time - self.time;
        }

        // 3. 通量、残差与显式更新
        let riemann = ExactRiemannSolver::new(self.materials, self.options.riemann.clone());
        let mut godunov = GodunovFlux::new(riemann, self.materials);

        let sub = self.spo.sub;
        let mut u: StateField = Field3::new(&sub, [0.0; 5]);
        let mut r: StateField = Field3::new(&sub, [0.0; 5]);
        self.spo
            .primitive_to_conservative(&self.v, &self.id, &mut u, false);
        self.spo.compute_residual(
            &self.v,
            &self.id,
            &mut r,
            &mut godunov,
            Some(&mut self.riemann_solutions),
        );
        {
            let mut w = u.write_scope();
            for (i, j, k) in r.real_indices() {
                if self.id.at(i, j, k).is_inactive() {
                    continue;
                }
                let res = r.at(i, j, k);
                let cell = w.at_mut(i, j, k);
                for c in 0..5 {
                    cell[c] += dt * res[c];
                }
            }
        }
        self.spo
            .conservative_to_primitive(&u, &self.id, &mut self.v, false);
        let clipped = self.spo.clip_density_and_pressure(&mut self.v, &self.id, comm);

        // 4. 水平集输运与重初始化
        for (lso, phi) in self.level_sets.iter().zip(self.phis.iter_mut()) {
            lso.advect(phi, &self.v, dt);
            lso.apply_boundary_conditions(phi);
            if lso.config.reinit_frequency > 0
                && self.step_count % lso.config.reinit_frequency == 0
            {
                let reinit = Reinitializer::new(self.spo.mesh, sub, &lso.config);
                let (its, res) = reinit.reinitialize(phi);
                info!("水平集重初始化: {} 次迭代, 残差 {:e}", its, res);
            }
        }

        // 5. 介质编号重建与相变修复
        if !self.level_sets.is_empty() {
            let idn = self.id.clone();
            let phi_refs: Vec<&ScalarField> = self.phis.iter().collect();
            self.mpo.update_material_id(&phi_refs, &mut self.id, comm)?;
            self.mpo.update_state_after_interface_motion(
                &idn,
                &self.id,
                &mut self.v,
                &self.riemann_solutions,
            );
        }
        self.riemann_solutions.clear();

        self.time += dt;
        Ok(StepReport {
            step: self.step_count,
            time: self.time,
            dt,
            cfl,
            clipped,
            simple_residual: None,
        })
    }

    /// 推进一个不可压缩时间步（SIMPLE 族取代显式更新与输运）
    pub fn advance_incompressible(
        &mut self,
        integrator: &mut TimeIntegratorSimple<'a>,
        comm: &dyn Comm,
    ) -> MmResult<StepReport> {
        self.step_count += 1;

        let (mut dt, cfl) = integrator.inco.compute_time_step(
            &self.v,
            &self.id,
            self.options.cfl,
            self.options.fixed_timestep,
            comm,
        );
        if self.time + dt > self.options.max_time {
            dt = self.options.max_time - self.time;
        }

        let (rel_err, _converged, _its) =
            integrator.advance_one_time_step(&mut self.v, &self.id, dt, self.step_count, comm);

        self.time += dt;
        Ok(StepReport {
            step: self.step_count,
            time: self.time,
            dt,
            cfl,
            clipped: 0,
            simple_residual: Some(rel_err),
        })
    }

    /// 是否到达终止时间或步数
    pub fn finished(&self) -> bool {
        self.time >= self.options.max_time || self.step_count >= self.options.max_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruction::Reconstructor;
    use crate::spaceop::BcStates;
    use crate::state::PrimitiveState;
    use glam::DVec3;
    use mm_grid::{DomainBcs, SerialComm};

    fn build_1d(nx: usize) -> (GlobalMesh, Vec<Material>) {
        let mesh = GlobalMesh::uniform([0.0, 1.0, 0.0, 1.0, 0.0, 1.0], nx, 1, 1).unwrap();
        let mats = vec![Material::ideal_gas("air", 1.4)];
        (mesh, mats)
    }

    #[test]
    fn test_uniform_flow_preserved() {
        let (mesh, mats) = build_1d(16);
        let sub = mesh.serial_subdomain();
        let bcs = DomainBcs::default();
        let ghosts = mesh.outer_ghost_nodes(&sub, &bcs);
        let state = PrimitiveState::new(1.0, DVec3::new(0.3, 0.0, 0.0), 1.0);
        let bc_states = BcStates {
            inlet: state,
            outlet: state,
        };
        let spo = SpaceOperator::new(
            &mesh,
            sub,
            mesh.outer_ghost_nodes(&sub, &bcs),
            &mats,
            bc_states,
            Reconstructor::default(),
        );
        let options = SolverOptions {
            max_time: 0.05,
            ..SolverOptions::default()
        };
        let mut solver = Solver::new(&mesh, &ghosts, &mats, spo, Vec::new(), options);
        solver.v.set_constant(state.to_array(), true);

        let mut steps = 0;
        while !solver.finished() && steps < 100 {
            let report = solver.advance_one_step(&SerialComm).unwrap();
            assert_eq!(report.clipped, 0);
            steps += 1;
        }

        for (i, j, k) in solver.v.real_indices() {
            let cell = PrimitiveState::from_array(solver.v.at(i, j, k));
            assert!(cell.max_abs_diff(&state) < 1e-9, "均匀流被破坏于 ({},{},{})", i, j, k);
        }
    }

    #[test]
    fn test_mass_conservation_closed_box() {
        // 四周滑移壁的封闭盒：总质量守恒
        let mesh = GlobalMesh::uniform([0.0, 1.0, 0.0, 1.0, 0.0, 1.0], 16, 1, 1).unwrap();
        let mats = vec![Material::ideal_gas("air", 1.4)];
        let sub = mesh.serial_subdomain();
        let bcs = DomainBcs {
            x0: mm_grid::BoundaryKind::SlipWall,
            xmax: mm_grid::BoundaryKind::SlipWall,
            ..DomainBcs::default()
        };
        let ghosts = mesh.outer_ghost_nodes(&sub, &bcs);
        let spo = SpaceOperator::new(
            &mesh,
            sub,
            mesh.outer_ghost_nodes(&sub, &bcs),
            &mats,
            BcStates::default(),
            Reconstructor::default(),
        );
        let options = SolverOptions {
            max_time: 0.02,
            ..SolverOptions::default()
        };
        let mut solver = Solver::new(&mesh, &ghosts, &mats, spo, Vec::new(), options);

        // 初始密度扰动
        {
            let mut w = solver.v.write_scope();
            for k in sub.kk0..sub.kkmax {
                for j in sub.jj0..sub.jjmax {
                    for i in sub.ii0..sub.iimax {
                        let x = mesh.x(i);
                        let rho = 1.0 + 0.1 * (2.0 * std::f64::consts::PI * x).sin();
                        *w.at_mut(i, j, k) =
                            PrimitiveState::new(rho, DVec3::ZERO, 1.0).to_array();
                    }
                }
            }
        }

        let mass_of = |v: &StateField| -> f64 {
            v.real_indices()
                .map(|(i, j, k)| v.at(i, j, k)[0] * mesh.cell_volume(i, j, k))
                .sum()
        };
        let m0 = mass_of(&solver.v);

        while !solver.finished() {
            solver.advance_one_step(&SerialComm).unwrap();
        }

        let m1 = mass_of(&solver.v);
        assert!((m1 - m0).abs() / m0 < 1e-10, "质量不守恒: {} → {}", m0, m1);
    }
}
