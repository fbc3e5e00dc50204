// crates/mm_physics/src/incompressible.rs

//! 交错网格不可压缩算子
//!
//! MAC 存储：`v[·][1]` 为单元西面的 u、`v[·][2]` 为南面的 v、
//! `v[·][3]` 为背面的 w，压强存于单元中心 `v[·][4]`。
//!
//! 职责：
//!
//! - 初始条件收尾：单元中心速度插值到面、密度置为参考密度
//! - 交错网格速度边界条件（幽灵与边界面槽位同时填充）
//! - 动量方程装配：上风对流 + 常黏度扩散 + E 因子伪时间步
//! - 压强（修正）方程装配：7 点模板，角单元钉死消零空间
//! - SIMPLER 的帽速度估计
//! - 以 |u|/Δx 为准的时间步长

use glam::DVec3;

use mm_grid::{BoundaryKind, Comm, GhostNode, GlobalMesh, ProjectionKind, Side, SubDomain};

use crate::linear::{CsrBuilder, CsrMatrix};
use crate::materials::Material;
use crate::spaceop::{IdField, ScalarField, StateField};

/// 装配好的动量系统
pub struct MomentumSystem {
    pub matrix: CsrMatrix,
    /// 不含压强梯度的右端项
    pub rhs_nopress: Vec<f64>,
    /// 压强梯度贡献
    pub press_grad: Vec<f64>,
    /// 松弛后的对角系数
    pub ap_eff: Vec<f64>,
    pub n: usize,
}

impl MomentumSystem {
    /// 完整右端项（动量求解用）
    pub fn full_rhs(&self) -> Vec<f64> {
        self.rhs_nopress
            .iter()
            .zip(&self.press_grad)
            .map(|(a, b)| a + b)
            .collect()
    }
}

/// 不可压缩算子
pub struct IncompressibleOperator<'a> {
    pub mesh: &'a GlobalMesh,
    pub sub: SubDomain,
    pub ghosts: &'a [GhostNode],
    pub materials: &'a [Material],
    /// 入口给定速度
    pub inlet_velocity: DVec3,
    /// 出口给定速度
    pub outlet_velocity: DVec3,
}

impl<'a> IncompressibleOperator<'a> {
    /// 创建算子
    pub fn new(
        mesh: &'a GlobalMesh,
        sub: SubDomain,
        ghosts: &'a [GhostNode],
        materials: &'a [Material],
        inlet_velocity: DVec3,
        outlet_velocity: DVec3,
    ) -> Self {
        Self {
            mesh,
            sub,
            ghosts,
            materials,
            inlet_velocity,
            outlet_velocity,
        }
    }

    /// 各方向的未知量维度
    ///
    /// u 的未知面 i ∈ 1..nx，v 的 j ∈ 1..ny，w 的 k ∈ 1..nz；
    /// 域边界面由边界条件直接给定。
    pub fn unknown_dims(&self, dir: usize) -> (i32, i32, i32) {
        let sub = self.sub;
        match dir {
            0 => (sub.nx - 1, sub.ny, sub.nz),
            1 => (sub.nx, sub.ny - 1, sub.nz),
            _ => (sub.nx, sub.ny, sub.nz - 1),
        }
    }

    /// 面未知量的行号；不在未知范围内返回 `None`
    pub fn unknown_index(&self, dir: usize, i: i32, j: i32, k: i32) -> Option<usize> {
        let (di, dj, dk) = self.unknown_dims(dir);
        let (fi, fj, fk) = match dir {
            0 => (i - 1, j, k),
            1 => (i, j - 1, k),
            _ => (i, j, k - 1),
        };
        if fi < 0 || fi >= di || fj < 0 || fj >= dj || fk < 0 || fk >= dk {
            return None;
        }
        Some(((fk * dj + fj) * di + fi) as usize)
    }

    /// 初始条件收尾
    ///
    /// 单元中心速度按间距权重插值到西/南/背面，密度置为介质参考
    /// 密度，压强清零。完成后必须再调用边界条件修正域边界面。
    pub fn finalize_initial_condition(&self, v: &mut StateField, id: &IdField) {
        let mesh = self.mesh;
        let centers = v.clone();
        let mut w = v.write_scope();

        for (i, j, k) in centers.real_indices() {
            let cx0 = mesh.dx(i) / (mesh.dx(i - 1) + mesh.dx(i));
            let cy0 = mesh.dy(j) / (mesh.dy(j - 1) + mesh.dy(j));
            let cz0 = mesh.dz(k) / (mesh.dz(k - 1) + mesh.dz(k));

            let cell = w.at_mut(i, j, k);
            cell[0] = self.materials[id.at(i, j, k).index()].rho0;
            cell[1] = cx0 * centers.at(i - 1, j, k)[1] + (1.0 - cx0) * centers.at(i, j, k)[1];
            cell[2] = cy0 * centers.at(i, j - 1, k)[2] + (1.0 - cy0) * centers.at(i, j, k)[2];
            cell[3] = cz0 * centers.at(i, j, k - 1)[3] + (1.0 - cz0) * centers.at(i, j, k)[3];
            cell[4] = 0.0;
        }
    }

    /// 交错网格速度边界条件
    ///
    /// 由于 MAC 存储，边界面的法向分量写在实域侧槽位，切向分量写在
    /// 幽灵槽位。入口/出口的三个分量直接取给定值 v₀。
    pub fn apply_boundary_conditions(&self, v: &mut StateField) {
        let mut w = v.write_scope();

        for g in self.ghosts {
            if g.proj != ProjectionKind::Face {
                continue;
            }
            let [i, j, k] = g.ijk;
            let [im_i, im_j, im_k] = g.image;

            let v0 = match g.bc {
                BoundaryKind::Inlet => self.inlet_velocity,
                BoundaryKind::Outlet => self.outlet_velocity,
                _ => DVec3::ZERO,
            };

            match g.side {
                Side::Left => match g.bc {
                    BoundaryKind::Inlet | BoundaryKind::Outlet => {
                        w.at_mut(im_i, j, k)[1] = v0.x;
                        w.at_mut(i, j, k)[2] = v0.y;
                        w.at_mut(i, j, k)[3] = v0.z;
                    }
                    BoundaryKind::SlipWall | BoundaryKind::Symmetry => {
                        w.at_mut(im_i, j, k)[1] = 0.0;
                        w.at_mut(i, j, k)[2] = w.at(im_i, im_j, im_k)[2];
                        w.at_mut(i, j, k)[3] = w.at(im_i, im_j, im_k)[3];
                    }
                    BoundaryKind::StickWall => {
                        w.at_mut(im_i, j, k)[1] = 0.0;
                        w.at_mut(i, j, k)[2] = -w.at(im_i, im_j, im_k)[2];
                        w.at_mut(i, j, k)[3] = -w.at(im_i, im_j, im_k)[3];
                    }
                },
                Side::Right => match g.bc {
                    BoundaryKind::Inlet | BoundaryKind::Outlet => {
                        w.at_mut(i, j, k)[1] = v0.x;
                        w.at_mut(i, j, k)[2] = v0.y;
                        w.at_mut(i, j, k)[3] = v0.z;
                    }
                    BoundaryKind::SlipWall | BoundaryKind::Symmetry => {
                        w.at_mut(i, j, k)[1] = 0.0;
                        w.at_mut(i, j, k)[2] = w.at(im_i, im_j, im_k)[2];
                        w.at_mut(i, j, k)[3] = w.at(im_i, im_j, im_k)[3];
                    }
                    BoundaryKind::StickWall => {
                        w.at_mut(i, j, k)[1] = 0.0;
                        w.at_mut(i, j, k)[2] = -w.at(im_i, im_j, im_k)[2];
                        w.at_mut(i, j, k)[3] = -w.at(im_i, im_j, im_k)[3];
                    }
                },
                Side::Bottom => match g.bc {
                    BoundaryKind::Inlet | BoundaryKind::Outlet => {
                        w.at_mut(i, j, k)[1] = v0.x;
                        w.at_mut(i, im_j, k)[2] = v0.y;
                        w.at_mut(i, j, k)[3] = v0.z;
                    }
                    BoundaryKind::SlipWall | BoundaryKind::Symmetry => {
                        w.at_mut(i, j, k)[1] = w.at(im_i, im_j, im_k)[1];
                        w.at_mut(i, im_j, k)[2] = 0.0;
                        w.at_mut(i, j, k)[3] = w.at(im_i, im_j, im_k)[3];
                    }
                    BoundaryKind::StickWall => {
                        w.at_mut(i, j, k)[1] = -w.at(im_i, im_j, im_k)[1];
                        w.at_mut(i, im_j, k)[2] = 0.0;
                        w.at_mut(i, j, k)[3] = -w.at(im_i, im_j, im_k)[3];
                    }
                },
                Side::Top => match g.bc {
                    BoundaryKind::Inlet | BoundaryKind::Outlet => {
                        w.at_mut(i, j, k)[1] = v0.x;
                        w.at_mut(i, j, k)[2] = v0.y;
                        w.at_mut(i, j, k)[3] = v0.z;
                    }
                    BoundaryKind::SlipWall | BoundaryKind::Symmetry => {
                        w.at_mut(i, j, k)[1] = w.at(im_i, im_j, im_k)[1];
                        w.at_mut(i, j, k)[2] = 0.0;
                        w.at_mut(i, j, k)[3] = w.at(im_i, im_j, im_k)[3];
                    }
                    BoundaryKind::StickWall => {
                        w.at_mut(i, j, k)[1] = -w.at(im_i, im_j, im_k)[1];
                        w.at_mut(i, j, k)[2] = 0.0;
                        w.at_mut(i, j, k)[3] = -w.at(im_i, im_j, im_k)[3];
                    }
                },
                Side::Back => match g.bc {
                    BoundaryKind::Inlet | BoundaryKind::Outlet => {
                        // 切向幽灵按 (k, j, i) 正确索引
                        w.at_mut(i, j, k)[1] = v0.x;
                        w.at_mut(i, j, k)[2] = v0.y;
                        w.at_mut(i, j, im_k)[3] = v0.z;
                    }
                    BoundaryKind::SlipWall | BoundaryKind::Symmetry => {
                        w.at_mut(i, j, k)[1] = w.at(im_i, im_j, im_k)[1];
                        w.at_mut(i, j, k)[2] = w.at(im_i, im_j, im_k)[2];
                        w.at_mut(i, j, im_k)[3] = 0.0;
                    }
                    BoundaryKind::StickWall => {
                        w.at_mut(i, j, k)[1] = -w.at(im_i, im_j, im_k)[1];
                        w.at_mut(i, j, k)[2] = -w.at(im_i, im_j, im_k)[2];
                        w.at_mut(i, j, im_k)[3] = 0.0;
                    }
                },
                Side::Front => match g.bc {
                    BoundaryKind::Inlet | BoundaryKind::Outlet => {
                        w.at_mut(i, j, k)[1] = v0.x;
                        w.at_mut(i, j, k)[2] = v0.y;
                        w.at_mut(i, j, k)[3] = v0.z;
                    }
                    BoundaryKind::SlipWall | BoundaryKind::Symmetry => {
                        w.at_mut(i, j, k)[1] = w.at(im_i, im_j, im_k)[1];
                        w.at_mut(i, j, k)[2] = w.at(im_i, im_j, im_k)[2];
                        w.at_mut(i, j, k)[3] = 0.0;
                    }
                    BoundaryKind::StickWall => {
                        w.at_mut(i, j, k)[1] = -w.at(im_i, im_j, im_k)[1];
                        w.at_mut(i, j, k)[2] = -w.at(im_i, im_j, im_k)[2];
                        w.at_mut(i, j, k)[3] = 0.0;
                    }
                },
            }
        }
    }

    /// 以 |u|/Δx 为准的时间步长
    pub fn compute_time_step(
        &self,
        v: &StateField,
        id: &IdField,
        cfl_target: f64,
        fixed_dt: f64,
        comm: &dyn Comm,
    ) -> (f64, f64) {
        let sub = self.sub;
        let mesh = self.mesh;

        let mut vel_over_dx_max = 0.0f64;
        for k in sub.k0..sub.kmax {
            let dz = mesh.dz(k);
            for j in sub.j0..sub.jmax {
                let dy = mesh.dy(j);
                for i in sub.i0..sub.imax {
                    if id.at(i, j, k).is_inactive() {
                        continue;
                    }
                    let dx = mesh.dx(i);
                    let cell = v.at(i, j, k);
                    vel_over_dx_max = vel_over_dx_max
                        .max(cell[1].abs() / dx)
                        .max(cell[2].abs() / dy)
                        .max(cell[3].abs() / dz);
                }
            }
        }
        let global = comm.allreduce_max_f64(vel_over_dx_max).max(1.0e-30);

        if fixed_dt > 0.0 {
            (fixed_dt, fixed_dt * global)
        } else {
            (cfl_target / global, cfl_target)
        }
    }

    /// 动量方程装配
    ///
    /// 上风对流 + 常黏度扩散 + E 因子伪时间步；对角场 `diag` 写入
    /// 压强耦合用的 d 系数（SIMPLEC 用 `a_P − Σa_nb`）。
    #[allow(clippy::too_many_arguments)]
    pub fn build_velocity_equation(
        &self,
        dir: usize,
        v: &StateField,
        id: &IdField,
        diag: &mut ScalarField,
        simplec: bool,
        e_factor: f64,
        dt: f64,
    ) -> MomentumSystem {
        let sub = self.sub;
        let mesh = self.mesh;
        let (di, dj, dk) = self.unknown_dims(dir);
        let n = (di.max(0) * dj.max(0) * dk.max(0)) as usize;

        let mat = &self.materials[0];
        let rho = mat.rho0;
        let mu = mat.viscosity;

        let mut builder = CsrBuilder::new(n);
        let mut rhs_nopress = vec![0.0; n];
        let mut press_grad = vec![0.0; n];
        let mut ap_eff = vec![0.0; n];

        diag.set_constant(0.0, true);
        let mut wdiag = diag.write_scope();

        let comp = dir + 1; // 状态槽位

        // 范围：u: i∈1..nx, j∈0..ny, k∈0..nz
        let (i_lo, i_hi, j_lo, j_hi, k_lo, k_hi) = match dir {
            0 => (1, sub.nx, 0, sub.ny, 0, sub.nz),
            1 => (0, sub.nx, 1, sub.ny, 0, sub.nz),
            _ => (0, sub.nx, 0, sub.ny, 1, sub.nz),
        };

        for k in k_lo..k_hi {
            for j in j_lo..j_hi {
                for i in i_lo..i_hi {
                    let row = self
                        .unknown_index(dir, i, j, k)
                        .expect("面未知量编号越界");

                    // 嵌入固体内的面：冻结为当前值
                    let (li, lj, lk) = match dir {
                        0 => (i - 1, j, k),
                        1 => (i, j - 1, k),
                        _ => (i, j, k - 1),
                    };
                    if id.at(i, j, k).is_inactive() || id.at(li, lj, lk).is_inactive() {
                        builder.set(row, row, 1.0);
                        rhs_nopress[row] = v.at(i, j, k)[comp];
                        ap_eff[row] = 1.0;
                        continue;
                    }

                    // 控制体尺寸：法向跨两半单元，切向取单元宽
                    let (hx, hy, hz) = match dir {
                        0 => (
                            0.5 * (mesh.dx(i - 1) + mesh.dx(i)),
                            mesh.dy(j),
                            mesh.dz(k),
                        ),
                        1 => (
                            mesh.dx(i),
                            0.5 * (mesh.dy(j - 1) + mesh.dy(j)),
                            mesh.dz(k),
                        ),
                        _ => (
                            mesh.dx(i),
                            mesh.dy(j),
                            0.5 * (mesh.dz(k - 1) + mesh.dz(k)),
                        ),
                    };
                    let vol = hx * hy * hz;

                    // 六个 CV 面的 (面积, 对流质量通量, 扩散传导)
                    // 邻居次序: W, E, S, N, B, T
                    let mut a_nb = [0.0f64; 6];
                    let mut flux_sum = 0.0;
                    let neighbors: [(i32, i32, i32); 6] = [
                        (i - 1, j, k),
                        (i + 1, j, k),
                        (i, j - 1, k),
                        (i, j + 1, k),
                        (i, j, k - 1),
                        (i, j, k + 1),
                    ];

                    for (face, &(ni, nj, nk)) in neighbors.iter().enumerate() {
                        let axis = face / 2; // 0: x, 1: y, 2: z
                        let positive = face % 2 == 1;

                        // 面面积与到邻居未知的距离
                        let (area, dist) = match axis {
                            0 => (hy * hz, if dir == 0 {
                                if positive { mesh.dx(i) } else { mesh.dx(i - 1) }
                            } else {
                                0.5 * (mesh.dx(i.min(ni)) + mesh.dx(i.max(ni)))
                            }),
                            1 => (hx * hz, if dir == 1 {
                                if positive { mesh.dy(j) } else { mesh.dy(j - 1) }
                            } else {
                                0.5 * (mesh.dy(j.min(nj)) + mesh.dy(j.max(nj)))
                            }),
                            _ => (hx * hy, if dir == 2 {
                                if positive { mesh.dz(k) } else { mesh.dz(k - 1) }
                            } else {
                                0.5 * (mesh.dz(k.min(nk)) + mesh.dz(k.max(nk)))
                            }),
                        };

                        // CV 面上的法向对流速度（由当前迭代场插值）
                        let conv_vel = self.cv_face_velocity(v, dir, axis, positive, i, j, k);
                        let f = rho * conv_vel * area;
                        let d = if dist > 0.0 { mu * area / dist } else { 0.0 };

                        let signed_f = if positive { f } else { -f };
                        flux_sum += signed_f;

                        // 上风系数
                        a_nb[face] = d + if positive { (-f).max(0.0) } else { f.max(0.0) };

                        match self.unknown_index(dir, ni, nj, nk) {
                            Some(col) => {
                                builder.set(row, col, -a_nb[face]);
                            }
                            None => {
                                // 邻居由边界条件显式给定：移到右端
                                let bc_val = v.at(ni, nj, nk)[comp];
                                rhs_nopress[row] += a_nb[face] * bc_val;
                            }
                        }
                    }

                    let a_sum: f64 = a_nb.iter().sum();
                    let a_transient = rho * vol / dt;
                    let a_p = a_sum + flux_sum + a_transient;

                    // E 因子伪时间步松弛
                    let a_p_eff = a_p * (1.0 + 1.0 / e_factor);
                    let u_cur = v.at(i, j, k)[comp];
                    rhs_nopress[row] += (a_p / e_factor) * u_cur + a_transient * u_cur;

                    builder.set(row, row, a_p_eff);
                    ap_eff[row] = a_p_eff;

                    // 压强梯度（跨该面的两个单元）
                    let (p_lo, p_hi, area_n) = match dir {
                        0 => (v.at(i - 1, j, k)[4], v.at(i, j, k)[4], hy * hz),
                        1 => (v.at(i, j - 1, k)[4], v.at(i, j, k)[4], hx * hz),
                        _ => (v.at(i, j, k - 1)[4], v.at(i, j, k)[4], hx * hy),
                    };
                    press_grad[row] = (p_lo - p_hi) * area_n;

                    // 压强耦合的 d 系数
                    let denom = if simplec {
                        (a_p_eff - a_sum).max(1.0e-300)
                    } else {
                        a_p_eff
                    };
                    *wdiag.at_mut(i, j, k) = area_n / denom;
                }
            }
        }

        drop(wdiag);
        MomentumSystem {
            matrix: builder.build(),
            rhs_nopress,
            press_grad,
            ap_eff,
            n,
        }
    }

    /// 动量 CV 某个面上的法向对流速度
    ///
    /// 同向面（axis == dir）：两相邻面速度的平均；
    /// 异向面：横向速度在该位置的两点插值。
    fn cv_face_velocity(
        &self,
        v: &StateField,
        dir: usize,
        axis: usize,
        positive: bool,
        i: i32,
        j: i32,
        k: i32,
    ) -> f64 {
        let comp_axis = axis + 1;
        if axis == dir {
            // 该 CV 面位于单元中心：相邻两面的平均
            let (ni, nj, nk) = match (axis, positive) {
                (0, true) => (i + 1, j, k),
                (0, false) => (i - 1, j, k),
                (1, true) => (i, j + 1, k),
                (1, false) => (i, j - 1, k),
                (2, true) => (i, j, k + 1),
                _ => (i, j, k - 1),
            };
            0.5 * (v.at(i, j, k)[comp_axis] + v.at(ni, nj, nk)[comp_axis])
        } else {
            // 横向面：横向速度取本单元与法向低侧邻居的插值
            let (li, lj, lk) = match dir {
                0 => (i - 1, j, k),
                1 => (i, j - 1, k),
                _ => (i, j, k - 1),
            };
            let (oi, oj, ok) = if positive {
                match axis {
                    0 => (1, 0, 0),
                    1 => (0, 1, 0),
                    _ => (0, 0, 1),
                }
            } else {
                (0, 0, 0)
            };
            0.5 * (v.at(i + oi, j + oj, k + ok)[comp_axis]
                + v.at(li + oi, lj + oj, lk + ok)[comp_axis])
        }
    }

    /// SIMPLER 帽速度估计
    ///
    /// `û = u − (A·u − b_nopress)/a_P`：不解线性系统，由当前场直接
    /// 评估无压强梯度的动量平衡。结果写入 `vhat`（未知面之外保持
    /// 当前面速度）。
    #[allow(clippy::too_many_arguments)]
    pub fn estimate_velocity_for_pressure(
        &self,
        dir: usize,
        v: &StateField,
        id: &IdField,
        vhat: &mut Vec<f64>,
        diag: &mut ScalarField,
        simplec: bool,
        e_factor: f64,
        dt: f64,
    ) -> MomentumSystem {
        let system = self.build_velocity_equation(dir, v, id, diag, simplec, e_factor, dt);
        let u_cur = self.extract_face_velocities(dir, v);
        let mut au = vec![0.0; system.n];
        system.matrix.mul_vec(&u_cur, &mut au);

        vhat.clear();
        vhat.extend((0..system.n).map(|row| {
            u_cur[row] - (au[row] - system.rhs_nopress[row]) / system.ap_eff[row]
        }));
        system
    }

    /// 未知面速度向量提取
    pub fn extract_face_velocities(&self, dir: usize, v: &StateField) -> Vec<f64> {
        let (di, dj, dk) = self.unknown_dims(dir);
        let n = (di.max(0) * dj.max(0) * dk.max(0)) as usize;
        let mut out = vec![0.0; n];
        let comp = dir + 1;
        let (i_lo, i_hi, j_lo, j_hi, k_lo, k_hi) = match dir {
            0 => (1, self.sub.nx, 0, self.sub.ny, 0, self.sub.nz),
            1 => (0, self.sub.nx, 1, self.sub.ny, 0, self.sub.nz),
            _ => (0, self.sub.nx, 0, self.sub.ny, 1, self.sub.nz),
        };
        for k in k_lo..k_hi {
            for j in j_lo..j_hi {
                for i in i_lo..i_hi {
                    let row = self.unknown_index(dir, i, j, k).unwrap();
                    out[row] = v.at(i, j, k)[comp];
                }
            }
        }
        out
    }

    /// 未知面速度向量写回
    pub fn store_face_velocities(&self, dir: usize, values: &[f64], v: &mut StateField) {
        let comp = dir + 1;
        let (i_lo, i_hi, j_lo, j_hi, k_lo, k_hi) = match dir {
            0 => (1, self.sub.nx, 0, self.sub.ny, 0, self.sub.nz),
            1 => (0, self.sub.nx, 1, self.sub.ny, 0, self.sub.nz),
            _ => (0, self.sub.nx, 0, self.sub.ny, 1, self.sub.nz),
        };
        let mut w = v.write_scope();
        for k in k_lo..k_hi {
            for j in j_lo..j_hi {
                for i in i_lo..i_hi {
                    let row = self.unknown_index(dir, i, j, k).unwrap();
                    w.at_mut(i, j, k)[comp] = values[row];
                }
            }
        }
    }

    /// 压强（修正）方程装配
    ///
    /// 7 点泊松型模板：系数由动量对角的倒数（d 系数）构成，右端为
    /// 面速度的离散散度。`pinned` 单元被钉死为零，消去零空间。
    #[allow(clippy::too_many_arguments)]
    pub fn build_pressure_equation(
        &self,
        face_u: &[f64],
        face_v: &[f64],
        face_w: &[f64],
        v: &StateField,
        dx: &ScalarField,
        dy: &ScalarField,
        dz: &ScalarField,
        pinned: [i32; 3],
    ) -> (CsrMatrix, Vec<f64>) {
        let sub = self.sub;
        let mesh = self.mesh;
        let rho = self.materials[0].rho0;
        let n = sub.n_real_cells();

        let cell_index = |i: i32, j: i32, k: i32| -> usize {
            ((k * sub.ny + j) * sub.nx + i) as usize
        };

        // 未知面速度或边界面速度
        let u_at = |i: i32, j: i32, k: i32| -> f64 {
            match self.unknown_index(0, i, j, k) {
                Some(row) => face_u[row],
                None => v.at(i, j, k)[1],
            }
        };
        let v_at = |i: i32, j: i32, k: i32| -> f64 {
            match self.unknown_index(1, i, j, k) {
                Some(row) => face_v[row],
                None => v.at(i, j, k)[2],
            }
        };
        let w_at = |i: i32, j: i32, k: i32| -> f64 {
            match self.unknown_index(2, i, j, k) {
                Some(row) => face_w[row],
                None => v.at(i, j, k)[3],
            }
        };

        let mut builder = CsrBuilder::new(n);
        let mut b = vec![0.0; n];

        for k in sub.k0..sub.kmax {
            for j in sub.j0..sub.jmax {
                for i in sub.i0..sub.imax {
                    let row = cell_index(i, j, k);

                    if [i, j, k] == pinned {
                        builder.set(row, row, 1.0);
                        b[row] = 0.0;
                        continue;
                    }

                    let ax = mesh.dy(j) * mesh.dz(k);
                    let ay = mesh.dx(i) * mesh.dz(k);
                    let az = mesh.dx(i) * mesh.dy(j);

                    let mut a_p = 0.0;

                    // 钉死单元的修正恒为零：对其不放离轴项，保持矩阵对称
                    let couple = |builder: &mut CsrBuilder,
                                      a_p: &mut f64,
                                      nb: [i32; 3],
                                      coeff: f64| {
                        *a_p += coeff;
                        if nb != pinned {
                            builder.set(row, cell_index(nb[0], nb[1], nb[2]), -coeff);
                        }
                    };

                    // 六个面；仅未知面有修正能力
                    if self.unknown_index(0, i, j, k).is_some() {
                        let coeff = rho * ax * dx.at(i, j, k);
                        couple(&mut builder, &mut a_p, [i - 1, j, k], coeff);
                    }
                    if self.unknown_index(0, i + 1, j, k).is_some() {
                        let coeff = rho * ax * dx.at(i + 1, j, k);
                        couple(&mut builder, &mut a_p, [i + 1, j, k], coeff);
                    }
                    if self.unknown_index(1, i, j, k).is_some() {
                        let coeff = rho * ay * dy.at(i, j, k);
                        couple(&mut builder, &mut a_p, [i, j - 1, k], coeff);
                    }
                    if self.unknown_index(1, i, j + 1, k).is_some() {
                        let coeff = rho * ay * dy.at(i, j + 1, k);
                        couple(&mut builder, &mut a_p, [i, j + 1, k], coeff);
                    }
                    if self.unknown_index(2, i, j, k).is_some() {
                        let coeff = rho * az * dz.at(i, j, k);
                        couple(&mut builder, &mut a_p, [i, j, k - 1], coeff);
                    }
                    if self.unknown_index(2, i, j, k + 1).is_some() {
                        let coeff = rho * az * dz.at(i, j, k + 1);
                        couple(&mut builder, &mut a_p, [i, j, k + 1], coeff);
                    }

                    // 钉死单元作为邻居时其修正为零：系数落到对角即可
                    builder.set(row, row, a_p.max(1.0e-300));

                    // 右端：−div(ρ u*)
                    b[row] = rho
                        * (u_at(i, j, k) * ax - u_at(i + 1, j, k) * ax
                            + v_at(i, j, k) * ay
                            - v_at(i, j + 1, k) * ay
                            + w_at(i, j, k) * az
                            - w_at(i, j, k + 1) * az);
                }
            }
        }

        (builder.build(), b)
    }
}
