// crates/mm_physics/src/levelset.rs

//! 水平集输运与重初始化
//!
//! 每个被追踪介质对应一个水平集 Φ：Φ<0 在介质内、Φ>0 在介质外，
//! m → 介质编号的映射在构造时固定。
//!
//! 重初始化通过伪时间迭代恢复符号距离性质：
//!
//! `∂φ/∂τ + sgn(φ₀)(|∇φ| − 1) = 0`
//!
//! - 光滑符号函数：`sgn(φ₀) = φ₀ / √(φ₀² + ε²)`，ε 取最小单元
//!   尺寸的一半
//! - 第一层节点（邻域含零交叉）不走伪时间更新：由原始 φ₀ 的单侧
//!   差分直接确定目标距离，并以 CFL 式松弛因子逐次施加（HCR 修正）
//! - 其余节点使用 Godunov 上风 |∇φ|
//! - 收敛判据：‖R‖∞ 低于容差或达到最大迭代数
//! - 带外截断：|φ| 不超过域对角线的一半

use rayon::prelude::*;

use mm_grid::{GhostNode, GlobalMesh, ProjectionKind, SubDomain};

use crate::spaceop::{ScalarField, StateField};
use crate::state::MaterialId;

/// 水平集配置
#[derive(Debug, Clone)]
pub struct LevelSetConfig {
    /// 该水平集追踪的介质编号
    pub material_id: MaterialId,
    /// 重初始化伪时间 CFL（兼作第一层修正的松弛因子）
    pub reinit_cfl: f64,
    /// 重初始化收敛容差（‖R‖∞）
    pub reinit_tol: f64,
    /// 重初始化最大迭代数
    pub reinit_max_iter: usize,
    /// 每隔多少个时间步重初始化一次
    pub reinit_frequency: usize,
}

impl LevelSetConfig {
    /// 追踪指定介质的默认配置
    pub fn for_material(material_id: MaterialId) -> Self {
        Self {
            material_id,
            reinit_cfl: 0.5,
            reinit_tol: 1.0e-3,
            reinit_max_iter: 200,
            reinit_frequency: 1,
        }
    }
}

/// 水平集算子：输运与外边界条件
pub struct LevelSetOperator<'a> {
    pub mesh: &'a GlobalMesh,
    pub sub: SubDomain,
    pub ghosts: &'a [GhostNode],
    pub config: LevelSetConfig,
}

impl<'a> LevelSetOperator<'a> {
    /// 创建水平集算子
    pub fn new(
        mesh: &'a GlobalMesh,
        sub: SubDomain,
        ghosts: &'a [GhostNode],
        config: LevelSetConfig,
    ) -> Self {
        Self {
            mesh,
            sub,
            ghosts,
            config,
        }
    }

    /// 该水平集对应的介质编号
    pub fn material_id(&self) -> MaterialId {
        self.config.material_id
    }

    /// 外幽灵层的零梯度外推
    pub fn apply_boundary_conditions(&self, phi: &mut ScalarField) {
        let mut w = phi.write_scope();
        for g in self.ghosts {
            if g.proj != ProjectionKind::Face {
                continue;
            }
            let val = w.at(g.image[0], g.image[1], g.image[2]);
            *w.at_mut(g.ijk[0], g.ijk[1], g.ijk[2]) = val;
        }
    }

    /// 一阶上风输运：`φ_t + u·∇φ = 0`
    ///
    /// 速度取单元中心值。调用前幽灵层需已填充。
    pub fn advect(&self, phi: &mut ScalarField, v: &StateField, dt: f64) {
        let mesh = self.mesh;
        let old = phi.clone();
        let mut w = phi.write_scope();

        for (i, j, k) in old.real_indices() {
            let vel = v.at(i, j, k);
            let (ux, uy, uz) = (vel[1], vel[2], vel[3]);
            let c = old.at(i, j, k);

            let dpx = if ux > 0.0 {
                (c - old.at(i - 1, j, k)) / (0.5 * (mesh.dx(i - 1) + mesh.dx(i)))
            } else {
                (old.at(i + 1, j, k) - c) / (0.5 * (mesh.dx(i) + mesh.dx(i + 1)))
            };
            let dpy = if uy > 0.0 {
                (c - old.at(i, j - 1, k)) / (0.5 * (mesh.dy(j - 1) + mesh.dy(j)))
            } else {
                (old.at(i, j + 1, k) - c) / (0.5 * (mesh.dy(j) + mesh.dy(j + 1)))
            };
            let dpz = if uz > 0.0 {
                (c - old.at(i, j, k - 1)) / (0.5 * (mesh.dz(k - 1) + mesh.dz(k)))
            } else {
                (old.at(i, j, k + 1) - c) / (0.5 * (mesh.dz(k) + mesh.dz(k + 1)))
            };

            *w.at_mut(i, j, k) = c - dt * (ux * dpx + uy * dpy + uz * dpz);
        }
    }
}

/// 第一层节点记录：各轴向的零交叉目标距离
#[derive(Debug, Clone, Copy)]
struct FirstLayerNode {
    i: i32,
    j: i32,
    k: i32,
    /// 由 φ₀ 单侧差分得到的带符号目标值
    target: f64,
}

/// 水平集重初始化器
pub struct Reinitializer<'a> {
    pub mesh: &'a GlobalMesh,
    pub sub: SubDomain,
    pub cfl: f64,
    pub tol: f64,
    pub max_iter: usize,
}

impl<'a> Reinitializer<'a> {
    /// 创建重初始化器
    pub fn new(mesh: &'a GlobalMesh, sub: SubDomain, config: &LevelSetConfig) -> Self {
        Self {
            mesh,
            sub,
            cfl: config.reinit_cfl,
            tol: config.reinit_tol,
            max_iter: config.reinit_max_iter,
        }
    }

    /// 重初始化：恢复 |∇φ| ≈ 1
    ///
    /// 返回 `(迭代数, 终止时的 ‖R‖∞)`。
    pub fn reinitialize(&self, phi: &mut ScalarField) -> (usize, f64) {
        let mesh = self.mesh;
        let phi0 = phi.clone();

        let eps = 0.5 * mesh.min_cell_size();
        let band_cap = 0.5 * mesh.domain_diagonal();

        // 第一层节点：邻域含零交叉，目标值由 φ₀ 直接确定
        let first_layer = self.tag_first_layer_nodes(&phi0, eps);
        let is_first: std::collections::HashSet<(i32, i32, i32)> =
            first_layer.iter().map(|n| (n.i, n.j, n.k)).collect();

        let mut residual = f64::INFINITY;
        let mut iterations = 0;

        for it in 0..self.max_iter {
            iterations = it + 1;

            // 零梯度幽灵填充
            self.fill_ghosts(phi);

            let snapshot = phi.clone();
            let mut res_max = 0.0f64;
            {
                let mut w = phi.write_scope();
                for (i, j, k) in snapshot.real_indices() {
                    if is_first.contains(&(i, j, k)) {
                        continue;
                    }
                    let p0 = phi0.at(i, j, k);
                    let s = p0 / (p0 * p0 + eps * eps).sqrt();
                    let grad = self.godunov_gradient_norm(&snapshot, i, j, k, s);
                    let r = s * (grad - 1.0);

                    let h = mesh.dx(i).min(mesh.dy(j)).min(mesh.dz(k));
                    let dtau = self.cfl * h;
                    let mut val = snapshot.at(i, j, k) - dtau * r;
                    val = val.clamp(-band_cap, band_cap);
                    *w.at_mut(i, j, k) = val;

                    res_max = res_max.max(r.abs());
                }

                // HCR 第一层修正：向 φ₀ 确定的目标松弛
                for node in &first_layer {
                    let cur = snapshot.at(node.i, node.j, node.k);
                    *w.at_mut(node.i, node.j, node.k) = cur + self.cfl * (node.target - cur);
                }
            }

            residual = res_max;
            if res_max < self.tol {
                break;
            }
        }

        self.fill_ghosts(phi);
        (iterations, residual)
    }

    /// Godunov 上风 |∇φ|
    fn godunov_gradient_norm(&self, phi: &ScalarField, i: i32, j: i32, k: i32, s: f64) -> f64 {
        let mesh = self.mesh;
        let c = phi.at(i, j, k);

        let bx = (c - phi.at(i - 1, j, k)) / (0.5 * (mesh.dx(i - 1) + mesh.dx(i)));
        let fx = (phi.at(i + 1, j, k) - c) / (0.5 * (mesh.dx(i) + mesh.dx(i + 1)));
        let by = (c - phi.at(i, j - 1, k)) / (0.5 * (mesh.dy(j - 1) + mesh.dy(j)));
        let fy = (phi.at(i, j + 1, k) - c) / (0.5 * (mesh.dy(j) + mesh.dy(j + 1)));
        let bz = (c - phi.at(i, j, k - 1)) / (0.5 * (mesh.dz(k - 1) + mesh.dz(k)));
        let fz = (phi.at(i, j, k + 1) - c) / (0.5 * (mesh.dz(k) + mesh.dz(k + 1)));

        let sq = |x: f64| x * x;
        let g2 = if s >= 0.0 {
            sq(bx.max(0.0)).max(sq(fx.min(0.0)))
                + sq(by.max(0.0)).max(sq(fy.min(0.0)))
                + sq(bz.max(0.0)).max(sq(fz.min(0.0)))
        } else {
            sq(bx.min(0.0)).max(sq(fx.max(0.0)))
                + sq(by.min(0.0)).max(sq(fy.max(0.0)))
                + sq(bz.min(0.0)).max(sq(fz.max(0.0)))
        };
        g2.sqrt()
    }

    /// 标记第一层节点并计算目标值
    ///
    /// 对每个与邻居出现符号变化的轴向，线性插值零点位置，取各
    /// 交叉距离的最小值并带上 φ₀ 的符号。
    fn tag_first_layer_nodes(&self, phi0: &ScalarField, eps: f64) -> Vec<FirstLayerNode> {
        let sub = self.sub;
        let mesh = self.mesh;
        let mut nodes = Vec::new();

        let (ii0, jj0, kk0, iimax, jjmax, kkmax) = sub.internal_ghosted_corners();
        for k in kk0..kkmax {
            for j in jj0..jjmax {
                for i in ii0..iimax {
                    let p0 = phi0.at(i, j, k);
                    let mut dist = f64::INFINITY;

                    let mut check = |p_nb: f64, h: f64| {
                        if p0 * p_nb < 0.0 {
                            let theta = p0 / (p0 - p_nb);
                            dist = dist.min(theta.abs() * h);
                        }
                    };

                    if i - 1 >= sub.ii0 {
                        check(phi0.at(i - 1, j, k), 0.5 * (mesh.dx(i - 1) + mesh.dx(i)));
                    }
                    if i + 1 < sub.iimax {
                        check(phi0.at(i + 1, j, k), 0.5 * (mesh.dx(i) + mesh.dx(i + 1)));
                    }
                    if j - 1 >= sub.jj0 {
                        check(phi0.at(i, j - 1, k), 0.5 * (mesh.dy(j - 1) + mesh.dy(j)));
                    }
                    if j + 1 < sub.jjmax {
                        check(phi0.at(i, j + 1, k), 0.5 * (mesh.dy(j) + mesh.dy(j + 1)));
                    }
                    if k - 1 >= sub.kk0 {
                        check(phi0.at(i, j, k - 1), 0.5 * (mesh.dz(k - 1) + mesh.dz(k)));
                    }
                    if k + 1 < sub.kkmax {
                        check(phi0.at(i, j, k + 1), 0.5 * (mesh.dz(k) + mesh.dz(k + 1)));
                    }

                    if dist.is_finite() {
                        let sign = if p0 >= 0.0 { 1.0 } else { -1.0 };
                        nodes.push(FirstLayerNode {
                            i,
                            j,
                            k,
                            target: sign * dist,
                        });
                    } else if p0.abs() < 1.0e-3 * eps {
                        // 恰好落在界面上
                        nodes.push(FirstLayerNode {
                            i,
                            j,
                            k,
                            target: 0.0,
                        });
                    }
                }
            }
        }
        nodes
    }

    /// 零梯度幽灵填充（重初始化的边界条件）
    fn fill_ghosts(&self, phi: &mut ScalarField) {
        let sub = self.sub;
        let mut w = phi.write_scope();
        for k in sub.kk0..sub.kkmax {
            for j in sub.jj0..sub.jjmax {
                for i in sub.ii0..sub.iimax {
                    if !sub.outside_physical_domain(i, j, k) {
                        continue;
                    }
                    let (ci, cj, ck) = (
                        i.clamp(0, sub.nx - 1),
                        j.clamp(0, sub.ny - 1),
                        k.clamp(0, sub.nz - 1),
                    );
                    let val = w.at(ci, cj, ck);
                    *w.at_mut(i, j, k) = val;
                }
            }
        }
    }

    /// 窄带内 ‖|∇φ|−1‖∞（诊断与测试用）
    ///
    /// `band` 为窄带半宽（以 φ 值衡量）。
    pub fn gradient_norm_error(&self, phi: &ScalarField, band: f64) -> f64 {
        let sub = self.sub;
        (sub.k0..sub.kmax)
            .into_par_iter()
            .map(|k| {
                let mut local = 0.0f64;
                for j in sub.j0..sub.jmax {
                    for i in sub.i0..sub.imax {
                        // 边缘节点的中心差分需要两侧邻居
                        if i == 0 || i == sub.nx - 1 {
                            continue;
                        }
                        let p = phi.at(i, j, k);
                        if p.abs() > band {
                            continue;
                        }
                        let gx = (phi.at(i + 1, j, k) - phi.at(i - 1, j, k))
                            / (self.mesh.x(i + 1) - self.mesh.x(i - 1));
                        let gy = if sub.ny > 1 && j > 0 && j < sub.ny - 1 {
                            (phi.at(i, j + 1, k) - phi.at(i, j - 1, k))
                                / (self.mesh.y(j + 1) - self.mesh.y(j - 1))
                        } else {
                            0.0
                        };
                        let gz = if sub.nz > 1 && k > 0 && k < sub.nz - 1 {
                            (phi.at(i, j, k + 1) - phi.at(i, j, k - 1))
                                / (self.mesh.z(k + 1) - self.mesh.z(k - 1))
                        } else {
                            0.0
                        };
                        let g = (gx * gx + gy * gy + gz * gz).sqrt();
                        local = local.max((g - 1.0).abs());
                    }
                }
                local
            })
            .reduce(|| 0.0, f64::max)
    }
}
