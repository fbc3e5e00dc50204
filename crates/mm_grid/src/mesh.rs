// crates/mm_grid/src/mesh.rs

//! 全局网格信息与外幽灵节点
//!
//! 网格轴对齐、各方向允许非均匀间距。节点即单元中心（节点中心有限
//! 体积）。坐标访问允许幽灵角标：越界一侧按边缘间距线性外推。
//!
//! 外幽灵节点（物理域之外的节点）在此枚举并分类：面投影的幽灵节点
//! 参与边界条件施加；棱/角投影的幽灵节点不填充。

use mm_foundation::{MmError, MmResult};

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::subdomain::SubDomain;

/// 边界条件类别（每个域面一个）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryKind {
    /// 入口（给定状态）
    Inlet,
    /// 出口
    Outlet,
    /// 滑移固壁
    SlipWall,
    /// 无滑移固壁
    StickWall,
    /// 对称面
    Symmetry,
}

/// 域的六个面
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// x 负向
    Left,
    /// x 正向
    Right,
    /// y 负向
    Bottom,
    /// y 正向
    Top,
    /// z 负向
    Back,
    /// z 正向
    Front,
}

/// 幽灵节点向实域的投影类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    /// 面投影（参与边界条件施加）
    Face,
    /// 棱投影
    Edge,
    /// 角投影
    Vertex,
}

/// 外幽灵节点描述
#[derive(Debug, Clone, Copy)]
pub struct GhostNode {
    /// 幽灵节点角标
    pub ijk: [i32; 3],
    /// 镜像（最近实域）节点角标
    pub image: [i32; 3],
    /// 所在域面（面投影时有意义）
    pub side: Side,
    /// 投影类别
    pub proj: ProjectionKind,
    /// 该面的边界条件
    pub bc: BoundaryKind,
}

/// 每个域面的边界条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainBcs {
    pub x0: BoundaryKind,
    pub xmax: BoundaryKind,
    pub y0: BoundaryKind,
    pub ymax: BoundaryKind,
    pub z0: BoundaryKind,
    pub zmax: BoundaryKind,
}

impl Default for DomainBcs {
    fn default() -> Self {
        Self {
            x0: BoundaryKind::Inlet,
            xmax: BoundaryKind::Outlet,
            y0: BoundaryKind::SlipWall,
            ymax: BoundaryKind::SlipWall,
            z0: BoundaryKind::SlipWall,
            zmax: BoundaryKind::SlipWall,
        }
    }
}

/// 全局网格信息
///
/// 逐轴存储单元中心坐标与单元宽度。
#[derive(Debug, Clone)]
pub struct GlobalMesh {
    xc: Vec<f64>,
    yc: Vec<f64>,
    zc: Vec<f64>,
    dxs: Vec<f64>,
    dys: Vec<f64>,
    dzs: Vec<f64>,
    /// 物理域范围
    pub x0: f64,
    pub xmax: f64,
    pub y0: f64,
    pub ymax: f64,
    pub z0: f64,
    pub zmax: f64,
}

impl GlobalMesh {
    /// 由逐轴单元边界坐标构造（各轴长度 = 单元数 + 1，严格递增）
    pub fn from_axis_points(x_edges: &[f64], y_edges: &[f64], z_edges: &[f64]) -> MmResult<Self> {
        let build = |edges: &[f64], axis: &str| -> MmResult<(Vec<f64>, Vec<f64>)> {
            if edges.len() < 2 {
                return Err(MmError::invalid_input(format!("{} 轴节点数不足", axis)));
            }
            let mut centers = Vec::with_capacity(edges.len() - 1);
            let mut widths = Vec::with_capacity(edges.len() - 1);
            for w in edges.windows(2) {
                if w[1] <= w[0] {
                    return Err(MmError::invalid_input(format!("{} 轴节点坐标非递增", axis)));
                }
                centers.push(0.5 * (w[0] + w[1]));
                widths.push(w[1] - w[0]);
            }
            Ok((centers, widths))
        };

        let (xc, dxs) = build(x_edges, "x")?;
        let (yc, dys) = build(y_edges, "y")?;
        let (zc, dzs) = build(z_edges, "z")?;

        Ok(Self {
            x0: x_edges[0],
            xmax: *x_edges.last().unwrap(),
            y0: y_edges[0],
            ymax: *y_edges.last().unwrap(),
            z0: z_edges[0],
            zmax: *z_edges.last().unwrap(),
            xc,
            yc,
            zc,
            dxs,
            dys,
            dzs,
        })
    }

    /// 均匀网格
    pub fn uniform(
        extents: [f64; 6],
        nx: usize,
        ny: usize,
        nz: usize,
    ) -> MmResult<Self> {
        let [x0, xmax, y0, ymax, z0, zmax] = extents;
        let axis = |lo: f64, hi: f64, n: usize| -> Vec<f64> {
            (0..=n)
                .map(|i| lo + (hi - lo) * i as f64 / n as f64)
                .collect()
        };
        Self::from_axis_points(&axis(x0, xmax, nx), &axis(y0, ymax, ny), &axis(z0, zmax, nz))
    }

    /// 各轴单元数
    #[inline]
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.xc.len(), self.yc.len(), self.zc.len())
    }

    fn axis_coord(centers: &[f64], widths: &[f64], i: i32) -> f64 {
        let n = centers.len() as i32;
        if i < 0 {
            centers[0] + widths[0] * i as f64
        } else if i >= n {
            centers[n as usize - 1] + widths[n as usize - 1] * (i - n + 1) as f64
        } else {
            centers[i as usize]
        }
    }

    fn axis_width(widths: &[f64], i: i32) -> f64 {
        let n = widths.len() as i32;
        widths[i.clamp(0, n - 1) as usize]
    }

    /// 单元中心 x 坐标（允许幽灵角标，线性外推）
    #[inline]
    pub fn x(&self, i: i32) -> f64 {
        Self::axis_coord(&self.xc, &self.dxs, i)
    }

    /// 单元中心 y 坐标
    #[inline]
    pub fn y(&self, j: i32) -> f64 {
        Self::axis_coord(&self.yc, &self.dys, j)
    }

    /// 单元中心 z 坐标
    #[inline]
    pub fn z(&self, k: i32) -> f64 {
        Self::axis_coord(&self.zc, &self.dzs, k)
    }

    /// 单元宽度（幽灵角标取边缘值）
    #[inline]
    pub fn dx(&self, i: i32) -> f64 {
        Self::axis_width(&self.dxs, i)
    }

    #[inline]
    pub fn dy(&self, j: i32) -> f64 {
        Self::axis_width(&self.dys, j)
    }

    #[inline]
    pub fn dz(&self, k: i32) -> f64 {
        Self::axis_width(&self.dzs, k)
    }

    /// 单元中心坐标
    #[inline]
    pub fn coords(&self, i: i32, j: i32, k: i32) -> DVec3 {
        DVec3::new(self.x(i), self.y(j), self.z(k))
    }

    /// 单元体积
    #[inline]
    pub fn cell_volume(&self, i: i32, j: i32, k: i32) -> f64 {
        self.dx(i) * self.dy(j) * self.dz(k)
    }

    /// 物理域对角线长度
    pub fn domain_diagonal(&self) -> f64 {
        let dx = self.xmax - self.x0;
        let dy = self.ymax - self.y0;
        let dz = self.zmax - self.z0;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// 全局最小单元尺寸
    pub fn min_cell_size(&self) -> f64 {
        let m = |v: &[f64]| v.iter().cloned().fold(f64::INFINITY, f64::min);
        m(&self.dxs).min(m(&self.dys)).min(m(&self.dzs))
    }

    /// 网格是否退化为 1D（y、z 方向均只有一个单元）
    #[inline]
    pub fn is_1d(&self) -> bool {
        self.yc.len() == 1 && self.zc.len() == 1
    }

    /// 网格是否退化为 2D（z 方向只有一个单元）
    #[inline]
    pub fn is_2d(&self) -> bool {
        self.zc.len() == 1
    }

    /// 构造子域的串行分解
    pub fn serial_subdomain(&self) -> SubDomain {
        let (nx, ny, nz) = self.dims();
        SubDomain::serial(nx, ny, nz)
    }

    /// 枚举子域的外幽灵节点
    ///
    /// 面投影节点记录所在域面与边界条件；棱/角投影节点仅分类。
    pub fn outer_ghost_nodes(&self, sub: &SubDomain, bcs: &DomainBcs) -> Vec<GhostNode> {
        let mut ghosts = Vec::new();
        for k in sub.kk0..sub.kkmax {
            for j in sub.jj0..sub.jjmax {
                for i in sub.ii0..sub.iimax {
                    if !sub.outside_physical_domain(i, j, k) {
                        continue;
                    }
                    let out_x = i < 0 || i >= sub.nx;
                    let out_y = j < 0 || j >= sub.ny;
                    let out_z = k < 0 || k >= sub.nz;
                    let n_out = out_x as u8 + out_y as u8 + out_z as u8;
                    let proj = match n_out {
                        1 => ProjectionKind::Face,
                        2 => ProjectionKind::Edge,
                        _ => ProjectionKind::Vertex,
                    };
                    let (side, bc) = if i < 0 {
                        (Side::Left, bcs.x0)
                    } else if i >= sub.nx {
                        (Side::Right, bcs.xmax)
                    } else if j < 0 {
                        (Side::Bottom, bcs.y0)
                    } else if j >= sub.ny {
                        (Side::Top, bcs.ymax)
                    } else if k < 0 {
                        (Side::Back, bcs.z0)
                    } else {
                        (Side::Front, bcs.zmax)
                    };
                    let image = [
                        i.clamp(0, sub.nx - 1),
                        j.clamp(0, sub.ny - 1),
                        k.clamp(0, sub.nz - 1),
                    ];
                    ghosts.push(GhostNode {
                        ijk: [i, j, k],
                        image,
                        side,
                        proj,
                        bc,
                    });
                }
            }
        }
        ghosts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_mesh() {
        let mesh = GlobalMesh::uniform([0.0, 1.0, 0.0, 1.0, 0.0, 1.0], 4, 2, 1).unwrap();
        assert_eq!(mesh.dims(), (4, 2, 1));
        assert!((mesh.dx(0) - 0.25).abs() < 1e-14);
        assert!((mesh.x(0) - 0.125).abs() < 1e-14);
        assert!((mesh.x(3) - 0.875).abs() < 1e-14);
    }

    #[test]
    fn test_ghost_extrapolation() {
        let mesh = GlobalMesh::uniform([0.0, 1.0, 0.0, 1.0, 0.0, 1.0], 4, 4, 4).unwrap();
        assert!((mesh.x(-1) - (-0.125)).abs() < 1e-14);
        assert!((mesh.x(4) - 1.125).abs() < 1e-14);
        assert!((mesh.dx(-1) - 0.25).abs() < 1e-14);
    }

    #[test]
    fn test_nonuniform_axis() {
        let mesh =
            GlobalMesh::from_axis_points(&[0.0, 1.0, 3.0], &[0.0, 1.0], &[0.0, 1.0]).unwrap();
        assert!((mesh.dx(0) - 1.0).abs() < 1e-14);
        assert!((mesh.dx(1) - 2.0).abs() < 1e-14);
        assert!((mesh.x(1) - 2.0).abs() < 1e-14);
    }

    #[test]
    fn test_inverted_axis_rejected() {
        assert!(GlobalMesh::from_axis_points(&[0.0, -1.0], &[0.0, 1.0], &[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_ghost_node_classification() {
        let mesh = GlobalMesh::uniform([0.0, 1.0, 0.0, 1.0, 0.0, 1.0], 2, 2, 2).unwrap();
        let sub = mesh.serial_subdomain();
        let ghosts = mesh.outer_ghost_nodes(&sub, &DomainBcs::default());

        // 4^3 带幽灵层 - 2^3 实域 = 56 个外幽灵
        assert_eq!(ghosts.len(), 56);

        let faces = ghosts
            .iter()
            .filter(|g| g.proj == ProjectionKind::Face)
            .count();
        // 每面 2x2 共 6 面
        assert_eq!(faces, 24);

        let left: Vec<_> = ghosts
            .iter()
            .filter(|g| g.side == Side::Left && g.proj == ProjectionKind::Face)
            .collect();
        assert_eq!(left.len(), 4);
        assert!(left.iter().all(|g| g.bc == BoundaryKind::Inlet));
        assert!(left.iter().all(|g| g.image[0] == 0));
    }

    #[test]
    fn test_domain_diagonal() {
        let mesh = GlobalMesh::uniform([0.0, 3.0, 0.0, 4.0, 0.0, 0.5], 3, 4, 1).unwrap();
        assert!((mesh.domain_diagonal() - (9.0f64 + 16.0 + 0.25).sqrt()).abs() < 1e-14);
    }
}
