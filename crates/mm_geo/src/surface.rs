// crates/mm_geo/src/surface.rs

//! 三角化表面
//!
//! 嵌入边界的几何载体：节点坐标 + 三角形连接表，附带缓存的法向量、
//! 面积与邻接关系。构造时完成合法性检查：
//!
//! - 退化三角形（面积为零）是拓扑错误，立即返回 `Err`
//! - 闭合性（每条边恰好被两个三角形共享）在构造时推导一次，存入 `closed`
//!
//! 表面在一个时间步内只读，可以被相交器与输出层以引用共享。

use std::collections::HashMap;
use std::path::Path;

use glam::DVec3;
use mm_foundation::{MmError, MmResult};

use crate::geometry::Aabb;

/// 退化三角形面积阈值（相对于最长边长的平方）
const DEGENERACY_REL_TOL: f64 = 1e-12;

/// 三角化表面
#[derive(Debug, Clone)]
pub struct TriangulatedSurface {
    /// 节点坐标
    pub x: Vec<DVec3>,
    /// 三角形连接表（节点编号，零基）
    pub elems: Vec<[usize; 3]>,
    /// 每个三角形的单位法向量
    pub elem_norm: Vec<DVec3>,
    /// 每个三角形的面积
    pub elem_area: Vec<f64>,
    /// 节点到相邻节点
    pub node2node: Vec<Vec<usize>>,
    /// 节点到关联三角形
    pub node2elem: Vec<Vec<usize>>,
    /// 表面是否闭合（每条边被两个三角形共享）
    pub closed: bool,
}

impl TriangulatedSurface {
    /// 从节点与连接表构造表面
    ///
    /// 完成法向量/面积计算、邻接表构建与合法性检查。
    /// 检测到退化三角形或非法节点编号时返回拓扑错误。
    pub fn new(x: Vec<DVec3>, elems: Vec<[usize; 3]>) -> MmResult<Self> {
        let n_nodes = x.len();
        if n_nodes < 3 || elems.is_empty() {
            return Err(MmError::topology("表面节点或单元数量不足"));
        }

        let mut elem_norm = Vec::with_capacity(elems.len());
        let mut elem_area = Vec::with_capacity(elems.len());

        for (eid, e) in elems.iter().enumerate() {
            for &n in e {
                if n >= n_nodes {
                    return Err(MmError::topology(format!(
                        "单元 {} 引用了不存在的节点 {}",
                        eid, n
                    )));
                }
            }
            let (xa, xb, xc) = (x[e[0]], x[e[1]], x[e[2]]);
            let cross = (xb - xa).cross(xc - xa);
            let area2 = cross.length();
            let max_edge = (xb - xa)
                .length_squared()
                .max((xc - xb).length_squared())
                .max((xa - xc).length_squared());
            if area2 <= DEGENERACY_REL_TOL * max_edge || max_edge == 0.0 {
                return Err(MmError::topology(format!("检测到退化三角形 (单元 {})", eid)));
            }
            elem_norm.push(cross / area2);
            elem_area.push(0.5 * area2);
        }

        // 邻接表
        let mut node2node: Vec<Vec<usize>> = vec![Vec::new(); n_nodes];
        let mut node2elem: Vec<Vec<usize>> = vec![Vec::new(); n_nodes];
        for (eid, e) in elems.iter().enumerate() {
            for c in 0..3 {
                let a = e[c];
                let b = e[(c + 1) % 3];
                if !node2node[a].contains(&b) {
                    node2node[a].push(b);
                }
                if !node2node[b].contains(&a) {
                    node2node[b].push(a);
                }
                node2elem[a].push(eid);
            }
        }

        let closed = Self::check_closedness(&elems);

        Ok(Self {
            x,
            elems,
            elem_norm,
            elem_area,
            node2node,
            node2elem,
            closed,
        })
    }

    /// 每条边恰好被两个三角形共享（且方向相反）则表面闭合
    fn check_closedness(elems: &[[usize; 3]]) -> bool {
        let mut edge_count: HashMap<(usize, usize), i32> = HashMap::new();
        for e in elems {
            for c in 0..3 {
                let a = e[c];
                let b = e[(c + 1) % 3];
                // 无向边计数：闭合表面上每条边恰好出现两次
                *edge_count.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        edge_count.values().all(|&c| c == 2)
    }

    /// 三角形数量
    #[inline]
    pub fn n_elems(&self) -> usize {
        self.elems.len()
    }

    /// 指定三角形的三个顶点坐标
    #[inline]
    pub fn triangle(&self, eid: usize) -> (DVec3, DVec3, DVec3) {
        let e = self.elems[eid];
        (self.x[e[0]], self.x[e[1]], self.x[e[2]])
    }

    /// 指定三角形的包围盒
    #[inline]
    pub fn triangle_aabb(&self, eid: usize) -> Aabb {
        let (a, b, c) = self.triangle(eid);
        Aabb::from_points(&[a, b, c])
    }

    /// 整个表面的包围盒
    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_points(&self.x)
    }

    /// 从网格文件读取表面
    ///
    /// 文件为行式 ASCII：首个有效行 `n_nodes n_elems`，随后 n_nodes 行
    /// 节点坐标（`x y z` 或带前导编号的 `id x y z`），再随后 n_elems 行
    /// 连接表（`v0 v1 v2` 或 `id v0 v1 v2`）。`one_based` 指明连接表
    /// 是否从 1 开始编号。`#` 开头的行为注释。
    pub fn from_mesh_file(path: impl AsRef<Path>, one_based: bool) -> MmResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| MmError::io_with_source(format!("无法读取表面文件 {}", path.display()), e))?;

        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));

        let header = lines
            .next()
            .ok_or_else(|| MmError::invalid_input("表面文件为空"))?;
        let mut it = header.split_whitespace();
        let n_nodes: usize = it
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| MmError::invalid_input("表面文件头部缺少节点数"))?;
        let n_elems: usize = it
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| MmError::invalid_input("表面文件头部缺少单元数"))?;

        let mut x = Vec::with_capacity(n_nodes);
        for _ in 0..n_nodes {
            let line = lines
                .next()
                .ok_or_else(|| MmError::invalid_input("表面文件节点行不足"))?;
            let vals: Vec<f64> = line
                .split_whitespace()
                .filter_map(|s| s.parse().ok())
                .collect();
            let coords = match vals.len() {
                3 => [vals[0], vals[1], vals[2]],
                4 => [vals[1], vals[2], vals[3]], // 首列为节点编号
                _ => return Err(MmError::invalid_input(format!("非法节点行: {}", line))),
            };
            x.push(DVec3::from_array(coords));
        }

        let offset = usize::from(one_based);
        let mut elems = Vec::with_capacity(n_elems);
        for _ in 0..n_elems {
            let line = lines
                .next()
                .ok_or_else(|| MmError::invalid_input("表面文件单元行不足"))?;
            let vals: Vec<usize> = line
                .split_whitespace()
                .filter_map(|s| s.parse().ok())
                .collect();
            let conn = match vals.len() {
                3 => [vals[0], vals[1], vals[2]],
                4 => [vals[1], vals[2], vals[3]], // 首列为单元编号
                _ => return Err(MmError::invalid_input(format!("非法单元行: {}", line))),
            };
            let mut e = [0usize; 3];
            for (dst, &src) in e.iter_mut().zip(conn.iter()) {
                *dst = src
                    .checked_sub(offset)
                    .ok_or_else(|| MmError::invalid_input("单元编号与编号基不符"))?;
            }
            elems.push(e);
        }

        Self::new(x, elems)
    }
}

/// 构造单位球的三角化近似（经纬细分）
///
/// 测试与示例使用；`n_lat`/`n_lon` 为纬向/经向分段数。
pub fn make_sphere(center: DVec3, radius: f64, n_lat: usize, n_lon: usize) -> TriangulatedSurface {
    assert!(n_lat >= 2 && n_lon >= 3);

    let mut x = Vec::new();
    // 两极
    x.push(center + DVec3::new(0.0, 0.0, radius));
    for i in 1..n_lat {
        let theta = std::f64::consts::PI * i as f64 / n_lat as f64;
        for j in 0..n_lon {
            let phi = 2.0 * std::f64::consts::PI * j as f64 / n_lon as f64;
            x.push(
                center
                    + radius
                        * DVec3::new(
                            theta.sin() * phi.cos(),
                            theta.sin() * phi.sin(),
                            theta.cos(),
                        ),
            );
        }
    }
    x.push(center + DVec3::new(0.0, 0.0, -radius));
    let south = x.len() - 1;

    let ring = |i: usize, j: usize| 1 + (i - 1) * n_lon + (j % n_lon);

    let mut elems = Vec::new();
    // 北极帽
    for j in 0..n_lon {
        elems.push([0, ring(1, j), ring(1, j + 1)]);
    }
    // 中部条带
    for i in 1..n_lat - 1 {
        for j in 0..n_lon {
            let (a, b) = (ring(i, j), ring(i, j + 1));
            let (c, d) = (ring(i + 1, j), ring(i + 1, j + 1));
            elems.push([a, c, d]);
            elems.push([a, d, b]);
        }
    }
    // 南极帽
    for j in 0..n_lon {
        elems.push([south, ring(n_lat - 1, j + 1), ring(n_lat - 1, j)]);
    }

    TriangulatedSurface::new(x, elems).expect("球面细分不应产生退化三角形")
}
