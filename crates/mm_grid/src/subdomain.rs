// crates/mm_grid/src/subdomain.rs

//! 子域角标
//!
//! 每个进程拥有全局网格的一个 3D 子块，外加每侧一层幽灵节点。
//! 角标命名沿用求解器的习惯用语：
//!
//! - `i0..imax` 等：实域角标（本进程独占写）
//! - `ii0..iimax` 等：带幽灵层的角标（`ii0 = i0-1` 等）
//! - "内幽灵"：属于邻居进程的副本；"外幽灵"：物理域之外的节点
//!
//! 上界一律为开区间。

/// 子域角标与全局尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubDomain {
    /// 实域下角标（含）
    pub i0: i32,
    pub j0: i32,
    pub k0: i32,
    /// 实域上角标（不含）
    pub imax: i32,
    pub jmax: i32,
    pub kmax: i32,
    /// 带幽灵层的下角标（含）
    pub ii0: i32,
    pub jj0: i32,
    pub kk0: i32,
    /// 带幽灵层的上角标（不含）
    pub iimax: i32,
    pub jjmax: i32,
    pub kkmax: i32,
    /// 全局网格尺寸
    pub nx: i32,
    pub ny: i32,
    pub nz: i32,
}

impl SubDomain {
    /// 串行分解：单个子域覆盖整个全局网格
    pub fn serial(nx: usize, ny: usize, nz: usize) -> Self {
        let (nx, ny, nz) = (nx as i32, ny as i32, nz as i32);
        Self {
            i0: 0,
            j0: 0,
            k0: 0,
            imax: nx,
            jmax: ny,
            kmax: nz,
            ii0: -1,
            jj0: -1,
            kk0: -1,
            iimax: nx + 1,
            jjmax: ny + 1,
            kkmax: nz + 1,
            nx,
            ny,
            nz,
        }
    }

    /// 实域加内幽灵层的角标（物理域内的全部本地可见节点）
    ///
    /// 串行分解下没有内幽灵，等于实域角标；分布式分解下该区域
    /// 向邻居方向各延伸一层。
    #[inline]
    pub fn internal_ghosted_corners(&self) -> (i32, i32, i32, i32, i32, i32) {
        (
            self.ii0.max(0),
            self.jj0.max(0),
            self.kk0.max(0),
            self.iimax.min(self.nx),
            self.jjmax.min(self.ny),
            self.kkmax.min(self.nz),
        )
    }

    /// 节点是否在本子域的实域内
    #[inline]
    pub fn owns(&self, i: i32, j: i32, k: i32) -> bool {
        i >= self.i0
            && i < self.imax
            && j >= self.j0
            && j < self.jmax
            && k >= self.k0
            && k < self.kmax
    }

    /// 节点是否在物理域之外（外幽灵）
    #[inline]
    pub fn outside_physical_domain(&self, i: i32, j: i32, k: i32) -> bool {
        i < 0 || i >= self.nx || j < 0 || j >= self.ny || k < 0 || k >= self.nz
    }

    /// 带幽灵层的各向尺寸
    #[inline]
    pub fn ghosted_dims(&self) -> (usize, usize, usize) {
        (
            (self.iimax - self.ii0) as usize,
            (self.jjmax - self.jj0) as usize,
            (self.kkmax - self.kk0) as usize,
        )
    }

    /// 实域单元总数
    #[inline]
    pub fn n_real_cells(&self) -> usize {
        ((self.imax - self.i0) * (self.jmax - self.j0) * (self.kmax - self.k0)) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_corners() {
        let sub = SubDomain::serial(8, 4, 2);
        assert_eq!((sub.i0, sub.imax), (0, 8));
        assert_eq!((sub.ii0, sub.iimax), (-1, 9));
        assert_eq!(sub.ghosted_dims(), (10, 6, 4));
        assert_eq!(sub.n_real_cells(), 64);
    }

    #[test]
    fn test_serial_internal_ghosted_equals_real() {
        let sub = SubDomain::serial(8, 4, 2);
        assert_eq!(sub.internal_ghosted_corners(), (0, 0, 0, 8, 4, 2));
    }

    #[test]
    fn test_outside_physical_domain() {
        let sub = SubDomain::serial(8, 4, 2);
        assert!(sub.outside_physical_domain(-1, 0, 0));
        assert!(sub.outside_physical_domain(0, 4, 0));
        assert!(!sub.outside_physical_domain(7, 3, 1));
    }

    #[test]
    fn test_owns() {
        let sub = SubDomain::serial(8, 4, 2);
        assert!(sub.owns(0, 0, 0));
        assert!(!sub.owns(-1, 0, 0));
        assert!(!sub.owns(8, 0, 0));
    }
}
