// crates/mm_grid/src/field.rs

//! 带幽灵层的 3D 字段
//!
//! [`Field3<T>`] 按子域的带幽灵角标存储数据，以 `(i, j, k)` 全局
//! 角标访问（允许负值幽灵角标）。
//!
//! # 写作用域守卫
//!
//! 对字段的写访问通过 [`Field3::write_scope`] 获得 [`WriteGuard`]；
//! 守卫在 `Drop` 时执行"插入+交换"：把本进程拥有的数据刷新到邻居的
//! 内幽灵副本。只读访问直接使用 `&self` 方法，不触发交换。
//! 这样"未配对的获取"在类型层面不可表达。
//!
//! 串行分解没有内幽灵节点，交换是空操作，但守卫的生命周期约束不变。

use std::ops::{Deref, DerefMut};

use crate::subdomain::SubDomain;

/// 带一层幽灵层的 3D 字段
#[derive(Debug, Clone)]
pub struct Field3<T> {
    data: Vec<T>,
    sub: SubDomain,
    nx_g: usize,
    ny_g: usize,
}

impl<T: Copy> Field3<T> {
    /// 创建常数初值的字段
    pub fn new(sub: &SubDomain, init: T) -> Self {
        let (nx_g, ny_g, nz_g) = sub.ghosted_dims();
        Self {
            data: vec![init; nx_g * ny_g * nz_g],
            sub: *sub,
            nx_g,
            ny_g,
        }
    }

    /// 所属子域
    #[inline]
    pub fn subdomain(&self) -> &SubDomain {
        &self.sub
    }

    #[inline]
    fn offset(&self, i: i32, j: i32, k: i32) -> usize {
        debug_assert!(
            i >= self.sub.ii0
                && i < self.sub.iimax
                && j >= self.sub.jj0
                && j < self.sub.jjmax
                && k >= self.sub.kk0
                && k < self.sub.kkmax,
            "字段访问越界: ({}, {}, {})",
            i,
            j,
            k
        );
        let di = (i - self.sub.ii0) as usize;
        let dj = (j - self.sub.jj0) as usize;
        let dk = (k - self.sub.kk0) as usize;
        (dk * self.ny_g + dj) * self.nx_g + di
    }

    /// 读取 `(i, j, k)` 处的值
    #[inline]
    pub fn at(&self, i: i32, j: i32, k: i32) -> T {
        self.data[self.offset(i, j, k)]
    }

    /// `(i, j, k)` 处的引用
    #[inline]
    pub fn get(&self, i: i32, j: i32, k: i32) -> &T {
        &self.data[self.offset(i, j, k)]
    }

    /// 获得写作用域守卫
    ///
    /// 守卫释放时自动执行插入+交换。
    #[inline]
    pub fn write_scope(&mut self) -> WriteGuard<'_, T> {
        WriteGuard { field: self }
    }

    /// 将字段置为常数
    ///
    /// `include_ghost` 为真时同时覆盖幽灵层。
    pub fn set_constant(&mut self, value: T, include_ghost: bool) {
        if include_ghost {
            self.data.fill(value);
        } else {
            let mut guard = self.write_scope();
            let sub = *guard.subdomain();
            for k in sub.k0..sub.kmax {
                for j in sub.j0..sub.jmax {
                    for i in sub.i0..sub.imax {
                        *guard.at_mut(i, j, k) = value;
                    }
                }
            }
        }
    }

    /// 内部可变访问，仅供守卫使用
    #[inline]
    fn at_mut_inner(&mut self, i: i32, j: i32, k: i32) -> &mut T {
        let off = self.offset(i, j, k);
        &mut self.data[off]
    }
}

impl<T> Field3<T> {
    /// 刷新内幽灵副本
    ///
    /// 分布式分解下把本进程实域边缘的数据发送到邻居的内幽灵层；
    /// 串行分解（单子域覆盖全局网格）没有内幽灵节点，无事可做。
    fn exchange(&mut self) {}
}

/// 写作用域守卫
///
/// 通过 `Deref`/`DerefMut` 暴露字段访问；`Drop` 时触发交换。
pub struct WriteGuard<'a, T> {
    field: &'a mut Field3<T>,
}

impl<T: Copy> WriteGuard<'_, T> {
    /// `(i, j, k)` 处的可变引用
    #[inline]
    pub fn at_mut(&mut self, i: i32, j: i32, k: i32) -> &mut T {
        self.field.at_mut_inner(i, j, k)
    }
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = Field3<T>;

    fn deref(&self) -> &Self::Target {
        self.field
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.field
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.field.exchange();
    }
}

impl<T: Copy> Field3<T> {
    /// 遍历实域角标的辅助迭代器 `(i, j, k)`
    pub fn real_indices(&self) -> impl Iterator<Item = (i32, i32, i32)> {
        let sub = self.sub;
        (sub.k0..sub.kmax).flat_map(move |k| {
            (sub.j0..sub.jmax).flat_map(move |j| (sub.i0..sub.imax).map(move |i| (i, j, k)))
        })
    }

    /// 遍历带幽灵层角标的辅助迭代器 `(i, j, k)`
    pub fn ghosted_indices(&self) -> impl Iterator<Item = (i32, i32, i32)> {
        let sub = self.sub;
        (sub.kk0..sub.kkmax).flat_map(move |k| {
            (sub.jj0..sub.jjmax).flat_map(move |j| (sub.ii0..sub.iimax).map(move |i| (i, j, k)))
        })
    }
}
