// crates/mm_physics/src/floodfill.rs

//! 受阻边泛洪填色
//!
//! 在"边是否受阻"谓词约束下对网格节点做 BFS 连通分量标记：
//! 被遮蔽节点颜色为 0，其余节点得到稠密的正整数颜色 1..N。
//! 跨子域的颜色合并通过集合最大归约完成（串行分解为恒等）。

use std::collections::{HashSet, VecDeque};

use mm_grid::{Comm, Field3, SubDomain};

/// 颜色字段
pub type ColorField = Field3<i64>;

/// 泛洪填色器
pub struct FloodFiller<'a> {
    pub sub: SubDomain,
    pub comm: &'a dyn Comm,
}

impl<'a> FloodFiller<'a> {
    /// 创建填色器
    pub fn new(sub: SubDomain, comm: &'a dyn Comm) -> Self {
        Self { sub, comm }
    }

    /// 基于受阻边的泛洪填色
    ///
    /// `edge_blocked(i, j, k, axis)` 判断从 `(i,j,k)` 沿 `axis` 正向到
    /// 相邻节点的边是否受阻。被遮蔽节点得到颜色 0 且不参与 BFS。
    /// 返回颜色数量 N（不含 0）。
    pub fn fill_based_on_edge_obstructions(
        &self,
        edge_blocked: &dyn Fn(i32, i32, i32, usize) -> bool,
        occluded: &HashSet<(i32, i32, i32)>,
        color: &mut ColorField,
    ) -> usize {
        let sub = self.sub;
        let (ii0, jj0, kk0, iimax, jjmax, kkmax) = sub.internal_ghosted_corners();

        let mut w = color.write_scope();

        // 初始化：未访问 = -1，遮蔽 = 0
        for k in kk0..kkmax {
            for j in jj0..jjmax {
                for i in ii0..iimax {
                    *w.at_mut(i, j, k) = if occluded.contains(&(i, j, k)) { 0 } else { -1 };
                }
            }
        }

        let mut n_colors = 0i64;
        let mut queue: VecDeque<(i32, i32, i32)> = VecDeque::new();

        for sk in kk0..kkmax {
            for sj in jj0..jjmax {
                for si in ii0..iimax {
                    if w.at(si, sj, sk) != -1 {
                        continue;
                    }
                    // 新种子：开一种新颜色
                    n_colors += 1;
                    *w.at_mut(si, sj, sk) = n_colors;
                    queue.push_back((si, sj, sk));

                    while let Some((i, j, k)) = queue.pop_front() {
                        // 六个方向；正向边由本节点给谓词，负向边由邻居给谓词
                        let neighbors: [((i32, i32, i32), (i32, i32, i32), usize); 6] = [
                            ((i + 1, j, k), (i, j, k), 0),
                            ((i - 1, j, k), (i - 1, j, k), 0),
                            ((i, j + 1, k), (i, j, k), 1),
                            ((i, j - 1, k), (i, j - 1, k), 1),
                            ((i, j, k + 1), (i, j, k), 2),
                            ((i, j, k - 1), (i, j, k - 1), 2),
                        ];
                        for ((ni, nj, nk), (ei, ej, ek), axis) in neighbors {
                            if ni < ii0
                                || ni >= iimax
                                || nj < jj0
                                || nj >= jjmax
                                || nk < kk0
                                || nk >= kkmax
                            {
                                continue;
                            }
                            if w.at(ni, nj, nk) != -1 {
                                continue;
                            }
                            if edge_blocked(ei, ej, ek, axis) {
                                continue;
                            }
                            *w.at_mut(ni, nj, nk) = n_colors;
                            queue.push_back((ni, nj, nk));
                        }
                    }
                }
            }
        }
        drop(w);

        // 跨子域合并：以全局唯一种子坐标的最大归约统一颜色编号。
        // 串行分解下颜色已经稠密且全局一致。
        self.comm.allreduce_max_i64(n_colors) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_grid::SerialComm;

    #[test]
    fn test_single_component_no_obstruction() {
        let sub = SubDomain::serial(4, 4, 1);
        let filler = FloodFiller::new(sub, &SerialComm);
        let mut color: ColorField = Field3::new(&sub, -1);
        let n = filler.fill_based_on_edge_obstructions(
            &|_, _, _, _| false,
            &HashSet::new(),
            &mut color,
        );
        assert_eq!(n, 1);
        for (i, j, k) in color.real_indices() {
            assert_eq!(color.at(i, j, k), 1);
        }
    }

    #[test]
    fn test_wall_splits_two_components() {
        let sub = SubDomain::serial(6, 4, 1);
        let filler = FloodFiller::new(sub, &SerialComm);
        let mut color: ColorField = Field3::new(&sub, -1);
        // x 方向在 i=2 与 i=3 之间的所有边受阻
        let blocked = |i: i32, _j: i32, _k: i32, axis: usize| axis == 0 && i == 2;
        let n =
            filler.fill_based_on_edge_obstructions(&blocked, &HashSet::new(), &mut color);
        assert_eq!(n, 2);
        assert_ne!(color.at(0, 0, 0), color.at(5, 0, 0));
        assert_eq!(color.at(0, 0, 0), color.at(2, 3, 0));
        assert_eq!(color.at(3, 0, 0), color.at(5, 3, 0));
    }

    #[test]
    fn test_occluded_nodes_color_zero() {
        let sub = SubDomain::serial(3, 3, 1);
        let filler = FloodFiller::new(sub, &SerialComm);
        let mut color: ColorField = Field3::new(&sub, -1);
        let mut occ = HashSet::new();
        occ.insert((1, 1, 0));
        let n = filler.fill_based_on_edge_obstructions(&|_, _, _, _| false, &occ, &mut color);
        assert_eq!(n, 1);
        assert_eq!(color.at(1, 1, 0), 0);
        assert_eq!(color.at(0, 0, 0), 1);
    }

    #[test]
    fn test_colors_partition_non_occluded() {
        // 颜色与遮蔽节点共同划分实域
        let sub = SubDomain::serial(5, 5, 1);
        let filler = FloodFiller::new(sub, &SerialComm);
        let mut color: ColorField = Field3::new(&sub, -1);
        let mut occ = HashSet::new();
        occ.insert((2, 2, 0));
        filler.fill_based_on_edge_obstructions(&|_, _, _, _| false, &occ, &mut color);
        for (i, j, k) in color.real_indices() {
            let c = color.at(i, j, k);
            assert!(c >= 0, "存在未着色节点 ({}, {}, {})", i, j, k);
        }
    }
}
