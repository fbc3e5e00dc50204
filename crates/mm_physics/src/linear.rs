// crates/mm_physics/src/linear.rs

//! 稀疏线性求解器
//!
//! 压强（修正）方程与动量方程的 7 点模板离散以 CSR 格式存储：
//!
//! - [`CsrBuilder`] / [`CsrMatrix`]: 压缩稀疏行矩阵
//! - [`JacobiPreconditioner`]: 对角预条件
//! - [`PcgSolver`]: 预条件共轭梯度（对称系统：压强方程）
//! - [`BiCgStabSolver`]: 双共轭梯度稳定法（非对称系统：动量方程）
//!
//! 不收敛不是错误：求解器返回携带 [`SolverStatus`] 的结果与当前
//! 迭代值，由调用方决定告警与否。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// CSR 矩阵
// ============================================================================

/// CSR 矩阵构建器
///
/// 以 `(row, col)` 随机写入，`build` 时排序压缩。
#[derive(Debug, Clone)]
pub struct CsrBuilder {
    n_rows: usize,
    entries: Vec<BTreeMap<usize, f64>>,
}

impl CsrBuilder {
    /// 创建 `n × n` 构建器
    pub fn new(n_rows: usize) -> Self {
        Self {
            n_rows,
            entries: vec![BTreeMap::new(); n_rows],
        }
    }

    /// 置 `(row, col)` 元素
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.entries[row].insert(col, value);
    }

    /// `(row, col)` 元素累加
    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        *self.entries[row].entry(col).or_insert(0.0) += value;
    }

    /// 压缩为 CSR 矩阵
    pub fn build(self) -> CsrMatrix {
        let mut row_ptr = Vec::with_capacity(self.n_rows + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for row in &self.entries {
            for (&c, &v) in row {
                col_idx.push(c);
                values.push(v);
            }
            row_ptr.push(col_idx.len());
        }
        CsrMatrix {
            n_rows: self.n_rows,
            row_ptr,
            col_idx,
            values,
        }
    }
}

/// CSR 矩阵
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    n_rows: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// 行数
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// 非零元数量
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// 矩阵-向量乘 `y = A x`
    pub fn mul_vec(&self, x: &[f64], y: &mut [f64]) {
        debug_assert_eq!(x.len(), self.n_rows);
        debug_assert_eq!(y.len(), self.n_rows);
        for row in 0..self.n_rows {
            let mut acc = 0.0;
            for idx in self.row_ptr[row]..self.row_ptr[row + 1] {
                acc += self.values[idx] * x[self.col_idx[idx]];
            }
            y[row] = acc;
        }
    }

    /// 对角元素
    pub fn diagonal(&self) -> Vec<f64> {
        let mut diag = vec![0.0; self.n_rows];
        for row in 0..self.n_rows {
            for idx in self.row_ptr[row]..self.row_ptr[row + 1] {
                if self.col_idx[idx] == row {
                    diag[row] = self.values[idx];
                }
            }
        }
        diag
    }
}

// ============================================================================
// 向量运算（BLAS Level 1 风格）
// ============================================================================

/// 点积 x·y
#[inline]
pub fn dot(x: &[f64], y: &[f64]) -> f64 {
    x.iter().zip(y).map(|(&a, &b)| a * b).sum()
}

/// 二范数 ||x||₂
#[inline]
pub fn norm2(x: &[f64]) -> f64 {
    dot(x, x).sqrt()
}

/// y = α x + y
#[inline]
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

// ============================================================================
// 预条件
// ============================================================================

/// 预条件接口：`y = M⁻¹ x`
pub trait Preconditioner: Send + Sync {
    fn apply(&self, x: &[f64], y: &mut [f64]);
}

/// 无预条件（单位矩阵）
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        y.copy_from_slice(x);
    }
}

/// 雅可比（对角）预条件
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner {
    inv_diag: Vec<f64>,
}

impl JacobiPreconditioner {
    /// 由矩阵对角构造；零对角元取 1
    pub fn from_matrix(matrix: &CsrMatrix) -> Self {
        let inv_diag = matrix
            .diagonal()
            .iter()
            .map(|&d| if d.abs() > 1.0e-300 { 1.0 / d } else { 1.0 })
            .collect();
        Self { inv_diag }
    }
}

impl Preconditioner for JacobiPreconditioner {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        for ((yi, &xi), &di) in y.iter_mut().zip(x).zip(&self.inv_diag) {
            *yi = xi * di;
        }
    }
}

// ============================================================================
// 求解器配置与结果
// ============================================================================

/// 求解器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSolverConfig {
    /// 相对收敛容差
    pub rtol: f64,
    /// 绝对收敛容差
    pub atol: f64,
    /// 最大迭代次数
    pub max_iter: usize,
}

impl Default for LinearSolverConfig {
    fn default() -> Self {
        Self {
            rtol: 1.0e-8,
            atol: 1.0e-14,
            max_iter: 1000,
        }
    }
}

/// 求解器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// 收敛
    Converged,
    /// 达到最大迭代次数
    MaxIterationsReached,
    /// 发散或数值崩溃
    Diverged,
}

/// 求解器结果
#[derive(Debug, Clone)]
pub struct SolverResult {
    pub status: SolverStatus,
    pub iterations: usize,
    pub residual_norm: f64,
    pub initial_residual_norm: f64,
}

impl SolverResult {
    /// 是否成功收敛
    pub fn is_converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }
}

// ============================================================================
// PCG
// ============================================================================

/// 预条件共轭梯度求解器
///
/// 适用于对称正（半）定系统；工作区随实例保留避免重复分配。
#[derive(Debug, Clone)]
pub struct PcgSolver {
    config: LinearSolverConfig,
    r: Vec<f64>,
    p: Vec<f64>,
    ap: Vec<f64>,
    z: Vec<f64>,
}

impl PcgSolver {
    /// 创建求解器
    pub fn new(config: LinearSolverConfig) -> Self {
        Self {
            config,
            r: Vec::new(),
            p: Vec::new(),
            ap: Vec::new(),
            z: Vec::new(),
        }
    }

    /// 解 `A x = b`，`x` 为初值并承载结果
    pub fn solve(
        &mut self,
        matrix: &CsrMatrix,
        b: &[f64],
        x: &mut [f64],
        precond: &dyn Preconditioner,
    ) -> SolverResult {
        let n = matrix.n_rows();
        self.r.resize(n, 0.0);
        self.p.resize(n, 0.0);
        self.ap.resize(n, 0.0);
        self.z.resize(n, 0.0);

        // r = b - A x
        matrix.mul_vec(x, &mut self.r);
        for i in 0..n {
            self.r[i] = b[i] - self.r[i];
        }

        let r0_norm = norm2(&self.r);
        let tol = (self.config.rtol * r0_norm).max(self.config.atol);
        if r0_norm <= tol {
            return SolverResult {
                status: SolverStatus::Converged,
                iterations: 0,
                residual_norm: r0_norm,
                initial_residual_norm: r0_norm,
            };
        }

        precond.apply(&self.r, &mut self.z);
        self.p.copy_from_slice(&self.z);
        let mut rz = dot(&self.r, &self.z);

        let mut iterations = 0;
        let mut res_norm = r0_norm;
        let status = loop {
            if iterations >= self.config.max_iter {
                break SolverStatus::MaxIterationsReached;
            }
            iterations += 1;

            matrix.mul_vec(&self.p, &mut self.ap);
            let pap = dot(&self.p, &self.ap);
            if !pap.is_finite() || pap.abs() < 1.0e-300 {
                break SolverStatus::Diverged;
            }
            let alpha = rz / pap;
            axpy(alpha, &self.p, x);
            axpy(-alpha, &self.ap, &mut self.r);

            res_norm = norm2(&self.r);
            if res_norm <= tol {
                break SolverStatus::Converged;
            }
            if !res_norm.is_finite() {
                break SolverStatus::Diverged;
            }

            precond.apply(&self.r, &mut self.z);
            let rz_new = dot(&self.r, &self.z);
            let beta = rz_new / rz;
            rz = rz_new;
            for i in 0..n {
                self.p[i] = self.z[i] + beta * self.p[i];
            }
        };

        SolverResult {
            status,
            iterations,
            residual_norm: res_norm,
            initial_residual_norm: r0_norm,
        }
    }
}

// ============================================================================
// BiCGStab
// ============================================================================

/// 双共轭梯度稳定法
///
/// 适用于上风离散产生的非对称动量系统。
#[derive(Debug, Clone)]
pub struct BiCgStabSolver {
    config: LinearSolverConfig,
}

impl BiCgStabSolver {
    /// 创建求解器
    pub fn new(config: LinearSolverConfig) -> Self {
        Self { config }
    }

    /// 解 `A x = b`，`x` 为初值并承载结果
    pub fn solve(
        &mut self,
        matrix: &CsrMatrix,
        b: &[f64],
        x: &mut [f64],
        precond: &dyn Preconditioner,
    ) -> SolverResult {
        let n = matrix.n_rows();
        let mut r = vec![0.0; n];
        matrix.mul_vec(x, &mut r);
        for i in 0..n {
            r[i] = b[i] - r[i];
        }
        let r0 = r.clone(); // 影子残差，保持不变

        let r0_norm = norm2(&r);
        let tol = (self.config.rtol * r0_norm).max(self.config.atol);
        if r0_norm <= tol {
            return SolverResult {
                status: SolverStatus::Converged,
                iterations: 0,
                residual_norm: r0_norm,
                initial_residual_norm: r0_norm,
            };
        }

        let mut rho = 1.0;
        let mut alpha = 1.0;
        let mut omega = 1.0;
        let mut v = vec![0.0; n];
        let mut p = vec![0.0; n];
        let mut p_hat = vec![0.0; n];
        let mut s = vec![0.0; n];
        let mut s_hat = vec![0.0; n];
        let mut t = vec![0.0; n];

        let mut iterations = 0;
        let mut res_norm = r0_norm;
        let status = loop {
            if iterations >= self.config.max_iter {
                break SolverStatus::MaxIterationsReached;
            }
            iterations += 1;

            let rho_new = dot(&r0, &r);
            if rho_new.abs() < 1.0e-300 {
                break SolverStatus::Diverged;
            }
            let beta = (rho_new / rho) * (alpha / omega);
            rho = rho_new;
            for i in 0..n {
                p[i] = r[i] + beta * (p[i] - omega * v[i]);
            }

            precond.apply(&p, &mut p_hat);
            matrix.mul_vec(&p_hat, &mut v);
            let r0v = dot(&r0, &v);
            if r0v.abs() < 1.0e-300 {
                break SolverStatus::Diverged;
            }
            alpha = rho / r0v;

            for i in 0..n {
                s[i] = r[i] - alpha * v[i];
            }
            let s_norm = norm2(&s);
            if s_norm <= tol {
                axpy(alpha, &p_hat, x);
                res_norm = s_norm;
                break SolverStatus::Converged;
            }

            precond.apply(&s, &mut s_hat);
            matrix.mul_vec(&s_hat, &mut t);
            let tt = dot(&t, &t);
            if tt.abs() < 1.0e-300 {
                break SolverStatus::Diverged;
            }
            omega = dot(&t, &s) / tt;

            for i in 0..n {
                x[i] += alpha * p_hat[i] + omega * s_hat[i];
                r[i] = s[i] - omega * t[i];
            }

            res_norm = norm2(&r);
            if res_norm <= tol {
                break SolverStatus::Converged;
            }
            if !res_norm.is_finite() {
                break SolverStatus::Diverged;
            }
            if omega.abs() < 1.0e-300 {
                break SolverStatus::Diverged;
            }
        };

        SolverResult {
            status,
            iterations,
            residual_norm: res_norm,
            initial_residual_norm: r0_norm,
        }
    }
}
