// crates/mm_physics/src/materials.rs

//! 介质与状态方程
//!
//! 每种介质由一个状态方程变体加若干物性参数组成。热力学查询：
//! `p(ρ,e)`、`e(ρ,p)`、`c(ρ,p)`、`T(ρ,e)`。
//!
//! 压强下限与失效阈值由介质携带，但**是否裁剪由调用方决定**：
//! 状态方程本身从不修改输入、从不替换输出。

use serde::{Deserialize, Serialize};

/// 状态方程
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Eos {
    /// 理想气体：`p = (γ-1) ρ e`
    IdealGas {
        /// 比热比
        gamma: f64,
    },
    /// 刚性气体：`p = (γ-1) ρ e - γ p_c`
    StiffenedGas {
        /// 比热比
        gamma: f64,
        /// 刚性常数 p_c
        p_const: f64,
    },
    /// Noble-Abel 刚性气体：`p = (γ-1) ρ (e - q) / (1 - b ρ) - γ p_c`
    NobleAbelStiffenedGas {
        gamma: f64,
        p_const: f64,
        /// 协体积
        b: f64,
        /// 参考比内能
        q: f64,
    },
}

impl Eos {
    /// 压强 `p(ρ, e)`
    #[inline]
    pub fn pressure(&self, rho: f64, e: f64) -> f64 {
        match *self {
            Eos::IdealGas { gamma } => (gamma - 1.0) * rho * e,
            Eos::StiffenedGas { gamma, p_const } => (gamma - 1.0) * rho * e - gamma * p_const,
            Eos::NobleAbelStiffenedGas {
                gamma,
                p_const,
                b,
                q,
            } => (gamma - 1.0) * rho * (e - q) / (1.0 - b * rho) - gamma * p_const,
        }
    }

    /// 比内能 `e(ρ, p)`
    #[inline]
    pub fn internal_energy(&self, rho: f64, p: f64) -> f64 {
        match *self {
            Eos::IdealGas { gamma } => p / ((gamma - 1.0) * rho),
            Eos::StiffenedGas { gamma, p_const } => (p + gamma * p_const) / ((gamma - 1.0) * rho),
            Eos::NobleAbelStiffenedGas {
                gamma,
                p_const,
                b,
                q,
            } => (p + gamma * p_const) * (1.0 - b * rho) / ((gamma - 1.0) * rho) + q,
        }
    }

    /// 声速 `c(ρ, p)`
    ///
    /// 等熵导数 `c² = ∂p/∂ρ|_s`。压强低于刚性下限时返回 NaN，
    /// 由调用方按失效策略处理。
    #[inline]
    pub fn sound_speed(&self, rho: f64, p: f64) -> f64 {
        match *self {
            Eos::IdealGas { gamma } => (gamma * p / rho).sqrt(),
            Eos::StiffenedGas { gamma, p_const } => (gamma * (p + p_const) / rho).sqrt(),
            Eos::NobleAbelStiffenedGas {
                gamma, p_const, b, ..
            } => (gamma * (p + p_const) / (rho * (1.0 - b * rho))).sqrt(),
        }
    }

    /// 状态方程允许的最低压强（声速保持实数的下确界）
    #[inline]
    pub fn pressure_infimum(&self) -> f64 {
        match *self {
            Eos::IdealGas { .. } => 0.0,
            Eos::StiffenedGas { p_const, .. } => -p_const,
            Eos::NobleAbelStiffenedGas { p_const, .. } => -p_const,
        }
    }
}

/// 介质：状态方程 + 物性参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    /// 介质名称（诊断输出用）
    pub label: String,
    /// 状态方程
    pub eos: Eos,
    /// 定容比热（温度查询用）
    #[serde(default = "default_cv")]
    pub cv: f64,
    /// 参考温度
    #[serde(default)]
    pub t_ref: f64,
    /// 压强下限：实域状态低于此值视为不变量破坏
    #[serde(default = "default_min_pressure")]
    pub min_pressure: f64,
    /// 失效阈值：低于此值的压强被视为数值失效
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
    /// 常值动力黏度（不可压缩分支）
    #[serde(default)]
    pub viscosity: f64,
    /// 参考密度（不可压缩分支）
    #[serde(default = "default_rho0")]
    pub rho0: f64,
}

fn default_cv() -> f64 {
    1.0
}

fn default_min_pressure() -> f64 {
    -1.0e30
}

fn default_failure_threshold() -> f64 {
    -1.0e30
}

fn default_rho0() -> f64 {
    1.0
}

impl Material {
    /// 理想气体介质（测试与默认配置）
    pub fn ideal_gas(label: impl Into<String>, gamma: f64) -> Self {
        Self {
            label: label.into(),
            eos: Eos::IdealGas { gamma },
            cv: default_cv(),
            t_ref: 0.0,
            min_pressure: default_min_pressure(),
            failure_threshold: default_failure_threshold(),
            viscosity: 0.0,
            rho0: 1.0,
        }
    }

    /// 刚性气体介质
    pub fn stiffened_gas(label: impl Into<String>, gamma: f64, p_const: f64) -> Self {
        Self {
            label: label.into(),
            eos: Eos::StiffenedGas { gamma, p_const },
            cv: default_cv(),
            t_ref: 0.0,
            min_pressure: default_min_pressure(),
            failure_threshold: default_failure_threshold(),
            viscosity: 0.0,
            rho0: 1.0,
        }
    }

    /// 压强 `p(ρ, e)`
    #[inline]
    pub fn pressure(&self, rho: f64, e: f64) -> f64 {
        self.eos.pressure(rho, e)
    }

    /// 比内能 `e(ρ, p)`
    #[inline]
    pub fn internal_energy(&self, rho: f64, p: f64) -> f64 {
        self.eos.internal_energy(rho, p)
    }

    /// 声速 `c(ρ, p)`
    #[inline]
    pub fn sound_speed(&self, rho: f64, p: f64) -> f64 {
        self.eos.sound_speed(rho, p)
    }

    /// 温度 `T(ρ, e)`
    #[inline]
    pub fn temperature(&self, _rho: f64, e: f64) -> f64 {
        self.t_ref + e / self.cv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ideal_gas_roundtrip() {
        let eos = Eos::IdealGas { gamma: 1.4 };
        let (rho, p) = (1.0, 1.0);
        let e = eos.internal_energy(rho, p);
        assert!((eos.pressure(rho, e) - p).abs() < 1e-14);
        assert!((e - 2.5).abs() < 1e-14);
        assert!((eos.sound_speed(rho, p) - 1.4f64.sqrt()).abs() < 1e-14);
    }

    #[test]
    fn test_stiffened_gas_roundtrip() {
        // 水的常用刚性气体参数
        let eos = Eos::StiffenedGas {
            gamma: 6.12,
            p_const: 3.43e8,
        };
        let (rho, p) = (1000.0, 1.0e5);
        let e = eos.internal_energy(rho, p);
        assert!((eos.pressure(rho, e) - p).abs() / p < 1e-10);
        assert!(eos.sound_speed(rho, p) > 1000.0); // 水中声速约 1450 m/s
    }

    #[test]
    fn test_nasg_roundtrip() {
        let eos = Eos::NobleAbelStiffenedGas {
            gamma: 1.19,
            p_const: 6.2178e8,
            b: 6.72e-4,
            q: -1177788.0,
        };
        let (rho, p) = (990.0, 1.0e5);
        let e = eos.internal_energy(rho, p);
        assert!((eos.pressure(rho, e) - p).abs() / p < 1e-9);
    }

    #[test]
    fn test_pressure_infimum() {
        let eos = Eos::StiffenedGas {
            gamma: 4.4,
            p_const: 6.0e8,
        };
        assert_eq!(eos.pressure_infimum(), -6.0e8);
        // 下确界以上声速为实数
        assert!(eos.sound_speed(1000.0, -5.9e8).is_finite());
    }

    #[test]
    fn test_temperature() {
        let mut mat = Material::ideal_gas("air", 1.4);
        mat.cv = 717.0;
        let t = mat.temperature(1.0, 717.0 * 300.0);
        assert!((t - 300.0).abs() < 1e-10);
    }
}
