// crates/mm_config/src/types.rs

//! 求解器配置类型
//!
//! 全 f64 存储，JSON 序列化；`validate()` 在启动时快速失败。

use std::path::{Path, PathBuf};

use glam::DVec3;
use serde::{Deserialize, Serialize};

use mm_grid::{DomainBcs, GlobalMesh};
use mm_physics::multiphase::PhaseChangePolicy;
use mm_physics::riemann::RiemannParams;
use mm_physics::simple::SimpleConfig;
use mm_physics::{Material, PrimitiveState};

use crate::regions::InitialRegion;

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(#[from] serde_json::Error),

    /// 无效值
    #[error("无效值 '{key}': {reason}")]
    InvalidValue {
        /// 配置键
        key: String,
        /// 原因
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// 初值状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StateConfig {
    pub density: f64,
    #[serde(default)]
    pub velocity: [f64; 3],
    pub pressure: f64,
}

impl StateConfig {
    /// 转换为原始状态
    pub fn to_primitive(&self) -> PrimitiveState {
        PrimitiveState::new(self.density, DVec3::from_array(self.velocity), self.pressure)
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            density: 1.0,
            velocity: [0.0; 3],
            pressure: 1.0,
        }
    }
}

/// 网格配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// 物理域范围 `[x0, xmax, y0, ymax, z0, zmax]`
    pub extents: [f64; 6],
    /// 各向单元数（均匀网格）
    pub cells: [usize; 3],
    /// 显式单元边界坐标（给定时覆盖均匀划分）
    #[serde(default)]
    pub x_points: Option<Vec<f64>>,
    #[serde(default)]
    pub y_points: Option<Vec<f64>>,
    #[serde(default)]
    pub z_points: Option<Vec<f64>>,
}

impl MeshConfig {
    /// 构造全局网格
    pub fn build(&self) -> Result<GlobalMesh, ConfigError> {
        let uniform_axis = |lo: f64, hi: f64, n: usize| -> Vec<f64> {
            (0..=n)
                .map(|i| lo + (hi - lo) * i as f64 / n as f64)
                .collect()
        };
        let [x0, xmax, y0, ymax, z0, zmax] = self.extents;
        let xs = self
            .x_points
            .clone()
            .unwrap_or_else(|| uniform_axis(x0, xmax, self.cells[0]));
        let ys = self
            .y_points
            .clone()
            .unwrap_or_else(|| uniform_axis(y0, ymax, self.cells[1]));
        let zs = self
            .z_points
            .clone()
            .unwrap_or_else(|| uniform_axis(z0, zmax, self.cells[2]));
        GlobalMesh::from_axis_points(&xs, &ys, &zs)
            .map_err(|e| ConfigError::invalid("mesh", e.to_string()))
    }
}

/// 嵌入表面配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedSurfaceConfig {
    /// 表面网格文件路径
    pub path: PathBuf,
    /// 表面厚度
    pub thickness: f64,
    /// 连接表是否从 1 开始编号
    #[serde(default)]
    pub one_based: bool,
    /// 封闭腔是否视为固体内部
    #[serde(default = "default_true")]
    pub solid_interior: bool,
}

fn default_true() -> bool {
    true
}

/// 水平集条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelSetEntry {
    /// 被追踪介质的编号
    pub material_id: u16,
    #[serde(default = "default_reinit_frequency")]
    pub reinit_frequency: usize,
    #[serde(default = "default_reinit_max_iter")]
    pub reinit_max_iter: usize,
    #[serde(default = "default_reinit_tol")]
    pub reinit_tol: f64,
    #[serde(default = "default_reinit_cfl")]
    pub reinit_cfl: f64,
}

fn default_reinit_frequency() -> usize {
    1
}

fn default_reinit_max_iter() -> usize {
    200
}

fn default_reinit_tol() -> f64 {
    1.0e-3
}

fn default_reinit_cfl() -> f64 {
    0.5
}

/// 求解分支
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SolverMode {
    #[default]
    Compressible,
    Incompressible,
}

/// 求解器小节
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSection {
    pub mode: SolverMode,
    pub cfl: f64,
    /// 正值时使用固定步长
    pub timestep: f64,
    pub max_time: f64,
    pub max_steps: usize,
    pub riemann: RiemannParams,
    pub simple: SimpleConfig,
    pub phase_change: PhaseChangePolicy,
}

impl Default for SolverSection {
    fn default() -> Self {
        Self {
            mode: SolverMode::Compressible,
            cfl: 0.5,
            timestep: 0.0,
            max_time: 1.0,
            max_steps: usize::MAX,
            riemann: RiemannParams::default(),
            simple: SimpleConfig::default(),
            phase_change: PhaseChangePolicy::RiemannSolution,
        }
    }
}

/// 输出小节
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// 每隔多少步写快照（0 = 不按步）
    pub frequency_steps: usize,
    /// 每隔多少模拟时间写快照（0 = 不按时间）
    pub frequency_time: f64,
    /// 输出字段名（density, velocity, pressure, material_id,
    /// internal_energy, temperature, levelset_<m>）
    pub fields: Vec<String>,
    /// 探针位置
    pub probes: Vec<[f64; 3]>,
    /// 线图：起点、终点、取样数
    pub lines: Vec<([f64; 3], [f64; 3], usize)>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            frequency_steps: 0,
            frequency_time: 0.0,
            fields: vec![
                "density".to_string(),
                "velocity".to_string(),
                "pressure".to_string(),
            ],
            probes: Vec::new(),
            lines: Vec::new(),
        }
    }
}

/// 求解器总配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    pub materials: Vec<Material>,
    pub mesh: MeshConfig,
    #[serde(default)]
    pub boundaries: DomainBcs,
    #[serde(default)]
    pub inlet: StateConfig,
    #[serde(default)]
    pub outlet: StateConfig,
    #[serde(default)]
    pub initial: Vec<InitialRegion>,
    /// 区域之外的默认初值
    #[serde(default)]
    pub default_state: StateConfig,
    #[serde(default)]
    pub embedded_surfaces: Vec<EmbeddedSurfaceConfig>,
    #[serde(default)]
    pub level_sets: Vec<LevelSetEntry>,
    #[serde(default)]
    pub solver: SolverSection,
    #[serde(default)]
    pub output: OutputConfig,
}

impl SolverConfig {
    /// 从 JSON 文件读取
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// 启动时的快速失败校验
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.materials.is_empty() {
            return Err(ConfigError::invalid("materials", "至少需要一种介质"));
        }
        for (idx, mat) in self.materials.iter().enumerate() {
            let gamma = match mat.eos {
                mm_physics::Eos::IdealGas { gamma } => gamma,
                mm_physics::Eos::StiffenedGas { gamma, .. } => gamma,
                mm_physics::Eos::NobleAbelStiffenedGas { gamma, .. } => gamma,
            };
            if gamma <= 1.0 {
                return Err(ConfigError::invalid(
                    format!("materials[{}].gamma", idx),
                    "比热比必须大于 1",
                ));
            }
        }

        let [x0, xmax, y0, ymax, z0, zmax] = self.mesh.extents;
        if x0 >= xmax || y0 >= ymax || z0 >= zmax {
            return Err(ConfigError::invalid("mesh.extents", "物理域范围反向"));
        }
        if self.mesh.cells.iter().any(|&n| n == 0) {
            return Err(ConfigError::invalid("mesh.cells", "各向单元数必须为正"));
        }

        for (idx, ls) in self.level_sets.iter().enumerate() {
            if ls.material_id as usize >= self.materials.len() {
                return Err(ConfigError::invalid(
                    format!("level_sets[{}].material_id", idx),
                    "引用了不存在的介质",
                ));
            }
        }
        for (idx, region) in self.initial.iter().enumerate() {
            if region.material_id as usize >= self.materials.len() {
                return Err(ConfigError::invalid(
                    format!("initial[{}].material_id", idx),
                    "引用了不存在的介质",
                ));
            }
        }

        if self.solver.mode == SolverMode::Incompressible {
            if self.materials.len() > 1 {
                return Err(ConfigError::invalid(
                    "solver.mode",
                    "不可压缩求解器目前只支持单一介质",
                ));
            }
            if !self.level_sets.is_empty() {
                return Err(ConfigError::invalid(
                    "solver.mode",
                    "不可压缩求解器不支持水平集追踪",
                ));
            }
        }

        if self.solver.cfl <= 0.0 && self.solver.timestep <= 0.0 {
            return Err(ConfigError::invalid(
                "solver.cfl",
                "CFL 与固定步长必须至少给定一个正值",
            ));
        }

        for (idx, surf) in self.embedded_surfaces.iter().enumerate() {
            if surf.thickness <= 0.0 {
                return Err(ConfigError::invalid(
                    format!("embedded_surfaces[{}].thickness", idx),
                    "表面厚度必须为正",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::RegionShape;

    fn minimal() -> SolverConfig {
        SolverConfig {
            materials: vec![Material::ideal_gas("air", 1.4)],
            mesh: MeshConfig {
                extents: [0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
                cells: [8, 8, 8],
                x_points: None,
                y_points: None,
                z_points: None,
            },
            boundaries: DomainBcs::default(),
            inlet: StateConfig::default(),
            outlet: StateConfig::default(),
            initial: Vec::new(),
            default_state: StateConfig::default(),
            embedded_surfaces: Vec::new(),
            level_sets: Vec::new(),
            solver: SolverSection::default(),
            output: OutputConfig::default(),
        }
    }

    #[test]
    fn test_minimal_validates() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn test_bad_gamma_rejected() {
        let mut config = minimal();
        config.materials[0].eos = mm_physics::Eos::IdealGas { gamma: 0.9 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_extents_rejected() {
        let mut config = minimal();
        config.mesh.extents = [1.0, 0.0, 0.0, 1.0, 0.0, 1.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_levelset_material_rejected() {
        let mut config = minimal();
        config.level_sets.push(LevelSetEntry {
            material_id: 5,
            reinit_frequency: 1,
            reinit_max_iter: 200,
            reinit_tol: 1e-3,
            reinit_cfl: 0.5,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_incompressible_multi_material_rejected() {
        let mut config = minimal();
        config.solver.mode = SolverMode::Incompressible;
        config.materials.push(Material::ideal_gas("other", 1.4));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = minimal();
        config.initial.push(InitialRegion {
            shape: RegionShape::Sphere {
                center: [0.5, 0.5, 0.5],
                radius: 0.2,
            },
            state: StateConfig {
                density: 1000.0,
                velocity: [0.0, 0.0, 0.0],
                pressure: 1.0e9,
            },
            material_id: 0,
        });
        let text = serde_json::to_string_pretty(&config).unwrap();
        let back: SolverConfig = serde_json::from_str(&text).unwrap();
        assert!(back.validate().is_ok());
        assert_eq!(back.initial.len(), 1);
    }

    #[test]
    fn test_mesh_build_nonuniform() {
        let mut config = minimal();
        config.mesh.x_points = Some(vec![0.0, 0.1, 0.4, 1.0]);
        config.mesh.cells = [3, 8, 8];
        let mesh = config.mesh.build().unwrap();
        assert_eq!(mesh.dims().0, 3);
        assert!((mesh.dx(1) - 0.3).abs() < 1e-12);
    }
}
