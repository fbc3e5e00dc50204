// apps/mm_cli/src/commands/validate.rs

//! 验证配置命令

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use mm_config::SolverConfig;

/// 验证配置参数
#[derive(Args)]
pub struct ValidateArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: PathBuf,
}

/// 执行验证命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    let config = SolverConfig::load(&args.config)
        .with_context(|| format!("读取配置 {} 失败", args.config.display()))?;
    config.validate().context("配置校验失败")?;

    // 网格与表面文件也提前检查
    let mesh = config.mesh.build().context("网格构建失败")?;
    let (nx, ny, nz) = mesh.dims();
    for surf in &config.embedded_surfaces {
        mm_geo::TriangulatedSurface::from_mesh_file(&surf.path, surf.one_based)
            .with_context(|| format!("表面文件 {} 非法", surf.path.display()))?;
    }

    info!(
        "配置有效: {} 种介质, 网格 {}x{}x{}, {} 个水平集, {} 个嵌入表面",
        config.materials.len(),
        nx,
        ny,
        nz,
        config.level_sets.len(),
        config.embedded_surfaces.len()
    );
    Ok(())
}
