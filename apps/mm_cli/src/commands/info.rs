// apps/mm_cli/src/commands/info.rs

//! 显示配置信息命令

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use mm_config::{SolverConfig, SolverMode};

/// 信息参数
#[derive(Args)]
pub struct InfoArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: PathBuf,
}

/// 执行信息命令
pub fn execute(args: InfoArgs) -> Result<()> {
    let config = SolverConfig::load(&args.config)
        .with_context(|| format!("读取配置 {} 失败", args.config.display()))?;

    println!("配置文件: {}", args.config.display());
    println!(
        "求解分支: {}",
        match config.solver.mode {
            SolverMode::Compressible => "可压缩 (Godunov / 精确黎曼)",
            SolverMode::Incompressible => "不可压缩 (SIMPLE 族)",
        }
    );
    println!("介质:");
    for (idx, mat) in config.materials.iter().enumerate() {
        println!("  [{}] {} — {:?}", idx, mat.label, mat.eos);
    }
    let [x0, xmax, y0, ymax, z0, zmax] = config.mesh.extents;
    println!(
        "网格: {:?} 单元, 范围 [{}, {}] x [{}, {}] x [{}, {}]",
        config.mesh.cells, x0, xmax, y0, ymax, z0, zmax
    );
    println!(
        "求解: CFL = {}, 终止时间 = {}, 最大步数 = {}",
        config.solver.cfl, config.solver.max_time, config.solver.max_steps
    );
    println!("水平集: {} 个", config.level_sets.len());
    println!("嵌入表面: {} 个", config.embedded_surfaces.len());
    println!("输出目录: {}", config.output.directory.display());
    Ok(())
}
