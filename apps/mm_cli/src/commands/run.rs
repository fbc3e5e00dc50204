// apps/mm_cli/src/commands/run.rs

//! 运行模拟命令
//!
//! 读取配置 → 校验 → 建网格与算子 → 初始化状态与水平集 →
//! （如有）嵌入表面相交与非活动标记 → 时间推进循环与输出。

use anyhow::{Context, Result};
use clap::Args;
use glam::DVec3;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use mm_config::{SolverConfig, SolverMode};
use mm_geo::TriangulatedSurface;
use mm_grid::SerialComm;
use mm_io::probes::ProbeQuantity;
use mm_io::vtr::SnapshotField;
use mm_io::{LinePlotWriter, ProbeWriter, SnapshotWriter};
use mm_physics::engine::{Solver, SolverOptions};
use mm_physics::incompressible::IncompressibleOperator;
use mm_physics::intersector::Intersector;
use mm_physics::levelset::LevelSetConfig;
use mm_physics::reconstruction::Reconstructor;
use mm_physics::simple::TimeIntegratorSimple;
use mm_physics::spaceop::{BcStates, ScalarField, SpaceOperator};
use mm_physics::state::MaterialId;

/// 运行模拟参数
#[derive(Args)]
pub struct RunArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: PathBuf,

    /// 输出目录（覆盖配置中的设置）
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// 执行运行命令
pub fn execute(args: RunArgs) -> Result<()> {
    info!("=== MultiMat Flow 模拟启动 ===");
    let start = Instant::now();

    let mut config = SolverConfig::load(&args.config)
        .with_context(|| format!("读取配置 {} 失败", args.config.display()))?;
    config.validate().context("配置校验失败")?;
    if let Some(dir) = args.output {
        config.output.directory = dir;
    }

    let mesh = config.mesh.build().context("网格构建失败")?;
    let (nx, ny, nz) = mesh.dims();
    info!("网格: {} x {} x {} 单元", nx, ny, nz);

    let sub = mesh.serial_subdomain();
    let ghosts = mesh.outer_ghost_nodes(&sub, &config.boundaries);
    let materials = config.materials.clone();
    let comm = SerialComm;

    let bc_states = BcStates {
        inlet: config.inlet.to_primitive(),
        outlet: config.outlet.to_primitive(),
    };

    let spo = SpaceOperator::new(
        &mesh,
        sub,
        mesh.outer_ghost_nodes(&sub, &config.boundaries),
        &materials,
        bc_states,
        Reconstructor::default(),
    );

    let level_set_configs: Vec<LevelSetConfig> = config
        .level_sets
        .iter()
        .map(|entry| LevelSetConfig {
            material_id: MaterialId(entry.material_id),
            reinit_cfl: entry.reinit_cfl,
            reinit_tol: entry.reinit_tol,
            reinit_max_iter: entry.reinit_max_iter,
            reinit_frequency: entry.reinit_frequency,
        })
        .collect();

    let options = SolverOptions {
        cfl: config.solver.cfl,
        fixed_timestep: config.solver.timestep,
        max_time: config.solver.max_time,
        max_steps: config.solver.max_steps,
        riemann: config.solver.riemann.clone(),
        phase_change: config.solver.phase_change,
    };

    let mut solver = Solver::new(&mesh, &ghosts, &materials, spo, level_set_configs, options);

    // 初始状态：默认值 + 区域覆盖
    initialize_state(&mut solver, &config, &mesh);

    // 嵌入表面：相交、填色、非活动标记
    let mut surfaces = Vec::new();
    for surf_config in &config.embedded_surfaces {
        let surface = TriangulatedSurface::from_mesh_file(&surf_config.path, surf_config.one_based)
            .with_context(|| format!("读取表面 {} 失败", surf_config.path.display()))?;
        surfaces.push((surface, surf_config.thickness, surf_config.solid_interior));
    }
    for (surface, thickness, solid_interior) in &surfaces {
        let mut intersector = Intersector::new(&mesh, sub, &ghosts, surface, *thickness)
            .context("相交器构建失败")?;
        let stats = intersector.run(&comm).context("相交器运行失败")?;
        info!(
            "嵌入表面: 遮蔽 {}, 封闭腔 {}, 入口连通 {}",
            stats.has_occluded, stats.n_closures, stats.has_inlet
        );
        solver.tag_inactive_cells(&intersector, *solid_interior);
    }

    // 输出设施
    let fields = parse_fields(&config.output.fields);
    let mut snapshots = SnapshotWriter::new(&config.output.directory, "solution", fields)
        .context("快照写出器创建失败")?;
    mm_io::vtr::write_mesh_listing(&mesh, config.output.directory.join("mesh.txt"))
        .context("网格列表写出失败")?;

    let probe_quantities = [
        ProbeQuantity::Density,
        ProbeQuantity::VelocityX,
        ProbeQuantity::VelocityY,
        ProbeQuantity::VelocityZ,
        ProbeQuantity::Pressure,
    ];
    let mut probes = if config.output.probes.is_empty() {
        None
    } else {
        Some(
            ProbeWriter::new(
                config.output.directory.join("probes"),
                &probe_quantities,
                config.output.probes.iter().map(|p| DVec3::from_array(*p)).collect(),
            )
            .context("探针写出器创建失败")?,
        )
    };
    let mut lines = if config.output.lines.is_empty() {
        None
    } else {
        Some(
            LinePlotWriter::new(
                config.output.directory.join("lines"),
                config
                    .output
                    .lines
                    .iter()
                    .map(|(a, b, n)| (DVec3::from_array(*a), DVec3::from_array(*b), *n))
                    .collect(),
                vec![ProbeQuantity::Density, ProbeQuantity::Pressure],
            )
            .context("线图写出器创建失败")?,
        )
    };

    // 不可压缩分支
    let mut simple_integrator = if config.solver.mode == SolverMode::Incompressible {
        let inco = IncompressibleOperator::new(
            &mesh,
            sub,
            &ghosts,
            &materials,
            config.inlet.to_primitive().velocity,
            config.outlet.to_primitive().velocity,
        );
        let mut integrator = TimeIntegratorSimple::new(inco, config.solver.simple.clone())
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        integrator
            .inco
            .finalize_initial_condition(&mut solver.v, &solver.id);
        integrator.inco.apply_boundary_conditions(&mut solver.v);
        Some(integrator)
    } else {
        None
    };

    // 初始快照
    snapshots
        .write_snapshot(
            &mesh,
            &materials,
            &solver.v,
            &solver.id,
            &solver.phis,
            solver.time,
        )
        .context("初始快照写出失败")?;
    let mut last_snapshot_time = 0.0;
    let mut last_snapshot_step = 0;

    // 时间推进
    while !solver.finished() {
        let report = match simple_integrator.as_mut() {
            Some(integrator) => solver
                .advance_incompressible(integrator, &comm)
                .map_err(|e| anyhow::anyhow!("{}", e))?,
            None => solver
                .advance_one_step(&comm)
                .map_err(|e| anyhow::anyhow!("{}", e))?,
        };

        info!(
            "步 {}: t = {:.6e}, dt = {:.3e}, CFL = {:.3}",
            report.step, report.time, report.dt, report.cfl
        );
        if report.clipped > 0 {
            warn!("本步裁剪了 {} 个实域单元", report.clipped);
        }

        if let Some(probes) = probes.as_mut() {
            probes
                .record(&mesh, &solver.v, report.step, report.time)
                .context("探针记录失败")?;
        }

        let due_by_steps = config.output.frequency_steps > 0
            && report.step - last_snapshot_step >= config.output.frequency_steps;
        let due_by_time = config.output.frequency_time > 0.0
            && report.time - last_snapshot_time >= config.output.frequency_time;
        if due_by_steps || due_by_time || solver.finished() {
            snapshots
                .write_snapshot(
                    &mesh,
                    &materials,
                    &solver.v,
                    &solver.id,
                    &solver.phis,
                    report.time,
                )
                .context("快照写出失败")?;
            if let Some(lines) = lines.as_mut() {
                lines.write_frame(&mesh, &solver.v).context("线图写出失败")?;
            }
            last_snapshot_time = report.time;
            last_snapshot_step = report.step;
        }
    }

    info!(
        "=== 模拟完成: {} 步, t = {:.6e}, 用时 {:.2?} ===",
        solver.step_count,
        solver.time,
        start.elapsed()
    );
    Ok(())
}

/// 初始状态与水平集
fn initialize_state(solver: &mut Solver<'_>, config: &SolverConfig, mesh: &mm_grid::GlobalMesh) {
    let sub = solver.spo.sub;

    {
        let default_state = config.default_state.to_primitive().to_array();
        let mut wv = solver.v.write_scope();
        let mut wid = solver.id.write_scope();
        for k in sub.kk0..sub.kkmax {
            for j in sub.jj0..sub.jjmax {
                for i in sub.ii0..sub.iimax {
                    let p = mesh.coords(i, j, k);
                    let mut cell = default_state;
                    let mut mat = MaterialId(0);
                    for region in &config.initial {
                        if region.shape.contains(p) {
                            cell = region.state.to_primitive().to_array();
                            mat = MaterialId(region.material_id);
                        }
                    }
                    *wv.at_mut(i, j, k) = cell;
                    *wid.at_mut(i, j, k) = mat;
                }
            }
        }
    }

    // 水平集：对应介质的区域带符号距离（多区域取最小）
    let matids: Vec<MaterialId> = solver.level_sets.iter().map(|l| l.material_id()).collect();
    for (ls_idx, matid) in matids.into_iter().enumerate() {
        let phi: &mut ScalarField = &mut solver.phis[ls_idx];
        let far = 0.5 * mesh.domain_diagonal();
        let mut w = phi.write_scope();
        for k in sub.kk0..sub.kkmax {
            for j in sub.jj0..sub.jjmax {
                for i in sub.ii0..sub.iimax {
                    let p = mesh.coords(i, j, k);
                    let mut val = far;
                    for region in &config.initial {
                        if MaterialId(region.material_id) == matid {
                            val = val.min(region.shape.signed_distance(p));
                        }
                    }
                    *w.at_mut(i, j, k) = val;
                }
            }
        }
    }
}

/// 字段名解析；未知名告警并跳过
fn parse_fields(names: &[String]) -> Vec<SnapshotField> {
    let mut fields = Vec::new();
    for name in names {
        let field = match name.as_str() {
            "density" => Some(SnapshotField::Density),
            "velocity" => Some(SnapshotField::Velocity),
            "pressure" => Some(SnapshotField::Pressure),
            "material_id" => Some(SnapshotField::MaterialId),
            "internal_energy" => Some(SnapshotField::InternalEnergy),
            "temperature" => Some(SnapshotField::Temperature),
            other => other
                .strip_prefix("levelset_")
                .and_then(|m| m.parse::<usize>().ok())
                .map(SnapshotField::LevelSet),
        };
        match field {
            Some(f) => fields.push(f),
            None => warn!("未知输出字段 '{}', 已跳过", name),
        }
    }
    fields
}
