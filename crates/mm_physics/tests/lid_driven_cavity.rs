// crates/mm_physics/tests/lid_driven_cavity.rs

//! Re = 100 顶盖驱动方腔（SIMPLE 族验证）
//!
//! 33×33 网格。首步放宽为 10 倍外迭代上限以建立流场；流场建立后
//! 每步外迭代应不超过 40 次。稳态垂直中线 u 速度与 Ghia et al.
//! (1982) 参考值比较，容差为盖速的 3%。

use glam::DVec3;
use mm_grid::{BoundaryKind, DomainBcs, Field3, GlobalMesh, SerialComm};
use mm_physics::incompressible::IncompressibleOperator;
use mm_physics::simple::{SimpleConfig, SimpleVariant, TimeIntegratorSimple};
use mm_physics::spaceop::{IdField, StateField};
use mm_physics::state::MaterialId;
use mm_physics::Material;

fn run_cavity(variant: SimpleVariant) -> (Vec<f64>, Vec<f64>, usize) {
    let n = 33usize;
    let mesh = GlobalMesh::uniform([0.0, 1.0, 0.0, 1.0, 0.0, 1.0], n, n, 1).unwrap();
    let sub = mesh.serial_subdomain();

    // Re = ρ U L / μ = 100
    let mut mat = Material::ideal_gas("fluid", 1.4);
    mat.rho0 = 1.0;
    mat.viscosity = 0.01;
    let mats = vec![mat];

    let bcs = DomainBcs {
        x0: BoundaryKind::StickWall,
        xmax: BoundaryKind::StickWall,
        y0: BoundaryKind::StickWall,
        ymax: BoundaryKind::Inlet, // 顶盖：切向速度 (1, 0, 0)
        z0: BoundaryKind::SlipWall,
        zmax: BoundaryKind::SlipWall,
    };
    let ghosts = mesh.outer_ghost_nodes(&sub, &bcs);

    let inco = IncompressibleOperator::new(
        &mesh,
        sub,
        &ghosts,
        &mats,
        DVec3::new(1.0, 0.0, 0.0),
        DVec3::ZERO,
    );
    let config = SimpleConfig {
        variant,
        max_its: 40,
        convergence_tolerance: 1.0e-5,
        e_factor: 5.0,
        alpha_p: 0.8,
        ..SimpleConfig::default()
    };
    let mut integrator = TimeIntegratorSimple::new(inco, config).unwrap();

    let mut v: StateField = Field3::new(&sub, [1.0, 0.0, 0.0, 0.0, 0.0]);
    let id: IdField = Field3::new(&sub, MaterialId(0));
    integrator.inco.apply_boundary_conditions(&mut v);

    // 大步长伪时间推进：首步（10 倍外迭代上限）逼近稳态
    let dt = 1.0e3;
    let comm = SerialComm;
    let (_res, _conv, _its) = integrator.advance_one_time_step(&mut v, &id, dt, 1, &comm);

    // 留两步继续建立，随后的步必须在 max_its 内收敛
    for step in 2..=3 {
        integrator.advance_one_time_step(&mut v, &id, dt, step, &comm);
    }
    let mut established_its = 0usize;
    for step in 4..=6 {
        let (_res, converged, its) = integrator.advance_one_time_step(&mut v, &id, dt, step, &comm);
        established_its = established_its.max(its);
        assert!(converged, "第 {} 步未在 {} 次外迭代内收敛", step, 40);
    }

    // 垂直中线 (x = 0.5) 的 u：u 面 i = 16, 17 的平均（n = 33 时
    // x = 0.5 不落在面上，取两侧面平均）
    let mid_lo = (n / 2) as i32;
    let mid_hi = mid_lo + 1;
    let mut u_mid = Vec::new();
    let mut y_mid = Vec::new();
    for j in 0..n as i32 {
        u_mid.push(0.5 * (v.at(mid_lo, j, 0)[1] + v.at(mid_hi, j, 0)[1]));
        y_mid.push(mesh.y(j));
    }
    (u_mid, y_mid, established_its)
}

#[test]
fn cavity_re100_matches_ghia() {
    let (u_mid, y_mid, established_its) = run_cavity(SimpleVariant::Simple);

    assert!(established_its <= 40);

    // 几何中心：Ghia u(0.5, 0.5) = −0.20581
    let j_center = y_mid
        .iter()
        .position(|&y| (y - 0.5).abs() < 1e-9)
        .expect("33 网格的中心单元应落在 y = 0.5");
    let u_center = u_mid[j_center];
    assert!(
        (u_center - (-0.20581)).abs() < 0.03,
        "u(0.5, 0.5) = {} (Ghia: -0.20581)",
        u_center
    );

    // 中线最小值：Ghia 在 y = 0.4531 处为 −0.21090
    let u_min = u_mid.iter().cloned().fold(f64::INFINITY, f64::min);
    assert!(
        (u_min - (-0.21090)).abs() < 0.03,
        "中线最小 u = {} (Ghia: -0.21090)",
        u_min
    );

    // 盖下回流方向正确：上部为正、中下部为负
    let j_top = y_mid.len() - 1;
    assert!(u_mid[j_top] > 0.3, "盖下 u = {}", u_mid[j_top]);
    assert!(u_mid[y_mid.len() / 4] < 0.0);
}

#[test]
fn cavity_simplec_converges() {
    let (u_mid, _y_mid, established_its) = run_cavity(SimpleVariant::Simplec);
    assert!(established_its <= 40);
    // SIMPLEC 与 SIMPLE 收敛到同一稳态
    let u_min = u_mid.iter().cloned().fold(f64::INFINITY, f64::min);
    assert!((u_min - (-0.21090)).abs() < 0.03, "中线最小 u = {}", u_min);
}
