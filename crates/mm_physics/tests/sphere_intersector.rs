// crates/mm_physics/tests/sphere_intersector.rs

//! 闭合球面的相交器验证
//!
//! 单位球三角化，64³ 网格覆盖 [−2,2]³。期望：
//! - 遮蔽节点与到球面距离不超过半厚度的节点集合吻合（容差为
//!   面片化误差）
//! - 泛洪填色在 0 色之外恰有两个区域：连通入口的外部与一个封闭腔

use glam::DVec3;
use mm_geo::surface::make_sphere;
use mm_grid::{DomainBcs, GlobalMesh, SerialComm};
use mm_physics::intersector::Intersector;

#[test]
fn sphere_in_cube_64() {
    let n = 64;
    let mesh = GlobalMesh::uniform([-2.0, 2.0, -2.0, 2.0, -2.0, 2.0], n, n, n).unwrap();
    let sub = mesh.serial_subdomain();
    let ghosts = mesh.outer_ghost_nodes(&sub, &DomainBcs::default());

    let sphere = make_sphere(DVec3::ZERO, 1.0, 32, 64);
    assert!(sphere.closed);

    let thickness = 0.5 * mesh.min_cell_size();
    let half = 0.5 * thickness;
    let mut intersector = Intersector::new(&mesh, sub, &ghosts, &sphere, thickness).unwrap();
    let stats = intersector.run(&SerialComm).unwrap();

    // 面片化的最大弦高（经向 32 段）
    let facet_err = {
        let half_angle = std::f64::consts::PI / 32.0 * 0.5;
        1.0 - half_angle.cos() + 1e-3
    };

    // 遮蔽集合与解析厚度带吻合
    let mut band_count = 0usize;
    for (i, j, k) in intersector.color.real_indices() {
        let r = mesh.coords(i, j, k).length();
        let in_band = (r - 1.0).abs() <= half;
        if in_band {
            band_count += 1;
        }
        if in_band && (r - 1.0).abs() <= half - facet_err {
            assert!(
                intersector.occluded.contains(&(i, j, k)),
                "带内节点 ({},{},{}) 未被遮蔽: r = {}",
                i,
                j,
                k,
                r
            );
        }
    }
    for &(i, j, k) in &intersector.occluded {
        let r = mesh.coords(i, j, k).length();
        assert!(
            (r - 1.0).abs() <= half + facet_err,
            "遮蔽节点 ({},{},{}) 在厚度带外: r = {}",
            i,
            j,
            k,
            r
        );
    }
    // 计数吻合到厚度带公差
    let occ = intersector.occluded.len();
    assert!(
        (occ as f64 - band_count as f64).abs() <= 0.35 * band_count.max(1) as f64,
        "遮蔽计数 {} 与解析带计数 {} 偏差过大",
        occ,
        band_count
    );

    // 颜色结构：0 + 外部 (1) + 一个封闭腔
    assert!(stats.has_inlet);
    assert_eq!(stats.n_closures, 1, "应恰有一个封闭腔");

    // 球心在封闭腔内
    let c = n as i32 / 2;
    assert!(intersector.color.at(c, c, c) < 0);
    // 域角在外部
    assert_eq!(intersector.color.at(0, 0, 0), 1);

    // 颜色划分：每个实域节点要么遮蔽要么有颜色
    for (i, j, k) in intersector.color.real_indices() {
        let color = intersector.color.at(i, j, k);
        if color == 0 {
            assert!(intersector.occluded.contains(&(i, j, k)));
        } else {
            assert!(color == 1 || color < 0, "意外颜色 {}", color);
        }
    }

    // 封闭腔节点全部位于球内
    for (i, j, k) in intersector.color.real_indices() {
        if intersector.color.at(i, j, k) < 0 {
            let r = mesh.coords(i, j, k).length();
            assert!(r < 1.0 + half + facet_err, "封闭腔节点在球外: r = {}", r);
        }
    }
}
