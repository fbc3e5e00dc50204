// crates/mm_geo/src/triangle.rs

//! 三角形面片判定
//!
//! 嵌入边界追踪使用的三种核心测试：
//!
//! 1. [`project_point_to_triangle`]: 点到三角形的最近投影（无符号距离 + 重心坐标）
//! 2. [`is_point_in_thickened_triangle`]: 点是否位于三角形的"加厚板"内
//! 3. [`axis_segment_intersects_triangle`]: 轴向线段与三角形的参数化相交测试
//!
//! 重心坐标约定：`xi = (xi_a, xi_b, xi_c)`，满足 `xi_a + xi_b + xi_c = 1`。

use glam::DVec3;

/// 重心坐标判定容差
///
/// 允许投影点略微越过三角形边界，避免相邻面片之间漏判。
const BARY_EPS: f64 = 1e-10;

/// 计算点在三角形平面上的投影的重心坐标
///
/// 返回 `(signed_dist, xi)`：`signed_dist` 为点到平面的有符号距离
/// （沿 `normal` 方向为正），`xi` 为投影点的重心坐标（可能在三角形外）。
#[inline]
pub fn barycentric_projection(
    x0: DVec3,
    xa: DVec3,
    xb: DVec3,
    xc: DVec3,
    area: f64,
    normal: DVec3,
) -> (f64, [f64; 3]) {
    let signed_dist = (x0 - xa).dot(normal);
    let p = x0 - signed_dist * normal;

    // 子三角形面积比（有符号，以 normal 为参考方向）
    let inv2a = 1.0 / (2.0 * area);
    let xi_a = (xc - xb).cross(p - xb).dot(normal) * inv2a;
    let xi_b = (xa - xc).cross(p - xc).dot(normal) * inv2a;
    let xi_c = 1.0 - xi_a - xi_b;

    (signed_dist, [xi_a, xi_b, xi_c])
}

/// 点是否位于三角形的加厚板内
///
/// 判定条件：到平面的距离不超过 `half_thickness`，且平面投影落在三角形内
/// （允许 [`BARY_EPS`] 容差）。满足时返回投影点的重心坐标。
pub fn is_point_in_thickened_triangle(
    x0: DVec3,
    xa: DVec3,
    xb: DVec3,
    xc: DVec3,
    half_thickness: f64,
    area: f64,
    normal: DVec3,
) -> Option<[f64; 3]> {
    let (signed_dist, xi) = barycentric_projection(x0, xa, xb, xc, area, normal);
    if signed_dist.abs() > half_thickness {
        return None;
    }
    if xi.iter().all(|&w| w >= -BARY_EPS && w <= 1.0 + BARY_EPS) {
        Some(xi)
    } else {
        None
    }
}

/// 轴向线段与三角形的相交测试（Möller 参数化形式）
///
/// 线段起点 `x0`，方向为坐标轴 `axis`（0~x, 1~y, 2~z），长度 `len`。
/// 相交时返回 `(dist, xi)`：`dist` 为交点到 `x0` 的距离（0 ≤ dist ≤ len），
/// `xi` 为交点在三角形内的重心坐标。
pub fn axis_segment_intersects_triangle(
    x0: DVec3,
    axis: usize,
    len: f64,
    xa: DVec3,
    xb: DVec3,
    xc: DVec3,
) -> Option<(f64, [f64; 3])> {
    let dir = match axis {
        0 => DVec3::X,
        1 => DVec3::Y,
        _ => DVec3::Z,
    };

    let e1 = xb - xa;
    let e2 = xc - xa;
    let pvec = dir.cross(e2);
    let det = e1.dot(pvec);

    // 线段与平面平行
    if det.abs() < f64::EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;

    let tvec = x0 - xa;
    let u = tvec.dot(pvec) * inv_det;
    if !(-BARY_EPS..=1.0 + BARY_EPS).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(e1);
    let v = dir.dot(qvec) * inv_det;
    if v < -BARY_EPS || u + v > 1.0 + BARY_EPS {
        return None;
    }

    let t = e2.dot(qvec) * inv_det;
    if t < 0.0 || t > len {
        return None;
    }

    Some((t, [1.0 - u - v, u, v]))
}

/// 点到三角形的最近投影
///
/// 投影点被约束在三角形内部（含边和顶点），返回 `(dist, xi)`：
/// `dist` 为无符号最近距离，`xi` 为最近点的重心坐标。
pub fn project_point_to_triangle(
    x0: DVec3,
    xa: DVec3,
    xb: DVec3,
    xc: DVec3,
) -> (f64, [f64; 3]) {
    // Ericson《Real-Time Collision Detection》的区域分解法
    let ab = xb - xa;
    let ac = xc - xa;
    let ap = x0 - xa;

    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return ((x0 - xa).length(), [1.0, 0.0, 0.0]);
    }

    let bp = x0 - xb;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return ((x0 - xb).length(), [0.0, 1.0, 0.0]);
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        let q = xa + v * ab;
        return ((x0 - q).length(), [1.0 - v, v, 0.0]);
    }

    let cp = x0 - xc;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return ((x0 - xc).length(), [0.0, 0.0, 1.0]);
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        let q = xa + w * ac;
        return ((x0 - q).length(), [1.0 - w, 0.0, w]);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        let q = xb + w * (xc - xb);
        return ((x0 - q).length(), [0.0, 1.0 - w, w]);
    }

    // 内部区域
    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    let q = xa + ab * v + ac * w;
    ((x0 - q).length(), [1.0 - v - w, v, w])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> (DVec3, DVec3, DVec3, f64, DVec3) {
        let xa = DVec3::new(0.0, 0.0, 0.0);
        let xb = DVec3::new(1.0, 0.0, 0.0);
        let xc = DVec3::new(0.0, 1.0, 0.0);
        (xa, xb, xc, 0.5, DVec3::Z)
    }

    #[test]
    fn test_thickened_triangle_inside() {
        let (xa, xb, xc, area, n) = unit_triangle();
        let p = DVec3::new(0.25, 0.25, 0.001);
        let xi = is_point_in_thickened_triangle(p, xa, xb, xc, 0.01, area, n);
        assert!(xi.is_some());
        let xi = xi.unwrap();
        assert!((xi[0] + xi[1] + xi[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_thickened_triangle_too_far() {
        let (xa, xb, xc, area, n) = unit_triangle();
        let p = DVec3::new(0.25, 0.25, 0.1);
        assert!(is_point_in_thickened_triangle(p, xa, xb, xc, 0.01, area, n).is_none());
    }

    #[test]
    fn test_thickened_triangle_outside_projection() {
        let (xa, xb, xc, area, n) = unit_triangle();
        let p = DVec3::new(2.0, 2.0, 0.0);
        assert!(is_point_in_thickened_triangle(p, xa, xb, xc, 0.01, area, n).is_none());
    }

    #[test]
    fn test_segment_intersection_hit() {
        let (xa, xb, xc, _, _) = unit_triangle();
        let x0 = DVec3::new(0.25, 0.25, -1.0);
        let hit = axis_segment_intersects_triangle(x0, 2, 2.0, xa, xb, xc);
        assert!(hit.is_some());
        let (t, xi) = hit.unwrap();
        assert!((t - 1.0).abs() < 1e-12);
        assert!((xi[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_segment_intersection_too_short() {
        let (xa, xb, xc, _, _) = unit_triangle();
        let x0 = DVec3::new(0.25, 0.25, -1.0);
        assert!(axis_segment_intersects_triangle(x0, 2, 0.5, xa, xb, xc).is_none());
    }

    #[test]
    fn test_segment_parallel() {
        let (xa, xb, xc, _, _) = unit_triangle();
        let x0 = DVec3::new(-1.0, 0.25, 0.5);
        assert!(axis_segment_intersects_triangle(x0, 0, 2.0, xa, xb, xc).is_none());
    }

    #[test]
    fn test_project_interior() {
        let (xa, xb, xc, _, _) = unit_triangle();
        let p = DVec3::new(0.25, 0.25, 0.5);
        let (d, xi) = project_point_to_triangle(p, xa, xb, xc);
        assert!((d - 0.5).abs() < 1e-12);
        assert!((xi[0] - 0.5).abs() < 1e-12);
        assert!((xi[1] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_project_vertex_region() {
        let (xa, xb, xc, _, _) = unit_triangle();
        let p = DVec3::new(-1.0, -1.0, 0.0);
        let (d, xi) = project_point_to_triangle(p, xa, xb, xc);
        assert!((d - 2.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(xi, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_project_edge_region() {
        let (xa, xb, xc, _, _) = unit_triangle();
        let p = DVec3::new(0.5, -1.0, 0.0);
        let (d, xi) = project_point_to_triangle(p, xa, xb, xc);
        assert!((d - 1.0).abs() < 1e-12);
        assert!((xi[0] - 0.5).abs() < 1e-12);
        assert!((xi[1] - 0.5).abs() < 1e-12);
        assert_eq!(xi[2], 0.0);
    }
}
