// crates/mm_foundation/src/tolerance.rs

//! 共享数值容差常量
//!
//! 集中定义跨 crate 使用的浮点比较容差，避免魔法数散落各处。

/// 通用浮点相等容差
pub const EPS: f64 = 1e-12;

/// 几何计算容差（相对于单元尺寸）
pub const GEOM_EPS: f64 = 1e-10;

/// 判断两个浮点数是否在容差内相等
#[inline]
pub fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

/// 判断浮点数是否在容差内为零
#[inline]
pub fn approx_zero(x: f64, tol: f64) -> bool {
    x.abs() <= tol
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approx_eq() {
        assert!(approx_eq(1.0, 1.0 + 1e-13, EPS));
        assert!(!approx_eq(1.0, 1.1, EPS));
    }

    #[test]
    fn test_approx_zero() {
        assert!(approx_zero(1e-13, EPS));
        assert!(!approx_zero(1e-3, EPS));
    }
}
