// crates/mm_io/src/probes.rs

//! 探针与线图输出
//!
//! - 探针：每个物理量一个 ASCII 文件，行格式
//!   `step time value_at_probe_0 value_at_probe_1 …`
//! - 线图：每条线段每帧一个文件，沿线等分取样
//!
//! 取样值由单元中心数据做三线性插值。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use glam::DVec3;
use mm_foundation::{MmError, MmResult};
use mm_grid::GlobalMesh;
use mm_physics::spaceop::StateField;

/// 探针物理量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeQuantity {
    Density,
    VelocityX,
    VelocityY,
    VelocityZ,
    Pressure,
}

impl ProbeQuantity {
    /// 文件名片段
    pub fn tag(self) -> &'static str {
        match self {
            Self::Density => "density",
            Self::VelocityX => "velocity_x",
            Self::VelocityY => "velocity_y",
            Self::VelocityZ => "velocity_z",
            Self::Pressure => "pressure",
        }
    }

    fn component(self) -> usize {
        match self {
            Self::Density => 0,
            Self::VelocityX => 1,
            Self::VelocityY => 2,
            Self::VelocityZ => 3,
            Self::Pressure => 4,
        }
    }
}

/// 单元中心字段的三线性插值
pub fn trilinear_sample(mesh: &GlobalMesh, v: &StateField, p: DVec3, comp: usize) -> f64 {
    let (nx, ny, nz) = mesh.dims();

    // 找到 p 所在的中心区间下端（允许落入幽灵外推区）
    let locate = |coord: &dyn Fn(i32) -> f64, n: usize, x: f64| -> (i32, f64) {
        let mut lo = -1i32;
        while lo < n as i32 - 1 && coord(lo + 1) <= x {
            lo += 1;
        }
        let t = (x - coord(lo)) / (coord(lo + 1) - coord(lo));
        (lo, t.clamp(0.0, 1.0))
    };

    let (i0, tx) = locate(&|i| mesh.x(i), nx, p.x);
    let (j0, ty) = locate(&|j| mesh.y(j), ny, p.y);
    let (k0, tz) = locate(&|k| mesh.z(k), nz, p.z);

    let mut acc = 0.0;
    for (dk, wz) in [(0, 1.0 - tz), (1, tz)] {
        for (dj, wy) in [(0, 1.0 - ty), (1, ty)] {
            for (di, wx) in [(0, 1.0 - tx), (1, tx)] {
                acc += wx * wy * wz * v.at(i0 + di, j0 + dj, k0 + dk)[comp];
            }
        }
    }
    acc
}

/// 探针写出器
///
/// 每个物理量一个文件，逐步追加行。
pub struct ProbeWriter {
    files: Vec<(ProbeQuantity, BufWriter<File>)>,
    locations: Vec<DVec3>,
}

impl ProbeWriter {
    /// 创建：`dir/probe_<quantity>.txt`
    pub fn new(
        dir: impl AsRef<Path>,
        quantities: &[ProbeQuantity],
        locations: Vec<DVec3>,
    ) -> MmResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| MmError::io_with_source(format!("无法创建探针目录 {}", dir.display()), e))?;
        let mut files = Vec::new();
        for &q in quantities {
            let path = dir.join(format!("probe_{}.txt", q.tag()));
            let file = File::create(&path).map_err(|e| {
                MmError::io_with_source(format!("无法打开探针文件 {}", path.display()), e)
            })?;
            files.push((q, BufWriter::new(file)));
        }
        Ok(Self { files, locations })
    }

    /// 追加一行：`step time value…`
    pub fn record(
        &mut self,
        mesh: &GlobalMesh,
        v: &StateField,
        step: usize,
        time: f64,
    ) -> MmResult<()> {
        for (q, w) in &mut self.files {
            write!(w, "{} {}", step, time)?;
            for &loc in &self.locations {
                let val = trilinear_sample(mesh, v, loc, q.component());
                write!(w, " {}", val)?;
            }
            writeln!(w)?;
            w.flush()?;
        }
        Ok(())
    }
}

/// 线图写出器
///
/// 每帧每条线段一个文件：`dir/line<id>_<frame>.txt`，行格式
/// `s x y z value…`（s 为沿线弧长参数）。
pub struct LinePlotWriter {
    dir: PathBuf,
    segments: Vec<(DVec3, DVec3, usize)>,
    quantities: Vec<ProbeQuantity>,
    frame: usize,
}

impl LinePlotWriter {
    /// 创建写出器
    pub fn new(
        dir: impl Into<PathBuf>,
        segments: Vec<(DVec3, DVec3, usize)>,
        quantities: Vec<ProbeQuantity>,
    ) -> MmResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| MmError::io_with_source(format!("无法创建线图目录 {}", dir.display()), e))?;
        Ok(Self {
            dir,
            segments,
            quantities,
            frame: 0,
        })
    }

    /// 写出当前帧全部线段
    pub fn write_frame(&mut self, mesh: &GlobalMesh, v: &StateField) -> MmResult<()> {
        for (seg_id, &(a, b, n)) in self.segments.iter().enumerate() {
            let path = self
                .dir
                .join(format!("line{}_{:04}.txt", seg_id, self.frame));
            let file = File::create(&path).map_err(|e| {
                MmError::io_with_source(format!("无法打开线图文件 {}", path.display()), e)
            })?;
            let mut w = BufWriter::new(file);

            write!(w, "# s x y z")?;
            for q in &self.quantities {
                write!(w, " {}", q.tag())?;
            }
            writeln!(w)?;

            let len = (b - a).length();
            for s in 0..=n {
                let t = s as f64 / n as f64;
                let p = a + t * (b - a);
                write!(w, "{} {} {} {}", t * len, p.x, p.y, p.z)?;
                for q in &self.quantities {
                    let val = trilinear_sample(mesh, v, p, q.component());
                    write!(w, " {}", val)?;
                }
                writeln!(w)?;
            }
            w.flush()?;
        }
        self.frame += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_grid::Field3;

    fn linear_field(mesh: &GlobalMesh) -> StateField {
        let sub = mesh.serial_subdomain();
        let mut v: StateField = Field3::new(&sub, [0.0; 5]);
        {
            let mut w = v.write_scope();
            for k in sub.kk0..sub.kkmax {
                for j in sub.jj0..sub.jjmax {
                    for i in sub.ii0..sub.iimax {
                        // ρ = x + 2y，其余为常数
                        *w.at_mut(i, j, k) = [mesh.x(i) + 2.0 * mesh.y(j), 0.0, 0.0, 0.0, 5.0];
                    }
                }
            }
        }
        v
    }

    #[test]
    fn test_trilinear_exact_on_linear_field() {
        let mesh = GlobalMesh::uniform([0.0, 1.0, 0.0, 1.0, 0.0, 1.0], 8, 8, 2).unwrap();
        let v = linear_field(&mesh);
        let p = DVec3::new(0.4, 0.7, 0.5);
        let val = trilinear_sample(&mesh, &v, p, 0);
        assert!((val - (0.4 + 1.4)).abs() < 1e-12);
        assert!((trilinear_sample(&mesh, &v, p, 4) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_probe_file_rows() {
        let dir = std::env::temp_dir().join("mm_io_probe_test");
        let _ = std::fs::remove_dir_all(&dir);

        let mesh = GlobalMesh::uniform([0.0, 1.0, 0.0, 1.0, 0.0, 1.0], 4, 4, 1).unwrap();
        let v = linear_field(&mesh);
        let mut probes = ProbeWriter::new(
            &dir,
            &[ProbeQuantity::Density, ProbeQuantity::Pressure],
            vec![DVec3::new(0.5, 0.5, 0.5), DVec3::new(0.25, 0.25, 0.5)],
        )
        .unwrap();
        probes.record(&mesh, &v, 0, 0.0).unwrap();
        probes.record(&mesh, &v, 1, 0.1).unwrap();

        let body = std::fs::read_to_string(dir.join("probe_density.txt")).unwrap();
        let lines: Vec<_> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0 0"));
        // 每行：step + time + 两个探针值
        assert_eq!(lines[1].split_whitespace().count(), 4);
    }

    #[test]
    fn test_line_plot_frames() {
        let dir = std::env::temp_dir().join("mm_io_line_test");
        let _ = std::fs::remove_dir_all(&dir);

        let mesh = GlobalMesh::uniform([0.0, 1.0, 0.0, 1.0, 0.0, 1.0], 4, 4, 1).unwrap();
        let v = linear_field(&mesh);
        let mut lines = LinePlotWriter::new(
            &dir,
            vec![(DVec3::new(0.0, 0.5, 0.5), DVec3::new(1.0, 0.5, 0.5), 10)],
            vec![ProbeQuantity::Density],
        )
        .unwrap();
        lines.write_frame(&mesh, &v).unwrap();
        lines.write_frame(&mesh, &v).unwrap();

        assert!(dir.join("line0_0000.txt").exists());
        assert!(dir.join("line0_0001.txt").exists());
        let body = std::fs::read_to_string(dir.join("line0_0000.txt")).unwrap();
        // 表头 + 11 个取样点
        assert_eq!(body.lines().count(), 12);
    }
}
