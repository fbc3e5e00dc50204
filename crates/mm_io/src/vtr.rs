// crates/mm_io/src/vtr.rs

//! 直线网格 VTK 快照
//!
//! 网格轴对齐、各向非均匀，对应 VTK 的 RectilinearGrid（`.vtr`）。
//! 快照按时间或步数节奏落盘；顶层 `.pvd` 清单逐条记录快照文件名与
//! 模拟时间，ParaView 可直接打开时间序列。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use mm_foundation::{MmError, MmResult};
use mm_grid::GlobalMesh;
use mm_physics::spaceop::{IdField, ScalarField, StateField};
use mm_physics::state::MaterialId;
use mm_physics::Material;

/// 可选输出字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotField {
    Density,
    Velocity,
    Pressure,
    MaterialId,
    InternalEnergy,
    Temperature,
    LevelSet(usize),
}

/// PVD 清单条目
#[derive(Debug, Clone)]
struct ManifestEntry {
    file: String,
    time: f64,
}

/// 快照写出器
pub struct SnapshotWriter {
    dir: PathBuf,
    prefix: String,
    fields: Vec<SnapshotField>,
    entries: Vec<ManifestEntry>,
    frame: usize,
}

impl SnapshotWriter {
    /// 创建写出器；输出目录不存在时创建
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        fields: Vec<SnapshotField>,
    ) -> MmResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| MmError::io_with_source(format!("无法创建输出目录 {}", dir.display()), e))?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
            fields,
            entries: Vec::new(),
            frame: 0,
        })
    }

    /// 写出一帧快照并登记到清单
    #[allow(clippy::too_many_arguments)]
    pub fn write_snapshot(
        &mut self,
        mesh: &GlobalMesh,
        materials: &[Material],
        v: &StateField,
        id: &IdField,
        phis: &[ScalarField],
        time: f64,
    ) -> MmResult<PathBuf> {
        let filename = format!("{}_{:04}.vtr", self.prefix, self.frame);
        let path = self.dir.join(&filename);
        let file = File::create(&path)
            .map_err(|e| MmError::io_with_source(format!("无法打开快照文件 {}", path.display()), e))?;
        let mut w = BufWriter::new(file);

        let (nx, ny, nz) = mesh.dims();

        writeln!(w, r#"<?xml version="1.0"?>"#)?;
        writeln!(
            w,
            r#"<VTKFile type="RectilinearGrid" version="1.0" byte_order="LittleEndian">"#
        )?;
        writeln!(
            w,
            r#"  <RectilinearGrid WholeExtent="0 {} 0 {} 0 {}">"#,
            nx, ny, nz
        )?;
        writeln!(w, r#"    <Piece Extent="0 {} 0 {} 0 {}">"#, nx, ny, nz)?;

        // 坐标：单元边界
        writeln!(w, "      <Coordinates>")?;
        let write_axis = |w: &mut BufWriter<File>, name: &str, n: usize, coord: &dyn Fn(i32) -> f64, width: &dyn Fn(i32) -> f64| -> std::io::Result<()> {
            writeln!(
                w,
                r#"        <DataArray type="Float64" Name="{}" format="ascii">"#,
                name
            )?;
            write!(w, "          ")?;
            for i in 0..=n {
                let edge = if i < n {
                    coord(i as i32) - 0.5 * width(i as i32)
                } else {
                    coord(n as i32 - 1) + 0.5 * width(n as i32 - 1)
                };
                write!(w, "{} ", edge)?;
            }
            writeln!(w)?;
            writeln!(w, "        </DataArray>")?;
            Ok(())
        };
        write_axis(&mut w, "x", nx, &|i| mesh.x(i), &|i| mesh.dx(i))?;
        write_axis(&mut w, "y", ny, &|j| mesh.y(j), &|j| mesh.dy(j))?;
        write_axis(&mut w, "z", nz, &|k| mesh.z(k), &|k| mesh.dz(k))?;
        writeln!(w, "      </Coordinates>")?;

        writeln!(w, "      <CellData>")?;
        for field in &self.fields {
            match field {
                SnapshotField::Density => {
                    self.write_cell_scalar(&mut w, mesh, "density", |i, j, k| v.at(i, j, k)[0])?
                }
                SnapshotField::Pressure => {
                    self.write_cell_scalar(&mut w, mesh, "pressure", |i, j, k| v.at(i, j, k)[4])?
                }
                SnapshotField::MaterialId => self.write_cell_scalar(
                    &mut w,
                    mesh,
                    "material_id",
                    |i, j, k| {
                        let m = id.at(i, j, k);
                        if m.is_inactive() {
                            -1.0
                        } else {
                            m.0 as f64
                        }
                    },
                )?,
                SnapshotField::InternalEnergy => self.write_cell_scalar(
                    &mut w,
                    mesh,
                    "internal_energy",
                    |i, j, k| Self::cell_energy(materials, v, id, i, j, k),
                )?,
                SnapshotField::Temperature => self.write_cell_scalar(
                    &mut w,
                    mesh,
                    "temperature",
                    |i, j, k| {
                        let m = id.at(i, j, k);
                        if m.is_inactive() {
                            return 0.0;
                        }
                        let e = Self::cell_energy(materials, v, id, i, j, k);
                        materials[m.index()].temperature(v.at(i, j, k)[0], e)
                    },
                )?,
                SnapshotField::LevelSet(m) => {
                    if let Some(phi) = phis.get(*m) {
                        let name = format!("levelset_{}", m);
                        self.write_cell_scalar(&mut w, mesh, &name, |i, j, k| phi.at(i, j, k))?;
                    }
                }
                SnapshotField::Velocity => {
                    writeln!(
                        w,
                        r#"        <DataArray type="Float64" Name="velocity" NumberOfComponents="3" format="ascii">"#
                    )?;
                    for k in 0..nz as i32 {
                        for j in 0..ny as i32 {
                            write!(w, "          ")?;
                            for i in 0..nx as i32 {
                                let cell = v.at(i, j, k);
                                write!(w, "{} {} {} ", cell[1], cell[2], cell[3])?;
                            }
                            writeln!(w)?;
                        }
                    }
                    writeln!(w, "        </DataArray>")?;
                }
            }
        }
        writeln!(w, "      </CellData>")?;

        writeln!(w, "    </Piece>")?;
        writeln!(w, "  </RectilinearGrid>")?;
        writeln!(w, "</VTKFile>")?;
        w.flush()?;

        self.entries.push(ManifestEntry {
            file: filename,
            time,
        });
        self.frame += 1;
        self.write_manifest()?;
        Ok(path)
    }

    fn cell_energy(
        materials: &[Material],
        v: &StateField,
        id: &IdField,
        i: i32,
        j: i32,
        k: i32,
    ) -> f64 {
        let m = id.at(i, j, k);
        if m == MaterialId::INACTIVE {
            return 0.0;
        }
        let cell = v.at(i, j, k);
        materials[m.index()].internal_energy(cell[0], cell[4])
    }

    fn write_cell_scalar(
        &self,
        w: &mut BufWriter<File>,
        mesh: &GlobalMesh,
        name: &str,
        value: impl Fn(i32, i32, i32) -> f64,
    ) -> std::io::Result<()> {
        let (nx, ny, nz) = mesh.dims();
        writeln!(
            w,
            r#"        <DataArray type="Float64" Name="{}" format="ascii">"#,
            name
        )?;
        for k in 0..nz as i32 {
            for j in 0..ny as i32 {
                write!(w, "          ")?;
                for i in 0..nx as i32 {
                    write!(w, "{} ", value(i, j, k))?;
                }
                writeln!(w)?;
            }
        }
        writeln!(w, "        </DataArray>")?;
        Ok(())
    }

    /// 重写 PVD 清单
    fn write_manifest(&self) -> MmResult<()> {
        let path = self.manifest_path();
        let file = File::create(&path)
            .map_err(|e| MmError::io_with_source(format!("无法写清单 {}", path.display()), e))?;
        let mut w = BufWriter::new(file);
        writeln!(w, r#"<?xml version="1.0"?>"#)?;
        writeln!(
            w,
            r#"<VTKFile type="Collection" version="1.0" byte_order="LittleEndian">"#
        )?;
        writeln!(w, "  <Collection>")?;
        for entry in &self.entries {
            writeln!(
                w,
                r#"    <DataSet timestep="{}" file="{}"/>"#,
                entry.time, entry.file
            )?;
        }
        writeln!(w, "  </Collection>")?;
        writeln!(w, "</VTKFile>")?;
        w.flush()?;
        Ok(())
    }

    /// 清单文件路径
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(format!("{}.pvd", self.prefix))
    }
}

/// 网格列表：逐轴节点坐标
pub fn write_mesh_listing(mesh: &GlobalMesh, path: impl AsRef<Path>) -> MmResult<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .map_err(|e| MmError::io_with_source(format!("无法写网格列表 {}", path.display()), e))?;
    let mut w = BufWriter::new(file);
    let (nx, ny, nz) = mesh.dims();
    writeln!(w, "# x 方向 ({} 单元)", nx)?;
    for i in 0..nx as i32 {
        writeln!(w, "{}", mesh.x(i))?;
    }
    writeln!(w, "# y 方向 ({} 单元)", ny)?;
    for j in 0..ny as i32 {
        writeln!(w, "{}", mesh.y(j))?;
    }
    writeln!(w, "# z 方向 ({} 单元)", nz)?;
    for k in 0..nz as i32 {
        writeln!(w, "{}", mesh.z(k))?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_grid::Field3;
    use mm_physics::PrimitiveState;

    #[test]
    fn test_snapshot_and_manifest() {
        let dir = std::env::temp_dir().join("mm_io_vtr_test");
        let _ = std::fs::remove_dir_all(&dir);

        let mesh = GlobalMesh::uniform([0.0, 1.0, 0.0, 1.0, 0.0, 1.0], 4, 2, 1).unwrap();
        let sub = mesh.serial_subdomain();
        let mats = vec![Material::ideal_gas("air", 1.4)];
        let v: StateField = Field3::new(
            &sub,
            PrimitiveState::new(1.0, glam::DVec3::X, 1.0).to_array(),
        );
        let id: IdField = Field3::new(&sub, MaterialId(0));

        let mut writer = SnapshotWriter::new(
            &dir,
            "solution",
            vec![
                SnapshotField::Density,
                SnapshotField::Velocity,
                SnapshotField::Pressure,
                SnapshotField::MaterialId,
            ],
        )
        .unwrap();

        let p0 = writer.write_snapshot(&mesh, &mats, &v, &id, &[], 0.0).unwrap();
        let p1 = writer.write_snapshot(&mesh, &mats, &v, &id, &[], 0.5).unwrap();
        assert!(p0.exists() && p1.exists());

        let manifest = std::fs::read_to_string(writer.manifest_path()).unwrap();
        assert!(manifest.contains("solution_0000.vtr"));
        assert!(manifest.contains(r#"timestep="0.5""#));

        let body = std::fs::read_to_string(&p0).unwrap();
        assert!(body.contains("RectilinearGrid"));
        assert!(body.contains(r#"Name="density""#));
        assert!(body.contains(r#"NumberOfComponents="3""#));
    }

    #[test]
    fn test_mesh_listing() {
        let dir = std::env::temp_dir().join("mm_io_meshlist_test");
        std::fs::create_dir_all(&dir).unwrap();
        let mesh = GlobalMesh::uniform([0.0, 2.0, 0.0, 1.0, 0.0, 1.0], 4, 1, 1).unwrap();
        let path = dir.join("mesh.txt");
        write_mesh_listing(&mesh, &path).unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("# x 方向 (4 单元)"));
        assert!(body.contains("0.25"));
    }
}
