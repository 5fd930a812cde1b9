// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use std::{
    collections::HashMap,
    fs::{self, File},
    io::BufReader,
    path::Path,
    sync::RwLock,
    time::SystemTime,
};

use glam::Vec3;
use thiserror::Error;

use crate::geometry::Triangle;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OBJ Load Error: {0}")]
    Obj(#[from] tobj::LoadError),

    #[error("Unsupported mesh format: {0}")]
    UnsupportedFormat(String),

    #[error("Mesh {0} contains no triangles")]
    Empty(String),
}

/// Anything that can hand out the triangles of a named shape.
pub trait MeshSource: Send + Sync {
    fn load(&self, name: &str) -> Result<Vec<Triangle>, MeshError>;

    /// Last modification time of the named source, if it has one.
    fn modified(&self, _name: &str) -> Option<SystemTime> {
        None
    }
}

/// Reads meshes from disk, dispatching on the file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileMeshSource;

impl FileMeshSource {
    pub fn new() -> Self {
        Self
    }

    pub fn read_obj(path: &Path) -> Result<Vec<Triangle>, MeshError> {
        let (models, _) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
        )?;

        let mut triangles = Vec::new();
        for model in models {
            let mesh = model.mesh;
            let vertex = |i: u32| {
                let i = i as usize * 3;
                Vec3::new(
                    mesh.positions[i],
                    mesh.positions[i + 1],
                    mesh.positions[i + 2],
                )
            };
            for face in mesh.indices.chunks_exact(3) {
                triangles.push(Triangle::new(vertex(face[0]), vertex(face[1]), vertex(face[2])));
            }
        }

        Ok(triangles)
    }

    pub fn read_stl(path: &Path) -> Result<Vec<Triangle>, MeshError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let indexed_mesh = stl_io::read_stl(&mut reader)?;

        let vertex = |i: usize| {
            let v = indexed_mesh.vertices[i];
            Vec3::new(v[0], v[1], v[2])
        };
        let triangles = indexed_mesh
            .faces
            .iter()
            .map(|face| {
                Triangle::new(
                    vertex(face.vertices[0]),
                    vertex(face.vertices[1]),
                    vertex(face.vertices[2]),
                )
            })
            .collect();

        Ok(triangles)
    }
}

impl MeshSource for FileMeshSource {
    fn load(&self, name: &str) -> Result<Vec<Triangle>, MeshError> {
        let path = Path::new(name);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let triangles = match extension.as_str() {
            "obj" => Self::read_obj(path)?,
            "stl" => Self::read_stl(path)?,
            _ => return Err(MeshError::UnsupportedFormat(name.to_string())),
        };

        if triangles.is_empty() {
            return Err(MeshError::Empty(name.to_string()));
        }
        log::debug!("Loaded {} triangles from {}", triangles.len(), name);
        Ok(triangles)
    }

    fn modified(&self, name: &str) -> Option<SystemTime> {
        fs::metadata(name).and_then(|m| m.modified()).ok()
    }
}

/// Meshes registered in memory under a name.
#[derive(Debug, Default)]
pub struct MemoryMeshSource {
    meshes: RwLock<HashMap<String, Vec<Triangle>>>,
}

impl MemoryMeshSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, triangles: Vec<Triangle>) {
        if let Ok(mut meshes) = self.meshes.write() {
            meshes.insert(name.into(), triangles);
        }
    }
}

impl MeshSource for MemoryMeshSource {
    fn load(&self, name: &str) -> Result<Vec<Triangle>, MeshError> {
        let meshes = self
            .meshes
            .read()
            .map_err(|_| MeshError::Io(std::io::Error::other("mesh table poisoned")))?;
        match meshes.get(name) {
            Some(triangles) if !triangles.is_empty() => Ok(triangles.clone()),
            Some(_) => Err(MeshError::Empty(name.to_string())),
            None => Err(MeshError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no mesh named {name}"),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const CUBE_OBJ: &str = "\
v -1 -1 -1
v 1 -1 -1
v 1 1 -1
v -1 1 -1
v -1 -1 1
v 1 -1 1
v 1 1 1
v -1 1 1
f 1 4 3 2
f 5 6 7 8
f 1 2 6 5
f 3 4 8 7
f 2 3 7 6
f 1 5 8 4
";

    #[test]
    fn reads_obj_and_triangulates_quads() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("cube.obj");
        fs::write(&path, CUBE_OBJ).expect("Failed to write obj");

        let triangles = FileMeshSource
            .load(path.to_str().expect("utf-8 path"))
            .expect("Failed to load obj");
        assert_eq!(triangles.len(), 12);
        for tri in &triangles {
            assert!(tri.normal().dot(tri.centroid()) > 0.0);
        }
    }

    #[test]
    fn reads_ascii_stl() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("tri.stl");
        let mut file = File::create(&path).expect("Failed to create stl");
        writeln!(
            file,
            "solid test\n  facet normal 0 0 1\n    outer loop\n      vertex 0 0 0\n      vertex 1 0 0\n      vertex 0 1 0\n    endloop\n  endfacet\nendsolid test"
        )
        .expect("Failed to write stl");
        drop(file);

        let triangles = FileMeshSource
            .load(path.to_str().expect("utf-8 path"))
            .expect("Failed to load stl");
        assert_eq!(triangles.len(), 1);
        assert_eq!(triangles[0].normal(), Vec3::Z);
        assert!(FileMeshSource.modified(path.to_str().expect("utf-8 path")).is_some());
    }

    #[test]
    fn unknown_extension_and_missing_files_are_errors() {
        assert!(matches!(
            FileMeshSource.load("mesh.ply"),
            Err(MeshError::UnsupportedFormat(_))
        ));
        assert!(FileMeshSource.load("/definitely/not/here.stl").is_err());
        assert!(FileMeshSource.modified("/definitely/not/here.stl").is_none());
    }

    #[test]
    fn memory_source_round_trip() {
        let source = MemoryMeshSource::new();
        source.insert("tri", vec![Triangle::new(Vec3::ZERO, Vec3::X, Vec3::Y)]);
        source.insert("nothing", Vec::new());
        assert_eq!(source.load("tri").expect("registered").len(), 1);
        assert!(matches!(source.load("nothing"), Err(MeshError::Empty(_))));
        assert!(source.load("missing").is_err());
    }
}
