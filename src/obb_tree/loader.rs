// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use std::sync::Arc;

use crate::{
    assets::{
        mesh::Mesh,
        mesh_loader::{FileMeshSource, MeshError, MeshSource},
        resource_table::{ResourceTable, WeakTable},
    },
    settings::{CacheSettings, ObbSettings},
};

use super::{ObbTree, ObbTreeError, cache};

/// Resolves OBB trees by mesh name.
///
/// A request is served from the tree table, then from a fresh cache file, and
/// only then by loading the mesh and building the tree, which is written back to
/// the cache.
pub struct ObbTreeLoader {
    source: Box<dyn MeshSource>,
    meshes: Box<dyn ResourceTable<Mesh>>,
    trees: Box<dyn ResourceTable<ObbTree>>,
    obb: ObbSettings,
    cache: CacheSettings,
}

impl Default for ObbTreeLoader {
    fn default() -> Self {
        Self::with_file_source(ObbSettings::default(), CacheSettings::default())
    }
}

impl ObbTreeLoader {
    pub fn new(
        source: Box<dyn MeshSource>,
        meshes: Box<dyn ResourceTable<Mesh>>,
        trees: Box<dyn ResourceTable<ObbTree>>,
        obb: ObbSettings,
        cache: CacheSettings,
    ) -> Self {
        Self {
            source,
            meshes,
            trees,
            obb,
            cache,
        }
    }

    /// Loader reading meshes from disk with weak resource tables.
    pub fn with_file_source(obb: ObbSettings, cache: CacheSettings) -> Self {
        Self::new(
            Box::new(FileMeshSource::new()),
            Box::new(WeakTable::new()),
            Box::new(WeakTable::new()),
            obb,
            cache,
        )
    }

    pub fn obb_settings(&self) -> &ObbSettings {
        &self.obb
    }

    pub fn cache_settings(&self) -> &CacheSettings {
        &self.cache
    }

    pub fn load_mesh(&mut self, name: &str) -> Result<Arc<Mesh>, MeshError> {
        if let Some(mesh) = self.meshes.find(name) {
            return Ok(mesh);
        }

        let triangles = self.source.load(name)?;
        if triangles.is_empty() {
            return Err(MeshError::Empty(name.to_string()));
        }
        let mesh = Arc::new(Mesh::new(name, triangles));
        self.meshes.insert(name, &mesh);
        Ok(mesh)
    }

    pub fn load(&mut self, name: &str) -> Result<Arc<ObbTree>, ObbTreeError> {
        if let Some(tree) = self.trees.find(name) {
            log::trace!("OBB tree {} already loaded", name);
            return Ok(tree);
        }

        let cache_path = self
            .cache
            .enabled
            .then(|| cache::cache_path(name, &self.cache));

        if let Some(path) = &cache_path
            && cache::is_fresh(path, self.source.modified(name))
        {
            match cache::read(path, name) {
                Ok(tree) if tree.min_thickness() == self.obb.min_thickness => {
                    let tree = Arc::new(tree);
                    self.trees.insert(name, &tree);
                    return Ok(tree);
                }
                Ok(_) => log::debug!(
                    "Cache {} was built with another minimum thickness, rebuilding",
                    path.display()
                ),
                Err(e) => log::warn!("Ignoring OBB tree cache {}: {}", path.display(), e),
            }
        }

        let mesh = self.load_mesh(name)?;
        let tree = Arc::new(ObbTree::build(&mesh, &self.obb)?);

        if let Some(path) = &cache_path
            && let Err(e) = cache::write(path, &tree)
        {
            log::warn!("Failed to write OBB tree cache {}: {}", path.display(), e);
        }

        self.trees.insert(name, &tree);
        Ok(tree)
    }

    /// Registers a mesh supplied in memory and builds its tree without touching
    /// the cache.
    pub fn load_from_mesh(&mut self, mesh: Arc<Mesh>) -> Result<Arc<ObbTree>, ObbTreeError> {
        if let Some(tree) = self.trees.find(&mesh.name) {
            return Ok(tree);
        }

        let tree = Arc::new(ObbTree::build(&mesh, &self.obb)?);
        self.meshes.insert(&mesh.name, &mesh);
        self.trees.insert(&mesh.name, &tree);
        Ok(tree)
    }

    /// Forgets a tree so the next request reloads it.
    pub fn evict(&mut self, name: &str) -> bool {
        let tree = self.trees.evict(name);
        let mesh = self.meshes.evict(name);
        tree || mesh
    }

    /// Drops table entries for meshes and trees nobody holds anymore.
    pub fn purge(&mut self) -> usize {
        self.meshes.purge() + self.trees.purge()
    }
}
