// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
//! Bounding volume hierarchy of oriented boxes over a triangle mesh.

pub mod builder;
pub mod cache;
pub mod loader;

use glam::Mat4;
use thiserror::Error;

use crate::{
    assets::mesh_loader::MeshError,
    geometry::{Aabb, Obb, Triangle},
};
use cache::CacheError;

#[derive(Debug, Error)]
pub enum ObbTreeError {
    #[error("Mesh {0} has no triangles to build a tree from")]
    EmptyMesh(String),

    #[error("Mesh Error: {0}")]
    Mesh(#[from] MeshError),

    #[error("Cache Error: {0}")]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObbNode {
    Branch { bounds: Obb, children: [usize; 2] },
    Leaf(Triangle),
}

impl ObbNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self, ObbNode::Leaf(_))
    }

    pub fn children(&self) -> Option<[usize; 2]> {
        match self {
            ObbNode::Branch { children, .. } => Some(*children),
            ObbNode::Leaf(_) => None,
        }
    }

    /// Box of this node in model space. Leaves are fitted on demand.
    pub fn bounds(&self, min_thickness: f32) -> Obb {
        match self {
            ObbNode::Branch { bounds, .. } => *bounds,
            ObbNode::Leaf(triangle) => Obb::fit_triangle(triangle, min_thickness),
        }
    }
}

/// Immutable OBB tree. Index 0 is the root and nodes are stored breadth first,
/// so every child index is greater than its parent's.
#[derive(Debug, Clone, PartialEq)]
pub struct ObbTree {
    name: String,
    nodes: Vec<ObbNode>,
    parents: Vec<Option<usize>>,
    min_thickness: f32,
}

impl ObbTree {
    pub(crate) fn from_parts(
        name: String,
        nodes: Vec<ObbNode>,
        parents: Vec<Option<usize>>,
        min_thickness: f32,
    ) -> Self {
        debug_assert_eq!(nodes.len(), parents.len());
        Self {
            name,
            nodes,
            parents,
            min_thickness,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[ObbNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &ObbNode {
        &self.nodes[index]
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.parents[index]
    }

    pub fn parents(&self) -> &[Option<usize>] {
        &self.parents
    }

    pub fn root(&self) -> &ObbNode {
        &self.nodes[0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn min_thickness(&self) -> f32 {
        self.min_thickness
    }

    pub fn triangle_count(&self) -> usize {
        self.nodes.len().div_ceil(2)
    }

    pub fn triangles(&self) -> impl Iterator<Item = &Triangle> {
        self.nodes.iter().filter_map(|node| match node {
            ObbNode::Leaf(triangle) => Some(triangle),
            ObbNode::Branch { .. } => None,
        })
    }

    /// Box of node `index` in model space.
    pub fn bounds(&self, index: usize) -> Obb {
        self.nodes[index].bounds(self.min_thickness)
    }

    /// Longest root-to-leaf path, counted in edges.
    pub fn height(&self) -> usize {
        let mut depth = vec![0usize; self.nodes.len()];
        let mut height = 0;
        for (index, node) in self.nodes.iter().enumerate() {
            if let Some([left, right]) = node.children() {
                depth[left] = depth[index] + 1;
                depth[right] = depth[index] + 1;
                height = height.max(depth[index] + 1);
            }
        }
        height
    }

    /// Axis-aligned bound of the whole mesh under `world`.
    pub fn world_bound(&self, world: &Mat4) -> Aabb {
        match self.nodes.first() {
            Some(ObbNode::Branch { bounds, .. }) => bounds.transformed(world).bound(),
            Some(ObbNode::Leaf(triangle)) => triangle.transformed(world).bound(),
            None => Aabb::inverted(),
        }
    }
}
