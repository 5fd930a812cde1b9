// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
//! On-disk cache of built OBB trees.
//!
//! A cache file is a [`CacheHeader`] followed by `node_count` [`NodeRecord`]s in
//! arena order. Branch records hold the box origin and its three half-extent
//! columns; leaf records hold the three triangle vertices.

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Vec3};
use thiserror::Error;

use crate::{
    geometry::{Obb, Triangle},
    settings::CacheSettings,
};

use super::{ObbNode, ObbTree};

pub const CACHE_MAGIC: [u8; 4] = *b"OBBT";
pub const CACHE_VERSION: u32 = 1;

const TAG_BRANCH: u32 = 0;
const TAG_LEAF: u32 = 1;
const NO_PARENT: u32 = u32::MAX;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not an OBB tree cache")]
    BadMagic,

    #[error("Cache version {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Cache truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("Corrupt cache: {0}")]
    Corrupt(String),
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CacheHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub node_count: u32,
    pub min_thickness: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct NodeRecord {
    pub tag: u32,
    pub left: u32,
    pub right: u32,
    pub parent: u32,
    pub values: [f32; 12],
}

const HEADER_SIZE: usize = size_of::<CacheHeader>();
const RECORD_SIZE: usize = size_of::<NodeRecord>();

impl NodeRecord {
    fn from_node(node: &ObbNode, parent: Option<usize>) -> Self {
        let parent = parent.map_or(NO_PARENT, |p| p as u32);
        let mut values = [0.0; 12];
        match node {
            ObbNode::Branch { bounds, children } => {
                let columns = [
                    bounds.origin,
                    bounds.axes.x_axis,
                    bounds.axes.y_axis,
                    bounds.axes.z_axis,
                ];
                for (slot, v) in values.chunks_exact_mut(3).zip(columns) {
                    slot.copy_from_slice(&v.to_array());
                }
                NodeRecord {
                    tag: TAG_BRANCH,
                    left: children[0] as u32,
                    right: children[1] as u32,
                    parent,
                    values,
                }
            }
            ObbNode::Leaf(triangle) => {
                for (slot, v) in values.chunks_exact_mut(3).zip(triangle.vertices()) {
                    slot.copy_from_slice(&v.to_array());
                }
                NodeRecord {
                    tag: TAG_LEAF,
                    left: 0,
                    right: 0,
                    parent,
                    values,
                }
            }
        }
    }

    fn vec3(&self, slot: usize) -> Vec3 {
        Vec3::from_slice(&self.values[slot * 3..slot * 3 + 3])
    }
}

/// Where the cache for mesh `name` lives.
pub fn cache_path(name: &str, settings: &CacheSettings) -> PathBuf {
    let source = Path::new(name);
    let mut file_name: OsString = match &settings.directory {
        Some(_) => source
            .file_name()
            .map(|f| f.to_os_string())
            .unwrap_or_else(|| OsString::from(name)),
        None => source.as_os_str().to_os_string(),
    };
    file_name.push(&settings.suffix);

    match &settings.directory {
        Some(directory) => directory.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// True when the cache exists and is not older than its source.
///
/// A source without a modification time (missing or in-memory) never makes an
/// existing cache stale.
pub fn is_fresh(cache: &Path, source_modified: Option<SystemTime>) -> bool {
    let Ok(cache_modified) = fs::metadata(cache).and_then(|m| m.modified()) else {
        return false;
    };
    match source_modified {
        Some(source_modified) => cache_modified >= source_modified,
        None => true,
    }
}

pub fn encode(tree: &ObbTree) -> Vec<u8> {
    let header = CacheHeader {
        magic: CACHE_MAGIC,
        version: CACHE_VERSION,
        node_count: tree.len() as u32,
        min_thickness: tree.min_thickness(),
    };

    let mut bytes = Vec::with_capacity(HEADER_SIZE + tree.len() * RECORD_SIZE);
    bytes.extend_from_slice(bytemuck::bytes_of(&header));
    for (node, parent) in tree.nodes().iter().zip(tree.parents()) {
        bytes.extend_from_slice(bytemuck::bytes_of(&NodeRecord::from_node(node, *parent)));
    }
    bytes
}

pub fn decode(name: &str, bytes: &[u8]) -> Result<ObbTree, CacheError> {
    if bytes.len() < HEADER_SIZE {
        return Err(CacheError::Truncated {
            expected: HEADER_SIZE,
            found: bytes.len(),
        });
    }

    let header: CacheHeader = bytemuck::pod_read_unaligned(&bytes[..HEADER_SIZE]);
    if header.magic != CACHE_MAGIC {
        return Err(CacheError::BadMagic);
    }
    if header.version != CACHE_VERSION {
        return Err(CacheError::VersionMismatch {
            found: header.version,
            expected: CACHE_VERSION,
        });
    }

    let count = header.node_count as usize;
    if count == 0 || count % 2 == 0 {
        return Err(CacheError::Corrupt(format!("{count} nodes cannot form a tree")));
    }
    let expected = HEADER_SIZE + count * RECORD_SIZE;
    if bytes.len() != expected {
        return Err(CacheError::Truncated {
            expected,
            found: bytes.len(),
        });
    }

    let records: Vec<NodeRecord> = bytes[HEADER_SIZE..]
        .chunks_exact(RECORD_SIZE)
        .map(bytemuck::pod_read_unaligned)
        .collect();

    let mut nodes = Vec::with_capacity(count);
    let mut parents = Vec::with_capacity(count);
    let mut references = vec![0usize; count];
    for (index, record) in records.iter().enumerate() {
        if record.values.iter().any(|v| !v.is_finite()) {
            return Err(CacheError::Corrupt(format!("node {index} is not finite")));
        }

        let parent = match record.parent {
            NO_PARENT if index == 0 => None,
            p if index > 0 && (p as usize) < index => Some(p as usize),
            p => {
                return Err(CacheError::Corrupt(format!(
                    "node {index} has invalid parent {p}"
                )));
            }
        };
        parents.push(parent);

        let node = match record.tag {
            TAG_BRANCH => {
                let children = [record.left as usize, record.right as usize];
                for child in children {
                    if child <= index || child >= count {
                        return Err(CacheError::Corrupt(format!(
                            "node {index} has invalid child {child}"
                        )));
                    }
                    if records[child].parent as usize != index {
                        return Err(CacheError::Corrupt(format!(
                            "child {child} does not point back to node {index}"
                        )));
                    }
                    references[child] += 1;
                }
                ObbNode::Branch {
                    bounds: Obb::new(
                        record.vec3(0),
                        Mat3::from_cols(record.vec3(1), record.vec3(2), record.vec3(3)),
                    ),
                    children,
                }
            }
            TAG_LEAF => ObbNode::Leaf(Triangle::new(record.vec3(0), record.vec3(1), record.vec3(2))),
            tag => {
                return Err(CacheError::Corrupt(format!("node {index} has unknown tag {tag}")));
            }
        };
        nodes.push(node);
    }

    // every node but the root hangs under exactly one branch
    if let Some(orphan) = references
        .iter()
        .enumerate()
        .skip(1)
        .find_map(|(index, &refs)| (refs != 1).then_some(index))
    {
        return Err(CacheError::Corrupt(format!(
            "node {orphan} is referenced {} times",
            references[orphan]
        )));
    }

    Ok(ObbTree::from_parts(
        name.to_string(),
        nodes,
        parents,
        header.min_thickness,
    ))
}

pub fn read(path: &Path, name: &str) -> Result<ObbTree, CacheError> {
    let bytes = fs::read(path)?;
    let tree = decode(name, &bytes)?;
    log::debug!("Read OBB tree cache {} ({} nodes)", path.display(), tree.len());
    Ok(tree)
}

/// Writes the cache next to its final location and renames it into place, so
/// readers never see a partial file.
pub fn write(path: &Path, tree: &ObbTree) -> Result<(), CacheError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let mut temp = path.as_os_str().to_os_string();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    fs::write(&temp, encode(tree))?;
    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }
    log::debug!("Wrote OBB tree cache {} ({} nodes)", path.display(), tree.len());
    Ok(())
}
