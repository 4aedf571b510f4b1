//! File-backed node registry.
//!
//! The registry keeps every [`Node`] in an in-memory map keyed by
//! identifier and mirrors that map 1:1 to a single JSON file.  The file is
//! rewritten in full on every successful [`NodeRegistry::save`]; writes go
//! through a temporary file in the same directory followed by a rename, so
//! readers only ever see a complete previous or complete next version.
//!
//! One registry exists per process.  Saves take the registry mutex for
//! their whole insert-encode-write sequence and run on the blocking pool,
//! so concurrent saves queue instead of racing, and a save that has started
//! finishes even if the connection awaiting it goes away.
//!
//! Duplicate `(host, port)` pairs are accepted.  Identity is the generated
//! UUID and nothing else.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::RegistryError;
use crate::metrics::REGISTRY_NODES;

/// The in-memory node set, ordered by identifier.
pub type NodeSet = BTreeMap<Uuid, Node>;

/// A registered node.  Created only by a successful save; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub host: String,
    pub port: i64,
}

/// Input to [`NodeRegistry::save`]; carries no identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDraft {
    pub host: String,
    pub port: i64,
}

/// Destination for an encoded node set.
///
/// Implementations must replace the file at `path` with `data` or leave it
/// untouched; a partially written file must never become visible.
pub trait SnapshotWriter: Send + Sync + 'static {
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;
}

/// Writes through a sibling temp file and an atomic rename.
#[derive(Debug, Default, Clone, Copy)]
pub struct AtomicFileWriter;

impl SnapshotWriter for AtomicFileWriter {
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(data)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// The process-wide node store; share it behind an `Arc`.
pub struct NodeRegistry {
    path: PathBuf,
    nodes: Arc<Mutex<NodeSet>>,
    writer: Arc<dyn SnapshotWriter>,
}

impl NodeRegistry {
    /// Load the registry backed by `path`.
    ///
    /// A missing file yields an empty registry; a corrupt one is an error,
    /// since starting empty would silently drop the persisted nodes.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        Self::with_writer(path, Arc::new(AtomicFileWriter))
    }

    /// Like [`NodeRegistry::open`], writing through `writer`.
    pub fn with_writer(
        path: impl Into<PathBuf>,
        writer: Arc<dyn SnapshotWriter>,
    ) -> Result<Self, RegistryError> {
        let path = path.into();
        let nodes = load(&path)?;
        info!("Loaded {} node(s) from {}", nodes.len(), path.display());
        metrics::gauge!(REGISTRY_NODES).set(nodes.len() as f64);
        Ok(Self {
            path,
            nodes: Arc::new(Mutex::new(nodes)),
            writer,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a node from `draft` and persist the whole set.
    ///
    /// On failure the in-memory set is exactly what it was before the call
    /// and the backing file is unchanged.
    pub async fn save(&self, draft: NodeDraft) -> Result<Node, RegistryError> {
        let nodes = Arc::clone(&self.nodes);
        let writer = Arc::clone(&self.writer);
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let mut nodes = nodes.lock().map_err(|_| RegistryError::Poisoned)?;
            let node = insert_and_write(&mut nodes, &path, writer.as_ref(), draft)?;
            metrics::gauge!(REGISTRY_NODES).set(nodes.len() as f64);
            Ok(node)
        })
        .await?
    }

    /// Snapshot of the current set, ordered by identifier.
    pub fn nodes(&self) -> Result<Vec<Node>, RegistryError> {
        let nodes = self.nodes.lock().map_err(|_| RegistryError::Poisoned)?;
        Ok(nodes.values().cloned().collect())
    }

    /// Number of nodes currently registered.
    pub fn len(&self) -> Result<usize, RegistryError> {
        let nodes = self.nodes.lock().map_err(|_| RegistryError::Poisoned)?;
        Ok(nodes.len())
    }

    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.len()? == 0)
    }
}

fn insert_and_write(
    nodes: &mut NodeSet,
    path: &Path,
    writer: &dyn SnapshotWriter,
    draft: NodeDraft,
) -> Result<Node, RegistryError> {
    let node = Node {
        id: Uuid::new_v4(),
        host: draft.host,
        port: draft.port,
    };
    if nodes.contains_key(&node.id) {
        return Err(RegistryError::AlreadyExists { id: node.id });
    }

    nodes.insert(node.id, node.clone());
    let written = encode(nodes).and_then(|data| {
        writer
            .write(path, &data)
            .map_err(RegistryError::WriteFailed)
    });
    if let Err(err) = written {
        nodes.remove(&node.id);
        return Err(err);
    }

    debug!("Wrote {} node(s) to {}", nodes.len(), path.display());
    Ok(node)
}

/// Read the node set stored at `path`.
///
/// Returns an empty set when the file does not exist.
pub fn load(path: &Path) -> Result<NodeSet, RegistryError> {
    match std::fs::read(path) {
        Ok(data) => decode(path, &data),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(NodeSet::new()),
        Err(source) => Err(RegistryError::ReadFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Encode the whole set as a JSON array.
pub fn encode(nodes: &NodeSet) -> Result<Vec<u8>, RegistryError> {
    let list: Vec<&Node> = nodes.values().collect();
    serde_json::to_vec_pretty(&list).map_err(RegistryError::EncodingFailed)
}

/// Decode a JSON array of nodes.  `path` is only used for error context.
pub fn decode(path: &Path, data: &[u8]) -> Result<NodeSet, RegistryError> {
    let list: Vec<Node> =
        serde_json::from_slice(data).map_err(|source| RegistryError::DecodeError {
            path: path.to_path_buf(),
            source,
        })?;

    let mut nodes = NodeSet::new();
    for node in list {
        if nodes.contains_key(&node.id) {
            return Err(RegistryError::DuplicateId {
                path: path.to_path_buf(),
                id: node.id,
            });
        }
        nodes.insert(node.id, node);
    }
    Ok(nodes)
}
