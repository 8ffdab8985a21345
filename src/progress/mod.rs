//! Persisted tree of processed filesystem paths, so an interrupted batch run
//! resumes where it stopped instead of reprocessing finished work.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// cannot collide with a real path segment
const ROOT_NAME: &str = "<root>";

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("progress file is corrupt: {0}")]
    Corrupt(serde_json::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize progress tree: {0}")]
    Serialize(serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgressNode {
    pub name: String,
    pub children: BTreeMap<String, ProgressNode>,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_path: Option<String>,
}

impl ProgressNode {
    fn new(name: String) -> Self {
        Self {
            name,
            children: BTreeMap::new(),
            done: false,
            copy_path: None,
        }
    }
}

#[derive(Debug)]
pub struct ProgressLog {
    root: ProgressNode,
    path: PathBuf,
}

impl ProgressLog {
    /// Starts a fresh tree, overwriting whatever is at `path`.
    pub fn create(path: PathBuf) -> Result<Self, ProgressError> {
        let log = Self {
            root: ProgressNode::new(ROOT_NAME.to_string()),
            path,
        };
        log.save()?;
        Ok(log)
    }

    /// Loads a persisted tree, or starts a fresh one when no file exists.
    ///
    /// An existing file that fails to parse is NOT discarded here; the
    /// caller decides what to do with `ProgressError::Corrupt`.
    pub fn load(path: PathBuf) -> Result<Self, ProgressError> {
        if !path.exists() {
            return Self::create(path);
        }
        let contents = fs::read_to_string(&path)?;
        let root = serde_json::from_str(&contents).map_err(ProgressError::Corrupt)?;
        Ok(Self { root, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records the processing state of a path and persists the whole tree
    /// synchronously, so a crash loses at most the in-flight item.
    ///
    /// A node marked done has its children pruned: `is_done` treats a done
    /// ancestor as covering everything beneath it, so the detail is never
    /// needed again and the persisted file stays small.
    pub fn mark(
        &mut self,
        target: &Path,
        done: bool,
        copy_path: Option<&Path>,
    ) -> Result<(), ProgressError> {
        let mut node = &mut self.root;
        for segment in path_segments(target) {
            node = node
                .children
                .entry(segment.clone())
                .or_insert_with(|| ProgressNode::new(segment));
        }
        node.done = done;
        if done {
            node.children.clear();
        }
        if let Some(copy_path) = copy_path {
            node.copy_path = Some(copy_path.to_string_lossy().into_owned());
        }
        self.save()
    }

    /// True if the path, or any ancestor of it, is marked done. Missing
    /// segments mean the path was never touched.
    pub fn is_done(&self, target: &Path) -> bool {
        let mut node = &self.root;
        for segment in path_segments(target) {
            if node.done {
                return true;
            }
            match node.children.get(&segment) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.done
    }

    fn save(&self) -> Result<(), ProgressError> {
        let body = serde_json::to_string_pretty(&self.root).map_err(ProgressError::Serialize)?;
        fs::write(&self.path, body)?;
        Ok(())
    }
}

fn path_segments(path: &Path) -> Vec<String> {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect()
}
