//! Concurrent project storage
//!
//! Projects are independent: each sits behind its own lock, and the store
//! hands out shared handles so the recompute worker and foreground
//! operations can take turns on one project without blocking others.

use crate::config::EngineConfig;
use crate::context::ProjectContext;
use crate::error::EngineError;
use cardprop_model::ProjectId;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// Shared handle to one project
pub type SharedProject = Arc<RwLock<ProjectContext>>;

/// Projects by id
#[derive(Debug, Default)]
pub struct ProjectStore {
    projects: DashMap<ProjectId, SharedProject>,
}

impl ProjectStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register an empty project
    pub fn create(&self, name: impl Into<String>, config: EngineConfig) -> ProjectId {
        self.insert(ProjectContext::new(name, config))
    }

    /// Register a project built elsewhere
    pub fn insert(&self, project: ProjectContext) -> ProjectId {
        let id = project.id;
        info!(project = %project.name, "project registered");
        self.projects.insert(id, Arc::new(RwLock::new(project)));
        id
    }

    /// Handle to a project
    pub fn get(&self, id: ProjectId) -> Result<SharedProject, EngineError> {
        self.projects
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(EngineError::ProjectNotFound(id))
    }

    /// Unregister a project
    pub fn remove(&self, id: ProjectId) -> Result<SharedProject, EngineError> {
        self.projects
            .remove(&id)
            .map(|(_, project)| project)
            .ok_or(EngineError::ProjectNotFound(id))
    }

    /// Registered project ids
    #[must_use]
    pub fn ids(&self) -> Vec<ProjectId> {
        self.projects.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of projects
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    /// Whether the store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Run a read-only closure against a project
    pub fn read<T>(&self, id: ProjectId, f: impl FnOnce(&ProjectContext) -> T) -> Result<T, EngineError> {
        let project = self.get(id)?;
        let guard = project.read();
        Ok(f(&guard))
    }

    /// Run a mutation against a project
    pub fn write<T>(
        &self,
        id: ProjectId,
        f: impl FnOnce(&mut ProjectContext) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let project = self.get(id)?;
        let mut guard = project.write();
        f(&mut guard)
    }
}
