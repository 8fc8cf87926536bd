//! In-memory camera list with an "active camera" or "all cameras" selection.

use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::RegistryError;
use crate::models::{CameraSelection, CameraTarget};

#[derive(Debug, Default)]
struct RegistryState {
    cameras: Vec<CameraTarget>,
    active_id: Option<String>,
    monitor_all: bool,
}

impl RegistryState {
    fn active(&self) -> Option<&CameraTarget> {
        self.active_id
            .as_ref()
            .and_then(|id| self.cameras.iter().find(|camera| &camera.id == id))
            .or_else(|| self.cameras.first())
    }
}

#[derive(Debug, Default)]
pub struct CameraRegistry {
    state: RwLock<RegistryState>,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a camera and return its id. The first camera becomes active.
    pub fn add(&self, camera: CameraTarget) -> Result<String, RegistryError> {
        let camera = camera.normalized();
        let id = camera.id.clone();
        let mut state = self.write();
        if state.cameras.iter().any(|existing| existing.id == id) {
            return Err(RegistryError::DuplicateCamera(id));
        }
        if state.active_id.is_none() {
            state.active_id = Some(id.clone());
        }
        state.cameras.push(camera);
        Ok(id)
    }

    /// Remove a camera. The last remaining camera cannot be removed; the
    /// selection moves to the preceding camera and leaves monitor-all.
    pub fn remove(&self, id: &str) -> Result<CameraTarget, RegistryError> {
        let mut state = self.write();
        let index = state
            .cameras
            .iter()
            .position(|camera| camera.id == id)
            .ok_or_else(|| RegistryError::UnknownCamera(id.to_string()))?;
        if state.cameras.len() <= 1 {
            return Err(RegistryError::LastCamera);
        }

        let removed = state.cameras.remove(index);
        let next = index.saturating_sub(1).min(state.cameras.len() - 1);
        let next_id = state.cameras[next].id.clone();
        state.active_id = Some(next_id);
        state.monitor_all = false;
        Ok(removed)
    }

    /// Replace a camera's fields, keeping its id.
    pub fn update(&self, id: &str, camera: CameraTarget) -> Result<(), RegistryError> {
        let mut state = self.write();
        let slot = state
            .cameras
            .iter_mut()
            .find(|existing| existing.id == id)
            .ok_or_else(|| RegistryError::UnknownCamera(id.to_string()))?;
        *slot = CameraTarget {
            id: id.to_string(),
            ..camera
        }
        .normalized();
        Ok(())
    }

    /// Select a single camera; leaves monitor-all mode.
    pub fn set_active(&self, id: &str) -> Result<(), RegistryError> {
        let mut state = self.write();
        if !state.cameras.iter().any(|camera| camera.id == id) {
            return Err(RegistryError::UnknownCamera(id.to_string()));
        }
        state.active_id = Some(id.to_string());
        state.monitor_all = false;
        Ok(())
    }

    pub fn set_monitor_all(&self, monitor_all: bool) {
        self.write().monitor_all = monitor_all;
    }

    /// Replace the whole registry, e.g. from a loaded configuration.
    /// A repeated id keeps its first camera; later ones get fresh ids.
    pub fn apply_selection(&self, mut selection: CameraSelection) {
        let mut seen = HashSet::new();
        for camera in &mut selection.cameras {
            if !seen.insert(camera.id.clone()) {
                camera.id = CameraTarget::new(camera.name.clone()).id;
                seen.insert(camera.id.clone());
            }
        }

        let mut state = self.write();
        state.active_id = selection
            .active_camera_id
            .filter(|id| selection.cameras.iter().any(|camera| &camera.id == id))
            .or_else(|| selection.cameras.first().map(|camera| camera.id.clone()));
        state.cameras = selection.cameras;
        state.monitor_all = selection.monitor_all;
    }

    pub fn selection(&self) -> CameraSelection {
        let state = self.read();
        CameraSelection {
            cameras: state.cameras.clone(),
            active_camera_id: state.active().map(|camera| camera.id.clone()),
            monitor_all: state.monitor_all,
        }
    }

    /// The selected camera, whatever the monitor-all flag says.
    pub fn active(&self) -> Option<CameraTarget> {
        self.read().active().cloned()
    }

    pub fn monitor_all(&self) -> bool {
        self.read().monitor_all
    }

    pub fn len(&self) -> usize {
        self.read().cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().cameras.is_empty()
    }

    /// Targets for one cycle: every camera in monitor-all mode, otherwise the
    /// active camera. The returned list is a copy.
    pub fn snapshot(&self) -> Vec<CameraTarget> {
        self.cycle_targets().0
    }

    /// The cycle's targets together with the monitor-all flag they were
    /// resolved under, read in one step.
    pub fn cycle_targets(&self) -> (Vec<CameraTarget>, bool) {
        let state = self.read();
        let targets = if state.monitor_all {
            state.cameras.clone()
        } else {
            state.active().cloned().into_iter().collect()
        };
        (targets, state.monitor_all)
    }
}
