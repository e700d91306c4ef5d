use super::{Result, ServerError};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL_VERSION: &str = "1.0";

/// One registered model version and its worker scaling parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDeployment {
    pub model_name: String,
    pub version: String,
    /// URI or path of the model archive.
    pub artifact_location: String,
    pub worker_count: u32,
    pub min_workers: u32,
    pub max_workers: u32,
    pub default_version: bool,
}

impl ModelDeployment {
    pub fn new(
        model_name: impl Into<String>,
        version: impl Into<String>,
        artifact_location: impl Into<String>,
        workers: u32,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            version: version.into(),
            artifact_location: artifact_location.into(),
            worker_count: workers,
            min_workers: workers,
            max_workers: workers,
            default_version: false,
        }
    }

    pub fn with_worker_bounds(mut self, min_workers: u32, max_workers: u32) -> Self {
        self.min_workers = min_workers;
        self.max_workers = max_workers;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.default_version = true;
        self
    }

    /// Sets the live worker count, widening the min/max bounds to include it.
    pub fn scale_to(&mut self, workers: u32) {
        self.worker_count = workers;
        self.min_workers = self.min_workers.min(workers);
        self.max_workers = self.max_workers.max(workers);
    }

    pub fn validate(&self) -> Result<()> {
        if self.model_name.is_empty() {
            return Err(ServerError::InvalidState("empty model name".to_string()));
        }
        if self.version.is_empty() {
            return Err(ServerError::InvalidState(format!(
                "model '{}' has an empty version",
                self.model_name
            )));
        }
        if self.min_workers > self.max_workers {
            return Err(ServerError::InvalidState(format!(
                "model '{}' version {}: min_workers {} exceeds max_workers {}",
                self.model_name, self.version, self.min_workers, self.max_workers
            )));
        }
        Ok(())
    }
}

/// Registered models keyed by name, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerState {
    model_store: Option<PathBuf>,
    models: Vec<(String, Vec<ModelDeployment>)>,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model_store(mut self, model_store: impl Into<PathBuf>) -> Self {
        self.model_store = Some(model_store.into());
        self
    }

    pub fn model_store(&self) -> Option<&Path> {
        self.model_store.as_deref()
    }

    pub fn set_model_store(&mut self, model_store: Option<PathBuf>) {
        self.model_store = model_store;
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn contains(&self, model_name: &str) -> bool {
        self.position(model_name).is_some()
    }

    pub fn model_names(&self) -> Vec<&str> {
        self.models.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn models(&self) -> impl Iterator<Item = (&str, &[ModelDeployment])> {
        self.models
            .iter()
            .map(|(name, versions)| (name.as_str(), versions.as_slice()))
    }

    /// All deployments flattened, in registration order.
    pub fn deployments(&self) -> impl Iterator<Item = &ModelDeployment> {
        self.models.iter().flat_map(|(_, versions)| versions.iter())
    }

    pub fn get(&self, model_name: &str) -> Option<&[ModelDeployment]> {
        self.position(model_name)
            .map(|idx| self.models[idx].1.as_slice())
    }

    /// The version flagged as default, falling back to the first registered one.
    pub fn default_deployment(&self, model_name: &str) -> Option<&ModelDeployment> {
        let versions = self.get(model_name)?;
        versions
            .iter()
            .find(|d| d.default_version)
            .or_else(|| versions.first())
    }

    /// Registers a new model. The first version becomes the default unless one
    /// of the supplied versions already is.
    pub fn insert_model(
        &mut self,
        model_name: impl Into<String>,
        mut versions: Vec<ModelDeployment>,
    ) -> Result<()> {
        let model_name = model_name.into();
        if self.contains(&model_name) {
            return Err(ServerError::ModelExists(model_name));
        }
        if versions.is_empty() {
            return Err(ServerError::InvalidState(format!(
                "model '{}' has no versions",
                model_name
            )));
        }
        if !versions.iter().any(|d| d.default_version) {
            versions[0].default_version = true;
        }
        validate_versions(&model_name, &versions)?;
        self.models.push((model_name, versions));
        Ok(())
    }

    /// Adds a version to an existing model, or registers the model if absent.
    pub fn add_deployment(&mut self, deployment: ModelDeployment) -> Result<()> {
        let Some(idx) = self.position(&deployment.model_name) else {
            let name = deployment.model_name.clone();
            return self.insert_model(name, vec![deployment]);
        };

        let versions = &mut self.models[idx].1;
        if versions.iter().any(|d| d.version == deployment.version) {
            return Err(ServerError::ModelExists(format!(
                "{} version {}",
                deployment.model_name, deployment.version
            )));
        }
        deployment.validate()?;
        if deployment.default_version {
            for existing in versions.iter_mut() {
                existing.default_version = false;
            }
        }
        versions.push(deployment);
        Ok(())
    }

    pub fn default_deployment_mut(&mut self, model_name: &str) -> Result<&mut ModelDeployment> {
        let idx = self
            .position(model_name)
            .ok_or_else(|| ServerError::ModelNotFound(model_name.to_string()))?;
        let versions = &mut self.models[idx].1;
        let target = versions
            .iter()
            .position(|d| d.default_version)
            .unwrap_or(0);
        versions
            .get_mut(target)
            .ok_or_else(|| ServerError::ModelNotFound(model_name.to_string()))
    }

    pub fn set_default_version(&mut self, model_name: &str, version: &str) -> Result<()> {
        let idx = self
            .position(model_name)
            .ok_or_else(|| ServerError::ModelNotFound(model_name.to_string()))?;
        let versions = &mut self.models[idx].1;
        if !versions.iter().any(|d| d.version == version) {
            return Err(ServerError::ModelNotFound(format!(
                "{} version {}",
                model_name, version
            )));
        }
        for deployment in versions.iter_mut() {
            deployment.default_version = deployment.version == version;
        }
        Ok(())
    }

    pub fn remove_model(&mut self, model_name: &str) -> Result<Vec<ModelDeployment>> {
        let idx = self
            .position(model_name)
            .ok_or_else(|| ServerError::ModelNotFound(model_name.to_string()))?;
        Ok(self.models.remove(idx).1)
    }

    /// Checks every structural invariant. Decoded state must pass this before
    /// it is installed.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.models.len());
        for (name, versions) in &self.models {
            if !seen.insert(name.as_str()) {
                return Err(ServerError::InvalidState(format!(
                    "duplicate model name '{}'",
                    name
                )));
            }
            validate_versions(name, versions)?;
        }
        Ok(())
    }

    fn position(&self, model_name: &str) -> Option<usize> {
        self.models.iter().position(|(name, _)| name == model_name)
    }
}

fn validate_versions(model_name: &str, versions: &[ModelDeployment]) -> Result<()> {
    let mut seen = HashSet::with_capacity(versions.len());
    let mut defaults = 0usize;
    for deployment in versions {
        deployment.validate()?;
        if deployment.model_name != model_name {
            return Err(ServerError::InvalidState(format!(
                "deployment '{}' listed under model '{}'",
                deployment.model_name, model_name
            )));
        }
        if !seen.insert(deployment.version.as_str()) {
            return Err(ServerError::InvalidState(format!(
                "duplicate version {} for model '{}'",
                deployment.version, model_name
            )));
        }
        if deployment.default_version {
            defaults += 1;
        }
    }
    if defaults > 1 {
        return Err(ServerError::InvalidState(format!(
            "model '{}' has {} default versions",
            model_name, defaults
        )));
    }
    Ok(())
}

/// Lifecycle event that produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    Startup,
    Shutdown,
    Change,
}

impl SnapshotKind {
    pub const ALL: [SnapshotKind; 3] = [Self::Startup, Self::Shutdown, Self::Change];

    /// Name used in the record header and the file suffix.
    pub fn label(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Change => "snapshot",
        }
    }

    pub fn file_suffix(self) -> &'static str {
        match self {
            Self::Startup => "startup.cfg",
            Self::Shutdown => "shutdown.cfg",
            Self::Change => "snapshot.cfg",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }

    pub fn from_file_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.file_suffix() == suffix)
    }

    /// Startup and Change records describe a state worth restoring.
    pub fn is_restorable(self) -> bool {
        matches!(self, Self::Startup | Self::Change)
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn densenet() -> ModelDeployment {
        ModelDeployment::new("densenet161", DEFAULT_MODEL_VERSION, "densenet161.mar", 2)
    }

    #[test]
    fn test_insert_preserves_registration_order() {
        let mut state = ServerState::new();
        state.insert_model("zeta", vec![ModelDeployment::new("zeta", "1.0", "zeta.mar", 1)]).unwrap();
        state.insert_model("alpha", vec![ModelDeployment::new("alpha", "1.0", "alpha.mar", 1)]).unwrap();

        assert_eq!(state.model_names(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_insert_duplicate_model_fails() {
        let mut state = ServerState::new();
        state.insert_model("densenet161", vec![densenet()]).unwrap();

        let err = state.insert_model("densenet161", vec![densenet()]).unwrap_err();
        assert!(matches!(err, ServerError::ModelExists(_)));
    }

    #[test]
    fn test_first_version_becomes_default() {
        let mut state = ServerState::new();
        state.insert_model("densenet161", vec![densenet()]).unwrap();

        assert!(state.default_deployment("densenet161").unwrap().default_version);
    }

    #[test]
    fn test_add_deployment_and_switch_default() {
        let mut state = ServerState::new();
        state.add_deployment(densenet()).unwrap();
        state
            .add_deployment(ModelDeployment::new("densenet161", "2.0", "densenet161-v2.mar", 1))
            .unwrap();

        assert_eq!(state.get("densenet161").unwrap().len(), 2);
        assert_eq!(state.default_deployment("densenet161").unwrap().version, "1.0");

        state.set_default_version("densenet161", "2.0").unwrap();
        assert_eq!(state.default_deployment("densenet161").unwrap().version, "2.0");
        state.validate().unwrap();
    }

    #[test]
    fn test_add_duplicate_version_fails() {
        let mut state = ServerState::new();
        state.add_deployment(densenet()).unwrap();

        assert!(state.add_deployment(densenet()).is_err());
    }

    #[test]
    fn test_scale_widens_bounds() {
        let mut deployment = densenet();
        deployment.scale_to(6);
        assert_eq!((deployment.worker_count, deployment.min_workers, deployment.max_workers), (6, 2, 6));

        deployment.scale_to(0);
        assert_eq!((deployment.worker_count, deployment.min_workers, deployment.max_workers), (0, 0, 6));
    }

    #[test]
    fn test_remove_unknown_model() {
        let mut state = ServerState::new();
        let err = state.remove_model("resnet18").unwrap_err();
        assert!(matches!(err, ServerError::ModelNotFound(_)));
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let mut state = ServerState::new();
        let bad = densenet().with_worker_bounds(4, 1);

        let err = state.insert_model("densenet161", vec![bad]).unwrap_err();
        assert!(matches!(err, ServerError::InvalidState(_)));
    }

    #[test]
    fn test_kind_suffix_lookup() {
        for kind in SnapshotKind::ALL {
            assert_eq!(SnapshotKind::from_file_suffix(kind.file_suffix()), Some(kind));
            assert_eq!(SnapshotKind::from_label(kind.label()), Some(kind));
        }
        assert!(!SnapshotKind::Shutdown.is_restorable());
    }
}
