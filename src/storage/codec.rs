//! Text encoding of snapshot records.
//!
//! A record is a small properties-style header followed by the serialized
//! server state on a single `model_snapshot=` line:
//!
//! ```text
//! # modelsnap configuration snapshot
//! kind=snapshot
//! timestamp=2026-10-16T09:30:05.042Z
//! sequence=7
//! model_snapshot={"modelCount":1,"models":[...]}
//! ```

use super::record::SnapshotRecord;
use crate::core::{ModelDeployment, Result, ServerError, ServerState, SnapshotKind};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const HEADER_COMMENT: &str = "# modelsnap configuration snapshot";
const KEY_KIND: &str = "kind";
const KEY_TIMESTAMP: &str = "timestamp";
const KEY_SEQUENCE: &str = "sequence";
const KEY_STATE: &str = "model_snapshot";

// ============================================================================
// Wire Payload
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model_store: Option<String>,
    model_count: usize,
    models: Vec<ModelPayload>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelPayload {
    model_name: String,
    versions: Vec<DeploymentPayload>,
}

/// Worker counts are signed on the wire so a negative value surfaces as an
/// invalid state rather than a parse failure.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentPayload {
    model_name: String,
    version: String,
    artifact_location: String,
    worker_count: i64,
    min_workers: i64,
    max_workers: i64,
    #[serde(default)]
    default_version: bool,
}

impl From<&ModelDeployment> for DeploymentPayload {
    fn from(d: &ModelDeployment) -> Self {
        Self {
            model_name: d.model_name.clone(),
            version: d.version.clone(),
            artifact_location: d.artifact_location.clone(),
            worker_count: i64::from(d.worker_count),
            min_workers: i64::from(d.min_workers),
            max_workers: i64::from(d.max_workers),
            default_version: d.default_version,
        }
    }
}

impl DeploymentPayload {
    fn into_deployment(self) -> Result<ModelDeployment> {
        let worker_count = worker_field(&self, "workerCount", self.worker_count)?;
        let min_workers = worker_field(&self, "minWorkers", self.min_workers)?;
        let max_workers = worker_field(&self, "maxWorkers", self.max_workers)?;
        Ok(ModelDeployment {
            model_name: self.model_name,
            version: self.version,
            artifact_location: self.artifact_location,
            worker_count,
            min_workers,
            max_workers,
            default_version: self.default_version,
        })
    }
}

fn worker_field(d: &DeploymentPayload, field: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        ServerError::InvalidState(format!(
            "model '{}' version {}: {} out of range ({})",
            d.model_name, d.version, field, value
        ))
    })
}

// ============================================================================
// State Encoding
// ============================================================================

/// Serializes the state as compact JSON. Field and model order are fixed, so
/// equal states always encode to identical text.
pub fn encode_state(state: &ServerState) -> Result<String> {
    let payload = StatePayload {
        model_store: state
            .model_store()
            .map(|path| path.to_string_lossy().into_owned()),
        model_count: state.model_count(),
        models: state
            .models()
            .map(|(name, versions)| ModelPayload {
                model_name: name.to_string(),
                versions: versions.iter().map(DeploymentPayload::from).collect(),
            })
            .collect(),
    };

    serde_json::to_string(&payload)
        .map_err(|err| ServerError::InvalidState(format!("serialize server state: {}", err)))
}

pub fn decode_state(text: &str) -> Result<ServerState> {
    let payload: StatePayload = serde_json::from_str(text.trim())
        .map_err(|err| ServerError::CorruptSnapshot(format!("parse model_snapshot: {}", err)))?;

    if payload.model_count != payload.models.len() {
        return Err(ServerError::InvalidState(format!(
            "modelCount is {} but {} models are listed",
            payload.model_count,
            payload.models.len()
        )));
    }

    let mut state = ServerState::new();
    state.set_model_store(payload.model_store.map(PathBuf::from));
    for model in payload.models {
        let versions = model
            .versions
            .into_iter()
            .map(DeploymentPayload::into_deployment)
            .collect::<Result<Vec<_>>>()?;
        if versions.is_empty() {
            return Err(ServerError::InvalidState(format!(
                "model '{}' has no versions",
                model.model_name
            )));
        }
        if state.contains(&model.model_name) {
            return Err(ServerError::InvalidState(format!(
                "duplicate model name '{}'",
                model.model_name
            )));
        }
        state.insert_model(model.model_name, versions)?;
    }

    state.validate()?;
    Ok(state)
}

// ============================================================================
// Record Encoding
// ============================================================================

pub fn encode_record(record: &SnapshotRecord) -> Result<String> {
    let state = encode_state(&record.state)?;
    Ok(format!(
        "{}\n{}={}\n{}={}\n{}={}\n{}={}\n",
        HEADER_COMMENT,
        KEY_KIND,
        record.kind.label(),
        KEY_TIMESTAMP,
        record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        KEY_SEQUENCE,
        record.sequence,
        KEY_STATE,
        state
    ))
}

/// Parses a record. Unknown header keys are ignored; repeated or missing
/// required keys are corruption.
pub fn decode_record(text: &str) -> Result<SnapshotRecord> {
    let mut kind = None;
    let mut timestamp = None;
    let mut sequence = None;
    let mut state = None;

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            ServerError::CorruptSnapshot(format!("line {}: expected key=value", line_no + 1))
        })?;
        let key = key.trim();
        let value = value.trim();

        match key {
            KEY_KIND => set_once(&mut kind, key, parse_kind(value)?)?,
            KEY_TIMESTAMP => set_once(&mut timestamp, key, parse_timestamp(value)?)?,
            KEY_SEQUENCE => {
                let parsed = value.parse::<u64>().map_err(|err| {
                    ServerError::CorruptSnapshot(format!("sequence '{}': {}", value, err))
                })?;
                set_once(&mut sequence, key, parsed)?
            }
            KEY_STATE => set_once(&mut state, key, decode_state(value)?)?,
            other => tracing::debug!(key = other, "ignoring unknown snapshot header key"),
        }
    }

    Ok(SnapshotRecord {
        kind: required(kind, KEY_KIND)?,
        timestamp: required(timestamp, KEY_TIMESTAMP)?,
        sequence: required(sequence, KEY_SEQUENCE)?,
        state: required(state, KEY_STATE)?,
    })
}

fn parse_kind(value: &str) -> Result<SnapshotKind> {
    SnapshotKind::from_label(value)
        .ok_or_else(|| ServerError::CorruptSnapshot(format!("unknown snapshot kind '{}'", value)))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| ServerError::CorruptSnapshot(format!("timestamp '{}': {}", value, err)))
}

fn set_once<T>(slot: &mut Option<T>, key: &str, value: T) -> Result<()> {
    if slot.is_some() {
        return Err(ServerError::CorruptSnapshot(format!("duplicate key '{}'", key)));
    }
    *slot = Some(value);
    Ok(())
}

fn required<T>(slot: Option<T>, key: &str) -> Result<T> {
    slot.ok_or_else(|| ServerError::CorruptSnapshot(format!("missing key '{}'", key)))
}

// ============================================================================
// Tests
// ============================================================================
