// src/persistence.rs

//! App-state persistence: a single JSON file capturing tempo, per-track
//! engine selection/volume, and pattern data, so a host can restore a
//! session. Grounded on the teacher's `settings.rs` load/save pair, trimmed
//! down to the state this crate actually owns (no MIDI mapping, no UI
//! theme/device settings — those belong to the host application, not the
//! audio core).

use crate::config::MAX_TRACKS;
use crate::engine::EngineKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TrackState {
    pub engine_kind: EngineKind,
    pub volume: f32,
    pub pan: f32,
    pub pattern_length: usize,
}

impl Default for TrackState {
    fn default() -> Self {
        Self {
            engine_kind: EngineKind::Wavetable,
            volume: 0.8,
            pan: 0.0,
            pattern_length: 16,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AppState {
    pub tempo_bpm: f32,
    pub swing: f32,
    pub master_volume: f32,
    pub tracks: Vec<TrackState>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            tempo_bpm: 120.0,
            swing: 0.0,
            master_volume: 0.8,
            tracks: vec![TrackState::default(); MAX_TRACKS],
        }
    }
}

pub fn save_app_state(path: &Path, state: &AppState) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn load_app_state(path: &Path) -> AppState {
    if !path.exists() {
        return AppState::default();
    }
    match fs::read_to_string(path) {
        Ok(json) => match serde_json::from_str(&json) {
            Ok(state) => state,
            Err(e) => {
                log::warn!("failed to parse app state at {}: {e}, using defaults", path.display());
                AppState::default()
            }
        },
        Err(e) => {
            log::warn!("failed to read app state at {}: {e}, using defaults", path.display());
            AppState::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does_not_exist.json");
        let state = load_app_state(&path);
        assert_eq!(state.tracks.len(), MAX_TRACKS);
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut state = AppState::default();
        state.tempo_bpm = 140.0;
        save_app_state(&path, &state).unwrap();
        let loaded = load_app_state(&path);
        assert_eq!(loaded.tempo_bpm, 140.0);
    }
}
