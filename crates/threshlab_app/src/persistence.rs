use std::fs;
use std::path::Path;

use lab_logging::{lab_error, lab_info, lab_warn};
use serde::{Deserialize, Serialize};
use threshlab_core::SessionId;
use threshlab_engine::AtomicFileWriter;

const STATE_FILENAME: &str = ".threshlab_state.ron";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
struct PersistedState {
    session_id: Option<SessionId>,
}

/// Session id remembered from a previous invocation, if any.
pub(crate) fn load_session(state_dir: &Path) -> Option<SessionId> {
    let path = state_dir.join(STATE_FILENAME);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            lab_warn!("Failed to read persisted state from {:?}: {}", path, err);
            return None;
        }
    };

    match ron::from_str::<PersistedState>(&content) {
        Ok(state) => {
            lab_info!("Loaded persisted state from {:?}", path);
            state.session_id
        }
        Err(err) => {
            lab_warn!("Failed to parse persisted state from {:?}: {}", path, err);
            None
        }
    }
}

pub(crate) fn save_session(state_dir: &Path, session_id: &SessionId) {
    let state = PersistedState {
        session_id: Some(session_id.clone()),
    };
    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(&state, pretty) {
        Ok(text) => text,
        Err(err) => {
            lab_error!("Failed to serialize persisted state: {}", err);
            return;
        }
    };

    let writer = AtomicFileWriter::new(state_dir.to_path_buf());
    if let Err(err) = writer.write(STATE_FILENAME, content.as_bytes()) {
        lab_error!("Failed to write persisted state to {:?}: {}", state_dir, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_survives_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_session(dir.path()), None);

        save_session(dir.path(), &SessionId::new("abc123"));
        assert_eq!(load_session(dir.path()), Some(SessionId::new("abc123")));
    }

    #[test]
    fn corrupt_state_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(STATE_FILENAME), "not ron at all (").unwrap();

        assert_eq!(load_session(dir.path()), None);
    }
}
