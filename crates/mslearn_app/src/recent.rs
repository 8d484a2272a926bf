use std::fs;
use std::path::{Path, PathBuf};

use mslearn_engine::{ensure_output_dir, AtomicFileWriter};
use mslearn_logging::{mslearn_error, mslearn_info, mslearn_warn};
use serde::{Deserialize, Serialize};

const STATE_FILENAME: &str = ".mslearn_state.ron";
const MAX_RECENT: usize = 10;

/// Recently used inputs, kept next to the datasets they produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentState {
    pub url_lists: Vec<String>,
    pub categories: Vec<String>,
    pub last_run_utc: Option<String>,
}

impl RecentState {
    pub fn add_url_list(&mut self, path: impl Into<String>) {
        push_front_unique(&mut self.url_lists, path.into());
    }

    pub fn add_category(&mut self, category: impl Into<String>) {
        push_front_unique(&mut self.categories, category.into());
    }
}

/// Most recent first, no duplicates, at most [`MAX_RECENT`] entries.
fn push_front_unique(list: &mut Vec<String>, item: String) {
    list.retain(|existing| *existing != item);
    list.insert(0, item);
    list.truncate(MAX_RECENT);
}

pub fn load_recent(output_dir: &Path) -> RecentState {
    let path = output_dir.join(STATE_FILENAME);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return RecentState::default();
        }
        Err(err) => {
            mslearn_warn!("Failed to read recent state from {:?}: {}", path, err);
            return RecentState::default();
        }
    };

    match ron::from_str(&content) {
        Ok(state) => {
            mslearn_info!("Loaded recent state from {:?}", path);
            state
        }
        Err(err) => {
            mslearn_warn!("Failed to parse recent state from {:?}: {}", path, err);
            RecentState::default()
        }
    }
}

pub fn save_recent(output_dir: &Path, state: &RecentState) {
    if let Err(err) = ensure_output_dir(output_dir) {
        mslearn_error!("Failed to ensure output dir {:?}: {}", output_dir, err);
        return;
    }

    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(state, pretty) {
        Ok(text) => text,
        Err(err) => {
            mslearn_error!("Failed to serialize recent state: {}", err);
            return;
        }
    };

    let writer = AtomicFileWriter::new(PathBuf::from(output_dir));
    if let Err(err) = writer.write(STATE_FILENAME, content.as_bytes()) {
        mslearn_error!("Failed to write recent state to {:?}: {}", output_dir, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn recent_lists_are_most_recent_first_and_deduplicated() {
        let mut state = RecentState::default();
        state.add_url_list("file1.txt");
        state.add_url_list("file2.txt");
        state.add_url_list("file3.txt");
        state.add_url_list("file1.txt");

        assert_eq!(state.url_lists, vec!["file1.txt", "file3.txt", "file2.txt"]);
    }

    #[test]
    fn recent_lists_are_capped() {
        let mut state = RecentState::default();
        for i in 0..15 {
            state.add_category(format!("category{i}"));
        }
        assert_eq!(state.categories.len(), MAX_RECENT);
        assert_eq!(state.categories[0], "category14");
        assert_eq!(state.categories[9], "category5");
    }

    #[test]
    fn state_round_trips_through_the_output_dir() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("out");
        let mut state = RecentState::default();
        state.add_url_list("urls.csv");
        state.add_category("DNS_Administration");
        state.last_run_utc = Some("2024-05-09T12:00:00+00:00".to_string());

        save_recent(&dir, &state);

        assert!(dir.join(STATE_FILENAME).is_file());
        assert_eq!(load_recent(&dir), state);
    }

    #[test]
    fn missing_or_corrupt_state_loads_empty() {
        let temp = TempDir::new().unwrap();
        assert_eq!(load_recent(temp.path()), RecentState::default());

        fs::write(temp.path().join(STATE_FILENAME), "(((").unwrap();
        assert_eq!(load_recent(temp.path()), RecentState::default());
    }
}
