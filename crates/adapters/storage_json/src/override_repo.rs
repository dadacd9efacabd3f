//! JSON file implementation of [`OverrideRepository`].

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use schedule_state_app::ports::OverrideRepository;
use schedule_state_domain::error::ScheduleError;
use schedule_state_domain::id::ScheduleId;

use crate::error::StorageError;

/// On-disk shape of one schedule's overrides.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    overrides: Vec<serde_json::Value>,
}

/// Directory-backed override repository.
///
/// Records are stored as-is; validating them is up to the caller, so one
/// malformed record never hides the others.
#[derive(Debug, Clone)]
pub struct JsonOverrideRepository {
    directory: PathBuf,
}

impl JsonOverrideRepository {
    /// Create a repository storing its documents in `directory`. The
    /// directory is created on first save.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the document holding the overrides of `schedule`.
    #[must_use]
    pub fn path_for(&self, schedule: ScheduleId) -> PathBuf {
        self.directory.join(format!("{schedule}.json"))
    }
}

async fn read_document(path: PathBuf) -> Result<Document, StorageError> {
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Document::default()),
        Err(err) => Err(err.into()),
    }
}

async fn write_document(
    directory: &Path,
    path: PathBuf,
    document: &Document,
) -> Result<(), StorageError> {
    tokio::fs::create_dir_all(directory).await?;
    let bytes = serde_json::to_vec_pretty(document)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(())
}

impl OverrideRepository for JsonOverrideRepository {
    fn load(
        &self,
        schedule: ScheduleId,
    ) -> impl Future<Output = Result<Vec<serde_json::Value>, ScheduleError>> + Send {
        let path = self.path_for(schedule);
        async move {
            let document = read_document(path).await?;
            tracing::debug!(%schedule, count = document.overrides.len(), "overrides loaded");
            Ok(document.overrides)
        }
    }

    fn save(
        &self,
        schedule: ScheduleId,
        records: Vec<serde_json::Value>,
    ) -> impl Future<Output = Result<(), ScheduleError>> + Send {
        let directory = self.directory.clone();
        let path = self.path_for(schedule);
        async move {
            let count = records.len();
            let document = Document { overrides: records };
            write_document(&directory, path, &document).await?;
            tracing::debug!(%schedule, count, "overrides saved");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, JsonOverrideRepository) {
        let dir = TempDir::new().unwrap();
        let repo = JsonOverrideRepository::new(dir.path().join("overrides"));
        (dir, repo)
    }

    fn record(id: &str, state: &str) -> serde_json::Value {
        json!({
            "id": id,
            "state": state,
            "start": "10:00:00",
            "end": "11:00:00",
            "expires": "2024-03-10T11:00:30",
        })
    }

    #[tokio::test]
    async fn should_load_nothing_when_file_is_missing() {
        let (_dir, repo) = setup();
        let records = repo.load(ScheduleId::from_name("heating")).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn should_save_and_load_records_per_schedule() {
        let (_dir, repo) = setup();
        let heating = ScheduleId::from_name("heating");
        let lights = ScheduleId::from_name("lights");

        repo.save(heating, vec![record("a", "boost"), record("b", "eco")])
            .await
            .unwrap();
        repo.save(lights, vec![record("c", "on")]).await.unwrap();

        let loaded = repo.load(heating).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0]["state"], "boost");
        assert_eq!(repo.load(lights).await.unwrap()[0]["id"], "c");
    }

    #[tokio::test]
    async fn should_replace_previous_document_on_save() {
        let (_dir, repo) = setup();
        let id = ScheduleId::from_name("heating");
        repo.save(id, vec![record("a", "boost")]).await.unwrap();
        repo.save(id, Vec::new()).await.unwrap();

        assert!(repo.load(id).await.unwrap().is_empty());
        assert!(!repo.path_for(id).with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn should_write_overrides_key() {
        let (_dir, repo) = setup();
        let id = ScheduleId::from_name("heating");
        repo.save(id, vec![record("a", "boost")]).await.unwrap();

        let raw = std::fs::read_to_string(repo.path_for(id)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["overrides"][0]["state"], "boost");
    }

    #[tokio::test]
    async fn should_return_records_untouched_even_when_malformed() {
        let (_dir, repo) = setup();
        let id = ScheduleId::from_name("heating");
        std::fs::create_dir_all(repo.directory()).unwrap();
        std::fs::write(
            repo.path_for(id),
            r#"{"overrides": [{"id": "a"}, 42, {"id": "b", "state": "on"}]}"#,
        )
        .unwrap();

        let loaded = repo.load(id).await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[1], json!(42));
    }

    #[tokio::test]
    async fn should_fail_with_storage_error_on_corrupt_document() {
        let (_dir, repo) = setup();
        let id = ScheduleId::from_name("heating");
        std::fs::create_dir_all(repo.directory()).unwrap();
        std::fs::write(repo.path_for(id), "not json").unwrap();

        let result = repo.load(id).await;
        assert!(matches!(result, Err(ScheduleError::Storage(_))));
    }
}
