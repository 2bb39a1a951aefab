//! File Workspace - 本地 so-vits-svc 工作区
//!
//! 实现 WorkspacePort trait

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::application::ports::{ClearableEntry, WorkspaceError, WorkspacePort};
use crate::domain::{
    generator_checkpoint_step, ClearTarget, PipelineLayout, TrainingConfig, TRAIN_LOG_KEEP,
};

/// 文件系统工作区
pub struct FileWorkspace {
    layout: PipelineLayout,
}

impl FileWorkspace {
    pub fn new(layout: PipelineLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }

    /// 目录下的条目；目录不存在时返回空
    async fn list_dir(dir: &Path) -> Result<Vec<(PathBuf, bool)>, WorkspaceError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WorkspaceError::IoError(e.to_string())),
        };

        let mut result = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkspaceError::IoError(e.to_string()))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            result.push((entry.path(), is_dir));
        }
        result.sort();
        Ok(result)
    }
}

#[async_trait]
impl WorkspacePort for FileWorkspace {
    async fn load_training_config(&self) -> Result<TrainingConfig, WorkspaceError> {
        let log_copy = self.layout.training_config_log();
        let path = if fs::try_exists(&log_copy).await.unwrap_or(false) {
            log_copy
        } else {
            self.layout.training_config()
        };

        let text = fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                WorkspaceError::FileNotFound(path.to_string_lossy().to_string())
            }
            _ => WorkspaceError::IoError(e.to_string()),
        })?;

        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| WorkspaceError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        TrainingConfig::from_value(value).ok_or_else(|| {
            WorkspaceError::InvalidConfig(format!("{}: not a JSON object", path.display()))
        })
    }

    async fn save_training_config(&self, config: &TrainingConfig) -> Result<(), WorkspaceError> {
        let path = self.layout.training_config();
        if let Some(parent) = path.parent() {
            self.ensure_dir(parent).await?;
        }

        let text = serde_json::to_string_pretty(config.as_map())
            .map_err(|e| WorkspaceError::InvalidConfig(e.to_string()))?;
        fs::write(&path, text)
            .await
            .map_err(|e| WorkspaceError::IoError(e.to_string()))?;

        tracing::debug!(path = %path.display(), "Training config saved");
        Ok(())
    }

    async fn is_resuming(&self) -> bool {
        fs::try_exists(self.layout.training_config_log())
            .await
            .unwrap_or(false)
    }

    async fn latest_generator_checkpoint(&self) -> Result<Option<PathBuf>, WorkspaceError> {
        let entries = Self::list_dir(&self.layout.train_log_dir()).await?;
        Ok(entries
            .into_iter()
            .filter(|(_, is_dir)| !is_dir)
            .filter_map(|(path, _)| {
                let step = generator_checkpoint_step(path.file_name()?.to_str()?)?;
                Some((step, path))
            })
            .max_by_key(|(step, _)| *step)
            .map(|(_, path)| path))
    }

    async fn has_sliced_speakers(&self) -> Result<bool, WorkspaceError> {
        let entries = Self::list_dir(&self.layout.slice_out_dir()).await?;
        Ok(entries.iter().any(|(_, is_dir)| *is_dir))
    }

    async fn clearable_entries(
        &self,
        target: ClearTarget,
    ) -> Result<Vec<ClearableEntry>, WorkspaceError> {
        let entries = Self::list_dir(&self.layout.clear_dir(target)).await?;
        Ok(entries
            .into_iter()
            .filter(|(path, _)| {
                target != ClearTarget::Train
                    || !path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| TRAIN_LOG_KEEP.contains(&name))
            })
            .map(|(path, is_dir)| ClearableEntry { path, is_dir })
            .collect())
    }

    async fn stage_inference_inputs(&self, files: &[PathBuf]) -> Result<Vec<String>, WorkspaceError> {
        let input_dir = self.layout.inference_input_dir();
        self.ensure_dir(&input_dir).await?;

        let mut names = Vec::with_capacity(files.len());
        for file in files {
            let name = file
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| WorkspaceError::FileNotFound(file.to_string_lossy().to_string()))?;

            let target = input_dir.join(name);
            if target != *file {
                fs::copy(file, &target).await.map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => {
                        WorkspaceError::FileNotFound(file.to_string_lossy().to_string())
                    }
                    _ => WorkspaceError::IoError(e.to_string()),
                })?;
            }
            names.push(name.to_string());
        }

        tracing::debug!(count = names.len(), dir = %input_dir.display(), "Inference inputs staged");
        Ok(names)
    }

    async fn ensure_dir(&self, dir: &Path) -> Result<(), WorkspaceError> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| WorkspaceError::IoError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, FileWorkspace) {
        let dir = tempfile::tempdir().unwrap();
        let layout = PipelineLayout {
            python_exe: PathBuf::from("python"),
            slicer_script: PathBuf::from("slicer.py"),
            svc_dir: dir.path().join("so-vits-svc"),
            results_dir: dir.path().join("results"),
            model_name: "44k".to_string(),
        };
        (dir, FileWorkspace::new(layout))
    }

    #[tokio::test]
    async fn test_config_round_trip_and_resume_preference() {
        let (_dir, ws) = workspace();
        assert!(matches!(
            ws.load_training_config().await,
            Err(WorkspaceError::FileNotFound(_))
        ));

        let config = TrainingConfig::from_value(json!({"train": {"batch_size": 4}})).unwrap();
        ws.save_training_config(&config).await.unwrap();
        assert_eq!(ws.load_training_config().await.unwrap(), config);
        assert!(!ws.is_resuming().await);

        let log_copy = ws.layout().training_config_log();
        std::fs::create_dir_all(log_copy.parent().unwrap()).unwrap();
        std::fs::write(&log_copy, r#"{"train": {"batch_size": 8}}"#).unwrap();
        assert!(ws.is_resuming().await);
        assert_eq!(
            ws.load_training_config().await.unwrap().as_map()["train"]["batch_size"],
            8
        );
    }

    #[tokio::test]
    async fn test_invalid_config() {
        let (_dir, ws) = workspace();
        let path = ws.layout().training_config();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            ws.load_training_config().await,
            Err(WorkspaceError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_latest_generator_checkpoint() {
        let (_dir, ws) = workspace();
        assert_eq!(ws.latest_generator_checkpoint().await.unwrap(), None);

        let logs = ws.layout().train_log_dir();
        std::fs::create_dir_all(&logs).unwrap();
        for name in ["G_0.pth", "G_800.pth", "G_1600.pth", "D_1600.pth", "G_x.pth"] {
            std::fs::write(logs.join(name), b"").unwrap();
        }
        assert_eq!(
            ws.latest_generator_checkpoint().await.unwrap(),
            Some(logs.join("G_1600.pth"))
        );
    }

    #[tokio::test]
    async fn test_train_clear_keeps_base_models() {
        let (_dir, ws) = workspace();
        let logs = ws.layout().train_log_dir();
        std::fs::create_dir_all(logs.join("diffusion")).unwrap();
        std::fs::create_dir_all(logs.join("eval")).unwrap();
        for name in ["G_0.pth", "D_0.pth", "G_800.pth", "config.json"] {
            std::fs::write(logs.join(name), b"").unwrap();
        }

        let names: Vec<String> = ws
            .clearable_entries(ClearTarget::Train)
            .await
            .unwrap()
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["G_800.pth", "config.json", "eval"]);
    }

    #[tokio::test]
    async fn test_slice_clear_and_speaker_detection() {
        let (_dir, ws) = workspace();
        assert!(!ws.has_sliced_speakers().await.unwrap());
        assert!(ws.clearable_entries(ClearTarget::Slice).await.unwrap().is_empty());

        std::fs::create_dir_all(ws.layout().slice_out_dir().join("alice")).unwrap();
        assert!(ws.has_sliced_speakers().await.unwrap());

        let entries = ws.clearable_entries(ClearTarget::Slice).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_dir);
    }

    #[tokio::test]
    async fn test_stage_inference_inputs() {
        let (dir, ws) = workspace();
        let source = dir.path().join("song.wav");
        std::fs::write(&source, b"RIFF").unwrap();

        let names = ws.stage_inference_inputs(&[source]).await.unwrap();
        assert_eq!(names, vec!["song.wav"]);
        assert_eq!(
            std::fs::read(ws.layout().inference_input_dir().join("song.wav")).unwrap(),
            b"RIFF"
        );

        let missing = ws
            .stage_inference_inputs(&[dir.path().join("missing.wav")])
            .await;
        assert!(matches!(missing, Err(WorkspaceError::FileNotFound(_))));
    }
}
