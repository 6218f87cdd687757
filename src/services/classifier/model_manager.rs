use crate::config::ModelSettings;
use crate::error::{AppError, Result};
use crate::models::classify_types::ModelStatus;
use crate::services::classifier::inference::Classifier;
use crate::services::classifier::ranking;
use futures::StreamExt;
use ort::session::Session;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::OnceCell;

/// Download progress in percent.
pub type ProgressFn = dyn Fn(u64) + Send + Sync;

/// Owns the process-wide classifier: downloaded on demand, loaded once, then shared.
#[derive(Clone)]
pub struct ModelManager {
    pub model_dir: PathBuf,
    settings: ModelSettings,
    classifier: Arc<OnceCell<Arc<Classifier>>>,
    loading: Arc<AtomicBool>,
    error: Arc<Mutex<Option<String>>>,
}

impl ModelManager {
    pub fn new(app_data_dir: PathBuf, settings: ModelSettings) -> Self {
        let model_dir = app_data_dir.join("models");
        Self {
            model_dir,
            settings,
            classifier: Arc::new(OnceCell::new()),
            loading: Arc::new(AtomicBool::new(false)),
            error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.settings.model_file)
    }

    pub fn labels_path(&self) -> PathBuf {
        self.model_dir.join(&self.settings.labels_file)
    }

    pub fn is_downloaded(&self) -> bool {
        self.model_path().exists() && self.labels_path().exists()
    }

    pub fn is_ready(&self) -> bool {
        self.classifier.initialized()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Relaxed)
    }

    pub fn get_error(&self) -> Option<String> {
        self.error.lock().ok().and_then(|e| e.clone())
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            downloaded: self.is_downloaded(),
            loading: self.is_loading(),
            ready: self.is_ready(),
            error: self.get_error(),
        }
    }

    /// Returns the shared classifier, downloading and loading it on first use.
    ///
    /// Concurrent first callers wait on the same initialization. A failure
    /// leaves the cell empty so the next call retries.
    pub async fn get_or_load(&self, progress: &ProgressFn) -> Result<Arc<Classifier>> {
        let classifier = self
            .classifier
            .get_or_try_init(|| async {
                self.loading.store(true, Ordering::Relaxed);
                let result = self.download_and_load(progress).await;
                self.loading.store(false, Ordering::Relaxed);

                if let Ok(mut error) = self.error.lock() {
                    *error = result.as_ref().err().map(|e| e.to_string());
                }
                result.map(Arc::new)
            })
            .await?;
        Ok(classifier.clone())
    }

    async fn download_and_load(&self, progress: &ProgressFn) -> Result<Classifier> {
        self.download_model(progress).await?;
        self.do_load_model().await
    }

    pub async fn download_model(&self, progress: &ProgressFn) -> Result<()> {
        if self.is_downloaded() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.model_dir).await?;
        let client = reqwest::Client::new();

        let labels_path = self.labels_path();
        if !labels_path.exists() {
            download_file(&client, &self.settings.labels_url, &labels_path, progress).await?;
        }

        let model_path = self.model_path();
        if !model_path.exists() {
            download_file(&client, &self.settings.model_url, &model_path, progress).await?;
        }

        Ok(())
    }

    async fn do_load_model(&self) -> Result<Classifier> {
        let start = Instant::now();

        let labels_path = self.labels_path();
        let config_content = tokio::fs::read_to_string(&labels_path).await.map_err(|e| {
            AppError::Model(format!(
                "Failed to read config file {}: {}",
                labels_path.display(),
                e
            ))
        })?;
        let labels = ranking::parse_labels(&config_content)?;

        let model_path = self.model_path();
        let use_gpu = self.settings.use_gpu;
        let intra_threads = self.settings.intra_threads;
        let session = tokio::task::spawn_blocking(move || -> Result<Session> {
            let _ = ort::init().with_name("image-classifier").commit();

            let mut builder = Session::builder()
                .map_err(|e| AppError::Model(format!("Failed to create session builder: {}", e)))?
                .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
                .map_err(|e| AppError::Model(format!("Failed to set optimization level: {}", e)))?
                .with_intra_threads(intra_threads)
                .map_err(|e| AppError::Model(format!("Failed to set intra threads: {}", e)))?;

            if use_gpu {
                builder = builder
                    .with_execution_providers([
                        ort::execution_providers::DirectMLExecutionProvider::default().build(),
                        ort::execution_providers::CoreMLExecutionProvider::default().build(),
                        ort::execution_providers::CUDAExecutionProvider::default().build(),
                        ort::execution_providers::CPUExecutionProvider::default().build(),
                    ])
                    .map_err(|e| {
                        AppError::Model(format!("Failed to register GPU execution providers: {}", e))
                    })?;
            } else {
                builder = builder
                    .with_execution_providers([
                        ort::execution_providers::CPUExecutionProvider::default().build(),
                    ])
                    .map_err(|e| {
                        AppError::Model(format!("Failed to register CPU execution provider: {}", e))
                    })?;
            }

            builder
                .commit_from_file(model_path)
                .map_err(|e| AppError::Model(format!("Failed to load ONNX model: {}", e)))
        })
        .await??;

        log::info!(
            "Loaded {} ({} labels) in {:.0}ms",
            self.settings.name,
            labels.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(Classifier::new(session, labels, &self.settings))
    }
}

/// Streams `url` into `dest` through a `.part` file, so a partial download is
/// never taken for a complete one.
async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    progress: &ProgressFn,
) -> Result<()> {
    log::info!("Downloading {} to {}", url, dest.display());
    let response = client.get(url).send().await?.error_for_status()?;

    let total_size = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let part_path = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&part_path).await?;

    let mut stream = response.bytes_stream();
    let mut last_emit = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(e.into());
            }
        };
        downloaded += chunk.len() as u64;
        tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await?;

        if total_size > 0 {
            let percent = (downloaded * 100) / total_size;
            if percent > last_emit {
                progress(percent);
                last_emit = percent;
            }
        }
    }
    tokio::io::AsyncWriteExt::flush(&mut file).await?;
    drop(file);

    tokio::fs::rename(&part_path, dest).await?;
    progress(100);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    async fn serve() -> String {
        let app = Router::new()
            .route("/config.json", get(|| async { r#"{"id2label":{"0":"tench"}}"# }))
            .route("/gone", get(|| async { StatusCode::GONE }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn fresh_manager_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path().to_path_buf(), ModelSettings::default());
        let status = manager.status();
        assert!(!status.downloaded);
        assert!(!status.loading);
        assert!(!status.ready);
        assert!(status.error.is_none());
        assert!(manager.model_path().starts_with(dir.path().join("models")));
    }

    #[tokio::test]
    async fn download_writes_file_and_reports_completion() {
        let base = serve().await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("config.json");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let progress = {
            let seen = Arc::clone(&seen);
            move |p: u64| seen.lock().unwrap().push(p)
        };

        download_file(&reqwest::Client::new(), &format!("{}/config.json", base), &dest, &progress)
            .await
            .unwrap();

        let labels = ranking::parse_labels(&std::fs::read_to_string(&dest).unwrap()).unwrap();
        assert_eq!(labels, vec!["tench"]);
        assert!(!dest.with_extension("part").exists());
        assert_eq!(seen.lock().unwrap().last(), Some(&100));
    }

    #[tokio::test]
    async fn failed_download_leaves_nothing_behind() {
        let base = serve().await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.onnx");

        let result =
            download_file(&reqwest::Client::new(), &format!("{}/gone", base), &dest, &|_| {}).await;
        assert!(matches!(result, Err(AppError::Http(_))));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn failed_load_is_reported_and_retryable() {
        let base = serve().await;
        let dir = tempfile::tempdir().unwrap();
        let settings = ModelSettings {
            model_url: format!("{}/gone", base),
            labels_url: format!("{}/config.json", base),
            ..ModelSettings::default()
        };
        let manager = ModelManager::new(dir.path().to_path_buf(), settings);

        assert!(manager.get_or_load(&|_| {}).await.is_err());
        let status = manager.status();
        assert!(!status.ready);
        assert!(!status.loading);
        assert!(status.error.is_some());
        // The labels file made it; the model did not.
        assert!(manager.labels_path().exists());
        assert!(!manager.is_downloaded());

        assert!(manager.get_or_load(&|_| {}).await.is_err());
    }
}
