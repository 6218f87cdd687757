use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::models::classify_types::{ClassifyOutcome, Controls, ModelStatus, Prediction};
use crate::services::classifier::model_manager::{ModelManager, ProgressFn};
use crate::services::classifier::{preprocess, ranking};
use crate::services::image_service;
use crate::services::session::Session;
use std::time::Instant;
use tauri::{AppHandle, Emitter, State};

#[tauri::command]
pub async fn get_model_status(model_manager: State<'_, ModelManager>) -> Result<ModelStatus> {
    Ok(model_manager.status())
}

#[tauri::command]
pub fn get_control_defaults(settings: State<'_, Settings>) -> Controls {
    settings.controls
}

#[tauri::command]
pub async fn load_model(app: AppHandle, model_manager: State<'_, ModelManager>) -> Result<()> {
    warm_up(&app, &model_manager).await
}

#[tauri::command]
pub async fn classify(
    app: AppHandle,
    controls: Controls,
    session: State<'_, Session>,
    model_manager: State<'_, ModelManager>,
) -> Result<ClassifyOutcome> {
    let progress = move |percent: u64| {
        let _ = app.emit("download-progress", percent);
    };
    classify_current(&session, &model_manager, controls, &progress)
        .await
        .inspect_err(|e| log::warn!("Classification failed: {}", e))
}

/// Loads the model if needed, reporting each phase as a `model-status` event.
pub async fn warm_up(app: &AppHandle, model_manager: &ModelManager) -> Result<()> {
    if model_manager.is_ready() {
        return Ok(());
    }

    let phase = if model_manager.is_downloaded() { "loading" } else { "downloading" };
    let _ = app.emit("model-status", serde_json::json!({ "status": phase }));

    let handle = app.clone();
    let progress = move |percent: u64| {
        let _ = handle.emit("download-progress", percent);
    };

    match model_manager.get_or_load(&progress).await {
        Ok(_) => {
            let _ = app.emit("model-status", serde_json::json!({ "status": "ready" }));
            Ok(())
        }
        Err(e) => {
            log::error!("Model warm-up failed: {}", e);
            let _ = app.emit(
                "model-status",
                serde_json::json!({ "status": "error", "message": e.to_string() }),
            );
            Err(e)
        }
    }
}

/// Classifies the session's current image with the given controls.
pub async fn classify_current(
    session: &Session,
    model_manager: &ModelManager,
    controls: Controls,
    progress: &ProgressFn,
) -> Result<ClassifyOutcome> {
    controls.validate()?;
    let stored = session.snapshot()?.ok_or(AppError::NoImage)?;

    let classifier = model_manager.get_or_load(progress).await?;

    let start = Instant::now();
    let worker = classifier.clone();
    let bytes = stored.bytes.clone();
    let ranked = tokio::task::spawn_blocking(move || -> Result<Vec<Prediction>> {
        let img = image_service::decode_normalized(&bytes)?;
        let tensor =
            preprocess::preprocess_image(&img, controls.center_crop, worker.normalization())?;
        worker.classify(tensor)
    })
    .await??;

    let predictions = ranking::filter_predictions(&ranked, controls.top_k, controls.threshold);
    log::info!(
        "Classified {} image in {:.0}ms: {} of {} labels shown",
        stored.source,
        start.elapsed().as_secs_f64() * 1000.0,
        predictions.len(),
        ranked.len()
    );

    Ok(ClassifyOutcome {
        predictions,
        vocabulary_size: classifier.vocabulary_size(),
        source: stored.source.to_string(),
    })
}
