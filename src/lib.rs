pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

#[cfg(test)]
mod fixtures;

use config::Settings;
use services::classifier::model_manager::ModelManager;
use services::fetch_service::UrlFetcher;
use services::session::Session;
use tauri::Manager;

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    tauri::Builder::default()
        .setup(|app| {
            let app_data_dir = app.path().app_data_dir()?;
            if !app_data_dir.exists() {
                std::fs::create_dir_all(&app_data_dir)?;
            }

            let settings = Settings::load_or_default(&app_data_dir);
            app.manage(UrlFetcher::new(&settings.fetch)?);

            let model_manager = ModelManager::new(app_data_dir, settings.model.clone());
            app.manage(model_manager.clone());
            app.manage(Session::default());
            app.manage(settings);

            // Warm the model in the background so the first Classify is fast.
            let app_handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                let _ = commands::classifier::warm_up(&app_handle, &model_manager).await;
            });

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::image::upload_image,
            commands::image::load_from_url,
            commands::image::get_view,
            commands::classifier::get_model_status,
            commands::classifier::get_control_defaults,
            commands::classifier::load_model,
            commands::classifier::classify,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
