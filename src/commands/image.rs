use crate::error::{AppError, Result};
use crate::models::view_types::{ImageSource, PreviewImage, ViewState, INFO_READY};
use crate::services::fetch_service::UrlFetcher;
use crate::services::image_service;
use crate::services::session::{Session, StoredImage};
use percent_encoding::percent_decode_str;
use tauri::ipc::{InvokeBody, Request};
use tauri::State;

/// Header carrying the uploaded file's name next to its raw bytes.
pub const FILE_NAME_HEADER: &str = "x-file-name";

#[tauri::command]
pub async fn upload_image(
    request: Request<'_>,
    session: State<'_, Session>,
) -> Result<ViewState> {
    let InvokeBody::Raw(bytes) = request.body() else {
        return Err(AppError::Internal("Upload body must be raw bytes".to_string()));
    };
    let file_name = decode_file_name(
        request
            .headers()
            .get(FILE_NAME_HEADER)
            .and_then(|v| v.to_str().ok()),
    );

    store_upload(&session, &file_name, bytes.clone())
        .await
        .inspect_err(|e| log::warn!("Failed to read uploaded image {}: {}", file_name, e))?;
    render_view(&session).await
}

/// The webview percent-encodes the name so non-ASCII names survive the header.
fn decode_file_name(header: Option<&str>) -> String {
    header
        .map(|raw| percent_decode_str(raw).decode_utf8_lossy().into_owned())
        .unwrap_or_default()
}

#[tauri::command]
pub async fn load_from_url(
    url: String,
    session: State<'_, Session>,
    fetcher: State<'_, UrlFetcher>,
) -> Result<ViewState> {
    store_url(&session, &fetcher, &url)
        .await
        .inspect_err(|e| log::warn!("Failed to load from URL {}: {}", url, e))?;
    render_view(&session).await
}

#[tauri::command]
pub async fn get_view(session: State<'_, Session>) -> Result<ViewState> {
    render_view(&session).await
}

/// Validates an upload by decoding it, then keeps the original bytes.
pub async fn store_upload(session: &Session, file_name: &str, bytes: Vec<u8>) -> Result<()> {
    image_service::check_upload_extension(file_name)?;
    session
        .load_with(ImageSource::File, || async move {
            tokio::task::spawn_blocking(move || {
                image_service::decode_normalized(&bytes).map(|_| bytes)
            })
            .await?
        })
        .await
}

pub async fn store_url(session: &Session, fetcher: &UrlFetcher, url: &str) -> Result<()> {
    session
        .load_with(ImageSource::Url, || fetcher.load(url))
        .await
}

/// Redecodes whatever the session holds. A decode failure is part of the view,
/// not an error of the call.
pub async fn render_view(session: &Session) -> Result<ViewState> {
    let Some(stored) = session.snapshot()? else {
        return Ok(ViewState::empty());
    };
    Ok(tokio::task::spawn_blocking(move || build_view(&stored)).await?)
}

fn build_view(stored: &StoredImage) -> ViewState {
    let preview = image_service::decode_normalized(&stored.bytes).and_then(|img| {
        let png = image_service::encode_png(&img)?;
        Ok(PreviewImage {
            data_uri: image_service::png_data_uri(&png),
            caption: format!("Source: {}", stored.source),
            width: img.width(),
            height: img.height(),
        })
    });

    match preview {
        Ok(image) => ViewState {
            image: Some(image),
            error: None,
            info: INFO_READY.to_string(),
        },
        Err(e) => {
            log::error!("Could not decode image from memory: {}", e);
            ViewState {
                error: Some(format!("Could not decode image from memory: {}", e)),
                ..ViewState::empty()
            }
        }
    }
}
