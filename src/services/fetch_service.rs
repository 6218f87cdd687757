use crate::config::FetchSettings;
use crate::error::{AppError, Result};
use crate::services::image_service;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Fetches images by URL and memoizes successful loads for the process lifetime.
///
/// Cached values are the normalized image re-encoded as PNG, which is also
/// what the session stores for URL loads.
pub struct UrlFetcher {
    client: Client,
    cache: Mutex<HashMap<String, Vec<u8>>>,
}

impl UrlFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            client,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Returns PNG bytes of the upright RGB image found at `url`.
    pub async fn load(&self, url: &str) -> Result<Vec<u8>> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::InvalidUrl("URL is empty".to_string()));
        }

        let cached = self.cache.lock()?.get(url).cloned();
        if let Some(hit) = cached {
            log::debug!("URL cache hit: {}", url);
            return Ok(hit);
        }

        let body = self.fetch_bytes(url).await?;
        let png = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let img = image_service::decode_normalized(&body)?;
            image_service::encode_png(&img)
        })
        .await??;

        self.cache.lock()?.insert(url.to_string(), png.clone());
        Ok(png)
    }

    /// Single GET. Any non-2xx status is an error; the content type is not trusted
    /// either way, decoding decides whether the body is an image.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let start = Instant::now();
        log::info!("Fetching image from {}", url);

        let response = self.client.get(url).send().await?.error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.contains("image") {
            log::warn!(
                "{} answered with content-type '{}', decoding anyway",
                url,
                content_type
            );
        }

        let bytes = response.bytes().await?;
        log::info!(
            "Fetched {} bytes from {} in {:.0}ms",
            bytes.len(),
            url,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(bytes.to_vec())
    }

    #[cfg(test)]
    fn cached_urls(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use axum::extract::State;
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Redirect};
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone)]
    struct Served {
        png: Arc<Vec<u8>>,
        hits: Arc<AtomicUsize>,
    }

    async fn png_as_html(State(served): State<Served>) -> impl IntoResponse {
        served.hits.fetch_add(1, Ordering::SeqCst);
        ([(header::CONTENT_TYPE, "text/html")], (*served.png).clone())
    }

    async fn echo_user_agent(headers: HeaderMap) -> impl IntoResponse {
        let agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if agent.starts_with("Mozilla/5.0") {
            (StatusCode::OK, fixtures::png(2, 2)).into_response()
        } else {
            StatusCode::FORBIDDEN.into_response()
        }
    }

    async fn slow() -> &'static str {
        tokio::time::sleep(Duration::from_secs(3)).await;
        "late"
    }

    async fn serve() -> (String, Served) {
        let served = Served {
            png: Arc::new(fixtures::png(64, 48)),
            hits: Arc::new(AtomicUsize::new(0)),
        };
        let app = Router::new()
            .route("/cat.png", get(png_as_html))
            .route("/moved", get(|| async { Redirect::temporary("/cat.png") }))
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .route("/page", get(|| async { "<html>not an image</html>" }))
            .route("/agent", get(echo_user_agent))
            .route("/slow", get(slow))
            .with_state(served.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), served)
    }

    fn fetcher() -> UrlFetcher {
        UrlFetcher::new(&FetchSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn decodes_despite_html_content_type() {
        let (base, _) = serve().await;
        let png = fetcher().load(&format!("{}/cat.png", base)).await.unwrap();
        let img = image_service::decode_normalized(&png).unwrap();
        assert_eq!(img.dimensions(), (64, 48));
    }

    #[tokio::test]
    async fn repeated_url_is_served_from_memo() {
        let (base, served) = serve().await;
        let fetcher = fetcher();
        let url = format!("{}/cat.png", base);

        let first = fetcher.load(&url).await.unwrap();
        let second = fetcher.load(&url).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(served.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn follows_redirects() {
        let (base, _) = serve().await;
        assert!(fetcher().load(&format!("{}/moved", base)).await.is_ok());
    }

    #[tokio::test]
    async fn not_found_is_an_error_and_not_cached() {
        let (base, _) = serve().await;
        let fetcher = fetcher();
        let err = fetcher.load(&format!("{}/missing", base)).await.unwrap_err();
        assert!(matches!(err, AppError::Http(ref e) if e.status() == Some(reqwest::StatusCode::NOT_FOUND)));
        assert_eq!(fetcher.cached_urls(), 0);
    }

    #[tokio::test]
    async fn html_body_fails_at_decode() {
        let (base, _) = serve().await;
        let err = fetcher().load(&format!("{}/page", base)).await.unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }

    #[tokio::test]
    async fn sends_browser_user_agent() {
        let (base, _) = serve().await;
        assert!(fetcher().load(&format!("{}/agent", base)).await.is_ok());
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let (base, _) = serve().await;
        let settings = FetchSettings {
            timeout_secs: 1,
            ..FetchSettings::default()
        };
        let err = UrlFetcher::new(&settings)
            .unwrap()
            .load(&format!("{}/slow", base))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Http(ref e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn empty_and_unreachable_urls_fail() {
        let fetcher = fetcher();
        assert!(matches!(fetcher.load("   ").await, Err(AppError::InvalidUrl(_))));
        assert!(matches!(
            fetcher.load("http://127.0.0.1:1/cat.png").await,
            Err(AppError::Http(_))
        ));
    }
}
