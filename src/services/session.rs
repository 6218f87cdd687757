use crate::error::Result;
use crate::models::view_types::ImageSource;
use std::sync::{Arc, Mutex};

/// The image currently held by the session, as encoded bytes.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub bytes: Arc<[u8]>,
    pub source: ImageSource,
}

#[derive(Debug, Default)]
pub struct SessionState {
    current: Option<StoredImage>,
}

impl SessionState {
    /// Replaces bytes and source together.
    pub fn replace(&mut self, bytes: Vec<u8>, source: ImageSource) {
        self.current = Some(StoredImage {
            bytes: bytes.into(),
            source,
        });
    }

    pub fn current(&self) -> Option<&StoredImage> {
        self.current.as_ref()
    }
}

/// Session state as held in Tauri's managed state; one webview window, one session.
#[derive(Default)]
pub struct Session {
    state: Mutex<SessionState>,
}

impl Session {
    pub fn snapshot(&self) -> Result<Option<StoredImage>> {
        Ok(self.state.lock()?.current().cloned())
    }

    pub fn replace(&self, bytes: Vec<u8>, source: ImageSource) -> Result<()> {
        self.state.lock()?.replace(bytes, source);
        Ok(())
    }

    /// Runs a load and stores its bytes only if it succeeded.
    ///
    /// The lock is not held while `load` runs, so a slow fetch never blocks
    /// readers, and a failed load leaves the previous image in place.
    pub async fn load_with<F, Fut>(&self, source: ImageSource, load: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<u8>>>,
    {
        let bytes = load().await?;
        self.replace(bytes, source)
    }
}
