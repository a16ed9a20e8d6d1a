//! Hosted image cleanup.
//!
//! Uploads happen client-side; the API stores URLs and only ever asks the
//! host to delete an image once nothing references it any more.

use async_trait::async_trait;

use crate::config::AppConfig;

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn delete(&self, public_id: &str) -> anyhow::Result<()>;
}

/// Deletes through the image host's REST endpoint: `DELETE {base}/{public_id}`.
pub struct HttpImageStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpImageStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl ImageStore for HttpImageStore {
    async fn delete(&self, public_id: &str) -> anyhow::Result<()> {
        let mut request = self
            .client
            .delete(format!("{}/{}", self.base_url, public_id));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }
}

/// Used when no image host is configured.
pub struct DisabledImageStore;

#[async_trait]
impl ImageStore for DisabledImageStore {
    async fn delete(&self, public_id: &str) -> anyhow::Result<()> {
        tracing::debug!(public_id, "image host not configured, skipping delete");
        Ok(())
    }
}

pub fn image_store_from_config(config: &AppConfig) -> std::sync::Arc<dyn ImageStore> {
    match &config.image_host_url {
        Some(url) => std::sync::Arc::new(HttpImageStore::new(
            url.clone(),
            config.image_host_api_key.clone(),
        )),
        None => std::sync::Arc::new(DisabledImageStore),
    }
}

/// Extract the host's public id from a delivery URL: the path after
/// `/upload/`, minus an optional `v<digits>/` version and the extension.
pub fn public_id_from_url(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("/upload/")?;
    let rest = match rest.split_once('/') {
        Some((version, tail))
            if version.len() > 1
                && version.starts_with('v')
                && version[1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            tail
        }
        _ => rest,
    };
    let id = match rest.find('.') {
        Some(dot) => &rest[..dot],
        None => rest,
    };
    (!id.is_empty()).then_some(id)
}

/// Best-effort delete of each URL's image. Failures are logged, never returned.
pub async fn delete_images(store: &dyn ImageStore, urls: impl IntoIterator<Item = String>) {
    for url in urls {
        let Some(public_id) = public_id_from_url(&url) else {
            tracing::debug!(url = %url, "not a hosted image url, nothing to delete");
            continue;
        };
        if let Err(err) = store.delete(public_id).await {
            tracing::warn!(error = %err, public_id, "image delete failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn public_id_strips_version_and_extension() {
        assert_eq!(
            public_id_from_url("https://res.example.com/demo/image/upload/v1712345/shop/logo.png"),
            Some("shop/logo")
        );
        assert_eq!(
            public_id_from_url("https://res.example.com/demo/image/upload/avatars/jane.jpg"),
            Some("avatars/jane")
        );
    }

    #[test]
    fn public_id_rejects_foreign_urls() {
        assert_eq!(public_id_from_url("https://via.placeholder.com/150"), None);
        assert_eq!(public_id_from_url("https://x.example.com/upload/"), None);
    }

    struct Recording(Mutex<Vec<String>>);

    #[async_trait]
    impl ImageStore for Recording {
        async fn delete(&self, public_id: &str) -> anyhow::Result<()> {
            if public_id == "broken" {
                anyhow::bail!("host unavailable");
            }
            self.0.lock().unwrap().push(public_id.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn delete_images_skips_foreign_urls_and_swallows_failures() {
        let store = Recording(Mutex::new(Vec::new()));
        delete_images(
            &store,
            vec![
                "https://cdn.example.com/upload/broken.png".to_string(),
                "https://via.placeholder.com/150".to_string(),
                "https://cdn.example.com/upload/v2/logos/acme.webp".to_string(),
            ],
        )
        .await;
        assert_eq!(*store.0.lock().unwrap(), vec!["logos/acme".to_string()]);
    }
}
