//! Media reference resolution.
//!
//! Posts carry opaque media references. Before a media call the provider
//! client asks a [`MediaResolver`] to turn each one into something the bot API
//! accepts: a public URL or a provider `file_id`.

use async_trait::async_trait;
use url::Url;

use crate::error::DeliveryError;

/// A media reference the provider can consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedMedia {
    Url(Url),
    FileId(String),
}

impl ResolvedMedia {
    /// Value placed in the `photo`/`video`/`media` request field.
    pub fn as_input(&self) -> &str {
        match self {
            ResolvedMedia::Url(url) => url.as_str(),
            ResolvedMedia::FileId(id) => id,
        }
    }
}

#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<ResolvedMedia, DeliveryError>;
}

/// Resolves references staged in object storage.
///
/// * `http://` / `https://` are used as-is.
/// * `storage:<path>` is joined onto the public bucket URL.
/// * `blob:`, `file:` and `local:` point at content still on the author's
///   device and never resolve.
/// * anything else is taken to be a provider `file_id`.
#[derive(Debug, Clone, Default)]
pub struct StorageResolver {
    public_base: Option<Url>,
}

impl StorageResolver {
    pub fn new(public_base: Option<Url>) -> Self {
        let public_base = public_base.map(|mut url| {
            if !url.path().ends_with('/') {
                let path = format!("{}/", url.path());
                url.set_path(&path);
            }
            url
        });
        Self { public_base }
    }

    fn resolve_now(&self, reference: &str) -> Result<ResolvedMedia, DeliveryError> {
        let reference = reference.trim();
        let unresolved = || DeliveryError::UnresolvedMedia {
            reference: reference.to_string(),
        };

        if reference.is_empty() {
            return Err(unresolved());
        }

        if reference.starts_with("http://") || reference.starts_with("https://") {
            return Url::parse(reference)
                .map(ResolvedMedia::Url)
                .map_err(|_| unresolved());
        }

        if let Some(path) = reference.strip_prefix("storage:") {
            let base = self.public_base.as_ref().ok_or_else(unresolved)?;
            return base
                .join(path.trim_start_matches('/'))
                .map(ResolvedMedia::Url)
                .map_err(|_| unresolved());
        }

        if ["blob:", "file:", "local:"]
            .iter()
            .any(|scheme| reference.starts_with(scheme))
        {
            return Err(unresolved());
        }

        Ok(ResolvedMedia::FileId(reference.to_string()))
    }
}

#[async_trait]
impl MediaResolver for StorageResolver {
    async fn resolve(&self, reference: &str) -> Result<ResolvedMedia, DeliveryError> {
        self.resolve_now(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> StorageResolver {
        StorageResolver::new(Some(
            Url::parse("https://cdn.example.com/post-media").unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_remote_url_passes_through() {
        let media = resolver()
            .resolve("https://images.example.com/a.jpg")
            .await
            .unwrap();
        assert_eq!(media.as_input(), "https://images.example.com/a.jpg");
    }

    #[tokio::test]
    async fn test_storage_ref_joins_public_base() {
        let media = resolver().resolve("storage:user_1/a.jpg").await.unwrap();
        assert_eq!(
            media.as_input(),
            "https://cdn.example.com/post-media/user_1/a.jpg"
        );
    }

    #[tokio::test]
    async fn test_storage_ref_without_base_is_unresolved() {
        let err = StorageResolver::default()
            .resolve("storage:user_1/a.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::UnresolvedMedia { .. }));
    }

    #[tokio::test]
    async fn test_local_blob_is_unresolved() {
        for reference in ["blob:http://localhost/1234", "file:///tmp/a.png", "local:draft-1"] {
            let err = resolver().resolve(reference).await.unwrap_err();
            assert!(err.is_retryable(), "{reference} should stay retryable");
        }
    }

    #[tokio::test]
    async fn test_bare_value_is_file_id() {
        let media = resolver().resolve("AgACAgIAAxkBAAIB").await.unwrap();
        assert_eq!(media, ResolvedMedia::FileId("AgACAgIAAxkBAAIB".into()));
    }
}
