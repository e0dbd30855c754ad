//! Filesystem-backed object store: `<root>/<container>/<object>`

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, instrument};

use super::{decode_text, FetchError, FetchedText, ObjectRef, ObjectStore};

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an object under the root. Anything that could climb out of
    /// the root resolves to `None`.
    fn resolve(&self, object: &ObjectRef) -> Option<PathBuf> {
        let relative = Path::new(&object.container).join(&object.object);
        let confined = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        confined.then(|| self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    #[instrument(skip(self, object), fields(object = %object))]
    async fn fetch_text(&self, object: &ObjectRef) -> Result<FetchedText, FetchError> {
        let path = self
            .resolve(object)
            .ok_or_else(|| FetchError::NotFound(object.clone()))?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::NotFound(object.clone()));
            },
            Err(e) => {
                return Err(FetchError::Storage {
                    object: object.clone(),
                    message: e.to_string(),
                });
            },
        };

        debug!(bytes = bytes.len(), path = %path.display(), "Read object from disk");
        Ok(decode_text(bytes))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_existing_object() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bucket/incoming")).unwrap();
        std::fs::write(dir.path().join("bucket/incoming/a.csv"), "id\n1\n").unwrap();

        let store = LocalObjectStore::new(dir.path());
        let fetched = store
            .fetch_text(&ObjectRef::new("bucket", "incoming/a.csv"))
            .await
            .unwrap();
        assert_eq!(fetched.text, "id\n1\n");
        assert!(!fetched.lossy);
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let err = store
            .fetch_text(&ObjectRef::new("bucket", "nope.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_parent_components_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("secret.csv"), "x\n1\n").unwrap();
        let store = LocalObjectStore::new(dir.path().join("root"));
        let err = store
            .fetch_text(&ObjectRef::new("..", "secret.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b/bad.csv"), [b'a', b'\n', 0xc3, 0x28]).unwrap();

        let store = LocalObjectStore::new(dir.path());
        let fetched = store.fetch_text(&ObjectRef::new("b", "bad.csv")).await.unwrap();
        assert!(fetched.lossy);
        assert!(fetched.text.starts_with("a\n"));
    }
}
