//! # Document Object Store
//!
//! Certificates, test reports and label photos live in an object store
//! outside the registry; records keep only a path, filename and MIME type.
//! The store is an explicitly constructed dependency handed to whoever
//! needs it.
//!
//! [`InMemoryObjectStore`] keeps objects in a map and issues presigned URLs
//! signed with SHA-256 over the path, expiry and a per-store secret.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use thiserror::Error;

use tamsys_core::{DeviceId, TenantId};
use tamsys_state::{Attachment, AttachmentKind, ComplianceRecord};

/// Object store failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectStoreError {
    /// No object at the path.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Rejected path.
    #[error("invalid object path: {0:?}")]
    InvalidPath(String),

    /// The backend failed.
    #[error("object store backend error: {0}")]
    Backend(String),
}

/// Storage for attachment bytes.
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `path`, returning the stored path.
    fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<String, ObjectStoreError>;

    /// A time-limited download URL for `path`.
    fn presigned_url(
        &self,
        path: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, ObjectStoreError>;

    /// Remove `path`. Returns whether an object was removed.
    fn delete(&self, path: &str) -> Result<bool, ObjectStoreError>;
}

/// Upload a document and build the descriptor to store on the record.
#[allow(clippy::too_many_arguments)]
pub fn store_attachment(
    store: &dyn ObjectStore,
    kind: AttachmentKind,
    tenant_id: TenantId,
    device_id: DeviceId,
    filename: &str,
    content_type: &str,
    bytes: Vec<u8>,
    now: DateTime<Utc>,
) -> Result<Attachment, ObjectStoreError> {
    let path = kind.object_path(tenant_id, device_id, now, filename);
    let path = store.put(&path, bytes, content_type)?;
    Ok(Attachment {
        path,
        filename: filename.to_string(),
        content_type: content_type.to_string(),
    })
}

/// Delete a removed record's documents. Failures are logged, not returned.
///
/// Returns the number of objects actually removed.
pub fn delete_attachments<'a>(
    store: &dyn ObjectStore,
    records: impl IntoIterator<Item = &'a ComplianceRecord>,
) -> usize {
    let mut removed = 0;
    for record in records {
        for path in record.attachment_paths() {
            match store.delete(&path) {
                Ok(true) => removed += 1,
                Ok(false) => {
                    tracing::debug!(record_id = %record.id, %path, "attachment already gone");
                }
                Err(err) => {
                    tracing::warn!(record_id = %record.id, %path, error = %err, "failed to delete attachment");
                }
            }
        }
    }
    removed
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// Object store backed by a map.
#[derive(Debug)]
pub struct InMemoryObjectStore {
    base_url: String,
    secret: String,
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    /// A store issuing URLs under `base_url`, signed with `secret`.
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Bytes and MIME type stored at `path`.
    pub fn get(&self, path: &str) -> Option<(Vec<u8>, String)> {
        self.objects
            .read()
            .get(path)
            .map(|o| (o.bytes.clone(), o.content_type.clone()))
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Check a URL produced by [`ObjectStore::presigned_url`].
    pub fn verify(&self, url: &str, now: DateTime<Utc>) -> bool {
        let Some(rest) = url.strip_prefix(&format!("{}/", self.base_url)) else {
            return false;
        };
        let Some((path, query)) = rest.split_once('?') else {
            return false;
        };
        let mut expires = None;
        let mut signature = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", v)) => expires = v.parse::<i64>().ok(),
                Some(("signature", v)) => signature = Some(v),
                _ => {}
            }
        }
        match (expires, signature) {
            (Some(expires), Some(signature)) => {
                expires >= now.timestamp() && self.sign(path, expires) == signature
            }
            _ => false,
        }
    }

    fn sign(&self, path: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b"\n");
        hasher.update(path.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        to_hex(&hasher.finalize())
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn check_path(path: &str) -> Result<(), ObjectStoreError> {
    if path.is_empty()
        || path.starts_with('/')
        || path.split('/').any(|segment| segment.is_empty() || segment == "..")
        || path.contains(['?', '&', '#'])
    {
        return Err(ObjectStoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

impl ObjectStore for InMemoryObjectStore {
    fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        check_path(path)?;
        tracing::debug!(%path, size = bytes.len(), %content_type, "storing object");
        self.objects.write().insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(path.to_string())
    }

    fn presigned_url(
        &self,
        path: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, ObjectStoreError> {
        if !self.objects.read().contains_key(path) {
            return Err(ObjectStoreError::NotFound(path.to_string()));
        }
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires = now.timestamp().saturating_add(ttl);
        Ok(format!(
            "{}/{}?expires={}&signature={}",
            self.base_url,
            path,
            expires,
            self.sign(path, expires)
        ))
    }

    fn delete(&self, path: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.objects.write().remove(path).is_some())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use tamsys_core::{CertificationId, CountryId};
    use tamsys_state::RecordKey;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 15).unwrap()
    }

    fn store() -> InMemoryObjectStore {
        InMemoryObjectStore::new("memory://certificates/", "s3cret")
    }

    struct FailingStore;

    impl ObjectStore for FailingStore {
        fn put(&self, _: &str, _: Vec<u8>, _: &str) -> Result<String, ObjectStoreError> {
            Err(ObjectStoreError::Backend("offline".into()))
        }
        fn presigned_url(
            &self,
            _: &str,
            _: Duration,
            _: DateTime<Utc>,
        ) -> Result<String, ObjectStoreError> {
            Err(ObjectStoreError::Backend("offline".into()))
        }
        fn delete(&self, _: &str) -> Result<bool, ObjectStoreError> {
            Err(ObjectStoreError::Backend("offline".into()))
        }
    }

    #[test]
    fn attachment_path_layout() {
        let store = store();
        let tenant = TenantId::new();
        let device = DeviceId::new();
        let attachment = store_attachment(
            &store,
            AttachmentKind::Certificate,
            tenant,
            device,
            "WPC cert.pdf",
            "application/pdf",
            b"%PDF".to_vec(),
            now(),
        )
        .unwrap();
        assert_eq!(
            attachment.path,
            format!("certificates/{tenant}/{device}/20250601_093015_WPC cert.pdf")
        );
        assert_eq!(attachment.filename, "WPC cert.pdf");
        assert_eq!(
            store.get(&attachment.path),
            Some((b"%PDF".to_vec(), "application/pdf".to_string()))
        );
    }

    #[test]
    fn presigned_url_verifies_until_expiry() {
        let store = store();
        store.put("certificates/a.pdf", vec![1], "application/pdf").unwrap();
        let url = store
            .presigned_url("certificates/a.pdf", Duration::from_secs(3600), now())
            .unwrap();
        assert!(url.starts_with("memory://certificates/certificates/a.pdf?expires="));
        assert!(store.verify(&url, now()));
        assert!(store.verify(&url, now() + chrono::Duration::seconds(3600)));
        assert!(!store.verify(&url, now() + chrono::Duration::seconds(3601)));
        assert!(!store.verify(&url.replace("a.pdf", "b.pdf"), now()));
    }

    #[test]
    fn presigned_url_for_missing_object_is_not_found() {
        assert_eq!(
            store().presigned_url("nope", Duration::from_secs(60), now()),
            Err(ObjectStoreError::NotFound("nope".into()))
        );
    }

    #[test]
    fn traversal_paths_are_rejected() {
        let store = store();
        assert!(store.put("../etc/passwd", vec![], "text/plain").is_err());
        assert!(store.put("/abs", vec![], "text/plain").is_err());
        assert!(store.put("a?b", vec![], "text/plain").is_err());
    }

    #[test]
    fn delete_attachments_is_best_effort() {
        let key = RecordKey {
            tenant_id: TenantId::new(),
            device_id: DeviceId::new(),
            country_id: CountryId::new(1),
            certification_id: CertificationId::new(1),
        };
        let mut record = ComplianceRecord::pending(key, now());
        let store = store();
        for kind in [AttachmentKind::Certificate, AttachmentKind::LabelPicture] {
            let attachment = store_attachment(
                &store,
                kind,
                key.tenant_id,
                key.device_id,
                "file.bin",
                "application/octet-stream",
                vec![0],
                now(),
            )
            .unwrap();
            record.set_attachment(kind, attachment, now());
        }
        assert_eq!(delete_attachments(&store, [&record]), 2);
        assert!(store.is_empty());
        assert_eq!(delete_attachments(&FailingStore, [&record]), 0);
    }
}
