use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::config::image_key;
use crate::core::db::{Store, StoreExt};
use crate::core::helpers::new_id;

const IMAGE_ROUTE_PREFIX: &str = "/images/";

/// Where uploaded images live. `store` returns a permanent reference that is saved on
/// the owning record; `release` frees it again.
pub trait ImageStore: Send + Sync {
    fn store(&self, raw: &str) -> anyhow::Result<String>;

    fn release(&self, reference: &str) -> anyhow::Result<()>;
}

/// A stored image, ready to be written to a response.
#[derive(Debug, PartialEq)]
pub enum ImageBody {
    Inline { content_type: String, bytes: Vec<u8> },
    Remote(String),
}

/// Keeps image payloads in the document store under `image:{id}` and hands out
/// `/images/{id}` references.
pub struct KvImageStore {
    kv: Arc<dyn Store>,
}

impl KvImageStore {
    pub fn new(kv: Arc<dyn Store>) -> Self {
        Self { kv }
    }

    pub fn fetch(&self, image_id: &str) -> anyhow::Result<Option<ImageBody>> {
        let Some(raw) = self.kv.get_json::<String>(&image_key(image_id))? else {
            return Ok(None);
        };
        decode(&raw).map(Some)
    }
}

fn image_id(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

/// Splits a `data:` URI into content type and bytes. Anything else is a remote URL.
pub(crate) fn decode(raw: &str) -> anyhow::Result<ImageBody> {
    if let Some(rest) = raw.strip_prefix("data:") {
        let (content_type, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| anyhow::anyhow!("unsupported data URI encoding"))?;
        let bytes = STANDARD.decode(payload)?;
        return Ok(ImageBody::Inline {
            content_type: content_type.to_string(),
            bytes,
        });
    }
    Ok(ImageBody::Remote(raw.to_string()))
}

impl ImageStore for KvImageStore {
    fn store(&self, raw: &str) -> anyhow::Result<String> {
        // reject payloads we could never serve back
        decode(raw)?;
        let id = new_id();
        self.kv.set_json(&image_key(&id), &raw)?;
        tracing::debug!(image_id = %id, "stored image");
        Ok(format!("{IMAGE_ROUTE_PREFIX}{id}"))
    }

    fn release(&self, reference: &str) -> anyhow::Result<()> {
        let key = image_key(image_id(reference));
        if self.kv.get(&key)?.is_none() {
            anyhow::bail!("image {reference} not found");
        }
        self.kv.delete(&key)
    }
}
