use spin_sdk::http::{Request, Response};
use crate::core::db::KeyValue;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, store};
use crate::auth::validate_token;
use crate::config::*;

/// Object-storage contract consumed by the upload flow: store a payload
/// under a key and get back a resolvable location.
pub trait ObjectStorage {
    fn put(&self, key: &str, content_type: &str, bytes: &[u8]) -> anyhow::Result<String>;
    fn fetch(&self, key: &str) -> anyhow::Result<Option<(String, Vec<u8>)>>;
}

/// Media stored next to the documents: payload under one key, content type
/// under a sibling key, location served from this same app.
pub struct KvObjectStore<'a, S: KeyValue> {
    store: &'a S,
}

impl<'a, S: KeyValue> KvObjectStore<'a, S> {
    pub fn new(store: &'a S) -> Self {
        KvObjectStore { store }
    }
}

impl<S: KeyValue> ObjectStorage for KvObjectStore<'_, S> {
    fn put(&self, key: &str, content_type: &str, bytes: &[u8]) -> anyhow::Result<String> {
        self.store.set(&media_key(key), bytes)?;
        self.store.set(&media_type_key(key), content_type.as_bytes())?;
        Ok(format!("/media/{}", key))
    }

    fn fetch(&self, key: &str) -> anyhow::Result<Option<(String, Vec<u8>)>> {
        let bytes = match self.store.get(&media_key(key))? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let content_type = self
            .store
            .get(&media_type_key(key))?
            .map(|raw| String::from_utf8_lossy(&raw).to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Ok(Some((content_type, bytes)))
    }
}

fn valid_media_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 128
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

// === HTTP handlers ===

pub fn handle_upload(req: Request, key: &str) -> anyhow::Result<Response> {
    let store = store();
    if validate_token(&store, &req).is_none() {
        return Ok(ApiError::Unauthorized.into());
    }

    if !valid_media_key(key) {
        return Ok(ApiError::BadRequest("Invalid media key".to_string()).into());
    }
    if req.body().is_empty() {
        return Ok(ApiError::BadRequest("Empty upload".to_string()).into());
    }

    let content_type = req
        .header("Content-Type")
        .and_then(|h| h.as_str())
        .unwrap_or("application/octet-stream")
        .to_string();

    let objects = KvObjectStore::new(&store);
    match objects.put(key, &content_type, req.body()) {
        Ok(location) => json_response(201, &serde_json::json!({"location": location})),
        Err(err) => {
            log::error!("media upload failed for key {}: {}", key, err);
            Ok(ApiError::Conflict("Error uploading file. Please try again".to_string()).into())
        }
    }
}

pub fn handle_serve(key: &str) -> anyhow::Result<Response> {
    if !valid_media_key(key) {
        return Ok(ApiError::BadRequest("Invalid media key".to_string()).into());
    }

    let store = store();
    let objects = KvObjectStore::new(&store);
    match objects.fetch(key)? {
        Some((content_type, bytes)) => Ok(Response::builder()
            .status(200)
            .header("Content-Type", content_type.as_str())
            .body(bytes)
            .build()),
        None => Ok(ApiError::NotFound("Media not found".to_string()).into()),
    }
}
