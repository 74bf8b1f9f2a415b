use serde::Serialize;
use sqlx::FromRow;

/// One accepted image row in `birbs`
#[derive(Debug, Clone, FromRow)]
pub struct StoredImage {
    pub id: i64,
    pub hash: Vec<u8>,
    pub permalink: String,
    pub source_url: String,
    pub content_type: String,
    pub banned: bool,
}

/// Row data for an image about to be inserted
#[derive(Debug, Clone)]
pub struct NewImage {
    pub hash: Vec<u8>,
    pub permalink: String,
    pub source_url: String,
    pub content_type: String,
}

/// Public metadata response for `GET /info/id/:id`
#[derive(Debug, Serialize)]
pub struct ImageInfo {
    pub id: i64,
    pub hash: String,
    pub permalink: String,
    pub source_url: String,
    pub content_type: String,
    pub banned: bool,
}

impl StoredImage {
    pub fn hash_hex(&self) -> String {
        hex::encode(&self.hash)
    }

    pub fn to_info(&self) -> ImageInfo {
        ImageInfo {
            id: self.id,
            hash: self.hash_hex(),
            permalink: self.permalink.clone(),
            source_url: self.source_url.clone(),
            content_type: self.content_type.clone(),
            banned: self.banned,
        }
    }
}
