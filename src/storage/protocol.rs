//! Blob Store HTTP Surface
//!
//! Endpoints used to stage input shards and fetch sorted output shards. Object bodies
//! travel as raw bytes; only listings and errors are JSON.

use serde::{Deserialize, Serialize};

/// `PUT` creates a bucket, `DELETE` destroys it, `GET` lists its objects.
pub const ENDPOINT_BUCKET: &str = "/buckets/:bucket";
/// `PUT` stores the request body, `GET` returns the object, `DELETE` removes it.
pub const ENDPOINT_OBJECT: &str = "/objects/:bucket/*name";

pub fn bucket_path(bucket: &str) -> String {
    format!("/buckets/{}", bucket)
}

pub fn object_path(bucket: &str, name: &str) -> String {
    format!("/objects/{}/{}", bucket, name)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListObjectsResponse {
    pub bucket: String,
    pub objects: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListObjectsQuery {
    #[serde(default)]
    pub prefix: String,
}
