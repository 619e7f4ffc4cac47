//! Remote catalog client.
//!
//! The backend is authoritative for every listing; this module only moves
//! data to and from it. [`CatalogApi`] is the seam the session talks to,
//! [`HttpCatalog`] is the REST implementation.

mod http;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::model::{AuthSession, FilterOptions, NewProduct, NewUser, Product, ProductImage};

pub use http::HttpCatalog;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// A local image file queued for upload under a given file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub path: PathBuf,
    pub file_name: String,
}

impl ImageUpload {
    /// Names the upload after the listing: lower-cased, whitespace removed,
    /// numbered, keeping the source extension.
    pub fn named_after(product_name: &str, index: usize, path: &Path) -> Self {
        let stem: String = product_name
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        let stem = if stem.is_empty() { "image".to_string() } else { stem };
        let file_name = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}-{}.{}", stem, index + 1, ext.to_lowercase()),
            None => format!("{}-{}", stem, index + 1),
        };
        ImageUpload {
            path: path.to_owned(),
            file_name,
        }
    }
}

#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Bearer token attached to every following request.
    fn set_token(&mut self, token: Option<String>);

    async fn authenticate(&self, email: &str, password: &str) -> ApiResult<AuthSession>;
    async fn refresh(&self, refresh_token: &str) -> ApiResult<TokenPair>;
    async fn register(&self, user: &NewUser) -> ApiResult<()>;

    async fn list(&self, filter: Option<&FilterOptions>) -> ApiResult<Vec<Product>>;
    async fn list_own(&self) -> ApiResult<Vec<Product>>;
    async fn get(&self, id: &str) -> ApiResult<Product>;
    async fn create(&self, product: &NewProduct) -> ApiResult<Product>;
    async fn update(&self, id: &str, product: &NewProduct) -> ApiResult<()>;
    async fn set_active(&self, id: &str, is_active: bool) -> ApiResult<()>;
    async fn delete(&self, id: &str) -> ApiResult<()>;

    async fn upload_images(
        &self,
        product_id: &str,
        files: &[ImageUpload],
    ) -> ApiResult<Vec<ProductImage>>;
    async fn delete_images(&self, ids: &[String]) -> ApiResult<()>;
}
