pub mod api;
mod cache;
pub mod config;
mod error;
pub mod model;
mod session;
mod store;

pub use api::{CatalogApi, HttpCatalog, ImageUpload, TokenPair};
pub use cache::{ProductCache, PRODUCTS_KEY, PRODUCT_IMAGES_KEY, TOKEN_KEY, USER_KEY};
pub use config::Config;
pub use error::{ApiError, ApiResult, StoreError, SyncError, SyncResult};
pub use session::{AdEdit, AdSubmission, ImageOutcome, Session, SignIn};
pub use store::{FileStore, KeyValueStore, MemoryStore};
