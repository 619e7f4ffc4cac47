use std::collections::HashSet;

use log::*;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::TokenPair;
use crate::error::StoreError;
use crate::model::{AuthSession, Product, ProductImage, User};
use crate::store::KeyValueStore;

pub const PRODUCTS_KEY: &str = "marketspace:products";
pub const PRODUCT_IMAGES_KEY: &str = "marketspace:product_images";
pub const USER_KEY: &str = "marketspace:user";
pub const TOKEN_KEY: &str = "marketspace:token";

/// Local mirror of the signed-in user's listings, their image metadata and
/// the auth session.
///
/// Each record is a JSON array (or object) under a fixed key. There is no
/// schema version; a record that no longer parses is reported, not dropped.
#[derive(Debug)]
pub struct ProductCache<S> {
    store: S,
}

impl<S: KeyValueStore> ProductCache<S> {
    pub fn new(store: S) -> Self {
        ProductCache { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.store
            .get(key)
            .await?
            .map(|c| {
                serde_json::from_str::<T>(&c).map_err(|source| StoreError::Corrupt {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_string(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, value).await
    }

    pub async fn products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self.read(PRODUCTS_KEY).await?.unwrap_or_default())
    }

    /// Replaces the record with the same id in place, appends otherwise.
    pub async fn save_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut products = self.products().await?;
        match products.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => *existing = product.clone(),
            None => products.push(product.clone()),
        }
        debug!("Caching product {} ({} cached)", product.id, products.len());
        self.write(PRODUCTS_KEY, &products).await
    }

    /// Overwrites the whole listing record, used after a full refetch.
    pub async fn replace_products(&self, products: &[Product]) -> Result<(), StoreError> {
        self.write(PRODUCTS_KEY, products).await
    }

    pub async fn remove_product(&self, id: &str) -> Result<(), StoreError> {
        let mut products = self.products().await?;
        let before = products.len();
        products.retain(|p| p.id != id);
        if products.len() == before {
            return Ok(());
        }
        self.write(PRODUCTS_KEY, &products).await
    }

    /// Returns whether a cached record was changed.
    pub async fn update_active_flag(&self, id: &str, is_active: bool) -> Result<bool, StoreError> {
        let mut products = self.products().await?;
        match products.iter_mut().find(|p| p.id == id) {
            Some(product) => {
                product.is_active = is_active;
                self.write(PRODUCTS_KEY, &products).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn images(&self) -> Result<Vec<ProductImage>, StoreError> {
        Ok(self.read(PRODUCT_IMAGES_KEY).await?.unwrap_or_default())
    }

    pub async fn images_for(&self, product_id: &str) -> Result<Vec<ProductImage>, StoreError> {
        let mut images = self.images().await?;
        images.retain(|i| i.product_id == product_id);
        Ok(images)
    }

    /// Appends images whose id is not cached yet.
    pub async fn save_images(&self, new_images: &[ProductImage]) -> Result<(), StoreError> {
        let mut images = self.images().await?;
        let mut known: HashSet<String> = images.iter().map(|i| i.id.clone()).collect();
        images.extend(
            new_images
                .iter()
                .filter(|i| known.insert(i.id.clone()))
                .cloned(),
        );
        self.write(PRODUCT_IMAGES_KEY, &images).await
    }

    /// Drops every cached image whose id is in `ids`.
    pub async fn remove_images(&self, ids: &[String]) -> Result<(), StoreError> {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut images = self.images().await?;
        images.retain(|i| !ids.contains(i.id.as_str()));
        self.write(PRODUCT_IMAGES_KEY, &images).await
    }

    pub async fn remove_images_for(&self, product_id: &str) -> Result<(), StoreError> {
        let mut images = self.images().await?;
        images.retain(|i| i.product_id != product_id);
        self.write(PRODUCT_IMAGES_KEY, &images).await
    }

    /// The saved session, if both the user and the token record are present.
    pub async fn auth(&self) -> Result<Option<AuthSession>, StoreError> {
        let user: Option<User> = self.read(USER_KEY).await?;
        let tokens: Option<TokenPair> = self.read(TOKEN_KEY).await?;
        match (user, tokens) {
            (Some(user), Some(tokens)) => Ok(Some(AuthSession {
                user,
                token: tokens.token,
                refresh_token: tokens.refresh_token,
            })),
            (None, None) => Ok(None),
            _ => {
                warn!("Ignoring half-written session, one of {} / {} is missing", USER_KEY, TOKEN_KEY);
                Ok(None)
            }
        }
    }

    pub async fn save_auth(&self, auth: &AuthSession) -> Result<(), StoreError> {
        self.write(USER_KEY, &auth.user).await?;
        let tokens = TokenPair {
            token: auth.token.clone(),
            refresh_token: auth.refresh_token.clone(),
        };
        self.write(TOKEN_KEY, &tokens).await
    }

    pub async fn clear_auth(&self) -> Result<(), StoreError> {
        self.store.remove(TOKEN_KEY).await?;
        self.store.remove(USER_KEY).await
    }

    /// Drops every listing and image record, used on sign-out.
    pub async fn clear_products(&self) -> Result<(), StoreError> {
        self.store.remove(PRODUCTS_KEY).await?;
        self.store.remove(PRODUCT_IMAGES_KEY).await
    }
}
