//! Session and listing state.
//!
//! A [`Session`] owns everything the screens read: the signed-in user, the
//! browse list, the user's own listings and the active browse filter.
//! Mutations go to the backend first and are mirrored locally only after
//! the backend confirms them.

use std::path::PathBuf;

use log::*;

use crate::api::{CatalogApi, ImageUpload, TokenPair};
use crate::cache::ProductCache;
use crate::error::{ApiError, StoreError, SyncError, SyncResult};
use crate::model::form::{AdForm, SignInForm, SignUpForm};
use crate::model::{
    active_count, AdStatus, AuthSession, FilterOptions, Product, ProductImage, User,
};
use crate::store::KeyValueStore;

/// Result of the image phase of an ad submission or edit.
///
/// The listing itself is already committed when this is produced, so an
/// image failure is reported here rather than rolling the listing back.
#[derive(Debug, Default)]
pub struct ImageOutcome {
    pub uploaded: Vec<ProductImage>,
    /// Ids the backend confirmed as deleted.
    pub removed: Vec<String>,
    pub error: Option<ApiError>,
    pub removal_error: Option<ApiError>,
    /// The backend accepted the images but the local image record was not updated.
    pub mirror_error: Option<StoreError>,
}

impl ImageOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.removal_error.is_none() && self.mirror_error.is_none()
    }
}

#[derive(Debug)]
pub struct AdSubmission {
    pub product: Product,
    pub images: ImageOutcome,
}

/// Result of an edit whose listing update the backend accepted.
#[derive(Debug)]
pub struct AdEdit {
    /// The listing as re-fetched after the edit, `None` if that fetch failed.
    pub product: Option<Product>,
    pub images: ImageOutcome,
    /// Re-fetching or mirroring the edited listing failed.
    pub publish_error: Option<SyncError>,
}

/// Result of a sign-in the backend accepted. The session is signed in.
#[derive(Debug)]
pub struct SignIn {
    pub user: User,
    /// The session could not be saved and will not survive a restart.
    pub mirror_error: Option<StoreError>,
    /// Own listings could not be loaded; `load_own_products` can retry.
    pub listings_error: Option<SyncError>,
}

#[derive(Debug)]
pub struct Session<A, S> {
    api: A,
    cache: ProductCache<S>,
    auth: Option<AuthSession>,
    products: Vec<Product>,
    own_products: Vec<Product>,
    filter: FilterOptions,
}

impl<A: CatalogApi, S: KeyValueStore> Session<A, S> {
    pub fn new(api: A, store: S) -> Self {
        Session {
            api,
            cache: ProductCache::new(store),
            auth: None,
            products: vec![],
            own_products: vec![],
            filter: FilterOptions::default(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn cache(&self) -> &ProductCache<S> {
        &self.cache
    }

    pub fn user(&self) -> Option<&User> {
        self.auth.as_ref().map(|a| &a.user)
    }

    pub fn token(&self) -> Option<&str> {
        self.auth.as_ref().map(|a| a.token.as_str())
    }

    pub fn is_signed_in(&self) -> bool {
        self.auth.is_some()
    }

    fn require_auth(&self) -> SyncResult<&AuthSession> {
        self.auth.as_ref().ok_or(SyncError::NotSignedIn)
    }

    pub fn is_own_listing(&self, product: &Product) -> bool {
        self.user().map_or(false, |u| u.id == product.user_id)
    }

    // ---- auth ----

    /// Picks up a session persisted by an earlier run.
    ///
    /// A saved session that no longer parses is discarded, leaving the
    /// session signed out.
    pub async fn restore(&mut self) -> SyncResult<Option<&User>> {
        let saved = match self.cache.auth().await {
            Ok(saved) => saved,
            Err(e @ StoreError::Corrupt { .. }) => {
                warn!("Discarding unreadable saved session: {}", e);
                self.cache.clear_auth().await?;
                None
            }
            Err(e) => return Err(e.into()),
        };
        match saved {
            Some(auth) => {
                debug!("Restored session for {}", auth.user.email);
                self.api.set_token(Some(auth.token.clone()));
                self.auth = Some(auth);
            }
            None => debug!("No persisted session"),
        }
        Ok(self.user())
    }

    /// Only validation and authentication failures are errors. Once the
    /// backend accepts the credentials the session is signed in, and saving
    /// it or loading the user's listings is reported in [`SignIn`].
    pub async fn sign_in(&mut self, form: &SignInForm) -> SyncResult<SignIn> {
        form.validate()?;
        let auth = self.api.authenticate(form.email.trim(), &form.password).await?;
        info!("Signed in as {}", auth.user.email);
        self.api.set_token(Some(auth.token.clone()));
        let user = auth.user.clone();
        self.auth = Some(auth.clone());

        let mirror_error = self.cache.save_auth(&auth).await.err();
        if let Some(e) = &mirror_error {
            warn!("Signed in but could not save the session: {}", e);
        }
        let listings_error = self.load_own_products().await.err();
        if let Some(e) = &listings_error {
            warn!("Signed in but could not load own products: {}", e);
        }
        Ok(SignIn {
            user,
            mirror_error,
            listings_error,
        })
    }

    /// Registers the account, then signs in with the same credentials.
    pub async fn sign_up(&mut self, form: &SignUpForm) -> SyncResult<SignIn> {
        let user = form.validate()?;
        self.api.register(&user).await?;
        info!("Registered {}", user.email);
        let credentials = SignInForm {
            email: user.email,
            password: user.password,
        };
        self.sign_in(&credentials).await
    }

    pub async fn sign_out(&mut self) -> SyncResult<()> {
        self.auth = None;
        self.products.clear();
        self.own_products.clear();
        self.filter = FilterOptions::default();
        self.api.set_token(None);
        self.cache.clear_auth().await?;
        self.cache.clear_products().await?;
        info!("Signed out");
        Ok(())
    }

    /// Installs a refreshed token and reloads the user's listings with it.
    pub async fn refresh_token(&mut self, tokens: TokenPair) -> SyncResult<()> {
        let auth = self.auth.as_mut().ok_or(SyncError::NotSignedIn)?;
        auth.token = tokens.token;
        if tokens.refresh_token.is_some() {
            auth.refresh_token = tokens.refresh_token;
        }
        self.api.set_token(Some(auth.token.clone()));
        let auth = auth.clone();
        self.cache.save_auth(&auth).await?;
        self.load_own_products().await?;
        Ok(())
    }

    /// Trades the stored refresh token for a new token pair.
    pub async fn renew_token(&mut self) -> SyncResult<()> {
        let refresh_token = self
            .require_auth()?
            .refresh_token
            .clone()
            .ok_or_else(|| ApiError::Unknown("Session has no refresh token".to_string()))?;
        let tokens = self.api.refresh(&refresh_token).await?;
        self.refresh_token(tokens).await
    }

    // ---- listings ----

    /// Fetches the full browse list. The filter is applied on read.
    pub async fn load_products(&mut self) -> SyncResult<&[Product]> {
        self.require_auth()?;
        self.products = self.api.list(None).await?;
        debug!("Loaded {} products", self.products.len());
        Ok(&self.products)
    }

    /// Server-side search. Leaves the browse list untouched.
    pub async fn search(&self, filter: &FilterOptions) -> SyncResult<Vec<Product>> {
        self.require_auth()?;
        Ok(self.api.list(Some(filter)).await?)
    }

    /// Replaces the own-products list with the backend's and rewrites the
    /// cached copy to match.
    pub async fn load_own_products(&mut self) -> SyncResult<&[Product]> {
        self.require_auth()?;
        self.own_products = self.api.list_own().await?;
        debug!("Loaded {} own products", self.own_products.len());
        self.cache.replace_products(&self.own_products).await?;
        Ok(&self.own_products)
    }

    /// Offline display: own listings as last mirrored.
    pub async fn load_from_cache(&mut self) -> SyncResult<&[Product]> {
        self.own_products = self.cache.products().await?;
        Ok(&self.own_products)
    }

    pub async fn product(&self, id: &str) -> SyncResult<Product> {
        self.require_auth()?;
        Ok(self.api.get(id).await?)
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn own_products(&self) -> &[Product] {
        &self.own_products
    }

    pub fn own_products_by_status(&self, status: AdStatus) -> Vec<&Product> {
        self.own_products.iter().filter(|p| status.matches(p)).collect()
    }

    pub fn active_count(&self) -> usize {
        active_count(&self.own_products)
    }

    // ---- filter ----

    pub fn apply_filter(&mut self, options: FilterOptions) {
        self.filter = options;
    }

    pub fn clear_filter(&mut self) {
        self.filter = FilterOptions::default();
    }

    pub fn filter(&self) -> &FilterOptions {
        &self.filter
    }

    pub fn visible_products(&self) -> Vec<&Product> {
        self.products.iter().filter(|p| self.filter.matches(p)).collect()
    }

    // ---- ads ----

    /// Creates the listing, then uploads its images.
    ///
    /// The listing is not published to the local mirror here; call
    /// [`Session::publish`] once the preview is accepted.
    pub async fn submit_ad(&mut self, form: &AdForm, images: &[PathBuf]) -> SyncResult<AdSubmission> {
        self.require_auth()?;
        let new_product = form.validate(images.len())?;
        let product = self.api.create(&new_product).await?;
        info!("Created product {}", product.id);
        let mut outcome = ImageOutcome::default();
        self.upload_images(&product.id, &product.name, images, &mut outcome).await;
        self.mirror_images(&mut outcome).await;
        Ok(AdSubmission {
            product,
            images: outcome,
        })
    }

    async fn upload_images(
        &self,
        product_id: &str,
        product_name: &str,
        paths: &[PathBuf],
        outcome: &mut ImageOutcome,
    ) {
        if paths.is_empty() {
            return;
        }
        let uploads: Vec<ImageUpload> = paths
            .iter()
            .enumerate()
            .map(|(i, p)| ImageUpload::named_after(product_name, i, p))
            .collect();
        match self.api.upload_images(product_id, &uploads).await {
            Ok(uploaded) => outcome.uploaded = uploaded,
            Err(e) => {
                warn!("Product {} saved without new images: {}", product_id, e);
                outcome.error = Some(e);
            }
        }
    }

    async fn delete_images(&self, product_id: &str, ids: &[String], outcome: &mut ImageOutcome) {
        if ids.is_empty() {
            return;
        }
        match self.api.delete_images(ids).await {
            Ok(()) => outcome.removed = ids.to_vec(),
            Err(e) => {
                warn!("Product {} kept images it should have dropped: {}", product_id, e);
                outcome.removal_error = Some(e);
            }
        }
    }

    /// Applies confirmed image changes to the local image record.
    async fn mirror_images(&self, outcome: &mut ImageOutcome) {
        let mut mirrored = Ok(());
        if !outcome.removed.is_empty() {
            mirrored = self.cache.remove_images(&outcome.removed).await;
        }
        if mirrored.is_ok() && !outcome.uploaded.is_empty() {
            mirrored = self.cache.save_images(&outcome.uploaded).await;
        }
        if let Err(e) = mirrored {
            warn!("Could not cache image changes: {}", e);
            outcome.mirror_error = Some(e);
        }
    }

    /// Fetches the listing as the backend now has it and mirrors it into
    /// the own-products list and the cache.
    pub async fn publish(&mut self, id: &str) -> SyncResult<Product> {
        self.require_auth()?;
        let product = self.api.get(id).await?;
        self.mirror_product(&product).await?;
        Ok(product)
    }

    async fn mirror_product(&mut self, product: &Product) -> Result<(), StoreError> {
        match self.own_products.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => *existing = product.clone(),
            None => self.own_products.push(product.clone()),
        }
        self.cache.save_product(product).await
    }

    /// Updates the listing, then deletes dropped images, uploads new ones
    /// and re-publishes the result.
    ///
    /// A failed update is the only remote error: nothing has changed on
    /// either side. Every step after it runs against a committed listing
    /// and is reported in the returned [`AdEdit`].
    pub async fn edit_ad(
        &mut self,
        id: &str,
        form: &AdForm,
        kept_images: usize,
        new_images: &[PathBuf],
        removed_image_ids: &[String],
    ) -> SyncResult<AdEdit> {
        self.require_auth()?;
        let update = form.validate(kept_images + new_images.len())?;
        self.api.update(id, &update).await?;
        info!("Updated product {}", id);

        let mut images = ImageOutcome::default();
        self.delete_images(id, removed_image_ids, &mut images).await;
        self.upload_images(id, &update.name, new_images, &mut images).await;
        self.mirror_images(&mut images).await;

        let (product, publish_error) = match self.api.get(id).await {
            Ok(product) => {
                let mirrored = self.mirror_product(&product).await.err().map(SyncError::from);
                (Some(product), mirrored)
            }
            Err(e) => (None, Some(SyncError::from(e))),
        };
        if let Some(e) = &publish_error {
            warn!("Product {} updated but not re-published: {}", id, e);
        }
        Ok(AdEdit {
            product,
            images,
            publish_error,
        })
    }

    /// Enables or disables a listing. Not retried on failure.
    pub async fn set_active_flag(&mut self, id: &str, value: bool) -> SyncResult<()> {
        self.require_auth()?;
        self.api.set_active(id, value).await?;
        self.own_products
            .iter_mut()
            .chain(self.products.iter_mut())
            .filter(|p| p.id == id)
            .for_each(|p| p.is_active = value);
        if !self.cache.update_active_flag(id, value).await? {
            debug!("Product {} not in local cache", id);
        }
        info!("Product {} {}", id, if value { "enabled" } else { "disabled" });
        Ok(())
    }

    pub async fn remove(&mut self, id: &str) -> SyncResult<()> {
        self.require_auth()?;
        self.api.delete(id).await?;
        self.own_products.retain(|p| p.id != id);
        self.products.retain(|p| p.id != id);
        self.cache.remove_product(id).await?;
        self.cache.remove_images_for(id).await?;
        info!("Deleted product {}", id);
        Ok(())
    }
}
