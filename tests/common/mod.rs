// In-memory backend and store doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use marketspace::model::{
    AuthSession, FilterOptions, ImageRef, NewProduct, NewUser, PaymentKey, PaymentMethod, Product,
    ProductImage, ProductOwner, User,
};
use marketspace::{
    ApiError, ApiResult, CatalogApi, ImageUpload, KeyValueStore, MemoryStore, StoreError,
    TokenPair,
};

pub const EMAIL: &str = "ana@example.com";
pub const PASSWORD: &str = "secret123";

#[derive(Debug, Clone)]
enum Failure {
    Application(String),
    Unknown,
}

#[derive(Debug, Default)]
struct State {
    users: Vec<(User, String)>,
    products: Vec<Product>,
    images: Vec<ProductImage>,
    failures: HashMap<&'static str, Failure>,
    calls: Vec<&'static str>,
    next_id: usize,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{}", prefix, self.next_id)
    }
}

/// Backend double: keeps listings in memory and checks the bearer token.
#[derive(Debug, Default)]
pub struct FakeCatalog {
    state: Mutex<State>,
    token: Option<String>,
}

fn payment_methods(keys: &[PaymentKey]) -> Vec<PaymentMethod> {
    keys.iter()
        .map(|k| PaymentMethod {
            key: k.as_str().to_string(),
            name: k.display_name().to_string(),
        })
        .collect()
}

fn token_for(user_id: &str) -> String {
    format!("token-{}", user_id)
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend with one registered account (`EMAIL` / `PASSWORD`).
    pub fn with_account() -> Self {
        let fake = Self::new();
        fake.add_user("u1", "Ana Souza", EMAIL, PASSWORD);
        fake
    }

    pub fn add_user(&self, id: &str, name: &str, email: &str, password: &str) {
        let user = User {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            tel: "5511999999999".to_string(),
            avatar: None,
        };
        self.state().users.push((user, password.to_string()));
    }

    /// Inserts a listing directly, bypassing the API.
    pub fn seed_product(&self, owner_id: &str, name: &str, is_active: bool) -> String {
        let mut state = self.state();
        let id = state.next_id("p");
        let now = Utc::now();
        state.products.push(Product {
            id: id.clone(),
            name: name.to_string(),
            description: format!("{} in good shape", name),
            is_new: false,
            price: 10_000,
            accept_trade: true,
            user_id: owner_id.to_string(),
            is_active,
            created_at: now,
            updated_at: now,
            product_images: vec![],
            payment_methods: vec![PaymentMethod {
                key: "pix".to_string(),
                name: "Pix".to_string(),
            }],
            user: None,
        });
        id
    }

    pub fn fail_next(&self, op: &'static str, message: &str) {
        self.state()
            .failures
            .insert(op, Failure::Application(message.to_string()));
    }

    pub fn break_next(&self, op: &'static str) {
        self.state().failures.insert(op, Failure::Unknown);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn product(&self, id: &str) -> Option<Product> {
        self.state().products.iter().find(|p| p.id == id).cloned()
    }

    pub fn images(&self) -> Vec<ProductImage> {
        self.state().images.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn enter(&self, op: &'static str) -> ApiResult<()> {
        let mut state = self.state();
        state.calls.push(op);
        match state.failures.remove(op) {
            Some(Failure::Application(message)) => Err(ApiError::Application {
                status: 400,
                message,
            }),
            Some(Failure::Unknown) => Err(ApiError::Unknown("connection reset".to_string())),
            None => Ok(()),
        }
    }

    fn current_user(&self) -> ApiResult<User> {
        let state = self.state();
        state
            .users
            .iter()
            .map(|(u, _)| u)
            .find(|u| self.token.as_deref() == Some(token_for(&u.id).as_str()))
            .cloned()
            .ok_or_else(|| ApiError::Application {
                status: 401,
                message: "token.invalid".to_string(),
            })
    }

    fn not_found() -> ApiError {
        ApiError::Application {
            status: 404,
            message: "Product not found.".to_string(),
        }
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    async fn authenticate(&self, email: &str, password: &str) -> ApiResult<AuthSession> {
        self.enter("authenticate")?;
        let state = self.state();
        state
            .users
            .iter()
            .find(|(u, p)| u.email == email && p == password)
            .map(|(u, _)| AuthSession {
                user: u.clone(),
                token: token_for(&u.id),
                refresh_token: Some(format!("refresh-{}", u.id)),
            })
            .ok_or_else(|| ApiError::Application {
                status: 401,
                message: "Incorrect e-mail or password.".to_string(),
            })
    }

    async fn refresh(&self, refresh_token: &str) -> ApiResult<TokenPair> {
        self.enter("refresh")?;
        let user_id = refresh_token
            .strip_prefix("refresh-")
            .ok_or_else(|| ApiError::Unknown("bad refresh token".to_string()))?;
        Ok(TokenPair {
            token: token_for(user_id),
            refresh_token: Some(format!("refresh-{}", user_id)),
        })
    }

    async fn register(&self, user: &NewUser) -> ApiResult<()> {
        self.enter("register")?;
        if self.state().users.iter().any(|(u, _)| u.email == user.email) {
            return Err(ApiError::Application {
                status: 400,
                message: "E-mail already in use.".to_string(),
            });
        }
        let id = self.state().next_id("u");
        self.add_user(&id, &user.name, &user.email, &user.password);
        Ok(())
    }

    async fn list(&self, filter: Option<&FilterOptions>) -> ApiResult<Vec<Product>> {
        self.enter("list")?;
        let user = self.current_user()?;
        Ok(self
            .state()
            .products
            .iter()
            .filter(|p| p.user_id != user.id && p.is_active)
            .filter(|p| filter.map_or(true, |f| f.matches(p)))
            .cloned()
            .collect())
    }

    async fn list_own(&self) -> ApiResult<Vec<Product>> {
        self.enter("list_own")?;
        let user = self.current_user()?;
        Ok(self
            .state()
            .products
            .iter()
            .filter(|p| p.user_id == user.id)
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> ApiResult<Product> {
        self.enter("get")?;
        self.current_user()?;
        self.product(id).ok_or_else(Self::not_found)
    }

    async fn create(&self, product: &NewProduct) -> ApiResult<Product> {
        self.enter("create")?;
        let user = self.current_user()?;
        let mut state = self.state();
        let id = state.next_id("p");
        let now = Utc::now();
        let created = Product {
            id,
            name: product.name.clone(),
            description: product.description.clone(),
            is_new: product.is_new,
            price: product.price,
            accept_trade: product.accept_trade,
            user_id: user.id.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
            product_images: vec![],
            payment_methods: payment_methods(&product.payment_methods),
            user: Some(ProductOwner {
                avatar: user.avatar.clone(),
                name: user.name.clone(),
                tel: user.tel.clone(),
            }),
        };
        state.products.push(created.clone());
        // Create responses carry no embedded collections.
        Ok(Product {
            product_images: vec![],
            payment_methods: vec![],
            user: None,
            ..created
        })
    }

    async fn update(&self, id: &str, update: &NewProduct) -> ApiResult<()> {
        self.enter("update")?;
        self.current_user()?;
        let mut state = self.state();
        let product = state
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(Self::not_found)?;
        product.name = update.name.clone();
        product.description = update.description.clone();
        product.is_new = update.is_new;
        product.price = update.price;
        product.accept_trade = update.accept_trade;
        product.payment_methods = payment_methods(&update.payment_methods);
        product.updated_at = Utc::now();
        Ok(())
    }

    async fn set_active(&self, id: &str, is_active: bool) -> ApiResult<()> {
        self.enter("set_active")?;
        self.current_user()?;
        let mut state = self.state();
        let product = state
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(Self::not_found)?;
        product.is_active = is_active;
        Ok(())
    }

    async fn delete(&self, id: &str) -> ApiResult<()> {
        self.enter("delete")?;
        self.current_user()?;
        let mut state = self.state();
        let before = state.products.len();
        state.products.retain(|p| p.id != id);
        if state.products.len() == before {
            return Err(Self::not_found());
        }
        state.images.retain(|i| i.product_id != id);
        Ok(())
    }

    async fn upload_images(
        &self,
        product_id: &str,
        files: &[ImageUpload],
    ) -> ApiResult<Vec<ProductImage>> {
        self.enter("upload_images")?;
        self.current_user()?;
        let mut state = self.state();
        if !state.products.iter().any(|p| p.id == product_id) {
            return Err(Self::not_found());
        }
        let mut uploaded = vec![];
        for file in files {
            let id = state.next_id("img");
            uploaded.push(ProductImage {
                id: id.clone(),
                path: file.file_name.clone(),
                product_id: product_id.to_string(),
            });
        }
        state.images.extend(uploaded.iter().cloned());
        if let Some(product) = state.products.iter_mut().find(|p| p.id == product_id) {
            product.product_images.extend(uploaded.iter().map(|i| ImageRef {
                id: i.id.clone(),
                path: i.path.clone(),
            }));
        }
        Ok(uploaded)
    }

    async fn delete_images(&self, ids: &[String]) -> ApiResult<()> {
        self.enter("delete_images")?;
        self.current_user()?;
        let mut state = self.state();
        state.images.retain(|i| !ids.contains(&i.id));
        for product in state.products.iter_mut() {
            product.product_images.retain(|i| !ids.contains(&i.id));
        }
        Ok(())
    }
}

/// Memory store whose writes can be switched to fail.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self, key: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.check(key)?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check(key)?;
        self.inner.remove(key).await
    }
}
