use std::time::Duration;

use async_trait::async_trait;
use log::*;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{CatalogApi, ImageUpload, TokenPair};
use crate::error::{ApiError, ApiResult};
use crate::model::{AuthSession, FilterOptions, NewProduct, NewUser, Product, ProductImage};

/// Error body the backend sends with non-success statuses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteImagesBody<'a> {
    product_images_ids: &'a [String],
}

/// REST client for the marketplace backend.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCatalog {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpCatalog {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Public URL of an uploaded image or avatar.
    pub fn image_url(&self, path: &str) -> String {
        format!("{}/images/{}", self.base_url, path)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let request = self.authorized(request);
        let response = request.send().await?;
        let status = response.status();
        debug!("{} {}", status.as_u16(), response.url());
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await?;
        Err(match serde_json::from_str::<ErrorBody>(&body) {
            Ok(e) => ApiError::Application {
                status: status.as_u16(),
                message: e.message,
            },
            Err(_) => ApiError::UnexpectedResponse {
                status: status.as_u16(),
                body,
            },
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = self.send(request).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            ApiError::Unknown(format!("Could not decode response: {}", e))
        })
    }

    async fn empty(&self, request: RequestBuilder) -> ApiResult<()> {
        self.send(request).await.map(|_| ())
    }

    async fn file_part(upload: &ImageUpload) -> ApiResult<Part> {
        let data = tokio::fs::read(&upload.path)
            .await
            .map_err(|source| ApiError::File {
                path: upload.path.clone(),
                source,
            })?;
        let mime = mime_guess::from_path(&upload.path).first_or_octet_stream();
        let part = Part::bytes(data)
            .file_name(upload.file_name.clone())
            .mime_str(mime.essence_str())?;
        Ok(part)
    }
}

#[async_trait]
impl CatalogApi for HttpCatalog {
    fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    async fn authenticate(&self, email: &str, password: &str) -> ApiResult<AuthSession> {
        #[derive(Serialize)]
        struct SignIn<'a> {
            email: &'a str,
            password: &'a str,
        }
        self.json(self.client.post(self.url("sessions")).json(&SignIn { email, password }))
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> ApiResult<TokenPair> {
        #[derive(Serialize)]
        struct Refresh<'a> {
            refresh_token: &'a str,
        }
        self.json(
            self.client
                .post(self.url("sessions/refresh-token"))
                .json(&Refresh { refresh_token }),
        )
        .await
    }

    async fn register(&self, user: &NewUser) -> ApiResult<()> {
        let request = self.client.post(self.url("users"));
        let request = match &user.avatar {
            None => request.json(user),
            Some(path) => {
                let upload = ImageUpload::named_after(&user.name, 0, path);
                let form = Form::new()
                    .part("avatar", Self::file_part(&upload).await?)
                    .text("name", user.name.clone())
                    .text("email", user.email.clone())
                    .text("password", user.password.clone())
                    .text("tel", user.tel.clone());
                request.multipart(form)
            }
        };
        self.empty(request).await
    }

    async fn list(&self, filter: Option<&FilterOptions>) -> ApiResult<Vec<Product>> {
        let query = filter.map(FilterOptions::to_query).unwrap_or_default();
        self.json(self.client.get(self.url("products")).query(&query))
            .await
    }

    async fn list_own(&self) -> ApiResult<Vec<Product>> {
        self.json(self.client.get(self.url("users/products"))).await
    }

    async fn get(&self, id: &str) -> ApiResult<Product> {
        self.json(self.client.get(self.url(&format!("products/{}", id))))
            .await
    }

    async fn create(&self, product: &NewProduct) -> ApiResult<Product> {
        self.json(self.client.post(self.url("products")).json(product))
            .await
    }

    async fn update(&self, id: &str, product: &NewProduct) -> ApiResult<()> {
        self.empty(self.client.put(self.url(&format!("products/{}", id))).json(product))
            .await
    }

    async fn set_active(&self, id: &str, is_active: bool) -> ApiResult<()> {
        #[derive(Serialize)]
        struct Patch {
            is_active: bool,
        }
        self.empty(
            self.client
                .patch(self.url(&format!("products/{}", id)))
                .json(&Patch { is_active }),
        )
        .await
    }

    async fn delete(&self, id: &str) -> ApiResult<()> {
        self.empty(self.client.delete(self.url(&format!("products/{}", id))))
            .await
    }

    async fn upload_images(
        &self,
        product_id: &str,
        files: &[ImageUpload],
    ) -> ApiResult<Vec<ProductImage>> {
        let mut form = Form::new().text("product_id", product_id.to_string());
        for upload in files {
            form = form.part("images", Self::file_part(upload).await?);
        }
        debug!("Uploading {} images for product {}", files.len(), product_id);
        self.json(self.client.post(self.url("products/images")).multipart(form))
            .await
    }

    async fn delete_images(&self, ids: &[String]) -> ApiResult<()> {
        self.empty(
            self.client
                .delete(self.url("products/images"))
                .json(&DeleteImagesBody {
                    product_images_ids: ids,
                }),
        )
        .await
    }
}
