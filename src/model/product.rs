use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A marketplace listing as the backend reports it.
///
/// Create responses only carry the scalar fields, so the embedded
/// collections and the owner summary default to empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    pub is_new: bool,
    /// Minor currency units.
    pub price: i64,
    pub accept_trade: bool,
    pub user_id: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub product_images: Vec<ImageRef>,
    #[serde(default)]
    pub payment_methods: Vec<PaymentMethod>,
    #[serde(default)]
    pub user: Option<ProductOwner>,
}

impl Product {
    pub fn accepts(&self, key: PaymentKey) -> bool {
        self.payment_methods.iter().any(|m| m.key == key.as_str())
    }

    pub fn price_display(&self) -> String {
        format_price(self.price)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOwner {
    #[serde(default)]
    pub avatar: Option<String>,
    pub name: String,
    pub tel: String,
}

/// Image metadata returned by an upload and mirrored in the local cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductImage {
    pub id: String,
    pub path: String,
    pub product_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKey {
    Boleto,
    Pix,
    Cash,
    Card,
    Deposit,
}

impl PaymentKey {
    pub const ALL: [PaymentKey; 5] = [
        PaymentKey::Boleto,
        PaymentKey::Pix,
        PaymentKey::Cash,
        PaymentKey::Card,
        PaymentKey::Deposit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentKey::Boleto => "boleto",
            PaymentKey::Pix => "pix",
            PaymentKey::Cash => "cash",
            PaymentKey::Card => "card",
            PaymentKey::Deposit => "deposit",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PaymentKey::Boleto => "Boleto",
            PaymentKey::Pix => "Pix",
            PaymentKey::Cash => "Cash",
            PaymentKey::Card => "Credit card",
            PaymentKey::Deposit => "Bank deposit",
        }
    }
}

impl fmt::Display for PaymentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown payment method '{}'", s))
    }
}

/// Validated body for `POST /products` and `PUT /products/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub is_new: bool,
    pub price: i64,
    pub accept_trade: bool,
    pub payment_methods: Vec<PaymentKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub tel: String,
    pub password: String,
    /// Sent as a multipart part instead of JSON when set.
    #[serde(skip)]
    pub avatar: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub tel: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl User {
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Number of listings whose active flag is set. Never cached.
pub fn active_count(products: &[Product]) -> usize {
    products.iter().filter(|p| p.is_active).count()
}

pub fn format_price(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let minor = minor.unsigned_abs();
    format!("{}{}.{:02}", sign, minor / 100, minor % 100)
}
