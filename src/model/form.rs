//! Typed form schemas.
//!
//! Every form is checked as a whole before any request is made, so the
//! caller gets all failing fields at once.

use std::fmt;
use std::path::PathBuf;

use itertools::Itertools;

use super::{format_price, NewProduct, NewUser, PaymentKey, Product};

const MIN_PASSWORD_LEN: usize = 6;

/// Images a single listing may carry, kept and new together.
pub const MAX_AD_IMAGES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .join("; ");
        f.write_str(&joined)
    }
}

impl std::error::Error for ValidationErrors {}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

impl SignInForm {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if blank(&self.email) {
            errors.push("email", "Enter your e-mail.");
        }
        if self.password.is_empty() {
            errors.push("password", "Enter your password.");
        }
        errors.into_result(|| ())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignUpForm {
    pub name: String,
    pub email: String,
    pub tel: String,
    pub password: String,
    pub password_confirm: String,
    pub avatar: Option<PathBuf>,
}

impl SignUpForm {
    pub fn validate(&self) -> Result<NewUser, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if blank(&self.name) {
            errors.push("name", "Enter your name.");
        }
        if blank(&self.email) {
            errors.push("email", "Enter your e-mail.");
        } else if !looks_like_email(self.email.trim()) {
            errors.push("email", "Invalid e-mail.");
        }
        if blank(&self.tel) {
            errors.push("tel", "Enter your phone number.");
        }
        if self.password.is_empty() {
            errors.push("password", "Enter a password.");
        } else if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(
                "password",
                format!("The password must have at least {} characters.", MIN_PASSWORD_LEN),
            );
        }
        if self.password_confirm.is_empty() {
            errors.push("password_confirm", "Confirm the password.");
        } else if self.password_confirm != self.password {
            errors.push("password_confirm", "The password confirmation does not match.");
        }
        errors.into_result(|| NewUser {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            tel: self.tel.trim().to_string(),
            password: self.password.clone(),
            avatar: self.avatar.clone(),
        })
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// Fields of the new/edit ad screen, as entered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdForm {
    pub name: String,
    pub description: String,
    pub is_new: Option<bool>,
    /// Major units as typed, e.g. `"49,90"`.
    pub price: String,
    pub accept_trade: Option<bool>,
    pub payment_methods: Vec<PaymentKey>,
}

impl AdForm {
    /// Prefills the form with a listing's current values for editing.
    pub fn from_product(product: &Product) -> Self {
        AdForm {
            name: product.name.clone(),
            description: product.description.clone(),
            is_new: Some(product.is_new),
            price: format_price(product.price),
            accept_trade: Some(product.accept_trade),
            payment_methods: product
                .payment_methods
                .iter()
                .filter_map(|m| m.key.parse().ok())
                .collect(),
        }
    }

    /// `image_count` covers both kept and newly attached images.
    pub fn validate(&self, image_count: usize) -> Result<NewProduct, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if blank(&self.name) {
            errors.push("name", "Enter a name.");
        }
        if blank(&self.description) {
            errors.push("description", "Enter a description.");
        }
        if self.is_new.is_none() {
            errors.push("is_new", "Choose the product condition.");
        }
        let price = if blank(&self.price) {
            errors.push("price", "Enter the price.");
            None
        } else {
            match parse_price(&self.price) {
                Some(minor) => Some(minor),
                None => {
                    errors.push("price", "Enter a valid price, e.g. 49.90.");
                    None
                }
            }
        };
        if self.payment_methods.is_empty() {
            errors.push("payment_methods", "Choose at least 1 payment method.");
        }
        if image_count == 0 {
            errors.push("images", "Select at least 1 product image.");
        } else if image_count > MAX_AD_IMAGES {
            errors.push("images", "Select at most 3 product images.");
        }
        errors.into_result(|| NewProduct {
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            is_new: self.is_new.unwrap_or_default(),
            price: price.unwrap_or_default(),
            accept_trade: self.accept_trade.unwrap_or(false),
            payment_methods: self.payment_methods.iter().copied().unique().collect(),
        })
    }
}

/// Parses a non-negative amount in major units into minor units.
///
/// Accepts `.` or `,` as the decimal separator and at most two fractional
/// digits.
pub fn parse_price(input: &str) -> Option<i64> {
    let input = input.trim();
    let (whole, fraction) = match input.find(|c: char| c == '.' || c == ',') {
        Some(at) => (&input[..at], &input[at + 1..]),
        None => (input, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
        || fraction.len() > 2
    {
        return None;
    }
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let cents: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(cents)
}
