mod filter;
pub mod form;
mod product;

pub use filter::{AdStatus, FilterOptions};
pub use product::{
    active_count, format_price, AuthSession, ImageRef, NewProduct, NewUser, PaymentKey, PaymentMethod, Product,
    ProductImage, ProductOwner, User,
};

#[cfg(test)]
pub(crate) use product::fixtures;
