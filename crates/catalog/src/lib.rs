//! `campusmarket-catalog` — live product listings.

pub mod product;

pub use product::{ListingFields, Product, ShippingMethod, MAX_NAME_LEN, MAX_PRICE_CENTS, MAX_SHIPPING_HOURS};
