use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campusmarket_core::{DomainError, DomainResult, ProductId};

/// Upper bound for listing names (characters).
pub const MAX_NAME_LEN: usize = 100;

/// Upper bound for prices and shipping fees, in smallest currency unit.
pub const MAX_PRICE_CENTS: u64 = 999_999_999;

/// Upper bound for the promised shipping window, in hours.
pub const MAX_SHIPPING_HOURS: u16 = 999;

/// How a seller hands the item over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    /// Courier delivery.
    #[default]
    Express,
    /// In-person handover on campus.
    Meetup,
    /// Shipped with no fee charged.
    FreeShipping,
}

impl ShippingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingMethod::Express => "express",
            ShippingMethod::Meetup => "meetup",
            ShippingMethod::FreeShipping => "free_shipping",
        }
    }
}

impl core::fmt::Display for ShippingMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ShippingMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "express" => Ok(ShippingMethod::Express),
            "meetup" => Ok(ShippingMethod::Meetup),
            "free_shipping" => Ok(ShippingMethod::FreeShipping),
            other => Err(DomainError::validation(format!(
                "unknown shipping method '{other}'"
            ))),
        }
    }
}

/// The seller-editable field set shared by live products and requests.
///
/// Prices are carried in smallest currency unit (cents); non-negativity is
/// guaranteed by the type, the upper bounds by [`ListingFields::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingFields {
    pub name: String,
    pub price_cents: u64,
    pub description: Option<String>,
    pub shipping_time_hours: u16,
    pub shipping_method: ShippingMethod,
    pub shipping_fee_cents: u64,
}

impl ListingFields {
    pub fn validate(&self) -> DomainResult<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::validation(format!(
                "name cannot exceed {MAX_NAME_LEN} characters"
            )));
        }
        if self.price_cents > MAX_PRICE_CENTS {
            return Err(DomainError::validation("price is out of range"));
        }
        if self.shipping_fee_cents > MAX_PRICE_CENTS {
            return Err(DomainError::validation("shipping fee is out of range"));
        }
        if self.shipping_time_hours > MAX_SHIPPING_HOURS {
            return Err(DomainError::validation(format!(
                "shipping time cannot exceed {MAX_SHIPPING_HOURS} hours"
            )));
        }
        Ok(())
    }
}

/// A live, purchasable listing.
///
/// Products are only ever created by approving a new-listing request, and
/// only ever mutated by approving an edit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price_cents: u64,
    pub description: Option<String>,
    pub shipping_time_hours: u16,
    pub shipping_method: ShippingMethod,
    pub shipping_fee_cents: u64,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Materialize a product from a validated field set.
    pub fn from_fields(id: ProductId, fields: &ListingFields, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: fields.name.clone(),
            price_cents: fields.price_cents,
            description: fields.description.clone(),
            shipping_time_hours: fields.shipping_time_hours,
            shipping_method: fields.shipping_method,
            shipping_fee_cents: fields.shipping_fee_cents,
            created_at: now,
        }
    }

    /// Overwrite the seller-editable fields in place (edit-request approval).
    ///
    /// `id` and `created_at` are immutable.
    pub fn apply_fields(&mut self, fields: &ListingFields) {
        self.name = fields.name.clone();
        self.price_cents = fields.price_cents;
        self.description = fields.description.clone();
        self.shipping_time_hours = fields.shipping_time_hours;
        self.shipping_method = fields.shipping_method;
        self.shipping_fee_cents = fields.shipping_fee_cents;
    }

    pub fn fields(&self) -> ListingFields {
        ListingFields {
            name: self.name.clone(),
            price_cents: self.price_cents,
            description: self.description.clone(),
            shipping_time_hours: self.shipping_time_hours,
            shipping_method: self.shipping_method,
            shipping_fee_cents: self.shipping_fee_cents,
        }
    }
}
