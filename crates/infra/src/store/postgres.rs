//! Postgres-backed market store.
//!
//! One sqlx transaction per trait call discharges the atomic-commit
//! contract. The review commits guard the status flip with
//! `UPDATE ... WHERE status = 'pending'`: zero rows affected means the
//! request already reached a terminal state (or lost a concurrent race) and
//! the transaction is rolled back untouched.
//!
//! The image table keeps the two-nullable-foreign-key representation with a
//! CHECK constraint (`(product_id IS NULL) <> (product_request_id IS NULL)`);
//! the [`ImageOwner`] sum type is restored at this boundary.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use campusmarket_catalog::{ListingFields, Product, ShippingMethod};
use campusmarket_core::{ImageId, ProductId, RequestId, UserId};
use campusmarket_moderation::{
    ApprovalEffect, ImageOwner, ProductImage, ProductRequest, RequestStatus,
};

use super::{
    ApprovedResolution, CommitOutcome, MarketStore, RejectedResolution, RequestDetail,
    RequestFilter, StoreError, UserRecord,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    display_name TEXT NOT NULL,
    role TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS products (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    price_cents BIGINT NOT NULL CHECK (price_cents >= 0),
    description TEXT,
    shipping_time_hours INT NOT NULL CHECK (shipping_time_hours >= 0),
    shipping_method TEXT NOT NULL,
    shipping_fee_cents BIGINT NOT NULL CHECK (shipping_fee_cents >= 0),
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS product_requests (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    price_cents BIGINT NOT NULL CHECK (price_cents >= 0),
    description TEXT,
    shipping_time_hours INT NOT NULL CHECK (shipping_time_hours >= 0),
    shipping_method TEXT NOT NULL,
    shipping_fee_cents BIGINT NOT NULL CHECK (shipping_fee_cents >= 0),
    status TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    reviewed_at TIMESTAMPTZ,
    review_comment TEXT,
    requested_by UUID NOT NULL,
    reviewed_by UUID,
    original_product_id UUID
);

CREATE TABLE IF NOT EXISTS product_images (
    id UUID PRIMARY KEY,
    product_id UUID REFERENCES products (id),
    product_request_id UUID REFERENCES product_requests (id),
    image_url TEXT NOT NULL,
    is_main BOOLEAN NOT NULL,
    sort_order INT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    CHECK ((product_id IS NULL) <> (product_request_id IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_product_images_product
    ON product_images (product_id) WHERE product_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_product_images_request
    ON product_images (product_request_id) WHERE product_request_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_product_requests_status
    ON product_requests (status);
"#;

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn parse_error(what: &str, detail: impl core::fmt::Display) -> StoreError {
    StoreError::Backend(format!("corrupt {what} column: {detail}"))
}

/// Postgres-backed [`MarketStore`].
#[derive(Debug, Clone)]
pub struct PostgresMarketStore {
    pool: PgPool,
}

impl PostgresMarketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn fetch_user(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query("SELECT id, display_name, role FROM users WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|r| {
            Ok(UserRecord {
                id: UserId::from_uuid(r.try_get::<Uuid, _>("id").map_err(backend)?),
                display_name: r.try_get("display_name").map_err(backend)?,
                role: r.try_get("role").map_err(backend)?,
            })
        })
        .transpose()
    }

    async fn staged_images(&self, request: RequestId) -> Result<Vec<ProductImage>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, product_id, product_request_id, image_url, is_main, sort_order, created_at \
             FROM product_images WHERE product_request_id = $1 \
             ORDER BY sort_order, created_at, id",
        )
        .bind(*request.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(image_from_row).collect()
    }

    async fn detail(&self, request: ProductRequest) -> Result<RequestDetail, StoreError> {
        let images = self.staged_images(request.id).await?;
        let requester = self.fetch_user(request.requested_by).await?;
        let reviewer = match request.reviewed_by {
            Some(id) => self.fetch_user(id).await?,
            None => None,
        };
        let original_product = match request.original_product_id {
            Some(id) => self.get_product(id).await?,
            None => None,
        };
        Ok(RequestDetail {
            request,
            images,
            requester,
            reviewer,
            original_product,
        })
    }
}

fn fields_from_row(row: &sqlx::postgres::PgRow) -> Result<ListingFields, StoreError> {
    let method: String = row.try_get("shipping_method").map_err(backend)?;
    Ok(ListingFields {
        name: row.try_get("name").map_err(backend)?,
        price_cents: row.try_get::<i64, _>("price_cents").map_err(backend)? as u64,
        description: row.try_get("description").map_err(backend)?,
        shipping_time_hours: row.try_get::<i32, _>("shipping_time_hours").map_err(backend)? as u16,
        shipping_method: method
            .parse::<ShippingMethod>()
            .map_err(|e| parse_error("shipping_method", e))?,
        shipping_fee_cents: row.try_get::<i64, _>("shipping_fee_cents").map_err(backend)? as u64,
    })
}

fn request_from_row(row: &sqlx::postgres::PgRow) -> Result<ProductRequest, StoreError> {
    let status: String = row.try_get("status").map_err(backend)?;
    Ok(ProductRequest {
        id: RequestId::from_uuid(row.try_get::<Uuid, _>("id").map_err(backend)?),
        fields: fields_from_row(row)?,
        status: status
            .parse::<RequestStatus>()
            .map_err(|e| parse_error("status", e))?,
        created_at: row.try_get("created_at").map_err(backend)?,
        reviewed_at: row.try_get("reviewed_at").map_err(backend)?,
        review_comment: row.try_get("review_comment").map_err(backend)?,
        requested_by: UserId::from_uuid(row.try_get::<Uuid, _>("requested_by").map_err(backend)?),
        reviewed_by: row
            .try_get::<Option<Uuid>, _>("reviewed_by")
            .map_err(backend)?
            .map(UserId::from_uuid),
        original_product_id: row
            .try_get::<Option<Uuid>, _>("original_product_id")
            .map_err(backend)?
            .map(ProductId::from_uuid),
    })
}

fn product_from_row(row: &sqlx::postgres::PgRow) -> Result<Product, StoreError> {
    let fields = fields_from_row(row)?;
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id").map_err(backend)?),
        name: fields.name,
        price_cents: fields.price_cents,
        description: fields.description,
        shipping_time_hours: fields.shipping_time_hours,
        shipping_method: fields.shipping_method,
        shipping_fee_cents: fields.shipping_fee_cents,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

fn image_from_row(row: &sqlx::postgres::PgRow) -> Result<ProductImage, StoreError> {
    let product: Option<Uuid> = row.try_get("product_id").map_err(backend)?;
    let request: Option<Uuid> = row.try_get("product_request_id").map_err(backend)?;
    let owner = match (product, request) {
        (Some(p), None) => ImageOwner::Product(ProductId::from_uuid(p)),
        (None, Some(r)) => ImageOwner::Request(RequestId::from_uuid(r)),
        // Unreachable while the CHECK constraint holds.
        _ => return Err(StoreError::Invariant("image row with no single owner".into())),
    };
    Ok(ProductImage {
        id: ImageId::from_uuid(row.try_get::<Uuid, _>("id").map_err(backend)?),
        owner,
        url: row.try_get("image_url").map_err(backend)?,
        is_main: row.try_get("is_main").map_err(backend)?,
        sort_order: row.try_get::<i32, _>("sort_order").map_err(backend)? as u32,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

async fn insert_product(
    tx: &mut Transaction<'_, Postgres>,
    product: &Product,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO products \
         (id, name, price_cents, description, shipping_time_hours, shipping_method, shipping_fee_cents, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(*product.id.as_uuid())
    .bind(&product.name)
    .bind(product.price_cents as i64)
    .bind(&product.description)
    .bind(product.shipping_time_hours as i32)
    .bind(product.shipping_method.as_str())
    .bind(product.shipping_fee_cents as i64)
    .bind(product.created_at)
    .execute(&mut **tx)
    .await
    .map_err(backend)?;
    Ok(())
}

async fn reparent_staged_images(
    tx: &mut Transaction<'_, Postgres>,
    from: RequestId,
    to: ProductId,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE product_images SET product_id = $2, product_request_id = NULL \
         WHERE product_request_id = $1",
    )
    .bind(*from.as_uuid())
    .bind(*to.as_uuid())
    .execute(&mut **tx)
    .await
    .map_err(backend)?;
    Ok(())
}

#[async_trait]
impl MarketStore for PostgresMarketStore {
    async fn insert_request(
        &self,
        request: &ProductRequest,
        staged: &[ProductImage],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            "INSERT INTO product_requests \
             (id, name, price_cents, description, shipping_time_hours, shipping_method, shipping_fee_cents, \
              status, created_at, reviewed_at, review_comment, requested_by, reviewed_by, original_product_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(*request.id.as_uuid())
        .bind(&request.fields.name)
        .bind(request.fields.price_cents as i64)
        .bind(&request.fields.description)
        .bind(request.fields.shipping_time_hours as i32)
        .bind(request.fields.shipping_method.as_str())
        .bind(request.fields.shipping_fee_cents as i64)
        .bind(request.status.as_str())
        .bind(request.created_at)
        .bind(request.reviewed_at)
        .bind(&request.review_comment)
        .bind(*request.requested_by.as_uuid())
        .bind(request.reviewed_by.map(|u| *u.as_uuid()))
        .bind(request.original_product_id.map(|p| *p.as_uuid()))
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        for image in staged {
            let (product_id, request_id) = match image.owner {
                ImageOwner::Product(p) => (Some(*p.as_uuid()), None),
                ImageOwner::Request(r) => (None, Some(*r.as_uuid())),
            };
            sqlx::query(
                "INSERT INTO product_images \
                 (id, product_id, product_request_id, image_url, is_main, sort_order, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(*image.id.as_uuid())
            .bind(product_id)
            .bind(request_id)
            .bind(&image.url)
            .bind(image.is_main)
            .bind(image.sort_order as i32)
            .bind(image.created_at)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)
    }

    async fn get_request(&self, id: RequestId) -> Result<Option<RequestDetail>, StoreError> {
        let row = sqlx::query("SELECT * FROM product_requests WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match row {
            Some(row) => Ok(Some(self.detail(request_from_row(&row)?).await?)),
            None => Ok(None),
        }
    }

    async fn list_requests(&self, filter: RequestFilter) -> Result<Vec<RequestDetail>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM product_requests \
             WHERE ($1::TEXT IS NULL OR status = $1) \
               AND ($2::UUID IS NULL OR requested_by = $2) \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.requested_by.map(|u| *u.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut details = Vec::with_capacity(rows.len());
        for row in &rows {
            details.push(self.detail(request_from_row(row)?).await?);
        }
        Ok(details)
    }

    #[instrument(skip(self, resolution), fields(request_id = %resolution.request_id))]
    async fn commit_approval(
        &self,
        resolution: &ApprovedResolution,
    ) -> Result<CommitOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // CAS on the status column; losing the race rolls everything back.
        let flipped = sqlx::query(
            "UPDATE product_requests \
             SET status = 'approved', reviewed_at = $2, reviewed_by = $3 \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(*resolution.request_id.as_uuid())
        .bind(resolution.reviewed_at)
        .bind(*resolution.reviewed_by.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        if flipped.rows_affected() == 0 {
            return Ok(CommitOutcome::AlreadyProcessed);
        }

        match &resolution.effect {
            ApprovalEffect::CreateProduct { product } => {
                insert_product(&mut tx, product).await?;
                reparent_staged_images(&mut tx, resolution.request_id, product.id).await?;
            }
            ApprovalEffect::UpdateProduct { product_id, fields } => {
                let updated = sqlx::query(
                    "UPDATE products SET name = $2, price_cents = $3, description = $4, \
                     shipping_time_hours = $5, shipping_method = $6, shipping_fee_cents = $7 \
                     WHERE id = $1",
                )
                .bind(*product_id.as_uuid())
                .bind(&fields.name)
                .bind(fields.price_cents as i64)
                .bind(&fields.description)
                .bind(fields.shipping_time_hours as i32)
                .bind(fields.shipping_method.as_str())
                .bind(fields.shipping_fee_cents as i64)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
                if updated.rows_affected() == 0 {
                    // Target vanished between review load and commit: abort
                    // before anything becomes visible.
                    return Err(StoreError::ProductMissing);
                }

                sqlx::query("DELETE FROM product_images WHERE product_id = $1")
                    .bind(*product_id.as_uuid())
                    .execute(&mut *tx)
                    .await
                    .map_err(backend)?;
                reparent_staged_images(&mut tx, resolution.request_id, *product_id).await?;
            }
        }

        tx.commit().await.map_err(backend)?;
        Ok(CommitOutcome::Applied)
    }

    #[instrument(skip(self, resolution), fields(request_id = %resolution.request_id))]
    async fn commit_rejection(
        &self,
        resolution: &RejectedResolution,
    ) -> Result<CommitOutcome, StoreError> {
        let flipped = sqlx::query(
            "UPDATE product_requests \
             SET status = 'rejected', reviewed_at = $2, reviewed_by = $3, review_comment = $4 \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(*resolution.request_id.as_uuid())
        .bind(resolution.reviewed_at)
        .bind(*resolution.reviewed_by.as_uuid())
        .bind(&resolution.review_comment)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if flipped.rows_affected() == 0 {
            Ok(CommitOutcome::AlreadyProcessed)
        } else {
            Ok(CommitOutcome::Applied)
        }
    }

    #[instrument(skip(self))]
    async fn delete_request(&self, id: RequestId) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Only images still owned by the request cascade; re-parented rows
        // have product_request_id = NULL and are untouched.
        sqlx::query("DELETE FROM product_images WHERE product_request_id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        let deleted = sqlx::query("DELETE FROM product_requests WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT * FROM products WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query("SELECT * FROM products ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(product_from_row).collect()
    }

    async fn product_images(&self, id: ProductId) -> Result<Vec<ProductImage>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, product_id, product_request_id, image_url, is_main, sort_order, created_at \
             FROM product_images WHERE product_id = $1 \
             ORDER BY sort_order, created_at, id",
        )
        .bind(*id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(image_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query("DELETE FROM product_images WHERE product_id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        let deleted = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn upsert_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (id, display_name, role) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET display_name = EXCLUDED.display_name, role = EXCLUDED.role",
        )
        .bind(*user.id.as_uuid())
        .bind(&user.display_name)
        .bind(&user.role)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}
