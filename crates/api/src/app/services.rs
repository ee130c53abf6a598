//! Infrastructure wiring: store backend + file store + lifecycle manager.
//!
//! The backend is chosen at startup from the environment: in-memory by
//! default (dev/test), Postgres when `USE_PERSISTENT_STORES=true` and the
//! `postgres` feature is enabled.

use std::sync::Arc;

use campusmarket_catalog::Product;
use campusmarket_core::{ProductId, RequestId};
use campusmarket_infra::{
    ApprovalReceipt, EditSubmission, InMemoryMarketStore, ModerationError, ModerationService,
    RequestDetail, RequestFilter, UserRecord,
};
use campusmarket_media::{ImageUpload, LocalFileStore};
use campusmarket_moderation::{ProductImage, ProductRequest, ReviewOutcome};

use campusmarket_auth::Principal;
use campusmarket_catalog::ListingFields;

#[cfg(feature = "postgres")]
use campusmarket_infra::PostgresMarketStore;
#[cfg(feature = "postgres")]
use sqlx::PgPool;

type InMemoryModeration = ModerationService<InMemoryMarketStore, Arc<LocalFileStore>>;
#[cfg(feature = "postgres")]
type PersistentModeration = ModerationService<PostgresMarketStore, Arc<LocalFileStore>>;

pub enum AppServices {
    InMemory { moderation: InMemoryModeration },
    #[cfg(feature = "postgres")]
    Persistent { moderation: PersistentModeration },
}

pub async fn build_services() -> AppServices {
    let media_root =
        std::env::var("MEDIA_ROOT").unwrap_or_else(|_| "./data/media".to_string());
    let files = Arc::new(LocalFileStore::new(media_root, "/media/products"));

    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if use_persistent {
        #[cfg(feature = "postgres")]
        {
            return build_persistent_services(files).await;
        }
        #[cfg(not(feature = "postgres"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but postgres feature not enabled, falling back to in-memory"
            );
        }
    }

    AppServices::InMemory {
        moderation: ModerationService::new(InMemoryMarketStore::new(), files),
    }
}

#[cfg(feature = "postgres")]
async fn build_persistent_services(files: Arc<LocalFileStore>) -> AppServices {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to Postgres");

    let store = PostgresMarketStore::new(pool);
    store
        .ensure_schema()
        .await
        .expect("Failed to ensure database schema");

    AppServices::Persistent {
        moderation: ModerationService::new(store, files),
    }
}

impl AppServices {
    pub async fn submit(
        &self,
        principal: &Principal,
        fields: ListingFields,
        uploads: Vec<ImageUpload>,
        edit: Option<EditSubmission>,
    ) -> Result<ProductRequest, ModerationError> {
        match self {
            AppServices::InMemory { moderation } => {
                moderation.submit(principal, fields, uploads, edit).await
            }
            #[cfg(feature = "postgres")]
            AppServices::Persistent { moderation } => {
                moderation.submit(principal, fields, uploads, edit).await
            }
        }
    }

    pub async fn approve(
        &self,
        principal: &Principal,
        id: RequestId,
    ) -> Result<ReviewOutcome<ApprovalReceipt>, ModerationError> {
        match self {
            AppServices::InMemory { moderation } => moderation.approve(principal, id).await,
            #[cfg(feature = "postgres")]
            AppServices::Persistent { moderation } => moderation.approve(principal, id).await,
        }
    }

    pub async fn reject(
        &self,
        principal: &Principal,
        id: RequestId,
        comment: Option<String>,
    ) -> Result<ReviewOutcome<()>, ModerationError> {
        match self {
            AppServices::InMemory { moderation } => {
                moderation.reject(principal, id, comment).await
            }
            #[cfg(feature = "postgres")]
            AppServices::Persistent { moderation } => {
                moderation.reject(principal, id, comment).await
            }
        }
    }

    pub async fn delete(
        &self,
        principal: &Principal,
        id: RequestId,
    ) -> Result<(), ModerationError> {
        match self {
            AppServices::InMemory { moderation } => moderation.delete(principal, id).await,
            #[cfg(feature = "postgres")]
            AppServices::Persistent { moderation } => moderation.delete(principal, id).await,
        }
    }

    pub async fn get_request(
        &self,
        id: RequestId,
    ) -> Result<Option<RequestDetail>, ModerationError> {
        match self {
            AppServices::InMemory { moderation } => moderation.get_request(id).await,
            #[cfg(feature = "postgres")]
            AppServices::Persistent { moderation } => moderation.get_request(id).await,
        }
    }

    pub async fn list_requests(
        &self,
        filter: RequestFilter,
    ) -> Result<Vec<RequestDetail>, ModerationError> {
        match self {
            AppServices::InMemory { moderation } => moderation.list_requests(filter).await,
            #[cfg(feature = "postgres")]
            AppServices::Persistent { moderation } => moderation.list_requests(filter).await,
        }
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Option<Product>, ModerationError> {
        match self {
            AppServices::InMemory { moderation } => moderation.get_product(id).await,
            #[cfg(feature = "postgres")]
            AppServices::Persistent { moderation } => moderation.get_product(id).await,
        }
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, ModerationError> {
        match self {
            AppServices::InMemory { moderation } => moderation.list_products().await,
            #[cfg(feature = "postgres")]
            AppServices::Persistent { moderation } => moderation.list_products().await,
        }
    }

    pub async fn product_images(
        &self,
        id: ProductId,
    ) -> Result<Vec<ProductImage>, ModerationError> {
        match self {
            AppServices::InMemory { moderation } => moderation.product_images(id).await,
            #[cfg(feature = "postgres")]
            AppServices::Persistent { moderation } => moderation.product_images(id).await,
        }
    }

    pub async fn remove_product(
        &self,
        principal: &Principal,
        id: ProductId,
    ) -> Result<(), ModerationError> {
        match self {
            AppServices::InMemory { moderation } => moderation.remove_product(principal, id).await,
            #[cfg(feature = "postgres")]
            AppServices::Persistent { moderation } => {
                moderation.remove_product(principal, id).await
            }
        }
    }

    pub async fn record_user(&self, user: &UserRecord) -> Result<(), ModerationError> {
        match self {
            AppServices::InMemory { moderation } => moderation.record_user(user).await,
            #[cfg(feature = "postgres")]
            AppServices::Persistent { moderation } => moderation.record_user(user).await,
        }
    }
}
