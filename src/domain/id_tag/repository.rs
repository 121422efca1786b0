//! Id tag and user repository interfaces.

use async_trait::async_trait;

use super::model::{IdTag, User};
use crate::domain::tenant::TenantId;
use crate::support::errors::CoreResult;

#[async_trait]
pub trait IdTagRepository: Send + Sync {
    async fn find_by_tag(&self, tenant_id: TenantId, tag_id: &str) -> CoreResult<Option<IdTag>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, tenant_id: TenantId, user_id: &str) -> CoreResult<Option<User>>;
    async fn clear_default_car(&self, tenant_id: TenantId, user_id: &str) -> CoreResult<()>;
}
