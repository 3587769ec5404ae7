use tracing::debug;

use crate::cache::keys::CachePrefix;
use crate::cache::operations::store::CacheStore;

/// 触发缓存失效的业务实体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Inspection,
    User,
    Template,
    ReferenceData,
}

impl EntityKind {
    /// 实体自身的缓存前缀
    fn own_prefix(&self) -> CachePrefix {
        match self {
            EntityKind::Inspection => CachePrefix::Inspection,
            EntityKind::User => CachePrefix::UserProfile,
            EntityKind::Template => CachePrefix::Template,
            EntityKind::ReferenceData => CachePrefix::ReferenceData,
        }
    }

    /// 可能引用该实体的列表/聚合缓存
    fn dependent_prefixes(&self) -> &'static [CachePrefix] {
        match self {
            EntityKind::Inspection => &[
                CachePrefix::InspectionsList,
                CachePrefix::DashboardStats,
                CachePrefix::Analytics,
            ],
            EntityKind::User => &[CachePrefix::InspectionsList, CachePrefix::Analytics],
            EntityKind::Template => &[CachePrefix::TemplatesList, CachePrefix::ReferenceData],
            EntityKind::ReferenceData => &[CachePrefix::ReferenceData],
        }
    }
}

/// 缓存失效操作
#[derive(Clone)]
pub struct CacheInvalidator {
    store: CacheStore,
}

impl CacheInvalidator {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    /// 删除实体自身的缓存（给定 id 时）以及所有相关列表缓存，返回删除的键数
    pub async fn invalidate(&self, kind: EntityKind, id: Option<&str>) -> u64 {
        let mut removed = 0;

        if let Some(id) = id {
            if self.store.delete(&kind.own_prefix().key(id)).await {
                removed += 1;
            }
        }

        for prefix in kind.dependent_prefixes() {
            removed += self.store.delete_pattern(&prefix.pattern()).await;
        }

        debug!(?kind, id = ?id, removed, "Invalidated cache entries");
        removed
    }

    pub async fn inspection_changed(&self, inspection_id: &str) -> u64 {
        self.invalidate(EntityKind::Inspection, Some(inspection_id)).await
    }

    pub async fn user_changed(&self, user_id: &str) -> u64 {
        self.invalidate(EntityKind::User, Some(user_id)).await
    }

    pub async fn template_changed(&self, template_id: &str) -> u64 {
        self.invalidate(EntityKind::Template, Some(template_id)).await
    }

    pub async fn reference_data_changed(&self) -> u64 {
        self.invalidate(EntityKind::ReferenceData, None).await
    }
}
