/// 缓存键前缀与默认过期时间（秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePrefix {
    UserProfile,
    Inspection,
    InspectionsList,
    Template,
    TemplatesList,
    ReferenceData,
    Analytics,
    DashboardStats,
}

impl CachePrefix {
    pub const ALL: [CachePrefix; 8] = [
        CachePrefix::UserProfile,
        CachePrefix::Inspection,
        CachePrefix::InspectionsList,
        CachePrefix::Template,
        CachePrefix::TemplatesList,
        CachePrefix::ReferenceData,
        CachePrefix::Analytics,
        CachePrefix::DashboardStats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CachePrefix::UserProfile => "user_profile",
            CachePrefix::Inspection => "inspection",
            CachePrefix::InspectionsList => "inspections_list",
            CachePrefix::Template => "template",
            CachePrefix::TemplatesList => "templates_list",
            CachePrefix::ReferenceData => "reference_data",
            CachePrefix::Analytics => "analytics",
            CachePrefix::DashboardStats => "dashboard_stats",
        }
    }

    pub fn default_ttl(&self) -> u64 {
        match self {
            CachePrefix::UserProfile => 300,
            CachePrefix::Inspection => 600,
            CachePrefix::InspectionsList => 300,
            CachePrefix::Template => 1800,
            CachePrefix::TemplatesList => 1800,
            CachePrefix::ReferenceData => 3600,
            CachePrefix::Analytics => 900,
            CachePrefix::DashboardStats => 300,
        }
    }

    /// 生成具体缓存键
    pub fn key(&self, id: &str) -> String {
        super::build_key(self.as_str(), id)
    }

    /// 匹配该前缀下所有键的模式
    pub fn pattern(&self) -> String {
        format!("{}:*", self.as_str())
    }
}
