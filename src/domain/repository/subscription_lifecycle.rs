use async_trait::async_trait;

use crate::domain::entity::ActiveSubscription;

/// SubscriptionLifecycle は購読管理サービスへの窓口。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionLifecycle: Send + Sync {
    /// サブジェクトの現在の購読を取得する。期限切れの購読が返ることもある。
    async fn get_active_subscription(
        &self,
        subject_id: &str,
    ) -> anyhow::Result<Option<ActiveSubscription>>;

    /// デフォルト（人気）プランを登録する。登録できるプランが無ければ None。
    async fn register_default_subscription(
        &self,
        subject_id: &str,
    ) -> anyhow::Result<Option<ActiveSubscription>>;
}
