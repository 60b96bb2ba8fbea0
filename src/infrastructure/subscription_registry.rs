use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use crate::domain::entity::{ActiveSubscription, SubscriptionStatus};
use crate::domain::repository::SubscriptionLifecycle;
use crate::infrastructure::config::DefaultPlanConfig;

/// InMemorySubscriptionLifecycle は購読管理サービスが無い環境向けの購読レジストリ。
/// 未登録のサブジェクトには設定されたデフォルトプランを登録する。
pub struct InMemorySubscriptionLifecycle {
    default_plan: Option<DefaultPlanConfig>,
    subscriptions: RwLock<HashMap<String, ActiveSubscription>>,
}

impl InMemorySubscriptionLifecycle {
    pub fn new(default_plan: Option<DefaultPlanConfig>) -> Self {
        Self {
            default_plan,
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// サブジェクトの購読を差し替える。
    pub async fn insert(&self, subscription: ActiveSubscription) {
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.insert(subscription.subject_id.clone(), subscription);
    }
}

#[async_trait]
impl SubscriptionLifecycle for InMemorySubscriptionLifecycle {
    async fn get_active_subscription(
        &self,
        subject_id: &str,
    ) -> anyhow::Result<Option<ActiveSubscription>> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions.get(subject_id).cloned())
    }

    async fn register_default_subscription(
        &self,
        subject_id: &str,
    ) -> anyhow::Result<Option<ActiveSubscription>> {
        let Some(plan) = &self.default_plan else {
            return Ok(None);
        };

        let start_at = Utc::now();
        let subscription = ActiveSubscription {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            limitation_snapshot: plan.limitation.clone(),
            start_at,
            end_at: start_at + Duration::days(i64::from(plan.duration_days)),
            status: SubscriptionStatus::Active,
        };

        tracing::info!(
            subject_id = %subject_id,
            plan_id = %plan.id,
            plan_name = %plan.name,
            subscription_id = %subscription.id,
            end_at = %subscription.end_at,
            "registered default plan"
        );
        self.insert(subscription.clone()).await;
        Ok(Some(subscription))
    }
}
