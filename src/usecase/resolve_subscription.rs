use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::entity::ActiveSubscription;
use crate::domain::repository::SubscriptionLifecycle;

/// デフォルトプラン登録後に購読取得をやり直す回数の上限。
pub const MAX_REGISTRATION_RETRIES: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ResolveSubscriptionError {
    #[error("no subscription available for subject: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// ActiveSubscriptionResolver はサブジェクトの有効な購読を解決する。
/// 有効な購読が無い場合はデフォルトプランを登録し、1 回だけ取得をやり直す。
/// 登録後の再取得では start_at を判定に含めない。登録時刻は要求時刻より後になる。
pub struct ActiveSubscriptionResolver {
    lifecycle: Arc<dyn SubscriptionLifecycle>,
}

impl ActiveSubscriptionResolver {
    pub fn new(lifecycle: Arc<dyn SubscriptionLifecycle>) -> Self {
        Self { lifecycle }
    }

    pub async fn resolve(
        &self,
        subject_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ActiveSubscription, ResolveSubscriptionError> {
        let mut registrations = 0;
        loop {
            let found = self
                .lifecycle
                .get_active_subscription(subject_id)
                .await
                .map_err(|e| ResolveSubscriptionError::Internal(e.to_string()))?;

            let stale_status = match found {
                Some(subscription) if subscription.is_valid_at(now) => return Ok(subscription),
                Some(subscription) if registrations > 0 && subscription.is_unexpired_at(now) => {
                    return Ok(subscription)
                }
                Some(subscription) => Some(subscription.status),
                None => None,
            };

            if registrations >= MAX_REGISTRATION_RETRIES {
                tracing::error!(
                    subject_id = %subject_id,
                    "no valid subscription after registering default plan"
                );
                return Err(ResolveSubscriptionError::Unavailable(subject_id.to_string()));
            }
            registrations += 1;

            tracing::info!(
                subject_id = %subject_id,
                stale_status = ?stale_status,
                "no valid subscription, registering default plan"
            );
            self.lifecycle
                .register_default_subscription(subject_id)
                .await
                .map_err(|e| ResolveSubscriptionError::Internal(e.to_string()))?
                .ok_or_else(|| ResolveSubscriptionError::Unavailable(subject_id.to_string()))?;
        }
    }
}
