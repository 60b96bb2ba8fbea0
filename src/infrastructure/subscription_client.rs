use std::time::Duration;

use async_trait::async_trait;

use crate::domain::entity::ActiveSubscription;
use crate::domain::repository::SubscriptionLifecycle;
use crate::infrastructure::config::SubscriptionServiceConfig;

/// HttpSubscriptionLifecycle は外部の購読管理サービスを REST で呼び出す。
///
/// - GET  {base}/api/v1/subjects/{id}/subscriptions/active  (200 / 404)
/// - POST {base}/api/v1/subjects/{id}/subscriptions/default (200 | 201 / 404)
pub struct HttpSubscriptionLifecycle {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpSubscriptionLifecycle {
    pub fn new(config: &SubscriptionServiceConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build subscription client: {}", e))?;
        let base_url = reqwest::Url::parse(&config.base_url)
            .map_err(|e| anyhow::anyhow!("invalid subscription service URL: {}", e))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("invalid subscription service URL: {}", config.base_url);
        }
        Ok(Self { client, base_url })
    }

    /// subject_id は 1 つのパスセグメントとしてパーセントエンコードされる。
    fn subscriptions_url(&self, subject_id: &str, path: &str) -> anyhow::Result<reqwest::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("invalid subscription service URL: {}", self.base_url))?
            .pop_if_empty()
            .extend(["api", "v1", "subjects", subject_id, "subscriptions", path]);
        Ok(url)
    }
}

async fn parse_subscription(resp: reqwest::Response) -> anyhow::Result<Option<ActiveSubscription>> {
    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let resp = resp.error_for_status()?;
    let subscription = resp
        .json::<ActiveSubscription>()
        .await
        .map_err(|e| anyhow::anyhow!("invalid subscription response: {}", e))?;
    Ok(Some(subscription))
}

#[async_trait]
impl SubscriptionLifecycle for HttpSubscriptionLifecycle {
    async fn get_active_subscription(
        &self,
        subject_id: &str,
    ) -> anyhow::Result<Option<ActiveSubscription>> {
        let resp = self
            .client
            .get(self.subscriptions_url(subject_id, "active")?)
            .send()
            .await?;
        parse_subscription(resp).await
    }

    async fn register_default_subscription(
        &self,
        subject_id: &str,
    ) -> anyhow::Result<Option<ActiveSubscription>> {
        let resp = self
            .client
            .post(self.subscriptions_url(subject_id, "default")?)
            .send()
            .await?;
        parse_subscription(resp).await
    }
}
