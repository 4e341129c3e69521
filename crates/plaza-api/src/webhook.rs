use std::time::Duration;

use contracts::{ChatMessage, WebhookDelivery};
use plaza_core::WebhookTarget;
use tracing::{debug, warn};

const WEBHOOK_TIMEOUT_SECS: u64 = 5;
const WEBHOOK_ATTEMPTS: u32 = 3;
const WEBHOOK_RETRY_PAUSE_MS: u64 = 500;

/// Pushes chat messages to registered bot webhooks. Delivery is fire and
/// forget: failures are logged and the message is dropped, never surfaced
/// to the sender.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookNotifier {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Spawns one delivery task per target so a slow endpoint cannot stall
    /// the others or the caller.
    pub fn dispatch(&self, targets: Vec<WebhookTarget>, message: &ChatMessage) {
        if targets.is_empty() {
            return;
        }

        let delivery = WebhookDelivery::from_message(message);
        for target in targets {
            let notifier = self.clone();
            let delivery = delivery.clone();
            tokio::spawn(async move {
                notifier.deliver(&target, &delivery).await;
            });
        }
    }

    pub async fn deliver(&self, target: &WebhookTarget, delivery: &WebhookDelivery) {
        for attempt in 1..=WEBHOOK_ATTEMPTS {
            match self
                .client
                .post(&target.url)
                .bearer_auth(&target.token)
                .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
                .json(delivery)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    debug!(
                        player_id = target.player_id.as_str(),
                        attempt, "webhook delivered"
                    );
                    return;
                }
                Ok(response) => {
                    warn!(
                        player_id = target.player_id.as_str(),
                        attempt,
                        status = response.status().as_u16(),
                        "webhook endpoint answered with an error status"
                    );
                }
                Err(err) => {
                    warn!(
                        player_id = target.player_id.as_str(),
                        attempt,
                        error = %err,
                        "webhook request failed"
                    );
                }
            }

            if attempt < WEBHOOK_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(WEBHOOK_RETRY_PAUSE_MS)).await;
            }
        }

        warn!(
            player_id = target.player_id.as_str(),
            url = target.url.as_str(),
            "dropping webhook message after {WEBHOOK_ATTEMPTS} attempts"
        );
    }
}
