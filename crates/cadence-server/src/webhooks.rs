use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use cadence_core::config::WebhookConfig;
use cadence_core::events::{EventHub, ReleaseEvent};

pub const EVENT_HEADER: &str = "X-Cadence-Event";
pub const DELIVERY_HEADER: &str = "X-Cadence-Delivery";

/// POSTs release events to the configured webhooks. Fire and forget:
/// failures are logged and never retried.
#[derive(Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    hooks: Vec<WebhookConfig>,
}

impl WebhookDispatcher {
    pub fn new(hooks: Vec<WebhookConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            hooks,
        }
    }

    /// Deliver `event` to every hook subscribed to it. Returns the number of
    /// hooks that answered with a success status.
    pub async fn deliver(&self, event: &ReleaseEvent) -> usize {
        let mut delivered = 0;
        for hook in self.hooks.iter().filter(|h| h.wants(&event.event)) {
            let delivery = uuid::Uuid::new_v4().to_string();
            let mut req = self
                .client
                .post(&hook.url)
                .header(EVENT_HEADER, &event.event)
                .header(DELIVERY_HEADER, &delivery)
                .json(event);
            for (name, value) in &hook.headers {
                req = req.header(name, value);
            }
            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(url = %hook.url, %delivery, "webhook delivered");
                    delivered += 1;
                }
                Ok(resp) => {
                    tracing::warn!(url = %hook.url, %delivery, status = %resp.status(), "webhook rejected")
                }
                Err(e) => tracing::warn!(url = %hook.url, %delivery, error = %e, "webhook delivery failed"),
            }
        }
        delivered
    }

    /// Forward every event emitted on `events` until the hub is dropped.
    /// Returns `None` when no webhooks are configured.
    pub fn spawn(self, events: &EventHub) -> Option<JoinHandle<()>> {
        if self.hooks.is_empty() {
            return None;
        }
        let mut rx = events.subscribe();
        Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        self.deliver(&event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "webhook dispatcher lagged; events dropped")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::error::CadenceError;
    use std::collections::BTreeMap;

    fn hook(url: String, events: &[&str]) -> WebhookConfig {
        WebhookConfig {
            url,
            events: events.iter().map(|e| e.to_string()).collect(),
            headers: BTreeMap::from([("X-Team".to_string(), "content".to_string())]),
        }
    }

    #[tokio::test]
    async fn delivers_to_subscribed_hooks_with_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("x-cadence-event", "releases.publish")
            .match_header("x-team", "content")
            .match_header("x-cadence-delivery", mockito::Matcher::Any)
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"releaseId": 4, "isPublished": false}"#.into(),
            ))
            .with_status(200)
            .create_async()
            .await;

        let dispatcher = WebhookDispatcher::new(vec![
            hook(format!("{}/hook", server.url()), &["releases.publish"]),
            hook(format!("{}/other", server.url()), &["entry.update"]),
        ]);
        let event = ReleaseEvent::publish_failed(4, &CadenceError::Validation("boom".into()));
        assert_eq!(dispatcher.deliver(&event).await, 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failed_delivery_is_not_counted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;
        let dispatcher = WebhookDispatcher::new(vec![hook(format!("{}/hook", server.url()), &[])]);
        let event = ReleaseEvent::publish_failed(1, &CadenceError::Validation("x".into()));
        assert_eq!(dispatcher.deliver(&event).await, 0);
        mock.assert_async().await;
    }

    #[test]
    fn no_hooks_spawns_nothing() {
        let hub = EventHub::default();
        assert!(WebhookDispatcher::new(Vec::new()).spawn(&hub).is_none());
    }
}
