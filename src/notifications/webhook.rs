use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::json;
use std::time::Duration;
use tera::{Context, Tera};

use super::{NotificationMessage, Notifier, SenderError};
use crate::monitor::NotifyType;

/// Body posted to a custom webhook when no template is configured.
pub const DEFAULT_WEBHOOK_TEMPLATE: &str = r#"{"kind": {{ kind | json_encode() }}, "monitorId": {{ monitor_id }}, "monitorName": {{ monitor_name | json_encode() }}, "title": {{ title | json_encode() }}, "detail": {{ detail | json_encode() }}, "time": {{ time | json_encode() }}}"#;

/// Posts notifications to IM robot webhooks (WeCom, DingTalk, FeiShu) or to a
/// custom webhook. `notify_target` is the URL to post to.
pub struct WebhookNotifier {
    client: Client,
    body_template: String,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Result<Self, SenderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            body_template: DEFAULT_WEBHOOK_TEMPLATE.to_string(),
        })
    }

    pub fn with_body_template(mut self, template: impl Into<String>) -> Self {
        self.body_template = template.into();
        self
    }

    /// Builds the JSON body for a channel, `None` when the channel is off.
    pub fn render_body(
        &self,
        notify_type: NotifyType,
        message: &NotificationMessage,
    ) -> Result<Option<String>, SenderError> {
        let body = match notify_type {
            NotifyType::None => return Ok(None),
            NotifyType::WeCom => json!({
                "msgtype": "text",
                "text": { "content": message.text() },
            })
            .to_string(),
            NotifyType::DingTalk => json!({
                "msgtype": "markdown",
                "markdown": { "title": message.title(), "text": message.text() },
            })
            .to_string(),
            NotifyType::FeiShu => json!({
                "msg_type": "text",
                "content": { "text": message.text() },
            })
            .to_string(),
            NotifyType::Webhook => {
                let mut tera_context = Context::new();
                for (key, value) in message.context() {
                    tera_context.insert(key, &value);
                }
                Tera::one_off(&self.body_template, &tera_context, false)
                    .map_err(|e| SenderError::TemplatingError(e.to_string()))?
            }
        };
        Ok(Some(body))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        notify_type: NotifyType,
        notify_target: &str,
        message: &NotificationMessage,
    ) -> Result<(), SenderError> {
        let Some(body) = self.render_body(notify_type, message)? else {
            return Ok(());
        };
        if notify_target.trim().is_empty() {
            return Err(SenderError::InvalidConfiguration(
                "notify target URL is empty".to_string(),
            ));
        }

        let response = self
            .client
            .post(notify_target)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Webhook returned non-success status: {status}. Body: {error_body}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationKind;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    fn message() -> NotificationMessage {
        NotificationMessage {
            kind: NotificationKind::Alert,
            monitor_id: 42,
            monitor_name: "checkout \"api\"".to_string(),
            detail: "https://shop.example.com: 503 Service Unavailable".to_string(),
            time: Utc.with_ymd_and_hms(2026, 10, 16, 8, 30, 0).unwrap(),
        }
    }

    fn notifier() -> WebhookNotifier {
        WebhookNotifier::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_custom_webhook_body_is_valid_json() {
        let body = notifier()
            .render_body(NotifyType::Webhook, &message())
            .unwrap()
            .unwrap();
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["kind"], "alert");
        assert_eq!(value["monitorId"], 42);
        assert_eq!(value["monitorName"], "checkout \"api\"");
        assert_eq!(value["time"], "2026-10-16T08:30:00+00:00");
    }

    #[test]
    fn test_im_bodies_carry_text() {
        let notifier = notifier();
        let wecom: Value = serde_json::from_str(
            &notifier.render_body(NotifyType::WeCom, &message()).unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(wecom["msgtype"], "text");
        assert!(wecom["text"]["content"].as_str().unwrap().contains("503 Service Unavailable"));

        let feishu: Value = serde_json::from_str(
            &notifier.render_body(NotifyType::FeiShu, &message()).unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(feishu["msg_type"], "text");

        let dingtalk: Value = serde_json::from_str(
            &notifier.render_body(NotifyType::DingTalk, &message()).unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(dingtalk["markdown"]["title"], "Monitor checkout \"api\" is failing");
    }

    #[test]
    fn test_disabled_channel_renders_nothing() {
        assert!(notifier().render_body(NotifyType::None, &message()).unwrap().is_none());
    }

    #[test]
    fn test_broken_template_is_reported() {
        let notifier = notifier().with_body_template("{{ unclosed");
        let result = notifier.render_body(NotifyType::Webhook, &message());
        assert!(matches!(result, Err(SenderError::TemplatingError(_))));
    }

    #[tokio::test]
    async fn test_empty_target_is_rejected() {
        let result = notifier().notify(NotifyType::WeCom, " ", &message()).await;
        assert!(matches!(result, Err(SenderError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_notify_posts_json_body() {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/robot/send"))
            .and(matchers::header("content-type", "application/json"))
            .and(matchers::body_partial_json(json!({ "msgtype": "text" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let target = format!("{}/robot/send", mock_server.uri());
        let result = notifier().notify(NotifyType::WeCom, &target, &message()).await;
        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test]
    async fn test_non_success_status_carries_body() {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("robot quota exceeded"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = notifier()
            .notify(NotifyType::Webhook, &mock_server.uri(), &message())
            .await;
        match result {
            Err(SenderError::SendFailed(detail)) => {
                assert!(detail.contains("500"), "{detail}");
                assert!(detail.contains("robot quota exceeded"), "{detail}");
            }
            other => panic!("expected SendFailed, got {other:?}"),
        }
    }
}
