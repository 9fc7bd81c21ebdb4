use crate::error::DeliveryError;
use crate::models::{EnrichedItem, Published};
use async_trait::async_trait;
use chrono::TimeZone;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::fmt::Display;

/// Delivers one rendered message to the downstream chat.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), DeliveryError>;
}

/// Telegram Bot API client
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_url: String,
    bot_token: SecretString,
    chat_id: String,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(
        client: reqwest::Client,
        api_url: impl Into<String>,
        bot_token: SecretString,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            bot_token,
            chat_id: chat_id.into(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) -> Result<(), DeliveryError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_url,
            self.bot_token.expose_secret()
        );

        let resp = self
            .client
            .post(&url)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": message,
                "parse_mode": "HTML"
            }))
            .send()
            .await
            .map_err(|e| DeliveryError::Request(e.without_url()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| DeliveryError::Request(e.without_url()))?;

        interpret_response(status.as_u16(), &body)
    }
}

/// Maps a sendMessage reply to success or rejection.
/// Only a parsed `{"ok": false}` reply is a rejection. A body that is not an
/// API reply at all leaves delivery unknown.
fn interpret_response(status: u16, body: &str) -> Result<(), DeliveryError> {
    match serde_json::from_str::<TelegramResponse>(body) {
        Ok(TelegramResponse { ok: true, .. }) => Ok(()),
        Ok(TelegramResponse { description, .. }) => Err(DeliveryError::Rejected(
            description.unwrap_or_else(|| format!("HTTP {}", status)),
        )),
        Err(_) => Err(DeliveryError::InvalidResponse {
            status,
            body: body.chars().take(200).collect(),
        }),
    }
}

/// Renders bytes as gibibytes with two decimals. Unknown sizes render as `NaN GB`.
pub fn format_bytes(bytes: Option<u64>) -> String {
    match bytes {
        Some(b) => format!("{:.2} GB", b as f64 / 1024.0 / 1024.0 / 1024.0),
        None => "NaN GB".to_string(),
    }
}

/// Escapes text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Builds the HTML message for one release, with dates shown in `tz`.
pub fn render_message<Tz>(entry: &EnrichedItem, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let item = &entry.item;
    let published = match &item.published_at {
        Published::At(at) => at
            .with_timezone(tz)
            .format("%B %-d, %Y %-I:%M %p")
            .to_string(),
        Published::Unparsed(raw) => escape_html(raw),
    };

    let mut message = format!(
        "<b>{}</b>\n\n\
         📦 <b>Size:</b> {}\n\n\
         📅 <b>Published:</b> {}\n\n\
         📁 <b>Type:</b> {}\n\n",
        escape_html(&item.title),
        format_bytes(item.size_bytes),
        published,
        escape_html(entry.details.release_type_or_sentinel()),
    );

    if let (Some(seeders), Some(peers)) = (item.attribute("seeders"), item.attribute("peers")) {
        message.push_str(&format!(
            "🌱 <b>Seeders:</b> {} | <b>Peers:</b> {}\n\n",
            escape_html(seeders),
            escape_html(peers)
        ));
    }

    message.push_str(&format!(
        "🔗 <a href=\"{}\">Torrent Page</a>\n\n<code>{}</code>",
        escape_html(&item.guid),
        escape_html(entry.details.magnet_link_or_sentinel()),
    ));

    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedItem, ReleaseDetails};
    use chrono::{FixedOffset, Utc};
    use std::collections::HashMap;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier_for(server: &MockServer) -> TelegramNotifier {
        TelegramNotifier::new(
            reqwest::Client::new(),
            server.uri(),
            SecretString::from("123:abc".to_string()),
            "-10042",
        )
    }

    fn entry(attributes: &[(&str, &str)], details: ReleaseDetails) -> EnrichedItem {
        EnrichedItem {
            item: FeedItem {
                guid: "https://tracker.example/torrents/7".to_string(),
                title: "Film <2026> & Co".to_string(),
                link: None,
                published_at: Utc.with_ymd_and_hms(2026, 10, 19, 14, 5, 0).unwrap().into(),
                size_bytes: Some(1073741824),
                extra_attributes: attributes
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<HashMap<_, _>>(),
            },
            details,
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(Some(1073741824)), "1.00 GB");
        assert_eq!(format_bytes(Some(1610612736)), "1.50 GB");
        assert_eq!(format_bytes(Some(0)), "0.00 GB");
        assert_eq!(format_bytes(None), "NaN GB");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"a<b>&"c""#), "a&lt;b&gt;&amp;&quot;c&quot;");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_render_message_with_details() {
        let details = ReleaseDetails {
            magnet_link: Some("magnet:?xt=urn:btih:abc&dn=film".to_string()),
            release_type: Some("Remux".to_string()),
        };
        let message = render_message(&entry(&[], details), &Utc);

        assert_eq!(
            message,
            "<b>Film &lt;2026&gt; &amp; Co</b>\n\n\
             📦 <b>Size:</b> 1.00 GB\n\n\
             📅 <b>Published:</b> October 19, 2026 2:05 PM\n\n\
             📁 <b>Type:</b> Remux\n\n\
             🔗 <a href=\"https://tracker.example/torrents/7\">Torrent Page</a>\n\n\
             <code>magnet:?xt=urn:btih:abc&amp;dn=film</code>"
        );
    }

    #[test]
    fn test_render_message_sentinels_and_swarm() {
        let message = render_message(
            &entry(&[("seeders", "12"), ("peers", "15")], ReleaseDetails::default()),
            &Utc,
        );
        assert!(message.contains("📁 <b>Type:</b> Unknown"));
        assert!(message.contains("🌱 <b>Seeders:</b> 12 | <b>Peers:</b> 15"));
        assert!(message.ends_with("<code>Magnet link not found</code>"));
    }

    #[test]
    fn test_render_message_uses_timezone() {
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let message = render_message(&entry(&[], ReleaseDetails::default()), &tz);
        assert!(message.contains("October 19, 2026 9:05 AM"));
    }

    #[test]
    fn test_render_message_with_unrecognised_date() {
        let mut entry = entry(&[], ReleaseDetails::default());
        entry.item.published_at = Published::Unparsed("19.10.2026 <late>".to_string());

        let message = render_message(&entry, &Utc);
        assert!(message.contains("📅 <b>Published:</b> 19.10.2026 &lt;late&gt;\n\n"));
    }

    #[test]
    fn test_interpret_response() {
        assert!(interpret_response(200, r#"{"ok":true,"result":{"message_id":1}}"#).is_ok());

        let err = interpret_response(
            400,
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected(ref d) if d == "Bad Request: chat not found"));
        assert!(!err.is_fatal());

        let err = interpret_response(502, "<html>Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidResponse { status: 502, .. }));
        assert!(err.is_fatal());

        let err = interpret_response(200, r#"{"ok":tr"#).unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidResponse { status: 200, .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_notify_posts_send_message() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_json(json!({
                "chat_id": "-10042",
                "text": "<b>hello</b>",
                "parse_mode": "HTML"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": true, "result": {"message_id": 9}})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        notifier_for(&mock_server).notify("<b>hello</b>").await.unwrap();
    }

    #[tokio::test]
    async fn test_notify_api_rejection() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: can't parse entities"
            })))
            .mount(&mock_server)
            .await;

        let err = notifier_for(&mock_server).notify("<b").await.unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected(ref d) if d.contains("can't parse entities")));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_notify_proxy_error_page_is_fatal() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(502).set_body_string("<html>502 Bad Gateway</html>"),
            )
            .mount(&mock_server)
            .await;

        let err = notifier_for(&mock_server).notify("hi").await.unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidResponse { status: 502, .. }));
        assert!(err.is_fatal());
    }
}
