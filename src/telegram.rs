use crate::caption;
use crate::models::Ad;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::multipart::Form;
use serde_json::json;
use std::time::Duration;

const API_BASE: &str = "https://api.telegram.org";
const MAX_MEDIA_ITEMS: usize = 10;
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Sends one ad to the chat. Returns true on confirmed success; every
/// failure mode is logged inside and reported as false.
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, ad: &Ad) -> bool;
}

pub struct TelegramClient {
    client: reqwest::Client,
    token: String,
    chat_id: String,
}

impl TelegramClient {
    pub fn new(client: reqwest::Client, token: &str, chat_id: &str) -> Self {
        TelegramClient {
            client,
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        }
    }

    async fn send_once(
        &self,
        method: &str,
        fields: &[(&'static str, String)],
    ) -> Result<(reqwest::StatusCode, String)> {
        let mut form = Form::new();
        for (name, value) in fields {
            form = form.text(*name, value.clone());
        }

        let response = self
            .client
            .post(format!("{}/bot{}/{}", API_BASE, self.token, method))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    /// One POST, plus at most one delayed retry when Telegram answers 429
    /// with a bounded retry_after hint.
    async fn post(&self, method: &str, fields: &[(&'static str, String)]) -> Result<bool> {
        let (status, body) = self.send_once(method, fields).await?;
        if status.is_success() {
            return Ok(true);
        }

        if let Some(secs) = retry_delay(status.as_u16(), &body) {
            tracing::warn!("Telegram rate limit on {}, retrying in {}s", method, secs);
            tokio::time::sleep(Duration::from_secs(secs)).await;

            let (status, body) = self.send_once(method, fields).await?;
            if status.is_success() {
                return Ok(true);
            }
            tracing::error!(
                "Telegram {} failed after retry: {} {}",
                method,
                status,
                truncate_for_log(&body)
            );
            return Ok(false);
        }

        tracing::error!("Telegram {} failed: {} {}", method, status, truncate_for_log(&body));
        Ok(false)
    }
}

#[async_trait]
impl Deliverer for TelegramClient {
    async fn deliver(&self, ad: &Ad) -> bool {
        if self.token.is_empty() || self.chat_id.is_empty() {
            tracing::warn!("Telegram credentials not set, dropping ad {}", ad.id);
            return false;
        }

        let (method, fields) = if ad.images.is_empty() {
            ("sendMessage", text_message_fields(ad, &self.chat_id))
        } else {
            ("sendMediaGroup", media_group_fields(ad, &self.chat_id))
        };

        match self.post(method, &fields).await {
            Ok(delivered) => delivered,
            Err(e) => {
                tracing::error!("Telegram {} request failed for ad {}: {:#}", method, ad.id, e);
                false
            }
        }
    }
}

pub fn text_message_fields(ad: &Ad, chat_id: &str) -> Vec<(&'static str, String)> {
    vec![
        ("chat_id", chat_id.to_string()),
        ("text", caption::build(ad)),
        ("parse_mode", "HTML".to_string()),
        ("disable_web_page_preview", "true".to_string()),
    ]
}

/// Photo album: the caption rides on the first item only.
pub fn media_group_fields(ad: &Ad, chat_id: &str) -> Vec<(&'static str, String)> {
    let media: Vec<serde_json::Value> = ad
        .images
        .iter()
        .take(MAX_MEDIA_ITEMS)
        .enumerate()
        .map(|(i, url)| {
            if i == 0 {
                json!({
                    "type": "photo",
                    "media": url,
                    "caption": caption::build(ad),
                    "parse_mode": "HTML",
                })
            } else {
                json!({ "type": "photo", "media": url })
            }
        })
        .collect();

    vec![
        ("chat_id", chat_id.to_string()),
        ("media", serde_json::Value::Array(media).to_string()),
    ]
}

/// The single bounded retry: only a 429 whose body carries a retry_after
/// hint within 1..=60 seconds earns it. Any other failure is final.
fn retry_delay(status: u16, body: &str) -> Option<u64> {
    if status != 429 {
        return None;
    }
    parse_retry_after(body).filter(|secs| (1..=MAX_RETRY_AFTER_SECS).contains(secs))
}

/// retry_after seconds from a 429 response body, e.g.
/// `{"ok":false,"error_code":429,"parameters":{"retry_after":5}}`.
pub fn parse_retry_after(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("parameters")?.get("retry_after")?.as_u64()
}

fn truncate_for_log(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ad(images: Vec<String>) -> Ad {
        Ad {
            id: "42".to_string(),
            url: "https://lalafo.kg/bishkek/ads/kvartira-id-42".to_string(),
            title: "Сдается квартира".to_string(),
            price_kgs: Some(30000),
            rooms: Some(1),
            is_owner: Some(true),
            created_raw: None,
            location: "Бишкек".to_string(),
            images,
            description: None,
            owner_name: None,
            phone: Some("0555 12 34 56".to_string()),
        }
    }

    #[test]
    fn test_text_message_fields() {
        let fields = text_message_fields(&ad(Vec::new()), "-100200300");
        assert_eq!(fields[0], ("chat_id", "-100200300".to_string()));
        assert_eq!(fields[1].0, "text");
        assert!(fields[1].1.contains("Бишкек"));
        assert_eq!(fields[2], ("parse_mode", "HTML".to_string()));
        assert_eq!(fields[3], ("disable_web_page_preview", "true".to_string()));
    }

    #[test]
    fn test_media_group_caption_on_first_item_only() {
        let images = vec![
            "https://img1.lalafo.com/i/posters/original/a.jpeg".to_string(),
            "https://img1.lalafo.com/i/posters/original/b.jpeg".to_string(),
        ];
        let fields = media_group_fields(&ad(images), "-100200300");
        assert_eq!(fields[0], ("chat_id", "-100200300".to_string()));

        let media: serde_json::Value = serde_json::from_str(&fields[1].1).unwrap();
        let items = media.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["type"], "photo");
        assert!(items[0]["caption"].as_str().unwrap().contains("Бишкек"));
        assert_eq!(items[0]["parse_mode"], "HTML");
        assert!(items[1].get("caption").is_none());
    }

    #[test]
    fn test_media_group_caps_at_ten_items() {
        let images: Vec<String> = (0..15)
            .map(|i| format!("https://img1.lalafo.com/i/posters/original/{}.jpeg", i))
            .collect();
        let fields = media_group_fields(&ad(images), "1");
        let media: serde_json::Value = serde_json::from_str(&fields[1].1).unwrap();
        assert_eq!(media.as_array().unwrap().len(), 10);
    }

    #[test]
    fn test_parse_retry_after() {
        let body = r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 7","parameters":{"retry_after":7}}"#;
        assert_eq!(parse_retry_after(body), Some(7));
    }

    #[test]
    fn test_retry_only_on_bounded_429_hint() {
        let body = |secs: u64| {
            format!(r#"{{"ok":false,"error_code":429,"parameters":{{"retry_after":{}}}}}"#, secs)
        };

        assert_eq!(retry_delay(429, &body(1)), Some(1));
        assert_eq!(retry_delay(429, &body(7)), Some(7));
        assert_eq!(retry_delay(429, &body(60)), Some(60));

        // Out-of-bounds hints and hint-less bodies get no retry
        assert_eq!(retry_delay(429, &body(0)), None);
        assert_eq!(retry_delay(429, &body(61)), None);
        assert_eq!(retry_delay(429, r#"{"ok":false,"error_code":429}"#), None);

        // Non-429 failures never retry, hint or not
        assert_eq!(retry_delay(500, &body(5)), None);
        assert_eq!(retry_delay(400, &body(5)), None);
    }

    #[test]
    fn test_parse_retry_after_absent_or_garbage() {
        assert_eq!(parse_retry_after(r#"{"ok":false,"error_code":400}"#), None);
        assert_eq!(parse_retry_after("not json at all"), None);
        assert_eq!(
            parse_retry_after(r#"{"parameters":{"retry_after":"soon"}}"#),
            None
        );
    }
}
