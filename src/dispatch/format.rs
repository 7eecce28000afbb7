use html_escape::encode_double_quoted_attribute;
use serde::Serialize;

use crate::domain::{NewsItem, RunBatch};

/// Telegram's limit for `sendMessage` text, in UTF-16 code units.
pub const MAX_TEXT_LEN: usize = 4096;
/// Telegram's limit for photo captions, in UTF-16 code units.
pub const MAX_CAPTION_LEN: usize = 1024;

const ELLIPSIS: char = '…';
const FALLBACK_PREFIX: &str = "📰 ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseMode {
    #[serde(rename = "HTML")]
    Html,
}

impl ParseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMode::Html => "HTML",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryPayload {
    pub recipient: String,
    pub text: String,
    pub image_url: Option<String>,
    pub parse_mode: ParseMode,
    pub disable_preview: bool,
    /// Item committed to the seen store once this payload is delivered.
    pub item_id: Option<String>,
}

impl DeliveryPayload {
    /// The same message as plain text, used when the image is rejected.
    pub fn without_image(&self) -> Self {
        Self {
            image_url: None,
            ..self.clone()
        }
    }
}

/// Builds one payload per item, escaping every piece of raw text.
#[derive(Debug, Clone)]
pub struct Formatter {
    recipient: String,
    fallback_text: String,
}

impl Formatter {
    pub fn new(recipient: impl Into<String>, fallback_text: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            fallback_text: fallback_text.into(),
        }
    }

    /// One payload per item; a single fallback payload for an empty batch.
    pub fn build_payloads(&self, batch: &RunBatch) -> Vec<DeliveryPayload> {
        if batch.is_empty() {
            return vec![self.fallback_payload()];
        }
        batch.items().map(|item| self.item_payload(item)).collect()
    }

    pub fn item_payload(&self, item: &NewsItem) -> DeliveryPayload {
        let limit = if item.image.is_some() {
            MAX_CAPTION_LEN
        } else {
            MAX_TEXT_LEN
        };

        DeliveryPayload {
            recipient: self.recipient.clone(),
            text: render_item(item, limit),
            image_url: item.image.clone(),
            parse_mode: ParseMode::Html,
            disable_preview: true,
            item_id: Some(item.id.clone()),
        }
    }

    pub fn fallback_payload(&self) -> DeliveryPayload {
        DeliveryPayload {
            recipient: self.recipient.clone(),
            text: format!(
                "{FALLBACK_PREFIX}{}",
                truncate_escaped(&self.fallback_text, MAX_TEXT_LEN - tg_len(FALLBACK_PREFIX))
            ),
            image_url: None,
            parse_mode: ParseMode::Html,
            disable_preview: true,
            item_id: None,
        }
    }
}

/// Escape `&`, `<`, `>` and `"` for Telegram HTML.
pub fn escape_html(s: &str) -> String {
    encode_double_quoted_attribute(s).into_owned()
}

/// Length as Telegram counts it: UTF-16 code units.
pub fn tg_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// `🔸 <b>source</b>` followed by the linked title, at most `limit` units.
fn render_item(item: &NewsItem, limit: usize) -> String {
    let head = format!("🔸 <b>{}</b>\n", escape_html(&item.source));
    let open = format!("<a href=\"{}\">", escape_html(&item.link));
    let close = "</a>";

    let overhead = tg_len(&head) + tg_len(&open) + tg_len(close);
    if overhead < limit {
        let title = truncate_escaped(&item.title, limit - overhead);
        return format!("{head}{open}{title}{close}");
    }

    // The link alone does not fit; send the headline without markup.
    truncate_escaped(&format!("{} - {}", item.source, item.title), limit)
}

/// Escape `raw` and cut it to `budget` UTF-16 units on an escaped-char boundary,
/// ending with an ellipsis when anything was dropped.
pub fn truncate_escaped(raw: &str, budget: usize) -> String {
    let escaped = escape_html(raw);
    if tg_len(&escaped) <= budget {
        return escaped;
    }
    if budget == 0 {
        return String::new();
    }

    let mut out = String::new();
    let mut used = 0;
    let mut buf = [0u8; 4];
    for c in raw.chars() {
        let piece = encode_double_quoted_attribute(c.encode_utf8(&mut buf));
        let len = tg_len(&piece);
        if used + len > budget - ELLIPSIS.len_utf16() {
            break;
        }
        out.push_str(&piece);
        used += len;
    }
    out.push(ELLIPSIS);
    out
}
