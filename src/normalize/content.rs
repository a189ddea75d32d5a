//! Resolution of attachments and rich content areas
//!
//! Attachments resolve to the public URL of their uploaded original. Areas
//! resolve to the markup of their rich text widgets, or to that markup with
//! the tags removed when a field asks for plain text.

use bson::{Bson, Document};

/// Widget type whose `content` holds rich text markup.
pub const RICH_TEXT_WIDGET: &str = "@apostrophecms/rich-text";

/// Resolves structured field values to a single renderable string
pub trait ContentResolver: Send + Sync {
    /// Public URL of an attachment, if it carries enough to build one
    fn attachment_url(&self, attachment: &Document) -> Option<String>;

    /// Markup of every rich text widget in an area, in order
    fn rich_text(&self, area: &Document) -> String;

    /// Text content of an area without markup
    fn plain_text(&self, area: &Document) -> String {
        html_to_plain_text(&self.rich_text(area))
    }
}

/// Resolver for documents laid out the way the CMS stores them
#[derive(Debug, Clone)]
pub struct DefaultContentResolver {
    uploads_url: String,
}

impl DefaultContentResolver {
    /// Create a resolver that builds attachment URLs under `uploads_url`
    pub fn new(uploads_url: impl Into<String>) -> Self {
        Self {
            uploads_url: uploads_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for DefaultContentResolver {
    fn default() -> Self {
        Self::new("/uploads")
    }
}

impl ContentResolver for DefaultContentResolver {
    fn attachment_url(&self, attachment: &Document) -> Option<String> {
        let id = match attachment.get("_id")? {
            Bson::String(s) => s.clone(),
            Bson::ObjectId(oid) => oid.to_hex(),
            _ => return None,
        };
        let extension = attachment.get_str("extension").ok()?;
        let name = attachment.get_str("name").unwrap_or_default();

        let mut url = format!("{}/attachments/{}-{}", self.uploads_url, id, name);
        // Images are served at their largest generated size.
        if attachment.get_str("group").ok() == Some("images") {
            url.push_str(".full");
        }
        url.push('.');
        url.push_str(extension);
        Some(url)
    }

    fn rich_text(&self, area: &Document) -> String {
        let mut out = String::new();
        collect_rich_text(area, &mut out);
        out
    }
}

/// Walk an area, appending rich text widget content depth-first
fn collect_rich_text(area: &Document, out: &mut String) {
    let Ok(items) = area.get_array("items") else {
        return;
    };

    for item in items {
        let Bson::Document(widget) = item else {
            continue;
        };

        if widget.get_str("type").ok() == Some(RICH_TEXT_WIDGET) {
            if let Ok(content) = widget.get_str("content") {
                out.push_str(content);
            }
            continue;
        }

        // Layout widgets nest their own areas.
        for (_, value) in widget {
            if let Bson::Document(nested) = value {
                if nested.get_str("metaType").ok() == Some("area") {
                    collect_rich_text(nested, out);
                }
            }
        }
    }
}

/// Strip markup from an HTML fragment
///
/// Block-level closing tags and `<br>` become line breaks, common entities
/// are decoded and surrounding whitespace is trimmed.
pub fn html_to_plain_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut chars = html.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '<' {
            text.push(c);
            continue;
        }

        let mut tag = String::new();
        for t in chars.by_ref() {
            if t == '>' {
                break;
            }
            tag.push(t);
        }

        if breaks_line(&tag) && !text.ends_with('\n') && !text.is_empty() {
            text.push('\n');
        }
    }

    let decoded = decode_entities(&text);
    decoded
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn breaks_line(tag: &str) -> bool {
    let tag = tag.trim().to_ascii_lowercase();
    let name: String = tag
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();

    match name.as_str() {
        "br" => true,
        "p" | "div" | "li" | "tr" | "blockquote" | "pre" | "h1" | "h2" | "h3" | "h4" | "h5"
        | "h6" => tag.starts_with('/'),
        _ => false,
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
