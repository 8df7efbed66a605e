use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One news story.
///
/// Serializes to the NewsAPI article shape (nested `source`, camelCase keys),
/// which is also the format saved articles are persisted in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "WireArticle", into = "WireArticle")]
pub struct Article {
    pub source_id: Option<String>,
    pub source_name: Option<String>,
    pub author: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    /// ISO-8601, kept as received
    pub published_at: String,
    pub content: Option<String>,
}

impl Article {
    /// Key used by list views: the url, or a positional fallback.
    ///
    /// Articles without a url are keyed by position, so keys are only unique
    /// when every article carries a url.
    pub fn list_key(&self, position: usize) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("#{}", position),
        }
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.published_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// The `YYYY-MM-DD` part of the publication timestamp
    pub fn published_day(&self) -> &str {
        self.published_at.get(..10).unwrap_or(&self.published_at)
    }

    pub fn source_label(&self) -> &str {
        self.source_name.as_deref().unwrap_or("Unknown Source")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WireSource {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireArticle {
    #[serde(default)]
    source: Option<WireSource>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    url_to_image: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl From<WireArticle> for Article {
    fn from(wire: WireArticle) -> Self {
        let source = wire.source.unwrap_or_default();
        Self {
            source_id: source.id,
            source_name: source.name,
            author: wire.author,
            title: wire.title.unwrap_or_default(),
            description: wire.description,
            url: wire.url,
            image_url: wire.url_to_image,
            published_at: wire.published_at.unwrap_or_default(),
            content: wire.content,
        }
    }
}

impl From<Article> for WireArticle {
    fn from(article: Article) -> Self {
        let source = if article.source_id.is_some() || article.source_name.is_some() {
            Some(WireSource {
                id: article.source_id,
                name: article.source_name,
            })
        } else {
            None
        };

        Self {
            source,
            author: article.author,
            title: Some(article.title),
            description: article.description,
            url: article.url,
            url_to_image: article.image_url,
            published_at: Some(article.published_at),
            content: article.content,
        }
    }
}
