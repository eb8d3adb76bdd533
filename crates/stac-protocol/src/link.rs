//! STAC links (pagination and related resources).

use serde::{Deserialize, Serialize};

/// A link object. Pagination links may carry a method and a request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Relationship: `"self"`, `"root"`, `"next"`, `"prev"`, etc.
    pub rel: String,

    /// Target URL.
    pub href: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// HTTP method for the link, `GET` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Request body to send with a `POST` link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    /// Whether `body` is merged over the previous request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,
}

impl Link {
    pub fn new(href: impl Into<String>, rel: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
            media_type: None,
            title: None,
            method: None,
            body: None,
            merge: None,
        }
    }

    /// True when the link asks for a POST request.
    pub fn is_post(&self) -> bool {
        self.method
            .as_deref()
            .map_or(false, |m| m.eq_ignore_ascii_case("POST"))
    }
}

/// Find the first link with the given relation.
pub fn find_rel<'a>(links: &'a [Link], rel: &str) -> Option<&'a Link> {
    links.iter().find(|l| l.rel == rel)
}
