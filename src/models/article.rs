//! Article model representing one bibliographic record flowing through the
//! acquisition pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum number of characters kept from the title stem of a file name
pub const FILE_NAME_STEM_LEN: usize = 40;

/// A structured contributor name as supplied by the metadata index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    /// Given name(s)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,

    /// Family name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    /// Full name, used by organisational authors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// ORCID iD URL
    #[serde(
        default,
        rename = "ORCID",
        alias = "orcid",
        skip_serializing_if = "Option::is_none"
    )]
    pub orcid: Option<String>,

    /// "first" or "additional"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,

    /// Any other keys the upstream record carried (affiliation, suffix, ...)
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Author {
    pub fn new(given: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            given: Some(given.into()),
            family: Some(family.into()),
            ..Default::default()
        }
    }

    /// Human readable name, "Given Family" or the organisational name
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let parts: Vec<&str> = [self.given.as_deref(), self.family.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        parts.join(" ")
    }
}

/// A research article
///
/// Built once from a metadata query response. `file_name` is assigned by the
/// fan-out stage before any download starts; `blob_url` is set only after a
/// successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Digital Object Identifier, the correlation key across all stages
    pub doi: String,

    /// Title variants; the first entry is canonical
    pub title: Vec<String>,

    /// Authors in publication order
    pub author: Vec<Author>,

    /// Year taken from the most specific publication date component
    pub year_published: i32,

    /// Landing page URL
    pub url: String,

    /// Abstract (JATS markup as supplied upstream)
    #[serde(default)]
    pub r#abstract: Option<String>,

    /// Name of the stored PDF
    #[serde(default)]
    pub file_name: Option<String>,

    /// Retrieval URL returned by the blob store
    #[serde(default)]
    pub blob_url: Option<String>,
}

impl Article {
    /// Create an article with the required fields
    pub fn new(
        doi: impl Into<String>,
        title: Vec<String>,
        year_published: i32,
        url: impl Into<String>,
    ) -> Self {
        Self {
            doi: doi.into(),
            title,
            author: Vec::new(),
            year_published,
            url: url.into(),
            r#abstract: None,
            file_name: None,
            blob_url: None,
        }
    }

    /// The canonical title (first variant), empty if none
    pub fn canonical_title(&self) -> &str {
        self.title.first().map(String::as_str).unwrap_or_default()
    }

    /// Assign the storage file name derived from the canonical title.
    ///
    /// A name that is already set is left alone.
    pub fn assign_file_name(&mut self) -> &str {
        if self.file_name.is_none() {
            self.file_name = Some(file_name_for_title(self.canonical_title()));
        }
        self.file_name.as_deref().unwrap_or_default()
    }

    /// Whether the article made it through the whole pipeline
    pub fn is_acquired(&self) -> bool {
        self.blob_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// Derive a storage file name from a title.
///
/// ASCII punctuation is stripped, the result lower-cased, spaces become
/// underscores, the stem is cut to [`FILE_NAME_STEM_LEN`] characters and `.pdf`
/// appended. Distinct titles sharing a stem collide; nothing de-duplicates them.
pub fn file_name_for_title(title: &str) -> String {
    let stripped: String = title.chars().filter(|c| !c.is_ascii_punctuation()).collect();
    let stem: String = stripped
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .take(FILE_NAME_STEM_LEN)
        .collect();
    format!("{}.pdf", stem)
}

/// Builder for constructing Article objects
#[derive(Debug, Clone)]
pub struct ArticleBuilder {
    article: Article,
}

impl ArticleBuilder {
    pub fn new(doi: impl Into<String>, title: impl Into<String>) -> Self {
        let doi = doi.into();
        let url = format!("https://doi.org/{}", doi);
        Self {
            article: Article::new(doi, vec![title.into()], 0, url),
        }
    }

    /// Add an alternative title variant
    pub fn title_variant(mut self, title: impl Into<String>) -> Self {
        self.article.title.push(title.into());
        self
    }

    pub fn author(mut self, author: Author) -> Self {
        self.article.author.push(author);
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.article.year_published = year;
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.article.url = url.into();
        self
    }

    pub fn abstract_text(mut self, text: impl Into<String>) -> Self {
        self.article.r#abstract = Some(text.into());
        self
    }

    pub fn build(self) -> Article {
        self.article
    }
}
