//! Core data models for articles and the HTTP payloads that carry them.

mod article;
mod requests;

pub use article::{file_name_for_title, Article, ArticleBuilder, Author, FILE_NAME_STEM_LEN};
pub use requests::{
    ChatRequest, ChatResponse, SearchDownloadRequest, DEFAULT_MAX_ARTICLES, MAX_ARTICLES_LIMIT,
};
