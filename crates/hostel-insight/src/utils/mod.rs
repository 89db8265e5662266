//! Utilities module - text helpers and scoring functions shared by the stores

pub mod similarity;
pub mod text_utils;

pub use similarity::{cosine_similarity, keyword_relevance};
pub use text_utils::TextUtils;
