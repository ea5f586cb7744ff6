//! The editorial catalog: per-mode articles shown on title/author pairs, the
//! pixelation captions and their credit entries, and the navbar headlines.
//!
//! A default catalog is compiled in from `assets/articles.json`; deployments
//! can load a replacement file with [`ArticleCatalog::from_json_file`].

use super::mode::Mode;
use crate::error::AssetError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_CATALOG: &str = include_str!("../../assets/articles.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub sentences: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One structured line group of a caption's hover text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditEntry {
    pub title: String,
    pub names: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Captions {
    pub texts: Vec<String>,
    pub author: String,
    pub credits: Vec<CreditEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavItem {
    pub headline: String,
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleCatalog {
    pub default_headline: String,
    /// Navbar headline that stands for "no section": it maps to the default.
    pub home_headline: String,
    #[serde(default)]
    pub navbar: Vec<NavItem>,
    #[serde(default)]
    pub articles: HashMap<Mode, Vec<Article>>,
    pub captions: Captions,
}

/// What the hover overlay shows for a text tile.
#[derive(Debug, Clone, PartialEq)]
pub enum HoverContent {
    /// Free text, word wrapped.
    Sentences(Vec<String>),
    /// Bold title plus names, one group per entry.
    Credits(Vec<CreditEntry>),
}

impl ArticleCatalog {
    pub fn embedded() -> Result<Self, AssetError> {
        Ok(serde_json::from_str(DEFAULT_CATALOG)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, AssetError> {
        let raw = std::fs::read_to_string(path).map_err(|source| AssetError::Io { path: path.to_path_buf(), source })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Articles shown in `mode`. Modes without their own list borrow the
    /// effects articles.
    pub fn articles_for(&self, mode: Mode) -> &[Article] {
        self.articles
            .get(&mode)
            .or_else(|| self.articles.get(&Mode::Effects))
            .map_or(&[], Vec::as_slice)
    }

    pub fn article(&self, mode: Mode, index: usize) -> Option<&Article> {
        self.articles_for(mode).get(index)
    }

    /// Click-through target of an article.
    pub fn url_for(&self, mode: Mode, index: usize) -> Option<&str> {
        self.article(mode, index).and_then(|a| a.url.as_deref())
    }

    /// Caption text alternates by caption index.
    pub fn caption_text(&self, caption_index: usize) -> &str {
        let texts = &self.captions.texts;
        if texts.is_empty() { "" } else { &texts[caption_index % texts.len()] }
    }

    pub fn credit(&self, caption_index: usize) -> Option<&CreditEntry> {
        let credits = &self.captions.credits;
        if credits.is_empty() { None } else { credits.get(caption_index % credits.len()) }
    }

    /// Maps the home headline to the default and ignores blank text.
    pub fn resolve_headline<'a>(&'a self, headline: &'a str) -> Option<&'a str> {
        let trimmed = headline.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed == self.home_headline {
            Some(&self.default_headline)
        } else {
            Some(trimmed)
        }
    }

    pub fn hover_content_for_article(&self, mode: Mode, index: usize) -> Option<HoverContent> {
        self.article(mode, index).map(|a| HoverContent::Sentences(a.sentences.clone()))
    }

    pub fn hover_content_for_caption(&self, caption_index: usize) -> Option<HoverContent> {
        self.credit(caption_index).map(|c| HoverContent::Credits(vec![c.clone()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_catalog_parses() {
        let catalog = ArticleCatalog::embedded().expect("embedded catalog is valid");
        assert_eq!(catalog.default_headline, "גחלילות");
        assert_eq!(catalog.articles_for(Mode::Effects).len(), 5);
        assert_eq!(catalog.articles_for(Mode::Delay).len(), 4);
        assert_eq!(catalog.articles_for(Mode::Zoom).len(), 4);
        assert_eq!(catalog.captions.credits.len(), 10);
        assert_eq!(catalog.navbar.len(), 7);
        assert_eq!(catalog.navbar[2].mode, Mode::Delay);
    }

    #[test]
    fn modes_without_articles_borrow_effects() {
        let catalog = ArticleCatalog::embedded().unwrap();
        assert_eq!(catalog.articles_for(Mode::Primitive), catalog.articles_for(Mode::Effects));
    }

    #[test]
    fn url_lookup_handles_unmapped_articles() {
        let catalog = ArticleCatalog::embedded().unwrap();
        assert_eq!(catalog.url_for(Mode::Zoom, 2), Some("articles/series/twinPeaks.html"));
        assert_eq!(catalog.url_for(Mode::Effects, 0), Some("articles/remake/psyco.html"));
        assert_eq!(catalog.url_for(Mode::Effects, 1), None);
        assert_eq!(catalog.url_for(Mode::Effects, 99), None);
    }

    #[test]
    fn captions_cycle() {
        let catalog = ArticleCatalog::embedded().unwrap();
        assert_eq!(catalog.caption_text(0), "חזרות במדיה");
        assert_eq!(catalog.caption_text(1), "גליון 04");
        assert_eq!(catalog.caption_text(2), "חזרות במדיה");
        assert_eq!(catalog.credit(11), catalog.credit(1));
        match catalog.hover_content_for_caption(3) {
            Some(HoverContent::Credits(entries)) => assert_eq!(entries[0].title, "ועדה אקדמית:"),
            other => panic!("unexpected hover content {other:?}"),
        }
    }

    #[test]
    fn headline_resolution() {
        let catalog = ArticleCatalog::embedded().unwrap();
        assert_eq!(catalog.resolve_headline("  "), None);
        assert_eq!(catalog.resolve_headline("עמוד בית"), Some("גחלילות"));
        assert_eq!(catalog.resolve_headline(" סדרות "), Some("סדרות"));
    }
}
