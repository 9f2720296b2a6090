//! The portfolio page: an ordered list of anchored sections

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Result};
use charon_core::{AnchorSurface, Highlight};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const PAGE_FILE: &str = "page.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub anchor: String,
    pub title: String,
    #[serde(default)]
    pub body: Vec<String>,
    /// Nested entries (e.g. one per project) render indented under the parent.
    #[serde(default)]
    pub nested: bool,
}

impl Section {
    fn new(anchor: &str, title: &str, body: &[&str], nested: bool) -> Self {
        Self {
            anchor: anchor.to_string(),
            title: title.to_string(),
            body: body.iter().map(|line| line.to_string()).collect(),
            nested,
        }
    }
}

pub struct Page {
    sections: Vec<Section>,
    scroll: usize,
    highlight: Option<Highlight>,
}

impl Page {
    pub fn new(sections: Vec<Section>) -> Self {
        Self {
            sections,
            scroll: 0,
            highlight: None,
        }
    }

    pub fn default_sections() -> Vec<Section> {
        vec![
            Section::new(
                "hero",
                "Ayomide",
                &["Backend and systems engineer.", "Press c to ask Charon, Ctrl+K for commands."],
                false,
            ),
            Section::new("projects", "Projects", &["Things built and shipped."], false),
            Section::new(
                "project_charon",
                "Charon",
                &["A retrieval-augmented guide to this portfolio."],
                true,
            ),
            Section::new("stack", "Tech Stack", &["Python, TypeScript, Rust, PostgreSQL."], false),
            Section::new("experience", "Experience", &["Roles and responsibilities over the years."], false),
            Section::new("contact", "Contact", &[charon_core::commands::CONTACT_EMAIL], false),
        ]
    }

    /// Read sections from a JSON array. An empty array is rejected.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let sections: Vec<Section> = serde_json::from_str(&contents)?;
        if sections.is_empty() {
            return Err(anyhow!("{} has no sections", path.display()));
        }
        Ok(Self::new(sections))
    }

    /// `page.json` from `dir` when present and valid, the built-in page
    /// otherwise.
    pub fn load_or_default(dir: Option<&Path>) -> Self {
        let Some(path) = dir.map(|d| d.join(PAGE_FILE)) else {
            return Self::new(Self::default_sections());
        };
        if !path.exists() {
            return Self::new(Self::default_sections());
        }
        match Self::load(&path) {
            Ok(page) => {
                debug!(path = %path.display(), "loaded page sections");
                page
            }
            Err(e) => {
                warn!(error = %e, "falling back to built-in page");
                Self::new(Self::default_sections())
            }
        }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Index of the section at the top of the view
    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn scroll_down(&mut self) {
        if self.scroll + 1 < self.sections.len() {
            self.scroll += 1;
        }
    }

    pub fn scroll_up(&mut self) {
        self.scroll = self.scroll.saturating_sub(1);
    }

    #[cfg(test)]
    pub fn highlight(&self) -> Option<&Highlight> {
        self.highlight.as_ref()
    }

    pub fn is_highlighted(&self, anchor: &str, now: Instant) -> bool {
        self.highlight
            .as_ref()
            .is_some_and(|h| h.anchor == anchor && h.is_active(now))
    }

    /// Drop the highlight once it has run its course.
    pub fn expire_highlight(&mut self, now: Instant) {
        if self.highlight.as_ref().is_some_and(|h| !h.is_active(now)) {
            self.highlight = None;
        }
    }
}

impl AnchorSurface for Page {
    fn has_anchor(&self, anchor: &str) -> bool {
        self.sections.iter().any(|s| s.anchor == anchor)
    }

    fn scroll_to(&mut self, anchor: &str) {
        if let Some(index) = self.sections.iter().position(|s| s.anchor == anchor) {
            self.scroll = index;
        }
    }

    fn set_highlight(&mut self, highlight: Option<Highlight>) {
        self.highlight = highlight;
    }
}
