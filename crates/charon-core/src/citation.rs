//! `[REF: label]` markers inside assistant answers
//!
//! Markers are split out of the text lazily, normalized into page anchor ids,
//! and resolved against whatever surface renders the page.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::{Match, Matches, Regex};
use tracing::debug;

use crate::bus::{EventBus, UiSignal};
use crate::state::Citation;

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\[REF:\s*([^\]]+?)\s*\]").expect("marker pattern is valid"))
}

/// Lower-case the label and turn spaces into underscores.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "_")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Marker { label: &'a str, anchor: String },
}

/// Lazy iterator over the text and marker segments of `content`
pub struct Segments<'a> {
    content: &'a str,
    matches: Matches<'static, 'a>,
    cursor: usize,
    pending: Option<Match<'a>>,
}

pub fn segments(content: &str) -> Segments<'_> {
    Segments {
        content,
        matches: marker_regex().find_iter(content),
        cursor: 0,
        pending: None,
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(marker) = self.pending.take() {
            self.cursor = marker.end();
            let label = marker_regex()
                .captures(marker.as_str())
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str())
                .unwrap_or_default();
            return Some(Segment::Marker {
                label,
                anchor: normalize_label(label),
            });
        }

        match self.matches.next() {
            Some(marker) if marker.start() > self.cursor => {
                let text = &self.content[self.cursor..marker.start()];
                self.pending = Some(marker);
                Some(Segment::Text(text))
            }
            Some(marker) => {
                self.pending = Some(marker);
                self.next()
            }
            None if self.cursor < self.content.len() => {
                let text = &self.content[self.cursor..];
                self.cursor = self.content.len();
                Some(Segment::Text(text))
            }
            None => None,
        }
    }
}

/// Distinct anchors referenced by `content`, in order of first appearance.
pub fn referenced_anchors(content: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for segment in segments(content) {
        if let Segment::Marker { label, anchor } = segment {
            if !out.iter().any(|(a, _)| *a == anchor) {
                out.push((anchor, label.to_string()));
            }
        }
    }
    out
}

/// Name to show for a marker: the citation's name if one matches, the raw
/// label otherwise.
pub fn display_name<'a>(anchor: &str, label: &'a str, citations: &'a [Citation]) -> &'a str {
    citations
        .iter()
        .find(|c| c.anchor == anchor)
        .or_else(|| citations.iter().find(|c| normalize_label(&c.name) == anchor))
        .map(|c| c.name.as_str())
        .unwrap_or(label)
}

/// Something that renders the page sections citations point into
pub trait AnchorSurface {
    fn has_anchor(&self, anchor: &str) -> bool;
    fn scroll_to(&mut self, anchor: &str);
    fn set_highlight(&mut self, highlight: Option<Highlight>);
}

/// A highlight that stops applying once `until` has passed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub anchor: String,
    pub until: Instant,
}

impl Highlight {
    pub fn new(anchor: impl Into<String>, duration: Duration, now: Instant) -> Self {
        Self {
            anchor: anchor.into(),
            until: now + duration,
        }
    }

    pub fn is_active(&self, now: Instant) -> bool {
        now < self.until
    }
}

#[derive(Debug, Clone)]
pub struct CitationResolver {
    highlight_for: Duration,
}

impl CitationResolver {
    pub fn new(highlight_for: Duration) -> Self {
        Self { highlight_for }
    }

    /// Ask for the chat to close and the anchor to be revealed.
    ///
    /// Returns false, publishing nothing, when the surface has no such anchor.
    pub fn resolve<S: AnchorSurface + ?Sized>(&self, anchor: &str, surface: &S, bus: &EventBus) -> bool {
        if !surface.has_anchor(anchor) {
            debug!(anchor, "citation target not on page");
            return false;
        }
        bus.publish(UiSignal::CloseChat);
        bus.publish(UiSignal::RevealAnchor {
            anchor: anchor.to_string(),
            highlight_for: self.highlight_for,
        });
        true
    }
}

/// Apply a `RevealAnchor` signal to the surface: scroll, then highlight.
pub fn reveal_anchor<S: AnchorSurface + ?Sized>(surface: &mut S, anchor: &str, highlight_for: Duration, now: Instant) {
    if !surface.has_anchor(anchor) {
        return;
    }
    surface.scroll_to(anchor);
    surface.set_highlight(Some(Highlight::new(anchor, highlight_for, now)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakePage {
        anchors: Vec<String>,
        scrolled: Vec<String>,
        highlight: Option<Highlight>,
    }

    impl AnchorSurface for FakePage {
        fn has_anchor(&self, anchor: &str) -> bool {
            self.anchors.iter().any(|a| a == anchor)
        }

        fn scroll_to(&mut self, anchor: &str) {
            self.scrolled.push(anchor.to_string());
        }

        fn set_highlight(&mut self, highlight: Option<Highlight>) {
            self.highlight = highlight;
        }
    }

    fn citation(name: &str, anchor: &str) -> Citation {
        Citation {
            kind: "project".to_string(),
            name: name.to_string(),
            anchor: anchor.to_string(),
            url: None,
        }
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("Some Project"), "some_project");
        assert_eq!(normalize_label("SENTINEL"), "sentinel");
    }

    #[test]
    fn test_segments_preserve_order() {
        let parts: Vec<Segment> = segments("Built [REF: Some Project] and [REF:Sentinel].").collect();
        assert_eq!(
            parts,
            vec![
                Segment::Text("Built "),
                Segment::Marker { label: "Some Project", anchor: "some_project".to_string() },
                Segment::Text(" and "),
                Segment::Marker { label: "Sentinel", anchor: "sentinel".to_string() },
                Segment::Text("."),
            ]
        );
    }

    #[test]
    fn test_segments_adjacent_markers_and_plain_text() {
        let parts: Vec<Segment> = segments("[REF: A][REF: B]").collect();
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[0], Segment::Marker { label: "A", .. }));

        let plain: Vec<Segment> = segments("no markers [REF: here").collect();
        assert_eq!(plain, vec![Segment::Text("no markers [REF: here")]);

        assert_eq!(segments("").count(), 0);
    }

    #[test]
    fn test_display_name_prefers_citation() {
        let citations = vec![citation("Sentinel Monitor", "sentinel"), citation("Some Project", "project_some_project")];
        assert_eq!(display_name("sentinel", "SENTINEL", &citations), "Sentinel Monitor");
        assert_eq!(display_name("some_project", "Some Project", &citations), "Some Project");
        assert_eq!(display_name("ghost", "Ghost", &citations), "Ghost");
    }

    #[test]
    fn test_referenced_anchors_are_distinct() {
        let refs = referenced_anchors("[REF: A] then [REF: a] and [REF: B]");
        assert_eq!(refs, vec![("a".to_string(), "A".to_string()), ("b".to_string(), "B".to_string())]);
    }

    #[tokio::test]
    async fn test_resolve_existing_anchor_closes_chat_then_reveals() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut page = FakePage { anchors: vec!["some_project".to_string()], ..FakePage::default() };
        let resolver = CitationResolver::new(Duration::from_millis(2000));

        assert!(resolver.resolve(&normalize_label("Some Project"), &page, &bus));
        assert_eq!(rx.recv().await.unwrap(), UiSignal::CloseChat);
        let UiSignal::RevealAnchor { anchor, highlight_for } = rx.recv().await.unwrap() else {
            panic!("expected reveal");
        };

        let now = Instant::now();
        reveal_anchor(&mut page, &anchor, highlight_for, now);
        assert_eq!(page.scrolled, vec!["some_project"]);
        let highlight = page.highlight.clone().unwrap();
        assert!(highlight.is_active(now));
        assert!(!highlight.is_active(now + Duration::from_millis(2000)));
    }

    #[test]
    fn test_resolve_missing_anchor_is_noop() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let page = FakePage::default();
        let resolver = CitationResolver::new(Duration::from_secs(2));

        assert!(!resolver.resolve("ghost", &page, &bus));
        assert!(rx.try_recv().is_err());
    }
}
