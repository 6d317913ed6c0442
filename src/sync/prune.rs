//! Cleanup of empty documentation containers.
//!
//! Migrations leave behind chapters whose pages all moved elsewhere and
//! placeholder pages with no real content. These helpers decide what is
//! empty; deleting is up to the caller (see `sb prune`).

use serde::Serialize;

/// Default minimum visible text length for a page to count as content.
pub const DEFAULT_MIN_TEXT_LENGTH: usize = 10;

/// Placeholder bodies we consider empty outright.
const TRIVIAL_HTML: [&str; 5] = ["<p></p>", "<p><br></p>", "<p><br/></p>", "<p>&nbsp;</p>", "<p> </p>"];

/// Elements that make a page meaningful regardless of text length.
const STRUCTURAL_TAGS: [&str; 15] = [
    "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "img", "ac:image", "pre", "code", "table", "ac:structured-macro",
];

/// Markers of markdown structure (headings, emphasis/lists, code, images).
const MARKDOWN_MARKERS: [&str; 5] = ["#", "*", "-", "`", "!["];

/// A chapter as listed by the documentation target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterInfo {
    pub id: u64,
    pub name: String,
    pub book_id: u64,
}

/// A page as listed by the documentation target. Content fields are `None`
/// when the listing endpoint does not return them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub id: u64,
    pub name: String,
    pub book_id: u64,
    pub chapter_id: Option<u64>,
    #[serde(skip)]
    pub html: Option<String>,
    #[serde(skip)]
    pub markdown: Option<String>,
}

impl PageInfo {
    /// Whether the listing carried enough content to judge emptiness.
    #[must_use]
    pub fn has_content_fields(&self) -> bool {
        match (&self.html, &self.markdown) {
            (Some(html), Some(markdown)) => !(html.trim().is_empty() && markdown.trim().is_empty()),
            _ => false,
        }
    }
}

/// Chapters no page points at, in listing order.
#[must_use]
pub fn find_empty_chapters<'a>(chapters: &'a [ChapterInfo], pages: &[PageInfo]) -> Vec<&'a ChapterInfo> {
    let used: std::collections::HashSet<u64> = pages.iter().filter_map(|p| p.chapter_id).collect();
    chapters.iter().filter(|c| !used.contains(&c.id)).collect()
}

/// Decide whether a page body is effectively empty.
///
/// Markdown wins when present: any structure marker or more than
/// `min_text_length` characters of text makes the page non-empty. Otherwise
/// the HTML is checked for placeholder bodies, structural elements and
/// finally visible text length.
#[must_use]
pub fn is_page_effectively_empty(html: Option<&str>, markdown: Option<&str>, min_text_length: usize) -> bool {
    if let Some(markdown) = markdown.map(str::trim).filter(|m| !m.is_empty()) {
        if MARKDOWN_MARKERS.iter().any(|m| markdown.contains(m)) {
            return false;
        }
        return collapse_whitespace(markdown).chars().count() <= min_text_length;
    }

    let html = html.map_or("", str::trim);
    if html.is_empty() {
        return true;
    }
    if TRIVIAL_HTML.contains(&html.to_lowercase().as_str()) {
        return true;
    }
    if tag_names(html).any(|tag| STRUCTURAL_TAGS.contains(&tag.as_str())) {
        return false;
    }
    collapse_whitespace(&strip_tags(html)).chars().count() <= min_text_length
}

/// Lowercased names of opening tags.
fn tag_names(html: &str) -> impl Iterator<Item = String> + '_ {
    html.split('<').skip(1).filter_map(|chunk| {
        let name: String = chunk
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == ':' || *c == '-')
            .collect::<String>()
            .to_ascii_lowercase();
        (!name.is_empty()).then_some(name)
    })
}

/// Visible text with tags removed and common entities decoded.
fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// What a prune pass found and did.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PruneReport {
    pub dry_run: bool,
    pub scanned: usize,
    /// `(id, name)` of every record judged empty.
    pub candidates: Vec<(u64, String)>,
    pub deleted: usize,
    /// `(id, error)` for deletions that failed.
    pub errors: Vec<(u64, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: u64, chapter: Option<u64>) -> PageInfo {
        PageInfo {
            id,
            name: format!("Page {id}"),
            book_id: 1,
            chapter_id: chapter,
            html: None,
            markdown: None,
        }
    }

    #[test]
    fn test_find_empty_chapters() {
        let chapters = vec![
            ChapterInfo {
                id: 10,
                name: "Used".into(),
                book_id: 1,
            },
            ChapterInfo {
                id: 11,
                name: "Empty".into(),
                book_id: 1,
            },
        ];
        let pages = vec![page(1, Some(10)), page(2, None)];
        let empty = find_empty_chapters(&chapters, &pages);
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].id, 11);
    }

    #[test]
    fn test_empty_html_variants() {
        assert!(is_page_effectively_empty(None, None, 10));
        assert!(is_page_effectively_empty(Some("   "), Some(""), 10));
        assert!(is_page_effectively_empty(Some("<P><BR></P>"), None, 10));
        assert!(is_page_effectively_empty(Some("<p>&nbsp;</p>"), None, 10));
        assert!(is_page_effectively_empty(Some("<div><p>Intro</p></div>"), None, 10));
    }

    #[test]
    fn test_structure_makes_page_meaningful() {
        assert!(!is_page_effectively_empty(Some("<h2>A</h2>"), None, 10));
        assert!(!is_page_effectively_empty(Some("<ul><li>x</li></ul>"), None, 10));
        assert!(!is_page_effectively_empty(Some("<ac:image><ri:attachment/></ac:image>"), None, 10));
        assert!(!is_page_effectively_empty(Some("<table><tr><td></td></tr></table>"), None, 10));
        // `<link>` is not a list item.
        assert!(is_page_effectively_empty(Some("<link rel=\"x\"><p>hi</p>"), None, 10));
    }

    #[test]
    fn test_text_length_threshold() {
        assert!(is_page_effectively_empty(Some("<p>0123456789</p>"), None, 10));
        assert!(!is_page_effectively_empty(Some("<p>0123456789A</p>"), None, 10));
    }

    #[test]
    fn test_markdown_wins() {
        assert!(!is_page_effectively_empty(Some(""), Some("# Title"), 10));
        assert!(!is_page_effectively_empty(Some("<p></p>"), Some("plain words that are long"), 10));
        assert!(is_page_effectively_empty(Some("<h1>ignored</h1>"), Some("short"), 10));
    }

    #[test]
    fn test_content_fields_presence() {
        let mut p = page(1, None);
        assert!(!p.has_content_fields());
        p.html = Some(String::new());
        p.markdown = Some(String::new());
        assert!(!p.has_content_fields());
        p.html = Some("<p>x</p>".into());
        assert!(p.has_content_fields());
    }
}
