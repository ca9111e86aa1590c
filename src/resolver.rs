//! Site adapter resolver: structural strategies for locating chapter
//! listings on heterogeneous site layouts.
//!
//! Strategies are tried in order and the first one whose container selector
//! matches at least one element wins; site structures are mutually
//! exclusive in practice, so there is no scoring. The strategy set is
//! re-resolved on every crawl since upstream markup changes without notice.

use crate::models::ChapterRef;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    pub name: &'static str,
    /// Selector for the repeated chapter row/tile.
    pub container: &'static str,
    /// Selector for the anchor inside a container element.
    pub link: &'static str,
    /// Optional selector for the element carrying the chapter label text;
    /// falls back to the container's own text when absent or unmatched.
    pub text_locator: Option<&'static str>,
    /// The container element is (or directly wraps) the anchor itself.
    pub self_link: bool,
}

/// Ordered candidate strategies covering the site layouts seen in the wild:
/// Novelight, LightNovelPub, WP-Manga themes, MangaStream, Madara, and a
/// few generic list/table shapes as last resorts.
pub static STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "novelight",
        container: ".chapters .chapter",
        link: "a",
        text_locator: None,
        self_link: true,
    },
    Strategy {
        name: "lightnovelpub",
        container: ".chapter-list li",
        link: "a",
        text_locator: Some(".chapter-title"),
        self_link: false,
    },
    Strategy {
        name: "lightnovelpub-legacy",
        container: ".ul-list5 li",
        link: "a",
        text_locator: None,
        self_link: false,
    },
    Strategy {
        name: "wp-manga",
        container: ".wp-manga-chapter",
        link: "a",
        text_locator: None,
        self_link: false,
    },
    Strategy {
        name: "mangastream",
        container: "#chapterlist li",
        link: "a",
        text_locator: Some(".chapternum"),
        self_link: false,
    },
    Strategy {
        name: "chapterlist-generic",
        container: "#chapterlist li",
        link: "a",
        text_locator: None,
        self_link: false,
    },
    Strategy {
        name: "madara",
        container: ".chapter-item",
        link: "a",
        text_locator: Some(".chapter-link"),
        self_link: false,
    },
    Strategy {
        name: "episode-archive",
        container: ".epsarchive ul li",
        link: "a",
        text_locator: None,
        self_link: false,
    },
    Strategy {
        name: "plain-list",
        container: "li.chapter",
        link: "a",
        text_locator: None,
        self_link: false,
    },
    Strategy {
        name: "table",
        container: "table.table tr",
        link: "a",
        text_locator: None,
        self_link: false,
    },
];

#[derive(Debug)]
pub struct Resolution {
    pub strategy: &'static Strategy,
    pub chapters: Vec<ChapterRef>,
}

/// Try each strategy in order against a rendered page and extract chapter
/// references with the first one that matches. `None` means no container
/// selector matched at all; an empty `chapters` list means the structure
/// matched but yielded nothing usable. Both are "site structure
/// unrecognized" to callers, to be logged rather than crashed on.
pub fn resolve(html: &str) -> Option<Resolution> {
    let document = Html::parse_document(html);

    for strategy in STRATEGIES {
        let container = match Selector::parse(strategy.container) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let elements: Vec<ElementRef> = document.select(&container).collect();
        if elements.is_empty() {
            continue;
        }
        log::debug!(
            "site structure detected: {} ({} elements)",
            strategy.container,
            elements.len()
        );

        let chapters = elements
            .iter()
            .filter_map(|el| extract_reference(el, strategy))
            .collect();
        return Some(Resolution { strategy, chapters });
    }
    None
}

fn extract_reference(element: &ElementRef, strategy: &Strategy) -> Option<ChapterRef> {
    let anchor = find_anchor(element, strategy)?;
    let href = anchor.value().attr("href")?.trim();
    // Only absolute HTTP(S) links; relative hrefs and javascript: noise
    // are dropped here rather than patched up.
    if !href.starts_with("http://") && !href.starts_with("https://") {
        return None;
    }

    let label = chapter_label(element, &anchor, strategy);
    let number = extract_chapter_number(&label)?;
    Some(ChapterRef {
        number,
        url: href.to_string(),
    })
}

fn find_anchor<'a>(element: &ElementRef<'a>, strategy: &Strategy) -> Option<ElementRef<'a>> {
    if strategy.self_link && element.value().name() == "a" {
        return Some(*element);
    }
    let link = Selector::parse(strategy.link).ok()?;
    element.select(&link).next()
}

fn chapter_label(element: &ElementRef, anchor: &ElementRef, strategy: &Strategy) -> String {
    if let Some(locator) = strategy.text_locator {
        if let Ok(sel) = Selector::parse(locator) {
            if let Some(target) = element.select(&sel).next() {
                let text = collect_text(&target);
                if !text.is_empty() {
                    return text;
                }
            }
        }
    }
    let own = collect_text(element);
    if !own.is_empty() {
        return own;
    }
    // Last resort: whatever text the anchor itself carries.
    collect_text(anchor)
}

fn collect_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// First run of digits, optionally with one decimal point. "Chapter 12.5:
/// Awakening" yields 12.5; text without digits yields nothing and the
/// element is dropped (ads, navigation chrome).
pub fn extract_chapter_number(text: &str) -> Option<f64> {
    let re = Regex::new(r"(\d+(?:\.\d+)?)").unwrap();
    re.captures(text)?.get(1)?.as_str().parse::<f64>().ok()
}
