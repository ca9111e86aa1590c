//! Structure resolution and content extraction across the site layouts the
//! crawler meets in the wild, as fixture HTML.

use serialbot::fetcher::{extract_page_images, extract_text_content};
use serialbot::resolver::{extract_chapter_number, resolve};

const WP_MANGA_INDEX: &str = r#"
<html><body>
<div class="page-content-listing">
  <ul class="main">
    <li class="wp-manga-chapter"><a href="https://site.example/manga/x/chapter-3/">Chapter 3</a></li>
    <li class="wp-manga-chapter"><a href="https://site.example/manga/x/chapter-2/">Chapter 2</a></li>
    <li class="wp-manga-chapter"><a href="https://site.example/manga/x/chapter-1/">Chapter 1</a></li>
  </ul>
</div>
</body></html>"#;

const MANGASTREAM_INDEX: &str = r#"
<html><body>
<div id="chapterlist">
  <ul>
    <li data-num="12.5">
      <a href="https://site.example/x-chapter-12-5/">
        <span class="chapternum">Chapter 12.5</span>
        <span class="chapterdate">January 2, 2025</span>
      </a>
    </li>
    <li data-num="12">
      <a href="https://site.example/x-chapter-12/">
        <span class="chapternum">Chapter 12</span>
        <span class="chapterdate">December 26, 2024</span>
      </a>
    </li>
  </ul>
</div>
</body></html>"#;

const MADARA_INDEX: &str = r#"
<html><body>
<div class="listing-chapters_wrap">
  <div class="chapter-item">
    <a class="chapter-link" href="https://site.example/series/y/ch-47">Chapter 47 - The Summit</a>
  </div>
  <div class="chapter-item">
    <a class="chapter-link" href="https://site.example/series/y/ch-46">Chapter 46</a>
  </div>
</div>
</body></html>"#;

#[test]
fn wp_manga_layout_resolves() {
    let res = resolve(WP_MANGA_INDEX).expect("layout should be recognized");
    assert_eq!(res.strategy.name, "wp-manga");
    let numbers: Vec<f64> = res.chapters.iter().map(|c| c.number).collect();
    assert_eq!(numbers, vec![3.0, 2.0, 1.0]);
}

#[test]
fn mangastream_layout_uses_chapternum_not_date() {
    let res = resolve(MANGASTREAM_INDEX).expect("layout should be recognized");
    assert_eq!(res.strategy.name, "mangastream");
    // the date span also contains digits; the text locator must win
    let numbers: Vec<f64> = res.chapters.iter().map(|c| c.number).collect();
    assert_eq!(numbers, vec![12.5, 12.0]);
}

#[test]
fn madara_layout_resolves() {
    let res = resolve(MADARA_INDEX).expect("layout should be recognized");
    assert_eq!(res.strategy.name, "madara");
    assert_eq!(res.chapters[0].number, 47.0);
    assert_eq!(res.chapters[0].url, "https://site.example/series/y/ch-47");
}

#[test]
fn chapter_number_first_run_wins() {
    assert_eq!(extract_chapter_number("Vol.2 Chapter 18"), Some(2.0));
    assert_eq!(extract_chapter_number("Chapter 101 - New Dawn (2)"), Some(101.0));
}

#[test]
fn text_extraction_prefers_specific_container() {
    let body = "She counted the torches twice before she trusted the dark between them. "
        .repeat(4);
    let html = format!(
        r#"<html><body>
        <h1>Chapter 18: Between Torches</h1>
        <div class="entry-content">short teaser</div>
        <div class="chapter-text"><p>{}</p></div>
        </body></html>"#,
        body
    );
    let content = extract_text_content(&html, 100).expect("long container should qualify");
    assert_eq!(content.title.as_deref(), Some("Chapter 18: Between Torches"));
    assert!(content.body.contains("counted the torches"));
}

#[test]
fn hollow_page_yields_nothing() {
    let html = r#"<html><body><div class="chapter-content">Loading...</div></body></html>"#;
    assert!(extract_text_content(html, 100).is_none());
}

#[test]
fn reader_images_keep_document_order() {
    let html = r#"<html><body><div class="reading-content">
        <img data-src="https://cdn.example/pages/001.webp" class="wp-manga-chapter-img">
        <img data-src="https://cdn.example/pages/002.webp" class="wp-manga-chapter-img">
        <img src="https://cdn.example/pages/003.webp" class="wp-manga-chapter-img">
    </div></body></html>"#;
    let images = extract_page_images(html);
    assert_eq!(
        images,
        vec![
            "https://cdn.example/pages/001.webp",
            "https://cdn.example/pages/002.webp",
            "https://cdn.example/pages/003.webp",
        ]
    );
}
