//! RSS 2.0 / Atom entry extraction.
//!
//! The document is walked with `quick-xml`'s streaming reader with end-tag
//! checking disabled, so stray or mismatched tags inside an item do not abort
//! the whole feed. Fields are collected per item/entry and each falls back
//! independently: a missing date or image never discards an entry, only a
//! missing title or link does. If the reader hits an unrecoverable error,
//! entries completed before it are still returned.

use crate::models::RawEntry;
use crate::utils::{clean_text, truncate_summary};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use scraper::{Html, Selector};
use tracing::{debug, warn};

/// Date-bearing fields, highest priority first.
const DATE_FIELDS: &[&str] = &["pubdate", "published", "updated", "dc:date"];
/// Summary-bearing fields, highest priority first.
const SUMMARY_FIELDS: &[&str] = &["description", "summary", "content:encoded", "content"];
/// Fields whose embedded HTML may hold an inline image, highest priority first.
const INLINE_IMAGE_FIELDS: &[&str] = &["content:encoded", "description", "summary", "content"];

/// Image references found as element attributes.
#[derive(Debug, Default)]
struct AttrImages {
    enclosure: Option<String>,
    media_content: Option<String>,
    media_thumbnail: Option<String>,
}

/// Accumulates one `<item>` or `<entry>`.
#[derive(Debug, Default)]
struct EntryBuilder {
    /// Text of the direct children, keyed by lowercased qualified name; first occurrence wins.
    fields: Vec<(String, String)>,
    /// Atom `<link href>` candidates as (rel, href).
    link_attrs: Vec<(String, String)>,
    images: AttrImages,
    /// Child currently being captured and its text so far.
    capturing: Option<(String, String)>,
}

impl EntryBuilder {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, v)| k == name && !v.trim().is_empty())
            .map(|(_, v)| v.as_str())
    }

    fn first_field(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|n| self.field(n))
    }

    fn push_text(&mut self, text: &str) {
        if let Some((_, buf)) = self.capturing.as_mut() {
            buf.push_str(text);
        }
    }

    fn link(&self) -> Option<String> {
        // Atom: prefer rel="alternate" (or no rel), never "enclosure"/"self".
        let attr = self
            .link_attrs
            .iter()
            .find(|(rel, _)| rel.is_empty() || rel == "alternate")
            .map(|(_, href)| href.clone());
        attr.or_else(|| self.field("link").map(clean_text))
            .or_else(|| {
                self.field("guid")
                    .map(clean_text)
                    .filter(|g| g.starts_with("http://") || g.starts_with("https://"))
            })
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
    }

    fn image(&self) -> Option<String> {
        self.images
            .enclosure
            .clone()
            .or_else(|| self.images.media_content.clone())
            .or_else(|| self.images.media_thumbnail.clone())
            .or_else(|| {
                INLINE_IMAGE_FIELDS
                    .iter()
                    .filter_map(|f| self.field(f))
                    .find_map(first_img_src)
            })
    }

    fn finish(mut self) -> Option<RawEntry> {
        if let Some(field) = self.capturing.take() {
            self.fields.push(field);
        }
        let title = self.field("title").map(clean_text).unwrap_or_default();
        let link = self.link();
        let (title, link) = match (title.is_empty(), link) {
            (false, Some(link)) => (title, link),
            _ => return None,
        };

        let summary_full = self.first_field(SUMMARY_FIELDS).map(clean_text).unwrap_or_default();
        let raw_published = self
            .first_field(DATE_FIELDS)
            .map(clean_text)
            .filter(|d| !d.is_empty());
        let source_label = self
            .field("source")
            .map(clean_text)
            .filter(|s| !s.is_empty());

        Some(RawEntry {
            raw_image: self.image(),
            title,
            link,
            raw_published,
            summary: truncate_summary(&summary_full),
            source_label,
        })
    }
}

fn qualified_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase()
}

fn attr(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .with_checks(false)
        .flatten()
        .find(|a| a.key.as_ref().eq_ignore_ascii_case(key.as_bytes()))
        .map(|a| {
            let raw = String::from_utf8_lossy(&a.value).into_owned();
            html_escape::decode_html_entities(&raw).trim().to_string()
        })
        .filter(|v| !v.is_empty())
}

fn looks_like_image(e: &BytesStart<'_>) -> bool {
    let media_type = attr(e, "type").unwrap_or_default().to_ascii_lowercase();
    let medium = attr(e, "medium").unwrap_or_default().to_ascii_lowercase();
    if !medium.is_empty() {
        return medium == "image";
    }
    media_type.is_empty() || media_type.starts_with("image/")
}

/// Record attribute-borne data (links, enclosures, media references).
fn absorb_attributes(builder: &mut EntryBuilder, name: &str, e: &BytesStart<'_>) {
    match name {
        "link" => {
            if let Some(href) = attr(e, "href") {
                let rel = attr(e, "rel").unwrap_or_default().to_ascii_lowercase();
                if rel == "enclosure" && looks_like_image(e) && builder.images.enclosure.is_none() {
                    builder.images.enclosure = Some(href.clone());
                }
                builder.link_attrs.push((rel, href));
            }
        }
        "enclosure" => {
            if builder.images.enclosure.is_none() && looks_like_image(e) {
                builder.images.enclosure = attr(e, "url");
            }
        }
        "media:content" => {
            if builder.images.media_content.is_none() && looks_like_image(e) {
                builder.images.media_content = attr(e, "url");
            }
        }
        "media:thumbnail" => {
            if builder.images.media_thumbnail.is_none() {
                builder.images.media_thumbnail = attr(e, "url");
            }
        }
        _ => {}
    }
}

/// `src` of the first `<img>` inside an HTML fragment.
fn first_img_src(html: &str) -> Option<String> {
    let decoded = html_escape::decode_html_entities(html);
    if !decoded.contains("<img") && !decoded.contains("<IMG") {
        return None;
    }
    let fragment = Html::parse_fragment(&decoded);
    let sel = Selector::parse("img[src]").ok()?;
    fragment
        .select(&sel)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty() && !src.starts_with("data:"))
        .map(String::from)
}

/// Whether the text looks like a syndication document rather than HTML.
pub fn looks_like_feed(text: &str) -> bool {
    let head: String = text.chars().take(2048).collect::<String>().to_lowercase();
    head.contains("<rss") || head.contains("<feed") || head.contains("<rdf:rdf") || head.contains("<channel")
}

fn is_entry_tag(name: &str) -> bool {
    name == "item" || name == "entry"
}

/// Extract entries from an RSS or Atom document.
///
/// Entries lacking a non-empty title or a link are dropped.
///
/// # Arguments
///
/// * `xml` - Feed body as served; RSS 2.0, Atom and Google News all work
///
/// # Returns
///
/// Entries in document order. Malformed markup ends parsing early but keeps
/// what was read up to that point; garbage input yields an empty vector.
///
/// # Examples
///
/// ```ignore
/// let xml = "<rss><channel><item><title>Feira</title><link>https://a.br/1</link></item></channel></rss>";
/// let entries = parse_feed(xml);
/// assert_eq!(entries[0].title, "Feira");
/// assert_eq!(entries[0].raw_published, None);
/// ```
pub fn parse_feed(xml: &str) -> Vec<RawEntry> {
    let mut reader = Reader::from_str(xml);
    {
        let config = reader.config_mut();
        config.check_end_names = false;
        config.trim_text(false);
    }

    let mut entries = Vec::new();
    let mut dropped = 0usize;
    let mut current: Option<EntryBuilder> = None;
    // Depth below the open item/entry element (1 = direct child).
    let mut depth = 0usize;

    let mut close = |open: EntryBuilder, entries: &mut Vec<RawEntry>| match open.finish() {
        Some(entry) => entries.push(entry),
        None => dropped += 1,
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = qualified_name(&e);
                if is_entry_tag(&name) {
                    // An unclosed previous item ends where the next one starts.
                    if let Some(open) = current.take() {
                        close(open, &mut entries);
                    }
                    current = Some(EntryBuilder::default());
                    depth = 0;
                    continue;
                }
                let Some(builder) = current.as_mut() else {
                    continue;
                };
                depth += 1;
                absorb_attributes(builder, &name, &e);
                if depth == 1 {
                    builder.capturing = Some((name, String::new()));
                } else {
                    // Nested markup (Atom xhtml content, raw HTML): keep it as text.
                    builder.push_text(&format!("<{}>", String::from_utf8_lossy(&e)));
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(builder) = current.as_mut() {
                    let name = qualified_name(&e);
                    absorb_attributes(builder, &name, &e);
                    builder.push_text(&format!("<{}/>", String::from_utf8_lossy(&e)));
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                if is_entry_tag(&name) {
                    if let Some(open) = current.take() {
                        close(open, &mut entries);
                    }
                    depth = 0;
                    continue;
                }
                let Some(builder) = current.as_mut() else {
                    continue;
                };
                let closes_field = builder
                    .capturing
                    .as_ref()
                    .is_some_and(|(field, _)| *field == name);
                if closes_field {
                    if let Some(field) = builder.capturing.take() {
                        builder.fields.push(field);
                    }
                    depth = 0;
                } else {
                    depth = depth.saturating_sub(1);
                    builder.push_text(&format!("</{name}>"));
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(builder) = current.as_mut() {
                    builder.push_text(&String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(builder) = current.as_mut() {
                    builder.push_text(&String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::GeneralRef(r)) => {
                if let Some(builder) = current.as_mut() {
                    builder.push_text(&format!("&{};", String::from_utf8_lossy(&r)));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(
                    error = %e,
                    position = reader.buffer_position(),
                    parsed = entries.len(),
                    "Feed markup error; keeping entries parsed so far"
                );
                break;
            }
        }
    }
    if let Some(open) = current.take() {
        close(open, &mut entries);
    }

    debug!(count = entries.len(), dropped, "Parsed syndication entries");
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/" xmlns:content="http://purl.org/rss/1.0/modules/content/">
<channel>
  <title>Portal</title>
  <link>https://portal.example/</link>
  <item>
    <title><![CDATA[Mutirão de vacinação em Colatina]]></title>
    <link>https://portal.example/noticias/mutirao-vacinacao</link>
    <pubDate>Thu, 15 Oct 2026 12:00:00 GMT</pubDate>
    <description><![CDATA[<p>Postos abertos <b>sábado</b> &amp; domingo.</p><img src="https://portal.example/img/vacina.jpg">]]></description>
  </item>
  <item>
    <title>Feira &amp; cultura no centro</title>
    <link>https://portal.example/noticias/feira</link>
    <dc:date>2026-10-15T10:00:00-03:00</dc:date>
    <enclosure url="https://portal.example/img/feira.jpg" type="image/jpeg" length="100"/>
    <media:thumbnail url="https://portal.example/img/thumb.jpg"/>
  </item>
  <item>
    <title></title>
    <link>https://portal.example/noticias/sem-titulo</link>
  </item>
  <item>
    <title>Sem link</title>
  </item>
</channel>
</rss>"#;

    #[test]
    fn test_parses_rss_items() {
        let entries = parse_feed(RSS);
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.title, "Mutirão de vacinação em Colatina");
        assert_eq!(first.link, "https://portal.example/noticias/mutirao-vacinacao");
        assert_eq!(first.raw_published.as_deref(), Some("Thu, 15 Oct 2026 12:00:00 GMT"));
        assert_eq!(first.raw_image.as_deref(), Some("https://portal.example/img/vacina.jpg"));
        assert_eq!(first.summary, "Postos abertos sábado & domingo.");

        let second = &entries[1];
        assert_eq!(second.title, "Feira & cultura no centro");
        assert_eq!(second.raw_published.as_deref(), Some("2026-10-15T10:00:00-03:00"));
        assert_eq!(second.raw_image.as_deref(), Some("https://portal.example/img/feira.jpg"));
    }

    #[test]
    fn test_parses_atom_entries_with_attribute_links() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Blog</title>
  <link href="https://blog.example/" rel="alternate"/>
  <entry>
    <title type="html">Obra na ponte &lt;b&gt;liberada&lt;/b&gt;</title>
    <link rel="self" href="https://blog.example/feed/1"/>
    <link rel="alternate" href="https://blog.example/2026/10/obra-ponte"/>
    <link rel="enclosure" type="image/png" href="https://blog.example/ponte.png"/>
    <updated>2026-10-14T09:00:00Z</updated>
    <published>2026-10-13T09:00:00Z</published>
    <summary>Trânsito volta ao normal.</summary>
  </entry>
</feed>"#;
        let entries = parse_feed(atom);
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.title, "Obra na ponte liberada");
        assert_eq!(e.link, "https://blog.example/2026/10/obra-ponte");
        assert_eq!(e.raw_published.as_deref(), Some("2026-10-13T09:00:00Z"));
        assert_eq!(e.raw_image.as_deref(), Some("https://blog.example/ponte.png"));
        assert_eq!(e.summary, "Trânsito volta ao normal.");
    }

    #[test]
    fn test_google_news_source_label() {
        let xml = r#"<rss version="2.0"><channel>
<item>
  <title>Campanha de doação de sangue - A Gazeta</title>
  <link>https://news.google.com/rss/articles/CBMiabc?oc=5</link>
  <guid isPermaLink="false">CBMiabc</guid>
  <pubDate>Thu, 15 Oct 2026 08:00:00 GMT</pubDate>
  <description>&lt;a href="https://news.google.com/rss/articles/CBMiabc"&gt;Campanha&lt;/a&gt;</description>
  <source url="https://www.agazeta.com.br">A Gazeta</source>
</item>
</channel></rss>"#;
        let entries = parse_feed(xml);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_label.as_deref(), Some("A Gazeta"));
        assert_eq!(entries[0].link, "https://news.google.com/rss/articles/CBMiabc?oc=5");
        assert_eq!(entries[0].raw_image, None);
    }

    #[test]
    fn test_media_content_non_image_is_skipped() {
        let xml = r#"<rss><channel><item>
<title>Vídeo</title><link>https://v.example/a</link>
<media:content url="https://v.example/a.mp4" type="video/mp4"/>
<media:content url="https://v.example/a.jpg" medium="image"/>
</item></channel></rss>"#;
        let entries = parse_feed(xml);
        assert_eq!(entries[0].raw_image.as_deref(), Some("https://v.example/a.jpg"));
    }

    #[test]
    fn test_malformed_inner_markup_keeps_entries() {
        let xml = r#"<rss><channel>
<item><title>Primeira</title><link>https://m.example/1</link><description><p>sem fechar</description></item>
<item><title>Segunda</title><link>https://m.example/2</link></item>
</channel></rss>"#;
        let entries = parse_feed(xml);
        assert!(!entries.is_empty());
        assert_eq!(entries[0].title, "Primeira");
    }

    #[test]
    fn test_looks_like_feed() {
        assert!(looks_like_feed("<?xml version=\"1.0\"?><rss version=\"2.0\">"));
        assert!(looks_like_feed("<feed xmlns=\"http://www.w3.org/2005/Atom\">"));
        assert!(!looks_like_feed("<!doctype html><html><body>"));
    }
}
