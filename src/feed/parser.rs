use thiserror::Error;

use super::dialect::{Dialect, Profile, Tag};
use super::normalize::normalize;
use super::types::{Article, FeedInfo, FeedResult};
use super::xml::{self, Element};

/// Items kept per feed when no explicit cap is configured.
pub const DEFAULT_MAX_ITEMS: usize = 15;

/// Errors raised while turning feed text into a [`FeedResult`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The text is not well-formed XML.
    #[error("Failed to parse XML, the feed might be invalid or the content is not XML: {0}")]
    Malformed(String),
    /// Well-formed XML, but not a feed.
    #[error("Invalid feed format: could not find <channel> or <feed> element")]
    MissingRoot,
    /// SEC-003: Nesting deeper than the parser accepts.
    #[error("XML nesting exceeds maximum of {0} levels")]
    TooDeep(usize),
}

/// Parses RSS 2.0, Atom or RDF text with the default item cap.
pub fn parse(text: &str, source_url: &str) -> Result<FeedResult, ParseError> {
    parse_with_limit(text, source_url, DEFAULT_MAX_ITEMS)
}

/// Parses feed text, keeping at most `max_items` entries in feed order.
///
/// Items are neither re-sorted nor filtered; the cap only bounds how much a
/// single feed contributes downstream. Parsing has no hidden state, so the
/// same text always yields the same result.
pub fn parse_with_limit(
    text: &str,
    source_url: &str,
    max_items: usize,
) -> Result<FeedResult, ParseError> {
    let root = xml::parse_document(text)?;
    let (profile, channel) = Profile::detect(&root).ok_or(ParseError::MissingRoot)?;
    let dialect = profile.dialect();

    // RDF puts items next to <channel>, RSS 2.0 inside it.
    let item_parent = match dialect {
        Dialect::Rdf => &root,
        Dialect::Rss2 | Dialect::Atom => channel,
    };
    let entries = profile.entries(item_parent);
    let total = entries.len();

    let items: Vec<Article> = entries
        .into_iter()
        .take(max_items)
        .enumerate()
        .map(|(index, item)| normalize(item, index, source_url, &profile))
        .collect();

    if total > items.len() {
        tracing::debug!(
            feed = %source_url,
            total = total,
            kept = items.len(),
            "Truncated feed items to cap"
        );
    }

    let feed = feed_info(&root, channel, &profile, source_url);
    tracing::debug!(feed = %source_url, ?dialect, items = items.len(), "Parsed feed");
    Ok(FeedResult::ok(feed, items))
}

fn feed_info(root: &Element, channel: &Element, profile: &Profile, source_url: &str) -> FeedInfo {
    let fields = profile.fields();

    let mut link = profile.first_text(channel, fields.link_text);
    if link.is_empty() {
        link = profile.link_href(channel);
    }

    let mut description = profile.first_text(channel, fields.description);
    if description.is_empty() {
        description = channel.child_text("subtitle");
    }

    let author = match profile.dialect() {
        Dialect::Rss2 => {
            let editor = profile.first_text(channel, &[Tag::Core("managingEditor")]);
            if editor.is_empty() {
                profile.author(channel)
            } else {
                editor
            }
        }
        Dialect::Atom | Dialect::Rdf => profile.author(channel),
    };

    FeedInfo {
        url: source_url.to_string(),
        title: profile.first_text(channel, fields.title),
        link,
        description,
        author,
        image: image_url(root, channel, profile),
    }
}

/// `<image><url>` (RSS 2.0 inside the channel, RDF beside it), then the
/// dialect's icon/logo elements.
fn image_url(root: &Element, channel: &Element, profile: &Profile) -> String {
    let image_holder = match profile.dialect() {
        Dialect::Rdf => root,
        Dialect::Rss2 | Dialect::Atom => channel,
    };
    let from_image = profile
        .child(image_holder, Tag::Core("image"))
        .map(|img| img.child_text("url"))
        .unwrap_or_default();
    if !from_image.is_empty() {
        return from_image;
    }
    profile.first_text(channel, profile.fields().image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Security Weekly</title>
    <atom:link href="https://sec.example/feed" rel="self" type="application/rss+xml"/>
    <link>https://sec.example/</link>
    <description>News</description>
    <managingEditor>editor@sec.example</managingEditor>
    <image><url>https://sec.example/logo.png</url><title>Logo</title></image>
    <item><title>One</title><link>https://sec.example/1</link></item>
    <item><title>Two</title><link>https://sec.example/2</link></item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Blog</title>
  <subtitle>Thoughts</subtitle>
  <link rel="self" href="https://blog.example/atom.xml"/>
  <link href="https://blog.example/"/>
  <icon>https://blog.example/icon.png</icon>
  <author><name>Blogger</name></author>
  <entry><title>E1</title><id>urn:1</id><link href="https://blog.example/1"/></entry>
</feed>"#;

    const RDF: &str = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://purl.org/rss/1.0/"
         xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel rdf:about="https://rdf.example/">
    <title>RDF Site</title>
    <link>https://rdf.example/</link>
    <description>Old school</description>
  </channel>
  <image rdf:about="https://rdf.example/img.png"><url>https://rdf.example/img.png</url></image>
  <item rdf:about="https://rdf.example/a">
    <title>A</title>
    <link>https://rdf.example/a</link>
    <dc:date>2024-02-01T00:00:00Z</dc:date>
    <dc:subject>rdf</dc:subject>
  </item>
</rdf:RDF>"#;

    #[test]
    fn test_minimal_rss_scenario() {
        let feed = parse(
            "<rss><channel><item><title>X</title><link>https://a/1</link></item></channel></rss>",
            "https://a/feed",
        )
        .unwrap();
        assert!(feed.is_ok());
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].title, "X");
        assert_eq!(feed.items[0].link, "https://a/1");
        assert_eq!(feed.items[0].guid, "https://a/1");
    }

    #[test]
    fn test_rss_feed_metadata() {
        let feed = parse(RSS, "https://sec.example/feed").unwrap();
        assert_eq!(
            feed.feed,
            FeedInfo {
                url: "https://sec.example/feed".into(),
                title: "Security Weekly".into(),
                link: "https://sec.example/".into(),
                description: "News".into(),
                author: "editor@sec.example".into(),
                image: "https://sec.example/logo.png".into(),
            }
        );
        let titles: Vec<_> = feed.items.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two"]);
    }

    #[test]
    fn test_atom_feed_metadata() {
        let feed = parse(ATOM, "https://blog.example/atom.xml").unwrap();
        assert_eq!(feed.feed.title, "Atom Blog");
        assert_eq!(feed.feed.link, "https://blog.example/");
        assert_eq!(feed.feed.description, "Thoughts");
        assert_eq!(feed.feed.author, "Blogger");
        assert_eq!(feed.feed.image, "https://blog.example/icon.png");
        assert_eq!(feed.items[0].link, "https://blog.example/1");
        assert_eq!(feed.items[0].guid, "urn:1");
    }

    #[test]
    fn test_rdf_items_beside_channel() {
        let feed = parse(RDF, "https://rdf.example/rss").unwrap();
        assert_eq!(feed.feed.title, "RDF Site");
        assert_eq!(feed.feed.image, "https://rdf.example/img.png");
        assert_eq!(feed.items.len(), 1);
        let item = &feed.items[0];
        assert_eq!(item.link, "https://rdf.example/a");
        assert_eq!(item.pub_date, "2024-02-01T00:00:00Z");
        assert_eq!(item.categories, vec!["rdf"]);
    }

    #[test]
    fn test_items_capped_in_feed_order() {
        let items: String = (0..20)
            .map(|i| format!("<item><title>T{i}</title><link>https://a/{i}</link></item>"))
            .collect();
        let text = format!("<rss><channel>{items}</channel></rss>");

        let feed = parse(&text, "https://a/feed").unwrap();
        assert_eq!(feed.items.len(), DEFAULT_MAX_ITEMS);
        assert_eq!(feed.items[0].title, "T0");
        assert_eq!(feed.items[14].title, "T14");

        let small = parse_with_limit(&text, "https://a/feed", 3).unwrap();
        assert_eq!(small.items.len(), 3);
    }

    #[test]
    fn test_malformed_xml() {
        let err = parse("<rss><channel><item></channel></rss>", "https://a/feed").unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
        assert!(err.to_string().contains("Failed to parse XML"));
    }

    #[test]
    fn test_html_page_is_missing_root() {
        let err = parse("<html><head><title>Hi</title></head></html>", "https://a/").unwrap_err();
        assert_eq!(err, ParseError::MissingRoot);
    }

    #[test]
    fn test_empty_channel() {
        let feed = parse("<rss><channel></channel></rss>", "https://a/feed").unwrap();
        assert!(feed.items.is_empty());
    }

    #[test]
    fn test_parse_is_idempotent() {
        let first = parse(RSS, "https://sec.example/feed").unwrap();
        let second = parse(RSS, "https://sec.example/feed").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rss_under_default_namespace() {
        let feed = parse(
            r#"<rss version="2.0" xmlns="http://backend.userland.com/rss2"><channel><title>T</title><item><title>X</title><link>https://a/1</link></item></channel></rss>"#,
            "https://a/feed",
        )
        .unwrap();
        assert_eq!(feed.feed.title, "T");
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].title, "X");
        assert_eq!(feed.items[0].link, "https://a/1");
    }

    #[test]
    fn test_rss_090_netscape_namespace() {
        let feed = parse(
            r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://my.netscape.com/rdf/simple/0.9/">
  <channel>
    <title>Mozilla Dot Org</title>
    <link>http://www.mozilla.org</link>
  </channel>
  <item>
    <title>New Status Updates</title>
    <link>http://www.mozilla.org/status/</link>
  </item>
  <item>
    <title>Bugzilla Reorganized</title>
    <link>http://www.mozilla.org/bugs/</link>
  </item>
</rdf:RDF>"#,
            "https://a/feed",
        )
        .unwrap();
        assert_eq!(feed.feed.title, "Mozilla Dot Org");
        assert_eq!(feed.feed.link, "http://www.mozilla.org");
        let titles: Vec<_> = feed.items.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["New Status Updates", "Bugzilla Reorganized"]);
    }

    #[test]
    fn test_items_inside_wrapper_element() {
        let feed = parse(
            "<rss><channel><title>T</title><items><item><title>X</title><link>https://a/1</link></item></items></channel></rss>",
            "https://a/feed",
        )
        .unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].link, "https://a/1");
    }
}
