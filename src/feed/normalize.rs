use super::dialect::{Dialect, Profile, Tag};
use super::types::{Article, Enclosure};
use super::xml::Element;
use crate::util::{strip_markup, truncate_chars};

/// Characters kept when a description is derived from content.
const DESCRIPTION_LEN: usize = 250;

/// Converts one `<item>`/`<entry>` into an [`Article`].
///
/// Total: missing fields degrade to empty strings. `guid` falls back to the
/// link and finally to `"{feed_url}#{index}"`, so it is never empty.
/// Entries without title or link are still emitted; filtering junk is left
/// to whoever displays them.
pub fn normalize(item: &Element, index: usize, feed_url: &str, profile: &Profile) -> Article {
    let fields = profile.fields();

    let title = profile.first_text(item, fields.title);
    let pub_date = profile.first_text(item, fields.pub_date);

    let mut link = profile.first_text(item, fields.link_text);
    if link.is_empty() {
        link = profile.link_href(item);
    }

    let mut guid = profile.first_text(item, fields.guid);
    if guid.is_empty() {
        guid = if link.is_empty() {
            format!("{}#{}", feed_url, index)
        } else {
            link.clone()
        };
    }

    let content = profile.first_text(item, fields.content);
    let mut description = profile.first_text(item, fields.description);
    if description.is_empty() {
        description = truncate_chars(&strip_markup(&content), DESCRIPTION_LEN).into_owned();
    }

    let author = profile.author(item);
    let enclosure = enclosure(item, profile);
    let thumbnail = profile
        .child(item, Tag::Media("thumbnail"))
        .and_then(|t| t.attr_text("url"))
        .or_else(|| enclosure.link.clone())
        .unwrap_or_default();

    let categories = fields
        .categories
        .iter()
        .flat_map(|&tag| profile.children(item, tag))
        .map(|c| {
            let text = c.text_content();
            if text.is_empty() {
                c.attr_text("term").unwrap_or_default()
            } else {
                text
            }
        })
        .filter(|c| !c.is_empty())
        .collect();

    Article {
        title,
        pub_date,
        link,
        guid,
        author,
        thumbnail,
        description,
        content,
        enclosure,
        categories,
    }
}

/// RSS `<enclosure url type length>`; Atom `<link rel="enclosure" href type length>`.
fn enclosure(item: &Element, profile: &Profile) -> Enclosure {
    let (el, url_attr) = match profile.dialect() {
        Dialect::Atom => (
            profile.children(item, Tag::Core("link")).find(|l| {
                l.attr("rel")
                    .is_some_and(|rel| rel.trim().eq_ignore_ascii_case("enclosure"))
            }),
            "href",
        ),
        Dialect::Rss2 | Dialect::Rdf => (profile.child(item, Tag::Core("enclosure")), "url"),
    };

    let Some(el) = el else {
        return Enclosure::default();
    };
    Enclosure {
        link: el.attr_text(url_attr),
        mime_type: el.attr_text("type"),
        length: el
            .attr("length")
            .and_then(|l| l.trim().parse::<u64>().ok())
            .filter(|&l| l > 0),
    }
}
