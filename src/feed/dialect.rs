//! Per-dialect field extraction tables.
//!
//! The dialect is detected once per document. Each table lists, in priority
//! order, the namespace-qualified elements a field may come from, so a
//! `<dc:title>` is never mistaken for a `<title>` and an `<atom:link>` inside
//! an RSS channel never shadows the channel's own `<link>`.

use super::xml::{Element, Ns};

/// Syndication formats the parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// RSS 0.9x / 2.0: unnamespaced `<rss><channel><item>`.
    Rss2,
    /// Atom 1.0 (and 0.3): `<feed><entry>`.
    Atom,
    /// RSS 1.0: `<rdf:RDF>` with `<channel>` and `<item>` as siblings.
    Rdf,
}

/// An element reference inside a field table.
#[derive(Debug, Clone, Copy)]
pub enum Tag {
    /// The dialect's own namespace. Unnamespaced elements also match, since
    /// many Atom and RDF feeds omit the default namespace declaration.
    Core(&'static str),
    Atom(&'static str),
    Dc(&'static str),
    Content(&'static str),
    Media(&'static str),
}

pub struct Fields {
    pub title: &'static [Tag],
    pub pub_date: &'static [Tag],
    /// Elements whose text is a URL (RSS style).
    pub link_text: &'static [Tag],
    /// Elements whose `href` attribute is a URL (Atom style).
    pub link_href: &'static [Tag],
    pub guid: &'static [Tag],
    pub content: &'static [Tag],
    pub description: &'static [Tag],
    pub author: &'static [Tag],
    pub categories: &'static [Tag],
    /// Feed-level image candidates whose own text is the URL.
    pub image: &'static [Tag],
}

static RSS2: Fields = Fields {
    title: &[Tag::Core("title"), Tag::Dc("title")],
    pub_date: &[
        Tag::Core("pubDate"),
        Tag::Dc("date"),
        Tag::Atom("published"),
        Tag::Atom("updated"),
    ],
    link_text: &[Tag::Core("link")],
    link_href: &[Tag::Core("link"), Tag::Atom("link")],
    guid: &[Tag::Core("guid"), Tag::Atom("id")],
    content: &[
        Tag::Content("encoded"),
        Tag::Atom("content"),
        Tag::Core("description"),
        Tag::Atom("summary"),
    ],
    description: &[Tag::Core("description"), Tag::Atom("summary")],
    author: &[Tag::Dc("creator"), Tag::Core("author"), Tag::Atom("author")],
    categories: &[Tag::Core("category"), Tag::Atom("category")],
    image: &[Tag::Atom("icon"), Tag::Atom("logo")],
};

static ATOM: Fields = Fields {
    title: &[Tag::Core("title")],
    pub_date: &[
        Tag::Core("published"),
        Tag::Core("updated"),
        Tag::Core("issued"),
        Tag::Core("modified"),
        Tag::Dc("date"),
    ],
    link_text: &[Tag::Core("link")],
    link_href: &[Tag::Core("link")],
    guid: &[Tag::Core("id")],
    content: &[Tag::Core("content"), Tag::Core("summary")],
    description: &[Tag::Core("summary"), Tag::Core("subtitle"), Tag::Core("tagline")],
    author: &[Tag::Dc("creator"), Tag::Core("author")],
    categories: &[Tag::Core("category")],
    image: &[Tag::Core("icon"), Tag::Core("logo")],
};

static RDF: Fields = Fields {
    title: &[Tag::Core("title"), Tag::Dc("title")],
    pub_date: &[Tag::Dc("date"), Tag::Core("pubDate")],
    link_text: &[Tag::Core("link")],
    link_href: &[],
    guid: &[Tag::Core("guid")],
    content: &[Tag::Content("encoded"), Tag::Core("description")],
    description: &[Tag::Core("description")],
    author: &[Tag::Dc("creator")],
    categories: &[Tag::Dc("subject"), Tag::Core("category")],
    image: &[],
};

impl Dialect {
    /// Detects the dialect from the document element.
    ///
    /// Returns the dialect together with the element holding feed metadata
    /// (`channel` or `feed`), or `None` when neither exists.
    pub fn detect(root: &Element) -> Option<(Dialect, &Element)> {
        if root.local.eq_ignore_ascii_case("feed") {
            return Some((Dialect::Atom, root));
        }
        let channel = if root.local.eq_ignore_ascii_case("channel") {
            root
        } else {
            root.find_descendant("channel")?
        };
        let dialect = if root.ns == Ns::Rdf || channel.ns == Ns::Rss1 {
            Dialect::Rdf
        } else {
            Dialect::Rss2
        };
        Some((dialect, channel))
    }

    pub fn fields(self) -> &'static Fields {
        match self {
            Dialect::Rss2 => &RSS2,
            Dialect::Atom => &ATOM,
            Dialect::Rdf => &RDF,
        }
    }

    fn core(self) -> Ns {
        match self {
            Dialect::Rss2 => Ns::None,
            Dialect::Atom => Ns::Atom,
            Dialect::Rdf => Ns::Rss1,
        }
    }

    /// Local name of the per-entry element.
    pub fn entry_name(self) -> &'static str {
        match self {
            Dialect::Atom => "entry",
            Dialect::Rss2 | Dialect::Rdf => "item",
        }
    }
}

/// A detected dialect plus the namespace its core elements carry in one
/// document.
///
/// Old feeds put RSS under a default namespace of their own, such as
/// `http://backend.userland.com/rss2` or the RSS 0.90
/// `http://my.netscape.com/rdf/simple/0.9/`. Those elements match
/// [`Tag::Core`] because the metadata element carries the same namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    dialect: Dialect,
    core: Ns,
}

impl From<Dialect> for Profile {
    fn from(dialect: Dialect) -> Self {
        Profile {
            dialect,
            core: dialect.core(),
        }
    }
}

impl Profile {
    /// Like [`Dialect::detect`], recording the namespace of the metadata
    /// element as the document's core namespace.
    pub fn detect(root: &Element) -> Option<(Profile, &Element)> {
        let (dialect, channel) = Dialect::detect(root)?;
        let profile = Profile {
            dialect,
            core: channel.ns.clone(),
        };
        Some((profile, channel))
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn fields(&self) -> &'static Fields {
        self.dialect.fields()
    }

    pub fn entry_name(&self) -> &'static str {
        self.dialect.entry_name()
    }

    pub fn matches(&self, el: &Element, tag: Tag) -> bool {
        match tag {
            Tag::Core(local) => {
                (el.ns == Ns::None || el.ns == self.core || el.ns == self.dialect.core())
                    && el.local.eq_ignore_ascii_case(local)
            }
            Tag::Atom(local) => el.is(&Ns::Atom, local),
            Tag::Dc(local) => el.is(&Ns::Dc, local),
            Tag::Content(local) => el.is(&Ns::Content, local),
            Tag::Media(local) => el.is(&Ns::Media, local),
        }
    }

    /// First child matching `tag`.
    pub fn child<'a>(&self, parent: &'a Element, tag: Tag) -> Option<&'a Element> {
        parent.children.iter().find(|c| self.matches(c, tag))
    }

    /// All children matching `tag`, in document order.
    pub fn children<'a>(
        &'a self,
        parent: &'a Element,
        tag: Tag,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        parent.children.iter().filter(move |c| self.matches(c, tag))
    }

    /// Every entry element below `parent`, in document order, however deep
    /// wrappers nest them. The walk does not descend into a matched entry.
    pub fn entries<'a>(&self, parent: &'a Element) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_entries(parent, Tag::Core(self.entry_name()), &mut found);
        found
    }

    fn collect_entries<'a>(&self, parent: &'a Element, tag: Tag, found: &mut Vec<&'a Element>) {
        for child in &parent.children {
            if self.matches(child, tag) {
                found.push(child);
            } else {
                self.collect_entries(child, tag, found);
            }
        }
    }

    /// Text of the first non-empty child found walking `tags` in order.
    pub fn first_text(&self, parent: &Element, tags: &[Tag]) -> String {
        tags.iter()
            .flat_map(|&tag| self.children(parent, tag))
            .map(Element::text_content)
            .find(|t| !t.is_empty())
            .unwrap_or_default()
    }

    /// `href` of the preferred link element.
    ///
    /// Links with `rel="alternate"` or no `rel` win over `self`, `replies`
    /// and friends; if only those exist the first one is used.
    pub fn link_href(&self, parent: &Element) -> String {
        let links: Vec<&Element> = self
            .fields()
            .link_href
            .iter()
            .flat_map(|&tag| self.children(parent, tag))
            .filter(|l| l.attr_text("href").is_some())
            .collect();

        let preferred = links.iter().find(|l| {
            l.attr("rel")
                .map(|rel| rel.trim().eq_ignore_ascii_case("alternate"))
                .unwrap_or(true)
        });
        preferred
            .or(links.first())
            .and_then(|l| l.attr_text("href"))
            .unwrap_or_default()
    }

    /// Author, either as flat text or nested `<author><name>`.
    pub fn author(&self, parent: &Element) -> String {
        let candidates = self
            .fields()
            .author
            .iter()
            .flat_map(|&tag| self.children(parent, tag));
        for el in candidates {
            let text = if el.children.is_empty() {
                el.text_content()
            } else {
                el.child_text("name")
            };
            if !text.is_empty() {
                return text;
            }
        }
        String::new()
    }
}
