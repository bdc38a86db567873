//! Minimal owned element tree over `quick-xml` events.
//!
//! Feeds are small (bounded by the transport's body limit), so the parser
//! builds the whole document once and the dialect tables walk it. Each element
//! records the namespace its prefix resolved to, which is what lets the
//! dialect tables tell `atom:link` apart from RSS `<link>`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::parser::ParseError;

/// SEC-003: Maximum element nesting depth accepted from a feed.
pub const MAX_DEPTH: usize = 64;

const NS_ATOM: &str = "http://www.w3.org/2005/Atom";
const NS_ATOM_03: &str = "http://purl.org/atom/ns#";
const NS_RSS1: &str = "http://purl.org/rss/1.0/";
const NS_RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
const NS_CONTENT: &str = "http://purl.org/rss/1.0/modules/content/";
const NS_MEDIA: &str = "http://search.yahoo.com/mrss/";

/// Namespaces the dialect tables distinguish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ns {
    /// No namespace (plain RSS 2.0 elements).
    None,
    Atom,
    Rss1,
    Rdf,
    Dc,
    Content,
    Media,
    Other(String),
}

impl Ns {
    fn from_uri(uri: &str) -> Self {
        match uri.trim_end_matches('/') {
            u if u == NS_ATOM || u == NS_ATOM_03.trim_end_matches('/') => Ns::Atom,
            u if u == NS_RSS1.trim_end_matches('/') => Ns::Rss1,
            u if u == NS_RDF.trim_end_matches('/') => Ns::Rdf,
            u if u == NS_DC.trim_end_matches('/') => Ns::Dc,
            u if u == NS_CONTENT.trim_end_matches('/') => Ns::Content,
            u if u == NS_MEDIA.trim_end_matches('/') => Ns::Media,
            _ => Ns::Other(uri.to_string()),
        }
    }

    /// Conventional prefixes, used when a feed forgets to declare them.
    fn from_conventional_prefix(prefix: &str) -> Self {
        match prefix.to_ascii_lowercase().as_str() {
            "atom" => Ns::Atom,
            "rdf" => Ns::Rdf,
            "dc" => Ns::Dc,
            "content" => Ns::Content,
            "media" => Ns::Media,
            other => Ns::Other(format!("urn:undeclared:{}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub ns: Ns,
    /// Tag name as written, prefix included (`dc:creator`).
    pub qname: String,
    /// Tag name with any prefix removed (`creator`).
    pub local: String,
    /// Attributes keyed by local name (`rdf:about` is stored as `about`).
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    text: String,
}

impl Element {
    pub fn is(&self, ns: &Ns, local: &str) -> bool {
        self.ns == *ns && self.local.eq_ignore_ascii_case(local)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Non-empty trimmed attribute value.
    pub fn attr_text(&self, name: &str) -> Option<String> {
        self.attr(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Concatenated text of this element and all descendants, trimmed.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out.trim().to_string()
    }

    fn collect_text(&self, out: &mut String) {
        out.push_str(&self.text);
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// First direct child whose local name, ignoring any prefix and case,
    /// ends with `local`.
    ///
    /// Namespace URIs are not checked, so `<dc:title>` and `<title>` are
    /// indistinguishable here. Callers that need the distinction use
    /// [`Element::child_ns`].
    pub fn child_by_suffix(&self, local: &str) -> Option<&Element> {
        let wanted = local.to_ascii_lowercase();
        self.children
            .iter()
            .find(|c| c.local.to_ascii_lowercase().ends_with(&wanted))
    }

    /// Trimmed text of [`Element::child_by_suffix`], empty when absent.
    pub fn child_text(&self, local: &str) -> String {
        self.child_by_suffix(local)
            .map(Element::text_content)
            .unwrap_or_default()
    }

    pub fn child_ns(&self, ns: &Ns, local: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(ns, local))
    }

    pub fn children_ns<'a>(
        &'a self,
        ns: &'a Ns,
        local: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(ns, local))
    }

    /// Depth-first search for the first descendant (self excluded) with
    /// the given local name.
    pub fn find_descendant(&self, local: &str) -> Option<&Element> {
        for child in &self.children {
            if child.local.eq_ignore_ascii_case(local) {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(local) {
                return Some(found);
            }
        }
        None
    }
}

/// Namespace declarations in scope for one open element.
struct Scope {
    default_ns: Option<String>,
    prefixes: Vec<(String, String)>,
}

fn resolve(scopes: &[Scope], prefix: Option<&str>) -> Ns {
    match prefix {
        None => scopes
            .iter()
            .rev()
            .find_map(|s| s.default_ns.as_deref())
            .filter(|uri| !uri.is_empty())
            .map(Ns::from_uri)
            .unwrap_or(Ns::None),
        Some(p) => scopes
            .iter()
            .rev()
            .flat_map(|s| s.prefixes.iter().rev())
            .find(|(declared, _)| declared == p)
            .map(|(_, uri)| Ns::from_uri(uri))
            .unwrap_or_else(|| Ns::from_conventional_prefix(p)),
    }
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

fn open_element(e: &BytesStart<'_>, reader: &Reader<&[u8]>, scopes: &mut Vec<Scope>) -> Element {
    let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut scope = Scope {
        default_ns: None,
        prefixes: Vec::new(),
    };
    let mut attrs = Vec::new();

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(err) => {
                tracing::debug!(element = %qname, error = %err, "Skipping malformed attribute");
                continue;
            }
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.decode_and_unescape_value(reader.decoder()) {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };

        if key == "xmlns" {
            scope.default_ns = Some(value);
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.prefixes.push((prefix.to_string(), value));
        } else {
            let (_, local) = split_qname(&key);
            attrs.push((local.to_string(), value));
        }
    }

    scopes.push(scope);
    let (prefix, local) = split_qname(&qname);
    let ns = resolve(scopes, prefix);
    let local = local.to_string();

    Element {
        ns,
        qname,
        local,
        attrs,
        children: Vec::new(),
        text: String::new(),
    }
}

/// Parses a document into its root element.
///
/// Well-formedness is enforced by `quick-xml` (mismatched end tags) plus
/// our own check that every opened element is closed by EOF.
pub fn parse_document(text: &str) -> Result<Element, ParseError> {
    // SEC-002: quick-xml 0.37 never expands <!ENTITY> declarations; unknown
    // entities fail unescaping and fall back to the raw text below.
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut scopes: Vec<Scope> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if root.is_some() {
                    return Err(ParseError::Malformed(
                        "content after the document element".to_string(),
                    ));
                }
                if stack.len() >= MAX_DEPTH {
                    return Err(ParseError::TooDeep(MAX_DEPTH));
                }
                let el = open_element(&e, &reader, &mut scopes);
                stack.push(el);
            }
            Ok(Event::Empty(e)) => {
                let el = open_element(&e, &reader, &mut scopes);
                scopes.pop();
                match stack.last_mut() {
                    Some(parent) => parent.children.push(el),
                    None if root.is_none() => root = Some(el),
                    None => {
                        return Err(ParseError::Malformed(
                            "content after the document element".to_string(),
                        ))
                    }
                }
            }
            Ok(Event::End(_)) => {
                scopes.pop();
                let Some(el) = stack.pop() else {
                    return Err(ParseError::Malformed("unexpected closing tag".to_string()));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(el),
                    None => root = Some(el),
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(current) = stack.last_mut() {
                    match e.unescape() {
                        Ok(t) => current.text.push_str(&t),
                        Err(err) => {
                            tracing::debug!(error = %err, "Unrecognized entity, keeping raw text");
                            current.text.push_str(&String::from_utf8_lossy(&e));
                        }
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::Malformed(format!(
                    "{} at position {}",
                    e,
                    reader.error_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::Malformed(format!(
            "unclosed element <{}>",
            open.qname
        )));
    }
    root.ok_or_else(|| ParseError::Malformed("no document element".to_string()))
}
