//! Link extraction from HTML responses
//!
//! Pages are not parsed into a DOM. The body runs through the html5ever
//! tokenizer once and every start tag is inspected as it streams past:
//!
//! - `<a href="...">` yields its href at the matching `</a>`. A self-closing
//!   `<a/>` is its own end tag. A new `<a>` replaces an anchor still open,
//!   and an anchor open at end of input is dropped
//! - resource tags (`img`, `script`, `link`, `iframe`, `frame`, `object`,
//!   `style`, `input`, `video`, `embed`) yield `href`, or `src` when there is
//!   no `href`, immediately
//!
//! Links come out in document order. Script and style bodies are tokenized
//! as raw text, so markup inside them is never mistaken for links.
//! Malformed markup is recovered from, not reported: a truncated tag is
//! dropped and extraction carries on.

use crate::crawler::fetcher::Response;
use crate::url::Link;
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
    TokenizerResult,
};
use tracing::trace;
use url::Url;

/// Tags whose `href`/`src` points at a sub-resource of the page
const RESOURCE_TAGS: &[&str] = &[
    "object", "frame", "iframe", "style", "link", "img", "script", "input", "video", "embed",
];

/// Turns a fetched response into links
pub trait Extractor: Send + Sync {
    /// Extracts every link of `response`, resolved against `source`
    ///
    /// Links that fail to resolve are returned in the rejected state rather
    /// than dropped, so callers can report them.
    fn extract_links(&self, source: &Url, response: &Response) -> Vec<Link>;
}

/// Which tags the extractor looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorOptions {
    /// Include resource tags, not only anchors
    pub resource_tags: bool,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            resource_tags: true,
        }
    }
}

/// Streaming HTML link extractor
#[derive(Debug, Clone, Default)]
pub struct HtmlExtractor {
    options: ExtractorOptions,
}

impl HtmlExtractor {
    pub fn new(options: ExtractorOptions) -> Self {
        Self { options }
    }

    /// Extractor that only follows `<a href>`
    pub fn anchors_only() -> Self {
        Self::new(ExtractorOptions {
            resource_tags: false,
        })
    }

    pub fn options(&self) -> ExtractorOptions {
        self.options
    }
}

impl Extractor for HtmlExtractor {
    fn extract_links(&self, source: &Url, response: &Response) -> Vec<Link> {
        let source = source.as_str();
        extract_refs(&response.text(), self.options)
            .into_iter()
            .map(|raw_ref| Link::new(source, raw_ref).resolved())
            .collect()
    }
}

/// Collects raw, unresolved references from an HTML document
///
/// # Example
///
/// ```
/// use sitecrawl::crawler::{extract_refs, ExtractorOptions};
///
/// let html = r#"<a href="u1">t</a><img href="u2"/>"#;
/// let refs = extract_refs(html, ExtractorOptions::default());
/// assert_eq!(refs, vec!["u1", "u2"]);
/// ```
pub fn extract_refs(html: &str, options: ExtractorOptions) -> Vec<String> {
    let mut input = BufferQueue::new();
    input.push_back(StrTendril::from_slice(html));

    let mut tokenizer = Tokenizer::new(RefCollector::new(options), TokenizerOpts::default());
    // Script results are only produced for sinks with a script handle
    while let TokenizerResult::Script(()) = tokenizer.feed(&mut input) {}
    tokenizer.end();

    tokenizer.sink.refs
}

/// Token sink accumulating references in document order
struct RefCollector {
    options: ExtractorOptions,
    /// href of the anchor currently open, emitted at its end tag
    pending_anchor: Option<String>,
    refs: Vec<String>,
}

impl RefCollector {
    fn new(options: ExtractorOptions) -> Self {
        Self {
            options,
            pending_anchor: None,
            refs: Vec::new(),
        }
    }

    fn finish_anchor(&mut self) {
        if let Some(href) = self.pending_anchor.take() {
            self.refs.push(href);
        }
    }

    fn start_tag(&mut self, tag: &Tag) -> TokenSinkResult<()> {
        let name: &str = &tag.name;

        if name == "a" {
            self.pending_anchor = attribute(tag, "href");
            if tag.self_closing {
                self.finish_anchor();
            }
        } else if self.options.resource_tags && RESOURCE_TAGS.contains(&name) {
            if let Some(reference) = attribute(tag, "href").or_else(|| attribute(tag, "src")) {
                self.refs.push(reference);
            }
        }

        if tag.self_closing {
            return TokenSinkResult::Continue;
        }

        // Same raw-text switches the HTML tree builder performs
        match name {
            "script" => TokenSinkResult::RawData(RawKind::ScriptData),
            "style" | "xmp" | "iframe" | "noembed" | "noframes" => {
                TokenSinkResult::RawData(RawKind::Rawtext)
            }
            "textarea" | "title" => TokenSinkResult::RawData(RawKind::Rcdata),
            _ => TokenSinkResult::Continue,
        }
    }
}

impl TokenSink for RefCollector {
    type Handle = ();

    fn process_token(&mut self, token: Token, line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => return self.start_tag(&tag),
                TagKind::EndTag => {
                    if &*tag.name == "a" {
                        self.finish_anchor();
                    }
                }
            },
            Token::ParseError(error) => {
                trace!(line = line_number, "recovered from HTML error: {}", error);
            }
            Token::EOFToken => {
                if let Some(href) = self.pending_anchor.take() {
                    trace!(href = %href, "dropping anchor left open at end of input");
                }
            }
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

/// Trimmed, non-empty value of the named attribute
fn attribute(tag: &Tag, name: &str) -> Option<String> {
    tag.attrs
        .iter()
        .find(|attr| &*attr.name.local == name)
        .map(|attr| attr.value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
