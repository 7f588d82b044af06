use crate::url::resolve;
use crate::LinkRejection;
use url::Url;

/// Resolution state of a [`Link`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// Created but not yet passed through the resolver
    Pending,
    /// Canonical absolute URL, safe to fetch
    Resolved(Url),
    /// The reference cannot be fetched
    Rejected(LinkRejection),
}

/// A reference discovered on a page (or the seed of a crawl)
///
/// A link is created with its raw reference, resolved exactly once, and is
/// read-only afterwards. It is never both fetchable and rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    source: String,
    raw_ref: String,
    state: LinkState,
}

impl Link {
    /// Creates an unresolved link found on `source`
    pub fn new(source: impl Into<String>, raw_ref: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            raw_ref: raw_ref.into(),
            state: LinkState::Pending,
        }
    }

    /// Creates an unresolved seed link (no source page)
    pub fn seed(raw: impl Into<String>) -> Self {
        Self::new(String::new(), raw)
    }

    /// Resolves the reference against its source
    ///
    /// Only the first call does any work; later calls return the stored
    /// state unchanged.
    pub fn resolve(&mut self) -> &LinkState {
        if self.state == LinkState::Pending {
            self.state = match resolve(&self.source, &self.raw_ref) {
                Ok(url) => LinkState::Resolved(url),
                Err(rejection) => LinkState::Rejected(rejection),
            };
        }
        &self.state
    }

    /// Consumes the link and returns it resolved
    pub fn resolved(mut self) -> Self {
        self.resolve();
        self
    }

    /// URL of the page this link was found on, empty for a seed
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The reference as it appeared in the page
    pub fn raw_ref(&self) -> &str {
        &self.raw_ref
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    /// The canonical URL, if resolution succeeded
    pub fn resolved_url(&self) -> Option<&Url> {
        match &self.state {
            LinkState::Resolved(url) => Some(url),
            _ => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.state, LinkState::Rejected(_))
    }

    /// Why the link was rejected, if it was
    pub fn rejection(&self) -> Option<&LinkRejection> {
        match &self.state {
            LinkState::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}
