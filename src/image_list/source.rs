//! Image list sources
//!
//! A source couples a persisted [`SourceDefinition`] with the result of
//! its most recent successful fetch. The list format is a capability
//! ([`ListFormat`]) selected by the definition's [`SourceKind`].

use crate::error::{ImgsyncError, ImgsyncResult};
use crate::image::Image;
use crate::image_list::hepix::HepixFormat;
use crate::transport::Transport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Parses a list payload of one particular schema
pub trait ListFormat: Send + Sync {
    /// Retrieve and parse the list described by `definition`
    fn fetch(
        &self,
        name: &str,
        definition: &SourceDefinition,
        transport: &dyn Transport,
    ) -> ImgsyncResult<FetchedList>;
}

/// Supported list formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// HEPiX image list (JSON, optionally wrapped in an S/MIME envelope)
    #[default]
    Hepix,
}

impl SourceKind {
    /// The format implementation backing this kind
    pub fn format(self) -> &'static dyn ListFormat {
        match self {
            Self::Hepix => &HepixFormat,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hepix => write!(f, "hepix"),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Persisted definition of an image list source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDefinition {
    /// Where the list is published
    pub url: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Identifiers to mirror; empty means every image in the list
    #[serde(default, alias = "images")]
    pub subscribed_images: BTreeSet<String>,

    /// Prefix prepended to image names handed to dispatchers
    #[serde(default)]
    pub prefix: String,

    #[serde(default)]
    pub kind: SourceKind,

    /// Distinguished name the list endorser must have
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endorser: Option<String>,

    /// Bearer token sent when requesting the list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl SourceDefinition {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            enabled: true,
            subscribed_images: BTreeSet::new(),
            prefix: String::new(),
            kind: SourceKind::default(),
            endorser: None,
            token: None,
        }
    }
}

/// Outcome of a successful list fetch
#[derive(Debug, Clone)]
pub struct FetchedList {
    /// Identifier the list declares for itself
    pub identifier: Option<String>,
    pub title: Option<String>,
    /// Distinguished name of the endorser that published the list
    pub endorser_dn: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    /// Endorser matches the pinned one (or none is pinned)
    pub trusted: bool,
    /// List passed its consistency checks
    pub verified: bool,
    pub expired: bool,
    pub images: Vec<Image>,
}

/// A configured image list and, once fetched, its images
#[derive(Debug, Clone)]
pub struct ImageListSource {
    name: String,
    definition: SourceDefinition,
    fetched: Option<FetchedList>,
}

impl ImageListSource {
    pub fn new(name: impl Into<String>, definition: SourceDefinition) -> Self {
        Self {
            name: name.into(),
            definition,
            fetched: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &SourceDefinition {
        &self.definition
    }

    pub fn url(&self) -> &str {
        &self.definition.url
    }

    pub fn prefix(&self) -> &str {
        &self.definition.prefix
    }

    pub fn is_enabled(&self) -> bool {
        self.definition.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.definition.enabled = enabled;
    }

    pub fn subscribed_images(&self) -> &BTreeSet<String> {
        &self.definition.subscribed_images
    }

    pub fn fetched(&self) -> Option<&FetchedList> {
        self.fetched.as_ref()
    }

    pub fn is_fetched(&self) -> bool {
        self.fetched.is_some()
    }

    pub fn is_trusted(&self) -> bool {
        self.fetched.as_ref().is_some_and(|f| f.trusted)
    }

    pub fn is_verified(&self) -> bool {
        self.fetched.as_ref().is_some_and(|f| f.verified)
    }

    pub fn is_expired(&self) -> bool {
        self.fetched.as_ref().is_some_and(|f| f.expired)
    }

    /// Whether the cache should hold images from this list
    pub fn is_eligible(&self) -> bool {
        self.is_enabled() && self.is_trusted() && self.is_verified() && !self.is_expired()
    }

    /// Fetch and parse the list, replacing the previous result.
    ///
    /// On failure the previous result is kept.
    pub fn fetch(&mut self, transport: &dyn Transport) -> ImgsyncResult<()> {
        debug!("Fetching list '{}' from '{}'", self.name, self.definition.url);
        let fetched = self
            .definition
            .kind
            .format()
            .fetch(&self.name, &self.definition, transport)?;
        self.fetched = Some(fetched);
        Ok(())
    }

    /// All images declared by the list
    pub fn get_images(&self) -> ImgsyncResult<&[Image]> {
        if !self.is_enabled() {
            return Ok(&[]);
        }
        let fetched = self.require_fetched()?;
        Ok(&fetched.images)
    }

    /// Images matching the subscription filter
    pub fn get_subscribed_images(&self) -> ImgsyncResult<Vec<&Image>> {
        if !self.is_enabled() {
            return Ok(Vec::new());
        }
        let subscribed = &self.definition.subscribed_images;
        let fetched = self.require_fetched()?;
        Ok(fetched
            .images
            .iter()
            .filter(|img| subscribed.is_empty() || subscribed.contains(img.identifier()))
            .collect())
    }

    /// Mutable view of the images matching the subscription filter
    pub fn subscribed_images_mut(&mut self) -> ImgsyncResult<Vec<&mut Image>> {
        if !self.definition.enabled {
            return Ok(Vec::new());
        }
        let subscribed = &self.definition.subscribed_images;
        let fetched = self
            .fetched
            .as_mut()
            .ok_or_else(|| ImgsyncError::ListNotFetched(self.name.clone()))?;
        Ok(fetched
            .images
            .iter_mut()
            .filter(|img| subscribed.is_empty() || subscribed.contains(img.identifier()))
            .collect())
    }

    fn require_fetched(&self) -> ImgsyncResult<&FetchedList> {
        self.fetched
            .as_ref()
            .ok_or_else(|| ImgsyncError::ListNotFetched(self.name.clone()))
    }

    #[cfg(test)]
    pub(crate) fn set_fetched(&mut self, fetched: FetchedList) {
        self.fetched = Some(fetched);
    }
}

#[cfg(test)]
pub(crate) fn trusted_list(images: Vec<Image>) -> FetchedList {
    FetchedList {
        identifier: None,
        title: None,
        endorser_dn: None,
        expires: None,
        trusted: true,
        verified: true,
        expired: false,
        images,
    }
}
