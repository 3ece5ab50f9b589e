//! Environment trait: the stateful surface the agent perceives and drives.
//!
//! An environment is anything with an indexable interactive surface: a
//! browser, an HTML session, a scripted fake in tests. The agent core only
//! ever talks to it through this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::EnvironmentError;

/// Index of an addressable element. Unique within one snapshot only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementIndex(pub u32);

impl std::fmt::Display for ElementIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One discrete point of interaction within a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressableElement {
    pub index: ElementIndex,

    /// Tag name, e.g. `a`, `button`, `input`
    pub tag: String,

    /// Explicit or implied role, e.g. `link`, `textbox`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Visible text, whitespace-collapsed
    pub text: String,

    /// Attributes worth showing to the model (href, placeholder, name...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,

    /// Hash of the element's structural position, stable across captures
    pub structural_hash: String,

    /// Not present in the previous observation
    #[serde(default)]
    pub is_new: bool,

    /// Inside the current viewport window
    #[serde(default = "default_true")]
    pub in_viewport: bool,
}

fn default_true() -> bool {
    true
}

impl AddressableElement {
    pub fn new(index: u32, tag: impl Into<String>, text: impl Into<String>) -> Self {
        let tag = tag.into();
        let text = text.into();
        let structural_hash = format!("{tag}:{index}:{text}");
        Self {
            index: ElementIndex(index),
            tag,
            role: None,
            text,
            attributes: BTreeMap::new(),
            structural_hash,
            is_new: false,
            in_viewport: true,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.structural_hash = hash.into();
        self
    }
}

/// Mapping from index to element, ordered by index.
pub type SelectorMap = BTreeMap<ElementIndex, AddressableElement>;

/// An opaque visual reference (screenshot) attached to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualReference {
    pub media_type: String,
    pub data_base64: String,
}

/// An open secondary context (tab or window).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextInfo {
    pub id: u32,
    pub location: String,
    pub title: String,
    #[serde(default)]
    pub active: bool,
}

/// Options controlling one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureOptions {
    pub use_visual_reference: bool,

    /// Margin outside the viewport to include; negative means everything
    pub viewport_expansion: i64,

    pub include_dynamic_attributes: bool,

    pub cache_structural_hashes: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            use_visual_reference: true,
            viewport_expansion: 500,
            include_dynamic_attributes: true,
            cache_structural_hashes: true,
        }
    }
}

/// A captured, time-stamped description of the interactive surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub location: String,
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual: Option<VisualReference>,

    /// Elements in document order
    pub elements: Vec<AddressableElement>,

    #[serde(default)]
    pub contexts: Vec<ContextInfo>,

    /// Elements cut off above / below the viewport window
    #[serde(default)]
    pub elements_above: usize,
    #[serde(default)]
    pub elements_below: usize,

    /// The environment did not settle before the timeout
    #[serde(default)]
    pub stale: bool,

    pub captured_at: DateTime<Utc>,
}

impl EnvironmentSnapshot {
    pub fn new(location: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            title: title.into(),
            visual: None,
            elements: Vec::new(),
            contexts: Vec::new(),
            elements_above: 0,
            elements_below: 0,
            stale: false,
            captured_at: Utc::now(),
        }
    }

    pub fn with_elements(mut self, elements: Vec<AddressableElement>) -> Self {
        self.elements = elements;
        self
    }

    pub fn selector_map(&self) -> SelectorMap {
        self.elements
            .iter()
            .map(|e| (e.index, e.clone()))
            .collect()
    }

    pub fn element(&self, index: ElementIndex) -> Option<&AddressableElement> {
        self.elements.iter().find(|e| e.index == index)
    }

    /// The compact form recorded in run history.
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            location: self.location.clone(),
            title: self.title.clone(),
            element_count: self.elements.len(),
            new_element_count: self.elements.iter().filter(|e| e.is_new).count(),
            context_count: self.contexts.len(),
            stale: self.stale,
            captured_at: self.captured_at,
        }
    }
}

/// What history keeps of a snapshot once its step is over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub location: String,
    pub title: String,
    pub element_count: usize,
    pub new_element_count: usize,
    pub context_count: usize,
    pub stale: bool,
    pub captured_at: DateTime<Utc>,
}

/// What an interaction did to the environment, beyond its direct effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionEffect {
    /// The surface changed in place (or not at all)
    None,
    /// The interaction moved to a new location
    Navigated { location: String },
    /// The interaction opened a new context
    OpenedContext { id: u32 },
}

impl InteractionEffect {
    /// Whether actions planned against the old surface are now stale.
    pub fn invalidates_surface(&self) -> bool {
        !matches!(self, Self::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// The environment collaborator.
///
/// Only `capture`, `current_selector_map`, `current_location`, `navigate`,
/// `click` and `type_text` are mandatory; the other primitives default to
/// [`EnvironmentError::Unsupported`].
#[async_trait]
pub trait Environment: Send {
    /// Short name for logging (e.g. "http", "mock").
    fn name(&self) -> &str;

    /// Capture the current interactive surface.
    async fn capture(
        &mut self,
        options: &CaptureOptions,
    ) -> std::result::Result<EnvironmentSnapshot, EnvironmentError>;

    /// The selector map as of right now, not as of the last capture.
    async fn current_selector_map(&mut self) -> std::result::Result<SelectorMap, EnvironmentError>;

    /// Identifier of the current location (a URL for web environments).
    async fn current_location(&mut self) -> std::result::Result<String, EnvironmentError>;

    async fn navigate(&mut self, location: &str) -> std::result::Result<(), EnvironmentError>;

    async fn click(
        &mut self,
        index: ElementIndex,
    ) -> std::result::Result<InteractionEffect, EnvironmentError>;

    async fn type_text(
        &mut self,
        index: ElementIndex,
        text: &str,
    ) -> std::result::Result<(), EnvironmentError>;

    async fn go_back(&mut self) -> std::result::Result<(), EnvironmentError> {
        Err(EnvironmentError::Unsupported("go_back".into()))
    }

    /// Readable content of the current location.
    async fn read_content(&mut self) -> std::result::Result<String, EnvironmentError> {
        Err(EnvironmentError::Unsupported("read_content".into()))
    }

    /// Move the viewport. `amount` is in elements; `None` means one page.
    async fn scroll(
        &mut self,
        direction: ScrollDirection,
        amount: Option<u32>,
    ) -> std::result::Result<(), EnvironmentError> {
        let _ = (direction, amount);
        Err(EnvironmentError::Unsupported("scroll".into()))
    }

    async fn list_contexts(&mut self) -> std::result::Result<Vec<ContextInfo>, EnvironmentError> {
        Ok(Vec::new())
    }

    async fn open_context(&mut self, location: &str) -> std::result::Result<u32, EnvironmentError> {
        let _ = location;
        Err(EnvironmentError::Unsupported("open_context".into()))
    }

    async fn switch_context(&mut self, id: u32) -> std::result::Result<(), EnvironmentError> {
        Err(EnvironmentError::ContextNotFound(id))
    }

    async fn close_context(&mut self, id: u32) -> std::result::Result<(), EnvironmentError> {
        Err(EnvironmentError::ContextNotFound(id))
    }
}
