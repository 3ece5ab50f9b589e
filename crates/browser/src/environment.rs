//! HTTP-backed implementation of the [`Environment`] trait.
//!
//! Pages are fetched and parsed, never rendered: links navigate, forms
//! submit with whatever was typed into them, and checkboxes toggle in
//! local state. Each tab keeps its own back stack.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;
use wayfarer_config::BrowserConfig;
use wayfarer_core::environment::*;
use wayfarer_core::error::EnvironmentError;

use crate::dom::{ElementKind, FormMethod, ParsedPage};
use crate::fetch::{Fetcher, PageRequest, ReqwestFetcher};

/// Nominal element height used to turn a pixel margin into rows.
const ROW_HEIGHT_PX: i64 = 40;

/// Shown instead of whatever was typed into a password field.
const MASKED_VALUE: &str = "********";

struct Tab {
    id: u32,
    page: ParsedPage,
    back: Vec<ParsedPage>,
    /// Typed text, keyed by element position
    values: HashMap<usize, String>,
    checked: HashMap<usize, bool>,
    /// First element position inside the viewport
    offset: usize,
}

impl Tab {
    fn new(id: u32, page: ParsedPage) -> Self {
        Self {
            id,
            page,
            back: Vec::new(),
            values: HashMap::new(),
            checked: HashMap::new(),
            offset: 0,
        }
    }

    fn show(&mut self, page: ParsedPage) {
        let previous = std::mem::replace(&mut self.page, page);
        self.back.push(previous);
        self.values.clear();
        self.checked.clear();
        self.offset = 0;
    }

    fn is_checked(&self, position: usize) -> bool {
        self.checked.get(&position).copied().unwrap_or_else(|| {
            self.page
                .forms
                .iter()
                .flat_map(|f| &f.fields)
                .any(|f| f.element == Some(position) && f.checked_by_default)
        })
    }

    fn info(&self, active: bool) -> ContextInfo {
        ContextInfo {
            id: self.id,
            location: self.page.url.clone(),
            title: self.page.title.clone(),
            active,
        }
    }
}

/// An [`Environment`] that drives websites over plain HTTP.
pub struct HttpEnvironment {
    fetcher: Arc<dyn Fetcher>,
    tabs: Vec<Tab>,
    active: u32,
    next_id: u32,
    viewport_elements: usize,
}

impl HttpEnvironment {
    /// Start with a single blank tab.
    pub fn new(fetcher: Arc<dyn Fetcher>, viewport_elements: usize) -> Self {
        Self {
            fetcher,
            tabs: vec![Tab::new(1, ParsedPage::blank())],
            active: 1,
            next_id: 2,
            viewport_elements: viewport_elements.max(1),
        }
    }

    pub fn from_config(config: &BrowserConfig) -> Result<Self, EnvironmentError> {
        let fetcher = ReqwestFetcher::new(&config.user_agent, config.request_timeout_secs)?;
        Ok(Self::new(Arc::new(fetcher), config.viewport_elements))
    }

    fn tab(&self) -> Result<&Tab, EnvironmentError> {
        self.tabs
            .iter()
            .find(|t| t.id == self.active)
            .ok_or_else(|| EnvironmentError::Unreachable("no active tab".into()))
    }

    fn tab_mut(&mut self) -> Result<&mut Tab, EnvironmentError> {
        let active = self.active;
        self.tabs
            .iter_mut()
            .find(|t| t.id == active)
            .ok_or_else(|| EnvironmentError::Unreachable("no active tab".into()))
    }

    async fn load(&self, request: PageRequest) -> Result<ParsedPage, EnvironmentError> {
        if request.url() == "about:blank" {
            return Ok(ParsedPage::blank());
        }
        let fetched = self.fetcher.fetch(&request).await?;
        if fetched.status >= 400 {
            warn!(url = %fetched.url, status = fetched.status, "Page returned error status");
        }
        Ok(if fetched.is_html() {
            ParsedPage::parse(&fetched.url, &fetched.body)
        } else {
            ParsedPage::plain(&fetched.url, &fetched.body)
        })
    }

    fn element_kind(&self, index: ElementIndex) -> Result<ElementKind, EnvironmentError> {
        self.tab()?
            .page
            .elements
            .get(index.0 as usize)
            .map(|e| e.kind.clone())
            .ok_or(EnvironmentError::ElementNotFound(index))
    }

    /// Build the request a form submission makes.
    fn submission(
        &self,
        form: usize,
        submitter: Option<(String, String)>,
    ) -> Result<PageRequest, EnvironmentError> {
        let tab = self.tab()?;
        let Some(form) = tab.page.forms.get(form) else {
            return Err(EnvironmentError::Interaction("form no longer exists".into()));
        };

        let mut pairs = Vec::new();
        for field in &form.fields {
            let value = match field.element {
                Some(position) if field.toggle => {
                    if !tab.is_checked(position) {
                        continue;
                    }
                    field.default.clone()
                }
                Some(position) => tab.values.get(&position).cloned().or_else(|| field.default.clone()),
                None => field.default.clone(),
            };
            pairs.push((field.name.clone(), value.unwrap_or_default()));
        }
        pairs.extend(submitter);

        Ok(match form.method {
            FormMethod::Post => PageRequest::Post {
                url: form.action.clone(),
                form: pairs,
            },
            FormMethod::Get => {
                let mut url = Url::parse(&form.action).map_err(|e| EnvironmentError::Navigation {
                    url: form.action.clone(),
                    reason: e.to_string(),
                })?;
                url.query_pairs_mut().clear().extend_pairs(&pairs);
                PageRequest::Get { url: url.into() }
            }
        })
    }

    fn toggle(&mut self, position: usize, radio_group: Option<String>) -> Result<(), EnvironmentError> {
        let tab = self.tab_mut()?;
        match radio_group {
            Some(group) => {
                let siblings: Vec<usize> = tab
                    .page
                    .elements
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| {
                        matches!(&e.kind, ElementKind::Toggle { radio_group: Some(g), .. } if *g == group)
                    })
                    .map(|(i, _)| i)
                    .collect();
                for sibling in siblings {
                    tab.checked.insert(sibling, sibling == position);
                }
            }
            None => {
                let now = !tab.is_checked(position);
                tab.checked.insert(position, now);
            }
        }
        Ok(())
    }

    async fn follow(&mut self, request: PageRequest) -> Result<InteractionEffect, EnvironmentError> {
        let page = self.load(request).await?;
        let location = page.url.clone();
        self.tab_mut()?.show(page);
        info!(location = %location, "Navigated");
        Ok(InteractionEffect::Navigated { location })
    }
}

#[async_trait]
impl Environment for HttpEnvironment {
    fn name(&self) -> &str {
        "http"
    }

    async fn capture(&mut self, options: &CaptureOptions) -> Result<EnvironmentSnapshot, EnvironmentError> {
        let contexts = self.list_contexts().await?;
        let viewport = self.viewport_elements;
        let tab = self.tab()?;
        let total = tab.page.elements.len();

        let (start, end) = if options.viewport_expansion < 0 {
            (0, total)
        } else {
            let margin = (options.viewport_expansion / ROW_HEIGHT_PX) as usize;
            (
                tab.offset.saturating_sub(margin),
                (tab.offset + viewport + margin).min(total),
            )
        };

        let elements = tab
            .page
            .elements
            .iter()
            .enumerate()
            .skip(start)
            .take(end.saturating_sub(start))
            .map(|(position, element)| {
                let mut attributes = element.attributes.clone();
                if options.include_dynamic_attributes {
                    if let Some(value) = tab.values.get(&position) {
                        let shown = if element.is_password() { MASKED_VALUE } else { value.as_str() };
                        attributes.insert("value".into(), shown.to_string());
                    }
                    if matches!(element.kind, ElementKind::Toggle { .. }) && tab.is_checked(position) {
                        attributes.insert("checked".into(), "true".into());
                    }
                }
                AddressableElement {
                    index: ElementIndex(position as u32),
                    tag: element.tag.clone(),
                    role: element.role.clone(),
                    text: element.text.clone(),
                    attributes,
                    structural_hash: element.structural_hash.clone(),
                    is_new: false,
                    in_viewport: position >= tab.offset && position < tab.offset + viewport,
                }
            })
            .collect();

        if options.use_visual_reference {
            debug!("HTTP environment has no visual reference");
        }

        let mut snapshot = EnvironmentSnapshot::new(&tab.page.url, &tab.page.title).with_elements(elements);
        snapshot.contexts = contexts;
        snapshot.elements_above = start;
        snapshot.elements_below = total.saturating_sub(end);
        Ok(snapshot)
    }

    async fn current_selector_map(&mut self) -> Result<SelectorMap, EnvironmentError> {
        let tab = self.tab()?;
        Ok(tab
            .page
            .elements
            .iter()
            .enumerate()
            .map(|(position, e)| {
                let index = ElementIndex(position as u32);
                let element = AddressableElement::new(index.0, &e.tag, &e.text).with_hash(&e.structural_hash);
                (index, element)
            })
            .collect())
    }

    async fn current_location(&mut self) -> Result<String, EnvironmentError> {
        Ok(self.tab()?.page.url.clone())
    }

    async fn navigate(&mut self, location: &str) -> Result<(), EnvironmentError> {
        self.follow(PageRequest::Get {
            url: location.to_string(),
        })
        .await
        .map(|_| ())
    }

    async fn click(&mut self, index: ElementIndex) -> Result<InteractionEffect, EnvironmentError> {
        match self.element_kind(index)? {
            ElementKind::Link { href, new_tab: true } => {
                let id = self.open_context(&href).await?;
                Ok(InteractionEffect::OpenedContext { id })
            }
            ElementKind::Link { href, .. } => self.follow(PageRequest::Get { url: href }).await,
            ElementKind::Submit {
                form: Some(form),
                name,
                value,
            } => {
                let submitter = name.map(|n| (n, value.unwrap_or_default()));
                let request = self.submission(form, submitter)?;
                debug!(url = %request.url(), "Submitting form");
                self.follow(request).await
            }
            ElementKind::Toggle { radio_group, .. } => {
                self.toggle(index.0 as usize, radio_group)?;
                Ok(InteractionEffect::None)
            }
            ElementKind::Submit { form: None, .. } | ElementKind::TextField { .. } | ElementKind::Other => {
                Ok(InteractionEffect::None)
            }
        }
    }

    async fn type_text(&mut self, index: ElementIndex, text: &str) -> Result<(), EnvironmentError> {
        match self.element_kind(index)? {
            ElementKind::TextField { .. } => {
                self.tab_mut()?.values.insert(index.0 as usize, text.to_string());
                Ok(())
            }
            _ => Err(EnvironmentError::Interaction(format!(
                "element {index} does not accept text"
            ))),
        }
    }

    async fn go_back(&mut self) -> Result<(), EnvironmentError> {
        let tab = self.tab_mut()?;
        let Some(previous) = tab.back.pop() else {
            return Err(EnvironmentError::Navigation {
                url: tab.page.url.clone(),
                reason: "no previous page in this tab".into(),
            });
        };
        tab.page = previous;
        tab.values.clear();
        tab.checked.clear();
        tab.offset = 0;
        Ok(())
    }

    async fn read_content(&mut self) -> Result<String, EnvironmentError> {
        let page = &self.tab()?.page;
        Ok(if page.title.is_empty() {
            page.text.clone()
        } else {
            format!("{}\n\n{}", page.title, page.text)
        })
    }

    async fn scroll(&mut self, direction: ScrollDirection, amount: Option<u32>) -> Result<(), EnvironmentError> {
        let step = amount.map(|a| a as usize).unwrap_or(self.viewport_elements);
        let tab = self.tab_mut()?;
        let last = tab.page.elements.len().saturating_sub(1);
        tab.offset = match direction {
            ScrollDirection::Down => (tab.offset + step).min(last),
            ScrollDirection::Up => tab.offset.saturating_sub(step),
        };
        Ok(())
    }

    async fn list_contexts(&mut self) -> Result<Vec<ContextInfo>, EnvironmentError> {
        Ok(self
            .tabs
            .iter()
            .map(|t| t.info(t.id == self.active))
            .collect())
    }

    async fn open_context(&mut self, location: &str) -> Result<u32, EnvironmentError> {
        let page = self
            .load(PageRequest::Get {
                url: location.to_string(),
            })
            .await?;
        let id = self.next_id;
        self.next_id += 1;
        self.tabs.push(Tab::new(id, page));
        self.active = id;
        info!(tab = id, location, "Opened tab");
        Ok(id)
    }

    async fn switch_context(&mut self, id: u32) -> Result<(), EnvironmentError> {
        if !self.tabs.iter().any(|t| t.id == id) {
            return Err(EnvironmentError::ContextNotFound(id));
        }
        self.active = id;
        Ok(())
    }

    async fn close_context(&mut self, id: u32) -> Result<(), EnvironmentError> {
        let Some(position) = self.tabs.iter().position(|t| t.id == id) else {
            return Err(EnvironmentError::ContextNotFound(id));
        };
        if self.tabs.len() == 1 {
            return Err(EnvironmentError::Interaction("cannot close the last tab".into()));
        }
        self.tabs.remove(position);
        if self.active == id
            && let Some(last) = self.tabs.last()
        {
            self.active = last.id;
        }
        Ok(())
    }
}
