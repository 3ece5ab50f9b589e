//! Shared fixtures for action tests.

use std::sync::Arc;

use async_trait::async_trait;
use wayfarer_core::action::{ActionHandler, ActionOutcome, ValidatedParams};
use wayfarer_core::environment::{
    AddressableElement, CaptureOptions, ContextInfo, ElementIndex, Environment,
    EnvironmentSnapshot, InteractionEffect, ScrollDirection, SelectorMap,
};
use wayfarer_core::error::{ActionError, EnvironmentError};

/// A handler backed by a plain closure.
pub(crate) struct FnAction<F>(F);

impl<F> FnAction<F>
where
    F: Fn(&ValidatedParams) -> Result<ActionOutcome, ActionError> + Send + Sync + 'static,
{
    pub(crate) fn arc(f: F) -> Arc<dyn ActionHandler> {
        Arc::new(Self(f))
    }
}

#[async_trait]
impl<F> ActionHandler for FnAction<F>
where
    F: Fn(&ValidatedParams) -> Result<ActionOutcome, ActionError> + Send + Sync + 'static,
{
    async fn invoke(
        &self,
        params: &ValidatedParams,
        _env: &mut dyn Environment,
    ) -> Result<ActionOutcome, ActionError> {
        (self.0)(params)
    }
}

/// An in-memory page that records what was done to it.
pub(crate) struct StaticPage {
    pub location: String,
    indices: Vec<u32>,
    pub visited: Vec<String>,
    pub typed: Vec<(ElementIndex, String)>,
    pub clicked: Vec<ElementIndex>,
    pub scrolls: Vec<(ScrollDirection, Option<u32>)>,
    pub contexts: Vec<ContextInfo>,
    pub click_effect: InteractionEffect,
    pub content: String,
}

impl StaticPage {
    pub(crate) fn new(location: &str) -> Self {
        Self {
            location: location.into(),
            indices: Vec::new(),
            visited: Vec::new(),
            typed: Vec::new(),
            clicked: Vec::new(),
            scrolls: Vec::new(),
            contexts: vec![ContextInfo {
                id: 0,
                location: location.into(),
                title: String::new(),
                active: true,
            }],
            click_effect: InteractionEffect::None,
            content: String::new(),
        }
    }

    pub(crate) fn with_indices(mut self, indices: &[u32]) -> Self {
        self.set_indices(indices);
        self
    }

    pub(crate) fn set_indices(&mut self, indices: &[u32]) {
        self.indices = indices.to_vec();
    }

    fn elements(&self) -> Vec<AddressableElement> {
        self.indices
            .iter()
            .map(|i| AddressableElement::new(*i, "button", format!("Button {i}")))
            .collect()
    }

    fn active_mut(&mut self) -> Option<&mut ContextInfo> {
        self.contexts.iter_mut().find(|c| c.active)
    }
}

#[async_trait]
impl Environment for StaticPage {
    fn name(&self) -> &str {
        "static"
    }

    async fn capture(
        &mut self,
        _options: &CaptureOptions,
    ) -> Result<EnvironmentSnapshot, EnvironmentError> {
        Ok(EnvironmentSnapshot::new(self.location.clone(), "Static").with_elements(self.elements()))
    }

    async fn current_selector_map(&mut self) -> Result<SelectorMap, EnvironmentError> {
        Ok(self.elements().into_iter().map(|e| (e.index, e)).collect())
    }

    async fn current_location(&mut self) -> Result<String, EnvironmentError> {
        Ok(self.location.clone())
    }

    async fn navigate(&mut self, location: &str) -> Result<(), EnvironmentError> {
        self.visited.push(self.location.clone());
        self.location = location.into();
        if let Some(active) = self.active_mut() {
            active.location = location.into();
        }
        Ok(())
    }

    async fn click(&mut self, index: ElementIndex) -> Result<InteractionEffect, EnvironmentError> {
        self.clicked.push(index);
        Ok(self.click_effect.clone())
    }

    async fn type_text(&mut self, index: ElementIndex, text: &str) -> Result<(), EnvironmentError> {
        self.typed.push((index, text.into()));
        Ok(())
    }

    async fn go_back(&mut self) -> Result<(), EnvironmentError> {
        match self.visited.pop() {
            Some(previous) => {
                self.location = previous;
                Ok(())
            }
            None => Err(EnvironmentError::Navigation {
                url: self.location.clone(),
                reason: "no previous page".into(),
            }),
        }
    }

    async fn read_content(&mut self) -> Result<String, EnvironmentError> {
        Ok(self.content.clone())
    }

    async fn scroll(
        &mut self,
        direction: ScrollDirection,
        amount: Option<u32>,
    ) -> Result<(), EnvironmentError> {
        self.scrolls.push((direction, amount));
        Ok(())
    }

    async fn list_contexts(&mut self) -> Result<Vec<ContextInfo>, EnvironmentError> {
        Ok(self.contexts.clone())
    }

    async fn open_context(&mut self, location: &str) -> Result<u32, EnvironmentError> {
        let id = self.contexts.iter().map(|c| c.id + 1).max().unwrap_or(0);
        for context in &mut self.contexts {
            context.active = false;
        }
        self.contexts.push(ContextInfo {
            id,
            location: location.into(),
            title: String::new(),
            active: true,
        });
        self.location = location.into();
        Ok(id)
    }

    async fn switch_context(&mut self, id: u32) -> Result<(), EnvironmentError> {
        if !self.contexts.iter().any(|c| c.id == id) {
            return Err(EnvironmentError::ContextNotFound(id));
        }
        for context in &mut self.contexts {
            context.active = context.id == id;
            if context.active {
                self.location = context.location.clone();
            }
        }
        Ok(())
    }

    async fn close_context(&mut self, id: u32) -> Result<(), EnvironmentError> {
        let before = self.contexts.len();
        self.contexts.retain(|c| c.id != id);
        if self.contexts.len() == before {
            return Err(EnvironmentError::ContextNotFound(id));
        }
        if !self.contexts.iter().any(|c| c.active) {
            if let Some(first) = self.contexts.first_mut() {
                first.active = true;
                self.location = first.location.clone();
            }
        }
        Ok(())
    }
}
