//! Shared test doubles for agent tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use wayfarer_core::environment::*;
use wayfarer_core::error::{EnvironmentError, ProviderError};
use wayfarer_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};

use crate::consolidator::SUMMARY_INSTRUCTION;

/// A provider that answers decision requests from a script and summary
/// requests with a fixed text.
///
/// Once the script runs out, the fallback response is repeated; without a
/// fallback it panics.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: Option<String>,
    summary: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            summary: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// Script the answers to summary requests; the default is "Summary".
    pub fn with_summaries(self, summaries: Vec<Result<String, ProviderError>>) -> Self {
        *self.summary.lock().unwrap() = summaries.into();
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn decision_calls(&self) -> usize {
        self.requests().iter().filter(|r| !is_summary_request(r)).count()
    }

    pub fn summary_calls(&self) -> usize {
        self.requests().iter().filter(|r| is_summary_request(r)).count()
    }
}

fn is_summary_request(request: &ProviderRequest) -> bool {
    request
        .entries
        .first()
        .is_some_and(|e| e.content.starts_with(SUMMARY_INSTRUCTION))
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let summary = is_summary_request(&request);
        self.requests.lock().unwrap().push(request);

        let next = if summary {
            self.summary
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("Summary".into()))
        } else {
            match self.script.lock().unwrap().pop_front() {
                Some(next) => next,
                None => Ok(self
                    .fallback
                    .clone()
                    .expect("ScriptedProvider: script exhausted and no fallback")),
            }
        };
        next.map(text_response)
    }
}

pub fn text_response(text: String) -> ProviderResponse {
    ProviderResponse {
        content: text,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// A decision in the nested `current_state` format.
pub fn decision(actions: serde_json::Value) -> String {
    serde_json::json!({
        "current_state": {
            "evaluation_previous_goal": "Unknown",
            "memory": "",
            "next_goal": "continue",
        },
        "action": actions,
    })
    .to_string()
}

pub fn done(text: &str) -> String {
    decision(serde_json::json!([{"done": {"text": text, "success": true}}]))
}

/// An in-memory environment with a fixed element list.
pub struct MockEnvironment {
    pub location: String,
    pub title: String,
    pub elements: Vec<AddressableElement>,
    pub visual: Option<VisualReference>,
    pub clicks: Vec<ElementIndex>,
    pub captures: usize,
    /// Element lists taken one per capture before falling back to `elements`
    element_script: VecDeque<Vec<AddressableElement>>,
    capture_delay: Option<Duration>,
    failing: bool,
}

impl MockEnvironment {
    pub fn new(location: &str) -> Self {
        Self {
            location: location.into(),
            title: "Mock".into(),
            elements: Vec::new(),
            visual: None,
            clicks: Vec::new(),
            captures: 0,
            element_script: VecDeque::new(),
            capture_delay: None,
            failing: false,
        }
    }

    pub fn with_elements(mut self, elements: Vec<AddressableElement>) -> Self {
        self.elements = elements;
        self
    }

    /// Serve `pages` to successive captures, one element list each.
    pub fn with_element_script(mut self, pages: Vec<Vec<AddressableElement>>) -> Self {
        self.element_script = pages.into();
        self
    }

    pub fn set_elements(&mut self, elements: Vec<AddressableElement>) {
        self.elements = elements;
    }

    pub fn set_capture_delay(&mut self, delay: Duration) {
        self.capture_delay = Some(delay);
    }

    pub fn fail_captures(&mut self) {
        self.failing = true;
    }
}

#[async_trait]
impl Environment for MockEnvironment {
    fn name(&self) -> &str {
        "mock"
    }

    async fn capture(&mut self, _options: &CaptureOptions) -> Result<EnvironmentSnapshot, EnvironmentError> {
        if let Some(delay) = self.capture_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(EnvironmentError::Interaction("renderer crashed".into()));
        }
        self.captures += 1;
        if let Some(next) = self.element_script.pop_front() {
            self.elements = next;
        }
        let mut snapshot = EnvironmentSnapshot::new(&self.location, &self.title).with_elements(self.elements.clone());
        snapshot.visual = self.visual.clone();
        Ok(snapshot)
    }

    async fn current_selector_map(&mut self) -> Result<SelectorMap, EnvironmentError> {
        Ok(self.elements.iter().map(|e| (e.index, e.clone())).collect())
    }

    async fn current_location(&mut self) -> Result<String, EnvironmentError> {
        Ok(self.location.clone())
    }

    async fn navigate(&mut self, location: &str) -> Result<(), EnvironmentError> {
        self.location = location.into();
        Ok(())
    }

    async fn click(&mut self, index: ElementIndex) -> Result<InteractionEffect, EnvironmentError> {
        self.clicks.push(index);
        Ok(InteractionEffect::None)
    }

    /// Typed text shows up as the element's `value` in later captures.
    async fn type_text(&mut self, index: ElementIndex, text: &str) -> Result<(), EnvironmentError> {
        if let Some(element) = self.elements.iter_mut().find(|e| e.index == index) {
            element.attributes.insert("value".into(), text.into());
        }
        Ok(())
    }
}
