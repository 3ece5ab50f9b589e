//! End-to-end integration tests for the Wayfarer agent.
//!
//! These tests drive the full loop: a scripted model, the built-in action
//! catalog, the HTTP environment over an in-memory site, memory
//! consolidation, and the JSONL run log with its replay.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use wayfarer_actions::default_registry;
use wayfarer_agent::{AgentLoop, RunControl};
use wayfarer_browser::{FetchedPage, Fetcher, HttpEnvironment, PageRequest};
use wayfarer_core::conversation::EntryKind;
use wayfarer_core::environment::Environment;
use wayfarer_core::error::{EnvironmentError, ErrorKind, ProviderError};
use wayfarer_core::memory::{MemoryStore, StepRange};
use wayfarer_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use wayfarer_core::run::{AgentSettings, RunStatus};
use wayfarer_core::task::Task;
use wayfarer_memory::InMemoryStore;
use wayfarer_telemetry::{InMemoryRunLog, JsonlRunLog, RunLogRecord, read_run_log, render_replay};

// ── Scripted model ───────────────────────────────────────────────────────

/// Answers decision requests from a script, then repeats a fallback.
/// Summary requests always get a short fixed summary.
struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: String,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedModel {
    fn new(script: Vec<String>, fallback: String) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(Ok).collect()),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn decision_calls(&self) -> usize {
        self.requests().iter().filter(|r| !is_summary(r)).count()
    }
}

fn is_summary(request: &ProviderRequest) -> bool {
    request
        .entries
        .first()
        .is_some_and(|e| e.content.starts_with(wayfarer_agent::consolidator::SUMMARY_INSTRUCTION))
}

#[async_trait]
impl Provider for ScriptedModel {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let summary = is_summary(&request);
        self.requests.lock().unwrap().push(request);
        let content = if summary {
            "Browsed the shop.".to_string()
        } else {
            match self.script.lock().unwrap().pop_front() {
                Some(next) => next?,
                None => self.fallback.clone(),
            }
        };
        Ok(ProviderResponse {
            content,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock-model".into(),
        })
    }
}

fn decision(actions: serde_json::Value) -> String {
    json!({
        "current_state": {
            "evaluation_previous_goal": "Success - on track",
            "memory": "",
            "next_goal": "keep going",
        },
        "action": actions,
    })
    .to_string()
}

fn done(text: &str) -> String {
    decision(json!([{"done": {"text": text, "success": true}}]))
}

// ── In-memory site ───────────────────────────────────────────────────────

struct Site {
    pages: HashMap<String, String>,
    posts: Mutex<Vec<PageRequest>>,
}

impl Site {
    fn shop() -> Arc<Self> {
        let pages = [
            (
                "https://shop.test/",
                r#"<html><head><title>Tea Shop</title></head><body>
                   <a href="/tea">Green tea</a>
                   <a href="/login">Log in</a>
                   </body></html>"#,
            ),
            (
                "https://shop.test/tea",
                r#"<html><head><title>Green tea</title></head><body>
                   <h1>Green tea</h1><p>Price: $5.00</p>
                   <a href="/">Home</a>
                   </body></html>"#,
            ),
            (
                "https://shop.test/login",
                r#"<html><head><title>Log in</title></head><body>
                   <form action="/session" method="post">
                     <input name="user">
                     <input type="password" name="password">
                     <button type="submit">Sign in</button>
                   </form></body></html>"#,
            ),
            (
                "https://shop.test/session",
                r#"<html><head><title>Welcome</title></head><body><p>Signed in</p></body></html>"#,
            ),
        ];
        Arc::new(Self {
            pages: pages.iter().map(|(u, h)| (u.to_string(), h.to_string())).collect(),
            posts: Mutex::new(Vec::new()),
        })
    }

    fn posts(&self) -> Vec<PageRequest> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for Site {
    async fn fetch(&self, request: &PageRequest) -> Result<FetchedPage, EnvironmentError> {
        if matches!(request, PageRequest::Post { .. }) {
            self.posts.lock().unwrap().push(request.clone());
        }
        let url = request.url();
        let (status, body) = match self.pages.get(url) {
            Some(body) => (200, body.clone()),
            None => (404, "<title>Not Found</title>".to_string()),
        };
        Ok(FetchedPage {
            url: url.to_string(),
            status,
            content_type: "text/html".into(),
            body,
        })
    }
}

async fn shop_env(site: &Arc<Site>) -> HttpEnvironment {
    let mut env = HttpEnvironment::new(site.clone(), 50);
    env.navigate("https://shop.test/").await.unwrap();
    env
}

fn settings() -> AgentSettings {
    AgentSettings {
        model: "mock-model".into(),
        use_vision: false,
        enable_memory: false,
        decision_backoff_ms: 1,
        ..AgentSettings::default()
    }
}

fn agent(task: Task, model: Arc<ScriptedModel>, settings: AgentSettings) -> AgentLoop {
    AgentLoop::new(task, settings, model, Arc::new(default_registry()))
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn finds_a_price_and_finishes() {
    let site = Site::shop();
    let mut env = shop_env(&site).await;
    let model = Arc::new(ScriptedModel::new(
        vec![
            decision(json!([{"click_element": {"index": 0}}])),
            decision(json!([{"extract_content": {"goal": "price"}}])),
            done("Green tea costs $5.00"),
        ],
        done("unreachable"),
    ));
    let mut agent = agent(Task::new("Find the price of green tea"), model.clone(), settings());

    let result = agent.run(&mut env, 5).await;

    assert_eq!(result.status, RunStatus::Done);
    assert!(result.history.len() <= 5);
    assert_eq!(result.final_text.as_deref(), Some("Green tea costs $5.00"));
    assert_eq!(result.history[1].snapshot.location, "https://shop.test/tea");

    // The extracted text reached the model before it declared done.
    let last = model.requests().pop().unwrap();
    assert!(last.entries.iter().any(|e| e.content.contains("Price: $5.00")));
}

#[tokio::test]
async fn stale_indices_abort_after_max_failures() {
    let site = Site::shop();
    let mut env = shop_env(&site).await;
    let model = Arc::new(ScriptedModel::new(
        vec![],
        decision(json!([{"click_element": {"index": 99}}])),
    ));
    let mut agent = agent(Task::new("Click the missing button"), model, settings());

    let result = agent.run(&mut env, 50).await;

    assert_eq!(result.status, RunStatus::AbortedByFailures);
    assert_eq!(result.steps, 3);
    assert!(
        result
            .history
            .iter()
            .all(|r| r.outcomes[0].error_kind() == Some(ErrorKind::StaleReference))
    );
}

#[tokio::test]
async fn three_unparsable_replies_are_one_step_failure() {
    let site = Site::shop();
    let mut env = shop_env(&site).await;
    let model = Arc::new(ScriptedModel::new(
        vec!["Sure! I will click.".into(), "```json\n{broken".into(), "no idea".into()],
        done("done anyway"),
    ));
    let mut agent = agent(Task::new("Do something"), model.clone(), settings());

    let result = agent.run(&mut env, 10).await;

    assert_eq!(result.status, RunStatus::Done);
    assert_eq!(result.steps, 2);
    assert_eq!(
        result.history[0].outcomes[0].error_kind(),
        Some(ErrorKind::DecisionParseFailure)
    );
    assert!(result.history[1].outcomes[0].is_done);
    assert_eq!(model.decision_calls(), 4);
    let retried = &model.requests()[1];
    assert!(retried.entries.iter().any(|e| e.kind == EntryKind::Correction));
}

#[tokio::test]
async fn twenty_five_steps_yield_two_memory_records() {
    let site = Site::shop();
    let mut env = shop_env(&site).await;
    let model = Arc::new(ScriptedModel::new(
        vec![],
        decision(json!([{"scroll_down": {}}])),
    ));
    let store = Arc::new(InMemoryStore::new());
    let settings = AgentSettings {
        enable_memory: true,
        memory_interval: 10,
        ..settings()
    };
    let mut agent = agent(Task::new("Browse forever"), model, settings).with_memory(store.clone());

    let result = agent.run(&mut env, 25).await;

    assert_eq!(result.status, RunStatus::ExhaustedBySteps);
    assert_eq!(result.steps, 25);
    let ranges: Vec<StepRange> = store.all().await.unwrap().iter().map(|r| r.range).collect();
    assert_eq!(ranges, vec![StepRange::new(0, 9), StepRange::new(10, 19)]);
    assert_eq!(result.memory_records.len(), 2);
}

#[tokio::test]
async fn secrets_are_typed_but_never_shown() {
    let site = Site::shop();
    let mut env = shop_env(&site).await;
    let model = Arc::new(ScriptedModel::new(
        vec![
            decision(json!([{"click_element": {"index": 1}}])),
            decision(json!([
                {"input_text": {"index": 0, "text": "alice"}},
                {"input_text": {"index": 1, "text": "<secret>password</secret>"}},
                {"click_element": {"index": 2}}
            ])),
            done("Signed in"),
        ],
        done("unreachable"),
    ));
    let run_log = Arc::new(InMemoryRunLog::new());
    let task = Task::new("Log in as alice").with_secret("password", "hunter2");
    let mut agent = agent(task, model.clone(), settings()).with_run_log(run_log.clone());

    let result = agent.run(&mut env, 10).await;

    assert_eq!(result.status, RunStatus::Done);
    let posts = site.posts();
    assert_eq!(posts.len(), 1);
    let PageRequest::Post { form, .. } = &posts[0] else {
        panic!("expected a form post");
    };
    assert!(form.contains(&("password".to_string(), "hunter2".to_string())));

    for request in model.requests() {
        assert!(request.entries.iter().all(|e| !e.content.contains("hunter2")));
    }
    let logged = serde_json::to_string(&result.history).unwrap();
    assert!(!logged.contains("hunter2"));
    for record in run_log.records() {
        assert!(!serde_json::to_string(&record).unwrap().contains("hunter2"));
    }
}

#[tokio::test]
async fn secrets_typed_in_one_step_stay_hidden_in_the_next() {
    let site = Site::shop();
    let mut env = shop_env(&site).await;
    let model = Arc::new(ScriptedModel::new(
        vec![
            decision(json!([{"click_element": {"index": 1}}])),
            decision(json!([{"input_text": {"index": 0, "text": "<secret>user</secret>"}}])),
            decision(json!([{"input_text": {"index": 1, "text": "<secret>password</secret>"}}])),
            decision(json!([{"click_element": {"index": 2}}])),
            done("Signed in"),
        ],
        done("unreachable"),
    ));
    let task = Task::new("Sign in to the shop")
        .with_secret("user", "alice-w")
        .with_secret("password", "hunter2");
    let mut agent = agent(task, model.clone(), settings());

    let result = agent.run(&mut env, 10).await;

    assert_eq!(result.status, RunStatus::Done);
    let PageRequest::Post { form, .. } = &site.posts()[0] else {
        panic!("expected a form post");
    };
    assert!(form.contains(&("user".to_string(), "alice-w".to_string())));
    assert!(form.contains(&("password".to_string(), "hunter2".to_string())));

    let leaked: Vec<String> = model
        .requests()
        .iter()
        .flat_map(|r| r.entries.iter())
        .filter(|e| e.content.contains("hunter2") || e.content.contains("alice-w"))
        .map(|e| e.content.clone())
        .collect();
    assert!(leaked.is_empty(), "secret shown to model: {leaked:?}");

    // The typed username is visible to the model only as its placeholder.
    let fourth = &model.requests()[3];
    assert!(
        fourth
            .entries
            .iter()
            .any(|e| e.kind == EntryKind::State && e.content.contains(r#"value="<secret>user</secret>""#))
    );
}

#[tokio::test]
async fn navigation_outside_allowed_domains_is_refused() {
    let site = Site::shop();
    let mut env = shop_env(&site).await;
    let model = Arc::new(ScriptedModel::new(
        vec![decision(json!([{"go_to_url": {"url": "https://evil.test/"}}]))],
        done("gave up"),
    ));
    let task = Task::new("Stay on the shop").with_allowed_domains(vec!["shop.test".into()]);
    let mut agent = agent(task, model, settings());

    let result = agent.run(&mut env, 10).await;

    assert_eq!(
        result.history[0].outcomes[0].error_kind(),
        Some(ErrorKind::ScopeViolation)
    );
    assert_eq!(result.history[1].snapshot.location, "https://shop.test/");
    assert_eq!(result.status, RunStatus::Done);
}

#[tokio::test]
async fn run_log_file_replays_without_the_agent() {
    let site = Site::shop();
    let mut env = shop_env(&site).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run_shop.jsonl");
    let model = Arc::new(ScriptedModel::new(
        vec![
            decision(json!([{"click_element": {"index": 0}}])),
            decision(json!([{"click_element": {"index": 42}}])),
            done("$5.00"),
        ],
        done("unreachable"),
    ));
    let mut agent = agent(Task::new("Find the price").with_name("shop"), model, settings())
        .with_run_log(Arc::new(JsonlRunLog::create(&path).unwrap()));

    let result = agent.run(&mut env, 10).await;
    assert_eq!(result.status, RunStatus::Done);

    let replayed = read_run_log(&path).unwrap();
    assert_eq!(replayed.status(), Some(RunStatus::Done));
    assert_eq!(replayed.steps().count(), 3);
    let text = render_replay(&replayed);
    assert!(text.contains("Task: Find the price"));
    assert!(text.contains("stale_reference"));
    assert!(text.contains("Status: done"));
}

#[tokio::test]
async fn stopped_batch_leaves_a_terminal_log() {
    let site = Site::shop();
    let mut env = shop_env(&site).await;
    let model = Arc::new(ScriptedModel::new(vec![], done("never")));
    let control = RunControl::new();
    control.stop();
    let run_log = Arc::new(InMemoryRunLog::new());
    let mut agent = agent(Task::new("Anything"), model.clone(), settings())
        .with_control(control)
        .with_run_log(run_log.clone());

    let result = agent.run(&mut env, 10).await;

    assert_eq!(result.status, RunStatus::Stopped);
    assert_eq!(model.decision_calls(), 0);
    assert!(matches!(
        run_log.records().last(),
        Some(RunLogRecord::Finished {
            status: RunStatus::Stopped,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn rate_limited_model_is_a_step_failure() {
    let site = Site::shop();
    let mut env = shop_env(&site).await;
    let model = Arc::new(ScriptedModel {
        script: Mutex::new(VecDeque::from([Err(ProviderError::RateLimited { retry_after_secs: 1 })])),
        fallback: done("ok"),
        requests: Mutex::new(Vec::new()),
    });
    let mut agent = agent(Task::new("Be patient"), model, settings());

    let result = agent.run(&mut env, 10).await;

    assert_eq!(result.status, RunStatus::Done);
    assert_eq!(result.history[0].outcomes[0].error_kind(), Some(ErrorKind::RateLimited));
}
