//! `wayfarer run`: run a batch of tasks, or one ad-hoc task.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use wayfarer_actions::default_registry;
use wayfarer_agent::{AgentLoop, RunControl};
use wayfarer_browser::HttpEnvironment;
use wayfarer_config::AppConfig;
use wayfarer_core::environment::Environment;
use wayfarer_core::memory::MemoryStore;
use wayfarer_core::run::{RunResult, RunStatus};
use wayfarer_core::task::Task;
use wayfarer_security::AuditLogger;
use wayfarer_telemetry::{JsonlRunLog, NullRunLog, RunLogSink, run_log_path};

/// One line of a tasks file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLine {
    pub name: String,
    pub instruction: String,
}

/// Parse a tasks file: one `name: instruction` per non-empty line.
/// Lines starting with `#` are comments.
pub fn parse_tasks(content: &str) -> Result<Vec<TaskLine>, String> {
    let mut tasks = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, instruction)) = line.split_once(':') else {
            return Err(format!(
                "line {}: expected `name: instruction`, got `{line}`",
                number + 1
            ));
        };
        let (name, instruction) = (name.trim(), instruction.trim());
        if name.is_empty() || instruction.is_empty() {
            return Err(format!("line {}: task name and instruction must not be empty", number + 1));
        }
        tasks.push(TaskLine {
            name: name.into(),
            instruction: instruction.into(),
        });
    }
    Ok(tasks)
}

pub async fn run(
    config_path: Option<&Path>,
    task: Option<String>,
    tasks_file: Option<PathBuf>,
    max_steps: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    config.check_credentials()?;

    let tasks = match task {
        Some(instruction) => vec![TaskLine {
            name: "adhoc".into(),
            instruction,
        }],
        None => {
            let path = tasks_file
                .or_else(|| config.tasks_file.clone())
                .ok_or("No tasks: pass --task or --tasks-file, or set tasks_file in the config")?;
            let content = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read tasks file {}: {e}", path.display()))?;
            parse_tasks(&content)?
        }
    };
    if tasks.is_empty() {
        return Err("The tasks file has no tasks".into());
    }

    let mut settings = config.agent_settings();
    if let Some(max_steps) = max_steps {
        settings.max_steps = max_steps;
    }

    let router = wayfarer_providers::router::build_from_config(&config);
    let provider = router.default().ok_or("No default provider configured")?;

    let registry = Arc::new(
        default_registry()
            .with_action_timeout(Duration::from_secs(settings.action_timeout_secs))
            .with_audit(Arc::new(AuditLogger::tracing())),
    );

    let mut env = HttpEnvironment::from_config(&config.browser)?;
    if config.browser.start_url != "about:blank"
        && let Err(e) = env.navigate(&config.browser.start_url).await
    {
        warn!(url = %config.browser.start_url, error = %e, "Could not open the start page");
    }

    std::fs::create_dir_all(&config.log_dir)
        .map_err(|e| format!("Failed to create log dir {}: {e}", config.log_dir.display()))?;

    let control = RunControl::new();
    spawn_interrupt_handler(control.clone());

    println!("🧭 Wayfarer");
    println!("   Provider: {}", config.default_provider);
    println!("   Model:    {}", settings.model);
    println!("   Tasks:    {}", tasks.len());
    println!();

    let total = tasks.len();
    let mut summary = Vec::with_capacity(total);
    for (i, line) in tasks.into_iter().enumerate() {
        if control.is_stopped() {
            println!("⏹️  Stopped before task {}", line.name);
            break;
        }
        println!("[{}/{}] Running task: {}", i + 1, total, line.name);

        let task = Task::new(line.instruction)
            .with_name(line.name.clone())
            .with_sensitive_data(config.sensitive_data.clone().into_iter().collect())
            .with_allowed_domains(config.browser.allowed_domains.clone());

        let log_path = run_log_path(&config.log_dir, &task.name, &task.id, Utc::now());
        let run_log: Arc<dyn RunLogSink> = match JsonlRunLog::create(&log_path) {
            Ok(log) => Arc::new(log),
            Err(e) => {
                warn!(path = %log_path.display(), error = %e, "Run log unavailable, continuing without it");
                Arc::new(NullRunLog)
            }
        };

        let mut agent = AgentLoop::new(task, settings.clone(), provider.clone(), registry.clone())
            .with_run_log(run_log)
            .with_control(control.clone());
        if settings.enable_memory {
            agent = agent.with_memory(memory_store(&config, &log_path));
        }

        let result = agent.run(&mut env, settings.max_steps).await;
        report(&result, &log_path);
        summary.push((line.name, result.status));
    }

    println!();
    println!("📋 Summary");
    for (name, status) in &summary {
        println!("   {} {name}: {status}", status_marker(*status));
    }
    Ok(())
}

/// The memory store for one run. The file backend keeps one file per run so
/// step ranges of different tasks never collide.
fn memory_store(config: &AppConfig, log_path: &Path) -> Arc<dyn MemoryStore> {
    let path = match config.memory.backend.as_str() {
        "file" => {
            let file_name = log_path.with_extension("memory.jsonl");
            let file_name = file_name.file_name().map(PathBuf::from).unwrap_or_default();
            let dir = config.memory.path.clone().unwrap_or_else(|| config.log_dir.clone());
            Some(dir.join(file_name))
        }
        _ => None,
    };
    wayfarer_memory::build_store(&config.memory.backend, path)
}

/// First Ctrl-C stops the batch at the next step boundary; the second exits.
fn spawn_interrupt_handler(control: RunControl) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⏹️  Stopping after the current step (Ctrl-C again to exit now)");
            control.stop();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

fn report(result: &RunResult, log_path: &Path) {
    println!("   {} {} after {} steps", status_marker(result.status), result.status, result.steps);
    if let Some(text) = &result.final_text {
        println!("   📄 {text}");
    }
    if let Some(error) = &result.fatal_error {
        println!("   ❌ {error}");
    }
    if !result.memory_records.is_empty() {
        println!("   🧠 {} memory records", result.memory_records.len());
    }
    println!("   📝 {}", log_path.display());
    info!(task_id = %result.task_id, status = %result.status, steps = result.steps, "Task finished");
}

fn status_marker(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Done => "✅",
        RunStatus::Stopped | RunStatus::Paused => "⏹️",
        _ => "❌",
    }
}
