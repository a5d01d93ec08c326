use crate::output::UserOutput;
use stack_agent::compose::ComposeArgs;
use stack_agent::{InitParams, StackOutput, StackStatus, StackSummary, StacksManager};
use std::path::Path;

/// Build initializer parameters from `key=value` pairs.
///
/// Values that look like JSON objects, arrays or booleans are parsed as JSON;
/// everything else stays a string.
pub fn parse_params(pairs: &[String], compose_file: Option<&Path>) -> anyhow::Result<InitParams> {
    let mut params = InitParams::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            anyhow::bail!("Invalid parameter '{}': expected KEY=VALUE", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("Invalid parameter '{}': empty key", pair);
        }
        let looks_like_json = value.starts_with('{')
            || value.starts_with('[')
            || value == "true"
            || value == "false";
        let value = if looks_like_json {
            serde_json::from_str(value)
                .map_err(|e| anyhow::anyhow!("Invalid JSON in parameter '{}': {}", key, e))?
        } else {
            serde_json::Value::String(value.to_string())
        };
        params.insert(key, value);
    }
    if let Some(path) = compose_file {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        params.insert("compose_content", content);
    }
    Ok(params)
}

/// Print a lifecycle result. Containers that failed turn into an error.
pub fn report_output(output: StackOutput, out: &dyn UserOutput) -> anyhow::Result<()> {
    match output {
        StackOutput::Containers(batch) => {
            out.status(&batch.to_string());
            batch.into_result()?;
        }
        StackOutput::Compose(stdout) if stdout.trim().is_empty() => {}
        other => out.status(&other.to_string()),
    }
    Ok(())
}

fn status_icon(status: StackStatus) -> &'static str {
    match status {
        StackStatus::Running => "+",
        StackStatus::Idle => "o",
        StackStatus::Created => ".",
    }
}

pub async fn run_list(
    manager: &mut StacksManager,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let stacks = manager.list().await?;
    if json {
        out.status(&serde_json::to_string_pretty(&stacks)?);
        return Ok(());
    }

    out.status(&format!("Stacks on context '{}':", manager.context_id()));
    out.status(&format!("{:-<60}", ""));
    if stacks.is_empty() {
        out.status("  No stacks");
    }
    for stack in &stacks {
        out.status(&format!(
            "  {} {:<30} {:<9} {:<10} {} container(s)",
            status_icon(stack.status),
            stack.name,
            stack.status,
            if stack.managed { "managed" } else { "unmanaged" },
            stack.containers.len()
        ));
    }
    Ok(())
}

pub async fn run_describe(
    manager: &mut StacksManager,
    name: &str,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let summary = manager.describe(name).await?;
    if json {
        out.status(&serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, out);
    }
    Ok(())
}

fn print_summary(summary: &StackSummary, out: &dyn UserOutput) {
    out.status(&format!("Stack:     {}", summary.name));
    out.status(&format!("Context:   {}", summary.context_id));
    out.status(&format!(
        "Managed:   {}",
        if summary.managed { "yes" } else { "no" }
    ));
    out.status(&format!("Status:    {}", summary.status));
    if let Some(dir) = &summary.project_dir {
        out.status(&format!("Directory: {}", dir.display()));
    }
    if summary.containers.is_empty() {
        return;
    }
    out.blank();
    out.status("Containers:");
    for container in &summary.containers {
        out.status(&format!(
            "  {:<14} {:<30} {:<10} {}",
            container.id.chars().take(12).collect::<String>(),
            container.name,
            container.state,
            container.image
        ));
    }
}

pub async fn run_init(
    manager: &mut StacksManager,
    name: &str,
    kind: &str,
    params: InitParams,
    up: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    manager.init_stack(name, kind, &params).await?;
    out.success(&format!("Created {} stack '{}'", kind, name));
    if up {
        report_output(manager.start(name).await?, out)?;
        out.success(&format!("Stack '{}' is up", name));
    }
    Ok(())
}

pub async fn run_up(
    manager: &mut StacksManager,
    name: &str,
    no_build: bool,
    no_recreate: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let mut args = ComposeArgs::new();
    if no_build {
        args = args.flag("build", false);
    }
    if no_recreate {
        args = args.flag("force_recreate", false).flag("no_recreate", true);
    }
    report_output(manager.start_with(name, args).await?, out)?;
    out.success(&format!("Stack '{}' is up", name));
    Ok(())
}

/// Single-stack commands that only differ in the manager call.
#[derive(Debug, Clone, Copy)]
pub enum LifecycleOp {
    Down,
    Stop,
    Restart,
    Ps,
}

pub async fn run_lifecycle(
    manager: &mut StacksManager,
    op: LifecycleOp,
    name: &str,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let output = match op {
        LifecycleOp::Down => manager.delete(name).await?,
        LifecycleOp::Stop => manager.stop(name).await?,
        LifecycleOp::Restart => manager.restart(name).await?,
        LifecycleOp::Ps => manager.ps(name).await?,
    };
    report_output(output, out)
}

pub async fn run_destroy(
    manager: &mut StacksManager,
    name: &str,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let report = manager.destroy(name).await;
    for line in &report.log {
        out.status(line);
    }
    if report.is_clean() {
        out.success(&format!("Stack '{}' destroyed", name));
    } else {
        out.warning(&format!(
            "Stack '{}' destroyed with {} error(s)",
            name,
            report.errors.len()
        ));
    }
    Ok(())
}

pub async fn run_sync(
    manager: &mut StacksManager,
    name: &str,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let report = manager.sync(name).await?;
    if json {
        let value = serde_json::json!({
            "log": report.log,
            "compose_file": report.compose_file,
        });
        out.status(&serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    for line in &report.log {
        out.status(line);
    }
    out.success(&format!(
        "Stack '{}' synced to {}",
        name,
        report.compose_file.display()
    ));
    Ok(())
}
