//! Centralized Docker CLI client.
//!
//! All Docker CLI interactions go through `DockerClient`, which provides
//! consistent timeout handling, error mapping to [`DockerError`], and a single
//! point where `Command::new("docker")` is constructed. Each client targets
//! one engine through `docker --host`.

use super::engine::{ContainerFilter, ContainerInfo, EngineClient, COMPOSE_WORKING_DIR_LABEL};
use super::DockerError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

/// Default timeout for a single docker CLI call.
pub const DEFAULT_DOCKER_TIMEOUT: Duration = Duration::from_secs(60);

/// Docker CLI client bound to one engine endpoint.
#[derive(Debug, Clone)]
pub struct DockerClient {
    host: Option<String>,
    timeout: Duration,
}

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names", default)]
    names: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Labels", default)]
    labels: String,
}

impl DockerClient {
    /// Client for an explicit `DOCKER_HOST` style endpoint.
    pub fn with_host(host: impl Into<String>) -> Self {
        DockerClient {
            host: Some(host.into()),
            timeout: DEFAULT_DOCKER_TIMEOUT,
        }
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn full_args<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(host) = self.host.as_deref() {
            full.push("--host");
            full.push(host);
        }
        full.extend_from_slice(args);
        full
    }

    /// Run a docker command with the client timeout, returning raw Output.
    async fn run(&self, args: &[&str]) -> Result<Output, DockerError> {
        let full = self.full_args(args);
        let cmd_str = format!("docker {}", args.join(" "));
        tracing::debug!(host = ?self.host, "running {}", cmd_str);

        let result = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new("docker")
                .args(&full)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(DockerError::exec_failed(cmd_str, e)),
            Err(_) => Err(DockerError::timeout(cmd_str, self.timeout)),
        }
    }

    /// Run a container-scoped command, mapping non-zero exit to an error.
    async fn run_on_container(&self, args: &[&str], container: &str) -> Result<Output, DockerError> {
        let output = self.run(args).await?;
        if output.status.success() {
            Ok(output)
        } else {
            let cmd_str = format!("docker {}", args.join(" "));
            Err(DockerError::failed(cmd_str, container, &output))
        }
    }

    /// Read a single field of `docker inspect` for a container.
    async fn inspect_field(&self, container: &str, format: &str) -> Result<String, DockerError> {
        let output = self
            .run_on_container(&["inspect", "--format", format, container], container)
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Parse the comma separated `k=v` list `docker ps` prints for labels.
fn parse_labels(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            let k = k.trim();
            if k.is_empty() {
                None
            } else {
                Some((k.to_string(), v.to_string()))
            }
        })
        .collect()
}

/// Parse newline-delimited JSON from `docker ps --format '{{json .}}'`.
pub(crate) fn parse_ps_output(stdout: &str) -> Result<Vec<ContainerInfo>, DockerError> {
    let mut containers = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed: PsLine = serde_json::from_str(line)
            .map_err(|e| DockerError::unexpected_output("docker ps", e.to_string()))?;
        containers.push(ContainerInfo {
            id: parsed.id,
            name: parsed.names,
            image: parsed.image,
            state: parsed.state.to_lowercase(),
            status: parsed.status,
            labels: parse_labels(&parsed.labels),
        });
    }
    Ok(containers)
}

#[async_trait]
impl EngineClient for DockerClient {
    async fn list_containers(
        &self,
        filter: &ContainerFilter,
    ) -> Result<Vec<ContainerInfo>, DockerError> {
        let label_filters: Vec<String> = filter
            .labels
            .iter()
            .map(|(k, v)| format!("label={}={}", k, v))
            .collect();

        let mut args = vec!["ps", "-a", "--no-trunc", "--format", "{{json .}}"];
        for f in &label_filters {
            args.push("--filter");
            args.push(f);
        }

        let output = self.run(&args).await?;
        if !output.status.success() {
            return Err(DockerError::failed("docker ps", "", &output));
        }
        parse_ps_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        let state = self.inspect_field(id, "{{.State.Status}}").await?;
        match state.as_str() {
            "running" => Ok(()),
            "paused" => self.run_on_container(&["unpause", id], id).await.map(|_| ()),
            _ => self.run_on_container(&["start", id], id).await.map(|_| ()),
        }
    }

    async fn stop_container(&self, id: &str) -> Result<(), DockerError> {
        self.run_on_container(&["stop", id], id).await.map(|_| ())
    }

    async fn restart_container(&self, id: &str) -> Result<(), DockerError> {
        self.run_on_container(&["restart", id], id).await.map(|_| ())
    }

    async fn remove_container(&self, id: &str) -> Result<(), DockerError> {
        self.run_on_container(&["rm", "-f", id], id).await.map(|_| ())
    }

    async fn get_stack_project_dir(&self, name: &str) -> Result<Option<PathBuf>, DockerError> {
        let containers = self.list_stack_containers(name).await?;
        // ps joins labels with commas, so read the label back exactly via inspect.
        let format = format!("{{{{ index .Config.Labels \"{}\" }}}}", COMPOSE_WORKING_DIR_LABEL);
        for container in &containers {
            match self.inspect_field(&container.id, &format).await {
                Ok(raw) => {
                    if let Some(dir) = label_value(&raw) {
                        return Ok(Some(dir));
                    }
                }
                Err(e) => tracing::debug!("inspect of {} failed: {}", container.id, e),
            }
        }
        Ok(containers
            .iter()
            .find_map(ContainerInfo::compose_working_dir)
            .map(PathBuf::from))
    }
}

/// A label read with `{{ index .Config.Labels ... }}`; missing labels print `<no value>`.
fn label_value(raw: &str) -> Option<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "<no value>" {
        None
    } else {
        Some(PathBuf::from(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ps_lines_with_labels() {
        let stdout = r#"{"ID":"abc123","Names":"web-nginx-1","Image":"nginx:alpine","State":"running","Status":"Up 2 minutes","Labels":"com.docker.compose.project=web,com.docker.compose.service=nginx"}
{"ID":"def456","Names":"web-db-1","Image":"postgres","State":"exited","Status":"Exited (0)","Labels":""}
"#;
        let containers = parse_ps_output(stdout).unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].id, "abc123");
        assert_eq!(containers[0].compose_project(), Some("web"));
        assert!(containers[0].is_running());
        assert!(containers[1].labels.is_empty());
        assert!(!containers[1].is_running());
    }

    #[test]
    fn missing_labels_read_as_none() {
        assert_eq!(label_value("<no value>\n"), None);
        assert_eq!(label_value("  "), None);
        assert_eq!(
            label_value("/srv/app,with,commas\n"),
            Some(PathBuf::from("/srv/app,with,commas"))
        );
    }

    #[test]
    fn parse_ps_rejects_garbage() {
        let err = parse_ps_output("not json").unwrap_err();
        assert!(matches!(err, DockerError::UnexpectedOutput { .. }));
    }

    #[test]
    fn host_flag_precedes_subcommand() {
        let client = DockerClient::with_host("ssh://deploy@example.org");
        assert_eq!(
            client.full_args(&["ps", "-a"]),
            vec!["--host", "ssh://deploy@example.org", "ps", "-a"]
        );
    }

    #[test]
    fn labels_with_equals_in_value() {
        let labels = parse_labels("a=b=c,empty=,=skip");
        assert_eq!(labels.get("a").map(String::as_str), Some("b=c"));
        assert_eq!(labels.get("empty").map(String::as_str), Some(""));
        assert_eq!(labels.len(), 2);
    }
}
