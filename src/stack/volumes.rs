//! Bind mount rewriting for compose files.
//!
//! The agent and the docker daemon can see different filesystem roots (the
//! agent may itself run in a container with the data dir bind-mounted).
//! Relative host paths in a stack's compose file are rewritten to absolute
//! paths under the stack directory as the daemon sees it.

use crate::error::{Error, Result};
use serde_yaml::Value;
use std::path::{Path, PathBuf};

/// Rewrite the host side of a short-syntax volume (`host:container[:mode]`).
///
/// - `./x`, `.`, and other relative paths with a `/` are joined onto `prefix`
/// - absolute paths, `~` paths, `$VAR` paths and named volumes are unchanged
/// - any `..` segment is rejected
pub fn rewrite_volume(spec: &str, prefix: &Path) -> Result<String> {
    let parts: Vec<&str> = spec.split(':').collect();
    match parts.len() {
        // Anonymous volume, container path only.
        1 => Ok(spec.to_string()),
        2 | 3 => match rewrite_host_path(parts[0], prefix)? {
            Some(host) => {
                let mut rewritten = vec![host.as_str()];
                rewritten.extend_from_slice(&parts[1..]);
                Ok(rewritten.join(":"))
            }
            None => Ok(spec.to_string()),
        },
        _ => Err(Error::Configuration(format!("Invalid volume mount: {}", spec))),
    }
}

/// Rewritten host path, or `None` if it stays as is.
pub fn rewrite_host_path(host: &str, prefix: &Path) -> Result<Option<String>> {
    if host.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(Error::Configuration(format!(
            "Relative parent path not allowed in volume mount: {}",
            host
        )));
    }
    if host.is_empty() || host.starts_with('/') || host.starts_with('~') || host.starts_with('$') {
        return Ok(None);
    }
    if host != "." && !host.contains('/') {
        // Named volume.
        return Ok(None);
    }

    let relative: PathBuf = host
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    let rooted = if relative.as_os_str().is_empty() {
        prefix.to_path_buf()
    } else {
        prefix.join(relative)
    };
    Ok(Some(rooted.display().to_string()))
}

/// Rewrite every service volume of a parsed compose document. Returns the
/// number of rewritten entries.
pub fn rewrite_compose_volumes(doc: &mut Value, prefix: &Path) -> Result<usize> {
    let Some(services) = doc.get_mut("services").and_then(Value::as_mapping_mut) else {
        return Ok(0);
    };

    let mut rewritten = 0;
    for (_, service) in services.iter_mut() {
        let Some(volumes) = service.get_mut("volumes").and_then(Value::as_sequence_mut) else {
            continue;
        };
        for volume in volumes.iter_mut() {
            match volume {
                Value::String(spec) => {
                    let new_spec = rewrite_volume(spec, prefix)?;
                    if new_spec != *spec {
                        *spec = new_spec;
                        rewritten += 1;
                    }
                }
                Value::Mapping(long) => {
                    let is_bind = long.get("type").and_then(Value::as_str) == Some("bind");
                    if !is_bind {
                        continue;
                    }
                    if let Some(Value::String(source)) = long.get_mut("source") {
                        if let Some(new_source) = rewrite_host_path(source, prefix)? {
                            *source = new_source;
                            rewritten += 1;
                        }
                    }
                }
                _ => {}
            }
        }
    }
    Ok(rewritten)
}

/// Read `input`, rewrite its volumes and write the result to `output`.
pub fn rewrite_compose_file(input: &Path, output: &Path, prefix: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(input)?;
    let mut doc: Value = serde_yaml::from_str(&content)?;
    if !doc.is_mapping() {
        return Err(Error::Configuration(format!(
            "Compose file {} is not a YAML mapping",
            input.display()
        )));
    }
    let rewritten = rewrite_compose_volumes(&mut doc, prefix)?;
    std::fs::write(output, serde_yaml::to_string(&doc)?)?;
    tracing::debug!(
        "wrote {} ({} volume(s) rewritten under {})",
        output.display(),
        rewritten,
        prefix.display()
    );
    Ok(rewritten)
}
