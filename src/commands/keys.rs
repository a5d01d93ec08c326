use crate::cli::KeyCommands;
use crate::output::UserOutput;
use stack_agent::credentials::FileCredentialStore;

pub fn run_keys(
    cmd: KeyCommands,
    store: &FileCredentialStore,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    match cmd {
        KeyCommands::List => {
            let ids = store.list()?;
            if json {
                out.status(&serde_json::to_string_pretty(&ids)?);
            } else if ids.is_empty() {
                out.status(&format!("No keys in {}", store.dir().display()));
            } else {
                for id in ids {
                    out.status(&format!("  {}", id));
                }
            }
        }
        KeyCommands::Add { id, file } => {
            let content = std::fs::read_to_string(&file)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
            let path = store.write(&id, &content)?;
            out.success(&format!("Stored key '{}' at {}", id, path.display()));
        }
        KeyCommands::Remove { id } => {
            store.delete(&id)?;
            out.success(&format!("Removed key '{}'", id));
        }
    }
    Ok(())
}
