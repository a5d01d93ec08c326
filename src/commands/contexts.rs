use crate::cli::ContextCommands;
use crate::output::UserOutput;
use stack_agent::config::{Context, SshConfig};
use stack_agent::StacksManagerStore;

pub fn run_contexts(
    cmd: ContextCommands,
    store: &StacksManagerStore,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let resolver = store.resolver();
    match cmd {
        ContextCommands::List => {
            let contexts = resolver.contexts();
            if json {
                out.status(&serde_json::to_string_pretty(&contexts)?);
                return Ok(());
            }
            if contexts.is_empty() {
                out.status("No contexts configured; 'local' and 'default' use the local socket");
            }
            for context in &contexts {
                out.status(&format!("  {:<20} {}", context.id, context.host));
            }
        }
        ContextCommands::Add {
            id,
            host,
            ssh_user,
            ssh_port,
            identity_file,
            no_agent_forward,
            data_home,
        } => {
            let mut context = Context::new(&id, &host);
            let wants_ssh = ssh_user.is_some()
                || ssh_port.is_some()
                || identity_file.is_some()
                || no_agent_forward;
            if wants_ssh {
                context = context.with_ssh(SshConfig {
                    user: ssh_user,
                    port: ssh_port,
                    identity_file,
                    agent_forward: !no_agent_forward,
                    ..SshConfig::default()
                });
            }
            if let Some(dir) = data_home {
                context = context.with_data_home(dir);
            }
            resolver.add(context, true)?;
            out.success(&format!("Added context '{}' ({})", id, host));
        }
        ContextCommands::Remove { id } => {
            if resolver.remove(&id, true)? {
                store.evict(&id);
                out.success(&format!("Removed context '{}'", id));
            } else {
                out.warning(&format!("Context '{}' is not in the contexts file", id));
            }
        }
    }
    Ok(())
}
