/// Abstraction over user-facing output.
///
/// Command modules use this trait instead of `println!`/`eprintln!` so tests
/// can capture what a command prints.
pub trait UserOutput: Send + Sync {
    /// Informational line on stdout.
    fn status(&self, message: &str);

    fn success(&self, message: &str);

    /// Warning on stderr (e.g. a failed destroy step).
    fn warning(&self, message: &str);

    fn error(&self, message: &str);

    fn blank(&self);
}

/// Standard CLI output. Writes to stdout/stderr with ANSI colors.
pub struct CliOutput;

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("\x1b[32m{}\x1b[0m", message);
    }

    fn warning(&self, message: &str) {
        eprintln!("\x1b[33m{}\x1b[0m", message);
    }

    fn error(&self, message: &str) {
        eprintln!("\x1b[31m{}\x1b[0m", message);
    }

    fn blank(&self) {
        println!();
    }
}
