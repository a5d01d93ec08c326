/// Value of a compose command line option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// Boolean switch; `false` omits it.
    Flag(bool),
    Value(String),
}

/// Ordered compose options, rendered as `--name [value]`.
///
/// Underscores in names become dashes; single-letter switches render as `-x`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeArgs {
    entries: Vec<(String, ArgValue)>,
}

impl ComposeArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(mut self, name: &str, on: bool) -> Self {
        self.set(name, ArgValue::Flag(on));
        self
    }

    pub fn value(mut self, name: &str, value: impl ToString) -> Self {
        self.set(name, ArgValue::Value(value.to_string()));
        self
    }

    /// Set or replace an option, keeping its original position.
    pub fn set(&mut self, name: &str, value: ArgValue) {
        let name = normalize(name);
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Set an option only if the caller has not.
    pub fn set_default(&mut self, name: &str, value: ArgValue) {
        if !self.contains(name) {
            self.set(name, value);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = normalize(name);
        self.entries.iter().any(|(k, _)| *k == name)
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        let name = normalize(name);
        self.entries.iter().find(|(k, _)| *k == name).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_cmdargs(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.entries.len() * 2);
        for (name, value) in &self.entries {
            match value {
                ArgValue::Flag(false) => {}
                ArgValue::Flag(true) if name.len() == 1 => args.push(format!("-{}", name)),
                ArgValue::Flag(true) => args.push(format!("--{}", name)),
                ArgValue::Value(v) => {
                    args.push(format!("--{}", name));
                    args.push(v.clone());
                }
            }
        }
        args
    }
}

fn normalize(name: &str) -> String {
    name.trim_start_matches('-').replace('_', "-")
}
