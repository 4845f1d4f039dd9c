//! Registry of every runner known to the compiler and the dispatcher

use std::collections::HashMap;

use crate::runners::interface::Runner;

/// Maps runner names to implementations. Built once at startup and passed by
/// reference to the compiler and the dispatcher.
pub struct RunnerRegistry {
    runners: HashMap<String, Box<dyn Runner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self {
            runners: HashMap::new(),
        }
    }

    /// Create a registry with all built-in runners pre-registered
    pub fn with_core_runners() -> Self {
        let mut registry = Self::new();

        registry.register(Box::new(crate::runners::core::ShellRunner));
        registry.register(Box::new(crate::runners::core::CommandRunner));
        registry.register(Box::new(crate::runners::core::DebugRunner));
        registry.register(Box::new(crate::runners::core::ServiceRunner));
        registry.register(Box::new(crate::runners::core::AptRunner));
        registry.register(Box::new(crate::runners::core::LocalActionRunner));
        registry.register(Box::new(crate::runners::files::TreeRunner));
        registry.register(Box::new(crate::runners::files::LineInFileRunner));
        registry.register(Box::new(crate::runners::files::AuthorizedKeyRunner));
        registry.register(Box::new(crate::runners::files::GetUrlRunner::new()));

        registry
    }

    pub fn register(&mut self, runner: Box<dyn Runner>) {
        self.runners.insert(runner.name().to_string(), runner);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Runner> {
        self.runners.get(name).map(|r| r.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.runners.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.runners.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_runners_registered() {
        let registry = RunnerRegistry::with_core_runners();
        for name in ["shell", "command", "tree", "service", "apt", "local_action"] {
            assert!(registry.contains(name), "missing runner {name}");
        }
        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_local_action_is_local_only() {
        let registry = RunnerRegistry::with_core_runners();
        let spec = registry.get("local_action").unwrap().spec();
        assert!(spec.local_only);
        assert!(spec.pre_run);
    }
}
