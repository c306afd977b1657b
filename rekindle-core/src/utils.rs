//! Utility functions for the container
//!
//! This module provides common utility functions used throughout the crate.

/// Naming convention utilities for bean names
pub mod naming {
    /// Converts a PascalCase type name to camelCase for bean naming.
    ///
    /// This is the default bean naming strategy: `WeatherService` becomes `weatherService`.
    ///
    /// # Examples
    ///
    /// ```
    /// use rekindle_core::utils::naming::to_camel_case;
    ///
    /// assert_eq!(to_camel_case("WeatherService"), "weatherService");
    /// assert_eq!(to_camel_case("A"), "a");
    /// assert_eq!(to_camel_case(""), "");
    /// ```
    pub fn to_camel_case(s: &str) -> String {
        let mut chars = s.chars();
        match chars.next() {
            None => String::new(),
            Some(first) => {
                let mut result = String::with_capacity(s.len());
                result.extend(first.to_lowercase());
                result.push_str(chars.as_str());
                result
            }
        }
    }

    /// Derives the default bean name from a fully qualified type name.
    ///
    /// Module path and generic arguments are dropped before camel-casing.
    ///
    /// ```
    /// use rekindle_core::utils::naming::default_bean_name;
    ///
    /// assert_eq!(default_bean_name("weather_demo::service::WeatherService"), "weatherService");
    /// assert_eq!(default_bean_name("app::Cache<alloc::string::String>"), "cache");
    /// ```
    pub fn default_bean_name(type_name: &str) -> String {
        let base = type_name.split('<').next().unwrap_or(type_name);
        let short = base.rsplit("::").next().unwrap_or(base);
        to_camel_case(short)
    }
}

/// Dependency resolution utilities
pub mod dependency {
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::thread::{self, ThreadId};

    /// Tracks beans currently being created to detect circular dependencies.
    ///
    /// Creation chains are tracked per thread, so two threads building the
    /// same bean at once is not reported as a cycle.
    #[derive(Debug, Default)]
    pub struct CreationTracker {
        creating: Mutex<HashMap<ThreadId, Vec<String>>>,
    }

    impl CreationTracker {
        /// Creates a new empty creation tracker.
        pub fn new() -> Self {
            Self::default()
        }

        /// Checks if a bean is currently being created on this thread.
        pub fn is_creating(&self, name: &str) -> bool {
            self.creating
                .lock()
                .get(&thread::current().id())
                .map_or(false, |chain| chain.iter().any(|n| n == name))
        }

        /// Marks a bean as being created on this thread.
        ///
        /// Returns `false` if the bean is already in this thread's creation
        /// chain (circular dependency detected).
        pub fn start_creating(&self, name: &str) -> bool {
            let mut creating = self.creating.lock();
            let chain = creating.entry(thread::current().id()).or_default();
            if chain.iter().any(|n| n == name) {
                return false;
            }
            chain.push(name.to_string());
            true
        }

        /// Marks a bean as finished being created on this thread.
        pub fn finish_creating(&self, name: &str) {
            let id = thread::current().id();
            let mut creating = self.creating.lock();
            if let Some(chain) = creating.get_mut(&id) {
                if let Some(pos) = chain.iter().rposition(|n| n == name) {
                    chain.remove(pos);
                }
                if chain.is_empty() {
                    creating.remove(&id);
                }
            }
        }

        /// Gets this thread's creation chain, outermost bean first.
        pub fn current_creating(&self) -> Vec<String> {
            self.creating
                .lock()
                .get(&thread::current().id())
                .cloned()
                .unwrap_or_default()
        }
    }

}
