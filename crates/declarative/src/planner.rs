//! Execution planner - ordered list of resources to reconcile

use crate::resource::{BoxedResource, Resource};

/// An execution plan: resources reconciled in insertion order
#[derive(Debug, Default)]
pub struct ExecutionPlan {
    /// Resources in the order they will be applied
    pub resources: Vec<BoxedResource>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource to the end of the plan
    pub fn add_resource(&mut self, resource: BoxedResource) {
        self.resources.push(resource);
    }

    /// Filter plan to only include resources matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&dyn Resource) -> bool,
    {
        Self {
            resources: self
                .resources
                .into_iter()
                .filter(|r| predicate(r.as_ref()))
                .collect(),
        }
    }

    /// Filter plan to only include resources matching a target pattern
    ///
    /// Target format: "type" or "type.name"
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (resource_type, name) = parse_target(t);
                self.filter(|r| matches_filter(r, &resource_type, name.as_deref()))
            }
        }
    }

    /// Total number of resources in the plan
    pub fn total_resources(&self) -> usize {
        self.resources.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Parse a target string like "type.name" into (type, name)
///
/// Only the first dot separates, so names may contain dots.
fn parse_target(target: &str) -> (String, Option<String>) {
    match target.split_once('.') {
        Some((resource_type, name)) => (resource_type.to_string(), Some(name.to_string())),
        None => (target.to_string(), None),
    }
}

/// Check if a resource matches the filter criteria
fn matches_filter(resource: &dyn Resource, resource_type: &str, name: Option<&str>) -> bool {
    let actual = resource.resource_type();
    // Plural manifest keys ("groups", "storages") are accepted too
    let matches_type = actual == resource_type
        || resource_type.strip_suffix('s') == Some(actual)
        || actual.starts_with(&format!("{resource_type}_"));
    if !matches_type {
        return false;
    }

    if let Some(n) = name
        && !resource.id().contains(n)
    {
        return false;
    }

    true
}
