//! Route segments for themes and groups.
//!
//! Media paths are built from the route of the owning theme and group, which
//! may have been declared in another leaf. The registry is filled from every
//! existing unit file before building starts and from each new unit as it is
//! built.

use super::IdentityError;
use crate::types::Unit;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: HashMap<String, String>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the route of an identifier. Later registrations win.
    pub fn register(&mut self, identifier: &str, route: &str) {
        self.routes
            .insert(identifier.to_string(), route.to_string());
    }

    pub fn route(&self, identifier: &str) -> Result<&str, IdentityError> {
        self.routes
            .get(identifier)
            .map(String::as_str)
            .ok_or_else(|| IdentityError::MissingRoute(identifier.to_string()))
    }

    /// Register every theme and group route found in a unit.
    pub fn gather_from_unit(&mut self, unit: &Unit) {
        for theme in &unit.themes {
            self.register(&theme.uuid, &theme.route);
        }
        for group in &unit.groups {
            self.register(&group.uuid, &group.route);
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
