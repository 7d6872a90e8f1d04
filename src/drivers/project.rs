//! Project resolution for new namespaces

use async_trait::async_trait;

use super::ProjectDriver;
use crate::error::{Error, Result};

/// Assigns every namespace to the configured project
pub struct DefaultProjectDriver {
    project_id: Option<String>,
}

impl DefaultProjectDriver {
    pub fn new(project_id: Option<String>) -> Self {
        Self { project_id }
    }
}

#[async_trait]
impl ProjectDriver for DefaultProjectDriver {
    async fn get_project(&self, _namespace: &str) -> Result<String> {
        self.project_id
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::config("default_project_id is not configured"))
    }
}
