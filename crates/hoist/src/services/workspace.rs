use hoist_api::Workspace;
use hoist_http::{Method, Request};

use crate::client::Hoist;
use crate::error::{Error, Result};
use crate::services::{url_quote, validate_name};

pub struct WorkspaceClient<'a> {
    pub(crate) hoist: &'a Hoist,
}

impl WorkspaceClient<'_> {
    pub async fn get(&self, workspace: &str) -> Result<Workspace> {
        let name = self.resolve_name(workspace)?;
        let response = self
            .hoist
            .transport()
            .send(Request::new(
                Method::Get,
                format!("workspaces/{}", url_quote(&name)),
            ))
            .await;
        match response {
            Ok(response) => Ok(response.json().await?),
            Err(error) if error.status() == Some(404) => Err(Error::WorkspaceNotFound(name)),
            Err(error) => Err(error.into()),
        }
    }

    /// Take a possibly-bare workspace name and return the full
    /// `org/name` form, filling in the default organization.
    pub fn resolve_name(&self, workspace: &str) -> Result<String> {
        match workspace.split_once('/') {
            Some((_, name)) => {
                validate_name(name)?;
                Ok(workspace.to_string())
            }
            None => {
                validate_name(workspace)?;
                match &self.hoist.config().default_org {
                    Some(org) => Ok(format!("{org}/{workspace}")),
                    None => Err(Error::OrganizationNotSet(workspace.to_string())),
                }
            }
        }
    }

    /// Resolve an optional workspace name, falling back to the configured
    /// default, and refuse writes against archived workspaces.
    pub(crate) async fn resolve(
        &self,
        workspace: Option<&str>,
        read_only_ok: bool,
    ) -> Result<Workspace> {
        let name = workspace
            .map(str::to_string)
            .or_else(|| self.hoist.config().default_workspace.clone())
            .ok_or(Error::WorkspaceNotSet)?;
        let workspace = self.get(&name).await?;
        if !read_only_ok && workspace.archived {
            return Err(Error::WorkspaceArchived(
                workspace.display_name().to_string(),
            ));
        }
        Ok(workspace)
    }

    pub fn url(&self, workspace: &Workspace) -> String {
        format!(
            "{}/ws/{}",
            self.hoist.config().agent_address.trim_end_matches('/'),
            workspace.full_name.as_deref().unwrap_or(&workspace.id)
        )
    }
}
