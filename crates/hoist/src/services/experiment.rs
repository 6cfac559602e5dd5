use hoist_api::{Experiment, ExperimentSpec};
use hoist_http::{Method, Payload, Request};

use crate::client::Hoist;
use crate::error::{Error, Result};
use crate::services::{url_quote, validate_name};

/// An experiment argument: either a bare ID/name or an already-fetched
/// record.
#[derive(Debug, Clone, Copy)]
pub enum ExperimentRef<'a> {
    Id(&'a str),
    Resolved(&'a Experiment),
}

impl<'a> From<&'a str> for ExperimentRef<'a> {
    fn from(id: &'a str) -> Self {
        ExperimentRef::Id(id)
    }
}

impl<'a> From<&'a Experiment> for ExperimentRef<'a> {
    fn from(experiment: &'a Experiment) -> Self {
        ExperimentRef::Resolved(experiment)
    }
}

pub struct ExperimentClient<'a> {
    pub(crate) hoist: &'a Hoist,
}

impl ExperimentClient<'_> {
    /// Get info about an experiment by ID or name. A bare name is retried
    /// with the account prefix before giving up.
    pub async fn get(&self, experiment: &str) -> Result<Experiment> {
        match self.get_raw(experiment).await {
            Err(Error::ExperimentNotFound(_)) if !experiment.contains('/') => {
                let account = self.hoist.account().whoami().await?;
                match self
                    .get_raw(&format!("{}/{}", account.name, experiment))
                    .await
                {
                    Err(Error::ExperimentNotFound(_)) => {
                        Err(Error::ExperimentNotFound(experiment.to_string()))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn get_raw(&self, id: &str) -> Result<Experiment> {
        let response = self
            .hoist
            .transport()
            .send(Request::new(
                Method::Get,
                format!("experiments/{}", url_quote(id)),
            ))
            .await;
        match response {
            Ok(response) => Ok(response.json().await?),
            Err(error) if error.status() == Some(404) => {
                Err(Error::ExperimentNotFound(id.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Submit a new experiment under a workspace.
    pub async fn create(
        &self,
        spec: &ExperimentSpec,
        name: Option<&str>,
        workspace: Option<&str>,
    ) -> Result<Experiment> {
        if let Some(name) = name {
            validate_name(name)?;
        }
        let workspace = self.hoist.workspaces().resolve(workspace, false).await?;
        let mut request = Request::new(
            Method::Post,
            format!("workspaces/{}/experiments", url_quote(&workspace.id)),
        )
        .payload(Payload::Json(serde_json::to_value(spec)?));
        if let Some(name) = name {
            request = request.query("name", name);
        }
        match self.hoist.transport().send(request).await {
            Ok(response) => Ok(response.json().await?),
            Err(error) if error.status() == Some(409) => Err(Error::ExperimentConflict(
                name.unwrap_or("experiment").to_string(),
            )),
            Err(error) => Err(error.into()),
        }
    }

    /// The spec the experiment was submitted with.
    pub async fn spec<'r>(&self, experiment: impl Into<ExperimentRef<'r>>) -> Result<ExperimentSpec> {
        let id = self.resolve(experiment.into()).await?.id;
        let response = self
            .hoist
            .transport()
            .send(Request::new(
                Method::Get,
                format!("experiments/{}/spec", url_quote(&id)),
            ))
            .await;
        match response {
            Ok(response) => Ok(response.json().await?),
            Err(error) if error.status() == Some(404) => Err(Error::ExperimentNotFound(id)),
            Err(error) => Err(error.into()),
        }
    }

    /// Cancel every job of the experiment.
    pub async fn stop<'r>(&self, experiment: impl Into<ExperimentRef<'r>>) -> Result<()> {
        self.lifecycle(experiment.into(), "stop").await
    }

    /// Resume a stopped experiment.
    pub async fn resume<'r>(&self, experiment: impl Into<ExperimentRef<'r>>) -> Result<()> {
        self.lifecycle(experiment.into(), "resume").await
    }

    async fn lifecycle(&self, experiment: ExperimentRef<'_>, action: &str) -> Result<()> {
        let id = self.resolve(experiment).await?.id;
        let response = self
            .hoist
            .transport()
            .send(Request::new(
                Method::Put,
                format!("experiments/{}/{}", url_quote(&id), action),
            ))
            .await;
        match response {
            Ok(_) => Ok(()),
            Err(error) if error.status() == Some(404) => Err(Error::ExperimentNotFound(id)),
            Err(error) if error.status() == Some(409) => Err(Error::ExperimentConflict(id)),
            Err(error) => Err(error.into()),
        }
    }

    pub fn url(&self, experiment: &Experiment) -> String {
        format!(
            "{}/ex/{}",
            self.hoist.config().agent_address.trim_end_matches('/'),
            url_quote(&experiment.id)
        )
    }

    async fn resolve(&self, experiment: ExperimentRef<'_>) -> Result<Experiment> {
        match experiment {
            ExperimentRef::Id(id) => self.get(id).await,
            ExperimentRef::Resolved(experiment) => Ok(experiment.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use hoist_api::{ImageSource, ResultSpec, TaskContext, TaskSpec};

    fn spec() -> ExperimentSpec {
        ExperimentSpec::new(vec![TaskSpec {
            name: Some("train".to_string()),
            image: ImageSource {
                docker: Some("python:3.12".to_string()),
                ..Default::default()
            },
            command: None,
            arguments: None,
            env_vars: Vec::new(),
            datasets: Vec::new(),
            result: ResultSpec {
                path: "/output".to_string(),
            },
            context: TaskContext::default(),
        }])
    }

    #[tokio::test]
    async fn create_submits_under_the_workspace() {
        let client = MockClient::new(|request| match request.url.as_str() {
            "https://api.test/api/v3/workspaces/org%2Fmain" => {
                MockResponse::json(workspace_json("ws-1", "org/main", false))
            }
            "https://api.test/api/v3/workspaces/ws-1/experiments" => {
                MockResponse::json(experiment_json("ex-1", "sweep"))
            }
            _ => MockResponse::status(404),
        });
        let hoist = hoist_with(client.clone());

        let experiment = hoist
            .experiments()
            .create(&spec(), Some("sweep"), None)
            .await
            .unwrap();
        assert_eq!(experiment.id, "ex-1");

        let submit = client
            .requests()
            .into_iter()
            .find(|r| r.url.ends_with("/experiments"))
            .unwrap();
        assert!(submit.query.contains(&("name".to_string(), "sweep".to_string())));
        match submit.payload {
            Payload::Json(value) => assert_eq!(value["tasks"][0]["result"]["path"], "/output"),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn stopping_a_stopped_experiment_is_a_conflict() {
        let client = MockClient::new(|request| {
            if request.url.ends_with("/experiments/ex-1/stop") {
                MockResponse::status(409)
            } else {
                MockResponse::json(experiment_json("ex-1", "sweep"))
            }
        });
        let hoist = hoist_with(client);
        let err = hoist.experiments().stop("ex-1").await.unwrap_err();
        assert!(matches!(err, Error::ExperimentConflict(_)));
    }
}
