// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Temporal Worker Bridge Client
//!
//! HTTP adapter implementing [`DurableBackend`] against the Temporal worker
//! bridge. The bridge fronts the Temporal service: it starts runs, reports
//! terminal results, and cancels. An attempted start of an
//! already-running workflow id comes back as HTTP 409, which maps to the
//! idempotent-start error class the durable engine recovers from.
//!
//! # Endpoints
//!
//! - `POST /executions` `{workflow_id, input}` → `201 {workflow_id, run_id}`,
//!   `409` when the run already exists
//! - `GET /executions/{workflow_id}` → `200 {workflow_id, run_id}`, `404`
//! - `GET /executions/{workflow_id}/result?timeout_ms=N` →
//!   `200 {status: "completed"|"failed", output?, error?}`, `408` on deadline
//! - `POST /executions/{workflow_id}/cancel` → `200 {cancelled: bool}`

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::application::durable_engine::{
    BackendError, DurableBackend, RunHandle, RunOutcome, StartRunError,
};

#[derive(Debug, Deserialize)]
struct RunResponse {
    workflow_id: String,
    run_id: String,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancelResponse {
    cancelled: bool,
}

#[derive(Clone)]
pub struct TemporalBridgeClient {
    http: HttpClient,
    endpoint: String,
}

impl TemporalBridgeClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }
}

#[async_trait]
impl DurableBackend for TemporalBridgeClient {
    async fn start_run(
        &self,
        workflow_id: &str,
        input: &serde_json::Value,
    ) -> Result<RunHandle, StartRunError> {
        let response = self
            .http
            .post(self.url("/executions"))
            .json(&serde_json::json!({
                "workflow_id": workflow_id,
                "input": input,
            }))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| StartRunError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::CONFLICT => Err(StartRunError::AlreadyStarted {
                workflow_id: workflow_id.to_string(),
            }),
            status if status.is_success() => {
                let run: RunResponse = response
                    .json()
                    .await
                    .map_err(|e| StartRunError::Transport(e.to_string()))?;
                debug!(workflow_id = %run.workflow_id, run_id = %run.run_id, "Durable run started");
                Ok(RunHandle {
                    workflow_id: run.workflow_id,
                    run_id: run.run_id,
                })
            }
            status => {
                let body = response.text().await.unwrap_or_else(|_| "(no body)".to_string());
                Err(StartRunError::Rejected(format!("{} - {}", status, body)))
            }
        }
    }

    async fn attach_run(&self, workflow_id: &str) -> Result<RunHandle, BackendError> {
        let response = self
            .http
            .get(self.url(&format!("/executions/{}", workflow_id)))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(BackendError::NotFound(workflow_id.to_string())),
            status if status.is_success() => {
                let run: RunResponse = response
                    .json()
                    .await
                    .map_err(|e| BackendError::Transport(e.to_string()))?;
                Ok(RunHandle {
                    workflow_id: run.workflow_id,
                    run_id: run.run_id,
                })
            }
            status => Err(BackendError::Transport(format!("unexpected status {}", status))),
        }
    }

    async fn await_result(
        &self,
        handle: &RunHandle,
        deadline: Duration,
    ) -> Result<RunOutcome, BackendError> {
        let response = self
            .http
            .get(self.url(&format!("/executions/{}/result", handle.workflow_id)))
            .query(&[("timeout_ms", deadline.as_millis().to_string())])
            // The bridge long-polls up to the deadline; pad the transport
            // timeout so the deadline response wins over a socket error.
            .timeout(deadline + Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::REQUEST_TIMEOUT => Err(BackendError::Deadline),
            StatusCode::NOT_FOUND => Err(BackendError::NotFound(handle.workflow_id.clone())),
            status if status.is_success() => {
                let result: ResultResponse = response
                    .json()
                    .await
                    .map_err(|e| BackendError::Transport(e.to_string()))?;
                match result.status.as_str() {
                    "completed" => Ok(RunOutcome::Completed {
                        output: result.output.unwrap_or(serde_json::Value::Null),
                    }),
                    "failed" => Ok(RunOutcome::Failed {
                        error: result
                            .error
                            .unwrap_or_else(|| "run failed without detail".to_string()),
                    }),
                    other => Err(BackendError::Transport(format!(
                        "unexpected run status '{}'",
                        other
                    ))),
                }
            }
            status => Err(BackendError::Transport(format!("unexpected status {}", status))),
        }
    }

    async fn cancel_run(&self, handle: &RunHandle) -> Result<bool, BackendError> {
        let response = self
            .http
            .post(self.url(&format!("/executions/{}/cancel", handle.workflow_id)))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(false);
        }
        let cancel: CancelResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(cancel.cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_maps_conflict_to_already_started() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/executions")
            .with_status(409)
            .create_async()
            .await;

        let client = TemporalBridgeClient::new(server.url());
        let error = client
            .start_run("wf-1", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(error, StartRunError::AlreadyStarted { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn start_parses_run_handle() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/executions")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"workflow_id": "wf-1", "run_id": "run-9"}"#)
            .create_async()
            .await;

        let client = TemporalBridgeClient::new(server.url());
        let handle = client.start_run("wf-1", &serde_json::json!({})).await.unwrap();
        assert_eq!(handle.run_id, "run-9");
    }

    #[tokio::test]
    async fn attach_resolves_existing_run() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/executions/wf-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"workflow_id": "wf-1", "run_id": "run-9"}"#)
            .create_async()
            .await;

        let client = TemporalBridgeClient::new(server.url());
        let handle = client.attach_run("wf-1").await.unwrap();
        assert_eq!(handle.workflow_id, "wf-1");
    }

    #[tokio::test]
    async fn result_maps_terminal_statuses() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/executions/wf-1/result")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "completed", "output": {"ok": true}}"#)
            .create_async()
            .await;

        let client = TemporalBridgeClient::new(server.url());
        let handle = RunHandle {
            workflow_id: "wf-1".to_string(),
            run_id: "run-9".to_string(),
        };
        match client
            .await_result(&handle, Duration::from_millis(100))
            .await
            .unwrap()
        {
            RunOutcome::Completed { output } => assert_eq!(output["ok"], true),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn result_408_maps_to_deadline() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/executions/wf-1/result")
            .match_query(mockito::Matcher::Any)
            .with_status(408)
            .create_async()
            .await;

        let client = TemporalBridgeClient::new(server.url());
        let handle = RunHandle {
            workflow_id: "wf-1".to_string(),
            run_id: "run-9".to_string(),
        };
        let error = client
            .await_result(&handle, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(error, BackendError::Deadline));
    }
}
