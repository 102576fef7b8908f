//! Cloud collector client.
//!
//! Registration, snapshot upload, command and schedule polling against the
//! collector's agent API. Uploads go through a bounded retry with doubling
//! backoff; polls treat HTTP 404 as "nothing for you".

use crate::error::{WardenError, WardenResult};
use crate::types::{CloudSchedule, Disk, HealthReport, NvmeSnapshot, PoolStatus, SmartSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_ATTEMPTS: u32 = 3;

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    hostname: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    os_info: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    agent_version: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    host_id: String,
}

/// Everything the cloud sees on a snapshot upload
#[derive(Debug, Default, Serialize)]
pub struct SnapshotPayload {
    pub host_id: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<Disk>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pools: Vec<PoolStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub smart_snapshots: Vec<SmartSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nvme_snapshots: Vec<NvmeSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_report: Option<HealthReport>,
}

/// A remotely issued command
#[derive(Debug, Clone, Deserialize)]
pub struct Command {
    pub id: String,
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
struct CommandsResponse {
    #[serde(default)]
    commands: Vec<Command>,
}

#[derive(Debug, Deserialize)]
struct SchedulesResponse {
    #[serde(default)]
    schedules: Vec<CloudSchedule>,
}

#[derive(Debug, Serialize)]
struct AckRequest<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

pub struct Uplink {
    endpoint: String,
    token: String,
    host_id: Mutex<String>,
    hostname: String,
    client: reqwest::Client,
    shutdown: broadcast::Sender<()>,
}

impl Uplink {
    pub fn new(
        endpoint: &str,
        token: &str,
        host_id: &str,
        hostname: &str,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
            host_id: Mutex::new(host_id.to_string()),
            hostname: hostname.to_string(),
            client,
            shutdown,
        }
    }

    pub fn host_id(&self) -> String {
        self.host_id.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_host_id(&self, host_id: &str) {
        *self.host_id.lock().unwrap_or_else(|e| e.into_inner()) = host_id.to_string();
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.endpoint))
            .header("Content-Type", "application/json");
        if !self.token.is_empty() {
            builder = builder.bearer_auth(&self.token);
        }
        let host_id = self.host_id();
        if !host_id.is_empty() {
            builder = builder.header("X-Host-ID", host_id);
        }
        builder
    }

    /// Register this host; the returned host id is attached to all
    /// subsequent requests
    pub async fn register(&self, os_info: &str, agent_version: &str) -> WardenResult<String> {
        let body = RegisterRequest {
            hostname: &self.hostname,
            os_info,
            agent_version,
        };

        let response = self
            .request(reqwest::Method::POST, "/api/v1/agent/register")
            .json(&body)
            .send()
            .await
            .map_err(|e| WardenError::Send(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::CREATED {
            return Err(WardenError::UnexpectedStatus(status.as_u16()));
        }

        let reg: RegisterResponse = response
            .json()
            .await
            .map_err(|e| WardenError::Send(e.to_string()))?;
        self.set_host_id(&reg.host_id);
        Ok(reg.host_id)
    }

    /// Upload a health report to the ingest endpoint
    pub async fn send_summary(&self, report: &HealthReport) -> WardenResult<()> {
        self.send_with_retry("/api/v1/agent/ingest", report).await
    }

    /// Upload the full telemetry snapshot
    pub async fn send_snapshot(&self, mut payload: SnapshotPayload) -> WardenResult<()> {
        payload.host_id = self.host_id();
        self.send_with_retry("/api/v1/agent/snapshot", &payload).await
    }

    /// Fetch pending remote commands; 404 means none
    pub async fn poll_commands(&self) -> WardenResult<Vec<Command>> {
        let response = self
            .request(reqwest::Method::GET, "/api/v1/agent/commands")
            .send()
            .await
            .map_err(|e| WardenError::Send(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(WardenError::UnexpectedStatus(response.status().as_u16()));
        }

        let parsed: CommandsResponse = response
            .json()
            .await
            .map_err(|e| WardenError::Send(e.to_string()))?;
        Ok(parsed.commands)
    }

    /// Report command completion
    pub async fn acknowledge_command(
        &self,
        command_id: &str,
        success: bool,
        error: &str,
    ) -> WardenResult<()> {
        let body = AckRequest {
            success,
            error: if error.is_empty() { None } else { Some(error) },
        };
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/api/v1/agent/commands/{command_id}/ack"),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| WardenError::Send(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WardenError::UnexpectedStatus(response.status().as_u16()));
        }
        Ok(())
    }

    /// Fetch the schedule set; 404 means none
    pub async fn poll_schedules(&self) -> WardenResult<Vec<CloudSchedule>> {
        let response = self
            .request(reqwest::Method::GET, "/api/v1/agent/schedules")
            .send()
            .await
            .map_err(|e| WardenError::Send(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(WardenError::UnexpectedStatus(response.status().as_u16()));
        }

        let parsed: SchedulesResponse = response
            .json()
            .await
            .map_err(|e| WardenError::Send(e.to_string()))?;
        Ok(parsed.schedules)
    }

    /// POST with up to three attempts and doubling backoff starting at one
    /// second. Encoding failures abort without retry; shutdown interrupts
    /// the inter-attempt wait.
    async fn send_with_retry<T: Serialize>(&self, path: &str, payload: &T) -> WardenResult<()> {
        let body = serde_json::to_vec(payload)?;
        let mut backoff = Duration::from_secs(1);
        let mut last_err = WardenError::Send("no attempts made".into());
        let mut shutdown = self.shutdown.subscribe();

        for attempt in 0..UPLOAD_ATTEMPTS {
            if attempt > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown.recv() => return Err(WardenError::Cancelled),
                }
                backoff *= 2;
            }

            let result = self
                .request(reqwest::Method::POST, path)
                .body(body.clone())
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    last_err = WardenError::UnexpectedStatus(response.status().as_u16());
                }
                Err(e) => {
                    last_err = WardenError::Send(e.to_string());
                }
            }
        }
        Err(last_err)
    }
}
