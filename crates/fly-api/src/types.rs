use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Machine types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CreateMachineRequest {
    pub name: String,
    pub region: String,
    pub config: MachineConfig,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MachineConfig {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<MachineService>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mounts: Option<Vec<MachineMount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest: Option<GuestConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuestConfig {
    pub cpus: u32,
    pub cpu_kind: String,
    pub memory_mb: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineService {
    pub protocol: String,
    pub internal_port: u16,
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServicePort {
    pub port: u16,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub handlers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineMount {
    pub volume: String,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Machine {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub region: String,
    pub private_ip: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

// ── Platform types ───────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Region {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub requires_paid_plan: bool,
    #[serde(default)]
    pub capacity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RegionsResponse {
    #[serde(rename = "Regions", default)]
    pub regions: Vec<Region>,
}
