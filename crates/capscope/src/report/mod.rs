//! Typed analysis result schemas.
//!
//! The engine emits one JSON document per run; its shape depends on the
//! declared file type. Parsing selects the schema by that type, so
//! downstream consumers work with a tagged sum type instead of probing
//! optional fields on an opaque blob.

use serde::{Deserialize, Serialize};

use crate::model::FileType;

/// Result of one analysis run, tagged by the declared file type's schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisResult {
    PacketCapture(PacketCaptureReport),
    RequestArchive(RequestArchiveReport),
}

impl AnalysisResult {
    /// Parses raw engine stdout into the schema selected by the declared
    /// file type.
    pub fn from_engine_output(
        file_type: FileType,
        bytes: &[u8],
    ) -> Result<Self, serde_json::Error> {
        if file_type.is_packet_capture() {
            serde_json::from_slice::<PacketCaptureReport>(bytes).map(Self::PacketCapture)
        } else {
            serde_json::from_slice::<RequestArchiveReport>(bytes).map(Self::RequestArchive)
        }
    }

    /// The summary section as a JSON object, for merging into file
    /// metadata. Empty if serialization produces anything but an object.
    pub fn summary_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let value = match self {
            AnalysisResult::PacketCapture(report) => serde_json::to_value(&report.summary),
            AnalysisResult::RequestArchive(report) => serde_json::to_value(&report.summary),
        };
        match value {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        match self {
            AnalysisResult::PacketCapture(report) => &report.anomalies,
            AnalysisResult::RequestArchive(report) => &report.anomalies,
        }
    }

    /// True when this result was synthesized without the external engine.
    pub fn is_fallback(&self) -> bool {
        self.anomalies().iter().any(|a| a.placeholder)
    }
}

/// Report shape for packet-oriented captures (pcap/cap/pcapng).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PacketCaptureReport {
    pub summary: PacketSummary,
    #[serde(default)]
    pub protocols: Vec<ProtocolPackets>,
    #[serde(default)]
    pub network: NetworkPeers,
    #[serde(default)]
    pub transport: TransportSummary,
    #[serde(default)]
    pub connections: ConnectionSummary,
    #[serde(default)]
    pub anomalies: Vec<Anomaly>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PacketSummary {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub duration: f64,
    pub avg_packet_size: u64,
    pub packets_per_second: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolPackets {
    pub name: String,
    pub packets: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPeers {
    #[serde(default)]
    pub top_sources: Vec<PeerPackets>,
    #[serde(default)]
    pub top_destinations: Vec<PeerPackets>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeerPackets {
    pub ip: String,
    pub packets: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransportSummary {
    pub tcp_packets: u64,
    pub udp_packets: u64,
    pub icmp_packets: u64,
    #[serde(default)]
    pub top_ports: Vec<PortPackets>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortPackets {
    pub port: u16,
    pub packets: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub total_connections: u64,
    #[serde(default)]
    pub top_connections: Vec<ConnectionPackets>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPackets {
    pub connection: String,
    pub packets: u64,
}

/// Report shape for request archives (HAR).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestArchiveReport {
    pub summary: RequestSummary,
    #[serde(default)]
    pub protocols: Vec<ProtocolRequests>,
    #[serde(default)]
    pub domains: Vec<DomainTraffic>,
    #[serde(default)]
    pub methods: Vec<MethodRequests>,
    #[serde(default)]
    pub performance: PerformanceStats,
    #[serde(default)]
    pub anomalies: Vec<Anomaly>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub total_requests: u64,
    pub total_bytes: u64,
    pub duration: f64,
    pub avg_request_size: u64,
    pub requests_per_second: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolRequests {
    pub name: String,
    pub requests: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainTraffic {
    pub domain: String,
    pub requests: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MethodRequests {
    pub method: String,
    pub requests: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub avg_response_time: f64,
    pub max_response_time: f64,
    pub min_response_time: f64,
    pub avg_response_size: u64,
}

/// A single detected (or synthesized) anomaly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Marks entries synthesized by the fallback generator. Real engine
    /// output never sets this.
    #[serde(default)]
    pub placeholder: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
}
