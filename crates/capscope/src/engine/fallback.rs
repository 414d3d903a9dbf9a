//! Fallback result generator.
//!
//! When the external engine is unavailable the pipeline still has to
//! produce a schema-conformant result, derived only from the file size
//! and declared type plus fixed illustrative figures. Every fallback
//! result carries exactly one anomaly with the `placeholder` marker so
//! consumers can tell it apart from real engine output structurally.

use crate::model::{FileType, UploadedFile};
use crate::report::{
    Anomaly, AnalysisResult, ConnectionPackets, ConnectionSummary, DomainTraffic, MethodRequests,
    NetworkPeers, PacketCaptureReport, PacketSummary, PeerPackets, PerformanceStats, PortPackets,
    ProtocolPackets, ProtocolRequests, RequestArchiveReport, RequestSummary, Severity,
    TransportSummary,
};

const PACKET_COUNT: u64 = 1547;
const REQUEST_COUNT: u64 = 145;

/// Generates a deterministic fallback result for the file. Never fails:
/// an unreadable or empty file simply reports zero bytes.
pub fn generate(file: &UploadedFile) -> AnalysisResult {
    let size = std::fs::metadata(&file.file_path)
        .map(|m| m.len())
        .unwrap_or(0);

    match file.file_type {
        FileType::Har => AnalysisResult::RequestArchive(request_archive(size)),
        _ => AnalysisResult::PacketCapture(packet_capture(size)),
    }
}

fn placeholder_anomaly() -> Anomaly {
    Anomaly {
        kind: "fallback_engine".to_string(),
        severity: Severity::Info,
        description: "Synthetic result: the external analysis engine is unavailable".to_string(),
        details: None,
        placeholder: true,
    }
}

fn packet_capture(size: u64) -> PacketCaptureReport {
    PacketCaptureReport {
        summary: PacketSummary {
            total_packets: PACKET_COUNT,
            total_bytes: size,
            duration: 120.5,
            avg_packet_size: size / PACKET_COUNT,
            packets_per_second: 12.8,
        },
        protocols: vec![
            ProtocolPackets {
                name: "TCP".to_string(),
                packets: 1200,
                percentage: 77.6,
            },
            ProtocolPackets {
                name: "UDP".to_string(),
                packets: 300,
                percentage: 19.4,
            },
            ProtocolPackets {
                name: "ICMP".to_string(),
                packets: 47,
                percentage: 3.0,
            },
        ],
        network: NetworkPeers {
            top_sources: vec![
                PeerPackets {
                    ip: "192.168.1.100".to_string(),
                    packets: 456,
                },
                PeerPackets {
                    ip: "192.168.1.105".to_string(),
                    packets: 234,
                },
                PeerPackets {
                    ip: "10.0.0.15".to_string(),
                    packets: 189,
                },
            ],
            top_destinations: vec![
                PeerPackets {
                    ip: "8.8.8.8".to_string(),
                    packets: 245,
                },
                PeerPackets {
                    ip: "1.1.1.1".to_string(),
                    packets: 178,
                },
                PeerPackets {
                    ip: "192.168.1.1".to_string(),
                    packets: 156,
                },
            ],
        },
        transport: TransportSummary {
            tcp_packets: 1200,
            udp_packets: 300,
            icmp_packets: 47,
            top_ports: vec![
                PortPackets {
                    port: 443,
                    packets: 567,
                },
                PortPackets {
                    port: 80,
                    packets: 345,
                },
                PortPackets {
                    port: 53,
                    packets: 234,
                },
                PortPackets {
                    port: 22,
                    packets: 89,
                },
            ],
        },
        connections: ConnectionSummary {
            total_connections: 87,
            top_connections: vec![
                ConnectionPackets {
                    connection: "192.168.1.100:45678->8.8.8.8:53".to_string(),
                    packets: 45,
                },
                ConnectionPackets {
                    connection: "192.168.1.100:443->1.1.1.1:443".to_string(),
                    packets: 234,
                },
            ],
        },
        anomalies: vec![placeholder_anomaly()],
    }
}

fn request_archive(size: u64) -> RequestArchiveReport {
    RequestArchiveReport {
        summary: RequestSummary {
            total_requests: REQUEST_COUNT,
            total_bytes: size,
            duration: 45.2,
            avg_request_size: size / REQUEST_COUNT,
            requests_per_second: 3.2,
        },
        protocols: vec![
            ProtocolRequests {
                name: "HTTPS".to_string(),
                requests: 120,
                percentage: 82.8,
            },
            ProtocolRequests {
                name: "HTTP".to_string(),
                requests: 25,
                percentage: 17.2,
            },
        ],
        domains: vec![
            DomainTraffic {
                domain: "api.example.com".to_string(),
                requests: 45,
                total_bytes: size * 3 / 10,
            },
            DomainTraffic {
                domain: "cdn.example.com".to_string(),
                requests: 38,
                total_bytes: size * 2 / 5,
            },
        ],
        methods: vec![
            MethodRequests {
                method: "GET".to_string(),
                requests: 98,
                percentage: 67.6,
            },
            MethodRequests {
                method: "POST".to_string(),
                requests: 35,
                percentage: 24.1,
            },
            MethodRequests {
                method: "PUT".to_string(),
                requests: 12,
                percentage: 8.3,
            },
        ],
        performance: PerformanceStats {
            avg_response_time: 245.6,
            max_response_time: 1234.5,
            min_response_time: 23.4,
            avg_response_size: size / REQUEST_COUNT,
        },
        anomalies: vec![placeholder_anomaly()],
    }
}
