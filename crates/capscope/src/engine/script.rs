//! Subprocess-backed analysis engine.
//!
//! Invokes the external engine script for a file's declared type as
//! `python_bin script_path file_path config_json`, with a wall-clock
//! timeout and captured stdio.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::{fallback, AnalysisEngine};
use crate::config::Settings;
use crate::error::AnalysisError;
use crate::model::{AnalysisConfig, FileType, UploadedFile};
use crate::report::AnalysisResult;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_EXPRESSION: &str = "import scapy; print('OK')";
const EXCERPT_LIMIT: usize = 512;

/// Maps a declared file type to its engine script.
fn script_for(file_type: FileType) -> &'static str {
    if file_type.is_packet_capture() {
        "analyze_pcap.py"
    } else {
        "analyze_har.py"
    }
}

/// Bounded excerpt of raw engine output, kept on parse failures for
/// inspection.
fn excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut out: String = text.chars().take(EXCERPT_LIMIT).collect();
    if text.chars().count() > EXCERPT_LIMIT {
        out.push('…');
    }
    out
}

/// The real analysis engine: a Python script per declared file type.
///
/// Availability is probed once per engine instance; when the interpreter
/// or its capture library is missing, jobs transparently get fallback
/// results instead of failing.
pub struct ScriptEngine {
    python_bin: String,
    scripts_dir: PathBuf,
    timeout: Duration,
    availability: OnceCell<bool>,
}

impl ScriptEngine {
    pub fn new(settings: &Settings) -> Self {
        Self {
            python_bin: settings.python_bin.clone(),
            scripts_dir: settings.scripts_dir.clone(),
            timeout: settings.analysis_timeout,
            availability: OnceCell::new(),
        }
    }

    /// Pre-seeds the availability probe, bypassing the capability check.
    #[cfg(test)]
    fn with_availability(self, available: bool) -> Self {
        Self {
            availability: OnceCell::new_with(Some(available)),
            ..self
        }
    }

    /// Checks whether the interpreter and its capture library are usable.
    async fn probe(&self) -> bool {
        let mut cmd = Command::new(&self.python_bin);
        cmd.args(["-c", PROBE_EXPRESSION])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                debug!("engine probe could not start {}: {}", self.python_bin, e);
                return false;
            }
        };

        match tokio::time::timeout(PROBE_TIMEOUT, child.wait_with_output()).await {
            Ok(Ok(output)) => output.status.success(),
            Ok(Err(e)) => {
                debug!("engine probe failed: {}", e);
                false
            }
            Err(_) => {
                debug!("engine probe timed out after {:?}", PROBE_TIMEOUT);
                false
            }
        }
    }

    async fn run_script(
        &self,
        script: &Path,
        file: &UploadedFile,
        config_json: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        debug!(
            "invoking {} {} {}",
            self.python_bin,
            script.display(),
            file.file_path
        );

        let mut cmd = Command::new(&self.python_bin);
        cmd.arg(script)
            .arg(&file.file_path)
            .arg(config_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Reaps the child when the wait future is dropped on timeout.
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|source| AnalysisError::ProcessSpawn { source })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(AnalysisError::ProcessIo { source }),
            Err(_) => {
                return Err(AnalysisError::ProcessTimeout {
                    timeout: self.timeout,
                })
            }
        };

        if !output.status.success() {
            return Err(AnalysisError::Execution {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        AnalysisResult::from_engine_output(file.file_type, &output.stdout).map_err(|source| {
            AnalysisError::ResultParse {
                excerpt: excerpt(&output.stdout),
                source,
            }
        })
    }
}

#[async_trait]
impl AnalysisEngine for ScriptEngine {
    async fn analyze(
        &self,
        file: &UploadedFile,
        config: &AnalysisConfig,
    ) -> Result<AnalysisResult, AnalysisError> {
        let available = *self.availability.get_or_init(|| self.probe()).await;
        if !available {
            warn!(
                "analysis engine unavailable, generating fallback result for {}",
                file.id
            );
            return Ok(fallback::generate(file));
        }

        let script = self.scripts_dir.join(script_for(file.file_type));
        if !script.exists() {
            return Err(AnalysisError::ScriptMissing { path: script });
        }

        let config_json =
            serde_json::to_string(config).map_err(AnalysisError::ConfigSerialize)?;

        self.run_script(&script, file, &config_json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PCAP_JSON: &str = r#"{"summary":{"totalPackets":10,"totalBytes":100,"duration":1.0,"avgPacketSize":10,"packetsPerSecond":10.0}}"#;

    /// Engine whose "python" is `sh`, running shell scripts named like the
    /// real engine scripts. Availability is pre-seeded so the probe (which
    /// would fail under `sh`) is bypassed.
    fn shell_engine(dir: &Path, timeout: Duration) -> ScriptEngine {
        let settings = Settings {
            python_bin: "sh".to_string(),
            scripts_dir: dir.to_path_buf(),
            analysis_timeout: timeout,
            ..Settings::default()
        };
        ScriptEngine::new(&settings).with_availability(true)
    }

    fn write_script(dir: &Path, name: &str, body: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        writeln!(f, "{}", body).unwrap();
    }

    fn pcap_file(dir: &Path) -> UploadedFile {
        let path = dir.join("trace.pcap");
        std::fs::write(&path, b"capture").unwrap();
        UploadedFile::new(
            "trace.pcap",
            FileType::Pcap,
            path.to_string_lossy().to_string(),
            7,
        )
    }

    #[tokio::test]
    async fn test_successful_run_parses_result() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "analyze_pcap.py",
            &format!("echo '{}'", PCAP_JSON),
        );

        let engine = shell_engine(dir.path(), Duration::from_secs(5));
        let file = pcap_file(dir.path());
        let result = engine
            .analyze(&file, &AnalysisConfig::default())
            .await
            .unwrap();

        let AnalysisResult::PacketCapture(report) = result else {
            panic!("expected packet capture report");
        };
        assert_eq!(report.summary.total_packets, 10);
    }

    #[tokio::test]
    async fn test_script_selection_by_type() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "analyze_har.py",
            r#"echo '{"summary":{"totalRequests":3,"totalBytes":30,"duration":1.0,"avgRequestSize":10,"requestsPerSecond":3.0}}'"#,
        );

        let engine = shell_engine(dir.path(), Duration::from_secs(5));
        let path = dir.path().join("session.har");
        std::fs::write(&path, b"{}").unwrap();
        let file = UploadedFile::new(
            "session.har",
            FileType::Har,
            path.to_string_lossy().to_string(),
            2,
        );

        let result = engine
            .analyze(&file, &AnalysisConfig::default())
            .await
            .unwrap();
        assert!(matches!(result, AnalysisResult::RequestArchive(_)));
    }

    #[tokio::test]
    async fn test_missing_script() {
        let dir = tempfile::tempdir().unwrap();
        let engine = shell_engine(dir.path(), Duration::from_secs(5));
        let file = pcap_file(dir.path());

        let err = engine
            .analyze(&file, &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ScriptMissing { .. }));
        assert_eq!(err.kind(), "script_missing");
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "analyze_pcap.py", "true");

        let settings = Settings {
            python_bin: "/nonexistent/bin/python3".to_string(),
            scripts_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let engine = ScriptEngine::new(&settings).with_availability(true);
        let file = pcap_file(dir.path());

        let err = engine
            .analyze(&file, &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ProcessSpawn { .. }));
    }

    #[tokio::test]
    async fn test_non_zero_exit_captures_stderr() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "analyze_pcap.py",
            "echo 'malformed capture header' >&2; exit 3",
        );

        let engine = shell_engine(dir.path(), Duration::from_secs(5));
        let file = pcap_file(dir.path());

        let err = engine
            .analyze(&file, &AnalysisConfig::default())
            .await
            .unwrap_err();
        match err {
            AnalysisError::Execution { code, stderr } => {
                assert_eq!(code, 3);
                assert!(stderr.contains("malformed capture header"));
            }
            other => panic!("expected Execution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unparsable_output() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "analyze_pcap.py", "echo 'this is not json'");

        let engine = shell_engine(dir.path(), Duration::from_secs(5));
        let file = pcap_file(dir.path());

        let err = engine
            .analyze(&file, &AnalysisConfig::default())
            .await
            .unwrap_err();
        match err {
            AnalysisError::ResultParse { excerpt, .. } => {
                assert!(excerpt.contains("this is not json"));
            }
            other => panic!("expected ResultParse, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_engine() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "analyze_pcap.py", "sleep 5");

        let engine = shell_engine(dir.path(), Duration::from_millis(200));
        let file = pcap_file(dir.path());

        let started = std::time::Instant::now();
        let err = engine
            .analyze(&file, &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ProcessTimeout { .. }));
        // The job settles at the timeout, not at the engine's leisure.
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_unavailable_engine_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            python_bin: "/nonexistent/bin/python3".to_string(),
            scripts_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let engine = ScriptEngine::new(&settings);
        let file = pcap_file(dir.path());

        let result = engine
            .analyze(&file, &AnalysisConfig::default())
            .await
            .unwrap();
        assert!(result.is_fallback());
    }

    #[tokio::test]
    async fn test_availability_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            python_bin: "/nonexistent/bin/python3".to_string(),
            scripts_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let engine = ScriptEngine::new(&settings);
        let file = pcap_file(dir.path());

        engine
            .analyze(&file, &AnalysisConfig::default())
            .await
            .unwrap();
        assert_eq!(engine.availability.get(), Some(&false));

        // Second run reuses the cached probe result.
        let result = engine
            .analyze(&file, &AnalysisConfig::default())
            .await
            .unwrap();
        assert!(result.is_fallback());
    }

    #[test]
    fn test_script_for_type() {
        assert_eq!(script_for(FileType::Pcap), "analyze_pcap.py");
        assert_eq!(script_for(FileType::Cap), "analyze_pcap.py");
        assert_eq!(script_for(FileType::Pcapng), "analyze_pcap.py");
        assert_eq!(script_for(FileType::Har), "analyze_har.py");
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let long = "x".repeat(2000);
        let out = excerpt(long.as_bytes());
        assert_eq!(out.chars().count(), EXCERPT_LIMIT + 1);
        assert!(out.ends_with('…'));

        let short = excerpt(b"short output");
        assert_eq!(short, "short output");
    }
}
