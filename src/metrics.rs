//! Registro de rendimiento append-only en formato JSON Lines.
//!
//! Cada petición de debate escribe una línea; el endpoint de métricas lee las
//! N más recientes y calcula estadísticas agregadas. El registro es
//! best-effort: un fallo de escritura se loguea y no afecta a la respuesta.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub timestamp: f64,
    pub datetime: String,
    pub response_time_seconds: f64,
    pub confidence_score: Option<f64>,
    pub message_length: usize,
    pub success: bool,
    pub error: Option<String>,
}

impl PerformanceRecord {
    pub fn now(
        response_time_seconds: f64,
        confidence_score: Option<f64>,
        message_length: usize,
        success: bool,
        error: Option<String>,
    ) -> Self {
        let now = Local::now();
        Self {
            timestamp: now.timestamp_millis() as f64 / 1000.0,
            datetime: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            response_time_seconds: round3(response_time_seconds),
            confidence_score: confidence_score.map(round3),
            message_length,
            success,
            error,
        }
    }
}

/// Estadísticas agregadas sobre los registros leídos.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceStats {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub success_rate_percent: f64,
    pub average_response_time_seconds: f64,
    pub average_confidence_score: f64,
}

#[derive(Debug)]
pub struct PerformanceLog {
    path: PathBuf,
    // Serializa las escrituras concurrentes de líneas al mismo fichero.
    write_lock: Mutex<()>,
}

impl PerformanceLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Añade un registro al final del fichero. Nunca devuelve error al
    /// llamante: el registro de métricas no puede tumbar una petición.
    pub fn append(&self, record: &PerformanceRecord) {
        if let Err(e) = self.try_append(record) {
            error!("No se pudieron registrar las métricas de rendimiento: {e}");
        }
    }

    fn try_append(&self, record: &PerformanceRecord) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Lee los últimos `limit` registros, descartando líneas malformadas.
    pub fn read_recent(&self, limit: usize) -> Vec<PerformanceRecord> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };

        let records: Vec<PerformanceRecord> = raw
            .lines()
            .filter_map(|line| serde_json::from_str(line.trim()).ok())
            .collect();

        let skip = records.len().saturating_sub(limit);
        records.into_iter().skip(skip).collect()
    }

    /// Estadísticas básicas sobre un conjunto de registros.
    pub fn compute_stats(records: &[PerformanceRecord]) -> Option<PerformanceStats> {
        if records.is_empty() {
            return None;
        }

        let successful: Vec<&PerformanceRecord> =
            records.iter().filter(|r| r.success).collect();

        let avg_response_time = if successful.is_empty() {
            0.0
        } else {
            successful.iter().map(|r| r.response_time_seconds).sum::<f64>()
                / successful.len() as f64
        };

        let with_confidence: Vec<f64> = successful
            .iter()
            .filter_map(|r| r.confidence_score)
            .collect();
        let avg_confidence = if with_confidence.is_empty() {
            0.0
        } else {
            with_confidence.iter().sum::<f64>() / with_confidence.len() as f64
        };

        Some(PerformanceStats {
            total_requests: records.len(),
            successful_requests: successful.len(),
            success_rate_percent: round2(successful.len() as f64 / records.len() as f64 * 100.0),
            average_response_time_seconds: round3(avg_response_time),
            average_confidence_score: round3(avg_confidence),
        })
    }

    /// Cuerpo completo del endpoint de métricas.
    pub fn metrics_payload(&self, limit: usize) -> serde_json::Value {
        let records = self.read_recent(limit);
        let stats = Self::compute_stats(&records);
        json!({
            "metrics": records,
            "statistics": stats,
            "total_entries": records.len(),
        })
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(success: bool, latency: f64, confidence: Option<f64>) -> PerformanceRecord {
        PerformanceRecord::now(latency, confidence, 42, success, None)
    }

    #[test]
    fn append_then_read_recent_returns_last_n() {
        let dir = tempdir().unwrap();
        let log = PerformanceLog::new(dir.path().join("perf.jsonl"));

        for i in 0..5 {
            log.append(&record(true, i as f64, Some(0.85)));
        }

        let recent = log.read_recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].response_time_seconds, 2.0);
        assert_eq!(recent[2].response_time_seconds, 4.0);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("perf.jsonl");
        let log = PerformanceLog::new(&path);

        log.append(&record(true, 1.0, Some(0.85)));
        std::fs::write(
            &path,
            format!("{}\nesto no es json\n", std::fs::read_to_string(&path).unwrap().trim()),
        )
        .unwrap();
        log.append(&record(false, 2.0, None));

        assert_eq!(log.read_recent(100).len(), 2);
    }

    #[test]
    fn stats_aggregate_only_successful_records() {
        let records = vec![
            record(true, 1.0, Some(0.8)),
            record(true, 3.0, Some(0.9)),
            record(false, 10.0, None),
        ];
        let stats = PerformanceLog::compute_stats(&records).unwrap();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.successful_requests, 2);
        assert_eq!(stats.success_rate_percent, 66.67);
        assert_eq!(stats.average_response_time_seconds, 2.0);
        assert!((stats.average_confidence_score - 0.85).abs() < 1e-9);
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempdir().unwrap();
        let log = PerformanceLog::new(dir.path().join("no_existe.jsonl"));
        assert!(log.read_recent(10).is_empty());
        assert!(PerformanceLog::compute_stats(&[]).is_none());
    }
}
