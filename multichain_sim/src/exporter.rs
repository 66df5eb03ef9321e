//! Measurement output: per-checkpoint node snapshots, flat-file sinks and
//! the JSON run export.

use crate::error::SimError;
use crate::runner::RunReport;
use multichain_env::Identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// State of one non-bootstrap node at a measurement instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub identity: Identity,

    /// Blocks held by the node
    pub block_count: usize,

    /// Distance between the node's local ranking and the ground truth
    pub ranking_deviation: f64,

    /// Fraction of peer pairs the node orders like the ground truth
    pub ordering_agreement: f64,

    /// Inbound messages served, per sender (final measurement only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_counters: Option<BTreeMap<Identity, u64>>,
}

impl NodeSnapshot {
    /// Total inbound messages served, if recorded.
    pub fn requests_served(&self) -> Option<u64> {
        self.request_counters.as_ref().map(|c| c.values().sum())
    }
}

/// Kind of measurement pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementKind {
    /// Periodic checkpoint
    Checkpoint,

    /// Single terminal pass
    Final,
}

/// One measurement pass over every non-bootstrap node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub kind: MeasurementKind,

    /// Logical time the measurement reflects
    pub time: u64,

    pub nodes: Vec<NodeSnapshot>,
}

/// Receives measurement passes as the run produces them.
pub trait MeasurementSink {
    fn record(&mut self, measurement: &Measurement) -> Result<(), SimError>;
}

impl<A: MeasurementSink, B: MeasurementSink> MeasurementSink for (A, B) {
    fn record(&mut self, measurement: &Measurement) -> Result<(), SimError> {
        self.0.record(measurement)?;
        self.1.record(measurement)
    }
}

impl<S: MeasurementSink + ?Sized> MeasurementSink for &mut S {
    fn record(&mut self, measurement: &Measurement) -> Result<(), SimError> {
        (**self).record(measurement)
    }
}

/// Keeps every measurement in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub measurements: Vec<Measurement>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checkpoint measurements, in order.
    pub fn checkpoints(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements
            .iter()
            .filter(|m| m.kind == MeasurementKind::Checkpoint)
    }

    /// The final measurement, if the run finished.
    pub fn final_measurement(&self) -> Option<&Measurement> {
        self.measurements
            .iter()
            .find(|m| m.kind == MeasurementKind::Final)
    }
}

impl MeasurementSink for MemorySink {
    fn record(&mut self, measurement: &Measurement) -> Result<(), SimError> {
        self.measurements.push(measurement.clone());
        Ok(())
    }
}

/// Writes line-oriented data files into a log directory.
///
/// - `blocks.dat`: `time` then the block count of each node
/// - `ranking.dat`: `time` then the ranking deviation of each node
/// - `load.dat`: `time` then the requests served by each node (final only)
///
/// One line per measurement, values space separated, nodes in identity order.
pub struct FileSink {
    blocks: BufWriter<File>,
    ranking: BufWriter<File>,
    load: BufWriter<File>,
}

impl FileSink {
    /// Creates `log_dir` if needed and truncates the data files.
    pub fn create<P: AsRef<Path>>(log_dir: P) -> Result<Self, SimError> {
        let dir = log_dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            blocks: BufWriter::new(File::create(dir.join("blocks.dat"))?),
            ranking: BufWriter::new(File::create(dir.join("ranking.dat"))?),
            load: BufWriter::new(File::create(dir.join("load.dat"))?),
        })
    }
}

fn write_line<W: Write, T: std::fmt::Display>(
    out: &mut W,
    time: u64,
    values: impl Iterator<Item = T>,
) -> std::io::Result<()> {
    write!(out, "{}", time)?;
    for value in values {
        write!(out, " {}", value)?;
    }
    writeln!(out)
}

impl MeasurementSink for FileSink {
    fn record(&mut self, m: &Measurement) -> Result<(), SimError> {
        write_line(&mut self.blocks, m.time, m.nodes.iter().map(|n| n.block_count))?;
        write_line(
            &mut self.ranking,
            m.time,
            m.nodes.iter().map(|n| format!("{:.6}", n.ranking_deviation)),
        )?;

        if m.kind == MeasurementKind::Final {
            write_line(
                &mut self.load,
                m.time,
                m.nodes.iter().map(|n| n.requests_served().unwrap_or(0)),
            )?;
            self.blocks.flush()?;
            self.ranking.flush()?;
            self.load.flush()?;
        }
        Ok(())
    }
}

/// Complete run export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Topology or ledger source name
    pub source: String,

    /// Run summary
    pub report: RunReport,

    /// All measurements, in emission order
    pub measurements: Vec<Measurement>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(source: &str, report: RunReport, measurements: Vec<Measurement>) -> Self {
        Self {
            source: source.to_string(),
            report,
            measurements,
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(seed: u64, blocks: usize, with_counters: bool) -> NodeSnapshot {
        NodeSnapshot {
            identity: Identity::from_seed(seed),
            block_count: blocks,
            ranking_deviation: 0.25,
            ordering_agreement: 1.0,
            request_counters: with_counters
                .then(|| BTreeMap::from([(Identity::from_seed(9), 3), (Identity::from_seed(8), 2)])),
        }
    }

    #[test]
    fn test_file_sink_layout() {
        let dir = std::env::temp_dir().join(format!("multichain-sink-{}", std::process::id()));
        let mut sink = FileSink::create(&dir).unwrap();

        sink.record(&Measurement {
            kind: MeasurementKind::Checkpoint,
            time: 0,
            nodes: vec![snapshot(1, 4, false), snapshot(2, 6, false)],
        })
        .unwrap();
        sink.record(&Measurement {
            kind: MeasurementKind::Final,
            time: 1200,
            nodes: vec![snapshot(1, 5, true), snapshot(2, 7, true)],
        })
        .unwrap();

        let blocks = fs::read_to_string(dir.join("blocks.dat")).unwrap();
        assert_eq!(blocks, "0 4 6\n1200 5 7\n");

        let ranking = fs::read_to_string(dir.join("ranking.dat")).unwrap();
        assert_eq!(ranking.lines().next(), Some("0 0.250000 0.250000"));

        let load = fs::read_to_string(dir.join("load.dat")).unwrap();
        assert_eq!(load, "1200 5 5\n");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_memory_sink_and_tee() {
        let mut first = MemorySink::new();
        let mut second = MemorySink::new();
        let measurement = Measurement {
            kind: MeasurementKind::Final,
            time: 10,
            nodes: vec![snapshot(1, 1, true)],
        };

        (&mut first, &mut second).record(&measurement).unwrap();
        assert_eq!(first.final_measurement(), Some(&measurement));
        assert_eq!(second.measurements.len(), 1);
        assert_eq!(first.checkpoints().count(), 0);
        assert_eq!(measurement.nodes[0].requests_served(), Some(5));
    }
}
