use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::metrics::{SystemInfo, SystemSnapshot};
use crate::sinks::Sink;

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum FeedRecord<'a> {
    System(&'a SystemInfo),
    Status(&'a SystemSnapshot),
}

/// Append-only feed with one JSON object per line
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_record(&mut self, record: &FeedRecord<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> Sink for JsonLinesSink<W> {
    fn emit_header(&mut self, info: &SystemInfo) -> Result<()> {
        self.write_record(&FeedRecord::System(info))
    }

    fn emit(&mut self, snapshot: &SystemSnapshot, _first_tick: bool) -> Result<()> {
        self.write_record(&FeedRecord::Status(snapshot))
    }
}

#[derive(Serialize)]
struct SnapshotFile<'a> {
    system: &'a SystemInfo,
    status: &'a SystemSnapshot,
}

/// Writes a single pretty-printed snapshot to
/// `<output_folder>/snapshot_<host>_<timestamp>.json`
pub fn write_snapshot_file(
    output_folder: &Path,
    info: &SystemInfo,
    snapshot: &SystemSnapshot,
) -> Result<PathBuf> {
    // Create output folder if it doesn't exist
    fs::create_dir_all(output_folder)?;

    let json_data = serde_json::to_string_pretty(&SnapshotFile {
        system: info,
        status: snapshot,
    })?;

    let filename = format!("snapshot_{}_{}.json", info.host_name, snapshot.timestamp);
    let filepath = output_folder.join(filename);

    let mut file = fs::File::create(&filepath)?;
    file.write_all(json_data.as_bytes())?;

    Ok(filepath)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{CpuInfo, CpuStatus, DeviceStatus};
    use serde_json::Value;

    fn info() -> SystemInfo {
        SystemInfo {
            host_name: "node1".to_string(),
            os: "Linux".to_string(),
            cpu: CpuInfo::default(),
            devices: Vec::new(),
        }
    }

    fn snapshot() -> SystemSnapshot {
        SystemSnapshot {
            timestamp: 1_700_000_000,
            cpu: CpuStatus {
                cpu_percent: 12.5,
                memory_percent: 40.0,
            },
            devices: vec![DeviceStatus {
                index: 0,
                utilization_gpu: Some(87),
                ..Default::default()
            }],
            processes: Vec::new(),
        }
    }

    #[test]
    fn writes_one_tagged_line_per_record() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.emit_header(&info()).unwrap();
        sink.emit(&snapshot(), true).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["record"], "system");
        assert_eq!(lines[0]["host_name"], "node1");
        assert_eq!(lines[1]["record"], "status");
        assert_eq!(lines[1]["devices"][0]["utilization_gpu"], 87);
        assert!(lines[1]["devices"][0]["temperature"].is_null());
    }

    #[test]
    fn snapshot_file_lands_in_output_folder() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("snapshots");

        let path = write_snapshot_file(&folder, &info(), &snapshot()).unwrap();

        assert_eq!(path, folder.join("snapshot_node1_1700000000.json"));
        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["system"]["os"], "Linux");
        assert_eq!(written["status"]["cpu"]["cpu_percent"], 12.5);
    }
}
