use std::io::Write;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::metrics::{CpuStatus, DeviceStatus, SystemInfo, SystemSnapshot};
use crate::sinks::Sink;

/// CSV feed of flattened snapshots.
///
/// Columns are fixed by the first snapshot. Per-process data is left out
/// since the process list changes every tick.
pub struct FlatSink<W: Write> {
    writer: W,
    columns: Vec<String>,
}

impl<W: Write> FlatSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            columns: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Sink for FlatSink<W> {
    fn emit_header(&mut self, info: &SystemInfo) -> Result<()> {
        let fields = flatten(info);
        let keys: Vec<&str> = fields.iter().map(|(key, _)| key.as_str()).collect();
        let values: Vec<String> = fields.iter().map(|(_, value)| csv_cell(value)).collect();

        writeln!(self.writer, "# {}", keys.join(","))?;
        writeln!(self.writer, "# {}", values.join(","))?;
        self.writer.flush()?;
        Ok(())
    }

    fn emit(&mut self, snapshot: &SystemSnapshot, first_tick: bool) -> Result<()> {
        let fields = flatten_snapshot(snapshot);

        if first_tick || self.columns.is_empty() {
            self.columns = fields.iter().map(|(key, _)| key.clone()).collect();
            writeln!(self.writer, "{}", self.columns.join(","))?;
        }

        let row: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                fields
                    .iter()
                    .find(|(key, _)| key == column)
                    .map(|(_, value)| csv_cell(value))
                    .unwrap_or_default()
            })
            .collect();
        writeln!(self.writer, "{}", row.join(","))?;
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct FlatRow<'a> {
    timestamp: i64,
    cpu: &'a CpuStatus,
    devices: &'a [DeviceStatus],
}

fn flatten_snapshot(snapshot: &SystemSnapshot) -> Vec<(String, String)> {
    flatten(&FlatRow {
        timestamp: snapshot.timestamp,
        cpu: &snapshot.cpu,
        devices: &snapshot.devices,
    })
}

/// Flattens a JSON tree into `(path, value)` pairs in document order.
/// Nested keys are joined with `.`, array elements use their position, and
/// nulls become empty strings.
pub fn flatten<T: Serialize + ?Sized>(value: &T) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    match serde_json::to_value(value) {
        Ok(value) => flatten_into(&value, None, &mut fields),
        Err(e) => log::debug!("Cannot flatten value: {}", e),
    }
    fields
}

fn flatten_into(value: &Value, prefix: Option<&str>, fields: &mut Vec<(String, String)>) {
    let path = |key: &str| match prefix {
        Some(prefix) => format!("{}.{}", prefix, key),
        None => key.to_string(),
    };

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(child, Some(&path(key)), fields);
            }
        }
        Value::Array(items) => {
            for (position, child) in items.iter().enumerate() {
                flatten_into(child, Some(&path(&position.to_string())), fields);
            }
        }
        Value::Null => fields.push((prefix.unwrap_or_default().to_string(), String::new())),
        Value::String(text) => fields.push((prefix.unwrap_or_default().to_string(), text.clone())),
        other => fields.push((prefix.unwrap_or_default().to_string(), other.to_string())),
    }
}

fn csv_cell(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{CpuInfo, ProcessRecord};
    use serde_json::json;

    fn snapshot(cpu_percent: f32) -> SystemSnapshot {
        SystemSnapshot {
            timestamp: 10,
            cpu: CpuStatus {
                cpu_percent,
                memory_percent: 50.0,
            },
            devices: vec![DeviceStatus {
                index: 0,
                utilization_gpu: Some(87),
                ..Default::default()
            }],
            processes: vec![ProcessRecord {
                pid: 1,
                ..Default::default()
            }],
        }
    }

    #[test]
    fn flatten_joins_nested_keys_and_positions() {
        let fields = flatten(&json!({
            "cpu": {"name": "x"},
            "devices": [{"index": 0}, {"index": 1}],
            "fan": null,
        }));
        assert_eq!(
            fields,
            vec![
                ("cpu.name".to_string(), "x".to_string()),
                ("devices.0.index".to_string(), "0".to_string()),
                ("devices.1.index".to_string(), "1".to_string()),
                ("fan".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn csv_cell_quotes_separators() {
        assert_eq!(csv_cell("Intel(R) Xeon(R), 8 cores"), "\"Intel(R) Xeon(R), 8 cores\"");
        assert_eq!(csv_cell("plain"), "plain");
    }

    #[test]
    fn header_is_commented_out() {
        let mut sink = FlatSink::new(Vec::new());
        let info = SystemInfo {
            host_name: "node1".to_string(),
            os: "Linux".to_string(),
            cpu: CpuInfo::default(),
            devices: Vec::new(),
        };
        sink.emit_header(&info).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("# host_name,os,cpu.name"));
        assert!(lines[1].starts_with("# node1,Linux,"));
    }

    #[test]
    fn column_row_then_one_row_per_tick() {
        let mut sink = FlatSink::new(Vec::new());
        sink.emit(&snapshot(10.0), true).unwrap();
        sink.emit(&snapshot(20.0), false).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(
            lines[0].starts_with("timestamp,cpu.cpu_percent,cpu.memory_percent,devices.0.index")
        );
        assert!(!lines[0].contains("processes"));
        assert!(lines[1].starts_with("10,10.0,50.0,0,"));
        assert!(lines[2].starts_with("10,20.0,50.0,0,"));
    }
}
