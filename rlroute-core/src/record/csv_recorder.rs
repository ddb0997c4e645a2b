use super::{Record, RecordValue, Recorder};
use anyhow::Result;
use chrono::Local;
use csv::{Writer, WriterBuilder};
use std::{fs::File, path::Path};

/// Writes records into a CSV file in long format.
///
/// Every entry of a record becomes one row `step,time,key,value`. Array values
/// are expanded into one row per element with keys `key-0`, `key-1`, ...
pub struct CsvRecorder {
    wtr: Option<Writer<File>>,
}

impl CsvRecorder {
    /// Opens `path` for writing and emits the header row.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut wtr = WriterBuilder::new()
            .has_headers(false)
            .from_writer(File::create(path)?);
        wtr.write_record(["step", "time", "key", "value"])?;
        Ok(Self { wtr: Some(wtr) })
    }
}

impl Recorder for CsvRecorder {
    fn write(&mut self, step: usize, record: Record) -> Result<()> {
        let wtr = match self.wtr.as_mut() {
            Some(wtr) => wtr,
            None => {
                log::warn!("CsvRecorder::write() called after close(), record dropped");
                return Ok(());
            }
        };
        let time = Local::now().to_rfc3339();
        let step = step.to_string();

        for k in record.sorted_keys() {
            match record.get(k) {
                Some(RecordValue::Scalar(v)) => {
                    wtr.write_record([step.as_str(), time.as_str(), k.as_str(), v.to_string().as_str()])?
                }
                Some(RecordValue::Array1(vs)) => {
                    for (i, v) in vs.iter().enumerate() {
                        let key = format!("{}-{}", k, i);
                        wtr.write_record([step.as_str(), time.as_str(), key.as_str(), v.to_string().as_str()])?;
                    }
                }
                Some(RecordValue::DateTime(t)) => {
                    wtr.write_record([step.as_str(), time.as_str(), k.as_str(), t.to_rfc3339().as_str()])?
                }
                Some(RecordValue::String(s)) => {
                    wtr.write_record([step.as_str(), time.as_str(), k.as_str(), s.as_str()])?
                }
                None => {}
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(wtr) = self.wtr.as_mut() {
            wtr.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut wtr) = self.wtr.take() {
            wtr.flush()?;
        }
        Ok(())
    }
}

impl Drop for CsvRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Failed to close CsvRecorder: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_long_format() -> Result<()> {
        let dir = TempDir::new("csv_recorder")?;
        let path = dir.path().join("log.csv");
        let mut recorder = CsvRecorder::new(&path)?;

        let mut record = Record::from_scalar("reward", 1.5);
        record.insert("q", RecordValue::Array1(vec![0.25, 0.5]));
        recorder.write(3, record)?;
        recorder.close()?;
        // ignored after close
        recorder.write(4, Record::from_scalar("reward", 0.0))?;

        let mut rdr = csv::Reader::from_path(&path)?;
        let rows = rdr
            .records()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|r| (r[0].to_string(), r[2].to_string(), r[3].to_string()))
            .collect::<Vec<_>>();

        assert_eq!(
            rows,
            vec![
                ("3".to_string(), "q-0".to_string(), "0.25".to_string()),
                ("3".to_string(), "q-1".to_string(), "0.5".to_string()),
                ("3".to_string(), "reward".to_string(), "1.5".to_string()),
            ]
        );
        Ok(())
    }
}
