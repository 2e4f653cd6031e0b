use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;

use simbridge_sys::{ModelVariant, Sample};
use tracing::{info, warn};

use crate::driver::{LoopReport, StepObserver, StepRecord};
use crate::error::ConfigError;

/// Writes `time_s,<inputs>,<outputs>` CSV rows for completed steps.
///
/// With a non-zero `rate_hz` at most one row is written per `1 / rate_hz`
/// simulated seconds. The first step is always recorded.
pub struct SampleRecorder<V: ModelVariant, W: Write + Send> {
    writer: W,
    period_s: Option<f64>,
    next_due_s: Option<f64>,
    rows: u64,
    failed: bool,
    _variant: PhantomData<fn() -> V>,
}

impl<V: ModelVariant> SampleRecorder<V, BufWriter<File>> {
    /// Creates (or truncates) a CSV file at `path`, creating parent directories.
    pub fn create(path: impl AsRef<Path>, rate_hz: f64) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        info!(path = %path.display(), variant = V::NAME, "recording samples");
        Self::new(BufWriter::new(file), rate_hz)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))
    }
}

impl<V: ModelVariant, W: Write + Send> SampleRecorder<V, W> {
    pub fn new(writer: W, rate_hz: f64) -> Result<Self, ConfigError> {
        if !rate_hz.is_finite() || rate_hz < 0.0 {
            return Err(ConfigError::RecordRate(rate_hz));
        }
        let mut recorder = Self {
            writer,
            period_s: (rate_hz > 0.0).then(|| 1.0 / rate_hz),
            next_due_s: None,
            rows: 0,
            failed: false,
            _variant: PhantomData,
        };
        recorder.write_header();
        Ok(recorder)
    }

    /// CSV header for variant `V`.
    pub fn header() -> String {
        let mut columns = vec!["time_s"];
        columns.extend_from_slice(<V::Input as Sample>::FIELDS);
        columns.extend_from_slice(<V::Output as Sample>::FIELDS);
        columns.join(",")
    }

    /// Data rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(mut self) -> W {
        if let Err(err) = self.writer.flush() {
            warn!(?err, "failed to flush sample recording");
        }
        self.writer
    }

    fn write_header(&mut self) {
        let header = Self::header();
        self.write_line(&header);
    }

    fn write_line(&mut self, line: &str) {
        if self.failed {
            return;
        }
        if let Err(err) = writeln!(self.writer, "{line}") {
            warn!(?err, "sample recording failed, further rows are dropped");
            self.failed = true;
        }
    }

    fn due(&mut self, time_s: f64) -> bool {
        let Some(period_s) = self.period_s else {
            return true;
        };
        match self.next_due_s {
            Some(next) if time_s + 1e-9 < next => false,
            _ => {
                self.next_due_s = Some(time_s + period_s);
                true
            }
        }
    }
}

impl<V: ModelVariant, W: Write + Send> StepObserver<V> for SampleRecorder<V, W> {
    fn on_step(&mut self, record: &StepRecord<'_, V>) {
        if !self.due(record.time_s) {
            return;
        }
        let mut line = record.time_s.to_string();
        for index in 0..<V::Input as Sample>::FIELDS.len() {
            line.push(',');
            line.push_str(&record.input.get(index).unwrap_or(f64::NAN).to_string());
        }
        for index in 0..<V::Output as Sample>::FIELDS.len() {
            line.push(',');
            line.push_str(&record.output.get(index).unwrap_or(f64::NAN).to_string());
        }
        self.write_line(&line);
        if !self.failed {
            self.rows += 1;
        }
    }

    fn on_finish(&mut self, _report: &LoopReport) {
        if let Err(err) = self.writer.flush() {
            warn!(?err, "failed to flush sample recording");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simbridge_sys::{Crash, CrashInput, CrashOutput, Distance, DistanceInput, DistanceOutput};

    fn record<V: ModelVariant, W: Write + Send>(
        recorder: &mut SampleRecorder<V, W>,
        time_s: f64,
        input: &V::Input,
        output: &V::Output,
    ) {
        recorder.on_step(&StepRecord {
            iteration: 0,
            time_s,
            input,
            output,
        });
    }

    /// Accepts writes but refuses to flush.
    #[derive(Default)]
    struct StuckSink {
        bytes: Vec<u8>,
    }

    impl Write for StuckSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "device gone"))
        }
    }

    #[test]
    fn failed_flush_still_returns_writer() {
        let mut recorder = SampleRecorder::<Distance, _>::new(StuckSink::default(), 0.0).unwrap();
        record(
            &mut recorder,
            0.0,
            &DistanceInput { speed: 150.0 },
            &DistanceOutput { distance: 15.0 },
        );
        let sink = recorder.into_inner();
        let text = String::from_utf8(sink.bytes).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn header_lists_inputs_then_outputs() {
        assert_eq!(
            SampleRecorder::<Crash, Vec<u8>>::header(),
            "time_s,speed,curr,ay,entropy_diff,crash_flag"
        );
    }

    #[test]
    fn writes_one_row_per_step() {
        let mut recorder = SampleRecorder::<Distance, _>::new(Vec::new(), 0.0).unwrap();
        record(
            &mut recorder,
            0.0,
            &DistanceInput { speed: 150.0 },
            &DistanceOutput { distance: 15.0 },
        );
        record(
            &mut recorder,
            0.1,
            &DistanceInput { speed: 180.0 },
            &DistanceOutput { distance: 33.0 },
        );
        assert_eq!(recorder.rows(), 2);
        let text = String::from_utf8(recorder.into_inner()).unwrap();
        assert_eq!(text, "time_s,speed,distance\n0,150,15\n0.1,180,33\n");
    }

    #[test]
    fn rate_limit_skips_rows() {
        let mut recorder = SampleRecorder::<Crash, _>::new(Vec::new(), 2.0).unwrap();
        for step in 0..10 {
            record(
                &mut recorder,
                step as f64 * 0.1,
                &CrashInput::default(),
                &CrashOutput::default(),
            );
        }
        assert_eq!(recorder.rows(), 2);
    }

    #[test]
    fn negative_rate_is_rejected() {
        assert!(matches!(
            SampleRecorder::<Distance, _>::new(Vec::new(), -1.0),
            Err(ConfigError::RecordRate(_))
        ));
    }

    #[test]
    fn create_makes_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("out.csv");
        let recorder = SampleRecorder::<Distance, _>::create(&path, 0.0).unwrap();
        drop(recorder.into_inner());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "time_s,speed,distance\n"
        );
    }
}
