//! Progress reporting for simulation runs.
//!
//! Observers receive every [`TrajectoryEvent`] of a run synchronously and in
//! registration order. A failing observer is logged and counted; it never
//! affects the simulation or the other observers.

use std::io::Write;

use tracing::{debug, info, warn};

use crate::errors::ObserverError;
use crate::gps::GpsSample;
use crate::models::Trajectory;
use crate::validator::Verdict;

/// Everything that happens during one `simulate` call.
#[derive(Debug, Clone, Copy)]
pub enum TrajectoryEvent<'a> {
    StartRecording {
        polygon_id: Option<&'a str>,
        person_number: u32,
    },
    AttemptStarted {
        attempt: u32,
    },
    /// A backtrack is about to discard the last `segments` segments.
    PauseRecording {
        attempt: u32,
        segments: usize,
    },
    /// Walking resumes at `from_segment`.
    ResumeRecording {
        attempt: u32,
        from_segment: usize,
    },
    AttemptRejected {
        attempt: u32,
        area_ratio: f64,
        verdict: Verdict,
    },
    /// One sample of the accepted trajectory, elevation included.
    DataUpdate {
        index: usize,
        sample: &'a GpsSample,
    },
    Succeeded {
        trajectory: &'a Trajectory,
    },
    Failed {
        attempts: u32,
        last_area_ratio: f64,
    },
    StopRecording,
}

pub trait TrajectoryObserver: Send {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn on_event(&mut self, event: &TrajectoryEvent<'_>) -> Result<(), ObserverError>;
}

/// Registered observers and their failure count.
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<Box<dyn TrajectoryObserver>>,
    failures: usize,
}

impl ObserverSet {
    pub fn push(&mut self, observer: Box<dyn TrajectoryObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Total handler errors since construction.
    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn notify(&mut self, event: &TrajectoryEvent<'_>) {
        for observer in &mut self.observers {
            if let Err(e) = observer.on_event(event) {
                self.failures += 1;
                warn!(observer = observer.name(), error = %e, "Observer failed");
            }
        }
    }
}

/// Logs run progress through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl TrajectoryObserver for TracingObserver {
    fn name(&self) -> &str {
        "tracing"
    }

    fn on_event(&mut self, event: &TrajectoryEvent<'_>) -> Result<(), ObserverError> {
        match *event {
            TrajectoryEvent::StartRecording {
                polygon_id,
                person_number,
            } => info!(polygon = polygon_id.unwrap_or("-"), person_number, "Recording started"),
            TrajectoryEvent::AttemptStarted { attempt } => debug!(attempt, "Attempt started"),
            TrajectoryEvent::PauseRecording { attempt, segments } => {
                debug!(attempt, segments, "Recording paused for backtrack")
            }
            TrajectoryEvent::ResumeRecording {
                attempt,
                from_segment,
            } => debug!(attempt, from_segment, "Recording resumed"),
            TrajectoryEvent::AttemptRejected {
                attempt,
                area_ratio,
                verdict,
            } => debug!(attempt, area_ratio, ?verdict, "Attempt rejected"),
            TrajectoryEvent::DataUpdate { .. } => {}
            TrajectoryEvent::Succeeded { trajectory } => debug!(
                samples = trajectory.samples.len(),
                area_ratio = trajectory.area_ratio,
                attempts = trajectory.attempts,
                "Attempt succeeded"
            ),
            TrajectoryEvent::Failed {
                attempts,
                last_area_ratio,
            } => warn!(attempts, last_area_ratio, "Trajectory failed"),
            TrajectoryEvent::StopRecording => debug!("Recording stopped"),
        }
        Ok(())
    }
}

/// Writes accepted samples as CSV rows.
pub struct CsvObserver<W: Write + Send> {
    writer: csv::Writer<W>,
}

impl<W: Write + Send> CsvObserver<W> {
    pub fn new(out: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(out),
        }
    }

    pub fn into_inner(self) -> Result<W, ObserverError> {
        self.writer
            .into_inner()
            .map_err(|e| ObserverError::Other(e.to_string()))
    }
}

impl<W: Write + Send> TrajectoryObserver for CsvObserver<W> {
    fn name(&self) -> &str {
        "csv"
    }

    fn on_event(&mut self, event: &TrajectoryEvent<'_>) -> Result<(), ObserverError> {
        match event {
            TrajectoryEvent::DataUpdate { sample, .. } => self.writer.serialize(sample)?,
            TrajectoryEvent::StopRecording => self.writer.flush()?,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use time::macros::datetime;

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl TrajectoryObserver for Recorder {
        fn on_event(&mut self, event: &TrajectoryEvent<'_>) -> Result<(), ObserverError> {
            self.0.lock().unwrap().push(format!("{event:?}"));
            Ok(())
        }
    }

    struct Broken;

    impl TrajectoryObserver for Broken {
        fn on_event(&mut self, _event: &TrajectoryEvent<'_>) -> Result<(), ObserverError> {
            Err(ObserverError::Other("boom".to_string()))
        }
    }

    #[test]
    fn test_failures_are_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut set = ObserverSet::default();
        set.push(Box::new(Broken));
        set.push(Box::new(Recorder(log.clone())));

        set.notify(&TrajectoryEvent::AttemptStarted { attempt: 1 });
        set.notify(&TrajectoryEvent::StopRecording);

        assert_eq!(set.failures(), 2);
        assert_eq!(log.lock().unwrap().len(), 2);
        assert!(log.lock().unwrap()[1].contains("StopRecording"));
    }

    #[test]
    fn test_csv_observer_writes_samples() {
        let sample = GpsSample {
            timestamp: datetime!(2024-03-01 10:00 UTC),
            x: 1.5,
            y: 2.5,
            longitude: 120.0,
            latitude: 30.0,
            elevation: Some(12.0),
            accuracy: 4.0,
            signal_strength: 0.8,
            heading: 0.0,
        };
        let mut csv = CsvObserver::new(Vec::new());
        csv.on_event(&TrajectoryEvent::AttemptStarted { attempt: 1 }).unwrap();
        csv.on_event(&TrajectoryEvent::DataUpdate {
            index: 0,
            sample: &sample,
        })
        .unwrap();
        csv.on_event(&TrajectoryEvent::StopRecording).unwrap();

        let text = String::from_utf8(csv.into_inner().unwrap()).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("timestamp,x,y,longitude,latitude,elevation"));
        assert!(lines.next().unwrap().starts_with("2024-03-01T10:00:00Z,1.5,2.5,120.0,30.0,12.0"));
    }
}
