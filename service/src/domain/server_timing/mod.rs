use crate::domain::server_timing::timing::Timing;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub mod timing;

/// Accumulates one `Timing` per tier attempted while resolving an image.
#[derive(Debug, Clone, Default)]
pub struct ServerTiming {
    timings: Vec<Timing>,
}

impl Display for ServerTiming {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = self
            .timings
            .iter()
            .map(|tim| tim.to_string())
            .collect::<Vec<String>>()
            .join(", ");

        write!(f, "{display}")
    }
}

impl ServerTiming {
    pub fn new(timings: Vec<Timing>) -> ServerTiming {
        ServerTiming { timings }
    }

    pub fn record(&mut self, name: &str, duration: Duration, description: Option<String>) {
        self.timings.push(Timing::new(name, duration, description));
    }

    pub fn is_empty(&self) -> bool {
        self.timings.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.timings.iter().map(|t| t.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn server_timing_display() {
        let timing1 = Timing::new("r2", Duration::from_millis(56), Some("miss".to_string()));
        let timing2 = Timing::new("local", Duration::from_millis(3), None);
        let expected_string = format!("{timing1}, {timing2}");

        let server_timing = ServerTiming::new([timing1, timing2].to_vec());
        let formatted_string = format!("{server_timing}");

        assert_eq!(expected_string, formatted_string)
    }

    #[test]
    fn empty_server_timing_displays_nothing() {
        let server_timing = ServerTiming::default();
        assert!(server_timing.is_empty());
        assert_eq!(server_timing.to_string(), "");
    }

    #[test]
    fn records_in_attempt_order() {
        let mut server_timing = ServerTiming::default();
        server_timing.record("r2", Duration::from_millis(12), None);
        server_timing.record("local", Duration::from_millis(1), None);
        assert_eq!(server_timing.names(), vec!["r2", "local"]);
    }
}
