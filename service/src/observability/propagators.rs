use hyper::HeaderMap;
use opentelemetry::propagation::Extractor;

/// Reads W3C trace context (`traceparent`, `tracestate`) from incoming request headers.
pub struct HyperHeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HyperHeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}
