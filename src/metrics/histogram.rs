use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use hdrhistogram::Histogram;
use hdrhistogram::serialization::{Deserializer, Serializer, V2Serializer};
use std::io::Cursor;

/// Latency samples for one label, retained densely enough to produce
/// percentiles at report time without keeping every raw sample (§4.3:
/// "aggregator retains per-label samples sufficient to produce percentiles").
#[derive(Debug)]
pub struct LatencyHistogram {
    hist: Histogram<u64>,
}

impl LatencyHistogram {
    /// # Errors
    ///
    /// Returns an error if the underlying histogram cannot be allocated.
    pub fn new() -> Result<Self, String> {
        let hist =
            Histogram::<u64>::new(3).map_err(|err| format!("failed to create histogram: {err}"))?;
        Ok(Self { hist })
    }

    /// Records a latency sample in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be recorded.
    pub fn record(&mut self, latency_ms: u64) -> Result<(), String> {
        let value = latency_ms.max(1);
        self.hist
            .record(value)
            .map_err(|err| format!("failed to record latency: {err}"))
    }

    /// Merges another histogram's samples into this one.
    ///
    /// # Errors
    ///
    /// Returns an error if the merge fails.
    pub fn merge(&mut self, other: &LatencyHistogram) -> Result<(), String> {
        self.hist
            .add(&other.hist)
            .map_err(|err| format!("failed to merge histogram: {err}"))
    }

    #[must_use]
    pub fn min(&self) -> u64 {
        if self.count() == 0 { 0 } else { self.hist.min() }
    }

    #[must_use]
    pub fn max(&self) -> u64 {
        if self.count() == 0 { 0 } else { self.hist.max() }
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.count() == 0 { 0.0 } else { self.hist.mean() }
    }

    /// `(p50, p95, p99)` in milliseconds.
    #[must_use]
    pub fn percentiles(&self) -> (u64, u64, u64) {
        if self.count() == 0 {
            return (0, 0, 0);
        }
        (
            self.hist.value_at_quantile(0.5),
            self.hist.value_at_quantile(0.95),
            self.hist.value_at_quantile(0.99),
        )
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.hist.len()
    }

    /// # Errors
    ///
    /// Returns an error if the histogram cannot be serialized.
    pub fn encode_base64(&self) -> Result<String, String> {
        let mut buffer = Vec::new();
        V2Serializer::new()
            .serialize(&self.hist, &mut buffer)
            .map_err(|err| format!("failed to serialize histogram: {err}"))?;
        Ok(B64.encode(buffer))
    }

    /// # Errors
    ///
    /// Returns an error if the payload cannot be decoded or deserialized.
    pub fn decode_base64(encoded: &str) -> Result<Self, String> {
        let bytes = B64
            .decode(encoded.as_bytes())
            .map_err(|err| format!("failed to decode histogram: {err}"))?;
        let mut cursor = Cursor::new(bytes);
        let hist: Histogram<u64> = Deserializer::new()
            .deserialize(&mut cursor)
            .map_err(|err| format!("failed to deserialize histogram: {err}"))?;
        Ok(Self { hist })
    }
}
