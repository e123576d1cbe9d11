mod statsd;

pub use statsd::{
    sink_from_config, MetricsSink, NoopSink, StatsdSink, LINES_FAILED, LINES_PROCESSED,
    METRIC_PREFIX,
};
