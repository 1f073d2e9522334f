//! Metric instruments and the provider capability that creates them.
//!
//! [`MetricsProvider`] is implemented for the OpenTelemetry [`Meter`] and for
//! [`InMemoryMetrics`], which keeps every observation for inspection.

use crate::error::{MiddlewareError, MiddlewareResult};
use opentelemetry::metrics::{self as otel, Meter, MetricsError, Unit};
use opentelemetry::KeyValue;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Monotonic counter.
pub trait Counter: Send + Sync {
    fn add(&self, value: u64, attributes: &[KeyValue]);
}

/// Distribution of recorded values.
pub trait Histogram: Send + Sync {
    fn record(&self, value: u64, attributes: &[KeyValue]);
}

/// Name, description and unit of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub unit: Option<&'static str>,
}

/// Get-or-create access to named instruments.
pub trait MetricsProvider: Send + Sync {
    fn counter(&self, descriptor: &InstrumentDescriptor) -> otel::Result<Arc<dyn Counter>>;

    fn histogram(&self, descriptor: &InstrumentDescriptor) -> otel::Result<Arc<dyn Histogram>>;
}

impl Counter for otel::Counter<u64> {
    fn add(&self, value: u64, attributes: &[KeyValue]) {
        otel::Counter::add(self, value, attributes);
    }
}

impl Histogram for otel::Histogram<u64> {
    fn record(&self, value: u64, attributes: &[KeyValue]) {
        otel::Histogram::record(self, value, attributes);
    }
}

impl MetricsProvider for Meter {
    fn counter(&self, descriptor: &InstrumentDescriptor) -> otel::Result<Arc<dyn Counter>> {
        let mut builder = self
            .u64_counter(descriptor.name)
            .with_description(descriptor.description);
        if let Some(unit) = descriptor.unit {
            builder = builder.with_unit(Unit::new(unit));
        }
        Ok(Arc::new(builder.try_init()?))
    }

    fn histogram(&self, descriptor: &InstrumentDescriptor) -> otel::Result<Arc<dyn Histogram>> {
        let mut builder = self
            .u64_histogram(descriptor.name)
            .with_description(descriptor.description);
        if let Some(unit) = descriptor.unit {
            builder = builder.with_unit(Unit::new(unit));
        }
        Ok(Arc::new(builder.try_init()?))
    }
}

pub const SERVER_HANDLING: InstrumentDescriptor = InstrumentDescriptor {
    name: "grpc.server.handling",
    description: "Histogram of response latency (milliseconds) of gRPC that had been application-level handled by the server.",
    unit: Some("ms"),
};

pub const SERVER_STARTED: InstrumentDescriptor = InstrumentDescriptor {
    name: "grpc.server.started",
    description: "Total number of RPCs started on the server.",
    unit: None,
};

pub const SERVER_HANDLED: InstrumentDescriptor = InstrumentDescriptor {
    name: "grpc.server.handled",
    description: "Total number of RPCs completed on the server, regardless of success or failure.",
    unit: None,
};

pub const SERVER_MSG_RECEIVED: InstrumentDescriptor = InstrumentDescriptor {
    name: "grpc.server.msg.received",
    description: "Total number of RPC stream messages received on the server.",
    unit: None,
};

pub const SERVER_MSG_SENT: InstrumentDescriptor = InstrumentDescriptor {
    name: "grpc.server.msg.sent",
    description: "Total number of gRPC stream messages sent by the server.",
    unit: None,
};

/// The five instruments used by the metrics interceptor.
#[derive(Clone)]
pub struct MetricRecorders {
    pub handling: Arc<dyn Histogram>,
    pub started: Arc<dyn Counter>,
    pub handled: Arc<dyn Counter>,
    pub msg_received: Arc<dyn Counter>,
    pub msg_sent: Arc<dyn Counter>,
}

impl MetricRecorders {
    /// Create every instrument, stopping at the first failure.
    pub fn new(provider: &dyn MetricsProvider) -> MiddlewareResult<Self> {
        Ok(Self {
            handling: provider
                .histogram(&SERVER_HANDLING)
                .map_err(instrument_error(&SERVER_HANDLING))?,
            started: provider
                .counter(&SERVER_STARTED)
                .map_err(instrument_error(&SERVER_STARTED))?,
            handled: provider
                .counter(&SERVER_HANDLED)
                .map_err(instrument_error(&SERVER_HANDLED))?,
            msg_received: provider
                .counter(&SERVER_MSG_RECEIVED)
                .map_err(instrument_error(&SERVER_MSG_RECEIVED))?,
            msg_sent: provider
                .counter(&SERVER_MSG_SENT)
                .map_err(instrument_error(&SERVER_MSG_SENT))?,
        })
    }
}

fn instrument_error(
    descriptor: &InstrumentDescriptor,
) -> impl FnOnce(MetricsError) -> MiddlewareError {
    let name = descriptor.name;
    move |source| MiddlewareError::Instrument { name, source }
}

/// One recorded value together with its attributes.
#[derive(Debug, Clone)]
pub struct Observation {
    pub value: u64,
    pub attributes: Vec<KeyValue>,
}

impl Observation {
    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.as_str().into_owned())
    }
}

#[derive(Debug)]
struct InMemoryInstrument {
    descriptor: InstrumentDescriptor,
    observations: RwLock<Vec<Observation>>,
}

impl InMemoryInstrument {
    fn push(&self, value: u64, attributes: &[KeyValue]) {
        self.observations.write().push(Observation {
            value,
            attributes: attributes.to_vec(),
        });
    }
}

impl Counter for InMemoryInstrument {
    fn add(&self, value: u64, attributes: &[KeyValue]) {
        self.push(value, attributes);
    }
}

impl Histogram for InMemoryInstrument {
    fn record(&self, value: u64, attributes: &[KeyValue]) {
        self.push(value, attributes);
    }
}

#[derive(Debug, Default)]
struct InMemoryState {
    instruments: RwLock<HashMap<&'static str, Arc<InMemoryInstrument>>>,
    failing: RwLock<HashSet<&'static str>>,
}

/// Metrics provider that keeps all observations in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetrics {
    state: Arc<InMemoryState>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make creation of the named instrument fail, as a misconfigured
    /// backend would.
    pub fn fail_on(self, name: &'static str) -> Self {
        self.state.failing.write().insert(name);
        self
    }

    /// Every observation recorded on `name`, in order.
    pub fn observations(&self, name: &str) -> Vec<Observation> {
        self.state
            .instruments
            .read()
            .get(name)
            .map(|instrument| instrument.observations.read().clone())
            .unwrap_or_default()
    }

    /// Sum of all values recorded on `name`.
    pub fn sum(&self, name: &str) -> u64 {
        self.observations(name).iter().map(|o| o.value).sum()
    }

    /// Number of observations recorded across all instruments.
    pub fn total_observations(&self) -> usize {
        self.state
            .instruments
            .read()
            .values()
            .map(|instrument| instrument.observations.read().len())
            .sum()
    }

    /// Names of the instruments created so far.
    pub fn instrument_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.state.instruments.read().keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Descriptor the named instrument was created with.
    pub fn descriptor(&self, name: &str) -> Option<InstrumentDescriptor> {
        self.state
            .instruments
            .read()
            .get(name)
            .map(|instrument| instrument.descriptor)
    }

    fn get_or_create(
        &self,
        descriptor: &InstrumentDescriptor,
    ) -> otel::Result<Arc<InMemoryInstrument>> {
        if self.state.failing.read().contains(descriptor.name) {
            return Err(MetricsError::Other(format!(
                "instrument {} is not available",
                descriptor.name
            )));
        }

        let mut instruments = self.state.instruments.write();
        let instrument = instruments.entry(descriptor.name).or_insert_with(|| {
            Arc::new(InMemoryInstrument {
                descriptor: *descriptor,
                observations: RwLock::new(Vec::new()),
            })
        });
        Ok(Arc::clone(instrument))
    }
}

impl MetricsProvider for InMemoryMetrics {
    fn counter(&self, descriptor: &InstrumentDescriptor) -> otel::Result<Arc<dyn Counter>> {
        Ok(self.get_or_create(descriptor)?)
    }

    fn histogram(&self, descriptor: &InstrumentDescriptor) -> otel::Result<Arc<dyn Histogram>> {
        Ok(self.get_or_create(descriptor)?)
    }
}
