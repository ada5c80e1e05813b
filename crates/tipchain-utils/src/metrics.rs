// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Prometheus helpers: a registry that tolerates repeated registrations, and a macro to declare
//! sets of metrics.

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, Mutex},
};

use prometheus::{Encoder as _, TextEncoder, core::Collector, proto::MetricFamily};

/// Errors returned during registration of a collector with [`Registry::get_or_register`].
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// Error returned when collectors with the same name have different types (e.g., counter and
    /// gauge with the same fully-qualified name).
    #[error("a collector with the same ID was already registered but with a different type")]
    InconsistentType,

    /// Distinct collectors should not have an overlapping set of metrics.
    #[error("at least one metric in the collector has already been registered, ensure no overlaps")]
    MetricsOverlap,

    /// Errors raised by the inner [`prometheus::Registry::register`].
    ///
    /// This will never be [`prometheus::Error::AlreadyReg`].
    #[error(transparent)]
    Prometheus(prometheus::Error),
}

/// A thin wrapper around [`prometheus::Registry`] that returns the existing metric on attempts
/// to register the same metric twice.
///
/// Several viewers may be created against one registry over the life of a process, and each
/// declares the same metric set.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    inner: prometheus::Registry,
    collectors_by_id: Arc<Mutex<HashMap<u64, Box<dyn Any + Send>>>>,
}

impl Registry {
    /// Returns a new instance of the registry wrapping the provided [`prometheus::Registry`]
    pub fn new(inner: prometheus::Registry) -> Self {
        Self {
            inner,
            collectors_by_id: Default::default(),
        }
    }

    /// Gets a previously registered collector that matches the provided collector,
    /// or registers that collector and returns it.
    #[must_use = "use the returned value as the given collector may have already been registered"]
    pub fn get_or_register<T>(&self, collector: T) -> Result<T, RegistrationError>
    where
        T: Collector + Send + Clone + 'static,
    {
        let collector_id = Self::collector_id(&collector);
        let mut collectors_by_id = self
            .collectors_by_id
            .lock()
            .expect("critical section shouldnt panic");

        match self.inner.register(Box::new(collector.clone())) {
            Ok(()) => {
                let prior = collectors_by_id.insert(collector_id, Box::new(collector.clone()));
                assert!(prior.is_none(), "collectors should not be unregistered");
                Ok(collector)
            }
            // The registry rejects the collector if ANY of its metrics is already present. If the
            // same collector ID was stored, this exact collector was registered before.
            Err(prometheus::Error::AlreadyReg) => collectors_by_id
                .get(&collector_id)
                .ok_or(RegistrationError::MetricsOverlap)?
                .downcast_ref::<T>()
                .cloned()
                .ok_or(RegistrationError::InconsistentType),
            Err(other) => Err(RegistrationError::Prometheus(other)),
        }
    }

    /// Calls `prometheus::Registry::gather()`.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.inner.gather()
    }

    /// Renders all gathered metrics in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Returns an ID for the collector, computed the way `prometheus::Registry::register` does.
    fn collector_id<T: Collector>(collector: &T) -> u64 {
        collector
            .desc()
            .into_iter()
            .fold(0u64, |collector_id, desc| {
                collector_id.wrapping_add(desc.id)
            })
    }
}

/// Defines a set of prometheus metrics.
///
/// # Example
///
/// ```ignore
/// tipchain_utils::define_metric_set! {
///     #[namespace = "tipchain"]
///     /// Docstring applied to the containing struct.
///     struct MyMetricSet {
///         #[help = "Help text and docstring for this metric"]
///         my_int_counter: IntCounter[],
///         // Vec-type metrics have their label names specified in the brackets.
///         #[help = "Help text for the int_counter_vec field"]
///         int_counter_vec: IntCounterVec["label1", "label2"],
///         // Histograms can additionally have their buckets specified.
///         #[help = "Help text for the my_histogram field"]
///         my_histogram: Histogram{buckets: vec![0.25, 1.0, 10.0]},
///     }
/// }
/// ```
#[macro_export]
macro_rules! define_metric_set {
    (
        #[namespace = $namespace:literal]
        $(#[$outer:meta])*
        $vis:vis struct $name:ident {
            $(
                #[help = $help_str:literal]
                $field_name:ident: $field_type:ident $field_def:tt
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone)]
        $vis struct $name {
            $(
                #[doc = $help_str]
                pub $field_name: $field_type,
            )*
        }

        impl $name {
            /// The namespace in which the metrics reside.
            pub const NAMESPACE: &'static str = $namespace;

            /// Creates a new instance of the metric set.
            ///
            /// # Panics
            ///
            /// Panics if the metrics are not unique on the registry.
            pub fn new(registry: &$crate::metrics::Registry) -> Self {
                Self { $(
                    $field_name: {
                        let opts = ::prometheus::Opts::new(stringify!($field_name), $help_str)
                            .namespace($namespace);
                        let metric = $crate::create_metric!($field_type, opts, $field_def);
                        registry.get_or_register(metric)
                            .expect("metrics defined at compile time must be valid")
                    },
                )* }
            }
        }
    };
}

pub use define_metric_set;

#[macro_export]
#[doc(hidden)]
macro_rules! create_metric {
    ($field_type:ty, $opts:expr, []) => {{
        <$field_type>::with_opts($opts.into())
            .expect("this must be called with valid metrics type and options")
    }};
    (Histogram, $opts:expr, {buckets: $buckets:expr $(,)?}) => {{
        let mut opts: ::prometheus::HistogramOpts = $opts.into();
        opts.buckets = $buckets.into();

        ::prometheus::Histogram::with_opts(opts)
            .expect("this must be called with valid metrics type and options")
    }};
    ($field_type:ty, $opts:expr, $label_names:expr) => {{
        <$field_type>::new($opts.into(), &$label_names)
            .expect("this must be called with valid metrics type and options")
    }};
}

pub use create_metric;

/// Shorthand for `metric.with_label_values(&[...])` accepting anything that is `AsRef<str>`.
#[macro_export]
macro_rules! with_label {
    ($metric:expr, $($label:expr),+$(,)?) => {
        $metric.with_label_values(&[$($label.as_ref()),+])
    };
}

pub use with_label;
