// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

use prometheus::{Histogram, IntCounterVec, IntGauge};
use tipchain_utils::metrics::define_metric_set;

pub(crate) const SUCCESS: &str = "success";
pub(crate) const FAILURE: &str = "failure";
pub(crate) const QUEUED: &str = "queued";
pub(crate) const NO_ACCOUNT: &str = "no_account";
pub(crate) const BUSY: &str = "busy";

define_metric_set! {
    #[namespace = "tipchain"]
    /// Metrics exported by the chain viewer.
    pub struct ViewerMetricSet {
        #[help = "The number of chain loads, by outcome"]
        chain_loads: IntCounterVec["outcome"],
        #[help = "The number of tip attempts, by outcome"]
        tips: IntCounterVec["outcome"],
        #[help = "The time from tip submission to confirmation, in seconds"]
        tip_confirmation_seconds: Histogram{buckets: vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]},
        #[help = "The number of entries in the last loaded chain"]
        chain_length: IntGauge[],
    }
}
