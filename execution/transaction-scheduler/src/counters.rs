// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;
use prometheus::{register_histogram, register_int_counter, Histogram, IntCounter};

pub static BLOCK_EXECUTE_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "basalt_scheduler_block_execute_seconds",
        "Time spent executing one block, per scheduler entry point"
    )
    .unwrap()
});

pub static SCHEDULER_PASSES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "basalt_scheduler_passes_total",
        "Scheduling passes run by the parallel scheduler (>1 per block means retries)"
    )
    .unwrap()
});

pub static RAW_CONFLICTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "basalt_scheduler_raw_conflicts_total",
        "Read-after-write hazards detected during chunk validation"
    )
    .unwrap()
});

pub static EXECUTED_CHUNKS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "basalt_scheduler_executed_chunks_total",
        "Chunks executed, validated and merged"
    )
    .unwrap()
});
