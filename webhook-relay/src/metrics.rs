//! Webhook relay metrics

use prometheus::{register_counter_vec, register_int_gauge, CounterVec, IntGauge};

lazy_static::lazy_static! {
    pub static ref WEBHOOK_ATTEMPTS_TOTAL: CounterVec = register_counter_vec!(
        "webhook_attempts_total",
        "Webhook processing attempts by outcome",
        &["outcome"]
    )
    .unwrap();

    pub static ref DEAD_LETTER_SIZE: IntGauge = register_int_gauge!(
        "webhook_dead_letter_size",
        "Items currently in the dead letter store"
    )
    .unwrap();

    pub static ref DELAY_QUEUE_SIZE: IntGauge = register_int_gauge!(
        "webhook_delay_queue_size",
        "Jobs currently waiting in the delay queue"
    )
    .unwrap();
}
