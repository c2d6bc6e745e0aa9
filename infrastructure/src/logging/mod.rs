//! Event log adapters

mod jsonl_sink;

pub use jsonl_sink::JsonlEventSink;
