//! Application layer: the Batch Processor service

pub mod service;

pub use service::BatchProcessor;
