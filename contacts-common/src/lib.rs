pub mod artifact;
pub mod classify;
pub mod metrics;
pub mod page;
pub mod parse;
pub mod pipeline;
pub mod reconcile;
pub mod record;
pub mod store;
pub mod writer;
