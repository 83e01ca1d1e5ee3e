pub mod notify;
pub mod pipeline;
pub mod sources;
