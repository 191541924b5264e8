pub mod context;
pub mod engine;
pub mod graph;
pub mod instance;
pub mod query;
pub mod scheduler;
pub mod storage;
pub mod token;
