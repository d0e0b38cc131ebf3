mod coordinator;
mod ensemble;
mod governor;
mod ground_truth;
mod metrics;
mod orchestrator;
mod report;
mod run;
mod sampler;

pub use run::run;
