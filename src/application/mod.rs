pub mod agents;
pub mod approval;
pub mod market_data;
pub mod optimization;
pub mod pipeline;
pub mod plan_builder;
