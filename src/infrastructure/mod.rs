pub mod chain_rpc;
pub mod entropy;
pub mod relayer;
pub mod submitter;
