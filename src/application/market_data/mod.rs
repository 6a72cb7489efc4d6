pub mod covariance;
pub mod garch;
pub mod mock;
