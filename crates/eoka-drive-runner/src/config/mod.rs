pub mod locator;
pub mod params;
pub mod schema;
pub mod steps;

pub use locator::LocatorSpec;
pub use params::{ParamDef, Params};
pub use schema::{Condition, OnError, OnFailure, RetryConfig, Scenario, SuccessCondition, TargetUrl};
pub use steps::Step;
