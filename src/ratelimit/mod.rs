//! Rate limiting logic and state management.

mod backend;
mod clock;
mod counter;
mod descriptor;
mod limiter;
mod policy;
mod rules;

pub use backend::CounterStore;
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::CounterRecord;
pub use descriptor::{CounterKey, ANONYMOUS, DEFAULT_KEY_PREFIX};
pub use limiter::{Decision, RateLimiter};
pub use policy::{
    builtin_policies, Policy, PolicyCatalog, PolicyConfig, DEFAULT_POLICY, MAX_WINDOW_SECONDS,
};
pub use rules::{builtin_endpoints, EndpointClassifier, EndpointRule, RateLimitRules};
