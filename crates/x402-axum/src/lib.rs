//! The resource-server side of x402: a tower `Layer` (component G) implementing the
//! verify → track → handle → settle pipeline, plus the `PaywallProvider` capability
//! interface (component I) for HTML-preferring clients.

pub mod paygate;
pub mod paywall;
pub mod route;
pub mod tracking;

pub use paygate::{X402Layer, X402Service, PAYMENT_REQUIRED_HEADER, PAYMENT_RESPONSE_HEADER, PAYMENT_SIGNATURE_HEADER, UPTO_SESSION_ID_HEADER};
pub use paywall::PaywallProvider;
pub use route::{RouteConfig, RouteTable};
