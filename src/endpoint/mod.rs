//! Endpoint facade: one side of the pair, assembled from every component.

mod builder;
#[allow(clippy::module_inception)]
mod endpoint;
mod session;

pub use builder::EndpointBuilder;
pub use endpoint::Endpoint;
pub use session::ForegroundSession;
