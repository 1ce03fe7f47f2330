//! Security policy resolution and injection for rendered HTML.

pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod integrity;
pub mod lifecycle;
pub mod markup;
pub mod observability;
pub mod policy;
pub mod routing;
pub mod security;
pub mod shield;

pub use config::ShieldConfig;
pub use context::{RenderMode, RequestContext};
pub use error::ShieldError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use policy::SecurityPolicy;
pub use routing::RuleStore;
pub use shield::Shield;
