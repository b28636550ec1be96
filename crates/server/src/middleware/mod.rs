pub mod cache;
pub mod logging;
pub mod rate_limit;

pub use logging::RpcContext;
