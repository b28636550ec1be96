//! End-to-end scenarios: real axum router, mock upstreams.


#[cfg(test)]
mod cache_tests;
#[cfg(test)]
mod gateway_tests;
#[cfg(test)]
mod rate_limit_tests;
#[cfg(test)]
mod selection_tests;
