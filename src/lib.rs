pub mod api;
pub mod app;
pub mod config;
pub mod session;
pub mod state;
pub mod stream;
pub mod types;

#[cfg(test)]
pub mod test_support;
