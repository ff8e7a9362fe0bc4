pub mod monitor;
pub mod db;
pub mod probe;
pub mod alerting;
pub mod notifications;
pub mod reactions;
pub mod scheduler;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;
