//! Behavioural suites for the service façade and run lock.

mod service_behaviour;
mod support;
