//! Test modules for the broker layer

mod lifecycle;
