//! Test modules for queue iteration
//!
//! Tests are organised by behaviour: plain iteration and acknowledgement,
//! notification-driven wake-ups, and connection loss.

mod notifications;
mod stream;
mod support;
