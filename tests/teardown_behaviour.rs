//! Behavioural scenarios for base stack teardown.

mod teardown;
