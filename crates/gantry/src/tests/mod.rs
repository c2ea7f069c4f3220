//! Behavioural suites for the supervision runtime.
