//! Behaviour suites for the dispatcher.

mod support;
