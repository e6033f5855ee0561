//! Test suites for the NuHost platform.

mod credentials;
mod hosting;
mod multiplexer;
mod support;
