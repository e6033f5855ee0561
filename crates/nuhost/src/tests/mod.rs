//! Test suites for the NuHost launcher.

mod support;
