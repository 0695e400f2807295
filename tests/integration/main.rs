//! Integration tests for windlass.
//!
//! These drive the full deployment pipeline end to end through mocked
//! ports — no network, provisioner, or ssh.

mod pipeline_e2e;
