//! Integration tests

mod test_credentials;
mod test_orchestrator;
