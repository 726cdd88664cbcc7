//! Integration tests
//!
//! Session scenarios against in-memory collaborators, the REST client
//! against a wiremock server, and the push channel against a local
//! WebSocket server.

mod push_connection_test;
mod rest_client_test;
