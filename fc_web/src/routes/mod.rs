//! ABOUTME: HTTP handler implementations
//! ABOUTME: One module per endpoint group: publish, stream, streams, health

pub mod health;
pub mod publish;
pub mod stream;
pub mod streams;
