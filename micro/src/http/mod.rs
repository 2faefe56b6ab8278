//! HTTP serving and client support.

pub mod client;
pub mod codec;
pub mod router;
pub mod server;
pub mod types;

pub use client::{HttpClient, HttpClientResponse};
pub use router::Router;
pub use server::{HttpServer, ListenAddress};
pub use types::{Method, Request, Response, Version};
