//! Remote API access for the netops action engine
//!
//! # Modules
//!
//! - `transport`: HTTP seam and the reqwest implementation
//! - `client`: Retry, rate-limit, 204, pagination and cancellation handling
//! - `meraki`: Typed Meraki dashboard API
//! - `webex`: Webex relay space API
//! - `models`: Typed payloads
//! - `product`: Product type derivation from device models

pub mod client;
pub mod meraki;
pub mod models;
pub mod product;
pub mod transport;
pub mod webex;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use client::{Auth, ResilientClient, RetryPolicy};
pub use meraki::MerakiApi;
pub use models::{Device, Network, WebexMessage, WebexPerson};
pub use product::product_type_for_model;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, ReqwestTransport};
pub use webex::WebexApi;
