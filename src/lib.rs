//! The Rust SDK for Branch, a deep linking and attribution platform.
//!
//! # Overview
//!
//! The SDK revolves around a [`Client`] that reports sessions and [`Event`]s to the Branch API.
//! Each request is packaged together with the app, device, session and advertiser context of the
//! client ([`AppInfo`], [`DeviceInfo`], [`SessionInfo`], [`AdvertiserInfo`]) and sent by a
//! background worker, one request at a time, retrying transient failures with exponential backoff.
//!
//! Results are delivered asynchronously to a [`RequestCallback`]. Every request produces exactly
//! one terminal callback: `on_success` with the server response, or `on_error`.
//!
//! Links are created with [`LinkInfo`], which falls back to a locally built long link when the
//! server cannot be reached.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Functions return an error only for misuse of the
//! API or local failures (e.g., the worker thread could not be spawned). Failures of a particular
//! request are reported to its callback.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages under
//! the `branch` target. Consider integrating a `log`-compatible logger implementation for better
//! visibility into SDK operations.
//!
//! # Privacy
//!
//! When tracking is disabled with [`Client::disable_tracking`], only session opens are sent, and
//! identifying fields (advertiser ids, device and bundle tokens, developer identity, IP and MAC
//! addresses) are stripped from them.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod advertiser_info;
mod app_info;
mod callback;
mod client;
mod config;
mod defines;
mod device_info;
mod error;
mod event;
mod link_info;
mod packaging_info;
mod property_bag;
mod request;
mod request_manager;
mod session_callback;
mod session_info;
mod storage;
mod transport;

#[cfg(test)]
mod test_support;

pub use advertiser_info::{AdIdType, AdvertiserInfo};
pub use app_info::AppInfo;
pub use callback::{NoopCallback, RequestCallback};
pub use client::Client;
pub use config::ClientConfig;
pub use defines::{keys, ApiEndpoint, EndpointKind};
pub use device_info::DeviceInfo;
pub use error::{Error, Result};
pub use event::{AdType, Event, ResultHandler, StandardEventType};
pub use link_info::{LinkInfo, LINK_TYPE_ONE_TIME_USE, LINK_TYPE_UNLIMITED_USE};
pub use packaging_info::PackagingInfo;
pub use property_bag::{PropertyBag, PropertyValue};
pub use request::{Request, RetryPolicy, MAX_ATTEMPT_COUNT, MAX_BACKOFF_MILLIS};
pub use request_manager::{RequestManager, RequestManagerOptions};
pub use session_callback::SessionCallback;
pub use session_info::SessionInfo;
pub use storage::{default_storage, FileStorage, MemoryStorage, Scope, Storage, StorageBackend};
pub use transport::{Attempt, ClientSession, HttpClientSession};
