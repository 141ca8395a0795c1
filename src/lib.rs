//! A Rust library for fetching OpenStreetMap regions and rendering them as line maps.
//!
//! The crate logs in to the OSM map API (a capabilities and version check), fetches
//! the nodes and ways inside a bounding box, projects them onto a pixel viewport and
//! emits drawing commands to any `Canvas`. An offscreen raster canvas with PNG export
//! is included, as is a headless `MapSession` that ties the pieces together.
//!
//! The transport is pluggable: `reqwest` on native targets, `ehttp` for WASM, and a
//! scripted `MockTransport` for tests and offline use.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod render;
pub mod request;
pub mod session;

pub use client::*;
pub use config::*;
pub use error::*;
pub use http::*;
pub use model::*;
pub use render::*;
pub use request::*;
pub use session::*;
