//! imgsync - mirror virtual machine images from image lists
//!
//! Fetches HEPiX image lists, downloads and verifies the subscribed
//! images and reconciles an on-disk cache against the lists with a
//! mark-and-sweep pass.

pub mod audit;
pub mod cache;
pub mod cancel;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod image;
pub mod image_list;
pub mod transport;
pub mod ui;

pub use error::{ImgsyncError, ImgsyncResult};
