#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod client;
pub mod color;
pub mod device;
pub mod error;
pub(crate) mod serde_helpers;
pub mod session;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;
