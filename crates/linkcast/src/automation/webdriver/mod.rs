//! [`SessionDriver`](super::SessionDriver) backed by a W3C WebDriver endpoint.

pub mod client;
mod session;

pub use client::{ElementRef, WebDriverClient, WebDriverError};
pub use session::{chrome_capabilities, WebDriverSession};
