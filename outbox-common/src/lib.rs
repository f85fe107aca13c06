pub mod address;
pub mod config;
pub mod logging;
pub mod render;

pub use address::{AddressError, AddressMap, Mailbox, NamedAddress};
pub use config::{Config, TestingConfig};
pub use render::{RenderError, Renderer, StaticRenderer};
pub use tracing;
