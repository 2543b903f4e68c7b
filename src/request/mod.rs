//! Request descriptors and URL building.
//!
//! Descriptors are built by the outer layers; the engine only needs to turn one into a URL
//! (through a [`UrlBuilder`]) and, for multi-target commands, to swap its object id list.

mod parameters;
mod url_builder;

pub use self::parameters::{CommandParameters, MultiTargetParameters, Parameters, RequestParameters};
pub use self::url_builder::{ConnectionDetails, PrtgUrlBuilder, UrlBuilder};
