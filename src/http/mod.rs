//! Request/response model and the network seam.

mod network;
mod request;
mod response;

pub use network::{Network, ReqwestNetwork};
pub use request::{Destination, Mode, Request};
pub use response::{Response, ResponseKind};
