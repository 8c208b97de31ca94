// lares-api: wire protocol client for Ksenia Lares alarm panels

pub mod error;
pub mod frame;
pub mod session;
pub mod transport;

pub use error::Error;
pub use frame::{CLIENT_NAME, Frame};
pub use session::{Dispatch, PanelLink, UserAction};
pub use transport::{Connector, SecurityMode, Transport, WsConnector};
