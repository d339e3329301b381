//! Network listeners

mod listener;
mod stream;
pub mod tls;

pub use listener::{supervise, Listener, ListenerError, RestartPolicy};
pub use stream::{ClientStream, ClientTransport};
pub use tls::TlsError;
