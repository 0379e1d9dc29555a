mod connection;
mod events;
mod state;

pub use connection::run_relay;
pub use state::RelayState;
