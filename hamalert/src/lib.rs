pub mod alert;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod estimator;
pub mod filter;
pub mod logbook;
pub mod rig;
pub mod scheduler;
pub mod session;
pub mod shutdown;
pub mod timestamp;
pub mod transport;

pub use alert::{Alert, Spot};
pub use client::{Client, ClientOptions, ConnectionState, Event};
pub use dispatch::{Action, ActionQueue, Dispatcher, Presenter};
pub use filter::FilterSet;
pub use session::Credentials;
pub use shutdown::{Shutdown, ShutdownSignal};
