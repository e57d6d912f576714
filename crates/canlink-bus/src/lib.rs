//! Frame routing and verification over the canlink transport.
//!
//! This is the layer test code talks to. Subscribe to frames by marker and
//! identifier, send frames and wait for the adapter's acknowledgement, and
//! check that a frame with given field values arrives within a deadline.

pub mod bus;
pub mod config;
pub mod correlator;
pub mod criteria;
pub mod dispatcher;
pub mod error;
pub mod verify;
pub mod window;

pub use bus::CanBus;
pub use config::BusConfig;
pub use correlator::{AckCorrelator, AckOutcome, PendingAck, DEFAULT_ACK_TIMEOUT};
pub use criteria::{
    normalize_identifier, normalize_payload, parse_identifier, Criteria, PayloadByte,
    PayloadPattern,
};
pub use dispatcher::{Dispatcher, Listener, ListenerId, SubscriptionKey};
pub use error::{BusError, CriteriaError, Result};
pub use verify::{PollInterval, Verdict, VerifyConfig, Watch, WatchState, WatchStats};
pub use window::{
    Fingerprint, MessageWindow, SeenSet, SharedWindow, WindowEntry, DEFAULT_SEEN_CAPACITY,
    DEFAULT_WINDOW_CAPACITY,
};
