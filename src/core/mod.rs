//! Engine core: the consumer contract, cancellation tree, execution nodes and sources.
//!
//! - [`subscription`]: release tree with idempotent, aggregated teardown;
//! - [`observer`]: the three-channel consumer contract;
//! - [`notification`]: observer calls as values;
//! - [`subscriber`]: one live execution enforcing the terminal-state rules;
//! - [`source`]: cold recipes and stage lifting.

pub(crate) mod notification;
pub(crate) mod observer;
pub(crate) mod source;
pub(crate) mod subscriber;
pub(crate) mod subscription;

pub use notification::Notification;
pub use observer::{FnObserver, Observer};
pub use source::{Source, Stage};
pub use subscriber::Subscriber;
pub use subscription::{Subscription, Teardown};
