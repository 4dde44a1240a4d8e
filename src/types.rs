use std::sync::Arc;
use tokio::sync::RwLock;

use crate::telegram::Transport;
use crate::users::UserStore;

/// Written by the HTTP handlers, snapshotted by the delivery loop every cycle.
pub type SharedUsers = Arc<RwLock<UserStore>>;

pub type SharedTransport = Arc<dyn Transport>;
