use std::sync::Arc;

use courier_core::store::{ChannelStore, PostStore};
use courier_core::verify::{ChannelVerifier, VerificationSessions};
use courier_worker::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub posts: Arc<dyn PostStore>,
    pub channels: Arc<dyn ChannelStore>,
    pub verifier: Arc<ChannelVerifier>,
    pub sessions: Arc<VerificationSessions>,
    pub dispatcher: Arc<Dispatcher>,
    pub courier_env: String,
}
