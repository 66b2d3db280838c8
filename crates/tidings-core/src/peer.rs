//! Federation peer information

use serde::{Deserialize, Serialize};

/// What a server announces about itself in `greet_server`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Base64url server public key
    pub public_key: String,
    /// Address clients connect to
    pub client_address: String,
    /// Address other servers connect to
    pub server_address: String,
}

impl ServerInfo {
    pub fn new(
        public_key: impl Into<String>,
        client_address: impl Into<String>,
        server_address: impl Into<String>,
    ) -> Self {
        ServerInfo {
            public_key: public_key.into(),
            client_address: client_address.into(),
            server_address: server_address.into(),
        }
    }
}
