//! Target/server context resolution.

use crate::error::Result;
use crate::server::{self, Server};
use crate::ssh::SshClient;
use crate::target::{self, Target};

pub struct TargetContext {
    pub target: Target,
    pub server_id: String,
    pub server: Server,
    pub client: SshClient,
}

/// Load a target, its server, and open a session to it.
pub fn resolve_target_session(target_id: &str) -> Result<TargetContext> {
    let target = target::load(target_id)?;
    let server = server::load(&target.server_id)?;
    let client = SshClient::connect(&server, &target.server_id)?;

    Ok(TargetContext {
        server_id: target.server_id.clone(),
        target,
        server,
        client,
    })
}
