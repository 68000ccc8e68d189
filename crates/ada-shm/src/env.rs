//! Child-process arena rendezvous (§6): `ADA_SHM_HOST_PID` and
//! `ADA_SHM_SESSION_ID` let a spawned agent reconstruct the same arena
//! names the controller created, without any other IPC.

use crate::naming::SessionId;
use std::env;

pub const HOST_PID_VAR: &str = "ADA_SHM_HOST_PID";
pub const SESSION_ID_VAR: &str = "ADA_SHM_SESSION_ID";

/// Reads `(host_pid, session_id)` from the environment, for a child that
/// needs to reconstruct the controller's arena names. Returns `None` if
/// either variable is absent or malformed; the caller (the agent) falls
/// back to `GLOBAL_ONLY` mode in that case (§4.6 rule 1).
#[must_use]
pub fn rendezvous_from_env() -> Option<(u32, SessionId)> {
    let pid = env::var(HOST_PID_VAR).ok()?.parse::<u32>().ok()?;
    let session = env::var(SESSION_ID_VAR).ok()?.parse::<SessionId>().ok()?;
    Some((pid, session))
}

/// Builds the environment variables a controller should set before
/// spawning its agent/target process.
#[must_use]
pub fn rendezvous_env_vars(host_pid: u32, session_id: SessionId) -> [(String, String); 2] {
    [
        (HOST_PID_VAR.to_string(), host_pid.to_string()),
        (SESSION_ID_VAR.to_string(), session_id.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_parses_back_its_own_vars() {
        let vars = rendezvous_env_vars(4321, SessionId(0x0000_00cd));
        assert_eq!(vars[0].0, HOST_PID_VAR);
        assert_eq!(vars[1].1, "000000cd");
    }
}
