use std::time::Duration;

/// A description of the capabilities negotiated with a server during the connection handshake.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct StreamDescription {
    /// The maximum wire version that the server understands.
    pub max_wire_version: Option<i32>,

    /// The `logicalSessionTimeoutMinutes` the server reported in its handshake, if any.
    pub logical_session_timeout: Option<Duration>,
}

impl StreamDescription {
    /// Creates a description for a server speaking the given wire version.
    pub fn new(max_wire_version: i32) -> Self {
        Self {
            max_wire_version: Some(max_wire_version),
            logical_session_timeout: None,
        }
    }

}
