pub(crate) const SESSION_TRACING_EVENT_TARGET: &str = "mongocore::session";
