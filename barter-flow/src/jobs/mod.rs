/// Dedicated background thread hosting the job runtime, and blocking waits on it.
pub mod runtime;

/// Named job registry and job lifecycle types.
pub mod registry;

/// Job submission, cancellation and the symbol switch state machine.
pub mod orchestrator;
